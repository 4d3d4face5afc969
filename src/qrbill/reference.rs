use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::core::{BelegError, check_digit};

/// Digits reserved for the invoice id at the start of a structured reference.
pub const INVOICE_ID_DIGITS: usize = 10;
/// Random digits following the invoice id.
pub const RANDOM_DIGITS: usize = 16;

/// Payment reference printed on a QR-bill.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum PaymentReference {
    /// 26 data digits plus a modulo-10 check digit. QR-IBAN accounts only.
    Structured { digits: String, check_digit: u8 },
    /// No reference.
    None,
}

impl PaymentReference {
    /// Build a structured reference from an invoice id and 16 random digits.
    pub fn structured(invoice_id: i64, random: &str) -> Result<Self, BelegError> {
        if invoice_id < 0 {
            return Err(BelegError::InvalidInput(format!(
                "negative invoice id {invoice_id}"
            )));
        }
        let id = format!("{invoice_id:0>width$}", width = INVOICE_ID_DIGITS);
        if id.len() > INVOICE_ID_DIGITS {
            return Err(BelegError::InvalidInput(format!(
                "invoice id {invoice_id} exceeds {INVOICE_ID_DIGITS} digits"
            )));
        }
        if random.len() != RANDOM_DIGITS {
            return Err(BelegError::InvalidInput(format!(
                "expected {RANDOM_DIGITS} random digits, got {}",
                random.len()
            )));
        }

        let digits = format!("{id}{random}");
        let check_digit = check_digit(&digits)?;
        Ok(Self::Structured {
            digits,
            check_digit,
        })
    }

    /// Build a structured reference with fresh random digits.
    pub fn generate<R: Rng + ?Sized>(invoice_id: i64, rng: &mut R) -> Result<Self, BelegError> {
        let random: String = (0..RANDOM_DIGITS)
            .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
            .collect();
        Self::structured(invoice_id, &random)
    }

    pub fn is_structured(&self) -> bool {
        matches!(self, Self::Structured { .. })
    }

    /// SPC reference type: `QRR` or `NON`.
    pub fn type_code(&self) -> &'static str {
        match self {
            Self::Structured { .. } => "QRR",
            Self::None => "NON",
        }
    }

    /// The full 27-digit reference, if structured.
    pub fn value(&self) -> Option<String> {
        match self {
            Self::Structured {
                digits,
                check_digit,
            } => Some(format!("{digits}{check_digit}")),
            Self::None => None,
        }
    }

    /// The reference as printed: blocks of five digits counted from the right.
    pub fn formatted(&self) -> Option<String> {
        let value = self.value()?;
        let head = value.len() % 5;
        let mut blocks = Vec::new();
        if head > 0 {
            blocks.push(&value[..head]);
        }
        let mut pos = head;
        while pos < value.len() {
            blocks.push(&value[pos..pos + 5]);
            pos += 5;
        }
        Some(blocks.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::verify_check_digit;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn pads_invoice_id_and_appends_check_digit() {
        let r = PaymentReference::structured(42, "0000000000000000").unwrap();
        let value = r.value().unwrap();
        assert_eq!(value.len(), 27);
        assert!(value.starts_with("0000000042"));
        assert!(verify_check_digit(&value));
    }

    #[test]
    fn generated_reference_is_valid() {
        let mut rng = StdRng::seed_from_u64(7);
        for id in [1, 42, 9_999_999_999] {
            let r = PaymentReference::generate(id, &mut rng).unwrap();
            let value = r.value().unwrap();
            assert_eq!(value.len(), 27);
            assert!(value.bytes().all(|b| b.is_ascii_digit()));
            assert!(verify_check_digit(&value));
        }
    }

    #[test]
    fn rejects_out_of_range_ids() {
        assert!(PaymentReference::structured(-1, "0000000000000000").is_err());
        assert!(PaymentReference::structured(10_000_000_000, "0000000000000000").is_err());
    }

    #[test]
    fn rejects_bad_random_part() {
        assert!(PaymentReference::structured(1, "123").is_err());
        assert!(matches!(
            PaymentReference::structured(1, "00000000000000x0"),
            Err(BelegError::InvalidInput(_))
        ));
    }

    #[test]
    fn formatted_in_blocks_from_the_right() {
        let r = PaymentReference::Structured {
            digits: "21000000000313947143000901".into(),
            check_digit: 7,
        };
        assert_eq!(r.formatted().unwrap(), "21 00000 00003 13947 14300 09017");
        assert_eq!(PaymentReference::None.formatted(), None);
    }

    #[test]
    fn type_codes() {
        assert_eq!(PaymentReference::None.type_code(), "NON");
        let r = PaymentReference::structured(1, "1234567890123456").unwrap();
        assert_eq!(r.type_code(), "QRR");
    }
}
