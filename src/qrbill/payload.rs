use rand::Rng;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::{BelegError, Client, DEFAULT_COUNTRY, DOMAIN_CURRENCY, Invoice, normalize_country};

use super::creditor::CreditorAccount;
use super::reference::PaymentReference;

/// Maximum length of the unstructured message.
pub const MESSAGE_MAX_CHARS: usize = 140;
/// Largest amount a QR-bill can carry.
pub const MAX_AMOUNT: Decimal = dec!(999999999.99);
/// Upper bound of the encoded SPC data set.
pub const SPC_MAX_CHARS: usize = 997;

const NAME_MAX: usize = 70;
const STREET_MAX: usize = 70;
const POSTAL_CODE_MAX: usize = 16;
const TOWN_MAX: usize = 35;

/// The payer block of a QR-bill.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebtorParty {
    pub name: String,
    pub address: Option<String>,
    pub postal_code: String,
    pub locality: String,
    /// ISO 3166-1 alpha-2.
    pub country: String,
}

/// Complete Swiss QR-bill data set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QrBillPayload {
    pub currency: String,
    pub amount: Decimal,
    pub creditor: CreditorAccount,
    pub debtor: Option<DebtorParty>,
    pub message: String,
    pub reference: PaymentReference,
}

impl QrBillPayload {
    /// Encode the Swiss Payments Code data set (version 0200, coding 1).
    ///
    /// Elements are separated by LF; there is no trailing separator.
    /// Refuses combinations the standard rejects instead of emitting them.
    pub fn to_spc(&self) -> Result<String, BelegError> {
        check_reference(&self.creditor, &self.reference)?;
        check_amount(self.amount)?;

        let c = &self.creditor;
        let mut fields: Vec<String> = vec![
            "SPC".into(),
            "0200".into(),
            "1".into(),
            c.account.clone(),
            "S".into(),
            clip(&c.name, NAME_MAX),
            clip(&c.street, STREET_MAX),
            String::new(),
            clip(&c.postal_code, POSTAL_CODE_MAX),
            clip(&c.city, TOWN_MAX),
            c.country.clone(),
        ];
        // Ultimate creditor: reserved, must stay empty.
        fields.extend(std::iter::repeat_n(String::new(), 7));
        fields.push(format!("{:.2}", self.amount));
        fields.push(self.currency.clone());

        match &self.debtor {
            Some(d) => fields.extend([
                "S".into(),
                clip(&d.name, NAME_MAX),
                d.address.as_deref().map(|a| clip(a, STREET_MAX)).unwrap_or_default(),
                String::new(),
                clip(&d.postal_code, POSTAL_CODE_MAX),
                clip(&d.locality, TOWN_MAX),
                d.country.clone(),
            ]),
            None => fields.extend(std::iter::repeat_n(String::new(), 7)),
        }

        fields.push(self.reference.type_code().into());
        fields.push(self.reference.value().unwrap_or_default());
        fields.push(clip(&self.message, MESSAGE_MAX_CHARS));
        fields.push("EPD".into());

        let spc = fields.join("\n");
        if spc.chars().count() > SPC_MAX_CHARS {
            return Err(BelegError::RenderFailed(format!(
                "payment data exceeds {SPC_MAX_CHARS} characters"
            )));
        }
        Ok(spc)
    }
}

/// Assembles a [`QrBillPayload`] from an invoice, its client and the
/// resolved creditor account.
pub struct QrPayloadBuilder<'a> {
    invoice: &'a Invoice,
    client: &'a Client,
    creditor: &'a CreditorAccount,
    reference: Option<PaymentReference>,
}

impl<'a> QrPayloadBuilder<'a> {
    pub fn new(invoice: &'a Invoice, client: &'a Client, creditor: &'a CreditorAccount) -> Self {
        Self {
            invoice,
            client,
            creditor,
            reference: None,
        }
    }

    /// Use this reference instead of deriving one from the account type.
    /// [`build`](Self::build) refuses references the account cannot carry.
    pub fn reference(mut self, reference: PaymentReference) -> Self {
        self.reference = Some(reference);
        self
    }

    pub fn build(self) -> Result<QrBillPayload, BelegError> {
        self.build_with_rng(&mut rand::thread_rng())
    }

    /// Build, drawing the random reference digits from `rng`.
    pub fn build_with_rng<R: Rng + ?Sized>(self, rng: &mut R) -> Result<QrBillPayload, BelegError> {
        let amount = self.invoice.totals().gross;
        check_amount(amount)?;

        let debtor = debtor_party(self.client)?;

        let reference = match self.reference {
            Some(reference) => reference,
            None if self.creditor.is_qr_iban => PaymentReference::generate(self.invoice.id, rng)?,
            None => PaymentReference::None,
        };
        check_reference(self.creditor, &reference)?;

        debug!(
            invoice = %self.invoice.number,
            reference = reference.type_code(),
            has_debtor = debtor.is_some(),
            "QR-bill payload built"
        );
        Ok(QrBillPayload {
            currency: DOMAIN_CURRENCY.to_string(),
            amount,
            creditor: self.creditor.clone(),
            debtor,
            message: message(&self.invoice.number, self.invoice.additional_info()),
            reference,
        })
    }
}

/// `"Facture {number}"`, optionally `" - {additional}"`, cut to 140 characters.
///
/// Line breaks and other control characters become single spaces; the SPC
/// data set is itself line-separated.
pub fn message(invoice_number: &str, additional_info: Option<&str>) -> String {
    let full = match additional_info {
        Some(info) => format!("Facture {invoice_number} - {info}"),
        None => format!("Facture {invoice_number}"),
    };
    single_line(&full).chars().take(MESSAGE_MAX_CHARS).collect()
}

/// Replace control characters with spaces and collapse whitespace runs.
fn single_line(value: &str) -> String {
    value
        .split(|c: char| c.is_control() || c.is_whitespace())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn debtor_party(client: &Client) -> Result<Option<DebtorParty>, BelegError> {
    let name = client.company_name_or_name();
    let postal_code = client
        .postal_code
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty());
    let (Some(name), Some(postal_code)) = (name, postal_code) else {
        return Ok(None);
    };

    // Must be numeric, but is kept as written: "01000" is not "1000".
    if !postal_code.bytes().all(|b| b.is_ascii_digit()) {
        return Err(BelegError::InvalidDebtorAddress(format!(
            "postal code '{postal_code}' is not numeric"
        )));
    }

    let locality = client
        .city
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .ok_or_else(|| {
            BelegError::InvalidDebtorAddress(format!("no town for postal code '{postal_code}'"))
        })?;

    let country = match client.country.as_deref().map(str::trim) {
        None | Some("") => DEFAULT_COUNTRY,
        Some(c) => normalize_country(c).ok_or_else(|| {
            BelegError::InvalidDebtorAddress(format!("unknown country '{c}'"))
        })?,
    };

    Ok(Some(DebtorParty {
        name: name.to_string(),
        address: client
            .address
            .as_deref()
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .map(str::to_string),
        postal_code: postal_code.to_string(),
        locality: locality.to_string(),
        country: country.to_string(),
    }))
}

fn check_amount(amount: Decimal) -> Result<(), BelegError> {
    if amount <= Decimal::ZERO {
        return Err(BelegError::InvalidAmount(format!(
            "amount must be positive, got {amount}"
        )));
    }
    if amount > MAX_AMOUNT {
        return Err(BelegError::InvalidAmount(format!(
            "amount {amount} exceeds {MAX_AMOUNT}"
        )));
    }
    Ok(())
}

fn check_reference(
    creditor: &CreditorAccount,
    reference: &PaymentReference,
) -> Result<(), BelegError> {
    match (creditor.is_qr_iban, reference.is_structured()) {
        (false, true) => Err(BelegError::IncompatibleReference(
            "structured reference requires a QR-IBAN account".into(),
        )),
        (true, false) => Err(BelegError::IncompatibleReference(
            "QR-IBAN account requires a structured reference".into(),
        )),
        _ => Ok(()),
    }
}

fn clip(value: &str, max_chars: usize) -> String {
    single_line(value).chars().take(max_chars).collect()
}
