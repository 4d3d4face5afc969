use tracing::error;

use super::error::BelegError;

/// Carry-transition table of the recursive modulo-10 algorithm
/// (Swiss payment standards, ISR/QR reference check digit).
const CARRY_TABLE: [u8; 10] = [0, 9, 4, 6, 8, 2, 7, 1, 3, 5];

/// Compute the modulo-10 recursive check digit of a numeric string.
///
/// The carry starts at zero and is folded across every digit through
/// [`CARRY_TABLE`]; the check digit is `(10 - carry) % 10`.
///
/// ```
/// use kontor::core::check_digit;
///
/// assert_eq!(check_digit("21000000000313947143000901").unwrap(), 7);
/// assert!(check_digit("12a4").is_err());
/// ```
pub fn check_digit(digits: &str) -> Result<u8, BelegError> {
    let mut carry = 0u8;
    for (pos, c) in digits.chars().enumerate() {
        let Some(d) = c.to_digit(10) else {
            error!(position = pos, "non-digit character in checksum input");
            return Err(BelegError::InvalidInput(format!(
                "non-digit character '{c}' at position {pos}"
            )));
        };
        carry = CARRY_TABLE[((carry as u32 + d) % 10) as usize];
    }
    Ok((10 - carry) % 10)
}

/// Check a complete reference whose last digit is its check digit.
pub fn verify_check_digit(reference: &str) -> bool {
    let Some(last) = reference.chars().last() else {
        return false;
    };
    let body = &reference[..reference.len() - last.len_utf8()];
    match (check_digit(body), last.to_digit(10)) {
        (Ok(expected), Some(actual)) => expected as u32 == actual,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn six_reference_example() {
        assert_eq!(check_digit("21000000000313947143000901").unwrap(), 7);
        assert!(verify_check_digit("210000000003139471430009017"));
    }

    #[test]
    fn empty_input_yields_zero() {
        assert_eq!(check_digit("").unwrap(), 0);
    }

    #[test]
    fn all_zeros() {
        assert_eq!(check_digit("00000000000000000000000000").unwrap(), 0);
    }

    #[test]
    fn rejects_non_digits() {
        assert!(matches!(
            check_digit("1234 5678"),
            Err(BelegError::InvalidInput(_))
        ));
        assert!(check_digit("١٢٣").is_err());
        assert!(check_digit("-1").is_err());
    }

    #[test]
    fn verify_detects_tampering() {
        assert!(!verify_check_digit("210000000003139471430009018"));
        assert!(!verify_check_digit("210000000003139471430009107"));
        assert!(!verify_check_digit(""));
    }
}
