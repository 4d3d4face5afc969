use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::{AgencySettings, BelegError, DEFAULT_COUNTRY, normalize_country};

/// The payee of a QR-bill, resolved from the agency billing settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditorAccount {
    pub name: String,
    pub street: String,
    pub postal_code: String,
    pub city: String,
    /// ISO 3166-1 alpha-2.
    pub country: String,
    /// Active account number, whitespace removed.
    pub account: String,
    /// True only for a dedicated QR-IBAN distinct from the everyday IBAN.
    pub is_qr_iban: bool,
}

/// Resolve the creditor account from the agency settings.
///
/// A QR-IBAN is used only when both `qr_iban` and `iban` are configured and
/// differ once whitespace is removed. Otherwise the conventional IBAN (or
/// whichever of the two is present) becomes the active account and
/// `is_qr_iban` is false.
///
/// ```
/// use kontor::core::AgencySettings;
/// use kontor::qrbill::resolve_creditor;
///
/// let settings = AgencySettings {
///     company_name: Some("Agence Lumen Sàrl".into()),
///     represented_by: Some("Claire Rochat".into()),
///     street: Some("Rue du Marché 8".into()),
///     postal_code: Some("1204".into()),
///     city: Some("Genève".into()),
///     iban: Some("CH93 0076 2011 6238 5295 7".into()),
///     ..Default::default()
/// };
/// let creditor = resolve_creditor(&settings).unwrap();
/// assert!(!creditor.is_qr_iban);
/// assert_eq!(creditor.account, "CH9300762011623852957");
/// ```
pub fn resolve_creditor(settings: &AgencySettings) -> Result<CreditorAccount, BelegError> {
    let street = required(&settings.street, "street address")?;
    let postal_code = required(&settings.postal_code, "postal code")?;
    let city = required(&settings.city, "city")?;
    let represented_by = required(&settings.represented_by, "represented-by name")?;

    let qr_iban = compact(&settings.qr_iban);
    let iban = compact(&settings.iban);

    let (account, is_qr_iban) = match (qr_iban, iban) {
        (Some(qr), Some(iban)) if qr != iban => (qr, true),
        (_, Some(iban)) => (iban, false),
        (Some(qr), None) => (qr, false),
        (None, None) => return Err(BelegError::NoAccountConfigured),
    };

    let country = match settings.country.as_deref() {
        None => DEFAULT_COUNTRY,
        Some(c) if c.trim().is_empty() => DEFAULT_COUNTRY,
        Some(c) => normalize_country(c).ok_or_else(|| {
            BelegError::IncompleteCreditorSettings(format!("unknown country '{c}'"))
        })?,
    };

    let name = settings
        .company_name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .unwrap_or(represented_by);

    debug!(is_qr_iban, "creditor account resolved");
    Ok(CreditorAccount {
        name: name.to_string(),
        street: street.to_string(),
        postal_code: postal_code.to_string(),
        city: city.to_string(),
        country: country.to_string(),
        account,
        is_qr_iban,
    })
}

fn required<'a>(value: &'a Option<String>, field: &str) -> Result<&'a str, BelegError> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| BelegError::IncompleteCreditorSettings(format!("{field} is missing")))
}

/// Strip all whitespace and uppercase; blank values count as absent.
fn compact(value: &Option<String>) -> Option<String> {
    let compacted: String = value
        .as_deref()?
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_uppercase();
    (!compacted.is_empty()).then_some(compacted)
}

/// Format an account number in blocks of four for printing.
pub fn format_iban(account: &str) -> String {
    account
        .chars()
        .collect::<Vec<_>>()
        .chunks(4)
        .map(|chunk| chunk.iter().collect::<String>())
        .collect::<Vec<_>>()
        .join(" ")
}
