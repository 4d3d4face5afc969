//! Country normalization for QR-bill addresses.
//!
//! Client cards store countries as free text ("Suisse", "ch", "Deutschland");
//! the payment standard wants ISO 3166-1 alpha-2 codes.

/// Country assumed when an address carries none.
pub const DEFAULT_COUNTRY: &str = "CH";

/// Normalize a country name or code to an ISO 3166-1 alpha-2 code.
///
/// ```
/// use kontor::core::normalize_country;
///
/// assert_eq!(normalize_country("Suisse"), Some("CH"));
/// assert_eq!(normalize_country(" li "), Some("LI"));
/// assert_eq!(normalize_country("Atlantis"), None);
/// ```
pub fn normalize_country(input: &str) -> Option<&'static str> {
    let trimmed = input.trim();
    if trimmed.len() == 2 {
        let upper = trimmed.to_ascii_uppercase();
        return COUNTRY_CODES
            .binary_search(&upper.as_str())
            .ok()
            .map(|i| COUNTRY_CODES[i]);
    }
    let lower = trimmed.to_lowercase();
    COUNTRY_NAMES
        .iter()
        .find(|(name, _)| *name == lower)
        .map(|(_, code)| *code)
}

/// Check whether `code` is a known ISO 3166-1 alpha-2 country code.
pub fn is_known_country_code(code: &str) -> bool {
    COUNTRY_CODES.binary_search(&code).is_ok()
}

/// Country names seen on client cards, in the languages the agency works in.
static COUNTRY_NAMES: &[(&str, &str)] = &[
    ("suisse", "CH"),
    ("schweiz", "CH"),
    ("svizzera", "CH"),
    ("switzerland", "CH"),
    ("liechtenstein", "LI"),
    ("france", "FR"),
    ("frankreich", "FR"),
    ("allemagne", "DE"),
    ("deutschland", "DE"),
    ("germany", "DE"),
    ("italie", "IT"),
    ("italia", "IT"),
    ("italien", "IT"),
    ("italy", "IT"),
    ("autriche", "AT"),
    ("österreich", "AT"),
    ("austria", "AT"),
    ("belgique", "BE"),
    ("belgien", "BE"),
    ("belgium", "BE"),
    ("luxembourg", "LU"),
    ("luxemburg", "LU"),
    ("espagne", "ES"),
    ("spanien", "ES"),
    ("spain", "ES"),
    ("royaume-uni", "GB"),
    ("united kingdom", "GB"),
    ("états-unis", "US"),
    ("united states", "US"),
];

/// ISO 3166-1 alpha-2 codes, sorted for binary search.
static COUNTRY_CODES: &[&str] = &[
    "AD", "AE", "AF", "AG", "AI", "AL", "AM", "AO", "AQ", "AR", "AS", "AT", "AU", "AW", "AX", "AZ",
    "BA", "BB", "BD", "BE", "BF", "BG", "BH", "BI", "BJ", "BL", "BM", "BN", "BO", "BQ", "BR", "BS",
    "BT", "BV", "BW", "BY", "BZ", "CA", "CC", "CD", "CF", "CG", "CH", "CI", "CK", "CL", "CM", "CN",
    "CO", "CR", "CU", "CV", "CW", "CX", "CY", "CZ", "DE", "DJ", "DK", "DM", "DO", "DZ", "EC", "EE",
    "EG", "EH", "ER", "ES", "ET", "FI", "FJ", "FK", "FM", "FO", "FR", "GA", "GB", "GD", "GE", "GF",
    "GG", "GH", "GI", "GL", "GM", "GN", "GP", "GQ", "GR", "GS", "GT", "GU", "GW", "GY", "HK", "HM",
    "HN", "HR", "HT", "HU", "ID", "IE", "IL", "IM", "IN", "IO", "IQ", "IR", "IS", "IT", "JE", "JM",
    "JO", "JP", "KE", "KG", "KH", "KI", "KM", "KN", "KP", "KR", "KW", "KY", "KZ", "LA", "LB", "LC",
    "LI", "LK", "LR", "LS", "LT", "LU", "LV", "LY", "MA", "MC", "MD", "ME", "MF", "MG", "MH", "MK",
    "ML", "MM", "MN", "MO", "MP", "MQ", "MR", "MS", "MT", "MU", "MV", "MW", "MX", "MY", "MZ", "NA",
    "NC", "NE", "NF", "NG", "NI", "NL", "NO", "NP", "NR", "NU", "NZ", "OM", "PA", "PE", "PF", "PG",
    "PH", "PK", "PL", "PM", "PN", "PR", "PS", "PT", "PW", "PY", "QA", "RE", "RO", "RS", "RU", "RW",
    "SA", "SB", "SC", "SD", "SE", "SG", "SH", "SI", "SJ", "SK", "SL", "SM", "SN", "SO", "SR", "SS",
    "ST", "SV", "SX", "SY", "SZ", "TC", "TD", "TF", "TG", "TH", "TJ", "TK", "TL", "TM", "TN", "TO",
    "TR", "TT", "TV", "TW", "TZ", "UA", "UG", "UM", "US", "UY", "UZ", "VA", "VC", "VE", "VG", "VI",
    "VN", "VU", "WF", "WS", "YE", "YT", "ZA", "ZM", "ZW",
];
