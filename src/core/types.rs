use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::BelegError;

/// Category of numbered document. Each family has its own yearly sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DocumentFamily {
    /// Invoices, displayed as `FAC-YYYY-NNNN`.
    Invoice,
    /// Contracts, displayed as `CTR-YYYY-NNNN`.
    Contract,
}

impl DocumentFamily {
    /// Display prefix of the family.
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Invoice => "FAC",
            Self::Contract => "CTR",
        }
    }

    /// Parse from a display prefix.
    pub fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix {
            "FAC" => Some(Self::Invoice),
            "CTR" => Some(Self::Contract),
            _ => None,
        }
    }
}

impl fmt::Display for DocumentFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// One independent numbering sequence: a family within a calendar year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SequenceKey {
    pub family: DocumentFamily,
    pub year: i32,
}

impl SequenceKey {
    pub fn new(family: DocumentFamily, year: i32) -> Self {
        Self { family, year }
    }

    /// Display-number prefix shared by every member of this sequence,
    /// e.g. `"FAC-2025-"`.
    pub fn display_prefix(&self) -> String {
        format!("{}-{:04}-", self.family.prefix(), self.year)
    }

    /// SQL `LIKE` pattern matching every display number of this sequence.
    pub fn like_pattern(&self) -> String {
        format!("{}%", self.display_prefix())
    }
}

impl fmt::Display for SequenceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.family.prefix(), self.year)
    }
}

/// Canonical document number: family, four-digit year and sequence.
///
/// Displayed as `{prefix}-{year}-{sequence:04}`. Sequences above 9999 are
/// representable and display wider than four digits, but such numbers no
/// longer parse back (the display pattern is fixed-width).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocumentNumber {
    pub family: DocumentFamily,
    pub year: i32,
    pub sequence: u32,
}

impl DocumentNumber {
    pub fn new(family: DocumentFamily, year: i32, sequence: u32) -> Self {
        Self {
            family,
            year,
            sequence,
        }
    }

    /// The sequence this number belongs to.
    pub fn key(&self) -> SequenceKey {
        SequenceKey::new(self.family, self.year)
    }

    /// Render the display form, e.g. `"FAC-2025-0001"`.
    pub fn display(&self) -> String {
        self.to_string()
    }

    /// Parse a display number matching `^(FAC|CTR)-\d{4}-\d{4}$`.
    ///
    /// ```
    /// use kontor::core::*;
    ///
    /// let n = DocumentNumber::parse("FAC-2025-0042").unwrap();
    /// assert_eq!(n.family, DocumentFamily::Invoice);
    /// assert_eq!(n.year, 2025);
    /// assert_eq!(n.sequence, 42);
    /// assert!(DocumentNumber::parse("FAC-25-0042").is_err());
    /// ```
    pub fn parse(input: &str) -> Result<Self, BelegError> {
        let malformed = || BelegError::MalformedDocumentNumber(input.to_string());

        let mut parts = input.split('-');
        let (Some(prefix), Some(year), Some(seq), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(malformed());
        };

        let family = DocumentFamily::from_prefix(prefix).ok_or_else(malformed)?;
        if !is_four_digits(year) || !is_four_digits(seq) {
            return Err(malformed());
        }

        let sequence: u32 = seq.parse().map_err(|_| malformed())?;
        if sequence == 0 {
            return Err(malformed());
        }

        Ok(Self {
            family,
            year: year.parse().map_err(|_| malformed())?,
            sequence,
        })
    }
}

fn is_four_digits(s: &str) -> bool {
    s.len() == 4 && s.bytes().all(|b| b.is_ascii_digit())
}

impl fmt::Display for DocumentNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{:04}-{:04}",
            self.family.prefix(),
            self.year,
            self.sequence
        )
    }
}

impl FromStr for DocumentNumber {
    type Err = BelegError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Category of stored binary artifact; doubles as the top-level storage directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArtifactKind {
    Contracts,
    Invoices,
    QrBills,
    Receipts,
}

impl ArtifactKind {
    /// Directory name under the storage root.
    pub fn dir_name(&self) -> &'static str {
        match self {
            Self::Contracts => "contracts",
            Self::Invoices => "invoices",
            Self::QrBills => "qr-bills",
            Self::Receipts => "receipts",
        }
    }

    /// Parse from a directory name.
    pub fn from_dir_name(name: &str) -> Option<Self> {
        match name {
            "contracts" => Some(Self::Contracts),
            "invoices" => Some(Self::Invoices),
            "qr-bills" => Some(Self::QrBills),
            "receipts" => Some(Self::Receipts),
            _ => None,
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_zero_pads() {
        let n = DocumentNumber::new(DocumentFamily::Invoice, 2025, 1);
        assert_eq!(n.display(), "FAC-2025-0001");
        let n = DocumentNumber::new(DocumentFamily::Contract, 2025, 9999);
        assert_eq!(n.display(), "CTR-2025-9999");
    }

    #[test]
    fn display_does_not_clamp_large_sequences() {
        let n = DocumentNumber::new(DocumentFamily::Invoice, 2025, 10_000);
        assert_eq!(n.display(), "FAC-2025-10000");
        assert!(DocumentNumber::parse(&n.display()).is_err());
    }

    #[test]
    fn parse_rejects_bad_shapes() {
        for bad in [
            "",
            "FAC",
            "FAC-2025",
            "FAC-2025-001",
            "FAC-2025-00001",
            "INV-2025-0001",
            "fac-2025-0001",
            "FAC-2025-0001-1",
            "FAC-20a5-0001",
            "FAC-2025-+001",
            "FAC-2025-0000",
            " FAC-2025-0001",
        ] {
            assert!(
                matches!(
                    DocumentNumber::parse(bad),
                    Err(BelegError::MalformedDocumentNumber(_))
                ),
                "{bad:?} should not parse"
            );
        }
    }

    #[test]
    fn from_str_matches_parse() {
        let n: DocumentNumber = "CTR-2024-0310".parse().unwrap();
        assert_eq!(n, DocumentNumber::new(DocumentFamily::Contract, 2024, 310));
    }

    #[test]
    fn sequence_key_patterns() {
        let key = SequenceKey::new(DocumentFamily::Contract, 2025);
        assert_eq!(key.display_prefix(), "CTR-2025-");
        assert_eq!(key.like_pattern(), "CTR-2025-%");
        assert_eq!(key.to_string(), "CTR/2025");
    }

    #[test]
    fn artifact_kind_dir_names() {
        for kind in [
            ArtifactKind::Contracts,
            ArtifactKind::Invoices,
            ArtifactKind::QrBills,
            ArtifactKind::Receipts,
        ] {
            assert_eq!(ArtifactKind::from_dir_name(kind.dir_name()), Some(kind));
        }
        assert_eq!(ArtifactKind::QrBills.to_string(), "qr-bills");
        assert_eq!(ArtifactKind::from_dir_name("qr_bills"), None);
    }
}
