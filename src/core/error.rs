use thiserror::Error;

/// Errors raised while numbering, encoding, rendering or storing a document.
///
/// Every variant is terminal for the current generation request; nothing in
/// this crate retries on its own. See [`BelegError::is_retryable`].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BelegError {
    /// Malformed input to a pure function (e.g. non-digit checksum input).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The persistence collaborator could not hand out a sequence number.
    #[error("number allocation failed: {0}")]
    AllocationFailed(String),

    /// A display number did not match `PREFIX-YYYY-NNNN`.
    #[error("malformed document number: {0}")]
    MalformedDocumentNumber(String),

    /// Agency billing settings lack a mandatory creditor field.
    #[error("incomplete creditor settings: {0}")]
    IncompleteCreditorSettings(String),

    /// Neither a QR-IBAN nor an IBAN is configured.
    #[error("no creditor account configured")]
    NoAccountConfigured,

    /// The debtor address cannot be encoded.
    #[error("invalid debtor address: {0}")]
    InvalidDebtorAddress(String),

    /// The payable amount is zero, negative or out of range.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// A structured reference was offered for a conventional IBAN account.
    #[error("incompatible payment reference: {0}")]
    IncompatibleReference(String),

    /// PDF or QR rendering failed.
    #[error("render failed: {0}")]
    RenderFailed(String),

    /// The storage backend is unreachable or answered with a server error.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// The backend refused the artifact because of its size.
    #[error("artifact too large: {0}")]
    ArtifactTooLarge(String),

    /// A referenced invoice, client or document does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A read or update against the persistence collaborator failed.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Configuration could not be loaded or is inconsistent.
    #[error("configuration error: {0}")]
    Config(String),
}

impl BelegError {
    /// Whether an external caller may reasonably retry with backoff.
    ///
    /// Only storage outages qualify; everything else is a data or
    /// programming error that a retry would reproduce.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StorageUnavailable(_))
    }
}
