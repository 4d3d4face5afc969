use std::sync::Arc;

use chrono::{Datelike, NaiveDate, Utc};
use tracing::{debug, info, warn};

use super::error::BelegError;
use super::repository::{DocumentRecord, DocumentRepository};
use super::types::{DocumentFamily, DocumentNumber, SequenceKey};

/// Allocates document numbers per family and calendar year.
///
/// Numbers are derived from the highest existing display number of the
/// sequence; there is no separately stored counter. The read, the increment
/// and the insert of the new row happen inside
/// [`DocumentRepository::create_numbered_document`], so concurrent callers
/// never receive the same number.
///
/// Numbers of aborted generations are not rolled back: the sequence is
/// unique and strictly increasing, but may contain gaps.
#[derive(Clone)]
pub struct SequenceAllocator {
    repository: Arc<dyn DocumentRepository>,
}

impl SequenceAllocator {
    pub fn new(repository: Arc<dyn DocumentRepository>) -> Self {
        Self { repository }
    }

    /// Allocate the next number of `(family, year)` and create its document row.
    pub async fn allocate(
        &self,
        family: DocumentFamily,
        year: i32,
    ) -> Result<DocumentRecord, BelegError> {
        let key = SequenceKey::new(family, year);
        debug!(%key, "allocating document number");

        let record = self
            .repository
            .create_numbered_document(key, Box::new(move |max: Option<&str>| next_number(key, max)))
            .await
            .map_err(|e| match e {
                BelegError::AllocationFailed(_) => e,
                other => BelegError::AllocationFailed(other.to_string()),
            })?;

        info!(id = record.id, number = %record.number, "document number committed");
        Ok(record)
    }

    /// Allocate in the year of `date`.
    pub async fn allocate_for_date(
        &self,
        family: DocumentFamily,
        date: NaiveDate,
    ) -> Result<DocumentRecord, BelegError> {
        self.allocate(family, date.year()).await
    }

    /// Allocate in the current (UTC) calendar year.
    pub async fn allocate_current(
        &self,
        family: DocumentFamily,
    ) -> Result<DocumentRecord, BelegError> {
        self.allocate(family, Utc::now().year()).await
    }

    /// Preview the number the next allocation would receive, without
    /// consuming it. Racy by nature; never use the result as an identity.
    pub async fn peek(&self, family: DocumentFamily, year: i32) -> Result<DocumentNumber, BelegError> {
        let key = SequenceKey::new(family, year);
        let max = self
            .repository
            .find_max_document_number(key)
            .await
            .map_err(|e| BelegError::AllocationFailed(e.to_string()))?;
        Ok(next_number(key, max.as_deref()))
    }
}

/// Next number of a sequence given its current maximum display number.
///
/// An empty sequence starts at 1. A maximum that does not parse as a number
/// of the same sequence also restarts at 1.
pub fn next_number(key: SequenceKey, max: Option<&str>) -> DocumentNumber {
    let sequence = match max {
        None => 1,
        Some(max_display) => match DocumentNumber::parse(max_display) {
            Ok(current) if current.key() == key => current.sequence + 1,
            _ => {
                warn!(%key, max = max_display, "malformed maximum document number, restarting sequence at 1");
                1
            }
        },
    };
    DocumentNumber::new(key.family, key.year, sequence)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::MemoryRepository;

    fn allocator() -> (Arc<MemoryRepository>, SequenceAllocator) {
        let repo = Arc::new(MemoryRepository::new());
        (repo.clone(), SequenceAllocator::new(repo))
    }

    #[test]
    fn next_number_starts_at_one() {
        let key = SequenceKey::new(DocumentFamily::Invoice, 2025);
        assert_eq!(next_number(key, None).display(), "FAC-2025-0001");
    }

    #[test]
    fn next_number_increments() {
        let key = SequenceKey::new(DocumentFamily::Invoice, 2025);
        assert_eq!(
            next_number(key, Some("FAC-2025-0041")).display(),
            "FAC-2025-0042"
        );
    }

    #[test]
    fn next_number_restarts_on_malformed_max() {
        let key = SequenceKey::new(DocumentFamily::Contract, 2025);
        assert_eq!(next_number(key, Some("CTR-2025-12a")).sequence, 1);
        assert_eq!(next_number(key, Some("garbage")).sequence, 1);
        // A maximum from another sequence is treated as malformed too.
        assert_eq!(next_number(key, Some("CTR-2024-0007")).sequence, 1);
    }

    #[tokio::test]
    async fn sequential_allocation() {
        let (_, alloc) = allocator();
        let a = alloc.allocate(DocumentFamily::Contract, 2025).await.unwrap();
        let b = alloc.allocate(DocumentFamily::Contract, 2025).await.unwrap();
        assert_eq!(a.number.display(), "CTR-2025-0001");
        assert_eq!(b.number.display(), "CTR-2025-0002");
        assert_ne!(a.id, b.id);
    }

    #[tokio::test]
    async fn families_and_years_are_independent() {
        let (_, alloc) = allocator();
        alloc.allocate(DocumentFamily::Invoice, 2025).await.unwrap();
        alloc.allocate(DocumentFamily::Invoice, 2025).await.unwrap();
        let contract = alloc.allocate(DocumentFamily::Contract, 2025).await.unwrap();
        let next_year = alloc.allocate(DocumentFamily::Invoice, 2026).await.unwrap();
        assert_eq!(contract.number.display(), "CTR-2025-0001");
        assert_eq!(next_year.number.display(), "FAC-2026-0001");
    }

    #[tokio::test]
    async fn continues_after_imported_numbers() {
        let (repo, alloc) = allocator();
        repo.insert_document(DocumentNumber::new(DocumentFamily::Invoice, 2025, 17))
            .unwrap();
        let n = alloc.allocate(DocumentFamily::Invoice, 2025).await.unwrap();
        assert_eq!(n.number.sequence, 18);
    }

    #[tokio::test]
    async fn peek_does_not_consume() {
        let (_, alloc) = allocator();
        let preview = alloc.peek(DocumentFamily::Invoice, 2025).await.unwrap();
        assert_eq!(preview.display(), "FAC-2025-0001");
        let preview = alloc.peek(DocumentFamily::Invoice, 2025).await.unwrap();
        assert_eq!(preview.display(), "FAC-2025-0001");
        let n = alloc.allocate(DocumentFamily::Invoice, 2025).await.unwrap();
        assert_eq!(n.number, preview);
    }

    #[tokio::test]
    async fn outage_is_allocation_failure() {
        let (repo, alloc) = allocator();
        repo.set_available(false);
        let err = alloc.allocate(DocumentFamily::Invoice, 2025).await.unwrap_err();
        assert!(matches!(err, BelegError::AllocationFailed(_)));
        let err = alloc.peek(DocumentFamily::Invoice, 2025).await.unwrap_err();
        assert!(matches!(err, BelegError::AllocationFailed(_)));
    }

    #[tokio::test]
    async fn allocate_for_date_uses_year() {
        let (_, alloc) = allocator();
        let n = alloc
            .allocate_for_date(
                DocumentFamily::Invoice,
                NaiveDate::from_ymd_opt(2031, 12, 31).unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(n.number.display(), "FAC-2031-0001");
    }
}
