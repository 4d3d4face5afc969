//! Seams to the persistence collaborator.
//!
//! The relational schema lives outside this crate. [`DocumentRepository`]
//! covers numbering and artifact bookkeeping, [`BillingDirectory`] the read
//! accessors for invoices, clients and agency settings. [`MemoryRepository`]
//! implements both for tests and single-process deployments.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::billing::{AgencySettings, Client, Invoice};
use super::error::BelegError;
use super::types::{ArtifactKind, DocumentNumber, SequenceKey};

/// Computes the next number of a sequence from its current maximum display
/// number (`None` when the sequence is empty).
pub type NextNumber = Box<dyn FnOnce(Option<&str>) -> DocumentNumber + Send>;

/// A numbered document row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: i64,
    pub number: DocumentNumber,
    /// Storage handle of each artifact generated for this document.
    pub artifacts: BTreeMap<ArtifactKind, String>,
}

impl DocumentRecord {
    pub fn artifact_path(&self, kind: ArtifactKind) -> Option<&str> {
        self.artifacts.get(&kind).map(String::as_str)
    }
}

/// Numbering and artifact bookkeeping against the persistence layer.
#[async_trait]
pub trait DocumentRepository: Send + Sync {
    /// Lexicographically highest display number starting with the key's
    /// prefix (`FAC-2025-%`), if any.
    async fn find_max_document_number(&self, key: SequenceKey)
    -> Result<Option<String>, BelegError>;

    /// Read the maximum, compute the next number with `next`, and insert the
    /// new document row, all as one isolated step.
    ///
    /// Implementations must be linearizable per key: two concurrent calls for
    /// the same key never observe the same maximum. Failures surface as
    /// [`BelegError::AllocationFailed`].
    async fn create_numbered_document(
        &self,
        key: SequenceKey,
        next: NextNumber,
    ) -> Result<DocumentRecord, BelegError>;

    async fn document(&self, id: i64) -> Result<Option<DocumentRecord>, BelegError>;

    /// Record the storage handle of a freshly stored artifact.
    async fn update_artifact_path(
        &self,
        id: i64,
        kind: ArtifactKind,
        path: &str,
    ) -> Result<(), BelegError>;
}

/// Read accessors for the billing data the generators consume.
#[async_trait]
pub trait BillingDirectory: Send + Sync {
    async fn invoice(&self, id: i64) -> Result<Option<Invoice>, BelegError>;

    async fn client(&self, id: i64) -> Result<Option<Client>, BelegError>;

    async fn agency_settings(&self) -> Result<AgencySettings, BelegError>;
}

#[derive(Default)]
struct MemoryState {
    available: bool,
    next_id: i64,
    documents: BTreeMap<i64, DocumentRecord>,
    invoices: HashMap<i64, Invoice>,
    clients: HashMap<i64, Client>,
    settings: AgencySettings,
}

/// In-process repository guarded by a single mutex.
///
/// Allocation reads the maximum and inserts under the same lock, which makes
/// it linearizable across tasks of one process.
pub struct MemoryRepository {
    state: Mutex<MemoryState>,
}

impl Default for MemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState {
                available: true,
                next_id: 1,
                ..Default::default()
            }),
        }
    }

    /// Simulate an outage: every subsequent call fails until re-enabled.
    pub fn set_available(&self, available: bool) {
        if let Ok(mut state) = self.state.lock() {
            state.available = available;
        }
    }

    /// Insert a document with a given number, bypassing allocation
    /// (imports, fixtures). Returns its id.
    pub fn insert_document(&self, number: DocumentNumber) -> Result<i64, BelegError> {
        let mut state = self.lock()?;
        Ok(insert_record(&mut state, number))
    }

    /// Store an invoice; it also becomes a document under the same id.
    pub fn insert_invoice(&self, invoice: Invoice) -> Result<(), BelegError> {
        let number = DocumentNumber::parse(&invoice.number)?;
        let mut state = self.lock()?;
        state.next_id = state.next_id.max(invoice.id + 1);
        state
            .documents
            .entry(invoice.id)
            .or_insert_with(|| DocumentRecord {
                id: invoice.id,
                number,
                artifacts: BTreeMap::new(),
            });
        state.invoices.insert(invoice.id, invoice);
        Ok(())
    }

    pub fn insert_client(&self, client: Client) -> Result<(), BelegError> {
        self.lock()?.clients.insert(client.id, client);
        Ok(())
    }

    pub fn set_agency_settings(&self, settings: AgencySettings) -> Result<(), BelegError> {
        self.lock()?.settings = settings;
        Ok(())
    }

    /// Display numbers of all documents, in id order.
    pub fn document_numbers(&self) -> Result<Vec<String>, BelegError> {
        Ok(self
            .lock()?
            .documents
            .values()
            .map(|d| d.number.display())
            .collect())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemoryState>, BelegError> {
        let state = self
            .state
            .lock()
            .map_err(|_| BelegError::Persistence("repository lock poisoned".into()))?;
        if !state.available {
            return Err(BelegError::Persistence("repository unavailable".into()));
        }
        Ok(state)
    }
}

fn insert_record(state: &mut MemoryState, number: DocumentNumber) -> i64 {
    let id = state.next_id;
    state.next_id += 1;
    state.documents.insert(
        id,
        DocumentRecord {
            id,
            number,
            artifacts: BTreeMap::new(),
        },
    );
    id
}

fn max_number(state: &MemoryState, key: SequenceKey) -> Option<String> {
    let prefix = key.display_prefix();
    state
        .documents
        .values()
        .map(|d| d.number.display())
        .filter(|n| n.starts_with(&prefix))
        .max()
}

#[async_trait]
impl DocumentRepository for MemoryRepository {
    async fn find_max_document_number(
        &self,
        key: SequenceKey,
    ) -> Result<Option<String>, BelegError> {
        let state = self.lock()?;
        Ok(max_number(&state, key))
    }

    async fn create_numbered_document(
        &self,
        key: SequenceKey,
        next: NextNumber,
    ) -> Result<DocumentRecord, BelegError> {
        let mut state = self
            .lock()
            .map_err(|e| BelegError::AllocationFailed(e.to_string()))?;
        let max = max_number(&state, key);
        let number = next(max.as_deref());

        let number_display = number.display();
        if state
            .documents
            .values()
            .any(|d| d.number.display() == number_display)
        {
            return Err(BelegError::AllocationFailed(format!(
                "document number {number_display} already exists"
            )));
        }

        let id = insert_record(&mut state, number);
        debug!(id, number = %number_display, "inserted numbered document");
        Ok(state.documents[&id].clone())
    }

    async fn document(&self, id: i64) -> Result<Option<DocumentRecord>, BelegError> {
        Ok(self.lock()?.documents.get(&id).cloned())
    }

    async fn update_artifact_path(
        &self,
        id: i64,
        kind: ArtifactKind,
        path: &str,
    ) -> Result<(), BelegError> {
        let mut state = self.lock()?;
        let record = state
            .documents
            .get_mut(&id)
            .ok_or_else(|| BelegError::NotFound(format!("document {id}")))?;
        record.artifacts.insert(kind, path.to_string());
        Ok(())
    }
}

#[async_trait]
impl BillingDirectory for MemoryRepository {
    async fn invoice(&self, id: i64) -> Result<Option<Invoice>, BelegError> {
        Ok(self.lock()?.invoices.get(&id).cloned())
    }

    async fn client(&self, id: i64) -> Result<Option<Client>, BelegError> {
        Ok(self.lock()?.clients.get(&id).cloned())
    }

    async fn agency_settings(&self) -> Result<AgencySettings, BelegError> {
        Ok(self.lock()?.settings.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::DocumentFamily;

    #[tokio::test]
    async fn max_is_scoped_to_key() {
        let repo = MemoryRepository::new();
        repo.insert_document(DocumentNumber::new(DocumentFamily::Invoice, 2025, 3))
            .unwrap();
        repo.insert_document(DocumentNumber::new(DocumentFamily::Invoice, 2024, 9))
            .unwrap();
        repo.insert_document(DocumentNumber::new(DocumentFamily::Contract, 2025, 7))
            .unwrap();

        let max = repo
            .find_max_document_number(SequenceKey::new(DocumentFamily::Invoice, 2025))
            .await
            .unwrap();
        assert_eq!(max.as_deref(), Some("FAC-2025-0003"));

        let none = repo
            .find_max_document_number(SequenceKey::new(DocumentFamily::Contract, 2023))
            .await
            .unwrap();
        assert!(none.is_none());
    }

    #[tokio::test]
    async fn duplicate_number_is_refused() {
        let repo = MemoryRepository::new();
        repo.insert_document(DocumentNumber::new(DocumentFamily::Invoice, 2025, 1))
            .unwrap();
        let key = SequenceKey::new(DocumentFamily::Invoice, 2025);
        let err = repo
            .create_numbered_document(
                key,
                Box::new(|_: Option<&str>| DocumentNumber::new(DocumentFamily::Invoice, 2025, 1)),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, BelegError::AllocationFailed(_)));
    }

    #[tokio::test]
    async fn artifact_paths_are_recorded() {
        let repo = MemoryRepository::new();
        let id = repo
            .insert_document(DocumentNumber::new(DocumentFamily::Contract, 2025, 1))
            .unwrap();
        repo.update_artifact_path(id, ArtifactKind::Contracts, "contracts/2025/CTR-2025-0001.pdf")
            .await
            .unwrap();
        let doc = repo.document(id).await.unwrap().unwrap();
        assert_eq!(
            doc.artifact_path(ArtifactKind::Contracts),
            Some("contracts/2025/CTR-2025-0001.pdf")
        );

        let err = repo
            .update_artifact_path(999, ArtifactKind::Contracts, "x")
            .await
            .unwrap_err();
        assert!(matches!(err, BelegError::NotFound(_)));
    }

    #[tokio::test]
    async fn outage_surfaces_as_errors() {
        let repo = MemoryRepository::new();
        repo.set_available(false);
        let key = SequenceKey::new(DocumentFamily::Invoice, 2025);
        assert!(matches!(
            repo.create_numbered_document(
                key,
                Box::new(|_: Option<&str>| DocumentNumber::new(DocumentFamily::Invoice, 2025, 1))
            )
            .await,
            Err(BelegError::AllocationFailed(_))
        ));
        assert!(matches!(
            repo.agency_settings().await,
            Err(BelegError::Persistence(_))
        ));
    }
}
