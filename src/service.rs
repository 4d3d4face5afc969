//! Document generation façade.
//!
//! [`DocumentService`] wires numbering, QR-bill generation and artifact
//! storage together and is the surface an HTTP layer calls into. Every
//! persistence and storage call runs under the configured deadline, and
//! regenerations of the same logical artifact are serialized.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::config::KontorConfig;
use crate::core::{
    AgencySettings, ArtifactKind, BelegError, BillingDirectory, Client, DEFAULT_SETTINGS_TTL,
    DEFAULT_VAT_RATE, DocumentFamily, DocumentNumber, DocumentRecord, DocumentRepository, Invoice,
    InvoiceBuilder, SequenceAllocator, SettingsCache,
};
use crate::pdf::render_invoice_pdf;
use crate::qrbill::{QrBillPayload, QrPayloadBuilder, qr_bill_page, render_qr_bill, resolve_creditor};
use crate::storage::{ArtifactStore, DownloadHandle, backend_from_config};

/// Bytes of a freshly generated artifact and where they were stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedArtifact {
    pub bytes: Vec<u8>,
    pub artifact_path: String,
}

/// Tunables of a [`DocumentService`].
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceOptions {
    pub request_timeout: Duration,
    pub settings_ttl: Duration,
    /// VAT rate for invoices started with [`DocumentService::invoice_builder`].
    pub vat_rate: Decimal,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            settings_ttl: DEFAULT_SETTINGS_TTL,
            vat_rate: DEFAULT_VAT_RATE,
        }
    }
}

impl From<&KontorConfig> for ServiceOptions {
    fn from(config: &KontorConfig) -> Self {
        Self {
            request_timeout: config.request_timeout(),
            settings_ttl: config.billing.settings_cache_ttl(),
            vat_rate: config.billing.vat_rate,
        }
    }
}

pub struct DocumentService {
    allocator: SequenceAllocator,
    repository: Arc<dyn DocumentRepository>,
    directory: Arc<dyn BillingDirectory>,
    settings: SettingsCache,
    store: ArtifactStore,
    options: ServiceOptions,
    regeneration_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl DocumentService {
    pub fn new(
        repository: Arc<dyn DocumentRepository>,
        directory: Arc<dyn BillingDirectory>,
        store: ArtifactStore,
        options: ServiceOptions,
    ) -> Self {
        Self {
            allocator: SequenceAllocator::new(repository.clone()),
            settings: SettingsCache::new(directory.clone(), options.settings_ttl),
            repository,
            directory,
            store,
            options,
            regeneration_locks: DashMap::new(),
        }
    }

    /// Build the service from configuration. The storage backend is chosen
    /// here, once.
    pub fn from_config(
        config: &KontorConfig,
        repository: Arc<dyn DocumentRepository>,
        directory: Arc<dyn BillingDirectory>,
    ) -> Result<Self, BelegError> {
        config.validate()?;
        let backend = backend_from_config(&config.storage, config.request_timeout())?;
        info!(backend = backend.name(), "storage backend selected");
        Ok(Self::new(
            repository,
            directory,
            ArtifactStore::new(backend),
            ServiceOptions::from(config),
        ))
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Start an invoice with the configured VAT rate.
    pub fn invoice_builder(&self, id: i64, number: impl Into<String>, issue_date: NaiveDate) -> InvoiceBuilder {
        InvoiceBuilder::new(id, number, issue_date).vat_rate(self.options.vat_rate)
    }

    /// Allocate a number of `family` in the current year.
    ///
    /// Not idempotent: every call consumes a number.
    pub async fn generate_document_number(&self, family: DocumentFamily) -> Result<DocumentNumber, BelegError> {
        let record = self
            .with_deadline(
                "number allocation",
                BelegError::AllocationFailed,
                self.allocator.allocate_current(family),
            )
            .await?;
        Ok(record.number)
    }

    /// Allocate a number of `family` in `year` and return the created document.
    pub async fn generate_document(&self, family: DocumentFamily, year: i32) -> Result<DocumentRecord, BelegError> {
        self.with_deadline(
            "number allocation",
            BelegError::AllocationFailed,
            self.allocator.allocate(family, year),
        )
        .await
    }

    /// Build, render and store the QR-bill of an invoice.
    ///
    /// The document's artifact path is only updated after the store succeeded.
    pub async fn generate_qr_bill(&self, invoice_id: i64) -> Result<GeneratedArtifact, BelegError> {
        let (invoice, client, settings) = self.load_invoice(invoice_id).await?;
        let payload = build_payload(&invoice, &client, &settings)?;
        let bytes = render_qr_bill(&payload)?;

        let number = invoice_number(&invoice)?;
        let logical_name = format!("QR-{}", invoice.number);
        let artifact_path = self
            .store_artifact(invoice_id, ArtifactKind::QrBills, number.year, &logical_name, &bytes)
            .await?;
        Ok(GeneratedArtifact { bytes, artifact_path })
    }

    /// Render and store the invoice PDF, with the QR-bill page appended when
    /// the agency settings allow one.
    pub async fn generate_invoice_pdf(&self, invoice_id: i64) -> Result<GeneratedArtifact, BelegError> {
        let (invoice, client, settings) = self.load_invoice(invoice_id).await?;

        let mut trailing = Vec::new();
        match build_payload(&invoice, &client, &settings) {
            Ok(payload) => trailing.push(qr_bill_page(&payload)?),
            Err(
                e @ (BelegError::IncompleteCreditorSettings(_)
                | BelegError::NoAccountConfigured
                | BelegError::InvalidAmount(_)),
            ) => {
                warn!(invoice = %invoice.number, error = %e, "invoice rendered without QR-bill");
            }
            Err(e) => return Err(e),
        }
        let bytes = render_invoice_pdf(&invoice, &client, &settings, trailing)?;

        let number = invoice_number(&invoice)?;
        let artifact_path = self
            .store_artifact(invoice_id, ArtifactKind::Invoices, number.year, &invoice.number, &bytes)
            .await?;
        Ok(GeneratedArtifact { bytes, artifact_path })
    }

    /// Direct path or signed URL of a stored artifact.
    pub async fn download_artifact(&self, path: &str) -> Result<DownloadHandle, BelegError> {
        self.with_deadline(
            "download resolution",
            BelegError::StorageUnavailable,
            self.store.resolve_download(path),
        )
        .await
    }

    /// Called by the settings-update path.
    pub async fn invalidate_settings(&self) {
        self.settings.invalidate().await;
    }

    async fn load_invoice(&self, invoice_id: i64) -> Result<(Invoice, Client, AgencySettings), BelegError> {
        let invoice = self
            .with_deadline("invoice lookup", BelegError::Persistence, self.directory.invoice(invoice_id))
            .await?
            .ok_or_else(|| BelegError::NotFound(format!("invoice {invoice_id}")))?;
        let client = self
            .with_deadline(
                "client lookup",
                BelegError::Persistence,
                self.directory.client(invoice.client_id),
            )
            .await?
            .ok_or_else(|| BelegError::NotFound(format!("client {}", invoice.client_id)))?;
        let settings = self
            .with_deadline("settings lookup", BelegError::Persistence, self.settings.get())
            .await?;
        Ok((invoice, client, settings))
    }

    /// Save under the regeneration lock of the logical name, then record the path.
    async fn store_artifact(
        &self,
        document_id: i64,
        kind: ArtifactKind,
        year: i32,
        logical_name: &str,
        bytes: &[u8],
    ) -> Result<String, BelegError> {
        let lock_key = format!("{}/{logical_name}", kind.dir_name());
        let lock = self
            .regeneration_locks
            .entry(lock_key.clone())
            .or_default()
            .clone();

        let result = {
            let _guard = lock.lock().await;
            self.save_and_record(document_id, kind, year, logical_name, bytes)
                .await
        };

        drop(lock);
        self.regeneration_locks
            .remove_if(&lock_key, |_, l| Arc::strong_count(l) == 1);
        result
    }

    async fn save_and_record(
        &self,
        document_id: i64,
        kind: ArtifactKind,
        year: i32,
        logical_name: &str,
        bytes: &[u8],
    ) -> Result<String, BelegError> {
        let record = self
            .with_deadline(
                "document lookup",
                BelegError::Persistence,
                self.repository.document(document_id),
            )
            .await?
            .ok_or_else(|| BelegError::NotFound(format!("document {document_id}")))?;
        let previous = record.artifact_path(kind);

        let path = self
            .with_deadline(
                "artifact save",
                BelegError::StorageUnavailable,
                self.store.save(kind, year, logical_name, bytes, previous),
            )
            .await?;

        self.with_deadline(
            "artifact path update",
            BelegError::Persistence,
            self.repository.update_artifact_path(document_id, kind, &path),
        )
        .await?;
        debug!(document_id, %kind, %path, "artifact path recorded");
        Ok(path)
    }

    async fn with_deadline<T>(
        &self,
        what: &str,
        on_timeout: fn(String) -> BelegError,
        operation: impl Future<Output = Result<T, BelegError>>,
    ) -> Result<T, BelegError> {
        match tokio::time::timeout(self.options.request_timeout, operation).await {
            Ok(result) => result,
            Err(_) => {
                warn!(what, timeout = ?self.options.request_timeout, "deadline exceeded");
                Err(on_timeout(format!(
                    "{what} exceeded {:?}",
                    self.options.request_timeout
                )))
            }
        }
    }
}

/// Stored invoices carry a display number; one that does not parse is a data error.
fn invoice_number(invoice: &Invoice) -> Result<DocumentNumber, BelegError> {
    DocumentNumber::parse(&invoice.number).inspect_err(|e| {
        error!(invoice_id = invoice.id, error = %e, "stored invoice number is malformed");
    })
}

fn build_payload(
    invoice: &Invoice,
    client: &Client,
    settings: &AgencySettings,
) -> Result<QrBillPayload, BelegError> {
    let creditor = resolve_creditor(settings)?;
    QrPayloadBuilder::new(invoice, client, &creditor).build()
}
