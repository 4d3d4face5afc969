//! Artifact storage with interchangeable backends.
//!
//! [`ArtifactStore`] owns the overwrite rules for a logical artifact; the
//! [`StorageBackend`] implementations only move bytes. The backend is chosen
//! once at start-up by [`backend_from_config`] and injected.
//!
//! Layout: `{kind}/{year}/{logical_name}.pdf`, e.g.
//! `qr-bills/2025/QR-FAC-2025-0001.pdf`.

mod local;
mod object;

pub use local::LocalBackend;
pub use object::ObjectStorageBackend;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::core::{ArtifactKind, BelegError};

/// Extension of every stored artifact.
pub const ARTIFACT_EXTENSION: &str = "pdf";
/// Default validity of signed download URLs.
pub const DEFAULT_SIGNED_URL_TTL: Duration = Duration::from_secs(3600);

/// Where a caller can fetch a stored artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum DownloadHandle {
    /// Path relative to the local storage root.
    Path(String),
    /// Time-limited signed URL.
    SignedUrl {
        url: String,
        expires_at: DateTime<Utc>,
    },
}

/// A binary document under its logical name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredArtifact {
    pub kind: ArtifactKind,
    pub year: i32,
    /// Stable name under which regenerations supersede each other,
    /// e.g. `QR-FAC-2025-0001`.
    pub logical_name: String,
    pub content: Vec<u8>,
}

impl StoredArtifact {
    pub fn canonical_path(&self) -> Result<String, BelegError> {
        canonical_path(self.kind, self.year, &self.logical_name)
    }
}

/// Storage path of a logical artifact: `{kind}/{year}/{name}.pdf`.
pub fn canonical_path(kind: ArtifactKind, year: i32, logical_name: &str) -> Result<String, BelegError> {
    validate_logical_name(logical_name)?;
    Ok(format!(
        "{}/{year}/{logical_name}.{ARTIFACT_EXTENSION}",
        kind.dir_name()
    ))
}

fn validate_logical_name(name: &str) -> Result<(), BelegError> {
    let invalid = name.trim().is_empty()
        || name != name.trim()
        || name.contains(['/', '\\'])
        || name.starts_with('.')
        || name.chars().any(char::is_control);
    if invalid {
        return Err(BelegError::InvalidInput(format!(
            "invalid logical artifact name '{name}'"
        )));
    }
    Ok(())
}

/// Byte mover behind the [`ArtifactStore`].
///
/// Paths are relative, `/`-separated, as produced by [`canonical_path`].
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    /// Write `bytes` at `path`. The content at `path` is either the complete
    /// new bytes or absent; never a partial file.
    async fn write(&self, path: &str, bytes: &[u8]) -> Result<(), BelegError>;

    async fn read(&self, path: &str) -> Result<Vec<u8>, BelegError>;

    /// Delete `path`. Deleting a missing artifact succeeds.
    async fn delete(&self, path: &str) -> Result<(), BelegError>;

    async fn exists(&self, path: &str) -> Result<bool, BelegError>;

    /// File names (not paths) directly inside `dir`. A missing directory is empty.
    async fn list(&self, dir: &str) -> Result<Vec<String>, BelegError>;

    async fn download_handle(&self, path: &str) -> Result<DownloadHandle, BelegError>;
}

/// Backend selection, fixed at process start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Local filesystem under `root`; meant for development.
    Local { root: PathBuf },
    /// Hosted object storage.
    Object {
        /// Base URL of the storage API, e.g. `https://project.example.co/storage/v1`.
        endpoint: String,
        bucket: String,
        service_key: String,
        #[serde(default = "default_signed_url_ttl_secs")]
        signed_url_ttl_secs: u64,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::Local {
            root: PathBuf::from("storage"),
        }
    }
}

fn default_signed_url_ttl_secs() -> u64 {
    DEFAULT_SIGNED_URL_TTL.as_secs()
}

/// Build the configured backend.
pub fn backend_from_config(
    config: &StorageConfig,
    request_timeout: Duration,
) -> Result<Arc<dyn StorageBackend>, BelegError> {
    match config {
        StorageConfig::Local { root } => Ok(Arc::new(LocalBackend::new(root.clone()))),
        StorageConfig::Object {
            endpoint,
            bucket,
            service_key,
            signed_url_ttl_secs,
        } => Ok(Arc::new(ObjectStorageBackend::new(
            endpoint,
            bucket,
            service_key,
            Duration::from_secs(*signed_url_ttl_secs),
            request_timeout,
        )?)),
    }
}

/// Saves artifacts under deterministic paths with supersede semantics.
///
/// A save deletes every conflicting version before writing the new one, so
/// readers never see two versions under one logical name. Readers racing a
/// save may briefly see none. The store does not serialize concurrent saves
/// of the same logical name; callers must.
#[derive(Clone)]
pub struct ArtifactStore {
    backend: Arc<dyn StorageBackend>,
}

impl ArtifactStore {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Store `bytes` as the current version of `logical_name` and return its path.
    ///
    /// Order: delete `previous_path` (if given), delete the canonical path,
    /// delete stale disambiguated variants (`name (1).pdf`), then write.
    pub async fn save(
        &self,
        kind: ArtifactKind,
        year: i32,
        logical_name: &str,
        bytes: &[u8],
        previous_path: Option<&str>,
    ) -> Result<String, BelegError> {
        let path = canonical_path(kind, year, logical_name)?;
        debug!(backend = self.backend.name(), %path, size = bytes.len(), "saving artifact");

        if let Some(previous) = previous_path.filter(|p| *p != path) {
            self.backend.delete(previous).await?;
        }
        self.backend.delete(&path).await?;
        self.remove_stale_variants(kind, year, logical_name).await;

        self.backend.write(&path, bytes).await?;
        info!(backend = self.backend.name(), %path, "artifact stored");
        Ok(path)
    }

    /// Save a [`StoredArtifact`].
    pub async fn save_artifact(
        &self,
        artifact: &StoredArtifact,
        previous_path: Option<&str>,
    ) -> Result<String, BelegError> {
        self.save(
            artifact.kind,
            artifact.year,
            &artifact.logical_name,
            &artifact.content,
            previous_path,
        )
        .await
    }

    /// Direct path or signed URL, depending on the backend.
    pub async fn resolve_download(&self, path: &str) -> Result<DownloadHandle, BelegError> {
        self.backend.download_handle(path).await
    }

    pub async fn read(&self, path: &str) -> Result<Vec<u8>, BelegError> {
        self.backend.read(path).await
    }

    pub async fn delete(&self, path: &str) -> Result<(), BelegError> {
        debug!(backend = self.backend.name(), %path, "deleting artifact");
        self.backend.delete(path).await
    }

    /// Best effort: failures are logged, never fatal.
    async fn remove_stale_variants(&self, kind: ArtifactKind, year: i32, logical_name: &str) {
        let dir = format!("{}/{year}", kind.dir_name());
        let names = match self.backend.list(&dir).await {
            Ok(names) => names,
            Err(e) => {
                warn!(%dir, error = %e, "could not list artifacts for stale-variant cleanup");
                return;
            }
        };

        let pattern = match stale_variant_pattern(logical_name) {
            Ok(p) => p,
            Err(e) => {
                warn!(logical_name, error = %e, "could not build stale-variant pattern");
                return;
            }
        };

        for name in names.iter().filter(|n| pattern.is_match(n)) {
            let stale = format!("{dir}/{name}");
            match self.backend.delete(&stale).await {
                Ok(()) => debug!(path = %stale, "removed stale artifact variant"),
                Err(e) => warn!(path = %stale, error = %e, "failed to remove stale artifact variant"),
            }
        }
    }
}

/// Matches `{name} (N).pdf` and `{name}(N).pdf`, the names left behind by
/// non-atomic writers that refused to overwrite.
fn stale_variant_pattern(logical_name: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!(
        r"^{} ?\(\d+\)\.{}$",
        regex::escape(logical_name),
        ARTIFACT_EXTENSION
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_paths() {
        assert_eq!(
            canonical_path(ArtifactKind::QrBills, 2025, "QR-FAC-2025-0001").unwrap(),
            "qr-bills/2025/QR-FAC-2025-0001.pdf"
        );
        assert_eq!(
            canonical_path(ArtifactKind::Contracts, 2024, "CTR-2024-0003").unwrap(),
            "contracts/2024/CTR-2024-0003.pdf"
        );
    }

    #[test]
    fn rejects_path_like_names() {
        for bad in ["", "  ", "../etc", "a/b", "a\\b", ".hidden", " padded", "tab\tname"] {
            assert!(
                canonical_path(ArtifactKind::Invoices, 2025, bad).is_err(),
                "{bad:?}"
            );
        }
    }

    #[test]
    fn stale_variants_match_only_disambiguated_names() {
        let p = stale_variant_pattern("QR-FAC-2025-0001").unwrap();
        assert!(p.is_match("QR-FAC-2025-0001 (1).pdf"));
        assert!(p.is_match("QR-FAC-2025-0001(12).pdf"));
        assert!(!p.is_match("QR-FAC-2025-0001.pdf"));
        assert!(!p.is_match("QR-FAC-2025-00011 (1).pdf"));
        assert!(!p.is_match("QR-FAC-2025-0001 (1).pdf.tmp"));
        assert!(!p.is_match("xQR-FAC-2025-0001 (1).pdf"));
    }

    #[test]
    fn stale_pattern_escapes_name() {
        let p = stale_variant_pattern("A+B.C").unwrap();
        assert!(p.is_match("A+B.C (2).pdf"));
        assert!(!p.is_match("AAB.C (2).pdf"));
    }

    #[test]
    fn download_handle_json() {
        let handle = DownloadHandle::Path("invoices/2025/FAC-2025-0001.pdf".into());
        assert_eq!(
            serde_json::to_string(&handle).unwrap(),
            r#"{"type":"path","value":"invoices/2025/FAC-2025-0001.pdf"}"#
        );
    }

    #[test]
    fn default_config_is_local() {
        assert_eq!(
            StorageConfig::default(),
            StorageConfig::Local {
                root: PathBuf::from("storage")
            }
        );
    }
}
