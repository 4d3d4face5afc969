//! Runtime configuration loaded with figment.
//!
//! Merge order (later overrides earlier):
//! 1. Compiled defaults
//! 2. A TOML file
//! 3. `KONTOR_*` environment variables
//!
//! ```toml
//! request_timeout_secs = 30
//!
//! [storage]
//! backend = "object"
//! endpoint = "https://project.example.co/storage/v1"
//! bucket = "documents"
//! service_key = "..."
//!
//! [database]
//! path = "kontor.db"
//!
//! [billing]
//! settings_cache_ttl_secs = 300
//! vat_rate = 8.1
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::core::{BelegError, DEFAULT_SETTINGS_TTL, DEFAULT_VAT_RATE};
use crate::storage::StorageConfig;

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct KontorConfig {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub billing: BillingConfig,

    /// Deadline for every persistence and storage call.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for KontorConfig {
    fn default() -> Self {
        Self {
            storage: StorageConfig::default(),
            database: DatabaseConfig::default(),
            billing: BillingConfig::default(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl KontorConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Reject values that would make the service unusable.
    pub fn validate(&self) -> Result<(), BelegError> {
        if self.request_timeout_secs == 0 {
            return Err(BelegError::Config("request_timeout_secs must be positive".into()));
        }
        if self.billing.vat_rate < Decimal::ZERO || self.billing.vat_rate > Decimal::ONE_HUNDRED {
            return Err(BelegError::Config(format!(
                "billing.vat_rate {} is outside 0..=100",
                self.billing.vat_rate
            )));
        }
        if let StorageConfig::Object {
            endpoint,
            bucket,
            service_key,
            signed_url_ttl_secs,
        } = &self.storage
        {
            if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                return Err(BelegError::Config(format!(
                    "storage.endpoint '{endpoint}' is not an HTTP URL"
                )));
            }
            if bucket.trim().is_empty() || service_key.trim().is_empty() {
                return Err(BelegError::Config(
                    "object storage needs storage.bucket and storage.service_key".into(),
                ));
            }
            if *signed_url_ttl_secs == 0 {
                return Err(BelegError::Config(
                    "storage.signed_url_ttl_secs must be positive".into(),
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BillingConfig {
    /// Lifetime of cached agency settings.
    #[serde(default = "default_settings_cache_ttl_secs")]
    pub settings_cache_ttl_secs: u64,

    /// VAT rate in percent for newly built invoices.
    #[serde(default = "default_vat_rate")]
    pub vat_rate: Decimal,
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            settings_cache_ttl_secs: default_settings_cache_ttl_secs(),
            vat_rate: default_vat_rate(),
        }
    }
}

impl BillingConfig {
    pub fn settings_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.settings_cache_ttl_secs)
    }
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_database_path() -> PathBuf {
    PathBuf::from("kontor.db")
}

fn default_settings_cache_ttl_secs() -> u64 {
    DEFAULT_SETTINGS_TTL.as_secs()
}

fn default_vat_rate() -> Decimal {
    DEFAULT_VAT_RATE
}

/// Load from `kontor.toml` in the working directory (if present) with env overrides.
pub fn load_config() -> Result<KontorConfig, BelegError> {
    extract(
        Figment::new()
            .merge(Serialized::defaults(KontorConfig::default()))
            .merge(Toml::file("kontor.toml"))
            .merge(env_provider()),
    )
}

/// Load from a TOML string only; no environment overrides.
pub fn load_config_from_str(toml_content: &str) -> Result<KontorConfig, BelegError> {
    extract(
        Figment::new()
            .merge(Serialized::defaults(KontorConfig::default()))
            .merge(Toml::string(toml_content)),
    )
}

/// Load from a specific file with env overrides.
pub fn load_config_from_path(path: &Path) -> Result<KontorConfig, BelegError> {
    extract(
        Figment::new()
            .merge(Serialized::defaults(KontorConfig::default()))
            .merge(Toml::file(path))
            .merge(env_provider()),
    )
}

fn extract(figment: Figment) -> Result<KontorConfig, BelegError> {
    let config: KontorConfig = figment
        .extract()
        .map_err(|e| BelegError::Config(e.to_string()))?;
    config.validate()?;
    Ok(config)
}

/// `KONTOR_STORAGE_SERVICE_KEY` maps to `storage.service_key`, not
/// `storage.service.key`, hence `map` instead of `split("_")`.
fn env_provider() -> Env {
    Env::prefixed("KONTOR_").map(|key| {
        // Keys arrive with their original case.
        let key = key.as_str().to_ascii_lowercase();
        for section in ["storage", "database", "billing"] {
            if let Some(rest) = key
                .strip_prefix(section)
                .and_then(|r| r.strip_prefix('_'))
            {
                return format!("{section}.{rest}").into();
            }
        }
        key.into()
    })
}
