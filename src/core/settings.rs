use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;

use super::billing::AgencySettings;
use super::error::BelegError;
use super::repository::BillingDirectory;

/// Default lifetime of cached agency settings.
pub const DEFAULT_SETTINGS_TTL: Duration = Duration::from_secs(300);

struct Cached {
    settings: AgencySettings,
    fetched_at: Instant,
}

/// Time-bounded cache of the agency billing settings.
///
/// Entries expire after the configured TTL; the settings-update path calls
/// [`SettingsCache::invalidate`] so the next request sees fresh values.
pub struct SettingsCache {
    source: Arc<dyn BillingDirectory>,
    ttl: Duration,
    cached: RwLock<Option<Cached>>,
}

impl SettingsCache {
    pub fn new(source: Arc<dyn BillingDirectory>, ttl: Duration) -> Self {
        Self {
            source,
            ttl,
            cached: RwLock::new(None),
        }
    }

    /// Current settings, fetched from the source when absent or stale.
    pub async fn get(&self) -> Result<AgencySettings, BelegError> {
        if let Some(cached) = self.cached.read().await.as_ref() {
            if cached.fetched_at.elapsed() < self.ttl {
                return Ok(cached.settings.clone());
            }
        }

        let mut slot = self.cached.write().await;
        // Another task may have refreshed while we waited for the write lock.
        if let Some(cached) = slot.as_ref() {
            if cached.fetched_at.elapsed() < self.ttl {
                return Ok(cached.settings.clone());
            }
        }

        debug!("refreshing agency settings");
        let settings = self.source.agency_settings().await?;
        *slot = Some(Cached {
            settings: settings.clone(),
            fetched_at: Instant::now(),
        });
        Ok(settings)
    }

    /// Drop the cached value.
    pub async fn invalidate(&self) {
        debug!("agency settings invalidated");
        *self.cached.write().await = None;
    }
}
