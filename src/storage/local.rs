use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::fs;
use tracing::{debug, warn};

use crate::core::BelegError;

use super::{DownloadHandle, StorageBackend};

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Filesystem backend rooted at a directory.
///
/// Writes go to a hidden temporary file in the target directory and are
/// renamed into place, so a reader sees the old file, no file or the new
/// file.
#[derive(Debug, Clone)]
pub struct LocalBackend {
    root: PathBuf,
}

impl LocalBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Join a relative storage path onto the root, refusing escapes.
    fn resolve(&self, path: &str) -> Result<PathBuf, BelegError> {
        let relative = Path::new(path);
        let escapes = path.is_empty()
            || relative
                .components()
                .any(|c| !matches!(c, Component::Normal(_)));
        if escapes {
            return Err(BelegError::InvalidInput(format!(
                "storage path '{path}' must be relative"
            )));
        }
        Ok(self.root.join(relative))
    }
}

fn io_error(action: &str, path: &Path, e: std::io::Error) -> BelegError {
    match e.kind() {
        ErrorKind::StorageFull | ErrorKind::FileTooLarge => {
            BelegError::ArtifactTooLarge(format!("{action} {}: {e}", path.display()))
        }
        _ => BelegError::StorageUnavailable(format!("{action} {}: {e}", path.display())),
    }
}

/// Whether `entry` is a temporary file written for `file_name`
/// (`.{file_name}.{pid}.{counter}.tmp`).
fn is_temp_for(entry: &str, file_name: &str) -> bool {
    let Some(middle) = entry
        .strip_prefix('.')
        .and_then(|r| r.strip_prefix(file_name))
        .and_then(|r| r.strip_prefix('.'))
        .and_then(|r| r.strip_suffix(".tmp"))
    else {
        return false;
    };
    let mut parts = middle.split('.');
    let is_number = |p: Option<&str>| p.is_some_and(|p| !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit()));
    is_number(parts.next()) && is_number(parts.next()) && parts.next().is_none()
}

/// Best effort: a write cancelled between create and rename leaves its
/// temporary file behind, and `list` never shows it.
async fn remove_temp_leftovers(target: &Path) {
    let (Some(parent), Some(file_name)) = (
        target.parent(),
        target.file_name().and_then(|n| n.to_str()),
    ) else {
        return;
    };
    let mut entries = match fs::read_dir(parent).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return,
        Err(e) => {
            warn!(dir = %parent.display(), error = %e, "could not scan for temporary files");
            return;
        }
    };

    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => {
                warn!(dir = %parent.display(), error = %e, "could not scan for temporary files");
                break;
            }
        };
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        if !is_temp_for(&name, file_name) {
            continue;
        }
        match fs::remove_file(entry.path()).await {
            Ok(()) => debug!(path = %entry.path().display(), "removed leftover temporary file"),
            Err(e) => warn!(path = %entry.path().display(), error = %e, "failed to remove temporary file"),
        }
    }
}

#[async_trait]
impl StorageBackend for LocalBackend {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn write(&self, path: &str, bytes: &[u8]) -> Result<(), BelegError> {
        let target = self.resolve(path)?;
        let parent = target
            .parent()
            .ok_or_else(|| BelegError::InvalidInput(format!("storage path '{path}' has no parent")))?;
        let file_name = target
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| BelegError::InvalidInput(format!("storage path '{path}' has no file name")))?;

        fs::create_dir_all(parent)
            .await
            .map_err(|e| io_error("create directory", parent, e))?;

        let temp = parent.join(format!(
            ".{file_name}.{}.{}.tmp",
            std::process::id(),
            TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        if let Err(e) = fs::write(&temp, bytes).await {
            let _ = fs::remove_file(&temp).await;
            return Err(io_error("write", &temp, e));
        }
        if let Err(e) = fs::rename(&temp, &target).await {
            let _ = fs::remove_file(&temp).await;
            return Err(io_error("rename into", &target, e));
        }
        debug!(path = %target.display(), size = bytes.len(), "file written");
        Ok(())
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>, BelegError> {
        let target = self.resolve(path)?;
        fs::read(&target).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => BelegError::NotFound(format!("artifact '{path}'")),
            _ => io_error("read", &target, e),
        })
    }

    /// Also sweeps temporary files an interrupted write of `path` left behind.
    async fn delete(&self, path: &str) -> Result<(), BelegError> {
        let target = self.resolve(path)?;
        match fs::remove_file(&target).await {
            Ok(()) => debug!(path = %target.display(), "file removed"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(io_error("remove", &target, e)),
        }
        remove_temp_leftovers(&target).await;
        Ok(())
    }

    async fn exists(&self, path: &str) -> Result<bool, BelegError> {
        let target = self.resolve(path)?;
        fs::try_exists(&target)
            .await
            .map_err(|e| io_error("stat", &target, e))
    }

    async fn list(&self, dir: &str) -> Result<Vec<String>, BelegError> {
        let target = self.resolve(dir)?;
        let mut entries = match fs::read_dir(&target).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_error("list", &target, e)),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| io_error("list", &target, e))?
        {
            match entry.file_name().into_string() {
                Ok(name) if !name.starts_with('.') => names.push(name),
                Ok(_) => {}
                Err(name) => warn!(?name, "skipping non UTF-8 file name"),
            }
        }
        names.sort();
        Ok(names)
    }

    async fn download_handle(&self, path: &str) -> Result<DownloadHandle, BelegError> {
        if !self.exists(path).await? {
            return Err(BelegError::NotFound(format!("artifact '{path}'")));
        }
        Ok(DownloadHandle::Path(path.to_string()))
    }
}
