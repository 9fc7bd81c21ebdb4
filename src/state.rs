use crate::error::PersistenceError;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Persisted guid of the last delivered feed item.
pub trait WatermarkStore: Send + Sync {
    /// Returns `None` on a cold start. Read failures also count as a cold start.
    fn load(&self) -> Option<String>;

    /// Replaces the stored watermark.
    fn save(&self, guid: &str) -> Result<(), PersistenceError>;
}

/// Single plain-text file holding the last guid
pub struct FileWatermarkStore {
    path: PathBuf,
}

impl FileWatermarkStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Removes the watermark so the next cycle starts cold.
    pub fn clear(&self) -> Result<(), PersistenceError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.error(e)),
        }
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "watermark".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn error(&self, source: io::Error) -> PersistenceError {
        PersistenceError {
            path: self.path.display().to_string(),
            source,
        }
    }
}

impl WatermarkStore for FileWatermarkStore {
    fn load(&self) -> Option<String> {
        match fs::read_to_string(&self.path) {
            Ok(content) => {
                let guid = content.trim();
                if guid.is_empty() {
                    tracing::info!(path = %self.path.display(), "Watermark file is empty, starting fresh");
                    None
                } else {
                    tracing::info!(guid, "Loaded watermark");
                    Some(guid.to_string())
                }
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::info!(path = %self.path.display(), "No previous watermark found, starting fresh");
                None
            }
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Could not read watermark, treating as cold start");
                None
            }
        }
    }

    /// Writes to a sibling temp file, flushes it to disk and renames it over
    /// the old value, so readers never observe a partial guid.
    fn save(&self, guid: &str) -> Result<(), PersistenceError> {
        let parent = self.path.parent().filter(|p| !p.as_os_str().is_empty());
        if let Some(parent) = parent {
            fs::create_dir_all(parent).map_err(|e| self.error(e))?;
        }

        let tmp = self.tmp_path();
        write_synced(&tmp, guid).map_err(|e| {
            let _ = fs::remove_file(&tmp);
            self.error(e)
        })?;
        fs::rename(&tmp, &self.path).map_err(|e| {
            let _ = fs::remove_file(&tmp);
            self.error(e)
        })?;
        sync_dir(parent.unwrap_or_else(|| Path::new(".")));

        tracing::info!(guid, "Saved watermark");
        Ok(())
    }
}

/// Replaces `path` with `contents` and waits until the data is on disk.
fn write_synced(path: &Path, contents: &str) -> io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(contents.as_bytes())?;
    file.sync_all()
}

/// Flushes a directory entry change. Not every platform can open a
/// directory for this, so failures are only logged.
fn sync_dir(dir: &Path) {
    if let Err(e) = File::open(dir).and_then(|d| d.sync_all()) {
        tracing::debug!(dir = %dir.display(), error = %e, "Could not sync watermark directory");
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
