use crate::error::{RelayError, Result};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// A single plain-text value kept in one file.
///
/// Writes go to a sibling temp file that is synced and then renamed over the
/// target, so a crash leaves either the old value or the new one.
#[derive(Debug, Clone)]
pub struct DurableFile {
    path: PathBuf,
}

impl DurableFile {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current value with surrounding whitespace trimmed, or `None` if never written.
    pub fn read(&self) -> Result<Option<String>> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => Ok(Some(contents.trim().to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(RelayError::persistence(&self.path, e)),
        }
    }

    pub fn write(&self, value: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| RelayError::persistence(parent, e))?;
            }
        }

        let tmp_path = self.path.with_extension("tmp");
        let write_tmp = || -> std::io::Result<()> {
            let mut file = File::create(&tmp_path)?;
            file.write_all(value.as_bytes())?;
            file.sync_all()
        };
        if let Err(e) = write_tmp() {
            let _ = fs::remove_file(&tmp_path);
            return Err(RelayError::persistence(&tmp_path, e));
        }
        fs::rename(&tmp_path, &self.path).map_err(|e| RelayError::persistence(&self.path, e))?;

        debug!("Wrote {} ({} bytes)", self.path.display(), value.len());
        Ok(())
    }
}
