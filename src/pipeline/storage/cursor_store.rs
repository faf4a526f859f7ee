use super::durable_file::DurableFile;
use crate::constants::CURSOR_FILE;
use crate::error::Result;
use crate::types::Cursor;
use std::path::Path;
use tracing::info;

/// Durable home of the resume cursor.
#[derive(Debug, Clone)]
pub struct CursorStore {
    file: DurableFile,
}

impl CursorStore {
    pub fn open_at_root<P: AsRef<Path>>(data_root: P) -> Self {
        Self {
            file: DurableFile::new(data_root.as_ref().join(CURSOR_FILE)),
        }
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Recorded cursor, or the empty cursor when none has been written yet.
    pub fn get(&self) -> Result<Cursor> {
        Ok(self.file.read()?.map(Cursor::new).unwrap_or_default())
    }

    pub fn set(&self, cursor: &Cursor) -> Result<()> {
        info!(cursor = %cursor, "Persisting cursor");
        self.file.write(cursor.as_str())?;
        crate::observability::metrics::state::cursor_committed();
        Ok(())
    }

    /// Operator-requested reset; the next pass bootstraps again.
    pub fn clear(&self) -> Result<()> {
        info!("Clearing recorded cursor");
        self.file.write("")
    }
}
