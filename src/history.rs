//! File mutation history.
//!
//! File-mutating tools report `(path, before, after)` snapshots here after a
//! successful change, so an outer layer can offer undo or an audit trail.
//! `None` means the file did not exist on that side of the change. Tools
//! refuse a change whose `before` side they cannot capture as text.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::{Result, StewardError};

/// Receiver of file mutation snapshots.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FileHistory: Send + Sync {
    async fn record(&self, path: &Path, before: Option<String>, after: Option<String>)
        -> Result<()>;
}

/// One recorded mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct FileChange {
    pub path: PathBuf,
    pub before: Option<String>,
    pub after: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

/// History kept in memory, newest last.
#[derive(Debug, Default)]
pub struct InMemoryHistory {
    changes: Mutex<Vec<FileChange>>,
}

impl InMemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn changes(&self) -> Vec<FileChange> {
        self.changes.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Changes recorded for one path, oldest first.
    pub fn changes_for(&self, path: &Path) -> Vec<FileChange> {
        self.changes()
            .into_iter()
            .filter(|c| c.path == path)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.changes.lock().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl FileHistory for InMemoryHistory {
    async fn record(
        &self,
        path: &Path,
        before: Option<String>,
        after: Option<String>,
    ) -> Result<()> {
        let mut changes = self
            .changes
            .lock()
            .map_err(|_| StewardError::Tool("file history lock poisoned".into()))?;
        changes.push(FileChange {
            path: path.to_path_buf(),
            before,
            after,
            recorded_at: Utc::now(),
        });
        Ok(())
    }
}
