use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

use crate::app::{PublisherPort, VersionToken, WriteOutcome};
use crate::error::PortError;

#[derive(Debug, Default)]
struct Store {
    files: HashMap<String, (String, u64)>,
    next_version: u64,
    forced_conflicts: u32,
    writes: u32,
}

/// Publisher backed by a map, with monotonically increasing revision numbers
/// as tokens. Can be told to reject upcoming writes as conflicts.
#[derive(Debug, Default)]
pub struct InMemoryPublisher {
    store: Mutex<Store>,
}

impl InMemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    fn store(&self) -> MutexGuard<'_, Store> {
        self.store.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Stores `content` as a new revision, bypassing the token check.
    pub fn insert(&self, path: &str, content: &str) -> VersionToken {
        let mut store = self.store();
        store.next_version += 1;
        let version = store.next_version;
        store.files.insert(path.to_string(), (content.to_string(), version));
        VersionToken(version.to_string())
    }

    pub fn content(&self, path: &str) -> Option<String> {
        self.store().files.get(path).map(|(content, _)| content.clone())
    }

    /// The next `count` writes report a conflict whatever token they carry.
    pub fn fail_next_writes_with_conflict(&self, count: u32) {
        self.store().forced_conflicts = count;
    }

    /// Writes that reached the store, conflicting ones included.
    pub fn write_count(&self) -> u32 {
        self.store().writes
    }
}

#[async_trait]
impl PublisherPort for InMemoryPublisher {
    async fn read_current_version(&self, path: &str) -> Result<Option<VersionToken>, PortError> {
        Ok(self.store().files.get(path).map(|(_, v)| VersionToken(v.to_string())))
    }

    async fn write(
        &self,
        path: &str,
        content: &str,
        expected: Option<&VersionToken>,
    ) -> Result<WriteOutcome, PortError> {
        let mut store = self.store();
        store.writes += 1;
        if store.forced_conflicts > 0 {
            store.forced_conflicts -= 1;
            return Ok(WriteOutcome::Conflict);
        }

        let current = store.files.get(path).map(|(_, v)| VersionToken(v.to_string()));
        if current.as_ref() != expected {
            debug!("conflict on {}: expected {:?}, found {:?}", path, expected, current);
            return Ok(WriteOutcome::Conflict);
        }

        store.next_version += 1;
        let version = store.next_version;
        store.files.insert(path.to_string(), (content.to_string(), version));
        Ok(WriteOutcome::Written(VersionToken(version.to_string())))
    }
}
