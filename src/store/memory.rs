//! In-memory [`MailStore`].

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::debug;

use super::MailStore;
use crate::error::Result;
use crate::model::mail::StoredMessage;

#[derive(Debug, Default)]
struct Inner {
    next_id: u64,
    messages: BTreeMap<u64, StoredMessage>,
}

/// Keeps messages in a map guarded by a read/write lock. Ids start at 1 and
/// are never reused, not even after a purge.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.read().messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // A panic while holding the lock cannot leave the map half-updated, so a
    // poisoned lock is still usable.
    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl MailStore for MemoryStore {
    fn find_by_id(&self, id: u64) -> Result<Option<StoredMessage>> {
        Ok(self.read().messages.get(&id).cloned())
    }

    fn find_all(&self) -> Result<Vec<StoredMessage>> {
        Ok(self.read().messages.values().cloned().collect())
    }

    fn delete_all(&self) -> Result<()> {
        let mut inner = self.write();
        let removed = inner.messages.len();
        inner.messages.clear();
        debug!(removed, "Purged mail store");
        Ok(())
    }

    fn save(&self, mut message: StoredMessage) -> Result<StoredMessage> {
        let mut inner = self.write();
        inner.next_id += 1;
        message.id = inner.next_id;
        inner.messages.insert(message.id, message.clone());
        debug!(id = message.id, size = message.source.len(), "Saved mail");
        Ok(message)
    }
}
