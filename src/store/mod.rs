//! Mail store boundary.
//!
//! The extractor, resolver and query engine only ever read a message's
//! `source` and `html`; persistence and concurrency control live behind
//! [`MailStore`].

pub mod memory;

use crate::error::Result;
use crate::model::mail::StoredMessage;

pub use memory::MemoryStore;

/// Storage for captured messages.
///
/// Implementations must be safe to share between request handlers; reads may
/// run concurrently with [`MailStore::delete_all`].
pub trait MailStore: Send + Sync {
    /// Look a message up by id.
    fn find_by_id(&self, id: u64) -> Result<Option<StoredMessage>>;

    /// Every stored message, oldest first.
    fn find_all(&self) -> Result<Vec<StoredMessage>>;

    /// Remove every stored message.
    fn delete_all(&self) -> Result<()>;

    /// Persist `message`, assigning it a fresh id. Returns the stored copy.
    fn save(&self, message: StoredMessage) -> Result<StoredMessage>;
}
