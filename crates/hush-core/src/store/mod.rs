//! Storage backends for encrypted secret records.
//!
//! The trait is synchronous and keyed by identifier. Every backend serializes
//! writers per identifier (a mutex or a single write transaction), which is
//! what makes the conditional `update`/`delete` pair strong enough to consume
//! the last view exactly once under concurrent retrieval.

mod file;
mod memory;
mod redb;

use thiserror::Error;

pub use self::file::FileStore;
pub use self::memory::MemoryStore;
pub use self::redb::RedbStore;
use crate::secret::Secret;

/// Errors from the storage layer. Infrastructure only; protocol outcomes
/// (absent, expired, lost race) travel through return values instead.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A live record already holds this identifier.
    #[error("identifier already in use: {identifier}")]
    AlreadyExists {
        /// The colliding identifier.
        identifier: String,
    },

    /// Underlying storage failed (file system, database).
    #[error("I/O error: {0}")]
    Io(String),

    /// A stored record could not be encoded or decoded.
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(err.to_string())
    }
}

impl From<bincode::error::EncodeError> for StoreError {
    fn from(err: bincode::error::EncodeError) -> Self {
        StoreError::Corrupt(err.to_string())
    }
}

impl From<bincode::error::DecodeError> for StoreError {
    fn from(err: bincode::error::DecodeError) -> Self {
        StoreError::Corrupt(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Corrupt(err.to_string())
    }
}

/// Keyed storage for [`Secret`] records.
///
/// Implementations must be safe to share across threads; the engine calls
/// them from any number of threads without external locking.
///
/// # Required guarantee
///
/// Per identifier, a `get` followed by a conditional `update` or `delete`
/// must behave as if serialized against every concurrent sequence on that
/// identifier: when two retrievals both observe one remaining view, at most
/// one conditional write may succeed. The engine's at-most-once consumption
/// of the final view rests entirely on this.
///
/// Expired records are treated as absent everywhere: `get` returns `None`
/// for them (and may evict them on the spot), and `insert` may displace one.
pub trait SecretStore: Send + Sync {
    /// Persist a fresh record under its identifier.
    ///
    /// Fails with [`StoreError::AlreadyExists`] if a live (non-expired)
    /// record already holds the identifier.
    fn insert(&self, secret: &Secret) -> Result<(), StoreError>;

    /// Fetch the record for `identifier`.
    ///
    /// Returns `None` when the identifier is absent or the record has
    /// expired; backends evict expired records lazily here.
    fn get(&self, identifier: &str) -> Result<Option<Secret>, StoreError>;

    /// Replace the record, but only if the live record's remaining view
    /// count still equals `expected_views`.
    ///
    /// Returns `Ok(false)` without writing when the identifier is absent,
    /// expired, or the count has moved; a lost race is a verdict, not an
    /// error. The caller passes the count it observed at `get`.
    fn update(&self, secret: &Secret, expected_views: u32) -> Result<bool, StoreError>;

    /// Remove the record, but only if the live record's remaining view
    /// count still equals `expected_views`.
    ///
    /// Returns `Ok(false)` when the identifier is absent or the count has
    /// moved, so deleting twice is harmless.
    fn delete(&self, secret: &Secret, expected_views: u32) -> Result<bool, StoreError>;

    /// Sweep expired records, plus anything the backend can no longer read
    /// as a record. Returns how many entries were removed.
    ///
    /// Housekeeping only; correctness never depends on it because `get`
    /// already hides expired records.
    fn prune(&self) -> Result<usize, StoreError>;
}
