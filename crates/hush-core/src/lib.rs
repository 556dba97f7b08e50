//! One-time secret sharing: encrypt a short text, hand out a single
//! `identifier;key` reference, serve it a bounded number of views within a
//! TTL, then delete it. The key lives only inside the reference, so the
//! storage side can never decrypt what it holds.

pub mod cipher;
pub mod error;
pub mod reference;
pub mod secret;
pub mod store;
pub mod vault;

pub use cipher::{CipherKind, KeyMaterial};
pub use error::Error;
pub use reference::{Reference, REFERENCE_DELIMITER};
pub use secret::Secret;
pub use store::{FileStore, MemoryStore, RedbStore, SecretStore, StoreError};
pub use vault::{Vault, DEFAULT_TTL_SECS, DEFAULT_VIEWS};
