//! Error taxonomy for the secret lifecycle.
//!
//! Input errors are the caller's fault and reported as-is. Protocol errors
//! mean a well-formed reference could not be exchanged for plaintext;
//! `SecretNotFound` and `DecryptionFailed` deliberately share one display
//! text so a probing client cannot tell a dead identifier from a wrong key.
//! Storage failures pass through unwrapped; the engine has no local remedy.

use thiserror::Error;

use crate::store::StoreError;

/// Errors surfaced by the vault and its components.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The secret text was empty at store time.
    #[error("secret text must not be empty")]
    EmptySecret,

    /// The requested TTL was below one second.
    #[error("ttl must be at least 1 second")]
    InvalidTtl,

    /// The requested view count was zero.
    #[error("views must be at least 1")]
    InvalidViews,

    /// The reference did not split into `identifier;key`.
    #[error("malformed reference")]
    MalformedReference,

    /// No live secret under the identifier: never existed, already
    /// consumed, or expired. Presented identically to `DecryptionFailed`.
    #[error("secret unavailable")]
    SecretNotFound,

    /// The key was wrong or the ciphertext corrupt. The presented view was
    /// still consumed. Presented identically to `SecretNotFound`.
    #[error("secret unavailable")]
    DecryptionFailed,

    /// A cipher name outside the supported set. Configuration fault, not
    /// retriable.
    #[error("unsupported cipher: {0}")]
    UnsupportedCipher(String),

    /// `decrement_views` was called on an already-exhausted secret. The
    /// engine never does this; seeing it means an engine bug.
    #[error("views already exhausted")]
    ViewsExhausted,

    /// The cipher library failed while encrypting. Nothing was persisted.
    #[error("encryption failed")]
    EncryptionFailed,

    /// Storage backend failure, passed through unwrapped.
    #[error(transparent)]
    Store(#[from] StoreError),
}
