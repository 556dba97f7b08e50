use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use zeroize::ZeroizeOnDrop;

use crate::error::Error;

/// Current Unix time in whole seconds.
pub(crate) fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

/// The persisted unit: ciphertext plus expiry and view-count metadata.
///
/// The decryption key is never part of this record; storage alone can
/// decrypt nothing. All fields are fixed at construction except
/// `remaining_views`, which only moves through [`Secret::decrement_views`].
#[derive(Debug, Clone, Serialize, Deserialize, ZeroizeOnDrop)]
pub struct Secret {
    /// Server-generated identifier, unique among live secrets.
    identifier: String,
    /// Cipher adapter output: 12-byte nonce followed by ciphertext + tag.
    ciphertext: Vec<u8>,
    /// Unix timestamp (seconds) after which the record is expired.
    expires_at: i64,
    /// Retrievals left; the record is deleted when this reaches zero.
    remaining_views: u32,
}

impl Secret {
    pub fn new(identifier: String, ciphertext: Vec<u8>, expires_at: i64, views: u32) -> Self {
        Self {
            identifier,
            ciphertext,
            expires_at,
            remaining_views: views,
        }
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn ciphertext(&self) -> &[u8] {
        &self.ciphertext
    }

    pub fn expires_at(&self) -> i64 {
        self.expires_at
    }

    pub fn remaining_views(&self) -> u32 {
        self.remaining_views
    }

    /// Returns true if this record has expired at time `now`.
    pub fn is_expired(&self, now: i64) -> bool {
        now >= self.expires_at
    }

    /// Consume one view.
    ///
    /// Fails with [`Error::ViewsExhausted`] when no views remain. The
    /// engine deletes records before they reach zero in storage, so this
    /// only fires on a caller bug.
    pub fn decrement_views(&mut self) -> Result<(), Error> {
        if self.remaining_views == 0 {
            return Err(Error::ViewsExhausted);
        }
        self.remaining_views -= 1;
        Ok(())
    }
}
