//! The two-part reference handed to the end user.
//!
//! Wire form is `<identifier>;<key>`: the identifier addresses the stored
//! ciphertext, the key (hex) decrypts it. The two travel together out-of-band
//! and the key is never persisted, so storage alone can decrypt nothing.

use rand::RngCore;

use crate::error::Error;

/// Separator between identifier and key; permitted inside neither part.
pub const REFERENCE_DELIMITER: char = ';';

/// Length of generated identifiers: 16 random bytes, hex-encoded.
const IDENTIFIER_LEN: usize = 32;

/// A decoded reference: `(identifier, key)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    identifier: String,
    key: String,
}

impl Reference {
    pub fn new(identifier: String, key: String) -> Self {
        Self { identifier, key }
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// The hex-encoded key material. Opaque here; only decryption judges it.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Render the wire form `<identifier>;<key>`.
    pub fn encode(&self) -> String {
        format!("{}{}{}", self.identifier, REFERENCE_DELIMITER, self.key)
    }

    /// Parse a wire-form reference.
    ///
    /// Fails with [`Error::MalformedReference`] unless the input splits into
    /// exactly two non-empty parts on the delimiter. The identifier is then
    /// sanitized to `[A-Za-z0-9]` by stripping anything else, so a reference
    /// can never smuggle path or query syntax into a storage backend. The
    /// key part passes through untouched.
    pub fn decode(raw: &str) -> Result<Self, Error> {
        let parts: Vec<&str> = raw.split(REFERENCE_DELIMITER).collect();
        if parts.len() != 2 || parts[0].is_empty() || parts[1].is_empty() {
            return Err(Error::MalformedReference);
        }
        Ok(Self {
            identifier: sanitize_identifier(parts[0]),
            key: parts[1].to_owned(),
        })
    }
}

impl std::fmt::Display for Reference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}{}", self.identifier, REFERENCE_DELIMITER, self.key)
    }
}

impl std::str::FromStr for Reference {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::decode(s)
    }
}

/// Strip everything outside `[A-Za-z0-9]` from a decoded identifier.
///
/// Stripping (rather than rejecting) mirrors how identifiers have always
/// been treated; a stripped-to-empty identifier simply misses on lookup.
pub fn sanitize_identifier(raw: &str) -> String {
    raw.chars().filter(char::is_ascii_alphanumeric).collect()
}

/// Generate a fresh random identifier: 16 CSPRNG bytes, lowercase hex.
///
/// 128 bits of randomness makes collision among live secrets negligible
/// without coordinating with the store.
pub fn generate_identifier() -> String {
    let mut bytes = [0u8; IDENTIFIER_LEN / 2];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
