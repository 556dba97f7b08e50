//! Cipher adapter and key generation.
//!
//! Wraps the two supported AEAD strengths behind one encrypt/decrypt pair.
//! Output layout is `nonce || ciphertext+tag`, so a secret's ciphertext is a
//! single opaque byte blob. A failed tag check is the only wrong-key signal;
//! it surfaces as [`Error::DecryptionFailed`], never as garbage plaintext.

use aes_gcm::{
    aead::{Aead, KeyInit, Nonce, OsRng},
    Aes128Gcm, Aes256Gcm,
};
use rand::RngCore;
use zeroize::ZeroizeOnDrop;

use crate::error::Error;

/// Per-message random nonce length (AES-GCM, 96 bits).
const NONCE_LEN: usize = 12;

/// The closed set of supported cipher variants.
///
/// Unknown names are rejected at [`CipherKind::parse`], at configuration
/// time, so an unsupported variant can never reach a store or retrieve
/// call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CipherKind {
    /// AES-128-GCM: 16-byte keys.
    Aes128Gcm,
    /// AES-256-GCM: 32-byte keys. The default.
    #[default]
    Aes256Gcm,
}

impl CipherKind {
    /// Key length in raw bytes (hex-encoded in references).
    pub fn key_len(self) -> usize {
        match self {
            Self::Aes128Gcm => 16,
            Self::Aes256Gcm => 32,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Aes128Gcm => "aes-128-gcm",
            Self::Aes256Gcm => "aes-256-gcm",
        }
    }

    /// Parse a cipher name. Fails with [`Error::UnsupportedCipher`] for
    /// anything outside the supported pair.
    pub fn parse(name: &str) -> Result<Self, Error> {
        match name {
            "aes-128-gcm" => Ok(Self::Aes128Gcm),
            "aes-256-gcm" => Ok(Self::Aes256Gcm),
            other => Err(Error::UnsupportedCipher(other.to_owned())),
        }
    }
}

impl std::fmt::Display for CipherKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Random key material sized to a cipher variant. Never persisted by the
/// vault; it travels hex-encoded inside the reference and nowhere else.
#[derive(ZeroizeOnDrop)]
pub struct KeyMaterial(Vec<u8>);

// Manual Debug implementation: key bytes stay out of logs and panic output.
impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("len", &self.0.len())
            .finish_non_exhaustive()
    }
}

impl KeyMaterial {
    /// Draw fresh key material for `kind` from the OS CSPRNG.
    pub fn generate(kind: CipherKind) -> Self {
        let mut bytes = vec![0u8; kind.key_len()];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Rebuild key material from its hex wire form.
    ///
    /// A key that is not valid hex can only ever fail decryption, so the
    /// error is [`Error::DecryptionFailed`]; length is checked by the
    /// cipher itself.
    pub fn from_hex(hex_key: &str) -> Result<Self, Error> {
        hex::decode(hex_key)
            .map(Self)
            .map_err(|_| Error::DecryptionFailed)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Encrypt `plaintext` under `key`, returning `nonce || ciphertext+tag`.
pub fn encrypt(kind: CipherKind, key: &KeyMaterial, plaintext: &[u8]) -> Result<Vec<u8>, Error> {
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);

    let sealed = match kind {
        CipherKind::Aes128Gcm => seal::<Aes128Gcm>(key, &nonce, plaintext)?,
        CipherKind::Aes256Gcm => seal::<Aes256Gcm>(key, &nonce, plaintext)?,
    };

    let mut blob = Vec::with_capacity(NONCE_LEN + sealed.len());
    blob.extend_from_slice(&nonce);
    blob.extend_from_slice(&sealed);
    Ok(blob)
}

/// Decrypt a `nonce || ciphertext+tag` blob under `key`.
///
/// Every failure mode (wrong key, wrong key length, truncated blob,
/// flipped bits, cipher-variant mismatch) is [`Error::DecryptionFailed`].
pub fn decrypt(kind: CipherKind, key: &KeyMaterial, blob: &[u8]) -> Result<Vec<u8>, Error> {
    if blob.len() < NONCE_LEN {
        return Err(Error::DecryptionFailed);
    }
    let (nonce, sealed) = blob.split_at(NONCE_LEN);

    match kind {
        CipherKind::Aes128Gcm => open::<Aes128Gcm>(key, nonce, sealed),
        CipherKind::Aes256Gcm => open::<Aes256Gcm>(key, nonce, sealed),
    }
}

fn seal<C: Aead + KeyInit>(
    key: &KeyMaterial,
    nonce: &[u8],
    plaintext: &[u8],
) -> Result<Vec<u8>, Error> {
    let cipher = C::new_from_slice(key.as_bytes()).map_err(|_| Error::EncryptionFailed)?;
    cipher
        .encrypt(Nonce::<C>::from_slice(nonce), plaintext)
        .map_err(|_| Error::EncryptionFailed)
}

fn open<C: Aead + KeyInit>(
    key: &KeyMaterial,
    nonce: &[u8],
    sealed: &[u8],
) -> Result<Vec<u8>, Error> {
    let cipher = C::new_from_slice(key.as_bytes()).map_err(|_| Error::DecryptionFailed)?;
    cipher
        .decrypt(Nonce::<C>::from_slice(nonce), sealed)
        .map_err(|_| Error::DecryptionFailed)
}
