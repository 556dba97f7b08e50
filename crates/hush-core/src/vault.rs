//! The lifecycle engine: store a secret, hand out a reference, serve a
//! bounded number of views, then leave nothing behind.

use tracing::debug;

use crate::cipher::{self, CipherKind, KeyMaterial};
use crate::error::Error;
use crate::reference::{generate_identifier, Reference};
use crate::secret::{unix_now, Secret};
use crate::store::SecretStore;

/// Default time-to-live: one hour.
pub const DEFAULT_TTL_SECS: u64 = 3600;
/// Default view count: read once, then gone.
pub const DEFAULT_VIEWS: u32 = 1;

/// One-time-secret engine over a storage backend.
///
/// Holds no mutable state of its own; any number of threads can call
/// [`Vault::store`] and [`Vault::retrieve`] on clones or through a shared
/// reference. The only contended resource is the per-identifier record,
/// and the backend's conditional writes arbitrate that.
#[derive(Clone)]
pub struct Vault<S> {
    store: S,
    cipher: CipherKind,
}

impl<S: SecretStore> Vault<S> {
    /// Engine with the default cipher ([`CipherKind::Aes256Gcm`]).
    pub fn new(store: S) -> Self {
        Self::with_cipher(store, CipherKind::default())
    }

    pub fn with_cipher(store: S, cipher: CipherKind) -> Self {
        Self { store, cipher }
    }

    pub fn cipher(&self) -> CipherKind {
        self.cipher
    }

    /// Encrypt `plaintext` and persist it for `ttl_seconds` and `views`
    /// retrievals. Returns the reference to hand to the recipient.
    ///
    /// The key inside the reference is generated here and never stored;
    /// losing the reference makes the secret unrecoverable.
    ///
    /// Validation runs before anything is generated or written: empty
    /// plaintext fails with [`Error::EmptySecret`], `ttl_seconds < 1` with
    /// [`Error::InvalidTtl`], `views < 1` with [`Error::InvalidViews`].
    pub fn store(&self, plaintext: &str, ttl_seconds: u64, views: u32) -> Result<Reference, Error> {
        if plaintext.is_empty() {
            return Err(Error::EmptySecret);
        }
        if ttl_seconds < 1 {
            return Err(Error::InvalidTtl);
        }
        if views < 1 {
            return Err(Error::InvalidViews);
        }

        let identifier = generate_identifier();
        let key = KeyMaterial::generate(self.cipher);
        let ciphertext = cipher::encrypt(self.cipher, &key, plaintext.as_bytes())?;
        // TTLs past the i64 range clamp to the far future instead of wrapping.
        let ttl = i64::try_from(ttl_seconds).unwrap_or(i64::MAX);
        let expires_at = unix_now().saturating_add(ttl);

        let secret = Secret::new(identifier.clone(), ciphertext, expires_at, views);
        self.store.insert(&secret)?;

        debug!(identifier = %identifier, views, ttl_seconds, "stored secret");
        Ok(Reference::new(identifier, key.to_hex()))
    }

    /// Redeem one view of the secret behind `reference` and return its
    /// plaintext.
    ///
    /// The view is consumed before decryption, so presenting a wrong key
    /// still spends it ([`Error::DecryptionFailed`]). An absent, expired,
    /// fully consumed, or concurrently won record is
    /// [`Error::SecretNotFound`]; the two render the same message, so a
    /// caller probing references learns nothing from the difference.
    pub fn retrieve(&self, reference: &str) -> Result<String, Error> {
        let reference = Reference::decode(reference)?;

        let mut secret = self
            .store
            .get(reference.identifier())?
            .ok_or(Error::SecretNotFound)?;

        // Consume-or-delete, conditional on the view count observed at get:
        // the backend refuses the write if another retrieval moved it first.
        let observed = secret.remaining_views();
        secret.decrement_views()?;
        let views_left = secret.remaining_views();
        let applied = if views_left > 0 {
            self.store.update(&secret, observed)?
        } else {
            self.store.delete(&secret, observed)?
        };
        if !applied {
            // The concurrent winner consumed this view.
            return Err(Error::SecretNotFound);
        }

        if views_left == 0 {
            debug!(identifier = %reference.identifier(), "burned after final view");
        } else {
            debug!(identifier = %reference.identifier(), views_left, "consumed secret view");
        }

        let key = KeyMaterial::from_hex(reference.key())?;
        let plaintext = cipher::decrypt(self.cipher, &key, secret.ciphertext())?;
        String::from_utf8(plaintext).map_err(|_| Error::DecryptionFailed)
    }

    /// Sweep expired records out of the backend. Returns how many were
    /// removed. Retrieval correctness never depends on this running.
    pub fn prune(&self) -> Result<usize, Error> {
        Ok(self.store.prune()?)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Barrier};
    use std::thread;

    use tempfile::tempdir;

    use super::*;
    use crate::store::{FileStore, MemoryStore, RedbStore};

    fn vault() -> Vault<MemoryStore> {
        Vault::new(MemoryStore::new())
    }

    #[test]
    fn store_returns_wellformed_reference() {
        let reference = vault().store("hunter2", 3600, 1).unwrap();
        assert_eq!(reference.identifier().len(), 32);
        assert!(reference.identifier().chars().all(|c| c.is_ascii_hexdigit()));
        // 256-bit key, hex-encoded.
        assert_eq!(reference.key().len(), 64);
        assert_eq!(reference.encode().matches(';').count(), 1);
    }

    #[test]
    fn single_view_secret_serves_exactly_once() {
        let v = vault();
        let reference = v.store("hunter2", 3600, 1).unwrap().encode();

        assert_eq!(v.retrieve(&reference).unwrap(), "hunter2");
        assert_eq!(v.retrieve(&reference), Err(Error::SecretNotFound));
    }

    #[test]
    fn two_view_secret_serves_exactly_twice() {
        let v = vault();
        let reference = v.store("hunter2", 3600, 2).unwrap().encode();

        assert_eq!(v.retrieve(&reference).unwrap(), "hunter2");
        assert_eq!(v.retrieve(&reference).unwrap(), "hunter2");
        assert_eq!(v.retrieve(&reference), Err(Error::SecretNotFound));
    }

    #[test]
    fn validation_rejects_before_touching_storage() {
        let store = MemoryStore::new();
        let v = Vault::new(store.clone());

        assert_eq!(v.store("", 3600, 1), Err(Error::EmptySecret));
        assert_eq!(
            v.store("x", 0, 1).unwrap_err(),
            Error::InvalidTtl,
            "zero ttl"
        );
        assert_eq!(
            v.store("x", 3600, 0).unwrap_err(),
            Error::InvalidViews,
            "zero views"
        );
        assert!(store.is_empty());
    }

    #[test]
    fn enormous_ttl_clamps_instead_of_wrapping() {
        let v = vault();
        for ttl in [i64::MAX as u64, u64::MAX] {
            let reference = v.store("hunter2", ttl, 1).unwrap().encode();
            assert_eq!(v.retrieve(&reference).unwrap(), "hunter2");
        }
    }

    #[test]
    fn malformed_reference_is_rejected() {
        assert_eq!(
            vault().retrieve("no delimiter here"),
            Err(Error::MalformedReference)
        );
    }

    #[test]
    fn unknown_identifier_is_not_found() {
        assert_eq!(
            vault().retrieve("deadbeef00112233;00ff"),
            Err(Error::SecretNotFound)
        );
    }

    #[test]
    fn wrong_key_burns_the_view() {
        let v = vault();
        let reference = v.store("hunter2", 3600, 2).unwrap();

        let forged = Reference::new(
            reference.identifier().to_owned(),
            KeyMaterial::generate(CipherKind::Aes256Gcm).to_hex(),
        );
        assert_eq!(v.retrieve(&forged.encode()), Err(Error::DecryptionFailed));

        // One of the two views is gone; the real key gets the last one.
        assert_eq!(v.retrieve(&reference.encode()).unwrap(), "hunter2");
        assert_eq!(v.retrieve(&reference.encode()), Err(Error::SecretNotFound));
    }

    #[test]
    fn unavailable_outcomes_share_one_message() {
        let v = vault();
        let reference = v.store("hunter2", 3600, 1).unwrap();
        let forged = Reference::new(
            reference.identifier().to_owned(),
            KeyMaterial::generate(CipherKind::Aes256Gcm).to_hex(),
        );

        let wrong_key = v.retrieve(&forged.encode()).unwrap_err();
        let absent = v.retrieve("deadbeef;00ff").unwrap_err();
        assert_ne!(wrong_key, absent);
        assert_eq!(wrong_key.to_string(), absent.to_string());
    }

    #[test]
    fn expired_secret_is_unavailable() {
        let store = MemoryStore::new();
        let v = Vault::new(store.clone());

        let key = KeyMaterial::generate(CipherKind::Aes256Gcm);
        let ciphertext =
            cipher::encrypt(CipherKind::Aes256Gcm, &key, b"stale").unwrap();
        let secret = Secret::new("feedface".into(), ciphertext, unix_now() - 1, 1);
        store.insert(&secret).unwrap();

        let reference = Reference::new("feedface".into(), key.to_hex());
        assert_eq!(v.retrieve(&reference.encode()), Err(Error::SecretNotFound));
    }

    #[test]
    fn prune_reports_swept_records() {
        let store = MemoryStore::new();
        let v = Vault::new(store.clone());

        v.store("live", 3600, 1).unwrap();
        let dead = Secret::new("dead".into(), b"x".to_vec(), unix_now() - 1, 1);
        store.insert(&dead).unwrap();

        assert_eq!(v.prune().unwrap(), 1);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn aes128_round_trips_end_to_end() {
        let v = Vault::with_cipher(MemoryStore::new(), CipherKind::Aes128Gcm);
        let reference = v.store("hunter2", 3600, 1).unwrap();
        assert_eq!(reference.key().len(), 32);
        assert_eq!(v.retrieve(&reference.encode()).unwrap(), "hunter2");
    }

    /// Race one view between two engines. The two stores may be clones of
    /// one handle or independent opens on the same data; either way exactly
    /// one retrieval wins.
    fn race_two_retrievals<S: SecretStore + 'static>(store: S, other_handle: S) {
        let first = Vault::new(store);
        let second = Vault::new(other_handle);
        let reference = first.store("hunter2", 3600, 1).unwrap().encode();

        let barrier = Arc::new(Barrier::new(2));
        let handles: Vec<_> = [first, second]
            .into_iter()
            .map(|v| {
                let reference = reference.clone();
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    v.retrieve(&reference)
                })
            })
            .collect();

        let outcomes: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let winners = outcomes.iter().filter(|r| r.is_ok()).count();
        assert_eq!(winners, 1, "exactly one retrieval may win: {outcomes:?}");
        assert!(outcomes
            .iter()
            .any(|r| matches!(r, Err(Error::SecretNotFound))));
        assert_eq!(
            outcomes.iter().find_map(|r| r.as_ref().ok()).unwrap(),
            "hunter2"
        );
    }

    #[test]
    fn concurrent_retrievals_consume_one_view_memory() {
        let store = MemoryStore::new();
        race_two_retrievals(store.clone(), store);
    }

    #[test]
    fn concurrent_retrievals_consume_one_view_redb() {
        let dir = tempdir().unwrap();
        let store = RedbStore::open(dir.path().join("race.db")).unwrap();
        race_two_retrievals(store.clone(), store);
    }

    #[test]
    fn concurrent_retrievals_consume_one_view_file() {
        let dir = tempdir().unwrap();
        race_two_retrievals(
            FileStore::open(dir.path()).unwrap(),
            FileStore::open(dir.path()).unwrap(),
        );
    }
}
