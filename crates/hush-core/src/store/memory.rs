use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info};

use super::{SecretStore, StoreError};
use crate::secret::{unix_now, Secret};

/// In-memory backend: a `HashMap` behind one mutex.
///
/// The mutex is the single writer that makes conditional `update`/`delete`
/// atomic with respect to concurrent `get` calls. Clones share the same map,
/// so one store can serve many threads.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<HashMap<String, Secret>>>,
}

impl MemoryStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records currently held, expired ones included.
    ///
    /// Useful for debugging and testing.
    pub fn len(&self) -> usize {
        self.locked().len()
    }

    /// True when no records are held.
    pub fn is_empty(&self) -> bool {
        self.locked().is_empty()
    }

    /// # Panics
    ///
    /// Panics if the mutex is poisoned (a thread panicked while holding it).
    fn locked(&self) -> MutexGuard<'_, HashMap<String, Secret>> {
        self.inner.lock().expect("mutex poisoned")
    }
}

impl SecretStore for MemoryStore {
    fn insert(&self, secret: &Secret) -> Result<(), StoreError> {
        let now = unix_now();
        let mut map = self.locked();

        if let Some(existing) = map.get(secret.identifier()) {
            if !existing.is_expired(now) {
                return Err(StoreError::AlreadyExists {
                    identifier: secret.identifier().to_owned(),
                });
            }
            // Expired occupant; the fresh record displaces it below.
        }
        map.insert(secret.identifier().to_owned(), secret.clone());
        Ok(())
    }

    fn get(&self, identifier: &str) -> Result<Option<Secret>, StoreError> {
        let now = unix_now();
        let mut map = self.locked();

        // Clone up front so the map borrow ends before any eviction.
        let found: Option<Secret> = map.get(identifier).cloned();
        match found {
            None => Ok(None),
            Some(record) if record.is_expired(now) => {
                map.remove(identifier);
                debug!(identifier = %identifier, "lazy-evicted expired secret");
                Ok(None)
            }
            Some(record) => Ok(Some(record)),
        }
    }

    fn update(&self, secret: &Secret, expected_views: u32) -> Result<bool, StoreError> {
        let now = unix_now();
        let mut map = self.locked();

        // Copy the liveness verdict out so the map borrow ends first.
        let current = map
            .get(secret.identifier())
            .map(|r| (r.is_expired(now), r.remaining_views()));
        match current {
            Some((true, _)) => {
                map.remove(secret.identifier());
                Ok(false)
            }
            Some((false, views)) if views == expected_views => {
                map.insert(secret.identifier().to_owned(), secret.clone());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn delete(&self, secret: &Secret, expected_views: u32) -> Result<bool, StoreError> {
        let now = unix_now();
        let mut map = self.locked();

        let current = map
            .get(secret.identifier())
            .map(|r| (r.is_expired(now), r.remaining_views()));
        match current {
            Some((true, _)) => {
                map.remove(secret.identifier());
                Ok(false)
            }
            Some((false, views)) if views == expected_views => {
                map.remove(secret.identifier());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn prune(&self) -> Result<usize, StoreError> {
        let now = unix_now();
        let mut map = self.locked();

        let before = map.len();
        map.retain(|_, record| !record.is_expired(now));
        let removed = before - map.len();
        if removed > 0 {
            info!(removed, "pruned expired secrets");
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn live(identifier: &str, views: u32) -> Secret {
        Secret::new(identifier.into(), b"blob".to_vec(), unix_now() + 3600, views)
    }

    fn expired(identifier: &str) -> Secret {
        Secret::new(identifier.into(), b"blob".to_vec(), unix_now() - 1, 1)
    }

    #[test]
    fn insert_then_get_round_trips() {
        let store = MemoryStore::new();
        store.insert(&live("a", 2)).unwrap();
        let got = store.get("a").unwrap().unwrap();
        assert_eq!(got.identifier(), "a");
        assert_eq!(got.remaining_views(), 2);
    }

    #[test]
    fn get_absent_is_none() {
        let store = MemoryStore::new();
        assert!(store.get("missing").unwrap().is_none());
    }

    #[test]
    fn insert_rejects_live_duplicate() {
        let store = MemoryStore::new();
        store.insert(&live("dup", 1)).unwrap();
        let err = store.insert(&live("dup", 1)).unwrap_err();
        assert_eq!(
            err,
            StoreError::AlreadyExists {
                identifier: "dup".into()
            }
        );
    }

    #[test]
    fn insert_displaces_expired_occupant() {
        let store = MemoryStore::new();
        store.insert(&expired("slot")).unwrap();
        store.insert(&live("slot", 3)).unwrap();
        assert_eq!(store.get("slot").unwrap().unwrap().remaining_views(), 3);
    }

    #[test]
    fn get_evicts_expired() {
        let store = MemoryStore::new();
        store.insert(&expired("old")).unwrap();
        assert_eq!(store.len(), 1);
        assert!(store.get("old").unwrap().is_none());
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn update_applies_only_on_matching_views() {
        let store = MemoryStore::new();
        store.insert(&live("u", 3)).unwrap();

        let decremented = live("u", 2);
        assert!(store.update(&decremented, 3).unwrap());
        assert_eq!(store.get("u").unwrap().unwrap().remaining_views(), 2);

        // Stale expectation: the count moved to 2 already.
        assert!(!store.update(&live("u", 1), 3).unwrap());
        assert_eq!(store.get("u").unwrap().unwrap().remaining_views(), 2);
    }

    #[test]
    fn update_absent_is_false() {
        let store = MemoryStore::new();
        assert!(!store.update(&live("ghost", 1), 2).unwrap());
    }

    #[test]
    fn delete_twice_second_is_false() {
        let store = MemoryStore::new();
        let s = live("d", 1);
        store.insert(&s).unwrap();
        assert!(store.delete(&s, 1).unwrap());
        assert!(!store.delete(&s, 1).unwrap());
    }

    #[test]
    fn delete_refuses_on_view_mismatch() {
        let store = MemoryStore::new();
        store.insert(&live("d", 2)).unwrap();
        assert!(!store.delete(&live("d", 2), 1).unwrap());
        assert!(store.get("d").unwrap().is_some());
    }

    #[test]
    fn prune_sweeps_only_expired() {
        let store = MemoryStore::new();
        store.insert(&live("keep", 1)).unwrap();
        store.insert(&expired("drop1")).unwrap();
        store.insert(&expired("drop2")).unwrap();

        assert_eq!(store.prune().unwrap(), 2);
        assert_eq!(store.len(), 1);
        assert!(store.get("keep").unwrap().is_some());
    }
}
