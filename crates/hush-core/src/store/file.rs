use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use tracing::{debug, info, warn};

use super::{SecretStore, StoreError};
use crate::secret::{unix_now, Secret};

/// One mutex per canonical store directory. Handles opened independently on
/// the same directory share it, so their operations serialize like clones.
static DIR_LOCKS: OnceLock<Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>> = OnceLock::new();

/// # Panics
///
/// Panics if the registry mutex is poisoned.
fn dir_lock(dir: &Path) -> Result<Arc<Mutex<()>>, StoreError> {
    let canonical = dir.canonicalize()?;
    let mut registry = DIR_LOCKS
        .get_or_init(|| Mutex::new(HashMap::new()))
        .lock()
        .expect("mutex poisoned");
    Ok(registry
        .entry(canonical)
        .or_insert_with(|| Arc::new(Mutex::new(())))
        .clone())
}

/// Directory-backed store: one JSON file per identifier.
///
/// Every handle on a directory in this process, whether cloned or opened
/// separately, holds the same mutex, so conditional `update`/`delete` never
/// interleave with a concurrent `get`. Records survive restarts; a second
/// `FileStore` opened on the same directory sees them. Processes are not
/// coordinated: a directory belongs to one process at a time.
#[derive(Clone)]
pub struct FileStore {
    dir: PathBuf,
    lock: Arc<Mutex<()>>,
}

impl FileStore {
    /// Open the store rooted at `dir`, creating the directory if needed.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        let lock = dir_lock(&dir)?;
        Ok(Self { dir, lock })
    }

    /// # Panics
    ///
    /// Panics if the mutex is poisoned (a thread panicked while holding it).
    fn locked(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().expect("mutex poisoned")
    }

    /// Identifiers become file names directly, so anything outside
    /// `[A-Za-z0-9]` has no path here.
    fn record_path(&self, identifier: &str) -> Option<PathBuf> {
        if identifier.is_empty() || !identifier.chars().all(|c| c.is_ascii_alphanumeric()) {
            return None;
        }
        Some(self.dir.join(format!("{identifier}.json")))
    }

    fn read_record(path: &Path) -> Result<Option<Secret>, StoreError> {
        match fs::read(path) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Write through a temp file and rename, so no reader sees a torn record.
    fn write_record(path: &Path, secret: &Secret) -> Result<(), StoreError> {
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec(secret)?)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

impl SecretStore for FileStore {
    fn insert(&self, secret: &Secret) -> Result<(), StoreError> {
        let now = unix_now();
        let _guard = self.locked();

        let path = self.record_path(secret.identifier()).ok_or_else(|| {
            StoreError::Io(format!(
                "identifier not usable as a file name: {}",
                secret.identifier()
            ))
        })?;

        if let Some(existing) = Self::read_record(&path)? {
            if !existing.is_expired(now) {
                return Err(StoreError::AlreadyExists {
                    identifier: secret.identifier().to_owned(),
                });
            }
            // Expired occupant; overwritten below.
        }
        Self::write_record(&path, secret)
    }

    fn get(&self, identifier: &str) -> Result<Option<Secret>, StoreError> {
        let now = unix_now();
        let _guard = self.locked();

        let Some(path) = self.record_path(identifier) else {
            return Ok(None);
        };
        match Self::read_record(&path)? {
            None => Ok(None),
            Some(record) if record.is_expired(now) => {
                fs::remove_file(&path)?;
                debug!(identifier = %identifier, "lazy-evicted expired secret");
                Ok(None)
            }
            Some(record) => Ok(Some(record)),
        }
    }

    fn update(&self, secret: &Secret, expected_views: u32) -> Result<bool, StoreError> {
        let now = unix_now();
        let _guard = self.locked();

        let Some(path) = self.record_path(secret.identifier()) else {
            return Ok(false);
        };
        match Self::read_record(&path)? {
            Some(record) if record.is_expired(now) => {
                fs::remove_file(&path)?;
                Ok(false)
            }
            Some(record) if record.remaining_views() == expected_views => {
                Self::write_record(&path, secret)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn delete(&self, secret: &Secret, expected_views: u32) -> Result<bool, StoreError> {
        let now = unix_now();
        let _guard = self.locked();

        let Some(path) = self.record_path(secret.identifier()) else {
            return Ok(false);
        };
        match Self::read_record(&path)? {
            Some(record) if record.is_expired(now) => {
                fs::remove_file(&path)?;
                Ok(false)
            }
            Some(record) if record.remaining_views() == expected_views => {
                fs::remove_file(&path)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn prune(&self) -> Result<usize, StoreError> {
        let now = unix_now();
        let _guard = self.locked();

        let mut removed = 0usize;
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if name.ends_with(".json.tmp") {
                // Only left behind if a write died between temp write and
                // rename; it never became a record.
                warn!(path = %path.display(), "removing abandoned temp file");
                fs::remove_file(&path)?;
                removed += 1;
                continue;
            }
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match Self::read_record(&path) {
                Ok(Some(record)) if record.is_expired(now) => {
                    fs::remove_file(&path)?;
                    removed += 1;
                }
                Ok(_) => {}
                Err(StoreError::Corrupt(reason)) => {
                    // A record we can no longer decode will never be
                    // readable again; sweep it with the expired ones.
                    warn!(path = %path.display(), %reason, "removing undecodable record");
                    fs::remove_file(&path)?;
                    removed += 1;
                }
                Err(e) => return Err(e),
            }
        }
        if removed > 0 {
            info!(removed, "pruned expired secrets");
        }
        Ok(removed)
    }
}
