use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableTable, TableDefinition};
use tracing::{debug, info};

use super::{SecretStore, StoreError};
use crate::secret::{unix_now, Secret};

const SECRETS: TableDefinition<&str, &[u8]> = TableDefinition::new("secrets");

/// Durable backend on a redb database file.
///
/// Every mutation runs inside one write transaction; redb serializes those,
/// which is what makes the conditional `update`/`delete` the single writer
/// per identifier. Clones share the database handle.
#[derive(Clone)]
pub struct RedbStore {
    db: Arc<Database>,
}

impl RedbStore {
    /// Open (or create) the database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db = Database::create(path.as_ref())?;

        // Ensure the table exists so later read transactions can open it.
        let txn = db.begin_write()?;
        txn.open_table(SECRETS)?;
        txn.commit()?;

        Ok(Self { db: Arc::new(db) })
    }
}

impl SecretStore for RedbStore {
    fn insert(&self, secret: &Secret) -> Result<(), StoreError> {
        let now = unix_now();

        let txn = self.db.begin_write()?;
        let result = {
            let mut table = txn.open_table(SECRETS)?;

            let raw: Option<Vec<u8>> = table
                .get(secret.identifier())?
                .map(|guard| guard.value().to_vec());

            let live_occupant = match raw {
                Some(bytes) => !decode(&bytes)?.is_expired(now),
                None => false,
            };
            if live_occupant {
                Err(StoreError::AlreadyExists {
                    identifier: secret.identifier().to_owned(),
                })
            } else {
                table.insert(secret.identifier(), encode(secret)?.as_slice())?;
                Ok(())
            }
        };
        txn.commit()?;
        result
    }

    fn get(&self, identifier: &str) -> Result<Option<Secret>, StoreError> {
        let now = unix_now();

        // A write transaction, so an expired record can be evicted in the
        // same step.
        let txn = self.db.begin_write()?;
        let result = {
            let mut table = txn.open_table(SECRETS)?;

            // Read the raw bytes and immediately clone them so the
            // AccessGuard (which borrows `table`) is dropped before any
            // mutation.
            let raw: Option<Vec<u8>> = table.get(identifier)?.map(|guard| guard.value().to_vec());

            match raw {
                None => None,
                Some(bytes) => {
                    let record = decode(&bytes)?;
                    if record.is_expired(now) {
                        table.remove(identifier)?;
                        debug!(identifier = %identifier, "lazy-evicted expired secret");
                        None
                    } else {
                        Some(record)
                    }
                }
            }
        };
        txn.commit()?;
        Ok(result)
    }

    fn update(&self, secret: &Secret, expected_views: u32) -> Result<bool, StoreError> {
        let now = unix_now();

        let txn = self.db.begin_write()?;
        let applied = {
            let mut table = txn.open_table(SECRETS)?;

            let raw: Option<Vec<u8>> = table
                .get(secret.identifier())?
                .map(|guard| guard.value().to_vec());

            match raw {
                None => false,
                Some(bytes) => {
                    let record = decode(&bytes)?;
                    if record.is_expired(now) {
                        table.remove(secret.identifier())?;
                        false
                    } else if record.remaining_views() == expected_views {
                        table.insert(secret.identifier(), encode(secret)?.as_slice())?;
                        true
                    } else {
                        false
                    }
                }
            }
        };
        txn.commit()?;
        Ok(applied)
    }

    fn delete(&self, secret: &Secret, expected_views: u32) -> Result<bool, StoreError> {
        let now = unix_now();

        let txn = self.db.begin_write()?;
        let applied = {
            let mut table = txn.open_table(SECRETS)?;

            let raw: Option<Vec<u8>> = table
                .get(secret.identifier())?
                .map(|guard| guard.value().to_vec());

            match raw {
                None => false,
                Some(bytes) => {
                    let record = decode(&bytes)?;
                    if record.is_expired(now) {
                        table.remove(secret.identifier())?;
                        false
                    } else if record.remaining_views() == expected_views {
                        table.remove(secret.identifier())?;
                        true
                    } else {
                        false
                    }
                }
            }
        };
        txn.commit()?;
        Ok(applied)
    }

    fn prune(&self) -> Result<usize, StoreError> {
        let now = unix_now();

        // Collect expired identifiers in a read pass first.
        let expired_keys: Vec<String> = {
            let read_txn = self.db.begin_read()?;
            let table = read_txn.open_table(SECRETS)?;
            let mut keys = Vec::new();
            for item in table.iter()? {
                let (k, v) = item?;
                if decode(v.value())?.is_expired(now) {
                    keys.push(k.value().to_owned());
                }
            }
            keys
        };

        if expired_keys.is_empty() {
            return Ok(0);
        }

        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(SECRETS)?;
            for key in &expired_keys {
                table.remove(key.as_str())?;
            }
        }
        txn.commit()?;

        let removed = expired_keys.len();
        info!(removed, "pruned expired secrets");
        Ok(removed)
    }
}

fn encode(secret: &Secret) -> Result<Vec<u8>, StoreError> {
    Ok(bincode::serde::encode_to_vec(
        secret,
        bincode::config::standard(),
    )?)
}

fn decode(bytes: &[u8]) -> Result<Secret, StoreError> {
    let (secret, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())?;
    Ok(secret)
}

impl From<redb::DatabaseError> for StoreError {
    fn from(err: redb::DatabaseError) -> Self {
        StoreError::Io(err.to_string())
    }
}

impl From<redb::TransactionError> for StoreError {
    fn from(err: redb::TransactionError) -> Self {
        StoreError::Io(err.to_string())
    }
}

impl From<redb::TableError> for StoreError {
    fn from(err: redb::TableError) -> Self {
        StoreError::Io(err.to_string())
    }
}

impl From<redb::StorageError> for StoreError {
    fn from(err: redb::StorageError) -> Self {
        StoreError::Io(err.to_string())
    }
}

impl From<redb::CommitError> for StoreError {
    fn from(err: redb::CommitError) -> Self {
        StoreError::Io(err.to_string())
    }
}
