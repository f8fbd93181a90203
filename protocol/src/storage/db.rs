//! # NominaDB — Persistent Storage Engine
//!
//! Built on sled's embedded key-value store.
//!
//! ## Tree Layout
//!
//! | Tree        | Key                 | Value              |
//! |-------------|---------------------|--------------------|
//! | `snapshots` | name (UTF-8)        | `bincode(T)`       |
//! | `events`    | `seq` (8B BE)       | `bincode(E)`       |
//! | `metadata`  | key (UTF-8)         | value (bytes)      |
//!
//! Event sequence numbers are big-endian so sled's lexicographic order is
//! numeric order and `events_since` is a plain range scan.
//!
//! ## Atomicity
//!
//! `save_snapshot_with_events` writes the snapshot and the events it
//! produced in one multi-tree transaction. A crash can never leave a
//! snapshot on disk without the events that explain it.

use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::transaction::{ConflictableTransactionError, TransactionError, Transactional};
use sled::{Db, Tree};

// ---------------------------------------------------------------------------
// Error Type
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("key not found: {0}")]
    NotFound(String),

    #[error("storage schema mismatch: found v{found}, expected v{expected}")]
    SchemaMismatch { found: u32, expected: u32 },
}

impl From<TransactionError<DbError>> for DbError {
    fn from(err: TransactionError<DbError>) -> Self {
        match err {
            TransactionError::Abort(inner) => inner,
            TransactionError::Storage(e) => DbError::Sled(e),
        }
    }
}

pub type DbResult<T> = Result<T, DbError>;

// ---------------------------------------------------------------------------
// Metadata Keys
// ---------------------------------------------------------------------------

const META_SCHEMA_VERSION: &[u8] = b"schema_version";
const META_LAST_SAVED_AT: &[u8] = b"last_saved_at";
const META_NEXT_EVENT_SEQ: &[u8] = b"next_event_seq";

/// Bumped whenever the on-disk snapshot shape changes incompatibly.
pub const SCHEMA_VERSION: u32 = 1;

fn encode<T: Serialize + ?Sized>(value: &T) -> DbResult<Vec<u8>> {
    bincode::serialize(value).map_err(|e| DbError::Serialization(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> DbResult<T> {
    bincode::deserialize(bytes).map_err(|e| DbError::Serialization(e.to_string()))
}

fn read_u64(bytes: &[u8]) -> DbResult<u64> {
    let arr: [u8; 8] = bytes
        .try_into()
        .map_err(|_| DbError::Serialization(format!("expected 8 bytes, got {}", bytes.len())))?;
    Ok(u64::from_be_bytes(arr))
}

// ---------------------------------------------------------------------------
// NominaDB
// ---------------------------------------------------------------------------

/// Persistent storage for a Nomina node.
///
/// sled trees are safe for concurrent use, so a `NominaDB` can be cloned
/// into every request handler without extra locking.
#[derive(Debug, Clone)]
pub struct NominaDB {
    db: Db,
    snapshots: Tree,
    events: Tree,
    metadata: Tree,
}

impl NominaDB {
    /// Opens or creates a database at `path`.
    ///
    /// Fails with [`DbError::SchemaMismatch`] if the directory holds data
    /// written by an incompatible version.
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// An in-memory database removed on drop. For tests.
    pub fn open_temporary() -> DbResult<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> DbResult<Self> {
        let store = Self {
            snapshots: db.open_tree("snapshots")?,
            events: db.open_tree("events")?,
            metadata: db.open_tree("metadata")?,
            db,
        };

        match store.metadata.get(META_SCHEMA_VERSION)? {
            Some(bytes) => {
                let found = decode::<u32>(&bytes)?;
                if found != SCHEMA_VERSION {
                    return Err(DbError::SchemaMismatch {
                        found,
                        expected: SCHEMA_VERSION,
                    });
                }
            }
            None => {
                store
                    .metadata
                    .insert(META_SCHEMA_VERSION, encode(&SCHEMA_VERSION)?)?;
            }
        }

        Ok(store)
    }

    // -- Snapshots ----------------------------------------------------------

    pub fn put_snapshot<T: Serialize>(&self, key: &str, value: &T) -> DbResult<()> {
        self.snapshots.insert(key.as_bytes(), encode(value)?)?;
        self.touch()?;
        Ok(())
    }

    pub fn get_snapshot<T: DeserializeOwned>(&self, key: &str) -> DbResult<Option<T>> {
        self.snapshots
            .get(key.as_bytes())?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    /// Like [`get_snapshot`](Self::get_snapshot) but missing is an error.
    pub fn require_snapshot<T: DeserializeOwned>(&self, key: &str) -> DbResult<T> {
        self.get_snapshot(key)?
            .ok_or_else(|| DbError::NotFound(key.to_string()))
    }

    /// Writes a snapshot and appends `events` in one transaction.
    ///
    /// Returns the sequence number assigned to the first event (or the next
    /// free sequence number when `events` is empty).
    pub fn save_snapshot_with_events<T: Serialize, E: Serialize>(
        &self,
        key: &str,
        snapshot: &T,
        events: &[E],
    ) -> DbResult<u64> {
        let snapshot_bytes = encode(snapshot)?;
        let event_bytes = events.iter().map(encode).collect::<DbResult<Vec<_>>>()?;
        let saved_at = encode(&chrono::Utc::now().timestamp())?;

        let first_seq = (&self.snapshots, &self.events, &self.metadata).transaction(
            |(snapshots, log, meta)| {
                let first = match meta.get(META_NEXT_EVENT_SEQ)? {
                    Some(bytes) => read_u64(&bytes).map_err(ConflictableTransactionError::Abort)?,
                    None => 0,
                };
                let mut seq = first;
                for bytes in &event_bytes {
                    log.insert(&seq.to_be_bytes(), bytes.as_slice())?;
                    seq += 1;
                }
                meta.insert(META_NEXT_EVENT_SEQ, &seq.to_be_bytes())?;
                meta.insert(META_LAST_SAVED_AT, saved_at.as_slice())?;
                snapshots.insert(key.as_bytes(), snapshot_bytes.as_slice())?;
                Ok(first)
            },
        )?;

        self.db.flush()?;
        Ok(first_seq)
    }

    // -- Event log ----------------------------------------------------------

    /// Appends a single event, returning its sequence number.
    pub fn append_event<E: Serialize>(&self, event: &E) -> DbResult<u64> {
        let bytes = encode(event)?;
        let seq = (&self.events, &self.metadata).transaction(|(log, meta)| {
            let seq = match meta.get(META_NEXT_EVENT_SEQ)? {
                Some(raw) => read_u64(&raw).map_err(ConflictableTransactionError::Abort)?,
                None => 0,
            };
            log.insert(&seq.to_be_bytes(), bytes.as_slice())?;
            meta.insert(META_NEXT_EVENT_SEQ, &(seq + 1).to_be_bytes())?;
            Ok(seq)
        })?;
        Ok(seq)
    }

    /// Up to `limit` events with sequence number `>= from`, in order.
    pub fn events_since<E: DeserializeOwned>(
        &self,
        from: u64,
        limit: usize,
    ) -> DbResult<Vec<(u64, E)>> {
        self.events
            .range(from.to_be_bytes()..)
            .take(limit)
            .map(|entry| {
                let (key, value) = entry?;
                Ok((read_u64(&key)?, decode(&value)?))
            })
            .collect()
    }

    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    // -- Metadata -----------------------------------------------------------

    /// Unix seconds of the last snapshot write, if any.
    pub fn last_saved_at(&self) -> DbResult<Option<i64>> {
        self.metadata
            .get(META_LAST_SAVED_AT)?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    fn touch(&self) -> DbResult<()> {
        let now = encode(&chrono::Utc::now().timestamp())?;
        self.metadata.insert(META_LAST_SAVED_AT, now)?;
        Ok(())
    }

    pub fn flush(&self) -> DbResult<()> {
        self.db.flush()?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::collections::HashMap;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Ledger {
        owners: HashMap<String, u64>,
        paused: bool,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    enum Event {
        Registered { name: String, expiry: i64 },
        Withdrawn(u128),
    }

    fn ledger() -> Ledger {
        let mut owners = HashMap::new();
        owners.insert("alice".to_string(), 7);
        Ledger {
            owners,
            paused: false,
        }
    }

    #[test]
    fn open_temporary_database() {
        let db = NominaDB::open_temporary().unwrap();
        assert_eq!(db.event_count(), 0);
        assert!(db.get_snapshot::<Ledger>("main").unwrap().is_none());
    }

    #[test]
    fn snapshot_round_trip() {
        let db = NominaDB::open_temporary().unwrap();
        db.put_snapshot("main", &ledger()).unwrap();
        assert_eq!(db.require_snapshot::<Ledger>("main").unwrap(), ledger());
        assert!(db.last_saved_at().unwrap().is_some());
    }

    #[test]
    fn require_missing_snapshot_is_not_found() {
        let db = NominaDB::open_temporary().unwrap();
        assert!(matches!(
            db.require_snapshot::<Ledger>("nope"),
            Err(DbError::NotFound(key)) if key == "nope"
        ));
    }

    #[test]
    fn events_are_sequenced_in_order() {
        let db = NominaDB::open_temporary().unwrap();
        let first = db
            .append_event(&Event::Registered {
                name: "alpha".into(),
                expiry: 10,
            })
            .unwrap();
        let second = db.append_event(&Event::Withdrawn(5)).unwrap();
        assert_eq!((first, second), (0, 1));

        let all: Vec<(u64, Event)> = db.events_since(0, 100).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[1], (1, Event::Withdrawn(5)));

        let tail: Vec<(u64, Event)> = db.events_since(1, 100).unwrap();
        assert_eq!(tail.len(), 1);
    }

    #[test]
    fn snapshot_with_events_is_atomic_unit() {
        let db = NominaDB::open_temporary().unwrap();
        let events = vec![Event::Withdrawn(1), Event::Withdrawn(2)];
        let first = db
            .save_snapshot_with_events("main", &ledger(), &events)
            .unwrap();
        assert_eq!(first, 0);
        assert_eq!(db.event_count(), 2);

        let next = db
            .save_snapshot_with_events("main", &ledger(), &[Event::Withdrawn(3)])
            .unwrap();
        assert_eq!(next, 2);

        let none: &[Event] = &[];
        assert_eq!(db.save_snapshot_with_events("main", &ledger(), none).unwrap(), 3);
    }

    #[test]
    fn reopen_persistent_database() {
        let dir = tempfile::tempdir().unwrap();
        {
            let db = NominaDB::open(dir.path()).unwrap();
            db.save_snapshot_with_events("main", &ledger(), &[Event::Withdrawn(9)])
                .unwrap();
        }
        let db = NominaDB::open(dir.path()).unwrap();
        assert_eq!(db.require_snapshot::<Ledger>("main").unwrap(), ledger());
        assert_eq!(db.event_count(), 1);
        assert_eq!(db.append_event(&Event::Withdrawn(10)).unwrap(), 1);
    }

    #[test]
    fn schema_mismatch_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        {
            let db = NominaDB::open(dir.path()).unwrap();
            db.metadata
                .insert(META_SCHEMA_VERSION, encode(&(SCHEMA_VERSION + 1)).unwrap())
                .unwrap();
            db.flush().unwrap();
        }
        assert!(matches!(
            NominaDB::open(dir.path()),
            Err(DbError::SchemaMismatch { .. })
        ));
    }
}
