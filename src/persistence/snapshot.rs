//! Snapshot files
//!
//! A snapshot is a JSON document holding every database. Keys and payloads
//! are hex encoded so arbitrary bytes survive the trip:
//!
//! ```json
//! {
//!   "version": 1,
//!   "databases": [
//!     { "index": 0, "entries": [
//!       { "key": "6e616d65", "expires_at": null,
//!         "value": { "type": "string", "data": "74696465" } }
//!     ] }
//!   ]
//! }
//! ```
//!
//! The server only reads snapshots; it uses one at startup when there is no
//! append-only log to replay.

use crate::persistence::PersistenceError;
use crate::storage::{Entry, Keyspace, Value};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::path::Path;
use tracing::info;

/// Current snapshot format version.
pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u32,
    pub databases: Vec<SnapshotDatabase>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotDatabase {
    pub index: usize,
    pub entries: Vec<SnapshotEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    /// Hex-encoded key
    pub key: String,
    /// Unix milliseconds
    #[serde(default)]
    pub expires_at: Option<u64>,
    pub value: SnapshotValue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SnapshotValue {
    String { data: String },
    List { items: Vec<String> },
    Hash { fields: BTreeMap<String, String> },
    Set { members: Vec<String> },
}

/// What a snapshot load restored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SnapshotStats {
    pub keys: usize,
    /// Entries skipped because their deadline had already passed
    pub expired: usize,
}

fn unhex(s: &str) -> Result<Bytes, PersistenceError> {
    hex::decode(s)
        .map(Bytes::from)
        .map_err(|e| PersistenceError::InvalidSnapshot(format!("bad hex {s:?}: {e}")))
}

impl SnapshotValue {
    fn into_value(self) -> Result<Value, PersistenceError> {
        Ok(match self {
            SnapshotValue::String { data } => Value::String(unhex(&data)?),
            SnapshotValue::List { items } => Value::List(
                items
                    .iter()
                    .map(|i| unhex(i))
                    .collect::<Result<VecDeque<_>, _>>()?,
            ),
            SnapshotValue::Hash { fields } => Value::Hash(
                fields
                    .iter()
                    .map(|(f, v)| Ok((unhex(f)?, unhex(v)?)))
                    .collect::<Result<HashMap<_, _>, PersistenceError>>()?,
            ),
            SnapshotValue::Set { members } => Value::Set(
                members
                    .iter()
                    .map(|m| unhex(m))
                    .collect::<Result<HashSet<_>, _>>()?,
            ),
        })
    }
}

impl Snapshot {
    pub fn from_json(data: &[u8]) -> Result<Self, PersistenceError> {
        let snapshot: Snapshot = serde_json::from_slice(data)?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(PersistenceError::InvalidSnapshot(format!(
                "unsupported version {}",
                snapshot.version
            )));
        }
        Ok(snapshot)
    }

    /// Restores every entry into `keyspace`, skipping ones already expired.
    pub fn restore_into(self, keyspace: &Keyspace, now: u64) -> Result<SnapshotStats, PersistenceError> {
        let mut stats = SnapshotStats::default();

        for database in self.databases {
            let db = keyspace.db(database.index).ok_or_else(|| {
                PersistenceError::InvalidSnapshot(format!(
                    "database {} does not exist (configured: {})",
                    database.index,
                    keyspace.len()
                ))
            })?;

            for entry in database.entries {
                let key = unhex(&entry.key)?;
                let value = entry.value.into_value()?;
                if value.is_empty_aggregate() {
                    continue;
                }
                match entry.expires_at {
                    Some(at) if at <= now => stats.expired += 1,
                    Some(at) => {
                        db.restore(key, Entry::with_expiry(value, at));
                        stats.keys += 1;
                    }
                    None => {
                        db.restore(key, Entry::new(value));
                        stats.keys += 1;
                    }
                }
            }
        }

        Ok(stats)
    }
}

/// Reads the snapshot at `path` into `keyspace`.
pub fn load_snapshot(
    path: &Path,
    keyspace: &Keyspace,
    now: u64,
) -> Result<SnapshotStats, PersistenceError> {
    let data = std::fs::read(path).map_err(|e| PersistenceError::io(path, e))?;
    let stats = Snapshot::from_json(&data)?.restore_into(keyspace, now)?;
    info!(
        path = %path.display(),
        keys = stats.keys,
        skipped_expired = stats.expired,
        "Snapshot loaded"
    );
    Ok(stats)
}


#[cfg(test)]
mod tests {
    use super::test_support::snapshot_of;
    use super::*;
    use tempfile::TempDir;

    fn sample_keyspace() -> Keyspace {
        let keyspace = Keyspace::new(4);
        let db0 = keyspace.db(0).unwrap();
        db0.set(Bytes::from("name"), Value::from("tide"), 0);
        db0.restore(
            Bytes::from("session"),
            Entry::with_expiry(Value::from("token"), 50_000),
        );
        db0.restore(
            Bytes::from("stale"),
            Entry::with_expiry(Value::from("old"), 10),
        );

        let db2 = keyspace.db(2).unwrap();
        db2.set(
            Bytes::from("list"),
            Value::List(VecDeque::from(vec![Bytes::from("a"), Bytes::from("b")])),
            0,
        );
        db2.set(
            Bytes::from(&b"bin\x00key"[..]),
            Value::Hash(HashMap::from([(Bytes::from("f"), Bytes::from(&b"\xff"[..]))])),
            0,
        );
        db2.set(
            Bytes::from("tags"),
            Value::Set(HashSet::from([Bytes::from("x"), Bytes::from("y")])),
            0,
        );
        keyspace
    }

    #[test]
    fn test_load_restores_all_types() {
        let source = sample_keyspace();
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dump.json");
        std::fs::write(&path, serde_json::to_vec(&snapshot_of(&source)).unwrap()).unwrap();

        let target = Keyspace::new(4);
        let stats = load_snapshot(&path, &target, 1_000).unwrap();
        assert_eq!(stats, SnapshotStats { keys: 5, expired: 1 });

        let mut expected = source.export();
        expected[0].remove(&Bytes::from("stale"));
        assert_eq!(target.export(), expected);
    }

    #[test]
    fn test_reads_documented_format() {
        let json = br#"{
            "version": 1,
            "databases": [
                { "index": 1, "entries": [
                    { "key": "6e616d65", "value": { "type": "string", "data": "74696465" } },
                    { "key": "6c", "expires_at": 99999,
                      "value": { "type": "list", "items": ["61", "62"] } }
                ] }
            ]
        }"#;

        let keyspace = Keyspace::new(2);
        let stats = Snapshot::from_json(json)
            .unwrap()
            .restore_into(&keyspace, 0)
            .unwrap();
        assert_eq!(stats.keys, 2);

        let db = keyspace.db(1).unwrap();
        assert_eq!(db.get(&Bytes::from("name"), 0), Some(Value::from("tide")));
        assert_eq!(db.expiry_of(&Bytes::from("l"), 0), Some(Some(99_999)));
    }

    #[test]
    fn test_rejects_unknown_version_and_database() {
        let keyspace = Keyspace::new(1);
        let err = Snapshot::from_json(br#"{"version": 7, "databases": []}"#).unwrap_err();
        assert!(matches!(err, PersistenceError::InvalidSnapshot(_)));

        let snapshot = Snapshot::from_json(
            br#"{"version": 1, "databases": [{"index": 3, "entries": []}]}"#,
        )
        .unwrap();
        assert!(snapshot.restore_into(&keyspace, 0).is_err());
    }

    #[test]
    fn test_rejects_bad_hex_and_json() {
        let keyspace = Keyspace::new(1);
        let snapshot = Snapshot::from_json(
            br#"{"version": 1, "databases": [{"index": 0, "entries": [
                {"key": "zz", "value": {"type": "string", "data": "00"}}
            ]}]}"#,
        )
        .unwrap();
        assert!(snapshot.restore_into(&keyspace, 0).is_err());

        assert!(matches!(
            Snapshot::from_json(b"not json"),
            Err(PersistenceError::Json(_))
        ));
    }
}
