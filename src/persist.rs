//! Persistence: JSON documents under fixed string keys in a key-value store.
//!
//! The graph store and the companion activity log are each serialized as one
//! JSON document. Date fields travel as ISO-8601 strings (chrono's serde
//! form) and are revived on the typed `createdAt`/timestamp fields during
//! deserialization. Object keys beginning with the reserved `__` prefix are
//! derived/ephemeral caches written by older clients and are stripped before
//! anything is stored or parsed.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use redb::{Database, TableDefinition};
use serde_json::Value;

use crate::error::StoreError;
use crate::graph::GraphStore;

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Fixed key for the serialized graph document.
pub const GRAPH_STATE_KEY: &str = "graph/state";

/// Fixed key for the serialized activity log.
pub const ACTIVITY_STATE_KEY: &str = "activity/state";

/// Key prefix under which `backup` snapshots are written.
pub const BACKUP_KEY_PREFIX: &str = "backup/graph/";

/// Field-name prefix marking derived/ephemeral data in legacy documents.
pub const RESERVED_PREFIX: &str = "__";

/// Table for persisted documents (string keys → JSON bytes).
const DOCUMENTS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("documents");

/// Minimal key-value surface the engine persists through.
///
/// The engine never needs scans or transactions spanning keys; one document
/// per `put` is the whole protocol, so test doubles stay trivial.
pub trait KvStore: Send + Sync {
    fn put(&self, key: &str, value: &[u8]) -> StoreResult<()>;
    fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;
    fn remove(&self, key: &str) -> StoreResult<bool>;
}

/// ACID-durable key-value store backed by redb.
///
/// All writes go through transactions. Reads use MVCC snapshots.
pub struct DurableStore {
    db: Arc<Database>,
}

impl DurableStore {
    /// Open or create a durable store in the given directory.
    pub fn open(data_dir: &Path) -> StoreResult<Self> {
        std::fs::create_dir_all(data_dir).map_err(|e| StoreError::Io { source: e })?;
        let db_path = data_dir.join("topograph.redb");
        let db = Database::create(&db_path).map_err(|e| StoreError::Redb {
            message: format!("failed to open redb at {}: {e}", db_path.display()),
        })?;
        Ok(Self { db: Arc::new(db) })
    }
}

impl KvStore for DurableStore {
    fn put(&self, key: &str, value: &[u8]) -> StoreResult<()> {
        let txn = self.db.begin_write().map_err(|e| StoreError::Redb {
            message: format!("begin_write failed: {e}"),
        })?;
        {
            let mut table = txn.open_table(DOCUMENTS_TABLE).map_err(|e| StoreError::Redb {
                message: format!("open_table failed: {e}"),
            })?;
            table.insert(key, value).map_err(|e| StoreError::Redb {
                message: format!("insert failed: {e}"),
            })?;
        }
        txn.commit().map_err(|e| StoreError::Redb {
            message: format!("commit failed: {e}"),
        })?;
        Ok(())
    }

    fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let txn = self.db.begin_read().map_err(|e| StoreError::Redb {
            message: format!("begin_read failed: {e}"),
        })?;
        let table = match txn.open_table(DOCUMENTS_TABLE) {
            Ok(table) => table,
            // Fresh database: the table does not exist until the first write.
            Err(redb::TableError::TableDoesNotExist(_)) => return Ok(None),
            Err(e) => {
                return Err(StoreError::Redb {
                    message: format!("open_table failed: {e}"),
                });
            }
        };
        let result = table.get(key).map_err(|e| StoreError::Redb {
            message: format!("get failed: {e}"),
        })?;
        Ok(result.map(|guard| guard.value().to_vec()))
    }

    fn remove(&self, key: &str) -> StoreResult<bool> {
        let txn = self.db.begin_write().map_err(|e| StoreError::Redb {
            message: format!("begin_write failed: {e}"),
        })?;
        let existed = {
            let mut table = txn.open_table(DOCUMENTS_TABLE).map_err(|e| StoreError::Redb {
                message: format!("open_table failed: {e}"),
            })?;
            let result = table.remove(key).map_err(|e| StoreError::Redb {
                message: format!("remove failed: {e}"),
            })?;
            result.is_some()
        };
        txn.commit().map_err(|e| StoreError::Redb {
            message: format!("commit failed: {e}"),
        })?;
        Ok(existed)
    }
}

impl std::fmt::Debug for DurableStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DurableStore").finish()
    }
}

/// In-memory key-value store for tests and memory-only sessions.
#[derive(Debug, Default)]
pub struct MemoryStore {
    map: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All keys currently present, for assertions.
    pub fn keys(&self) -> Vec<String> {
        self.map.lock().keys().cloned().collect()
    }
}

impl KvStore for MemoryStore {
    fn put(&self, key: &str, value: &[u8]) -> StoreResult<()> {
        self.map.lock().insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.map.lock().get(key).cloned())
    }

    fn remove(&self, key: &str) -> StoreResult<bool> {
        Ok(self.map.lock().remove(key).is_some())
    }
}

/// Serialize the graph store to its persisted JSON form.
pub fn encode_graph(store: &GraphStore) -> StoreResult<Vec<u8>> {
    let mut doc = serde_json::to_value(store).map_err(|e| StoreError::Serialization {
        message: format!("failed to serialize graph: {e}"),
    })?;
    strip_reserved(&mut doc);
    serde_json::to_vec(&doc).map_err(|e| StoreError::Serialization {
        message: format!("failed to encode graph document: {e}"),
    })
}

/// Persist the graph store under its fixed key.
pub fn save_graph(kv: &dyn KvStore, store: &GraphStore) -> StoreResult<()> {
    let bytes = encode_graph(store)?;
    kv.put(GRAPH_STATE_KEY, &bytes)
}

/// Load the graph store, or an empty store when nothing was saved yet.
pub fn load_graph(kv: &dyn KvStore) -> StoreResult<GraphStore> {
    let Some(bytes) = kv.get(GRAPH_STATE_KEY)? else {
        return Ok(GraphStore::new());
    };
    let mut doc: Value = serde_json::from_slice(&bytes).map_err(|e| StoreError::Serialization {
        message: format!("failed to parse graph document: {e}"),
    })?;
    strip_reserved(&mut doc);
    serde_json::from_value(doc).map_err(|e| StoreError::Serialization {
        message: format!("failed to revive graph document: {e}"),
    })
}

/// Copy the current graph document to a timestamped backup key.
///
/// Returns the backup key, or `None` when there is no document to back up.
pub fn backup_graph(kv: &dyn KvStore) -> StoreResult<Option<String>> {
    let Some(bytes) = kv.get(GRAPH_STATE_KEY)? else {
        return Ok(None);
    };
    let key = format!(
        "{BACKUP_KEY_PREFIX}{}",
        Utc::now().format("%Y%m%dT%H%M%S%3fZ")
    );
    kv.put(&key, &bytes)?;
    tracing::info!(key = %key, bytes = bytes.len(), "graph backup written");
    Ok(Some(key))
}

/// Recursively drop object keys beginning with the reserved `__` prefix.
///
/// Older clients inlined derived caches (parent lists, score vectors) into
/// the stored document under `__`-prefixed names; they are recomputed on
/// every read and must never round-trip.
pub fn strip_reserved(value: &mut Value) {
    match value {
        Value::Object(map) => {
            map.retain(|key, _| !key.starts_with(RESERVED_PREFIX));
            for child in map.values_mut() {
                strip_reserved(child);
            }
        }
        Value::Array(items) => {
            for item in items {
                strip_reserved(item);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn memory_store_put_get_remove() {
        let store = MemoryStore::new();
        store.put("hello", b"world").unwrap();
        assert_eq!(store.get("hello").unwrap(), Some(b"world".to_vec()));
        assert!(store.remove("hello").unwrap());
        assert_eq!(store.get("hello").unwrap(), None);
        assert!(!store.remove("hello").unwrap());
    }

    #[test]
    fn load_missing_graph_is_empty() {
        let kv = MemoryStore::new();
        let store = load_graph(&kv).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn graph_round_trip_is_lossless() {
        let kv = MemoryStore::new();
        let (store, id) = GraphStore::new().add_node("alpha");
        let store = store.set_status(&id, "active").unwrap();
        let store = store.set_priority(&id, 1).unwrap();
        let store = store.set_pinned(&id, true).unwrap();
        let store = store.set_notes(&id, "some notes").unwrap();

        save_graph(&kv, &store).unwrap();
        let revived = load_graph(&kv).unwrap();
        assert_eq!(revived, store);
    }

    #[test]
    fn created_at_survives_as_iso_string() {
        let kv = MemoryStore::new();
        let (store, id) = GraphStore::new().add_node("alpha");
        save_graph(&kv, &store).unwrap();

        let bytes = kv.get(GRAPH_STATE_KEY).unwrap().unwrap();
        let doc: Value = serde_json::from_slice(&bytes).unwrap();
        let created = doc["nodes"][id.as_str()]["createdAt"]
            .as_str()
            .expect("ISO string");
        assert!(created.contains('T'), "expected ISO-8601, got {created}");

        let revived = load_graph(&kv).unwrap();
        assert_eq!(
            revived.get(&id).unwrap().created_at,
            store.get(&id).unwrap().created_at
        );
    }

    #[test]
    fn reserved_prefix_keys_are_stripped() {
        let mut doc = json!({
            "nodes": {
                "abc": {
                    "value": "x",
                    "createdAt": "2026-01-01T00:00:00Z",
                    "children": [],
                    "__maxVec": [1, 0, -3, 42],
                    "__parents": ["def"]
                }
            },
            "__index": {"abc": 0}
        });
        strip_reserved(&mut doc);
        assert!(doc["nodes"]["abc"].get("__maxVec").is_none());
        assert!(doc["nodes"]["abc"].get("__parents").is_none());
        assert!(doc.get("__index").is_none());
        assert_eq!(doc["nodes"]["abc"]["value"], "x");
    }

    #[test]
    fn legacy_document_with_derived_fields_still_loads() {
        let kv = MemoryStore::new();
        let doc = json!({
            "nodes": {
                "abc": {
                    "value": "x",
                    "createdAt": "2026-01-01T00:00:00Z",
                    "children": [],
                    "__maxVec": [1, 0, -3, 42]
                }
            }
        });
        kv.put(GRAPH_STATE_KEY, &serde_json::to_vec(&doc).unwrap())
            .unwrap();
        let store = load_graph(&kv).unwrap();
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn backup_copies_current_document() {
        let kv = MemoryStore::new();
        assert_eq!(backup_graph(&kv).unwrap(), None);

        let (store, _) = GraphStore::new().add_node("alpha");
        save_graph(&kv, &store).unwrap();
        let key = backup_graph(&kv).unwrap().expect("backup written");
        assert!(key.starts_with(BACKUP_KEY_PREFIX));
        assert_eq!(
            kv.get(&key).unwrap(),
            kv.get(GRAPH_STATE_KEY).unwrap()
        );
    }

    #[test]
    fn encoding_is_deterministic() {
        let (store, id) = GraphStore::new().add_node("alpha");
        let store = store.set_priority(&id, 2).unwrap();
        assert_eq!(encode_graph(&store).unwrap(), encode_graph(&store).unwrap());
    }
}
