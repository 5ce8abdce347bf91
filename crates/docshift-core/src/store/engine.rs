//! Embedded document store on sled.

use std::collections::HashSet;
use std::iter;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;
use sled::transaction::{ConflictableTransactionError, ConflictableTransactionResult, TransactionError};
use sled::{Batch, Db, IVec, Tree};
use tracing::debug;

use super::document::{Document, Filter, IndexSpec, ID_FIELD, ID_INDEX};
use super::key;
use super::{DatabaseHandle, DocumentClient, DocumentDatabase, StoreConfig};
use crate::error::StoreError;

/// Client over one sled database file.
///
/// Databases are namespaces inside the same sled instance, so every handle
/// handed out by one client shares storage and index-build coordination.
pub struct SledClient {
    db: Db,
    /// Index builds take this exclusively; writes take it shared.
    ddl: Arc<RwLock<()>>,
}

impl SledClient {
    /// Open or create a store with the given configuration.
    pub fn open(config: StoreConfig) -> Result<Self, StoreError> {
        let db = config.to_sled_config().open()?;
        Ok(Self::from_db(db))
    }

    /// Open a throwaway in-memory store.
    pub fn temporary() -> Result<Self, StoreError> {
        Self::open(StoreConfig::temporary())
    }

    /// Wrap an already opened sled database.
    pub fn from_db(db: Db) -> Self {
        Self {
            db,
            ddl: Arc::new(RwLock::new(())),
        }
    }

    /// Check if the store was recovered from a previous crash.
    pub fn was_recovered(&self) -> bool {
        self.db.was_recovered()
    }

    /// Flush all pending writes to disk.
    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }

    /// Get a concrete database handle.
    pub fn open_database(&self, name: &str) -> SledDatabase {
        SledDatabase {
            db: self.db.clone(),
            ddl: Arc::clone(&self.ddl),
            name: name.to_string(),
        }
    }
}

impl DocumentClient for SledClient {
    fn database(&self, name: &str) -> Result<DatabaseHandle, StoreError> {
        Ok(Arc::new(self.open_database(name)))
    }
}

/// A named database inside a [`SledClient`].
pub struct SledDatabase {
    db: Db,
    ddl: Arc<RwLock<()>>,
    name: String,
}

impl SledDatabase {
    fn tree(&self, collection: &str) -> Result<Tree, StoreError> {
        Ok(self.db.open_tree(key::tree_name(&self.name, collection))?)
    }

    fn stored_indexes(tree: &Tree) -> Result<Vec<IndexSpec>, StoreError> {
        Ok(decode_indexes(tree.get(key::META_INDEXES)?)?)
    }

    fn decode(collection: &str, bytes: &[u8]) -> Result<Document, StoreError> {
        serde_json::from_slice(bytes).map_err(|e| StoreError::CorruptDocument {
            collection: collection.to_string(),
            message: e.to_string(),
        })
    }

    /// Scan documents matching `filter`, keeping their storage keys.
    fn scan(
        &self,
        tree: &Tree,
        collection: &str,
        filter: &Filter,
    ) -> Result<Vec<(IVec, Document)>, StoreError> {
        let mut matched = Vec::new();
        for item in tree.scan_prefix(key::DOC_PREFIX) {
            let (doc_key, value) = item?;
            let document = Self::decode(collection, &value)?;
            if filter.matches(&document) {
                matched.push((doc_key, document));
            }
        }
        Ok(matched)
    }
}

fn decode_indexes(bytes: Option<IVec>) -> Result<Vec<IndexSpec>, serde_json::Error> {
    match bytes {
        Some(bytes) => serde_json::from_slice(&bytes),
        None => Ok(Vec::new()),
    }
}

fn unique_indexes(stored: Vec<IndexSpec>) -> impl Iterator<Item = IndexSpec> {
    iter::once(IndexSpec::id_index())
        .chain(stored)
        .filter(|index| index.unique)
}

fn abort(err: impl Into<StoreError>) -> ConflictableTransactionError<StoreError> {
    ConflictableTransactionError::Abort(err.into())
}

fn from_transaction(err: TransactionError<StoreError>) -> StoreError {
    match err {
        TransactionError::Abort(e) => e,
        TransactionError::Storage(e) => StoreError::Storage(e),
    }
}

impl DocumentDatabase for SledDatabase {
    fn name(&self) -> &str {
        &self.name
    }

    fn insert_one(&self, collection: &str, mut document: Document) -> Result<(), StoreError> {
        let tree = self.tree(collection)?;
        let id = self.db.generate_id()?;
        document
            .entry(ID_FIELD.to_string())
            .or_insert_with(|| Value::from(id));
        let doc_key = key::doc_key(id);
        let doc_bytes = serde_json::to_vec(&document)?;

        let _guard = self.ddl.read();
        tree.transaction(|tx| -> ConflictableTransactionResult<(), StoreError> {
            let stored = decode_indexes(tx.get(key::META_INDEXES)?).map_err(abort)?;
            for index in unique_indexes(stored) {
                let values = index.key_values(&document);
                let entry = key::index_key(&index.name, &values);
                if tx.get(&entry)?.is_some() {
                    return Err(abort(StoreError::DuplicateKey {
                        collection: collection.to_string(),
                        index: index.name.clone(),
                        value: key::render_values(&values),
                    }));
                }
                tx.insert(entry, doc_key.as_slice())?;
            }
            tx.insert(doc_key.as_slice(), doc_bytes.as_slice())?;
            Ok(())
        })
        .map_err(from_transaction)?;

        debug!(database = %self.name, collection, id, "document inserted");
        Ok(())
    }

    fn find(&self, collection: &str, filter: &Filter) -> Result<Vec<Document>, StoreError> {
        let tree = self.tree(collection)?;
        Ok(self
            .scan(&tree, collection, filter)?
            .into_iter()
            .map(|(_, document)| document)
            .collect())
    }

    fn delete_many(&self, collection: &str, filter: &Filter) -> Result<u64, StoreError> {
        let tree = self.tree(collection)?;
        let _guard = self.ddl.read();

        let mut deleted = 0;
        for (doc_key, document) in self.scan(&tree, collection, filter)? {
            let removed = tree
                .transaction(|tx| -> ConflictableTransactionResult<bool, StoreError> {
                    // Another deleter may have won the race.
                    if tx.remove(doc_key.clone())?.is_none() {
                        return Ok(false);
                    }
                    let stored = decode_indexes(tx.get(key::META_INDEXES)?).map_err(abort)?;
                    for index in unique_indexes(stored) {
                        let entry = key::index_key(&index.name, &index.key_values(&document));
                        if tx.get(&entry)?.as_deref() == Some(&doc_key[..]) {
                            tx.remove(entry)?;
                        }
                    }
                    Ok(true)
                })
                .map_err(from_transaction)?;
            if removed {
                deleted += 1;
            }
        }

        debug!(database = %self.name, collection, deleted, "documents deleted");
        Ok(deleted)
    }

    fn list_indexes(&self, collection: &str) -> Result<Vec<IndexSpec>, StoreError> {
        let tree = self.tree(collection)?;
        Ok(iter::once(IndexSpec::id_index())
            .chain(Self::stored_indexes(&tree)?)
            .collect())
    }

    fn create_index(&self, collection: &str, index: IndexSpec) -> Result<(), StoreError> {
        if index.name.is_empty() || index.keys.is_empty() {
            return Err(StoreError::InvalidIndex(
                "index needs a name and at least one key".to_string(),
            ));
        }
        if index.name == ID_INDEX {
            return Err(StoreError::InvalidIndex(format!("{} is reserved", ID_INDEX)));
        }

        let tree = self.tree(collection)?;
        let _guard = self.ddl.write();

        let mut stored = Self::stored_indexes(&tree)?;
        if let Some(existing) = stored.iter().find(|i| i.name == index.name) {
            if *existing == index {
                return Ok(());
            }
            return Err(StoreError::InvalidIndex(format!(
                "index {} already exists with different options",
                index.name
            )));
        }

        let mut batch = Batch::default();
        if index.unique {
            let mut seen = HashSet::new();
            for (doc_key, document) in self.scan(&tree, collection, &Filter::new())? {
                let values = index.key_values(&document);
                let entry = key::index_key(&index.name, &values);
                if !seen.insert(entry.clone()) {
                    return Err(StoreError::DuplicateKey {
                        collection: collection.to_string(),
                        index: index.name.clone(),
                        value: key::render_values(&values),
                    });
                }
                batch.insert(entry, doc_key);
            }
        }

        debug!(database = %self.name, collection, index = %index.name, unique = index.unique, "index created");
        stored.push(index);
        batch.insert(key::META_INDEXES, serde_json::to_vec(&stored)?);
        tree.apply_batch(batch)?;
        Ok(())
    }

    fn drop_index(&self, collection: &str, name: &str) -> Result<(), StoreError> {
        if name == ID_INDEX {
            return Err(StoreError::InvalidIndex(format!("cannot drop {}", ID_INDEX)));
        }

        let tree = self.tree(collection)?;
        let _guard = self.ddl.write();

        let mut stored = Self::stored_indexes(&tree)?;
        let before = stored.len();
        stored.retain(|i| i.name != name);
        if stored.len() == before {
            return Err(StoreError::IndexNotFound {
                collection: collection.to_string(),
                index: name.to_string(),
            });
        }

        let mut batch = Batch::default();
        for item in tree.scan_prefix(key::index_prefix(name)) {
            let (entry, _) = item?;
            batch.remove(entry);
        }
        batch.insert(key::META_INDEXES, serde_json::to_vec(&stored)?);
        tree.apply_batch(batch)?;

        debug!(database = %self.name, collection, index = name, "index dropped");
        Ok(())
    }

    fn list_collections(&self) -> Result<Vec<String>, StoreError> {
        let mut names: Vec<String> = self
            .db
            .tree_names()
            .iter()
            .filter_map(|raw| {
                let tree = std::str::from_utf8(raw).ok()?;
                key::collection_of(&self.name, tree).map(str::to_string)
            })
            .collect();
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Barrier;
    use std::thread;

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    fn test_db() -> SledDatabase {
        SledClient::temporary().unwrap().open_database("test")
    }

    #[test]
    fn test_insert_and_find() {
        let db = test_db();
        db.insert_one("people", doc(json!({"name": "alice", "age": 30})))
            .unwrap();
        db.insert_one("people", doc(json!({"name": "bob", "age": 41})))
            .unwrap();

        let all = db.find("people", &Filter::new()).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0]["name"], json!("alice"));
        assert!(all[0].contains_key(ID_FIELD));

        let bob = db
            .find_one("people", &Filter::new().eq("name", "bob"))
            .unwrap()
            .unwrap();
        assert_eq!(bob["age"], json!(41));
        assert_eq!(db.count("people", &Filter::new().eq("age", 30)).unwrap(), 1);
    }

    #[test]
    fn test_unique_index_rejects_duplicates() {
        let db = test_db();
        db.create_index("locks", IndexSpec::new(&["key"]).unique())
            .unwrap();

        db.insert_one("locks", doc(json!({"key": "LOCK"}))).unwrap();
        let err = db
            .insert_one("locks", doc(json!({"key": "LOCK"})))
            .unwrap_err();

        assert!(err.is_duplicate_key());
        assert_eq!(db.count("locks", &Filter::new()).unwrap(), 1);
    }

    #[test]
    fn test_explicit_id_is_unique() {
        let db = test_db();
        db.insert_one("c", doc(json!({"_id": "a"}))).unwrap();
        assert!(db
            .insert_one("c", doc(json!({"_id": "a"})))
            .unwrap_err()
            .is_duplicate_key());
    }

    #[test]
    fn test_delete_frees_unique_key() {
        let db = test_db();
        db.create_index("locks", IndexSpec::new(&["key"]).unique())
            .unwrap();
        db.insert_one("locks", doc(json!({"key": "LOCK"}))).unwrap();

        let filter = Filter::new().eq("key", "LOCK");
        assert_eq!(db.delete_many("locks", &filter).unwrap(), 1);
        assert_eq!(db.delete_many("locks", &filter).unwrap(), 0);

        db.insert_one("locks", doc(json!({"key": "LOCK"}))).unwrap();
    }

    #[test]
    fn test_create_index_is_idempotent() {
        let db = test_db();
        let index = IndexSpec::new(&["changeId", "author"]).unique();
        db.create_index("log", index.clone()).unwrap();
        db.create_index("log", index.clone()).unwrap();

        let indexes = db.list_indexes("log").unwrap();
        assert_eq!(indexes.len(), 2);
        assert_eq!(indexes[0].name, ID_INDEX);
        assert_eq!(indexes[1], index);
    }

    #[test]
    fn test_create_index_conflicting_options() {
        let db = test_db();
        db.create_index("log", IndexSpec::new(&["a"])).unwrap();
        let err = db
            .create_index("log", IndexSpec::new(&["a"]).unique())
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidIndex(_)));
    }

    #[test]
    fn test_unique_index_over_existing_duplicates_fails() {
        let db = test_db();
        db.insert_one("log", doc(json!({"a": 1}))).unwrap();
        db.insert_one("log", doc(json!({"a": 1}))).unwrap();

        let err = db
            .create_index("log", IndexSpec::new(&["a"]).unique())
            .unwrap_err();
        assert!(err.is_duplicate_key());
        assert_eq!(db.list_indexes("log").unwrap().len(), 1);
    }

    #[test]
    fn test_unique_index_backfills_existing_documents() {
        let db = test_db();
        db.insert_one("log", doc(json!({"a": 1}))).unwrap();
        db.create_index("log", IndexSpec::new(&["a"]).unique())
            .unwrap();

        assert!(db
            .insert_one("log", doc(json!({"a": 1})))
            .unwrap_err()
            .is_duplicate_key());
    }

    #[test]
    fn test_drop_index() {
        let db = test_db();
        db.create_index("log", IndexSpec::new(&["a"]).unique())
            .unwrap();
        db.insert_one("log", doc(json!({"a": 1}))).unwrap();

        db.drop_index("log", "a_1").unwrap();
        db.insert_one("log", doc(json!({"a": 1}))).unwrap();

        assert!(matches!(
            db.drop_index("log", "a_1"),
            Err(StoreError::IndexNotFound { .. })
        ));
        assert!(matches!(
            db.drop_index("log", ID_INDEX),
            Err(StoreError::InvalidIndex(_))
        ));
    }

    #[test]
    fn test_databases_are_isolated() {
        let client = SledClient::temporary().unwrap();
        let a = client.open_database("a");
        let b = client.open_database("b");

        a.insert_one("log", doc(json!({"x": 1}))).unwrap();
        assert_eq!(b.count("log", &Filter::new()).unwrap(), 0);
        assert_eq!(a.list_collections().unwrap(), vec!["log".to_string()]);
    }

    #[test]
    fn test_concurrent_inserts_single_winner() {
        let client = SledClient::temporary().unwrap();
        let db: DatabaseHandle = client.database("race").unwrap();
        db.create_index("locks", IndexSpec::new(&["key"]).unique())
            .unwrap();

        let threads = 8;
        let barrier = Arc::new(Barrier::new(threads));
        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let db = Arc::clone(&db);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    db.insert_one("locks", doc(json!({"key": "LOCK"}))).is_ok()
                })
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }

    #[test]
    fn test_reopen_persists_documents_and_indexes() {
        let dir = tempfile::tempdir().unwrap();
        {
            let client = SledClient::open(StoreConfig::new(dir.path())).unwrap();
            let db = client.open_database("app");
            db.create_index("log", IndexSpec::new(&["a"]).unique())
                .unwrap();
            db.insert_one("log", doc(json!({"a": 1}))).unwrap();
            client.flush().unwrap();
        }

        let client = SledClient::open(StoreConfig::new(dir.path())).unwrap();
        let db = client.open_database("app");
        assert_eq!(db.count("log", &Filter::new()).unwrap(), 1);
        assert!(db
            .insert_one("log", doc(json!({"a": 1})))
            .unwrap_err()
            .is_duplicate_key());
    }
}
