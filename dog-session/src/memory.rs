use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;

use crate::document::{matches_filter, Collection, Document, DocumentStore, WriteOutcome};
use crate::{SessionError, SessionResult};

/// Call counters for a [`MemoryDocumentStore`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub reads: u64,
    pub writes: u64,
}

/// In-memory document store for testing and development.
///
/// Enforces each collection's key uniqueness on insert, like a unique
/// index would.
#[derive(Default)]
pub struct MemoryDocumentStore {
    /// Documents per collection, in insertion order
    collections: RwLock<HashMap<Collection, Vec<Document>>>,
    reads: AtomicU64,
    writes: AtomicU64,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of read and write calls served so far.
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            reads: self.reads.load(Ordering::SeqCst),
            writes: self.writes.load(Ordering::SeqCst),
        }
    }

    pub fn reset_stats(&self) {
        self.reads.store(0, Ordering::SeqCst);
        self.writes.store(0, Ordering::SeqCst);
    }

    /// Snapshot of every document in `collection`.
    pub fn documents(&self, collection: Collection) -> Vec<Document> {
        self.collections
            .read()
            .get(&collection)
            .cloned()
            .unwrap_or_default()
    }

    pub fn len(&self, collection: Collection) -> usize {
        self.collections
            .read()
            .get(&collection)
            .map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.collections.read().values().all(Vec::is_empty)
    }

    fn conflict(collection: Collection, key: &Document) -> SessionError {
        SessionError::conflict(collection.name(), Value::Object(key.clone()).to_string())
    }

    fn key_taken(docs: &[Document], key: &Document) -> bool {
        docs.iter().any(|existing| matches_filter(existing, key))
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn find_one(&self, collection: Collection, filter: &Document) -> SessionResult<Option<Document>> {
        self.reads.fetch_add(1, Ordering::SeqCst);

        let collections = self.collections.read();
        Ok(collections
            .get(&collection)
            .and_then(|docs| docs.iter().find(|doc| matches_filter(doc, filter)))
            .cloned())
    }

    async fn replace_one(
        &self,
        collection: Collection,
        filter: &Document,
        doc: Document,
        upsert: bool,
    ) -> SessionResult<WriteOutcome> {
        self.writes.fetch_add(1, Ordering::SeqCst);

        let mut collections = self.collections.write();
        let docs = collections.entry(collection).or_default();

        if let Some(existing) = docs.iter_mut().find(|existing| matches_filter(existing, filter)) {
            let modified = *existing != doc;
            *existing = doc;
            return Ok(WriteOutcome {
                matched: 1,
                modified: u64::from(modified),
                upserted: false,
            });
        }

        if !upsert {
            return Ok(WriteOutcome::default());
        }

        if let Some(key) = collection.key_of(&doc) {
            if Self::key_taken(docs, &key) {
                return Err(Self::conflict(collection, &key));
            }
        }

        docs.push(doc);
        Ok(WriteOutcome {
            matched: 0,
            modified: 0,
            upserted: true,
        })
    }

    async fn insert_one(&self, collection: Collection, doc: Document) -> SessionResult<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);

        let mut collections = self.collections.write();
        let docs = collections.entry(collection).or_default();

        if let Some(key) = collection.key_of(&doc) {
            if Self::key_taken(docs, &key) {
                return Err(Self::conflict(collection, &key));
            }
        }

        docs.push(doc);
        Ok(())
    }

    async fn update_one(
        &self,
        collection: Collection,
        filter: &Document,
        set: Document,
    ) -> SessionResult<WriteOutcome> {
        self.writes.fetch_add(1, Ordering::SeqCst);

        let mut collections = self.collections.write();
        let Some(existing) = collections
            .get_mut(&collection)
            .and_then(|docs| docs.iter_mut().find(|doc| matches_filter(doc, filter)))
        else {
            return Ok(WriteOutcome::default());
        };

        let mut modified = false;
        for (field, value) in set {
            if existing.get(&field) != Some(&value) {
                existing.insert(field, value);
                modified = true;
            }
        }

        Ok(WriteOutcome {
            matched: 1,
            modified: u64::from(modified),
            upserted: false,
        })
    }

    async fn delete_one(&self, collection: Collection, filter: &Document) -> SessionResult<u64> {
        self.writes.fetch_add(1, Ordering::SeqCst);

        let mut collections = self.collections.write();
        let Some(docs) = collections.get_mut(&collection) else {
            return Ok(0);
        };

        match docs.iter().position(|doc| matches_filter(doc, filter)) {
            Some(index) => {
                docs.remove(index);
                Ok(1)
            }
            None => Ok(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::filter;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn insert_rejects_duplicate_keys() {
        let store = MemoryDocumentStore::new();
        let record = doc(json!({"storeHash": "abc", "userId": "1", "isAdmin": false}));

        store.insert_one(Collection::StoreUsers, record.clone()).await.unwrap();
        let err = store
            .insert_one(Collection::StoreUsers, record)
            .await
            .unwrap_err();

        assert!(err.is_conflict());
        assert_eq!(store.len(Collection::StoreUsers), 1);
    }

    #[tokio::test]
    async fn replace_upserts_then_replaces_wholesale() {
        let store = MemoryDocumentStore::new();
        let key = filter([("userId", "1")]);

        let first = store
            .replace_one(
                Collection::Users,
                &key,
                doc(json!({"userId": "1", "email": "a@x.io", "username": "a"})),
                true,
            )
            .await
            .unwrap();
        assert!(first.upserted);

        let second = store
            .replace_one(Collection::Users, &key, doc(json!({"userId": "1", "email": "b@x.io"})), true)
            .await
            .unwrap();
        assert_eq!(second.matched, 1);
        assert_eq!(second.modified, 1);

        let stored = store.find_one(Collection::Users, &key).await.unwrap().unwrap();
        assert_eq!(stored, doc(json!({"userId": "1", "email": "b@x.io"})));
    }

    #[tokio::test]
    async fn replace_without_upsert_leaves_collection_untouched() {
        let store = MemoryDocumentStore::new();
        let outcome = store
            .replace_one(Collection::Stores, &filter([("storeHash", "abc")]), doc(json!({"storeHash": "abc"})), false)
            .await
            .unwrap();

        assert_eq!(outcome, WriteOutcome::default());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn update_sets_named_fields_only() {
        let store = MemoryDocumentStore::new();
        let key = filter([("storeHash", "abc"), ("userId", "1")]);
        store
            .insert_one(
                Collection::StoreUsers,
                doc(json!({"storeHash": "abc", "userId": "1", "isAdmin": false})),
            )
            .await
            .unwrap();

        let outcome = store
            .update_one(Collection::StoreUsers, &key, doc(json!({"isAdmin": true})))
            .await
            .unwrap();
        assert_eq!(outcome.modified, 1);

        let again = store
            .update_one(Collection::StoreUsers, &key, doc(json!({"isAdmin": true})))
            .await
            .unwrap();
        assert_eq!(again.matched, 1);
        assert_eq!(again.modified, 0);

        let stored = store.find_one(Collection::StoreUsers, &key).await.unwrap().unwrap();
        assert_eq!(stored["isAdmin"], json!(true));
        assert_eq!(stored["storeHash"], json!("abc"));
    }

    #[tokio::test]
    async fn delete_missing_is_zero_not_error() {
        let store = MemoryDocumentStore::new();
        let deleted = store
            .delete_one(Collection::Stores, &filter([("storeHash", "nope")]))
            .await
            .unwrap();

        assert_eq!(deleted, 0);
        assert_eq!(store.stats(), StoreStats { reads: 0, writes: 1 });
    }
}
