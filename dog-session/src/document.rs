use std::fmt;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::{SessionError, SessionResult};

/// A stored document: a JSON object.
pub type Document = Map<String, Value>;

/// The collections owned by the session store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Users,
    Stores,
    StoreUsers,
}

impl Collection {
    pub const ALL: [Collection; 3] = [Collection::Users, Collection::Stores, Collection::StoreUsers];

    pub fn name(&self) -> &'static str {
        match self {
            Collection::Users => "users",
            Collection::Stores => "stores",
            Collection::StoreUsers => "storeUsers",
        }
    }

    /// Fields that together identify one document. Backends keep them unique.
    pub fn key_fields(&self) -> &'static [&'static str] {
        match self {
            Collection::Users => &["userId"],
            Collection::Stores => &["storeHash"],
            Collection::StoreUsers => &["storeHash", "userId"],
        }
    }

    /// The key filter for `doc`, or `None` if any key field is missing.
    pub fn key_of(&self, doc: &Document) -> Option<Document> {
        self.key_fields()
            .iter()
            .map(|field| doc.get(*field).map(|v| (field.to_string(), v.clone())))
            .collect()
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Counts reported by replace/update calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteOutcome {
    pub matched: u64,
    pub modified: u64,
    pub upserted: bool,
}

/// Build an equality filter from `(field, value)` pairs.
pub fn filter<'a, I>(pairs: I) -> Document
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    pairs
        .into_iter()
        .map(|(field, value)| (field.to_string(), Value::String(value.to_string())))
        .collect()
}

/// True when every field in `filter` is present in `doc` with an equal value.
pub fn matches_filter(doc: &Document, filter: &Document) -> bool {
    filter.iter().all(|(field, expected)| doc.get(field) == Some(expected))
}

/// Serialize a model into a document for `collection`.
pub fn encode<T: Serialize>(collection: Collection, value: &T) -> SessionResult<Document> {
    match serde_json::to_value(value)? {
        Value::Object(doc) => Ok(doc),
        other => Err(SessionError::malformed(
            collection.name(),
            format!("expected an object, got {other}"),
        )),
    }
}

/// Deserialize a document from `collection` into a model.
pub fn decode<T: DeserializeOwned>(collection: Collection, doc: Document) -> SessionResult<T> {
    serde_json::from_value(Value::Object(doc))
        .map_err(|e| SessionError::malformed(collection.name(), e.to_string()))
}

/// Per-collection CRUD primitives over one long-lived connection.
///
/// Each call is atomic on a single document; nothing spans calls.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// First document matching `filter`.
    async fn find_one(&self, collection: Collection, filter: &Document) -> SessionResult<Option<Document>>;

    /// Replace the first document matching `filter`, inserting `doc` when
    /// nothing matches and `upsert` is set.
    async fn replace_one(
        &self,
        collection: Collection,
        filter: &Document,
        doc: Document,
        upsert: bool,
    ) -> SessionResult<WriteOutcome>;

    /// Insert a new document. Fails with [`SessionError::Conflict`] when a
    /// document with the same key already exists.
    async fn insert_one(&self, collection: Collection, doc: Document) -> SessionResult<()>;

    /// Set the fields of `set` on the first document matching `filter`.
    async fn update_one(
        &self,
        collection: Collection,
        filter: &Document,
        set: Document,
    ) -> SessionResult<WriteOutcome>;

    /// Delete the first document matching `filter`. Returns the number
    /// deleted; zero is not an error.
    async fn delete_one(&self, collection: Collection, filter: &Document) -> SessionResult<u64>;

    /// Release the underlying connection.
    async fn close(&self) -> SessionResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn key_of_requires_every_key_field() {
        let full = doc(json!({"storeHash": "abc", "userId": "1", "isAdmin": true}));
        assert_eq!(
            Collection::StoreUsers.key_of(&full),
            Some(doc(json!({"storeHash": "abc", "userId": "1"})))
        );

        let partial = doc(json!({"storeHash": "abc"}));
        assert_eq!(Collection::StoreUsers.key_of(&partial), None);
    }

    #[test]
    fn matches_is_field_equality() {
        let record = doc(json!({"storeHash": "abc", "userId": "1", "isAdmin": false}));
        assert!(matches_filter(&record, &filter([("storeHash", "abc"), ("userId", "1")])));
        assert!(!matches_filter(&record, &filter([("storeHash", "abc"), ("userId", "2")])));
        assert!(!matches_filter(&record, &filter([("missing", "x")])));
        assert!(matches_filter(&record, &Document::new()));
    }

    #[test]
    fn encode_rejects_non_objects() {
        let err = encode(Collection::Users, &"just a string").unwrap_err();
        assert!(matches!(err, SessionError::MalformedDocument { .. }));
    }
}
