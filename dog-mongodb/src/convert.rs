//! JSON document <-> BSON mapping and driver error classification.

use dog_session::{Collection, Document, SessionError};
use mongodb::bson::{self, doc};
use mongodb::error::{Error as MongoError, ErrorKind, WriteFailure};

/// Server code for a unique index violation.
const DUPLICATE_KEY: i32 = 11000;

pub fn to_bson(collection: Collection, doc: &Document) -> Result<bson::Document, SessionError> {
    bson::to_document(doc).map_err(|e| SessionError::malformed(collection.name(), e.to_string()))
}

/// Convert a stored document back to JSON, dropping the driver's `_id`.
pub fn from_bson(collection: Collection, mut doc: bson::Document) -> Result<Document, SessionError> {
    doc.remove("_id");
    bson::from_document(doc).map_err(|e| SessionError::malformed(collection.name(), e.to_string()))
}

/// Ascending unique-index keys for `collection`.
pub fn index_keys(collection: Collection) -> bson::Document {
    let mut keys = doc! {};
    for field in collection.key_fields() {
        keys.insert(*field, 1);
    }
    keys
}

pub fn is_duplicate_key(err: &MongoError) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(write_error)) if write_error.code == DUPLICATE_KEY
    )
}

/// Map a driver error, surfacing unique index violations as conflicts.
pub fn map_error(collection: Collection, err: MongoError) -> SessionError {
    if is_duplicate_key(&err) {
        SessionError::conflict(collection.name(), err.to_string())
    } else {
        SessionError::backend(err)
    }
}
