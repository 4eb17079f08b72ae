//! dog-mongodb: MongoDB [`DocumentStore`](dog_session::DocumentStore) for DogRS session persistence.
//!
//! One client is opened per process with [`MongoDocumentStore::connect`] and
//! shared by every [`SessionStore`](dog_session::SessionStore) clone. Each
//! collection gets a unique index over its key fields, so a lost insert race
//! surfaces as [`SessionError::Conflict`](dog_session::SessionError::Conflict).

pub mod config;
pub mod convert;
pub mod store;

pub use config::MongoConfig;
pub use store::MongoDocumentStore;
