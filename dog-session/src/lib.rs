//! dog-session: store and user session persistence for multi-tenant DogRS apps.
//!
//! Platform session payloads (install, update, load, add/remove user,
//! uninstall) are reconciled into three collections:
//!
//! - `users`: global identity keyed by `userId`
//! - `stores`: one access grant per `storeHash`
//! - `storeUsers`: membership and admin role per `(storeHash, userId)`
//!
//! ```rust
//! use std::sync::Arc;
//! use dog_session::{MemoryDocumentStore, SessionPayload, SessionStore};
//!
//! # tokio_test_block_on(async {
//! let store = SessionStore::new(Arc::new(MemoryDocumentStore::new()));
//! let payload: SessionPayload = serde_json::from_str(
//!     r#"{"access_token":"tok","scope":"s","context":"stores/abc123","user":{"id":1,"email":"o@x.io"}}"#,
//! ).unwrap();
//!
//! store.upsert_store(&payload).await.unwrap();
//! store.upsert_store_user(&payload).await.unwrap();
//! assert!(store.store_user_exists("abc123", "1").await.unwrap());
//! # });
//! # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

pub mod document;
pub mod error;
pub mod event;
#[cfg(feature = "tracing-basic")]
pub mod logging;
pub mod memory;
pub mod models;
pub mod store;

pub use document::{Collection, Document, DocumentStore, WriteOutcome};
pub use error::{SessionError, SessionResult};
pub use event::{
    AddUserEvent, InstallEvent, LifecycleKind, RemoveUserEvent, SessionEvent, SessionOwner,
    SessionPayload, SessionUser, UninstallEvent,
};
pub use memory::{MemoryDocumentStore, StoreStats};
pub use models::{Store, StoreUser, User, UserId};
pub use store::SessionStore;
