//! Store/user session reconciliation.
//!
//! Membership writes follow one table, keyed on `(storeHash, userId)`:
//!
//! | event            | no record                         | record exists                  |
//! |------------------|-----------------------------------|--------------------------------|
//! | carries token    | insert admin                      | promote to admin unless admin  |
//! | no token         | insert, admin iff user is owner   | leave untouched                |
//!
//! Nothing here ever writes `isAdmin = false` over an existing record.

use std::sync::Arc;

use dog_core::TenantId;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::document::{decode, encode, filter, Collection, Document, DocumentStore};
use crate::event::{SessionEvent, SessionPayload};
use crate::models::{Store, StoreUser, User, UserId};
use crate::{SessionError, SessionResult};

/// How the acting user relates to the store for a membership write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MembershipClaim<'a> {
    /// The event carries an access token, so the user is the owner.
    Owner,
    /// Any other user; admin only if they are the declared owner.
    Member { owner: Option<&'a UserId> },
}

/// The grant fields read back from a `stores` document. The key is taken
/// from the lookup, not the document.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredGrant {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    scope: Option<String>,
}

fn store_key(store_hash: &str) -> Document {
    filter([("storeHash", store_hash)])
}

fn store_user_key(store_hash: &str, user_id: &str) -> Document {
    filter([("storeHash", store_hash), ("userId", user_id)])
}

fn user_key(user_id: &str) -> Document {
    filter([("userId", user_id)])
}

/// Applies session lifecycle events to the `users`, `stores` and
/// `storeUsers` collections and answers membership queries.
///
/// Cheap to clone; every clone shares the injected document store.
#[derive(Clone)]
pub struct SessionStore {
    db: Arc<dyn DocumentStore>,
}

impl SessionStore {
    pub fn new(db: Arc<dyn DocumentStore>) -> Self {
        Self { db }
    }

    /// Replace the global user record named by `session.user`.
    ///
    /// No-op when the payload has no user (or no user id).
    pub async fn upsert_user(&self, session: &SessionPayload) -> SessionResult<()> {
        match session.user_record() {
            Some(user) => self.write_user(&user).await,
            None => Ok(()),
        }
    }

    /// Replace the store's grant. Only install/update payloads carry both
    /// a token and a scope; anything else is a no-op.
    pub async fn upsert_store(&self, session: &SessionPayload) -> SessionResult<()> {
        let (Some(access_token), Some(scope)) = (session.access_token(), session.scope()) else {
            return Ok(());
        };

        let store = Store {
            store_hash: session.grant_tenant().tenant_id,
            access_token: Some(access_token.to_string()),
            scope: Some(scope.to_string()),
        };
        self.write_store(&store).await
    }

    /// Create or promote the membership of `session.user` in the session's store.
    pub async fn upsert_store_user(&self, session: &SessionPayload) -> SessionResult<()> {
        let Some(user_id) = session.user_id() else {
            return Ok(());
        };

        let claim = match session.access_token() {
            Some(_) => MembershipClaim::Owner,
            None => MembershipClaim::Member {
                owner: session.owner_id(),
            },
        };
        self.reconcile_store_user(&session.tenant().tenant_id, user_id, claim)
            .await
    }

    /// Delete the membership of `session.user`. Deleting a missing record
    /// is not an error.
    pub async fn remove_store_user(&self, session: &SessionPayload) -> SessionResult<()> {
        let Some(user_id) = session.user_id() else {
            return Ok(());
        };
        self.delete_store_user(&session.tenant().tenant_id, user_id)
            .await
    }

    /// Whether `user_id` has a membership in `store_hash`.
    ///
    /// Empty key parts short-circuit to `false` without a query.
    pub async fn store_user_exists(&self, store_hash: &str, user_id: &str) -> SessionResult<bool> {
        if store_hash.is_empty() || user_id.is_empty() {
            return Ok(false);
        }

        let found = self
            .db
            .find_one(Collection::StoreUsers, &store_user_key(store_hash, user_id))
            .await?;
        Ok(found.is_some())
    }

    /// Fetch the grant for `store_hash`.
    pub async fn get_store(&self, store_hash: &str) -> SessionResult<Option<Store>> {
        if store_hash.is_empty() {
            return Ok(None);
        }

        let Some(doc) = self.db.find_one(Collection::Stores, &store_key(store_hash)).await? else {
            return Ok(None);
        };
        let stored: StoredGrant = decode(Collection::Stores, doc)?;

        Ok(Some(Store {
            store_hash: TenantId::new(store_hash),
            access_token: stored.access_token,
            scope: stored.scope,
        }))
    }

    pub async fn get_store_access_token(&self, store_hash: &str) -> SessionResult<Option<String>> {
        Ok(self
            .get_store(store_hash)
            .await?
            .and_then(|store| store.access_token))
    }

    /// Delete the grant named by `session.store_hash`.
    ///
    /// No-op when the payload names no store, so a malformed payload can
    /// never issue an unscoped delete.
    pub async fn remove_store(&self, session: &SessionPayload) -> SessionResult<()> {
        let tenant = session.uninstall_tenant();
        if !tenant.is_resolved() {
            return Ok(());
        }
        self.delete_store(&tenant.tenant_id).await
    }

    pub async fn get_user(&self, user_id: &str) -> SessionResult<Option<User>> {
        if user_id.is_empty() {
            return Ok(None);
        }

        self.db
            .find_one(Collection::Users, &user_key(user_id))
            .await?
            .map(|doc| decode(Collection::Users, doc))
            .transpose()
    }

    pub async fn get_store_user(&self, store_hash: &str, user_id: &str) -> SessionResult<Option<StoreUser>> {
        if store_hash.is_empty() || user_id.is_empty() {
            return Ok(None);
        }
        self.find_store_user(store_hash, user_id).await
    }

    /// Apply a validated lifecycle event.
    pub async fn apply(&self, event: &SessionEvent) -> SessionResult<()> {
        debug!(kind = %event.kind(), store_hash = %event.store_hash(), "session.apply");

        match event {
            SessionEvent::Install(e) | SessionEvent::Update(e) => {
                self.write_user(&e.user).await?;
                self.write_store(&Store {
                    store_hash: e.store_hash.clone(),
                    access_token: Some(e.access_token.clone()),
                    scope: Some(e.scope.clone()),
                })
                .await?;
                self.reconcile_store_user(&e.store_hash, &e.user.user_id, MembershipClaim::Owner)
                    .await
            }
            SessionEvent::Load(e) | SessionEvent::AddUser(e) => {
                self.write_user(&e.user).await?;
                let claim = MembershipClaim::Member {
                    owner: e.owner.as_ref(),
                };
                self.reconcile_store_user(&e.store_hash, &e.user.user_id, claim)
                    .await
            }
            SessionEvent::RemoveUser(e) => self.delete_store_user(&e.store_hash, &e.user_id).await,
            SessionEvent::Uninstall(e) => {
                self.delete_store(&e.store_hash).await?;
                match &e.user_id {
                    Some(user_id) => self.delete_store_user(&e.store_hash, user_id).await,
                    None => Ok(()),
                }
            }
        }
    }

    /// Release the document store.
    pub async fn close(&self) -> SessionResult<()> {
        self.db.close().await
    }

    async fn write_user(&self, user: &User) -> SessionResult<()> {
        let doc = encode(Collection::Users, user)?;
        let outcome = self
            .db
            .replace_one(Collection::Users, &user_key(user.user_id.as_str()), doc, true)
            .await?;
        debug!(user_id = %user.user_id, upserted = outcome.upserted, "user.upsert");
        Ok(())
    }

    async fn write_store(&self, store: &Store) -> SessionResult<()> {
        let doc = encode(Collection::Stores, store)?;
        let outcome = self
            .db
            .replace_one(Collection::Stores, &store_key(store.store_hash.as_str()), doc, true)
            .await?;
        info!(store_hash = %store.store_hash, upserted = outcome.upserted, "store.upsert");
        Ok(())
    }

    async fn find_store_user(&self, store_hash: &str, user_id: &str) -> SessionResult<Option<StoreUser>> {
        self.db
            .find_one(Collection::StoreUsers, &store_user_key(store_hash, user_id))
            .await?
            .map(|doc| decode(Collection::StoreUsers, doc))
            .transpose()
    }

    async fn reconcile_store_user(
        &self,
        store_hash: &TenantId,
        user_id: &UserId,
        claim: MembershipClaim<'_>,
    ) -> SessionResult<()> {
        let existing = self
            .find_store_user(store_hash.as_str(), user_id.as_str())
            .await?;

        match (claim, existing) {
            (MembershipClaim::Owner, None) => {
                let record = StoreUser::admin(store_hash.clone(), user_id.clone());
                match self.insert_store_user(&record).await {
                    Err(SessionError::Conflict { .. }) => {
                        // Lost an insert race; the winner's record decides.
                        warn!(store_hash = %store_hash, user_id = %user_id, "store_user.insert_conflict");
                        match self
                            .find_store_user(store_hash.as_str(), user_id.as_str())
                            .await?
                        {
                            Some(current) if !current.is_admin => self.promote(&current).await,
                            _ => Ok(()),
                        }
                    }
                    other => other,
                }
            }
            (MembershipClaim::Owner, Some(current)) if !current.is_admin => self.promote(&current).await,
            (MembershipClaim::Owner, Some(_)) => Ok(()),
            (MembershipClaim::Member { owner }, None) => {
                let record = StoreUser {
                    store_hash: store_hash.clone(),
                    user_id: user_id.clone(),
                    is_admin: owner == Some(user_id),
                };
                match self.insert_store_user(&record).await {
                    Err(SessionError::Conflict { .. }) => {
                        debug!(store_hash = %store_hash, user_id = %user_id, "store_user.insert_conflict");
                        Ok(())
                    }
                    other => other,
                }
            }
            (MembershipClaim::Member { .. }, Some(_)) => Ok(()),
        }
    }

    async fn insert_store_user(&self, record: &StoreUser) -> SessionResult<()> {
        let doc = encode(Collection::StoreUsers, record)?;
        self.db.insert_one(Collection::StoreUsers, doc).await?;
        info!(
            store_hash = %record.store_hash,
            user_id = %record.user_id,
            is_admin = record.is_admin,
            "store_user.insert"
        );
        Ok(())
    }

    async fn promote(&self, record: &StoreUser) -> SessionResult<()> {
        let key = store_user_key(record.store_hash.as_str(), record.user_id.as_str());
        let mut set = Document::new();
        set.insert("isAdmin".to_string(), Value::Bool(true));
        self.db.update_one(Collection::StoreUsers, &key, set).await?;
        info!(store_hash = %record.store_hash, user_id = %record.user_id, "store_user.promote");
        Ok(())
    }

    async fn delete_store_user(&self, store_hash: &TenantId, user_id: &UserId) -> SessionResult<()> {
        let deleted = self
            .db
            .delete_one(
                Collection::StoreUsers,
                &store_user_key(store_hash.as_str(), user_id.as_str()),
            )
            .await?;
        debug!(store_hash = %store_hash, user_id = %user_id, deleted, "store_user.remove");
        Ok(())
    }

    async fn delete_store(&self, store_hash: &TenantId) -> SessionResult<()> {
        let deleted = self
            .db
            .delete_one(Collection::Stores, &store_key(store_hash.as_str()))
            .await?;
        info!(store_hash = %store_hash, deleted, "store.remove");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    use crate::document::WriteOutcome;
    use crate::memory::MemoryDocumentStore;
    use serde_json::json;
    use tracing_test::traced_test;

    fn payload(value: serde_json::Value) -> SessionPayload {
        serde_json::from_value(value).unwrap()
    }

    #[tokio::test]
    #[traced_test]
    async fn test_promotion_is_logged() {
        let store = SessionStore::new(Arc::new(MemoryDocumentStore::new()));
        let member = payload(json!({"context": "stores/abc", "owner": {"id": 1}, "user": {"id": 2}}));
        store.upsert_store_user(&member).await.unwrap();
        assert!(logs_contain("store_user.insert"));

        let mut owner = member.clone();
        owner.access_token = Some("tok".to_string());
        store.upsert_store_user(&owner).await.unwrap();
        assert!(logs_contain("store_user.promote"));
    }

    /// Serves the first read from before a concurrent member insert.
    struct StaleFirstRead {
        inner: MemoryDocumentStore,
        stale: AtomicBool,
    }

    #[async_trait::async_trait]
    impl DocumentStore for StaleFirstRead {
        async fn find_one(&self, collection: Collection, filter: &Document) -> SessionResult<Option<Document>> {
            if self.stale.swap(false, Ordering::SeqCst) {
                return Ok(None);
            }
            self.inner.find_one(collection, filter).await
        }

        async fn replace_one(
            &self,
            collection: Collection,
            filter: &Document,
            doc: Document,
            upsert: bool,
        ) -> SessionResult<WriteOutcome> {
            self.inner.replace_one(collection, filter, doc, upsert).await
        }

        async fn insert_one(&self, collection: Collection, doc: Document) -> SessionResult<()> {
            self.inner.insert_one(collection, doc).await
        }

        async fn update_one(
            &self,
            collection: Collection,
            filter: &Document,
            set: Document,
        ) -> SessionResult<WriteOutcome> {
            self.inner.update_one(collection, filter, set).await
        }

        async fn delete_one(&self, collection: Collection, filter: &Document) -> SessionResult<u64> {
            self.inner.delete_one(collection, filter).await
        }
    }

    #[tokio::test]
    async fn test_lost_insert_race_still_promotes() {
        let backend = Arc::new(StaleFirstRead {
            inner: MemoryDocumentStore::new(),
            stale: AtomicBool::new(false),
        });
        let store = SessionStore::new(backend.clone());
        let member = payload(json!({"context": "stores/abc", "owner": {"id": 1}, "user": {"id": 2}}));
        store.upsert_store_user(&member).await.unwrap();

        let mut owner = member.clone();
        owner.access_token = Some("tok".to_string());
        backend.stale.store(true, Ordering::SeqCst);
        store.upsert_store_user(&owner).await.unwrap();

        let record = store.get_store_user("abc", "2").await.unwrap().unwrap();
        assert!(record.is_admin);
        assert_eq!(backend.inner.len(Collection::StoreUsers), 1);
    }

    #[tokio::test]
    async fn test_lost_member_insert_race_is_noop() {
        let backend = Arc::new(StaleFirstRead {
            inner: MemoryDocumentStore::new(),
            stale: AtomicBool::new(false),
        });
        let store = SessionStore::new(backend.clone());
        let mut owner = payload(json!({"context": "stores/abc", "owner": {"id": 1}, "user": {"id": 2}}));
        owner.access_token = Some("tok".to_string());
        store.upsert_store_user(&owner).await.unwrap();

        let mut member = owner.clone();
        member.access_token = None;
        backend.stale.store(true, Ordering::SeqCst);
        store.upsert_store_user(&member).await.unwrap();

        let record = store.get_store_user("abc", "2").await.unwrap().unwrap();
        assert!(record.is_admin);
        assert_eq!(backend.inner.len(Collection::StoreUsers), 1);
    }

    /// Returns `stores` documents without their key field, as older
    /// records were written.
    struct KeylessGrants {
        inner: MemoryDocumentStore,
    }

    #[async_trait::async_trait]
    impl DocumentStore for KeylessGrants {
        async fn find_one(&self, collection: Collection, filter: &Document) -> SessionResult<Option<Document>> {
            let mut found = self.inner.find_one(collection, filter).await?;
            if collection == Collection::Stores {
                if let Some(doc) = found.as_mut() {
                    doc.remove("storeHash");
                }
            }
            Ok(found)
        }

        async fn replace_one(
            &self,
            collection: Collection,
            filter: &Document,
            doc: Document,
            upsert: bool,
        ) -> SessionResult<WriteOutcome> {
            self.inner.replace_one(collection, filter, doc, upsert).await
        }

        async fn insert_one(&self, collection: Collection, doc: Document) -> SessionResult<()> {
            self.inner.insert_one(collection, doc).await
        }

        async fn update_one(
            &self,
            collection: Collection,
            filter: &Document,
            set: Document,
        ) -> SessionResult<WriteOutcome> {
            self.inner.update_one(collection, filter, set).await
        }

        async fn delete_one(&self, collection: Collection, filter: &Document) -> SessionResult<u64> {
            self.inner.delete_one(collection, filter).await
        }
    }

    #[tokio::test]
    async fn test_get_store_reads_grant_without_stored_key() {
        let store = SessionStore::new(Arc::new(KeylessGrants {
            inner: MemoryDocumentStore::new(),
        }));
        store
            .upsert_store(&payload(json!({"context": "stores/abc", "access_token": "tok", "scope": "s"})))
            .await
            .unwrap();

        assert_eq!(
            store.get_store("abc").await.unwrap(),
            Some(Store {
                store_hash: "abc".into(),
                access_token: Some("tok".to_string()),
                scope: Some("s".to_string()),
            })
        );
        assert_eq!(
            store.get_store_access_token("abc").await.unwrap().as_deref(),
            Some("tok")
        );
    }
}
