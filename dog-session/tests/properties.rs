use std::sync::Arc;

use dog_core::TenantId;
use dog_session::{MemoryDocumentStore, SessionOwner, SessionPayload, SessionStore, SessionUser, UserId};
use proptest::prelude::*;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .expect("runtime")
}

fn membership_payload(user: u64, owner: u64, token: Option<String>) -> SessionPayload {
    SessionPayload {
        access_token: token,
        context: Some("stores/abc123/v2".to_string()),
        owner: Some(SessionOwner {
            id: Some(UserId::from(owner)),
            email: None,
        }),
        user: Some(SessionUser {
            id: Some(UserId::from(user)),
            email: Some(format!("user{user}@example.com")),
            username: None,
        }),
        ..SessionPayload::default()
    }
}

proptest! {
    #[test]
    fn context_parsing_never_panics(path in ".*") {
        let tenant = TenantId::from_context_path(&path);
        prop_assert!(!tenant.as_str().contains('/'));
    }

    #[test]
    fn second_segment_is_the_store_hash(prefix in "[a-z]{0,8}", hash in "[a-z0-9]{1,12}", rest in "(/[a-z0-9]{0,4}){0,3}") {
        let path = format!("{prefix}/{hash}{rest}");
        let parsed = TenantId::from_context_path(&path);
        prop_assert_eq!(parsed.as_str(), hash.as_str());
    }

    #[test]
    fn upsert_store_without_grant_never_writes(token in proptest::option::of("[a-z]{0,4}"), has_scope in any::<bool>()) {
        prop_assume!(token.as_deref().map_or(true, str::is_empty) || !has_scope);

        let backend = Arc::new(MemoryDocumentStore::new());
        let store = SessionStore::new(backend.clone());
        let session = SessionPayload {
            access_token: token,
            scope: has_scope.then(|| "s".to_string()),
            context: Some("stores/abc123".to_string()),
            ..SessionPayload::default()
        };

        runtime().block_on(store.upsert_store(&session)).unwrap();
        prop_assert_eq!(backend.stats().writes, 0);
    }

    /// Replaying any sequence of membership events never downgrades an admin
    #[test]
    fn admin_role_is_monotonic(events in proptest::collection::vec((1u64..4, 1u64..4, any::<bool>()), 1..24)) {
        let store = SessionStore::new(Arc::new(MemoryDocumentStore::new()));

        runtime().block_on(async {
            let mut admins = std::collections::HashSet::new();
            for (user, owner, has_token) in events {
                let token = has_token.then(|| "tok".to_string());
                store.upsert_store_user(&membership_payload(user, owner, token)).await.unwrap();

                for known in 1u64..4 {
                    let record = store.get_store_user("abc123", &known.to_string()).await.unwrap();
                    if let Some(record) = record {
                        if admins.contains(&known) {
                            assert!(record.is_admin, "user {known} lost admin");
                        }
                        if record.is_admin {
                            admins.insert(known);
                        }
                    }
                }
            }
        });
    }
}
