use std::sync::Arc;

use anyhow::{Context, Result};
use dog_mongodb::{MongoConfig, MongoDocumentStore};
use dog_session::{DocumentStore, LifecycleKind, MemoryDocumentStore, SessionEvent, SessionPayload, SessionStore};
use serde::Deserialize;
use tracing::{info, warn};

/// One recorded platform callback.
#[derive(Debug, Deserialize)]
struct ReplayEntry {
    kind: LifecycleKind,
    payload: SessionPayload,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    dog_session::logging::init("info");

    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "dog-examples/session-replay/data/lifecycle.json".to_string());
    let raw = std::fs::read_to_string(&path).with_context(|| format!("reading {path}"))?;
    let entries: Vec<ReplayEntry> = serde_json::from_str(&raw).with_context(|| format!("parsing {path}"))?;

    let mongo = MongoConfig::from_env_if_configured().context("invalid MongoDB configuration")?;
    let backend: Arc<dyn DocumentStore> = match mongo {
        Some(config) => Arc::new(
            MongoDocumentStore::connect(&config)
                .await
                .context("connecting to MongoDB")?,
        ),
        None => {
            warn!("replay.memory_fallback");
            Arc::new(MemoryDocumentStore::new())
        }
    };
    let store = SessionStore::new(backend);

    for (index, entry) in entries.iter().enumerate() {
        let event = match SessionEvent::from_payload(entry.kind, &entry.payload) {
            Ok(event) => event,
            Err(err) => {
                warn!(index, kind = %entry.kind, error = %err, "replay.skip");
                continue;
            }
        };
        store.apply(&event).await?;

        let store_hash = event.store_hash().as_str();
        let grant = store.get_store_access_token(store_hash).await?;
        info!(
            index,
            kind = %entry.kind,
            store_hash,
            installed = grant.is_some(),
            "replay.applied"
        );
    }

    store.close().await?;
    println!("[replay] applied {} event(s) from {path}", entries.len());

    Ok(())
}
