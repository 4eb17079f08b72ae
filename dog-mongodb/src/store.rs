use async_trait::async_trait;
use dog_session::{Collection, Document, DocumentStore, SessionError, SessionResult, WriteOutcome};
use mongodb::bson::{self, doc};
use mongodb::options::IndexOptions;
use mongodb::{Client, Database, IndexModel};
use tracing::{debug, info};

use crate::config::MongoConfig;
use crate::convert::{from_bson, index_keys, map_error, to_bson};

/// [`DocumentStore`] backed by a MongoDB database.
///
/// Cloning shares the driver's connection pool.
#[derive(Clone)]
pub struct MongoDocumentStore {
    client: Client,
    database: Database,
}

impl MongoDocumentStore {
    pub async fn connect(config: &MongoConfig) -> SessionResult<Self> {
        let client = Client::with_uri_str(&config.uri)
            .await
            .map_err(SessionError::backend)?;
        let store = Self::from_client(client, &config.database);

        if config.ensure_indexes {
            store.ensure_indexes().await?;
        }

        info!(database = %config.database, "mongodb.connect");
        Ok(store)
    }

    pub fn from_client(client: Client, database: &str) -> Self {
        let database = client.database(database);
        Self { client, database }
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    /// Create a unique index over each collection's key fields. Existing
    /// identical indexes are left as they are.
    pub async fn ensure_indexes(&self) -> SessionResult<()> {
        for collection in Collection::ALL {
            let index = IndexModel::builder()
                .keys(index_keys(collection))
                .options(IndexOptions::builder().unique(true).build())
                .build();

            self.collection(collection)
                .create_index(index)
                .await
                .map_err(|e| map_error(collection, e))?;
            debug!(collection = collection.name(), "mongodb.index");
        }
        Ok(())
    }

    fn collection(&self, collection: Collection) -> mongodb::Collection<bson::Document> {
        self.database.collection(collection.name())
    }
}

#[async_trait]
impl DocumentStore for MongoDocumentStore {
    async fn find_one(&self, collection: Collection, filter: &Document) -> SessionResult<Option<Document>> {
        let filter = to_bson(collection, filter)?;
        let found = self
            .collection(collection)
            .find_one(filter)
            .await
            .map_err(|e| map_error(collection, e))?;

        found.map(|doc| from_bson(collection, doc)).transpose()
    }

    async fn replace_one(
        &self,
        collection: Collection,
        filter: &Document,
        doc: Document,
        upsert: bool,
    ) -> SessionResult<WriteOutcome> {
        let filter = to_bson(collection, filter)?;
        let replacement = to_bson(collection, &doc)?;
        let result = self
            .collection(collection)
            .replace_one(filter, replacement)
            .upsert(upsert)
            .await
            .map_err(|e| map_error(collection, e))?;

        Ok(WriteOutcome {
            matched: result.matched_count,
            modified: result.modified_count,
            upserted: result.upserted_id.is_some(),
        })
    }

    async fn insert_one(&self, collection: Collection, doc: Document) -> SessionResult<()> {
        let doc = to_bson(collection, &doc)?;
        self.collection(collection)
            .insert_one(doc)
            .await
            .map_err(|e| map_error(collection, e))?;
        Ok(())
    }

    async fn update_one(
        &self,
        collection: Collection,
        filter: &Document,
        set: Document,
    ) -> SessionResult<WriteOutcome> {
        let filter = to_bson(collection, filter)?;
        let set = to_bson(collection, &set)?;
        let result = self
            .collection(collection)
            .update_one(filter, doc! { "$set": set })
            .await
            .map_err(|e| map_error(collection, e))?;

        Ok(WriteOutcome {
            matched: result.matched_count,
            modified: result.modified_count,
            upserted: false,
        })
    }

    async fn delete_one(&self, collection: Collection, filter: &Document) -> SessionResult<u64> {
        let filter = to_bson(collection, filter)?;
        let result = self
            .collection(collection)
            .delete_one(filter)
            .await
            .map_err(|e| map_error(collection, e))?;
        Ok(result.deleted_count)
    }

    async fn close(&self) -> SessionResult<()> {
        self.client.clone().shutdown().await;
        info!("mongodb.close");
        Ok(())
    }
}
