use std::fmt;

use dog_core::{DogConfig, DogConfigSnapshot};
use dog_session::{SessionError, SessionResult};

/// Connection settings for [`MongoDocumentStore`](crate::MongoDocumentStore).
#[derive(Clone, PartialEq, Eq)]
pub struct MongoConfig {
    pub uri: String,
    pub database: String,
    /// Create unique indexes on each collection's key at connect.
    pub ensure_indexes: bool,
}

impl MongoConfig {
    pub const URI_KEY: &'static str = "mongodb.uri";
    pub const DATABASE_KEY: &'static str = "mongodb.db";
    pub const ENSURE_INDEXES_KEY: &'static str = "mongodb.ensure_indexes";

    /// Prefix for generic overrides, e.g. `DOG__MONGODB__ENSURE_INDEXES`.
    pub const ENV_PREFIX: &'static str = "DOG__";

    pub fn new<U: Into<String>, D: Into<String>>(uri: U, database: D) -> Self {
        Self {
            uri: uri.into(),
            database: database.into(),
            ensure_indexes: true,
        }
    }

    /// Layer the environment into `config`: prefixed overrides first,
    /// then the conventional `MONGODB_URI` / `MONGODB_DB` variables.
    pub fn configure(config: &mut DogConfig) {
        config.load_env(Self::ENV_PREFIX);
        config.set_from_env(Self::URI_KEY, "MONGODB_URI");
        config.set_from_env(Self::DATABASE_KEY, "MONGODB_DB");
    }

    pub fn from_snapshot(snapshot: &DogConfigSnapshot) -> SessionResult<Self> {
        let uri = snapshot
            .get_non_empty(Self::URI_KEY)
            .ok_or_else(|| SessionError::config(format!("missing `{}` (MONGODB_URI)", Self::URI_KEY)))?;
        let database = snapshot
            .get_non_empty(Self::DATABASE_KEY)
            .ok_or_else(|| SessionError::config(format!("missing `{}` (MONGODB_DB)", Self::DATABASE_KEY)))?;

        Ok(Self {
            uri: uri.to_string(),
            database: database.to_string(),
            ensure_indexes: snapshot.get_bool(Self::ENSURE_INDEXES_KEY).unwrap_or(true),
        })
    }

    /// `None` when no URI is configured at all. A URI with missing or
    /// blank settings alongside it is still an error.
    pub fn from_snapshot_if_configured(snapshot: &DogConfigSnapshot) -> SessionResult<Option<Self>> {
        if snapshot.get_non_empty(Self::URI_KEY).is_none() {
            return Ok(None);
        }
        Self::from_snapshot(snapshot).map(Some)
    }

    /// [`from_snapshot_if_configured`](Self::from_snapshot_if_configured)
    /// over the process environment.
    pub fn from_env_if_configured() -> SessionResult<Option<Self>> {
        let mut config = DogConfig::new();
        Self::configure(&mut config);
        Self::from_snapshot_if_configured(&config.snapshot())
    }
}

impl fmt::Debug for MongoConfig {
    // The URI may embed credentials.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MongoConfig")
            .field("uri", &"<redacted>")
            .field("database", &self.database)
            .field("ensure_indexes", &self.ensure_indexes)
            .finish()
    }
}
