//! Core multi-tenant types for DogRS.
//!
//! Store-scoped apps identify a tenant by its store hash. Inbound session
//! payloads carry it in one of three places, resolved by [`TenantContext`]:
//!
//! | carrier                          | rule                                   |
//! |----------------------------------|----------------------------------------|
//! | `context` present                | second `/` segment of `context`        |
//! | `context` absent, `sub` present  | second `/` segment of `sub`            |
//! | both absent                      | empty                                  |
//! | carrier with fewer than 2 segments | empty                                |
//! | `store_hash`                     | used verbatim                          |
//!
//! A present-but-empty `context` still wins over `sub`; only absence falls back.

use std::fmt;

/// A tenant identifier (the store hash for store-scoped apps).
///
/// An empty id means the payload did not name a tenant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct TenantId(pub String);

impl TenantId {
    pub fn new<S: Into<String>>(id: S) -> Self {
        Self(id.into())
    }

    /// Parse a path-like context string (`stores/abc123/v2`) into the
    /// tenant id held by its second segment.
    ///
    /// Returns an empty id when there is no second segment.
    pub fn from_context_path(path: &str) -> Self {
        Self(path.split('/').nth(1).unwrap_or_default().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for TenantId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TenantId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for TenantId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Which payload field supplied the tenant id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TenantSource {
    /// Second segment of the `context` field.
    Context,
    /// Second segment of the `sub` field (used when `context` is absent).
    Sub,
    /// The verbatim `store_hash` field.
    StoreHash,
    /// No carrier was present.
    Missing,
}

/// Context carried with every DogRS operation.
///
/// Passed into services and stores so that all logic is explicitly
/// tenant-aware.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantContext {
    pub tenant_id: TenantId,
    pub source: TenantSource,
}

impl TenantContext {
    /// Resolve the tenant from a session's `context`, falling back to `sub`.
    pub fn resolve(context: Option<&str>, sub: Option<&str>) -> Self {
        match (context, sub) {
            (Some(path), _) => Self {
                tenant_id: TenantId::from_context_path(path),
                source: TenantSource::Context,
            },
            (None, Some(path)) => Self {
                tenant_id: TenantId::from_context_path(path),
                source: TenantSource::Sub,
            },
            (None, None) => Self::missing(),
        }
    }

    /// Resolve the tenant from a verbatim `store_hash` field.
    pub fn from_store_hash(store_hash: Option<&str>) -> Self {
        match store_hash {
            Some(hash) => Self {
                tenant_id: TenantId::new(hash),
                source: TenantSource::StoreHash,
            },
            None => Self::missing(),
        }
    }

    pub fn missing() -> Self {
        Self {
            tenant_id: TenantId::default(),
            source: TenantSource::Missing,
        }
    }

    /// True when a non-empty tenant id was resolved.
    pub fn is_resolved(&self) -> bool {
        !self.tenant_id.is_empty()
    }
}
