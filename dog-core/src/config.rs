//! # DogRS Configuration
//!
//! A minimal string key/value configuration store, mirroring Feathers'
//! `app.set()` / `app.get()`. Values are usually layered from the
//! environment at startup and read through an immutable snapshot.
//!
//! ```rust
//! use dog_core::DogConfig;
//!
//! let mut config = DogConfig::new();
//! config.load_prefixed(
//!     vec![("DOG__MONGODB__DB".to_string(), "sessions".to_string())],
//!     "DOG__",
//! );
//! config.set("mongodb.uri", "mongodb://localhost:27017");
//!
//! let snapshot = config.snapshot();
//! assert_eq!(snapshot.get("mongodb.db"), Some("sessions"));
//! ```
//!
//! Prefixed variables are normalized by lower-casing and turning `__`
//! into `.`, so `DOG__MONGODB__DB` becomes `mongodb.db`. Variables with
//! conventional names (`MONGODB_URI`) are mapped one by one with
//! [`DogConfig::set_from_env`].

use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct DogConfig {
    values: HashMap<String, String>,
}

impl DogConfig {
    /// Create an empty config store.
    pub fn new() -> Self {
        Self {
            values: HashMap::new(),
        }
    }

    /// Set a configuration key to a string value.
    pub fn set<K, V>(&mut self, key: K, value: V)
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(|s| s.as_str())
    }

    pub fn has(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Load every `(name, value)` pair whose name starts with `prefix`.
    ///
    /// Returns the number of keys set.
    pub fn load_prefixed<I>(&mut self, vars: I, prefix: &str) -> usize
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut loaded = 0;
        for (name, value) in vars {
            if let Some(stripped) = name.strip_prefix(prefix) {
                let key = stripped.to_lowercase().replace("__", ".");
                if key.is_empty() {
                    continue;
                }
                self.values.insert(key, value);
                loaded += 1;
            }
        }
        loaded
    }

    /// Load prefixed variables from the process environment.
    pub fn load_env(&mut self, prefix: &str) -> usize {
        self.load_prefixed(std::env::vars(), prefix)
    }

    /// Set `key` from environment variable `var` if it is present and
    /// not blank. Returns whether the key was set.
    pub fn set_from_env(&mut self, key: &str, var: &str) -> bool {
        match std::env::var(var) {
            Ok(value) if !value.trim().is_empty() => {
                self.set(key, value.trim());
                true
            }
            _ => false,
        }
    }

    pub fn snapshot(&self) -> DogConfigSnapshot {
        DogConfigSnapshot::new(self.values.clone())
    }
}

/// Read-only view of a [`DogConfig`].
#[derive(Debug, Clone, Default)]
pub struct DogConfigSnapshot {
    map: HashMap<String, String>,
}

impl DogConfigSnapshot {
    pub(crate) fn new(map: HashMap<String, String>) -> Self {
        Self { map }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.map.get(key).map(|s| s.as_str())
    }

    /// Like [`get`](Self::get) but treats blank values as absent.
    pub fn get_non_empty(&self, key: &str) -> Option<&str> {
        self.get(key).map(str::trim).filter(|v| !v.is_empty())
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(|v| v.trim().parse::<bool>().ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn prefixed_vars_are_normalized() {
        let mut config = DogConfig::new();
        let loaded = config.load_prefixed(
            vars(&[
                ("DOG__MONGODB__URI", "mongodb://db"),
                ("DOG__MONGODB__ENSURE_INDEXES", "false"),
                ("OTHER", "ignored"),
            ]),
            "DOG__",
        );

        assert_eq!(loaded, 2);
        assert_eq!(config.get("mongodb.uri"), Some("mongodb://db"));
        assert_eq!(config.snapshot().get_bool("mongodb.ensure_indexes"), Some(false));
        assert!(!config.has("other"));
    }

    #[test]
    fn bare_prefix_is_skipped() {
        let mut config = DogConfig::new();
        assert_eq!(config.load_prefixed(vars(&[("DOG__", "x")]), "DOG__"), 0);
    }

    #[test]
    fn blank_values_read_as_absent() {
        let mut config = DogConfig::new();
        config.set("mongodb.db", "  ");
        let snapshot = config.snapshot();
        assert_eq!(snapshot.get("mongodb.db"), Some("  "));
        assert_eq!(snapshot.get_non_empty("mongodb.db"), None);
    }
}
