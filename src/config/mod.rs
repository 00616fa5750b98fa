//! Typed, validated configuration persisted as YAML.
//!
//! A [`ConfigStore`] is an ordered set of declared [`ConfigEntry`] values bound to
//! one file. One store exists per logical domain: the application itself, each
//! paired device, and each plugin. Two stores must never be bound to the same
//! path at the same time; this is a convention and is not enforced by locking.

pub mod app;
pub mod entry;
pub mod runtime;

pub use app::AppConf;
pub use entry::{ConfigEntry, ConfigValue, Constraint, SelectOption};
pub use runtime::RuntimeOptions;

use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;
use std::fs;
use std::io;
use thiserror::Error;

/// Errors raised by configuration stores
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config entry '{0}' is declared twice")]
    DuplicateKey(String),

    #[error("Unknown config entry '{0}'")]
    UnknownKey(String),

    #[error("Value {value} for '{key}' is outside {min}..={max}")]
    OutOfRange {
        key: String,
        value: String,
        min: i64,
        max: i64,
    },

    #[error("'{value}' is not a valid option for '{key}' (allowed: {})", .allowed.join(", "))]
    InvalidOption {
        key: String,
        value: String,
        allowed: Vec<String>,
    },

    #[error("'{key}' expects a {expected} value, got {found}")]
    TypeMismatch {
        key: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("I/O error on {path}: {source}")]
    IoFailure {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to serialize config: {0}")]
    Serialization(String),
}

/// A recoverable problem found while loading a config file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadIssue {
    /// Entry the problem belongs to; `None` when the whole document was rejected
    pub key: Option<String>,
    pub reason: String,
}

/// Result of [`ConfigStore::load`]
#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    /// Number of stored values accepted into the store
    pub applied: usize,
    /// Values that were rejected and replaced by their defaults
    pub issues: Vec<LoadIssue>,
    /// True when no backing file existed
    pub missing_file: bool,
}

impl LoadReport {
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Ordered, uniquely keyed configuration entries bound to one YAML file
#[derive(Debug, Clone)]
pub struct ConfigStore {
    name: String,
    path: Utf8PathBuf,
    entries: IndexMap<String, ConfigEntry>,
}

impl ConfigStore {
    /// Create an empty store named `name` (used in logs) backed by `path`
    pub fn new<P: AsRef<Utf8Path>>(name: &str, path: P) -> Self {
        Self {
            name: name.to_string(),
            path: path.as_ref().to_path_buf(),
            entries: IndexMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Register a new entry.
    ///
    /// # Panics
    /// If `default` does not satisfy `constraint` (see [`ConfigEntry::new`]).
    pub fn declare(
        &mut self,
        key: &str,
        constraint: Constraint,
        default: impl Into<ConfigValue>,
    ) -> Result<(), ConfigError> {
        if self.entries.contains_key(key) {
            return Err(ConfigError::DuplicateKey(key.to_string()));
        }
        let entry = ConfigEntry::new(key, constraint, default.into());
        self.entries.insert(key.to_string(), entry);
        Ok(())
    }

    /// Register a choice entry whose default is given by option index.
    ///
    /// The index is resolved to the option key here, once.
    ///
    /// # Panics
    /// If `default_index` is not a valid option index.
    pub fn declare_choice(
        &mut self,
        key: &str,
        options: &[(&str, &str)],
        default_index: usize,
    ) -> Result<(), ConfigError> {
        let default = match options.get(default_index) {
            Some((option, _)) => *option,
            None => panic!(
                "default index {} out of bounds for config entry '{}'",
                default_index, key
            ),
        };
        self.declare(key, Constraint::choice(options), default)
    }

    /// Read the backing file and apply every valid stored value.
    ///
    /// Every entry is first reset to its default. A missing file is not an
    /// error. Values that fail validation and unparseable documents are
    /// reported in the returned [`LoadReport`] and leave defaults in place.
    /// Keys that are not declared are ignored.
    pub fn load(&mut self) -> Result<LoadReport, ConfigError> {
        let mut report = LoadReport::default();
        self.entries.values_mut().for_each(ConfigEntry::reset);

        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::info!("No {} config at {}, using defaults", self.name, self.path);
                report.missing_file = true;
                return Ok(report);
            }
            Err(source) => {
                return Err(ConfigError::IoFailure {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        let stored: IndexMap<String, serde_yaml_ng::Value> = match serde_yaml_ng::from_str(&content)
        {
            Ok(stored) => stored,
            Err(e) => {
                tracing::warn!(
                    "Failed to parse {} config {}, using defaults: {}",
                    self.name,
                    self.path,
                    e
                );
                report.issues.push(LoadIssue {
                    key: None,
                    reason: e.to_string(),
                });
                return Ok(report);
            }
        };

        for (key, node) in &stored {
            let Some(entry) = self.entries.get_mut(key) else {
                tracing::debug!("Ignoring unknown {} config key '{}'", self.name, key);
                continue;
            };

            let outcome = match ConfigValue::from_yaml(node) {
                Some(value) => entry.set(value),
                None => Err(ConfigError::TypeMismatch {
                    key: key.clone(),
                    expected: "scalar",
                    found: "structured",
                }),
            };

            match outcome {
                Ok(()) => report.applied += 1,
                Err(e) => {
                    tracing::warn!("Reverting '{}' to default: {}", key, e);
                    entry.reset();
                    report.issues.push(LoadIssue {
                        key: Some(key.clone()),
                        reason: e.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            "Loaded {} config from {} ({} values, {} issues)",
            self.name,
            self.path,
            report.applied,
            report.issues.len()
        );
        Ok(report)
    }

    /// Write every declared entry to the backing file, replacing it
    pub fn save(&self) -> Result<(), ConfigError> {
        let document: IndexMap<&str, &ConfigValue> = self
            .entries
            .iter()
            .map(|(key, entry)| (key.as_str(), entry.value()))
            .collect();

        let yaml = serde_yaml_ng::to_string(&document)
            .map_err(|e| ConfigError::Serialization(e.to_string()))?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_str().is_empty() {
                fs::create_dir_all(parent).map_err(|source| ConfigError::IoFailure {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        fs::write(&self.path, yaml).map_err(|source| ConfigError::IoFailure {
            path: self.path.clone(),
            source,
        })?;

        tracing::info!("Saved {} config to {}", self.name, self.path);
        Ok(())
    }

    /// Validate and store a new value; the prior value is kept on error
    pub fn set(&mut self, key: &str, value: impl Into<ConfigValue>) -> Result<(), ConfigError> {
        let entry = self
            .entries
            .get_mut(key)
            .ok_or_else(|| ConfigError::UnknownKey(key.to_string()))?;
        entry.set(value.into())
    }

    /// Parse textual input according to the entry's constraint, then [`set`](Self::set) it
    pub fn set_from_str(&mut self, key: &str, raw: &str) -> Result<(), ConfigError> {
        let entry = self
            .entries
            .get(key)
            .ok_or_else(|| ConfigError::UnknownKey(key.to_string()))?;
        let value = entry.constraint().parse_value(key, raw)?;
        self.set(key, value)
    }

    pub fn get(&self, key: &str) -> Option<&ConfigValue> {
        self.entries.get(key).map(ConfigEntry::value)
    }

    pub fn get_int(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(ConfigValue::as_int)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(ConfigValue::as_str)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(ConfigValue::as_bool)
    }

    pub fn entry(&self, key: &str) -> Option<&ConfigEntry> {
        self.entries.get(key)
    }

    /// Entries in declaration order
    pub fn entries(&self) -> impl Iterator<Item = &ConfigEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_store() -> (ConfigStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let dir = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        let mut store = ConfigStore::new("test", dir.join("conf.yaml"));
        store.declare("port", Constraint::range(1, 65535), 5040).unwrap();
        store.declare("name", Constraint::length(1, 8), "phone").unwrap();
        store.declare("enabled", Constraint::Flag, true).unwrap();
        store
            .declare_choice("mode", &[("no", "No"), ("one", "One"), ("all", "All")], 1)
            .unwrap();
        (store, temp_dir)
    }

    #[test]
    fn test_duplicate_key_rejected() {
        let (mut store, _temp_dir) = create_test_store();
        let err = store.declare("port", Constraint::range(0, 1), 0).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateKey(key) if key == "port"));
    }

    #[test]
    fn test_choice_default_by_index() {
        let (store, _temp_dir) = create_test_store();
        assert_eq!(store.get_str("mode"), Some("one"));
    }

    #[test]
    fn test_missing_file_keeps_defaults() {
        let (mut store, _temp_dir) = create_test_store();
        let report = store.load().unwrap();
        assert!(report.missing_file);
        assert!(report.is_clean());
        assert_eq!(store.get_int("port"), Some(5040));
    }

    #[test]
    fn test_save_then_load() {
        let (mut store, _temp_dir) = create_test_store();
        store.set("port", 6000).unwrap();
        store.set("enabled", false).unwrap();
        store.save().unwrap();

        let (mut fresh, _other) = create_test_store();
        fresh.path = store.path().to_path_buf();
        let report = fresh.load().unwrap();
        assert_eq!(report.applied, 4);
        assert_eq!(fresh.get_int("port"), Some(6000));
        assert_eq!(fresh.get_bool("enabled"), Some(false));
    }

    #[test]
    fn test_save_preserves_declaration_order() {
        let (store, _temp_dir) = create_test_store();
        store.save().unwrap();
        let text = fs::read_to_string(store.path()).unwrap();
        let port = text.find("port").unwrap();
        let mode = text.find("mode").unwrap();
        assert!(port < mode);
    }

    #[test]
    fn test_set_unknown_key() {
        let (mut store, _temp_dir) = create_test_store();
        assert!(matches!(
            store.set("missing", 1),
            Err(ConfigError::UnknownKey(_))
        ));
    }

    #[test]
    fn test_set_from_str() {
        let (mut store, _temp_dir) = create_test_store();
        store.set_from_str("port", "8080").unwrap();
        store.set_from_str("enabled", "off").unwrap();
        assert_eq!(store.get_int("port"), Some(8080));
        assert_eq!(store.get_bool("enabled"), Some(false));
        assert!(store.set_from_str("mode", "several").is_err());
        assert_eq!(store.get_str("mode"), Some("one"));
    }
}
