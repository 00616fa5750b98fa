//! Directories of per-item config files.
//!
//! The device registry keeps one `<uin>.device.yaml` per paired device and the
//! plugin registry one `<plugin>.<uin>.conf.yaml` per plugin instance. Only
//! files carrying the registry's suffix belong to it; anything else in the
//! directory is left alone.

use crate::config::ConfigStore;
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use std::io;

/// Suffix of device registry files
pub const DEVICE_EXTENSION: &str = ".device.yaml";

/// Suffix of plugin registry files
pub const PLUGIN_SUFFIX: &str = ".conf.yaml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryDir {
    path: Utf8PathBuf,
    suffix: &'static str,
}

impl RegistryDir {
    pub fn new<P: AsRef<Utf8Path>>(path: P, suffix: &'static str) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            suffix,
        }
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    pub fn suffix(&self) -> &'static str {
        self.suffix
    }

    /// Create the directory if it does not exist yet
    pub fn init(&self) -> io::Result<()> {
        fs::create_dir_all(&self.path)
    }

    /// Whether a bare file name belongs to this registry
    pub fn matches(&self, file_name: &str) -> bool {
        file_name.len() > self.suffix.len()
            && file_name.ends_with(self.suffix)
            && !file_name.contains(['/', '\\'])
    }

    /// Registry files sorted by name; a missing directory has none
    pub fn files(&self) -> io::Result<Vec<Utf8PathBuf>> {
        let dir = match self.path.read_dir_utf8() {
            Ok(dir) => dir,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut files = Vec::new();
        for item in dir {
            let item = match item {
                Ok(item) => item,
                Err(e) => {
                    tracing::warn!("Skipping unreadable entry in {}: {}", self.path, e);
                    continue;
                }
            };
            if item.file_type()?.is_file() && self.matches(item.file_name()) {
                files.push(item.into_path());
            }
        }
        files.sort();
        Ok(files)
    }

    /// Item names (file names without the suffix), sorted
    pub fn names(&self) -> io::Result<Vec<String>> {
        Ok(self
            .files()?
            .iter()
            .filter_map(|p| p.file_name())
            .filter_map(|n| n.strip_suffix(self.suffix))
            .map(str::to_string)
            .collect())
    }

    pub fn item_path(&self, name: &str) -> Utf8PathBuf {
        self.path.join(format!("{}{}", name, self.suffix))
    }

    /// Config store bound to the item `name`; entries still need declaring
    pub fn store(&self, name: &str) -> ConfigStore {
        ConfigStore::new(name, self.item_path(name))
    }

    /// Delete every registry file; returns how many were removed
    pub fn clear(&self) -> io::Result<usize> {
        let files = self.files()?;
        for file in &files {
            fs::remove_file(file)?;
            tracing::debug!("Removed {}", file);
        }
        Ok(files.len())
    }
}
