use crate::registry::RegistryDir;
use camino::{Utf8Path, Utf8PathBuf};
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Cursor, Read, Seek, Write};
use thiserror::Error;
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

/// Name of the blob every settings archive must contain
pub const MARKER_ENTRY: &str = "dcnnt.timestamp.txt";

/// Extension of files staged next to their target during restore
const STAGING_EXTENSION: &str = "restore";

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("Failed to write {target}: {source}")]
    WriteFailure {
        target: String,
        #[source]
        source: io::Error,
    },

    #[error("Not a settings archive: dcnnt.timestamp.txt is missing")]
    MissingMarker,

    #[error("Restore interrupted after old settings were removed ({restored} files in place): {reason}")]
    PartialRestore { restored: usize, reason: String },

    #[error("Unreadable settings archive: {0}")]
    Corrupt(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Where persisted settings live on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveLayout {
    pub config_file: Utf8PathBuf,
    pub devices: RegistryDir,
    pub plugins: RegistryDir,
}

impl ArchiveLayout {
    /// Name the config file is stored under inside an archive
    pub fn config_name(&self) -> &str {
        self.config_file.file_name().unwrap_or("conf.yaml")
    }

    /// Destination for an archive blob, or `None` if it belongs nowhere
    pub fn target_for(&self, name: &str) -> Option<Utf8PathBuf> {
        if name.is_empty() || name.contains(['/', '\\']) {
            return None;
        }
        if name == self.config_name() {
            return Some(self.config_file.clone());
        }
        [&self.devices, &self.plugins]
            .into_iter()
            .find(|registry| registry.matches(name))
            .map(|registry| registry.path().join(name))
    }
}

#[derive(Debug, Clone, Default)]
pub struct DumpReport {
    pub timestamp: String,
    /// Archived file names, in archive order (marker excluded)
    pub files: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct RestoreReport {
    /// Contents of the marker blob
    pub timestamp: String,
    pub restored: Vec<String>,
    /// Blobs that matched no config or registry location
    pub skipped: Vec<String>,
}

/// Backs up and restores all persisted settings as one zip archive
///
/// The archive holds the marker blob, the app config file and every device
/// and plugin registry file, each stored under its bare file name.
#[derive(Debug, Clone)]
pub struct SettingsArchiver {
    layout: ArchiveLayout,
}

impl SettingsArchiver {
    pub fn new(layout: ArchiveLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &ArchiveLayout {
        &self.layout
    }

    /// Write the current settings to `sink`.
    ///
    /// Output already written when an error occurs is left as is.
    pub fn dump<W: Write + Seek>(&self, sink: W) -> Result<DumpReport, ArchiveError> {
        let mut zip = ZipWriter::new(sink);
        let timestamp = now_string();
        write_blob(&mut zip, MARKER_ENTRY, timestamp.as_bytes())?;

        let mut sources = Vec::new();
        if self.layout.config_file.is_file() {
            sources.push(self.layout.config_file.clone());
        }
        for registry in [&self.layout.devices, &self.layout.plugins] {
            sources.extend(registry.files().map_err(|source| ArchiveError::Io {
                path: registry.path().to_path_buf(),
                source,
            })?);
        }

        let mut files = Vec::with_capacity(sources.len());
        for path in sources {
            let Some(name) = path.file_name() else {
                continue;
            };
            let bytes = read_file(&path)?;
            write_blob(&mut zip, name, &bytes)?;
            tracing::debug!("Archived {} ({} bytes)", path, bytes.len());
            files.push(name.to_string());
        }

        zip.finish().map_err(|e| ArchiveError::WriteFailure {
            target: "archive".to_string(),
            source: io::Error::other(e),
        })?;

        tracing::info!("Dumped {} settings files", files.len());
        Ok(DumpReport { timestamp, files })
    }

    /// Replace the current settings with the contents of `source`.
    ///
    /// The whole archive is read before anything on disk changes, and an
    /// archive without the marker blob is rejected untouched. New files are
    /// staged beside their targets first; if staging fails the old settings
    /// remain intact. Only the final delete-and-rename step can leave a
    /// partial state, reported as [`ArchiveError::PartialRestore`].
    pub fn restore<R: Read>(&self, mut source: R) -> Result<RestoreReport, ArchiveError> {
        let mut raw = Vec::new();
        source
            .read_to_end(&mut raw)
            .map_err(|e| ArchiveError::Corrupt(e.to_string()))?;
        let mut blobs = unpack(&raw)?;

        let timestamp = match blobs.remove(MARKER_ENTRY) {
            Some(marker) => String::from_utf8_lossy(&marker).trim().to_string(),
            None => {
                tracing::warn!("Refusing to restore archive without {}", MARKER_ENTRY);
                return Err(ArchiveError::MissingMarker);
            }
        };
        tracing::info!("Restoring settings saved at {}", timestamp);

        let mut report = RestoreReport {
            timestamp,
            ..Default::default()
        };
        let mut planned = Vec::new();
        for (name, bytes) in blobs {
            match self.layout.target_for(&name) {
                Some(target) => planned.push((name, target, bytes)),
                None => {
                    tracing::warn!("Skipping unexpected archive entry '{}'", name);
                    report.skipped.push(name);
                }
            }
        }

        self.prepare_directories()?;
        let staged = self.stage(&planned)?;

        if let Err(e) = self.drop_settings() {
            return Err(ArchiveError::PartialRestore {
                restored: 0,
                reason: e.to_string(),
            });
        }

        let moves = planned.iter().zip(&staged).enumerate();
        for (restored, ((name, target, _), staged_path)) in moves {
            if let Err(e) = fs::rename(staged_path, target) {
                tracing::error!("Failed to move {} into place: {}", target, e);
                return Err(ArchiveError::PartialRestore {
                    restored,
                    reason: format!("{}: {}", target, e),
                });
            }
            report.restored.push(name.clone());
        }

        tracing::info!(
            "Restored {} settings files ({} skipped)",
            report.restored.len(),
            report.skipped.len()
        );
        Ok(report)
    }

    /// Delete the config file and every registry file
    pub fn drop_settings(&self) -> Result<usize, ArchiveError> {
        let mut removed = 0;
        match fs::remove_file(&self.layout.config_file) {
            Ok(()) => removed += 1,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(source) => {
                return Err(ArchiveError::Io {
                    path: self.layout.config_file.clone(),
                    source,
                });
            }
        }
        for registry in [&self.layout.devices, &self.layout.plugins] {
            removed += registry.clear().map_err(|source| ArchiveError::Io {
                path: registry.path().to_path_buf(),
                source,
            })?;
        }
        tracing::debug!("Dropped {} settings files", removed);
        Ok(removed)
    }

    fn prepare_directories(&self) -> Result<(), ArchiveError> {
        let mut dirs = vec![self.layout.devices.path(), self.layout.plugins.path()];
        if let Some(parent) = self.layout.config_file.parent() {
            dirs.push(parent);
        }
        for dir in dirs.into_iter().filter(|d| !d.as_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|source| ArchiveError::WriteFailure {
                target: dir.to_string(),
                source,
            })?;
        }
        Ok(())
    }

    /// Write every blob beside its target; on failure nothing staged survives
    fn stage(
        &self,
        planned: &[(String, Utf8PathBuf, Vec<u8>)],
    ) -> Result<Vec<Utf8PathBuf>, ArchiveError> {
        let mut staged = Vec::with_capacity(planned.len());
        for (_, target, bytes) in planned {
            let staged_path = staging_path(target);
            if let Err(source) = fs::write(&staged_path, bytes) {
                tracing::error!("Failed to stage {}: {}", staged_path, source);
                // The failed write may have left a truncated file behind
                staged.push(staged_path);
                discard_staged(&staged);
                return Err(ArchiveError::WriteFailure {
                    target: target.to_string(),
                    source,
                });
            }
            staged.push(staged_path);
        }
        Ok(staged)
    }
}

fn staging_path(target: &Utf8Path) -> Utf8PathBuf {
    let mut path = target.as_str().to_string();
    path.push('.');
    path.push_str(STAGING_EXTENSION);
    Utf8PathBuf::from(path)
}

fn discard_staged(staged: &[Utf8PathBuf]) {
    for path in staged {
        match fs::remove_file(path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("Failed to remove staged file {}: {}", path, e),
        }
    }
}

fn unpack(raw: &[u8]) -> Result<BTreeMap<String, Vec<u8>>, ArchiveError> {
    let mut archive =
        ZipArchive::new(Cursor::new(raw)).map_err(|e| ArchiveError::Corrupt(e.to_string()))?;
    let mut blobs = BTreeMap::new();
    for index in 0..archive.len() {
        let mut file = archive
            .by_index(index)
            .map_err(|e| ArchiveError::Corrupt(e.to_string()))?;
        if file.is_dir() {
            continue;
        }
        let name = file.name().to_string();
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)
            .map_err(|e| ArchiveError::Corrupt(format!("{}: {}", name, e)))?;
        blobs.insert(name, bytes);
    }
    Ok(blobs)
}

fn write_blob<W: Write + Seek>(
    zip: &mut ZipWriter<W>,
    name: &str,
    bytes: &[u8],
) -> Result<(), ArchiveError> {
    let failure = |source: io::Error| ArchiveError::WriteFailure {
        target: name.to_string(),
        source,
    };
    zip.start_file(name, SimpleFileOptions::default())
        .map_err(|e| failure(io::Error::other(e)))?;
    zip.write_all(bytes).map_err(failure)
}

fn read_file(path: &Utf8Path) -> Result<Vec<u8>, ArchiveError> {
    fs::read(path).map_err(|source| ArchiveError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Local time as `YYYY-MM-DD HH:MM:SS`
fn now_string() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}
