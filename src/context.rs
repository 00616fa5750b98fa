use crate::config::{AppConf, ConfigError, LoadReport};
use crate::models::TransferDirection;
use crate::registry::{DEVICE_EXTENSION, PLUGIN_SUFFIX, RegistryDir};
use crate::services::{
    ArchiveLayout, NotificationPolicy, NotificationSink, SettingsArchiver, TransferChannel,
    TransferJobEngine,
};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use std::sync::Arc;

/// App config file name inside the data directory
pub const CONFIG_FILE_NAME: &str = "conf.yaml";

pub const DEVICES_DIR: &str = "devices";
pub const PLUGINS_DIR: &str = "plugins";

/// Everything that lives under the data directory
///
/// Built once at startup and passed to whoever needs it.
#[derive(Debug, Clone)]
pub struct AppContext {
    data_dir: Utf8PathBuf,
    conf: AppConf,
    devices: RegistryDir,
    plugins: RegistryDir,
}

impl AppContext {
    /// Describe the layout under `data_dir` without touching the disk
    pub fn new<P: AsRef<Utf8Path>>(data_dir: P) -> Self {
        let data_dir = data_dir.as_ref().to_path_buf();
        Self {
            conf: AppConf::new(data_dir.join(CONFIG_FILE_NAME)),
            devices: RegistryDir::new(data_dir.join(DEVICES_DIR), DEVICE_EXTENSION),
            plugins: RegistryDir::new(data_dir.join(PLUGINS_DIR), PLUGIN_SUFFIX),
            data_dir,
        }
    }

    /// Create the directory layout and load the app config.
    ///
    /// A missing config file is written out with its generated defaults so
    /// the device identity stays stable across runs.
    pub fn init<P: AsRef<Utf8Path>>(data_dir: P) -> Result<Self, ConfigError> {
        let mut context = Self::new(data_dir);
        tracing::info!("Initializing data directory {}", context.data_dir);

        for dir in [
            context.data_dir.as_path(),
            context.devices.path(),
            context.plugins.path(),
        ] {
            fs::create_dir_all(dir).map_err(|source| ConfigError::IoFailure {
                path: dir.to_path_buf(),
                source,
            })?;
        }

        let report = context.reload()?;
        if report.missing_file {
            tracing::info!("No config at {}, writing defaults", context.conf.path());
            context.conf.save()?;
        }
        Ok(context)
    }

    /// Re-read the app config from disk, e.g. after a restore
    pub fn reload(&mut self) -> Result<LoadReport, ConfigError> {
        let report = self.conf.load()?;
        for issue in &report.issues {
            tracing::warn!(
                "Config {}: {} ({})",
                self.conf.path(),
                issue.reason,
                issue.key.as_deref().unwrap_or("document")
            );
        }
        Ok(report)
    }

    pub fn data_dir(&self) -> &Utf8Path {
        &self.data_dir
    }

    pub fn conf(&self) -> &AppConf {
        &self.conf
    }

    pub fn conf_mut(&mut self) -> &mut AppConf {
        &mut self.conf
    }

    pub fn devices(&self) -> &RegistryDir {
        &self.devices
    }

    pub fn plugins(&self) -> &RegistryDir {
        &self.plugins
    }

    pub fn archive_layout(&self) -> ArchiveLayout {
        ArchiveLayout {
            config_file: self.conf.path().to_path_buf(),
            devices: self.devices.clone(),
            plugins: self.plugins.clone(),
        }
    }

    pub fn archiver(&self) -> SettingsArchiver {
        SettingsArchiver::new(self.archive_layout())
    }

    /// Notification policy using the configured per-direction modes
    pub fn notification_policy(&self, sink: Arc<dyn NotificationSink>) -> NotificationPolicy {
        NotificationPolicy::new(sink).with_modes(
            self.conf.notification_mode(TransferDirection::Upload),
            self.conf.notification_mode(TransferDirection::Download),
        )
    }

    /// Engine tuned from the app config
    pub fn transfer_engine(
        &self,
        channel: Arc<dyn TransferChannel>,
        notifications: NotificationPolicy,
    ) -> TransferJobEngine {
        TransferJobEngine::new(channel, notifications, self.conf.engine_options())
    }
}
