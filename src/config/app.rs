use super::{ConfigError, ConfigStore, Constraint, LoadReport};
use crate::models::TransferDirection;
use crate::services::notification::NotifyMode;
use crate::services::transfer::EngineOptions;
use camino::Utf8Path;
use std::time::Duration;

/// Lowest device UIN handed out to this client
pub const UIN_MIN: i64 = 0x0F;

/// Highest device UIN handed out to this client
pub const UIN_MAX: i64 = 0x0FFF_FFFF;

/// Upper bound for parallel transfers in a single pass
pub const MAX_PARALLEL_TRANSFERS: i64 = 8;

/// Notification policy options, shared by uploads and downloads
const NOTIFICATION_OPTIONS: &[(&str, &str)] = &[
    ("no", "Don't show notifications"),
    ("one", "One notification per batch"),
    ("all", "Notification for every file"),
];

/// Application configuration (`conf.yaml`)
///
/// Thin typed layer over a [`ConfigStore`]; every entry is declared in
/// [`AppConf::new`] and read back through the accessors below.
#[derive(Debug, Clone)]
pub struct AppConf {
    store: ConfigStore,
}

impl AppConf {
    pub const UIN: &'static str = "uin";
    pub const NAME: &'static str = "name";
    pub const DESCRIPTION: &'static str = "description";
    pub const PASSWORD: &'static str = "password";
    pub const CELLULAR_DATA: &'static str = "cellularData";
    pub const NOTIFICATION_LISTENER: &'static str = "notificationListenerService";
    pub const AUTO_SEARCH: &'static str = "autoSearch";
    pub const DOWNLOAD_NOTIFICATION_POLICY: &'static str = "downloadNotificationPolicy";
    pub const UPLOAD_NOTIFICATION_POLICY: &'static str = "uploadNotificationPolicy";
    pub const DOWNLOAD_DIRECTORY: &'static str = "downloadDirectory";
    pub const PARALLEL_TRANSFERS: &'static str = "parallelTransfers";
    pub const TRANSFER_TIMEOUT: &'static str = "transferTimeout";

    /// Declare all application entries with generated defaults
    pub fn new<P: AsRef<Utf8Path>>(path: P) -> Self {
        let host = hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|_| "dcnnt-device".to_string());
        let seed = uuid::Uuid::new_v4();
        let uin = UIN_MIN + (seed.as_u128() % (UIN_MAX - UIN_MIN) as u128) as i64;
        let password = format!("P{}", uuid::Uuid::new_v4().simple());
        let description = format!("Host: {}, OS: {}", host, std::env::consts::OS);

        let mut store = ConfigStore::new("app", path);
        let defaults = Defaults {
            uin,
            name: truncate(&host, 40),
            description: truncate(&description, 200),
            password,
        };
        if let Err(e) = declare_entries(&mut store, defaults) {
            panic!("app config declarations are inconsistent: {}", e);
        }

        Self { store }
    }

    pub fn load(&mut self) -> Result<LoadReport, ConfigError> {
        self.store.load()
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        self.store.save()
    }

    pub fn store(&self) -> &ConfigStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut ConfigStore {
        &mut self.store
    }

    pub fn path(&self) -> &Utf8Path {
        self.store.path()
    }

    pub fn uin(&self) -> i64 {
        self.store.get_int(Self::UIN).unwrap_or(UIN_MIN)
    }

    pub fn name(&self) -> &str {
        self.store.get_str(Self::NAME).unwrap_or_default()
    }

    pub fn description(&self) -> &str {
        self.store.get_str(Self::DESCRIPTION).unwrap_or_default()
    }

    pub fn password(&self) -> &str {
        self.store.get_str(Self::PASSWORD).unwrap_or_default()
    }

    pub fn cellular_data(&self) -> bool {
        self.store.get_bool(Self::CELLULAR_DATA).unwrap_or(false)
    }

    pub fn notification_listener_service(&self) -> bool {
        self.store
            .get_bool(Self::NOTIFICATION_LISTENER)
            .unwrap_or(false)
    }

    pub fn auto_search(&self) -> bool {
        self.store.get_bool(Self::AUTO_SEARCH).unwrap_or(true)
    }

    pub fn download_directory(&self) -> &str {
        self.store.get_str(Self::DOWNLOAD_DIRECTORY).unwrap_or_default()
    }

    /// Notification policy configured for one transfer direction
    pub fn notification_mode(&self, direction: TransferDirection) -> NotifyMode {
        let key = match direction {
            TransferDirection::Upload => Self::UPLOAD_NOTIFICATION_POLICY,
            TransferDirection::Download => Self::DOWNLOAD_NOTIFICATION_POLICY,
        };
        self.store
            .get_str(key)
            .and_then(NotifyMode::from_key)
            .unwrap_or_default()
    }

    /// Engine tuning derived from the stored parallelism and timeout
    pub fn engine_options(&self) -> EngineOptions {
        let parallel = self.store.get_int(Self::PARALLEL_TRANSFERS).unwrap_or(1);
        let timeout = self.store.get_int(Self::TRANSFER_TIMEOUT).unwrap_or(0);
        EngineOptions {
            max_concurrent: parallel.max(1) as usize,
            transfer_timeout: (timeout > 0).then(|| Duration::from_secs(timeout as u64)),
        }
    }
}

struct Defaults {
    uin: i64,
    name: String,
    description: String,
    password: String,
}

fn declare_entries(store: &mut ConfigStore, defaults: Defaults) -> Result<(), ConfigError> {
    store.declare(AppConf::UIN, Constraint::range(UIN_MIN, UIN_MAX), defaults.uin)?;
    store.declare(AppConf::NAME, Constraint::length(0, 40), defaults.name)?;
    store.declare(
        AppConf::DESCRIPTION,
        Constraint::length(0, 200),
        defaults.description,
    )?;
    store.declare(AppConf::PASSWORD, Constraint::length(0, 4096), defaults.password)?;
    store.declare(AppConf::CELLULAR_DATA, Constraint::Flag, false)?;
    store.declare(AppConf::NOTIFICATION_LISTENER, Constraint::Flag, false)?;
    store.declare(AppConf::AUTO_SEARCH, Constraint::Flag, true)?;
    store.declare_choice(AppConf::DOWNLOAD_NOTIFICATION_POLICY, NOTIFICATION_OPTIONS, 1)?;
    store.declare_choice(AppConf::UPLOAD_NOTIFICATION_POLICY, NOTIFICATION_OPTIONS, 1)?;
    store.declare(AppConf::DOWNLOAD_DIRECTORY, Constraint::length(0, 200), "Download")?;
    store.declare(
        AppConf::PARALLEL_TRANSFERS,
        Constraint::range(1, MAX_PARALLEL_TRANSFERS),
        1_i64,
    )?;
    // Seconds; 0 disables the limit
    store.declare(AppConf::TRANSFER_TIMEOUT, Constraint::range(0, 86_400), 0_i64)?;
    Ok(())
}

fn truncate(value: &str, max_chars: usize) -> String {
    value.chars().take(max_chars).collect()
}
