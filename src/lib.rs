// dcnnt - transfer-job engine and settings snapshots for the dcnnt device connector
//
// This is the library crate containing the core logic and data structures.
// The binary crate (main.rs) provides a maintenance command line.

pub mod config;
pub mod context;
pub mod logging;
pub mod models;
pub mod registry;
pub mod services;
pub mod state;

// Re-export commonly used types for convenience
pub use config::{AppConf, ConfigError, ConfigStore};
pub use context::AppContext;
pub use models::{FileStatus, TransferBatch, TransferDirection, TransferEntry, TransferResult};
pub use services::{SettingsArchiver, TransferChannel, TransferJobEngine};
pub use state::{StateChange, StateManager};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
