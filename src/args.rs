//! Command-line argument parsing

use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};

/// dcnnt settings maintenance
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Data directory holding conf.yaml, devices/ and plugins/ (overrides DCNNT_DATA_DIR)
    #[arg(short, long)]
    pub data_dir: Option<Utf8PathBuf>,

    /// Directory for rotating log files (overrides DCNNT_LOG_DIR)
    #[arg(long)]
    pub log_dir: Option<Utf8PathBuf>,

    /// Enable debug logging
    #[arg(long, default_value = "false")]
    pub debug: bool,

    /// Do not mirror logs to the console
    #[arg(short, long, default_value = "false")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Save all settings to a zip archive
    Backup {
        /// Archive to create (overwritten if it exists)
        file: Utf8PathBuf,
    },

    /// Replace all settings with the contents of an archive
    Restore {
        /// Archive previously written by `backup`
        file: Utf8PathBuf,
    },

    /// Inspect or change the application config
    #[command(subcommand)]
    Config(ConfigCommand),

    /// List paired devices and plugin configs
    Registry,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print every entry
    List,

    /// Print one entry
    Get { key: String },

    /// Validate, store and save one entry
    Set { key: String, value: String },
}
