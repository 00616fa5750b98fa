use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use serde::Deserialize;

/// Process-level options for the command line front end.
///
/// Resolved from (lowest to highest priority) built-in defaults, an optional
/// `dcnnt.{yaml,toml,json}` file in the working directory, and `DCNNT_*`
/// environment variables such as `DCNNT_DATA_DIR`. Command line flags are
/// applied on top by the caller.
#[derive(Debug, Clone, Deserialize)]
pub struct RuntimeOptions {
    /// Directory holding `conf.yaml`, `devices/` and `plugins/`
    pub data_dir: Utf8PathBuf,
    /// Directory for rotating log files
    pub log_dir: Utf8PathBuf,
    /// Log at debug level instead of info
    pub debug: bool,
    /// Mirror logs to the console
    pub console: bool,
}

impl RuntimeOptions {
    /// Resolve options from defaults, `dcnnt.*` and the environment
    pub fn load() -> Result<Self> {
        Self::load_from("dcnnt")
    }

    /// Resolve options using `file_stem` as the optional settings file
    pub fn load_from(file_stem: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .set_default("data_dir", "data")?
            .set_default("log_dir", "logs")?
            .set_default("debug", false)?
            .set_default("console", true)?
            .add_source(config::File::with_name(file_stem).required(false))
            .add_source(config::Environment::with_prefix("DCNNT").try_parsing(true))
            .build()
            .context("Failed to read runtime options")?;

        settings
            .try_deserialize()
            .context("Invalid runtime options")
    }
}
