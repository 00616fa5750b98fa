//! dcnnt - settings maintenance for the dcnnt device connector
//!
//! Main entry point for the command line tool.
//!
//! # Execution Flow
//!
//! 1. Resolve runtime options: defaults, optional `dcnnt.yaml`, `DCNNT_*`
//!    environment variables, then command line flags
//! 2. Initialize logging → `<log_dir>/dcnnt.<date>`
//! 3. Initialize the data directory ([`AppContext`])
//! 4. Run the requested command
//!
//! # Data Directory
//!
//! - `conf.yaml`: application config
//! - `devices/*.device.yaml`: paired devices
//! - `plugins/*.conf.yaml`: plugin configs

mod args;

use anyhow::{Context, Result};
use args::{Args, Command, ConfigCommand};
use clap::Parser;
use dcnnt::config::RuntimeOptions;
use dcnnt::{APP_NAME, AppContext, VERSION};
use std::fs::File;

fn main() -> Result<()> {
    let args = Args::parse();

    let mut options = RuntimeOptions::load()?;
    if let Some(data_dir) = args.data_dir.clone() {
        options.data_dir = data_dir;
    }
    if let Some(log_dir) = args.log_dir.clone() {
        options.log_dir = log_dir;
    }
    options.debug |= args.debug;
    options.console &= !args.quiet;

    let _guard = dcnnt::logging::setup_logging_with_console(
        &options.log_dir,
        "dcnnt",
        options.debug,
        options.console,
    )?;

    tracing::info!("Starting {} v{}", APP_NAME, VERSION);

    let mut context = AppContext::init(&options.data_dir)
        .with_context(|| format!("Failed to initialize data directory {}", options.data_dir))?;

    let result = run_command(&mut context, args.command);
    if let Err(e) = &result {
        tracing::error!("Command failed: {:#}", e);
    }
    result
}

fn run_command(context: &mut AppContext, command: Command) -> Result<()> {
    match command {
        Command::Backup { file } => {
            let sink = File::create(&file)
                .with_context(|| format!("Failed to create archive: {}", file))?;
            let report = context
                .archiver()
                .dump(sink)
                .with_context(|| format!("Failed to write archive: {}", file))?;
            println!(
                "Saved {} files to {} ({})",
                report.files.len(),
                file,
                report.timestamp
            );
        }

        Command::Restore { file } => {
            let source =
                File::open(&file).with_context(|| format!("Failed to open archive: {}", file))?;
            let report = context
                .archiver()
                .restore(source)
                .with_context(|| format!("Failed to restore from {}", file))?;
            context.reload().context("Restored config could not be read")?;
            println!(
                "Restored {} files from backup taken {}",
                report.restored.len(),
                report.timestamp
            );
            for name in &report.skipped {
                println!("  skipped {}", name);
            }
        }

        Command::Config(ConfigCommand::List) => {
            for entry in context.conf().store().entries() {
                println!("{} = {}", entry.key(), entry.value());
            }
        }

        Command::Config(ConfigCommand::Get { key }) => {
            let value = context
                .conf()
                .store()
                .get(&key)
                .with_context(|| format!("Unknown config entry '{}'", key))?;
            println!("{}", value);
        }

        Command::Config(ConfigCommand::Set { key, value }) => {
            let conf = context.conf_mut();
            conf.store_mut().set_from_str(&key, &value)?;
            conf.save()?;
            tracing::info!("Set {} = {}", key, value);
        }

        Command::Registry => {
            for name in context.devices().names()? {
                println!("device  {}", name);
            }
            for name in context.plugins().names()? {
                println!("plugin  {}", name);
            }
        }
    }
    Ok(())
}
