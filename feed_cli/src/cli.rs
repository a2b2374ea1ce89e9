//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand};
use feed_ui::SpeedUnit;
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "powerfeed", version, about = "Lathe power feed controller")]
pub struct Cli {
    /// Path to config TOML (typed)
    #[arg(long, value_name = "FILE", default_value = "etc/powerfeed.toml")]
    pub config: PathBuf,

    /// Log as JSON lines instead of pretty
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace)
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Drive the feed on simulated hardware from a key script
    Run {
        /// Script file with one key per line; reads stdin when absent
        #[arg(long, value_name = "FILE")]
        script: Option<PathBuf>,
        /// Display units (overrides [display] units)
        #[arg(long, value_enum, value_name = "UNIT")]
        units: Option<SpeedUnit>,
        /// Read the left/right/rapid buttons from GPIO instead of the script
        #[cfg(all(feature = "hardware", target_os = "linux"))]
        #[arg(long, action = ArgAction::SetTrue)]
        buttons: bool,
    },
    /// Validate the config and assemble/tear down the system once
    SelfCheck,
}
