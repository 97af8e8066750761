//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use column_core::Mode;
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "column", version, about = "Distillation column process controller")]
pub struct Cli {
    /// Path to config TOML (typed)
    #[arg(long, value_name = "FILE", default_value = "etc/column.toml")]
    pub config: PathBuf,

    /// Log and report as JSON lines instead of pretty
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace); overrides [logging] level
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

/// Process modes selectable from the command line.
#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum ModeArg {
    Rectification,
    Distillation,
    /// Manual rectification: regulated heater, no phase progression
    Manual,
    Mashing,
    Hold,
}

impl From<ModeArg> for Mode {
    fn from(m: ModeArg) -> Self {
        match m {
            ModeArg::Rectification => Mode::Rectification,
            ModeArg::Distillation => Mode::Distillation,
            ModeArg::Manual => Mode::ManualRectification,
            ModeArg::Mashing => Mode::Mashing,
            ModeArg::Hold => Mode::Hold,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Replay a recorded sensor trace (CSV) through the engine on simulated actuators
    Replay {
        /// Trace CSV: t_ms,cube,column_bottom,column_top,tsa,water_in,water_out,reflux,pressure,abv,voltage
        #[arg(long, value_name = "FILE")]
        trace: PathBuf,
        /// Process to start on the first trace row
        #[arg(long, value_enum, default_value = "rectification")]
        mode: ModeArg,
        /// Pin regulated heater power to this percentage
        #[arg(long, value_name = "PERCENT", value_parser = clap::value_parser!(u8).range(0..=100))]
        power_override: Option<u8>,
        /// Calibrated flood pressure in mmHg (replaces the geometry estimate)
        #[arg(long, value_name = "MMHG")]
        flood_pressure: Option<f32>,
        /// Emit one line per control cycle instead of per phase change
        #[arg(long, action = ArgAction::SetTrue)]
        every_cycle: bool,
    },
    /// Validate the config and assemble the engine on simulated actuators
    SelfCheck,
    /// Print the pressure thresholds derived from the config
    Thresholds,
}
