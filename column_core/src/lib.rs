#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Process control engine for a home distillation / rectification column
//! (hardware-agnostic).
//!
//! All hardware interactions go through the `column_traits` seams: `Heater`,
//! `Pump`, `Valves` for actuators and `Notifier` for operator events. Sensor
//! values arrive once per cycle as a `SensorReadings` value.
//!
//! ## Architecture
//!
//! - **State**: the shared process model (`state` module)
//! - **Safety**: hazard evaluation and the latching interlock (`safety`)
//! - **Regulator**: pressure-based heater power ("watt control", `regulator`)
//! - **Cut point**: head-temperature rise detection ("smart decrement", `cut_point`)
//! - **FSM**: mode and phase sequencing (`fsm`, `program`)
//! - **Engine**: one `step` per control cycle (`engine`, `builder`)
//!
//! Within a cycle, commands are collected into a `CommandFrame`. The safety
//! monitor writes first and may lock channels; the FSM overlays its intent
//! on top, so a safety shutdown always wins.
//!
//! Time is `u64` milliseconds since the engine was built.

pub mod builder;
pub mod command;
pub mod config;
pub mod conversions;
pub mod cut_point;
pub mod engine;
pub mod error;
pub mod frame;
pub mod fsm;
pub mod hw_error;
pub mod mocks;
pub mod notify;
pub mod program;
pub mod regulator;
pub mod safety;
pub mod state;
pub mod status;
pub mod util;

pub use builder::{Engine, EngineBuilder, build_engine, validate_settings};
pub use command::{Command, CommandSender};
pub use config::Settings;
pub use cut_point::CutPointDetector;
pub use engine::{EngineCore, Telemetry};
pub use error::{BuildError, ColumnError, CommandError, Report, Result, SafetyError};
pub use frame::{CommandFrame, PumpCommand};
pub use fsm::ProcessFsm;
pub use notify::TracingNotifier;
pub use regulator::{PowerRegulator, PressureStatus, PressureThresholds, calculate_flood_pressure};
pub use safety::SafetyMonitor;
pub use state::{
    Alarm, AlarmKind, AlarmLevel, Mode, Phase, Reading, SensorReadings, SystemState,
};
pub use status::CycleStatus;
