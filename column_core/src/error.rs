use thiserror::Error;

use crate::state::AlarmKind;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ColumnError {
    #[error("hardware error: {0}")]
    Hardware(String),
    #[error("hardware fault: {0}")]
    HardwareFault(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("command rejected: {0}")]
    Command(#[from] CommandError),
    #[error("safety: {0}")]
    Safety(#[from] SafetyError),
}

/// Operator command that was refused; the engine state is untouched.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CommandError {
    #[error("a process is already running")]
    AlreadyRunning,
    #[error("no process is running")]
    NotRunning,
    #[error("process is already paused")]
    AlreadyPaused,
    #[error("process is not paused")]
    NotPaused,
    #[error("safety interlock is latched")]
    SafetyLatched,
    #[error("required sensor unavailable: {0}")]
    SensorUnavailable(&'static str),
    #[error("mode cannot be started")]
    InvalidMode,
    #[error("program has no steps")]
    EmptyProgram,
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SafetyError {
    #[error("no alarm to act on")]
    NoAlarm,
    #[error("alarm must be acknowledged before reset")]
    NotAcknowledged,
    #[error("hazard still active: {0:?}")]
    HazardActive(AlarmKind),
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("missing heater")]
    MissingHeater,
    #[error("missing pump")]
    MissingPump,
    #[error("missing valves")]
    MissingValves,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
