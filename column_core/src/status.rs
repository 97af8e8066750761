//! Status returned from each control cycle.

use serde::Serialize;

use crate::state::AlarmKind;

/// Public status of a single engine cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CycleStatus {
    /// No process active.
    Idle,
    Running,
    /// Process active, timers frozen, actuators in the pause safe state.
    Paused,
    /// Safety interlock latched; actuators forced off.
    Tripped(AlarmKind),
    /// A run completed on its own during this cycle.
    Finished,
}
