//! The unified control engine (`EngineCore`).
//!
//! One `step` is one control cycle: ingest readings, drain operator commands,
//! run the safety monitor, run the FSM (or hold the pause safe state), then
//! apply the resolved command frame to the actuators.

use std::sync::Arc;
use std::time::Instant;

use column_traits::{Clock, Heater, Notifier, Pump, Valve, Valves};
use eyre::WrapErr;
use serde::Serialize;

use crate::command::{Command, CommandQueue, CommandSender};
use crate::config::Settings;
use crate::cut_point::{CutPointDetector, DetectorSnapshot};
use crate::error::{ColumnError, CommandError, Result};
use crate::frame::{CommandFrame, PumpCommand};
use crate::fsm::{ProcessFsm, pause_safe_frame};
use crate::hw_error::map_hw_error;
use crate::program::ProgramSnapshot;
use crate::regulator::{PowerRegulator, RegulatorSnapshot};
use crate::safety::SafetyMonitor;
use crate::state::{Mode, SensorReadings, SystemState};
use crate::status::CycleStatus;

/// Serializable process-state export.
#[derive(Debug, Clone, Serialize)]
pub struct Telemetry {
    pub state: SystemState,
    pub phase_elapsed_ms: u64,
    pub regulator: RegulatorSnapshot,
    pub detector: DetectorSnapshot,
    pub program: ProgramSnapshot,
}

/// Engine over concrete actuator types; `Engine` is the boxed alias.
pub struct EngineCore<H: Heater, P: Pump, V: Valves> {
    pub(crate) heater: H,
    pub(crate) pump: P,
    pub(crate) valves: V,
    pub(crate) settings: Arc<Settings>,
    pub(crate) state: SystemState,
    pub(crate) safety: SafetyMonitor,
    pub(crate) fsm: ProcessFsm,
    pub(crate) clock: Arc<dyn Clock + Send + Sync>,
    pub(crate) epoch: Instant,
    pub(crate) notifier: Box<dyn Notifier + Send>,
    pub(crate) commands: CommandQueue,
}

impl<H: Heater, P: Pump, V: Valves> core::fmt::Debug for EngineCore<H, P, V> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EngineCore")
            .field("mode", &self.state.mode)
            .field("phase", &self.state.phase)
            .field("paused", &self.state.paused)
            .field("safety_ok", &self.state.safety_ok)
            .field("heater_percent", &self.state.heater_percent)
            .finish()
    }
}

impl<H: Heater, P: Pump, V: Valves> EngineCore<H, P, V> {
    /// Read-only view of the process state.
    pub fn state(&self) -> &SystemState {
        &self.state
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Handle for I/O layers to queue operator commands.
    pub fn command_sender(&self) -> CommandSender {
        self.commands.sender()
    }

    pub fn regulator(&self) -> &PowerRegulator {
        self.fsm.regulator()
    }

    pub fn detector(&self) -> &CutPointDetector {
        self.fsm.detector()
    }

    /// Milliseconds since the engine was built.
    pub fn now_ms(&self) -> u64 {
        self.clock.ms_since(self.epoch)
    }

    pub fn telemetry(&self) -> Telemetry {
        Telemetry {
            state: self.state.clone(),
            phase_elapsed_ms: self.fsm.phase_elapsed_ms(&self.state),
            regulator: self.fsm.regulator().snapshot(),
            detector: self.fsm.detector().snapshot(),
            program: self.fsm.program(),
        }
    }

    /// Run one control cycle.
    pub fn step(&mut self, readings: &SensorReadings) -> Result<CycleStatus> {
        let now = self.now_ms();
        self.state.now_ms = now;
        self.state.ingest(readings, now);
        self.state.pump.total_volume_ml = self.pump.volume_ml();

        let mut frame = CommandFrame::new();
        for cmd in self.commands.drain() {
            if let Err(e) = self.handle(cmd, &mut frame) {
                tracing::warn!(error = %e, command = ?cmd, "command rejected");
            }
        }

        self.fsm.refresh_pressure(&mut self.state);
        self.safety.check(
            &mut self.state,
            &self.settings.safety,
            &mut frame,
            self.notifier.as_mut(),
        );

        let intent = if self.state.paused {
            pause_safe_frame(&self.state)
        } else {
            self.fsm
                .update(&mut self.state, &self.settings, self.notifier.as_mut())
        };
        frame.overlay(&intent);
        let finished = self.fsm.take_finished();

        self.apply(&frame)?;
        Ok(self.status_with(finished))
    }

    /// Status derived from the current state, without running a cycle.
    pub fn status(&self) -> CycleStatus {
        self.status_with(false)
    }

    fn status_with(&self, finished: bool) -> CycleStatus {
        if !self.state.safety_ok {
            CycleStatus::Tripped(self.state.current_alarm.kind)
        } else if finished {
            CycleStatus::Finished
        } else if self.state.paused {
            CycleStatus::Paused
        } else if self.state.is_running() {
            CycleStatus::Running
        } else {
            CycleStatus::Idle
        }
    }

    pub fn start(&mut self, mode: Mode) -> Result<()> {
        self.execute(Command::Start(mode))
    }

    pub fn stop(&mut self) -> Result<()> {
        self.execute(Command::Stop)
    }

    pub fn pause(&mut self) -> Result<()> {
        self.execute(Command::Pause)
    }

    pub fn resume(&mut self) -> Result<()> {
        self.execute(Command::Resume)
    }

    pub fn acknowledge(&mut self) -> Result<()> {
        self.execute(Command::Acknowledge)
    }

    pub fn reset_alarm(&mut self) -> Result<()> {
        self.execute(Command::ResetAlarm)
    }

    pub fn set_power_override(&mut self, percent: Option<u8>) -> Result<()> {
        self.execute(Command::SetPowerOverride(percent))
    }

    pub fn set_flood_pressure(&mut self, mmhg: f32) -> Result<()> {
        self.execute(Command::SetFloodPressure(mmhg))
    }

    /// Swap the settings snapshot. Only allowed between runs.
    pub fn reload_settings(&mut self, settings: Arc<Settings>) -> Result<()> {
        if self.state.is_running() {
            return Err(eyre::Report::new(ColumnError::Command(
                CommandError::AlreadyRunning,
            )));
        }
        crate::builder::validate_settings(&settings)?;
        self.fsm.reconfigure(&settings);
        self.settings = settings;
        self.fsm.refresh_pressure(&mut self.state);
        tracing::info!("settings reloaded");
        Ok(())
    }

    /// Run a command outside the cycle and apply its actuator commands now.
    fn execute(&mut self, cmd: Command) -> Result<()> {
        self.state.now_ms = self.now_ms();
        let mut frame = CommandFrame::new();
        self.handle(cmd, &mut frame)?;
        if !self.state.safety_ok {
            frame.emergency_stop_all();
        }
        self.apply(&frame)
    }

    fn handle(&mut self, cmd: Command, frame: &mut CommandFrame) -> Result<()> {
        let notifier = self.notifier.as_mut();
        match cmd {
            Command::Start(mode) => {
                let f = self
                    .fsm
                    .start_mode(&mut self.state, &self.settings, mode, notifier)
                    .map_err(command_error)?;
                frame.overlay(&f);
            }
            Command::Stop => {
                let f = self.fsm.stop_mode(&mut self.state, notifier);
                frame.overlay(&f);
            }
            Command::Pause => {
                let f = self
                    .fsm
                    .pause(&mut self.state, notifier)
                    .map_err(command_error)?;
                frame.overlay(&f);
            }
            Command::Resume => {
                self.fsm
                    .resume(&mut self.state, notifier)
                    .map_err(command_error)?;
            }
            Command::Acknowledge => {
                self.safety
                    .acknowledge(&mut self.state)
                    .map_err(|e| eyre::Report::new(ColumnError::Safety(e)))?;
            }
            Command::ResetAlarm => {
                self.safety
                    .reset(&mut self.state, &self.settings.safety)
                    .map_err(|e| eyre::Report::new(ColumnError::Safety(e)))?;
            }
            Command::SetPowerOverride(p) => self.fsm.regulator_mut().set_override(p),
            Command::SetFloodPressure(p) => {
                self.fsm.regulator_mut().set_flood_pressure(p)?;
                self.fsm.refresh_pressure(&mut self.state);
            }
        }
        Ok(())
    }

    /// Apply every command in the frame (best-effort). The first failure is
    /// returned after all channels were attempted.
    fn apply(&mut self, frame: &CommandFrame) -> Result<()> {
        let mut first: Option<ColumnError> = None;
        let mut record = |what: &'static str, mapped: ColumnError| {
            tracing::warn!(error = %mapped, actuator = what, "actuator command failed");
            if first.is_none() {
                first = Some(mapped);
            }
        };

        if frame.wants_pump_volume_reset() {
            match self.pump.reset_volume() {
                Ok(()) => self.state.pump.total_volume_ml = 0.0,
                Err(e) => record("pump", map_hw_error(&*e)),
            }
        }

        if let Some(percent) = frame.heater() {
            let res = if frame.is_heater_locked() && percent == 0 {
                self.heater.emergency_stop()
            } else {
                self.heater.set_power(percent)
            };
            match res {
                Ok(()) => self.state.heater_percent = percent,
                Err(e) => record("heater", map_hw_error(&*e)),
            }
        }

        match frame.pump() {
            Some(PumpCommand::Start(rate)) => match self.pump.start(rate) {
                Ok(()) => {
                    self.state.pump.running = rate > 0.0;
                    self.state.pump.speed_ml_h = rate;
                }
                Err(e) => record("pump", map_hw_error(&*e)),
            },
            Some(PumpCommand::Stop) => match self.pump.stop() {
                Ok(()) => {
                    self.state.pump.running = false;
                    self.state.pump.speed_ml_h = 0.0;
                }
                Err(e) => record("pump", map_hw_error(&*e)),
            },
            None => {}
        }

        for v in Valve::ALL {
            let Some(open) = frame.valve(v) else {
                continue;
            };
            match self.valves.set_open(v, open) {
                Ok(()) => {
                    let vs = &mut self.state.valves;
                    match v {
                        Valve::CoolingWater => vs.cooling_water = open,
                        Valve::Heads => vs.heads = open,
                        Valve::ContinuousTakeoff => vs.continuous_takeoff = open,
                        Valve::StartStop => vs.start_stop = open,
                    }
                }
                Err(e) => record("valves", map_hw_error(&*e)),
            }
        }

        match first {
            None => Ok(()),
            Some(e) => Err(eyre::Report::new(e)).wrap_err("applying actuator commands"),
        }
    }
}

fn command_error(e: CommandError) -> eyre::Report {
    eyre::Report::new(ColumnError::Command(e))
}
