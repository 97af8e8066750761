//! The shared process state record and the per-cycle sensor input.
//!
//! `SystemState` has a single writer (the control loop). I/O layers read it
//! through `Engine::state()` or a serialized snapshot.

use serde::Serialize;

/// Which process is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum Mode {
    #[default]
    Idle,
    Rectification,
    Distillation,
    ManualRectification,
    Mashing,
    Hold,
}

impl Mode {
    /// Modes that walk the heating/heads/body/tails phase table.
    pub fn is_phased(self) -> bool {
        matches!(self, Mode::Rectification | Mode::Distillation)
    }
}

/// Phase of a rectification or distillation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize)]
pub enum Phase {
    #[default]
    Idle,
    Heating,
    Stabilization,
    Heads,
    PostHeadsStabilization,
    Purge,
    Body,
    Tails,
    Finish,
}

impl Phase {
    pub fn label(self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Heating => "heating",
            Phase::Stabilization => "stabilization",
            Phase::Heads => "heads",
            Phase::PostHeadsStabilization => "post-heads stabilization",
            Phase::Purge => "purge",
            Phase::Body => "body",
            Phase::Tails => "tails",
            Phase::Finish => "finish",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum AlarmKind {
    #[default]
    None,
    VaporBreakthrough,
    WaterOverheat,
    ColumnFlood,
    SensorFailure,
    LowVoltage,
    HighVoltage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize)]
pub enum AlarmLevel {
    #[default]
    None,
    Warning,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Alarm {
    pub kind: AlarmKind,
    pub level: AlarmLevel,
    pub message: String,
    pub timestamp_ms: u64,
    /// Set only by an operator action.
    pub acknowledged: bool,
}

impl Alarm {
    pub fn is_active(&self) -> bool {
        self.kind != AlarmKind::None
    }
}

/// One sensor channel: last value plus validity.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Reading {
    pub value: f32,
    pub valid: bool,
}

impl Reading {
    pub fn valid(value: f32) -> Self {
        Self { value, valid: true }
    }

    /// Value if the sensor is valid.
    #[inline]
    pub fn get(self) -> Option<f32> {
        self.valid.then_some(self.value)
    }

    /// True when valid and strictly above `limit`.
    #[inline]
    pub fn above(self, limit: f32) -> bool {
        self.valid && self.value > limit
    }

    fn update(&mut self, sample: Option<f32>) {
        match sample {
            Some(v) if v.is_finite() => {
                self.value = v;
                self.valid = true;
            }
            _ => self.valid = false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Temperatures {
    pub cube: Reading,
    pub column_bottom: Reading,
    pub column_top: Reading,
    /// Vapor-exit sensor after the condenser.
    pub tsa: Reading,
    pub water_in: Reading,
    pub water_out: Reading,
    pub reflux: Reading,
    pub last_update_ms: Option<u64>,
}

/// Pressure readings plus the flood thresholds derived from them.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PressureState {
    pub cube_mmhg: f32,
    pub atmospheric_mmhg: f32,
    pub valid: bool,
    pub last_update_ms: Option<u64>,
    pub flood_mmhg: f32,
    pub work_mmhg: f32,
    pub warning_mmhg: f32,
    pub critical_mmhg: f32,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Hydrometer {
    pub abv: f32,
    pub density: f32,
    pub valid: bool,
    pub last_update_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PowerReadings {
    pub voltage: f32,
    pub current: f32,
    pub power_w: f32,
    pub valid: bool,
    pub last_update_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PumpState {
    pub running: bool,
    /// Commanded flow rate, mL/h.
    pub speed_ml_h: f32,
    /// Cumulative volume since run start, mL.
    pub total_volume_ml: f32,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ValveStates {
    pub cooling_water: bool,
    pub heads: bool,
    pub continuous_takeoff: bool,
    pub start_stop: bool,
}

/// Volumes collected in the current run; derived from pump volume markers.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Stats {
    pub heads_ml: f32,
    pub body_ml: f32,
    pub tails_ml: f32,
    pub decrement_count: u32,
    pub started_ms: Option<u64>,
}

impl Stats {
    pub fn total_volume(&self) -> f32 {
        self.heads_ml + self.body_ml + self.tails_ml
    }
}

/// Temperature sample; `None` means the channel failed this read.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TemperatureSample {
    pub cube: Option<f32>,
    pub column_bottom: Option<f32>,
    pub column_top: Option<f32>,
    pub tsa: Option<f32>,
    pub water_in: Option<f32>,
    pub water_out: Option<f32>,
    pub reflux: Option<f32>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PressureSample {
    pub cube_mmhg: Option<f32>,
    pub atmospheric_mmhg: Option<f32>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct HydrometerSample {
    pub abv: Option<f32>,
    pub density: Option<f32>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PowerSample {
    pub voltage: Option<f32>,
    pub current: Option<f32>,
    pub power_w: Option<f32>,
}

/// Readings delivered by the sensor subsystems for one cycle.
///
/// A `None` group means that subsystem produced nothing new; the previous
/// values and timestamps are kept.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SensorReadings {
    pub temperatures: Option<TemperatureSample>,
    pub pressure: Option<PressureSample>,
    pub hydrometer: Option<HydrometerSample>,
    pub power: Option<PowerSample>,
}

fn finite(v: Option<f32>) -> Option<f32> {
    v.filter(|x| x.is_finite())
}

/// The shared process record.
#[derive(Debug, Clone, Serialize)]
pub struct SystemState {
    pub mode: Mode,
    pub phase: Phase,
    pub paused: bool,
    pub safety_ok: bool,
    pub current_alarm: Alarm,
    pub temperatures: Temperatures,
    pub pressure: PressureState,
    pub hydrometer: Hydrometer,
    pub power: PowerReadings,
    pub pump: PumpState,
    /// Heater power last applied, percent.
    pub heater_percent: u8,
    pub valves: ValveStates,
    pub stats: Stats,
    /// Heads volume to collect in this run, mL.
    pub heads_target_ml: f32,
    /// Engine time of the current cycle.
    pub now_ms: u64,
}

impl Default for SystemState {
    fn default() -> Self {
        Self {
            mode: Mode::Idle,
            phase: Phase::Idle,
            paused: false,
            safety_ok: true,
            current_alarm: Alarm::default(),
            temperatures: Temperatures::default(),
            pressure: PressureState::default(),
            hydrometer: Hydrometer::default(),
            power: PowerReadings::default(),
            pump: PumpState::default(),
            heater_percent: 0,
            valves: ValveStates::default(),
            stats: Stats::default(),
            heads_target_ml: 0.0,
            now_ms: 0,
        }
    }
}

impl SystemState {
    pub fn is_running(&self) -> bool {
        self.mode != Mode::Idle
    }

    /// Merge one cycle's readings, stamping the groups that reported.
    pub fn ingest(&mut self, r: &SensorReadings, now_ms: u64) {
        if let Some(t) = r.temperatures {
            let temps = &mut self.temperatures;
            temps.cube.update(t.cube);
            temps.column_bottom.update(t.column_bottom);
            temps.column_top.update(t.column_top);
            temps.tsa.update(t.tsa);
            temps.water_in.update(t.water_in);
            temps.water_out.update(t.water_out);
            temps.reflux.update(t.reflux);
            let any_valid = [
                temps.cube,
                temps.column_bottom,
                temps.column_top,
                temps.tsa,
                temps.water_in,
                temps.water_out,
                temps.reflux,
            ]
            .iter()
            .any(|r| r.valid);
            if any_valid {
                temps.last_update_ms = Some(now_ms);
            }
        }
        if let Some(p) = r.pressure {
            match finite(p.cube_mmhg) {
                Some(v) => {
                    self.pressure.cube_mmhg = v;
                    self.pressure.valid = true;
                    self.pressure.last_update_ms = Some(now_ms);
                }
                None => self.pressure.valid = false,
            }
            if let Some(a) = finite(p.atmospheric_mmhg) {
                self.pressure.atmospheric_mmhg = a;
            }
        }
        if let Some(h) = r.hydrometer {
            match finite(h.abv) {
                Some(abv) => {
                    self.hydrometer.abv = abv;
                    self.hydrometer.valid = true;
                    self.hydrometer.last_update_ms = Some(now_ms);
                }
                None => self.hydrometer.valid = false,
            }
            if let Some(d) = finite(h.density) {
                self.hydrometer.density = d;
            }
        }
        if let Some(p) = r.power {
            match finite(p.voltage) {
                Some(v) => {
                    self.power.voltage = v;
                    self.power.valid = true;
                    self.power.last_update_ms = Some(now_ms);
                }
                None => self.power.valid = false,
            }
            if let Some(c) = finite(p.current) {
                self.power.current = c;
            }
            if let Some(w) = finite(p.power_w) {
                self.power.power_w = w;
            }
        }
    }
}
