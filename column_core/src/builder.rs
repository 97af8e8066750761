//! Type-state builder for `Engine` and generic `build_engine` constructor.
//!
//! The builder enforces at compile time that Heater, Pump, and Valves are provided
//! before `build()` is available. `try_build()` is always available for dynamic checks.

use std::marker::PhantomData;
use std::sync::Arc;

use column_traits::clock::{Clock, MonotonicClock};
use column_traits::{Heater, Notifier, Pump, Valves};

use crate::command::CommandQueue;
use crate::config::Settings;
use crate::engine::EngineCore;
use crate::error::{BuildError, Result};
use crate::fsm::ProcessFsm;
use crate::notify::TracingNotifier;
use crate::safety::SafetyMonitor;
use crate::state::SystemState;

/// Engine with boxed actuators, as assembled by `EngineBuilder`.
pub type Engine =
    EngineCore<Box<dyn Heater + Send>, Box<dyn Pump + Send>, Box<dyn Valves + Send>>;

impl Engine {
    /// Start building an Engine.
    pub fn builder() -> EngineBuilder<Missing, Missing, Missing> {
        EngineBuilder::default()
    }
}

// ── Type-state markers ───────────────────────────────────────────────────────

pub struct Missing;
pub struct Set;

/// Builder for `Engine`. Settings are validated on `build()`.
pub struct EngineBuilder<H, P, V> {
    heater: Option<Box<dyn Heater + Send>>,
    pump: Option<Box<dyn Pump + Send>>,
    valves: Option<Box<dyn Valves + Send>>,
    settings: Option<Settings>,
    clock: Option<Box<dyn Clock + Send + Sync>>,
    notifier: Option<Box<dyn Notifier + Send>>,
    _h: PhantomData<H>,
    _p: PhantomData<P>,
    _v: PhantomData<V>,
}

impl Default for EngineBuilder<Missing, Missing, Missing> {
    fn default() -> Self {
        Self {
            heater: None,
            pump: None,
            valves: None,
            settings: None,
            clock: None,
            notifier: None,
            _h: PhantomData,
            _p: PhantomData,
            _v: PhantomData,
        }
    }
}

fn invalid(msg: &'static str) -> eyre::Report {
    eyre::Report::new(BuildError::InvalidConfig(msg))
}

/// Range checks on a runtime settings snapshot.
pub fn validate_settings(s: &Settings) -> Result<()> {
    let eq = &s.equipment;
    if eq.heater_power_w == 0 {
        return Err(invalid("heater_power_w must be > 0"));
    }
    if !(eq.cube_volume_l > 0.0 && eq.cube_volume_l.is_finite()) {
        return Err(invalid("cube_volume_l must be > 0"));
    }
    if eq.column_height_mm == 0 || !(eq.packing_coeff > 0.0) {
        return Err(invalid("column height and packing coefficient must be > 0"));
    }
    if let Some(p) = eq.calibrated_flood_pressure
        && !(p > 0.0 && p < 100.0)
    {
        return Err(invalid("calibrated flood pressure must be in (0, 100)"));
    }
    if eq.max_power_percent == 0 || eq.max_power_percent > 100 {
        return Err(invalid("max_power_percent must be in [1, 100]"));
    }
    let r = &s.rectification;
    if !(r.heads_speed_ml_h_kw > 0.0 && r.body_speed_ml_h_kw > 0.0) {
        return Err(invalid("takeoff speeds must be > 0"));
    }
    if !(0.0..=100.0).contains(&r.heads_percent) {
        return Err(invalid("heads_percent must be in [0, 100]"));
    }
    if s.safety.sensor_timeout_ms == 0 {
        return Err(invalid("sensor_timeout_ms must be >= 1"));
    }
    if !(s.safety.flood_power_cut > 0.0 && s.safety.flood_power_cut < 1.0) {
        return Err(invalid("flood_power_cut must be in (0, 1)"));
    }
    let g = &s.regulator;
    if !(g.work_mult > 0.0 && g.work_mult < g.warn_mult && g.warn_mult < g.crit_mult) {
        return Err(invalid("pressure multipliers must be increasing"));
    }
    let d = &s.decrement;
    if !(d.resume_c >= 0.0 && d.resume_c < d.rise_c) {
        return Err(invalid("decrement resume band must be below the rise threshold"));
    }
    if !(d.step > 0.0 && d.min_multiplier > 0.0 && d.min_multiplier <= 1.0) || d.max_count == 0 {
        return Err(invalid("decrement step, floor and max_count must be positive"));
    }
    Ok(())
}

/// Validate configuration and construct an `EngineCore`.
///
/// This is the single source of truth for validation and construction,
/// used by both `EngineBuilder::try_build()` and `build_engine()`.
fn validate_and_build<H: Heater, P: Pump, V: Valves>(
    heater: H,
    pump: P,
    valves: V,
    settings: Settings,
    clock: Option<Box<dyn Clock + Send + Sync>>,
    notifier: Option<Box<dyn Notifier + Send>>,
) -> Result<EngineCore<H, P, V>> {
    validate_settings(&settings)?;

    let clock: Arc<dyn Clock + Send + Sync> = match clock {
        Some(b) => Arc::from(b),
        None => Arc::new(MonotonicClock::new()),
    };
    let epoch = clock.now();
    let fsm = ProcessFsm::new(&settings);
    let mut state = SystemState::default();
    fsm.refresh_pressure(&mut state);

    tracing::debug!(
        heater_w = settings.equipment.heater_power_w,
        flood_mmhg = state.pressure.flood_mmhg,
        "engine built"
    );

    Ok(EngineCore {
        heater,
        pump,
        valves,
        settings: Arc::new(settings),
        state,
        safety: SafetyMonitor::new(),
        fsm,
        clock,
        epoch,
        notifier: notifier.unwrap_or_else(|| Box::new(TracingNotifier)),
        commands: CommandQueue::new(),
    })
}

impl<H, P, V> EngineBuilder<H, P, V> {
    /// Fallible build available in any type-state; returns detailed error for missing pieces.
    pub fn try_build(self) -> Result<Engine> {
        let heater = self
            .heater
            .ok_or_else(|| eyre::Report::new(BuildError::MissingHeater))?;
        let pump = self
            .pump
            .ok_or_else(|| eyre::Report::new(BuildError::MissingPump))?;
        let valves = self
            .valves
            .ok_or_else(|| eyre::Report::new(BuildError::MissingValves))?;

        validate_and_build(
            heater,
            pump,
            valves,
            self.settings.unwrap_or_default(),
            self.clock,
            self.notifier,
        )
    }

    fn retype<H2, P2, V2>(self) -> EngineBuilder<H2, P2, V2> {
        EngineBuilder {
            heater: self.heater,
            pump: self.pump,
            valves: self.valves,
            settings: self.settings,
            clock: self.clock,
            notifier: self.notifier,
            _h: PhantomData,
            _p: PhantomData,
            _v: PhantomData,
        }
    }
}

/// Chainable setters that do not affect type-state.
impl<H, P, V> EngineBuilder<H, P, V> {
    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = Some(settings);
        self
    }
    /// Provide a custom clock implementation; defaults to `MonotonicClock` when not provided.
    pub fn with_clock(mut self, clock: Box<dyn Clock + Send + Sync>) -> Self {
        self.clock = Some(clock);
        self
    }
    /// Notification sink; defaults to `TracingNotifier`.
    pub fn with_notifier(mut self, notifier: impl Notifier + Send + 'static) -> Self {
        self.notifier = Some(Box::new(notifier));
        self
    }
}

// Setters that advance type-state
impl<P, V> EngineBuilder<Missing, P, V> {
    pub fn with_heater(self, heater: impl Heater + Send + 'static) -> EngineBuilder<Set, P, V> {
        let mut next = self.retype();
        next.heater = Some(Box::new(heater));
        next
    }
}

impl<H, V> EngineBuilder<H, Missing, V> {
    pub fn with_pump(self, pump: impl Pump + Send + 'static) -> EngineBuilder<H, Set, V> {
        let mut next = self.retype();
        next.pump = Some(Box::new(pump));
        next
    }
}

impl<H, P> EngineBuilder<H, P, Missing> {
    pub fn with_valves(self, valves: impl Valves + Send + 'static) -> EngineBuilder<H, P, Set> {
        let mut next = self.retype();
        next.valves = Some(Box::new(valves));
        next
    }
}

impl EngineBuilder<Set, Set, Set> {
    /// Validate and build the Engine. Only available when Heater, Pump, and Valves are set.
    pub fn build(self) -> Result<Engine> {
        self.try_build()
    }
}

/// Build a generic, statically-dispatched engine from concrete actuators.
///
/// Delegates to the shared `validate_and_build`.
pub fn build_engine<H, P, V>(
    heater: H,
    pump: P,
    valves: V,
    settings: Settings,
    clock: Option<Box<dyn Clock + Send + Sync>>,
    notifier: Option<Box<dyn Notifier + Send>>,
) -> Result<EngineCore<H, P, V>>
where
    H: Heater,
    P: Pump,
    V: Valves,
{
    validate_and_build(heater, pump, valves, settings, clock, notifier)
}
