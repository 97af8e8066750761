//! Phase sequencer for rectification and distillation runs, plus the manual,
//! mashing and hold modes.
//!
//! Each phase handler is a pure function of a `PhaseInput` returning the
//! commands it wants and an optional next phase. Side effects (timers, stats,
//! detector, notifications) stay in `ProcessFsm`.

use column_traits::{Notification, Notifier, Severity, Valve};

use crate::config::{ProgramCfg, Settings, TempStep};
use crate::cut_point::CutPointDetector;
use crate::error::CommandError;
use crate::frame::CommandFrame;
use crate::program::{ProgramRunner, ProgramSnapshot};
use crate::regulator::{PowerRegulator, calculate_flood_pressure};
use crate::state::{Mode, Phase, Stats, SystemState};
use crate::util::MILLIS_PER_MIN;

/// Column-bottom temperature that ends heating (°C).
pub const HEATING_EXIT_C: f32 = 78.0;
/// Cube temperature above which cooling water must flow (°C).
pub const COOLING_WATER_ON_C: f32 = 45.0;
/// Cube temperature that ends body and tails (°C).
pub const CUBE_CEILING_C: f32 = 99.0;
pub const POST_HEADS_MS: u64 = 5 * MILLIS_PER_MIN;
pub const FINISH_MS: u64 = 5 * MILLIS_PER_MIN;
/// Tails takeoff as a fraction of the body speed.
pub const TAILS_SPEED_FACTOR: f32 = 0.6;
/// ABV assumed when the hydrometer is unavailable (%).
pub const DEFAULT_ABV: f32 = 40.0;
pub const MIN_HEADS_ML: f32 = 10.0;
/// Manual rectification heater power without a pressure reading.
pub const MANUAL_FALLBACK_PERCENT: u8 = 70;

/// Heater power used when the regulator cannot run (no valid pressure).
pub fn fallback_power(phase: Phase) -> u8 {
    match phase {
        Phase::Heating => 100,
        Phase::Stabilization => 70,
        Phase::Heads => 60,
        Phase::PostHeadsStabilization | Phase::Purge => 65,
        Phase::Body => 60,
        Phase::Tails => 50,
        Phase::Idle | Phase::Finish => 0,
    }
}

/// Phases whose heater power comes from the pressure regulator.
pub fn uses_regulator(phase: Phase) -> bool {
    matches!(phase, Phase::Stabilization | Phase::Heads | Phase::Body)
}

/// Next phase in the sequence for `mode`.
pub fn successor(mode: Mode, phase: Phase) -> Phase {
    match (mode, phase) {
        (Mode::Distillation, Phase::Heating) => Phase::Heads,
        (Mode::Distillation, Phase::Heads) => Phase::Body,
        (_, Phase::Heating) => Phase::Stabilization,
        (_, Phase::Stabilization) => Phase::Heads,
        (_, Phase::Heads) => Phase::PostHeadsStabilization,
        (_, Phase::PostHeadsStabilization) => Phase::Purge,
        (_, Phase::Purge) => Phase::Body,
        (_, Phase::Body) => Phase::Tails,
        (_, Phase::Tails) => Phase::Finish,
        (_, Phase::Finish | Phase::Idle) => Phase::Idle,
    }
}

/// Heads volume: absolute alcohol in the cube times the heads share, at least `MIN_HEADS_ML`.
pub fn heads_target_ml(cube_volume_l: f32, abv_percent: f32, heads_percent: f32) -> f32 {
    let ml = cube_volume_l * 1000.0 * (abv_percent / 100.0) * (heads_percent / 100.0);
    if ml.is_finite() { ml.max(MIN_HEADS_ML) } else { MIN_HEADS_ML }
}

/// Everything a phase handler may look at.
#[derive(Debug, Clone, Copy)]
pub struct PhaseInput<'a> {
    pub mode: Mode,
    pub phase: Phase,
    pub state: &'a SystemState,
    pub settings: &'a Settings,
    pub elapsed_ms: u64,
    pub collected_ml: f32,
    /// Regulator output, when the regulator ran this cycle.
    pub regulated: Option<u8>,
    /// Cut-point detector asked for tails.
    pub cut_signal: bool,
    pub takeoff_multiplier: f32,
}

impl PhaseInput<'_> {
    fn heater(&self) -> u8 {
        self.regulated.unwrap_or_else(|| fallback_power(self.phase))
    }

    fn body_speed(&self) -> f32 {
        self.settings.rectification.body_speed_ml_h_kw * self.settings.equipment.heater_kw()
    }

    fn cube_at_ceiling(&self) -> bool {
        self.state
            .temperatures
            .cube
            .get()
            .is_some_and(|t| t >= CUBE_CEILING_C)
    }

    fn advance_if(&self, cond: bool) -> Option<Phase> {
        cond.then(|| successor(self.mode, self.phase))
    }
}

#[derive(Debug, Clone, Default)]
pub struct PhaseStep {
    pub commands: CommandFrame,
    pub next: Option<Phase>,
}

/// Dispatch one phase handler.
pub fn run_phase(input: &PhaseInput<'_>) -> PhaseStep {
    let mut c = CommandFrame::new();
    let next = match input.phase {
        Phase::Heating => {
            c.set_heater(100);
            if input.state.temperatures.cube.above(COOLING_WATER_ON_C) {
                c.set_valve(Valve::CoolingWater, true);
            }
            input.advance_if(input.state.temperatures.column_bottom.above(HEATING_EXIT_C))
        }
        Phase::Stabilization => {
            c.set_valve(Valve::Heads, false);
            c.stop_pump();
            c.set_valve(Valve::CoolingWater, true);
            c.set_heater(input.heater());
            input.advance_if(input.elapsed_ms >= input.settings.rectification.stabilization_ms())
        }
        Phase::Heads => {
            let s = input.settings;
            c.start_pump(s.rectification.heads_speed_ml_h_kw * s.equipment.heater_kw());
            c.set_valve(Valve::Heads, true);
            c.set_valve(Valve::CoolingWater, true);
            c.set_heater(input.heater());
            input.advance_if(input.collected_ml >= input.state.heads_target_ml)
        }
        Phase::PostHeadsStabilization => {
            c.stop_pump();
            c.set_valve(Valve::Heads, false);
            c.set_valve(Valve::CoolingWater, true);
            c.set_heater(input.heater());
            input.advance_if(input.elapsed_ms >= POST_HEADS_MS)
        }
        Phase::Purge => {
            c.stop_pump();
            for v in [Valve::Heads, Valve::ContinuousTakeoff, Valve::StartStop] {
                c.set_valve(v, false);
            }
            c.set_valve(Valve::CoolingWater, true);
            c.set_heater(input.heater());
            input.advance_if(input.elapsed_ms >= input.settings.rectification.purge_ms())
        }
        Phase::Body => {
            c.set_valve(Valve::Heads, false);
            c.set_valve(Valve::CoolingWater, true);
            c.start_pump(input.body_speed() * input.takeoff_multiplier);
            c.set_heater(input.heater());
            input.advance_if(input.cut_signal || input.cube_at_ceiling())
        }
        Phase::Tails => {
            c.set_valve(Valve::CoolingWater, true);
            c.start_pump(input.body_speed() * TAILS_SPEED_FACTOR);
            c.set_heater(input.heater());
            input.advance_if(input.cube_at_ceiling())
        }
        Phase::Finish => {
            c.set_heater(0);
            c.stop_pump();
            c.set_valve(Valve::CoolingWater, true);
            input.advance_if(input.elapsed_ms >= FINISH_MS)
        }
        Phase::Idle => None,
    };
    PhaseStep { commands: c, next }
}

/// Actuator state held while paused.
pub fn pause_safe_frame(state: &SystemState) -> CommandFrame {
    let mut f = CommandFrame::new();
    f.set_heater(0);
    f.stop_pump();
    f.set_valve(Valve::Heads, false);
    f.set_valve(Valve::ContinuousTakeoff, false);
    if state.is_running() || state.temperatures.cube.above(COOLING_WATER_ON_C) {
        f.set_valve(Valve::CoolingWater, true);
    }
    f
}

fn all_off() -> CommandFrame {
    let mut f = CommandFrame::new();
    f.set_heater(0);
    f.stop_pump();
    f.close_all_valves();
    f
}

fn flood_pressure_for(settings: &Settings) -> f32 {
    settings.equipment.calibrated_flood_pressure.unwrap_or_else(|| {
        calculate_flood_pressure(
            settings.equipment.column_height_m(),
            settings.equipment.packing_coeff,
        )
    })
}

fn program_steps(program: &ProgramCfg, mode: Mode) -> &[TempStep] {
    match mode {
        Mode::Mashing => &program.mash,
        Mode::Hold => &program.hold,
        _ => &[],
    }
}

#[derive(Debug, Clone)]
pub struct ProcessFsm {
    regulator: PowerRegulator,
    detector: CutPointDetector,
    program: ProgramRunner,
    phase_entry_ms: u64,
    phase_entry_volume_ml: f32,
    paused_at_ms: Option<u64>,
    finished: bool,
}

impl ProcessFsm {
    pub fn new(settings: &Settings) -> Self {
        Self {
            regulator: PowerRegulator::new(settings.regulator.clone(), flood_pressure_for(settings)),
            detector: CutPointDetector::new(settings.decrement.clone()),
            program: ProgramRunner::default(),
            phase_entry_ms: 0,
            phase_entry_volume_ml: 0.0,
            paused_at_ms: None,
            finished: false,
        }
    }

    /// Rebuild the algorithms for new settings, keeping the power override.
    pub fn reconfigure(&mut self, settings: &Settings) {
        let override_percent = self.regulator.snapshot().override_percent;
        self.regulator = PowerRegulator::new(settings.regulator.clone(), flood_pressure_for(settings));
        if override_percent.is_some() {
            self.regulator.set_override(override_percent);
        }
        self.detector = CutPointDetector::new(settings.decrement.clone());
    }

    pub fn regulator(&self) -> &PowerRegulator {
        &self.regulator
    }

    pub fn regulator_mut(&mut self) -> &mut PowerRegulator {
        &mut self.regulator
    }

    pub fn detector(&self) -> &CutPointDetector {
        &self.detector
    }

    pub fn program(&self) -> ProgramSnapshot {
        self.program.snapshot()
    }

    pub fn phase_entry_ms(&self) -> u64 {
        self.phase_entry_ms
    }

    /// Milliseconds spent in the current phase.
    pub fn phase_elapsed_ms(&self, state: &SystemState) -> u64 {
        state.now_ms.saturating_sub(self.phase_entry_ms)
    }

    /// True once after a run completed on its own.
    pub fn take_finished(&mut self) -> bool {
        std::mem::take(&mut self.finished)
    }

    /// Publish the regulator thresholds into the shared state.
    pub fn refresh_pressure(&self, state: &mut SystemState) {
        let t = self.regulator.thresholds();
        state.pressure.flood_mmhg = t.flood_mmhg;
        state.pressure.work_mmhg = t.work_mmhg;
        state.pressure.warning_mmhg = t.warning_mmhg;
        state.pressure.critical_mmhg = t.critical_mmhg;
    }

    pub fn start_mode(
        &mut self,
        state: &mut SystemState,
        settings: &Settings,
        mode: Mode,
        notifier: &mut dyn Notifier,
    ) -> Result<CommandFrame, CommandError> {
        if state.is_running() {
            return Err(CommandError::AlreadyRunning);
        }
        if mode == Mode::Idle {
            return Err(CommandError::InvalidMode);
        }
        if !state.safety_ok {
            return Err(CommandError::SafetyLatched);
        }
        if !state.temperatures.cube.valid {
            return Err(CommandError::SensorUnavailable("cube temperature"));
        }
        if matches!(mode, Mode::Mashing | Mode::Hold) && program_steps(&settings.program, mode).is_empty() {
            return Err(CommandError::EmptyProgram);
        }

        let now = state.now_ms;
        state.mode = mode;
        state.paused = false;
        self.paused_at_ms = None;
        self.finished = false;
        state.phase = if mode.is_phased() { Phase::Heating } else { Phase::Idle };
        self.phase_entry_ms = now;
        self.phase_entry_volume_ml = 0.0;
        state.pump.total_volume_ml = 0.0;
        state.heads_target_ml = 0.0;
        state.stats = Stats {
            started_ms: Some(now),
            ..Stats::default()
        };
        self.regulator.reset_run();
        if let Some(p) = settings.equipment.calibrated_flood_pressure
            && let Err(e) = self.regulator.set_flood_pressure(p)
        {
            tracing::warn!(error = %e, "calibrated flood pressure ignored");
        }
        self.detector.reset();
        if matches!(mode, Mode::Mashing | Mode::Hold) {
            self.program.start(now);
        } else {
            self.program.stop();
        }

        tracing::info!(?mode, "process started");
        notifier.notify(&Notification::new(
            "Process started",
            format!("{mode:?} started"),
            Severity::Info,
        ));
        let mut f = CommandFrame::new();
        f.reset_pump_volume();
        Ok(f)
    }

    /// Everything off and back to idle. Always succeeds.
    pub fn stop_mode(&mut self, state: &mut SystemState, notifier: &mut dyn Notifier) -> CommandFrame {
        let was = state.mode;
        state.mode = Mode::Idle;
        state.phase = Phase::Idle;
        state.paused = false;
        self.paused_at_ms = None;
        self.program.stop();
        tracing::info!(mode = ?was, "process stopped");
        notifier.notify(&Notification::new(
            "Process stopped",
            format!("{was:?} stopped by operator"),
            Severity::Warning,
        ));
        all_off()
    }

    pub fn pause(
        &mut self,
        state: &mut SystemState,
        notifier: &mut dyn Notifier,
    ) -> Result<CommandFrame, CommandError> {
        if !state.is_running() {
            return Err(CommandError::NotRunning);
        }
        if state.paused {
            return Err(CommandError::AlreadyPaused);
        }
        state.paused = true;
        self.paused_at_ms = Some(state.now_ms);
        tracing::info!(phase = ?state.phase, "process paused");
        notifier.notify(&Notification::new(
            "Paused",
            format!("Paused during {}", state.phase.label()),
            Severity::Info,
        ));
        Ok(pause_safe_frame(state))
    }

    pub fn resume(&mut self, state: &mut SystemState, notifier: &mut dyn Notifier) -> Result<(), CommandError> {
        if !state.paused {
            return Err(CommandError::NotPaused);
        }
        let paused_ms = self
            .paused_at_ms
            .take()
            .map_or(0, |at| state.now_ms.saturating_sub(at));
        self.phase_entry_ms = self.phase_entry_ms.saturating_add(paused_ms);
        self.program.shift(paused_ms);
        self.detector.shift(paused_ms);
        self.regulator.shift(paused_ms);
        state.paused = false;
        tracing::info!(paused_ms, phase = ?state.phase, "process resumed");
        notifier.notify(&Notification::new(
            "Resumed",
            format!("Resumed after {} s", paused_ms / 1000),
            Severity::Info,
        ));
        Ok(())
    }

    /// One FSM cycle. Returns the commands the active mode wants.
    pub fn update(
        &mut self,
        state: &mut SystemState,
        settings: &Settings,
        notifier: &mut dyn Notifier,
    ) -> CommandFrame {
        let mut frame = match state.mode {
            Mode::Idle => CommandFrame::new(),
            Mode::Rectification | Mode::Distillation => self.update_phased(state, settings, notifier),
            Mode::ManualRectification => self.update_manual(state),
            Mode::Mashing | Mode::Hold => self.update_program(state, settings, notifier),
        };
        if settings.equipment.max_power_percent < 100 {
            frame.limit_heater(settings.equipment.max_power_percent);
        }
        frame
    }

    fn regulated(&mut self, state: &SystemState) -> Option<u8> {
        (state.pressure.valid || self.regulator.is_override_active())
            .then(|| self.regulator.update(state))
    }

    fn update_phased(
        &mut self,
        state: &mut SystemState,
        settings: &Settings,
        notifier: &mut dyn Notifier,
    ) -> CommandFrame {
        let phase = state.phase;
        let collected = (state.pump.total_volume_ml - self.phase_entry_volume_ml).max(0.0);
        match phase {
            Phase::Heads => state.stats.heads_ml = collected,
            Phase::Body => state.stats.body_ml = collected,
            Phase::Tails => state.stats.tails_ml = collected,
            _ => {}
        }

        let regulated = if uses_regulator(phase) { self.regulated(state) } else { None };

        let mut cut_signal = false;
        if phase == Phase::Body {
            if !self.detector.is_initialized()
                && let Some(top) = state.temperatures.column_top.get()
            {
                self.detector.init(top);
            }
            cut_signal = self.detector.update(state);
            state.stats.decrement_count = self.detector.decrement_count();
        }

        let input = PhaseInput {
            mode: state.mode,
            phase,
            state: &*state,
            settings,
            elapsed_ms: self.phase_elapsed_ms(state),
            collected_ml: collected,
            regulated,
            cut_signal,
            takeoff_multiplier: self.detector.multiplier(),
        };
        let PhaseStep { mut commands, next } = run_phase(&input);
        if let Some(next) = next {
            let entry = self.enter_phase(state, settings, next, notifier);
            commands.overlay(&entry);
        }
        commands
    }

    fn enter_phase(
        &mut self,
        state: &mut SystemState,
        settings: &Settings,
        next: Phase,
        notifier: &mut dyn Notifier,
    ) -> CommandFrame {
        let from = state.phase;
        let now = state.now_ms;
        state.phase = next;
        self.phase_entry_ms = now;
        self.phase_entry_volume_ml = state.pump.total_volume_ml;
        let mut f = CommandFrame::new();

        match next {
            Phase::Stabilization | Phase::Body => self.detector.reset(),
            Phase::Heads => {
                let abv = if state.hydrometer.valid {
                    state.hydrometer.abv
                } else {
                    DEFAULT_ABV
                };
                state.heads_target_ml = heads_target_ml(
                    settings.equipment.cube_volume_l,
                    abv,
                    settings.rectification.heads_percent,
                );
                tracing::info!(abv, target_ml = state.heads_target_ml, "heads target computed");
            }
            Phase::PostHeadsStabilization => {
                f.stop_pump();
                f.set_valve(Valve::Heads, false);
            }
            Phase::Finish => {
                f.set_heater(0);
                f.stop_pump();
            }
            _ => {}
        }

        if next == Phase::Idle {
            let mode = state.mode;
            state.mode = Mode::Idle;
            self.finished = true;
            let s = &state.stats;
            tracing::info!(
                ?mode,
                heads_ml = s.heads_ml,
                body_ml = s.body_ml,
                tails_ml = s.tails_ml,
                "process finished"
            );
            notifier.notify(&Notification::new(
                "Process finished",
                format!(
                    "Heads {:.0} mL, body {:.0} mL, tails {:.0} mL",
                    s.heads_ml, s.body_ml, s.tails_ml
                ),
                Severity::Success,
            ));
            return all_off();
        }

        tracing::info!(from = ?from, to = ?next, "phase transition");
        notifier.notify(&Notification::new(
            "Phase changed",
            format!("{} -> {}", from.label(), next.label()),
            Severity::Info,
        ));
        f
    }

    fn update_manual(&mut self, state: &SystemState) -> CommandFrame {
        let mut f = CommandFrame::new();
        f.set_heater(self.regulated(state).unwrap_or(MANUAL_FALLBACK_PERCENT));
        f.stop_pump();
        if state.temperatures.cube.above(COOLING_WATER_ON_C) {
            f.set_valve(Valve::CoolingWater, true);
        }
        f
    }

    fn update_program(
        &mut self,
        state: &mut SystemState,
        settings: &Settings,
        notifier: &mut dyn Notifier,
    ) -> CommandFrame {
        let steps = program_steps(&settings.program, state.mode);
        let out = self.program.update(
            steps,
            settings.program.band_c,
            state.temperatures.cube,
            state.now_ms,
        );
        if let Some(i) = out.advanced_to
            && let Some(step) = steps.get(i)
        {
            tracing::info!(step = i, target_c = step.target_c, "program step advanced");
            notifier.notify(&Notification::new(
                "Step complete",
                format!("Step {} of {}: target {:.1} °C", i + 1, steps.len(), step.target_c),
                Severity::Info,
            ));
        }
        if out.finished {
            let mode = state.mode;
            state.mode = Mode::Idle;
            self.finished = true;
            tracing::info!(?mode, "program finished");
            notifier.notify(&Notification::new(
                "Program finished",
                format!("{mode:?} program complete"),
                Severity::Success,
            ));
            return all_off();
        }
        let mut f = CommandFrame::new();
        f.set_heater(out.heater_percent);
        f
    }
}
