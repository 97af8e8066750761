//! Sensor-trace replay: engine assembly on simulated actuators and the replay loop.
//!
//! Trace rows drive a `ManualClock`. Between rows the engine keeps cycling every
//! `engine.cycle_ms` with no new readings, so a gap longer than the sensor
//! timeout trips the same way a silent sensor bus would.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use column_config::TraceRow;
use column_core::state::{HydrometerSample, PowerSample, PressureSample, TemperatureSample};
use column_core::{AlarmKind, CycleStatus, Engine, Mode, Phase, SensorReadings, Settings};
use column_hardware::{PumpCalibration, SimHeater, SimValves, StepperPump};
use column_traits::ManualClock;
use eyre::WrapErr;
use serde::Serialize;

/// Replay ended on a latched safety trip.
#[derive(Debug, thiserror::Error)]
#[error("safety trip at t={t_ms} ms: {message}")]
pub struct Tripped {
    pub kind: AlarmKind,
    pub t_ms: u64,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct ReplayOptions {
    pub mode: Mode,
    pub power_override: Option<u8>,
    pub flood_pressure: Option<f32>,
    pub every_cycle: bool,
    pub json: bool,
}

#[derive(Serialize)]
struct CycleLine {
    t_ms: u64,
    status: CycleStatus,
    phase: Phase,
    heater_percent: u8,
    pump_ml_h: f32,
    volume_ml: f32,
    pressure_mmhg: Option<f32>,
    alarm: AlarmKind,
}

#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub status: CycleStatus,
    pub mode: Mode,
    pub phase: Phase,
    pub cycles: u64,
    pub t_ms: u64,
    pub heads_ml: f32,
    pub body_ml: f32,
    pub tails_ml: f32,
    pub total_ml: f32,
    pub decrement_count: u32,
    pub flood_count: u32,
    pub interrupted: bool,
}

/// Simulated actuators plus the shared manual clock.
pub struct SimRig {
    pub engine: Engine,
    pub clock: ManualClock,
    pub heater: SimHeater,
}

/// Assemble an engine over simulated actuators from a validated config.
pub fn build_sim_engine(cfg: &column_config::Config) -> eyre::Result<SimRig> {
    let settings = Settings::from(cfg);
    let clock = ManualClock::new();
    let heater = SimHeater::new();
    let pump = StepperPump::new(
        PumpCalibration {
            ml_per_rev: cfg.pump.ml_per_rev,
            steps_per_rev: cfg.pump.steps_per_rev,
        },
        Arc::new(clock.clone()),
    )
    .map_err(eyre::Report::new)
    .wrap_err("pump calibration")?;

    let engine = Engine::builder()
        .with_heater(heater.clone())
        .with_pump(pump)
        .with_valves(SimValves::new())
        .with_clock(Box::new(clock.clone()))
        .with_settings(settings)
        .build()?;
    Ok(SimRig {
        engine,
        clock,
        heater,
    })
}

fn readings(row: &TraceRow) -> SensorReadings {
    SensorReadings {
        temperatures: Some(TemperatureSample {
            cube: row.cube,
            column_bottom: row.column_bottom,
            column_top: row.column_top,
            tsa: row.tsa,
            water_in: row.water_in,
            water_out: row.water_out,
            reflux: row.reflux,
        }),
        pressure: Some(PressureSample {
            cube_mmhg: row.pressure,
            atmospheric_mmhg: None,
        }),
        hydrometer: row.abv.map(|abv| HydrometerSample {
            abv: Some(abv),
            density: None,
        }),
        power: row.voltage.map(|v| PowerSample {
            voltage: Some(v),
            current: None,
            power_w: None,
        }),
    }
}

struct Replayer {
    rig: SimRig,
    opts: ReplayOptions,
    cycles: u64,
    last_phase: Phase,
    last_status: CycleStatus,
}

enum Flow {
    Continue,
    Finished,
}

impl Replayer {
    fn cycle(&mut self, t_ms: u64, input: &SensorReadings) -> eyre::Result<Flow> {
        self.rig.clock.set_offset(Duration::from_millis(t_ms));
        let status = self
            .rig
            .engine
            .step(input)
            .wrap_err_with(|| format!("control cycle at t={t_ms} ms"))?;
        self.cycles += 1;
        self.last_status = status;
        self.report(t_ms, status)?;

        match status {
            CycleStatus::Tripped(kind) => {
                let message = self.rig.engine.state().current_alarm.message.clone();
                Err(eyre::Report::new(Tripped {
                    kind,
                    t_ms,
                    message,
                }))
            }
            CycleStatus::Finished => Ok(Flow::Finished),
            _ => Ok(Flow::Continue),
        }
    }

    fn report(&mut self, t_ms: u64, status: CycleStatus) -> eyre::Result<()> {
        let st = self.rig.engine.state();
        let changed = st.phase != self.last_phase;
        if self.opts.json {
            if changed || self.opts.every_cycle {
                let line = CycleLine {
                    t_ms,
                    status,
                    phase: st.phase,
                    heater_percent: self.rig.heater.power(),
                    pump_ml_h: st.pump.speed_ml_h,
                    volume_ml: st.pump.total_volume_ml,
                    pressure_mmhg: st.pressure.valid.then_some(st.pressure.cube_mmhg),
                    alarm: st.current_alarm.kind,
                };
                println!("{}", serde_json::to_string(&line)?);
            }
        } else if changed || self.opts.every_cycle {
            println!(
                "[{:>8.1} s] {:<24} heater {:>3} %  pump {:>6.0} mL/h  collected {:>7.0} mL",
                t_ms as f64 / 1000.0,
                st.phase.label(),
                self.rig.heater.power(),
                st.pump.speed_ml_h,
                st.pump.total_volume_ml,
            );
        }
        self.last_phase = st.phase;
        Ok(())
    }

    fn summary(&self, t_ms: u64, interrupted: bool) -> Summary {
        let st = self.rig.engine.state();
        Summary {
            status: self.last_status,
            mode: st.mode,
            phase: st.phase,
            cycles: self.cycles,
            t_ms,
            heads_ml: st.stats.heads_ml,
            body_ml: st.stats.body_ml,
            tails_ml: st.stats.tails_ml,
            total_ml: st.stats.total_volume(),
            decrement_count: st.stats.decrement_count,
            flood_count: self.rig.engine.regulator().flood_count(),
            interrupted,
        }
    }
}

/// Replay `rows` through a fresh simulated engine. Stops at the end of the
/// trace, when the run finishes, on a safety trip (as an error) or on Ctrl-C.
pub fn run_replay(
    cfg: &column_config::Config,
    rows: &[TraceRow],
    opts: ReplayOptions,
    shutdown: &AtomicBool,
) -> eyre::Result<Summary> {
    let Some(first) = rows.first() else {
        eyre::bail!("trace CSV has no rows");
    };
    let mut rig = build_sim_engine(cfg)?;
    rig.engine.set_power_override(opts.power_override)?;

    let cycle_ms = cfg.engine.cycle_ms.max(1);
    let mode = opts.mode;
    let flood_pressure = opts.flood_pressure;
    let mut r = Replayer {
        rig,
        opts,
        cycles: 0,
        last_phase: Phase::Idle,
        last_status: CycleStatus::Idle,
    };

    r.cycle(first.t_ms, &readings(first))?;
    r.rig
        .engine
        .start(mode)
        .wrap_err_with(|| format!("starting {mode:?} at t={} ms", first.t_ms))?;
    // After start, so a calibrated value from the config does not replace it.
    if let Some(p) = flood_pressure {
        r.rig.engine.set_flood_pressure(p)?;
    }
    tracing::info!(?mode, rows = rows.len(), cycle_ms, "replay started");

    let mut t_ms = first.t_ms;
    let mut interrupted = false;
    'rows: for row in &rows[1..] {
        let mut next = t_ms + cycle_ms;
        while next < row.t_ms {
            if shutdown.load(Ordering::Relaxed) {
                interrupted = true;
                break 'rows;
            }
            t_ms = next;
            if let Flow::Finished = r.cycle(t_ms, &SensorReadings::default())? {
                break 'rows;
            }
            next += cycle_ms;
        }
        if shutdown.load(Ordering::Relaxed) {
            interrupted = true;
            break;
        }
        t_ms = row.t_ms;
        if let Flow::Finished = r.cycle(t_ms, &readings(row))? {
            break;
        }
    }

    if interrupted {
        tracing::warn!(t_ms, "replay interrupted, stopping process");
        r.rig.engine.stop()?;
        r.last_status = r.rig.engine.status();
    }
    let summary = r.summary(t_ms, interrupted);
    tracing::info!(cycles = summary.cycles, status = ?summary.status, "replay done");
    Ok(summary)
}

pub fn print_summary(s: &Summary, json: bool) -> eyre::Result<()> {
    if json {
        println!("{}", serde_json::json!({ "summary": s }));
        return Ok(());
    }
    let outcome = match s.status {
        CycleStatus::Finished => "run finished".to_string(),
        _ if s.interrupted => "interrupted".to_string(),
        _ => format!("trace ended in {}", s.phase.label()),
    };
    println!(
        "Replay complete: {outcome} after {} cycles ({:.1} s)",
        s.cycles,
        s.t_ms as f64 / 1000.0
    );
    println!("  heads  {:>8.0} mL", s.heads_ml);
    println!("  body   {:>8.0} mL", s.body_ml);
    println!("  tails  {:>8.0} mL", s.tails_ml);
    println!("  total  {:>8.0} mL", s.total_ml);
    println!(
        "  takeoff decrements {}, floods {}",
        s.decrement_count, s.flood_count
    );
    Ok(())
}
