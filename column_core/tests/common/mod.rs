#![allow(dead_code)]

use column_core::mocks::{ActuatorLog, LogState, RecordingNotifier};
use column_core::state::{PressureSample, TemperatureSample};
use column_core::{CycleStatus, Engine, SensorReadings, Settings};
use column_traits::ManualClock;

/// Engine over spy actuators and a manual clock.
pub struct Rig {
    pub engine: Engine,
    pub clock: ManualClock,
    pub log: ActuatorLog,
    pub notes: RecordingNotifier,
    pub readings: SensorReadings,
}

impl Rig {
    pub fn new(settings: Settings) -> Self {
        let log = ActuatorLog::new();
        let clock = ManualClock::new();
        let notes = log.notifier();
        let engine = Engine::builder()
            .with_heater(log.heater())
            .with_pump(log.pump())
            .with_valves(log.valves())
            .with_notifier(notes.clone())
            .with_clock(Box::new(clock.clone()))
            .with_settings(settings)
            .build()
            .expect("engine build");
        Self {
            engine,
            clock,
            log,
            notes,
            readings: cold_still(),
        }
    }

    /// Advance the clock, then run one cycle with the current readings.
    pub fn step_after(&mut self, ms: u64) -> CycleStatus {
        self.clock.advance_ms(ms);
        self.engine
            .step(&self.readings)
            .unwrap_or_else(|e| panic!("step failed: {e:?}"))
    }

    pub fn temps(&mut self) -> &mut TemperatureSample {
        self.readings.temperatures.get_or_insert_with(TemperatureSample::default)
    }

    pub fn set_pressure(&mut self, mmhg: f32) {
        self.readings.pressure = Some(PressureSample {
            cube_mmhg: Some(mmhg),
            atmospheric_mmhg: Some(760.0),
        });
    }

    pub fn hw(&self) -> LogState {
        self.log.snapshot()
    }
}

/// Every sensor valid at room temperature, pressure well below any threshold.
pub fn cold_still() -> SensorReadings {
    SensorReadings {
        temperatures: Some(TemperatureSample {
            cube: Some(20.0),
            column_bottom: Some(20.0),
            column_top: Some(20.0),
            tsa: Some(20.0),
            water_in: Some(15.0),
            water_out: Some(20.0),
            reflux: Some(20.0),
        }),
        pressure: Some(PressureSample {
            cube_mmhg: Some(5.0),
            atmospheric_mmhg: Some(760.0),
        }),
        hydrometer: None,
        power: None,
    }
}

pub const MIN: u64 = 60_000;
