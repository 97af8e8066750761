mod common;

use column_core::mocks::{ActuatorLog, FailingHeater};
use column_core::{ColumnError, Engine, Mode, Settings};
use column_traits::{HwResult, Heater};
use common::cold_still;
use rstest::rstest;

/// Heater driver that reports a typed disconnect.
#[cfg(feature = "hardware-errors")]
struct UnpluggedHeater;
#[cfg(feature = "hardware-errors")]
impl Heater for UnpluggedHeater {
    fn set_power(&mut self, _percent: u8) -> HwResult<()> {
        Err(Box::new(column_hardware::error::HwError::Disconnected(
            "ssr".into(),
        )))
    }
}

fn engine_with(heater: impl Heater + Send + 'static, log: &ActuatorLog) -> Engine {
    Engine::builder()
        .with_heater(heater)
        .with_pump(log.pump())
        .with_valves(log.valves())
        .with_settings(Settings::default())
        .build()
        .expect("build")
}

#[rstest]
fn heater_failure_surfaces_as_hardware_error() {
    let log = ActuatorLog::new();
    let mut engine = engine_with(FailingHeater("triac bus busy"), &log);
    engine.step(&cold_still()).expect("idle cycle commands nothing");
    engine.start(Mode::Rectification).expect("start");

    let err = engine.step(&cold_still()).expect_err("heater write fails");
    match err.downcast_ref::<ColumnError>() {
        Some(ColumnError::Hardware(msg)) => assert!(msg.contains("triac")),
        other => panic!("expected Hardware, got {other:?}"),
    }
}

#[rstest]
fn other_channels_are_still_applied_after_a_failure() {
    let log = ActuatorLog::new();
    let mut engine = engine_with(FailingHeater("heater offline"), &log);
    let mut hot = cold_still();
    if let Some(t) = hot.temperatures.as_mut() {
        t.cube = Some(60.0);
    }
    engine.step(&hot).expect("idle");
    engine.start(Mode::Rectification).expect("start");
    let _ = engine.step(&hot).expect_err("heater fails");
    assert!(log.snapshot().valve(column_traits::Valve::CoolingWater));
}

#[cfg(feature = "hardware-errors")]
#[rstest]
fn typed_disconnect_maps_to_hardware_fault() {
    let log = ActuatorLog::new();
    let mut engine = engine_with(UnpluggedHeater, &log);
    engine.step(&cold_still()).expect("idle");
    engine.start(Mode::Distillation).expect("start");
    let err = engine.step(&cold_still()).expect_err("disconnected");
    assert!(matches!(
        err.downcast_ref::<ColumnError>(),
        Some(ColumnError::HardwareFault(_))
    ));
}
