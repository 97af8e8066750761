mod common;

use column_core::state::PowerSample;
use column_core::{
    AlarmKind, AlarmLevel, ColumnError, CommandError, CycleStatus, Mode, Phase, SafetyError, Settings,
};
use column_traits::Valve;
use common::{MIN, Rig};
use rstest::rstest;

/// Rectification run sitting in Stabilization with the regulator at 100 %.
fn running() -> Rig {
    let mut rig = Rig::new(Settings::default());
    rig.step_after(0);
    rig.engine.start(Mode::Rectification).expect("start");
    rig.temps().column_bottom = Some(79.0);
    rig.step_after(1_000);
    rig.step_after(1_000);
    assert_eq!(rig.engine.state().phase, Phase::Stabilization);
    assert_eq!(rig.hw().heater_percent, 100);
    rig
}

fn column_error(e: &eyre::Report) -> &ColumnError {
    e.downcast_ref::<ColumnError>()
        .unwrap_or_else(|| panic!("expected ColumnError, got {e:?}"))
}

#[rstest]
fn vapor_breakthrough_stops_everything_and_latches() {
    let mut rig = running();
    rig.temps().tsa = Some(60.0);
    let status = rig.step_after(1_000);
    assert_eq!(status, CycleStatus::Tripped(AlarmKind::VaporBreakthrough));

    let st = rig.engine.state();
    assert!(!st.safety_ok);
    assert_eq!(st.current_alarm.kind, AlarmKind::VaporBreakthrough);
    assert_eq!(st.current_alarm.level, AlarmLevel::Critical);
    let hw = rig.hw();
    assert_eq!(hw.heater_percent, 0);
    assert!(hw.emergency_stops >= 1);
    assert_eq!(hw.pump_rate, None);
    assert!(Valve::ALL.iter().all(|v| !hw.valve(*v)));

    // Still latched after the vapor clears.
    rig.temps().tsa = Some(30.0);
    rig.step_after(1_000);
    assert!(!rig.engine.state().safety_ok);
    assert_eq!(rig.hw().heater_percent, 0);
}

#[rstest]
fn alarm_reset_requires_ack_and_clear_hazard() {
    let mut rig = running();
    rig.temps().tsa = Some(60.0);
    rig.step_after(1_000);

    let err = rig.engine.reset_alarm().expect_err("unacknowledged");
    assert_eq!(
        column_error(&err),
        &ColumnError::Safety(SafetyError::NotAcknowledged)
    );

    rig.engine.acknowledge().expect("ack");
    let err = rig.engine.reset_alarm().expect_err("hazard still present");
    assert_eq!(
        column_error(&err),
        &ColumnError::Safety(SafetyError::HazardActive(AlarmKind::VaporBreakthrough))
    );

    rig.temps().tsa = Some(30.0);
    rig.step_after(1_000);
    rig.engine.reset_alarm().expect("reset");
    let st = rig.engine.state();
    assert!(st.safety_ok);
    assert_eq!(st.current_alarm.kind, AlarmKind::None);

    let err = rig.engine.reset_alarm().expect_err("nothing to reset");
    assert_eq!(column_error(&err), &ColumnError::Safety(SafetyError::NoAlarm));
}

#[rstest]
fn start_is_refused_while_latched() {
    let mut rig = Rig::new(Settings::default());
    rig.temps().tsa = Some(70.0);
    rig.step_after(0);
    let err = rig.engine.start(Mode::Distillation).expect_err("latched");
    assert_eq!(
        column_error(&err),
        &ColumnError::Command(CommandError::SafetyLatched)
    );
}

#[rstest]
fn flood_cuts_heater_and_regulator_tapers() {
    let mut rig = running();
    let crit = rig.engine.regulator().thresholds().critical_mmhg;
    rig.set_pressure(crit + 1.0);
    rig.step_after(1_000);
    let notes_after_first = rig.notes.count();
    rig.step_after(1_000);

    let st = rig.engine.state();
    assert_eq!(st.current_alarm.kind, AlarmKind::ColumnFlood);
    assert!(st.safety_ok, "flood does not latch");
    // Safety ceiling: 100 % x (1 - 0.15)
    assert!(rig.hw().heater_percent <= 85);
    // The regulator's own recommendation sits at its floor.
    assert_eq!(rig.engine.regulator().recommended_power(crit + 1.0), 30);
    assert_eq!(rig.engine.regulator().flood_count(), 1);
    assert_eq!(rig.notes.count(), notes_after_first, "one notification per rising edge");
}

#[rstest]
fn flood_ceiling_applies_to_pinned_power() {
    let mut rig = running();
    rig.engine.set_power_override(Some(100)).expect("override");
    let crit = rig.engine.regulator().thresholds().critical_mmhg;
    rig.set_pressure(crit + 1.0);
    rig.step_after(1_000);
    assert_eq!(rig.hw().heater_percent, 85);

    rig.set_pressure(5.0);
    rig.step_after(1_000);
    assert_eq!(rig.hw().heater_percent, 100);
}

#[rstest]
fn water_overheat_cuts_heater_only() {
    let mut rig = running();
    rig.temps().water_out = Some(75.0);
    rig.step_after(1_000);
    let st = rig.engine.state();
    assert_eq!(st.current_alarm.kind, AlarmKind::WaterOverheat);
    assert!(st.safety_ok);
    assert_eq!(rig.hw().heater_percent, 0);
    assert!(rig.hw().valve(Valve::CoolingWater));
}

#[rstest]
fn stale_temperatures_trip_sensor_failure() {
    let mut rig = running();
    rig.readings.temperatures = None;
    rig.step_after(5_000);
    assert!(rig.engine.state().safety_ok, "timeout is exclusive");
    let status = rig.step_after(1);
    assert_eq!(status, CycleStatus::Tripped(AlarmKind::SensorFailure));
    assert_eq!(rig.hw().heater_percent, 0);
}

#[rstest]
#[case(150.0, AlarmKind::LowVoltage)]
#[case(260.0, AlarmKind::HighVoltage)]
fn voltage_out_of_range_only_warns(#[case] volts: f32, #[case] kind: AlarmKind) {
    let mut rig = running();
    rig.readings.power = Some(PowerSample {
        voltage: Some(volts),
        current: None,
        power_w: None,
    });
    rig.step_after(1_000);
    let st = rig.engine.state();
    assert_eq!(st.current_alarm.kind, kind);
    assert_eq!(st.current_alarm.level, AlarmLevel::Warning);
    assert!(st.safety_ok);
    assert_eq!(rig.hw().heater_percent, 100);
}

#[rstest]
fn stop_after_trip_keeps_everything_off() {
    let mut rig = running();
    rig.temps().tsa = Some(60.0);
    rig.step_after(1_000);
    rig.engine.stop().expect("stop always succeeds");
    rig.step_after(MIN);
    let st = rig.engine.state();
    assert_eq!(st.mode, Mode::Idle);
    assert_eq!(rig.hw().heater_percent, 0);
}
