mod common;

use column_core::state::HydrometerSample;
use column_core::{CycleStatus, Mode, Phase, Settings};
use column_traits::Valve;
use common::{MIN, Rig};
use rstest::rstest;

fn settings(stabilization_min: u32, cube_volume_l: f32) -> Settings {
    let mut s = Settings::default();
    s.rectification.stabilization_min = stabilization_min;
    s.equipment.cube_volume_l = cube_volume_l;
    s
}

/// Start a rectification run and push it into Stabilization.
fn heated_rig(s: Settings) -> Rig {
    let mut rig = Rig::new(s);
    rig.temps().cube = Some(50.0);
    rig.step_after(0);
    rig.engine.start(Mode::Rectification).expect("start");
    rig.temps().column_bottom = Some(79.0);
    rig.step_after(1_000);
    rig
}

#[rstest]
fn heating_exits_within_one_cycle_and_opens_cooling() {
    let rig = heated_rig(Settings::default());
    let st = rig.engine.state();
    assert_eq!(st.mode, Mode::Rectification);
    assert_eq!(st.phase, Phase::Stabilization);
    assert!(st.valves.cooling_water);
    assert!(rig.hw().valve(Valve::CoolingWater));
    assert_eq!(rig.hw().heater_percent, 100);
}

#[rstest]
fn stabilization_ends_after_exactly_the_configured_time() {
    let mut rig = heated_rig(settings(30, 20.0));
    rig.readings.hydrometer = Some(HydrometerSample {
        abv: Some(42.0),
        density: None,
    });

    rig.step_after(30 * MIN - 1);
    assert_eq!(rig.engine.state().phase, Phase::Stabilization);

    rig.step_after(1);
    let st = rig.engine.state();
    assert_eq!(st.phase, Phase::Heads);
    // 20 L x 42 % x 8 %
    assert!((st.heads_target_ml - 672.0).abs() < 0.01, "{}", st.heads_target_ml);
}

#[rstest]
fn heads_target_falls_back_to_default_abv() {
    let mut rig = heated_rig(settings(1, 20.0));
    rig.step_after(MIN);
    // 20 L x 40 % x 8 %
    assert!((rig.engine.state().heads_target_ml - 640.0).abs() < 0.01);
}

#[rstest]
fn full_run_collects_heads_body_and_tails() {
    let mut rig = heated_rig(settings(1, 20.0));
    rig.step_after(MIN);
    assert_eq!(rig.engine.state().phase, Phase::Heads);

    // Heads: 50 mL/h/kW x 3 kW
    rig.step_after(1_000);
    assert_eq!(rig.hw().pump_rate, Some(150.0));
    assert!(rig.hw().valve(Valve::Heads));

    rig.log.add_pump_volume(640.0);
    rig.step_after(1_000);
    assert_eq!(rig.engine.state().phase, Phase::PostHeadsStabilization);
    assert!(!rig.hw().valve(Valve::Heads));
    assert_eq!(rig.hw().pump_rate, None);

    rig.step_after(5 * MIN);
    assert_eq!(rig.engine.state().phase, Phase::Purge);
    rig.step_after(10 * MIN);
    assert_eq!(rig.engine.state().phase, Phase::Body);

    // Body at full speed; first cycle captures the head temperature baseline.
    rig.temps().column_top = Some(78.0);
    rig.step_after(1_000);
    assert_eq!(rig.hw().pump_rate, Some(750.0));
    assert!(rig.engine.detector().is_initialized());

    rig.log.add_pump_volume(3_000.0);
    rig.temps().column_top = Some(78.3);
    let mut cycles = 0;
    while rig.engine.state().phase == Phase::Body {
        rig.step_after(MIN);
        cycles += 1;
        assert!(cycles <= 5, "detector never cut to tails");
    }
    assert_eq!(cycles, 5);
    let st = rig.engine.state();
    assert_eq!(st.phase, Phase::Tails);
    assert_eq!(st.stats.decrement_count, 5);
    assert!((st.stats.body_ml - 3_000.0).abs() < 0.01);

    rig.log.add_pump_volume(500.0);
    rig.temps().cube = Some(99.5);
    rig.step_after(1_000);
    assert_eq!(rig.engine.state().phase, Phase::Finish);
    assert_eq!(rig.hw().heater_percent, 0);

    assert_eq!(rig.step_after(5 * MIN), CycleStatus::Finished);
    let st = rig.engine.state();
    assert_eq!(st.mode, Mode::Idle);
    assert!((st.stats.heads_ml - 640.0).abs() < 0.01);
    assert!((st.stats.tails_ml - 500.0).abs() < 0.01);
    assert!((st.stats.total_volume() - 4_140.0).abs() < 0.01);
    assert!(rig.notes.titles().iter().any(|t| t == "Process finished"));
    assert!(Valve::ALL.iter().all(|v| !rig.hw().valve(*v)));
}

/// Run through heads and purge into Body with the baseline captured at 78 °C.
fn body_rig() -> Rig {
    let mut rig = heated_rig(settings(1, 20.0));
    rig.step_after(MIN);
    rig.step_after(1_000);
    rig.log.add_pump_volume(640.0);
    rig.step_after(1_000);
    rig.step_after(5 * MIN);
    rig.step_after(10 * MIN);
    assert_eq!(rig.engine.state().phase, Phase::Body);
    rig.temps().column_top = Some(78.0);
    rig.step_after(1_000);
    assert!(rig.engine.detector().is_initialized());
    rig
}

/// Running time from the first decrement to Tails, optionally pausing for
/// `pause_ms` thirty seconds after that decrement.
fn body_to_tails_ms(pause_ms: Option<u64>) -> u64 {
    let mut rig = body_rig();
    rig.temps().column_top = Some(78.3);
    rig.step_after(1_000);
    assert_eq!(rig.engine.detector().decrement_count(), 1);
    let first = rig.engine.state().now_ms;

    let mut paused = 0;
    if let Some(len) = pause_ms {
        rig.step_after(30_000);
        rig.engine.pause().expect("pause");
        rig.step_after(len);
        assert_eq!(rig.engine.detector().decrement_count(), 1);
        rig.engine.resume().expect("resume");
        rig.step_after(1_000);
        assert_eq!(rig.engine.detector().decrement_count(), 1);
        paused = len;
    }

    let mut cycles = 0;
    while rig.engine.state().phase == Phase::Body {
        rig.step_after(1_000);
        cycles += 1;
        assert!(cycles <= 600, "detector never cut to tails");
    }
    rig.engine.state().now_ms - first - paused
}

#[rstest]
#[case(60_000)]
#[case(45 * MIN)]
fn pause_in_body_keeps_decrement_spacing(#[case] pause_ms: u64) {
    let unpaused = body_to_tails_ms(None);
    assert_eq!(unpaused, 4 * MIN);
    assert_eq!(body_to_tails_ms(Some(pause_ms)), unpaused);
}

#[rstest]
fn regulator_drives_heater_from_pressure() {
    let mut rig = heated_rig(Settings::default());
    // flood 22.5 mmHg: work 16.875, critical 23.625
    let t = rig.engine.regulator().thresholds();
    let mid = (t.work_mmhg + t.critical_mmhg) / 2.0;
    rig.set_pressure(mid);
    rig.step_after(1_000);
    assert_eq!(rig.hw().heater_percent, 65);
}

#[rstest]
fn heater_falls_back_without_pressure() {
    let mut rig = heated_rig(Settings::default());
    rig.readings.pressure = Some(Default::default());
    rig.step_after(1_000);
    assert!(!rig.engine.state().pressure.valid);
    assert_eq!(rig.hw().heater_percent, 70);
}

#[rstest]
fn power_override_pins_regulated_phases() {
    let mut rig = heated_rig(Settings::default());
    rig.engine.set_power_override(Some(42)).expect("override");
    rig.step_after(1_000);
    assert_eq!(rig.hw().heater_percent, 42);
    rig.engine.set_power_override(None).expect("clear");
    rig.step_after(1_000);
    assert_eq!(rig.hw().heater_percent, 100);
}

#[rstest]
fn max_power_caps_every_heater_command() {
    let mut s = Settings::default();
    s.equipment.max_power_percent = 80;
    let rig = heated_rig(s);
    assert_eq!(rig.hw().heater_percent, 80);
}
