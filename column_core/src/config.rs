//! Configuration types for the process control engine.
//!
//! These are the runtime settings consumed once per control cycle.
//! They are separate from the TOML-deserialized config in `column_config`.

use serde::Serialize;

use crate::util::{kilowatts, minutes_to_ms};

/// Still hardware parameters.
#[derive(Debug, Clone, Serialize)]
pub struct EquipmentCfg {
    /// Rated heater power in watts.
    pub heater_power_w: u32,
    pub cube_volume_l: f32,
    pub column_height_mm: u32,
    /// Packing pressure drop, mmHg per metre of column.
    pub packing_coeff: f32,
    /// Calibrated flood pressure (mmHg) that replaces the height x packing estimate.
    pub calibrated_flood_pressure: Option<f32>,
    /// Upper bound for every regulated heater command.
    pub max_power_percent: u8,
}

impl EquipmentCfg {
    pub fn heater_kw(&self) -> f32 {
        kilowatts(self.heater_power_w)
    }

    pub fn column_height_m(&self) -> f32 {
        self.column_height_mm as f32 / 1000.0
    }
}

impl Default for EquipmentCfg {
    fn default() -> Self {
        Self {
            heater_power_w: 3000,
            cube_volume_l: 50.0,
            column_height_mm: 1500,
            packing_coeff: 15.0,
            calibrated_flood_pressure: None,
            max_power_percent: 100,
        }
    }
}

/// Cut parameters for rectification and distillation runs.
#[derive(Debug, Clone, Serialize)]
pub struct RectificationCfg {
    /// Heads volume as a percentage of the estimated absolute alcohol.
    pub heads_percent: f32,
    pub heads_speed_ml_h_kw: f32,
    pub body_speed_ml_h_kw: f32,
    pub stabilization_min: u32,
    pub purge_min: u32,
}

impl RectificationCfg {
    pub fn stabilization_ms(&self) -> u64 {
        minutes_to_ms(self.stabilization_min)
    }

    pub fn purge_ms(&self) -> u64 {
        minutes_to_ms(self.purge_min)
    }
}

impl Default for RectificationCfg {
    fn default() -> Self {
        Self {
            heads_percent: 8.0,
            heads_speed_ml_h_kw: 50.0,
            body_speed_ml_h_kw: 250.0,
            stabilization_min: 20,
            purge_min: 10,
        }
    }
}

/// Hazard limits evaluated by the safety monitor.
#[derive(Debug, Clone, Serialize)]
pub struct SafetyCfg {
    /// Vapor-exit temperature above which vapor is escaping the condenser.
    pub tsa_max_c: f32,
    pub water_out_max_c: f32,
    /// Maximum age of the last temperature update before a sensor failure trips.
    pub sensor_timeout_ms: u64,
    pub voltage_min: f32,
    pub voltage_max: f32,
    /// Fraction of heater power cut while the column floods.
    pub flood_power_cut: f32,
}

impl Default for SafetyCfg {
    fn default() -> Self {
        Self {
            tsa_max_c: 55.0,
            water_out_max_c: 70.0,
            sensor_timeout_ms: 5000,
            voltage_min: 190.0,
            voltage_max: 250.0,
            flood_power_cut: 0.15,
        }
    }
}

/// Pressure-based heater regulation ("Watt Control").
#[derive(Debug, Clone, Serialize)]
pub struct RegulatorCfg {
    pub work_mult: f32,
    pub warn_mult: f32,
    pub crit_mult: f32,
    /// Power returned at or above the critical threshold.
    pub floor_percent: u8,
    /// Power factor latched after a flood.
    pub flood_factor: f32,
    /// Deeper factor once more than `repeat_flood_count` floods happened in a run.
    pub repeat_flood_factor: f32,
    pub repeat_flood_count: u32,
    /// Floods closer together than this count once.
    pub flood_debounce_ms: u64,
    /// How long the flood factor stays latched.
    pub recovery_ms: u64,
}

impl Default for RegulatorCfg {
    fn default() -> Self {
        Self {
            work_mult: 0.75,
            warn_mult: 0.90,
            crit_mult: 1.05,
            floor_percent: 30,
            flood_factor: 0.85,
            repeat_flood_factor: 0.75,
            repeat_flood_count: 3,
            flood_debounce_ms: 5000,
            recovery_ms: 60_000,
        }
    }
}

/// Adaptive takeoff throttling during the body cut ("Smart Decrement").
#[derive(Debug, Clone, Serialize)]
pub struct DecrementCfg {
    /// Column-top rise above baseline that triggers a decrement (°C).
    pub rise_c: f32,
    /// Band above baseline inside which the throttle may ease off (°C).
    pub resume_c: f32,
    /// Multiplier change per decrement or resume.
    pub step: f32,
    pub min_multiplier: f32,
    /// Decrements after which the body fraction is considered exhausted.
    pub max_count: u32,
    /// Minimum time between two multiplier changes.
    pub min_interval_ms: u64,
}

impl Default for DecrementCfg {
    fn default() -> Self {
        Self {
            rise_c: 0.15,
            resume_c: 0.10,
            step: 0.1,
            min_multiplier: 0.5,
            max_count: 5,
            min_interval_ms: 60_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TempStep {
    pub target_c: f32,
    pub duration_min: u32,
}

/// Temperature programs for the mashing and hold modes.
#[derive(Debug, Clone, Serialize)]
pub struct ProgramCfg {
    pub band_c: f32,
    pub mash: Vec<TempStep>,
    pub hold: Vec<TempStep>,
}

impl Default for ProgramCfg {
    fn default() -> Self {
        Self {
            band_c: 1.0,
            mash: vec![
                TempStep {
                    target_c: 52.0,
                    duration_min: 15,
                },
                TempStep {
                    target_c: 63.0,
                    duration_min: 60,
                },
                TempStep {
                    target_c: 72.0,
                    duration_min: 20,
                },
            ],
            hold: vec![TempStep {
                target_c: 65.0,
                duration_min: 60,
            }],
        }
    }
}

/// Peristaltic pump calibration.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct PumpCalibration {
    pub ml_per_rev: f32,
    pub steps_per_rev: u32,
}

impl Default for PumpCalibration {
    fn default() -> Self {
        Self {
            ml_per_rev: 0.5,
            steps_per_rev: 200,
        }
    }
}

/// Immutable settings snapshot read by every component each cycle.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Settings {
    pub equipment: EquipmentCfg,
    pub rectification: RectificationCfg,
    pub safety: SafetyCfg,
    pub regulator: RegulatorCfg,
    pub decrement: DecrementCfg,
    pub program: ProgramCfg,
    pub pump: PumpCalibration,
}
