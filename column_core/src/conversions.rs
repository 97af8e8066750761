//! `From` implementations bridging `column_config` types to `column_core` types.

use crate::config::{
    DecrementCfg, EquipmentCfg, ProgramCfg, PumpCalibration, RectificationCfg, RegulatorCfg,
    SafetyCfg, Settings, TempStep,
};

// ── Equipment ────────────────────────────────────────────────────────────────

impl From<&column_config::Equipment> for EquipmentCfg {
    fn from(c: &column_config::Equipment) -> Self {
        Self {
            heater_power_w: c.heater_power_w,
            cube_volume_l: c.cube_volume_l,
            column_height_mm: c.column_height_mm,
            packing_coeff: c.packing_coeff,
            calibrated_flood_pressure: c.calibrated_flood_pressure,
            max_power_percent: c.max_power_percent,
        }
    }
}

// ── Rectification ────────────────────────────────────────────────────────────

impl From<&column_config::Rectification> for RectificationCfg {
    fn from(c: &column_config::Rectification) -> Self {
        Self {
            heads_percent: c.heads_percent,
            heads_speed_ml_h_kw: c.heads_speed_ml_h_kw,
            body_speed_ml_h_kw: c.body_speed_ml_h_kw,
            stabilization_min: c.stabilization_min,
            purge_min: c.purge_min,
        }
    }
}

// ── Safety ───────────────────────────────────────────────────────────────────

impl From<&column_config::Safety> for SafetyCfg {
    fn from(c: &column_config::Safety) -> Self {
        Self {
            tsa_max_c: c.tsa_max_c,
            water_out_max_c: c.water_out_max_c,
            sensor_timeout_ms: c.sensor_timeout_ms,
            voltage_min: c.voltage_min,
            voltage_max: c.voltage_max,
            flood_power_cut: c.flood_power_cut,
        }
    }
}

// ── Regulator ────────────────────────────────────────────────────────────────

impl From<&column_config::Regulator> for RegulatorCfg {
    fn from(c: &column_config::Regulator) -> Self {
        Self {
            work_mult: c.work_mult,
            warn_mult: c.warn_mult,
            crit_mult: c.crit_mult,
            floor_percent: c.floor_percent,
            flood_factor: c.flood_factor,
            repeat_flood_factor: c.repeat_flood_factor,
            repeat_flood_count: c.repeat_flood_count,
            flood_debounce_ms: c.flood_debounce_ms,
            recovery_ms: c.recovery_ms,
        }
    }
}

// ── Decrement ────────────────────────────────────────────────────────────────

impl From<&column_config::Decrement> for DecrementCfg {
    fn from(c: &column_config::Decrement) -> Self {
        Self {
            rise_c: c.rise_c,
            resume_c: c.resume_c,
            step: c.step,
            min_multiplier: c.min_multiplier,
            max_count: c.max_count,
            min_interval_ms: c.min_interval_ms,
        }
    }
}

// ── Program ──────────────────────────────────────────────────────────────────

impl From<&column_config::TempStep> for TempStep {
    fn from(c: &column_config::TempStep) -> Self {
        Self {
            target_c: c.target_c,
            duration_min: c.duration_min,
        }
    }
}

impl From<&column_config::Program> for ProgramCfg {
    fn from(c: &column_config::Program) -> Self {
        Self {
            band_c: c.band_c,
            mash: c.mash.iter().map(TempStep::from).collect(),
            hold: c.hold.iter().map(TempStep::from).collect(),
        }
    }
}

// ── Pump ─────────────────────────────────────────────────────────────────────

impl From<&column_config::PumpCfg> for PumpCalibration {
    fn from(c: &column_config::PumpCfg) -> Self {
        Self {
            ml_per_rev: c.ml_per_rev,
            steps_per_rev: c.steps_per_rev,
        }
    }
}

// ── Settings ─────────────────────────────────────────────────────────────────

impl From<&column_config::Config> for Settings {
    fn from(c: &column_config::Config) -> Self {
        Self {
            equipment: (&c.equipment).into(),
            rectification: (&c.rectification).into(),
            safety: (&c.safety).into(),
            regulator: (&c.regulator).into(),
            decrement: (&c.decrement).into(),
            program: (&c.program).into(),
            pump: (&c.pump).into(),
        }
    }
}
