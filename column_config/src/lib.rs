#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schemas and sensor-trace parsing for the column controller.
//!
//! - `Config` and sub-structs are deserialized from TOML and validated.
//! - Every section is optional; omitted fields fall back to the firmware defaults.
//! - The trace CSV loader enforces headers and maps empty cells to "sensor invalid".
use std::io::Read;

use serde::Deserialize;

/// Sensor-trace CSV schema.
///
/// Expected headers:
/// t_ms,cube,column_bottom,column_top,tsa,water_in,water_out,reflux,pressure,abv,voltage
///
/// An empty cell means the sensor reported nothing valid at that instant.
///
/// Example:
/// t_ms,cube,column_bottom,column_top,tsa,water_in,water_out,reflux,pressure,abv,voltage
/// 0,20.5,20.1,20.0,21.0,15.0,16.0,,0.0,42.0,230
#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
pub struct TraceRow {
    pub t_ms: u64,
    pub cube: Option<f32>,
    pub column_bottom: Option<f32>,
    pub column_top: Option<f32>,
    pub tsa: Option<f32>,
    pub water_in: Option<f32>,
    pub water_out: Option<f32>,
    pub reflux: Option<f32>,
    pub pressure: Option<f32>,
    pub abv: Option<f32>,
    pub voltage: Option<f32>,
}

pub const TRACE_HEADERS: [&str; 11] = [
    "t_ms",
    "cube",
    "column_bottom",
    "column_top",
    "tsa",
    "water_in",
    "water_out",
    "reflux",
    "pressure",
    "abv",
    "voltage",
];

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Equipment {
    pub heater_power_w: u32,
    pub cube_volume_l: f32,
    pub column_height_mm: u32,
    /// Packing pressure drop in mmHg per metre of column.
    pub packing_coeff: f32,
    /// Empirically calibrated flood pressure (mmHg); overrides the height x packing estimate.
    pub calibrated_flood_pressure: Option<f32>,
    /// Ceiling applied to every regulated heater command.
    pub max_power_percent: u8,
}

impl Default for Equipment {
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

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Rectification {
    pub heads_percent: f32,
    pub heads_speed_ml_h_kw: f32,
    pub body_speed_ml_h_kw: f32,
    pub stabilization_min: u32,
    pub purge_min: u32,
}

impl Default for Rectification {
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

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Safety {
    pub tsa_max_c: f32,
    pub water_out_max_c: f32,
    pub sensor_timeout_ms: u64,
    pub voltage_min: f32,
    pub voltage_max: f32,
    /// Fraction of heater power cut on a column flood (0.15 = 15 %).
    pub flood_power_cut: f32,
}

impl Default for Safety {
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

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Regulator {
    pub work_mult: f32,
    pub warn_mult: f32,
    pub crit_mult: f32,
    pub floor_percent: u8,
    pub flood_factor: f32,
    pub repeat_flood_factor: f32,
    /// Floods beyond this count in one run switch to `repeat_flood_factor`.
    pub repeat_flood_count: u32,
    pub flood_debounce_ms: u64,
    pub recovery_ms: u64,
}

impl Default for Regulator {
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

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Decrement {
    pub rise_c: f32,
    pub resume_c: f32,
    pub step: f32,
    pub min_multiplier: f32,
    pub max_count: u32,
    pub min_interval_ms: u64,
}

impl Default for Decrement {
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

#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
pub struct TempStep {
    pub target_c: f32,
    pub duration_min: u32,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Program {
    /// Half-width of the temperature band around each step target (°C).
    pub band_c: f32,
    pub mash: Vec<TempStep>,
    pub hold: Vec<TempStep>,
}

impl Default for Program {
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

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PumpCfg {
    pub ml_per_rev: f32,
    pub steps_per_rev: u32,
}

impl Default for PumpCfg {
    fn default() -> Self {
        Self {
            ml_per_rev: 0.5,
            steps_per_rev: 200,
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EngineCfg {
    /// Control-cycle period in milliseconds.
    pub cycle_ms: u64,
}

impl Default for EngineCfg {
    fn default() -> Self {
        Self { cycle_ms: 1000 }
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct Config {
    pub equipment: Equipment,
    pub rectification: Rectification,
    pub safety: Safety,
    pub regulator: Regulator,
    pub decrement: Decrement,
    pub program: Program,
    pub pump: PumpCfg,
    pub logging: Logging,
    pub engine: EngineCfg,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

/// Load a sensor trace from a CSV file.
pub fn load_trace_csv(path: &std::path::Path) -> eyre::Result<Vec<TraceRow>> {
    let file = std::fs::File::open(path)
        .map_err(|e| eyre::eyre!("open trace CSV {:?}: {}", path, e))?;
    read_trace(file)
}

/// Parse a sensor trace from any reader. Rows must be in non-decreasing `t_ms` order.
pub fn read_trace<R: Read>(reader: R) -> eyre::Result<Vec<TraceRow>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = rdr
        .headers()
        .map_err(|e| eyre::eyre!("read CSV headers: {}", e))?
        .clone();
    let actual: Vec<&str> = headers.iter().collect();
    if actual != TRACE_HEADERS {
        eyre::bail!(
            "trace CSV must have headers '{}', got: {}",
            TRACE_HEADERS.join(","),
            actual.join(",")
        );
    }

    let mut rows: Vec<TraceRow> = Vec::new();
    for (idx, rec) in rdr.deserialize::<TraceRow>().enumerate() {
        let row = match rec {
            Ok(row) => row,
            Err(e) => eyre::bail!("invalid CSV row {}: {}", idx + 2, e),
        };
        if let Some(prev) = rows.last()
            && row.t_ms < prev.t_ms
        {
            eyre::bail!(
                "trace rows must be time-ordered: row {} has t_ms {} < {}",
                idx + 2,
                row.t_ms,
                prev.t_ms
            );
        }
        rows.push(row);
    }
    if rows.is_empty() {
        eyre::bail!("trace CSV has no rows");
    }
    Ok(rows)
}

fn check_steps(name: &str, steps: &[TempStep]) -> eyre::Result<()> {
    for (i, s) in steps.iter().enumerate() {
        if !(s.target_c > 0.0 && s.target_c < 100.0) {
            eyre::bail!("program.{name}[{i}].target_c must be in (0, 100)");
        }
        if s.duration_min == 0 {
            eyre::bail!("program.{name}[{i}].duration_min must be >= 1");
        }
    }
    Ok(())
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Equipment
        let eq = &self.equipment;
        if eq.heater_power_w == 0 {
            eyre::bail!("equipment.heater_power_w must be > 0");
        }
        if !(eq.cube_volume_l > 0.0 && eq.cube_volume_l.is_finite()) {
            eyre::bail!("equipment.cube_volume_l must be > 0");
        }
        if eq.column_height_mm == 0 {
            eyre::bail!("equipment.column_height_mm must be > 0");
        }
        if !(eq.packing_coeff > 0.0 && eq.packing_coeff.is_finite()) {
            eyre::bail!("equipment.packing_coeff must be > 0");
        }
        if let Some(p) = eq.calibrated_flood_pressure
            && !(p > 0.0 && p < 100.0)
        {
            eyre::bail!("equipment.calibrated_flood_pressure must be in (0, 100)");
        }
        if eq.max_power_percent == 0 || eq.max_power_percent > 100 {
            eyre::bail!("equipment.max_power_percent must be in [1, 100]");
        }

        // Rectification
        let r = &self.rectification;
        if !(r.heads_percent >= 0.0 && r.heads_percent <= 100.0) {
            eyre::bail!("rectification.heads_percent must be in [0, 100]");
        }
        if !(r.heads_speed_ml_h_kw > 0.0 && r.heads_speed_ml_h_kw.is_finite()) {
            eyre::bail!("rectification.heads_speed_ml_h_kw must be > 0");
        }
        if !(r.body_speed_ml_h_kw > 0.0 && r.body_speed_ml_h_kw.is_finite()) {
            eyre::bail!("rectification.body_speed_ml_h_kw must be > 0");
        }
        if r.stabilization_min > 24 * 60 {
            eyre::bail!("rectification.stabilization_min is unreasonably large (>24h)");
        }
        if r.purge_min > 24 * 60 {
            eyre::bail!("rectification.purge_min is unreasonably large (>24h)");
        }

        // Safety
        let s = &self.safety;
        if !(s.tsa_max_c > 0.0 && s.tsa_max_c < 100.0) {
            eyre::bail!("safety.tsa_max_c must be in (0, 100)");
        }
        if !(s.water_out_max_c > 0.0 && s.water_out_max_c < 100.0) {
            eyre::bail!("safety.water_out_max_c must be in (0, 100)");
        }
        if s.sensor_timeout_ms == 0 {
            eyre::bail!("safety.sensor_timeout_ms must be >= 1");
        }
        if s.voltage_min >= s.voltage_max {
            eyre::bail!("safety.voltage_min must be < safety.voltage_max");
        }
        if !(s.flood_power_cut > 0.0 && s.flood_power_cut < 1.0) {
            eyre::bail!("safety.flood_power_cut must be in (0.0, 1.0)");
        }

        // Regulator
        let g = &self.regulator;
        if !(g.work_mult > 0.0 && g.work_mult < g.warn_mult && g.warn_mult < g.crit_mult) {
            eyre::bail!("regulator multipliers must satisfy 0 < work_mult < warn_mult < crit_mult");
        }
        if g.floor_percent > 100 {
            eyre::bail!("regulator.floor_percent must be <= 100");
        }
        if !(g.flood_factor > 0.0 && g.flood_factor <= 1.0) {
            eyre::bail!("regulator.flood_factor must be in (0.0, 1.0]");
        }
        if !(g.repeat_flood_factor > 0.0 && g.repeat_flood_factor <= 1.0) {
            eyre::bail!("regulator.repeat_flood_factor must be in (0.0, 1.0]");
        }

        // Decrement
        let d = &self.decrement;
        if !(d.resume_c >= 0.0 && d.resume_c < d.rise_c) {
            eyre::bail!("decrement.resume_c must be >= 0 and < decrement.rise_c");
        }
        if !(d.step > 0.0 && d.step < 1.0) {
            eyre::bail!("decrement.step must be in (0.0, 1.0)");
        }
        if !(d.min_multiplier > 0.0 && d.min_multiplier <= 1.0) {
            eyre::bail!("decrement.min_multiplier must be in (0.0, 1.0]");
        }
        if d.max_count == 0 {
            eyre::bail!("decrement.max_count must be >= 1");
        }

        // Program
        if !(self.program.band_c > 0.0 && self.program.band_c.is_finite()) {
            eyre::bail!("program.band_c must be > 0");
        }
        check_steps("mash", &self.program.mash)?;
        check_steps("hold", &self.program.hold)?;

        // Pump
        if !(self.pump.ml_per_rev > 0.0 && self.pump.ml_per_rev.is_finite()) {
            eyre::bail!("pump.ml_per_rev must be > 0");
        }
        if self.pump.steps_per_rev == 0 {
            eyre::bail!("pump.steps_per_rev must be >= 1");
        }

        // Engine
        if self.engine.cycle_ms == 0 {
            eyre::bail!("engine.cycle_ms must be >= 1");
        }

        Ok(())
    }
}
