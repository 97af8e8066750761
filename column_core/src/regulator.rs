//! Pressure-based heater power regulation ("Watt Control").
//!
//! Cube pressure rises with vapor traffic in the column. The regulator keeps
//! power at 100 % below the work threshold, tapers linearly to a floor at the
//! critical (flood) threshold, and latches a reduced power factor for a
//! recovery window after each flood.

use serde::Serialize;

use crate::config::RegulatorCfg;
use crate::error::{ColumnError, Result};
use crate::state::SystemState;
use crate::util::clamp_percent;

/// Flood-pressure estimate from column geometry: height (m) x packing drop (mmHg/m).
pub fn calculate_flood_pressure(column_height_m: f32, packing_coeff: f32) -> f32 {
    (column_height_m * packing_coeff).max(0.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PressureThresholds {
    pub flood_mmhg: f32,
    pub work_mmhg: f32,
    pub warning_mmhg: f32,
    pub critical_mmhg: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum PressureStatus {
    Normal,
    Warning,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RegulatorSnapshot {
    pub thresholds: PressureThresholds,
    pub override_percent: Option<u8>,
    pub flood_count: u32,
    pub recovery_until_ms: Option<u64>,
    pub last_output: u8,
}

#[derive(Debug, Clone)]
pub struct PowerRegulator {
    cfg: RegulatorCfg,
    thresholds: PressureThresholds,
    override_percent: Option<u8>,
    last_flood_ms: Option<u64>,
    flood_count: u32,
    recovery_until_ms: Option<u64>,
    last_output: u8,
}

impl PowerRegulator {
    pub fn new(cfg: RegulatorCfg, flood_mmhg: f32) -> Self {
        let thresholds = derive_thresholds(&cfg, flood_mmhg);
        Self {
            cfg,
            thresholds,
            override_percent: None,
            last_flood_ms: None,
            flood_count: 0,
            recovery_until_ms: None,
            last_output: 100,
        }
    }

    /// Replace the flood pressure with a calibrated value (0 < p < 100 mmHg).
    pub fn set_flood_pressure(&mut self, flood_mmhg: f32) -> Result<()> {
        if !(flood_mmhg > 0.0 && flood_mmhg < 100.0) {
            return Err(eyre::Report::new(ColumnError::Config(format!(
                "flood pressure {flood_mmhg} mmHg outside (0, 100)"
            ))));
        }
        self.thresholds = derive_thresholds(&self.cfg, flood_mmhg);
        tracing::info!(
            flood_mmhg,
            work_mmhg = self.thresholds.work_mmhg,
            warning_mmhg = self.thresholds.warning_mmhg,
            critical_mmhg = self.thresholds.critical_mmhg,
            "flood pressure set"
        );
        Ok(())
    }

    pub fn thresholds(&self) -> PressureThresholds {
        self.thresholds
    }

    pub fn pressure_status(&self, pressure_mmhg: f32) -> PressureStatus {
        let t = &self.thresholds;
        if pressure_mmhg >= t.critical_mmhg {
            PressureStatus::Critical
        } else if pressure_mmhg >= t.warning_mmhg {
            PressureStatus::Warning
        } else {
            PressureStatus::Normal
        }
    }

    /// Power curve: 100 up to the work threshold, linear down to the floor at critical.
    /// Monotonically non-increasing in pressure.
    pub fn recommended_power(&self, pressure_mmhg: f32) -> u8 {
        let t = &self.thresholds;
        let floor = self.cfg.floor_percent.min(100);
        if pressure_mmhg.is_nan() {
            return floor;
        }
        if pressure_mmhg <= t.work_mmhg {
            return 100;
        }
        if pressure_mmhg >= t.critical_mmhg {
            return floor;
        }
        let span = t.critical_mmhg - t.work_mmhg;
        if span <= 0.0 {
            return floor;
        }
        let frac = (pressure_mmhg - t.work_mmhg) / span;
        let floor_f = f32::from(floor);
        clamp_percent(100.0 - (100.0 - floor_f) * frac).max(floor)
    }

    /// `Some(p)` pins the output to `p` (clamped to 100); `None` returns to the curve.
    pub fn set_override(&mut self, percent: Option<u8>) {
        self.override_percent = percent.map(|p| p.min(100));
        match self.override_percent {
            Some(p) => tracing::info!(percent = p, "power override set"),
            None => tracing::info!("power override cleared"),
        }
    }

    pub fn is_override_active(&self) -> bool {
        self.override_percent.is_some()
    }

    /// Register a flood at `now_ms`. Returns false when debounced.
    pub fn handle_flood(&mut self, now_ms: u64) -> bool {
        if let Some(last) = self.last_flood_ms
            && now_ms.saturating_sub(last) < self.cfg.flood_debounce_ms
        {
            return false;
        }
        self.last_flood_ms = Some(now_ms);
        self.flood_count = self.flood_count.saturating_add(1);
        self.recovery_until_ms = Some(now_ms.saturating_add(self.cfg.recovery_ms));
        tracing::error!(
            flood_count = self.flood_count,
            factor = self.flood_factor(),
            recovery_ms = self.cfg.recovery_ms,
            "column flood: power reduction latched"
        );
        true
    }

    fn flood_factor(&self) -> f32 {
        if self.flood_count > self.cfg.repeat_flood_count {
            self.cfg.repeat_flood_factor
        } else {
            self.cfg.flood_factor
        }
    }

    pub fn in_recovery(&self, now_ms: u64) -> bool {
        self.recovery_until_ms.is_some_and(|until| now_ms < until)
    }

    /// Per-cycle recommendation in `0..=100`.
    pub fn update(&mut self, state: &SystemState) -> u8 {
        if let Some(p) = self.override_percent {
            self.last_output = p;
            return p;
        }
        let now = state.now_ms;
        let pressure = state.pressure.cube_mmhg;
        let mut power = self.recommended_power(pressure);
        if self.pressure_status(pressure) == PressureStatus::Critical {
            self.handle_flood(now);
        }
        if self.in_recovery(now) {
            let reduced = clamp_percent(f32::from(power) * self.flood_factor());
            power = reduced.max(self.cfg.floor_percent.min(power));
        } else if self.recovery_until_ms.take().is_some() {
            tracing::info!("flood recovery window elapsed, power restored");
        }
        tracing::trace!(pressure_mmhg = pressure, power, "regulator");
        self.last_output = power;
        power
    }

    /// Clear per-run flood bookkeeping. The override and thresholds survive.
    pub fn reset_run(&mut self) {
        self.last_flood_ms = None;
        self.flood_count = 0;
        self.recovery_until_ms = None;
        self.last_output = 100;
    }

    /// Move the flood debounce and recovery window forward by a pause.
    pub fn shift(&mut self, paused_ms: u64) {
        for t in [&mut self.last_flood_ms, &mut self.recovery_until_ms]
            .into_iter()
            .flatten()
        {
            *t = t.saturating_add(paused_ms);
        }
    }

    pub fn flood_count(&self) -> u32 {
        self.flood_count
    }

    pub fn snapshot(&self) -> RegulatorSnapshot {
        RegulatorSnapshot {
            thresholds: self.thresholds,
            override_percent: self.override_percent,
            flood_count: self.flood_count,
            recovery_until_ms: self.recovery_until_ms,
            last_output: self.last_output,
        }
    }
}

fn derive_thresholds(cfg: &RegulatorCfg, flood_mmhg: f32) -> PressureThresholds {
    PressureThresholds {
        flood_mmhg,
        work_mmhg: flood_mmhg * cfg.work_mult,
        warning_mmhg: flood_mmhg * cfg.warn_mult,
        critical_mmhg: flood_mmhg * cfg.crit_mult,
    }
}
