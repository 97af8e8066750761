//! Adaptive body-cut throttling ("Smart Decrement").
//!
//! While the body fraction is collected the column-top temperature stays pinned
//! near its value at body entry. Drift above that baseline means the volatile
//! fraction is running out: the takeoff multiplier steps down, and once it has
//! stepped down `max_count` times the detector signals the move to tails.

use serde::Serialize;

use crate::config::DecrementCfg;
use crate::state::SystemState;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DetectorSnapshot {
    pub baseline_c: Option<f32>,
    pub multiplier: f32,
    pub decrement_count: u32,
    pub last_change_ms: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct CutPointDetector {
    cfg: DecrementCfg,
    baseline_c: Option<f32>,
    multiplier: f32,
    decrement_count: u32,
    last_change_ms: Option<u64>,
}

impl CutPointDetector {
    pub fn new(cfg: DecrementCfg) -> Self {
        Self {
            cfg,
            baseline_c: None,
            multiplier: 1.0,
            decrement_count: 0,
            last_change_ms: None,
        }
    }

    /// Record the body-entry column-top temperature and restore full speed.
    pub fn init(&mut self, base_temp_c: f32) {
        self.baseline_c = Some(base_temp_c);
        self.multiplier = 1.0;
        self.decrement_count = 0;
        self.last_change_ms = None;
        tracing::info!(baseline_c = base_temp_c, "cut-point detector armed");
    }

    pub fn is_initialized(&self) -> bool {
        self.baseline_c.is_some()
    }

    pub fn should_decrement(&self, current_c: f32, base_c: f32) -> bool {
        current_c - base_c > self.cfg.rise_c
    }

    pub fn can_resume(&self, current_c: f32, base_c: f32) -> bool {
        current_c - base_c < self.cfg.resume_c
    }

    fn change_allowed(&self, now_ms: u64) -> bool {
        self.last_change_ms
            .is_none_or(|t| now_ms.saturating_sub(t) >= self.cfg.min_interval_ms)
    }

    /// One evaluation. Returns true once the fraction is exhausted.
    /// Never true before `init`.
    pub fn update(&mut self, state: &SystemState) -> bool {
        let Some(base) = self.baseline_c else {
            return false;
        };
        if self.exhausted() {
            return true;
        }
        let Some(current) = state.temperatures.column_top.get() else {
            return false;
        };
        let now = state.now_ms;
        if !self.change_allowed(now) {
            return false;
        }
        if self.should_decrement(current, base) {
            self.multiplier = (self.multiplier - self.cfg.step).max(self.cfg.min_multiplier);
            self.decrement_count += 1;
            self.last_change_ms = Some(now);
            tracing::info!(
                column_top_c = current,
                baseline_c = base,
                multiplier = self.multiplier,
                count = self.decrement_count,
                "takeoff decremented"
            );
        } else if self.multiplier < 1.0 && self.can_resume(current, base) {
            self.multiplier = (self.multiplier + self.cfg.step).min(1.0);
            self.last_change_ms = Some(now);
            tracing::debug!(multiplier = self.multiplier, "takeoff eased back up");
        }
        self.exhausted()
    }

    fn exhausted(&self) -> bool {
        self.decrement_count >= self.cfg.max_count
    }

    pub fn multiplier(&self) -> f32 {
        self.multiplier
    }

    pub fn decrement_count(&self) -> u32 {
        self.decrement_count
    }

    /// Move the last change forward by a pause, so the interval only counts running time.
    pub fn shift(&mut self, paused_ms: u64) {
        if let Some(t) = self.last_change_ms.as_mut() {
            *t = t.saturating_add(paused_ms);
        }
    }

    pub fn snapshot(&self) -> DetectorSnapshot {
        DetectorSnapshot {
            baseline_c: self.baseline_c,
            multiplier: self.multiplier,
            decrement_count: self.decrement_count,
            last_change_ms: self.last_change_ms,
        }
    }

    /// Back to the uninitialized state at full speed.
    pub fn reset(&mut self) {
        self.baseline_c = None;
        self.multiplier = 1.0;
        self.decrement_count = 0;
        self.last_change_ms = None;
    }
}
