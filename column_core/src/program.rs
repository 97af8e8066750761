//! Temperature-step programs for the mashing and hold modes.

use serde::Serialize;

use crate::config::TempStep;
use crate::state::Reading;
use crate::util::{clamp_percent, minutes_to_ms};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ProgramSnapshot {
    pub active: bool,
    pub step_index: usize,
    pub step_entry_ms: u64,
    pub dwell_start_ms: Option<u64>,
}

/// Result of one program evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgramOutput {
    pub heater_percent: u8,
    /// Index of the step just entered, if the program advanced.
    pub advanced_to: Option<usize>,
    pub finished: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ProgramRunner {
    active: bool,
    step_index: usize,
    step_entry_ms: u64,
    dwell_start_ms: Option<u64>,
}

/// Heater percent for holding `target` within `band`: full below, off above,
/// linear in between.
pub fn band_power(cube_c: f32, target_c: f32, band_c: f32) -> u8 {
    let lo = target_c - band_c;
    let hi = target_c + band_c;
    if cube_c <= lo {
        100
    } else if cube_c >= hi {
        0
    } else {
        clamp_percent(100.0 * (hi - cube_c) / (hi - lo))
    }
}

impl ProgramRunner {
    pub fn start(&mut self, now_ms: u64) {
        self.active = true;
        self.step_index = 0;
        self.step_entry_ms = now_ms;
        self.dwell_start_ms = None;
    }

    pub fn stop(&mut self) {
        self.active = false;
        self.dwell_start_ms = None;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Move every timer forward by a pause duration.
    pub fn shift(&mut self, paused_ms: u64) {
        self.step_entry_ms = self.step_entry_ms.saturating_add(paused_ms);
        if let Some(d) = self.dwell_start_ms.as_mut() {
            *d = d.saturating_add(paused_ms);
        }
    }

    pub fn update(&mut self, steps: &[TempStep], band_c: f32, cube: Reading, now_ms: u64) -> ProgramOutput {
        let idle = ProgramOutput {
            heater_percent: 0,
            advanced_to: None,
            finished: false,
        };
        if !self.active {
            return idle;
        }
        let Some(step) = steps.get(self.step_index) else {
            self.active = false;
            return ProgramOutput {
                finished: true,
                ..idle
            };
        };
        // No valid cube reading: heater off, timers untouched.
        let Some(cube_c) = cube.get() else {
            return idle;
        };

        if self.dwell_start_ms.is_none() && (cube_c - step.target_c).abs() <= band_c {
            self.dwell_start_ms = Some(now_ms);
            tracing::info!(step = self.step_index, target_c = step.target_c, "program step in band");
        }

        if let Some(start) = self.dwell_start_ms
            && now_ms.saturating_sub(start) >= minutes_to_ms(step.duration_min)
        {
            self.step_index += 1;
            self.step_entry_ms = now_ms;
            self.dwell_start_ms = None;
            if self.step_index >= steps.len() {
                self.active = false;
                return ProgramOutput {
                    finished: true,
                    ..idle
                };
            }
            let next = &steps[self.step_index];
            return ProgramOutput {
                heater_percent: band_power(cube_c, next.target_c, band_c),
                advanced_to: Some(self.step_index),
                finished: false,
            };
        }

        ProgramOutput {
            heater_percent: band_power(cube_c, step.target_c, band_c),
            advanced_to: None,
            finished: false,
        }
    }

    pub fn snapshot(&self) -> ProgramSnapshot {
        ProgramSnapshot {
            active: self.active,
            step_index: self.step_index,
            step_entry_ms: self.step_entry_ms,
            dwell_start_ms: self.dwell_start_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STEPS: [TempStep; 2] = [
        TempStep {
            target_c: 52.0,
            duration_min: 1,
        },
        TempStep {
            target_c: 63.0,
            duration_min: 2,
        },
    ];

    #[test]
    fn band_power_shape() {
        assert_eq!(band_power(40.0, 52.0, 1.0), 100);
        assert_eq!(band_power(52.0, 52.0, 1.0), 50);
        assert_eq!(band_power(53.5, 52.0, 1.0), 0);
    }

    #[test]
    fn dwell_starts_in_band_and_advances() {
        let mut p = ProgramRunner::default();
        p.start(0);
        let out = p.update(&STEPS, 1.0, Reading::valid(30.0), 0);
        assert_eq!(out.heater_percent, 100);
        p.update(&STEPS, 1.0, Reading::valid(51.5), 10_000);
        assert_eq!(p.snapshot().dwell_start_ms, Some(10_000));
        let out = p.update(&STEPS, 1.0, Reading::valid(52.0), 70_000);
        assert_eq!(out.advanced_to, Some(1));
        assert_eq!(out.heater_percent, 100);
    }

    #[test]
    fn finishes_after_last_step() {
        let mut p = ProgramRunner::default();
        p.start(0);
        p.update(&STEPS[..1], 1.0, Reading::valid(52.0), 0);
        let out = p.update(&STEPS[..1], 1.0, Reading::valid(52.0), 60_000);
        assert!(out.finished);
        assert!(!p.is_active());
    }

    #[test]
    fn shift_moves_dwell_timer() {
        let mut p = ProgramRunner::default();
        p.start(0);
        p.update(&STEPS, 1.0, Reading::valid(52.0), 0);
        p.shift(30_000);
        let out = p.update(&STEPS, 1.0, Reading::valid(52.0), 60_000);
        assert_eq!(out.advanced_to, None);
        let out = p.update(&STEPS, 1.0, Reading::valid(52.0), 90_000);
        assert_eq!(out.advanced_to, Some(1));
    }

    #[test]
    fn invalid_cube_turns_heater_off() {
        let mut p = ProgramRunner::default();
        p.start(0);
        let out = p.update(&STEPS, 1.0, Reading::default(), 0);
        assert_eq!(out.heater_percent, 0);
        assert!(p.is_active());
    }
}
