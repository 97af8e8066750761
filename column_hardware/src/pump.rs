//! Peristaltic takeoff pump driven by a stepper, with a volume integrator.
//!
//! The driver never counts real steps; volume is integrated from the commanded
//! flow rate over clock time, which is what the firmware does as well.

use std::sync::Arc;
use std::time::Instant;

use column_traits::{Clock, HwResult, Pump};

use crate::error::HwError;

/// Stepper pulses per second above which the driver misses steps.
pub const MAX_STEP_RATE_HZ: f32 = 4_000.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PumpCalibration {
    pub ml_per_rev: f32,
    pub steps_per_rev: u32,
}

pub struct StepperPump {
    cal: PumpCalibration,
    clock: Arc<dyn Clock + Send + Sync>,
    rate_ml_h: f32,
    running_since: Option<Instant>,
    /// Volume banked from finished run segments.
    banked_ml: f32,
}

impl StepperPump {
    pub fn new(cal: PumpCalibration, clock: Arc<dyn Clock + Send + Sync>) -> crate::error::Result<Self> {
        if !(cal.ml_per_rev > 0.0 && cal.ml_per_rev.is_finite()) || cal.steps_per_rev == 0 {
            return Err(HwError::OutOfRange(format!(
                "pump calibration {} mL/rev, {} steps/rev",
                cal.ml_per_rev, cal.steps_per_rev
            )));
        }
        Ok(Self {
            cal,
            clock,
            rate_ml_h: 0.0,
            running_since: None,
            banked_ml: 0.0,
        })
    }

    /// Step pulse rate for a flow rate in mL/h.
    pub fn step_rate_hz(&self, ml_per_hour: f32) -> f32 {
        ml_per_hour / 3600.0 / self.cal.ml_per_rev * self.cal.steps_per_rev as f32
    }

    pub fn rate_ml_h(&self) -> f32 {
        if self.running_since.is_some() {
            self.rate_ml_h
        } else {
            0.0
        }
    }

    fn segment_ml(&self) -> f32 {
        self.running_since.map_or(0.0, |since| {
            let ms = self.clock.ms_since(since) as f32;
            self.rate_ml_h * ms / 3_600_000.0
        })
    }

    fn bank(&mut self) {
        self.banked_ml += self.segment_ml();
        self.running_since = None;
    }
}

impl Pump for StepperPump {
    fn start(&mut self, ml_per_hour: f32) -> HwResult<()> {
        if !ml_per_hour.is_finite() || ml_per_hour < 0.0 {
            return Err(Box::new(HwError::OutOfRange(format!("{ml_per_hour} mL/h"))));
        }
        let hz = self.step_rate_hz(ml_per_hour);
        if hz > MAX_STEP_RATE_HZ {
            return Err(Box::new(HwError::Stalled(format!(
                "{ml_per_hour} mL/h needs {hz:.0} steps/s"
            ))));
        }
        self.bank();
        self.rate_ml_h = ml_per_hour;
        if ml_per_hour > 0.0 {
            self.running_since = Some(self.clock.now());
        }
        tracing::debug!(ml_per_hour, step_hz = hz, "pump started");
        Ok(())
    }

    fn stop(&mut self) -> HwResult<()> {
        if self.running_since.is_some() {
            tracing::debug!(volume_ml = self.banked_ml + self.segment_ml(), "pump stopped");
        }
        self.bank();
        self.rate_ml_h = 0.0;
        Ok(())
    }

    fn reset_volume(&mut self) -> HwResult<()> {
        self.banked_ml = 0.0;
        if self.running_since.is_some() {
            self.running_since = Some(self.clock.now());
        }
        Ok(())
    }

    fn volume_ml(&self) -> f32 {
        self.banked_ml + self.segment_ml()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use column_traits::ManualClock;

    fn pump(clock: &ManualClock) -> StepperPump {
        StepperPump::new(
            PumpCalibration {
                ml_per_rev: 0.5,
                steps_per_rev: 200,
            },
            Arc::new(clock.clone()),
        )
        .unwrap()
    }

    #[test]
    fn integrates_volume_over_time() {
        let clock = ManualClock::new();
        let mut p = pump(&clock);
        p.start(360.0).unwrap();
        clock.advance_ms(10 * 60_000);
        assert!((p.volume_ml() - 60.0).abs() < 1e-3);
        p.stop().unwrap();
        clock.advance_ms(60_000);
        assert!((p.volume_ml() - 60.0).abs() < 1e-3);
    }

    #[test]
    fn rate_change_banks_previous_segment() {
        let clock = ManualClock::new();
        let mut p = pump(&clock);
        p.start(360.0).unwrap();
        clock.advance_ms(60_000);
        p.start(720.0).unwrap();
        clock.advance_ms(60_000);
        assert!((p.volume_ml() - 18.0).abs() < 1e-3);
    }

    #[test]
    fn reset_zeroes_running_counter() {
        let clock = ManualClock::new();
        let mut p = pump(&clock);
        p.start(3600.0).unwrap();
        clock.advance_ms(60_000);
        p.reset_volume().unwrap();
        assert_eq!(p.volume_ml(), 0.0);
        clock.advance_ms(60_000);
        assert!((p.volume_ml() - 60.0).abs() < 1e-3);
    }

    #[test]
    fn rejects_rates_the_stepper_cannot_reach() {
        let clock = ManualClock::new();
        let mut p = pump(&clock);
        // 0.5 mL/rev, 200 steps/rev: 4000 steps/s is 36 L/h
        let err = p.start(40_000.0).unwrap_err();
        assert!(matches!(err.downcast_ref::<HwError>(), Some(HwError::Stalled(_))));
        p.start(36_000.0).unwrap();
        p.stop().unwrap();
        let err = p.start(-1.0).unwrap_err();
        assert!(matches!(err.downcast_ref::<HwError>(), Some(HwError::OutOfRange(_))));
        assert_eq!(p.rate_ml_h(), 0.0);
    }

    #[test]
    fn rejects_zero_calibration() {
        let clock = ManualClock::new();
        let res = StepperPump::new(
            PumpCalibration {
                ml_per_rev: 0.0,
                steps_per_rev: 200,
            },
            Arc::new(clock),
        );
        assert!(matches!(res, Err(HwError::OutOfRange(_))));
    }
}
