//! Actuator drivers for the column controller.
//!
//! Only simulated devices ship today; they keep their state behind shared
//! handles so a bench harness can observe what the engine commanded.

pub mod error;
pub mod pump;

use std::sync::{Arc, Mutex, PoisonError};

use column_traits::{HwResult, Heater, Valve, Valves};

pub use pump::{PumpCalibration, StepperPump};

use crate::error::HwError;

/// Simulated SSR heater.
#[derive(Debug, Clone, Default)]
pub struct SimHeater {
    power: Arc<Mutex<u8>>,
}

impl SimHeater {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn power(&self) -> u8 {
        *self.power.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Heater for SimHeater {
    fn set_power(&mut self, percent: u8) -> HwResult<()> {
        if percent > 100 {
            return Err(Box::new(HwError::OutOfRange(format!("heater {percent} %"))));
        }
        *self.power.lock().unwrap_or_else(PoisonError::into_inner) = percent;
        tracing::trace!(percent, "heater (simulated)");
        Ok(())
    }
}

#[derive(Debug, Default)]
struct ValveBank {
    open: [bool; 4],
    disconnected: bool,
}

/// Simulated solenoid bank. Can be unplugged to exercise fault handling.
#[derive(Debug, Clone, Default)]
pub struct SimValves {
    bank: Arc<Mutex<ValveBank>>,
}

fn index(v: Valve) -> usize {
    match v {
        Valve::CoolingWater => 0,
        Valve::Heads => 1,
        Valve::ContinuousTakeoff => 2,
        Valve::StartStop => 3,
    }
}

impl SimValves {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_open(&self, valve: Valve) -> bool {
        self.bank.lock().unwrap_or_else(PoisonError::into_inner).open[index(valve)]
    }

    pub fn set_disconnected(&self, disconnected: bool) {
        self.bank
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .disconnected = disconnected;
    }
}

impl Valves for SimValves {
    fn set_open(&mut self, valve: Valve, open: bool) -> HwResult<()> {
        let mut bank = self.bank.lock().unwrap_or_else(PoisonError::into_inner);
        if bank.disconnected {
            return Err(Box::new(HwError::Disconnected(format!("{valve:?} valve"))));
        }
        let slot = &mut bank.open[index(valve)];
        if *slot != open {
            tracing::debug!(?valve, open, "valve (simulated)");
        }
        *slot = open;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simulated_heater_tracks_power() {
        let h = SimHeater::new();
        let mut driver = h.clone();
        driver.set_power(65).unwrap();
        assert_eq!(h.power(), 65);
        driver.emergency_stop().unwrap();
        assert_eq!(h.power(), 0);
        assert!(driver.set_power(101).is_err());
    }

    #[test]
    fn unplugged_valves_report_disconnect() {
        let v = SimValves::new();
        let mut driver = v.clone();
        driver.set_open(Valve::Heads, true).unwrap();
        assert!(v.is_open(Valve::Heads));
        v.set_disconnected(true);
        let err = driver.set_open(Valve::Heads, false).unwrap_err();
        assert!(err.downcast_ref::<HwError>().is_some());
        assert!(v.is_open(Valve::Heads));
    }
}
