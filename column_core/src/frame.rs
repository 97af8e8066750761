//! Actuator commands resolved for one control cycle.
//!
//! Every contributor (command intake, safety monitor, FSM) writes into the same
//! frame in that order. Emergency stops lock a channel so later writers cannot
//! re-assert it; the flood mitigation only lowers a heater ceiling.

use column_traits::Valve;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum PumpCommand {
    /// Run at the given flow rate in mL/h.
    Start(f32),
    Stop,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CommandFrame {
    heater: Option<u8>,
    heater_ceiling: Option<u8>,
    pump: Option<PumpCommand>,
    valves: [Option<bool>; 4],
    reset_pump_volume: bool,
    heater_locked: bool,
    pump_locked: bool,
    valves_locked: bool,
}

fn valve_index(v: Valve) -> usize {
    match v {
        Valve::CoolingWater => 0,
        Valve::Heads => 1,
        Valve::ContinuousTakeoff => 2,
        Valve::StartStop => 3,
    }
}

impl CommandFrame {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_heater(&mut self, percent: u8) {
        if !self.heater_locked {
            self.heater = Some(percent.min(100));
        }
    }

    pub fn start_pump(&mut self, ml_per_hour: f32) {
        if !self.pump_locked {
            self.pump = Some(PumpCommand::Start(ml_per_hour.max(0.0)));
        }
    }

    pub fn stop_pump(&mut self) {
        if !self.pump_locked {
            self.pump = Some(PumpCommand::Stop);
        }
    }

    pub fn set_valve(&mut self, valve: Valve, open: bool) {
        if !self.valves_locked {
            self.valves[valve_index(valve)] = Some(open);
        }
    }

    pub fn close_all_valves(&mut self) {
        for v in Valve::ALL {
            self.set_valve(v, false);
        }
    }

    /// Request a reset of the pump's cumulative volume counter.
    pub fn reset_pump_volume(&mut self) {
        self.reset_pump_volume = true;
    }

    /// Heater, pump and valves off; every channel locked for the rest of the cycle.
    pub fn emergency_stop_all(&mut self) {
        self.emergency_stop_heater();
        self.pump = Some(PumpCommand::Stop);
        self.pump_locked = true;
        self.valves = [Some(false); 4];
        self.valves_locked = true;
    }

    /// Heater off and locked; pump and valves untouched.
    pub fn emergency_stop_heater(&mut self) {
        self.heater = Some(0);
        self.heater_locked = true;
    }

    /// Lower the heater ceiling; the applied heater is `min(command, ceiling)`.
    pub fn limit_heater(&mut self, ceiling: u8) {
        let c = ceiling.min(100);
        self.heater_ceiling = Some(self.heater_ceiling.map_or(c, |old| old.min(c)));
    }

    /// Copy every commanded channel of `other` onto `self`, honoring locks.
    pub fn overlay(&mut self, other: &CommandFrame) {
        if let Some(h) = other.heater {
            self.set_heater(h);
        }
        if let Some(c) = other.heater_ceiling {
            self.limit_heater(c);
        }
        match other.pump {
            Some(PumpCommand::Start(rate)) => self.start_pump(rate),
            Some(PumpCommand::Stop) => self.stop_pump(),
            None => {}
        }
        for v in Valve::ALL {
            if let Some(open) = other.valves[valve_index(v)] {
                self.set_valve(v, open);
            }
        }
        self.reset_pump_volume |= other.reset_pump_volume;
    }

    /// Heater command after the ceiling is applied.
    pub fn heater(&self) -> Option<u8> {
        self.heater
            .map(|h| self.heater_ceiling.map_or(h, |c| h.min(c)))
    }

    pub fn heater_ceiling(&self) -> Option<u8> {
        self.heater_ceiling
    }

    pub fn pump(&self) -> Option<PumpCommand> {
        self.pump
    }

    pub fn valve(&self, valve: Valve) -> Option<bool> {
        self.valves[valve_index(valve)]
    }

    pub fn wants_pump_volume_reset(&self) -> bool {
        self.reset_pump_volume
    }

    pub fn is_heater_locked(&self) -> bool {
        self.heater_locked
    }

    pub fn is_empty(&self) -> bool {
        self.heater.is_none()
            && self.pump.is_none()
            && self.valves.iter().all(Option::is_none)
            && !self.reset_pump_volume
    }
}
