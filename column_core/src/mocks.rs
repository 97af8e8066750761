//! Test and helper mocks for column_core.
//!
//! Spy actuators record every command into a shared `ActuatorLog` so a test
//! can keep a handle after the actuators are moved into the engine.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use column_traits::{HwResult, Heater, Notification, Notifier, Pump, Valve, Valves};

/// Everything the spy actuators saw.
#[derive(Debug, Clone, Default)]
pub struct LogState {
    pub heater_percent: u8,
    pub heater_history: Vec<u8>,
    pub emergency_stops: u32,
    pub pump_rate: Option<f32>,
    pub pump_volume_ml: f32,
    pub pump_resets: u32,
    pub valves: [bool; 4],
    pub notifications: Vec<Notification>,
}

impl LogState {
    pub fn valve(&self, v: Valve) -> bool {
        self.valves[valve_index(v)]
    }
}

fn valve_index(v: Valve) -> usize {
    match v {
        Valve::CoolingWater => 0,
        Valve::Heads => 1,
        Valve::ContinuousTakeoff => 2,
        Valve::StartStop => 3,
    }
}

/// Shared handle over `LogState`.
#[derive(Debug, Clone, Default)]
pub struct ActuatorLog(Arc<Mutex<LogState>>);

impl ActuatorLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, LogState> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of the current log.
    pub fn snapshot(&self) -> LogState {
        self.lock().clone()
    }

    /// Simulate collected distillate.
    pub fn set_pump_volume(&self, ml: f32) {
        self.lock().pump_volume_ml = ml;
    }

    pub fn add_pump_volume(&self, ml: f32) {
        self.lock().pump_volume_ml += ml;
    }

    pub fn heater(&self) -> SpyHeater {
        SpyHeater(self.clone())
    }

    pub fn pump(&self) -> SpyPump {
        SpyPump(self.clone())
    }

    pub fn valves(&self) -> SpyValves {
        SpyValves(self.clone())
    }

    pub fn notifier(&self) -> RecordingNotifier {
        RecordingNotifier(self.clone())
    }
}

pub struct SpyHeater(ActuatorLog);

impl Heater for SpyHeater {
    fn set_power(&mut self, percent: u8) -> HwResult<()> {
        let mut s = self.0.lock();
        s.heater_percent = percent;
        s.heater_history.push(percent);
        Ok(())
    }

    fn emergency_stop(&mut self) -> HwResult<()> {
        let mut s = self.0.lock();
        s.emergency_stops += 1;
        s.heater_percent = 0;
        s.heater_history.push(0);
        Ok(())
    }
}

pub struct SpyPump(ActuatorLog);

impl Pump for SpyPump {
    fn start(&mut self, ml_per_hour: f32) -> HwResult<()> {
        self.0.lock().pump_rate = Some(ml_per_hour);
        Ok(())
    }

    fn stop(&mut self) -> HwResult<()> {
        self.0.lock().pump_rate = None;
        Ok(())
    }

    fn reset_volume(&mut self) -> HwResult<()> {
        let mut s = self.0.lock();
        s.pump_volume_ml = 0.0;
        s.pump_resets += 1;
        Ok(())
    }

    fn volume_ml(&self) -> f32 {
        self.0.lock().pump_volume_ml
    }
}

pub struct SpyValves(ActuatorLog);

impl Valves for SpyValves {
    fn set_open(&mut self, valve: Valve, open: bool) -> HwResult<()> {
        self.0.lock().valves[valve_index(valve)] = open;
        Ok(())
    }
}

/// Notifier that keeps every notification.
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier(ActuatorLog);

impl RecordingNotifier {
    pub fn count(&self) -> usize {
        self.0.lock().notifications.len()
    }

    pub fn titles(&self) -> Vec<String> {
        self.0
            .lock()
            .notifications
            .iter()
            .map(|n| n.title.clone())
            .collect()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&mut self, notification: &Notification) {
        self.0.lock().notifications.push(notification.clone());
    }
}

/// A heater whose every command fails with the given message.
pub struct FailingHeater(pub &'static str);

impl Heater for FailingHeater {
    fn set_power(&mut self, _percent: u8) -> HwResult<()> {
        Err(Box::new(std::io::Error::other(self.0)))
    }
}
