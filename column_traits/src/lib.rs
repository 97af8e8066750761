//! Hardware seams shared by the column controller crates.
//!
//! The engine never touches registers or timers directly; every actuator and
//! the notification sink sit behind the traits below. Implementations return
//! `Box<dyn Error + Send + Sync>` so drivers can surface their own error types.

pub mod clock;

pub use clock::{Clock, ManualClock, MonotonicClock};

/// Error type used at every trait boundary in this crate.
pub type HwResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Heater power stage (PWM or SSR driven).
pub trait Heater {
    /// Set output power in percent, `0..=100`.
    fn set_power(&mut self, percent: u8) -> HwResult<()>;

    /// Cut power immediately. Defaults to `set_power(0)`.
    fn emergency_stop(&mut self) -> HwResult<()> {
        self.set_power(0)
    }
}

/// Product takeoff pump with a cumulative volume counter.
pub trait Pump {
    /// Run at the given flow rate in mL/h.
    fn start(&mut self, ml_per_hour: f32) -> HwResult<()>;
    fn stop(&mut self) -> HwResult<()>;
    /// Zero the cumulative volume counter.
    fn reset_volume(&mut self) -> HwResult<()>;
    /// Cumulative volume pumped since the last reset, in mL.
    fn volume_ml(&self) -> f32;
}

/// Solenoid valves driven by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Valve {
    CoolingWater,
    Heads,
    ContinuousTakeoff,
    /// PWM start-stop valve used for reflux-ratio takeoff.
    StartStop,
}

impl Valve {
    pub const ALL: [Valve; 4] = [
        Valve::CoolingWater,
        Valve::Heads,
        Valve::ContinuousTakeoff,
        Valve::StartStop,
    ];
}

pub trait Valves {
    fn set_open(&mut self, valve: Valve, open: bool) -> HwResult<()>;
}

/// Severity attached to an operator notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Success => "success",
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }
}

/// Operator-facing event emitted on phase transitions, run start/stop and alarms.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub title: String,
    pub message: String,
    pub severity: Severity,
}

impl Notification {
    pub fn new(title: impl Into<String>, message: impl Into<String>, severity: Severity) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            severity,
        }
    }
}

/// Fire-and-forget notification sink (MQTT, chat bot, display...).
pub trait Notifier {
    fn notify(&mut self, notification: &Notification);
}

impl<T: Heater + ?Sized> Heater for Box<T> {
    fn set_power(&mut self, percent: u8) -> HwResult<()> {
        (**self).set_power(percent)
    }
    fn emergency_stop(&mut self) -> HwResult<()> {
        (**self).emergency_stop()
    }
}

impl<T: Pump + ?Sized> Pump for Box<T> {
    fn start(&mut self, ml_per_hour: f32) -> HwResult<()> {
        (**self).start(ml_per_hour)
    }
    fn stop(&mut self) -> HwResult<()> {
        (**self).stop()
    }
    fn reset_volume(&mut self) -> HwResult<()> {
        (**self).reset_volume()
    }
    fn volume_ml(&self) -> f32 {
        (**self).volume_ml()
    }
}

impl<T: Valves + ?Sized> Valves for Box<T> {
    fn set_open(&mut self, valve: Valve, open: bool) -> HwResult<()> {
        (**self).set_open(valve, open)
    }
}

impl<T: Notifier + ?Sized> Notifier for Box<T> {
    fn notify(&mut self, notification: &Notification) {
        (**self).notify(notification);
    }
}
