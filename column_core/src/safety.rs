//! Hazard supervision, evaluated every cycle before the FSM.
//!
//! Check order is fixed: mains voltage (warning only), vapor breakthrough,
//! cooling-water overheat, column flood, temperature staleness. When several
//! hazards appear in the same pass the last one found owns the alarm record.
//! Vapor breakthrough and staleness are full emergency stops and latch until
//! the operator acknowledges and resets with the hazard cleared.

use column_traits::{Notification, Notifier, Severity};

use crate::config::SafetyCfg;
use crate::error::SafetyError;
use crate::frame::CommandFrame;
use crate::state::{Alarm, AlarmKind, AlarmLevel, Mode, SystemState};
use crate::util::clamp_percent;

/// Hazards present in one evaluation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Hazards {
    pub voltage: Option<AlarmKind>,
    pub vapor: bool,
    pub water: bool,
    pub flood: bool,
    pub stale: bool,
}

impl Hazards {
    pub fn full_stop(&self) -> bool {
        self.vapor || self.stale
    }

    /// First critical hazard in check order.
    pub fn first_critical(&self) -> Option<AlarmKind> {
        [
            (self.vapor, AlarmKind::VaporBreakthrough),
            (self.water, AlarmKind::WaterOverheat),
            (self.flood, AlarmKind::ColumnFlood),
            (self.stale, AlarmKind::SensorFailure),
        ]
        .into_iter()
        .find_map(|(hit, kind)| hit.then_some(kind))
    }
}

/// Evaluate the hazard conditions against the current state.
pub fn evaluate(state: &SystemState, cfg: &SafetyCfg) -> Hazards {
    let t = &state.temperatures;
    let voltage = if state.power.valid && state.power.voltage < cfg.voltage_min {
        Some(AlarmKind::LowVoltage)
    } else if state.power.valid && state.power.voltage > cfg.voltage_max {
        Some(AlarmKind::HighVoltage)
    } else {
        None
    };
    let p = &state.pressure;
    let flood = p.valid && p.critical_mmhg > 0.0 && p.cube_mmhg > p.critical_mmhg;
    let stale = match t.last_update_ms {
        Some(at) => state.now_ms.saturating_sub(at) > cfg.sensor_timeout_ms,
        None => state.mode != Mode::Idle && state.now_ms > cfg.sensor_timeout_ms,
    };
    Hazards {
        voltage,
        vapor: t.tsa.above(cfg.tsa_max_c),
        water: t.water_out.above(cfg.water_out_max_c),
        flood,
        stale,
    }
}

#[derive(Debug, Default)]
pub struct SafetyMonitor {
    previous: Hazards,
    latched: bool,
    flood_base_percent: Option<u8>,
}

impl SafetyMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run all checks, force actuator commands into `frame`, update the alarm record.
    pub fn check(
        &mut self,
        state: &mut SystemState,
        cfg: &SafetyCfg,
        frame: &mut CommandFrame,
        notifier: &mut dyn Notifier,
    ) {
        let now = state.now_ms;
        let h = evaluate(state, cfg);
        let prev = self.previous;

        if let Some(kind) = h.voltage
            && prev.voltage != Some(kind)
        {
            let v = state.power.voltage;
            tracing::warn!(voltage = v, ?kind, "mains voltage out of range");
            let msg = format!("Mains voltage {v:.0} V outside {:.0}-{:.0} V", cfg.voltage_min, cfg.voltage_max);
            // A warning never displaces an unresolved critical record.
            if state.current_alarm.level < AlarmLevel::Critical {
                raise(state, kind, AlarmLevel::Warning, &msg, now);
            }
            notifier.notify(&Notification::new("Warning", msg, Severity::Warning));
        }

        if h.vapor {
            frame.emergency_stop_all();
            if !prev.vapor {
                let t = state.temperatures.tsa.value;
                tracing::error!(tsa_c = t, "vapor breakthrough");
                let msg = format!("Vapor breakthrough! TSA temperature {t:.1} °C");
                raise(state, AlarmKind::VaporBreakthrough, AlarmLevel::Critical, &msg, now);
                notifier.notify(&Notification::new("Critical error", msg, Severity::Error));
            }
        }

        if h.water {
            frame.emergency_stop_heater();
            if !prev.water {
                let t = state.temperatures.water_out.value;
                tracing::error!(water_out_c = t, "cooling water overheat");
                let msg = format!("Cooling water overheat! Outlet temperature {t:.1} °C");
                raise(state, AlarmKind::WaterOverheat, AlarmLevel::Critical, &msg, now);
                notifier.notify(&Notification::new("Critical error", msg, Severity::Error));
            }
        }

        if h.flood {
            let base = *self
                .flood_base_percent
                .get_or_insert(state.heater_percent);
            frame.limit_heater(clamp_percent(f32::from(base) * (1.0 - cfg.flood_power_cut)));
            if !prev.flood {
                let p = state.pressure.cube_mmhg;
                tracing::error!(pressure_mmhg = p, heater_before = base, "column flood");
                let msg = format!("Column flood! Pressure {p:.1} mmHg, heater power reduced");
                raise(state, AlarmKind::ColumnFlood, AlarmLevel::Critical, &msg, now);
                notifier.notify(&Notification::new("Warning", msg, Severity::Warning));
            }
        } else {
            self.flood_base_percent = None;
        }

        if h.stale {
            frame.emergency_stop_all();
            if !prev.stale {
                tracing::error!(
                    last_update_ms = ?state.temperatures.last_update_ms,
                    "temperature sensors stale"
                );
                let msg = "Lost contact with temperature sensors! System stopped";
                raise(state, AlarmKind::SensorFailure, AlarmLevel::Critical, msg, now);
                notifier.notify(&Notification::new("Critical error", msg, Severity::Error));
            }
        }

        if h.full_stop() {
            self.latched = true;
        }
        if self.latched {
            // Latched trips keep everything off until reset.
            frame.emergency_stop_all();
        }
        state.safety_ok = !self.latched;
        self.previous = h;
    }

    /// Operator acknowledgement of the current alarm.
    pub fn acknowledge(&mut self, state: &mut SystemState) -> Result<(), SafetyError> {
        if !state.current_alarm.is_active() {
            return Err(SafetyError::NoAlarm);
        }
        state.current_alarm.acknowledged = true;
        tracing::info!(kind = ?state.current_alarm.kind, "alarm acknowledged");
        Ok(())
    }

    /// Clear the alarm and the latch after re-checking every hazard.
    pub fn reset(&mut self, state: &mut SystemState, cfg: &SafetyCfg) -> Result<(), SafetyError> {
        if !state.current_alarm.is_active() && !self.latched {
            return Err(SafetyError::NoAlarm);
        }
        if state.current_alarm.is_active() && !state.current_alarm.acknowledged {
            return Err(SafetyError::NotAcknowledged);
        }
        let h = evaluate(state, cfg);
        if let Some(kind) = h.first_critical() {
            tracing::warn!(?kind, "safety reset refused, hazard still present");
            return Err(SafetyError::HazardActive(kind));
        }
        self.latched = false;
        self.previous = h;
        state.safety_ok = true;
        state.current_alarm = Alarm::default();
        tracing::info!("safety reset, system ok");
        Ok(())
    }
}

fn raise(state: &mut SystemState, kind: AlarmKind, level: AlarmLevel, message: &str, now_ms: u64) {
    state.current_alarm = Alarm {
        kind,
        level,
        message: message.to_string(),
        timestamp_ms: now_ms,
        acknowledged: false,
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::PumpCommand;
    use crate::mocks::RecordingNotifier;
    use column_traits::Valve;

    fn healthy(now_ms: u64) -> SystemState {
        let mut s = SystemState::default();
        s.now_ms = now_ms;
        s.temperatures.last_update_ms = Some(now_ms);
        s.temperatures.tsa.value = 25.0;
        s.temperatures.tsa.valid = true;
        s.temperatures.water_out.value = 30.0;
        s.temperatures.water_out.valid = true;
        s
    }

    #[test]
    fn vapor_breakthrough_stops_everything_and_latches() {
        let cfg = SafetyCfg::default();
        let mut mon = SafetyMonitor::new();
        let mut n = RecordingNotifier::default();
        let mut s = healthy(0);
        s.temperatures.tsa.value = 60.0;
        let mut f = CommandFrame::new();
        mon.check(&mut s, &cfg, &mut f, &mut n);
        assert!(!s.safety_ok);
        assert_eq!(s.current_alarm.kind, AlarmKind::VaporBreakthrough);
        assert_eq!(f.heater(), Some(0));
        assert_eq!(f.pump(), Some(PumpCommand::Stop));
        assert_eq!(f.valve(Valve::CoolingWater), Some(false));

        // hazard gone, still latched
        s.temperatures.tsa.value = 30.0;
        let mut f = CommandFrame::new();
        mon.check(&mut s, &cfg, &mut f, &mut n);
        assert!(!s.safety_ok);
        assert_eq!(f.heater(), Some(0));
        assert_eq!(n.count(), 1);
    }

    #[test]
    fn water_overheat_only_stops_heater() {
        let cfg = SafetyCfg::default();
        let mut mon = SafetyMonitor::new();
        let mut n = RecordingNotifier::default();
        let mut s = healthy(0);
        s.temperatures.water_out.value = 75.0;
        let mut f = CommandFrame::new();
        mon.check(&mut s, &cfg, &mut f, &mut n);
        assert!(s.safety_ok);
        assert_eq!(s.current_alarm.kind, AlarmKind::WaterOverheat);
        assert!(f.is_heater_locked());
        assert_eq!(f.pump(), None);
        assert_eq!(f.valve(Valve::CoolingWater), None);
    }

    #[test]
    fn last_hazard_in_pass_owns_the_record() {
        let cfg = SafetyCfg::default();
        let mut mon = SafetyMonitor::new();
        let mut n = RecordingNotifier::default();
        let mut s = healthy(10_000);
        s.temperatures.tsa.value = 60.0;
        s.temperatures.last_update_ms = Some(0);
        let mut f = CommandFrame::new();
        mon.check(&mut s, &cfg, &mut f, &mut n);
        assert_eq!(s.current_alarm.kind, AlarmKind::SensorFailure);
        assert_eq!(n.count(), 2);
    }

    #[test]
    fn flood_caps_heater_at_pre_flood_minus_cut() {
        let cfg = SafetyCfg::default();
        let mut mon = SafetyMonitor::new();
        let mut n = RecordingNotifier::default();
        let mut s = healthy(0);
        s.heater_percent = 80;
        s.pressure.valid = true;
        s.pressure.critical_mmhg = 23.6;
        s.pressure.cube_mmhg = 30.0;
        for _ in 0..2 {
            let mut f = CommandFrame::new();
            mon.check(&mut s, &cfg, &mut f, &mut n);
            f.set_heater(100);
            assert_eq!(f.heater(), Some(68));
            s.heater_percent = 68;
        }
        assert!(s.safety_ok);
        assert_eq!(s.current_alarm.kind, AlarmKind::ColumnFlood);
        assert_eq!(n.count(), 1);
    }

    #[test]
    fn invalid_pressure_is_not_a_flood() {
        let mut s = healthy(0);
        s.pressure.valid = false;
        s.pressure.critical_mmhg = 23.6;
        s.pressure.cube_mmhg = 30.0;
        assert!(!evaluate(&s, &SafetyCfg::default()).flood);
    }

    #[test]
    fn staleness_without_any_update_only_counts_while_running() {
        let cfg = SafetyCfg::default();
        let mut s = SystemState::default();
        s.now_ms = 60_000;
        assert!(!evaluate(&s, &cfg).stale);
        s.mode = Mode::Rectification;
        assert!(evaluate(&s, &cfg).stale);
    }

    #[test]
    fn reset_requires_ack_and_cleared_hazard() {
        let cfg = SafetyCfg::default();
        let mut mon = SafetyMonitor::new();
        let mut n = RecordingNotifier::default();
        let mut s = healthy(0);
        s.temperatures.tsa.value = 60.0;
        mon.check(&mut s, &cfg, &mut CommandFrame::new(), &mut n);

        assert_eq!(mon.reset(&mut s, &cfg), Err(SafetyError::NotAcknowledged));
        mon.acknowledge(&mut s).unwrap();
        assert!(s.current_alarm.acknowledged);
        assert!(!s.safety_ok);
        assert_eq!(
            mon.reset(&mut s, &cfg),
            Err(SafetyError::HazardActive(AlarmKind::VaporBreakthrough))
        );
        s.temperatures.tsa.value = 30.0;
        mon.reset(&mut s, &cfg).unwrap();
        assert!(s.safety_ok);
        assert!(!s.current_alarm.is_active());
        assert_eq!(mon.reset(&mut s, &cfg), Err(SafetyError::NoAlarm));
    }

    #[test]
    fn voltage_warning_does_not_replace_critical() {
        let cfg = SafetyCfg::default();
        let mut mon = SafetyMonitor::new();
        let mut n = RecordingNotifier::default();
        let mut s = healthy(0);
        s.temperatures.water_out.value = 75.0;
        mon.check(&mut s, &cfg, &mut CommandFrame::new(), &mut n);
        s.power.valid = true;
        s.power.voltage = 180.0;
        mon.check(&mut s, &cfg, &mut CommandFrame::new(), &mut n);
        assert_eq!(s.current_alarm.kind, AlarmKind::WaterOverheat);
        assert_eq!(n.count(), 2);
    }

    #[test]
    fn low_voltage_raises_warning_without_actions() {
        let cfg = SafetyCfg::default();
        let mut mon = SafetyMonitor::new();
        let mut n = RecordingNotifier::default();
        let mut s = healthy(0);
        s.power.valid = true;
        s.power.voltage = 180.0;
        let mut f = CommandFrame::new();
        mon.check(&mut s, &cfg, &mut f, &mut n);
        assert_eq!(s.current_alarm.kind, AlarmKind::LowVoltage);
        assert_eq!(s.current_alarm.level, AlarmLevel::Warning);
        assert!(f.is_empty());
        assert!(s.safety_ok);
    }
}
