//! Human-readable error descriptions and structured JSON error formatting.

use column_core::AlarmKind;

use crate::replay::Tripped;

pub fn alarm_kind_name(kind: AlarmKind) -> &'static str {
    match kind {
        AlarmKind::None => "None",
        AlarmKind::VaporBreakthrough => "VaporBreakthrough",
        AlarmKind::SensorFailure => "SensorFailure",
        AlarmKind::WaterOverheat => "WaterOverheat",
        AlarmKind::ColumnFlood => "ColumnFlood",
        AlarmKind::LowVoltage => "LowVoltage",
        AlarmKind::HighVoltage => "HighVoltage",
    }
}

fn trip_text(kind: AlarmKind) -> &'static str {
    match kind {
        AlarmKind::VaporBreakthrough => {
            "What happened: Vapor broke through past the condenser (TSA over limit).\nLikely causes: Cooling water off or too weak, or heater power far above what the condenser can take.\nHow to fix: Check water flow, lower equipment.max_power_percent, then acknowledge and reset the alarm."
        }
        AlarmKind::SensorFailure => {
            "What happened: Temperature sensors stopped reporting.\nLikely causes: Disconnected 1-Wire bus, failed probe, or a gap in the trace longer than safety.sensor_timeout_ms.\nHow to fix: Check sensor wiring (or the trace timestamps) and restart the run."
        }
        AlarmKind::WaterOverheat => {
            "What happened: Cooling water outlet is too hot.\nLikely causes: Water flow too low or inlet water too warm.\nHow to fix: Increase cooling flow; adjust safety.water_out_max_c only if the plumbing allows it."
        }
        AlarmKind::ColumnFlood => {
            "What happened: Column flood detected (cube pressure at the flood threshold).\nLikely causes: Heater power too high for the packing, or flood pressure set too high.\nHow to fix: Calibrate equipment.calibrated_flood_pressure or lower heater power."
        }
        _ => {
            "What happened: A safety interlock stopped the process.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug for details."
        }
    }
}

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    use column_core::error::{BuildError, ColumnError, CommandError, SafetyError};

    if let Some(t) = err.downcast_ref::<Tripped>() {
        return format!(
            "Safety trip at t={} ms: {}\n{}",
            t.t_ms,
            t.message,
            trip_text(t.kind)
        );
    }

    // Typed matches first
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::MissingHeater | BuildError::MissingPump | BuildError::MissingValves => {
                format!(
                    "What happened: The engine was assembled without an actuator ({be}).\nLikely causes: A driver failed to initialize or was not wired into the builder.\nHow to fix: Pass every actuator via with_heater/with_pump/with_valves."
                )
            }
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Missing or out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun. See etc/column.toml for a sample."
            ),
        };
    }

    if let Some(ce) = err.downcast_ref::<ColumnError>() {
        return match ce {
            ColumnError::Command(CommandError::SensorUnavailable(what)) => format!(
                "What happened: The run could not start: no valid {what} reading.\nLikely causes: The first trace row has an empty {what} cell or the probe is disconnected.\nHow to fix: Make sure the sensor reports before starting."
            ),
            ColumnError::Command(CommandError::EmptyProgram) => {
                "What happened: The selected program has no steps.\nLikely causes: [program] mash or hold list is empty.\nHow to fix: Add at least one { target_c, duration_min } step to the config.".to_string()
            }
            ColumnError::Command(CommandError::SafetyLatched)
            | ColumnError::Safety(SafetyError::HazardActive(_)) => {
                "What happened: The safety interlock is latched.\nLikely causes: A critical alarm has not been acknowledged and reset.\nHow to fix: Clear the hazard, acknowledge and reset the alarm, then start again.".to_string()
            }
            ColumnError::Config(msg) => format!(
                "What happened: Invalid setting ({msg}).\nLikely causes: Out-of-range value on the command line or in the config.\nHow to fix: Correct the value and rerun."
            ),
            ColumnError::Hardware(msg) | ColumnError::HardwareFault(msg) => format!(
                "What happened: Actuator error ({msg}).\nLikely causes: Device unplugged or driver fault.\nHow to fix: Check wiring and power, then restart."
            ),
            other => format!(
                "What happened: {other}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug or set RUST_LOG for more detail."
            ),
        };
    }

    // String-based heuristics for errors coming from config or trace loading
    let msg = err.to_string();
    let lower = msg.to_ascii_lowercase();

    if lower.contains("trace csv must have headers") {
        return format!(
            "Invalid headers in trace CSV. Expected '{}'.",
            column_config::TRACE_HEADERS.join(",")
        );
    }

    if lower.contains("invalid csv row") || lower.contains("time-ordered") {
        return format!(
            "What happened: The trace CSV could not be read ({msg}).\nLikely causes: Non-numeric cells or rows out of time order.\nHow to fix: Fix the offending row and rerun."
        );
    }

    if lower.contains("read config") || lower.contains("parse config") {
        let cause = err.source().map(|s| format!(" Cause: {s}")).unwrap_or_default();
        return format!(
            "What happened: The config file could not be loaded ({msg}).{cause}\nHow to fix: Pass --config <FILE> pointing at a valid TOML file."
        );
    }

    if lower.contains("invalid configuration") {
        let detail = err.source().map(ToString::to_string).unwrap_or_default();
        return format!(
            "What happened: Configuration is invalid ({detail}).\nLikely causes: Out-of-range values in the TOML.\nHow to fix: Edit the TOML config and try again."
        );
    }

    // Generic fallback
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Map safety trips to stable exit codes; everything else returns 1.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    if let Some(t) = err.downcast_ref::<Tripped>() {
        return match t.kind {
            AlarmKind::VaporBreakthrough => 2,
            AlarmKind::SensorFailure => 3,
            AlarmKind::WaterOverheat => 4,
            AlarmKind::ColumnFlood => 5,
            _ => 6,
        };
    }
    1
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use serde_json::json;

    if let Some(t) = err.downcast_ref::<Tripped>() {
        return json!({
            "reason": alarm_kind_name(t.kind),
            "details": { "t_ms": t.t_ms, "alarm": t.message },
            "message": humanize(err),
        })
        .to_string();
    }

    json!({ "reason": "Error", "message": humanize(err) }).to_string()
}
