//! Common time and unit helpers for column_core.

/// Number of milliseconds in one second.
pub const MILLIS_PER_SEC: u64 = 1_000;
/// Number of milliseconds in one minute.
pub const MILLIS_PER_MIN: u64 = 60 * MILLIS_PER_SEC;

#[inline]
pub fn minutes_to_ms(min: u32) -> u64 {
    u64::from(min) * MILLIS_PER_MIN
}

/// Heater rating in kilowatts.
#[inline]
pub fn kilowatts(watts: u32) -> f32 {
    watts as f32 / 1000.0
}

/// Round and clamp a floating-point percentage into `0..=100`.
/// Non-finite values map to 0.
#[inline]
pub fn clamp_percent(p: f32) -> u8 {
    if !p.is_finite() {
        return 0;
    }
    p.round().clamp(0.0, 100.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_percent_handles_edges() {
        assert_eq!(clamp_percent(-5.0), 0);
        assert_eq!(clamp_percent(49.6), 50);
        assert_eq!(clamp_percent(140.0), 100);
        assert_eq!(clamp_percent(f32::NAN), 0);
    }

    #[test]
    fn unit_conversions() {
        assert_eq!(minutes_to_ms(5), 300_000);
        assert!((kilowatts(3000) - 3.0).abs() < f32::EPSILON);
    }
}
