//! Maps `Box<dyn Error>` from trait boundaries to typed `ColumnError`.
//!
//! The traits in `column_traits` use `Box<dyn Error + Send + Sync>` for maximum
//! flexibility; this module converts those to our typed error enum, with an
//! optional feature-gated path for `column_hardware::HwError` downcasting.

use crate::error::ColumnError;

/// Map a trait-boundary error to a typed `ColumnError`.
///
/// Attempts to downcast known hardware error types first, then falls back
/// to string-based heuristics.
pub fn map_hw_error(e: &(dyn std::error::Error + 'static)) -> ColumnError {
    #[cfg(feature = "hardware-errors")]
    {
        use column_hardware::error::HwError;
        if let Some(hw) = e.downcast_ref::<HwError>() {
            return match hw {
                HwError::Disconnected(_) | HwError::Stalled(_) => {
                    ColumnError::HardwareFault(hw.to_string())
                }
                other => ColumnError::Hardware(other.to_string()),
            };
        }
    }

    let s = e.to_string();
    let lower = s.to_lowercase();
    if lower.contains("disconnected") || lower.contains("fault") {
        ColumnError::HardwareFault(s)
    } else {
        ColumnError::Hardware(s)
    }
}
