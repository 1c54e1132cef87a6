//! Maps `Box<dyn Error>` from trait boundaries to typed `CoreError`.
//!
//! `PersistentTable` reports failures as boxed errors; this module converts
//! them to `CoreError::Storage`, with a feature-gated path that downcasts
//! `joint_hardware::HwError` for a precise message.

use crate::error::CoreError;

/// Map a storage-boundary error to a typed `CoreError`.
pub fn map_hw_error(e: &(dyn std::error::Error + 'static)) -> CoreError {
    // Feature-gated: try to downcast to HwError for precise mapping
    #[cfg(feature = "hardware-errors")]
    {
        if let Some(hw) = e.downcast_ref::<joint_hardware::error::HwError>() {
            return match hw {
                joint_hardware::error::HwError::WriteNotOpen
                | joint_hardware::error::HwError::WriteAlreadyOpen => {
                    CoreError::State(hw.to_string())
                }
                other => CoreError::Storage(other.to_string()),
            };
        }
    }

    // Fallback: string-based detection
    let s = e.to_string();
    if s.to_lowercase().contains("window") {
        CoreError::State(s)
    } else {
        CoreError::Storage(s)
    }
}
