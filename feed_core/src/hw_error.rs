//! Maps `Box<dyn Error>` from trait boundaries to typed `FeedError`.
//!
//! With the `hardware-errors` feature, `feed_hardware::error::HwError` is
//! downcast for a precise mapping; anything else falls back to its message.

use crate::error::FeedError;

pub fn map_hw_error(e: &(dyn std::error::Error + 'static)) -> FeedError {
    #[cfg(feature = "hardware-errors")]
    {
        if let Some(hw) = e.downcast_ref::<feed_hardware::error::HwError>() {
            return match hw {
                feed_hardware::error::HwError::Timeout => FeedError::Timeout,
                other => FeedError::HardwareFault(other.to_string()),
            };
        }
    }

    let s = e.to_string();
    if s.to_lowercase().contains("timeout") {
        FeedError::Timeout
    } else {
        FeedError::Hardware(s)
    }
}
