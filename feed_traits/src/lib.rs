//! Collaborator capabilities consumed by the feed core.
//!
//! The core never generates step pulses or touches an ADC itself; it only calls
//! through these traits. Implementations live in `feed_hardware` (simulated and
//! GPIO-backed) or in test doubles.
pub mod clock;

pub use clock::{Clock, MonotonicClock};

/// Error type used at trait boundaries; mapped to typed errors by the core.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Abstract stepper controller for a single axis.
///
/// Commands are fire-and-forget: the controller executes its own
/// acceleration/deceleration ramp. Only `is_stopped` and `target_speed` are
/// queries. Methods take `&self` because the controller is shared between the
/// state machine and the stop detector thread.
pub trait Stepper: Send + Sync {
    fn move_left(&self) -> Result<(), BoxError>;
    fn move_right(&self) -> Result<(), BoxError>;
    fn stop(&self) -> Result<(), BoxError>;
    /// True once the axis has mechanically come to rest.
    fn is_stopped(&self) -> bool;
    /// Switch the running target to the rapid preset.
    fn set_rapid_speed(&self) -> Result<(), BoxError>;
    /// Switch the running target to the normal preset.
    fn set_normal_speed(&self) -> Result<(), BoxError>;
    fn update_rapid_speed(&self, steps_per_sec: u32) -> Result<(), BoxError>;
    fn update_normal_speed(&self, steps_per_sec: u32) -> Result<(), BoxError>;
    /// Target speed of the active preset, in steps per second.
    fn target_speed(&self) -> u32;
}

/// A single-channel analog source (the speed potentiometer).
pub trait AnalogInput {
    /// Read one raw sample in ADC counts.
    fn read(&mut self) -> Result<u32, BoxError>;
}

impl<A: AnalogInput + ?Sized> AnalogInput for Box<A> {
    fn read(&mut self) -> Result<u32, BoxError> {
        (**self).read()
    }
}

impl<C: Clock + ?Sized> Clock for std::sync::Arc<C> {
    fn now(&self) -> std::time::Instant {
        (**self).now()
    }

    fn sleep(&self, d: std::time::Duration) {
        (**self).sleep(d);
    }
}
