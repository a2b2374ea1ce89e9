use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FeedError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("{bus} bus full: no space within post timeout (capacity {capacity})")]
    Backpressure { bus: &'static str, capacity: usize },
    #[error("{bus} bus consumer disconnected")]
    Disconnected { bus: &'static str },
    #[error("axis not confirmed stopped after {waited_ms} ms")]
    StopNotConfirmed { waited_ms: u64 },
    #[error("could not post stop confirmation after {attempts} attempts")]
    StopPostFailed { attempts: u32 },
    #[error("stepper command timeout")]
    Timeout,
    #[error("hardware error: {0}")]
    Hardware(String),
    #[error("hardware fault: {0}")]
    HardwareFault(String),
}

impl FeedError {
    /// Backpressure is the only condition a producer may retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, FeedError::Backpressure { .. })
    }
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("missing stepper controller")]
    MissingStepper,
    #[error("missing speed input")]
    MissingSpeedInput,
    #[error("missing display handler")]
    MissingDisplay,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
