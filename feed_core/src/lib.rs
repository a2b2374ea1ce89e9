#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Power feed motion core (hardware-agnostic).
//!
//! All hardware interactions go through `feed_traits::Stepper` and
//! `feed_traits::AnalogInput`; the core never generates step pulses itself.
//!
//! ## Architecture
//!
//! - **Buses**: bounded FIFO command and UI buses with post timeouts (`bus`)
//! - **State machine**: button and speed events into stepper commands (`machine`)
//! - **Stop detection**: one short-lived poller per stop request (`detector`)
//! - **Sampling**: 8-sample moving average and ADC to speed map (`filter`, `sampler`)
//! - **Wiring**: type-state builder for the running system (`builder`)
//!
//! Speeds are integer steps per second throughout.

pub mod builder;
pub mod bus;
pub mod config;
pub mod conversions;
pub mod detector;
pub mod error;
pub mod event;
pub mod fault;
pub mod filter;
pub mod hw_error;
pub mod machine;
pub mod mocks;
pub mod sampler;
pub mod util;

pub use builder::{Feed, FeedBuilder, Missing, Set};
pub use bus::{BusWorker, EventBus, EventHandler, Outcome, Poster, WorkerTiming};
pub use config::{BusCfg, ChannelCfg, FeedCfg, SamplerCfg, StopDetectorCfg, WINDOW_SIZE};
pub use detector::{StopDetector, StopOutcome};
pub use error::{BuildError, FeedError, Report, Result};
pub use event::{CommandEvent, MotionState, SpeedMode, UiEvent};
pub use fault::{FaultHook, abort_on_fault};
pub use filter::{MovingAverage, SpeedMap};
pub use machine::{MotionStateMachine, StatusBoard};
pub use sampler::{ChangePolicy, SpeedFilter, SpeedNotify, SpeedReadings, SpeedSampler};
