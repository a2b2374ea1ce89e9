//! Runtime configuration for the feed core.
//!
//! These are the plain runtime shapes; `conversions` maps the TOML schema from
//! `feed_config` onto them.
use std::time::Duration;

use crate::bus::WorkerTiming;

/// Samples held by the speed moving-average window.
pub const WINDOW_SIZE: usize = 8;

/// One bus plus the loop timing of its consumer.
#[derive(Debug, Clone, Copy)]
pub struct ChannelCfg {
    pub capacity: usize,
    pub post_timeout_ms: u64,
    pub wait_ms: u64,
    pub idle_ms: u64,
}

impl ChannelCfg {
    pub fn post_timeout(&self) -> Duration {
        Duration::from_millis(self.post_timeout_ms)
    }

    pub fn timing(&self) -> WorkerTiming {
        WorkerTiming {
            wait: Duration::from_millis(self.wait_ms),
            idle: Duration::from_millis(self.idle_ms),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BusCfg {
    pub command: ChannelCfg,
    pub ui: ChannelCfg,
}

impl Default for BusCfg {
    fn default() -> Self {
        Self {
            command: ChannelCfg {
                capacity: 16,
                post_timeout_ms: 250,
                wait_ms: 100,
                idle_ms: 10,
            },
            ui: ChannelCfg {
                capacity: 16,
                post_timeout_ms: 250,
                wait_ms: 500,
                idle_ms: 50,
            },
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SamplerCfg {
    pub sample_rate_hz: u32,
    pub adc_min: u32,
    pub adc_max: u32,
    /// Normal speed range, steps per second.
    pub speed_min: u32,
    pub speed_max: u32,
    pub rapid_speed: u32,
    /// Minimum change of the averaged speed before `UpdateNormalSpeed` is posted.
    /// `None` leaves posting to someone else.
    pub change_threshold: Option<u32>,
}

impl Default for SamplerCfg {
    fn default() -> Self {
        Self {
            sample_rate_hz: 50,
            adc_min: 0,
            adc_max: 4095,
            speed_min: 0,
            speed_max: 13_000,
            rapid_speed: 13_000,
            change_threshold: Some(20),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct StopDetectorCfg {
    pub poll_ms: u64,
    pub post_timeout_ms: u64,
    pub post_attempts: u32,
    pub stop_timeout_ms: u64,
}

impl Default for StopDetectorCfg {
    fn default() -> Self {
        Self {
            poll_ms: 10,
            post_timeout_ms: 250,
            post_attempts: 3,
            stop_timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FeedCfg {
    pub bus: BusCfg,
    pub sampler: SamplerCfg,
    pub stop_detector: StopDetectorCfg,
}
