//! `From` implementations bridging `feed_config` types to `feed_core` types.

use crate::config::{BusCfg, ChannelCfg, FeedCfg, SamplerCfg, StopDetectorCfg};

impl From<&feed_config::BusCfg> for BusCfg {
    fn from(c: &feed_config::BusCfg) -> Self {
        Self {
            command: ChannelCfg {
                capacity: c.command_capacity,
                post_timeout_ms: c.command_post_timeout_ms,
                wait_ms: c.command_wait_ms,
                idle_ms: c.command_idle_ms,
            },
            ui: ChannelCfg {
                capacity: c.ui_capacity,
                post_timeout_ms: c.ui_post_timeout_ms,
                wait_ms: c.ui_wait_ms,
                idle_ms: c.ui_idle_ms,
            },
        }
    }
}

impl From<&feed_config::StopDetectorCfg> for StopDetectorCfg {
    fn from(c: &feed_config::StopDetectorCfg) -> Self {
        Self {
            poll_ms: c.poll_ms,
            post_timeout_ms: c.post_timeout_ms,
            post_attempts: c.post_attempts,
            stop_timeout_ms: c.stop_timeout_ms,
        }
    }
}

// The rapid preset depends on the stepper section, so the sampler needs the whole config.
impl From<&feed_config::Config> for SamplerCfg {
    fn from(c: &feed_config::Config) -> Self {
        Self {
            sample_rate_hz: c.sampler.sample_rate_hz,
            adc_min: c.sampler.adc_min,
            adc_max: c.sampler.adc_max,
            speed_min: c.sampler.speed_min,
            speed_max: c.sampler.speed_max,
            rapid_speed: c.sampler.effective_rapid_speed(&c.stepper),
            change_threshold: c.sampler.change_threshold,
        }
    }
}

impl From<&feed_config::Config> for FeedCfg {
    fn from(c: &feed_config::Config) -> Self {
        Self {
            bus: BusCfg::from(&c.bus),
            sampler: SamplerCfg::from(c),
            stop_detector: StopDetectorCfg::from(&c.stop_detector),
        }
    }
}
