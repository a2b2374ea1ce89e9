//! Background speed sampling.
//!
//! One thread owns the speed potentiometer, samples it at the configured rate,
//! smooths the raw counts through the moving-average window and publishes the
//! mapped normal speed into [`SpeedReadings`]. With a change threshold set it
//! also posts `UpdateNormalSpeed` onto the command bus when the averaged speed
//! has moved far enough since the last successful post.
//!
//! The thread is shut down and joined when the `SpeedSampler` is dropped.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use feed_traits::AnalogInput;
use feed_traits::clock::Clock;

use crate::bus::Poster;
use crate::config::{SamplerCfg, WINDOW_SIZE};
use crate::error::FeedError;
use crate::event::CommandEvent;
use crate::filter::{MovingAverage, SpeedMap};
use crate::hw_error::map_hw_error;

/// Latest normal and rapid speed readings, steps per second.
///
/// Written by the sampler, read by anyone. A poisoned lock is recovered since
/// the protected value is a plain integer.
#[derive(Debug, Default)]
pub struct SpeedReadings {
    normal: Mutex<u32>,
    rapid: Mutex<u32>,
}

impl SpeedReadings {
    pub fn new(normal: u32, rapid: u32) -> Self {
        Self {
            normal: Mutex::new(normal),
            rapid: Mutex::new(rapid),
        }
    }

    pub fn normal_speed(&self) -> u32 {
        *self.normal.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn rapid_speed(&self) -> u32 {
        *self.rapid.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn publish_normal(&self, steps_per_sec: u32) {
        *self.normal.lock().unwrap_or_else(|p| p.into_inner()) = steps_per_sec;
    }

    pub fn publish_rapid(&self, steps_per_sec: u32) {
        *self.rapid.lock().unwrap_or_else(|p| p.into_inner()) = steps_per_sec;
    }
}

/// Moving average plus speed map; one call per raw sample.
#[derive(Debug, Clone)]
pub struct SpeedFilter {
    window: MovingAverage<WINDOW_SIZE>,
    map: SpeedMap,
}

impl SpeedFilter {
    pub fn new(cfg: &SamplerCfg) -> Result<Self, FeedError> {
        Ok(Self {
            window: MovingAverage::new(),
            map: SpeedMap::new(cfg.adc_min, cfg.adc_max, cfg.speed_min, cfg.speed_max)?,
        })
    }

    /// Push a raw ADC sample; returns the mapped average in steps per second.
    pub fn push(&mut self, raw: u32) -> u32 {
        self.map.map(self.window.push(raw))
    }

    pub fn is_primed(&self) -> bool {
        self.window.is_primed()
    }
}

/// Decides when a new averaged speed is worth posting.
#[derive(Debug, Clone, Copy)]
pub struct ChangePolicy {
    threshold: u32,
    last_posted: Option<u32>,
}

impl ChangePolicy {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold: threshold.max(1),
            last_posted: None,
        }
    }

    pub fn should_post(&self, speed: u32) -> bool {
        match self.last_posted {
            None => true,
            Some(last) => speed.abs_diff(last) >= self.threshold,
        }
    }

    /// Record a successful post; failed posts are retried on later samples.
    pub fn mark_posted(&mut self, speed: u32) {
        self.last_posted = Some(speed);
    }
}

/// Where the sampler posts speed updates.
pub struct SpeedNotify {
    pub commands: Poster<CommandEvent>,
    pub post_timeout: Duration,
    pub threshold: u32,
}

pub struct SpeedSampler {
    speeds: Arc<SpeedReadings>,
    shutdown: Arc<AtomicBool>,
    join_handle: Option<std::thread::JoinHandle<()>>,
}

impl SpeedSampler {
    /// Start sampling `input` at `cfg.sample_rate_hz`.
    ///
    /// Fails only when the ADC or speed range in `cfg` is unusable.
    pub fn spawn<A, C>(
        mut input: A,
        cfg: &SamplerCfg,
        speeds: Arc<SpeedReadings>,
        notify: Option<SpeedNotify>,
        clock: C,
    ) -> Result<Self, FeedError>
    where
        A: AnalogInput + Send + 'static,
        C: Clock + Send + Sync + 'static,
    {
        let mut filter = SpeedFilter::new(cfg)?;
        let period = Duration::from_millis(crate::util::period_ms(cfg.sample_rate_hz));
        speeds.publish_rapid(cfg.rapid_speed);

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = shutdown.clone();
        let speeds_clone = speeds.clone();
        let mut policy = notify.as_ref().map(|n| ChangePolicy::new(n.threshold));

        let join_handle = std::thread::spawn(move || {
            loop {
                if shutdown_clone.load(Ordering::Relaxed) {
                    tracing::debug!("speed sampler received shutdown signal");
                    break;
                }

                match input.read() {
                    Ok(raw) => {
                        let speed = filter.push(raw);
                        speeds_clone.publish_normal(speed);
                        if let (Some(n), Some(p)) = (notify.as_ref(), policy.as_mut())
                            && filter.is_primed()
                            && p.should_post(speed)
                        {
                            match n
                                .commands
                                .post(CommandEvent::UpdateNormalSpeed(speed), n.post_timeout)
                            {
                                Ok(()) => {
                                    tracing::debug!(speed, "normal speed update posted");
                                    p.mark_posted(speed);
                                }
                                Err(e) => {
                                    tracing::warn!(error = %e, speed, "speed update not posted");
                                }
                            }
                        }
                    }
                    Err(e) => {
                        // Skip the sample; the window keeps its previous contents.
                        tracing::debug!(error = %map_hw_error(&*e), "speed input read failed");
                    }
                }

                if shutdown_clone.load(Ordering::Relaxed) {
                    break;
                }
                clock.sleep(period);
            }
            tracing::trace!("speed sampler exiting cleanly");
        });

        Ok(Self {
            speeds,
            shutdown,
            join_handle: Some(join_handle),
        })
    }

    pub fn readings(&self) -> &Arc<SpeedReadings> {
        &self.speeds
    }
}

impl Drop for SpeedSampler {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.join_handle.take() {
            match handle.join() {
                Ok(()) => tracing::trace!("speed sampler joined"),
                Err(e) => tracing::warn!(?e, "speed sampler panicked during shutdown"),
            }
        }
    }
}
