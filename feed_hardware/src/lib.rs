#[cfg(all(feature = "hardware", target_os = "linux"))]
pub mod buttons;
pub mod debounce;
pub mod error;

use feed_traits::clock::{Clock, MonotonicClock};
use feed_traits::{AnalogInput, BoxError, Stepper};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use crate::error::HwError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Left,
    Right,
}

#[derive(Debug, Clone, Copy)]
enum Motion {
    Idle,
    /// Ramping up towards (or cruising at) the active target.
    Running {
        dir: Direction,
        since: Instant,
        from_sps: u32,
    },
    /// Decelerating to rest after `stop()`.
    Braking {
        dir: Direction,
        since: Instant,
        from_sps: u32,
    },
}

#[derive(Debug)]
struct StepperState {
    motion: Motion,
    normal_sps: u32,
    rapid_sps: u32,
    rapid: bool,
}

impl StepperState {
    fn target(&self) -> u32 {
        if self.rapid {
            self.rapid_sps
        } else {
            self.normal_sps
        }
    }
}

/// Simulated stepper driver with a trapezoid ramp.
///
/// Speed rises at `acceleration` steps/s² towards the active preset and falls
/// at `deceleration` after `stop()`; `is_stopped()` only turns true once the
/// ramp reaches zero, like the real driver's queue draining.
pub struct SimulatedStepper {
    state: Mutex<StepperState>,
    acceleration: u32,
    deceleration: u32,
    clock: Arc<dyn Clock + Send + Sync>,
}

impl SimulatedStepper {
    pub fn new(acceleration: u32, deceleration: u32) -> Self {
        Self::with_clock(acceleration, deceleration, Arc::new(MonotonicClock::new()))
    }

    pub fn with_clock(
        acceleration: u32,
        deceleration: u32,
        clock: Arc<dyn Clock + Send + Sync>,
    ) -> Self {
        Self {
            state: Mutex::new(StepperState {
                motion: Motion::Idle,
                normal_sps: 0,
                rapid_sps: 0,
                rapid: false,
            }),
            acceleration: acceleration.max(1),
            deceleration: deceleration.max(1),
            clock,
        }
    }

    fn lock(&self) -> MutexGuard<'_, StepperState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn speed_of(&self, st: &StepperState, now: Instant) -> u32 {
        match st.motion {
            Motion::Idle => 0,
            Motion::Running { since, from_sps, .. } => {
                let gained = ramp(self.acceleration, now.saturating_duration_since(since));
                from_sps.saturating_add(gained).min(st.target())
            }
            Motion::Braking { since, from_sps, .. } => {
                let lost = ramp(self.deceleration, now.saturating_duration_since(since));
                from_sps.saturating_sub(lost)
            }
        }
    }

    /// Instantaneous simulated speed in steps per second.
    pub fn current_speed(&self) -> u32 {
        let st = self.lock();
        self.speed_of(&st, self.clock.now())
    }

    /// Direction of travel, if the axis is moving or braking.
    pub fn direction(&self) -> Option<Direction> {
        match self.lock().motion {
            Motion::Idle => None,
            Motion::Running { dir, .. } | Motion::Braking { dir, .. } => Some(dir),
        }
    }

    fn start(&self, dir: Direction) {
        let now = self.clock.now();
        let mut st = self.lock();
        let from_sps = match st.motion {
            Motion::Running { dir: d, .. } | Motion::Braking { dir: d, .. } if d == dir => {
                self.speed_of(&st, now)
            }
            Motion::Idle => 0,
            Motion::Running { .. } | Motion::Braking { .. } => {
                tracing::warn!(?dir, "reversal commanded while moving; simulating hard reverse");
                0
            }
        };
        st.motion = Motion::Running {
            dir,
            since: now,
            from_sps,
        };
        tracing::debug!(?dir, from_sps, target = st.target(), "sim stepper run");
    }
}

/// Steps/s gained or lost over `elapsed` at `rate` steps/s².
fn ramp(rate: u32, elapsed: std::time::Duration) -> u32 {
    let micros = elapsed.as_micros().min(u128::from(u64::MAX)) as u64;
    let v = u64::from(rate).saturating_mul(micros) / 1_000_000;
    v.min(u64::from(u32::MAX)) as u32
}

impl Stepper for SimulatedStepper {
    fn move_left(&self) -> Result<(), BoxError> {
        self.start(Direction::Left);
        Ok(())
    }

    fn move_right(&self) -> Result<(), BoxError> {
        self.start(Direction::Right);
        Ok(())
    }

    fn stop(&self) -> Result<(), BoxError> {
        let now = self.clock.now();
        let mut st = self.lock();
        if let Motion::Running { dir, .. } = st.motion {
            let from_sps = self.speed_of(&st, now);
            st.motion = Motion::Braking {
                dir,
                since: now,
                from_sps,
            };
            tracing::debug!(?dir, from_sps, "sim stepper braking");
        }
        Ok(())
    }

    fn is_stopped(&self) -> bool {
        let now = self.clock.now();
        let mut st = self.lock();
        match st.motion {
            Motion::Idle => true,
            Motion::Running { .. } => false,
            Motion::Braking { .. } => {
                if self.speed_of(&st, now) == 0 {
                    st.motion = Motion::Idle;
                    true
                } else {
                    false
                }
            }
        }
    }

    fn set_rapid_speed(&self) -> Result<(), BoxError> {
        self.retarget(|st| st.rapid = true);
        Ok(())
    }

    fn set_normal_speed(&self) -> Result<(), BoxError> {
        self.retarget(|st| st.rapid = false);
        Ok(())
    }

    fn update_rapid_speed(&self, steps_per_sec: u32) -> Result<(), BoxError> {
        self.retarget(|st| st.rapid_sps = steps_per_sec);
        Ok(())
    }

    fn update_normal_speed(&self, steps_per_sec: u32) -> Result<(), BoxError> {
        self.retarget(|st| st.normal_sps = steps_per_sec);
        Ok(())
    }

    fn target_speed(&self) -> u32 {
        self.lock().target()
    }
}

impl SimulatedStepper {
    /// Apply a preset change, re-anchoring an active ramp at the current speed.
    fn retarget(&self, f: impl FnOnce(&mut StepperState)) {
        let now = self.clock.now();
        let mut st = self.lock();
        if let Motion::Running { dir, .. } = st.motion {
            let from_sps = self.speed_of(&st, now);
            st.motion = Motion::Running {
                dir,
                since: now,
                from_sps,
            };
        }
        f(&mut st);
    }
}

/// Simulated speed potentiometer.
///
/// The raw value is shared with a [`PotHandle`] so a script or test can turn
/// the knob while the sampler thread owns the pot. Optional jitter adds
/// deterministic noise of up to ±`jitter` counts per read.
pub struct SimulatedPot {
    value: Arc<AtomicU32>,
    connected: Arc<AtomicBool>,
    jitter: u32,
    noise: u32,
}

/// Remote control for a [`SimulatedPot`].
#[derive(Clone)]
pub struct PotHandle {
    value: Arc<AtomicU32>,
    connected: Arc<AtomicBool>,
}

impl PotHandle {
    pub fn set(&self, raw: u32) {
        self.value.store(raw, Ordering::Relaxed);
    }

    pub fn get(&self) -> u32 {
        self.value.load(Ordering::Relaxed)
    }

    /// Make subsequent reads fail until reconnected.
    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::Relaxed);
    }

    pub fn reconnect(&self) {
        self.connected.store(true, Ordering::Relaxed);
    }
}

impl SimulatedPot {
    pub fn new(initial: u32) -> Self {
        Self {
            value: Arc::new(AtomicU32::new(initial)),
            connected: Arc::new(AtomicBool::new(true)),
            jitter: 0,
            noise: 0x2545_f491,
        }
    }

    pub fn with_jitter(mut self, jitter: u32) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn handle(&self) -> PotHandle {
        PotHandle {
            value: self.value.clone(),
            connected: self.connected.clone(),
        }
    }

    fn next_noise(&mut self) -> i64 {
        if self.jitter == 0 {
            return 0;
        }
        let mut x = self.noise;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.noise = x;
        let span = u64::from(self.jitter) * 2 + 1;
        (u64::from(x) % span) as i64 - i64::from(self.jitter)
    }
}

impl AnalogInput for SimulatedPot {
    fn read(&mut self) -> Result<u32, BoxError> {
        if !self.connected.load(Ordering::Relaxed) {
            return Err(Box::new(HwError::Adc("potentiometer disconnected".into())));
        }
        let base = i64::from(self.value.load(Ordering::Relaxed));
        let v = (base + self.next_noise()).max(0);
        Ok(v.min(i64::from(u32::MAX)) as u32)
    }
}
