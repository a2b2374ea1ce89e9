//! Type-state builder for the running feed system.
//!
//! `build()` is only available once the stepper, speed input and display are
//! provided; `try_build()` is always available and reports what is missing.
//! Building validates the configuration, wires both buses and starts the
//! command worker, the UI worker and the speed sampler.

use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use feed_traits::clock::{Clock, MonotonicClock};
use feed_traits::{AnalogInput, Stepper};

use crate::bus::{BusWorker, EventBus, EventHandler, Poster};
use crate::config::FeedCfg;
use crate::error::{BuildError, FeedError, Result};
use crate::event::{CommandEvent, MotionState, SpeedMode, UiEvent};
use crate::fault::{FaultHook, abort_on_fault};
use crate::filter::SpeedMap;
use crate::machine::{MotionStateMachine, StatusBoard};
use crate::sampler::{SpeedNotify, SpeedReadings, SpeedSampler};

/// A running power feed.
///
/// Dropping it stops the sampler, lets the command worker deliver what is
/// queued, stands down pending stop detectors, stops an axis that is still
/// moving and finally stops the UI worker.
pub struct Feed {
    sampler: Option<SpeedSampler>,
    command_worker: Option<BusWorker>,
    ui_worker: Option<BusWorker>,
    commands: Poster<CommandEvent>,
    command_timeout: Duration,
    status: Arc<StatusBoard>,
    speeds: Arc<SpeedReadings>,
    motion_epoch: Arc<AtomicU64>,
    stepper: Arc<dyn Stepper>,
}

impl core::fmt::Debug for Feed {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let (state, mode) = self.status.snapshot();
        f.debug_struct("Feed")
            .field("state", &state)
            .field("speed_mode", &mode)
            .field("normal_speed", &self.speeds.normal_speed())
            .field(
                "workers",
                &self
                    .command_worker
                    .iter()
                    .chain(self.ui_worker.iter())
                    .map(BusWorker::name)
                    .collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}

impl Feed {
    pub fn builder() -> FeedBuilder<Missing, Missing, Missing> {
        FeedBuilder::default()
    }

    /// Producer handle for the command bus (button callbacks, scripts).
    pub fn commands(&self) -> Poster<CommandEvent> {
        self.commands.clone()
    }

    /// Post with the configured command timeout.
    pub fn post(&self, event: CommandEvent) -> std::result::Result<(), FeedError> {
        self.commands.post(event, self.command_timeout)
    }

    pub fn speeds(&self) -> Arc<SpeedReadings> {
        self.speeds.clone()
    }

    pub fn state(&self) -> MotionState {
        self.status.state()
    }

    pub fn speed_mode(&self) -> SpeedMode {
        self.status.snapshot().1
    }

    /// Poll until the machine reports `state` or `timeout` elapses.
    pub fn wait_for_state(&self, state: MotionState, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.status.state() == state {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
    }
}

impl Drop for Feed {
    fn drop(&mut self) {
        drop(self.sampler.take());
        drop(self.command_worker.take());
        // The machine is gone; no detector may confirm or escalate for it now.
        self.motion_epoch.fetch_add(1, Ordering::AcqRel);

        let state = self.status.state();
        if state.is_moving() {
            tracing::warn!(?state, "feed shut down while axis moving; stopping");
            if let Err(e) = self.stepper.stop() {
                tracing::error!(error = %e, "stop on shutdown failed");
            }
        } else if state.is_stopping() {
            tracing::debug!(?state, "feed shut down during deceleration");
        }
        drop(self.ui_worker.take());
        tracing::info!("feed shut down");
    }
}

// ── Type-state markers ───────────────────────────────────────────────────────

pub struct Missing;
pub struct Set;

pub struct FeedBuilder<S, I, D> {
    stepper: Option<Arc<dyn Stepper>>,
    input: Option<Box<dyn AnalogInput + Send>>,
    display: Option<Box<dyn EventHandler<UiEvent>>>,
    cfg: Option<FeedCfg>,
    fault: Option<FaultHook>,
    clock: Option<Arc<dyn Clock + Send + Sync>>,
    _s: PhantomData<S>,
    _i: PhantomData<I>,
    _d: PhantomData<D>,
}

impl Default for FeedBuilder<Missing, Missing, Missing> {
    fn default() -> Self {
        Self {
            stepper: None,
            input: None,
            display: None,
            cfg: None,
            fault: None,
            clock: None,
            _s: PhantomData,
            _i: PhantomData,
            _d: PhantomData,
        }
    }
}

impl<S, I, D> FeedBuilder<S, I, D> {
    fn retype<S2, I2, D2>(self) -> FeedBuilder<S2, I2, D2> {
        FeedBuilder {
            stepper: self.stepper,
            input: self.input,
            display: self.display,
            cfg: self.cfg,
            fault: self.fault,
            clock: self.clock,
            _s: PhantomData,
            _i: PhantomData,
            _d: PhantomData,
        }
    }

    pub fn with_stepper(mut self, stepper: Arc<dyn Stepper>) -> FeedBuilder<Set, I, D> {
        self.stepper = Some(stepper);
        self.retype()
    }

    pub fn with_speed_input(
        mut self,
        input: impl AnalogInput + Send + 'static,
    ) -> FeedBuilder<S, Set, D> {
        self.input = Some(Box::new(input));
        self.retype()
    }

    pub fn with_display(
        mut self,
        display: impl EventHandler<UiEvent> + 'static,
    ) -> FeedBuilder<S, I, Set> {
        self.display = Some(Box::new(display));
        self.retype()
    }

    pub fn with_config(mut self, cfg: FeedCfg) -> Self {
        self.cfg = Some(cfg);
        self
    }

    /// Replace the default abort-on-fault escalation.
    pub fn with_fault_hook(mut self, fault: FaultHook) -> Self {
        self.fault = Some(fault);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock + Send + Sync>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Fallible build available in any type-state.
    pub fn try_build(self) -> Result<Feed> {
        let stepper = self
            .stepper
            .ok_or_else(|| eyre::Report::new(BuildError::MissingStepper))?;
        let input = self
            .input
            .ok_or_else(|| eyre::Report::new(BuildError::MissingSpeedInput))?;
        let display = self
            .display
            .ok_or_else(|| eyre::Report::new(BuildError::MissingDisplay))?;
        let cfg = self.cfg.unwrap_or_default();
        validate(&cfg)?;

        let clock: Arc<dyn Clock + Send + Sync> = match self.clock {
            Some(c) => c,
            None => Arc::new(MonotonicClock::new()),
        };
        let fault = self.fault.unwrap_or_else(abort_on_fault);

        let command_bus = EventBus::new("command", cfg.bus.command.capacity)?;
        let ui_bus = EventBus::new("ui", cfg.bus.ui.capacity)?;
        let commands = command_bus.poster();
        let command_timeout = cfg.bus.command.post_timeout();

        let machine = MotionStateMachine::new(
            stepper.clone(),
            command_bus.poster(),
            ui_bus.poster(),
            cfg.bus.ui.post_timeout(),
            cfg.stop_detector,
        )
        .with_fault_hook(fault)
        .with_clock(clock.clone());
        let status = machine.status();
        let motion_epoch = machine.motion_epoch();

        // Load the rapid preset before anything else reaches the machine.
        commands.post(
            CommandEvent::UpdateRapidSpeed(cfg.sampler.rapid_speed),
            command_timeout,
        )?;

        let ui_worker = BusWorker::spawn(ui_bus, display, cfg.bus.ui.timing());
        let command_worker = BusWorker::spawn(command_bus, machine, cfg.bus.command.timing());

        let speeds = Arc::new(SpeedReadings::new(
            cfg.sampler.speed_min,
            cfg.sampler.rapid_speed,
        ));
        let notify = cfg.sampler.change_threshold.map(|threshold| SpeedNotify {
            commands: commands.clone(),
            post_timeout: command_timeout,
            threshold,
        });
        let sampler = SpeedSampler::spawn(input, &cfg.sampler, speeds.clone(), notify, clock)?;

        tracing::info!(
            command_capacity = cfg.bus.command.capacity,
            ui_capacity = cfg.bus.ui.capacity,
            sample_rate_hz = cfg.sampler.sample_rate_hz,
            rapid_speed = cfg.sampler.rapid_speed,
            "feed started"
        );

        Ok(Feed {
            sampler: Some(sampler),
            command_worker: Some(command_worker),
            ui_worker: Some(ui_worker),
            commands,
            command_timeout,
            status,
            speeds,
            motion_epoch,
            stepper,
        })
    }
}

impl FeedBuilder<Set, Set, Set> {
    pub fn build(self) -> Result<Feed> {
        self.try_build()
    }
}

fn invalid(msg: &'static str) -> eyre::Report {
    eyre::Report::new(BuildError::InvalidConfig(msg))
}

fn validate(cfg: &FeedCfg) -> Result<()> {
    for ch in [&cfg.bus.command, &cfg.bus.ui] {
        if ch.capacity == 0 {
            return Err(invalid("bus capacity must be >= 1"));
        }
        if ch.post_timeout_ms == 0 {
            return Err(invalid("bus post timeout must be >= 1 ms"));
        }
        if ch.wait_ms == 0 {
            return Err(invalid("bus consumer wait must be >= 1 ms"));
        }
    }
    if cfg.sampler.sample_rate_hz == 0 {
        return Err(invalid("sample_rate_hz must be > 0"));
    }
    if cfg.sampler.rapid_speed == 0 {
        return Err(invalid("rapid_speed must be > 0"));
    }
    if cfg.sampler.change_threshold == Some(0) {
        return Err(invalid("change_threshold must be >= 1"));
    }
    SpeedMap::new(
        cfg.sampler.adc_min,
        cfg.sampler.adc_max,
        cfg.sampler.speed_min,
        cfg.sampler.speed_max,
    )?;
    let sd = &cfg.stop_detector;
    if sd.poll_ms == 0 {
        return Err(invalid("stop detector poll_ms must be >= 1"));
    }
    if sd.post_attempts == 0 {
        return Err(invalid("stop detector post_attempts must be >= 1"));
    }
    if sd.stop_timeout_ms <= sd.poll_ms {
        return Err(invalid("stop detector stop_timeout_ms must exceed poll_ms"));
    }
    Ok(())
}
