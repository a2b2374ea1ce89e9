//! Test and helper mocks for feed_core

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use feed_traits::{AnalogInput, BoxError, Stepper};

use crate::bus::{EventHandler, Outcome};
use crate::error::FeedError;
use crate::fault::FaultHook;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepperCall {
    MoveLeft,
    MoveRight,
    Stop,
    SetRapidSpeed,
    SetNormalSpeed,
    UpdateRapidSpeed(u32),
    UpdateNormalSpeed(u32),
}

/// Stepper that records every command. `stop()` brings it to rest at once
/// unless it is set to coast, in which case it reports rest only when told to.
#[derive(Debug, Default)]
pub struct RecordingStepper {
    calls: Mutex<Vec<StepperCall>>,
    stopped: AtomicBool,
    coasting: AtomicBool,
    fail_stop: AtomicBool,
    rapid: AtomicBool,
    normal_sps: AtomicU32,
    rapid_sps: AtomicU32,
}

impl RecordingStepper {
    /// Starts at rest.
    pub fn new() -> Self {
        Self {
            stopped: AtomicBool::new(true),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<StepperCall> {
        self.calls.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn count(&self, call: StepperCall) -> usize {
        self.calls().iter().filter(|c| **c == call).count()
    }

    pub fn set_stopped(&self, stopped: bool) {
        self.stopped.store(stopped, Ordering::SeqCst);
    }

    /// While coasting, `stop()` leaves the axis moving until `set_stopped(true)`.
    pub fn set_coasting(&self, coasting: bool) {
        self.coasting.store(coasting, Ordering::SeqCst);
    }

    /// Make `stop()` return an error from now on.
    pub fn fail_stop(&self) {
        self.fail_stop.store(true, Ordering::SeqCst);
    }

    fn record(&self, call: StepperCall) {
        self.calls
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(call);
    }
}

impl Stepper for RecordingStepper {
    fn move_left(&self) -> Result<(), BoxError> {
        self.record(StepperCall::MoveLeft);
        self.stopped.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn move_right(&self) -> Result<(), BoxError> {
        self.record(StepperCall::MoveRight);
        self.stopped.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self) -> Result<(), BoxError> {
        self.record(StepperCall::Stop);
        if self.fail_stop.load(Ordering::SeqCst) {
            return Err(Box::new(std::io::Error::other("driver rejected stop")));
        }
        if !self.coasting.load(Ordering::SeqCst) {
            self.stopped.store(true, Ordering::SeqCst);
        }
        Ok(())
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    fn set_rapid_speed(&self) -> Result<(), BoxError> {
        self.record(StepperCall::SetRapidSpeed);
        self.rapid.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn set_normal_speed(&self) -> Result<(), BoxError> {
        self.record(StepperCall::SetNormalSpeed);
        self.rapid.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn update_rapid_speed(&self, steps_per_sec: u32) -> Result<(), BoxError> {
        self.record(StepperCall::UpdateRapidSpeed(steps_per_sec));
        self.rapid_sps.store(steps_per_sec, Ordering::SeqCst);
        Ok(())
    }

    fn update_normal_speed(&self, steps_per_sec: u32) -> Result<(), BoxError> {
        self.record(StepperCall::UpdateNormalSpeed(steps_per_sec));
        self.normal_sps.store(steps_per_sec, Ordering::SeqCst);
        Ok(())
    }

    fn target_speed(&self) -> u32 {
        if self.rapid.load(Ordering::SeqCst) {
            self.rapid_sps.load(Ordering::SeqCst)
        } else {
            self.normal_sps.load(Ordering::SeqCst)
        }
    }
}

/// Handler that keeps every event it sees.
pub struct CollectingHandler<E> {
    seen: Arc<Mutex<Vec<E>>>,
}

impl<E> CollectingHandler<E> {
    /// Returns the handler and a shared view of what it collects.
    pub fn new() -> (Self, Arc<Mutex<Vec<E>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        (Self { seen: seen.clone() }, seen)
    }
}

impl<E: Send> EventHandler<E> for CollectingHandler<E> {
    fn handle(&mut self, event: E) -> Outcome {
        self.seen
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(event);
        Outcome::Handled
    }
}

/// Analog input whose value is shared with the test.
#[derive(Clone, Default)]
pub struct SharedInput {
    value: Arc<AtomicU32>,
}

impl SharedInput {
    pub fn new(raw: u32) -> Self {
        Self {
            value: Arc::new(AtomicU32::new(raw)),
        }
    }

    pub fn set(&self, raw: u32) {
        self.value.store(raw, Ordering::SeqCst);
    }
}

impl AnalogInput for SharedInput {
    fn read(&mut self) -> Result<u32, BoxError> {
        Ok(self.value.load(Ordering::SeqCst))
    }
}

/// Analog input that always errors.
pub struct FailingInput;

impl AnalogInput for FailingInput {
    fn read(&mut self) -> Result<u32, BoxError> {
        Err(Box::new(std::io::Error::other("adc unavailable")))
    }
}

/// Fault hook that records instead of aborting.
pub fn recording_fault_hook() -> (FaultHook, Arc<Mutex<Vec<FeedError>>>) {
    let faults = Arc::new(Mutex::new(Vec::new()));
    let sink = faults.clone();
    let hook: FaultHook = Arc::new(move |e: &FeedError| {
        sink.lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(e.clone());
    });
    (hook, faults)
}
