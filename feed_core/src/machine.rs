//! Motion state machine.
//!
//! Consumes `CommandEvent`s from the command bus, drives the stepper and
//! reports every state change on the UI bus. The UI event describing a
//! mutation is always posted after the mutation. A UI post that fails is
//! logged and dropped; display lag never reaches motion control.
//!
//! Transitions:
//!
//! | current | event | next |
//! |---|---|---|
//! | Stopped | LeftPressed / RightPressed | MovingLeft / MovingRight |
//! | MovingLeft | LeftReleased | StoppingLeft (detector spawned) |
//! | MovingRight | RightReleased | StoppingRight (detector spawned) |
//! | StoppingLeft | LeftPressed | MovingLeft |
//! | StoppingRight | RightPressed | MovingRight |
//! | Stopping* | SetStopped | Stopped |
//!
//! `SetStopped` is honored only while the stepper reports rest. A confirmation
//! from an earlier stop can still be queued when the axis is re-tapped and
//! released again; acting on it would report rest during deceleration, so it
//! is dropped and the newer detector confirms instead.
//!
//! Rapid/normal mode and speed updates apply in every state. Anything else is
//! reported as [`Outcome::Ignored`].
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use feed_traits::clock::{Clock, MonotonicClock};
use feed_traits::{BoxError, Stepper};
use tracing::{debug, info, warn};

use crate::bus::{EventHandler, Outcome, Poster};
use crate::config::StopDetectorCfg;
use crate::detector::{StopDetector, StopOutcome};
use crate::error::FeedError;
use crate::event::{CommandEvent, MotionState, SpeedMode, UiEvent};
use crate::fault::{FaultHook, abort_on_fault};
use crate::hw_error::map_hw_error;

/// Last state published by the machine, for observers outside its thread.
#[derive(Debug, Default)]
pub struct StatusBoard {
    inner: Mutex<(MotionState, SpeedMode)>,
}

impl StatusBoard {
    pub fn snapshot(&self) -> (MotionState, SpeedMode) {
        *self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn state(&self) -> MotionState {
        self.snapshot().0
    }

    fn store(&self, state: MotionState, mode: SpeedMode) {
        *self.inner.lock().unwrap_or_else(|p| p.into_inner()) = (state, mode);
    }
}

pub struct MotionStateMachine {
    stepper: Arc<dyn Stepper>,
    commands: Poster<CommandEvent>,
    ui: Poster<UiEvent>,
    ui_timeout: Duration,
    detector_cfg: StopDetectorCfg,
    fault: FaultHook,
    clock: Arc<dyn Clock + Send + Sync>,
    motion_epoch: Arc<AtomicU64>,
    state: MotionState,
    speed_mode: SpeedMode,
    status: Arc<StatusBoard>,
    last_detector: Option<JoinHandle<StopOutcome>>,
}

impl MotionStateMachine {
    /// `commands` is where spawned stop detectors post `SetStopped`.
    pub fn new(
        stepper: Arc<dyn Stepper>,
        commands: Poster<CommandEvent>,
        ui: Poster<UiEvent>,
        ui_timeout: Duration,
        detector_cfg: StopDetectorCfg,
    ) -> Self {
        Self {
            stepper,
            commands,
            ui,
            ui_timeout,
            detector_cfg,
            fault: abort_on_fault(),
            clock: Arc::new(MonotonicClock::new()),
            motion_epoch: Arc::new(AtomicU64::new(0)),
            state: MotionState::Stopped,
            speed_mode: SpeedMode::Normal,
            status: Arc::new(StatusBoard::default()),
            last_detector: None,
        }
    }

    pub fn with_fault_hook(mut self, fault: FaultHook) -> Self {
        self.fault = fault;
        self
    }

    /// Clock used by stop detectors for polling and their deadline.
    pub fn with_clock(mut self, clock: Arc<dyn Clock + Send + Sync>) -> Self {
        self.clock = clock;
        self
    }

    pub fn state(&self) -> MotionState {
        self.state
    }

    pub fn speed_mode(&self) -> SpeedMode {
        self.speed_mode
    }

    pub fn status(&self) -> Arc<StatusBoard> {
        self.status.clone()
    }

    /// Counter bumped on every move; detectors holding an older value stand down.
    pub(crate) fn motion_epoch(&self) -> Arc<AtomicU64> {
        self.motion_epoch.clone()
    }

    /// Handle of the most recently spawned stop detector, if not yet taken.
    pub fn take_stop_detector(&mut self) -> Option<JoinHandle<StopOutcome>> {
        self.last_detector.take()
    }

    fn transition(&mut self, event: CommandEvent) -> Outcome {
        use CommandEvent as C;
        use MotionState as S;

        match (self.state, event) {
            (S::Stopped | S::StoppingLeft, C::LeftPressed) => {
                self.move_left_action();
                Outcome::Handled
            }
            (S::Stopped | S::StoppingRight, C::RightPressed) => {
                self.move_right_action();
                Outcome::Handled
            }
            (S::MovingLeft, C::LeftReleased) => {
                self.stop_left_action();
                Outcome::Handled
            }
            (S::MovingRight, C::RightReleased) => {
                self.stop_right_action();
                Outcome::Handled
            }
            (S::StoppingLeft | S::StoppingRight, C::SetStopped) => {
                if !self.stepper.is_stopped() {
                    debug!(state = ?self.state, "stop confirmation ahead of rest ignored");
                    return Outcome::Ignored;
                }
                self.state = S::Stopped;
                self.emit(UiEvent::Stopped);
                Outcome::Handled
            }
            (S::StoppingLeft, C::RightPressed) | (S::StoppingRight, C::LeftPressed) => {
                debug!(state = ?self.state, ?event, "opposite direction dropped while stopping");
                Outcome::Ignored
            }
            (_, C::RapidPressed) => changed(self.rapid_speed_action()),
            (_, C::RapidReleased) => changed(self.normal_speed_action()),
            (_, C::UpdateRapidSpeed(v)) => {
                self.command("update_rapid_speed", |s| s.update_rapid_speed(v));
                self.emit(UiEvent::SetSpeed(self.stepper.target_speed()));
                Outcome::Handled
            }
            (_, C::UpdateNormalSpeed(v)) => {
                self.command("update_normal_speed", |s| s.update_normal_speed(v));
                self.emit(UiEvent::SetSpeed(self.stepper.target_speed()));
                Outcome::Handled
            }
            _ => Outcome::Ignored,
        }
    }

    pub(crate) fn move_left_action(&mut self) -> bool {
        if self.state == MotionState::MovingLeft {
            return false;
        }
        self.begin_motion(MotionState::MovingLeft);
        self.command("move_left", |s| s.move_left());
        self.emit(UiEvent::MoveLeft);
        true
    }

    pub(crate) fn move_right_action(&mut self) -> bool {
        if self.state == MotionState::MovingRight {
            return false;
        }
        self.begin_motion(MotionState::MovingRight);
        self.command("move_right", |s| s.move_right());
        self.emit(UiEvent::MoveRight);
        true
    }

    pub(crate) fn stop_left_action(&mut self) -> bool {
        if self.state != MotionState::MovingLeft {
            return false;
        }
        self.begin_stop(MotionState::StoppingLeft);
        true
    }

    pub(crate) fn stop_right_action(&mut self) -> bool {
        if self.state != MotionState::MovingRight {
            return false;
        }
        self.begin_stop(MotionState::StoppingRight);
        true
    }

    pub(crate) fn rapid_speed_action(&mut self) -> bool {
        if self.speed_mode == SpeedMode::Rapid {
            return false;
        }
        self.command("set_rapid_speed", |s| s.set_rapid_speed());
        self.speed_mode = SpeedMode::Rapid;
        self.emit(UiEvent::RapidSpeed);
        true
    }

    pub(crate) fn normal_speed_action(&mut self) -> bool {
        if self.speed_mode == SpeedMode::Normal {
            return false;
        }
        self.command("set_normal_speed", |s| s.set_normal_speed());
        self.speed_mode = SpeedMode::Normal;
        self.emit(UiEvent::NormalSpeed);
        true
    }

    /// Invalidate any pending stop detector before motion resumes.
    fn begin_motion(&mut self, next: MotionState) {
        self.motion_epoch.fetch_add(1, Ordering::AcqRel);
        self.state = next;
    }

    fn begin_stop(&mut self, next: MotionState) {
        self.state = next;
        if let Err(e) = self.stepper.stop() {
            let err = FeedError::HardwareFault(format!("stop rejected: {}", map_hw_error(&*e)));
            warn!(error = %err, "stop command failed");
            (self.fault)(&err);
        }
        let detector = StopDetector::new(
            self.stepper.clone(),
            self.commands.clone(),
            self.detector_cfg,
            self.fault.clone(),
            self.clock.clone(),
            self.motion_epoch.clone(),
        );
        let epoch = self.motion_epoch.load(Ordering::Acquire);
        self.last_detector = Some(detector.spawn(epoch));
        self.emit(UiEvent::Stopping);
    }

    fn command(&self, what: &'static str, f: impl FnOnce(&dyn Stepper) -> Result<(), BoxError>) {
        if let Err(e) = f(self.stepper.as_ref()) {
            warn!(command = what, error = %map_hw_error(&*e), "stepper command failed");
        }
    }

    fn emit(&self, event: UiEvent) {
        if let Err(e) = self.ui.post(event, self.ui_timeout) {
            warn!(error = %e, ?event, "UI event dropped");
        }
    }
}

fn changed(acted: bool) -> Outcome {
    if acted {
        Outcome::Handled
    } else {
        Outcome::Ignored
    }
}

impl EventHandler<CommandEvent> for MotionStateMachine {
    fn handle(&mut self, event: CommandEvent) -> Outcome {
        let before = self.state;
        let outcome = self.transition(event);
        if self.state != before {
            info!(from = ?before, to = ?self.state, ?event, "motion transition");
        }
        self.status.store(self.state, self.speed_mode);
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::EventBus;
    use crate::mocks::{RecordingStepper, StepperCall};

    fn machine(stepper: Arc<RecordingStepper>) -> (MotionStateMachine, EventBus<UiEvent>) {
        let commands = EventBus::new("command", 16).unwrap();
        let ui = EventBus::new("ui", 16).unwrap();
        let m = MotionStateMachine::new(
            stepper,
            commands.poster(),
            ui.poster(),
            Duration::from_millis(5),
            StopDetectorCfg::default(),
        );
        (m, ui)
    }

    #[test]
    fn actions_are_idempotent() {
        let stepper = Arc::new(RecordingStepper::new());
        let (mut m, _ui) = machine(stepper.clone());
        assert!(m.move_left_action());
        assert!(!m.move_left_action());
        assert!(!m.stop_right_action());
        assert!(m.rapid_speed_action());
        assert!(!m.rapid_speed_action());
        assert!(m.normal_speed_action());
        assert!(!m.normal_speed_action());
        assert_eq!(
            stepper.calls(),
            vec![
                StepperCall::MoveLeft,
                StepperCall::SetRapidSpeed,
                StepperCall::SetNormalSpeed
            ]
        );
    }

    #[test]
    fn status_board_tracks_handled_events() {
        let stepper = Arc::new(RecordingStepper::new());
        let (mut m, _ui) = machine(stepper);
        let board = m.status();
        m.handle(CommandEvent::RightPressed);
        m.handle(CommandEvent::RapidPressed);
        assert_eq!(board.snapshot(), (MotionState::MovingRight, SpeedMode::Rapid));
    }
}
