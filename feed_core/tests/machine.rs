use std::sync::Arc;
use std::time::Duration;

use feed_core::mocks::{CollectingHandler, RecordingStepper, StepperCall, recording_fault_hook};
use feed_core::{
    CommandEvent, EventBus, EventHandler, MotionState, MotionStateMachine, Outcome, SpeedMode,
    StopDetectorCfg, StopOutcome, UiEvent,
};
use proptest::prelude::*;
use rstest::rstest;

use CommandEvent::*;

struct Rig {
    stepper: Arc<RecordingStepper>,
    machine: MotionStateMachine,
    commands: EventBus<CommandEvent>,
    ui: EventBus<UiEvent>,
}

fn rig() -> Rig {
    let stepper = Arc::new(RecordingStepper::new());
    let commands = EventBus::new("command", 16).unwrap();
    let ui = EventBus::new("ui", 64).unwrap();
    let (hook, _faults) = recording_fault_hook();
    let machine = MotionStateMachine::new(
        stepper.clone(),
        commands.poster(),
        ui.poster(),
        Duration::from_millis(5),
        StopDetectorCfg {
            poll_ms: 1,
            post_timeout_ms: 50,
            post_attempts: 3,
            stop_timeout_ms: 500,
        },
    )
    .with_fault_hook(hook);
    Rig {
        stepper,
        machine,
        commands,
        ui,
    }
}

impl Rig {
    fn feed(&mut self, events: &[CommandEvent]) -> Vec<Outcome> {
        events.iter().map(|e| self.machine.handle(*e)).collect()
    }

    /// Deliver whatever is queued on the command bus to the machine.
    fn drain_commands(&mut self) -> Vec<Outcome> {
        struct Forward<'a>(&'a mut MotionStateMachine, Vec<Outcome>);
        impl EventHandler<CommandEvent> for Forward<'_> {
            fn handle(&mut self, e: CommandEvent) -> Outcome {
                let outcome = self.0.handle(e);
                self.1.push(outcome);
                outcome
            }
        }
        let mut fwd = Forward(&mut self.machine, Vec::new());
        self.commands.run_once(Duration::from_millis(50), &mut fwd);
        fwd.1
    }

    fn ui_events(&self) -> Vec<UiEvent> {
        let (mut h, seen) = CollectingHandler::new();
        self.ui.run_once(Duration::from_millis(1), &mut h);
        let v = seen.lock().unwrap().clone();
        v
    }

    fn motion_calls(&self) -> Vec<StepperCall> {
        self.stepper
            .calls()
            .into_iter()
            .filter(|c| {
                matches!(
                    c,
                    StepperCall::MoveLeft | StepperCall::MoveRight | StepperCall::Stop
                )
            })
            .collect()
    }
}

#[rstest]
#[case(&[LeftPressed], MotionState::MovingLeft)]
#[case(&[RightPressed], MotionState::MovingRight)]
#[case(&[LeftPressed, LeftReleased], MotionState::StoppingLeft)]
#[case(&[RightPressed, RightReleased], MotionState::StoppingRight)]
#[case(&[LeftPressed, LeftReleased, LeftPressed], MotionState::MovingLeft)]
#[case(&[RightPressed, RightReleased, RightPressed], MotionState::MovingRight)]
#[case(&[LeftPressed, LeftReleased, RightPressed], MotionState::StoppingLeft)]
#[case(&[RightPressed, RightReleased, LeftPressed], MotionState::StoppingRight)]
#[case(&[LeftPressed, LeftReleased, SetStopped], MotionState::Stopped)]
#[case(&[RightPressed, RightReleased, SetStopped], MotionState::Stopped)]
#[case(&[LeftPressed, RightPressed], MotionState::MovingLeft)]
#[case(&[LeftReleased, RightReleased, SetStopped], MotionState::Stopped)]
#[case(&[LeftPressed, SetStopped], MotionState::MovingLeft)]
fn transition_table(#[case] events: &[CommandEvent], #[case] expected: MotionState) {
    let mut r = rig();
    r.feed(events);
    assert_eq!(r.machine.state(), expected);
}

#[test]
fn press_release_stop_cycle() {
    let mut r = rig();
    let outcomes = r.feed(&[LeftPressed, LeftReleased, SetStopped]);
    assert_eq!(outcomes, vec![Outcome::Handled; 3]);
    assert_eq!(r.machine.state(), MotionState::Stopped);
    assert_eq!(r.stepper.count(StepperCall::MoveLeft), 1);
    assert_eq!(r.stepper.count(StepperCall::Stop), 1);
    assert_eq!(
        r.ui_events(),
        vec![UiEvent::MoveLeft, UiEvent::Stopping, UiEvent::Stopped]
    );
}

#[test]
fn opposite_press_while_moving_is_ignored() {
    let mut r = rig();
    r.feed(&[LeftPressed]);
    let before = r.stepper.calls();
    assert_eq!(r.machine.handle(RightPressed), Outcome::Ignored);
    assert_eq!(r.machine.state(), MotionState::MovingLeft);
    assert_eq!(r.stepper.calls(), before);
}

#[test]
fn reversal_before_full_stop_moves_again() {
    let mut r = rig();
    r.feed(&[LeftPressed, LeftReleased]);
    assert_eq!(r.machine.handle(LeftPressed), Outcome::Handled);
    assert_eq!(r.machine.state(), MotionState::MovingLeft);
    assert_eq!(r.stepper.count(StepperCall::MoveLeft), 2);
}

#[test]
fn opposite_press_while_stopping_is_dropped() {
    let mut r = rig();
    r.feed(&[RightPressed, RightReleased]);
    assert_eq!(r.machine.handle(LeftPressed), Outcome::Ignored);
    assert_eq!(r.machine.state(), MotionState::StoppingRight);
    assert_eq!(r.stepper.count(StepperCall::MoveLeft), 0);
}

#[test]
fn stray_events_are_not_handled() {
    let mut r = rig();
    assert_eq!(
        r.feed(&[SetStopped, LeftReleased, RightReleased, RapidReleased]),
        vec![Outcome::Ignored; 4]
    );
    assert!(r.stepper.calls().is_empty());
    assert!(r.ui_events().is_empty());
}

#[test]
fn repeated_rapid_press_is_idempotent() {
    let mut r = rig();
    let outcomes = r.feed(&[RapidPressed, RapidPressed, RapidPressed]);
    assert_eq!(
        outcomes,
        vec![Outcome::Handled, Outcome::Ignored, Outcome::Ignored]
    );
    assert_eq!(r.stepper.count(StepperCall::SetRapidSpeed), 1);
    assert_eq!(r.machine.speed_mode(), SpeedMode::Rapid);
    assert_eq!(r.ui_events(), vec![UiEvent::RapidSpeed]);

    r.feed(&[RapidReleased, RapidReleased]);
    assert_eq!(r.stepper.count(StepperCall::SetNormalSpeed), 1);
    assert_eq!(r.machine.speed_mode(), SpeedMode::Normal);
}

#[test]
fn rapid_mode_is_orthogonal_to_motion() {
    let mut r = rig();
    r.feed(&[LeftPressed, RapidPressed]);
    assert_eq!(r.machine.state(), MotionState::MovingLeft);
    assert_eq!(r.machine.speed_mode(), SpeedMode::Rapid);
}

#[test]
fn speed_updates_report_active_target() {
    let mut r = rig();
    r.feed(&[UpdateRapidSpeed(13_000), UpdateNormalSpeed(2_500)]);
    assert_eq!(
        r.ui_events(),
        vec![UiEvent::SetSpeed(0), UiEvent::SetSpeed(2_500)]
    );
    r.feed(&[RapidPressed, UpdateNormalSpeed(3_000)]);
    assert_eq!(
        r.ui_events(),
        vec![UiEvent::RapidSpeed, UiEvent::SetSpeed(13_000)]
    );
    assert_eq!(
        r.stepper.calls()[..2],
        [
            StepperCall::UpdateRapidSpeed(13_000),
            StepperCall::UpdateNormalSpeed(2_500)
        ]
    );
}

#[test]
fn stop_spawns_detector_that_confirms_rest() {
    let mut r = rig();
    r.stepper.set_coasting(true);
    r.feed(&[LeftPressed, LeftReleased]);
    r.stepper.set_stopped(true);
    let detector = r.machine.take_stop_detector().expect("detector spawned");
    assert_eq!(detector.join().unwrap(), StopOutcome::Posted { attempts: 1 });

    assert_eq!(r.drain_commands(), vec![Outcome::Handled]);
    assert_eq!(r.machine.state(), MotionState::Stopped);
}

#[test]
fn resumed_motion_supersedes_pending_detector() {
    let mut r = rig();
    r.stepper.set_coasting(true);
    r.feed(&[RightPressed, RightReleased]);
    let detector = r.machine.take_stop_detector().expect("detector spawned");
    r.feed(&[RightPressed]);
    assert_eq!(detector.join().unwrap(), StopOutcome::Superseded);
    assert_eq!(r.commands.pending(), 0);
    assert_eq!(r.machine.state(), MotionState::MovingRight);
}

#[test]
fn confirmation_queued_behind_retap_is_ignored() {
    let mut r = rig();
    r.stepper.set_coasting(true);
    r.feed(&[LeftPressed, LeftReleased]);
    let first = r.machine.take_stop_detector().expect("detector spawned");

    // Operator re-taps left while the first confirmation is still in flight.
    let poster = r.commands.poster();
    poster.post(LeftPressed, Duration::from_millis(5)).unwrap();
    poster.post(LeftReleased, Duration::from_millis(5)).unwrap();
    r.stepper.set_stopped(true);
    assert_eq!(first.join().unwrap(), StopOutcome::Posted { attempts: 1 });

    assert_eq!(
        r.drain_commands(),
        vec![Outcome::Handled, Outcome::Handled, Outcome::Ignored]
    );
    assert_eq!(r.machine.state(), MotionState::StoppingLeft);
    assert_eq!(r.machine.handle(RightPressed), Outcome::Ignored);
    assert_eq!(r.stepper.count(StepperCall::MoveRight), 0);

    // The detector for the second stop confirms once the axis really rests.
    let second = r.machine.take_stop_detector().expect("second detector spawned");
    r.stepper.set_stopped(true);
    assert_eq!(second.join().unwrap(), StopOutcome::Posted { attempts: 1 });
    assert_eq!(r.drain_commands(), vec![Outcome::Handled]);
    assert_eq!(r.machine.state(), MotionState::Stopped);
}

#[test]
fn failed_stop_command_escalates() {
    let stepper = Arc::new(RecordingStepper::new());
    stepper.fail_stop();
    let commands = EventBus::new("command", 4).unwrap();
    let ui = EventBus::<UiEvent>::new("ui", 4).unwrap();
    let (hook, faults) = recording_fault_hook();
    let mut m = MotionStateMachine::new(
        stepper.clone(),
        commands.poster(),
        ui.poster(),
        Duration::from_millis(5),
        StopDetectorCfg::default(),
    )
    .with_fault_hook(hook);
    m.handle(LeftPressed);
    m.handle(LeftReleased);
    assert_eq!(m.state(), MotionState::StoppingLeft);
    assert_eq!(faults.lock().unwrap().len(), 1);
    stepper.set_stopped(true);
    drop(m.take_stop_detector());
}

#[test]
fn full_ui_bus_never_blocks_motion() {
    let stepper = Arc::new(RecordingStepper::new());
    let commands = EventBus::new("command", 4).unwrap();
    let ui = EventBus::<UiEvent>::new("ui", 1).unwrap();
    let (hook, _faults) = recording_fault_hook();
    let mut m = MotionStateMachine::new(
        stepper.clone(),
        commands.poster(),
        ui.poster(),
        Duration::from_millis(1),
        StopDetectorCfg::default(),
    )
    .with_fault_hook(hook);
    m.handle(LeftPressed);
    m.handle(RapidPressed);
    m.handle(UpdateNormalSpeed(100));
    assert_eq!(m.state(), MotionState::MovingLeft);
    assert_eq!(stepper.count(StepperCall::SetRapidSpeed), 1);
    assert_eq!(ui.pending(), 1);
}

fn button_event() -> impl Strategy<Value = CommandEvent> {
    prop_oneof![
        Just(LeftPressed),
        Just(LeftReleased),
        Just(RightPressed),
        Just(RightReleased),
        Just(SetStopped),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn never_reverses_without_stop(events in proptest::collection::vec(button_event(), 0..40)) {
        let mut r = rig();
        r.feed(&events);
        let mut last_move: Option<StepperCall> = None;
        for call in r.motion_calls() {
            match call {
                StepperCall::Stop => last_move = None,
                mv => {
                    if let Some(prev) = last_move {
                        prop_assert_eq!(prev, mv, "reversed without an intervening Stop");
                    }
                    last_move = Some(mv);
                }
            }
        }
    }

    #[test]
    fn state_matches_last_ui_motion_event(events in proptest::collection::vec(button_event(), 1..30)) {
        let mut r = rig();
        r.feed(&events);
        let last = r.ui_events().into_iter().rev().find(|e| !matches!(e, UiEvent::SetSpeed(_)));
        let expected = match r.machine.state() {
            MotionState::Stopped => None,
            MotionState::MovingLeft => Some(UiEvent::MoveLeft),
            MotionState::MovingRight => Some(UiEvent::MoveRight),
            MotionState::StoppingLeft | MotionState::StoppingRight => Some(UiEvent::Stopping),
        };
        match expected {
            Some(ev) => prop_assert_eq!(last, Some(ev)),
            None => prop_assert!(last.is_none() || last == Some(UiEvent::Stopped)),
        }
    }
}
