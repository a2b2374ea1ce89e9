use std::sync::Arc;
use std::time::Duration;

use feed_core::mocks::{
    CollectingHandler, RecordingStepper, SharedInput, StepperCall, recording_fault_hook,
};
use feed_core::{
    BuildError, BusCfg, ChannelCfg, CommandEvent, Feed, FeedCfg, MotionState, SamplerCfg,
    SpeedMode, UiEvent,
};
use feed_hardware::SimulatedStepper;
use feed_traits::Stepper;

fn fast_cfg() -> FeedCfg {
    let ch = ChannelCfg {
        capacity: 16,
        post_timeout_ms: 50,
        wait_ms: 5,
        idle_ms: 1,
    };
    FeedCfg {
        bus: BusCfg { command: ch, ui: ch },
        sampler: SamplerCfg {
            sample_rate_hz: 500,
            ..SamplerCfg::default()
        },
        ..FeedCfg::default()
    }
}

#[test]
fn button_cycle_reaches_display_in_order() {
    let stepper = Arc::new(SimulatedStepper::new(20_000, 200_000));
    let (display, seen) = CollectingHandler::new();
    let (hook, faults) = recording_fault_hook();
    let feed = Feed::builder()
        .with_stepper(stepper.clone())
        .with_speed_input(SharedInput::new(4095))
        .with_display(display)
        .with_config(fast_cfg())
        .with_fault_hook(hook)
        .build()
        .unwrap();

    feed.post(CommandEvent::LeftPressed).unwrap();
    assert!(feed.wait_for_state(MotionState::MovingLeft, Duration::from_secs(1)));
    std::thread::sleep(Duration::from_millis(50));
    assert!(stepper.current_speed() > 0);

    feed.post(CommandEvent::LeftReleased).unwrap();
    assert!(feed.wait_for_state(MotionState::Stopped, Duration::from_secs(2)));
    assert_eq!(stepper.current_speed(), 0);
    drop(feed);

    let motion: Vec<UiEvent> = seen
        .lock()
        .unwrap()
        .iter()
        .copied()
        .filter(|e| !matches!(e, UiEvent::SetSpeed(_)))
        .collect();
    assert_eq!(
        motion,
        vec![UiEvent::MoveLeft, UiEvent::Stopping, UiEvent::Stopped]
    );
    assert!(faults.lock().unwrap().is_empty());
}

#[test]
fn sampler_drives_normal_speed_into_stepper() {
    let stepper = Arc::new(SimulatedStepper::new(20_000, 200_000));
    let (display, seen) = CollectingHandler::new();
    let (hook, _faults) = recording_fault_hook();
    let feed = Feed::builder()
        .with_stepper(stepper.clone())
        .with_speed_input(SharedInput::new(4095))
        .with_display(display)
        .with_config(fast_cfg())
        .with_fault_hook(hook)
        .build()
        .unwrap();

    std::thread::sleep(Duration::from_millis(150));
    assert_eq!(feed.speeds().normal_speed(), 13_000);
    assert_eq!(stepper.target_speed(), 13_000);

    feed.post(CommandEvent::RapidPressed).unwrap();
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(feed.speed_mode(), SpeedMode::Rapid);
    drop(feed);
    assert!(seen.lock().unwrap().contains(&UiEvent::SetSpeed(13_000)));
}

#[test]
fn shutdown_while_moving_stops_the_axis() {
    let stepper = Arc::new(RecordingStepper::new());
    let (display, _seen) = CollectingHandler::new();
    let (hook, _faults) = recording_fault_hook();
    let feed = Feed::builder()
        .with_stepper(stepper.clone())
        .with_speed_input(SharedInput::new(0))
        .with_display(display)
        .with_config(fast_cfg())
        .with_fault_hook(hook)
        .build()
        .unwrap();
    feed.post(CommandEvent::RightPressed).unwrap();
    assert!(feed.wait_for_state(MotionState::MovingRight, Duration::from_secs(1)));
    drop(feed);
    assert_eq!(
        stepper.count(StepperCall::Stop),
        1,
        "drop must stop a moving axis"
    );
}

#[test]
fn shutdown_during_deceleration_is_not_a_fault() {
    let stepper = Arc::new(RecordingStepper::new());
    stepper.set_coasting(true);
    let (display, _seen) = CollectingHandler::new();
    let (hook, faults) = recording_fault_hook();
    let feed = Feed::builder()
        .with_stepper(stepper.clone())
        .with_speed_input(SharedInput::new(0))
        .with_display(display)
        .with_config(fast_cfg())
        .with_fault_hook(hook)
        .build()
        .unwrap();
    feed.post(CommandEvent::LeftPressed).unwrap();
    feed.post(CommandEvent::LeftReleased).unwrap();
    assert!(feed.wait_for_state(MotionState::StoppingLeft, Duration::from_secs(1)));
    drop(feed);

    // The axis comes to rest after the buses are gone.
    stepper.set_stopped(true);
    std::thread::sleep(Duration::from_millis(150));
    assert!(faults.lock().unwrap().is_empty());
    assert_eq!(stepper.count(StepperCall::Stop), 1);
}

#[test]
fn queued_press_is_delivered_then_stopped_on_shutdown() {
    let stepper = Arc::new(RecordingStepper::new());
    let (display, seen) = CollectingHandler::new();
    let (hook, faults) = recording_fault_hook();
    let feed = Feed::builder()
        .with_stepper(stepper.clone())
        .with_speed_input(SharedInput::new(0))
        .with_display(display)
        .with_config(fast_cfg())
        .with_fault_hook(hook)
        .build()
        .unwrap();
    feed.post(CommandEvent::RightPressed).unwrap();
    drop(feed);

    assert_eq!(stepper.count(StepperCall::MoveRight), 1);
    assert_eq!(stepper.count(StepperCall::Stop), 1);
    assert!(seen.lock().unwrap().contains(&UiEvent::MoveRight));
    assert!(faults.lock().unwrap().is_empty());
}

#[test]
fn missing_pieces_are_reported() {
    let (display, _seen) = CollectingHandler::<UiEvent>::new();
    let err = Feed::builder()
        .with_speed_input(SharedInput::new(0))
        .with_display(display)
        .try_build()
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<BuildError>(),
        Some(BuildError::MissingStepper)
    ));

    let err = Feed::builder()
        .with_stepper(Arc::new(RecordingStepper::new()))
        .with_speed_input(SharedInput::new(0))
        .try_build()
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<BuildError>(),
        Some(BuildError::MissingDisplay)
    ));
}

#[test]
fn zero_capacity_bus_is_a_startup_fault() {
    let mut cfg = fast_cfg();
    cfg.bus.ui.capacity = 0;
    let (display, _seen) = CollectingHandler::<UiEvent>::new();
    let err = Feed::builder()
        .with_stepper(Arc::new(RecordingStepper::new()))
        .with_speed_input(SharedInput::new(0))
        .with_display(display)
        .with_config(cfg)
        .build()
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<BuildError>(),
        Some(BuildError::InvalidConfig(_))
    ));
}

#[test]
fn empty_adc_range_is_a_startup_fault() {
    let mut cfg = fast_cfg();
    cfg.sampler.adc_max = cfg.sampler.adc_min;
    let (display, _seen) = CollectingHandler::<UiEvent>::new();
    let err = Feed::builder()
        .with_stepper(Arc::new(RecordingStepper::new()))
        .with_speed_input(SharedInput::new(0))
        .with_display(display)
        .with_config(cfg)
        .build()
        .unwrap_err();
    assert!(format!("{err}").contains("ADC range"));
}
