//! Simulation runner: assembles the feed on simulated hardware and drives it
//! from a key script.
//!
//! One key per line; blank lines and `#` comments are skipped.
//!
//! | key          | effect                                   |
//! |--------------|------------------------------------------|
//! | `left`       | left button pressed                      |
//! | `left-up`    | left button released                     |
//! | `right`      | right button pressed                     |
//! | `right-up`   | right button released                    |
//! | `rapid`      | rapid button pressed                     |
//! | `rapid-up`   | rapid button released                    |
//! | `pot <raw>`  | turn the speed knob to a raw ADC value   |
//! | `wait <ms>`  | sleep                                    |
//! | `settle`     | block until the axis is confirmed at rest |
//! | `units`      | toggle display units                     |

use std::io::BufRead;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use eyre::{WrapErr, eyre};
use feed_core::{CommandEvent, Feed, FeedCfg, FeedError, MotionState};
use feed_hardware::debounce::{ButtonId, Edge};
use feed_hardware::{PotHandle, SimulatedPot, SimulatedStepper};
use feed_ui::{ConsolePanel, DisplayAdapter, Mechanics, Panel, ScreenModel, SpeedUnit, UnitToggle};

/// Longest single sleep so Ctrl-C is noticed promptly during `wait`.
const SLEEP_SLICE: Duration = Duration::from_millis(20);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Button(ButtonId, Edge),
    Pot(u32),
    Wait(Duration),
    Settle,
    Units,
}

/// Button edge to the command it raises on the command bus.
pub fn command_for(id: ButtonId, edge: Edge) -> CommandEvent {
    match (id, edge) {
        (ButtonId::Left, Edge::Pressed) => CommandEvent::LeftPressed,
        (ButtonId::Left, Edge::Released) => CommandEvent::LeftReleased,
        (ButtonId::Right, Edge::Pressed) => CommandEvent::RightPressed,
        (ButtonId::Right, Edge::Released) => CommandEvent::RightReleased,
        (ButtonId::Rapid, Edge::Pressed) => CommandEvent::RapidPressed,
        (ButtonId::Rapid, Edge::Released) => CommandEvent::RapidReleased,
    }
}

/// Parse one script line. `Ok(None)` for blank lines and comments.
pub fn parse_line(line: &str) -> eyre::Result<Option<Key>> {
    let line = line.split('#').next().unwrap_or_default().trim();
    let mut words = line.split_whitespace();
    let Some(word) = words.next() else {
        return Ok(None);
    };
    let arg = words.next();
    if words.next().is_some() {
        eyre::bail!("too many arguments in {line:?}");
    }
    let number = |what: &str| -> eyre::Result<u64> {
        let raw = arg.ok_or_else(|| eyre!("{word} needs a {what}"))?;
        raw.parse::<u64>()
            .wrap_err_with(|| format!("{word}: {raw:?} is not a valid {what}"))
    };
    let key = match word {
        "left" => Key::Button(ButtonId::Left, Edge::Pressed),
        "left-up" => Key::Button(ButtonId::Left, Edge::Released),
        "right" => Key::Button(ButtonId::Right, Edge::Pressed),
        "right-up" => Key::Button(ButtonId::Right, Edge::Released),
        "rapid" => Key::Button(ButtonId::Rapid, Edge::Pressed),
        "rapid-up" => Key::Button(ButtonId::Rapid, Edge::Released),
        "pot" => {
            let raw = number("raw ADC value")?;
            Key::Pot(u32::try_from(raw).wrap_err("pot value out of range")?)
        }
        "wait" => Key::Wait(Duration::from_millis(number("duration in ms")?)),
        "settle" => Key::Settle,
        "units" => Key::Units,
        other => eyre::bail!("unknown key {other:?}"),
    };
    if arg.is_some() && !matches!(key, Key::Pot(_) | Key::Wait(_)) {
        eyre::bail!("{word} takes no argument");
    }
    Ok(Some(key))
}

/// Display settings the runner needs from the TOML config.
#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    pub feed: FeedCfg,
    pub mechanics: Mechanics,
    pub units: SpeedUnit,
    pub acceleration: u32,
    pub deceleration: u32,
}

impl RunOptions {
    pub fn from_config(cfg: &feed_config::Config, units: Option<SpeedUnit>) -> eyre::Result<Self> {
        let units = match units {
            Some(u) => u,
            None => cfg
                .display
                .units
                .parse::<SpeedUnit>()
                .map_err(|e| eyre!(e))?,
        };
        Ok(Self {
            feed: FeedCfg::from(cfg),
            mechanics: Mechanics {
                steps_per_rev: cfg.stepper.steps_per_rev,
                mm_per_rev: cfg.stepper.mm_per_rev,
            },
            units,
            acceleration: cfg.stepper.acceleration,
            deceleration: cfg.stepper.deceleration,
        })
    }

    /// Time to wait for confirmed rest before giving up on `settle`.
    fn settle_timeout(&self) -> Duration {
        let sd = &self.feed.stop_detector;
        Duration::from_millis(sd.stop_timeout_ms + sd.poll_ms * 2)
    }

    /// Lets the UI worker pick up whatever is still queued.
    fn drain_delay(&self) -> Duration {
        let ui = &self.feed.bus.ui;
        Duration::from_millis(ui.idle_ms * 2 + 20)
    }
}

/// Simulated feed plus the handles a script needs to drive it.
pub struct SimRig {
    pub feed: Feed,
    pub pot: PotHandle,
    pub units: UnitToggle,
}

impl SimRig {
    pub fn assemble<P: Panel + 'static>(opts: &RunOptions, panel: P) -> eyre::Result<Self> {
        let stepper = Arc::new(SimulatedStepper::new(opts.acceleration, opts.deceleration));
        let pot = SimulatedPot::new(opts.feed.sampler.adc_min);
        let pot_handle = pot.handle();
        let display = DisplayAdapter::new(ScreenModel::new(opts.mechanics, opts.units), panel);
        let units = display.unit_toggle();
        let feed = Feed::builder()
            .with_stepper(stepper)
            .with_speed_input(pot)
            .with_display(display)
            .with_config(opts.feed)
            .build()?;
        Ok(Self {
            feed,
            pot: pot_handle,
            units,
        })
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub keys: usize,
    pub interrupted: bool,
}

fn sleep_unless(shutdown: &AtomicBool, d: Duration) -> bool {
    let deadline = Instant::now() + d;
    loop {
        if shutdown.load(Ordering::Relaxed) {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        std::thread::sleep(SLEEP_SLICE.min(deadline - now));
    }
}

fn settle(rig: &SimRig, opts: &RunOptions) -> eyre::Result<()> {
    let timeout = opts.settle_timeout();
    if rig.feed.wait_for_state(MotionState::Stopped, timeout) {
        return Ok(());
    }
    let waited_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
    Err(FeedError::StopNotConfirmed { waited_ms }).wrap_err("settle")
}

fn apply(rig: &SimRig, opts: &RunOptions, key: Key, shutdown: &AtomicBool) -> eyre::Result<()> {
    match key {
        Key::Button(id, edge) => {
            let ev = command_for(id, edge);
            tracing::debug!(?ev, "script key");
            rig.feed.post(ev)?;
        }
        Key::Pot(raw) => rig.pot.set(raw),
        Key::Wait(d) => {
            sleep_unless(shutdown, d);
        }
        Key::Settle => settle(rig, opts)?,
        Key::Units => rig.units.request(),
    }
    Ok(())
}

/// Run a script against a freshly assembled rig. The axis is always brought
/// to rest before the rig is torn down.
pub fn run_script<R: BufRead, P: Panel + 'static>(
    opts: &RunOptions,
    panel: P,
    script: R,
    shutdown: &AtomicBool,
) -> eyre::Result<RunSummary> {
    let rig = SimRig::assemble(opts, panel)?;
    let mut summary = RunSummary::default();

    for (idx, line) in script.lines().enumerate() {
        if shutdown.load(Ordering::Relaxed) {
            summary.interrupted = true;
            break;
        }
        let line = line.wrap_err("read script")?;
        let Some(key) = parse_line(&line).wrap_err_with(|| format!("script line {}", idx + 1))?
        else {
            continue;
        };
        apply(&rig, opts, key, shutdown)?;
        summary.keys += 1;
    }

    if shutdown.load(Ordering::Relaxed) {
        summary.interrupted = true;
        tracing::warn!("interrupted; bringing the axis to rest");
    }
    // Release anything still held so the run ends at rest.
    if rig.feed.state().is_moving() {
        for ev in [CommandEvent::LeftReleased, CommandEvent::RightReleased] {
            rig.feed.post(ev)?;
        }
    }
    settle(&rig, opts)?;
    std::thread::sleep(opts.drain_delay());
    tracing::info!(keys = summary.keys, "script finished");
    Ok(summary)
}

/// Assemble the system once on simulated hardware and tear it down again.
pub fn self_check(opts: &RunOptions) -> eyre::Result<()> {
    let rig = SimRig::assemble(opts, ConsolePanel::new(std::io::sink()))?;
    rig.pot.set(opts.feed.sampler.adc_max);
    let period = feed_core::util::period_ms(opts.feed.sampler.sample_rate_hz);
    // A full window of max readings, with generous slack for a loaded host.
    let deadline = Instant::now()
        + Duration::from_millis((period * (feed_core::WINDOW_SIZE as u64 + 2) * 4).max(500));
    let expected = opts.feed.sampler.speed_max;
    let speeds = rig.feed.speeds();
    while speeds.normal_speed() != expected {
        if Instant::now() >= deadline {
            eyre::bail!(
                "speed sampler did not reach full scale: got {}, expected {expected}",
                speeds.normal_speed()
            );
        }
        std::thread::sleep(Duration::from_millis(period));
    }
    tracing::info!(speed = expected, "self-check passed");
    Ok(())
}
