//! Stop detection.
//!
//! Each stop request spawns one short-lived thread that polls the stepper until
//! it reports rest, then posts exactly one `SetStopped` onto the command bus.
//! The state machine bumps a shared motion epoch whenever it starts moving
//! again; a detector whose epoch is stale exits without posting.
//!
//! Two conditions escalate through the fault hook: the axis never reports rest
//! within the stop timeout, or a full bus rejects the confirmation on every
//! configured attempt. A closed bus means the feed is shutting down and is not
//! a fault.
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use feed_traits::Stepper;
use feed_traits::clock::Clock;

use crate::bus::Poster;
use crate::config::StopDetectorCfg;
use crate::error::FeedError;
use crate::event::CommandEvent;
use crate::fault::FaultHook;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopOutcome {
    /// `SetStopped` was accepted by the bus on this attempt.
    Posted { attempts: u32 },
    /// Motion resumed, or the feed began shutting down, before the
    /// confirmation was delivered.
    Superseded,
    /// The command bus closed under the detector.
    Shutdown,
    /// Escalated through the fault hook.
    Faulted(FeedError),
}

pub struct StopDetector {
    stepper: Arc<dyn Stepper>,
    commands: Poster<CommandEvent>,
    cfg: StopDetectorCfg,
    fault: FaultHook,
    clock: Arc<dyn Clock + Send + Sync>,
    motion_epoch: Arc<AtomicU64>,
}

impl StopDetector {
    /// `motion_epoch` is shared with the state machine, which bumps it on every move.
    pub fn new(
        stepper: Arc<dyn Stepper>,
        commands: Poster<CommandEvent>,
        cfg: StopDetectorCfg,
        fault: FaultHook,
        clock: Arc<dyn Clock + Send + Sync>,
        motion_epoch: Arc<AtomicU64>,
    ) -> Self {
        Self {
            stepper,
            commands,
            cfg,
            fault,
            clock,
            motion_epoch,
        }
    }

    /// Start watching for rest on behalf of the stop request made at `epoch`.
    pub fn spawn(self, epoch: u64) -> JoinHandle<StopOutcome> {
        std::thread::spawn(move || self.run(epoch))
    }

    /// Detection loop; runs on the calling thread.
    pub fn run(&self, epoch: u64) -> StopOutcome {
        let poll = Duration::from_millis(self.cfg.poll_ms);
        let started = self.clock.now();
        loop {
            self.clock.sleep(poll);
            if self.motion_epoch.load(Ordering::Acquire) != epoch {
                tracing::debug!(epoch, "stop request superseded by new motion");
                return StopOutcome::Superseded;
            }
            if self.stepper.is_stopped() {
                break;
            }
            let waited_ms = self.clock.ms_since(started);
            if waited_ms >= self.cfg.stop_timeout_ms {
                return self.escalate(FeedError::StopNotConfirmed { waited_ms });
            }
        }

        let timeout = Duration::from_millis(self.cfg.post_timeout_ms);
        let mut attempts = 0;
        while attempts < self.cfg.post_attempts {
            attempts += 1;
            match self.commands.post(CommandEvent::SetStopped, timeout) {
                Ok(()) => {
                    tracing::debug!(epoch, attempts, "axis at rest, SetStopped posted");
                    return StopOutcome::Posted { attempts };
                }
                Err(_) if self.motion_epoch.load(Ordering::Acquire) != epoch => {
                    tracing::debug!(epoch, "stop request superseded while posting");
                    return StopOutcome::Superseded;
                }
                Err(FeedError::Disconnected { bus }) => {
                    tracing::debug!(epoch, bus, "command bus closed, confirmation dropped");
                    return StopOutcome::Shutdown;
                }
                Err(e) => {
                    tracing::warn!(error = %e, attempt = attempts, "SetStopped not posted");
                    if !e.is_transient() {
                        break;
                    }
                }
            }
        }
        self.escalate(FeedError::StopPostFailed { attempts })
    }

    fn escalate(&self, err: FeedError) -> StopOutcome {
        tracing::error!(error = %err, "stop detection failed");
        (self.fault)(&err);
        StopOutcome::Faulted(err)
    }
}
