//! Bounded event buses between producers and a single consumer.
//!
//! Two instances exist at runtime: the command bus (buttons, sampler and stop
//! detector into the state machine) and the UI bus (state machine into the
//! display). Producers hold a cloneable [`Poster`]; the consumer drains the
//! bus with [`EventBus::run_once`], normally from a [`BusWorker`] thread.
//!
//! Events are delivered in FIFO order and each event reaches the handler at
//! most once. A full bus makes `post` block for at most its timeout and then
//! fail with [`FeedError::Backpressure`]; nothing is dropped silently. A
//! stopping [`BusWorker`] delivers whatever is still queued before it exits.
use std::fmt::Debug;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crossbeam_channel as xch;

use crate::error::FeedError;

/// Whether a handler acted on an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Handled,
    /// No transition or action matched; the event is discarded.
    Ignored,
}

/// Consumer side of a bus.
pub trait EventHandler<E>: Send {
    fn handle(&mut self, event: E) -> Outcome;
}

impl<E, H: EventHandler<E> + ?Sized> EventHandler<E> for Box<H> {
    fn handle(&mut self, event: E) -> Outcome {
        (**self).handle(event)
    }
}

pub struct EventBus<E> {
    name: &'static str,
    capacity: usize,
    tx: xch::Sender<E>,
    rx: xch::Receiver<E>,
}

/// Producer handle for an [`EventBus`].
pub struct Poster<E> {
    name: &'static str,
    capacity: usize,
    tx: xch::Sender<E>,
}

impl<E> Clone for Poster<E> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            capacity: self.capacity,
            tx: self.tx.clone(),
        }
    }
}

impl<E> Poster<E> {
    /// Enqueue `event`, waiting at most `timeout` for space.
    pub fn post(&self, event: E, timeout: Duration) -> Result<(), FeedError> {
        match self.tx.send_timeout(event, timeout) {
            Ok(()) => Ok(()),
            Err(xch::SendTimeoutError::Timeout(_)) => Err(FeedError::Backpressure {
                bus: self.name,
                capacity: self.capacity,
            }),
            Err(xch::SendTimeoutError::Disconnected(_)) => {
                Err(FeedError::Disconnected { bus: self.name })
            }
        }
    }

    pub fn bus_name(&self) -> &'static str {
        self.name
    }
}

impl<E: Debug> EventBus<E> {
    /// Create a bus holding at most `capacity` pending events.
    pub fn new(name: &'static str, capacity: usize) -> Result<Self, FeedError> {
        if capacity == 0 {
            return Err(FeedError::Config(format!(
                "{name} bus capacity must be >= 1"
            )));
        }
        let (tx, rx) = xch::bounded(capacity);
        Ok(Self {
            name,
            capacity,
            tx,
            rx,
        })
    }

    pub fn poster(&self) -> Poster<E> {
        Poster {
            name: self.name,
            capacity: self.capacity,
            tx: self.tx.clone(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of events waiting for the consumer.
    pub fn pending(&self) -> usize {
        self.rx.len()
    }

    /// Block up to `max_wait` for the first event, then dispatch it and every
    /// event already queued at that point without further blocking.
    ///
    /// Returns the number of events dispatched (0 when the wait elapsed).
    pub fn run_once(&self, max_wait: Duration, handler: &mut dyn EventHandler<E>) -> usize {
        let first = match self.rx.recv_timeout(max_wait) {
            Ok(event) => event,
            Err(_) => return 0,
        };
        let queued = self.rx.len();
        self.dispatch(first, handler);
        let mut n = 1;
        for event in self.rx.try_iter().take(queued) {
            self.dispatch(event, handler);
            n += 1;
        }
        n
    }

    fn dispatch(&self, event: E, handler: &mut dyn EventHandler<E>) {
        tracing::trace!(bus = self.name, ?event, "dispatch");
        if handler.handle(event) == Outcome::Ignored {
            tracing::debug!(bus = self.name, "event ignored");
        }
    }
}

/// Consumer loop timing for a [`BusWorker`].
#[derive(Debug, Clone, Copy)]
pub struct WorkerTiming {
    /// Longest block inside one `run_once`.
    pub wait: Duration,
    /// Pause between iterations.
    pub idle: Duration,
}

/// Thread that drains one bus into its handler until dropped.
pub struct BusWorker {
    name: &'static str,
    shutdown: Arc<AtomicBool>,
    join_handle: Option<std::thread::JoinHandle<()>>,
}

impl BusWorker {
    pub fn spawn<E, H>(bus: EventBus<E>, mut handler: H, timing: WorkerTiming) -> Self
    where
        E: Debug + Send + 'static,
        H: EventHandler<E> + 'static,
    {
        let name = bus.name();
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = shutdown.clone();

        let join_handle = std::thread::spawn(move || {
            loop {
                if shutdown_clone.load(Ordering::Relaxed) {
                    tracing::debug!(bus = name, "bus worker received shutdown signal");
                    break;
                }
                bus.run_once(timing.wait, &mut handler);
                if shutdown_clone.load(Ordering::Relaxed) {
                    break;
                }
                std::thread::sleep(timing.idle);
            }
            let drained = bus.run_once(Duration::ZERO, &mut handler);
            if drained > 0 {
                tracing::debug!(bus = name, drained, "delivered queued events before exit");
            }
            tracing::trace!(bus = name, "bus worker exiting cleanly");
        });

        Self {
            name,
            shutdown,
            join_handle: Some(join_handle),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl Drop for BusWorker {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        // Exits after the current run_once, i.e. within `timing.wait`.
        if let Some(handle) = self.join_handle.take() {
            match handle.join() {
                Ok(()) => tracing::trace!(bus = self.name, "bus worker joined"),
                Err(e) => tracing::warn!(bus = self.name, ?e, "bus worker panicked"),
            }
        }
    }
}
