//! GPIO button poller (Raspberry Pi via rppal).
//!
//! One thread polls the left/right/rapid inputs, debounces them and reports
//! accepted edges through a callback. The thread is stopped and joined when
//! the poller is dropped.
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use rppal::gpio::{Gpio, InputPin};
use tracing::{debug, trace, warn};

use crate::debounce::{ButtonId, Debouncer, Edge};
use crate::error::{HwError, Result};

#[derive(Debug, Clone, Copy)]
pub struct ButtonPins {
    pub left: u8,
    pub right: u8,
    pub rapid: u8,
}

pub struct ButtonPoller {
    shutdown: Arc<AtomicBool>,
    join_handle: Option<std::thread::JoinHandle<()>>,
}

fn open_input(gpio: &Gpio, pin: u8) -> Result<InputPin> {
    gpio.get(pin)
        .map(|p| p.into_input_pullup())
        .map_err(|e| HwError::Gpio(format!("open button pin {pin}: {e}")))
}

impl ButtonPoller {
    pub fn spawn<F>(
        pins: ButtonPins,
        active_low: bool,
        debounce_n: u8,
        poll: Duration,
        mut on_edge: F,
    ) -> Result<Self>
    where
        F: FnMut(ButtonId, Edge) + Send + 'static,
    {
        let gpio = Gpio::new().map_err(|e| HwError::Gpio(e.to_string()))?;
        let mut inputs = [
            (ButtonId::Left, open_input(&gpio, pins.left)?, Debouncer::new(debounce_n)),
            (ButtonId::Right, open_input(&gpio, pins.right)?, Debouncer::new(debounce_n)),
            (ButtonId::Rapid, open_input(&gpio, pins.rapid)?, Debouncer::new(debounce_n)),
        ];

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = shutdown.clone();

        let join_handle = std::thread::spawn(move || {
            loop {
                if shutdown_clone.load(Ordering::Relaxed) {
                    debug!("button poller received shutdown signal");
                    break;
                }
                for (id, pin, debouncer) in inputs.iter_mut() {
                    let pressed = if active_low { pin.is_low() } else { pin.is_high() };
                    if let Some(edge) = debouncer.update(pressed) {
                        trace!(button = ?id, ?edge, "button edge");
                        on_edge(*id, edge);
                    }
                }
                std::thread::sleep(poll);
            }
            trace!("button poller exiting cleanly");
        });

        Ok(Self {
            shutdown,
            join_handle: Some(join_handle),
        })
    }
}

impl Drop for ButtonPoller {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.join_handle.take()
            && let Err(e) = handle.join()
        {
            warn!(?e, "button poller panicked during shutdown");
        }
    }
}
