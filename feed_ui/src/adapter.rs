//! UI bus handler: applies `UiEvent`s to the screen model and redraws the
//! panel when something visible changed.
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use feed_core::{EventHandler, Outcome, UiEvent};

use crate::panel::Panel;
use crate::screen::ScreenModel;

pub struct DisplayAdapter<P: Panel> {
    screen: ScreenModel,
    panel: P,
    toggle: Arc<AtomicBool>,
    redraws: usize,
}

/// Requests a unit toggle from another thread; applied on the next event.
#[derive(Clone)]
pub struct UnitToggle(Arc<AtomicBool>);

impl UnitToggle {
    pub fn request(&self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

impl<P: Panel> DisplayAdapter<P> {
    pub fn new(screen: ScreenModel, panel: P) -> Self {
        Self {
            screen,
            panel,
            toggle: Arc::new(AtomicBool::new(false)),
            redraws: 0,
        }
    }

    pub fn unit_toggle(&self) -> UnitToggle {
        UnitToggle(self.toggle.clone())
    }

    pub fn toggle_units(&mut self) {
        let next = self.screen.unit().toggled();
        tracing::info!(unit = next.label(), "display units changed");
        self.screen.set_unit(next);
    }

    pub fn screen(&self) -> &ScreenModel {
        &self.screen
    }

    pub fn panel(&self) -> &P {
        &self.panel
    }

    pub fn redraws(&self) -> usize {
        self.redraws
    }

    /// Draw if dirty. Panel errors are logged; the display never fails the bus.
    pub fn refresh(&mut self) {
        if let Some(frame) = self.screen.take_frame() {
            match self.panel.draw(&frame) {
                Ok(()) => self.redraws += 1,
                Err(e) => tracing::warn!(error = %e, "display draw failed"),
            }
        }
    }
}

impl<P: Panel> EventHandler<UiEvent> for DisplayAdapter<P> {
    fn handle(&mut self, event: UiEvent) -> Outcome {
        if self.toggle.swap(false, Ordering::Relaxed) {
            self.toggle_units();
        }
        tracing::trace!(?event, "display event");
        self.screen.apply(event);
        self.refresh();
        Outcome::Handled
    }
}
