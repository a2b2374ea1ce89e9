#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Display side of the power feed: consumes `UiEvent`s from the UI bus,
//! converts step rates into feed per minute and redraws a panel only when the
//! visible content changed.

pub mod adapter;
pub mod panel;
pub mod screen;
pub mod units;

pub use adapter::{DisplayAdapter, UnitToggle};
pub use panel::{ConsolePanel, Panel};
pub use screen::{Frame, Indicator, ScreenModel};
pub use units::{MM_PER_INCH, Mechanics, SpeedUnit};
