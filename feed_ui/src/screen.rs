//! What the display currently shows, and whether it needs a redraw.
use feed_core::{SpeedMode, UiEvent};

use crate::units::{Mechanics, SpeedUnit};

/// Motion indication on the display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Indicator {
    #[default]
    Idle,
    Left,
    Right,
    Stopping,
}

impl Indicator {
    pub fn glyph(self) -> &'static str {
        match self {
            Indicator::Idle => "STOP",
            Indicator::Left => "<<<<",
            Indicator::Right => ">>>>",
            Indicator::Stopping => "....",
        }
    }
}

/// One rendered frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub feed: f32,
    pub unit: SpeedUnit,
    pub indicator: Indicator,
    pub mode: SpeedMode,
}

impl std::fmt::Display for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mode = match self.mode {
            SpeedMode::Normal => "NORM",
            SpeedMode::Rapid => "RAPID",
        };
        let precision = match self.unit {
            SpeedUnit::Mmpm => 0,
            SpeedUnit::Ipm => 1,
        };
        write!(
            f,
            "[{}] {:>8.*} {} {}",
            self.indicator.glyph(),
            precision,
            self.feed,
            self.unit.label(),
            mode
        )
    }
}

#[derive(Debug, Clone)]
pub struct ScreenModel {
    mechanics: Mechanics,
    speed: u32,
    indicator: Indicator,
    mode: SpeedMode,
    unit: SpeedUnit,
    shown: Option<(u32, Indicator, SpeedMode, SpeedUnit)>,
}

impl ScreenModel {
    pub fn new(mechanics: Mechanics, unit: SpeedUnit) -> Self {
        Self {
            mechanics,
            speed: 0,
            indicator: Indicator::Idle,
            mode: SpeedMode::Normal,
            unit,
            shown: None,
        }
    }

    pub fn apply(&mut self, event: UiEvent) {
        match event {
            UiEvent::SetSpeed(sps) => self.speed = sps,
            UiEvent::MoveLeft => self.indicator = Indicator::Left,
            UiEvent::MoveRight => self.indicator = Indicator::Right,
            UiEvent::Stopping => self.indicator = Indicator::Stopping,
            UiEvent::Stopped => self.indicator = Indicator::Idle,
            UiEvent::RapidSpeed => self.mode = SpeedMode::Rapid,
            UiEvent::NormalSpeed => self.mode = SpeedMode::Normal,
        }
    }

    pub fn set_unit(&mut self, unit: SpeedUnit) {
        self.unit = unit;
    }

    pub fn unit(&self) -> SpeedUnit {
        self.unit
    }

    fn current(&self) -> (u32, Indicator, SpeedMode, SpeedUnit) {
        (self.speed, self.indicator, self.mode, self.unit)
    }

    pub fn is_dirty(&self) -> bool {
        self.shown != Some(self.current())
    }

    pub fn frame(&self) -> Frame {
        Frame {
            feed: self.mechanics.per_minute(self.speed, self.unit),
            unit: self.unit,
            indicator: self.indicator,
            mode: self.mode,
        }
    }

    /// Frame to draw if anything changed since the last one taken.
    pub fn take_frame(&mut self) -> Option<Frame> {
        if !self.is_dirty() {
            return None;
        }
        self.shown = Some(self.current());
        Some(self.frame())
    }
}
