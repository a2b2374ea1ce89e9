//! Button debouncing, independent of the GPIO backend.
//!
//! A level change is accepted once it has been observed on `n` consecutive
//! polls. Buttons start released.

/// Physical feed buttons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ButtonId {
    Left,
    Right,
    Rapid,
}

/// Accepted transition of one button.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Pressed,
    Released,
}

#[derive(Debug, Clone)]
pub struct Debouncer {
    n: u8,
    pressed: bool,
    count: u8,
}

impl Debouncer {
    pub fn new(n: u8) -> Self {
        Self {
            n: n.max(1),
            pressed: false,
            count: 0,
        }
    }

    /// Feed one poll; returns an edge when the new level has been stable for `n` polls.
    pub fn update(&mut self, pressed_now: bool) -> Option<Edge> {
        if pressed_now == self.pressed {
            self.count = 0;
            return None;
        }
        self.count = self.count.saturating_add(1);
        if self.count < self.n {
            return None;
        }
        self.count = 0;
        self.pressed = pressed_now;
        Some(if pressed_now {
            Edge::Pressed
        } else {
            Edge::Released
        })
    }

    pub fn is_pressed(&self) -> bool {
        self.pressed
    }
}
