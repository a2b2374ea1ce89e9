//! Event and state vocabulary shared by the buses, the state machine and the display.

/// Motion state of the axis, owned by the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MotionState {
    #[default]
    Stopped,
    MovingLeft,
    MovingRight,
    StoppingLeft,
    StoppingRight,
}

impl MotionState {
    pub fn is_moving(self) -> bool {
        matches!(self, MotionState::MovingLeft | MotionState::MovingRight)
    }

    pub fn is_stopping(self) -> bool {
        matches!(self, MotionState::StoppingLeft | MotionState::StoppingRight)
    }
}

/// Which preset the axis runs at; orthogonal to [`MotionState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpeedMode {
    #[default]
    Normal,
    Rapid,
}

/// Input to the state machine. Speeds are in steps per second.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandEvent {
    LeftPressed,
    LeftReleased,
    RightPressed,
    RightReleased,
    RapidPressed,
    RapidReleased,
    UpdateNormalSpeed(u32),
    UpdateRapidSpeed(u32),
    /// Posted by the stop detector once the axis is at rest.
    SetStopped,
}

/// Output of the state machine, rendered by the display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiEvent {
    /// Active target speed in steps per second.
    SetSpeed(u32),
    MoveLeft,
    MoveRight,
    Stopping,
    Stopped,
    RapidSpeed,
    NormalSpeed,
}
