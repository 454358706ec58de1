// Message types between the operator and the teleop loop

use std::fmt;

use crate::keyboard::Key;

/// Operator intent decoded from a key-event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    IncreaseVelocity,
    DecreaseVelocity,
    RotateClockwise,
    RotateAntiClockwise,
    Grip,
    Release,
    Quit,
    Interrupt,
}

impl Command {
    /// Map a key to its command. Unbound keys map to nothing.
    pub fn from_key(key: Key) -> Option<Self> {
        let command = match key {
            Key::Up => Command::IncreaseVelocity,
            Key::Down => Command::DecreaseVelocity,
            Key::Right => Command::RotateClockwise,
            Key::Left => Command::RotateAntiClockwise,
            Key::Char('g' | 'G') => Command::Grip,
            Key::Char('r' | 'R') => Command::Release,
            Key::Char('q' | 'Q') => Command::Quit,
            Key::Interrupt => Command::Interrupt,
            Key::Char(_) | Key::Other => return None,
        };
        Some(command)
    }
}

/// Outcome of one command, shown to the operator as a status line
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Status {
    VelocitySet(f64),
    AlreadyZero,
    VelocityZero,
    AtMinLimit,
    AtMaxLimit,
    /// The position query timed out or returned garbage
    PositionUnknown,
    RotatingClockwise(f64),
    RotatingAntiClockwise(f64),
    Gripping,
    Releasing,
    Exiting,
    Interrupted,
}

impl Status {
    /// True when the loop should stop after this status
    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::Exiting | Status::Interrupted)
    }

    /// True when the command changed something, so the loop paces itself
    pub fn acted(&self) -> bool {
        matches!(
            self,
            Status::VelocitySet(_)
                | Status::RotatingClockwise(_)
                | Status::RotatingAntiClockwise(_)
                | Status::Gripping
                | Status::Releasing
        )
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::VelocitySet(v) => write!(f, "Velocity set to: {:?}", v),
            Status::AlreadyZero => write!(f, "Velocity is already set to zero"),
            Status::VelocityZero => write!(f, "Velocity is set to zero, increase velocity first"),
            Status::AtMinLimit => {
                write!(f, "Wrist joint is at min joint limit, cannot rotate further")
            }
            Status::AtMaxLimit => {
                write!(f, "Wrist joint is at max joint limit, cannot rotate further")
            }
            Status::PositionUnknown => write!(f, "Could not verify wrist position, not rotating"),
            Status::RotatingClockwise(v) => {
                write!(f, "Rotating Wrist clockwise with Velocity: {:?}", v)
            }
            Status::RotatingAntiClockwise(v) => {
                write!(f, "Rotating Wrist anti-clockwise with Velocity: {:?}", v)
            }
            Status::Gripping => write!(f, "Gripping..."),
            Status::Releasing => write!(f, "Releasing grip..."),
            Status::Exiting => write!(f, "Exiting..."),
            Status::Interrupted => write!(f, "Interrupted, exiting..."),
        }
    }
}
