// Keyboard teleop state machine for the wrist and gripper
//
// Wrist rotation is open-loop velocity control, but every rotation is
// preceded by a position query so the wrist is never driven past its limits.

use std::io::{self, Write};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::bpl::{BplBus, BplError, Channel, Clock, SystemClock};
use crate::config::{
    ConfigError, TeleopConfig, GRIP_VELOCITY, INITIAL_WRIST_VELOCITY, PACING_DELAY,
    VELOCITY_STEP, WRIST_LOWER_LIMIT, WRIST_UPPER_LIMIT,
};
use crate::keyboard::KeySource;
use crate::messages::{Command, Status};

/// Printed once when a session starts
pub const INSTRUCTIONS: &[&str] = &[
    "Control the arm with keys:",
    "Arrow Up: Increase wrist velocity",
    "Arrow Down: Decrease wrist velocity",
    "Arrow Left: Rotate wrist anti-clockwise",
    "Arrow Right: Rotate wrist clockwise",
    "'G': Grip",
    "'R': Release",
    "'Q': Quit",
];

#[derive(Debug, thiserror::Error)]
pub enum TeleopError {
    #[error("Bus error: {0}")]
    Bus(#[from] BplError),

    #[error("Keyboard input error: {0}")]
    Input(io::Error),

    #[error("Status output error: {0}")]
    Output(io::Error),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Teleop task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Velocity settings, owned by the loop for the lifetime of the process
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerState {
    /// Wrist speed magnitude, never negative
    pub wrist_velocity: f64,
    pub velocity_step: f64,
    pub grip_velocity: f64,
}

impl Default for ControllerState {
    fn default() -> Self {
        Self {
            wrist_velocity: INITIAL_WRIST_VELOCITY,
            velocity_step: VELOCITY_STEP,
            grip_velocity: GRIP_VELOCITY,
        }
    }
}

impl ControllerState {
    fn increase(&mut self) -> f64 {
        self.wrist_velocity = round2(self.wrist_velocity + self.velocity_step);
        self.wrist_velocity
    }

    /// `None` when already at zero
    fn decrease(&mut self) -> Option<f64> {
        if self.wrist_velocity == 0.0 {
            return None;
        }
        let v = round2(self.wrist_velocity - self.velocity_step);
        self.wrist_velocity = if v <= 0.0 { 0.0 } else { v };
        Some(self.wrist_velocity)
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Rotation {
    Clockwise,
    AntiClockwise,
}

/// The command loop: bus, velocity state and device addressing
pub struct Teleop<C: Channel, K: Clock = SystemClock> {
    bus: BplBus<C, K>,
    state: ControllerState,
    wrist_id: u8,
    gripper_id: u8,
    request_timeout: Duration,
}

impl<C: Channel, K: Clock> Teleop<C, K> {
    pub fn new(bus: BplBus<C, K>, config: &TeleopConfig) -> Self {
        Self {
            bus,
            state: ControllerState::default(),
            wrist_id: config.wrist_id,
            gripper_id: config.gripper_id,
            request_timeout: config.request_timeout(),
        }
    }

    pub fn state(&self) -> &ControllerState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut ControllerState {
        &mut self.state
    }

    /// Apply one command. Only fatal channel errors are returned.
    pub fn handle(&mut self, command: Command) -> Result<Status, BplError> {
        let status = match command {
            Command::IncreaseVelocity => Status::VelocitySet(self.state.increase()),
            Command::DecreaseVelocity => match self.state.decrease() {
                Some(v) => Status::VelocitySet(v),
                None => Status::AlreadyZero,
            },
            Command::RotateClockwise => self.rotate(Rotation::Clockwise)?,
            Command::RotateAntiClockwise => self.rotate(Rotation::AntiClockwise)?,
            Command::Grip => {
                self.bus
                    .send_velocity(self.gripper_id, -self.state.grip_velocity as f32)?;
                Status::Gripping
            }
            Command::Release => {
                self.bus
                    .send_velocity(self.gripper_id, self.state.grip_velocity as f32)?;
                Status::Releasing
            }
            Command::Quit => Status::Exiting,
            Command::Interrupt => Status::Interrupted,
        };
        debug!("{:?} -> {:?}", command, status);
        Ok(status)
    }

    fn rotate(&mut self, rotation: Rotation) -> Result<Status, BplError> {
        let velocity = self.state.wrist_velocity;
        if velocity == 0.0 {
            return Ok(Status::VelocityZero);
        }

        let position = match self.bus.request_position(self.wrist_id, self.request_timeout) {
            Ok(Some(position)) => position,
            Ok(None) => {
                warn!("Wrist position request timed out, refusing to rotate");
                return Ok(Status::PositionUnknown);
            }
            Err(BplError::MalformedPayload { len }) => {
                warn!("Wrist sent a {} byte position, refusing to rotate", len);
                return Ok(Status::PositionUnknown);
            }
            Err(e) => return Err(e),
        };

        match rotation {
            Rotation::Clockwise if position <= WRIST_LOWER_LIMIT => {
                warn!("Wrist at {} (min limit {})", position, WRIST_LOWER_LIMIT);
                Ok(Status::AtMinLimit)
            }
            Rotation::AntiClockwise if position >= WRIST_UPPER_LIMIT => {
                warn!("Wrist at {} (max limit {})", position, WRIST_UPPER_LIMIT);
                Ok(Status::AtMaxLimit)
            }
            Rotation::Clockwise => {
                self.bus.send_velocity(self.wrist_id, -velocity as f32)?;
                Ok(Status::RotatingClockwise(velocity))
            }
            Rotation::AntiClockwise => {
                self.bus.send_velocity(self.wrist_id, velocity as f32)?;
                Ok(Status::RotatingAntiClockwise(velocity))
            }
        }
    }

    fn pace(&self) {
        self.bus.clock().sleep(PACING_DELAY);
    }
}

/// Run the command loop until quit, interrupt, end of input or a fatal error.
///
/// Takes ownership of `teleop`, so the channel is released exactly once when
/// this returns, whichever way it returns.
pub fn run_session<C, K, S, W>(
    mut teleop: Teleop<C, K>,
    keys: &mut S,
    out: &mut W,
) -> Result<Status, TeleopError>
where
    C: Channel,
    K: Clock,
    S: KeySource + ?Sized,
    W: Write + ?Sized,
{
    let eol = keys.line_ending();
    for line in INSTRUCTIONS {
        write!(out, "{}{}", line, eol).map_err(TeleopError::Output)?;
    }
    out.flush().map_err(TeleopError::Output)?;

    info!(
        "Session started: wrist 0x{:02X}, gripper 0x{:02X}",
        teleop.wrist_id, teleop.gripper_id
    );

    loop {
        let Some(key) = keys.next_key().map_err(TeleopError::Input)? else {
            info!("Key input closed, ending session");
            return Ok(Status::Exiting);
        };
        let Some(command) = Command::from_key(key) else {
            continue;
        };

        let status = teleop.handle(command)?;
        write!(out, "{}{}", status, eol).map_err(TeleopError::Output)?;
        out.flush().map_err(TeleopError::Output)?;

        if status.is_terminal() {
            info!("Session ended: {}", status);
            return Ok(status);
        }
        if status.acted() {
            teleop.pace();
        }
    }
}
