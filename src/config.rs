// Serial link, device ids, joint limits and timing
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

// Serial port for the arm
pub const SERIAL_PORT: &str = "/dev/ttyUSB0";
pub const BAUD_RATE: u32 = 115_200;

// Device ids on the bus
pub const WRIST_DEVICE_ID: u8 = 0x02;
pub const GRIPPER_DEVICE_ID: u8 = 0x01;

// How long to wait for a position reply
pub const REQUEST_TIMEOUT: Duration = Duration::from_millis(50);

// Wrist joint limits (device units, radians)
pub const WRIST_LOWER_LIMIT: f32 = 0.02;
pub const WRIST_UPPER_LIMIT: f32 = 5.6;

// Velocity settings
pub const INITIAL_WRIST_VELOCITY: f64 = 1.0;
pub const VELOCITY_STEP: f64 = 0.1;
pub const GRIP_VELOCITY: f64 = 1.0;

// Delay after each command, bounds the command rate
pub const PACING_DELAY: Duration = Duration::from_millis(10);

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Runtime settings, loadable from JSON. Missing fields keep their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TeleopConfig {
    pub port: String,
    pub baud_rate: u32,
    pub wrist_id: u8,
    pub gripper_id: u8,
    pub request_timeout_ms: u64,
}

impl Default for TeleopConfig {
    fn default() -> Self {
        Self {
            port: SERIAL_PORT.to_string(),
            baud_rate: BAUD_RATE,
            wrist_id: WRIST_DEVICE_ID,
            gripper_id: GRIPPER_DEVICE_ID,
            request_timeout_ms: REQUEST_TIMEOUT.as_millis() as u64,
        }
    }
}

impl TeleopConfig {
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Keyboard teleop for the wrist and gripper
#[derive(Debug, Default, Parser)]
#[command(version, about)]
pub struct Args {
    /// JSON config file; flags below override it
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Serial port
    #[arg(short, long)]
    pub port: Option<String>,

    /// Baud rate
    #[arg(short, long)]
    pub baud: Option<u32>,

    /// Wrist device id
    #[arg(long)]
    pub wrist_id: Option<u8>,

    /// Gripper device id
    #[arg(long)]
    pub gripper_id: Option<u8>,

    /// Position request timeout in milliseconds
    #[arg(long)]
    pub timeout_ms: Option<u64>,
}

impl Args {
    /// Resolve the effective config: defaults, then the file, then flags
    pub fn resolve(&self) -> Result<TeleopConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => TeleopConfig::load_from_file(path)?,
            None => TeleopConfig::default(),
        };

        if let Some(port) = &self.port {
            config.port = port.clone();
        }
        if let Some(baud) = self.baud {
            config.baud_rate = baud;
        }
        if let Some(id) = self.wrist_id {
            config.wrist_id = id;
        }
        if let Some(id) = self.gripper_id {
            config.gripper_id = id;
        }
        if let Some(ms) = self.timeout_ms {
            config.request_timeout_ms = ms;
        }
        Ok(config)
    }
}
