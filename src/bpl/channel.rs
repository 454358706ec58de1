// Byte channel to the arm: a serial port in production, a script in tests

use serialport::{DataBits, Parity, SerialPort, StopBits};
use std::io::{self, Read, Write};
use std::time::Duration;
use tracing::info;

use super::protocol::Result;

/// Non-blocking byte transport
pub trait Channel {
    /// Return whatever bytes are pending, possibly none
    fn read(&mut self) -> io::Result<Vec<u8>>;

    /// Write all bytes or fail
    fn write(&mut self, bytes: &[u8]) -> io::Result<()>;
}

/// Serial link to the arm (8N1, no flow control)
pub struct SerialChannel {
    port: Box<dyn SerialPort>,
    name: String,
}

impl SerialChannel {
    /// Open a serial port for non-blocking use
    pub fn open(port_name: &str, baudrate: u32) -> Result<Self> {
        info!("Opening serial port {} at {} baud", port_name, baudrate);
        let port = serialport::new(port_name, baudrate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .timeout(Duration::ZERO)
            .open()?;

        Ok(Self {
            port,
            name: port_name.to_string(),
        })
    }
}

impl Channel for SerialChannel {
    fn read(&mut self) -> io::Result<Vec<u8>> {
        let available = self.port.bytes_to_read().map_err(io::Error::from)? as usize;
        if available == 0 {
            return Ok(Vec::new());
        }

        let mut buf = vec![0u8; available];
        let n = self.port.read(&mut buf)?;
        buf.truncate(n);
        Ok(buf)
    }

    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.port.write_all(bytes)?;
        self.port.flush()
    }
}

impl Drop for SerialChannel {
    fn drop(&mut self) {
        // The port handle is released right after this
        info!("Closing serial port {}", self.name);
    }
}
