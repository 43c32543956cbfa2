//! Byte-stream transports a [`LinkSession`](super::session::LinkSession) can drive.

use std::io::{self, Read, Write};
use std::time::Duration;

use anyhow::{Context, Result};
use log::{info, trace};
use serialport::{ClearBuffer, SerialPort};

/// The three operations the acquisition protocol needs from a link.
///
/// Kept synchronous and object-safe so tests can substitute an in-process
/// stub for the serial port.
pub trait Transport {
    /// Drop whatever is waiting in the input buffer.
    fn clear_input(&mut self) -> io::Result<()>;

    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Block for at most `wait` until data arrives and return up to `max`
    /// bytes. An empty vector means nothing arrived in time.
    fn read_available(&mut self, max: usize, wait: Duration) -> io::Result<Vec<u8>>;
}

// ---------------------------------------------------------------------------
// SerialTransport – the real USB-serial link
// ---------------------------------------------------------------------------

/// Reads never block for less than this, so a nearly expired deadline still
/// gets one real read.
const MIN_READ_WAIT: Duration = Duration::from_millis(1);

pub struct SerialTransport {
    port: Box<dyn SerialPort>,
    name: String,
}

impl SerialTransport {
    /// Open `path` (e.g. `/dev/ttyACM0`, `COM3`) at `baud_rate`.
    pub fn open(path: &str, baud_rate: u32) -> Result<Self> {
        let port = serialport::new(path, baud_rate)
            .timeout(Duration::from_millis(100))
            .open()
            .with_context(|| format!("Failed to open serial port '{path}'"))?;
        info!("Connected to {path} at {baud_rate} baud");
        Ok(SerialTransport {
            port,
            name: path.to_string(),
        })
    }
}

impl Transport for SerialTransport {
    fn clear_input(&mut self) -> io::Result<()> {
        self.port.clear(ClearBuffer::Input).map_err(io::Error::from)
    }

    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        trace!("{} <- {:02X?}", self.name, bytes);
        Write::write_all(&mut self.port, bytes)?;
        self.port.flush()
    }

    fn read_available(&mut self, max: usize, wait: Duration) -> io::Result<Vec<u8>> {
        self.port
            .set_timeout(wait.max(MIN_READ_WAIT))
            .map_err(io::Error::from)?;
        let mut buf = vec![0u8; max];
        match self.port.read(&mut buf) {
            Ok(n) => {
                buf.truncate(n);
                Ok(buf)
            }
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }
}
