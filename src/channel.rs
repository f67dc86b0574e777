//! The abstract byte channel the core depends on, and two implementations:
//! a real serial port and an in-memory loopback pair for tests.

use std::io::{self, Read, Write};
use std::sync::mpsc;
use std::time::Duration;

use log::warn;

/// Minimal transport the Link Loop depends on. The core never imports
/// `serialport` directly outside [`SerialByteChannel`] -- any equivalent
/// reliable byte stream can implement this trait.
pub trait ByteChannel: Send {
    /// Read whatever bytes are currently available, without blocking for
    /// more than the channel's configured read timeout. Returns an empty
    /// vector if nothing is available.
    fn read_available(&mut self) -> io::Result<Vec<u8>>;

    /// Write `bytes` to the channel in full.
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// `true` if the channel believes it is still open.
    fn is_open(&self) -> bool;
}

/// A [`ByteChannel`] backed by a real serial port, configured 57600 8N1
/// with a short read timeout so `read_available` never blocks the Link
/// Loop for long.
pub struct SerialByteChannel {
    port: Box<dyn serialport::SerialPort>,
    open: bool,
}

impl SerialByteChannel {
    /// Open `path` at `baud_rate` with the given read timeout.
    pub fn open(path: &str, baud_rate: u32, timeout: Duration) -> io::Result<Self> {
        let port = serialport::new(path, baud_rate)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .flow_control(serialport::FlowControl::None)
            .timeout(timeout)
            .open()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        Ok(Self { port, open: true })
    }
}

impl ByteChannel for SerialByteChannel {
    fn read_available(&mut self) -> io::Result<Vec<u8>> {
        let available = self.port.bytes_to_read().unwrap_or(0) as usize;
        if available == 0 {
            return Ok(Vec::new());
        }
        let mut buf = vec![0u8; available];
        match self.port.read(&mut buf) {
            Ok(n) => {
                buf.truncate(n);
                Ok(buf)
            }
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(Vec::new()),
            Err(e) => {
                self.open = false;
                Err(e)
            }
        }
    }

    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        match Write::write_all(&mut self.port, bytes) {
            Ok(()) => Ok(()),
            Err(e) => {
                self.open = false;
                Err(e)
            }
        }
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

/// One half of an in-memory loopback pair. Bytes written on one end
/// appear on the other end's `read_available`. Used exclusively by tests
/// to drive the Link Loop and Protocol Engine without real hardware.
pub struct ChannelPair {
    tx: mpsc::Sender<u8>,
    rx: mpsc::Receiver<u8>,
    open: bool,
}

impl ChannelPair {
    /// Construct both ends of a loopback pair.
    pub fn new_pair() -> (Self, Self) {
        let (tx_a, rx_a) = mpsc::channel();
        let (tx_b, rx_b) = mpsc::channel();
        (
            Self { tx: tx_a, rx: rx_b, open: true },
            Self { tx: tx_b, rx: rx_a, open: true },
        )
    }

    /// Forcibly close this end, as if the underlying device vanished.
    pub fn close(&mut self) {
        self.open = false;
    }
}

impl ByteChannel for ChannelPair {
    fn read_available(&mut self) -> io::Result<Vec<u8>> {
        if !self.open {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "channel closed"));
        }
        let mut bytes = Vec::new();
        while let Ok(b) = self.rx.try_recv() {
            bytes.push(b);
        }
        Ok(bytes)
    }

    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        if !self.open {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "channel closed"));
        }
        for &b in bytes {
            if self.tx.send(b).is_err() {
                self.open = false;
                warn!("loopback peer dropped, marking channel closed");
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "peer dropped"));
            }
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }
}
