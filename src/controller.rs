//! Top-level lifecycle wiring: owns the configuration, the shared engine,
//! the connection flag, and (once connected) the running Link Loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::info;

use crate::channel::{ByteChannel, SerialByteChannel};
use crate::config::Config;
use crate::facade::RequestFacade;
use crate::link::LinkLoop;
use crate::protocol::Engine;

/// Owns the full driver stack: engine, connection state, and (when
/// connected) the Link Loop thread. `connect`/`disconnect` mirror the
/// Python source's ability to construct a facade that starts out
/// disconnected and short-circuits every operation until a device shows up.
pub struct VendingMachineController {
    config: Config,
    engine: Arc<Mutex<Engine>>,
    connected: Arc<AtomicBool>,
    link: Option<LinkLoop>,
}

impl VendingMachineController {
    /// Build a controller in the disconnected state. Call [`Self::connect`]
    /// to open the serial port and start the Link Loop.
    pub fn new(config: Config) -> Self {
        let engine = Engine::new(
            Duration::from_millis(config.vmc_command_timeout_ms),
            config.vmc_max_retries,
        );
        Self {
            config,
            engine: Arc::new(Mutex::new(engine)),
            connected: Arc::new(AtomicBool::new(false)),
            link: None,
        }
    }

    /// Open the configured serial port and start the Link Loop thread.
    /// Idempotent: calling `connect` while already connected disconnects
    /// first.
    pub fn connect(&mut self) -> std::io::Result<()> {
        if self.link.is_some() {
            self.disconnect();
        }
        let channel = SerialByteChannel::open(
            &self.config.serial_port,
            self.config.serial_baudrate,
            Duration::from_millis(self.config.serial_timeout_ms),
        )?;
        self.connect_with_channel(Box::new(channel));
        Ok(())
    }

    /// Start the Link Loop over an already-constructed channel. Exposed
    /// separately so tests can connect over an in-memory [`crate::channel::ChannelPair`].
    pub fn connect_with_channel(&mut self, channel: Box<dyn ByteChannel>) {
        let link = LinkLoop::spawn(channel, Arc::clone(&self.engine));
        self.link = Some(link);
        self.connected.store(true, Ordering::Release);
        info!("VMC controller connected on {}", self.config.serial_port);
    }

    /// Stop the Link Loop and resolve any outstanding pending transactions
    /// with a shutdown failure.
    pub fn disconnect(&mut self) {
        self.connected.store(false, Ordering::Release);
        if let Some(link) = self.link.take() {
            link.stop();
        }
        self.engine.lock().expect("engine mutex poisoned").shut_down();
        info!("VMC controller disconnected");
    }

    /// Build a [`RequestFacade`] sharing this controller's engine and
    /// connection state. Cheap; callers may hold many of these.
    pub fn facade(&self) -> RequestFacade {
        RequestFacade::new(Arc::clone(&self.engine), Arc::clone(&self.connected), self.config.serial_port.clone())
    }

    /// `true` if the Link Loop is currently running.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }
}

impl Drop for VendingMachineController {
    fn drop(&mut self) {
        if self.link.is_some() {
            self.disconnect();
        }
    }
}
