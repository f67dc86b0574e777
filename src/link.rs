//! The Link Loop: a dedicated blocking OS thread that owns the byte
//! channel, decodes frames, dispatches them to the Protocol Engine, and
//! writes back whatever the engine produces on POLL.
//!
//! Runs on `std::thread`, not a tokio task, per the half-duplex link being
//! inherently synchronous: the thread spends most of its time blocked in
//! the channel's own read timeout, which would starve an async executor's
//! worker thread if driven from there instead.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, error};

use crate::channel::ByteChannel;
use crate::protocol::command::cmd;
use crate::protocol::frame::FrameDecoder;
use crate::protocol::Engine;

const IDLE_SLEEP: Duration = Duration::from_millis(10);
const IO_ERROR_BACKOFF: Duration = Duration::from_millis(100);
const STOP_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Handle to a running Link Loop thread. Dropping this does not stop the
/// thread -- call [`LinkLoop::stop`] explicitly.
pub struct LinkLoop {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl LinkLoop {
    /// Spawn the background thread. `engine` is shared with the Request
    /// Facade so callers can submit commands and register pending entries
    /// concurrently with the loop's own dispatch.
    pub fn spawn(mut channel: Box<dyn ByteChannel>, engine: Arc<Mutex<Engine>>) -> Self {
        let running = Arc::new(AtomicBool::new(true));
        let loop_running = Arc::clone(&running);

        let handle = thread::spawn(move || {
            let mut decoder = FrameDecoder::new();
            while loop_running.load(Ordering::Acquire) {
                match channel.read_available() {
                    Ok(bytes) if bytes.is_empty() => {
                        thread::sleep(IDLE_SLEEP);
                        continue;
                    }
                    Ok(bytes) => {
                        let frames = decoder.feed(&bytes);
                        for frame in frames {
                            if frame.command == cmd::POLL {
                                let outbound = {
                                    let mut engine = engine.lock().expect("engine mutex poisoned");
                                    engine.handle_poll()
                                };
                                if let Err(e) = channel.write_all(&outbound) {
                                    error!("link loop write failed: {e}");
                                    thread::sleep(IO_ERROR_BACKOFF);
                                }
                            } else {
                                let mut engine = engine.lock().expect("engine mutex poisoned");
                                let event = engine.on_frame(&frame);
                                debug!("dispatched frame {:#04x}: {:?}", frame.command, event);
                            }
                        }
                        thread::sleep(IDLE_SLEEP);
                    }
                    Err(e) => {
                        error!("link loop read failed: {e}");
                        thread::sleep(IO_ERROR_BACKOFF);
                    }
                }
            }
            debug!("link loop thread exiting");
        });

        Self { running, handle: Some(handle) }
    }

    /// Signal the loop to stop and join the thread, bounded to ~2s.
    ///
    /// If the thread does not exit within the bound, the handle is
    /// dropped without panicking -- the OS reclaims the thread when the
    /// process exits, and a hung channel read is the Link Loop's only way
    /// to overrun this bound (it retries reads on its own cadence).
    pub fn stop(mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let (tx, rx) = std::sync::mpsc::channel();
            thread::spawn(move || {
                let _ = handle.join();
                let _ = tx.send(());
            });
            if rx.recv_timeout(STOP_JOIN_TIMEOUT).is_err() {
                error!("link loop did not stop within {STOP_JOIN_TIMEOUT:?}");
            }
        }
    }
}
