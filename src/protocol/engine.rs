//! The Protocol Engine: outbound command queue, pending-transaction table,
//! comm-number counter, and the frame-dispatch table that drives them.
//!
//! Owned and driven exclusively by the Link Loop thread ([`crate::link`]);
//! never performs I/O itself, only decides what bytes the Link Loop should
//! write next.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use thiserror::Error;

use super::command::{cmd, encode_comm_num_only, parse_aisle_info, parse_status_payload};
use super::frame::{self, Frame};
use super::types::{AisleInfo, AisleStatus, DispensingStatus};

/// Errors surfaced by the engine or facade to callers.
#[derive(Debug, Error)]
pub enum VmcError {
    /// The byte channel is not open; operations short-circuit immediately.
    #[error("VMC not connected")]
    NotConnected,
    /// The facade's own timeout elapsed before a terminal response arrived.
    #[error("operation timed out")]
    Timeout,
    /// The engine was stopped while this operation was still pending.
    #[error("VMC driver is shutting down")]
    ShuttingDown,
    /// A pending entry already exists for this aisle and operation kind.
    ///
    /// See the Open Questions in this crate's design notes: two concurrent
    /// dispenses (or status checks) against the same aisle are rejected
    /// rather than silently overwriting the earlier one's callback.
    #[error("a dispense/status-check is already pending for aisle {0}")]
    AlreadyPending(u16),
}

/// Outcome handed to a pending transaction's callback.
#[derive(Debug, Clone, Copy)]
pub enum PendingOutcome {
    /// Terminal dispensing status for a `dispense` call.
    Dispense(DispensingStatus),
    /// Terminal aisle status for a `check_aisle_status` call.
    Status(AisleStatus),
}

/// Invoked exactly once, from whatever thread resolves the pending entry
/// (the Link Loop thread on a matching response, or the owner of the
/// engine on timeout/shutdown).
pub type PendingCallback = Box<dyn FnOnce(Result<PendingOutcome, VmcError>) + Send>;

struct OutboundCommand {
    frame: Vec<u8>,
    /// `false` for fire-and-forget ACK/reply frames: sent once, never retried.
    requires_ack: bool,
    attempts: u32,
    max_attempts: u32,
    in_flight: bool,
    last_send: Option<Instant>,
}

/// Observable event the Link Loop (or a test harness) may log after
/// dispatching a decoded frame. Never carries bytes to write -- only
/// [`Engine::handle_poll`] produces bytes, per the "writes only happen
/// during POLL dispatch" rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// Frame handled with no further observable effect.
    Handled,
    /// A dispense transaction for `aisle` was resolved.
    DispenseResolved { aisle: u16 },
    /// A status-check transaction for `aisle` was resolved.
    StatusResolved { aisle: u16 },
    /// Aisle metadata parsed for observability only.
    AisleInfo(AisleInfo),
    /// Raw `MACHINE_STATUS_RESPONSE` text, surfaced for observability
    /// (the response body is not specified beyond the comm_num prefix).
    MachineStatus(Vec<u8>),
}

/// The protocol state machine: outbound queue, pending-transaction table,
/// comm-number counter, retry/timeout bookkeeping.
pub struct Engine {
    queue: std::collections::VecDeque<OutboundCommand>,
    dispense_pending: HashMap<u16, PendingCallback>,
    status_pending: HashMap<u16, PendingCallback>,
    next_comm_num: u8,
    command_timeout: Duration,
    max_retries: u32,
}

impl Engine {
    /// Build an engine with the given per-attempt ACK deadline and max retry count.
    pub fn new(command_timeout: Duration, max_retries: u32) -> Self {
        Self {
            queue: std::collections::VecDeque::new(),
            dispense_pending: HashMap::new(),
            status_pending: HashMap::new(),
            next_comm_num: 1,
            command_timeout,
            max_retries,
        }
    }

    /// Return the current communication number, then advance `n ← (n mod 255) + 1`.
    pub fn next_comm_num(&mut self) -> u8 {
        let current = self.next_comm_num;
        self.next_comm_num = (self.next_comm_num % 255) + 1;
        current
    }

    /// Enqueue an outbound command that expects an ACK and is subject to
    /// retry/timeout bookkeeping.
    pub fn submit(&mut self, command: u8, text: Vec<u8>) {
        let encoded = frame::encode(command, &text).expect("caller-built payloads fit in one byte");
        self.queue.push_back(OutboundCommand {
            frame: encoded,
            requires_ack: true,
            attempts: 0,
            max_attempts: self.max_retries,
            in_flight: false,
            last_send: None,
        });
    }

    fn enqueue_reply(&mut self, command: u8, text: Vec<u8>) {
        let encoded = frame::encode(command, &text).expect("reply payloads fit in one byte");
        self.queue.push_back(OutboundCommand {
            frame: encoded,
            requires_ack: false,
            attempts: 0,
            max_attempts: 1,
            in_flight: false,
            last_send: None,
        });
    }

    /// Register a pending dispense callback for `aisle`.
    ///
    /// # Errors
    ///
    /// Returns [`VmcError::AlreadyPending`] if a dispense is already pending
    /// for this aisle.
    pub fn register_dispense(&mut self, aisle: u16, callback: PendingCallback) -> Result<(), VmcError> {
        if self.dispense_pending.contains_key(&aisle) {
            return Err(VmcError::AlreadyPending(aisle));
        }
        self.dispense_pending.insert(aisle, callback);
        Ok(())
    }

    /// Register a pending status-check callback for `aisle`.
    ///
    /// # Errors
    ///
    /// Returns [`VmcError::AlreadyPending`] if a status check is already
    /// pending for this aisle.
    pub fn register_status_check(&mut self, aisle: u16, callback: PendingCallback) -> Result<(), VmcError> {
        if self.status_pending.contains_key(&aisle) {
            return Err(VmcError::AlreadyPending(aisle));
        }
        self.status_pending.insert(aisle, callback);
        Ok(())
    }

    /// Remove (without invoking) a pending dispense entry. Called by the
    /// facade when its own timeout fires first.
    pub fn cancel_dispense(&mut self, aisle: u16) {
        self.dispense_pending.remove(&aisle);
    }

    /// Remove (without invoking) a pending status-check entry.
    pub fn cancel_status_check(&mut self, aisle: u16) {
        self.status_pending.remove(&aisle);
    }

    /// Resolve every outstanding pending entry with [`VmcError::ShuttingDown`]
    /// and clear the queue. Called once, when the engine is stopped.
    pub fn shut_down(&mut self) {
        info!("protocol engine shutting down: resolving all pending transactions");
        for (_, callback) in self.dispense_pending.drain() {
            callback(Err(VmcError::ShuttingDown));
        }
        for (_, callback) in self.status_pending.drain() {
            callback(Err(VmcError::ShuttingDown));
        }
        self.queue.clear();
    }

    /// The only place outbound bytes are produced. Must be called once per
    /// POLL frame received.
    pub fn handle_poll(&mut self) -> Vec<u8> {
        // Fire-and-forget replies (ACKs, REQUEST_SYNC echoes) jump the queue
        // and need no retry bookkeeping.
        if matches!(self.queue.front(), Some(c) if !c.requires_ack) {
            let reply = self.queue.pop_front().expect("front checked above");
            return reply.frame;
        }

        if let Some(head) = self.queue.front_mut() {
            if head.in_flight {
                let elapsed = head.last_send.map(|t| t.elapsed()).unwrap_or_default();
                if elapsed >= self.command_timeout {
                    head.attempts += 1;
                    if head.attempts >= head.max_attempts {
                        self.queue.pop_front();
                        warn!("command discarded after {} attempts", self.max_retries);
                    } else {
                        head.in_flight = false;
                        debug!("command retry {} of {}", head.attempts, head.max_attempts);
                    }
                }
            }
        }

        if let Some(head) = self.queue.front_mut() {
            if !head.in_flight {
                head.in_flight = true;
                head.last_send = Some(Instant::now());
                return head.frame.clone();
            }
        }

        frame::encode(cmd::ACK, &[]).expect("empty ACK payload always fits")
    }

    /// Dispatch a decoded inbound frame per the frame-dispatch table. Never
    /// produces bytes to write -- side effects are limited to mutating
    /// internal state and enqueuing replies for the next POLL.
    pub fn on_frame(&mut self, frame: &Frame) -> EngineEvent {
        match frame.command {
            cmd::POLL => {
                // The Link Loop calls `handle_poll` directly for POLL frames;
                // reaching here means a caller dispatched POLL through the
                // generic path, which is harmless but produces no event.
                EngineEvent::Handled
            }
            cmd::ACK => {
                if let Some(head) = self.queue.front() {
                    if head.in_flight {
                        self.queue.pop_front();
                        debug!("outbound command acknowledged");
                    }
                }
                EngineEvent::Handled
            }
            cmd::DISPENSING_STATUS => {
                self.enqueue_reply(cmd::ACK, Vec::new());
                let Some(payload) = parse_status_payload(&frame.text) else {
                    warn!("malformed DISPENSING_STATUS payload, dropping");
                    return EngineEvent::Handled;
                };
                let status = DispensingStatus::from_byte(payload.status);
                if matches!(status, DispensingStatus::Dispensing) {
                    debug!("aisle {} still dispensing", payload.aisle);
                    return EngineEvent::Handled;
                }
                if let Some(callback) = self.dispense_pending.remove(&payload.aisle) {
                    callback(Ok(PendingOutcome::Dispense(status)));
                    EngineEvent::DispenseResolved { aisle: payload.aisle }
                } else {
                    debug!("no pending dispense for aisle {}, ignoring late response", payload.aisle);
                    EngineEvent::Handled
                }
            }
            cmd::AISLE_STATUS_RESPONSE => {
                self.enqueue_reply(cmd::ACK, Vec::new());
                let Some(payload) = parse_status_payload(&frame.text) else {
                    warn!("malformed AISLE_STATUS_RESPONSE payload, dropping");
                    return EngineEvent::Handled;
                };
                let status = AisleStatus::from_byte(payload.status);
                if let Some(callback) = self.status_pending.remove(&payload.aisle) {
                    callback(Ok(PendingOutcome::Status(status)));
                    EngineEvent::StatusResolved { aisle: payload.aisle }
                } else {
                    debug!("no pending status check for aisle {}, ignoring late response", payload.aisle);
                    EngineEvent::Handled
                }
            }
            cmd::REQUEST_SYNC => {
                self.enqueue_reply(cmd::ACK, Vec::new());
                let comm_num = self.next_comm_num();
                self.enqueue_reply(cmd::REQUEST_SYNC, encode_comm_num_only(comm_num));
                info!("VMC requested resynchronisation");
                EngineEvent::Handled
            }
            cmd::AISLE_INFO => {
                self.enqueue_reply(cmd::ACK, Vec::new());
                match parse_aisle_info(&frame.text) {
                    Some(info) => EngineEvent::AisleInfo(AisleInfo {
                        aisle: info.aisle,
                        price: info.price,
                        inventory: info.inventory,
                        capacity: info.capacity,
                        commodity_number: info.commodity_number,
                        is_paused: info.is_paused,
                    }),
                    None => {
                        debug!("malformed AISLE_INFO payload, ignoring");
                        EngineEvent::Handled
                    }
                }
            }
            cmd::MACHINE_STATUS_RESPONSE => {
                self.enqueue_reply(cmd::ACK, Vec::new());
                EngineEvent::MachineStatus(frame.text.clone())
            }
            cmd::POS_DISPLAY => {
                self.enqueue_reply(cmd::ACK, Vec::new());
                EngineEvent::Handled
            }
            _ => {
                self.enqueue_reply(cmd::ACK, Vec::new());
                EngineEvent::Handled
            }
        }
    }

    /// Number of commands currently queued (for observability/tests).
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// `true` if the head of the queue is currently in-flight.
    pub fn has_in_flight(&self) -> bool {
        self.queue.front().is_some_and(|c| c.in_flight)
    }
}
