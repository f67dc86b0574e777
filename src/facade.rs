//! The Request Facade: the caller-facing surface. Submits operations to
//! the shared [`Engine`] and awaits a completion slot resolved from the
//! Link Loop thread.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::oneshot;
use uuid::Uuid;

use crate::protocol::command::{
    cmd, encode_aisle_payload, encode_drive_aisle_direct,
};
use crate::protocol::engine::{PendingOutcome, VmcError};
use crate::protocol::types::{AisleStatus, DispenseResult, DispensingStatus};
use crate::protocol::Engine;

/// Result of a `dispense` call.
#[derive(Debug, Clone)]
pub struct DispenseResponse {
    /// `true` only when the wire status was SUCCESS.
    pub success: bool,
    /// Aisle the dispense targeted.
    pub aisle: u16,
    /// Caller-facing status (dispensing/success/jammed/motor_error/not_found/failed).
    pub status: DispenseResult,
    /// Human-readable message.
    pub message: String,
    /// Opaque transaction id for caller-side correlation; never transmitted on the wire.
    pub transaction_id: String,
}

/// Result of a `check_aisle_status` call.
#[derive(Debug, Clone)]
pub struct AisleStatusResponse {
    /// Aisle the check targeted.
    pub aisle: u16,
    /// Caller-facing status (normal/out_of_stock/not_exist/paused).
    pub status: AisleStatus,
    /// Human-readable message.
    pub message: String,
    /// Opaque transaction id for caller-side correlation.
    pub transaction_id: String,
}

/// Result of a `health` call.
#[derive(Debug, Clone)]
pub struct HealthResponse {
    /// Short status label (`"ok"` or `"disconnected"`).
    pub status: String,
    /// Whether the byte channel is currently open.
    pub connected: bool,
    /// Configured serial port path/name.
    pub serial_port: String,
}

/// Result of a `ready` call.
#[derive(Debug, Clone)]
pub struct ReadyResponse {
    /// `true` if the driver is connected and able to accept operations.
    pub ready: bool,
    /// Human-readable explanation.
    pub message: String,
}

impl fmt::Display for VmcValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "aisle must be >= 1, got {}", self.0)
    }
}

/// Returned when a caller passes an aisle number outside the valid range.
#[derive(Debug, Clone, Copy)]
pub struct VmcValidationError(pub u16);

/// The caller-facing API: submit a dispense or status check, await
/// completion, or inspect liveness. Cheaply `Clone`-able; every clone
/// shares the same engine and connection state, mirroring the teacher's
/// handle/background-task split.
#[derive(Clone)]
pub struct RequestFacade {
    engine: Arc<Mutex<Engine>>,
    connected: Arc<AtomicBool>,
    serial_port: String,
}

impl RequestFacade {
    /// Construct a facade over a shared engine and connection flag.
    pub fn new(engine: Arc<Mutex<Engine>>, connected: Arc<AtomicBool>, serial_port: String) -> Self {
        Self { engine, connected, serial_port }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Submit a dispense against `aisle` and await its terminal outcome.
    ///
    /// `force` selects `DRIVE_AISLE_DIRECT` (bypassing normal selection)
    /// over the default `SELECT_BUY`.
    pub async fn dispense(
        &self,
        aisle: u16,
        use_drop_sensor: bool,
        use_elevator: bool,
        force: bool,
        timeout: Duration,
    ) -> Result<DispenseResponse, VmcValidationError> {
        if aisle < 1 {
            return Err(VmcValidationError(aisle));
        }
        let transaction_id = Uuid::new_v4().to_string();

        if !self.is_connected() {
            return Ok(DispenseResponse {
                success: false,
                aisle,
                status: DispenseResult::Failed,
                message: "VMC not connected".to_string(),
                transaction_id,
            });
        }

        let (tx, rx) = oneshot::channel();
        let callback = Box::new(move |result: Result<PendingOutcome, VmcError>| {
            let _ = tx.send(result);
        });

        {
            let mut engine = self.engine.lock().expect("engine mutex poisoned");
            if let Err(e) = engine.register_dispense(aisle, callback) {
                return Ok(dispense_error_response(transaction_id, aisle, &e));
            }
            let comm_num = engine.next_comm_num();
            let (command, payload) = if force {
                (cmd::DRIVE_AISLE_DIRECT, encode_drive_aisle_direct(comm_num, use_drop_sensor, use_elevator, aisle))
            } else {
                (cmd::SELECT_BUY, encode_aisle_payload(comm_num, aisle))
            };
            engine.submit(command, payload);
        }

        let response = match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(Ok(PendingOutcome::Dispense(status)))) => dispense_success_response(transaction_id, aisle, status),
            Ok(Ok(Ok(PendingOutcome::Status(_)))) => {
                unreachable!("dispense pending entries only ever resolve with PendingOutcome::Dispense")
            }
            Ok(Ok(Err(e))) => dispense_error_response(transaction_id, aisle, &e),
            Ok(Err(_)) => {
                dispense_error_response(transaction_id, aisle, &VmcError::ShuttingDown)
            }
            Err(_elapsed) => {
                self.engine.lock().expect("engine mutex poisoned").cancel_dispense(aisle);
                DispenseResponse {
                    success: false,
                    aisle,
                    status: DispenseResult::Failed,
                    message: "Operation timed out".to_string(),
                    transaction_id,
                }
            }
        };
        Ok(response)
    }

    /// Submit an aisle status check and await its terminal outcome.
    pub async fn check_aisle_status(&self, aisle: u16, timeout: Duration) -> Result<AisleStatusResponse, VmcValidationError> {
        if aisle < 1 {
            return Err(VmcValidationError(aisle));
        }
        let transaction_id = Uuid::new_v4().to_string();

        if !self.is_connected() {
            return Ok(AisleStatusResponse {
                aisle,
                status: AisleStatus::NotExist,
                message: "VMC not connected".to_string(),
                transaction_id,
            });
        }

        let (tx, rx) = oneshot::channel();
        let callback = Box::new(move |result: Result<PendingOutcome, VmcError>| {
            let _ = tx.send(result);
        });

        {
            let mut engine = self.engine.lock().expect("engine mutex poisoned");
            if let Err(e) = engine.register_status_check(aisle, callback) {
                return Ok(status_error_response(transaction_id, aisle, &e));
            }
            let comm_num = engine.next_comm_num();
            engine.submit(cmd::CHECK_AISLE, encode_aisle_payload(comm_num, aisle));
        }

        let response = match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(Ok(PendingOutcome::Status(status)))) => AisleStatusResponse {
                aisle,
                status,
                message: status.message().to_string(),
                transaction_id,
            },
            Ok(Ok(Ok(PendingOutcome::Dispense(_)))) => {
                unreachable!("status-check pending entries only ever resolve with PendingOutcome::Status")
            }
            Ok(Ok(Err(e))) => status_error_response(transaction_id, aisle, &e),
            Ok(Err(_)) => status_error_response(transaction_id, aisle, &VmcError::ShuttingDown),
            Err(_elapsed) => {
                self.engine.lock().expect("engine mutex poisoned").cancel_status_check(aisle);
                AisleStatusResponse {
                    aisle,
                    status: AisleStatus::NotExist,
                    message: "Operation timed out".to_string(),
                    transaction_id,
                }
            }
        };
        Ok(response)
    }

    /// Report current connection health.
    pub fn health(&self) -> HealthResponse {
        let connected = self.is_connected();
        HealthResponse {
            status: if connected { "ok".to_string() } else { "disconnected".to_string() },
            connected,
            serial_port: self.serial_port.clone(),
        }
    }

    /// Report whether the driver is ready to accept operations.
    pub fn ready(&self) -> ReadyResponse {
        if self.is_connected() {
            ReadyResponse { ready: true, message: "VMC connected and ready".to_string() }
        } else {
            ReadyResponse { ready: false, message: "VMC not connected".to_string() }
        }
    }
}

fn dispense_success_response(transaction_id: String, aisle: u16, status: DispensingStatus) -> DispenseResponse {
    let mapped = DispenseResult::from_dispensing_status(status);
    DispenseResponse {
        success: mapped.is_success(),
        aisle,
        status: mapped,
        message: status.message().to_string(),
        transaction_id,
    }
}

fn dispense_error_response(transaction_id: String, aisle: u16, err: &VmcError) -> DispenseResponse {
    DispenseResponse {
        success: false,
        aisle,
        status: DispenseResult::Failed,
        message: err.to_string(),
        transaction_id,
    }
}

fn status_error_response(transaction_id: String, aisle: u16, err: &VmcError) -> AisleStatusResponse {
    AisleStatusResponse {
        aisle,
        status: AisleStatus::NotExist,
        message: err.to_string(),
        transaction_id,
    }
}
