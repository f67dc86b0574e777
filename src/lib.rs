//! VMC (Vending Machine Controller) protocol engine: a polled, master-slave
//! byte-framed serial driver exposing an async dispense/status-check API.

pub mod channel;
pub mod config;
pub mod controller;
pub mod facade;
pub mod link;
pub mod protocol;

pub use config::Config;
pub use controller::VendingMachineController;
pub use facade::{AisleStatusResponse, DispenseResponse, HealthResponse, ReadyResponse, RequestFacade};
pub use protocol::engine::VmcError;
