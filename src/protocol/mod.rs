//! Wire protocol: command bytes, frame codec, domain types, and the engine
//! that turns a byte channel into a command/response state machine.

pub mod command;
pub mod engine;
pub mod frame;
pub mod types;

pub use engine::{Engine, EngineEvent, VmcError};
pub use frame::{Frame, FrameDecoder};
pub use types::{AisleInfo, AisleStatus, DispenseResult, DispensingStatus};
