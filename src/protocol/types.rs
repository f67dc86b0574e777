//! Domain types shared between the Protocol Engine and the Request Facade.

use std::fmt;

/// Status reported inside a `DISPENSING_STATUS` frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispensingStatus {
    /// Vend is underway; more status frames will follow.
    Dispensing,
    /// Vend completed successfully.
    Success,
    /// Motor jammed.
    Jam,
    /// Motor reports it never stopped turning.
    MotorDoesntStop,
    /// Motor reports it does not exist for this aisle.
    MotorDoesntExist,
    /// Byte not in the known status set.
    Unknown(u8),
}

impl DispensingStatus {
    /// Decode the raw status byte carried in a `DISPENSING_STATUS` payload.
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            0x01 => Self::Dispensing,
            0x02 => Self::Success,
            0x03 => Self::Jam,
            0x04 => Self::MotorDoesntStop,
            0x06 => Self::MotorDoesntExist,
            other => Self::Unknown(other),
        }
    }

    /// `true` if this status is a terminal outcome (no further frames expected
    /// for the transaction it belongs to).
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Dispensing)
    }

    /// Human-readable message matching the mapping in the Protocol Engine's
    /// dispatch table (SUCCESS / JAMMED / MOTOR_DOESNT_STOP / MOTOR_DOESNT_EXIST).
    pub fn message(self) -> &'static str {
        match self {
            Self::Dispensing => "Dispensing",
            Self::Success => "Dispense successful",
            Self::Jam => "Product jammed",
            Self::MotorDoesntStop => "Motor error - doesn't stop",
            Self::MotorDoesntExist => "Motor not found",
            Self::Unknown(_) => "Unknown error",
        }
    }
}

/// Status reported inside an `AISLE_STATUS_RESPONSE` frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AisleStatus {
    /// Aisle exists and can be sold.
    Sellable,
    /// Aisle exists but is out of stock.
    SoldOut,
    /// Aisle exists but is administratively paused.
    Paused,
    /// Aisle number does not exist on this machine.
    NotExist,
    /// Byte not in the known status set.
    Unknown(u8),
}

impl AisleStatus {
    /// Decode the raw status byte carried in an `AISLE_STATUS_RESPONSE` payload.
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            0x01 => Self::Sellable,
            0x02 => Self::SoldOut,
            0x03 => Self::NotExist,
            0x04 => Self::Paused,
            other => Self::Unknown(other),
        }
    }

    /// Human-readable message matching the facade's NORMAL/OUT_OF_STOCK/DOESNT_EXIST/PAUSED mapping.
    pub fn message(self) -> &'static str {
        match self {
            Self::Sellable => "Aisle is ready",
            Self::SoldOut => "Aisle is out of stock",
            Self::NotExist => "Aisle does not exist",
            Self::Paused => "Aisle is paused",
            Self::Unknown(_) => "Aisle status unknown",
        }
    }
}

impl fmt::Display for AisleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Sellable => "normal",
            Self::SoldOut => "out_of_stock",
            Self::NotExist => "not_exist",
            Self::Paused => "paused",
            Self::Unknown(_) => "unknown",
        };
        f.write_str(label)
    }
}

/// Caller-facing status of a `dispense` call, per the DISPENSING/SUCCESS/
/// JAMMED/MOTOR_DOESNT_STOP/MOTOR_DOESNT_EXIST mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispenseResult {
    /// Still in progress (only ever observed transiently; the facade waits past it).
    Dispensing,
    /// Item vended successfully.
    Success,
    /// Motor jammed mid-vend.
    Jammed,
    /// Motor reports it never stopped turning.
    MotorError,
    /// Motor reports it does not exist for this aisle.
    NotFound,
    /// Any other wire status not in the closed set above.
    Failed,
}

impl DispenseResult {
    /// Map a decoded wire status to the caller-facing result, per the facade's
    /// DISPENSING/SUCCESS/JAMMED/MOTOR_DOESNT_STOP/MOTOR_DOESNT_EXIST table.
    pub fn from_dispensing_status(status: DispensingStatus) -> Self {
        match status {
            DispensingStatus::Dispensing => Self::Dispensing,
            DispensingStatus::Success => Self::Success,
            DispensingStatus::Jam => Self::Jammed,
            DispensingStatus::MotorDoesntStop => Self::MotorError,
            DispensingStatus::MotorDoesntExist => Self::NotFound,
            DispensingStatus::Unknown(_) => Self::Failed,
        }
    }

    /// `true` for the wire status that represents a successful vend.
    pub fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }
}

impl fmt::Display for DispenseResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Dispensing => "dispensing",
            Self::Success => "success",
            Self::Jammed => "jammed",
            Self::MotorError => "motor_error",
            Self::NotFound => "not_found",
            Self::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Aisle metadata reported inside an `AISLE_INFO` frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AisleInfo {
    /// Aisle number this info describes.
    pub aisle: u16,
    /// Price in the machine's native currency unit.
    pub price: u16,
    /// Current inventory count.
    pub inventory: u8,
    /// Maximum capacity.
    pub capacity: u8,
    /// Commodity/product number assigned to this aisle.
    pub commodity_number: u8,
    /// Whether the aisle is administratively paused.
    pub is_paused: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispensing_status_terminal_classification() {
        assert!(!DispensingStatus::Dispensing.is_terminal());
        assert!(DispensingStatus::Success.is_terminal());
        assert!(DispensingStatus::Jam.is_terminal());
        assert!(DispensingStatus::Unknown(0xEE).is_terminal());
    }

    #[test]
    fn dispensing_status_from_byte_round_trips_known_values() {
        assert_eq!(DispensingStatus::from_byte(0x01), DispensingStatus::Dispensing);
        assert_eq!(DispensingStatus::from_byte(0x02), DispensingStatus::Success);
        assert_eq!(DispensingStatus::from_byte(0x03), DispensingStatus::Jam);
        assert_eq!(DispensingStatus::from_byte(0x04), DispensingStatus::MotorDoesntStop);
        assert_eq!(DispensingStatus::from_byte(0x06), DispensingStatus::MotorDoesntExist);
        assert_eq!(DispensingStatus::from_byte(0x7F), DispensingStatus::Unknown(0x7F));
    }

    #[test]
    fn aisle_status_from_byte_round_trips_known_values() {
        assert_eq!(AisleStatus::from_byte(0x01), AisleStatus::Sellable);
        assert_eq!(AisleStatus::from_byte(0x03), AisleStatus::NotExist);
        assert_eq!(AisleStatus::from_byte(0x04), AisleStatus::Paused);
        assert_eq!(AisleStatus::from_byte(0x55), AisleStatus::Unknown(0x55));
    }

    #[test]
    fn dispense_result_display_is_snake_case() {
        assert_eq!(DispenseResult::MotorError.to_string(), "motor_error");
        assert_eq!(DispenseResult::NotFound.to_string(), "not_found");
    }

    #[test]
    fn aisle_status_display_matches_caller_facing_vocabulary() {
        assert_eq!(AisleStatus::Sellable.to_string(), "normal");
        assert_eq!(AisleStatus::SoldOut.to_string(), "out_of_stock");
        assert_eq!(AisleStatus::NotExist.to_string(), "not_exist");
        assert_eq!(AisleStatus::Paused.to_string(), "paused");
    }

    #[test]
    fn dispense_result_maps_from_dispensing_status() {
        assert_eq!(
            DispenseResult::from_dispensing_status(DispensingStatus::Jam),
            DispenseResult::Jammed
        );
        assert!(DispenseResult::from_dispensing_status(DispensingStatus::Success).is_success());
    }
}
