//! Wire command bytes and payload encode/decode helpers.
//!
//! Layout reference (spec): `STX(2) CMD(1) LEN(1) TEXT(LEN) XOR(1)`, all
//! multi-byte integers big-endian inside `TEXT`. See [`crate::protocol::frame`]
//! for the frame-level codec; this module only knows about command bytes and
//! the `TEXT` payloads carried inside them.

/// Command byte constants, the fixed closed set the VMC and host speak.
pub mod cmd {
    /// Peripheral's periodic grant for the host to speak.
    pub const POLL: u8 = 0x41;
    /// Acknowledgement, no payload.
    pub const ACK: u8 = 0x42;
    /// Host -> VMC: is this aisle sellable?
    pub const CHECK_AISLE: u8 = 0x01;
    /// VMC -> host: reply to `CHECK_AISLE`.
    pub const AISLE_STATUS_RESPONSE: u8 = 0x02;
    /// Host -> VMC: vend via the normal motor-select path.
    pub const SELECT_BUY: u8 = 0x03;
    /// VMC -> host: dispensing progress/result.
    pub const DISPENSING_STATUS: u8 = 0x04;
    /// Host -> VMC: select (but do not vend) an aisle.
    pub const SELECT_AISLE: u8 = 0x05;
    /// Host -> VMC: vend bypassing the normal selection path.
    pub const DRIVE_AISLE_DIRECT: u8 = 0x06;
    /// VMC -> host: aisle metadata (price, inventory, capacity, ...).
    pub const AISLE_INFO: u8 = 0x11;
    /// Host -> VMC: set an aisle's price.
    pub const SET_AISLE_PRICE: u8 = 0x12;
    /// Host -> VMC: set an aisle's inventory count.
    pub const SET_AISLE_INVENTORY: u8 = 0x13;
    /// Host -> VMC: set an aisle's capacity.
    pub const SET_AISLE_CAPACITY: u8 = 0x14;
    /// Host -> VMC: set an aisle's commodity number.
    pub const SET_AISLE_COMMODITY: u8 = 0x15;
    /// VMC -> host: point-of-sale display text.
    pub const POS_DISPLAY: u8 = 0x24;
    /// VMC -> host: request the host resynchronise state.
    pub const REQUEST_SYNC: u8 = 0x31;
    /// Host -> VMC: request overall machine status.
    pub const REQUEST_MACHINE_STATUS: u8 = 0x51;
    /// VMC -> host: reply to `REQUEST_MACHINE_STATUS`.
    pub const MACHINE_STATUS_RESPONSE: u8 = 0x52;

    /// `true` if `byte` is one of the command values above.
    pub fn is_known(byte: u8) -> bool {
        matches!(
            byte,
            POLL | ACK
                | CHECK_AISLE
                | AISLE_STATUS_RESPONSE
                | SELECT_BUY
                | DISPENSING_STATUS
                | SELECT_AISLE
                | DRIVE_AISLE_DIRECT
                | AISLE_INFO
                | SET_AISLE_PRICE
                | SET_AISLE_INVENTORY
                | SET_AISLE_CAPACITY
                | SET_AISLE_COMMODITY
                | POS_DISPLAY
                | REQUEST_SYNC
                | REQUEST_MACHINE_STATUS
        )
    }
}

/// Build the `TEXT` payload for `CHECK_AISLE` / `SELECT_BUY`: `comm_num || aisle(u16 BE)`.
pub fn encode_aisle_payload(comm_num: u8, aisle: u16) -> Vec<u8> {
    let mut buf = Vec::with_capacity(3);
    buf.push(comm_num);
    buf.extend_from_slice(&aisle.to_be_bytes());
    buf
}

/// Build the `TEXT` payload for `DRIVE_AISLE_DIRECT`:
/// `comm_num || sensor(1) || elevator(1) || aisle(u16 BE)`.
pub fn encode_drive_aisle_direct(comm_num: u8, use_drop_sensor: bool, use_elevator: bool, aisle: u16) -> Vec<u8> {
    let mut buf = Vec::with_capacity(5);
    buf.push(comm_num);
    buf.push(u8::from(use_drop_sensor));
    buf.push(u8::from(use_elevator));
    buf.extend_from_slice(&aisle.to_be_bytes());
    buf
}

/// Build the comm_num-only `TEXT` payload used by `REQUEST_SYNC` / `REQUEST_MACHINE_STATUS`.
pub fn encode_comm_num_only(comm_num: u8) -> Vec<u8> {
    vec![comm_num]
}

/// Parsed `comm_num || status(1) || aisle(u16 BE)` payload shared by
/// `DISPENSING_STATUS` and `AISLE_STATUS_RESPONSE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusPayload {
    /// Echoed comm_num -- parsed but never used for matching (see spec Open Questions).
    pub comm_num: u8,
    /// Raw status byte; callers map it to `DispensingStatus`/`AisleStatus`.
    pub status: u8,
    /// Aisle the status applies to.
    pub aisle: u16,
}

/// Parse a `comm_num(1) || status(1) || aisle(u16 BE)` payload.
///
/// Returns `None` if `text` is shorter than 4 bytes (spec: malformed payloads
/// are dropped, not errored).
pub fn parse_status_payload(text: &[u8]) -> Option<StatusPayload> {
    if text.len() < 4 {
        return None;
    }
    Some(StatusPayload {
        comm_num: text[0],
        status: text[1],
        aisle: u16::from_be_bytes([text[2], text[3]]),
    })
}

/// Parsed `AISLE_INFO` payload: `comm_num || aisle(u16 BE) || price(u16 BE) ||
/// inventory(1) || capacity(1) || commodity(1) || paused(1)`.
///
/// The exact `AISLE_INFO` text layout is not specified in spec.md's payload
/// table; this follows `original_source`'s `AisleInfo` dataclass field order,
/// which is the closest available ground truth.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AisleInfoPayload {
    /// Aisle this info describes.
    pub aisle: u16,
    /// Price in the machine's native currency unit.
    pub price: u16,
    /// Current inventory count.
    pub inventory: u8,
    /// Maximum capacity.
    pub capacity: u8,
    /// Commodity/product number.
    pub commodity_number: u8,
    /// Whether the aisle is administratively paused.
    pub is_paused: bool,
}

/// Parse an `AISLE_INFO` payload. Returns `None` if too short.
pub fn parse_aisle_info(text: &[u8]) -> Option<AisleInfoPayload> {
    if text.len() < 9 {
        return None;
    }
    Some(AisleInfoPayload {
        aisle: u16::from_be_bytes([text[1], text[2]]),
        price: u16::from_be_bytes([text[3], text[4]]),
        inventory: text[5],
        capacity: text[6],
        commodity_number: text[7],
        is_paused: text[8] != 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aisle_payload_round_trips_big_endian() {
        let payload = encode_aisle_payload(7, 300);
        assert_eq!(payload, vec![7, 0x01, 0x2C]);
    }

    #[test]
    fn drive_aisle_direct_payload_layout() {
        let payload = encode_drive_aisle_direct(1, true, false, 5);
        assert_eq!(payload, vec![1, 1, 0, 0x00, 0x05]);
    }

    #[test]
    fn status_payload_parses() {
        let text = [9u8, 0x02, 0x00, 0x05];
        let parsed = parse_status_payload(&text).unwrap();
        assert_eq!(parsed.comm_num, 9);
        assert_eq!(parsed.status, 0x02);
        assert_eq!(parsed.aisle, 5);
    }

    #[test]
    fn status_payload_too_short_is_none() {
        assert!(parse_status_payload(&[1, 2]).is_none());
    }

    #[test]
    fn is_known_rejects_arbitrary_bytes() {
        assert!(cmd::is_known(cmd::POLL));
        assert!(!cmd::is_known(0x99));
    }

    #[test]
    fn aisle_info_parses_full_layout() {
        let text = [3u8, 0x00, 0x05, 0x00, 0x64, 10, 20, 7, 1];
        let info = parse_aisle_info(&text).unwrap();
        assert_eq!(info.aisle, 5);
        assert_eq!(info.price, 100);
        assert_eq!(info.inventory, 10);
        assert_eq!(info.capacity, 20);
        assert_eq!(info.commodity_number, 7);
        assert!(info.is_paused);
    }
}
