//! Wire framing codec.
//!
//! ```text
//! +------+------+--------+--------+-------------------+------+
//! | 0xFA | 0xFB |  CMD   |  LEN   |  TEXT (LEN bytes) | XOR  |
//! +------+------+--------+--------+-------------------+------+
//! ```
//!
//! XOR is the byte-wise XOR of every byte from the first STX byte through
//! the last `TEXT` byte, inclusive (i.e. everything except the checksum
//! byte itself). Same incremental-buffer decoder shape as
//! `broker::protocol::BrokerFrameDecoder`: `feed` appends, and the buffer
//! retains whatever trailing bytes don't yet form a complete frame.

use thiserror::Error;

use super::command::cmd;

/// The two-byte start-of-frame marker.
pub const STX: [u8; 2] = [0xFA, 0xFB];

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Command byte.
    pub command: u8,
    /// Payload bytes (`LEN` of them).
    pub text: Vec<u8>,
}

/// Diagnostic-level decode events that do not fail the stream.
///
/// The Framer never returns these as errors: truncation is normal
/// back-pressure, checksum failures and unknown commands just mean the
/// offending STX is dropped and resynchronisation continues from the next
/// byte. Callers that want visibility into resync activity can inspect
/// these via [`FrameDecoder::feed_with_diagnostics`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameDiagnostic {
    /// XOR over the candidate frame did not match the trailing checksum byte.
    #[error("checksum mismatch at offset {offset}: expected 0x{expected:02x}, got 0x{actual:02x}")]
    ChecksumMismatch {
        /// Offset into the buffer where the candidate frame started.
        offset: usize,
        /// Checksum computed over the candidate frame.
        expected: u8,
        /// Checksum byte actually present on the wire.
        actual: u8,
    },
    /// The command byte after a valid STX/LEN/XOR is not in the known set.
    #[error("unknown command byte 0x{0:02x}")]
    UnknownCommand(u8),
}

/// Error returned by [`encode`] when the caller passes an invalid payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EncodeError {
    /// `text.len()` does not fit in the single-byte `LEN` field.
    #[error("text payload of {0} bytes does not fit in a single LEN byte (max 255)")]
    TextTooLong(usize),
}

/// Encode a single outbound frame: `STX(2) || command(1) || len(1) || text || xor(1)`.
///
/// # Errors
///
/// Returns [`EncodeError::TextTooLong`] if `text.len() > 255`.
pub fn encode(command: u8, text: &[u8]) -> Result<Vec<u8>, EncodeError> {
    if text.len() > u8::MAX as usize {
        return Err(EncodeError::TextTooLong(text.len()));
    }
    let mut buf = Vec::with_capacity(2 + 1 + 1 + text.len() + 1);
    buf.extend_from_slice(&STX);
    buf.push(command);
    buf.push(text.len() as u8);
    buf.extend_from_slice(text);
    let xor = xor_checksum(&buf);
    buf.push(xor);
    Ok(buf)
}

fn xor_checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, b| acc ^ b)
}

/// Incremental frame decoder.
///
/// Feed it bytes as they arrive off the wire; it yields zero or more
/// complete frames per call and retains any trailing partial frame for the
/// next call. Bytes preceding the next valid STX are dropped silently.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
}

impl FrameDecoder {
    /// Create a decoder with an empty receive buffer.
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    /// Feed bytes and extract all complete frames, discarding diagnostics.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<Frame> {
        let (frames, _diagnostics) = self.feed_with_diagnostics(bytes);
        frames
    }

    /// Feed bytes and extract all complete frames, also returning any
    /// checksum/unknown-command diagnostics encountered while resynchronising.
    pub fn feed_with_diagnostics(&mut self, bytes: &[u8]) -> (Vec<Frame>, Vec<FrameDiagnostic>) {
        self.buf.extend_from_slice(bytes);
        let mut frames = Vec::new();
        let mut diagnostics = Vec::new();

        loop {
            // Resynchronise: drop everything before the next STX (or before
            // a trailing lone first-STX-byte that might complete later).
            match find_stx(&self.buf) {
                Some(0) => {}
                Some(offset) => {
                    self.buf.drain(..offset);
                }
                None => {
                    self.buf.clear();
                    break;
                }
            }

            if self.buf.len() < 5 {
                break; // await more bytes: not even a header yet
            }

            let len = self.buf[3] as usize;
            let total = 5 + len;
            if self.buf.len() < total {
                break; // await more bytes: header seen, body incomplete
            }

            let expected = xor_checksum(&self.buf[..4 + len]);
            let actual = self.buf[4 + len];
            if expected != actual {
                diagnostics.push(FrameDiagnostic::ChecksumMismatch {
                    offset: 0,
                    expected,
                    actual,
                });
                // Drop only the first STX byte and retry resync from the next position.
                self.buf.drain(..1);
                continue;
            }

            let command = self.buf[2];
            if !cmd::is_known(command) {
                diagnostics.push(FrameDiagnostic::UnknownCommand(command));
                self.buf.drain(..total);
                continue;
            }

            let text = self.buf[4..4 + len].to_vec();
            self.buf.drain(..total);
            frames.push(Frame { command, text });
        }

        (frames, diagnostics)
    }
}

fn find_stx(buf: &[u8]) -> Option<usize> {
    if let Some(pos) = buf.windows(2).position(|w| w == STX) {
        return Some(pos);
    }
    // No full two-byte STX yet, but a trailing lone 0xFA might still turn
    // into one once the next byte arrives -- keep it instead of discarding.
    if buf.last() == Some(&STX[0]) {
        return Some(buf.len() - 1);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::command::cmd;

    #[test]
    fn encode_empty_text_is_five_bytes() {
        let frame = encode(cmd::ACK, &[]).unwrap();
        assert_eq!(frame.len(), 5);
        assert_eq!(&frame[0..2], &STX);
    }

    #[test]
    fn encode_rejects_oversized_text() {
        let text = vec![0u8; 256];
        assert_eq!(encode(cmd::CHECK_AISLE, &text), Err(EncodeError::TextTooLong(256)));
    }

    #[test]
    fn round_trip_empty_text() {
        let encoded = encode(cmd::ACK, &[]).unwrap();
        let mut dec = FrameDecoder::new();
        let frames = dec.feed(&encoded);
        assert_eq!(frames, vec![Frame { command: cmd::ACK, text: vec![] }]);
    }

    #[test]
    fn round_trip_255_byte_text() {
        let text = vec![0xABu8; 255];
        let encoded = encode(cmd::SET_AISLE_PRICE, &text).unwrap();
        assert_eq!(encoded.len(), 260);
        let mut dec = FrameDecoder::new();
        let frames = dec.feed(&encoded);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].text, text);
    }

    #[test]
    fn garbage_prefix_is_discarded() {
        let mut stream = vec![0xAA, 0xBB, 0xCC];
        stream.extend(encode(cmd::AISLE_STATUS_RESPONSE, &[9, 0x02, 0x00, 0x05]).unwrap());
        let mut dec = FrameDecoder::new();
        let frames = dec.feed(&stream);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].command, cmd::AISLE_STATUS_RESPONSE);
    }

    #[test]
    fn two_concatenated_frames_decode_in_order() {
        let mut stream = encode(cmd::POLL, &[]).unwrap();
        stream.extend(encode(cmd::ACK, &[]).unwrap());
        let mut dec = FrameDecoder::new();
        let frames = dec.feed(&stream);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].command, cmd::POLL);
        assert_eq!(frames[1].command, cmd::ACK);
    }

    #[test]
    fn truncated_frame_awaits_more_bytes() {
        let encoded = encode(cmd::CHECK_AISLE, &[1, 0, 5]).unwrap();
        let mid = encoded.len() - 1;
        let mut dec = FrameDecoder::new();
        assert!(dec.feed(&encoded[..mid]).is_empty());
        let frames = dec.feed(&encoded[mid..]);
        assert_eq!(frames.len(), 1);
    }

    #[test]
    fn byte_at_a_time_reassembly() {
        let encoded = encode(cmd::REQUEST_SYNC, &[3]).unwrap();
        let mut dec = FrameDecoder::new();
        let mut frames = Vec::new();
        for byte in &encoded {
            frames.extend(dec.feed(&[*byte]));
        }
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].command, cmd::REQUEST_SYNC);
    }

    #[test]
    fn single_bit_flip_is_rejected_and_resynchronises() {
        let mut corrupt = encode(cmd::POLL, &[]).unwrap();
        let last = corrupt.len() - 1;
        corrupt[last] ^= 0x01; // flip one bit of the checksum byte
        corrupt.extend(encode(cmd::ACK, &[]).unwrap());

        let mut dec = FrameDecoder::new();
        let (frames, diagnostics) = dec.feed_with_diagnostics(&corrupt);
        // The corrupt POLL frame is dropped; only the trailing ACK decodes.
        assert_eq!(frames, vec![Frame { command: cmd::ACK, text: vec![] }]);
        assert!(matches!(diagnostics[0], FrameDiagnostic::ChecksumMismatch { .. }));
    }

    #[test]
    fn unknown_command_byte_is_dropped_not_fatal() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&STX);
        buf.push(0x99); // unknown command
        buf.push(0);
        let xor = xor_checksum(&buf);
        buf.push(xor);
        buf.extend(encode(cmd::ACK, &[]).unwrap());

        let mut dec = FrameDecoder::new();
        let (frames, diagnostics) = dec.feed_with_diagnostics(&buf);
        assert_eq!(frames, vec![Frame { command: cmd::ACK, text: vec![] }]);
        assert_eq!(diagnostics, vec![FrameDiagnostic::UnknownCommand(0x99)]);
    }

    #[test]
    fn empty_buffer_awaits_more() {
        let mut dec = FrameDecoder::new();
        assert!(dec.feed(&[]).is_empty());
    }

    #[test]
    fn trailing_lone_stx_byte_is_retained_across_feeds() {
        let encoded = encode(cmd::ACK, &[]).unwrap();
        let mut dec = FrameDecoder::new();
        // Garbage ending in a lone first-STX-byte must not be discarded --
        // it may be the start of the very next frame.
        assert!(dec.feed(&[0xAA, 0xBB, STX[0]]).is_empty());
        let frames = dec.feed(&encoded[1..]);
        assert_eq!(frames, vec![Frame { command: cmd::ACK, text: vec![] }]);
    }
}
