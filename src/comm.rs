/// Serial NDJSON transport helpers.
///
/// Status exports and scan reports go out as newline-delimited JSON;
/// commands come in the same way, one object per line.
use alloc::vec::Vec;

use crate::board;
use crate::protocol::{DeviceMessage, HostCommand, RawCommand, MAX_CMD_LEN};
use crate::scan::ScanOutcome;

/// Fixed serialization overhead of a status message outside its
/// variable-length fields
const MESSAGE_BASE_LEN: usize = 256;

/// Worst-case encoded size of one roster entry
const DEVICE_ENTRY_LEN: usize = 64;

/// Serialize a DeviceMessage to a newline-terminated JSON buffer.
///
/// The buffer is sized from the exact escaped length of the log text and
/// allocated fallibly. Returns None if the message would exceed
/// [`board::MAX_EXPORT_LEN`], the allocation failed, or serialization
/// failed.
pub fn serialize_message(msg: &DeviceMessage) -> Option<Vec<u8>> {
    let capacity = match msg {
        DeviceMessage::Status { devices, log, .. } => MESSAGE_BASE_LEN
            .checked_add(devices.len().checked_mul(DEVICE_ENTRY_LEN)?)?
            .checked_add(escaped_len(log))?,
        DeviceMessage::Scan { .. } => MESSAGE_BASE_LEN,
    };
    if capacity > board::MAX_EXPORT_LEN {
        log::warn!(
            "Message needs {} bytes, limit is {}",
            capacity,
            board::MAX_EXPORT_LEN
        );
        return None;
    }

    let mut buf = Vec::new();
    if buf.try_reserve_exact(capacity + 1).is_err() {
        log::warn!("Cannot allocate {} bytes for message", capacity);
        return None;
    }
    buf.resize(capacity, 0);
    let len = serde_json_core::to_slice(msg, &mut buf).ok()?;
    buf.truncate(len);
    buf.push(b'\n');
    Some(buf)
}

/// Length of `text` once encoded as a JSON string body.
fn escaped_len(text: &str) -> usize {
    text.bytes()
        .map(|b| match b {
            b'\\' | b'"' | 0x08 | b'\t' | b'\n' | 0x0c | b'\r' => 2,
            0x00..=0x1f => 6,
            _ => 1,
        })
        .sum()
}

/// Serialize the report for a finished scan cycle.
pub fn serialize_scan(outcome: &ScanOutcome) -> Option<Vec<u8>> {
    serialize_message(&DeviceMessage::Scan {
        outcome: outcome.as_str(),
        found: outcome.found(),
    })
}

/// Deserialize a HostCommand from a JSON byte slice.
pub fn parse_command(data: &[u8]) -> Option<HostCommand> {
    let trimmed = trim_trailing_whitespace(data);
    if trimmed.is_empty() {
        return None;
    }
    let (raw, _) = serde_json_core::from_slice::<RawCommand>(trimmed).ok()?;
    match raw.cmd.as_str() {
        "scan" => Some(HostCommand::Scan),
        "clear" => Some(HostCommand::Clear),
        "status" => Some(HostCommand::Status),
        other => {
            log::warn!("Unknown command '{}'", other);
            None
        }
    }
}

// ── Serial NDJSON reader ───────────────────────────────────────────────

/// Serial NDJSON reader state machine.
/// Accumulates bytes until a newline is found, then yields the line.
pub struct LineReader {
    buf: [u8; MAX_CMD_LEN],
    pos: usize,
}

impl LineReader {
    pub const fn new() -> Self {
        Self {
            buf: [0; MAX_CMD_LEN],
            pos: 0,
        }
    }

    /// Feed a byte into the reader. Returns a complete line (without newline)
    /// when one is detected.
    pub fn feed(&mut self, byte: u8) -> Option<&[u8]> {
        if byte == b'\n' || byte == b'\r' {
            if self.pos > 0 {
                let line = &self.buf[..self.pos];
                self.pos = 0;
                Some(line)
            } else {
                None
            }
        } else if self.pos < self.buf.len() {
            self.buf[self.pos] = byte;
            self.pos += 1;
            None
        } else {
            // Overflow, discard and reset
            self.pos = 0;
            None
        }
    }
}

impl Default for LineReader {
    fn default() -> Self {
        Self::new()
    }
}

fn trim_trailing_whitespace(data: &[u8]) -> &[u8] {
    let end = data
        .iter()
        .rposition(|b| !matches!(b, b' ' | b'\n' | b'\r' | b'\t'))
        .map_or(0, |i| i + 1);
    &data[..end]
}
