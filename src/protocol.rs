/// JSON message protocol between the tracker and its host.
///
/// All messages are newline-delimited JSON (NDJSON). The status message
/// carries the live roster and the full persisted audit log; it is the
/// structured export consumed by the HTTP layer as well.
use serde::{Deserialize, Serialize};

use crate::registry::Identifier;

/// One roster entry in a status export
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceAge {
    pub id: Identifier,
    /// Milliseconds since the device was last seen
    pub age_ms: u32,
}

/// Messages sent from the device to the host
#[derive(Debug, Serialize)]
#[serde(tag = "type")]
pub enum DeviceMessage<'a> {
    /// Tracker status export
    #[serde(rename = "status")]
    Status {
        /// Ingestion mode: "passive", "active", "hybrid"
        mode: &'static str,
        /// Uptime in seconds
        uptime: u32,
        /// Board identifier
        board: &'static str,
        /// Firmware version
        version: &'static str,
        /// Frames ingested by passive capture
        frames: u32,
        /// Frames dropped as malformed
        dropped: u32,
        devices: &'a [DeviceAge],
        /// Persisted audit log text
        log: &'a str,
    },
    /// Outcome of an active scan cycle
    #[serde(rename = "scan")]
    Scan {
        /// "completed", "empty", "timeout", "failed"
        outcome: &'static str,
        found: u16,
    },
}

/// Commands sent from the host to the device.
///
/// Deserialized through [`RawCommand`] in `comm::parse_command()` because
/// `serde_json_core` does not support internally tagged enums.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostCommand {
    /// Run an active scan now
    Scan,
    /// Empty the device roster
    Clear,
    /// Request a status export
    Status,
}

/// Wire format for host commands: `{"cmd":"scan"}`
#[derive(Deserialize)]
pub(crate) struct RawCommand {
    pub cmd: heapless::String<16>,
}

/// Firmware version string
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Maximum length of an incoming command line
pub const MAX_CMD_LEN: usize = 128;
