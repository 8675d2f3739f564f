/// Passive capture ingestion: raw 802.11 frames to device identifiers.
///
/// The transmitter address (Address 2) sits at a fixed offset in every
/// frame header. Frames too short to hold a full header are dropped
/// without any registry mutation or log line.
///
/// Safe to call from the capture callback context (no allocation, no
/// blocking).
use core::fmt::Write;

use ieee80211::match_frames;
use ieee80211::mgmt_frame::{BeaconFrame, ProbeRequestFrame, ProbeResponseFrame};
use thiserror::Error;

use crate::registry::RegistryError;

/// Shortest frame that carries a complete source-address field:
/// 2 (frame ctrl) + 2 (duration) + 3 × 6 (addresses) + 2 (sequence ctrl)
pub const MIN_FRAME_LEN: usize = 24;

/// Offset of Address 2 (transmitter) in the MAC header
pub const SOURCE_ADDR_OFFSET: usize = 10;

/// Rendered MAC address ("AA:BB:CC:DD:EE:FF")
pub type MacString = heapless::String<18>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CaptureError {
    #[error("frame of {len} bytes is shorter than a MAC header")]
    MalformedFrame { len: usize },
    #[error("registry rejected address: {0}")]
    Registry(#[from] RegistryError),
}

/// WiFi frame type classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    Beacon,
    ProbeRequest,
    ProbeResponse,
    Data,
    Other,
}

impl FrameType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FrameType::Beacon => "beacon",
            FrameType::ProbeRequest => "probe_req",
            FrameType::ProbeResponse => "probe_resp",
            FrameType::Data => "data",
            FrameType::Other => "other",
        }
    }
}

/// A frame accepted for ingestion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapturedFrame {
    pub source: [u8; 6],
    pub frame_type: FrameType,
}

/// Extract the transmitter address at [`SOURCE_ADDR_OFFSET`].
pub fn source_address(frame: &[u8]) -> Result<[u8; 6], CaptureError> {
    if frame.len() < MIN_FRAME_LEN {
        return Err(CaptureError::MalformedFrame { len: frame.len() });
    }
    let mut mac = [0u8; 6];
    mac.copy_from_slice(&frame[SOURCE_ADDR_OFFSET..SOURCE_ADDR_OFFSET + 6]);
    Ok(mac)
}

/// Classify a frame with the ieee80211 parser.
///
/// Management frames the parser understands are reported by subtype; the
/// rest fall back to the frame control type bits.
pub fn classify(frame: &[u8]) -> FrameType {
    let result = match_frames! {
        frame,
        _beacon = BeaconFrame<'_> => {
            FrameType::Beacon
        }
        _probe_req = ProbeRequestFrame<'_> => {
            FrameType::ProbeRequest
        }
        _probe_resp = ProbeResponseFrame<'_> => {
            FrameType::ProbeResponse
        }
    };

    match result {
        Ok(frame_type) => frame_type,
        Err(_) => match frame.first().map(|fc| (fc >> 2) & 0x3) {
            Some(2) => FrameType::Data,
            _ => FrameType::Other,
        },
    }
}

/// Validate and decode a raw frame.
pub fn parse_frame(frame: &[u8]) -> Result<CapturedFrame, CaptureError> {
    let source = source_address(frame)?;
    Ok(CapturedFrame {
        source,
        frame_type: classify(frame),
    })
}

/// Format a 6-byte MAC address into "AA:BB:CC:DD:EE:FF" string
pub fn format_mac(mac: &[u8; 6]) -> MacString {
    let mut buf = MacString::new();
    let _ = write!(
        buf,
        "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
        mac[0], mac[1], mac[2], mac[3], mac[4], mac[5]
    );
    buf
}

/// Per-type counters for captured frames.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureStats {
    pub beacons: u32,
    pub probe_requests: u32,
    pub probe_responses: u32,
    pub data: u32,
    pub other: u32,
    /// Frames rejected as malformed
    pub dropped: u32,
}

impl CaptureStats {
    pub const fn new() -> Self {
        Self {
            beacons: 0,
            probe_requests: 0,
            probe_responses: 0,
            data: 0,
            other: 0,
            dropped: 0,
        }
    }

    pub fn count(&mut self, frame_type: FrameType) {
        let slot = match frame_type {
            FrameType::Beacon => &mut self.beacons,
            FrameType::ProbeRequest => &mut self.probe_requests,
            FrameType::ProbeResponse => &mut self.probe_responses,
            FrameType::Data => &mut self.data,
            FrameType::Other => &mut self.other,
        };
        *slot = slot.wrapping_add(1);
    }

    pub fn count_dropped(&mut self) {
        self.dropped = self.dropped.wrapping_add(1);
    }

    /// Frames that reached the registry
    pub fn accepted(&self) -> u32 {
        self.beacons
            .wrapping_add(self.probe_requests)
            .wrapping_add(self.probe_responses)
            .wrapping_add(self.data)
            .wrapping_add(self.other)
    }
}
