//! PresenceHound library — portable device presence tracking engine.
//!
//! Keeps a bounded, continuously aged roster of the wireless devices in
//! range and an append-only audit trail of presence events. Devices are
//! fed in from two paths: passive capture of raw 802.11 frames and
//! periodic active scans. All logic is platform independent and testable
//! on any host with `cargo test`; the firmware binary is a thin consumer
//! that provides the radio, the clock and the log storage.
//!
//! Modules, leaf first:
//! - `log_buffer`: in-memory audit lines and the persistent store contract
//! - `registry`: fixed-capacity roster with oldest-overwrite and expiry
//! - `capture`, `scan`: the two ingestion paths
//! - `scheduler`: wraparound-safe interval timers
//! - `engine`: shared tracker and the cooperative control loop pass
//! - `protocol`, `comm`: NDJSON status export and host commands

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod board;
pub mod capture;
pub mod comm;
pub mod config;
pub mod engine;
pub mod log_buffer;
pub mod protocol;
pub mod registry;
pub mod scan;
pub mod scheduler;

#[cfg(test)]
mod testutil;

pub use config::{Mode, TrackerConfig};
pub use engine::{Engine, PassReport, SharedTracker, Tracker};
pub use registry::{Event, Identifier, Registry, RegistryError};
