/// Board identity and storage layout.
///
/// Each board module defines the constants the firmware needs,
/// selected at compile time via feature flags.

#[cfg(feature = "board-xiao")]
mod hw {
    pub const BOARD_NAME: &str = "xiao_esp32s3";
    pub const HAS_PSRAM: bool = true;
    /// Devices held in the presence roster
    pub const REGISTRY_CAPACITY: usize = 80;
}

#[cfg(feature = "board-m5stickc")]
mod hw {
    pub const BOARD_NAME: &str = "m5stickc_plus2";
    pub const HAS_PSRAM: bool = false;
    pub const REGISTRY_CAPACITY: usize = 80;
}

#[cfg(not(any(feature = "board-xiao", feature = "board-m5stickc")))]
mod hw {
    pub const BOARD_NAME: &str = "unknown";
    pub const HAS_PSRAM: bool = false;
    pub const REGISTRY_CAPACITY: usize = 80;
}

pub use hw::*;

/// Mount point of the SPIFFS partition holding the audit log
pub const STORAGE_BASE_PATH: &str = "/spiffs";

/// Audit log file, the single logical name of the persistent log store
pub const LOG_FILE_PATH: &str = "/spiffs/presence.log";

/// Largest serialized message the firmware will allocate. Without PSRAM
/// the status export has to fit in internal heap next to the WiFi stack.
pub const MAX_EXPORT_LEN: usize = if HAS_PSRAM { 256 * 1024 } else { 32 * 1024 };
