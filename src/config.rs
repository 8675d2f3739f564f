/// Runtime configuration for the presence tracker.
///
/// All intervals are in milliseconds of the device-local monotonic clock.

/// Which ingestion paths feed the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Promiscuous frame capture only
    Passive,
    /// Periodic active scans only
    Active,
    /// Both capture and scanning
    Hybrid,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Passive => "passive",
            Mode::Active => "active",
            Mode::Hybrid => "hybrid",
        }
    }

    pub fn captures(&self) -> bool {
        matches!(self, Mode::Passive | Mode::Hybrid)
    }

    pub fn scans(&self) -> bool {
        matches!(self, Mode::Active | Mode::Hybrid)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TrackerConfig {
    pub mode: Mode,
    /// Period between active scans
    pub scan_interval_ms: u32,
    /// Hard cap on one scan cycle's completion wait
    pub scan_timeout_ms: u32,
    /// Delay between completion checks while a scan runs
    pub scan_poll_ms: u32,
    /// Report networks with a hidden SSID as well
    pub include_hidden: bool,
    /// Records unseen for longer than this are expired
    pub expiry_timeout_ms: u32,
    /// Period between log flushes to persistent storage
    pub flush_interval_ms: u32,
    /// Cooperative yield at the end of each control loop pass
    pub loop_yield_ms: u32,
}

impl TrackerConfig {
    pub const fn new() -> Self {
        Self {
            mode: Mode::Hybrid,
            scan_interval_ms: 8_000,
            scan_timeout_ms: 6_000,
            scan_poll_ms: 100,
            include_hidden: true,
            expiry_timeout_ms: 30_000,
            flush_interval_ms: 15_000,
            loop_yield_ms: 10,
        }
    }
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self::new()
    }
}
