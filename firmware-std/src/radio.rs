/// ESP-IDF radio glue: monotonic clock and the active scan provider.
use std::sync::OnceLock;
use std::thread;
use std::time::{Duration, Instant};

use esp_idf_svc::wifi::config::ScanConfig;
use esp_idf_svc::wifi::{AccessPointInfo, BlockingWifi, EspWifi};
use presencehound::capture::format_mac;
use presencehound::scan::{Clock, ScanError, ScanPoll, ScanProvider};
use presencehound::Identifier;

/// Boot time, captured once in main, used for uptime and timestamps.
static BOOT_INSTANT: OnceLock<Instant> = OnceLock::new();

/// Milliseconds since boot, truncated to `u32`. Usable from the capture
/// callback (no locking).
#[derive(Debug, Clone, Copy)]
pub struct EspClock;

impl EspClock {
    pub fn start() -> Self {
        let _ = BOOT_INSTANT.set(Instant::now());
        Self
    }

    fn elapsed() -> Duration {
        BOOT_INSTANT.get().map(Instant::elapsed).unwrap_or_default()
    }

    pub fn uptime_secs(&self) -> u32 {
        Self::elapsed().as_secs() as u32
    }
}

impl Clock for EspClock {
    fn now_ms(&self) -> u32 {
        (Self::elapsed().as_millis() & 0xFFFF_FFFF) as u32
    }

    fn delay_ms(&self, ms: u32) {
        thread::sleep(Duration::from_millis(ms as u64));
    }
}

/// ESP-IDF runs a single scan at a time, so the handle carries no state.
pub struct ScanHandle;

/// Non-blocking station scan through esp-idf-svc.
pub struct EspScanner<'w> {
    wifi: BlockingWifi<EspWifi<'w>>,
    results: Vec<AccessPointInfo>,
    done: bool,
}

impl<'w> EspScanner<'w> {
    pub fn new(wifi: BlockingWifi<EspWifi<'w>>) -> Self {
        Self {
            wifi,
            results: Vec::new(),
            done: false,
        }
    }
}

impl ScanProvider for EspScanner<'_> {
    type Handle = ScanHandle;

    fn start_scan(&mut self, include_hidden: bool) -> Result<ScanHandle, ScanError> {
        let config = ScanConfig {
            show_hidden: include_hidden,
            ..Default::default()
        };
        self.results.clear();
        self.done = false;
        self.wifi
            .wifi_mut()
            .start_scan(&config, false)
            .map_err(|e| {
                log::warn!("Scan start failed: {}", e);
                ScanError::StartFailed
            })?;
        Ok(ScanHandle)
    }

    fn poll(&mut self, _handle: &ScanHandle) -> ScanPoll {
        if self.done {
            return ScanPoll::Done(self.results.len().min(u16::MAX as usize) as u16);
        }
        match self.wifi.wifi().is_scan_done() {
            Ok(false) => ScanPoll::Running,
            Ok(true) => match self.wifi.wifi_mut().get_scan_result() {
                Ok(results) => {
                    self.results = results;
                    self.done = true;
                    ScanPoll::Done(self.results.len().min(u16::MAX as usize) as u16)
                }
                Err(e) => {
                    log::warn!("Scan result fetch failed: {}", e);
                    ScanPoll::Error
                }
            },
            Err(e) => {
                log::warn!("Scan status query failed: {}", e);
                ScanPoll::Error
            }
        }
    }

    fn result(&mut self, _handle: &ScanHandle, index: u16) -> Option<Identifier> {
        let ap = self.results.get(index as usize)?;
        Identifier::try_from(format_mac(&ap.bssid).as_str()).ok()
    }

    fn release(&mut self, _handle: ScanHandle) {
        if !self.done {
            let _ = self.wifi.wifi_mut().stop_scan();
        }
        self.results = Vec::new();
        self.done = false;
    }
}
