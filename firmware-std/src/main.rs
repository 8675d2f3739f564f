//! PresenceHound — ESP-IDF std firmware
//!
//! One cooperative control loop on the main thread drives active scans,
//! expiry sweeps and audit log flushes. Frames arrive through the WiFi
//! promiscuous callback; host commands arrive as NDJSON on the serial
//! console and are funneled through the same loop, so the registry guard
//! is only ever contended by the capture callback.

mod radio;
mod storage;

use std::io::Read;
use std::sync::mpsc::{self, SyncSender};
use std::thread;
use std::time::Duration;

use esp_idf_svc::hal::peripherals::Peripherals;
use esp_idf_svc::sys::{
    esp, esp_wifi_set_promiscuous, esp_wifi_set_promiscuous_rx_cb, wifi_promiscuous_pkt_t,
    wifi_promiscuous_pkt_type_t,
};
use esp_idf_svc::wifi::{BlockingWifi, EspWifi};
use esp_idf_svc::{eventloop::EspSystemEventLoop, nvs::EspDefaultNvsPartition};

use presencehound::board::{self, REGISTRY_CAPACITY};
use presencehound::comm::{self, LineReader};
use presencehound::log_buffer::LogStore;
use presencehound::protocol::{HostCommand, VERSION};
use presencehound::scan::ScanProvider;
use presencehound::{Engine, SharedTracker, TrackerConfig};

use radio::{EspClock, EspScanner};
use storage::FileLogStore;

// ── Shared state ─────────────────────────────────────────────────────

/// The promiscuous callback has no context pointer, so the tracker it
/// feeds lives in a static. Everything else reaches it by reference.
static TRACKER: SharedTracker<REGISTRY_CAPACITY> = SharedTracker::new();

// ── WiFi promiscuous callback ────────────────────────────────────────

/// WiFi promiscuous mode callback.
///
/// Runs in the WiFi driver task context and must be non-blocking. The
/// frame buffer is only borrowed for the duration of the call.
unsafe extern "C" fn promisc_rx_cb(
    buf: *mut std::ffi::c_void,
    _pkt_type: wifi_promiscuous_pkt_type_t,
) {
    let pkt = unsafe { &*(buf as *const wifi_promiscuous_pkt_t) };
    let sig_len = pkt.rx_ctrl.sig_len() as usize;

    if sig_len == 0 {
        return;
    }

    // Safety: payload is `sig_len` bytes starting at pkt.payload
    let payload = unsafe { std::slice::from_raw_parts(pkt.payload.as_ptr(), sig_len) };

    // Malformed frames are dropped silently
    let _ = TRACKER.ingest_frame(payload, &EspClock);
}

fn main() -> anyhow::Result<()> {
    // Bind the ESP-IDF logger to the `log` facade
    esp_idf_svc::log::EspLogger::initialize_default();

    let clock = EspClock::start();
    let config = TrackerConfig::new();

    log::info!(
        "PresenceHound v{} starting on {} (std)",
        VERSION,
        board::BOARD_NAME
    );
    log::info!(
        "Mode {}, roster capacity {}, expiry {} ms",
        config.mode.as_str(),
        REGISTRY_CAPACITY,
        config.expiry_timeout_ms,
    );

    // ── Peripherals ──────────────────────────────────────────────────

    let peripherals = Peripherals::take()?;
    let sys_loop = EspSystemEventLoop::take()?;
    let nvs = EspDefaultNvsPartition::take()?;

    // ── Storage ──────────────────────────────────────────────────────

    // Without storage the audit log stays in memory and every flush retries
    if let Err(e) = storage::mount_spiffs() {
        log::warn!("SPIFFS mount failed: {}", e);
    }

    // ── Serial command thread ────────────────────────────────────────

    let (cmd_tx, cmd_rx) = mpsc::sync_channel::<HostCommand>(4);
    thread::Builder::new()
        .name("serial".into())
        .stack_size(4096)
        .spawn(move || {
            serial_command_thread(cmd_tx);
        })?;
    log::info!("Serial command thread spawned");

    // ── WiFi ─────────────────────────────────────────────────────────

    let mut wifi = BlockingWifi::wrap(
        EspWifi::new(peripherals.modem, sys_loop.clone(), Some(nvs))?,
        sys_loop,
    )?;
    wifi.set_configuration(&esp_idf_svc::wifi::Configuration::Client(Default::default()))?;
    wifi.start()?;

    if config.mode.captures() {
        unsafe {
            esp!(esp_wifi_set_promiscuous_rx_cb(Some(promisc_rx_cb)))?;
            esp!(esp_wifi_set_promiscuous(true))?;
        }
        log::info!("WiFi sniffer initialized in promiscuous mode");
    }

    // ── Control loop ─────────────────────────────────────────────────

    let mut engine = Engine::new(
        &TRACKER,
        EspScanner::new(wifi),
        FileLogStore::new(board::LOG_FILE_PATH),
        clock,
        config,
    );

    loop {
        while let Ok(cmd) = cmd_rx.try_recv() {
            handle_command(&mut engine, cmd);
        }

        let report = engine.run_pass();
        if report.expired > 0 {
            log::info!(
                "{} devices lost, {} present",
                report.expired,
                TRACKER.len()
            );
        }

        thread::sleep(Duration::from_millis(config.loop_yield_ms as u64));
    }
}

// ── Host commands ────────────────────────────────────────────────────

fn handle_command<const N: usize, P, S>(
    engine: &mut Engine<'_, N, P, S, EspClock>,
    cmd: HostCommand,
) where
    P: ScanProvider,
    S: LogStore,
{
    match cmd {
        HostCommand::Scan => {
            log::info!("Scan requested by host command");
            let outcome = engine.trigger_scan();
            if let Some(msg) = comm::serialize_scan(&outcome) {
                emit(&msg);
            }
        }
        HostCommand::Clear => {
            log::info!("Registry clear requested by host command");
            engine.clear_registry();
        }
        HostCommand::Status => {
            let uptime = engine.clock().uptime_secs();
            if let Some(msg) = engine.status_json(board::BOARD_NAME, uptime) {
                emit(&msg);
            }
        }
    }
}

/// Write an NDJSON message to the serial console.
fn emit(msg: &[u8]) {
    if let Ok(s) = std::str::from_utf8(msg) {
        log::info!("{}", s.trim_end());
    }
}

fn serial_command_thread(cmd_tx: SyncSender<HostCommand>) {
    log::info!("Serial command thread started");

    let mut reader = LineReader::new();
    let mut stdin = std::io::stdin();
    let mut byte = [0u8; 1];

    loop {
        match stdin.read(&mut byte) {
            Ok(1) => {
                if let Some(line) = reader.feed(byte[0]) {
                    if let Some(cmd) = comm::parse_command(line) {
                        let _ = cmd_tx.try_send(cmd);
                    }
                }
            }
            // Console not ready or nothing buffered yet
            _ => thread::sleep(Duration::from_millis(50)),
        }
    }
}
