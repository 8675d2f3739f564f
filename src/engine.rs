/// Presence tracking engine.
///
/// [`Tracker`] owns the device registry, the audit log buffer and the
/// capture counters. [`SharedTracker`] puts it behind a critical section so
/// the capture callback and the control loop never observe a partially
/// updated record; each guarded section covers exactly one operation and
/// samples the clock inside the guard. [`Engine`] is the control loop side:
/// it owns the schedule, the scan provider, the log store and the clock.
use alloc::string::String;
use alloc::vec::Vec;
use core::cell::RefCell;

use critical_section::Mutex;

use crate::capture::{self, CaptureError, CaptureStats};
use crate::comm;
use crate::config::TrackerConfig;
use crate::log_buffer::{self, LogBuffer, LogStore, StoreError};
use crate::protocol::{DeviceAge, DeviceMessage, VERSION};
use crate::registry::{Event, Identifier, Registry, RegistryError};
use crate::scan::{self, Clock, ScanOutcome, ScanProvider, ScanSettings};
use crate::scheduler::Schedule;

#[derive(Debug, Default)]
pub struct Tracker<const N: usize> {
    pub registry: Registry<N>,
    pub log: LogBuffer,
    pub stats: CaptureStats,
}

impl<const N: usize> Tracker<N> {
    pub const fn new() -> Self {
        Self {
            registry: Registry::new(),
            log: LogBuffer::new(),
            stats: CaptureStats::new(),
        }
    }

    pub fn insert_or_touch(&mut self, raw: &str, now: u32) -> Result<Event, RegistryError> {
        self.registry.insert_or_touch(raw, now, &mut self.log)
    }

    /// Passive capture path. Malformed frames are counted and dropped.
    pub fn ingest_frame(&mut self, frame: &[u8], now: u32) -> Result<Event, CaptureError> {
        let captured = match capture::parse_frame(frame) {
            Ok(captured) => captured,
            Err(e) => {
                self.stats.count_dropped();
                return Err(e);
            }
        };
        self.stats.count(captured.frame_type);
        let mac = capture::format_mac(&captured.source);
        Ok(self.insert_or_touch(&mac, now)?)
    }

    pub fn expire_stale(&mut self, now: u32, timeout: u32) -> heapless::Vec<Identifier, N> {
        self.registry.expire_stale(now, timeout, &mut self.log)
    }

    pub fn clear(&mut self) {
        self.registry.clear(&mut self.log);
    }

    pub fn snapshot(&self, now: u32) -> Vec<DeviceAge> {
        self.registry
            .snapshot(now)
            .into_iter()
            .map(|(id, age_ms)| DeviceAge { id, age_ms })
            .collect()
    }
}

/// Tracker shared between the capture callback and the control loop.
pub struct SharedTracker<const N: usize> {
    inner: Mutex<RefCell<Tracker<N>>>,
}

impl<const N: usize> SharedTracker<N> {
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(RefCell::new(Tracker::new())),
        }
    }

    /// Run `f` with exclusive access to the tracker.
    pub fn with<R>(&self, f: impl FnOnce(&mut Tracker<N>) -> R) -> R {
        critical_section::with(|cs| {
            let mut tracker = self.inner.borrow_ref_mut(cs);
            f(&mut *tracker)
        })
    }

    pub fn insert_or_touch<C: Clock>(&self, raw: &str, clock: &C) -> Result<Event, RegistryError> {
        self.with(|t| t.insert_or_touch(raw, clock.now_ms()))
    }

    pub fn ingest_frame<C: Clock>(&self, frame: &[u8], clock: &C) -> Result<Event, CaptureError> {
        self.with(|t| t.ingest_frame(frame, clock.now_ms()))
    }

    pub fn len(&self) -> usize {
        self.with(|t| t.registry.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<const N: usize> Default for SharedTracker<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// What one control loop pass did.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PassReport {
    pub scan: Option<ScanOutcome>,
    pub expired: usize,
    pub flushed: Option<Result<usize, StoreError>>,
}

/// Control loop side of the tracker.
pub struct Engine<'t, const N: usize, P, S, C> {
    tracker: &'t SharedTracker<N>,
    scanner: P,
    store: S,
    clock: C,
    config: TrackerConfig,
    schedule: Schedule,
}

impl<'t, const N: usize, P, S, C> Engine<'t, N, P, S, C>
where
    P: ScanProvider,
    S: LogStore,
    C: Clock,
{
    pub fn new(
        tracker: &'t SharedTracker<N>,
        scanner: P,
        store: S,
        clock: C,
        config: TrackerConfig,
    ) -> Self {
        let schedule = Schedule::new(&config, clock.now_ms());
        Self {
            tracker,
            scanner,
            store,
            clock,
            config,
            schedule,
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn tracker(&self) -> &'t SharedTracker<N> {
        self.tracker
    }

    /// One pass of the control loop: scan if due, sweep stale records,
    /// flush the log if due. The caller yields between passes.
    pub fn run_pass(&mut self) -> PassReport {
        let due = self.schedule.poll(self.clock.now_ms());
        let mut report = PassReport::default();

        if due.scan && self.config.mode.scans() {
            report.scan = Some(self.scan_now());
        }

        let timeout = self.config.expiry_timeout_ms;
        let clock = &self.clock;
        report.expired = self
            .tracker
            .with(|t| t.expire_stale(clock.now_ms(), timeout).len());

        if due.flush {
            report.flushed = Some(self.flush_log());
        }

        report
    }

    /// Run a scan immediately and restart the scan interval.
    ///
    /// Blocks for up to the scan timeout.
    pub fn trigger_scan(&mut self) -> ScanOutcome {
        let outcome = self.scan_now();
        self.schedule.scan.reset(self.clock.now_ms());
        outcome
    }

    fn scan_now(&mut self) -> ScanOutcome {
        let settings = ScanSettings {
            timeout_ms: self.config.scan_timeout_ms,
            poll_ms: self.config.scan_poll_ms,
            include_hidden: self.config.include_hidden,
        };
        let tracker = self.tracker;
        let clock = &self.clock;
        let outcome = scan::run_active_scan(&mut self.scanner, clock, &settings, |id| {
            if let Err(e) = tracker.insert_or_touch(id, clock) {
                log::warn!("Scan result {} not recorded: {}", id, e);
            }
        });
        match outcome {
            ScanOutcome::Completed { found } => log::info!("Scan found {} networks", found),
            ScanOutcome::Empty => log::info!("Scan found no networks"),
            ScanOutcome::TimedOut { elapsed_ms } => {
                log::info!("Scan timed out after {} ms", elapsed_ms)
            }
            ScanOutcome::Failed(e) => log::warn!("Scan failed: {}", e),
        }
        outcome
    }

    pub fn clear_registry(&mut self) {
        self.tracker.with(|t| t.clear());
        log::info!("Registry cleared");
    }

    /// Move the buffered log lines to the store.
    ///
    /// The registry guard is released while the store is written. On
    /// failure the lines go back in front of anything logged meanwhile.
    pub fn flush_log(&mut self) -> Result<usize, StoreError> {
        let pending = self.tracker.with(|t| t.log.take());
        if pending.is_empty() {
            return Ok(0);
        }
        match log_buffer::append_to_store(&mut self.store, pending.as_bytes()) {
            Ok(()) => {
                log::debug!("Flushed {} bytes of audit log", pending.len());
                Ok(pending.len())
            }
            Err(e) => {
                log::warn!("Log flush deferred: {}", e);
                self.tracker.with(|t| t.log.restore(pending));
                Err(e)
            }
        }
    }

    /// Full persisted audit log. A store read failure yields what was read.
    pub fn persisted_log(&mut self) -> String {
        let mut text = String::new();
        if let Err(e) = self.store.read_to(&mut text) {
            log::warn!("Log store read failed: {}", e);
        }
        text
    }

    /// Serialized status export: mode, uptime, roster ages and the
    /// persisted log, newline terminated. None if the export is too large
    /// to allocate.
    pub fn status_json(&mut self, board: &'static str, uptime_secs: u32) -> Option<Vec<u8>> {
        let log = self.persisted_log();
        let clock = &self.clock;
        let (devices, stats) = self
            .tracker
            .with(|t| (t.snapshot(clock.now_ms()), t.stats));

        let msg = DeviceMessage::Status {
            mode: self.config.mode.as_str(),
            uptime: uptime_secs,
            board,
            version: VERSION,
            frames: stats.accepted(),
            dropped: stats.dropped,
            devices: &devices,
            log: &log,
        };
        comm::serialize_message(&msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Mode;
    use crate::testutil::{ManualClock, MemoryStore, ScriptedScanner, TickClock};

    fn frame_from(addr2: [u8; 6]) -> [u8; 24] {
        let mut frame = [0u8; 24];
        frame[0] = 0x08;
        frame[10..16].copy_from_slice(&addr2);
        frame
    }

    fn engine<'t, const N: usize>(
        tracker: &'t SharedTracker<N>,
        scanner: ScriptedScanner,
        clock: &'t ManualClock,
        config: TrackerConfig,
    ) -> Engine<'t, N, ScriptedScanner, MemoryStore, &'t ManualClock> {
        Engine::new(tracker, scanner, MemoryStore::new(), clock, config)
    }

    // ── Tracker ─────────────────────────────────────────────────────

    #[test]
    fn captured_frame_lands_in_registry() {
        let mut tracker = Tracker::<4>::new();

        let event = tracker.ingest_frame(&frame_from([0xaa, 0xbb, 0xcc, 1, 2, 3]), 7);

        assert!(matches!(event, Ok(Event::Inserted(ref id)) if id == "AABBCC010203"));
        assert_eq!(tracker.log.as_str(), "AABBCC010203 inserted\n");
        assert_eq!(tracker.stats.data, 1);
    }

    #[test]
    fn malformed_frame_changes_nothing() {
        let mut tracker = Tracker::<80>::new();

        let event = tracker.ingest_frame(&[0u8; 10], 7);

        assert_eq!(event, Err(CaptureError::MalformedFrame { len: 10 }));
        assert!(tracker.registry.is_empty());
        assert!(tracker.log.is_empty());
        assert_eq!(tracker.stats.dropped, 1);
    }

    #[test]
    fn capture_and_scan_share_identity() {
        let mut tracker = Tracker::<4>::new();
        tracker
            .ingest_frame(&frame_from([0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]), 0)
            .unwrap();

        let event = tracker.insert_or_touch("aabbccddeeff", 10);

        assert_eq!(event, Ok(Event::Touched));
        assert_eq!(tracker.registry.len(), 1);
    }

    #[test]
    fn zero_capacity_capture_is_noop() {
        let mut tracker = Tracker::<0>::new();
        let event = tracker.ingest_frame(&frame_from([1, 2, 3, 4, 5, 6]), 0);
        assert_eq!(
            event,
            Err(CaptureError::Registry(RegistryError::RegistryFull))
        );
        assert!(tracker.registry.is_empty());
        assert!(tracker.log.is_empty());
    }

    #[test]
    fn shared_tracker_samples_clock_inside_guard() {
        let tracker = SharedTracker::<4>::new();
        let clock = ManualClock::new(500);

        tracker.insert_or_touch("01", &clock).unwrap();
        clock.advance(100);
        tracker
            .ingest_frame(&frame_from([0, 0, 0, 0, 0, 2]), &clock)
            .unwrap();

        assert_eq!(tracker.len(), 2);
        tracker.with(|t| {
            assert_eq!(t.registry.get("01").unwrap().last_seen, 500);
            assert_eq!(t.registry.get("000000000002").unwrap().last_seen, 600);
        });
    }

    // ── Engine ──────────────────────────────────────────────────────

    #[test]
    fn pass_runs_scan_when_interval_elapses() {
        let tracker = SharedTracker::<80>::new();
        let clock = ManualClock::new(0);
        let scanner = ScriptedScanner::completing_after(2, &["aa:bb:cc:00:00:01", "aa:bb:cc:00:00:02"]);
        let mut engine = engine(&tracker, scanner, &clock, TrackerConfig::new());

        let report = engine.run_pass();
        assert_eq!(report.scan, None);
        assert!(tracker.is_empty());

        clock.advance(8_000);
        let report = engine.run_pass();

        assert_eq!(report.scan, Some(ScanOutcome::Completed { found: 2 }));
        assert_eq!(tracker.len(), 2);
        assert_eq!(engine.scanner.released, 1);
    }

    #[test]
    fn passive_mode_never_scans() {
        let tracker = SharedTracker::<80>::new();
        let clock = ManualClock::new(0);
        let config = TrackerConfig {
            mode: Mode::Passive,
            ..TrackerConfig::new()
        };
        let mut engine = engine(&tracker, ScriptedScanner::completing_after(0, &["01"]), &clock, config);

        clock.advance(60_000);
        let report = engine.run_pass();

        assert_eq!(report.scan, None);
        assert_eq!(engine.scanner.started, 0);
    }

    #[test]
    fn scan_timeout_leaves_registry_unchanged() {
        let tracker = SharedTracker::<80>::new();
        let clock = ManualClock::new(0);
        let mut engine = engine(&tracker, ScriptedScanner::never_completing(), &clock, TrackerConfig::new());

        let outcome = engine.trigger_scan();

        assert_eq!(outcome, ScanOutcome::TimedOut { elapsed_ms: 6_000 });
        assert!(tracker.is_empty());
        assert!(tracker.with(|t| t.log.is_empty()));
        assert_eq!(engine.scanner.released, 1);
    }

    #[test]
    fn trigger_scan_restarts_scan_interval() {
        let tracker = SharedTracker::<80>::new();
        let clock = ManualClock::new(0);
        let scanner = ScriptedScanner::completing_after(0, &["01"]);
        let mut engine = engine(&tracker, scanner, &clock, TrackerConfig::new());

        clock.advance(7_000);
        engine.trigger_scan();
        clock.advance(1_000);

        assert_eq!(engine.run_pass().scan, None);
        assert_eq!(engine.scanner.started, 1);
    }

    #[test]
    fn pass_expires_stale_devices() {
        let tracker = SharedTracker::<80>::new();
        let clock = ManualClock::new(0);
        let config = TrackerConfig {
            mode: Mode::Passive,
            ..TrackerConfig::new()
        };
        let mut engine = engine(&tracker, ScriptedScanner::never_completing(), &clock, config);
        for id in ["01", "02"] {
            tracker.insert_or_touch(id, &clock).unwrap();
        }
        clock.advance(1_000);
        for id in ["03", "04", "05"] {
            tracker.insert_or_touch(id, &clock).unwrap();
        }

        clock.advance(30_000);
        let report = engine.run_pass();

        assert_eq!(report.expired, 2);
        assert_eq!(tracker.len(), 3);
        // Same instant again: nothing left to expire
        assert_eq!(engine.run_pass().expired, 0);
    }

    #[test]
    fn pass_flushes_on_interval() {
        let tracker = SharedTracker::<80>::new();
        let clock = ManualClock::new(0);
        let config = TrackerConfig {
            mode: Mode::Passive,
            ..TrackerConfig::new()
        };
        let mut engine = engine(&tracker, ScriptedScanner::never_completing(), &clock, config);
        tracker.insert_or_touch("AA:BB", &clock).unwrap();

        assert_eq!(engine.run_pass().flushed, None);
        clock.advance(15_000);
        let report = engine.run_pass();

        assert_eq!(report.flushed, Some(Ok("AABB inserted\n".len())));
        assert!(tracker.with(|t| t.log.is_empty()));
        assert_eq!(engine.store.text(), "AABB inserted\n");
    }

    #[test]
    fn failed_flush_keeps_lines_in_order() {
        let tracker = SharedTracker::<80>::new();
        let clock = ManualClock::new(0);
        let mut engine = engine(&tracker, ScriptedScanner::never_completing(), &clock, TrackerConfig::new());
        engine.store.fail_open = true;
        tracker.insert_or_touch("01", &clock).unwrap();

        assert_eq!(engine.flush_log(), Err(StoreError::Unavailable));
        tracker.insert_or_touch("02", &clock).unwrap();
        engine.store.fail_open = false;
        assert!(engine.flush_log().is_ok());

        assert_eq!(engine.store.text(), "01 inserted\n02 inserted\n");
    }

    #[test]
    fn flush_empty_buffer_skips_store() {
        let tracker = SharedTracker::<80>::new();
        let clock = ManualClock::new(0);
        let mut engine = engine(&tracker, ScriptedScanner::never_completing(), &clock, TrackerConfig::new());

        assert_eq!(engine.flush_log(), Ok(0));
        assert_eq!(engine.store.opens, 0);
    }

    #[test]
    fn clear_registry_logs_once() {
        let tracker = SharedTracker::<80>::new();
        let clock = ManualClock::new(0);
        let mut engine = engine(&tracker, ScriptedScanner::never_completing(), &clock, TrackerConfig::new());
        tracker.insert_or_touch("01", &clock).unwrap();
        tracker.with(|t| t.log.take());

        engine.clear_registry();

        assert!(tracker.is_empty());
        assert_eq!(tracker.with(|t| t.log.as_str().to_string()), "registry cleared\n");
    }

    #[test]
    fn status_export_includes_roster_and_persisted_log() {
        let tracker = SharedTracker::<80>::new();
        let clock = ManualClock::new(1_000);
        let mut engine = engine(&tracker, ScriptedScanner::never_completing(), &clock, TrackerConfig::new());
        tracker.insert_or_touch("AA:BB:CC:DD:EE:FF", &clock).unwrap();
        engine.flush_log().unwrap();
        clock.advance(250);

        let json = engine.status_json("test_board", 1).unwrap();
        let json = core::str::from_utf8(&json).unwrap();

        assert!(json.contains(r#""type":"status""#));
        assert!(json.contains(r#""mode":"hybrid""#));
        assert!(json.contains(r#""board":"test_board""#));
        assert!(json.contains(r#""devices":[{"id":"AABBCCDDEEFF","age_ms":250}]"#));
        assert!(json.contains(r#""log":"AABBCCDDEEFF inserted\n""#));
        assert!(json.ends_with('\n'));
    }

    #[test]
    fn oversized_persisted_log_yields_no_export() {
        let tracker = SharedTracker::<80>::new();
        let clock = ManualClock::new(0);
        let log = "AABBCCDDEEFF inserted\n".repeat(crate::board::MAX_EXPORT_LEN / 16);
        let mut engine = Engine::new(
            &tracker,
            ScriptedScanner::never_completing(),
            MemoryStore::with_content(&log),
            &clock,
            TrackerConfig::new(),
        );

        assert!(engine.status_json("test_board", 1).is_none());
    }

    // ── Concurrent access ───────────────────────────────────────────

    #[test]
    fn concurrent_capture_and_scan_stay_consistent() {
        const ROUNDS: usize = 2_000;
        let tracker = SharedTracker::<8>::new();
        let clock = TickClock::default();

        let (scan_events, capture_events) = std::thread::scope(|s| {
            let scanner = s.spawn(|| {
                let mut logged = 0;
                for i in 0..ROUNDS {
                    let id = format!("00:00:00:00:00:{:02X}", i % 12);
                    match tracker.insert_or_touch(&id, &clock) {
                        Ok(Event::Inserted(_)) | Ok(Event::Replaced { .. }) => logged += 1,
                        Ok(Event::Touched) => {}
                        Err(e) => panic!("insert failed: {e}"),
                    }
                    assert!(tracker.len() <= 8);
                }
                logged
            });
            let capture = s.spawn(|| {
                let mut logged = 0;
                for i in 0..ROUNDS {
                                        let frame = frame_from([0, 0, 0, 0, 0, (i % 16) as u8]);
                    match tracker.ingest_frame(&frame, &clock) {
                        Ok(Event::Inserted(_)) | Ok(Event::Replaced { .. }) => logged += 1,
                        Ok(Event::Touched) => {}
                        Err(e) => panic!("ingest failed: {e}"),
                    }
                    assert!(tracker.len() <= 8);
                }
                logged
            });
            (scanner.join().unwrap(), capture.join().unwrap())
        });

        assert!(tracker.len() <= 8);
        let lines = tracker.with(|t| t.log.line_count());
        assert_eq!(lines, scan_events + capture_events);
    }
}
