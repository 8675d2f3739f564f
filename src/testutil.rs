//! Host-side fakes for the radio, clock and storage collaborators.

use std::cell::Cell;
use std::sync::atomic::{AtomicU32, Ordering};
use std::string::String;
use std::vec::Vec;

use crate::log_buffer::{LogSink, LogStore, StoreError};
use crate::registry::Identifier;
use crate::scan::{Clock, ScanError, ScanPoll, ScanProvider};

/// Clock that only moves when told to, or when something delays on it.
pub struct ManualClock {
    now: Cell<u32>,
}

impl ManualClock {
    pub fn new(start: u32) -> Self {
        Self {
            now: Cell::new(start),
        }
    }

    pub fn advance(&self, ms: u32) {
        self.now.set(self.now.get().wrapping_add(ms));
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u32 {
        self.now.get()
    }

    fn delay_ms(&self, ms: u32) {
        self.advance(ms);
    }
}

/// Thread-safe clock that ticks one millisecond on every read.
#[derive(Default)]
pub struct TickClock {
    now: AtomicU32,
}

impl Clock for TickClock {
    fn now_ms(&self) -> u32 {
        self.now.fetch_add(1, Ordering::Relaxed)
    }

    fn delay_ms(&self, ms: u32) {
        self.now.fetch_add(ms, Ordering::Relaxed);
    }
}

impl Clock for &ManualClock {
    fn now_ms(&self) -> u32 {
        (**self).now_ms()
    }

    fn delay_ms(&self, ms: u32) {
        (**self).delay_ms(ms)
    }
}

/// In-memory append-only store.
#[derive(Default)]
pub struct MemoryStore {
    pub content: Vec<u8>,
    pub opens: usize,
    pub fail_open: bool,
    pub fail_write: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_content(text: &str) -> Self {
        Self {
            content: text.as_bytes().to_vec(),
            ..Self::default()
        }
    }

    pub fn text(&self) -> &str {
        std::str::from_utf8(&self.content).unwrap()
    }
}

pub struct MemorySink<'a> {
    content: &'a mut Vec<u8>,
    fail: bool,
}

impl LogSink for MemorySink<'_> {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), StoreError> {
        if self.fail {
            return Err(StoreError::Write);
        }
        self.content.extend_from_slice(bytes);
        Ok(())
    }
}

impl LogStore for MemoryStore {
    type Sink<'a> = MemorySink<'a>;

    fn open_append(&mut self) -> Result<MemorySink<'_>, StoreError> {
        self.opens += 1;
        if self.fail_open {
            return Err(StoreError::Unavailable);
        }
        Ok(MemorySink {
            content: &mut self.content,
            fail: self.fail_write,
        })
    }

    fn read_to(&mut self, out: &mut String) -> Result<(), StoreError> {
        let text = std::str::from_utf8(&self.content).map_err(|_| StoreError::Read)?;
        out.push_str(text);
        Ok(())
    }
}

/// Scan provider that completes after a fixed number of polls.
pub struct ScriptedScanner {
    pub results: Vec<&'static str>,
    /// Polls answered `Running` before `Done`; `None` never completes
    pub polls_until_done: Option<usize>,
    pub poll_error: bool,
    pub start_error: bool,
    pub started: usize,
    pub released: usize,
    pub last_include_hidden: Option<bool>,
    polls: usize,
}

impl ScriptedScanner {
    pub fn completing_after(polls: usize, results: &[&'static str]) -> Self {
        Self {
            results: results.to_vec(),
            polls_until_done: Some(polls),
            poll_error: false,
            start_error: false,
            started: 0,
            released: 0,
            last_include_hidden: None,
            polls: 0,
        }
    }

    pub fn never_completing() -> Self {
        Self {
            polls_until_done: None,
            ..Self::completing_after(0, &[])
        }
    }
}

impl ScanProvider for ScriptedScanner {
    type Handle = usize;

    fn start_scan(&mut self, include_hidden: bool) -> Result<usize, ScanError> {
        if self.start_error {
            return Err(ScanError::StartFailed);
        }
        self.started += 1;
        self.polls = 0;
        self.last_include_hidden = Some(include_hidden);
        Ok(self.started)
    }

    fn poll(&mut self, _handle: &usize) -> ScanPoll {
        if self.poll_error {
            return ScanPoll::Error;
        }
        match self.polls_until_done {
            Some(n) if self.polls >= n => ScanPoll::Done(self.results.len() as u16),
            _ => {
                self.polls += 1;
                ScanPoll::Running
            }
        }
    }

    fn result(&mut self, _handle: &usize, index: u16) -> Option<Identifier> {
        let raw = self.results.get(index as usize)?;
        Identifier::try_from(*raw).ok()
    }

    fn release(&mut self, _handle: usize) {
        self.released += 1;
    }
}
