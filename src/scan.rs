/// Active scan ingestion.
///
/// One scan cycle: start a non-blocking network scan, poll for completion
/// with a hard timeout, hand every discovered network's hardware address
/// to the caller, release the scan results. Release happens on every path
/// through a drop guard.
use thiserror::Error;

use crate::registry::Identifier;

/// Device-local monotonic millisecond clock.
pub trait Clock {
    /// Milliseconds since boot, wrapping at `u32::MAX`
    fn now_ms(&self) -> u32;

    /// Yield for roughly `ms` milliseconds
    fn delay_ms(&self, ms: u32);
}

/// Completion state of an in-flight scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanPoll {
    Running,
    Done(u16),
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ScanError {
    #[error("radio refused to start a scan")]
    StartFailed,
    #[error("radio reported a scan error")]
    Radio,
}

/// Network scan provider, implemented by the platform radio driver.
pub trait ScanProvider {
    type Handle;

    fn start_scan(&mut self, include_hidden: bool) -> Result<Self::Handle, ScanError>;

    fn poll(&mut self, handle: &Self::Handle) -> ScanPoll;

    /// Hardware address of the `index`-th discovered network
    fn result(&mut self, handle: &Self::Handle, index: u16) -> Option<Identifier>;

    /// Free the scan's result resources (and stop it if still running)
    fn release(&mut self, handle: Self::Handle);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanSettings {
    pub timeout_ms: u32,
    pub poll_ms: u32,
    pub include_hidden: bool,
}

impl ScanSettings {
    pub const fn new() -> Self {
        Self {
            timeout_ms: 6_000,
            poll_ms: 100,
            include_hidden: true,
        }
    }
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of one scan cycle. None of these are failures of the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOutcome {
    /// `found` networks were handed to the registry
    Completed { found: u16 },
    /// Scan finished with nothing in range
    Empty,
    /// Completion wait exceeded the hard cap
    TimedOut { elapsed_ms: u32 },
    Failed(ScanError),
}

impl ScanOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanOutcome::Completed { .. } => "completed",
            ScanOutcome::Empty => "empty",
            ScanOutcome::TimedOut { .. } => "timeout",
            ScanOutcome::Failed(_) => "failed",
        }
    }

    pub fn found(&self) -> u16 {
        match self {
            ScanOutcome::Completed { found } => *found,
            _ => 0,
        }
    }
}

/// Holds a started scan and releases it when dropped.
struct ScanGuard<'p, P: ScanProvider> {
    provider: &'p mut P,
    handle: Option<P::Handle>,
}

impl<'p, P: ScanProvider> ScanGuard<'p, P> {
    fn start(provider: &'p mut P, include_hidden: bool) -> Result<Self, ScanError> {
        let handle = provider.start_scan(include_hidden)?;
        Ok(Self {
            provider,
            handle: Some(handle),
        })
    }

    fn poll(&mut self) -> ScanPoll {
        match self.handle.as_ref() {
            Some(handle) => self.provider.poll(handle),
            None => ScanPoll::Error,
        }
    }

    fn result(&mut self, index: u16) -> Option<Identifier> {
        let handle = self.handle.as_ref()?;
        self.provider.result(handle, index)
    }
}

impl<P: ScanProvider> Drop for ScanGuard<'_, P> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.provider.release(handle);
        }
    }
}

/// Run one scan cycle, calling `on_found` for each discovered network.
///
/// Blocks the caller for at most `settings.timeout_ms` plus one poll
/// period. Nothing is reported on timeout, error, or an empty result.
pub fn run_active_scan<P, C, F>(
    provider: &mut P,
    clock: &C,
    settings: &ScanSettings,
    mut on_found: F,
) -> ScanOutcome
where
    P: ScanProvider,
    C: Clock,
    F: FnMut(&str),
{
    let mut scan = match ScanGuard::start(provider, settings.include_hidden) {
        Ok(scan) => scan,
        Err(e) => return ScanOutcome::Failed(e),
    };
    let started = clock.now_ms();

    let count = loop {
        match scan.poll() {
            ScanPoll::Done(count) => break count,
            ScanPoll::Error => return ScanOutcome::Failed(ScanError::Radio),
            ScanPoll::Running => {}
        }
        let elapsed = clock.now_ms().wrapping_sub(started);
        if elapsed >= settings.timeout_ms {
            return ScanOutcome::TimedOut {
                elapsed_ms: elapsed,
            };
        }
        clock.delay_ms(settings.poll_ms);
    };

    if count == 0 {
        return ScanOutcome::Empty;
    }

    for index in 0..count {
        if let Some(id) = scan.result(index) {
            on_found(&id);
        }
    }
    ScanOutcome::Completed { found: count }
}
