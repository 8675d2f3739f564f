/// Append-only audit trail held in memory until flushed.
///
/// Lines are `"<id> <action>\n"`. The buffer is drained into a [`LogStore`]
/// on the flush interval; if the store cannot take the content it stays in
/// the buffer and the next flush retries. There is no cap on growth while
/// the store is unavailable.
use alloc::string::String;
use core::fmt::Write;

use thiserror::Error;

/// Persistent log store failures. `Unavailable` is the
/// persistence-unavailable case: flush is deferred, nothing is lost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("log store could not be opened for append")]
    Unavailable,
    #[error("log store write failed")]
    Write,
    #[error("log store read failed")]
    Read,
}

/// An open append handle. Dropping it closes the store.
pub trait LogSink {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), StoreError>;
}

/// Append-only byte sink with a single logical name.
pub trait LogStore {
    type Sink<'a>: LogSink
    where
        Self: 'a;

    fn open_append(&mut self) -> Result<Self::Sink<'_>, StoreError>;

    /// Append the full persisted text to `out`. A store that was never
    /// written reads as empty.
    fn read_to(&mut self, out: &mut String) -> Result<(), StoreError>;
}

/// Open, write, close. The sink is released on every path.
pub fn append_to_store<S: LogStore>(store: &mut S, bytes: &[u8]) -> Result<(), StoreError> {
    let mut sink = store.open_append()?;
    sink.write_all(bytes)
}

/// Audit event kinds that produce a log line. Touches never do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Inserted,
    Replaced,
    Lost,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Inserted => "inserted",
            Action::Replaced => "replaced",
            Action::Lost => "lost",
        }
    }
}

/// Line appended when the registry is cleared.
pub const CLEARED_LINE: &str = "registry cleared";

#[derive(Debug, Default)]
pub struct LogBuffer {
    text: String,
}

impl LogBuffer {
    pub const fn new() -> Self {
        Self {
            text: String::new(),
        }
    }

    pub fn record(&mut self, id: &str, action: Action) {
        let _ = writeln!(self.text, "{} {}", id, action.as_str());
    }

    pub fn record_cleared(&mut self) {
        self.text.push_str(CLEARED_LINE);
        self.text.push('\n');
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn line_count(&self) -> usize {
        self.text.lines().count()
    }

    /// Move the pending content out, leaving the buffer empty.
    pub fn take(&mut self) -> String {
        core::mem::take(&mut self.text)
    }

    /// Put back content from a failed flush ahead of anything appended
    /// since it was taken.
    pub fn restore(&mut self, mut pending: String) {
        if !self.text.is_empty() {
            pending.push_str(&self.text);
        }
        self.text = pending;
    }

    /// Write all pending lines to `store` and empty the buffer.
    ///
    /// An empty buffer never touches the store. On failure the lines are
    /// retained for the next attempt.
    pub fn flush<S: LogStore>(&mut self, store: &mut S) -> Result<usize, StoreError> {
        if self.text.is_empty() {
            return Ok(0);
        }
        let pending = self.take();
        match append_to_store(store, pending.as_bytes()) {
            Ok(()) => Ok(pending.len()),
            Err(e) => {
                self.restore(pending);
                Err(e)
            }
        }
    }
}
