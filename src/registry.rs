/// Bounded roster of recently seen devices.
///
/// Holds at most `N` records in a fixed-capacity vector. A new identifier
/// arriving at full capacity overwrites the least recently seen record;
/// records unseen for longer than the expiry timeout are swept out.
///
/// Timestamps are `u32` milliseconds from the device-local monotonic clock
/// and every age is computed with wrapping subtraction, so the roster keeps
/// working across clock rollover.
use heapless::{String, Vec};
use thiserror::Error;

use crate::log_buffer::{Action, LogBuffer};

/// Maximum length of a normalized identifier
pub const MAX_ID_LEN: usize = 32;

/// Normalized device identifier: uppercase, separators stripped
pub type Identifier = String<MAX_ID_LEN>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// Zero-capacity registry: there is nothing to evict
    #[error("registry has no capacity")]
    RegistryFull,
    #[error("identifier is empty or longer than {MAX_ID_LEN} bytes")]
    InvalidIdentifier,
}

/// Outcome of a sighting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Known identifier, timestamp refreshed
    Touched,
    /// New record appended
    Inserted(Identifier),
    /// New identifier overwrote the least recently seen record
    Replaced { id: Identifier, evicted: Identifier },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRecord {
    pub id: Identifier,
    pub last_seen: u32,
}

impl DeviceRecord {
    /// Milliseconds since the record was last seen. `now` must not be
    /// earlier than `last_seen`, or the age wraps to a huge value.
    pub fn age(&self, now: u32) -> u32 {
        now.wrapping_sub(self.last_seen)
    }
}

/// Strip `:` and `-` separators and uppercase.
///
/// `"aa:bb:cc:dd:ee:ff"`, `"AA-BB-CC-DD-EE-FF"` and `"aabbccddeeff"` all
/// normalize to `"AABBCCDDEEFF"`.
pub fn normalize(raw: &str) -> Result<Identifier, RegistryError> {
    let mut id = Identifier::new();
    for c in raw.chars().filter(|&c| c != ':' && c != '-') {
        id.push(c.to_ascii_uppercase())
            .map_err(|_| RegistryError::InvalidIdentifier)?;
    }
    if id.is_empty() {
        return Err(RegistryError::InvalidIdentifier);
    }
    Ok(id)
}

#[derive(Debug)]
pub struct Registry<const N: usize> {
    records: Vec<DeviceRecord, N>,
}

impl<const N: usize> Registry<N> {
    pub const fn new() -> Self {
        Self {
            records: Vec::new(),
        }
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[DeviceRecord] {
        &self.records
    }

    pub fn get(&self, raw: &str) -> Option<&DeviceRecord> {
        let id = normalize(raw).ok()?;
        self.records.iter().find(|r| r.id == id)
    }

    /// Record a sighting of `raw` at `now`.
    ///
    /// Inserts and replacements are written to `log`; touches are not.
    pub fn insert_or_touch(
        &mut self,
        raw: &str,
        now: u32,
        log: &mut LogBuffer,
    ) -> Result<Event, RegistryError> {
        let id = normalize(raw)?;

        if let Some(record) = self.records.iter_mut().find(|r| r.id == id) {
            record.last_seen = now;
            return Ok(Event::Touched);
        }

        if self.records.len() < N {
            let _ = self.records.push(DeviceRecord {
                id: id.clone(),
                last_seen: now,
            });
            log.record(&id, Action::Inserted);
            log::debug!("{} inserted ({}/{})", id, self.records.len(), N);
            return Ok(Event::Inserted(id));
        }

        let Some(victim) = self.oldest_index(now) else {
            log::warn!("registry has zero capacity, dropping {}", id);
            return Err(RegistryError::RegistryFull);
        };

        let record = &mut self.records[victim];
        let evicted = core::mem::replace(&mut record.id, id.clone());
        record.last_seen = now;
        log.record(&id, Action::Replaced);
        log::debug!("{} replaced {}", id, evicted);
        Ok(Event::Replaced { id, evicted })
    }

    /// Index of the record with the greatest age; the lowest index wins ties.
    fn oldest_index(&self, now: u32) -> Option<usize> {
        let mut oldest: Option<(usize, u32)> = None;
        for (i, record) in self.records.iter().enumerate() {
            let age = record.age(now);
            match oldest {
                Some((_, best)) if age <= best => {}
                _ => oldest = Some((i, age)),
            }
        }
        oldest.map(|(i, _)| i)
    }

    /// Remove every record with `now - last_seen > timeout`.
    ///
    /// Holes are filled from the end of the roster, so survivors keep their
    /// timestamps but not necessarily their order. Each removal is logged
    /// as lost.
    ///
    /// `now` must not be earlier than any recorded timestamp. The shared
    /// tracker guarantees this by sampling the clock inside its guard.
    pub fn expire_stale(
        &mut self,
        now: u32,
        timeout: u32,
        log: &mut LogBuffer,
    ) -> Vec<Identifier, N> {
        let mut removed = Vec::new();
        let mut i = 0;
        while i < self.records.len() {
            if self.records[i].age(now) > timeout {
                let record = self.records.swap_remove(i);
                log.record(&record.id, Action::Lost);
                log::debug!("{} lost after {} ms", record.id, record.age(now));
                let _ = removed.push(record.id);
            } else {
                i += 1;
            }
        }
        removed
    }

    /// Empty the roster unconditionally.
    pub fn clear(&mut self, log: &mut LogBuffer) {
        self.records.clear();
        log.record_cleared();
    }

    /// Identifier and age of every record, in roster order.
    pub fn snapshot(&self, now: u32) -> Vec<(Identifier, u32), N> {
        self.records
            .iter()
            .map(|r| (r.id.clone(), r.age(now)))
            .collect()
    }
}

impl<const N: usize> Default for Registry<N> {
    fn default() -> Self {
        Self::new()
    }
}
