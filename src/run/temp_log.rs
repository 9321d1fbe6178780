//! Temperature history buffer.
//!
//! An ordered (timestamp → whole-degree) log of the fused average,
//! appended every fifth sensor cycle while a run is active and only
//! when the value changed. Clients read it incrementally with a
//! cursor: "everything newer than the last timestamp I saw".

use std::collections::BTreeMap;

/// Epoch-second timestamp, the time currency of the whole crate.
pub type EpochSecs = i64;

#[derive(Debug, Default)]
pub struct TempLog {
    entries: BTreeMap<EpochSecs, i32>,
}

impl TempLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Append a sample unless it equals the last stored value.
    /// Returns whether the sample was stored.
    pub fn push(&mut self, now: EpochSecs, temp: i32) -> bool {
        let last = self.entries.values().next_back().copied().unwrap_or(0);
        if last == temp {
            return false;
        }
        self.entries.insert(now, temp);
        true
    }

    /// Timestamp of the last real entry, if any.
    pub fn last_time(&self) -> Option<EpochSecs> {
        self.entries.keys().next_back().copied()
    }

    /// Entries newer than `since` (all of them when `None`), newest
    /// first — the shape the incremental client read wants.
    pub fn delta_since(&self, since: Option<EpochSecs>) -> Vec<(EpochSecs, i32)> {
        let mut out = Vec::new();
        for (&time, &temp) in self.entries.iter().rev() {
            match since {
                Some(cursor) if time <= cursor => break,
                _ => out.push((time, temp)),
            }
        }
        out
    }
}
