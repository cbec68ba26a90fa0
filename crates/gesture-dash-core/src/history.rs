//! Bounded, de-duplicated log of recent gesture observations.

use std::collections::VecDeque;

use crate::observation::{Gesture, GestureObservation};

/// Default number of entries kept in the history.
pub const HISTORY_CAPACITY: usize = 8;

/// What [`HistoryAggregator::record`] did with an observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// Appended as the newest entry.
    Inserted,
    /// Merged into the existing entry at this index.
    Merged(usize),
    /// Repeated no-hand while the newest entry already is no-hand.
    Ignored,
}

/// Ordered log of observations, most recent first.
///
/// Entries are unique by gesture: a repeat refreshes the existing entry
/// in place and bumps its occurrence count. Once the log exceeds its
/// capacity the oldest entry is evicted.
#[derive(Debug, Clone)]
pub struct HistoryAggregator {
    entries: VecDeque<GestureObservation>,
    capacity: usize,
}

impl Default for HistoryAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl HistoryAggregator {
    /// Create an empty history with the default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(HISTORY_CAPACITY)
    }

    /// Create an empty history holding at most `capacity` entries.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    /// Insert or merge an observation.
    pub fn record(&mut self, observation: GestureObservation) -> RecordOutcome {
        if observation.gesture.is_no_hand()
            && self.latest().is_some_and(|e| e.gesture.is_no_hand())
        {
            return RecordOutcome::Ignored;
        }

        if let Some(index) = self.position(&observation.gesture) {
            let entry = &mut self.entries[index];
            entry.confidence = observation.confidence;
            entry.observed_at = observation.observed_at;
            entry.occurrence_count = entry.occurrence_count.saturating_add(1);
            return RecordOutcome::Merged(index);
        }

        self.entries.push_front(GestureObservation {
            occurrence_count: 1,
            ..observation
        });
        while self.entries.len() > self.capacity {
            if let Some(evicted) = self.entries.pop_back() {
                tracing::trace!(gesture = %evicted.gesture, "evicted from history");
            }
        }
        RecordOutcome::Inserted
    }

    /// Copy of the current log, most recent first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<GestureObservation> {
        self.entries.iter().cloned().collect()
    }

    /// Newest entry, if any.
    #[must_use]
    pub fn latest(&self) -> Option<&GestureObservation> {
        self.entries.front()
    }

    /// Iterate entries, most recent first.
    pub fn iter(&self) -> impl Iterator<Item = &GestureObservation> {
        self.entries.iter()
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the log is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum number of entries.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    fn position(&self, gesture: &Gesture) -> Option<usize> {
        self.entries.iter().position(|e| &e.gesture == gesture)
    }
}
