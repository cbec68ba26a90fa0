//! Routes detection events into the current gesture and the history.

use crate::{
    config::DEFAULT_DISPLAY_THRESHOLD,
    event::GestureEvent,
    history::HistoryAggregator,
    observation::GestureObservation,
    snapshot::{CurrentGesture, DisplaySnapshot, HistoryEntry},
};

/// How an event was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Normalized to no hand; display reset.
    NoHand,
    /// Named gesture above the display threshold.
    Promoted,
    /// Named gesture at or below the threshold; nothing changed.
    Dropped,
}

/// Turns feed events into display state.
///
/// Events must be fed in arrival order. The router never fails:
/// malformed events are normalized to no hand or dropped.
#[derive(Debug)]
pub struct GestureEventRouter {
    history: HistoryAggregator,
    current: GestureObservation,
    threshold: f32,
    changed: bool,
}

impl Default for GestureEventRouter {
    fn default() -> Self {
        Self::new(HistoryAggregator::new(), DEFAULT_DISPLAY_THRESHOLD)
    }
}

impl GestureEventRouter {
    /// Create a router over `history`, promoting gestures strictly above `threshold`.
    #[must_use]
    pub fn new(history: HistoryAggregator, threshold: f32) -> Self {
        Self {
            history,
            current: GestureObservation::no_hand(),
            threshold,
            changed: false,
        }
    }

    /// Process one event.
    pub fn route(&mut self, event: &GestureEvent) -> RouteOutcome {
        let observation = event.normalize();

        if observation.gesture.is_no_hand() {
            self.changed = !self.current.gesture.is_no_hand();
            self.current = observation.clone();
            self.history.record(observation);
            return RouteOutcome::NoHand;
        }

        if observation.confidence <= self.threshold {
            tracing::trace!(
                gesture = %observation.gesture,
                confidence = observation.confidence,
                "below display threshold"
            );
            return RouteOutcome::Dropped;
        }

        self.changed = self.current.gesture != observation.gesture;
        self.current = observation.clone();
        self.history.record(observation);
        RouteOutcome::Promoted
    }

    /// Process one event and return the snapshot to render, if anything changed.
    pub fn handle(&mut self, event: &GestureEvent) -> Option<DisplaySnapshot> {
        match self.route(event) {
            RouteOutcome::Dropped => None,
            RouteOutcome::NoHand | RouteOutcome::Promoted => Some(self.snapshot()),
        }
    }

    /// Current display state.
    #[must_use]
    pub fn snapshot(&self) -> DisplaySnapshot {
        DisplaySnapshot {
            current_gesture: CurrentGesture::from_observation(&self.current),
            history: self.history.iter().map(HistoryEntry::from).collect(),
            changed: self.changed,
        }
    }

    /// The observation currently on display.
    #[must_use]
    pub const fn current(&self) -> &GestureObservation {
        &self.current
    }

    /// Read access to the history.
    #[must_use]
    pub const fn history(&self) -> &HistoryAggregator {
        &self.history
    }

    /// Back to no hand with an empty history.
    pub fn reset(&mut self) {
        self.history.clear();
        self.current = GestureObservation::no_hand();
        self.changed = false;
    }
}
