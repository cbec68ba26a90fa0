//! Inbound gesture events from the detection feed.

use serde::{Deserialize, Serialize};

use crate::observation::{Gesture, GestureObservation};

/// Names the feed uses to mean "nothing recognized".
const NO_HAND_SENTINELS: [&str; 2] = ["-", "unknown"];

/// Raw detection event as pushed by the remote service.
///
/// Both fields are optional on the wire; see [`GestureEvent::normalize`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GestureEvent {
    /// Display name of the gesture, a sentinel, or null.
    #[serde(default)]
    pub gesture_name: Option<String>,
    /// Detection confidence in `[0, 1]`.
    #[serde(default)]
    pub confidence: Option<f32>,
}

impl GestureEvent {
    /// Event for a named gesture.
    #[must_use]
    pub fn named(name: impl Into<String>, confidence: f32) -> Self {
        Self {
            gesture_name: Some(name.into()),
            confidence: Some(confidence),
        }
    }

    /// Event with no gesture name.
    #[must_use]
    pub const fn no_hand() -> Self {
        Self {
            gesture_name: None,
            confidence: Some(0.0),
        }
    }

    /// Canonicalize into an observation.
    ///
    /// Missing, blank, `"-"` and `"unknown"` names become [`Gesture::NoHand`]
    /// with confidence 0. An absent confidence counts as 0.
    #[must_use]
    pub fn normalize(&self) -> GestureObservation {
        let name = self
            .gesture_name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty() && !NO_HAND_SENTINELS.contains(n));

        match name {
            Some(name) => {
                GestureObservation::new(Gesture::named(name), self.confidence.unwrap_or(0.0))
            }
            None => GestureObservation::no_hand(),
        }
    }
}

/// One message on the remote event channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedMessage {
    /// The channel (re)connected.
    Connected,
    /// A detection result.
    GestureDetected(GestureEvent),
}
