//! Gesture observations and related value types.

use std::{
    fmt,
    time::{SystemTime, UNIX_EPOCH},
};

use serde::{Deserialize, Serialize};

/// Display name used for the no-hand sentinel.
pub const NO_HAND_LABEL: &str = "No Hand";

/// Current time as Unix epoch milliseconds.
#[must_use]
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

/// What a detection reported: a named gesture or no hand at all.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum Gesture {
    /// No hand is currently visible.
    NoHand,
    /// A recognized gesture, by display name.
    Named(String),
}

impl Gesture {
    /// Create a named gesture.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self::Named(name.into())
    }

    /// Whether this is the no-hand sentinel.
    #[must_use]
    pub const fn is_no_hand(&self) -> bool {
        matches!(self, Self::NoHand)
    }

    /// Name to show for this gesture.
    #[must_use]
    pub fn label(&self) -> &str {
        match self {
            Self::NoHand => NO_HAND_LABEL,
            Self::Named(name) => name,
        }
    }
}

impl fmt::Display for Gesture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Coarse confidence bucket used for colouring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLevel {
    /// 0.8 and above.
    High,
    /// 0.6 up to 0.8.
    Medium,
    /// Below 0.6.
    Low,
}

impl ConfidenceLevel {
    /// Bucket a raw confidence value.
    #[must_use]
    pub fn of(confidence: f32) -> Self {
        if confidence >= 0.8 {
            Self::High
        } else if confidence >= 0.6 {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

/// Convert a confidence in `[0, 1]` to a rounded percentage.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn confidence_percent(confidence: f32) -> u8 {
    (confidence.clamp(0.0, 1.0) * 100.0).round() as u8
}

/// One detection result at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GestureObservation {
    /// Gesture that was observed.
    pub gesture: Gesture,
    /// Detection confidence in `[0, 1]`.
    pub confidence: f32,
    /// Unix epoch milliseconds of the latest sighting.
    pub observed_at: i64,
    /// How many sightings were collapsed into this entry.
    pub occurrence_count: u32,
}

impl GestureObservation {
    /// Create an observation stamped with the current time.
    #[must_use]
    pub fn new(gesture: Gesture, confidence: f32) -> Self {
        Self::at(gesture, confidence, now_millis())
    }

    /// Create an observation with an explicit timestamp.
    #[must_use]
    pub fn at(gesture: Gesture, confidence: f32, observed_at: i64) -> Self {
        let confidence = if confidence.is_finite() {
            confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self {
            gesture,
            confidence,
            observed_at,
            occurrence_count: 1,
        }
    }

    /// The no-hand sentinel observation (confidence 0).
    #[must_use]
    pub fn no_hand() -> Self {
        Self::new(Gesture::NoHand, 0.0)
    }

    /// Confidence as a rounded percentage.
    #[must_use]
    pub fn confidence_percent(&self) -> u8 {
        confidence_percent(self.confidence)
    }
}
