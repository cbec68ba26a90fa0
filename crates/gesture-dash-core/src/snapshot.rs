//! Read-only views handed to the presenter.

use serde::{Deserialize, Serialize};

use crate::{
    config::ConfigState,
    observation::{ConfidenceLevel, Gesture, GestureObservation, NO_HAND_LABEL},
};

/// The gesture currently on display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum CurrentGesture {
    /// No hand is visible.
    NoHand,
    /// A promoted gesture.
    #[serde(rename_all = "camelCase")]
    Gesture {
        name: String,
        confidence_percent: u8,
        level: ConfidenceLevel,
    },
}

impl CurrentGesture {
    /// Build from an observation.
    #[must_use]
    pub fn from_observation(observation: &GestureObservation) -> Self {
        match &observation.gesture {
            Gesture::NoHand => Self::NoHand,
            Gesture::Named(name) => Self::Gesture {
                name: name.clone(),
                confidence_percent: observation.confidence_percent(),
                level: ConfidenceLevel::of(observation.confidence),
            },
        }
    }

    /// Name shown for this gesture.
    #[must_use]
    pub fn label(&self) -> &str {
        match self {
            Self::NoHand => NO_HAND_LABEL,
            Self::Gesture { name, .. } => name,
        }
    }

    /// Confidence shown for this gesture (0 for no hand).
    #[must_use]
    pub const fn confidence_percent(&self) -> u8 {
        match self {
            Self::NoHand => 0,
            Self::Gesture {
                confidence_percent, ..
            } => *confidence_percent,
        }
    }
}

/// One row of the history list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub name: String,
    pub confidence_percent: u8,
    /// Unix epoch milliseconds of the latest sighting.
    pub timestamp: i64,
    pub occurrence_count: u32,
    pub is_no_hand: bool,
}

impl From<&GestureObservation> for HistoryEntry {
    fn from(observation: &GestureObservation) -> Self {
        Self {
            name: observation.gesture.label().to_string(),
            confidence_percent: observation.confidence_percent(),
            timestamp: observation.observed_at,
            occurrence_count: observation.occurrence_count,
            is_no_hand: observation.gesture.is_no_hand(),
        }
    }
}

/// Everything the presenter needs to draw the gesture panels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplaySnapshot {
    pub current_gesture: CurrentGesture,
    pub history: Vec<HistoryEntry>,
    /// Whether the current gesture differs from the previous snapshot's.
    pub changed: bool,
}

impl Default for DisplaySnapshot {
    fn default() -> Self {
        Self {
            current_gesture: CurrentGesture::NoHand,
            history: Vec::new(),
            changed: false,
        }
    }
}

/// Optimistic and confirmed remote configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigSnapshot {
    /// What the user asked for, shown right away.
    pub displayed: ConfigState,
    /// Last values acknowledged by the remote service.
    pub confirmed: ConfigState,
}

impl ConfigSnapshot {
    /// Whether every toggle has been acknowledged.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.displayed == self.confirmed
    }
}
