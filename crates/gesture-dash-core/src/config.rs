//! Remote configuration state and controller settings.

use std::{fmt, time::Duration};

use serde::{Deserialize, Serialize};

use crate::history::HISTORY_CAPACITY;

/// Gestures at or below this confidence are not displayed.
pub const DEFAULT_DISPLAY_THRESHOLD: f32 = 0.6;

/// How long the loading indicator may stay up while a start is pending.
pub const DEFAULT_LOADING_TIMEOUT_MS: u64 = 2000;

/// Default locator of the video stream.
pub const DEFAULT_STREAM_URL: &str = "/video_feed";

/// How many hands the remote tracker follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandsMode {
    /// Track a single hand.
    Single,
    /// Track up to two hands.
    #[default]
    Double,
}

impl HandsMode {
    /// The other mode.
    #[must_use]
    pub const fn toggled(self) -> Self {
        match self {
            Self::Single => Self::Double,
            Self::Double => Self::Single,
        }
    }

    /// Maximum number of tracked hands.
    #[must_use]
    pub const fn max_hands(self) -> u8 {
        match self {
            Self::Single => 1,
            Self::Double => 2,
        }
    }
}

impl fmt::Display for HandsMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single => f.write_str("single"),
            Self::Double => f.write_str("double"),
        }
    }
}

/// The three remote toggles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigState {
    /// Camera image is mirrored.
    pub mirrored: bool,
    /// Hand skeleton overlay is drawn.
    pub skeleton_visible: bool,
    /// Hand tracking mode.
    pub hands_mode: HandsMode,
}

impl Default for ConfigState {
    fn default() -> Self {
        Self {
            mirrored: true,
            skeleton_visible: true,
            hands_mode: HandsMode::Double,
        }
    }
}

/// Settings for a session controller.
///
/// Every field has a default, so partial JSON documents deserialize.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Gestures must exceed this confidence to be displayed.
    pub display_threshold: f32,
    /// Maximum number of history entries.
    pub history_capacity: usize,
    /// Milliseconds before the loading indicator is forced off.
    pub loading_timeout_ms: u64,
    /// Base locator of the video stream.
    pub stream_url: String,
    /// Remote configuration assumed at construction.
    pub initial: ConfigState,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            display_threshold: DEFAULT_DISPLAY_THRESHOLD,
            history_capacity: HISTORY_CAPACITY,
            loading_timeout_ms: DEFAULT_LOADING_TIMEOUT_MS,
            stream_url: DEFAULT_STREAM_URL.to_string(),
            initial: ConfigState::default(),
        }
    }
}

impl ControllerConfig {
    /// Default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the display threshold.
    #[must_use]
    pub fn with_display_threshold(mut self, threshold: f32) -> Self {
        self.display_threshold = threshold;
        self
    }

    /// Override the history capacity.
    #[must_use]
    pub fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = capacity;
        self
    }

    /// Override the loading timeout.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn with_loading_timeout(mut self, timeout: Duration) -> Self {
        self.loading_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Override the stream locator.
    #[must_use]
    pub fn with_stream_url(mut self, url: impl Into<String>) -> Self {
        self.stream_url = url.into();
        self
    }

    /// Override the assumed initial remote configuration.
    #[must_use]
    pub fn with_initial(mut self, initial: ConfigState) -> Self {
        self.initial = initial;
        self
    }

    /// Loading timeout as a duration.
    #[must_use]
    pub const fn loading_timeout(&self) -> Duration {
        Duration::from_millis(self.loading_timeout_ms)
    }
}
