//! Stream session state shared between the controller and presenters.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle state of the camera stream.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum StreamState {
    /// Camera is off.
    #[default]
    Idle,
    /// Start request in flight.
    Starting,
    /// Camera is on.
    Running,
    /// Stop request in flight.
    Stopping,
    /// Last start failed or the stream broke.
    Error(String),
}

impl StreamState {
    /// Whether `start()` may issue a request from this state.
    #[must_use]
    pub const fn can_start(&self) -> bool {
        matches!(self, Self::Idle | Self::Error(_))
    }

    /// Whether `stop()` may issue a request from this state.
    #[must_use]
    pub const fn can_stop(&self) -> bool {
        matches!(self, Self::Running | Self::Error(_))
    }

    /// Whether a request is in flight.
    #[must_use]
    pub const fn is_transitioning(&self) -> bool {
        matches!(self, Self::Starting | Self::Stopping)
    }
}

impl fmt::Display for StreamState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Starting => f.write_str("starting"),
            Self::Running => f.write_str("running"),
            Self::Stopping => f.write_str("stopping"),
            Self::Error(reason) => write!(f, "error: {reason}"),
        }
    }
}

/// Locator for a running stream.
///
/// Each successful start gets a fresh nonce so consumers that cache
/// stream sources by URL reload it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamHandle {
    /// Base locator of the stream.
    pub url: String,
    /// Cache-busting nonce.
    pub nonce: Uuid,
}

impl StreamHandle {
    /// Create a handle with a fresh nonce.
    #[must_use]
    pub fn fresh(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            nonce: Uuid::new_v4(),
        }
    }

    /// Locator including the nonce.
    #[must_use]
    pub fn locator(&self) -> String {
        let sep = if self.url.contains('?') { '&' } else { '?' };
        format!("{}{sep}t={}", self.url, self.nonce.simple())
    }
}

/// What the presenter shows for the stream.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SessionView {
    pub state: StreamState,
    /// Loading indicator is up.
    pub loading: bool,
    /// The video layer reported the current handle as loaded.
    pub loaded: bool,
    /// Present while running.
    pub handle: Option<StreamHandle>,
}
