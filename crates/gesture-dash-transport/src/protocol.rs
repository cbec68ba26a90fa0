//! Wire protocol shared by the HTTP client and the reference service.
//!
//! Commands are bodiless `POST`s answered with JSON. The event feed is
//! newline-delimited JSON, one [`FeedMessage`] per line.

use gesture_dash_core::{CommandAck, FeedMessage, HandsMode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const START_CAMERA: &str = "/api/start_camera";
pub const STOP_CAMERA: &str = "/api/stop_camera";
pub const FLIP_CAMERA: &str = "/api/flip_camera";
pub const TOGGLE_SKELETON: &str = "/api/toggle_skeleton";
pub const TOGGLE_HANDS_MODE: &str = "/api/toggle_hands_mode";
pub const EVENTS: &str = "/api/events";

/// Content type of the event feed.
pub const NDJSON: &str = "application/x-ndjson";

/// Reply to `POST /api/flip_camera`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorResponse {
    #[serde(flatten)]
    pub ack: CommandAck,
    /// Mirroring after the flip.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flipped: Option<bool>,
}

/// Reply to `POST /api/toggle_skeleton`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkeletonResponse {
    #[serde(flatten)]
    pub ack: CommandAck,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skeleton: Option<bool>,
}

/// Reply to `POST /api/toggle_hands_mode`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandsModeResponse {
    #[serde(flatten)]
    pub ack: CommandAck,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<HandsMode>,
}

/// Event feed failure.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Feed I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed feed message: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Feed line exceeds {0} bytes")]
    LineTooLong(usize),
}

/// Serialize one feed message as a newline-terminated line.
///
/// # Errors
/// Returns an error if the message cannot be serialized.
pub fn encode_feed_line(message: &FeedMessage) -> Result<String, serde_json::Error> {
    let mut line = serde_json::to_string(message)?;
    line.push('\n');
    Ok(line)
}

/// Parse one feed line. Blank lines (keepalives) yield `None`.
///
/// # Errors
/// Returns [`FeedError::Decode`] for malformed JSON or unknown message types.
pub fn decode_feed_line(line: &str) -> Result<Option<FeedMessage>, FeedError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_json::from_str(line)?))
}
