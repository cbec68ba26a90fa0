//! Core traits for the remote control service and the presenter.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    config::HandsMode,
    session::SessionView,
    snapshot::{ConfigSnapshot, DisplaySnapshot},
};

/// Reply to a start or stop request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandAck {
    /// Whether the service carried out the command.
    pub success: bool,
    /// Human readable detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl CommandAck {
    /// Successful reply.
    #[must_use]
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
        }
    }

    /// Failed reply.
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
        }
    }

    /// Convert a failure reply into an error.
    ///
    /// # Errors
    /// Returns [`RemoteError::Rejected`] if `success` is false.
    pub fn into_result(self) -> Result<Option<String>, RemoteError> {
        if self.success {
            Ok(self.message)
        } else {
            Err(RemoteError::Rejected(
                self.message
                    .unwrap_or_else(|| "request rejected".to_string()),
            ))
        }
    }
}

/// Remote control failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("{0}")]
    Rejected(String),
    #[error("Invalid response: {0}")]
    Decode(String),
}

impl RemoteError {
    /// Category for error reports.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Transport(_) => ErrorKind::Transport,
            Self::Rejected(_) => ErrorKind::Rejected,
            Self::Decode(_) => ErrorKind::Decode,
        }
    }

    /// Message without the category prefix.
    #[must_use]
    pub fn reason(&self) -> &str {
        match self {
            Self::Transport(m) | Self::Rejected(m) | Self::Decode(m) => m,
        }
    }
}

/// Trait for the service that owns the camera and its settings.
///
/// Toggles carry no value: the service flips its setting and reports
/// the result where it can.
#[async_trait]
pub trait RemoteControl: Send + Sync {
    /// Turn the camera on.
    async fn start_camera(&self) -> Result<CommandAck, RemoteError>;

    /// Turn the camera off.
    async fn stop_camera(&self) -> Result<CommandAck, RemoteError>;

    /// Flip mirroring. Returns the new value if the service reports it.
    async fn toggle_mirror(&self) -> Result<Option<bool>, RemoteError>;

    /// Flip the skeleton overlay. Returns the new value if reported.
    async fn toggle_skeleton(&self) -> Result<Option<bool>, RemoteError>;

    /// Flip the hands mode. The service decides the resulting mode.
    async fn toggle_hands_mode(&self) -> Result<HandsMode, RemoteError>;
}

/// Error category shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The request never got a usable reply.
    Transport,
    /// The service refused the request.
    Rejected,
    /// The reply could not be understood.
    Decode,
}

/// Structured failure handed to the presenter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub kind: ErrorKind,
    pub message: String,
}

impl ErrorReport {
    /// Report for a remote error, with context.
    #[must_use]
    pub fn from_remote(context: &str, error: &RemoteError) -> Self {
        Self {
            kind: error.kind(),
            message: format!("{context}: {}", error.reason()),
        }
    }
}

/// Severity of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationLevel {
    Success,
    Info,
    Error,
}

/// User-facing notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub level: NotificationLevel,
    pub title: String,
    pub message: String,
    /// Set for error notifications.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorReport>,
}

impl Notification {
    /// Success notification.
    #[must_use]
    pub fn success(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Success,
            title: title.into(),
            message: message.into(),
            error: None,
        }
    }

    /// Informational notification.
    #[must_use]
    pub fn info(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Info,
            title: title.into(),
            message: message.into(),
            error: None,
        }
    }

    /// Error notification carrying a report.
    #[must_use]
    pub fn error(title: impl Into<String>, report: ErrorReport) -> Self {
        Self {
            level: NotificationLevel::Error,
            title: title.into(),
            message: report.message.clone(),
            error: Some(report),
        }
    }
}

/// Trait for whatever renders the dashboard.
///
/// Calls arrive after state has been updated and never while internal
/// locks are held, so implementations may call back into the controller.
pub trait Presenter: Send + Sync {
    /// Gesture panels changed.
    fn render_gestures(&self, snapshot: &DisplaySnapshot);

    /// Stream session changed.
    fn render_session(&self, view: &SessionView);

    /// Remote configuration changed.
    fn render_config(&self, config: &ConfigSnapshot);

    /// Show a notification.
    fn notify(&self, notification: &Notification);

    /// The event channel (re)connected.
    fn connection_pulse(&self) {}
}
