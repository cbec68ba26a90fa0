//! Core model for the gesture dashboard controller.
//!
//! This crate provides the building blocks with no I/O of their own:
//! - `HistoryAggregator` - Bounded, de-duplicated gesture history
//! - `GestureEventRouter` - Feed events to display snapshots
//! - `RemoteControl` / `Presenter` - The two outside collaborators
//! - `ControllerConfig` - Thresholds, timeouts and initial toggles

pub mod config;
pub mod event;
pub mod history;
pub mod observation;
pub mod router;
pub mod session;
pub mod snapshot;
pub mod traits;

pub use config::{ConfigState, ControllerConfig, HandsMode};
pub use event::{FeedMessage, GestureEvent};
pub use history::{HistoryAggregator, RecordOutcome};
pub use observation::{Gesture, GestureObservation};
pub use router::{GestureEventRouter, RouteOutcome};
pub use session::{SessionView, StreamHandle, StreamState};
pub use snapshot::{ConfigSnapshot, CurrentGesture, DisplaySnapshot, HistoryEntry};
pub use traits::{
    CommandAck, ErrorKind, ErrorReport, Notification, NotificationLevel, Presenter, RemoteControl,
    RemoteError,
};
