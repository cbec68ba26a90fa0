//! Reference gesture service built on axum.
//!
//! Implements the command endpoints and the NDJSON event feed with the
//! same semantics as the production service, minus the camera itself.
//! Used by the demo and by the client tests.

use std::{
    io,
    sync::{Arc, Mutex, PoisonError},
};

use axum::{
    Json, Router,
    body::Body,
    extract::State,
    http::{StatusCode, header},
    response::IntoResponse,
    routing::{get, post},
};
use bytes::Bytes;
use futures::{StreamExt, future, stream};
use gesture_dash_core::{CommandAck, ConfigState, FeedMessage, GestureEvent, HandsMode};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::protocol::{
    EVENTS, FLIP_CAMERA, HandsModeResponse, MirrorResponse, NDJSON, START_CAMERA, STOP_CAMERA,
    SkeletonResponse, TOGGLE_HANDS_MODE, TOGGLE_SKELETON, encode_feed_line,
};

const EVENT_BUFFER: usize = 256;

struct ServiceState {
    camera_running: bool,
    camera_fault: Option<String>,
    config: ConfigState,
}

/// Shared handle to the reference service.
#[derive(Clone)]
pub struct ReferenceService {
    state: Arc<Mutex<ServiceState>>,
    events: broadcast::Sender<FeedMessage>,
}

impl ReferenceService {
    /// Create a service with the camera off and the given settings.
    #[must_use]
    pub fn new(config: ConfigState) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            state: Arc::new(Mutex::new(ServiceState {
                camera_running: false,
                camera_fault: None,
                config,
            })),
            events,
        }
    }

    /// Build the axum router.
    #[must_use]
    pub fn router(&self) -> Router {
        Router::new()
            .route(START_CAMERA, post(start_camera))
            .route(STOP_CAMERA, post(stop_camera))
            .route(FLIP_CAMERA, post(flip_camera))
            .route(TOGGLE_SKELETON, post(toggle_skeleton))
            .route(TOGGLE_HANDS_MODE, post(toggle_hands_mode))
            .route(EVENTS, get(events))
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http())
            .with_state(self.clone())
    }

    /// Send a message to every connected feed. Returns the number of
    /// listeners reached.
    pub fn publish(&self, message: FeedMessage) -> usize {
        self.events.send(message).unwrap_or(0)
    }

    /// Publish a detection result.
    pub fn publish_gesture(&self, event: GestureEvent) -> usize {
        self.publish(FeedMessage::GestureDetected(event))
    }

    /// Make camera start and stop fail with `reason`, or clear the fault.
    pub fn fail_camera(&self, reason: Option<String>) {
        self.with_state(|s| s.camera_fault = reason);
    }

    #[must_use]
    pub fn camera_running(&self) -> bool {
        self.with_state(|s| s.camera_running)
    }

    #[must_use]
    pub fn config(&self) -> ConfigState {
        self.with_state(|s| s.config)
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut ServiceState) -> T) -> T {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut state)
    }
}

fn reply(ack: CommandAck) -> (StatusCode, Json<CommandAck>) {
    let status = if ack.success {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (status, Json(ack))
}

async fn start_camera(State(service): State<ReferenceService>) -> impl IntoResponse {
    let ack = service.with_state(|s| {
        if s.camera_running {
            return CommandAck::ok("Camera already running");
        }
        if let Some(fault) = &s.camera_fault {
            return CommandAck::failed(fault.clone());
        }
        s.camera_running = true;
        CommandAck::ok("Camera started")
    });
    tracing::info!(success = ack.success, "start_camera");
    reply(ack)
}

async fn stop_camera(State(service): State<ReferenceService>) -> impl IntoResponse {
    let ack = service.with_state(|s| {
        if !s.camera_running {
            return CommandAck::ok("Camera already stopped");
        }
        if let Some(fault) = &s.camera_fault {
            return CommandAck::failed(fault.clone());
        }
        s.camera_running = false;
        CommandAck::ok("Camera stopped")
    });
    tracing::info!(success = ack.success, "stop_camera");
    reply(ack)
}

fn on_off(value: bool) -> &'static str {
    if value { "on" } else { "off" }
}

async fn flip_camera(State(service): State<ReferenceService>) -> Json<MirrorResponse> {
    let flipped = service.with_state(|s| {
        s.config.mirrored = !s.config.mirrored;
        s.config.mirrored
    });
    tracing::info!(flipped, "flip_camera");
    Json(MirrorResponse {
        ack: CommandAck::ok(format!("Camera flip: {}", on_off(flipped))),
        flipped: Some(flipped),
    })
}

async fn toggle_skeleton(State(service): State<ReferenceService>) -> Json<SkeletonResponse> {
    let skeleton = service.with_state(|s| {
        s.config.skeleton_visible = !s.config.skeleton_visible;
        s.config.skeleton_visible
    });
    tracing::info!(skeleton, "toggle_skeleton");
    Json(SkeletonResponse {
        ack: CommandAck::ok(format!("Skeleton: {}", on_off(skeleton))),
        skeleton: Some(skeleton),
    })
}

async fn toggle_hands_mode(State(service): State<ReferenceService>) -> Json<HandsModeResponse> {
    let mode = service.with_state(|s| {
        s.config.hands_mode = s.config.hands_mode.toggled();
        s.config.hands_mode
    });
    tracing::info!(%mode, "toggle_hands_mode");
    let label = match mode {
        HandsMode::Single => "single hand",
        HandsMode::Double => "two hands",
    };
    Json(HandsModeResponse {
        ack: CommandAck::ok(format!("Hand tracking mode: {label}")),
        mode: Some(mode),
    })
}

/// `GET /api/events`: a `connected` line followed by live messages.
async fn events(State(service): State<ReferenceService>) -> impl IntoResponse {
    let live = BroadcastStream::new(service.events.subscribe()).filter_map(|res| {
        future::ready(match res {
            Ok(message) => Some(message),
            Err(e) => {
                tracing::warn!("event feed lagging: {e}");
                None
            }
        })
    });
    tracing::info!("event feed client connected");

    let body = stream::once(future::ready(FeedMessage::Connected))
        .chain(live)
        .map(|message| {
            encode_feed_line(&message)
                .map(Bytes::from)
                .map_err(io::Error::other)
        });

    ([(header::CONTENT_TYPE, NDJSON)], Body::from_stream(body))
}
