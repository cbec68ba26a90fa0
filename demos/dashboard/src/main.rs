//! Gesture dashboard demo.
//!
//! Runs the reference service, connects a session controller to it over
//! HTTP and drives a short scripted session with synthetic detections.
//!
//! Run with: cargo run -p gesture-dash-demo [config.json]
//!
//! Set `GESTURE_DASH_ADDR` to change the bind address (default
//! `127.0.0.1:5000`) and `RUST_LOG` to change verbosity.

use std::{net::SocketAddr, path::Path, sync::Arc, time::Duration};

use anyhow::Context;
use gesture_dash_core::{
    ConfigSnapshot, ConfigState, ControllerConfig, CurrentGesture, DisplaySnapshot, GestureEvent,
    HandsMode, Notification, NotificationLevel, Presenter, SessionView,
};
use gesture_dash_session::SessionController;
use gesture_dash_transport::{HttpRemoteControl, ReferenceService};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_ADDR: &str = "127.0.0.1:5000";

/// Presenter that renders everything as log lines.
struct TracingPresenter;

impl Presenter for TracingPresenter {
    fn render_gestures(&self, snapshot: &DisplaySnapshot) {
        match &snapshot.current_gesture {
            CurrentGesture::NoHand => tracing::info!("gesture: no hand"),
            CurrentGesture::Gesture {
                name,
                confidence_percent,
                level,
            } => tracing::info!(
                new = snapshot.changed,
                ?level,
                "gesture: {name} ({confidence_percent}%)"
            ),
        }
        let history: Vec<String> = snapshot
            .history
            .iter()
            .map(|e| format!("{} x{}", e.name, e.occurrence_count))
            .collect();
        tracing::debug!(history = ?history, "history");
    }

    fn render_session(&self, view: &SessionView) {
        let locator = view.handle.as_ref().map(|h| h.locator());
        tracing::info!(
            state = %view.state,
            loading = view.loading,
            loaded = view.loaded,
            stream = locator.as_deref().unwrap_or("-"),
            "session"
        );
    }

    fn render_config(&self, config: &ConfigSnapshot) {
        tracing::info!(
            mirrored = config.displayed.mirrored,
            skeleton = config.displayed.skeleton_visible,
            hands = %config.displayed.hands_mode,
            settled = config.is_settled(),
            "config"
        );
    }

    fn notify(&self, notification: &Notification) {
        match notification.level {
            NotificationLevel::Error => tracing::error!(
                title = %notification.title,
                "{}",
                notification.message
            ),
            _ => tracing::info!(title = %notification.title, "{}", notification.message),
        }
    }

    fn connection_pulse(&self) {
        tracing::info!("event channel connected");
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<ControllerConfig> {
    let Some(path) = path else {
        return Ok(ControllerConfig::default());
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))
}

/// Detections the synthetic camera reports, in order.
fn script() -> Vec<GestureEvent> {
    vec![
        GestureEvent::no_hand(),
        GestureEvent::named("Open Palm", 0.82),
        GestureEvent::named("Open Palm", 0.88),
        GestureEvent::named("Thumbs Up", 0.45),
        GestureEvent::named("Thumbs Up", 0.75),
        GestureEvent::named("unknown", 0.9),
        GestureEvent::no_hand(),
        GestureEvent::named("Peace", 0.93),
        GestureEvent::named("Fist", 0.67),
    ]
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config_path = std::env::args().nth(1);
    let settings = load_config(config_path.as_deref().map(Path::new))?;
    let addr: SocketAddr = std::env::var("GESTURE_DASH_ADDR")
        .unwrap_or_else(|_| DEFAULT_ADDR.to_string())
        .parse()
        .context("invalid GESTURE_DASH_ADDR")?;

    // Service side
    let service = ReferenceService::new(ConfigState::default());
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    let app = service.router();
    let server = tokio::spawn(async move { axum::serve(listener, app).await });
    tracing::info!("Service listening on http://{addr}");

    // Client side
    let remote = Arc::new(HttpRemoteControl::new(format!("http://{addr}")));
    let controller = Arc::new(SessionController::new(
        Arc::clone(&remote),
        Arc::new(TracingPresenter),
        &settings,
    ));
    controller.present();

    let feed = remote.event_feed().await.context("opening event feed")?;
    let feed_task = controller.spawn_feed(feed);

    if controller.start().await.is_ok() {
        if let Some(handle) = controller.session_view().handle {
            controller.on_stream_loaded(handle.nonce);
        }
    }

    let target = ConfigState {
        mirrored: false,
        skeleton_visible: true,
        hands_mode: HandsMode::Single,
    };
    if let Err(errors) = controller.apply_settings(target).await {
        tracing::warn!(count = errors.len(), "some settings were not applied");
    }

    for event in script() {
        service.publish_gesture(event);
        tokio::time::sleep(Duration::from_millis(300)).await;
    }

    let _ = controller.stop().await;

    let snapshot = controller.display_snapshot();
    println!("{}", serde_json::to_string_pretty(&snapshot)?);

    feed_task.abort();
    server.abort();
    Ok(())
}
