//! Session controller tying the stream, config and gesture feed together.

use std::{
    fmt::Display,
    sync::{Arc, Mutex},
};

use futures::{Stream, StreamExt};
use gesture_dash_core::{
    ConfigSnapshot, ConfigState, ControllerConfig, DisplaySnapshot, ErrorKind, ErrorReport,
    FeedMessage, GestureEvent, GestureEventRouter, HandsMode, HistoryAggregator, Notification,
    Presenter, RemoteControl, RemoteError, RouteOutcome, SessionView, StreamState,
};
use uuid::Uuid;

use crate::{
    config_sync::{ConfigSync, SyncOutcome},
    lock,
    stream::{CommandOutcome, StreamSession},
};

/// The dashboard's single public surface.
///
/// Owns the stream session, the config toggles and the gesture router,
/// and reports every outcome to the presenter. Remote failures are turned
/// into notifications here; nothing propagates as a panic and every state
/// has a way back to `Idle`.
pub struct SessionController<R, P>
where
    R: RemoteControl + 'static,
    P: Presenter + 'static,
{
    stream: StreamSession<R>,
    config: ConfigSync<R>,
    router: Mutex<GestureEventRouter>,
    presenter: Arc<P>,
}

impl<R, P> SessionController<R, P>
where
    R: RemoteControl + 'static,
    P: Presenter + 'static,
{
    /// Create a controller: session idle, history empty, toggles at
    /// `settings.initial`.
    #[must_use]
    pub fn new(remote: Arc<R>, presenter: Arc<P>, settings: &ControllerConfig) -> Self {
        let stream = StreamSession::new(Arc::clone(&remote), settings).with_listener({
            let presenter = Arc::clone(&presenter);
            Arc::new(move |view: &SessionView| presenter.render_session(view))
        });
        let config = ConfigSync::new(remote, settings.initial).with_listener({
            let presenter = Arc::clone(&presenter);
            Arc::new(move |snapshot: &ConfigSnapshot| presenter.render_config(snapshot))
        });
        let router = GestureEventRouter::new(
            HistoryAggregator::with_capacity(settings.history_capacity),
            settings.display_threshold,
        );

        Self {
            stream,
            config,
            router: Mutex::new(router),
            presenter,
        }
    }

    /// Push the full current state to the presenter.
    pub fn present(&self) {
        self.presenter.render_session(&self.stream.view());
        self.presenter.render_config(&self.config.snapshot());
        self.presenter.render_gestures(&self.display_snapshot());
    }

    /// Turn the camera on.
    ///
    /// # Errors
    /// Returns the report already shown to the user if the start failed.
    pub async fn start(&self) -> Result<CommandOutcome, ErrorReport> {
        match self.stream.start().await {
            Ok(CommandOutcome::Applied) => {
                self.presenter.notify(&Notification::success(
                    "Camera started",
                    "Image processing is running, ready to recognize gestures.",
                ));
                Ok(CommandOutcome::Applied)
            }
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                let report = ErrorReport {
                    kind: err.kind(),
                    message: err.reason().to_string(),
                };
                Err(self.report("Camera error", report))
            }
        }
    }

    /// Turn the camera off.
    ///
    /// # Errors
    /// Returns the report already shown to the user if the stop failed.
    pub async fn stop(&self) -> Result<CommandOutcome, ErrorReport> {
        match self.stream.stop().await {
            Ok(CommandOutcome::Applied) => {
                self.presenter.notify(&Notification::info(
                    "Camera stopped",
                    "Gesture recognition is paused.",
                ));
                Ok(CommandOutcome::Applied)
            }
            Ok(outcome) => Ok(outcome),
            Err(err) => Err(self.report(
                "Error",
                ErrorReport::from_remote("Camera could not be stopped", &err),
            )),
        }
    }

    /// Mirror the camera image or not.
    ///
    /// # Errors
    /// Returns the report already shown to the user if the toggle failed.
    pub async fn set_mirror(&self, desired: bool) -> Result<SyncOutcome<bool>, ErrorReport> {
        let result = self.config.set_mirror(desired).await;
        self.toggle_result("Image flip failed", result)
    }

    /// Show the hand skeleton overlay or not.
    ///
    /// # Errors
    /// Returns the report already shown to the user if the toggle failed.
    pub async fn set_skeleton(&self, desired: bool) -> Result<SyncOutcome<bool>, ErrorReport> {
        let result = self.config.set_skeleton(desired).await;
        self.toggle_result("Skeleton setting could not be changed", result)
    }

    /// Track one or two hands. The remote has the final say on the mode.
    ///
    /// # Errors
    /// Returns the report already shown to the user if the toggle failed.
    pub async fn set_hands_mode(
        &self,
        desired: HandsMode,
    ) -> Result<SyncOutcome<HandsMode>, ErrorReport> {
        let result = self.config.set_hands_mode(desired).await;
        self.toggle_result("Hand tracking mode could not be changed", result)
    }

    /// Apply a whole settings form at once.
    ///
    /// The three toggles are independent and are synced concurrently.
    /// Returns the confirmed configuration afterwards.
    ///
    /// # Errors
    /// Returns every failure; each has already been shown to the user.
    pub async fn apply_settings(
        &self,
        target: ConfigState,
    ) -> Result<ConfigState, Vec<ErrorReport>> {
        let (mirror, skeleton, hands) = futures::join!(
            self.set_mirror(target.mirrored),
            self.set_skeleton(target.skeleton_visible),
            self.set_hands_mode(target.hands_mode),
        );

        let errors: Vec<ErrorReport> = [mirror.err(), skeleton.err(), hands.err()]
            .into_iter()
            .flatten()
            .collect();
        if !errors.is_empty() {
            return Err(errors);
        }

        self.presenter
            .notify(&Notification::success("Settings", "Your settings were saved."));
        Ok(self.config.confirmed())
    }

    /// Feed one detection event through the router.
    pub fn on_gesture_event(&self, event: &GestureEvent) -> RouteOutcome {
        let (outcome, snapshot) = {
            let mut router = lock(&self.router);
            let outcome = router.route(event);
            let snapshot = (outcome != RouteOutcome::Dropped).then(|| router.snapshot());
            (outcome, snapshot)
        };
        if let Some(snapshot) = snapshot {
            self.presenter.render_gestures(&snapshot);
        }
        outcome
    }

    /// Handle one message from the remote event channel.
    pub fn on_feed_message(&self, message: &FeedMessage) {
        match message {
            FeedMessage::Connected => {
                self.stream.on_channel_connected();
                self.presenter.connection_pulse();
            }
            FeedMessage::GestureDetected(event) => {
                self.on_gesture_event(event);
            }
        }
    }

    /// Consume an event channel in arrival order until it ends.
    ///
    /// Undecodable messages are logged and skipped.
    pub async fn run_feed<S, E>(&self, feed: S)
    where
        S: Stream<Item = Result<FeedMessage, E>>,
        E: Display,
    {
        futures::pin_mut!(feed);
        while let Some(next) = feed.next().await {
            match next {
                Ok(message) => self.on_feed_message(&message),
                Err(e) => tracing::warn!("feed error: {e}"),
            }
        }
        tracing::info!("event feed ended");
    }

    /// Run [`Self::run_feed`] on a background task.
    pub fn spawn_feed<S, E>(self: &Arc<Self>, feed: S) -> tokio::task::JoinHandle<()>
    where
        S: Stream<Item = Result<FeedMessage, E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        let this = Arc::clone(self);
        tokio::spawn(async move { this.run_feed(feed).await })
    }

    /// The video layer finished loading the stream with this nonce.
    pub fn on_stream_loaded(&self, nonce: Uuid) -> bool {
        self.stream.mark_loaded(nonce)
    }

    /// The video layer lost the stream.
    pub fn on_stream_error(&self, reason: &str) {
        if self.stream.fail_stream(reason) {
            self.report(
                "Camera error",
                ErrorReport {
                    kind: ErrorKind::Transport,
                    message: reason.to_string(),
                },
            );
        }
    }

    /// Dismiss an error, returning the session to `Idle`.
    pub fn acknowledge_error(&self) -> bool {
        self.stream.acknowledge_error()
    }

    /// Idle session and empty history. The toggles keep their values,
    /// since they mirror settings the remote still holds.
    ///
    /// Replies to requests still in flight are discarded when they arrive.
    pub fn reset(&self) {
        self.stream.reset();
        let snapshot = {
            let mut router = lock(&self.router);
            router.reset();
            router.snapshot()
        };
        self.presenter.render_gestures(&snapshot);
    }

    /// Current stream state.
    #[must_use]
    pub fn state(&self) -> StreamState {
        self.stream.current_state()
    }

    /// Current session view.
    #[must_use]
    pub fn session_view(&self) -> SessionView {
        self.stream.view()
    }

    /// Current configuration.
    #[must_use]
    pub fn config_snapshot(&self) -> ConfigSnapshot {
        self.config.snapshot()
    }

    /// Current gesture display.
    #[must_use]
    pub fn display_snapshot(&self) -> DisplaySnapshot {
        lock(&self.router).snapshot()
    }

    /// The stream session, for subscribing to view changes.
    #[must_use]
    pub const fn stream(&self) -> &StreamSession<R> {
        &self.stream
    }

    fn toggle_result<T>(
        &self,
        context: &str,
        result: Result<SyncOutcome<T>, RemoteError>,
    ) -> Result<SyncOutcome<T>, ErrorReport> {
        result.map_err(|err| self.report("Error", ErrorReport::from_remote(context, &err)))
    }

    fn report(&self, title: &str, report: ErrorReport) -> ErrorReport {
        self.presenter.notify(&Notification::error(title, report.clone()));
        report
    }
}

#[cfg(all(test, feature = "memory"))]
mod tests {
    use std::time::Duration;

    use gesture_dash_core::{CurrentGesture, NotificationLevel};

    use super::*;
    use crate::remote::{InMemoryRemote, RemoteCall};

    #[derive(Default)]
    struct RecordingPresenter {
        gestures: Mutex<Vec<DisplaySnapshot>>,
        sessions: Mutex<Vec<SessionView>>,
        configs: Mutex<Vec<ConfigSnapshot>>,
        notes: Mutex<Vec<Notification>>,
        pulses: Mutex<usize>,
    }

    impl RecordingPresenter {
        fn last_gestures(&self) -> Option<DisplaySnapshot> {
            lock(&self.gestures).last().cloned()
        }

        fn notes(&self) -> Vec<Notification> {
            lock(&self.notes).clone()
        }
    }

    impl Presenter for RecordingPresenter {
        fn render_gestures(&self, snapshot: &DisplaySnapshot) {
            lock(&self.gestures).push(snapshot.clone());
        }

        fn render_session(&self, view: &SessionView) {
            lock(&self.sessions).push(view.clone());
        }

        fn render_config(&self, config: &ConfigSnapshot) {
            lock(&self.configs).push(*config);
        }

        fn notify(&self, notification: &Notification) {
            lock(&self.notes).push(notification.clone());
        }

        fn connection_pulse(&self) {
            *lock(&self.pulses) += 1;
        }
    }

    type Controller = SessionController<InMemoryRemote, RecordingPresenter>;

    fn setup() -> (Arc<InMemoryRemote>, Arc<RecordingPresenter>, Arc<Controller>) {
        let remote = Arc::new(InMemoryRemote::new());
        let presenter = Arc::new(RecordingPresenter::default());
        let controller = Arc::new(SessionController::new(
            Arc::clone(&remote),
            Arc::clone(&presenter),
            &ControllerConfig::default(),
        ));
        (remote, presenter, controller)
    }

    #[tokio::test]
    async fn test_starts_idle_and_empty() {
        let (_, presenter, controller) = setup();
        controller.present();
        assert_eq!(controller.state(), StreamState::Idle);
        assert_eq!(presenter.last_gestures(), Some(DisplaySnapshot::default()));
        assert_eq!(lock(&presenter.sessions).len(), 1);
        assert_eq!(lock(&presenter.configs).len(), 1);
    }

    #[tokio::test]
    async fn test_start_notifies_success() {
        let (remote, presenter, controller) = setup();
        assert_eq!(controller.start().await.unwrap(), CommandOutcome::Applied);
        assert!(remote.camera_running());
        let notes = presenter.notes();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].level, NotificationLevel::Success);
        assert_eq!(
            lock(&presenter.sessions).last().map(|v| v.state.clone()),
            Some(StreamState::Running)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_rapid_double_start() {
        let (remote, _, controller) = setup();
        remote.set_latency(Duration::from_millis(250));

        let (a, b) = tokio::join!(controller.start(), controller.start());
        assert_eq!(a.unwrap(), CommandOutcome::Applied);
        assert_eq!(b.unwrap(), CommandOutcome::Ignored);
        assert_eq!(remote.calls(RemoteCall::Start), 1);
    }

    #[tokio::test]
    async fn test_start_failure_then_retry() {
        let (remote, presenter, controller) = setup();
        remote.fail_next(RemoteCall::Start, RemoteError::Rejected("camera busy".into()));

        let report = controller.start().await.unwrap_err();
        assert_eq!(report.kind, ErrorKind::Rejected);
        assert_eq!(report.message, "camera busy");
        assert_eq!(controller.state(), StreamState::Error("camera busy".into()));
        assert_eq!(presenter.notes()[0].level, NotificationLevel::Error);

        assert_eq!(controller.start().await.unwrap(), CommandOutcome::Applied);
        assert_eq!(controller.state(), StreamState::Running);
    }

    #[tokio::test]
    async fn test_stop_failure_reports_and_keeps_running() {
        let (remote, presenter, controller) = setup();
        controller.start().await.unwrap();
        remote.fail_next(RemoteCall::Stop, RemoteError::Rejected("device locked".into()));

        let report = controller.stop().await.unwrap_err();
        assert_eq!(report.message, "Camera could not be stopped: device locked");
        assert_eq!(controller.state(), StreamState::Running);
        assert_eq!(presenter.notes().len(), 2);
    }

    #[tokio::test]
    async fn test_set_mirror_twice_one_call() {
        let remote = Arc::new(InMemoryRemote::with_config(ConfigState {
            mirrored: false,
            ..ConfigState::default()
        }));
        let presenter = Arc::new(RecordingPresenter::default());
        let controller = SessionController::new(
            Arc::clone(&remote),
            Arc::clone(&presenter),
            &ControllerConfig::default().with_initial(remote.config()),
        );

        controller.set_mirror(true).await.unwrap();
        controller.set_mirror(true).await.unwrap();
        assert_eq!(remote.calls(RemoteCall::Mirror), 1);
        assert!(controller.config_snapshot().confirmed.mirrored);
    }

    #[tokio::test]
    async fn test_toggle_failure_rolls_back_and_notifies() {
        let (remote, presenter, controller) = setup();
        remote.fail_next(RemoteCall::Skeleton, RemoteError::Transport("refused".into()));

        let report = controller.set_skeleton(false).await.unwrap_err();
        assert_eq!(report.kind, ErrorKind::Transport);
        assert!(controller.config_snapshot().displayed.skeleton_visible);

        let configs = lock(&presenter.configs).clone();
        assert!(!configs[0].displayed.skeleton_visible);
        assert!(configs[1].displayed.skeleton_visible);
        assert_eq!(presenter.notes().len(), 1);
    }

    #[tokio::test]
    async fn test_hands_mode_server_authoritative() {
        let (remote, _, controller) = setup();
        remote.pin_hands_mode(Some(HandsMode::Double));
        let outcome = controller.set_hands_mode(HandsMode::Single).await.unwrap();
        assert_eq!(outcome, SyncOutcome::Confirmed(HandsMode::Double));
        assert_eq!(controller.config_snapshot().displayed.hands_mode, HandsMode::Double);
    }

    #[tokio::test]
    async fn test_apply_settings() {
        let (remote, presenter, controller) = setup();
        let target = ConfigState {
            mirrored: false,
            skeleton_visible: true,
            hands_mode: HandsMode::Single,
        };

        assert_eq!(controller.apply_settings(target).await.unwrap(), target);
        assert_eq!(remote.config(), target);
        assert_eq!(remote.calls(RemoteCall::Skeleton), 0);
        assert_eq!(presenter.notes().last().unwrap().title, "Settings");
    }

    #[tokio::test]
    async fn test_apply_settings_collects_errors() {
        let (remote, _, controller) = setup();
        remote.fail_next(RemoteCall::Mirror, RemoteError::Transport("x".into()));
        let target = ConfigState {
            mirrored: false,
            ..ConfigState::default()
        };
        let errors = controller.apply_settings(target).await.unwrap_err();
        assert_eq!(errors.len(), 1);
    }

    #[tokio::test]
    async fn test_gesture_scenarios() {
        let (_, presenter, controller) = setup();

        let outcome = controller.on_gesture_event(&GestureEvent::named("Thumbs Up", 0.75));
        assert_eq!(outcome, RouteOutcome::Promoted);
        let snapshot = presenter.last_gestures().unwrap();
        assert_eq!(snapshot.current_gesture.label(), "Thumbs Up");
        assert_eq!(snapshot.current_gesture.confidence_percent(), 75);
        assert_eq!(snapshot.history[0].occurrence_count, 1);

        let renders = lock(&presenter.gestures).len();
        let outcome = controller.on_gesture_event(&GestureEvent::named("Thumbs Up", 0.45));
        assert_eq!(outcome, RouteOutcome::Dropped);
        assert_eq!(lock(&presenter.gestures).len(), renders);
    }

    #[tokio::test]
    async fn test_feed_in_order() {
        let (_, presenter, controller) = setup();
        let feed = futures::stream::iter(vec![
            Ok::<_, String>(FeedMessage::Connected),
            Ok(FeedMessage::GestureDetected(GestureEvent::named("Fist", 0.9))),
            Err("garbled line".to_string()),
            Ok(FeedMessage::GestureDetected(GestureEvent::no_hand())),
            Ok(FeedMessage::GestureDetected(GestureEvent::no_hand())),
        ]);

        controller.spawn_feed(feed).await.unwrap();

        assert_eq!(*lock(&presenter.pulses), 1);
        assert_eq!(controller.stream().connection_count(), 1);
        let snapshot = controller.display_snapshot();
        assert_eq!(snapshot.current_gesture, CurrentGesture::NoHand);
        let names: Vec<_> = snapshot.history.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["No Hand", "Fist"]);
        assert_eq!(snapshot.history[0].occurrence_count, 1);
    }

    #[tokio::test]
    async fn test_stream_error_and_recovery() {
        let (_, presenter, controller) = setup();
        controller.start().await.unwrap();
        let nonce = controller.session_view().handle.unwrap().nonce;
        assert!(controller.on_stream_loaded(nonce));

        controller.on_stream_error("video decode failed");
        assert_eq!(
            controller.state(),
            StreamState::Error("video decode failed".into())
        );
        assert_eq!(presenter.notes().last().unwrap().level, NotificationLevel::Error);

        assert!(controller.acknowledge_error());
        assert_eq!(controller.state(), StreamState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_discards_inflight_start() {
        let (remote, presenter, controller) = setup();
        remote.set_latency(Duration::from_millis(400));
        controller.on_gesture_event(&GestureEvent::named("Peace", 0.9));

        let task = tokio::spawn({
            let controller = Arc::clone(&controller);
            async move { controller.start().await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        controller.reset();

        assert_eq!(task.await.unwrap().unwrap(), CommandOutcome::Stale);
        assert_eq!(controller.state(), StreamState::Idle);
        assert!(controller.display_snapshot().history.is_empty());
        assert!(presenter.notes().is_empty());
    }

    #[tokio::test]
    async fn test_reset_keeps_confirmed_settings() {
        let (remote, _, controller) = setup();
        controller.set_mirror(false).await.unwrap();
        controller.on_gesture_event(&GestureEvent::named("Fist", 0.9));

        controller.reset();

        assert!(controller.display_snapshot().history.is_empty());
        let config = controller.config_snapshot();
        assert!(!config.confirmed.mirrored);
        assert!(config.is_settled());
        assert_eq!(config.confirmed, remote.config());
    }
}
