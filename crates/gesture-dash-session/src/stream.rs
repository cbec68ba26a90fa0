//! Camera stream lifecycle state machine.

use std::{
    sync::{
        Arc, Mutex, MutexGuard,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use gesture_dash_core::{
    CommandAck, ControllerConfig, RemoteControl, RemoteError, SessionView, StreamHandle,
    StreamState,
};
use tokio::sync::watch;
use uuid::Uuid;

use crate::lock;

/// Callback invoked with every new session view.
pub type ViewListener = Arc<dyn Fn(&SessionView) + Send + Sync>;

/// What happened to a start or stop command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    /// The request was issued and its reply applied.
    Applied,
    /// Not valid from the current state, or another request is still
    /// outstanding; no request issued.
    Ignored,
    /// The reply arrived after the session moved on and was discarded.
    Stale,
}

struct Inner {
    view: SessionView,
    generation: u64,
    /// A start or stop request is outstanding, possibly a stale one.
    in_flight: bool,
}

/// Camera stream lifecycle: `Idle -> Starting -> Running -> Stopping -> Idle`,
/// with `Error` reachable from a failed start or a broken stream.
///
/// Only one start or stop is ever in flight, including one made stale by
/// [`reset`](Self::reset). Every issued request captures a generation
/// number; a reply whose generation is no longer current is discarded.
/// Dropping a `start()` or `stop()` future before its reply lands puts the
/// session back where it was.
pub struct StreamSession<R: RemoteControl> {
    remote: Arc<R>,
    inner: Mutex<Inner>,
    stream_url: String,
    loading_timeout: Duration,
    updates: watch::Sender<SessionView>,
    listener: Option<ViewListener>,
    connections: AtomicU64,
}

/// Outstanding start or stop. Restores the previous state on drop unless
/// the reply was handled.
struct InFlight<'a, R: RemoteControl> {
    session: &'a StreamSession<R>,
    generation: u64,
    restore: Option<StreamState>,
}

impl<R: RemoteControl> InFlight<'_, R> {
    fn disarm(mut self) {
        self.restore = None;
    }
}

impl<R: RemoteControl> Drop for InFlight<'_, R> {
    fn drop(&mut self) {
        let Some(previous) = self.restore.take() else {
            return;
        };
        let mut inner = lock(&self.session.inner);
        inner.in_flight = false;
        if inner.generation != self.generation {
            return;
        }
        tracing::debug!(
            generation = self.generation,
            "request dropped, back to {previous}"
        );
        inner.view.state = previous;
        inner.view.loading = false;
        self.session.publish(inner);
    }
}

impl<R: RemoteControl> StreamSession<R> {
    /// Create an idle session.
    #[must_use]
    pub fn new(remote: Arc<R>, config: &ControllerConfig) -> Self {
        let (updates, _) = watch::channel(SessionView::default());
        Self {
            remote,
            inner: Mutex::new(Inner {
                view: SessionView::default(),
                generation: 0,
                in_flight: false,
            }),
            stream_url: config.stream_url.clone(),
            loading_timeout: config.loading_timeout(),
            updates,
            listener: None,
            connections: AtomicU64::new(0),
        }
    }

    /// Call `listener` with every new view.
    #[must_use]
    pub fn with_listener(mut self, listener: ViewListener) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn current_state(&self) -> StreamState {
        lock(&self.inner).view.state.clone()
    }

    /// Current view.
    #[must_use]
    pub fn view(&self) -> SessionView {
        lock(&self.inner).view.clone()
    }

    /// Receiver that sees every view change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionView> {
        self.updates.subscribe()
    }

    /// Turn the camera on.
    ///
    /// Valid from `Idle` or `Error`; otherwise returns `Ignored` without
    /// contacting the remote. If the reply takes longer than the loading
    /// timeout the loading flag is cleared early, but the state still
    /// follows the reply.
    ///
    /// # Errors
    /// Returns the remote error after moving to `Error`.
    pub async fn start(&self) -> Result<CommandOutcome, RemoteError> {
        let guard = {
            let mut inner = lock(&self.inner);
            if inner.in_flight || !inner.view.state.can_start() {
                tracing::debug!(
                    state = %inner.view.state,
                    in_flight = inner.in_flight,
                    "start ignored"
                );
                return Ok(CommandOutcome::Ignored);
            }
            inner.generation += 1;
            inner.in_flight = true;
            let previous = std::mem::replace(
                &mut inner.view,
                SessionView {
                    state: StreamState::Starting,
                    loading: true,
                    loaded: false,
                    handle: None,
                },
            );
            let generation = inner.generation;
            self.publish(inner);
            InFlight {
                session: self,
                generation,
                restore: Some(previous.state),
            }
        };
        let generation = guard.generation;
        tracing::info!(generation, "starting camera");

        let request = self.remote.start_camera();
        tokio::pin!(request);
        let reply = tokio::select! {
            reply = &mut request => reply,
            () = tokio::time::sleep(self.loading_timeout) => {
                tracing::debug!(generation, "start slow, hiding loading indicator");
                self.update(generation, |view| view.loading = false);
                request.await
            }
        };
        guard.disarm();
        let result = reply.and_then(CommandAck::into_result);

        {
            let mut inner = lock(&self.inner);
            inner.in_flight = false;
            if inner.generation != generation {
                drop(inner);
                tracing::debug!(generation, "stale start reply discarded");
                return Ok(CommandOutcome::Stale);
            }
            inner.view.loading = false;
            match &result {
                Ok(_) => {
                    inner.view.state = StreamState::Running;
                    inner.view.handle = Some(StreamHandle::fresh(&self.stream_url));
                }
                Err(err) => {
                    inner.view.state = StreamState::Error(err.reason().to_string());
                    inner.view.handle = None;
                }
            }
            self.publish(inner);
        }

        match result {
            Ok(_) => {
                tracing::info!("camera running");
                Ok(CommandOutcome::Applied)
            }
            Err(err) => {
                tracing::warn!("camera start failed: {err}");
                Err(err)
            }
        }
    }

    /// Turn the camera off.
    ///
    /// Valid from `Running` or `Error`; otherwise returns `Ignored`. A failed
    /// stop restores the state the session was in before, since the camera
    /// may still be on.
    ///
    /// # Errors
    /// Returns the remote error after restoring the previous state.
    pub async fn stop(&self) -> Result<CommandOutcome, RemoteError> {
        let (guard, previous) = {
            let mut inner = lock(&self.inner);
            if inner.in_flight || !inner.view.state.can_stop() {
                tracing::debug!(
                    state = %inner.view.state,
                    in_flight = inner.in_flight,
                    "stop ignored"
                );
                return Ok(CommandOutcome::Ignored);
            }
            inner.generation += 1;
            inner.in_flight = true;
            let previous = std::mem::replace(&mut inner.view.state, StreamState::Stopping);
            let generation = inner.generation;
            self.publish(inner);
            let guard = InFlight {
                session: self,
                generation,
                restore: Some(previous.clone()),
            };
            (guard, previous)
        };
        let generation = guard.generation;
        tracing::info!(generation, "stopping camera");

        let reply = self.remote.stop_camera().await;
        guard.disarm();
        let result = reply.and_then(CommandAck::into_result);

        {
            let mut inner = lock(&self.inner);
            inner.in_flight = false;
            if inner.generation != generation {
                drop(inner);
                tracing::debug!(generation, "stale stop reply discarded");
                return Ok(CommandOutcome::Stale);
            }
            match &result {
                Ok(_) => inner.view = SessionView::default(),
                Err(_) => inner.view.state = previous,
            }
            self.publish(inner);
        }

        match result {
            Ok(_) => {
                tracing::info!("camera stopped");
                Ok(CommandOutcome::Applied)
            }
            Err(err) => {
                tracing::warn!("camera stop failed: {err}");
                Err(err)
            }
        }
    }

    /// The video layer finished loading the stream identified by `nonce`.
    ///
    /// Returns false if `nonce` does not belong to the running stream.
    pub fn mark_loaded(&self, nonce: Uuid) -> bool {
        let mut inner = lock(&self.inner);
        let current = inner
            .view
            .handle
            .as_ref()
            .is_some_and(|h| h.nonce == nonce);
        if !current || inner.view.state != StreamState::Running || inner.view.loaded {
            return false;
        }
        inner.view.loaded = true;
        inner.view.loading = false;
        self.publish(inner);
        true
    }

    /// The video layer lost the stream.
    ///
    /// Moves a running session to `Error`; returns false otherwise.
    pub fn fail_stream(&self, reason: &str) -> bool {
        let mut inner = lock(&self.inner);
        if inner.view.state != StreamState::Running {
            return false;
        }
        inner.view = SessionView {
            state: StreamState::Error(reason.to_string()),
            ..SessionView::default()
        };
        tracing::warn!("stream failed: {reason}");
        self.publish(inner);
        true
    }

    /// Clear an error back to `Idle`.
    pub fn acknowledge_error(&self) -> bool {
        let mut inner = lock(&self.inner);
        if !matches!(inner.view.state, StreamState::Error(_)) {
            return false;
        }
        inner.view = SessionView::default();
        self.publish(inner);
        true
    }

    /// Drop to `Idle` from any state. Replies to requests already in
    /// flight become stale; until such a reply lands, `start()` and
    /// `stop()` stay ignored so only one request is ever outstanding.
    pub fn reset(&self) {
        let mut inner = lock(&self.inner);
        inner.generation += 1;
        inner.view = SessionView::default();
        tracing::debug!(in_flight = inner.in_flight, "stream session reset");
        self.publish(inner);
    }

    /// Wait until the running stream is loaded.
    ///
    /// Resolves to false if the session leaves `Starting`/`Running` first.
    pub async fn wait_loaded(&self) -> bool {
        let mut updates = self.subscribe();
        updates
            .wait_for(|view| {
                view.loaded
                    || !matches!(view.state, StreamState::Starting | StreamState::Running)
            })
            .await
            .is_ok_and(|view| view.loaded)
    }

    /// The remote event channel connected.
    pub fn on_channel_connected(&self) -> u64 {
        let count = self.connections.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::info!(count, "event channel connected");
        count
    }

    /// How many times the event channel has connected.
    #[must_use]
    pub fn connection_count(&self) -> u64 {
        self.connections.load(Ordering::Relaxed)
    }

    fn update(&self, generation: u64, apply: impl FnOnce(&mut SessionView)) {
        let mut inner = lock(&self.inner);
        if inner.generation != generation {
            return;
        }
        apply(&mut inner.view);
        self.publish(inner);
    }

    /// Send the view to subscribers while still holding the lock, so the
    /// channel never goes back to an older view; the listener runs after
    /// the lock is released.
    fn publish(&self, inner: MutexGuard<'_, Inner>) {
        let view = inner.view.clone();
        self.updates.send_replace(view.clone());
        drop(inner);
        if let Some(listener) = &self.listener {
            listener(&view);
        }
    }
}


#[cfg(all(test, feature = "memory"))]
mod tests {
    use super::*;
    use crate::remote::{InMemoryRemote, RemoteCall};

    fn session(remote: &Arc<InMemoryRemote>) -> StreamSession<InMemoryRemote> {
        StreamSession::new(Arc::clone(remote), &ControllerConfig::default())
    }

    #[tokio::test]
    async fn test_start_then_stop() {
        let remote = Arc::new(InMemoryRemote::new());
        let session = session(&remote);
        assert_eq!(session.current_state(), StreamState::Idle);

        assert_eq!(session.start().await.unwrap(), CommandOutcome::Applied);
        let view = session.view();
        assert_eq!(view.state, StreamState::Running);
        assert!(!view.loading);
        assert!(view.handle.unwrap().locator().starts_with("/video_feed?t="));

        assert_eq!(session.stop().await.unwrap(), CommandOutcome::Applied);
        assert_eq!(session.view(), SessionView::default());
        assert!(!remote.camera_running());
    }

    #[tokio::test]
    async fn test_fresh_handle_per_start() {
        let remote = Arc::new(InMemoryRemote::new());
        let session = session(&remote);
        session.start().await.unwrap();
        let first = session.view().handle.unwrap();
        session.stop().await.unwrap();
        session.start().await.unwrap();
        assert_ne!(session.view().handle.unwrap().nonce, first.nonce);
    }

    #[tokio::test(start_paused = true)]
    async fn test_double_start_issues_one_request() {
        let remote = Arc::new(InMemoryRemote::new());
        remote.set_latency(Duration::from_millis(300));
        let session = session(&remote);

        let (first, second) = tokio::join!(session.start(), session.start());
        assert_eq!(first.unwrap(), CommandOutcome::Applied);
        assert_eq!(second.unwrap(), CommandOutcome::Ignored);
        assert_eq!(remote.calls(RemoteCall::Start), 1);
    }

    #[tokio::test]
    async fn test_failed_start_enters_error_and_can_retry() {
        let remote = Arc::new(InMemoryRemote::new());
        remote.fail_next(RemoteCall::Start, RemoteError::Rejected("camera busy".into()));
        let session = session(&remote);

        let err = session.start().await.unwrap_err();
        assert_eq!(err.reason(), "camera busy");
        assert_eq!(session.current_state(), StreamState::Error("camera busy".into()));
        assert!(session.view().handle.is_none());
        assert!(!session.view().loading);

        assert_eq!(session.start().await.unwrap(), CommandOutcome::Applied);
        assert_eq!(session.current_state(), StreamState::Running);
        assert_eq!(remote.calls(RemoteCall::Start), 2);
    }

    #[tokio::test]
    async fn test_failed_stop_keeps_running() {
        let remote = Arc::new(InMemoryRemote::new());
        let session = session(&remote);
        session.start().await.unwrap();
        let handle = session.view().handle;

        remote.fail_next(RemoteCall::Stop, RemoteError::Transport("timeout".into()));
        assert!(session.stop().await.is_err());
        assert_eq!(session.current_state(), StreamState::Running);
        assert_eq!(session.view().handle, handle);
    }

    #[tokio::test]
    async fn test_stop_ignored_when_idle() {
        let remote = Arc::new(InMemoryRemote::new());
        let session = session(&remote);
        assert_eq!(session.stop().await.unwrap(), CommandOutcome::Ignored);
        assert_eq!(remote.calls(RemoteCall::Stop), 0);
    }

    #[tokio::test]
    async fn test_stop_from_error() {
        let remote = Arc::new(InMemoryRemote::new());
        remote.fail_next(RemoteCall::Start, RemoteError::Rejected("no device".into()));
        let session = session(&remote);
        let _ = session.start().await;

        assert_eq!(session.stop().await.unwrap(), CommandOutcome::Applied);
        assert_eq!(session.current_state(), StreamState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_start_hides_loading_without_transition() {
        let remote = Arc::new(InMemoryRemote::new());
        remote.set_latency(Duration::from_secs(5));
        let session = Arc::new(session(&remote));

        let task = tokio::spawn({
            let session = Arc::clone(&session);
            async move { session.start().await }
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(session.view().loading);

        tokio::time::sleep(Duration::from_millis(2000)).await;
        let view = session.view();
        assert_eq!(view.state, StreamState::Starting);
        assert!(!view.loading);

        assert_eq!(task.await.unwrap().unwrap(), CommandOutcome::Applied);
        assert_eq!(session.current_state(), StreamState::Running);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reply_after_reset_is_stale() {
        let remote = Arc::new(InMemoryRemote::new());
        remote.set_latency(Duration::from_millis(500));
        let session = Arc::new(session(&remote));

        let task = tokio::spawn({
            let session = Arc::clone(&session);
            async move { session.start().await }
        });
        tokio::time::sleep(Duration::from_millis(100)).await;
        session.reset();

        assert_eq!(task.await.unwrap().unwrap(), CommandOutcome::Stale);
        assert_eq!(session.current_state(), StreamState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_start_restores_previous_state() {
        let remote = Arc::new(InMemoryRemote::new());
        remote.set_latency(Duration::from_millis(500));
        let session = session(&remote);

        let cut_short = tokio::time::timeout(Duration::from_millis(100), session.start()).await;
        assert!(cut_short.is_err());
        let view = session.view();
        assert_eq!(view.state, StreamState::Idle);
        assert!(!view.loading);
        assert_eq!(*session.subscribe().borrow(), view);

        assert_eq!(session.start().await.unwrap(), CommandOutcome::Applied);
        assert_eq!(session.current_state(), StreamState::Running);
        assert_eq!(remote.calls(RemoteCall::Start), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_stop_restores_running() {
        let remote = Arc::new(InMemoryRemote::new());
        let session = session(&remote);
        session.start().await.unwrap();
        remote.set_latency(Duration::from_millis(500));

        let cut_short = tokio::time::timeout(Duration::from_millis(100), session.stop()).await;
        assert!(cut_short.is_err());
        assert_eq!(session.current_state(), StreamState::Running);

        assert_eq!(session.stop().await.unwrap(), CommandOutcome::Applied);
        assert_eq!(session.current_state(), StreamState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_after_reset_waits_for_stale_reply() {
        let remote = Arc::new(InMemoryRemote::new());
        remote.set_latency(Duration::from_millis(500));
        let session = Arc::new(session(&remote));

        let task = tokio::spawn({
            let session = Arc::clone(&session);
            async move { session.start().await }
        });
        tokio::time::sleep(Duration::from_millis(100)).await;
        session.reset();

        assert_eq!(session.start().await.unwrap(), CommandOutcome::Ignored);
        assert_eq!(remote.calls(RemoteCall::Start), 1);

        assert_eq!(task.await.unwrap().unwrap(), CommandOutcome::Stale);
        assert_eq!(session.start().await.unwrap(), CommandOutcome::Applied);
        assert_eq!(remote.calls(RemoteCall::Start), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_channel_tracks_latest_view_under_contention() {
        let remote = Arc::new(InMemoryRemote::new());
        let session = Arc::new(session(&remote));
        let updates = session.subscribe();

        for _ in 0..200 {
            session.start().await.unwrap();
            let nonce = session.view().handle.unwrap().nonce;

            let loader = tokio::spawn({
                let session = Arc::clone(&session);
                async move { session.mark_loaded(nonce) }
            });
            let stopper = tokio::spawn({
                let session = Arc::clone(&session);
                async move { session.stop().await }
            });
            loader.await.unwrap();
            stopper.await.unwrap().unwrap();

            assert_eq!(session.current_state(), StreamState::Idle);
            assert_eq!(*updates.borrow(), session.view());
        }
    }

    #[tokio::test]
    async fn test_mark_loaded_checks_nonce() {
        let remote = Arc::new(InMemoryRemote::new());
        let session = session(&remote);
        session.start().await.unwrap();

        assert!(!session.mark_loaded(Uuid::new_v4()));
        let nonce = session.view().handle.unwrap().nonce;
        assert!(session.mark_loaded(nonce));
        assert!(session.view().loaded);
        assert!(session.wait_loaded().await);
    }

    #[tokio::test]
    async fn test_wait_loaded_resolves_on_event() {
        let remote = Arc::new(InMemoryRemote::new());
        let session = Arc::new(session(&remote));
        session.start().await.unwrap();
        let nonce = session.view().handle.unwrap().nonce;

        let waiter = tokio::spawn({
            let session = Arc::clone(&session);
            async move { session.wait_loaded().await }
        });
        tokio::task::yield_now().await;
        session.mark_loaded(nonce);
        assert!(waiter.await.unwrap());
    }

    #[tokio::test]
    async fn test_wait_loaded_false_when_idle() {
        let remote = Arc::new(InMemoryRemote::new());
        let session = session(&remote);
        assert!(!session.wait_loaded().await);
    }

    #[tokio::test]
    async fn test_stream_failure_and_acknowledge() {
        let remote = Arc::new(InMemoryRemote::new());
        let session = session(&remote);
        assert!(!session.fail_stream("decode error"));
        session.start().await.unwrap();

        assert!(session.fail_stream("decode error"));
        assert_eq!(session.current_state(), StreamState::Error("decode error".into()));
        assert!(session.acknowledge_error());
        assert_eq!(session.current_state(), StreamState::Idle);
        assert!(!session.acknowledge_error());
    }

    #[tokio::test]
    async fn test_listener_sees_transitions() {
        let remote = Arc::new(InMemoryRemote::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let session = session(&remote).with_listener({
            let seen = Arc::clone(&seen);
            Arc::new(move |view: &SessionView| lock(&seen).push(view.state.clone()))
        });

        session.start().await.unwrap();
        assert_eq!(
            *lock(&seen),
            vec![StreamState::Starting, StreamState::Running]
        );
    }

    #[test]
    fn test_connection_count() {
        let remote = Arc::new(InMemoryRemote::new());
        let session = session(&remote);
        assert_eq!(session.on_channel_connected(), 1);
        assert_eq!(session.on_channel_connected(), 2);
        assert_eq!(session.connection_count(), 2);
    }
}
