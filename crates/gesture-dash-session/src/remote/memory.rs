//! In-memory remote control service.

use std::{
    collections::{HashMap, VecDeque},
    sync::Mutex,
    time::Duration,
};

use async_trait::async_trait;
use gesture_dash_core::{CommandAck, ConfigState, HandsMode, RemoteControl, RemoteError};

use crate::lock;

/// Remote operations, for call counting and failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteCall {
    Start,
    Stop,
    Mirror,
    Skeleton,
    HandsMode,
}

#[derive(Debug)]
struct ServiceState {
    camera_running: bool,
    config: ConfigState,
    pinned_hands_mode: Option<HandsMode>,
}

/// In-memory remote control service.
///
/// Behaves like the real camera service (toggles flip, repeated
/// start/stop succeed with an "already" message) and adds knobs for
/// latency, injected failures and call counting. Useful for tests and
/// offline development.
pub struct InMemoryRemote {
    state: Mutex<ServiceState>,
    latency: Mutex<Duration>,
    failures: Mutex<HashMap<RemoteCall, VecDeque<RemoteError>>>,
    calls: Mutex<HashMap<RemoteCall, usize>>,
}

impl InMemoryRemote {
    /// Create a service with the default configuration and no latency.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(ConfigState::default())
    }

    /// Create a service starting from `config`.
    #[must_use]
    pub fn with_config(config: ConfigState) -> Self {
        Self {
            state: Mutex::new(ServiceState {
                camera_running: false,
                config,
                pinned_hands_mode: None,
            }),
            latency: Mutex::new(Duration::ZERO),
            failures: Mutex::new(HashMap::new()),
            calls: Mutex::new(HashMap::new()),
        }
    }

    /// Delay every reply by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        *lock(&self.latency) = latency;
    }

    /// Make the next `call` fail with `error`. Failures queue up per call.
    pub fn fail_next(&self, call: RemoteCall, error: RemoteError) {
        lock(&self.failures).entry(call).or_default().push_back(error);
    }

    /// Make the hands-mode toggle always land on `mode`.
    pub fn pin_hands_mode(&self, mode: Option<HandsMode>) {
        lock(&self.state).pinned_hands_mode = mode;
    }

    /// Number of times `call` was issued.
    #[must_use]
    pub fn calls(&self, call: RemoteCall) -> usize {
        lock(&self.calls).get(&call).copied().unwrap_or(0)
    }

    /// Whether the camera is on.
    #[must_use]
    pub fn camera_running(&self) -> bool {
        lock(&self.state).camera_running
    }

    /// Current service-side configuration.
    #[must_use]
    pub fn config(&self) -> ConfigState {
        lock(&self.state).config
    }

    /// Count the call, wait out the latency, then pop an injected failure.
    async fn begin(&self, call: RemoteCall) -> Result<(), RemoteError> {
        *lock(&self.calls).entry(call).or_insert(0) += 1;

        let latency = *lock(&self.latency);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        match lock(&self.failures).get_mut(&call).and_then(VecDeque::pop_front) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl Default for InMemoryRemote {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteControl for InMemoryRemote {
    async fn start_camera(&self) -> Result<CommandAck, RemoteError> {
        self.begin(RemoteCall::Start).await?;
        let mut state = lock(&self.state);
        if state.camera_running {
            return Ok(CommandAck::ok("Camera already running"));
        }
        state.camera_running = true;
        Ok(CommandAck::ok("Camera started"))
    }

    async fn stop_camera(&self) -> Result<CommandAck, RemoteError> {
        self.begin(RemoteCall::Stop).await?;
        let mut state = lock(&self.state);
        if !state.camera_running {
            return Ok(CommandAck::ok("Camera already stopped"));
        }
        state.camera_running = false;
        Ok(CommandAck::ok("Camera stopped"))
    }

    async fn toggle_mirror(&self) -> Result<Option<bool>, RemoteError> {
        self.begin(RemoteCall::Mirror).await?;
        let mut state = lock(&self.state);
        state.config.mirrored = !state.config.mirrored;
        Ok(Some(state.config.mirrored))
    }

    async fn toggle_skeleton(&self) -> Result<Option<bool>, RemoteError> {
        self.begin(RemoteCall::Skeleton).await?;
        let mut state = lock(&self.state);
        state.config.skeleton_visible = !state.config.skeleton_visible;
        Ok(Some(state.config.skeleton_visible))
    }

    async fn toggle_hands_mode(&self) -> Result<HandsMode, RemoteError> {
        self.begin(RemoteCall::HandsMode).await?;
        let mut state = lock(&self.state);
        let next = state
            .pinned_hands_mode
            .unwrap_or_else(|| state.config.hands_mode.toggled());
        state.config.hands_mode = next;
        Ok(next)
    }
}
