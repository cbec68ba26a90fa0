//! Optimistic remote toggles with rollback.

use std::{
    fmt::Debug,
    future::Future,
    sync::{Arc, Mutex},
};

use gesture_dash_core::{ConfigSnapshot, ConfigState, HandsMode, RemoteControl, RemoteError};
use tokio::sync::Mutex as AsyncMutex;

use crate::lock;

/// Callback invoked with every configuration change.
pub type ConfigListener = Arc<dyn Fn(&ConfigSnapshot) + Send + Sync>;

/// What happened to a toggle request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome<T> {
    /// Already at the requested value; nothing sent.
    Unchanged,
    /// The remote acknowledged; this is the value it reported.
    Confirmed(T),
    /// A newer request for the same toggle took over before this one was sent.
    Superseded,
}

#[derive(Debug, Clone, Copy)]
struct Slot<T> {
    confirmed: T,
    desired: T,
    /// Callers between requesting and finishing.
    pending: usize,
}

/// One toggle: its values plus a gate serializing its requests.
struct Lane<T> {
    name: &'static str,
    slot: Mutex<Slot<T>>,
    gate: AsyncMutex<()>,
}

impl<T: Copy> Lane<T> {
    fn new(name: &'static str, value: T) -> Self {
        Self {
            name,
            slot: Mutex::new(Slot {
                confirmed: value,
                desired: value,
                pending: 0,
            }),
            gate: AsyncMutex::new(()),
        }
    }

    fn confirmed(&self) -> T {
        lock(&self.slot).confirmed
    }

    fn desired(&self) -> T {
        lock(&self.slot).desired
    }
}

/// A caller's claim on a lane, counted in `pending`.
///
/// Released exactly once, on completion or when the caller's future is
/// dropped. Whoever releases last with nothing confirming the displayed
/// value rolls it back to the confirmed one.
struct Ticket<'a, R: RemoteControl, T: Copy + PartialEq> {
    sync: &'a ConfigSync<R>,
    lane: &'a Lane<T>,
    released: bool,
}

impl<R: RemoteControl, T: Copy + PartialEq> Ticket<'_, R, T> {
    /// Returns true if the displayed value was rolled back.
    fn release(&mut self) -> bool {
        if self.released {
            return false;
        }
        self.released = true;
        let mut slot = lock(&self.lane.slot);
        slot.pending -= 1;
        if slot.pending == 0 && slot.desired != slot.confirmed {
            slot.desired = slot.confirmed;
            true
        } else {
            false
        }
    }
}

impl<R: RemoteControl, T: Copy + PartialEq> Drop for Ticket<'_, R, T> {
    fn drop(&mut self) {
        if self.release() {
            tracing::debug!(toggle = self.lane.name, "abandoned request rolled back");
            self.sync.publish();
        }
    }
}

/// Keeps the mirror, skeleton and hands-mode toggles in step with the remote.
///
/// Each setter applies the requested value locally at once, then flips the
/// remote toggle. The remote reply is authoritative; a failure rolls the
/// local value back to the last confirmed one. Requests for the same toggle
/// run one at a time and the latest desired value wins; different toggles
/// run independently.
pub struct ConfigSync<R: RemoteControl> {
    remote: Arc<R>,
    mirror: Lane<bool>,
    skeleton: Lane<bool>,
    hands_mode: Lane<HandsMode>,
    listener: Option<ConfigListener>,
}

impl<R: RemoteControl> ConfigSync<R> {
    /// Create with `initial` as the confirmed remote state.
    #[must_use]
    pub fn new(remote: Arc<R>, initial: ConfigState) -> Self {
        Self {
            remote,
            mirror: Lane::new("mirror", initial.mirrored),
            skeleton: Lane::new("skeleton", initial.skeleton_visible),
            hands_mode: Lane::new("hands_mode", initial.hands_mode),
            listener: None,
        }
    }

    /// Call `listener` with every configuration change.
    #[must_use]
    pub fn with_listener(mut self, listener: ConfigListener) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Optimistic and confirmed values.
    #[must_use]
    pub fn snapshot(&self) -> ConfigSnapshot {
        ConfigSnapshot {
            displayed: ConfigState {
                mirrored: self.mirror.desired(),
                skeleton_visible: self.skeleton.desired(),
                hands_mode: self.hands_mode.desired(),
            },
            confirmed: self.confirmed(),
        }
    }

    /// Last values acknowledged by the remote.
    #[must_use]
    pub fn confirmed(&self) -> ConfigState {
        ConfigState {
            mirrored: self.mirror.confirmed(),
            skeleton_visible: self.skeleton.confirmed(),
            hands_mode: self.hands_mode.confirmed(),
        }
    }

    /// Mirror the camera image or not.
    ///
    /// # Errors
    /// Returns the remote error after rolling back.
    pub async fn set_mirror(&self, desired: bool) -> Result<SyncOutcome<bool>, RemoteError> {
        let remote = Arc::clone(&self.remote);
        self.sync(&self.mirror, desired, move |confirmed| async move {
            remote
                .toggle_mirror()
                .await
                .map(|value| value.unwrap_or(!confirmed))
        })
        .await
    }

    /// Show the hand skeleton overlay or not.
    ///
    /// # Errors
    /// Returns the remote error after rolling back.
    pub async fn set_skeleton(&self, desired: bool) -> Result<SyncOutcome<bool>, RemoteError> {
        let remote = Arc::clone(&self.remote);
        self.sync(&self.skeleton, desired, move |confirmed| async move {
            remote
                .toggle_skeleton()
                .await
                .map(|value| value.unwrap_or(!confirmed))
        })
        .await
    }

    /// Track one or two hands.
    ///
    /// The remote decides the resulting mode, which may differ from `desired`.
    ///
    /// # Errors
    /// Returns the remote error after rolling back.
    pub async fn set_hands_mode(
        &self,
        desired: HandsMode,
    ) -> Result<SyncOutcome<HandsMode>, RemoteError> {
        let remote = Arc::clone(&self.remote);
        self.sync(&self.hands_mode, desired, move |_| async move {
            remote.toggle_hands_mode().await
        })
        .await
    }

    async fn sync<T, F, Fut>(
        &self,
        lane: &Lane<T>,
        desired: T,
        request: F,
    ) -> Result<SyncOutcome<T>, RemoteError>
    where
        T: Copy + PartialEq + Debug,
        F: FnOnce(T) -> Fut,
        Fut: Future<Output = Result<T, RemoteError>>,
    {
        {
            let mut slot = lock(&lane.slot);
            slot.desired = desired;
            if slot.pending == 0 && slot.confirmed == desired {
                return Ok(SyncOutcome::Unchanged);
            }
            slot.pending += 1;
        }
        let mut ticket = Ticket {
            sync: self,
            lane,
            released: false,
        };
        self.publish();

        let _turn = lane.gate.lock().await;

        let confirmed = {
            let slot = lock(&lane.slot);
            if slot.desired != desired {
                tracing::debug!(toggle = lane.name, ?desired, "superseded");
                return Ok(SyncOutcome::Superseded);
            }
            if slot.confirmed == desired {
                return Ok(SyncOutcome::Unchanged);
            }
            slot.confirmed
        };

        tracing::debug!(toggle = lane.name, ?confirmed, ?desired, "toggling remote");
        let result = request(confirmed).await;

        if let Ok(value) = &result {
            let mut slot = lock(&lane.slot);
            slot.confirmed = *value;
            if slot.desired == desired {
                slot.desired = *value;
            }
        }
        ticket.release();
        self.publish();

        match result {
            Ok(value) => {
                if value != desired {
                    tracing::info!(
                        toggle = lane.name,
                        ?desired,
                        ?value,
                        "remote chose a different value"
                    );
                }
                Ok(SyncOutcome::Confirmed(value))
            }
            Err(err) => {
                tracing::warn!(toggle = lane.name, "toggle failed: {err}");
                Err(err)
            }
        }
    }

    fn publish(&self) {
        if let Some(listener) = &self.listener {
            listener(&self.snapshot());
        }
    }
}
