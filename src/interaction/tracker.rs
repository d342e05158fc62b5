use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info};

use super::state::{derive, Derived, InteractionState, Inputs, LocalRecordingState, VoiceMode};
use crate::voice::SessionEvent;

/// Default delay before a push-to-talk `complete` falls back to `idle`
pub const DEFAULT_REVERT_AFTER: Duration = Duration::from_millis(1500);

struct Tracked {
    inputs: Inputs,
    state: InteractionState,
    /// Bumped on every state change; a revert timer only fires if nothing
    /// changed since it was armed
    generation: u64,
    server_ready: bool,
}

struct Shared {
    tracked: Mutex<Tracked>,
    tx: watch::Sender<InteractionState>,
    revert_after: Duration,
}

/// Keeps the interaction state in sync with local activity and server events
///
/// Cloning yields another handle to the same tracker. Every change is
/// published on a `watch` channel.
#[derive(Clone)]
pub struct InteractionTracker {
    shared: Arc<Shared>,
}

impl InteractionTracker {
    pub fn new(revert_after: Duration) -> Self {
        let (tx, _) = watch::channel(InteractionState::Idle);

        Self {
            shared: Arc::new(Shared {
                tracked: Mutex::new(Tracked {
                    inputs: Inputs::default(),
                    state: InteractionState::Idle,
                    generation: 0,
                    server_ready: false,
                }),
                tx,
                revert_after,
            }),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<InteractionState> {
        self.shared.tx.subscribe()
    }

    pub fn state(&self) -> InteractionState {
        self.lock().state
    }

    pub fn mode(&self) -> VoiceMode {
        self.lock().inputs.mode
    }

    pub fn local_recording(&self) -> LocalRecordingState {
        self.lock().inputs.local
    }

    /// Whether the server reported its models loaded
    pub fn is_server_ready(&self) -> bool {
        self.lock().server_ready
    }

    /// Switch voice mode; inputs from the previous mode are discarded
    pub fn set_mode(&self, mode: VoiceMode) -> InteractionState {
        let mut tracked = self.lock();
        if tracked.inputs.mode == mode {
            return tracked.state;
        }

        info!("Voice mode: {:?} -> {:?}", tracked.inputs.mode, mode);
        tracked.inputs = Inputs {
            mode,
            ..Inputs::default()
        };
        // Leaving a mode also drops a pending `complete`
        self.transition(&mut tracked, InteractionState::Idle);
        self.apply(&mut tracked).state
    }

    /// Feed one server event
    ///
    /// When the event asks to leave continuous voice mode the tracker falls
    /// back to push-to-talk and reports it in the returned `Derived`.
    pub fn on_event(&self, event: &SessionEvent) -> Derived {
        let mut tracked = self.lock();

        match event {
            SessionEvent::Ready => tracked.server_ready = true,
            SessionEvent::Loading => tracked.server_ready = false,
            _ => {}
        }

        tracked.inputs.last_event = Some(event.clone());
        let derived = self.apply(&mut tracked);

        if derived.exit_voice_mode && tracked.inputs.mode == VoiceMode::Continuous {
            info!("Server ended voice mode");
            tracked.inputs = Inputs::default();
        }

        derived
    }

    /// Report push-to-talk recording activity
    ///
    /// `result_ready` marks the update that delivers a successful result.
    pub fn set_local_recording(
        &self,
        local: LocalRecordingState,
        result_ready: bool,
    ) -> InteractionState {
        let mut tracked = self.lock();
        tracked.inputs.local = local;
        tracked.inputs.result_ready = result_ready;

        let derived = self.apply(&mut tracked);
        // A result is consumed by the step that sees it
        tracked.inputs.result_ready = false;
        derived.state
    }

    /// The voice session went away; the server is no longer ready
    pub fn on_disconnected(&self) {
        let mut tracked = self.lock();
        if tracked.server_ready {
            debug!("Server readiness cleared");
        }
        tracked.server_ready = false;
    }

    fn lock(&self) -> MutexGuard<'_, Tracked> {
        self.shared
            .tracked
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn apply(&self, tracked: &mut Tracked) -> Derived {
        let derived = derive(tracked.state, &tracked.inputs);

        if self.transition(tracked, derived.state)
            && derived.state == InteractionState::Complete
            && tracked.inputs.mode == VoiceMode::PushToTalk
        {
            self.arm_revert(tracked.generation);
        }

        derived
    }

    fn transition(&self, tracked: &mut Tracked, state: InteractionState) -> bool {
        if tracked.state == state {
            return false;
        }

        debug!("Interaction {:?} -> {:?}", tracked.state, state);
        tracked.state = state;
        tracked.generation += 1;
        self.shared.tx.send_replace(state);
        true
    }

    fn arm_revert(&self, generation: u64) {
        let shared = Arc::clone(&self.shared);

        tokio::spawn(async move {
            tokio::time::sleep(shared.revert_after).await;

            let mut tracked = shared
                .tracked
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if tracked.generation != generation || tracked.state != InteractionState::Complete {
                return;
            }

            debug!("Interaction complete -> idle after {:?}", shared.revert_after);
            tracked.state = InteractionState::Idle;
            tracked.generation += 1;
            shared.tx.send_replace(InteractionState::Idle);
        });
    }
}

impl Default for InteractionTracker {
    fn default() -> Self {
        Self::new(DEFAULT_REVERT_AFTER)
    }
}
