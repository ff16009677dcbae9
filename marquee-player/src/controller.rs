//! Per-session playback event loop.
//!
//! One controller runs per open detail view. It merges host events, player
//! callbacks, and countdown timer fires into the state machine, and executes
//! the effects the machine emits. Everything is message-driven; the loop
//! never blocks on anything but its channels.

use std::collections::HashMap;
use std::sync::Arc;

use marquee_core::TrailerConfig;
use parking_lot::Mutex;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::host::{BackgroundMount, HostPanel, InputCapture};
use crate::player::{PlayerEvent, StreamPlayer};
use crate::session::SessionFlags;
use crate::state_machine::{Effect, PlaybackEvent, PlaybackState, PlaybackStateMachine};
use crate::surface::MediaEvent;

/// Messages the host (and the controller's own timers) feed into the loop.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlMsg {
    /// Forwarded media-element callback.
    Media(MediaEvent),
    FocusChanged(bool),
    BackPressed,
    /// Enter inside the promoted input scope.
    UnmutePressed,
    PanelClosed,
    ViewportResized { width: u32, height: u32 },
    CountdownTick { generation: u64, fraction: f32 },
    CountdownElapsed { generation: u64 },
}

/// Cheap clonable sender into a running controller.
#[derive(Debug, Clone)]
pub struct ControllerHandle {
    tx: UnboundedSender<ControlMsg>,
}

impl ControllerHandle {
    /// Send a message; silently dropped if the session already ended.
    pub fn send(&self, msg: ControlMsg) {
        let _ = self.tx.send(msg);
    }
}

pub struct PlaybackController {
    card_id: String,
    machine: PlaybackStateMachine,
    player: StreamPlayer,
    player_events: UnboundedReceiver<PlayerEvent>,
    mount: Box<dyn BackgroundMount>,
    input: Box<dyn InputCapture>,
    panel: Arc<dyn HostPanel>,
    flags: Arc<SessionFlags>,
    first_promote_delay: std::time::Duration,
    later_promote_delay: std::time::Duration,
    preview_thumbnail: Option<String>,

    rx: UnboundedReceiver<ControlMsg>,
    tx: UnboundedSender<ControlMsg>,
    countdown_generation: u64,
    countdown_cancel: Option<CancellationToken>,
    input_captured: bool,
}

impl std::fmt::Debug for PlaybackController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackController")
            .field("state", &self.machine.state())
            .field("input_captured", &self.input_captured)
            .finish()
    }
}

impl PlaybackController {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        card_id: impl Into<String>,
        player: StreamPlayer,
        player_events: UnboundedReceiver<PlayerEvent>,
        mount: Box<dyn BackgroundMount>,
        input: Box<dyn InputCapture>,
        panel: Arc<dyn HostPanel>,
        flags: Arc<SessionFlags>,
        config: &TrailerConfig,
        preview_thumbnail: Option<String>,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            card_id: card_id.into(),
            machine: PlaybackStateMachine::new(),
            player,
            player_events,
            mount,
            input,
            panel,
            flags,
            first_promote_delay: config.first_promote_delay(),
            later_promote_delay: config.later_promote_delay(),
            preview_thumbnail,
            rx,
            tx,
            countdown_generation: 0,
            countdown_cancel: None,
            input_captured: false,
        }
    }

    pub fn handle(&self) -> ControllerHandle {
        ControllerHandle { tx: self.tx.clone() }
    }

    /// Run the session to completion on a background task.
    pub fn spawn(self) -> (ControllerHandle, JoinHandle<()>) {
        let handle = self.handle();
        (handle, tokio::spawn(self.run()))
    }

    /// Drive the session until teardown completes.
    pub async fn run(mut self) {
        if let Some(url) = self.preview_thumbnail.take() {
            self.mount.show_preview_thumbnail(&url);
        }
        let mut rx_open = true;
        loop {
            tokio::select! {
                msg = self.rx.recv(), if rx_open => match msg {
                    Some(msg) => self.on_control(msg),
                    None => {
                        // Host dropped every handle: treat as panel close.
                        rx_open = false;
                        self.on_control(ControlMsg::PanelClosed);
                    }
                },
                event = self.player_events.recv() => match event {
                    Some(event) => {
                        if self.on_player_event(event) {
                            break;
                        }
                    }
                    None => break,
                },
            }
        }
        debug!(target: "trailer::state", "session ended");
    }

    fn on_control(&mut self, msg: ControlMsg) {
        match msg {
            ControlMsg::Media(event) => self.player.handle_media_event(event),
            ControlMsg::FocusChanged(focused) => {
                let effects = self.machine.handle(PlaybackEvent::FocusChanged(focused));
                self.apply(effects);
            }
            ControlMsg::BackPressed => {
                let effects = self.machine.handle(PlaybackEvent::BackPressed);
                self.apply(effects);
            }
            ControlMsg::UnmutePressed => self.player.unmute(),
            ControlMsg::PanelClosed => {
                let effects = self.machine.handle(PlaybackEvent::PanelClosed);
                if effects.is_empty() && self.machine.state() == PlaybackState::Idle {
                    // Closed before the clip ever loaded: nothing to retreat
                    // from, just tear the player down.
                    self.player.destroy();
                } else {
                    self.apply(effects);
                }
            }
            ControlMsg::ViewportResized { width, height } => {
                self.player.set_viewport(width, height);
            }
            ControlMsg::CountdownTick { generation, fraction } => {
                if generation == self.countdown_generation
                    && self.machine.state() == PlaybackState::Countdown
                {
                    self.mount.set_countdown_progress(fraction);
                }
            }
            ControlMsg::CountdownElapsed { generation } => {
                if generation == self.countdown_generation {
                    // Promotion requires the host to still report this
                    // card's panel as focused, not just our last event.
                    let focused = self.panel.is_detail_focused(&self.card_id);
                    let effects = self.machine.handle(PlaybackEvent::FocusChanged(focused));
                    self.apply(effects);
                    let effects = self.machine.handle(PlaybackEvent::CountdownElapsed);
                    self.apply(effects);
                }
            }
        }
    }

    /// Returns `true` once the session is fully torn down.
    fn on_player_event(&mut self, event: PlayerEvent) -> bool {
        match event {
            PlayerEvent::Loaded => {
                // First real frame: cross-fade the video layer in.
                self.mount.show_video_layer();
                let effects = self.machine.handle(PlaybackEvent::Loaded);
                self.apply(effects);
                false
            }
            PlayerEvent::Ended => {
                let effects = self.machine.handle(PlaybackEvent::PlayerEnded);
                self.apply(effects);
                false
            }
            PlayerEvent::Failed => {
                let effects = self.machine.handle(PlaybackEvent::PlayerFailed);
                self.apply(effects);
                false
            }
            PlayerEvent::Destroyed => {
                self.cancel_countdown();
                self.mount.hide_video_layer();
                self.mount.restore_artwork();
                if self.input_captured {
                    self.input.release();
                    self.input_captured = false;
                }
                let effects = self.machine.handle(PlaybackEvent::TeardownComplete);
                self.apply(effects);
                true
            }
        }
    }

    fn apply(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            trace!(target: "trailer::state", ?effect, "applying effect");
            match effect {
                Effect::StartCountdown => self.start_countdown(),
                Effect::Promote => {
                    self.input.acquire();
                    self.input_captured = true;
                    self.mount.promote();
                }
                Effect::BeginRetreat => {
                    self.cancel_countdown();
                    self.mount.retreat();
                    self.player.destroy();
                }
            }
        }
    }

    fn start_countdown(&mut self) {
        self.cancel_countdown();
        self.countdown_generation += 1;
        let generation = self.countdown_generation;

        let delay = if self.flags.countdown_started() {
            self.first_promote_delay
        } else {
            self.later_promote_delay
        };
        let token = CancellationToken::new();
        self.countdown_cancel = Some(token.clone());
        let tx = self.tx.clone();

        tokio::spawn(async move {
            const TICKS: u32 = 20;
            let step = delay / TICKS;
            for i in 1..=TICKS {
                tokio::select! {
                    _ = token.cancelled() => return,
                    _ = tokio::time::sleep(step) => {}
                }
                let _ = tx.send(ControlMsg::CountdownTick {
                    generation,
                    fraction: i as f32 / TICKS as f32,
                });
            }
            let _ = tx.send(ControlMsg::CountdownElapsed { generation });
        });

        let effects = self.machine.handle(PlaybackEvent::CountdownStarted);
        self.apply(effects);
    }

    fn cancel_countdown(&mut self) {
        if let Some(token) = self.countdown_cancel.take() {
            token.cancel();
        }
    }
}

/// At most one live playback session per card id. Registering a new session
/// for a card closes any previous one.
#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    active: Arc<Mutex<HashMap<String, ControllerHandle>>>,
}

impl SessionRegistry {
    pub fn register(&self, card_id: &str, handle: ControllerHandle) {
        if let Some(previous) = self.active.lock().insert(card_id.to_string(), handle) {
            previous.send(ControlMsg::PanelClosed);
        }
    }

    pub fn close(&self, card_id: &str) {
        if let Some(handle) = self.active.lock().remove(card_id) {
            handle.send(ControlMsg::PanelClosed);
        }
    }

    pub fn close_all(&self) {
        for (_, handle) in self.active.lock().drain() {
            handle.send(ControlMsg::PanelClosed);
        }
    }
}
