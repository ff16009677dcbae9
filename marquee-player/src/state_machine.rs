//! Promotion/retreat state machine.
//!
//! Purely reactive: it consumes discrete events (player callbacks, timers,
//! focus notifications) and emits effects for the controller to execute. It
//! never blocks and holds no timers itself.
//!
//! ```text
//! idle -> previewReady -> countdown -> promoted -> retreating -> idle
//! ```

use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    /// The clip rendered its first frame and plays quietly.
    PreviewReady,
    /// The promote countdown is running.
    Countdown,
    /// Attention-capturing playback: expanded presentation, captured input.
    Promoted,
    /// Visual teardown in progress.
    Retreating,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackEvent {
    /// Player rendered its first frame.
    Loaded,
    /// The controller armed the countdown timer.
    CountdownStarted,
    /// The countdown timer elapsed.
    CountdownElapsed,
    /// Host focus moved onto (`true`) or off (`false`) this card's panel.
    FocusChanged(bool),
    /// Back-navigation inside the promoted input scope.
    BackPressed,
    /// The detail panel closed entirely.
    PanelClosed,
    PlayerFailed,
    PlayerEnded,
    /// Visual teardown finished.
    TeardownComplete,
}

/// What the controller must do in response to an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Arm the countdown timer and fill animation.
    StartCountdown,
    /// Expand into promoted playback and capture input.
    Promote,
    /// Tear the session down: destroy the player, restore the background,
    /// release input.
    BeginRetreat,
}

#[derive(Debug)]
pub struct PlaybackStateMachine {
    state: PlaybackState,
    panel_focused: bool,
    /// The countdown elapsed while the panel was unfocused; promotion fires
    /// on the next focus return instead.
    armed: bool,
}

impl Default for PlaybackStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackStateMachine {
    pub fn new() -> Self {
        Self {
            state: PlaybackState::Idle,
            panel_focused: true,
            armed: false,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    /// Feed one event; returns the effects to execute, in order.
    pub fn handle(&mut self, event: PlaybackEvent) -> Vec<Effect> {
        use PlaybackEvent as E;
        use PlaybackState as S;

        let effects = match (self.state, event) {
            (S::Idle, E::Loaded) => {
                self.state = S::PreviewReady;
                vec![Effect::StartCountdown]
            }
            (S::PreviewReady, E::CountdownStarted) => {
                self.state = S::Countdown;
                vec![]
            }
            (S::Countdown, E::CountdownElapsed) => {
                if self.panel_focused {
                    self.state = S::Promoted;
                    vec![Effect::Promote]
                } else {
                    // Suppressed; retried when focus returns.
                    self.armed = true;
                    vec![]
                }
            }
            (state, E::FocusChanged(focused)) => {
                self.panel_focused = focused;
                if focused && self.armed && state == S::Countdown {
                    self.armed = false;
                    self.state = S::Promoted;
                    vec![Effect::Promote]
                } else {
                    vec![]
                }
            }
            (S::Promoted, E::BackPressed) => self.retreat(),
            (S::PreviewReady | S::Countdown | S::Promoted, E::PanelClosed) => self.retreat(),
            (S::PreviewReady | S::Countdown | S::Promoted, E::PlayerFailed | E::PlayerEnded) => {
                self.retreat()
            }
            (S::Retreating, E::TeardownComplete) => {
                self.state = S::Idle;
                vec![]
            }
            // Late or out-of-order events are ignored.
            _ => vec![],
        };

        trace!(
            target: "trailer::state",
            state = ?self.state,
            ?event,
            effects = effects.len(),
            "transition"
        );
        effects
    }

    fn retreat(&mut self) -> Vec<Effect> {
        self.armed = false;
        self.state = PlaybackState::Retreating;
        vec![Effect::BeginRetreat]
    }
}
