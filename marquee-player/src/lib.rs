//! # Marquee Player
//!
//! Playback side of the Marquee background-trailer subsystem.
//!
//! `marquee-core` hands this crate a resolved stream URL; everything after
//! that lives here:
//!
//! - **StreamPlayer**: muted, looping background playback with a
//!   decode-capability fallback chain, lead-in skip, and tail trim
//! - **Adaptive framing**: viewport-dependent zoom that crops letterboxing
//! - **PlaybackStateMachine**: promotes a silently loaded clip into focused
//!   playback after a countdown, and retreats cleanly
//! - **PlaybackController**: the per-session event loop wiring host events,
//!   player callbacks, and countdown timers into the machine
//!
//! The host platform supplies the actual media element, decode helper, and
//! UI surfaces through the traits in [`host`] and [`surface`].

#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(missing_docs)]

/// Per-session event loop applying state-machine effects
pub mod controller;

/// Adaptive framing: viewport-dependent zoom factor
pub mod framing;

/// Host UI collaborator traits: panel focus, background mount, input capture
pub mod host;

/// The background clip player and its decode fallback chain
pub mod player;

/// Process-lifetime session flags (unmute memory, promotion count)
pub mod session;

/// Media-element and adaptive-decoder abstractions supplied by the host
pub mod surface;

/// Promotion/retreat state machine
pub mod state_machine;

pub use controller::{ControlMsg, ControllerHandle, PlaybackController, SessionRegistry};
pub use framing::scale_factor;
pub use player::{PlayerEvent, StreamPlayer};
pub use session::SessionFlags;
pub use state_machine::{Effect, PlaybackEvent, PlaybackState, PlaybackStateMachine};
pub use surface::{AdaptiveBufferConfig, ManifestKind, MediaEvent};
