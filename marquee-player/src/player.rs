//! The background clip player.
//!
//! Owns one muted, looping video layer: picks a decode path, applies the
//! lead-in skip and tail trim, recovers from transient errors, and notifies
//! its owner of the handful of lifecycle moments the state machine cares
//! about. A destroyed player ignores every late callback.

use std::sync::Arc;

use marquee_core::{RequestGroupRegistry, ResolvedStream, TrailerConfig, TrailerError};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use crate::framing;
use crate::session::SessionFlags;
use crate::surface::{
    AdaptiveBufferConfig, AdaptiveDecoderFactory, AdaptiveSession, ManifestKind, MediaEvent,
    VideoSurface,
};

/// Lifecycle notifications to the player's owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerEvent {
    /// First real frame rendered; the clip is visibly playing.
    Loaded,
    /// Natural end or tail trim reached.
    Ended,
    /// Unrecoverable failure; the owner should tear down and fall back to
    /// static artwork.
    Failed,
    /// Teardown finished. Sent exactly once, from `destroy`.
    Destroyed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodePath {
    Native,
    Adaptive,
    DirectFallback,
}

pub struct StreamPlayer {
    card_id: String,
    surface: Box<dyn VideoSurface>,
    factory: Option<Arc<dyn AdaptiveDecoderFactory>>,
    adaptive: Option<Box<dyn AdaptiveSession>>,
    flags: Arc<SessionFlags>,
    groups: RequestGroupRegistry,
    events: UnboundedSender<PlayerEvent>,
    config: TrailerConfig,

    path: DecodePath,
    stream_url: Option<String>,
    untested_source: bool,
    duration_secs: Option<f64>,
    muted: bool,
    loaded_emitted: bool,
    ended_emitted: bool,
    failed_emitted: bool,
    destroyed: bool,
}

impl std::fmt::Debug for StreamPlayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamPlayer")
            .field("card_id", &self.card_id)
            .field("path", &self.path)
            .field("destroyed", &self.destroyed)
            .finish()
    }
}

impl StreamPlayer {
    pub fn new(
        card_id: impl Into<String>,
        surface: Box<dyn VideoSurface>,
        factory: Option<Arc<dyn AdaptiveDecoderFactory>>,
        flags: Arc<SessionFlags>,
        groups: RequestGroupRegistry,
        events: UnboundedSender<PlayerEvent>,
        config: &TrailerConfig,
    ) -> Self {
        Self {
            card_id: card_id.into(),
            surface,
            factory,
            adaptive: None,
            flags,
            groups,
            events,
            config: config.clone(),
            path: DecodePath::Native,
            stream_url: None,
            untested_source: false,
            duration_secs: None,
            muted: true,
            loaded_emitted: false,
            ended_emitted: false,
            failed_emitted: false,
            destroyed: false,
        }
    }

    fn group_id(&self) -> String {
        format!("card:{}", self.card_id)
    }

    /// Begin muted, looping playback of a resolved stream.
    ///
    /// Decode fallback, first viable path wins: native manifest support on
    /// the element, else the adaptive decode helper, else direct URL
    /// assignment as a last resort.
    pub fn load(&mut self, stream: &ResolvedStream) {
        if self.destroyed {
            return;
        }
        let kind = ManifestKind::from_url(&stream.stream_url);
        self.stream_url = Some(stream.stream_url.clone());
        self.untested_source = stream.untested;

        self.path = if self.surface.supports_native(kind) {
            self.surface.set_source(&stream.stream_url);
            DecodePath::Native
        } else {
            match (&self.factory, kind) {
                (Some(factory), ManifestKind::Hls | ManifestKind::Dash) => {
                    let mut session = factory.create_session(&AdaptiveBufferConfig::default());
                    session.attach(&stream.stream_url);
                    self.adaptive = Some(session);
                    DecodePath::Adaptive
                }
                _ => {
                    self.surface.set_source(&stream.stream_url);
                    DecodePath::DirectFallback
                }
            }
        };

        // Autoplay with sound is routinely blocked; start muted unless the
        // user already unmuted somewhere this session.
        self.muted = !self.flags.unmuted_once();
        self.surface.set_muted(self.muted);
        if !self.muted {
            self.surface.set_volume(1.0);
        }
        self.surface.set_looping(true);
        self.surface.play();

        info!(
            target: "trailer::player",
            card = %self.card_id,
            path = ?self.path,
            untested = self.untested_source,
            "playback started"
        );
    }

    /// Media-element callback entry point. Safe to call late: a destroyed
    /// player ignores everything.
    pub fn handle_media_event(&mut self, event: MediaEvent) {
        if self.destroyed {
            return;
        }
        match event {
            MediaEvent::Metadata { duration_secs } => self.on_metadata(duration_secs),
            MediaEvent::Playing => {
                if !self.loaded_emitted {
                    self.loaded_emitted = true;
                    self.emit(PlayerEvent::Loaded);
                }
            }
            MediaEvent::TimeUpdate { position_secs } => self.on_time_update(position_secs),
            MediaEvent::Ended => self.finish(),
            MediaEvent::NetworkError { fatal } => self.on_network_error(fatal),
            MediaEvent::DecodeError { fatal } => self.on_decode_error(fatal),
        }
    }

    fn on_metadata(&mut self, duration_secs: f64) {
        self.duration_secs = Some(duration_secs);
        // Skip studio/logo cards, but not on clips short enough that the
        // skip would eat a meaningful share of them.
        if duration_secs >= self.config.min_duration_for_skip_secs {
            debug!(
                target: "trailer::player",
                card = %self.card_id,
                skip = self.config.lead_in_skip_secs,
                "lead-in skip"
            );
            self.surface.seek(self.config.lead_in_skip_secs);
        }
    }

    fn on_time_update(&mut self, position_secs: f64) {
        let Some(duration) = self.duration_secs else {
            return;
        };
        let trim = self.config.tail_trim_secs;
        let fade = self.config.tail_fade_secs;
        // Short clips play out to their natural end.
        if duration <= trim + fade {
            return;
        }
        let trimmed_end = duration - trim;

        if position_secs >= trimmed_end {
            self.surface.pause();
            self.finish();
            return;
        }
        if !self.muted && fade > 0.0 {
            let fade_start = trimmed_end - fade;
            if position_secs >= fade_start {
                let remaining = ((trimmed_end - position_secs) / fade).clamp(0.0, 1.0);
                self.surface.set_volume(remaining as f32);
            }
        }
    }

    fn on_network_error(&mut self, fatal: bool) {
        if !fatal {
            // The element/helper retries on its own.
            debug!(target: "trailer::player", card = %self.card_id, "transient network stall");
            return;
        }
        if let Some(session) = self.adaptive.as_mut() {
            if session.recover_network() {
                info!(target: "trailer::player", card = %self.card_id, "network recovery");
                return;
            }
        }
        // An untested URL failing before first frame gets one more chance
        // via direct assignment.
        if self.untested_source && !self.loaded_emitted && self.path == DecodePath::Adaptive {
            if let Some(url) = self.stream_url.clone() {
                warn!(target: "trailer::player", card = %self.card_id, "untested source, direct fallback");
                self.detach_adaptive();
                self.path = DecodePath::DirectFallback;
                self.surface.set_source(&url);
                self.surface.play();
                return;
            }
        }
        self.fail(TrailerError::NetworkFailure("media element gave up".into()));
    }

    fn on_decode_error(&mut self, fatal: bool) {
        if let Some(session) = self.adaptive.as_mut() {
            if session.recover_decode() {
                info!(target: "trailer::player", card = %self.card_id, "decode recovery");
                return;
            }
            self.fail(TrailerError::DecodeFatal("adaptive session unrecoverable".into()));
            return;
        }
        if fatal {
            self.fail(TrailerError::DecodeFatal("media element decode error".into()));
        }
    }

    fn finish(&mut self) {
        if !self.ended_emitted {
            self.ended_emitted = true;
            self.emit(PlayerEvent::Ended);
        }
    }

    fn fail(&mut self, err: TrailerError) {
        if !self.failed_emitted {
            self.failed_emitted = true;
            warn!(target: "trailer::player", card = %self.card_id, error = %err, "unrecoverable playback failure");
            self.emit(PlayerEvent::Failed);
        }
    }

    /// Explicit unmute from the promoted input scope. Remembered for the
    /// whole session so later players start unmuted.
    pub fn unmute(&mut self) {
        if self.destroyed {
            return;
        }
        self.muted = false;
        self.surface.set_muted(false);
        self.surface.set_volume(1.0);
        self.flags.mark_unmuted();
    }

    /// Viewport resize hook; recomputes the framing zoom.
    pub fn set_viewport(&mut self, width: u32, height: u32) {
        if self.destroyed {
            return;
        }
        self.surface
            .set_scale(framing::scale_for_viewport(width, height, &self.config));
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// Tear the player down: cancel its request group, detach the decode
    /// session, unload the element, notify the owner. Idempotent; the
    /// notification is sent exactly once.
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;
        self.groups.cancel_group(&self.group_id());
        self.detach_adaptive();
        self.surface.pause();
        self.surface.unload();
        info!(target: "trailer::player", card = %self.card_id, "player destroyed");
        // `destroyed` is already set, so emit directly instead of going
        // through the guarded helpers.
        let _ = self.events.send(PlayerEvent::Destroyed);
    }

    fn detach_adaptive(&mut self) {
        if let Some(mut session) = self.adaptive.take() {
            session.detach();
        }
    }

    fn emit(&self, event: PlayerEvent) {
        if self.events.send(event).is_err() {
            debug!(target: "trailer::player", card = %self.card_id, ?event, "owner gone");
        }
    }
}
