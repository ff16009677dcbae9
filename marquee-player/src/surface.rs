//! Media-element and decode-helper abstractions.
//!
//! The host platform owns the actual decoder; this crate only decides which
//! path to drive it through. [`VideoSurface`] models the media element,
//! [`AdaptiveDecoderFactory`] the shared, lazily loaded adaptive-streaming
//! helper.

/// Manifest container format, inferred from the stream URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestKind {
    Hls,
    Dash,
    /// A plain progressive file, playable by direct assignment.
    Direct,
}

impl ManifestKind {
    pub fn from_url(url: &str) -> Self {
        let path = url.split(['?', '#']).next().unwrap_or(url);
        if path.ends_with(".m3u8") {
            ManifestKind::Hls
        } else if path.ends_with(".mpd") || path.contains("/manifest/dash/") {
            ManifestKind::Dash
        } else {
            ManifestKind::Direct
        }
    }
}

/// Events the host media element reports back to the player.
#[derive(Debug, Clone, PartialEq)]
pub enum MediaEvent {
    /// Duration and dimensions are known.
    Metadata { duration_secs: f64 },
    /// First real frame rendered.
    Playing,
    /// Playback position advanced.
    TimeUpdate { position_secs: f64 },
    /// The clip reached its natural end (looping surfaces may never send
    /// this; the tail trim usually fires first).
    Ended,
    /// Transient network stall or segment fetch failure.
    NetworkError { fatal: bool },
    /// Decoder-level failure.
    DecodeError { fatal: bool },
}

/// The host's media element: a muted, loopable video layer mounted behind
/// the detail panel.
pub trait VideoSurface: Send {
    /// Whether the element can play `kind` natively, without the adaptive
    /// decode helper.
    fn supports_native(&self, kind: ManifestKind) -> bool;
    fn set_source(&mut self, url: &str);
    fn play(&mut self);
    fn pause(&mut self);
    fn seek(&mut self, position_secs: f64);
    fn set_muted(&mut self, muted: bool);
    /// Linear volume in `0.0..=1.0`; used by the tail fade.
    fn set_volume(&mut self, volume: f32);
    fn set_looping(&mut self, looping: bool);
    /// Scale factor from the framing computation.
    fn set_scale(&mut self, factor: f32);
    /// Stop playback and release the element's media resources.
    fn unload(&mut self);
}

/// Buffering profile for adaptive sessions. Background trailers tune for
/// time-to-first-frame, not rebuffer resilience.
#[derive(Debug, Clone, PartialEq)]
pub struct AdaptiveBufferConfig {
    /// Forward buffer target in seconds; small so startup is fast.
    pub max_buffer_secs: f64,
    /// Seconds of already-played media retained; zero for background clips.
    pub back_buffer_secs: f64,
    pub low_latency: bool,
}

impl Default for AdaptiveBufferConfig {
    fn default() -> Self {
        Self {
            max_buffer_secs: 10.0,
            back_buffer_secs: 0.0,
            low_latency: true,
        }
    }
}

/// Shared, lazily loaded adaptive-streaming decode helper. One session per
/// player, never shared between simultaneously alive players.
pub trait AdaptiveDecoderFactory: Send + Sync {
    fn create_session(&self, buffer: &AdaptiveBufferConfig) -> Box<dyn AdaptiveSession>;
}

/// A single player's adaptive decode session.
pub trait AdaptiveSession: Send {
    fn attach(&mut self, manifest_url: &str);
    /// Attempt local recovery from a transient network error. `false` means
    /// recovery is exhausted.
    fn recover_network(&mut self) -> bool;
    /// Attempt internal recovery from a decode error. `false` means the
    /// session is beyond saving.
    fn recover_decode(&mut self) -> bool;
    fn detach(&mut self);
}
