//! Typed configuration for the trailer pipeline.
//!
//! Every knob has an explicit default so an embedding host can construct
//! [`TrailerConfig::default()`] and override only what it cares about, or
//! load overrides from a TOML fragment via [`TrailerConfig::from_toml_str`].

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for resolution, caching, prefetch, and playback framing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrailerConfig {
    /// Master switch: when false no trailer is ever resolved or played.
    pub trailers_enabled: bool,
    /// Enables speculative resolution on grid focus/hover.
    pub prefetch_enabled: bool,

    /// Freshness window for provider video id / title fields, in seconds.
    pub identity_ttl_secs: u64,
    /// Freshness window for manifest URLs, in seconds. Manifest URLs rotate
    /// much faster than identity, so this is deliberately short.
    pub stream_ttl_secs: u64,

    /// Debounce applied before a record reaches the slow persistent store.
    pub store_write_debounce_ms: u64,
    /// Debounce absorbing fast scroll/remote navigation before a prefetch
    /// actually resolves.
    pub prefetch_debounce_ms: u64,

    /// Timeout for the curated id-indexed discovery backend.
    pub curated_timeout_ms: u64,
    /// Timeout for the free-text platform search backend.
    pub search_timeout_ms: u64,
    /// Per-step timeout inside the stream-lookup fallback chain.
    pub stream_step_timeout_ms: u64,

    /// Candidates longer than this are never trailers.
    pub max_candidate_duration_secs: u32,

    /// BCP-47-ish language code used for locale keyword hints and candidate
    /// language preference.
    pub locale: String,

    /// Curated id-indexed discovery service.
    pub curated_base_url: String,
    /// Public video platform host, used for free-text search, first-party
    /// manifest lookup, and preview thumbnails.
    pub platform_base_url: String,
    /// CORS-relay mirrors tried by the second stream-lookup step, in order.
    pub relay_mirrors: Vec<String>,
    /// Precomputed-manifest cache service; skipped entirely when unset.
    pub precomputed_cache_url: Option<String>,

    /// Gates the best-guess manifest URL pattern. The guessed URL is
    /// unverified by construction, so it stays off unless the host opts in.
    pub allow_guessed_manifest: bool,

    /// Lead-in skip applied once metadata is known, to bypass studio cards.
    pub lead_in_skip_secs: f64,
    /// Clips shorter than this play from the start; the lead-in skip would
    /// eat too much of them.
    pub min_duration_for_skip_secs: f64,

    /// Report `Ended` this many seconds before the actual end so credits and
    /// outro cards never show.
    pub tail_trim_secs: f64,
    /// Volume fade applied over the seconds preceding the trimmed end.
    pub tail_fade_secs: f64,

    /// Countdown before the first promotion in a session.
    pub first_promote_delay_ms: u64,
    /// Countdown for every later promotion in the same session.
    pub later_promote_delay_ms: u64,

    /// Zoom applied at the reference viewport aspect ratio.
    pub framing_baseline_zoom: f32,
    /// Aspect ratio at which the baseline zoom applies. Defaults to exactly
    /// 16:9 so common viewports (1920x1080, 3840x2160) sit on the baseline.
    pub framing_reference_ratio: f32,
    /// Zoom never drops below this as the viewport widens.
    pub framing_min_zoom: f32,
}

impl Default for TrailerConfig {
    fn default() -> Self {
        Self {
            trailers_enabled: true,
            prefetch_enabled: true,
            identity_ttl_secs: 30 * 24 * 60 * 60,
            stream_ttl_secs: 2 * 60 * 60,
            store_write_debounce_ms: 1_000,
            prefetch_debounce_ms: 300,
            curated_timeout_ms: 2_500,
            search_timeout_ms: 9_000,
            stream_step_timeout_ms: 5_000,
            max_candidate_duration_secs: 300,
            locale: "en".to_string(),
            curated_base_url: "https://curated.video-index.net".to_string(),
            platform_base_url: "https://yewtu.be".to_string(),
            relay_mirrors: Vec::new(),
            precomputed_cache_url: None,
            allow_guessed_manifest: false,
            lead_in_skip_secs: 5.0,
            min_duration_for_skip_secs: 10.0,
            tail_trim_secs: 13.0,
            tail_fade_secs: 5.0,
            first_promote_delay_ms: 1_500,
            later_promote_delay_ms: 5_000,
            framing_baseline_zoom: 1.35,
            framing_reference_ratio: 16.0 / 9.0,
            framing_min_zoom: 1.1,
        }
    }
}

impl TrailerConfig {
    /// Parse a TOML fragment; unspecified fields keep their defaults.
    pub fn from_toml_str(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }

    pub fn identity_ttl(&self) -> Duration {
        Duration::from_secs(self.identity_ttl_secs)
    }

    pub fn stream_ttl(&self) -> Duration {
        Duration::from_secs(self.stream_ttl_secs)
    }

    pub fn store_write_debounce(&self) -> Duration {
        Duration::from_millis(self.store_write_debounce_ms)
    }

    pub fn prefetch_debounce(&self) -> Duration {
        Duration::from_millis(self.prefetch_debounce_ms)
    }

    pub fn curated_timeout(&self) -> Duration {
        Duration::from_millis(self.curated_timeout_ms)
    }

    pub fn search_timeout(&self) -> Duration {
        Duration::from_millis(self.search_timeout_ms)
    }

    pub fn stream_step_timeout(&self) -> Duration {
        Duration::from_millis(self.stream_step_timeout_ms)
    }

    pub fn first_promote_delay(&self) -> Duration {
        Duration::from_millis(self.first_promote_delay_ms)
    }

    pub fn later_promote_delay(&self) -> Duration {
        Duration::from_millis(self.later_promote_delay_ms)
    }
}
