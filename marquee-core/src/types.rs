//! Core data model shared across the resolution pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which discovery backend produced a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceProvider {
    /// Curated id-indexed discovery service.
    Curated,
    /// Free-text search against the public video platform.
    PlatformSearch,
}

/// Identity of a catalog item as handed to us by the host's
/// detail-view-opened event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrailerQuery {
    pub title: String,
    pub original_title: Option<String>,
    pub year: Option<u16>,
    pub is_series: bool,
    /// Stable catalog id when the host has one; preferred for cache keys.
    pub catalog_id: Option<String>,
}

impl TrailerQuery {
    pub fn movie(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            original_title: None,
            year: None,
            is_series: false,
            catalog_id: None,
        }
    }

    pub fn with_catalog_id(mut self, id: impl Into<String>) -> Self {
        self.catalog_id = Some(id.into());
        self
    }

    pub fn with_year(mut self, year: u16) -> Self {
        self.year = Some(year);
        self
    }
}

/// A fully resolved, playable trailer stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedStream {
    pub video_id: String,
    pub stream_url: String,
    /// Set when the URL came from the best-guess pattern step; callers apply
    /// extra error tolerance.
    pub untested: bool,
}

/// Cached state of one catalog item's trailer resolution.
///
/// Records only ever move forward: negative -> identity -> identity+stream.
/// Identity fields live under the long TTL, the manifest URL under the short
/// one, both measured from `updated_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrailerRecord {
    pub catalog_id: Option<String>,
    pub provider_video_id: Option<String>,
    pub stream_url: Option<String>,
    #[serde(default)]
    pub stream_untested: bool,
    pub title: Option<String>,
    /// A completed discovery pass found nothing; suppresses repeat provider
    /// queries for the identity TTL.
    #[serde(default)]
    pub no_trailer: bool,
    pub updated_at: DateTime<Utc>,
    pub source_provider: Option<SourceProvider>,
}

impl TrailerRecord {
    pub fn negative(catalog_id: Option<String>) -> Self {
        Self {
            catalog_id,
            provider_video_id: None,
            stream_url: None,
            stream_untested: false,
            title: None,
            no_trailer: true,
            updated_at: Utc::now(),
            source_provider: None,
        }
    }

    pub fn identity(
        catalog_id: Option<String>,
        video_id: impl Into<String>,
        title: Option<String>,
        source: SourceProvider,
    ) -> Self {
        Self {
            catalog_id,
            provider_video_id: Some(video_id.into()),
            stream_url: None,
            stream_untested: false,
            title,
            no_trailer: false,
            updated_at: Utc::now(),
            source_provider: Some(source),
        }
    }

    pub fn is_negative(&self) -> bool {
        self.no_trailer && self.provider_video_id.is_none()
    }

    pub fn identity_fresh(&self, now: DateTime<Utc>, ttl: std::time::Duration) -> bool {
        age_within(self.updated_at, now, ttl)
    }

    pub fn stream_fresh(&self, now: DateTime<Utc>, ttl: std::time::Duration) -> bool {
        self.stream_url.is_some() && age_within(self.updated_at, now, ttl)
    }

    /// Monotonic merge: incoming fields only ever add or refresh, never clear.
    /// A record that already carries an identity is never downgraded back to
    /// negative, and a stream URL survives an identity-only refresh.
    pub fn merge_upgrade(&mut self, incoming: TrailerRecord) {
        if incoming.provider_video_id.is_some() {
            // New identity invalidates a stream resolved for the old one.
            if incoming.provider_video_id != self.provider_video_id {
                self.stream_url = None;
                self.stream_untested = false;
            }
            self.provider_video_id = incoming.provider_video_id;
            self.no_trailer = false;
        }
        if incoming.stream_url.is_some() {
            self.stream_url = incoming.stream_url;
            self.stream_untested = incoming.stream_untested;
        }
        if incoming.title.is_some() {
            self.title = incoming.title;
        }
        if incoming.source_provider.is_some() {
            self.source_provider = incoming.source_provider;
        }
        if incoming.no_trailer && self.provider_video_id.is_none() {
            self.no_trailer = true;
        }
        if incoming.catalog_id.is_some() {
            self.catalog_id = incoming.catalog_id;
        }
        self.updated_at = incoming.updated_at.max(self.updated_at);
    }

    /// Preview-frame URL for the countdown thumbnail, derived from the
    /// provider video id. `base` is the platform or relay mirror host.
    pub fn preview_thumbnail_url(&self, base: &str) -> Option<String> {
        self.provider_video_id
            .as_ref()
            .map(|id| format!("{}/vi/{}/mqdefault.jpg", base.trim_end_matches('/'), id))
    }

    pub fn as_resolved(&self) -> Option<ResolvedStream> {
        match (&self.provider_video_id, &self.stream_url) {
            (Some(id), Some(url)) => Some(ResolvedStream {
                video_id: id.clone(),
                stream_url: url.clone(),
                untested: self.stream_untested,
            }),
            _ => None,
        }
    }
}

fn age_within(stamped: DateTime<Utc>, now: DateTime<Utc>, ttl: std::time::Duration) -> bool {
    let Ok(ttl) = chrono::Duration::from_std(ttl) else {
        return true;
    };
    now.signed_duration_since(stamped) < ttl
}
