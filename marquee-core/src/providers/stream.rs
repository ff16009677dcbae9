//! Stream-lookup fallback chain.
//!
//! Each step resolves a manifest URL for a known provider video id. The
//! orchestrator walks the chain in order and stops at the first hit; per-step
//! network errors just advance the walk.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, trace};

use crate::config::TrailerConfig;
use crate::error::Result;

use super::StreamLocator;

/// A manifest URL produced by one chain step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatedStream {
    pub url: String,
    pub untested: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoManifest {
    hls_url: Option<String>,
    #[serde(default)]
    format_streams: Vec<FormatStream>,
}

#[derive(Debug, Deserialize)]
struct FormatStream {
    url: String,
}

impl VideoManifest {
    fn into_url(self) -> Option<String> {
        self.hls_url
            .or_else(|| self.format_streams.into_iter().next().map(|f| f.url))
    }
}

async fn fetch_manifest(http: &reqwest::Client, base: &str, video_id: &str) -> Result<Option<String>> {
    let manifest: VideoManifest = http
        .get(format!("{}/api/v1/videos/{video_id}", base.trim_end_matches('/')))
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;
    Ok(manifest.into_url())
}

/// Step (a): the platform's first-party manifest endpoint.
#[derive(Debug)]
pub struct ManifestEndpoint {
    http: reqwest::Client,
    base_url: String,
}

impl ManifestEndpoint {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self { http, base_url: base_url.into() }
    }
}

#[async_trait]
impl StreamLocator for ManifestEndpoint {
    fn name(&self) -> &'static str {
        "manifest-endpoint"
    }

    async fn locate(&self, video_id: &str) -> Result<Option<LocatedStream>> {
        Ok(fetch_manifest(&self.http, &self.base_url, video_id)
            .await?
            .map(|url| LocatedStream { url, untested: false }))
    }
}

/// Step (b): the same endpoint reached through CORS-relay mirrors, tried in
/// configured order.
#[derive(Debug)]
pub struct RelayMirrors {
    http: reqwest::Client,
    mirrors: Vec<String>,
}

impl RelayMirrors {
    pub fn new(http: reqwest::Client, mirrors: Vec<String>) -> Self {
        Self { http, mirrors }
    }
}

#[async_trait]
impl StreamLocator for RelayMirrors {
    fn name(&self) -> &'static str {
        "relay-mirrors"
    }

    async fn locate(&self, video_id: &str) -> Result<Option<LocatedStream>> {
        for mirror in &self.mirrors {
            match fetch_manifest(&self.http, mirror, video_id).await {
                Ok(Some(url)) => return Ok(Some(LocatedStream { url, untested: false })),
                Ok(None) => continue,
                Err(err) if err.is_retryable_step() => {
                    trace!(target: "trailer::stream", %mirror, error = %err, "mirror failed");
                    continue;
                }
                Err(err) => return Err(err),
            }
        }
        Ok(None)
    }
}

/// Step (c): a precomputed-manifest cache service.
#[derive(Debug)]
pub struct PrecomputedCache {
    http: reqwest::Client,
    base_url: String,
}

impl PrecomputedCache {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self { http, base_url: base_url.into() }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CachedManifest {
    stream_url: Option<String>,
}

#[async_trait]
impl StreamLocator for PrecomputedCache {
    fn name(&self) -> &'static str {
        "precomputed-cache"
    }

    async fn locate(&self, video_id: &str) -> Result<Option<LocatedStream>> {
        let cached: CachedManifest = self
            .http
            .get(format!("{}/{video_id}.json", self.base_url.trim_end_matches('/')))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(cached
            .stream_url
            .map(|url| LocatedStream { url, untested: false }))
    }
}

/// Step (d): a best-guess manifest URL derived from the id, never verified.
/// Gated behind configuration; its output carries `untested: true`.
#[derive(Debug)]
pub struct GuessedManifest {
    base_url: String,
}

impl GuessedManifest {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { base_url: base_url.into() }
    }
}

#[async_trait]
impl StreamLocator for GuessedManifest {
    fn name(&self) -> &'static str {
        "guessed-manifest"
    }

    fn untested(&self) -> bool {
        true
    }

    async fn locate(&self, video_id: &str) -> Result<Option<LocatedStream>> {
        Ok(Some(LocatedStream {
            url: format!(
                "{}/api/manifest/dash/id/{video_id}",
                self.base_url.trim_end_matches('/')
            ),
            untested: true,
        }))
    }
}

/// Build the default chain from configuration. Mirrors and the precomputed
/// cache only appear when configured; the guessed step is always last and is
/// additionally gated at walk time by `allow_guessed_manifest`.
pub fn default_chain(config: &TrailerConfig, http: &reqwest::Client) -> Vec<Box<dyn StreamLocator>> {
    let mut chain: Vec<Box<dyn StreamLocator>> = vec![Box::new(ManifestEndpoint::new(
        http.clone(),
        config.platform_base_url.clone(),
    ))];
    if !config.relay_mirrors.is_empty() {
        chain.push(Box::new(RelayMirrors::new(
            http.clone(),
            config.relay_mirrors.clone(),
        )));
    }
    if let Some(cache_url) = &config.precomputed_cache_url {
        chain.push(Box::new(PrecomputedCache::new(http.clone(), cache_url.clone())));
    }
    chain.push(Box::new(GuessedManifest::new(config.platform_base_url.clone())));
    debug!(target: "trailer::stream", steps = chain.len(), "stream chain built");
    chain
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn guessed_step_is_marked_untested() {
        let step = GuessedManifest::new("https://yewtu.be");
        let located = step.locate("abc123defgh").await.unwrap().unwrap();
        assert!(located.untested);
        assert_eq!(
            located.url,
            "https://yewtu.be/api/manifest/dash/id/abc123defgh"
        );
        assert!(step.untested());
    }

    #[test]
    fn chain_shape_follows_configuration() {
        let http = reqwest::Client::new();

        let bare = default_chain(&TrailerConfig::default(), &http);
        assert_eq!(
            bare.iter().map(|s| s.name()).collect::<Vec<_>>(),
            ["manifest-endpoint", "guessed-manifest"]
        );

        let full = default_chain(
            &TrailerConfig {
                relay_mirrors: vec!["https://relay.example.org".into()],
                precomputed_cache_url: Some("https://manifests.example.org".into()),
                ..TrailerConfig::default()
            },
            &http,
        );
        assert_eq!(
            full.iter().map(|s| s.name()).collect::<Vec<_>>(),
            [
                "manifest-endpoint",
                "relay-mirrors",
                "precomputed-cache",
                "guessed-manifest"
            ]
        );
    }

    #[test]
    fn manifest_prefers_hls_over_format_streams() {
        let manifest: VideoManifest = serde_json::from_str(
            r#"{"hlsUrl": "https://cdn.example/x.m3u8", "formatStreams": [{"url": "https://cdn.example/x.mp4"}]}"#,
        )
        .unwrap();
        assert_eq!(manifest.into_url().as_deref(), Some("https://cdn.example/x.m3u8"));

        let fallback: VideoManifest =
            serde_json::from_str(r#"{"formatStreams": [{"url": "https://cdn.example/x.mp4"}]}"#)
                .unwrap();
        assert_eq!(fallback.into_url().as_deref(), Some("https://cdn.example/x.mp4"));
    }
}
