//! Discovery backends and stream locators.
//!
//! Discovery turns a catalog item into a provider video id; stream lookup
//! turns that id into a playable manifest URL. Both sides are traits so the
//! orchestrator can be tested against scripted backends.

pub mod curated;
pub mod search;
pub mod stream;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{SourceProvider, TrailerQuery};

pub use curated::CuratedClient;
pub use search::{build_search_query, select_candidate, PlatformSearchClient, SearchCandidate};
pub use stream::{default_chain, LocatedStream};

/// A discovery backend's positive match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryHit {
    pub video_id: String,
    pub title: Option<String>,
    pub source: SourceProvider,
}

/// One of the two raced discovery backends.
#[async_trait]
pub trait DiscoveryBackend: Send + Sync {
    fn source(&self) -> SourceProvider;

    /// `Ok(None)` is a completed pass that found nothing; errors mean the
    /// backend never got a usable answer.
    async fn discover(&self, query: &TrailerQuery) -> Result<Option<DiscoveryHit>>;
}

/// One step of the ordered stream-lookup fallback chain.
#[async_trait]
pub trait StreamLocator: Send + Sync {
    fn name(&self) -> &'static str;

    /// Steps that construct a URL without verifying it report `true`; the
    /// orchestrator skips them unless the host opted in.
    fn untested(&self) -> bool {
        false
    }

    async fn locate(&self, video_id: &str) -> Result<Option<LocatedStream>>;
}

/// Extract a provider video id from the URL shapes discovery services hand
/// back: `watch?v=`, `/embed/`, `/shorts/`, and short-host paths.
pub fn parse_video_id(url: &str) -> Option<String> {
    let take_id = |s: &str| -> Option<String> {
        let id: String = s
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
            .collect();
        (!id.is_empty()).then_some(id)
    };

    if let Some(rest) = url.split("watch?v=").nth(1) {
        return take_id(rest);
    }
    for marker in ["/embed/", "/shorts/", "youtu.be/"] {
        if let Some(rest) = url.split(marker).nth(1) {
            return take_id(rest);
        }
    }
    None
}
