//! Free-text search against the public video platform.
//!
//! Slower and less precise than the curated index, so every candidate runs
//! through [`select_candidate`]: the first result in platform order that is
//! short enough, self-describes as a trailer, and actually names the queried
//! title wins. No relevance re-ranking.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::cache::key::{normalize_title, title_tokens};
use crate::error::Result;
use crate::types::{SourceProvider, TrailerQuery};

use super::{parse_video_id, DiscoveryBackend, DiscoveryHit};

/// A single search result as the filters see it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchCandidate {
    pub title: String,
    /// Watch/embed URL, or a bare video id.
    pub url: String,
    pub duration_secs: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlatformResult {
    title: String,
    video_id: Option<String>,
    url: Option<String>,
    #[serde(default)]
    length_seconds: u32,
}

#[derive(Debug)]
pub struct PlatformSearchClient {
    http: reqwest::Client,
    base_url: String,
    locale: String,
    max_duration_secs: u32,
}

impl PlatformSearchClient {
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        locale: impl Into<String>,
        max_duration_secs: u32,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            locale: locale.into(),
            max_duration_secs,
        }
    }
}

#[async_trait]
impl DiscoveryBackend for PlatformSearchClient {
    fn source(&self) -> SourceProvider {
        SourceProvider::PlatformSearch
    }

    async fn discover(&self, query: &TrailerQuery) -> Result<Option<DiscoveryHit>> {
        let q = build_search_query(query, &self.locale);
        let results: Vec<PlatformResult> = self
            .http
            .get(format!("{}/api/v1/search", self.base_url))
            .query(&[("q", q.as_str()), ("type", "video")])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let candidates: Vec<SearchCandidate> = results
            .into_iter()
            .map(|r| SearchCandidate {
                title: r.title,
                url: r
                    .url
                    .or_else(|| r.video_id.map(|id| format!("{}/watch?v={id}", self.base_url)))
                    .unwrap_or_default(),
                duration_secs: r.length_seconds,
            })
            .collect();

        debug!(
            target: "trailer::discovery",
            title = %query.title,
            candidates = candidates.len(),
            "platform search complete"
        );

        Ok(
            select_candidate(&candidates, query, &self.locale, self.max_duration_secs).and_then(
                |candidate| {
                    parse_video_id(&candidate.url).map(|video_id| DiscoveryHit {
                        video_id,
                        title: Some(candidate.title.clone()),
                        source: SourceProvider::PlatformSearch,
                    })
                },
            ),
        )
    }
}

/// Query text sent to the platform: title, year when known, and the
/// locale-appropriate trailer keyword.
pub fn build_search_query(query: &TrailerQuery, locale: &str) -> String {
    let mut q = query.title.clone();
    if let Some(year) = query.year {
        q.push(' ');
        q.push_str(&year.to_string());
    }
    q.push(' ');
    q.push_str(locale_keyword(locale));
    q
}

/// First candidate, in the order the platform returned them, that passes all
/// three filters: duration cap, trailer keyword in its own title, and
/// containment of the normalized query title's tokens.
pub fn select_candidate<'a>(
    candidates: &'a [SearchCandidate],
    query: &TrailerQuery,
    locale: &str,
    max_duration_secs: u32,
) -> Option<&'a SearchCandidate> {
    let wanted: Vec<Vec<String>> = [Some(query.title.as_str()), query.original_title.as_deref()]
        .into_iter()
        .flatten()
        .map(title_tokens)
        .filter(|tokens| !tokens.is_empty())
        .collect();

    candidates.iter().find(|candidate| {
        if candidate.duration_secs == 0 || candidate.duration_secs > max_duration_secs {
            return false;
        }
        let normalized = normalize_title(&candidate.title);
        if !has_trailer_keyword(&normalized, locale) {
            return false;
        }
        let candidate_tokens = title_tokens(&candidate.title);
        wanted
            .iter()
            .any(|tokens| tokens.iter().all(|t| candidate_tokens.contains(t)))
    })
}

fn has_trailer_keyword(normalized_title: &str, locale: &str) -> bool {
    let mut keywords = vec!["trailer", "teaser"];
    let localized = locale_keyword(locale);
    if !keywords.contains(&localized) {
        keywords.push(localized);
    }
    // Padded containment so multi-word keywords ("bande annonce") match as
    // whole words.
    let padded = format!(" {normalized_title} ");
    keywords
        .iter()
        .any(|kw| padded.contains(&format!(" {} ", normalize_title(kw))))
}

fn locale_keyword(locale: &str) -> &'static str {
    match locale.split(['-', '_']).next().unwrap_or(locale) {
        "ru" => "трейлер",
        "uk" => "трейлер",
        "fr" => "bande annonce",
        "es" => "tráiler",
        _ => "trailer",
    }
}
