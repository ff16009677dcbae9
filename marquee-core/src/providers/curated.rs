//! Curated id-indexed discovery backend.
//!
//! Fast and authoritative: the service indexes trailers by catalog id, so a
//! hit needs no candidate filtering. Items without a catalog id fall back to
//! a title/year lookup on the same service.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::debug;

use crate::error::Result;
use crate::types::{SourceProvider, TrailerQuery};

use super::{parse_video_id, DiscoveryBackend, DiscoveryHit};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CuratedEntry {
    pub url: String,
    pub title: Option<String>,
    pub language: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct CuratedResponse {
    #[serde(default)]
    trailers: Vec<CuratedEntry>,
}

#[derive(Debug)]
pub struct CuratedClient {
    http: reqwest::Client,
    base_url: String,
    locale: String,
}

impl CuratedClient {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>, locale: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            locale: locale.into(),
        }
    }

    async fn fetch(&self, query: &TrailerQuery) -> Result<Vec<CuratedEntry>> {
        let kind = if query.is_series { "series" } else { "movie" };
        let request = match &query.catalog_id {
            Some(id) => self
                .http
                .get(format!("{}/trailers/{id}", self.base_url))
                .query(&[("kind", kind)]),
            None => {
                let mut params = vec![("title", query.title.clone()), ("kind", kind.to_string())];
                if let Some(year) = query.year {
                    params.push(("year", year.to_string()));
                }
                self.http
                    .get(format!("{}/trailers/lookup", self.base_url))
                    .query(&params)
            }
        };

        let response: CuratedResponse = request.send().await?.error_for_status()?.json().await?;
        Ok(response.trailers)
    }
}

#[async_trait]
impl DiscoveryBackend for CuratedClient {
    fn source(&self) -> SourceProvider {
        SourceProvider::Curated
    }

    async fn discover(&self, query: &TrailerQuery) -> Result<Option<DiscoveryHit>> {
        let entries = self.fetch(query).await?;
        debug!(
            target: "trailer::discovery",
            title = %query.title,
            entries = entries.len(),
            "curated lookup complete"
        );
        Ok(pick_entry(&entries, &self.locale).and_then(|entry| {
            parse_video_id(&entry.url).map(|video_id| DiscoveryHit {
                video_id,
                title: entry.title.clone(),
                source: SourceProvider::Curated,
            })
        }))
    }
}

/// Preference order: the configured locale, then English, then whatever was
/// published most recently.
pub(crate) fn pick_entry<'a>(entries: &'a [CuratedEntry], locale: &str) -> Option<&'a CuratedEntry> {
    let by_language = |lang: &str| {
        entries
            .iter()
            .find(|e| e.language.as_deref().is_some_and(|l| l.eq_ignore_ascii_case(lang)))
    };

    by_language(locale)
        .or_else(|| by_language("en"))
        .or_else(|| entries.iter().max_by_key(|e| e.published_at))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(url: &str, language: Option<&str>, published: Option<&str>) -> CuratedEntry {
        CuratedEntry {
            url: url.to_string(),
            title: None,
            language: language.map(str::to_owned),
            published_at: published.map(|p| p.parse().unwrap()),
        }
    }

    #[test]
    fn locale_match_beats_english_and_recency() {
        let entries = vec![
            entry("https://youtu.be/en1", Some("en"), Some("2026-01-01T00:00:00Z")),
            entry("https://youtu.be/de1", Some("de"), Some("2020-01-01T00:00:00Z")),
        ];
        let picked = pick_entry(&entries, "de").unwrap();
        assert_eq!(picked.url, "https://youtu.be/de1");
    }

    #[test]
    fn falls_back_to_english_then_newest() {
        let entries = vec![
            entry("https://youtu.be/old1", None, Some("2020-01-01T00:00:00Z")),
            entry("https://youtu.be/new1", None, Some("2025-01-01T00:00:00Z")),
        ];
        assert_eq!(pick_entry(&entries, "fr").unwrap().url, "https://youtu.be/new1");

        let with_en = vec![
            entry("https://youtu.be/new1", None, Some("2025-01-01T00:00:00Z")),
            entry("https://youtu.be/en1", Some("en"), None),
        ];
        assert_eq!(pick_entry(&with_en, "fr").unwrap().url, "https://youtu.be/en1");
    }

    #[test]
    fn empty_list_is_a_clean_miss() {
        assert!(pick_entry(&[], "en").is_none());
    }
}
