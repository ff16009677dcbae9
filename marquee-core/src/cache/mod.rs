//! Two-tier TTL cache of trailer records.
//!
//! The fast tier is an in-process map; the slow tier is the host's
//! string-keyed session store, written through a [`DebouncedWriter`].
//! Reads check memory first and promote persistent hits. Writes always
//! merge-upgrade (see [`TrailerRecord::merge_upgrade`]) so concurrent
//! resolutions for the same key commute.

pub mod key;
pub mod writer;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::config::TrailerConfig;
use crate::error::Result;
use crate::types::{ResolvedStream, SourceProvider, TrailerRecord};
use crate::types::TrailerQuery;

pub use writer::DebouncedWriter;

/// String-keyed, session-scoped store supplied by the host platform.
pub trait SessionStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str);
}

/// In-memory [`SessionStore`]; the default for tests and hosts without a
/// persistent tier.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    entries: Mutex<HashMap<String, String>>,
}

impl SessionStore for MemorySessionStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        self.entries.lock().insert(key.to_string(), value.to_string());
    }
}

/// Result of a cache lookup, classified against the two TTLs.
#[derive(Debug, Clone)]
pub enum CacheStatus {
    /// Full record with a fresh manifest URL; no network needed.
    FreshStream(ResolvedStream),
    /// Identity is fresh but the stream is absent or expired: skip discovery,
    /// go straight to stream lookup.
    Identity {
        video_id: String,
        title: Option<String>,
        source: Option<SourceProvider>,
    },
    /// A fresh negative record: a completed discovery pass found nothing.
    Negative,
    Miss,
}

/// Two-tier trailer record cache.
pub struct TrailerCache {
    memory: DashMap<String, TrailerRecord>,
    store: Arc<dyn SessionStore>,
    writer: DebouncedWriter,
    identity_ttl: std::time::Duration,
    stream_ttl: std::time::Duration,
}

impl std::fmt::Debug for TrailerCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrailerCache")
            .field("memory_entries", &self.memory.len())
            .field("identity_ttl", &self.identity_ttl)
            .field("stream_ttl", &self.stream_ttl)
            .finish()
    }
}

impl TrailerCache {
    pub fn new(store: Arc<dyn SessionStore>, config: &TrailerConfig) -> Self {
        Self {
            memory: DashMap::new(),
            writer: DebouncedWriter::new(Arc::clone(&store), config.store_write_debounce()),
            store,
            identity_ttl: config.identity_ttl(),
            stream_ttl: config.stream_ttl(),
        }
    }

    /// Look up and classify the record for `query`, promoting a persistent
    /// hit into the memory tier.
    pub fn lookup(&self, query: &TrailerQuery) -> CacheStatus {
        let key = key::derive_key(query);
        let record = match self.fetch(&key) {
            Some(record) => record,
            None => return CacheStatus::Miss,
        };

        let now = Utc::now();
        if record.is_negative() {
            return if record.identity_fresh(now, self.identity_ttl) {
                CacheStatus::Negative
            } else {
                CacheStatus::Miss
            };
        }

        if record.stream_fresh(now, self.stream_ttl) {
            if let Some(resolved) = record.as_resolved() {
                return CacheStatus::FreshStream(resolved);
            }
        }

        if record.identity_fresh(now, self.identity_ttl) {
            if let Some(video_id) = record.provider_video_id.clone() {
                return CacheStatus::Identity {
                    video_id,
                    title: record.title.clone(),
                    source: record.source_provider,
                };
            }
        }

        CacheStatus::Miss
    }

    /// Merge `partial` into whatever is cached for `query`, stamp the
    /// current time, and write through both tiers.
    pub fn upsert(&self, query: &TrailerQuery, mut partial: TrailerRecord) -> Result<()> {
        let key = key::derive_key(query);
        partial.updated_at = Utc::now();
        if partial.catalog_id.is_none() {
            partial.catalog_id = query.catalog_id.clone();
        }

        // Seed the memory tier so the merge starts from the latest
        // persisted record.
        self.fetch(&key);

        // Merge and serialize under the entry lock: concurrent writers to
        // the same key commute instead of clobbering each other's fields.
        let slot = self
            .memory
            .entry(key.clone())
            .and_modify(|existing| existing.merge_upgrade(partial.clone()))
            .or_insert(partial);
        let json = serde_json::to_string(slot.value())?;
        self.writer.schedule(&key, json);
        Ok(())
    }

    pub fn store_negative(&self, query: &TrailerQuery) -> Result<()> {
        debug!(target: "trailer::cache", title = %query.title, "caching negative result");
        self.upsert(query, TrailerRecord::negative(query.catalog_id.clone()))
    }

    pub fn store_identity(
        &self,
        query: &TrailerQuery,
        video_id: &str,
        title: Option<String>,
        source: SourceProvider,
    ) -> Result<()> {
        self.upsert(
            query,
            TrailerRecord::identity(query.catalog_id.clone(), video_id, title, source),
        )
    }

    pub fn store_stream(&self, query: &TrailerQuery, resolved: &ResolvedStream) -> Result<()> {
        let mut record = TrailerRecord::identity(
            query.catalog_id.clone(),
            resolved.video_id.clone(),
            None,
            SourceProvider::Curated,
        );
        // Source attribution comes from the identity write that preceded
        // this; the merge keeps it.
        record.source_provider = None;
        record.stream_url = Some(resolved.stream_url.clone());
        record.stream_untested = resolved.untested;
        self.upsert(query, record)
    }

    /// Raw record access, memory tier first.
    pub fn record(&self, query: &TrailerQuery) -> Option<TrailerRecord> {
        self.fetch(&key::derive_key(query))
    }

    /// Force all pending persistent writes out. Called at teardown.
    pub fn flush(&self) {
        self.writer.flush_all();
    }

    fn fetch(&self, key: &str) -> Option<TrailerRecord> {
        if let Some(record) = self.memory.get(key) {
            return Some(record.clone());
        }
        let raw = self.store.get(key)?;
        match serde_json::from_str::<TrailerRecord>(&raw) {
            Ok(record) => {
                self.memory.insert(key.to_string(), record.clone());
                Some(record)
            }
            Err(err) => {
                warn!(target: "trailer::cache", %key, error = %err, "discarding unreadable record");
                None
            }
        }
    }
}
