//! Debounced, cancellable speculative resolution.
//!
//! Grid focus/hover calls `schedule`; the debounce window absorbs fast
//! scroll and remote-navigation bursts so only a dwelled-on card actually
//! resolves. Results warm the cache only, a player is never constructed
//! here.

use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, trace};

use crate::cache::{key, CacheStatus};
use crate::config::TrailerConfig;
use crate::error::TrailerError;
use crate::orchestrator::ProviderOrchestrator;
use crate::types::TrailerQuery;

pub struct PrefetchCoordinator {
    orchestrator: Arc<ProviderOrchestrator>,
    enabled: bool,
    debounce: Duration,
    /// Cards waiting out the debounce window, keyed by cache key. The value
    /// is a generation counter so a stale timer never fires a resolve.
    pending: Arc<DashMap<String, u64>>,
    in_flight: Arc<DashMap<String, ()>>,
}

impl std::fmt::Debug for PrefetchCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrefetchCoordinator")
            .field("enabled", &self.enabled)
            .field("debounce", &self.debounce)
            .field("pending", &self.pending.len())
            .field("in_flight", &self.in_flight.len())
            .finish()
    }
}

impl PrefetchCoordinator {
    pub fn new(orchestrator: Arc<ProviderOrchestrator>, config: &TrailerConfig) -> Self {
        Self {
            orchestrator,
            enabled: config.trailers_enabled && config.prefetch_enabled,
            debounce: config.prefetch_debounce(),
            pending: Arc::new(DashMap::new()),
            in_flight: Arc::new(DashMap::new()),
        }
    }

    /// Start (or restart) the debounce timer for a focused card.
    pub fn schedule(&self, query: &TrailerQuery) {
        if !self.enabled {
            return;
        }
        let cache_key = key::derive_key(query);
        if self.in_flight.contains_key(&cache_key) {
            return;
        }
        match self.orchestrator.cache().lookup(query) {
            CacheStatus::FreshStream(_) | CacheStatus::Negative => {
                trace!(target: "trailer::prefetch", key = %cache_key, "already warm");
                return;
            }
            // Identity-only still needs a stream lookup, so it is worth
            // warming; a miss obviously is.
            CacheStatus::Identity { .. } | CacheStatus::Miss => {}
        }

        let generation = {
            let mut entry = self.pending.entry(cache_key.clone()).or_insert(0);
            *entry += 1;
            *entry
        };

        let orchestrator = Arc::clone(&self.orchestrator);
        let groups = self.orchestrator.groups().clone();
        let pending = Arc::clone(&self.pending);
        let in_flight = Arc::clone(&self.in_flight);
        let debounce = self.debounce;
        let query = query.clone();

        tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            let group_id = format!("prefetch:{cache_key}");
            // Claim the pending slot and pin the request group under the
            // same entry lock: a concurrent `cancel` either clears the slot
            // before this fires, or finds a live group to cancel after.
            let _guard = match pending.entry(cache_key.clone()) {
                Entry::Occupied(slot) if *slot.get() == generation => {
                    let guard = groups.issue(&group_id);
                    slot.remove();
                    guard
                }
                // Cancelled or rescheduled while we slept.
                _ => return,
            };

            in_flight.insert(cache_key.clone(), ());
            match orchestrator.resolve(&query, &group_id).await {
                Ok(Some(_)) => {
                    debug!(target: "trailer::prefetch", key = %cache_key, "cache warmed")
                }
                Ok(None) => {
                    trace!(target: "trailer::prefetch", key = %cache_key, "nothing to warm")
                }
                Err(TrailerError::Cancelled) => {
                    trace!(target: "trailer::prefetch", key = %cache_key, "prefetch cancelled")
                }
                Err(err) => {
                    debug!(target: "trailer::prefetch", key = %cache_key, error = %err, "prefetch failed")
                }
            }
            in_flight.remove(&cache_key);
        });
    }

    /// Focus left the card: clear a pending timer, or cancel the in-flight
    /// request group, whichever applies.
    pub fn cancel(&self, query: &TrailerQuery) {
        let cache_key = key::derive_key(query);
        if self.pending.remove(&cache_key).is_some() {
            trace!(target: "trailer::prefetch", key = %cache_key, "debounce cleared");
            return;
        }
        // Past the debounce window. The group is pinned before the pending
        // slot clears, so an in-flight resolve always has a group to cancel;
        // cancelling an absent group is a no-op.
        self.orchestrator
            .groups()
            .cancel_group(&format!("prefetch:{cache_key}"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{MemorySessionStore, TrailerCache};
    use crate::error::Result;
    use crate::providers::{DiscoveryBackend, DiscoveryHit, StreamLocator};
    use crate::request_group::RequestGroupRegistry;
    use crate::types::{ResolvedStream, SourceProvider};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingBackend {
        source: SourceProvider,
        delay: Duration,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl DiscoveryBackend for CountingBackend {
        fn source(&self) -> SourceProvider {
            self.source
        }

        async fn discover(&self, _query: &TrailerQuery) -> Result<Option<DiscoveryHit>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            Ok(match self.source {
                SourceProvider::Curated => Some(DiscoveryHit {
                    video_id: "vid1".to_string(),
                    title: None,
                    source: self.source,
                }),
                SourceProvider::PlatformSearch => None,
            })
        }
    }

    struct FixedLocator;

    #[async_trait]
    impl StreamLocator for FixedLocator {
        fn name(&self) -> &'static str {
            "fixed"
        }

        async fn locate(&self, video_id: &str) -> Result<Option<crate::providers::LocatedStream>> {
            Ok(Some(crate::providers::LocatedStream {
                url: format!("https://cdn.example/{video_id}.m3u8"),
                untested: false,
            }))
        }
    }

    fn setup(config: &TrailerConfig) -> (PrefetchCoordinator, Arc<AtomicUsize>) {
        setup_with_delay(config, Duration::ZERO)
    }

    fn setup_with_delay(
        config: &TrailerConfig,
        delay: Duration,
    ) -> (PrefetchCoordinator, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = Arc::new(TrailerCache::new(
            Arc::new(MemorySessionStore::default()),
            config,
        ));
        let orchestrator = Arc::new(ProviderOrchestrator::new(
            cache,
            RequestGroupRegistry::new(),
            Arc::new(CountingBackend {
                source: SourceProvider::Curated,
                delay,
                calls: calls.clone(),
            }),
            Arc::new(CountingBackend {
                source: SourceProvider::PlatformSearch,
                delay,
                calls: calls.clone(),
            }),
            vec![Box::new(FixedLocator)],
            config,
        ));
        (PrefetchCoordinator::new(orchestrator, config), calls)
    }

    fn query() -> TrailerQuery {
        TrailerQuery::movie("Heat").with_year(1995).with_catalog_id("tmdb:949")
    }

    #[tokio::test(start_paused = true)]
    async fn schedule_then_cancel_issues_no_network_calls() {
        let (prefetch, calls) = setup(&TrailerConfig::default());

        prefetch.schedule(&query());
        tokio::time::sleep(Duration::from_millis(100)).await;
        prefetch.cancel(&query());
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn schedule_alone_resolves_exactly_once() {
        let (prefetch, calls) = setup(&TrailerConfig::default());

        prefetch.schedule(&query());
        tokio::time::sleep(Duration::from_secs(1)).await;

        // Both backends were raced once; the cache is now warm.
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        let resolved = prefetch
            .orchestrator
            .resolve(&query(), "detail:1")
            .await
            .unwrap();
        assert_eq!(
            resolved,
            Some(ResolvedStream {
                video_id: "vid1".to_string(),
                stream_url: "https://cdn.example/vid1.m3u8".to_string(),
                untested: false,
            })
        );
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_after_the_window_aborts_the_in_flight_resolve() {
        let (prefetch, calls) = setup_with_delay(&TrailerConfig::default(), Duration::from_secs(1));

        prefetch.schedule(&query());
        // Past the 300ms debounce: both backends have been reached and are
        // now sitting in their scripted delay.
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        prefetch.cancel(&query());
        tokio::time::sleep(Duration::from_secs(5)).await;

        // The cancelled group committed nothing.
        assert!(prefetch.orchestrator.cache().record(&query()).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn reschedule_restarts_the_debounce_window() {
        let (prefetch, calls) = setup(&TrailerConfig::default());

        prefetch.schedule(&query());
        tokio::time::sleep(Duration::from_millis(200)).await;
        // Refocus before the 300ms window elapses: old timer must not fire.
        prefetch.schedule(&query());
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn warm_cache_suppresses_scheduling() {
        let (prefetch, calls) = setup(&TrailerConfig::default());

        prefetch.schedule(&query());
        tokio::time::sleep(Duration::from_secs(1)).await;
        let after_first = calls.load(Ordering::SeqCst);

        prefetch.schedule(&query());
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(calls.load(Ordering::SeqCst), after_first);
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_prefetch_is_inert() {
        let mut config = TrailerConfig::default();
        config.prefetch_enabled = false;
        let (prefetch, calls) = setup(&config);

        prefetch.schedule(&query());
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
