//! Trailer resolution entrypoint.
//!
//! `resolve` is the one call sites use: cache fast path, then a race between
//! the curated index and free-text platform search, then a walk down the
//! stream-lookup fallback chain, with every network step scoped to the
//! caller's request group.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::cache::{CacheStatus, TrailerCache};
use crate::config::TrailerConfig;
use crate::error::{Result, TrailerError};
use crate::providers::{
    default_chain, CuratedClient, DiscoveryBackend, DiscoveryHit, LocatedStream,
    PlatformSearchClient, StreamLocator,
};
use crate::request_group::{OperationHandle, RequestGroupRegistry};
use crate::types::{ResolvedStream, TrailerQuery};

pub struct ProviderOrchestrator {
    cache: Arc<TrailerCache>,
    groups: RequestGroupRegistry,
    curated: Arc<dyn DiscoveryBackend>,
    search: Arc<dyn DiscoveryBackend>,
    chain: Arc<Vec<Box<dyn StreamLocator>>>,
    enabled: bool,
    curated_timeout: Duration,
    search_timeout: Duration,
    step_timeout: Duration,
    allow_guessed_manifest: bool,
}

impl std::fmt::Debug for ProviderOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderOrchestrator")
            .field("chain_steps", &self.chain.len())
            .field("allow_guessed_manifest", &self.allow_guessed_manifest)
            .finish()
    }
}

impl ProviderOrchestrator {
    /// Wire up real HTTP backends from configuration.
    pub fn from_config(
        cache: Arc<TrailerCache>,
        groups: RequestGroupRegistry,
        config: &TrailerConfig,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("marquee/", env!("CARGO_PKG_VERSION")))
            .build()?;
        let curated = Arc::new(CuratedClient::new(
            http.clone(),
            config.curated_base_url.clone(),
            config.locale.clone(),
        ));
        let search = Arc::new(PlatformSearchClient::new(
            http.clone(),
            config.platform_base_url.clone(),
            config.locale.clone(),
            config.max_candidate_duration_secs,
        ));
        Ok(Self::new(
            cache,
            groups,
            curated,
            search,
            default_chain(config, &http),
            config,
        ))
    }

    /// Assemble from explicit backends; tests drive this with scripted ones.
    pub fn new(
        cache: Arc<TrailerCache>,
        groups: RequestGroupRegistry,
        curated: Arc<dyn DiscoveryBackend>,
        search: Arc<dyn DiscoveryBackend>,
        chain: Vec<Box<dyn StreamLocator>>,
        config: &TrailerConfig,
    ) -> Self {
        Self {
            cache,
            groups,
            curated,
            search,
            chain: Arc::new(chain),
            enabled: config.trailers_enabled,
            curated_timeout: config.curated_timeout(),
            search_timeout: config.search_timeout(),
            step_timeout: config.stream_step_timeout(),
            allow_guessed_manifest: config.allow_guessed_manifest,
        }
    }

    pub fn cache(&self) -> &TrailerCache {
        &self.cache
    }

    pub fn groups(&self) -> &RequestGroupRegistry {
        &self.groups
    }

    /// Resolve a playable trailer stream for `query` under `group_id`.
    ///
    /// `Ok(None)` is the one "no trailer" outcome: trailers disabled in
    /// configuration, discovery found nothing, or the stream chain is
    /// exhausted. Cancellation surfaces as [`TrailerError::Cancelled`] and
    /// guarantees no cache write happened on this call's behalf after the
    /// cancel.
    pub async fn resolve(
        &self,
        query: &TrailerQuery,
        group_id: &str,
    ) -> Result<Option<ResolvedStream>> {
        if !self.enabled {
            trace!(target: "trailer::resolve", title = %query.title, "trailers disabled");
            return Ok(None);
        }
        match self.cache.lookup(query) {
            CacheStatus::FreshStream(stream) => {
                trace!(target: "trailer::resolve", title = %query.title, "cache hit, stream fresh");
                return Ok(Some(stream));
            }
            CacheStatus::Negative => {
                trace!(target: "trailer::resolve", title = %query.title, "cache hit, negative");
                return Ok(None);
            }
            CacheStatus::Identity { video_id, .. } => {
                debug!(
                    target: "trailer::resolve",
                    title = %query.title,
                    %video_id,
                    "identity cached, skipping discovery"
                );
                let handle = self.groups.issue(group_id);
                return self.locate_and_commit(query, &video_id, &handle).await;
            }
            CacheStatus::Miss => {}
        }

        let handle = self.groups.issue(group_id);
        match self.race_discovery(query, &handle).await {
            Ok(Some(hit)) => {
                if handle.is_cancelled() {
                    return Err(TrailerError::Cancelled);
                }
                info!(
                    target: "trailer::resolve",
                    title = %query.title,
                    video_id = %hit.video_id,
                    source = ?hit.source,
                    "discovery winner accepted"
                );
                self.cache
                    .store_identity(query, &hit.video_id, hit.title.clone(), hit.source)?;
                self.locate_and_commit(query, &hit.video_id, &handle).await
            }
            Ok(None) => {
                if handle.is_cancelled() {
                    return Err(TrailerError::Cancelled);
                }
                self.cache.store_negative(query)?;
                Ok(None)
            }
            Err(TrailerError::Cancelled) => Err(TrailerError::Cancelled),
            Err(err) => {
                // Both backends failed outright. Nothing is cached so a
                // later visit retries; the UI just keeps its artwork.
                warn!(target: "trailer::resolve", title = %query.title, error = %err, "discovery failed");
                Ok(None)
            }
        }
    }

    /// Race both discovery backends. First positive match wins immediately;
    /// the loser's task detaches and its eventual result is dropped.
    ///
    /// `Ok(None)` means at least one backend completed a full pass and found
    /// nothing (the precondition for negative caching).
    async fn race_discovery(
        &self,
        query: &TrailerQuery,
        handle: &OperationHandle,
    ) -> Result<Option<DiscoveryHit>> {
        let spawn = |backend: Arc<dyn DiscoveryBackend>, timeout: Duration| -> JoinHandle<Result<Option<DiscoveryHit>>> {
            let query = query.clone();
            let token = handle.child_token();
            tokio::spawn(async move {
                tokio::select! {
                    _ = token.cancelled() => Err(TrailerError::Cancelled),
                    attempt = tokio::time::timeout(timeout, backend.discover(&query)) => {
                        attempt.unwrap_or(Err(TrailerError::NetworkTimeout("discovery")))
                    }
                }
            })
        };

        let mut curated = spawn(Arc::clone(&self.curated), self.curated_timeout);
        let mut search = spawn(Arc::clone(&self.search), self.search_timeout);
        let (mut curated_done, mut search_done) = (false, false);
        let mut completed_empty = false;
        let mut last_err = None;

        while !(curated_done && search_done) {
            let joined = tokio::select! {
                _ = handle.cancelled() => return Err(TrailerError::Cancelled),
                joined = &mut curated, if !curated_done => {
                    curated_done = true;
                    joined
                }
                joined = &mut search, if !search_done => {
                    search_done = true;
                    joined
                }
            };

            match joined {
                Ok(Ok(Some(hit))) => return Ok(Some(hit)),
                Ok(Ok(None)) => completed_empty = true,
                Ok(Err(TrailerError::Cancelled)) => return Err(TrailerError::Cancelled),
                Ok(Err(err)) => {
                    debug!(target: "trailer::resolve", error = %err, "discovery backend failed");
                    last_err = Some(err);
                }
                Err(join_err) => {
                    last_err = Some(TrailerError::NetworkFailure(join_err.to_string()));
                }
            }
        }

        if completed_empty {
            Ok(None)
        } else {
            Err(last_err.unwrap_or(TrailerError::NoMatchFound))
        }
    }

    /// Walk the stream-lookup chain for `video_id` and commit the first hit.
    async fn locate_and_commit(
        &self,
        query: &TrailerQuery,
        video_id: &str,
        handle: &OperationHandle,
    ) -> Result<Option<ResolvedStream>> {
        match self.walk_chain(video_id, handle).await {
            Ok(located) => {
                if handle.is_cancelled() {
                    return Err(TrailerError::Cancelled);
                }
                let resolved = ResolvedStream {
                    video_id: video_id.to_string(),
                    stream_url: located.url,
                    untested: located.untested,
                };
                self.cache.store_stream(query, &resolved)?;
                Ok(Some(resolved))
            }
            Err(TrailerError::StreamUnavailable) => {
                // Identity stays cached so the next visit retries stream
                // lookup only; never a negative record here.
                debug!(target: "trailer::stream", %video_id, "stream chain exhausted");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// Per-step network errors and timeouts advance the walk; only
    /// cancellation aborts it. Exhaustion is
    /// [`TrailerError::StreamUnavailable`].
    async fn walk_chain(
        &self,
        video_id: &str,
        handle: &OperationHandle,
    ) -> Result<LocatedStream> {
        for step in self.chain.iter() {
            if step.untested() && !self.allow_guessed_manifest {
                trace!(target: "trailer::stream", step = step.name(), "skipping untested step");
                continue;
            }

            let attempt = tokio::select! {
                _ = handle.cancelled() => return Err(TrailerError::Cancelled),
                attempt = tokio::time::timeout(self.step_timeout, step.locate(video_id)) => attempt,
            };

            match attempt {
                Ok(Ok(Some(located))) => {
                    info!(
                        target: "trailer::stream",
                        step = step.name(),
                        %video_id,
                        untested = located.untested,
                        "stream located"
                    );
                    return Ok(located);
                }
                Ok(Ok(None)) => {
                    trace!(target: "trailer::stream", step = step.name(), "step empty");
                }
                Ok(Err(TrailerError::Cancelled)) => return Err(TrailerError::Cancelled),
                Ok(Err(err)) => {
                    debug!(target: "trailer::stream", step = step.name(), error = %err, "step failed");
                }
                Err(_elapsed) => {
                    debug!(target: "trailer::stream", step = step.name(), "step timed out");
                }
            }
        }

        Err(TrailerError::StreamUnavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemorySessionStore;
    use crate::providers::LocatedStream;
    use crate::types::SourceProvider;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedBackend {
        source: SourceProvider,
        hit: Option<DiscoveryHit>,
        delay: Duration,
        fail: bool,
        hang: bool,
        calls: AtomicUsize,
    }

    impl ScriptedBackend {
        fn hit(source: SourceProvider, video_id: &str, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                source,
                hit: Some(DiscoveryHit {
                    video_id: video_id.to_string(),
                    title: None,
                    source,
                }),
                delay,
                fail: false,
                hang: false,
                calls: AtomicUsize::new(0),
            })
        }

        fn empty(source: SourceProvider) -> Arc<Self> {
            Arc::new(Self {
                source,
                hit: None,
                delay: Duration::ZERO,
                fail: false,
                hang: false,
                calls: AtomicUsize::new(0),
            })
        }

        fn failing(source: SourceProvider) -> Arc<Self> {
            Arc::new(Self {
                source,
                hit: None,
                delay: Duration::ZERO,
                fail: true,
                hang: false,
                calls: AtomicUsize::new(0),
            })
        }

        fn hanging(source: SourceProvider) -> Arc<Self> {
            Arc::new(Self {
                source,
                hit: None,
                delay: Duration::ZERO,
                fail: false,
                hang: true,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl DiscoveryBackend for ScriptedBackend {
        fn source(&self) -> SourceProvider {
            self.source
        }

        async fn discover(&self, _query: &TrailerQuery) -> Result<Option<DiscoveryHit>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.hang {
                std::future::pending::<()>().await;
            }
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.fail {
                return Err(TrailerError::NetworkFailure("scripted failure".into()));
            }
            Ok(self.hit.clone())
        }
    }

    struct ScriptedLocator {
        name: &'static str,
        result: Option<LocatedStream>,
        fail: bool,
        untested: bool,
        calls: AtomicUsize,
    }

    impl ScriptedLocator {
        fn hit(name: &'static str, url: &str) -> Box<Self> {
            Box::new(Self {
                name,
                result: Some(LocatedStream {
                    url: url.to_string(),
                    untested: false,
                }),
                fail: false,
                untested: false,
                calls: AtomicUsize::new(0),
            })
        }

        fn failing(name: &'static str) -> Box<Self> {
            Box::new(Self {
                name,
                result: None,
                fail: true,
                untested: false,
                calls: AtomicUsize::new(0),
            })
        }

        fn guessed(name: &'static str, url: &str) -> Box<Self> {
            Box::new(Self {
                name,
                result: Some(LocatedStream {
                    url: url.to_string(),
                    untested: true,
                }),
                fail: false,
                untested: true,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl StreamLocator for ScriptedLocator {
        fn name(&self) -> &'static str {
            self.name
        }

        fn untested(&self) -> bool {
            self.untested
        }

        async fn locate(&self, _video_id: &str) -> Result<Option<LocatedStream>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(TrailerError::NetworkFailure("scripted failure".into()));
            }
            Ok(self.result.clone())
        }
    }

    fn orchestrator(
        curated: Arc<ScriptedBackend>,
        search: Arc<ScriptedBackend>,
        chain: Vec<Box<dyn StreamLocator>>,
        config: &TrailerConfig,
    ) -> ProviderOrchestrator {
        let cache = Arc::new(TrailerCache::new(
            Arc::new(MemorySessionStore::default()),
            config,
        ));
        ProviderOrchestrator::new(
            cache,
            RequestGroupRegistry::new(),
            curated,
            search,
            chain,
            config,
        )
    }

    fn query() -> TrailerQuery {
        TrailerQuery::movie("Heat").with_year(1995).with_catalog_id("tmdb:949")
    }

    #[tokio::test(start_paused = true)]
    async fn second_resolve_within_ttl_makes_no_network_calls() {
        let curated = ScriptedBackend::hit(SourceProvider::Curated, "vid1", Duration::ZERO);
        let search = ScriptedBackend::empty(SourceProvider::PlatformSearch);
        let orch = orchestrator(
            curated.clone(),
            search.clone(),
            vec![ScriptedLocator::hit("primary", "https://cdn.example/vid1.m3u8")],
            &TrailerConfig::default(),
        );

        let first = orch.resolve(&query(), "detail:1").await.unwrap().unwrap();
        assert_eq!(first.video_id, "vid1");
        let curated_calls = curated.calls();

        let second = orch.resolve(&query(), "detail:2").await.unwrap().unwrap();
        assert_eq!(second, first);
        assert_eq!(curated.calls(), curated_calls);
        assert_eq!(search.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn first_arrival_wins_regardless_of_backend() {
        // Curated would answer, but a second too late.
        let curated =
            ScriptedBackend::hit(SourceProvider::Curated, "slow", Duration::from_secs(1));
        let search = ScriptedBackend::hit(
            SourceProvider::PlatformSearch,
            "fast",
            Duration::from_millis(10),
        );
        let orch = orchestrator(
            curated,
            search,
            vec![ScriptedLocator::hit("primary", "https://cdn.example/fast.m3u8")],
            &TrailerConfig::default(),
        );

        let resolved = orch.resolve(&query(), "detail:1").await.unwrap().unwrap();
        assert_eq!(resolved.video_id, "fast");

        let record = orch.cache().record(&query()).unwrap();
        assert_eq!(record.source_provider, Some(SourceProvider::PlatformSearch));
    }

    #[tokio::test(start_paused = true)]
    async fn empty_curated_waits_for_search() {
        let curated = ScriptedBackend::empty(SourceProvider::Curated);
        let search = ScriptedBackend::hit(
            SourceProvider::PlatformSearch,
            "vid1",
            Duration::from_millis(500),
        );
        let orch = orchestrator(
            curated,
            search,
            vec![ScriptedLocator::hit("primary", "https://cdn.example/vid1.m3u8")],
            &TrailerConfig::default(),
        );

        let resolved = orch.resolve(&query(), "detail:1").await.unwrap();
        assert_eq!(resolved.unwrap().video_id, "vid1");
    }

    #[tokio::test(start_paused = true)]
    async fn both_empty_caches_a_negative_record() {
        let curated = ScriptedBackend::empty(SourceProvider::Curated);
        let search = ScriptedBackend::empty(SourceProvider::PlatformSearch);
        let orch = orchestrator(curated.clone(), search, vec![], &TrailerConfig::default());

        assert!(orch.resolve(&query(), "detail:1").await.unwrap().is_none());
        assert!(orch.cache().record(&query()).unwrap().is_negative());

        // Negative hit suppresses any further backend calls.
        assert!(orch.resolve(&query(), "detail:2").await.unwrap().is_none());
        assert_eq!(curated.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn both_failing_reports_no_trailer_without_caching() {
        let curated = ScriptedBackend::failing(SourceProvider::Curated);
        let search = ScriptedBackend::failing(SourceProvider::PlatformSearch);
        let orch = orchestrator(curated, search, vec![], &TrailerConfig::default());

        assert!(orch.resolve(&query(), "detail:1").await.unwrap().is_none());
        // Nothing cached, so a later visit retries.
        assert!(orch.cache().record(&query()).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_before_any_response_writes_nothing() {
        let curated = ScriptedBackend::hanging(SourceProvider::Curated);
        let search = ScriptedBackend::hanging(SourceProvider::PlatformSearch);
        let mut config = TrailerConfig::default();
        config.curated_timeout_ms = 60_000;
        config.search_timeout_ms = 60_000;
        let orch = Arc::new(orchestrator(curated, search, vec![], &config));

        let task = {
            let orch = Arc::clone(&orch);
            tokio::spawn(async move { orch.resolve(&query(), "detail:1").await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        orch.groups().cancel_group("detail:1");

        assert!(matches!(task.await.unwrap(), Err(TrailerError::Cancelled)));
        assert!(orch.cache().record(&query()).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn failing_step_advances_the_chain() {
        let curated = ScriptedBackend::hit(SourceProvider::Curated, "vid1", Duration::ZERO);
        let search = ScriptedBackend::empty(SourceProvider::PlatformSearch);
        let orch = orchestrator(
            curated,
            search,
            vec![
                ScriptedLocator::failing("primary"),
                ScriptedLocator::hit("mirror", "https://mirror.example/vid1.m3u8"),
            ],
            &TrailerConfig::default(),
        );

        let resolved = orch.resolve(&query(), "detail:1").await.unwrap().unwrap();
        assert_eq!(resolved.stream_url, "https://mirror.example/vid1.m3u8");
        assert!(!resolved.untested);
    }

    #[tokio::test(start_paused = true)]
    async fn guessed_step_is_gated_by_configuration() {
        let make = |allow: bool| {
            let mut config = TrailerConfig::default();
            config.allow_guessed_manifest = allow;
            orchestrator(
                ScriptedBackend::hit(SourceProvider::Curated, "vid1", Duration::ZERO),
                ScriptedBackend::empty(SourceProvider::PlatformSearch),
                vec![ScriptedLocator::guessed(
                    "guessed",
                    "https://yewtu.be/api/manifest/dash/id/vid1",
                )],
                &config,
            )
        };

        // Gated off: chain exhausts, identity stays cached.
        let gated = make(false);
        assert!(gated.resolve(&query(), "detail:1").await.unwrap().is_none());
        let record = gated.cache().record(&query()).unwrap();
        assert_eq!(record.provider_video_id.as_deref(), Some("vid1"));
        assert!(!record.is_negative());

        // Opted in: the guessed URL comes back flagged untested.
        let open = make(true);
        let resolved = open.resolve(&query(), "detail:1").await.unwrap().unwrap();
        assert!(resolved.untested);
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_trailers_resolve_to_nothing_without_network() {
        let curated = ScriptedBackend::hit(SourceProvider::Curated, "vid1", Duration::ZERO);
        let search = ScriptedBackend::empty(SourceProvider::PlatformSearch);
        let mut config = TrailerConfig::default();
        config.trailers_enabled = false;
        let orch = orchestrator(
            curated.clone(),
            search.clone(),
            vec![ScriptedLocator::hit("primary", "https://cdn.example/vid1.m3u8")],
            &config,
        );

        assert!(orch.resolve(&query(), "detail:1").await.unwrap().is_none());
        assert_eq!(curated.calls(), 0);
        assert_eq!(search.calls(), 0);
        // Nothing cached either: flipping the switch back on resolves fresh.
        assert!(orch.cache().record(&query()).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn identity_cache_hit_skips_discovery() {
        let curated = ScriptedBackend::hit(SourceProvider::Curated, "other", Duration::ZERO);
        let search = ScriptedBackend::empty(SourceProvider::PlatformSearch);
        let orch = orchestrator(
            curated.clone(),
            search.clone(),
            vec![ScriptedLocator::hit("primary", "https://cdn.example/vid1.m3u8")],
            &TrailerConfig::default(),
        );

        orch.cache()
            .store_identity(&query(), "vid1", None, SourceProvider::Curated)
            .unwrap();

        let resolved = orch.resolve(&query(), "detail:1").await.unwrap().unwrap();
        assert_eq!(resolved.video_id, "vid1");
        assert_eq!(curated.calls(), 0);
        assert_eq!(search.calls(), 0);
    }
}
