//! Authoritative in-memory quiz collection and its refresh cycle.
//!
//! `QuizRepository` owns the collection consumers read, coordinates the
//! fetcher, decoder, cache and seed data, and publishes `QuizEvent`s.
//!
//! Refresh rules:
//! - fetch and decode succeed: replace the collection, save it to the cache,
//!   emit `QuizzesUpdated`
//! - anything fails and the cache has quizzes: replace with the cached
//!   collection, emit `QuizzesUpdated`
//! - anything fails and the cache is empty: keep the collection, emit
//!   `NetworkError` unless the refresh is silent
//!
//! Each refresh emits at most one event.

use std::sync::Arc;

use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::api::{ApiError, QuizFetcher};
use crate::cache::QuizStore;
use crate::config::Settings;
use crate::decode;
use crate::models::{DataSource, Quiz, QuizCollection};
use crate::seed;

/// Buffer size for the event channel.
/// Subscribers that fall further behind than this see `Lagged` and should
/// simply re-read the collection.
const EVENT_CHANNEL_CAPACITY: usize = 32;

/// Notification published to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuizEvent {
    /// The collection changed; re-read it
    QuizzesUpdated,
    /// A non-silent refresh failed with nothing to fall back on
    NetworkError(ApiError),
}

/// Result of a single refresh call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Fresh data from the remote source was committed
    Remote,
    /// The remote failed; the cached collection was committed
    CacheFallback(ApiError),
    /// The remote failed and the cache was empty; nothing changed
    Unchanged(ApiError),
}

impl RefreshOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RefreshOutcome::Remote)
    }

    pub fn error(&self) -> Option<&ApiError> {
        match self {
            RefreshOutcome::Remote => None,
            RefreshOutcome::CacheFallback(err) | RefreshOutcome::Unchanged(err) => Some(err),
        }
    }
}

/// The collection together with its provenance, swapped as one unit.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub quizzes: Arc<QuizCollection>,
    pub source: DataSource,
}

pub struct QuizRepository {
    fetcher: Arc<dyn QuizFetcher>,
    store: Arc<dyn QuizStore>,
    settings: Arc<Settings>,
    state: RwLock<Snapshot>,
    /// Serializes refresh cycles so they complete in the order issued.
    refresh_gate: Mutex<()>,
    events: broadcast::Sender<QuizEvent>,
}

impl QuizRepository {
    /// Build a ready repository from the cache, or the seed data when the
    /// cache is empty. Does not touch the network.
    pub fn initialize(
        fetcher: Arc<dyn QuizFetcher>,
        store: Arc<dyn QuizStore>,
        settings: Arc<Settings>,
    ) -> Arc<Self> {
        let initial = match store.load() {
            Some(quizzes) if !quizzes.is_empty() => {
                info!(count = quizzes.len(), "Loaded quizzes from cache");
                Snapshot {
                    quizzes: Arc::new(quizzes),
                    source: DataSource::Cache,
                }
            }
            _ => {
                info!("No cached quizzes, using seed data");
                Snapshot {
                    quizzes: Arc::new(seed::seed_quizzes()),
                    source: DataSource::Seed,
                }
            }
        };

        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Arc::new(Self {
            fetcher,
            store,
            settings,
            state: RwLock::new(initial),
            refresh_gate: Mutex::new(()),
            events,
        })
    }

    /// Initialize, then kick off one silent refresh in the background.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(
        fetcher: Arc<dyn QuizFetcher>,
        store: Arc<dyn QuizStore>,
        settings: Arc<Settings>,
    ) -> Arc<Self> {
        let repo = Self::initialize(fetcher, store, settings);
        let background = Arc::clone(&repo);
        tokio::spawn(async move {
            background.refresh(true).await;
        });
        repo
    }

    /// Subscribe to change and error notifications.
    /// Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> broadcast::Receiver<QuizEvent> {
        self.events.subscribe()
    }

    pub async fn snapshot(&self) -> Snapshot {
        self.state.read().await.clone()
    }

    pub async fn quizzes(&self) -> Arc<QuizCollection> {
        Arc::clone(&self.state.read().await.quizzes)
    }

    pub async fn quiz(&self, index: usize) -> Option<Quiz> {
        self.state.read().await.quizzes.get(index).cloned()
    }

    pub async fn source(&self) -> DataSource {
        self.state.read().await.source
    }

    /// Run one refresh cycle.
    ///
    /// A silent refresh still falls back to the cache but never emits
    /// `NetworkError`.
    pub async fn refresh(&self, silent: bool) -> RefreshOutcome {
        let _gate = self.refresh_gate.lock().await;

        let url = self.settings.source_url();
        debug!(url = %url, silent = silent, "Refreshing quizzes");

        match self.fetch_and_decode(&url).await {
            Ok(quizzes) => {
                info!(count = quizzes.len(), url = %url, "Quizzes refreshed from remote");
                let quizzes = Arc::new(quizzes);
                self.commit(Arc::clone(&quizzes), DataSource::Remote).await;
                if !self.save_to_store(quizzes).await {
                    warn!("Refreshed quizzes could not be cached");
                }
                self.notify(QuizEvent::QuizzesUpdated);
                RefreshOutcome::Remote
            }
            Err(err) => self.fall_back(err, silent).await,
        }
    }

    async fn fetch_and_decode(&self, url: &str) -> Result<QuizCollection, ApiError> {
        let bytes = self.fetcher.fetch(url).await?;
        decode::decode(&bytes).map_err(|e| {
            warn!(url = url, error = %e, "Quiz payload could not be decoded");
            ApiError::from(e)
        })
    }

    async fn fall_back(&self, err: ApiError, silent: bool) -> RefreshOutcome {
        match self.load_from_store().await {
            Some(cached) if !cached.is_empty() => {
                info!(
                    kind = err.kind(),
                    count = cached.len(),
                    "Refresh failed, using cached quizzes"
                );
                self.commit(Arc::new(cached), DataSource::Cache).await;
                self.notify(QuizEvent::QuizzesUpdated);
                RefreshOutcome::CacheFallback(err)
            }
            _ => {
                warn!(kind = err.kind(), error = %err, silent = silent, "Refresh failed with no cache to fall back on");
                if !silent {
                    self.notify(QuizEvent::NetworkError(err.clone()));
                }
                RefreshOutcome::Unchanged(err)
            }
        }
    }

    async fn commit(&self, quizzes: Arc<QuizCollection>, source: DataSource) {
        let mut state = self.state.write().await;
        *state = Snapshot { quizzes, source };
    }

    // Store I/O is blocking file access, kept off the async workers.

    async fn save_to_store(&self, quizzes: Arc<QuizCollection>) -> bool {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || store.save(&quizzes))
            .await
            .unwrap_or_else(|e| {
                warn!(error = %e, "Cache save task failed");
                false
            })
    }

    async fn load_from_store(&self) -> Option<QuizCollection> {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || store.load())
            .await
            .unwrap_or_else(|e| {
                warn!(error = %e, "Cache load task failed");
                None
            })
    }

    /// Wait until every refresh issued so far has completed.
    #[cfg(test)]
    pub(crate) async fn wait_idle(&self) {
        drop(self.refresh_gate.lock().await);
    }

    fn notify(&self, event: QuizEvent) {
        // Err only means nobody is subscribed right now
        if self.events.send(event).is_err() {
            debug!("No subscribers for quiz event");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::cache::CacheManager;
    use crate::config::Config;
    use crate::models::Question;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;
    use tempfile::{tempdir, TempDir};
    use tokio::sync::broadcast::error::TryRecvError;

    /// Fetcher that replays scripted responses and records requested URLs.
    #[derive(Default)]
    pub(crate) struct ScriptedFetcher {
        responses: StdMutex<VecDeque<Result<Vec<u8>, ApiError>>>,
        pub(crate) urls: StdMutex<Vec<String>>,
    }

    impl ScriptedFetcher {
        pub(crate) fn new(responses: Vec<Result<Vec<u8>, ApiError>>) -> Arc<Self> {
            Arc::new(Self {
                responses: StdMutex::new(responses.into()),
                urls: StdMutex::new(Vec::new()),
            })
        }

        pub(crate) fn calls(&self) -> usize {
            self.urls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl QuizFetcher for ScriptedFetcher {
        async fn fetch(&self, url: &str) -> Result<Vec<u8>, ApiError> {
            self.urls.lock().unwrap().push(url.to_string());
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(ApiError::NoInternetConnection))
        }
    }

    pub(crate) fn payload(titles: &[&str]) -> Vec<u8> {
        let quizzes: Vec<_> = titles
            .iter()
            .map(|t| {
                serde_json::json!({
                    "title": t,
                    "desc": "remote",
                    "questions": [{"text": "Q", "answers": ["a", "b"], "answer": "1"}]
                })
            })
            .collect();
        serde_json::to_vec(&quizzes).unwrap()
    }

    pub(crate) fn collection(titles: &[&str]) -> QuizCollection {
        titles
            .iter()
            .map(|t| {
                Quiz::new(
                    *t,
                    "cached",
                    "📦",
                    vec![Question::new("Q", vec!["a".into(), "b".into()], 0)],
                )
            })
            .collect()
    }

    fn titles(quizzes: &[Quiz]) -> Vec<String> {
        quizzes.iter().map(|q| q.title().to_string()).collect()
    }

    pub(crate) fn settings() -> Arc<Settings> {
        Arc::new(Settings::in_memory(Config {
            source_url: Some("http://quiz.test/questions.json".into()),
            refresh_interval: None,
        }))
    }

    fn cache_with(quizzes: Option<&QuizCollection>) -> (TempDir, Arc<CacheManager>) {
        let dir = tempdir().unwrap();
        let cache = CacheManager::new(dir.path().to_path_buf()).unwrap();
        if let Some(quizzes) = quizzes {
            assert!(cache.save(quizzes));
        }
        (dir, Arc::new(cache))
    }

    fn drain(rx: &mut broadcast::Receiver<QuizEvent>) -> Vec<QuizEvent> {
        let mut events = Vec::new();
        loop {
            match rx.try_recv() {
                Ok(event) => events.push(event),
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return events,
                Err(TryRecvError::Lagged(_)) => continue,
            }
        }
    }

    #[tokio::test]
    async fn test_initialize_prefers_cache_over_seed() {
        let cached = collection(&["A", "B"]);
        let (_dir, cache) = cache_with(Some(&cached));
        let repo = QuizRepository::initialize(ScriptedFetcher::new(vec![]), cache, settings());

        assert_eq!(repo.source().await, DataSource::Cache);
        assert_eq!(*repo.quizzes().await, cached);
    }

    #[tokio::test]
    async fn test_initialize_uses_seed_without_cache() {
        let (_dir, cache) = cache_with(None);
        let repo = QuizRepository::initialize(ScriptedFetcher::new(vec![]), cache, settings());

        assert_eq!(repo.source().await, DataSource::Seed);
        assert_eq!(*repo.quizzes().await, seed::seed_quizzes());
    }

    #[tokio::test]
    async fn test_initialize_ignores_empty_cache() {
        let (_dir, cache) = cache_with(Some(&Vec::new()));
        let repo = QuizRepository::initialize(ScriptedFetcher::new(vec![]), cache, settings());
        assert_eq!(repo.source().await, DataSource::Seed);
    }

    #[tokio::test]
    async fn test_successful_refresh_commits_and_caches() {
        let (_dir, cache) = cache_with(None);
        let fetcher = ScriptedFetcher::new(vec![Ok(payload(&["X", "Y"]))]);
        let repo = QuizRepository::initialize(fetcher.clone(), cache.clone(), settings());
        let mut rx = repo.subscribe();

        let outcome = repo.refresh(false).await;

        assert_eq!(outcome, RefreshOutcome::Remote);
        assert!(outcome.is_success());
        assert_eq!(repo.source().await, DataSource::Remote);
        assert_eq!(titles(&repo.quizzes().await), vec!["X", "Y"]);
        assert_eq!(cache.load().map(|q| titles(&q)), Some(vec!["X".into(), "Y".into()]));
        assert_eq!(drain(&mut rx), vec![QuizEvent::QuizzesUpdated]);
        assert_eq!(
            fetcher.urls.lock().unwrap().as_slice(),
            ["http://quiz.test/questions.json"]
        );
    }

    #[tokio::test]
    async fn test_timeout_falls_back_to_cache_silently() {
        let cached = collection(&["One", "Two", "Three"]);
        let (_dir, cache) = cache_with(None);
        let repo = QuizRepository::initialize(
            ScriptedFetcher::new(vec![Err(ApiError::Timeout)]),
            cache.clone(),
            settings(),
        );
        assert_eq!(repo.source().await, DataSource::Seed);
        assert!(cache.save(&cached));
        let mut rx = repo.subscribe();

        let outcome = repo.refresh(true).await;

        assert_eq!(outcome, RefreshOutcome::CacheFallback(ApiError::Timeout));
        assert_eq!(repo.source().await, DataSource::Cache);
        assert_eq!(*repo.quizzes().await, cached);
        assert_eq!(drain(&mut rx), vec![QuizEvent::QuizzesUpdated]);
    }

    #[tokio::test]
    async fn test_cache_fallback_never_emits_error_even_when_loud() {
        let cached = collection(&["A"]);
        let (_dir, cache) = cache_with(Some(&cached));
        let repo = QuizRepository::initialize(
            ScriptedFetcher::new(vec![Err(ApiError::HttpError(503))]),
            cache,
            settings(),
        );
        let mut rx = repo.subscribe();

        let outcome = repo.refresh(false).await;

        assert_eq!(outcome.error(), Some(&ApiError::HttpError(503)));
        assert_eq!(drain(&mut rx), vec![QuizEvent::QuizzesUpdated]);
    }

    #[tokio::test]
    async fn test_http_500_without_cache_reports_error() {
        let (_dir, cache) = cache_with(None);
        let repo = QuizRepository::initialize(
            ScriptedFetcher::new(vec![Err(ApiError::HttpError(500))]),
            cache,
            settings(),
        );
        let before = repo.quizzes().await;
        let mut rx = repo.subscribe();

        let outcome = repo.refresh(false).await;

        assert_eq!(outcome, RefreshOutcome::Unchanged(ApiError::HttpError(500)));
        assert_eq!(repo.quizzes().await, before);
        assert_eq!(repo.source().await, DataSource::Seed);
        assert_eq!(
            drain(&mut rx),
            vec![QuizEvent::NetworkError(ApiError::HttpError(500))]
        );
    }

    #[tokio::test]
    async fn test_silent_failure_without_cache_emits_nothing() {
        let (_dir, cache) = cache_with(None);
        let repo = QuizRepository::initialize(
            ScriptedFetcher::new(vec![Err(ApiError::HttpError(500))]),
            cache,
            settings(),
        );
        let mut rx = repo.subscribe();

        let outcome = repo.refresh(true).await;

        assert_eq!(outcome, RefreshOutcome::Unchanged(ApiError::HttpError(500)));
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_malformed_payload_never_replaces_collection() {
        let (_dir, cache) = cache_with(None);
        let fetcher = ScriptedFetcher::new(vec![
            Ok(payload(&["Good"])),
            Ok(br#"[{"title":"Broken"}]"#.to_vec()),
        ]);
        let repo = QuizRepository::initialize(fetcher, cache.clone(), settings());
        assert!(repo.refresh(true).await.is_success());

        // Second payload fails to decode: falls back to the cache written by
        // the first refresh, which holds the same content
        let mut rx = repo.subscribe();
        let outcome = repo.refresh(false).await;

        assert!(matches!(outcome, RefreshOutcome::CacheFallback(ApiError::DecodingError(_))));
        assert_eq!(titles(&repo.quizzes().await), vec!["Good"]);
        assert_eq!(titles(&cache.load().unwrap()), vec!["Good"]);
        assert_eq!(drain(&mut rx), vec![QuizEvent::QuizzesUpdated]);
    }

    #[tokio::test]
    async fn test_decode_failure_without_cache_reports_decoding_error() {
        let (_dir, cache) = cache_with(None);
        let repo = QuizRepository::initialize(
            ScriptedFetcher::new(vec![Ok(b"<html>".to_vec())]),
            cache,
            settings(),
        );
        let mut rx = repo.subscribe();

        let outcome = repo.refresh(false).await;

        assert!(matches!(outcome, RefreshOutcome::Unchanged(ApiError::DecodingError(_))));
        assert!(matches!(
            drain(&mut rx).as_slice(),
            [QuizEvent::NetworkError(ApiError::DecodingError(_))]
        ));
    }

    #[tokio::test]
    async fn test_seed_is_never_written_to_cache() {
        let (_dir, cache) = cache_with(None);
        let repo = QuizRepository::initialize(
            ScriptedFetcher::new(vec![Err(ApiError::NoInternetConnection)]),
            cache.clone(),
            settings(),
        );
        repo.refresh(true).await;
        assert!(cache.load().is_none());
    }

    #[tokio::test]
    async fn test_refresh_reads_url_each_call() {
        let (_dir, cache) = cache_with(None);
        let fetcher = ScriptedFetcher::new(vec![Ok(payload(&["A"])), Ok(payload(&["B"]))]);
        let settings = settings();
        let repo = QuizRepository::initialize(fetcher.clone(), cache, settings.clone());

        repo.refresh(true).await;
        settings.set_source_url("http://other.test/quizzes.json").unwrap();
        repo.refresh(true).await;

        assert_eq!(
            fetcher.urls.lock().unwrap().as_slice(),
            ["http://quiz.test/questions.json", "http://other.test/quizzes.json"]
        );
        assert_eq!(titles(&repo.quizzes().await), vec!["B"]);
    }

    #[tokio::test]
    async fn test_start_runs_one_silent_refresh() {
        let (_dir, cache) = cache_with(None);
        let fetcher = ScriptedFetcher::new(vec![Ok(payload(&["Remote"]))]);
        let repo = QuizRepository::start(fetcher.clone(), cache, settings());
        let mut rx = repo.subscribe();

        // The background refresh may already have finished; wait on whichever
        // comes first: the event, or the committed remote source
        let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(5);
        while repo.source().await != DataSource::Remote {
            tokio::select! {
                _ = rx.recv() => {}
                _ = tokio::time::sleep_until(deadline) => panic!("startup refresh never completed"),
                _ = tokio::time::sleep(std::time::Duration::from_millis(10)) => {}
            }
        }
        assert_eq!(fetcher.calls(), 1);
        assert_eq!(titles(&repo.quizzes().await), vec!["Remote"]);
    }

    #[tokio::test]
    async fn test_concurrent_refreshes_apply_in_issue_order() {
        let (_dir, cache) = cache_with(None);
        let fetcher = ScriptedFetcher::new(vec![
            Ok(payload(&["First"])),
            Ok(payload(&["Second"])),
            Ok(payload(&["Third"])),
        ]);
        let repo = QuizRepository::initialize(fetcher, cache, settings());
        let mut rx = repo.subscribe();

        let outcomes = futures::future::join_all((0..3).map(|_| repo.refresh(true))).await;

        assert!(outcomes.iter().all(RefreshOutcome::is_success));
        assert_eq!(titles(&repo.quizzes().await), vec!["Third"]);
        assert_eq!(drain(&mut rx).len(), 3);
    }

    #[tokio::test]
    async fn test_readers_never_see_partial_collections() {
        let (_dir, cache) = cache_with(None);
        let fetcher = ScriptedFetcher::new(
            (0..20)
                .map(|i| {
                    let names: Vec<String> = (0..(i % 4 + 1)).map(|n| format!("R{}-{}", i, n)).collect();
                    let refs: Vec<&str> = names.iter().map(String::as_str).collect();
                    Ok(payload(&refs))
                })
                .collect(),
        );
        let repo = QuizRepository::initialize(fetcher, cache, settings());

        let writer = {
            let repo = Arc::clone(&repo);
            tokio::spawn(async move {
                for _ in 0..20 {
                    repo.refresh(true).await;
                }
            })
        };
        for _ in 0..200 {
            let snapshot = repo.snapshot().await;
            let prefixes: Vec<_> = snapshot
                .quizzes
                .iter()
                .map(|q| q.title().split('-').next().unwrap_or_default().to_string())
                .collect();
            // Every quiz in a snapshot comes from the same refresh
            if snapshot.source == DataSource::Remote {
                assert!(prefixes.windows(2).all(|w| w[0] == w[1]), "{:?}", prefixes);
            }
            tokio::task::yield_now().await;
        }
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn test_quiz_lookup() {
        let (_dir, cache) = cache_with(None);
        let repo = QuizRepository::initialize(ScriptedFetcher::new(vec![]), cache, settings());
        assert_eq!(repo.quiz(0).await.map(|q| q.title().to_string()), Some("Mathematics".into()));
        assert!(repo.quiz(99).await.is_none());
    }

    /// Store that records which thread each call ran on.
    struct ThreadRecordingStore {
        inner: CacheManager,
        threads: StdMutex<Vec<std::thread::ThreadId>>,
    }

    impl QuizStore for ThreadRecordingStore {
        fn save(&self, quizzes: &[Quiz]) -> bool {
            self.threads.lock().unwrap().push(std::thread::current().id());
            self.inner.save(quizzes)
        }

        fn load(&self) -> Option<QuizCollection> {
            self.threads.lock().unwrap().push(std::thread::current().id());
            self.inner.load()
        }
    }

    #[tokio::test]
    async fn test_refresh_runs_store_io_off_the_runtime_thread() {
        let dir = tempdir().unwrap();
        let store = Arc::new(ThreadRecordingStore {
            inner: CacheManager::new(dir.path().to_path_buf()).unwrap(),
            threads: StdMutex::new(Vec::new()),
        });
        let repo = QuizRepository::initialize(
            ScriptedFetcher::new(vec![Ok(payload(&["A"])), Err(ApiError::Timeout)]),
            store.clone(),
            settings(),
        );
        // initialize is synchronous and loads in place
        store.threads.lock().unwrap().clear();

        assert!(repo.refresh(true).await.is_success());
        assert_eq!(
            repo.refresh(true).await,
            RefreshOutcome::CacheFallback(ApiError::Timeout)
        );

        let runtime_thread = std::thread::current().id();
        let threads = store.threads.lock().unwrap();
        assert_eq!(threads.len(), 2);
        assert!(threads.iter().all(|id| *id != runtime_thread));
    }

    #[tokio::test]
    async fn test_dropped_subscriber_does_not_block_refresh() {
        let (_dir, cache) = cache_with(None);
        let repo = QuizRepository::initialize(
            ScriptedFetcher::new(vec![Ok(payload(&["A"]))]),
            cache,
            settings(),
        );
        drop(repo.subscribe());
        assert!(repo.refresh(false).await.is_success());
    }
}
