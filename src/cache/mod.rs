use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, PoisonError, Weak,
    },
    time::Duration,
};

use chrono::Utc;
use log::{debug, info, warn};
use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{interval_at, sleep, Instant, MissedTickBehavior},
};

use crate::config::{
    WatchlistDescriptor, DEFAULT_COLD_START_DELAY, DEFAULT_INTER_REQUEST_DELAY, DEFAULT_TTL,
    DEFAULT_WARM_START_DELAY,
};
use crate::fetch::{FetchError, QuoteFetcher};
use crate::quote::{Quote, Snapshot};
use crate::storage::{PersistedSnapshot, SnapshotStore};
use crate::utils::format_age;

mod state;

pub use state::{CacheState, CycleOutcome, ErrorKind, Startup};

/// Everything a `QuoteCache` needs besides its fetcher and store.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheOptions {
    pub symbols: Vec<String>,
    /// Labels attached to fetched quotes, keyed by symbol.
    pub display_names: HashMap<String, String>,
    pub store_key: String,
    pub ttl: Duration,
    pub inter_request_delay: Duration,
    /// Zero disables periodic refresh.
    pub refresh_interval: Duration,
    pub warm_start_delay: Duration,
    pub cold_start_delay: Duration,
}

impl CacheOptions {
    pub fn new(store_key: impl Into<String>, symbols: Vec<String>) -> Self {
        Self {
            symbols,
            display_names: HashMap::new(),
            store_key: store_key.into(),
            ttl: DEFAULT_TTL,
            inter_request_delay: DEFAULT_INTER_REQUEST_DELAY,
            refresh_interval: DEFAULT_TTL,
            warm_start_delay: DEFAULT_WARM_START_DELAY,
            cold_start_delay: DEFAULT_COLD_START_DELAY,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_inter_request_delay(mut self, delay: Duration) -> Self {
        self.inter_request_delay = delay;
        self
    }

    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }

    pub fn with_start_delays(mut self, warm: Duration, cold: Duration) -> Self {
        self.warm_start_delay = warm;
        self.cold_start_delay = cold;
        self
    }

    pub fn with_display_name(mut self, symbol: impl Into<String>, name: impl Into<String>) -> Self {
        self.display_names.insert(symbol.into(), name.into());
        self
    }
}

impl From<&WatchlistDescriptor> for CacheOptions {
    fn from(descriptor: &WatchlistDescriptor) -> Self {
        let settings = &descriptor.cache;
        let display_names = descriptor
            .symbols
            .iter()
            .filter_map(|item| Some((item.id.clone(), item.name.clone()?)))
            .collect();

        Self {
            symbols: descriptor.symbol_ids(),
            display_names,
            store_key: settings.store_key.clone(),
            ttl: settings.ttl,
            inter_request_delay: settings.inter_request_delay,
            refresh_interval: settings.refresh_interval,
            warm_start_delay: settings.warm_start_delay,
            cold_start_delay: settings.cold_start_delay,
        }
    }
}

/// Stale-while-revalidate cache over one symbol list.
///
/// Consumers read the latest [`CacheState`] through [`QuoteCache::get_state`] or
/// [`QuoteCache::subscribe`]; the cache keeps serving the last good snapshot
/// while a refresh cycle runs or after one fails.
#[derive(Clone)]
pub struct QuoteCache {
    inner: Arc<Inner>,
}

struct Inner {
    options: CacheOptions,
    fetcher: Arc<dyn QuoteFetcher>,
    store: Arc<dyn SnapshotStore>,
    state: watch::Sender<Arc<CacheState>>,
    running: AtomicBool,
    disposed: AtomicBool,
    scheduler: Mutex<Option<JoinHandle<()>>>,
}

impl QuoteCache {
    pub fn new(
        options: CacheOptions,
        fetcher: Arc<dyn QuoteFetcher>,
        store: Arc<dyn SnapshotStore>,
    ) -> Self {
        let (state, _) = watch::channel(Arc::new(CacheState::default()));
        Self {
            inner: Arc::new(Inner {
                options,
                fetcher,
                store,
                state,
                running: AtomicBool::new(false),
                disposed: AtomicBool::new(false),
                scheduler: Mutex::new(None),
            }),
        }
    }

    pub fn options(&self) -> &CacheOptions {
        &self.inner.options
    }

    /// Serve a fresh persisted snapshot if there is one, then schedule the first
    /// refresh and the periodic timer. Must be called inside a tokio runtime.
    pub fn initialize(&self) -> Startup {
        let startup = self.inner.load_persisted();
        if self.is_disposed() {
            debug!(
                "Cache `{}` disposed before scheduling refreshes",
                self.inner.options.store_key
            );
            return startup;
        }

        self.inner
            .schedule(startup.first_refresh_delay(&self.inner.options));
        startup
    }

    /// Run one refresh cycle now. Returns [`CycleOutcome::Skipped`] when another
    /// cycle is already in flight.
    pub async fn refresh_cycle(&self) -> CycleOutcome {
        self.inner.run_cycle().await
    }

    pub fn get_state(&self) -> Arc<CacheState> {
        self.inner.current()
    }

    /// The receiver yields the current state immediately and every replacement after it.
    pub fn subscribe(&self) -> watch::Receiver<Arc<CacheState>> {
        self.inner.state.subscribe()
    }

    /// Stop all scheduled work. Safe to call more than once.
    pub fn dispose(&self) {
        let inner = &self.inner;
        let mut already_disposed = false;
        // Flipped under the state lock so a finishing cycle never commits after it.
        inner.state.send_if_modified(|_| {
            already_disposed = inner.disposed.swap(true, Ordering::AcqRel);
            false
        });

        if already_disposed {
            debug!("Cache `{}` already disposed", self.inner.options.store_key);
        } else {
            info!("Disposing cache `{}`", self.inner.options.store_key);
        }
        if let Some(handle) = self.inner.take_scheduler() {
            handle.abort();
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }
}

impl Inner {
    fn current(&self) -> Arc<CacheState> {
        self.state.borrow().clone()
    }

    fn publish(&self, update: impl FnOnce(&mut CacheState)) {
        self.state.send_modify(|current| {
            let mut next = (**current).clone();
            update(&mut next);
            *current = Arc::new(next);
        });
    }

    fn load_persisted(&self) -> Startup {
        let key = &self.options.store_key;
        let persisted = match self.store.load(key) {
            Ok(Some(persisted)) => persisted,
            Ok(None) => {
                info!("No cached quotes for `{}`", key);
                return Startup::Miss;
            }
            Err(err) => {
                warn!("Ignoring unreadable cached quotes for `{}`: {}", key, err);
                return Startup::Miss;
            }
        };

        let snapshot = persisted.into_snapshot();
        let now = Utc::now();
        let age = format_age(snapshot.age(now));
        if !snapshot.is_fresh(now, self.options.ttl) {
            info!("Cached quotes for `{}` are stale ({} old)", key, age);
            return Startup::Stale;
        }

        info!(
            "Serving {} cached quotes for `{}` ({} old)",
            snapshot.len(),
            key,
            age
        );
        let snapshot = Arc::new(snapshot);
        self.publish(|state| {
            // A cycle may already have committed something newer.
            if state.snapshot.is_none() {
                state.snapshot = Some(snapshot);
                state.no_data = false;
            }
        });
        Startup::CacheHit
    }

    fn schedule(self: &Arc<Self>, first_delay: Duration) {
        let weak = Arc::downgrade(self);
        let period = self.options.refresh_interval;
        let anchor = Instant::now();

        let handle = tokio::spawn(async move {
            sleep(first_delay).await;
            if !Inner::trigger(&weak) {
                return;
            }
            if period.is_zero() {
                return;
            }

            let mut ticker = interval_at(anchor + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if !Inner::trigger(&weak) {
                    return;
                }
            }
        });

        let previous = self
            .scheduler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(handle);
        if let Some(previous) = previous {
            debug!("Replacing refresh schedule for `{}`", self.options.store_key);
            previous.abort();
        }

        if self.disposed.load(Ordering::Acquire) {
            if let Some(handle) = self.take_scheduler() {
                handle.abort();
            }
        }
    }

    /// Spawn one cycle. Returns false once the cache is gone or disposed.
    fn trigger(weak: &Weak<Inner>) -> bool {
        let Some(inner) = weak.upgrade() else {
            return false;
        };
        if inner.disposed.load(Ordering::Acquire) {
            return false;
        }

        tokio::spawn(async move {
            inner.run_cycle().await;
        });
        true
    }

    fn take_scheduler(&self) -> Option<JoinHandle<()>> {
        self.scheduler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    async fn run_cycle(&self) -> CycleOutcome {
        let key = &self.options.store_key;
        if self.disposed.load(Ordering::Acquire) {
            return CycleOutcome::Disposed;
        }
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Refresh for `{}` already running; skipping", key);
            return CycleOutcome::Skipped;
        }

        let mut guard = CycleGuard {
            inner: self,
            finished: false,
        };
        self.publish(|state| {
            state.is_refreshing = true;
            state.last_error = None;
            state.no_data = false;
        });
        debug!(
            "Refreshing {} symbols for `{}`",
            self.options.symbols.len(),
            key
        );

        let (quotes, fatal) = self.collect_quotes().await;
        let outcome = self.finish_cycle(quotes, fatal);
        guard.finished = true;
        outcome
    }

    async fn collect_quotes(&self) -> (Vec<Quote>, Option<FetchError>) {
        let symbols = &self.options.symbols;
        let mut quotes = Vec::with_capacity(symbols.len());

        for (index, symbol) in symbols.iter().enumerate() {
            match self.fetcher.fetch_quote(symbol).await {
                Ok(quote) => quotes.push(self.label(quote)),
                Err(err) if err.kind.is_fatal() => {
                    warn!(
                        "Aborting refresh of `{}`: {}",
                        self.options.store_key, err
                    );
                    return (quotes, Some(err));
                }
                Err(err) => warn!("Skipping {}: {}", symbol, err),
            }

            if index + 1 < symbols.len() && !self.options.inter_request_delay.is_zero() {
                sleep(self.options.inter_request_delay).await;
            }
        }

        (quotes, None)
    }

    fn label(&self, quote: Quote) -> Quote {
        match self.options.display_names.get(&quote.symbol) {
            Some(name) => quote.with_name(name.clone()),
            None => quote,
        }
    }

    fn finish_cycle(&self, quotes: Vec<Quote>, fatal: Option<FetchError>) -> CycleOutcome {
        let key = &self.options.store_key;
        let fetched = quotes.len();

        if let Some(err) = fatal {
            let settled = self.settle(|state| {
                state.last_error = Some(ErrorKind::from(err.kind));
                state.no_data = state.snapshot.is_none() && fetched == 0;
            });
            if !settled {
                return self.discarded();
            }
            return CycleOutcome::Aborted {
                kind: err.kind,
                fetched,
            };
        }

        if quotes.is_empty() {
            warn!("Refresh of `{}` returned no quotes", key);
            let settled = self.settle(|state| {
                if state.snapshot.is_none() {
                    state.last_error = Some(ErrorKind::NoDataAvailable);
                    state.no_data = true;
                }
            });
            if !settled {
                return self.discarded();
            }
            return CycleOutcome::Empty;
        }

        let snapshot = Arc::new(Snapshot::new(quotes, Utc::now()));
        let settled = self.settle(|state| {
            state.snapshot = Some(Arc::clone(&snapshot));
            state.last_error = None;
            state.no_data = false;
        });
        if !settled {
            return self.discarded();
        }

        // Nothing is written once the cache is disposed, even after a commit.
        let persisted = if self.disposed.load(Ordering::Acquire) {
            info!("Skipping persistence for `{}`: cache disposed", key);
            false
        } else {
            match self.store.save(key, &PersistedSnapshot::from(snapshot.as_ref())) {
                Ok(()) => true,
                Err(err) => {
                    warn!("Failed to persist quotes for `{}`: {}", key, err);
                    false
                }
            }
        };
        info!("Committed {} quotes for `{}`", fetched, key);
        CycleOutcome::Committed {
            entries: fetched,
            persisted,
        }
    }

    /// End a cycle: clear `is_refreshing` and apply `update` unless the cache is disposed.
    /// The flag is read under the state lock, which `dispose` also takes.
    fn settle(&self, update: impl FnOnce(&mut CacheState)) -> bool {
        let mut applied = false;
        self.state.send_modify(|current| {
            let mut next = (**current).clone();
            next.is_refreshing = false;
            if !self.disposed.load(Ordering::Acquire) {
                update(&mut next);
                applied = true;
            }
            *current = Arc::new(next);
        });
        applied
    }

    fn discarded(&self) -> CycleOutcome {
        info!(
            "Dropping refresh result for `{}`: cache disposed",
            self.options.store_key
        );
        CycleOutcome::Discarded
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let handle = self
            .scheduler
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle.abort();
        }
    }
}

/// Releases the single-flight flag however the cycle ends, including cancellation.
struct CycleGuard<'a> {
    inner: &'a Inner,
    finished: bool,
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.inner.publish(|state| state.is_refreshing = false);
        }
        self.inner.running.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AppError, Result};
    use crate::fetch::{FetchErrorKind, QuoteFuture};
    use crate::storage::MemoryStore;

    const KEY: &str = "watchlistStocks";

    #[derive(Clone, Copy)]
    enum Reply {
        Price(f64, Option<f64>),
        Fail(FetchErrorKind),
    }

    struct ScriptedFetcher {
        replies: Mutex<HashMap<String, Reply>>,
        calls: Mutex<Vec<(String, Instant)>>,
        latency: Duration,
        dispose_on: Mutex<Option<(String, Weak<Inner>)>>,
    }

    impl ScriptedFetcher {
        fn new(latency: Duration, replies: &[(&str, Reply)]) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(
                    replies
                        .iter()
                        .map(|(symbol, reply)| (symbol.to_string(), *reply))
                        .collect(),
                ),
                calls: Mutex::new(Vec::new()),
                latency,
                dispose_on: Mutex::new(None),
            })
        }

        /// Dispose `cache` from inside the fetch of `symbol`.
        fn dispose_during(&self, symbol: &str, cache: &QuoteCache) {
            *self.dispose_on.lock().unwrap() =
                Some((symbol.to_string(), Arc::downgrade(&cache.inner)));
        }

        fn set(&self, symbol: &str, reply: Reply) {
            self.replies.lock().unwrap().insert(symbol.to_string(), reply);
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().iter().map(|(s, _)| s.clone()).collect()
        }

        fn call_times(&self) -> Vec<Instant> {
            self.calls.lock().unwrap().iter().map(|(_, at)| *at).collect()
        }
    }

    impl QuoteFetcher for ScriptedFetcher {
        fn fetch_quote<'a>(&'a self, symbol: &'a str) -> QuoteFuture<'a> {
            Box::pin(async move {
                self.calls
                    .lock()
                    .unwrap()
                    .push((symbol.to_string(), Instant::now()));
                let target = self
                    .dispose_on
                    .lock()
                    .unwrap()
                    .as_ref()
                    .filter(|(on, _)| on.as_str() == symbol)
                    .and_then(|(_, inner)| inner.upgrade());
                if let Some(inner) = target {
                    QuoteCache { inner }.dispose();
                }
                if !self.latency.is_zero() {
                    sleep(self.latency).await;
                }
                let reply = self
                    .replies
                    .lock()
                    .unwrap()
                    .get(symbol)
                    .copied()
                    .unwrap_or(Reply::Fail(FetchErrorKind::NotFound));
                match reply {
                    Reply::Price(current, previous) => Ok(Quote::new(symbol, current, previous)),
                    Reply::Fail(kind) => Err(FetchError::new(kind, symbol, "scripted")),
                }
            })
        }
    }

    struct BrokenStore;

    impl SnapshotStore for BrokenStore {
        fn load(&self, _key: &str) -> Result<Option<PersistedSnapshot>> {
            Ok(None)
        }

        fn save(&self, _key: &str, _snapshot: &PersistedSnapshot) -> Result<()> {
            Err(AppError::message("disk full"))
        }
    }

    fn options(symbols: &[&str]) -> CacheOptions {
        CacheOptions::new(KEY, symbols.iter().map(|s| s.to_string()).collect())
    }

    fn cache(
        options: CacheOptions,
        fetcher: &Arc<ScriptedFetcher>,
        store: &Arc<MemoryStore>,
    ) -> QuoteCache {
        QuoteCache::new(options, fetcher.clone(), store.clone())
    }

    fn prices<'a>(symbols: &[&'a str]) -> Vec<(&'a str, Reply)> {
        symbols
            .iter()
            .map(|symbol| (*symbol, Reply::Price(10.0, Some(9.0))))
            .collect()
    }

    fn seed(store: &MemoryStore, age: chrono::Duration) {
        let snapshot = Snapshot::new(
            vec![Quote::new("A", 10.0, Some(9.0))],
            Utc::now() - age,
        );
        store
            .save(KEY, &PersistedSnapshot::from(&snapshot))
            .expect("seed store");
    }

    fn round2(value: f64) -> f64 {
        (value * 100.0).round() / 100.0
    }

    #[tokio::test(start_paused = true)]
    async fn commits_sorted_snapshot_and_skips_missing_symbols() {
        let fetcher = ScriptedFetcher::new(
            Duration::ZERO,
            &[
                ("A", Reply::Price(100.0, Some(90.0))),
                ("B", Reply::Price(50.0, Some(55.0))),
                ("C", Reply::Fail(FetchErrorKind::NotFound)),
            ],
        );
        let store = Arc::new(MemoryStore::new());
        let cache = cache(options(&["B", "A", "C"]), &fetcher, &store);

        let outcome = cache.refresh_cycle().await;
        assert_eq!(
            outcome,
            CycleOutcome::Committed {
                entries: 2,
                persisted: true
            }
        );
        assert_eq!(fetcher.calls(), vec!["B", "A", "C"]);

        let state = cache.get_state();
        let snapshot = state.snapshot.as_ref().expect("snapshot committed");
        let symbols: Vec<&str> = snapshot.entries().iter().map(|q| q.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["A", "B"]);
        assert_eq!(round2(snapshot.entries()[0].change_percent), 11.11);
        assert_eq!(round2(snapshot.entries()[1].change_percent), -9.09);
        assert!(!state.is_refreshing);
        assert_eq!(state.last_error, None);
        assert!((Utc::now() - snapshot.captured_at()).num_seconds() < 5);

        let persisted = store.load(KEY).unwrap().expect("persisted");
        assert_eq!(persisted.entries.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_error_keeps_previous_snapshot() {
        let symbols = ["A", "B", "C", "D", "E"];
        let fetcher = ScriptedFetcher::new(Duration::ZERO, &prices(&symbols));
        let store = Arc::new(MemoryStore::new());
        let cache = cache(options(&symbols), &fetcher, &store);

        cache.refresh_cycle().await;
        let before = cache.get_state().snapshot.clone().expect("first snapshot");

        fetcher.set("C", Reply::Fail(FetchErrorKind::RateLimited));
        let started = Instant::now();
        let outcome = cache.refresh_cycle().await;
        let elapsed = Instant::now() - started;
        assert_eq!(
            outcome,
            CycleOutcome::Aborted {
                kind: FetchErrorKind::RateLimited,
                fetched: 2
            }
        );

        // Two gaps between A, B and C; none after the abort.
        assert!(elapsed >= Duration::from_millis(5_000));
        assert!(elapsed < Duration::from_millis(5_100));

        let calls = fetcher.calls();
        assert_eq!(calls.len(), 8);
        assert_eq!(&calls[5..], &["A", "B", "C"]);

        let state = cache.get_state();
        let after = state.snapshot.as_ref().expect("snapshot kept");
        assert!(Arc::ptr_eq(&before, after));
        assert_eq!(state.last_error, Some(ErrorKind::RateLimited));
        assert!(!state.no_data);
        assert!(!state.is_refreshing);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_refresh_runs_once() {
        let symbols = ["A", "B", "C"];
        let fetcher = ScriptedFetcher::new(Duration::from_secs(1), &prices(&symbols));
        let store = Arc::new(MemoryStore::new());
        let cache = cache(options(&symbols), &fetcher, &store);

        let (first, second) = tokio::join!(cache.refresh_cycle(), cache.refresh_cycle());
        let outcomes = [first, second];
        assert_eq!(
            outcomes
                .iter()
                .filter(|o| **o == CycleOutcome::Skipped)
                .count(),
            1
        );
        assert!(outcomes
            .iter()
            .any(|o| matches!(o, CycleOutcome::Committed { entries: 3, .. })));
        assert_eq!(fetcher.calls().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn fresh_snapshot_is_served_before_warm_refresh() {
        let fetcher = ScriptedFetcher::new(Duration::from_secs(10), &prices(&["A"]));
        let store = Arc::new(MemoryStore::new());
        seed(&store, chrono::Duration::minutes(1));
        let cache = cache(options(&["A"]), &fetcher, &store);

        assert_eq!(cache.initialize(), Startup::CacheHit);
        let state = cache.get_state();
        assert_eq!(state.snapshot.as_ref().map(|s| s.len()), Some(1));
        assert!(fetcher.calls().is_empty());

        sleep(Duration::from_millis(999)).await;
        assert!(fetcher.calls().is_empty());

        sleep(Duration::from_millis(2)).await;
        assert_eq!(fetcher.calls(), vec!["A"]);
        assert!(cache.get_state().is_refreshing);
        cache.dispose();
    }

    #[tokio::test(start_paused = true)]
    async fn stale_snapshot_is_not_served() {
        let fetcher = ScriptedFetcher::new(Duration::ZERO, &prices(&["A"]));
        let store = Arc::new(MemoryStore::new());
        seed(&store, chrono::Duration::minutes(10));
        let cache = cache(options(&["A"]), &fetcher, &store);

        let startup = cache.initialize();
        assert_eq!(startup, Startup::Stale);
        assert_eq!(
            startup.first_refresh_delay(cache.options()),
            Duration::from_millis(500)
        );
        assert!(cache.get_state().snapshot.is_none());
        assert!(cache.get_state().is_loading());

        sleep(Duration::from_millis(700)).await;
        assert_eq!(fetcher.calls(), vec!["A"]);
        cache.dispose();
    }

    #[tokio::test(start_paused = true)]
    async fn corrupt_snapshot_counts_as_miss() {
        let fetcher = ScriptedFetcher::new(Duration::ZERO, &prices(&["A"]));
        let store = Arc::new(MemoryStore::new());
        store.insert_raw(KEY, "{not json").unwrap();
        let cache = cache(options(&["A"]), &fetcher, &store);

        assert_eq!(cache.initialize(), Startup::Miss);
        assert!(cache.get_state().snapshot.is_none());
        cache.dispose();
    }

    #[tokio::test(start_paused = true)]
    async fn dispose_cancels_scheduled_refreshes() {
        let fetcher = ScriptedFetcher::new(Duration::ZERO, &prices(&["A"]));
        let store = Arc::new(MemoryStore::new());
        let cache = cache(
            options(&["A"]).with_refresh_interval(Duration::from_secs(60)),
            &fetcher,
            &store,
        );

        assert_eq!(cache.initialize(), Startup::Miss);
        cache.dispose();
        cache.dispose();
        assert!(cache.is_disposed());

        sleep(Duration::from_secs(600)).await;
        assert!(fetcher.calls().is_empty());
        assert_eq!(cache.refresh_cycle().await, CycleOutcome::Disposed);
    }

    #[tokio::test(start_paused = true)]
    async fn cycle_finishing_after_dispose_is_discarded() {
        let symbols = ["A", "B"];
        let fetcher = ScriptedFetcher::new(Duration::from_secs(1), &prices(&symbols));
        let store = Arc::new(MemoryStore::new());
        let cache = cache(options(&symbols), &fetcher, &store);

        let running = tokio::spawn({
            let cache = cache.clone();
            async move { cache.refresh_cycle().await }
        });
        sleep(Duration::from_millis(10)).await;
        assert!(cache.get_state().is_refreshing);

        cache.dispose();
        assert_eq!(running.await.unwrap(), CycleOutcome::Discarded);

        let state = cache.get_state();
        assert!(state.snapshot.is_none());
        assert!(!state.is_refreshing);
        assert_eq!(state.last_error, None);
        assert!(store.load(KEY).unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn dispose_during_last_fetch_commits_nothing() {
        let symbols = ["A", "B"];
        let fetcher = ScriptedFetcher::new(Duration::ZERO, &prices(&symbols));
        let store = Arc::new(MemoryStore::new());
        let cache = cache(
            options(&symbols).with_inter_request_delay(Duration::ZERO),
            &fetcher,
            &store,
        );
        fetcher.dispose_during("B", &cache);

        assert_eq!(cache.refresh_cycle().await, CycleOutcome::Discarded);
        assert!(cache.is_disposed());

        let state = cache.get_state();
        assert!(state.snapshot.is_none());
        assert!(!state.is_refreshing);
        assert_eq!(state.last_error, None);
        assert!(store.load(KEY).unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn persist_failure_still_commits() {
        let fetcher = ScriptedFetcher::new(Duration::ZERO, &prices(&["A"]));
        let cache = QuoteCache::new(options(&["A"]), fetcher.clone(), Arc::new(BrokenStore));

        assert_eq!(
            cache.refresh_cycle().await,
            CycleOutcome::Committed {
                entries: 1,
                persisted: false
            }
        );
        let state = cache.get_state();
        assert!(state.snapshot.is_some());
        assert_eq!(state.last_error, None);
    }

    #[tokio::test(start_paused = true)]
    async fn all_symbols_missing_reports_no_data() {
        let fetcher = ScriptedFetcher::new(Duration::ZERO, &[]);
        let store = Arc::new(MemoryStore::new());
        let cache = cache(options(&["X", "Y"]), &fetcher, &store);

        assert_eq!(cache.refresh_cycle().await, CycleOutcome::Empty);
        let state = cache.get_state();
        assert!(state.no_data);
        assert_eq!(state.last_error, Some(ErrorKind::NoDataAvailable));
        assert!(state.snapshot.is_none());
        assert!(store.load(KEY).unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn empty_cycle_keeps_existing_snapshot_quiet() {
        let fetcher = ScriptedFetcher::new(Duration::ZERO, &prices(&["A"]));
        let store = Arc::new(MemoryStore::new());
        let cache = cache(options(&["A"]), &fetcher, &store);

        cache.refresh_cycle().await;
        fetcher.set("A", Reply::Fail(FetchErrorKind::Network));
        assert_eq!(cache.refresh_cycle().await, CycleOutcome::Empty);

        let state = cache.get_state();
        assert!(state.snapshot.is_some());
        assert!(!state.no_data);
        assert_eq!(state.last_error, None);
    }

    #[tokio::test(start_paused = true)]
    async fn credential_failure_without_snapshot_sets_no_data() {
        let fetcher = ScriptedFetcher::new(
            Duration::ZERO,
            &[("A", Reply::Fail(FetchErrorKind::InvalidCredential))],
        );
        let store = Arc::new(MemoryStore::new());
        let cache = cache(options(&["A", "B"]), &fetcher, &store);

        assert_eq!(
            cache.refresh_cycle().await,
            CycleOutcome::Aborted {
                kind: FetchErrorKind::InvalidCredential,
                fetched: 0
            }
        );
        let state = cache.get_state();
        assert!(state.no_data);
        assert_eq!(state.last_error, Some(ErrorKind::InvalidCredential));
        assert_eq!(fetcher.calls(), vec!["A"]);
    }

    #[tokio::test(start_paused = true)]
    async fn requests_are_spaced_by_the_inter_request_delay() {
        let symbols = ["A", "B", "C"];
        let fetcher = ScriptedFetcher::new(Duration::ZERO, &prices(&symbols));
        let store = Arc::new(MemoryStore::new());
        let cache = cache(options(&symbols), &fetcher, &store);

        let started = Instant::now();
        cache.refresh_cycle().await;
        let elapsed = Instant::now() - started;

        let times = fetcher.call_times();
        for pair in times.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(2_500));
        }
        assert!(elapsed >= Duration::from_millis(5_000));
        assert!(elapsed < Duration::from_millis(5_100));
    }

    #[tokio::test(start_paused = true)]
    async fn periodic_refresh_follows_the_interval() {
        let fetcher = ScriptedFetcher::new(Duration::ZERO, &prices(&["A"]));
        let store = Arc::new(MemoryStore::new());
        let cache = cache(
            options(&["A"]).with_refresh_interval(Duration::from_secs(60)),
            &fetcher,
            &store,
        );

        cache.initialize();
        sleep(Duration::from_secs(125)).await;
        assert_eq!(fetcher.calls().len(), 3);
        cache.dispose();
    }

    #[tokio::test(start_paused = true)]
    async fn subscribers_see_refresh_progress() {
        let fetcher = ScriptedFetcher::new(Duration::from_secs(1), &prices(&["A"]));
        let store = Arc::new(MemoryStore::new());
        let cache = cache(options(&["A"]), &fetcher, &store);
        let mut updates = cache.subscribe();
        assert!(updates.borrow_and_update().is_loading());

        let running = tokio::spawn({
            let cache = cache.clone();
            async move { cache.refresh_cycle().await }
        });

        updates.changed().await.unwrap();
        assert!(updates.borrow_and_update().is_refreshing);

        running.await.unwrap();
        updates.changed().await.unwrap();
        let state = updates.borrow_and_update().clone();
        assert!(!state.is_refreshing);
        assert!(state.snapshot.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn display_names_label_quotes() {
        let fetcher = ScriptedFetcher::new(Duration::ZERO, &prices(&["AAPL"]));
        let store = Arc::new(MemoryStore::new());
        let cache = cache(
            options(&["AAPL"]).with_display_name("AAPL", "Apple Inc."),
            &fetcher,
            &store,
        );

        cache.refresh_cycle().await;
        let state = cache.get_state();
        let quote = state.snapshot.as_ref().unwrap().get("AAPL").cloned().unwrap();
        assert_eq!(quote.display_name(), "Apple Inc.");
    }
}
