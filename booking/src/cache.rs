//! Staleness-aware query cache
//!
//! Holds the last good value per key and decides when to go back to the
//! backend. One cache instance serves one [`Query`].
//!
//! ## Features
//!
//! - **Stale-while-revalidate**: a stale read returns the cached value at once
//!   and refreshes it in the background
//! - **Status-driven polling**: while someone watches a key, the cache refetches
//!   it on the interval the query picks for the current value; settled values
//!   are never polled
//! - **Ordered updates**: every fetch gets a per-key sequence number and a
//!   response older than the last applied one is discarded
//! - **Last-known-good**: a failed refetch records the error next to the value
//!   instead of evicting it

use async_trait::async_trait;
use futures::Stream;
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use std::time::Duration;
use tixwatch_api::ApiError;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// How to load and schedule one kind of resource
#[async_trait]
pub trait Query: Send + Sync + 'static {
    /// Cache key
    type Key: Clone + Eq + Hash + Debug + Send + Sync + 'static;
    /// Cached value
    type Value: Clone + Send + Sync + 'static;

    /// Label used in logs and metrics
    const NAME: &'static str;

    /// Load the current value from the backend
    async fn fetch(&self, key: &Self::Key) -> Result<Self::Value, ApiError>;

    /// Settled values are served from cache until invalidated and never polled
    fn is_settled(&self, _value: &Self::Value) -> bool {
        false
    }

    /// Poll interval while the key is watched, `None` to not poll
    fn poll_interval(&self, _value: &Self::Value) -> Option<Duration> {
        None
    }
}

/// How long a cached value may be served without revalidation
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StaleTime {
    /// The window the cache was built with
    #[default]
    CacheDefault,
    /// An explicit window
    After(Duration),
    /// Serve the cached value until invalidated
    Never,
}

/// Per-call read options
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FetchOptions {
    /// Staleness window for this read
    pub stale_time: StaleTime,
}

impl FetchOptions {
    /// Treat values older than `window` as stale
    #[must_use]
    pub const fn stale_after(window: Duration) -> Self {
        Self {
            stale_time: StaleTime::After(window),
        }
    }

    /// Never treat the cached value as stale
    #[must_use]
    pub const fn never_stale() -> Self {
        Self {
            stale_time: StaleTime::Never,
        }
    }
}

/// Read-only view of one cache entry
#[derive(Clone, Debug, PartialEq)]
pub struct CacheSnapshot<V> {
    /// Last successfully fetched value
    pub value: Option<V>,
    /// When `value` was fetched
    pub fetched_at: Option<Instant>,
    /// A fetch for this key is in flight
    pub is_revalidating: bool,
    /// Error of the most recent failed fetch, cleared by the next success
    pub error: Option<ApiError>,
}

impl<V> CacheSnapshot<V> {
    /// Snapshot of a key that was never fetched
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            value: None,
            fetched_at: None,
            is_revalidating: false,
            error: None,
        }
    }

    /// Snapshot holding `value`, as if fetched just now
    #[must_use]
    pub fn of(value: V) -> Self {
        Self {
            value: Some(value),
            fetched_at: Some(Instant::now()),
            is_revalidating: false,
            error: None,
        }
    }

    /// Snapshot of a failed fetch
    #[must_use]
    pub const fn failed(value: Option<V>, error: ApiError) -> Self {
        Self {
            value,
            fetched_at: None,
            is_revalidating: false,
            error: Some(error),
        }
    }

    /// No value and no error yet
    #[must_use]
    pub const fn is_loading(&self) -> bool {
        self.value.is_none() && self.error.is_none()
    }
}

impl<V> Default for CacheSnapshot<V> {
    fn default() -> Self {
        Self::empty()
    }
}

struct Slot<V> {
    value: Option<V>,
    fetched_at: Option<Instant>,
    invalidated: bool,
    in_flight: usize,
    issued: u64,
    applied: u64,
    error: Option<ApiError>,
    subscribers: HashMap<u64, mpsc::UnboundedSender<CacheSnapshot<V>>>,
    poller: Option<JoinHandle<()>>,
}

impl<V> Default for Slot<V> {
    fn default() -> Self {
        Self {
            value: None,
            fetched_at: None,
            invalidated: false,
            in_flight: 0,
            issued: 0,
            applied: 0,
            error: None,
            subscribers: HashMap::new(),
            poller: None,
        }
    }
}

impl<V: Clone> Slot<V> {
    fn snapshot(&self) -> CacheSnapshot<V> {
        CacheSnapshot {
            value: self.value.clone(),
            fetched_at: self.fetched_at,
            is_revalidating: self.in_flight > 0,
            error: self.error.clone(),
        }
    }

    fn publish(&mut self) {
        if self.subscribers.is_empty() {
            return;
        }
        let snapshot = self.snapshot();
        self.subscribers
            .retain(|_, subscriber| subscriber.send(snapshot.clone()).is_ok());
    }

    fn is_stale(&self, window: Option<Duration>) -> bool {
        match (self.fetched_at, window) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(fetched_at), Some(window)) => fetched_at.elapsed() >= window,
        }
    }

    fn is_polling(&self) -> bool {
        self.poller.as_ref().is_some_and(|poller| !poller.is_finished())
    }

    /// Nothing cached, nobody watching, nothing in flight
    fn is_vacant(&self) -> bool {
        self.value.is_none()
            && self.subscribers.is_empty()
            && self.in_flight == 0
            && !self.is_polling()
    }
}

/// Drop the slot for `key` if it holds nothing worth keeping
fn release_vacant<K: Hash + Eq, V: Clone>(slots: &mut Slots<K, V>, key: &K) {
    if slots.get(key).is_some_and(Slot::is_vacant) {
        slots.remove(key);
    }
}

type Slots<K, V> = HashMap<K, Slot<V>>;

struct Inner<Q: Query> {
    query: Q,
    stale_time: Duration,
    slots: Mutex<Slots<Q::Key, Q::Value>>,
    next_subscriber: AtomicU64,
}

/// Keyed cache over a [`Query`]
///
/// Cheap to clone; clones share entries, pollers and subscribers.
pub struct QueryCache<Q: Query> {
    inner: Arc<Inner<Q>>,
}

impl<Q: Query> Clone for QueryCache<Q> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Decrements the in-flight count if a fetch is dropped before it completes
struct InFlight<'a, Q: Query> {
    cache: &'a QueryCache<Q>,
    key: &'a Q::Key,
    armed: bool,
}

impl<Q: Query> Drop for InFlight<'_, Q> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut slots = self.cache.lock();
        if let Some(slot) = slots.get_mut(self.key) {
            slot.in_flight = slot.in_flight.saturating_sub(1);
            if slot.in_flight == 0 {
                slot.publish();
            }
        }
        release_vacant(&mut slots, self.key);
    }
}

impl<Q: Query> QueryCache<Q> {
    /// Create a cache serving reads younger than `stale_time` without a fetch
    #[must_use]
    pub fn new(query: Q, stale_time: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                query,
                stale_time,
                slots: Mutex::new(HashMap::new()),
                next_subscriber: AtomicU64::new(0),
            }),
        }
    }

    /// The query this cache serves
    #[must_use]
    pub fn query(&self) -> &Q {
        &self.inner.query
    }

    fn lock(&self) -> MutexGuard<'_, Slots<Q::Key, Q::Value>> {
        self.inner.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn window(&self, stale_time: StaleTime) -> Option<Duration> {
        match stale_time {
            StaleTime::CacheDefault => Some(self.inner.stale_time),
            StaleTime::After(window) => Some(window),
            StaleTime::Never => None,
        }
    }

    /// Current state of `key` without touching the network
    #[must_use]
    pub fn peek(&self, key: &Q::Key) -> CacheSnapshot<Q::Value> {
        self.lock()
            .get(key)
            .map_or_else(CacheSnapshot::empty, Slot::snapshot)
    }

    /// Read `key`, fetching only when needed
    ///
    /// - no value yet, or invalidated: waits for a fresh fetch
    /// - value within the stale window, or settled: returned as is
    /// - stale value: returned as is, with a background refetch unless one
    ///   is already running
    ///
    /// # Errors
    ///
    /// Returns the fetch error when a fetch was needed and failed.
    pub async fn get(
        &self,
        key: &Q::Key,
        options: FetchOptions,
    ) -> Result<Q::Value, ApiError> {
        let window = self.window(options.stale_time);
        let cached = {
            let mut slots = self.lock();
            let slot = slots.entry(key.clone()).or_default();
            match &slot.value {
                Some(value) if !slot.invalidated => {
                    let fresh = self.inner.query.is_settled(value) || !slot.is_stale(window);
                    let revalidate = !fresh && slot.in_flight == 0;
                    Some((value.clone(), fresh, revalidate))
                },
                _ => None,
            }
        };

        match cached {
            Some((value, true, _)) => {
                metrics::counter!("cache.hits", "query" => Q::NAME).increment(1);
                Ok(value)
            },
            Some((value, false, revalidate)) => {
                metrics::counter!("cache.stale_hits", "query" => Q::NAME).increment(1);
                if revalidate {
                    self.spawn_refetch(key.clone());
                }
                Ok(value)
            },
            None => {
                metrics::counter!("cache.misses", "query" => Q::NAME).increment(1);
                self.refetch(key).await
            },
        }
    }

    /// Fetch `key` now, regardless of staleness
    ///
    /// The result is applied only if no newer fetch has been applied in the
    /// meantime. A discarded success returns the newer cached value.
    ///
    /// # Errors
    ///
    /// Returns the fetch error. The cached value, if any, is kept.
    #[tracing::instrument(skip(self), fields(query = Q::NAME))]
    pub async fn refetch(&self, key: &Q::Key) -> Result<Q::Value, ApiError> {
        let seq = {
            let mut slots = self.lock();
            let slot = slots.entry(key.clone()).or_default();
            slot.issued += 1;
            slot.in_flight += 1;
            if slot.in_flight == 1 {
                slot.publish();
            }
            slot.issued
        };
        let mut in_flight = InFlight {
            cache: self,
            key,
            armed: true,
        };

        metrics::counter!("cache.fetches", "query" => Q::NAME).increment(1);
        tracing::trace!(seq, "Fetching");
        let result = self.inner.query.fetch(key).await;
        in_flight.armed = false;

        let mut slots = self.lock();
        let slot = slots.entry(key.clone()).or_default();
        slot.in_flight = slot.in_flight.saturating_sub(1);

        if seq <= slot.applied {
            metrics::counter!("cache.discarded", "query" => Q::NAME).increment(1);
            tracing::debug!(seq, applied = slot.applied, "Discarding out-of-order response");
            if slot.in_flight == 0 {
                slot.publish();
            }
            let result = match (result, &slot.value) {
                (Ok(_), Some(newer)) => Ok(newer.clone()),
                (result, _) => result,
            };
            release_vacant(&mut slots, key);
            return result;
        }

        match result {
            Ok(value) => {
                slot.applied = seq;
                slot.value = Some(value.clone());
                slot.fetched_at = Some(Instant::now());
                slot.invalidated = false;
                slot.error = None;
                slot.publish();
                self.ensure_poller(key, slot);
                Ok(value)
            },
            Err(error) => {
                metrics::counter!("cache.fetch_errors", "query" => Q::NAME).increment(1);
                tracing::debug!(seq, %error, "Fetch failed, keeping last good value");
                slot.error = Some(error.clone());
                slot.publish();
                release_vacant(&mut slots, key);
                Err(error)
            },
        }
    }

    /// Mark `key` as needing a fresh fetch
    ///
    /// The next [`get`](Self::get) waits for the network. If the key is being
    /// watched the refetch starts right away.
    pub fn invalidate(&self, key: &Q::Key) {
        let watched = {
            let mut slots = self.lock();
            slots.get_mut(key).is_some_and(|slot| {
                slot.invalidated = true;
                !slot.subscribers.is_empty()
            })
        };
        metrics::counter!("cache.invalidations", "query" => Q::NAME).increment(1);
        tracing::debug!(query = Q::NAME, ?key, watched, "Invalidated");
        if watched {
            self.spawn_refetch(key.clone());
        }
    }

    /// Invalidate every key
    pub fn invalidate_all(&self) {
        let watched: Vec<Q::Key> = {
            let mut slots = self.lock();
            slots
                .iter_mut()
                .filter_map(|(key, slot)| {
                    slot.invalidated = true;
                    (!slot.subscribers.is_empty()).then(|| key.clone())
                })
                .collect()
        };
        metrics::counter!("cache.invalidations", "query" => Q::NAME).increment(1);
        for key in watched {
            self.spawn_refetch(key);
        }
    }

    /// Store a value obtained elsewhere, as if it had just been fetched
    ///
    /// Counts as the newest response: fetches issued earlier are discarded
    /// when they complete.
    pub fn prime(&self, key: Q::Key, value: Q::Value) {
        let mut slots = self.lock();
        let slot = slots.entry(key.clone()).or_default();
        slot.issued += 1;
        slot.applied = slot.issued;
        slot.value = Some(value);
        slot.fetched_at = Some(Instant::now());
        slot.invalidated = false;
        slot.error = None;
        slot.publish();
        self.ensure_poller(&key, slot);
    }

    /// Subscribe to `key`
    ///
    /// The stream yields the current snapshot first, then one snapshot per
    /// change, in the order changes were applied. While at least one
    /// subscription is alive and the value is unsettled, the key is polled.
    /// Dropping the last subscription stops polling.
    #[must_use]
    pub fn watch(&self, key: &Q::Key) -> Subscription<Q> {
        let id = self.inner.next_subscriber.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::unbounded_channel();
        {
            let mut slots = self.lock();
            let slot = slots.entry(key.clone()).or_default();
            let _ = sender.send(slot.snapshot());
            slot.subscribers.insert(id, sender);
            self.ensure_poller(key, slot);
        }
        tracing::debug!(query = Q::NAME, ?key, subscriber = id, "Subscribed");
        Subscription {
            cache: self.clone(),
            key: key.clone(),
            id,
            receiver,
        }
    }

    /// Number of live subscriptions on `key`
    #[must_use]
    pub fn subscriber_count(&self, key: &Q::Key) -> usize {
        self.lock().get(key).map_or(0, |slot| slot.subscribers.len())
    }

    /// Number of keys the cache currently tracks
    ///
    /// Keys without a value, subscribers or fetch in flight are dropped, so
    /// this grows only with the values actually cached.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the cache tracks no key at all
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Whether a poller is running for `key`
    #[must_use]
    pub fn is_polling(&self, key: &Q::Key) -> bool {
        self.lock().get(key).is_some_and(Slot::is_polling)
    }

    fn unsubscribe(&self, key: &Q::Key, id: u64) {
        let mut slots = self.lock();
        let Some(slot) = slots.get_mut(key) else {
            return;
        };
        slot.subscribers.remove(&id);
        if slot.subscribers.is_empty() {
            if let Some(poller) = slot.poller.take() {
                poller.abort();
                tracing::debug!(query = Q::NAME, ?key, "Last subscriber left, polling stopped");
            }
        }
        release_vacant(&mut slots, key);
    }

    fn spawn_refetch(&self, key: Q::Key) {
        let cache = self.clone();
        tokio::spawn(async move {
            if let Err(error) = cache.refetch(&key).await {
                tracing::debug!(query = Q::NAME, ?key, %error, "Background revalidation failed");
            }
        });
    }

    fn poll_interval(&self, slot: &Slot<Q::Value>) -> Option<Duration> {
        if slot.subscribers.is_empty() {
            return None;
        }
        slot.value
            .as_ref()
            .filter(|value| !self.inner.query.is_settled(value))
            .and_then(|value| self.inner.query.poll_interval(value))
    }

    fn ensure_poller(&self, key: &Q::Key, slot: &mut Slot<Q::Value>) {
        if slot.is_polling() || self.poll_interval(slot).is_none() {
            return;
        }
        tracing::debug!(query = Q::NAME, ?key, "Polling started");
        let cache = self.clone();
        let key = key.clone();
        slot.poller = Some(tokio::spawn(cache.poll(key)));
    }

    /// Interval until the next poll of `key`, clearing the poller handle
    /// when polling should stop
    fn next_poll(&self, key: &Q::Key) -> Option<Duration> {
        let mut slots = self.lock();
        let slot = slots.get_mut(key)?;
        let interval = self.poll_interval(slot);
        if interval.is_none() {
            slot.poller = None;
            tracing::debug!(query = Q::NAME, ?key, "Value settled, polling stopped");
        }
        interval
    }

    async fn poll(self, key: Q::Key) {
        while let Some(interval) = self.next_poll(&key) {
            tokio::time::sleep(interval).await;
            // The value may have settled while sleeping.
            if self.next_poll(&key).is_none() {
                return;
            }
            metrics::counter!("cache.polls", "query" => Q::NAME).increment(1);
            if let Err(error) = self.refetch(&key).await {
                tracing::debug!(query = Q::NAME, ?key, %error, "Poll failed");
            }
        }
    }
}

/// Live feed of snapshots for one key, see [`QueryCache::watch`]
pub struct Subscription<Q: Query> {
    cache: QueryCache<Q>,
    key: Q::Key,
    id: u64,
    receiver: mpsc::UnboundedReceiver<CacheSnapshot<Q::Value>>,
}

// No field is structurally pinned.
impl<Q: Query> Unpin for Subscription<Q> {}

impl<Q: Query> Stream for Subscription<Q> {
    type Item = CacheSnapshot<Q::Value>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

impl<Q: Query> Drop for Subscription<Q> {
    fn drop(&mut self) {
        self.cache.unsubscribe(&self.key, self.id);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;

    /// Answers from a queue of `(value, delay)`; counts calls
    #[derive(Default)]
    struct Scripted {
        answers: Mutex<VecDeque<(Result<u32, ApiError>, Duration)>>,
        calls: AtomicUsize,
        poll_every: Option<Duration>,
    }

    impl Scripted {
        fn answering(answers: Vec<(Result<u32, ApiError>, Duration)>) -> Self {
            Self {
                answers: Mutex::new(answers.into()),
                ..Self::default()
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Query for Scripted {
        type Key = &'static str;
        type Value = u32;

        const NAME: &'static str = "scripted";

        async fn fetch(&self, _key: &Self::Key) -> Result<u32, ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let (result, delay) = {
                let mut answers = self.answers.lock().unwrap();
                if answers.len() > 1 {
                    answers.pop_front().unwrap()
                } else {
                    answers.front().cloned().unwrap()
                }
            };
            tokio::time::sleep(delay).await;
            result
        }

        // Even values are settled.
        fn is_settled(&self, value: &u32) -> bool {
            value % 2 == 0
        }

        fn poll_interval(&self, _value: &u32) -> Option<Duration> {
            self.poll_every
        }
    }

    fn ok(value: u32) -> (Result<u32, ApiError>, Duration) {
        (Ok(value), Duration::ZERO)
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_within_stale_window_hits_cache() {
        let cache = QueryCache::new(Scripted::answering(vec![ok(1)]), Duration::from_secs(10));

        assert_eq!(cache.get(&"k", FetchOptions::default()).await.unwrap(), 1);
        assert_eq!(cache.get(&"k", FetchOptions::default()).await.unwrap(), 1);
        assert_eq!(cache.query().calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_get_returns_cached_and_revalidates_once() {
        let cache = QueryCache::new(
            Scripted::answering(vec![ok(1), (Ok(3), Duration::from_secs(2))]),
            Duration::ZERO,
        );
        cache.get(&"k", FetchOptions::default()).await.unwrap();

        // Both reads see the stale value; only the first starts a refetch.
        assert_eq!(cache.get(&"k", FetchOptions::default()).await.unwrap(), 1);
        tokio::task::yield_now().await;
        assert!(cache.peek(&"k").is_revalidating);
        assert_eq!(cache.get(&"k", FetchOptions::default()).await.unwrap(), 1);

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(cache.peek(&"k").value, Some(3));
        assert_eq!(cache.query().calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_settled_value_is_never_revalidated_on_read() {
        let cache = QueryCache::new(Scripted::answering(vec![ok(2)]), Duration::ZERO);
        cache.get(&"k", FetchOptions::default()).await.unwrap();
        tokio::time::sleep(Duration::from_secs(60)).await;
        cache.get(&"k", FetchOptions::default()).await.unwrap();
        tokio::task::yield_now().await;
        assert_eq!(cache.query().calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_stale_option_ignores_age() {
        let cache = QueryCache::new(Scripted::answering(vec![ok(1)]), Duration::ZERO);
        cache.get(&"k", FetchOptions::never_stale()).await.unwrap();
        tokio::time::sleep(Duration::from_secs(3600)).await;
        cache.get(&"k", FetchOptions::never_stale()).await.unwrap();
        tokio::task::yield_now().await;
        assert_eq!(cache.query().calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidated_get_waits_for_fresh_value() {
        let cache = QueryCache::new(Scripted::answering(vec![ok(2), ok(4)]), Duration::ZERO);
        assert_eq!(cache.get(&"k", FetchOptions::default()).await.unwrap(), 2);

        cache.invalidate(&"k");
        assert_eq!(cache.get(&"k", FetchOptions::default()).await.unwrap(), 4);
        assert_eq!(cache.query().calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_older_response_never_overwrites_newer() {
        let cache = QueryCache::new(
            Scripted::answering(vec![(Ok(1), Duration::from_secs(5)), (Ok(3), Duration::from_secs(1))]),
            Duration::ZERO,
        );

        let slow = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.refetch(&"k").await })
        };
        tokio::task::yield_now().await;
        let fast = cache.refetch(&"k").await.unwrap();
        assert_eq!(fast, 3);

        // The first fetch completes last and is discarded.
        assert_eq!(slow.await.unwrap().unwrap(), 3);
        assert_eq!(cache.peek(&"k").value, Some(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_refetch_keeps_last_good_value() {
        let cache = QueryCache::new(
            Scripted::answering(vec![ok(1), (Err(ApiError::Network("down".into())), Duration::ZERO)]),
            Duration::ZERO,
        );
        cache.get(&"k", FetchOptions::default()).await.unwrap();
        assert!(cache.refetch(&"k").await.is_err());

        let snapshot = cache.peek(&"k");
        assert_eq!(snapshot.value, Some(1));
        assert_eq!(snapshot.error, Some(ApiError::Network("down".into())));
    }

    #[tokio::test(start_paused = true)]
    async fn test_keys_without_values_are_not_retained() {
        let cache = QueryCache::new(
            Scripted::answering(vec![(Err(ApiError::NotFound("gone".into())), Duration::ZERO)]),
            Duration::ZERO,
        );

        for key in ["a", "b", "c"] {
            assert!(cache.get(&key, FetchOptions::default()).await.is_err());
        }
        assert!(cache.is_empty());

        let updates = cache.watch(&"d");
        assert_eq!(cache.len(), 1);
        drop(updates);
        assert!(cache.is_empty());

        cache.prime("e", 5);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_prime_discards_fetch_issued_before_it() {
        let cache = QueryCache::new(
            Scripted::answering(vec![(Ok(1), Duration::from_secs(5))]),
            Duration::ZERO,
        );
        let pending = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.refetch(&"k").await })
        };
        tokio::task::yield_now().await;
        cache.prime("k", 7);

        assert_eq!(pending.await.unwrap().unwrap(), 7);
        assert_eq!(cache.peek(&"k").value, Some(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_watch_polls_until_settled_and_stops_on_drop() {
        let query = Scripted {
            poll_every: Some(Duration::from_secs(5)),
            ..Scripted::answering(vec![ok(1), ok(3), ok(4)])
        };
        let cache = QueryCache::new(query, Duration::ZERO);
        cache.get(&"k", FetchOptions::default()).await.unwrap();

        let mut updates = cache.watch(&"k");
        assert_eq!(updates.next().await.unwrap().value, Some(1));
        assert!(cache.is_polling(&"k"));

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(cache.query().calls(), 3);
        assert_eq!(cache.peek(&"k").value, Some(4));

        // 4 is settled: no further polls.
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(cache.query().calls(), 3);
        assert!(!cache.is_polling(&"k"));

        drop(updates);
        assert_eq!(cache.subscriber_count(&"k"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_last_subscription_stops_polling() {
        let query = Scripted {
            poll_every: Some(Duration::from_secs(5)),
            ..Scripted::answering(vec![ok(1)])
        };
        let cache = QueryCache::new(query, Duration::ZERO);
        cache.get(&"k", FetchOptions::default()).await.unwrap();

        let first = cache.watch(&"k");
        let second = cache.watch(&"k");
        drop(first);
        assert!(cache.is_polling(&"k"));
        drop(second);
        assert!(!cache.is_polling(&"k"));

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(cache.query().calls(), 1);
    }

    #[test]
    fn test_empty_snapshot_is_loading() {
        let snapshot = CacheSnapshot::<u32>::default();
        assert!(snapshot.is_loading());
        assert!(!CacheSnapshot::failed(None::<u32>, ApiError::Network("x".into())).is_loading());
    }
}
