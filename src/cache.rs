//! Single-flight, reference-counted async cache.
//!
//! At most one lookup runs per key. The first caller to miss publishes a
//! pending entry before the lookup starts; every concurrent caller for the
//! same key waits on that entry and receives the identical outcome, failures
//! included.
//!
//! Each successful [`SingleFlightCache::get`] returns a [`CacheRef`] lease.
//! The entry lives as long as any lease does; when the last one drops the
//! entry is evicted and the release hook runs with the final outcome, so the
//! next `get` recomputes.
//!
//! # Example
//!
//! ```
//! use typhoon::cache::SingleFlightCache;
//!
//! # tokio_test_block_on(async {
//! let cache = SingleFlightCache::new(|id: u32| async move { Ok::<_, String>(id * 2) });
//!
//! let doubled = cache.get(21).await.unwrap();
//! assert_eq!(*doubled, 42);
//! assert_eq!(cache.owners(&21), 1);
//!
//! drop(doubled);
//! assert!(cache.is_empty());
//! # });
//! # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;

use crate::BoxFuture;

type Outcome<V, E> = std::result::Result<Arc<V>, E>;

type Lookup<K, V, E> = Arc<dyn Fn(K) -> BoxFuture<'static, std::result::Result<V, E>> + Send + Sync>;

type ReleaseHook<K, V, E> = Arc<dyn Fn(&K, std::result::Result<&V, &E>) + Send + Sync>;

enum Slot<V, E> {
    /// Lookup in flight; resolves to `Some(outcome)`. A closed channel means
    /// the initiator was cancelled.
    Pending(watch::Receiver<Option<Outcome<V, E>>>),
    Ready(Outcome<V, E>),
}

struct Entry<V, E> {
    /// Distinguishes this entry from a later one under the same key.
    id: u64,
    owners: usize,
    slot: Slot<V, E>,
}

struct Shared<K, V, E> {
    entries: Mutex<HashMap<K, Entry<V, E>>>,
    next_id: AtomicU64,
    lookup: Lookup<K, V, E>,
    on_release: Option<ReleaseHook<K, V, E>>,
}

impl<K, V, E> Shared<K, V, E>
where
    K: Eq + Hash,
{
    // Never held across an await or a user callback.
    fn lock(&self) -> MutexGuard<'_, HashMap<K, Entry<V, E>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add an owner to a live entry.
    fn retain(&self, key: &K, id: u64) {
        if let Some(entry) = self.lock().get_mut(key) {
            if entry.id == id {
                entry.owners += 1;
            }
        }
    }

    /// Drop an owner; evict and run the release hook at zero.
    fn release(&self, key: &K, id: u64) {
        let evicted = {
            let mut entries = self.lock();
            let remaining = match entries.get_mut(key) {
                Some(entry) if entry.id == id => {
                    entry.owners = entry.owners.saturating_sub(1);
                    entry.owners
                }
                // Entry already replaced or removed by a cancelled initiator.
                _ => return,
            };
            if remaining == 0 {
                entries.remove(key)
            } else {
                None
            }
        };

        let Some(entry) = evicted else { return };
        tracing::debug!(entry = entry.id, "evicting cache entry");

        if let (Slot::Ready(outcome), Some(hook)) = (&entry.slot, &self.on_release) {
            hook(key, outcome.as_ref().map(|value| &**value));
        }
    }

    /// Store the outcome of a finished lookup.
    fn complete(&self, key: &K, id: u64, outcome: &Outcome<V, E>)
    where
        E: Clone,
    {
        if let Some(entry) = self.lock().get_mut(key) {
            if entry.id == id {
                entry.slot = Slot::Ready(outcome.clone());
            }
        }
    }

    /// Drop a still-pending entry whose initiator went away.
    fn abandon(&self, key: &K, id: u64) {
        let mut entries = self.lock();
        let pending = matches!(
            entries.get(key),
            Some(Entry { id: live, slot: Slot::Pending(_), .. }) if *live == id
        );
        if pending {
            entries.remove(key);
            tracing::debug!(entry = id, "initiator cancelled, pending entry removed");
        }
    }
}

/// Keyed async cache with single-flight lookups and ref-counted eviction.
///
/// Cheap to clone; clones share the same table.
pub struct SingleFlightCache<K, V, E> {
    shared: Arc<Shared<K, V, E>>,
}

impl<K, V, E> Clone for SingleFlightCache<K, V, E> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

/// Builder for [`SingleFlightCache`].
pub struct CacheBuilder<K, V, E> {
    lookup: Lookup<K, V, E>,
    on_release: Option<ReleaseHook<K, V, E>>,
}

impl<K, V, E> CacheBuilder<K, V, E> {
    /// Run `hook` with the final outcome whenever an entry is evicted.
    ///
    /// The hook runs synchronously on the task that dropped the last lease,
    /// outside the table lock.
    pub fn on_release<H>(mut self, hook: H) -> Self
    where
        H: Fn(&K, std::result::Result<&V, &E>) + Send + Sync + 'static,
    {
        self.on_release = Some(Arc::new(hook));
        self
    }

    /// Build the cache.
    pub fn build(self) -> SingleFlightCache<K, V, E> {
        SingleFlightCache {
            shared: Arc::new(Shared {
                entries: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                lookup: self.lookup,
                on_release: self.on_release,
            }),
        }
    }
}

enum Step<K, V, E>
where
    K: Eq + Hash,
{
    Ready(Lease<K, V, E>, Outcome<V, E>),
    Wait(Lease<K, V, E>, watch::Receiver<Option<Outcome<V, E>>>),
    Compute(Lease<K, V, E>, watch::Sender<Option<Outcome<V, E>>>),
}

impl<K, V, E> SingleFlightCache<K, V, E>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Create a cache around `lookup` with no release hook.
    pub fn new<F, Fut>(lookup: F) -> Self
    where
        F: Fn(K) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<V, E>> + Send + 'static,
    {
        Self::builder(lookup).build()
    }

    /// Start building a cache around `lookup`.
    pub fn builder<F, Fut>(lookup: F) -> CacheBuilder<K, V, E>
    where
        F: Fn(K) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<V, E>> + Send + 'static,
    {
        CacheBuilder {
            lookup: Arc::new(move |key| -> BoxFuture<'static, std::result::Result<V, E>> {
                Box::pin(lookup(key))
            }),
            on_release: None,
        }
    }

    /// Get the value for `key`, running the lookup only if no entry exists.
    ///
    /// Concurrent calls for the same key share one lookup and observe the
    /// same outcome. A failed lookup returns its error to every waiter and
    /// holds no lease afterwards.
    ///
    /// Cancel safety: dropping the future of a waiting caller releases only
    /// its own reference. Dropping the future of the caller running the
    /// lookup removes the pending entry; remaining waiters retry and one of
    /// them runs a fresh lookup.
    pub async fn get(&self, key: K) -> std::result::Result<CacheRef<K, V, E>, E> {
        loop {
            match self.join(&key) {
                Step::Ready(lease, outcome) => return lease.resolve(outcome),
                Step::Wait(lease, mut rx) => {
                    let outcome = match rx.wait_for(Option::is_some).await {
                        Ok(published) => published.clone(),
                        Err(_) => None,
                    };
                    match outcome {
                        Some(outcome) => return lease.resolve(outcome),
                        None => {
                            tracing::debug!(entry = lease.id, "initiator gone, retrying lookup");
                            drop(lease);
                        }
                    }
                }
                Step::Compute(lease, tx) => {
                    let guard = PendingGuard {
                        shared: &self.shared,
                        key: &key,
                        id: lease.id,
                        armed: true,
                    };
                    let outcome = (self.shared.lookup)(key.clone()).await.map(Arc::new);
                    guard.disarm();

                    self.shared.complete(&key, lease.id, &outcome);
                    tx.send_replace(Some(outcome.clone()));
                    return lease.resolve(outcome);
                }
            }
        }
    }

    /// Register as an owner of the entry for `key`, creating it on a miss.
    fn join(&self, key: &K) -> Step<K, V, E> {
        let mut entries = self.shared.lock();

        // A pending entry whose sender is gone belongs to a cancelled lookup.
        let stale = matches!(
            entries.get(key),
            Some(Entry { slot: Slot::Pending(rx), .. }) if rx.has_changed().is_err()
        );
        if stale {
            entries.remove(key);
        }

        if let Some(entry) = entries.get_mut(key) {
            entry.owners += 1;
            let lease = Lease::new(&self.shared, key.clone(), entry.id);
            return match &entry.slot {
                Slot::Ready(outcome) => Step::Ready(lease, outcome.clone()),
                Slot::Pending(rx) => Step::Wait(lease, rx.clone()),
            };
        }

        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = watch::channel(None);
        entries.insert(
            key.clone(),
            Entry {
                id,
                owners: 1,
                slot: Slot::Pending(rx),
            },
        );
        tracing::debug!(entry = id, "cache miss, starting lookup");
        Step::Compute(Lease::new(&self.shared, key.clone(), id), tx)
    }

    /// Number of live entries, pending or resolved.
    pub fn len(&self) -> usize {
        self.shared.lock().len()
    }

    /// True if no entries are live.
    pub fn is_empty(&self) -> bool {
        self.shared.lock().is_empty()
    }

    /// True if an entry for `key` is live.
    pub fn contains(&self, key: &K) -> bool {
        self.shared.lock().contains_key(key)
    }

    /// Current owner count for `key`, zero if absent.
    pub fn owners(&self, key: &K) -> usize {
        self.shared.lock().get(key).map_or(0, |e| e.owners)
    }
}

/// Removes the pending entry if the lookup future is dropped before it ends.
struct PendingGuard<'a, K, V, E>
where
    K: Eq + Hash,
{
    shared: &'a Shared<K, V, E>,
    key: &'a K,
    id: u64,
    armed: bool,
}

impl<K, V, E> PendingGuard<'_, K, V, E>
where
    K: Eq + Hash,
{
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl<K, V, E> Drop for PendingGuard<'_, K, V, E>
where
    K: Eq + Hash,
{
    fn drop(&mut self) {
        if self.armed {
            self.shared.abandon(self.key, self.id);
        }
    }
}

/// One unit of ownership over an entry; released on drop.
struct Lease<K, V, E>
where
    K: Eq + Hash,
{
    shared: Arc<Shared<K, V, E>>,
    key: K,
    id: u64,
}

impl<K, V, E> Lease<K, V, E>
where
    K: Eq + Hash,
{
    fn new(shared: &Arc<Shared<K, V, E>>, key: K, id: u64) -> Self {
        Self {
            shared: Arc::clone(shared),
            key,
            id,
        }
    }

    /// Turn the lease into a [`CacheRef`] on success; release it on failure.
    fn resolve(self, outcome: Outcome<V, E>) -> std::result::Result<CacheRef<K, V, E>, E> {
        match outcome {
            Ok(value) => Ok(CacheRef { lease: self, value }),
            Err(e) => Err(e),
        }
    }
}

impl<K, V, E> Drop for Lease<K, V, E>
where
    K: Eq + Hash,
{
    fn drop(&mut self) {
        self.shared.release(&self.key, self.id);
    }
}

/// A live reference to a cached value.
///
/// The entry stays cached while any `CacheRef` for it exists. Cloning adds
/// an owner; dropping removes one.
pub struct CacheRef<K, V, E>
where
    K: Eq + Hash,
{
    lease: Lease<K, V, E>,
    value: Arc<V>,
}

impl<K, V, E> CacheRef<K, V, E>
where
    K: Eq + Hash,
{
    /// Key this reference was obtained for.
    pub fn key(&self) -> &K {
        &self.lease.key
    }

    /// Shared handle to the value. Holding it does not keep the entry cached.
    pub fn value(&self) -> &Arc<V> {
        &self.value
    }
}

impl<K, V, E> Deref for CacheRef<K, V, E>
where
    K: Eq + Hash,
{
    type Target = V;

    fn deref(&self) -> &V {
        &self.value
    }
}

impl<K, V, E> Clone for CacheRef<K, V, E>
where
    K: Eq + Hash + Clone,
{
    fn clone(&self) -> Self {
        self.lease.shared.retain(&self.lease.key, self.lease.id);
        Self {
            lease: Lease::new(&self.lease.shared, self.lease.key.clone(), self.lease.id),
            value: Arc::clone(&self.value),
        }
    }
}

impl<K, V, E> fmt::Debug for CacheRef<K, V, E>
where
    K: Eq + Hash + fmt::Debug,
    V: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheRef")
            .field("key", &self.lease.key)
            .field("value", &self.value)
            .finish()
    }
}
