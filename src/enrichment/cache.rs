//! Caches à durée de vie bornée pour les recherches externes
//!
//! `TtlCache` garde les résultats positifs comme négatifs. `CachedLookup`
//! ajoute l'appel unique : des demandes simultanées pour une même clé partagent
//! une seule recherche en cours.

use crate::error::LookupError;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use log::debug;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Source de temps des caches, remplaçable dans les tests
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Horloge avancée à la main
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    offset_ms: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset_ms: AtomicU64::new(0),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.offset_ms
            .fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + Duration::from_millis(self.offset_ms.load(Ordering::SeqCst))
    }
}

struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
}

/// Cache clé/valeur avec expiration et nombre d'entrées borné
pub struct TtlCache<K, V> {
    entries: DashMap<K, CacheEntry<V>>,
    ttl: Duration,
    max_entries: usize,
    clock: Arc<dyn Clock>,
}

impl<K, V> fmt::Debug for TtlCache<K, V>
where
    K: Eq + Hash,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TtlCache")
            .field("entries", &self.entries.len())
            .field("ttl", &self.ttl)
            .field("max_entries", &self.max_entries)
            .finish()
    }
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(ttl: Duration, max_entries: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            max_entries: max_entries.max(1),
            clock,
        }
    }

    fn is_fresh(&self, entry: &CacheEntry<V>, now: Instant) -> bool {
        now.saturating_duration_since(entry.inserted_at) < self.ttl
    }

    /// Valeur encore valide pour `key`. Une entrée expirée est retirée.
    pub fn get(&self, key: &K) -> Option<V> {
        let now = self.clock.now();
        if let Some(entry) = self.entries.get(key) {
            if self.is_fresh(&entry, now) {
                return Some(entry.value.clone());
            }
        }
        self.entries
            .remove_if(key, |_, entry| !self.is_fresh(entry, now));
        None
    }

    pub fn insert(&self, key: K, value: V) {
        let now = self.clock.now();
        if self.entries.len() >= self.max_entries && !self.entries.contains_key(&key) {
            self.entries.retain(|_, entry| self.is_fresh(entry, now));
            if self.entries.len() >= self.max_entries {
                let oldest = self
                    .entries
                    .iter()
                    .min_by_key(|entry| entry.inserted_at)
                    .map(|entry| entry.key().clone());
                if let Some(oldest) = oldest {
                    self.entries.remove(&oldest);
                }
            }
        }
        self.entries.insert(
            key,
            CacheEntry {
                value,
                inserted_at: now,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

type SharedLookup = Shared<BoxFuture<'static, Option<String>>>;

/// Retire l'entrée « en cours » quand le meneur termine ou est annulé
struct InFlightGuard<'a, K: Eq + Hash> {
    table: &'a DashMap<K, SharedLookup>,
    key: Option<K>,
}

impl<K: Eq + Hash> Drop for InFlightGuard<'_, K> {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            self.table.remove(&key);
        }
    }
}

/// Recherche externe mise en cache, avec délai maximal et appel unique par clé
///
/// Échecs et dépassements de délai sont mémorisés comme absence de résultat.
/// Une recherche annulée avant la fin ne laisse aucune entrée dans le cache.
pub struct CachedLookup<K> {
    cache: TtlCache<K, Option<String>>,
    in_flight: DashMap<K, SharedLookup>,
    timeout: Duration,
}

impl<K: Eq + Hash> fmt::Debug for CachedLookup<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedLookup")
            .field("cache", &self.cache)
            .field("in_flight", &self.in_flight.len())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl<K> CachedLookup<K>
where
    K: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static,
{
    pub fn new(ttl: Duration, max_entries: usize, timeout: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            cache: TtlCache::new(ttl, max_entries, clock),
            in_flight: DashMap::new(),
            timeout,
        }
    }

    /// Résultat en cache, `None` si la clé n'a jamais été résolue ou a expiré
    pub fn cached(&self, key: &K) -> Option<Option<String>> {
        self.cache.get(key)
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    pub fn in_flight_len(&self) -> usize {
        self.in_flight.len()
    }

    /// Sert `key` depuis le cache ou lance `resolve`. Un seul appel à `resolve`
    /// est effectué pour des demandes concurrentes sur la même clé.
    pub async fn get_or_resolve<F, Fut>(&self, key: K, resolve: F) -> Option<String>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<String>, LookupError>> + Send + 'static,
    {
        if let Some(hit) = self.cache.get(&key) {
            debug!("Cache: {:?} servi depuis le cache", key);
            return hit;
        }

        let (lookup, _guard) = match self.in_flight.entry(key.clone()) {
            Entry::Occupied(entry) => (entry.get().clone(), None),
            Entry::Vacant(entry) => {
                // Un meneur a pu terminer entre les deux vérifications
                if let Some(hit) = self.cache.get(&key) {
                    return hit;
                }
                let pending = resolve();
                let timeout = self.timeout;
                let label = format!("{:?}", key);
                let lookup = async move {
                    match tokio::time::timeout(timeout, pending).await {
                        Ok(Ok(value)) => value,
                        Ok(Err(e)) => {
                            debug!("Recherche {} en échec: {}", label, e);
                            None
                        }
                        Err(_) => {
                            debug!("Recherche {} abandonnée: {}", label, LookupError::Timeout);
                            None
                        }
                    }
                }
                .boxed()
                .shared();
                entry.insert(lookup.clone());
                let guard = InFlightGuard {
                    table: &self.in_flight,
                    key: Some(key.clone()),
                };
                (lookup, Some(guard))
            }
        };

        let value = lookup.await;
        self.cache.insert(key, value.clone());
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn lookup_with(clock: Arc<ManualClock>, timeout: Duration) -> CachedLookup<String> {
        CachedLookup::new(Duration::from_secs(3600), 100, timeout, clock)
    }

    #[test]
    fn test_entries_expire_after_ttl() {
        let clock = Arc::new(ManualClock::new());
        let cache: TtlCache<&str, u32> = TtlCache::new(Duration::from_secs(60), 10, clock.clone());
        cache.insert("a", 1);
        clock.advance(Duration::from_secs(59));
        assert_eq!(cache.get(&"a"), Some(1));
        clock.advance(Duration::from_secs(1));
        assert_eq!(cache.get(&"a"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_bounded_size_evicts_expired_then_oldest() {
        let clock = Arc::new(ManualClock::new());
        let cache: TtlCache<u32, u32> = TtlCache::new(Duration::from_secs(10), 2, clock.clone());
        cache.insert(1, 1);
        clock.advance(Duration::from_secs(1));
        cache.insert(2, 2);
        clock.advance(Duration::from_secs(1));
        cache.insert(3, 3);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&1), None);
        assert_eq!(cache.get(&2), Some(2));

        clock.advance(Duration::from_secs(9));
        cache.insert(4, 4);
        // 2 a expiré : 3 survit
        assert_eq!(cache.get(&3), Some(3));
        assert_eq!(cache.get(&4), Some(4));
    }

    #[tokio::test]
    async fn test_negative_result_is_cached() {
        let lookup = lookup_with(Arc::new(ManualClock::new()), Duration::from_secs(1));
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let calls = calls.clone();
            let value = lookup
                .get_or_resolve("10.0.0.1".to_string(), move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(LookupError::Failed("NXDOMAIN".into()))
                })
                .await;
            assert_eq!(value, None);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(lookup.cached(&"10.0.0.1".to_string()), Some(None));
    }

    #[tokio::test]
    async fn test_expired_entry_is_resolved_again() {
        let clock = Arc::new(ManualClock::new());
        let lookup = lookup_with(clock.clone(), Duration::from_secs(1));
        let calls = Arc::new(AtomicUsize::new(0));

        let resolve = |calls: Arc<AtomicUsize>| {
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(Some("alice-pc".to_string()))
            }
        };

        let key = "10.0.0.1".to_string();
        assert_eq!(lookup.get_or_resolve(key.clone(), resolve(calls.clone())).await.as_deref(), Some("alice-pc"));
        clock.advance(Duration::from_secs(3600));
        assert_eq!(lookup.get_or_resolve(key, resolve(calls.clone())).await.as_deref(), Some("alice-pc"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_concurrent_requests_share_one_lookup() {
        let lookup = lookup_with(Arc::new(ManualClock::new()), Duration::from_secs(2));
        let calls = Arc::new(AtomicUsize::new(0));

        let request = || {
            let calls = calls.clone();
            lookup.get_or_resolve("10.0.0.7".to_string(), move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok(Some("bob-laptop".to_string()))
            })
        };

        let (a, b, c) = tokio::join!(request(), request(), request());
        assert_eq!(a.as_deref(), Some("bob-laptop"));
        assert_eq!(a, b);
        assert_eq!(b, c);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(lookup.in_flight_len(), 0);
    }

    #[tokio::test]
    async fn test_timeout_resolves_to_none() {
        let lookup = lookup_with(Arc::new(ManualClock::new()), Duration::from_millis(20));
        let value = lookup
            .get_or_resolve("10.0.0.9".to_string(), || async {
                futures::future::pending::<()>().await;
                Ok(Some("never".to_string()))
            })
            .await;
        assert_eq!(value, None);
        assert_eq!(lookup.cached(&"10.0.0.9".to_string()), Some(None));
    }

    #[tokio::test]
    async fn test_cancelled_lookup_leaves_no_entry() {
        let lookup = lookup_with(Arc::new(ManualClock::new()), Duration::from_secs(5));
        let key = "10.0.0.3".to_string();

        let cancelled = tokio::time::timeout(
            Duration::from_millis(20),
            lookup.get_or_resolve(key.clone(), || async {
                tokio::time::sleep(Duration::from_secs(1)).await;
                Ok(Some("late".to_string()))
            }),
        )
        .await;
        assert!(cancelled.is_err());
        assert_eq!(lookup.cached(&key), None);
        assert_eq!(lookup.in_flight_len(), 0);
        assert_eq!(lookup.cache_len(), 0);

        let value = lookup
            .get_or_resolve(key.clone(), || async { Ok(Some("fresh".to_string())) })
            .await;
        assert_eq!(value.as_deref(), Some("fresh"));
    }
}
