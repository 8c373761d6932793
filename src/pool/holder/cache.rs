//! The bounded prepared-statement cache and its fingerprint keys.

use std::{
    num::NonZeroUsize,
    sync::{Arc, Mutex},
};

use lru::LruCache;
use tracing::trace;

use crate::driver::Statement;

/// The tuple of creation parameters that makes two prepared statements
/// interchangeable.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub struct StatementFingerprint {
    /// The SQL text.
    pub sql: String,

    /// Requested result set type, if any.
    pub result_set_type: Option<i32>,

    /// Requested result set concurrency, if any.
    pub result_set_concurrency: Option<i32>,

    /// Requested cursor holdability, if any.
    pub holdability: Option<i32>,

    /// Requested generated-keys mode, if any.
    pub generated_keys: Option<i32>,
}

impl StatementFingerprint {
    /// A fingerprint carrying only SQL text, with driver defaults for the
    /// creation parameters.
    pub fn from_sql(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            result_set_type: None,
            result_set_concurrency: None,
            holdability: None,
            generated_keys: None,
        }
    }
}

/// A statement handle shared between the cache and its users.
pub type CachedStatement = Arc<dyn Statement>;

type EvictionHook = Box<dyn Fn(CachedStatement) + Send + Sync>;

/// A bounded least-recently-used mapping from statement fingerprints to
/// reusable statements.
///
/// Eviction hands the displaced statement to the installed hook, which owns
/// closing it. The hook must contain its own failures so one bad close
/// cannot leak the rest of the cache.
pub(crate) struct StatementCache {
    inner: Mutex<CacheInner>,
}

struct CacheInner {
    // None when the configured capacity is 0: caching is disabled and every
    // put immediately evicts.
    entries: Option<LruCache<StatementFingerprint, CachedStatement>>,
    hook: Option<EvictionHook>,
}

impl StatementCache {
    /// Creates a cache bounded to `capacity` entries.
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                entries: NonZeroUsize::new(capacity).map(LruCache::new),
                hook: None,
            }),
        }
    }

    /// Installs the close function run on evicted statements.
    pub(crate) fn set_eviction_hook(
        &self,
        hook: impl Fn(CachedStatement) + Send + Sync + 'static,
    ) {
        self.inner.lock().unwrap().hook = Some(Box::new(hook));
    }

    /// Looks up `key`, promoting the entry to most recently used. The
    /// statement stays cached and re-issuable.
    pub(crate) fn get(&self, key: &StatementFingerprint) -> Option<CachedStatement> {
        let mut guard = self.inner.lock().unwrap();
        guard.entries.as_mut()?.get(key).cloned()
    }

    /// Inserts `stmt` under `key` and returns it. At capacity the least
    /// recently used entry is evicted through the hook; an existing entry
    /// under `key` is displaced the same way.
    pub(crate) fn put(
        &self,
        key: StatementFingerprint,
        stmt: CachedStatement,
    ) -> CachedStatement {
        let mut guard = self.inner.lock().unwrap();
        let inner = &mut *guard;
        match inner.entries.as_mut() {
            None => {
                trace!(sql = %key.sql, "statement caching disabled; evicting immediately");
                fire(&inner.hook, stmt.clone());
            }
            Some(entries) => {
                if let Some((evicted_key, evicted)) = entries.push(key, stmt.clone()) {
                    trace!(sql = %evicted_key.sql, "evicting statement");
                    fire(&inner.hook, evicted);
                }
            }
        }
        stmt
    }

    /// Evicts every entry, in least-recently-used order.
    pub(crate) fn clear(&self) {
        let mut guard = self.inner.lock().unwrap();
        let inner = &mut *guard;
        if let Some(entries) = inner.entries.as_mut() {
            while let Some((_, stmt)) = entries.pop_lru() {
                fire(&inner.hook, stmt);
            }
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap()
            .entries
            .as_ref()
            .map_or(0, LruCache::len)
    }
}

fn fire(hook: &Option<EvictionHook>, stmt: CachedStatement) {
    if let Some(hook) = hook {
        hook(stmt);
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    use super::*;
    use crate::driver::{DriverResult, ResultCursor, Statement};

    struct FakeStatement {
        closed: Arc<AtomicUsize>,
    }

    impl FakeStatement {
        fn new() -> CachedStatement {
            Self::counted().0
        }

        fn counted() -> (CachedStatement, Arc<AtomicUsize>) {
            let closed = Arc::new(AtomicUsize::new(0));
            let stmt = Arc::new(Self {
                closed: Arc::clone(&closed),
            });
            (stmt, closed)
        }
    }

    impl Statement for FakeStatement {
        fn set_query_timeout(&self, _timeout: Duration) -> DriverResult<()> {
            Ok(())
        }

        fn execute(&self) -> DriverResult<Box<dyn ResultCursor>> {
            unimplemented!("not executed by cache tests")
        }

        fn close(&self) -> DriverResult<()> {
            self.closed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn closing_cache(capacity: usize) -> (StatementCache, Arc<AtomicUsize>) {
        let cache = StatementCache::new(capacity);
        let evictions = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&evictions);
        cache.set_eviction_hook(move |stmt| {
            stmt.close().unwrap();
            counter.fetch_add(1, Ordering::SeqCst);
        });
        (cache, evictions)
    }

    #[test]
    fn eviction_closes_the_least_recently_used_entry() {
        let (cache, evictions) = closing_cache(2);
        let (k1, k2, k3) = (
            StatementFingerprint::from_sql("one"),
            StatementFingerprint::from_sql("two"),
            StatementFingerprint::from_sql("three"),
        );
        let (s1, s2, s3) = (FakeStatement::new(), FakeStatement::new(), FakeStatement::new());

        cache.put(k1.clone(), s1.clone());
        cache.put(k2.clone(), s2.clone());
        cache.put(k3.clone(), s3.clone());

        assert_eq!(evictions.load(Ordering::SeqCst), 1);
        assert!(cache.get(&k1).is_none());
        assert!(Arc::ptr_eq(&cache.get(&k2).unwrap(), &s2));
        assert!(Arc::ptr_eq(&cache.get(&k3).unwrap(), &s3));
    }

    #[test]
    fn overflow_by_k_evicts_exactly_k_distinct_statements() {
        let (cache, evictions) = closing_cache(2);
        let statements: Vec<_> = (0..5).map(|_| FakeStatement::counted()).collect();
        for (i, (stmt, _)) in statements.iter().enumerate() {
            cache.put(StatementFingerprint::from_sql(format!("q{i}")), stmt.clone());
        }

        assert_eq!(evictions.load(Ordering::SeqCst), 3);
        assert_eq!(cache.len(), 2);
        // The three oldest were each closed exactly once; the two newest
        // remain open.
        for (_, closed) in &statements[..3] {
            assert_eq!(closed.load(Ordering::SeqCst), 1);
        }
        for (_, closed) in &statements[3..] {
            assert_eq!(closed.load(Ordering::SeqCst), 0);
        }
    }

    #[test]
    fn get_promotes_to_most_recently_used() {
        let (cache, _) = closing_cache(2);
        let (k1, k2, k3) = (
            StatementFingerprint::from_sql("one"),
            StatementFingerprint::from_sql("two"),
            StatementFingerprint::from_sql("three"),
        );
        cache.put(k1.clone(), FakeStatement::new());
        cache.put(k2.clone(), FakeStatement::new());
        cache.get(&k1);
        cache.put(k3.clone(), FakeStatement::new());

        assert!(cache.get(&k1).is_some());
        assert!(cache.get(&k2).is_none());
        assert!(cache.get(&k3).is_some());
    }

    #[test]
    fn replacing_a_key_evicts_the_old_statement() {
        let (cache, evictions) = closing_cache(2);
        let key = StatementFingerprint::from_sql("one");
        let old = FakeStatement::new();
        let new = FakeStatement::new();

        cache.put(key.clone(), old);
        cache.put(key.clone(), new.clone());

        assert_eq!(evictions.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);
        assert!(Arc::ptr_eq(&cache.get(&key).unwrap(), &new));
    }

    #[test]
    fn zero_capacity_disables_caching() {
        let (cache, evictions) = closing_cache(0);
        let key = StatementFingerprint::from_sql("one");
        let stmt = cache.put(key.clone(), FakeStatement::new());

        assert_eq!(evictions.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 0);
        assert!(cache.get(&key).is_none());
        drop(stmt);
    }

    #[test]
    fn clear_evicts_everything() {
        let (cache, evictions) = closing_cache(3);
        for i in 0..3 {
            cache.put(StatementFingerprint::from_sql(format!("q{i}")), FakeStatement::new());
        }
        cache.clear();

        assert_eq!(evictions.load(Ordering::SeqCst), 3);
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn hookless_cache_still_bounds_entries() {
        let cache = StatementCache::new(1);
        cache.put(StatementFingerprint::from_sql("one"), FakeStatement::new());
        cache.put(StatementFingerprint::from_sql("two"), FakeStatement::new());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn fingerprints_distinguish_creation_parameters() {
        let base = StatementFingerprint::from_sql("select 1");
        let mut held = StatementFingerprint::from_sql("select 1");
        held.holdability = Some(1);
        assert_ne!(base, held);
        assert_eq!(base, StatementFingerprint::from_sql("select 1"));
    }
}
