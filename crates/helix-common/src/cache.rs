//! Memoization primitives for values that are expensive or rarely change.
//!
//! Both caches own the closure that produces their value, so a cache can be
//! stored in a component and refreshed without the caller knowing how the
//! value is computed.

use tracing::trace;

use crate::CommonError;

/// An explicitly refreshed cache.
///
/// The value is computed lazily on the first [`Cache::get`] and then reused
/// until [`Cache::update`] or [`Cache::invalidate`] is called.
pub struct Cache<T, F>
where
    F: FnMut() -> T,
{
    supplier: F,
    value: Option<T>,
}

impl<T, F> Cache<T, F>
where
    F: FnMut() -> T,
{
    /// Create an empty cache around `supplier`.
    pub fn new(supplier: F) -> Self {
        Cache {
            supplier,
            value: None,
        }
    }

    /// The cached value, computing it if the cache is empty.
    pub fn get(&mut self) -> &T {
        let supplier = &mut self.supplier;
        self.value.get_or_insert_with(|| supplier())
    }

    /// Recompute the value now and return it.
    pub fn update(&mut self) -> &T {
        let value = (self.supplier)();
        self.value.insert(value)
    }

    /// Drop the cached value; the next `get` recomputes it.
    pub fn invalidate(&mut self) {
        self.value = None;
    }

    /// Whether a value is currently cached.
    pub fn is_cached(&self) -> bool {
        self.value.is_some()
    }
}

/// A cache that refreshes itself every `max_count` reads.
///
/// Useful for values that drift slowly, like alliance color or
/// alliance-relative field geometry, where polling every tick is wasteful but
/// never polling is wrong.
pub struct CountingCache<T, F>
where
    F: FnMut() -> T,
{
    inner: Cache<T, F>,
    count: u32,
    max_count: u32,
}

impl<T, F> CountingCache<T, F>
where
    F: FnMut() -> T,
{
    /// Create a counting cache that recomputes on every `max_count`-th read.
    ///
    /// # Errors
    ///
    /// Returns `CommonError::ZeroRefreshPeriod` if `max_count` is zero.
    pub fn new(supplier: F, max_count: u32) -> Result<Self, CommonError> {
        if max_count == 0 {
            return Err(CommonError::ZeroRefreshPeriod);
        }
        Ok(CountingCache {
            inner: Cache::new(supplier),
            count: 0,
            max_count,
        })
    }

    /// Read the value, refreshing it if this read completes a period.
    pub fn get(&mut self) -> &T {
        self.count += 1;
        if self.count >= self.max_count {
            trace!(max_count = self.max_count, "counting cache refresh");
            self.count = 0;
            return self.inner.update();
        }
        self.inner.get()
    }

    /// Force a refresh on the next read.
    pub fn invalidate(&mut self) {
        self.count = 0;
        self.inner.invalidate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_cache_is_lazy_and_sticky() {
        let calls = Cell::new(0);
        let mut cache = Cache::new(|| {
            calls.set(calls.get() + 1);
            calls.get() * 10
        });
        assert!(!cache.is_cached());
        assert_eq!(calls.get(), 0);
        assert_eq!(*cache.get(), 10);
        assert_eq!(*cache.get(), 10);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_cache_update_and_invalidate() {
        let calls = Cell::new(0);
        let mut cache = Cache::new(|| {
            calls.set(calls.get() + 1);
            calls.get()
        });
        assert_eq!(*cache.get(), 1);
        assert_eq!(*cache.update(), 2);
        assert_eq!(*cache.get(), 2);
        cache.invalidate();
        assert!(!cache.is_cached());
        assert_eq!(*cache.get(), 3);
    }

    #[test]
    fn test_counting_cache_refreshes_every_period() {
        let calls = Cell::new(0);
        let mut cache = CountingCache::new(
            || {
                calls.set(calls.get() + 1);
                calls.get()
            },
            3,
        )
        .unwrap();
        let reads: Vec<i32> = (0..7).map(|_| *cache.get()).collect();
        assert_eq!(reads, vec![1, 1, 2, 2, 2, 3, 3]);
    }

    #[test]
    fn test_counting_cache_rejects_zero_period() {
        assert_eq!(
            CountingCache::new(|| 0, 0).err(),
            Some(CommonError::ZeroRefreshPeriod)
        );
    }
}
