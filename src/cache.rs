// src/cache.rs
//! Bounded texture cache keyed by [`CacheKey`].
//!
//! The cache holds shared references only. Evicting or clearing an entry
//! drops the cache's reference and nothing else; GPU memory is released by
//! the context registry.

use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Arc;

use log::{debug, trace};
use lru::LruCache;
use web_time::Instant;

use crate::descriptor::CacheKey;
use crate::pixels::PixelBuffer;

/// Which pass produced a cached texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResolutionTier {
    /// Placeholder from the synchronous low-resolution producer.
    Low,
    /// Final texture from the deferred high-resolution job.
    High,
}

/// Approximate memory footprint of a cached resource, in bytes.
pub trait Footprint {
    fn footprint(&self) -> u64;
}

impl Footprint for PixelBuffer {
    fn footprint(&self) -> u64 {
        self.byte_len()
    }
}

impl<T: Footprint + ?Sized> Footprint for Arc<T> {
    fn footprint(&self) -> u64 {
        (**self).footprint()
    }
}

#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    pub key: CacheKey,
    pub resource: T,
    pub tier: ResolutionTier,
    pub created_at: Instant,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub entries: u64,
    pub bytes: u64,
    pub max_bytes: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    fn format_bytes(bytes: u64) -> String {
        const KB: u64 = 1024;
        const MB: u64 = KB * 1024;
        const GB: u64 = MB * 1024;

        if bytes >= GB {
            format!("{:.2} GB", bytes as f64 / GB as f64)
        } else if bytes >= MB {
            format!("{:.2} MB", bytes as f64 / MB as f64)
        } else if bytes >= KB {
            format!("{:.2} KB", bytes as f64 / KB as f64)
        } else {
            format!("{bytes} B")
        }
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CacheStats {{ hits: {}, misses: {}, hit_rate: {:.2}%, evictions: {}, \
             memory: {}/{}, entries: {} }}",
            self.hits,
            self.misses,
            self.hit_rate() * 100.0,
            self.evictions,
            Self::format_bytes(self.bytes),
            Self::format_bytes(self.max_bytes),
            self.entries
        )
    }
}

/// LRU cache bounded by entry count and total bytes.
///
/// `put` is last-writer-wins. When the byte budget is exceeded the least
/// recently used entries are evicted, but the entry just inserted is always
/// kept even if it alone exceeds the budget.
pub struct TextureCache<T> {
    entries: LruCache<CacheKey, CacheEntry<T>>,
    max_bytes: u64,
    bytes: u64,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl<T: Clone> TextureCache<T> {
    pub fn new(max_entries: NonZeroUsize, max_bytes: u64) -> Self {
        Self {
            entries: LruCache::new(max_entries),
            max_bytes,
            bytes: 0,
            hits: 0,
            misses: 0,
            evictions: 0,
        }
    }

    /// Shared reference to the cached resource, refreshing its recency.
    pub fn get(&mut self, key: &CacheKey) -> Option<T> {
        self.get_entry(key).map(|e| e.resource.clone())
    }

    pub fn get_entry(&mut self, key: &CacheKey) -> Option<&CacheEntry<T>> {
        match self.entries.get(key) {
            Some(entry) => {
                self.hits += 1;
                Some(entry)
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    /// Looks up without touching recency or statistics.
    pub fn peek(&self, key: &CacheKey) -> Option<&CacheEntry<T>> {
        self.entries.peek(key)
    }

    pub fn tier_of(&self, key: &CacheKey) -> Option<ResolutionTier> {
        self.peek(key).map(|e| e.tier)
    }

    pub fn put(&mut self, key: CacheKey, resource: T, tier: ResolutionTier, size_bytes: u64) {
        trace!("cache put {key} ({tier:?}, {size_bytes} B)");
        let entry = CacheEntry {
            key: key.clone(),
            resource,
            tier,
            created_at: Instant::now(),
            size_bytes,
        };
        self.bytes += size_bytes;
        if let Some((old_key, old)) = self.entries.push(key.clone(), entry) {
            self.bytes = self.bytes.saturating_sub(old.size_bytes);
            if old_key != key {
                self.evictions += 1;
                debug!("evicted {old_key} (entry limit)");
            }
        }
        while self.bytes > self.max_bytes && self.entries.len() > 1 {
            // The newest entry sits at the MRU end, so pop_lru never reaches it here.
            match self.entries.pop_lru() {
                Some((old_key, old)) => {
                    self.bytes = self.bytes.saturating_sub(old.size_bytes);
                    self.evictions += 1;
                    debug!("evicted {old_key} (byte budget)");
                }
                None => break,
            }
        }
    }

    /// Drops every entry. Returns how many were dropped.
    pub fn clear(&mut self) -> usize {
        let n = self.entries.len();
        self.entries.clear();
        self.bytes = 0;
        n
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            evictions: self.evictions,
            entries: self.entries.len() as u64,
            bytes: self.bytes,
            max_bytes: self.max_bytes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache(entries: usize, bytes: u64) -> TextureCache<Arc<u32>> {
        TextureCache::new(NonZeroUsize::new(entries).unwrap(), bytes)
    }

    #[test]
    fn put_then_get_returns_same_reference() {
        let mut c = cache(8, 1024);
        let res = Arc::new(7);
        c.put("a".into(), res.clone(), ResolutionTier::Low, 10);
        let got = c.get(&"a".into()).unwrap();
        assert!(Arc::ptr_eq(&got, &res));
        assert!(c.get(&"b".into()).is_none());
        let s = c.stats();
        assert_eq!((s.hits, s.misses), (1, 1));
    }

    #[test]
    fn last_writer_wins_and_bytes_track_replacement() {
        let mut c = cache(8, 1024);
        c.put("a".into(), Arc::new(1), ResolutionTier::Low, 10);
        c.put("a".into(), Arc::new(2), ResolutionTier::High, 40);
        let e = c.get_entry(&"a".into()).unwrap();
        assert_eq!((*e.resource, e.tier), (2, ResolutionTier::High));
        assert_eq!(c.bytes(), 40);
        assert_eq!(c.stats().evictions, 0);
    }

    #[test]
    fn evicts_least_recently_used_over_byte_budget() {
        let mut c = cache(8, 100);
        c.put("a".into(), Arc::new(1), ResolutionTier::High, 40);
        c.put("b".into(), Arc::new(2), ResolutionTier::High, 40);
        // Touch `a` so `b` becomes the eviction candidate.
        c.get(&"a".into());
        c.put("c".into(), Arc::new(3), ResolutionTier::High, 40);
        assert!(c.peek(&"b".into()).is_none());
        assert!(c.peek(&"a".into()).is_some());
        assert!(c.peek(&"c".into()).is_some());
        assert_eq!(c.bytes(), 80);
        assert_eq!(c.stats().evictions, 1);
    }

    #[test]
    fn evicts_on_entry_limit() {
        let mut c = cache(2, u64::MAX);
        for (i, k) in ["a", "b", "c"].into_iter().enumerate() {
            c.put(k.into(), Arc::new(i as u32), ResolutionTier::Low, 1);
        }
        assert_eq!(c.len(), 2);
        assert!(c.peek(&"a".into()).is_none());
        assert_eq!(c.bytes(), 2);
    }

    #[test]
    fn oversized_entry_is_kept_alone() {
        let mut c = cache(4, 10);
        c.put("small".into(), Arc::new(0), ResolutionTier::Low, 5);
        c.put("huge".into(), Arc::new(1), ResolutionTier::High, 50);
        assert_eq!(c.len(), 1);
        assert!(c.peek(&"huge".into()).is_some());
    }

    #[test]
    fn eviction_only_drops_the_cache_reference() {
        let mut c = cache(1, u64::MAX);
        let held = Arc::new(5);
        c.put("a".into(), held.clone(), ResolutionTier::High, 1);
        c.put("b".into(), Arc::new(6), ResolutionTier::High, 1);
        assert_eq!(Arc::strong_count(&held), 1);
        assert_eq!(*held, 5);
    }

    #[test]
    fn clear_empties_and_resets_bytes() {
        let mut c = cache(4, 100);
        c.put("a".into(), Arc::new(1), ResolutionTier::Low, 10);
        assert_eq!(c.clear(), 1);
        assert!(c.is_empty());
        assert_eq!(c.bytes(), 0);
        assert!(c.stats().to_string().contains("entries: 0"));
    }
}
