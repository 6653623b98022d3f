//! Shared cache of compiled templates keyed by content.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use parking_lot::Mutex;

use super::CompiledTemplate;
use super::key::TemplateKey;

struct Entry {
    template: Arc<CompiledTemplate>,
    last_used: AtomicU64,
}

/// Thread-safe template cache with least-recently-used eviction.
pub struct TemplateCache {
    entries: DashMap<TemplateKey, Entry>,
    capacity: usize,
    clock: AtomicU64,
    /// Serializes inserts so the capacity check and eviction agree.
    insert_lock: Mutex<()>,
}

impl TemplateCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: DashMap::new(),
            capacity: capacity.max(1),
            clock: AtomicU64::new(0),
            insert_lock: Mutex::new(()),
        }
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed)
    }

    /// Cached artifact for `key`, only if it was compiled from `source`.
    pub fn get(&self, key: &TemplateKey, source: &str) -> Option<Arc<CompiledTemplate>> {
        let entry = self.entries.get(key)?;
        if entry.template.source() != source {
            crate::debug!("cache"; "key {} matched different source, ignoring", key);
            return None;
        }
        entry.last_used.store(self.tick(), Ordering::Relaxed);
        Some(Arc::clone(&entry.template))
    }

    pub fn insert(&self, template: Arc<CompiledTemplate>) {
        let _guard = self.insert_lock.lock();
        let key = template.key();

        if !self.entries.contains_key(&key) && self.entries.len() >= self.capacity {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|entry| entry.last_used.load(Ordering::Relaxed))
                .map(|entry| *entry.key());
            if let Some(oldest) = oldest {
                self.entries.remove(&oldest);
                crate::debug!("cache"; "evicted {}", oldest);
            }
        }

        let entry = Entry {
            template,
            last_used: AtomicU64::new(self.tick()),
        };
        self.entries.insert(key, entry);
    }

    pub fn contains(&self, key: &TemplateKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::library::Library;
    use crate::template::TemplateEngine;

    fn compiled(source: &str) -> Arc<CompiledTemplate> {
        // a capacity-1 engine keeps its own cache out of the way
        let engine = TemplateEngine::new(Arc::new(Library::standard()), 1);
        engine.compile(TemplateKey::of(source), source).unwrap()
    }

    #[test]
    fn test_get_checks_source() {
        let cache = TemplateCache::new(4);
        let template = compiled("<p>a</p>");
        let key = template.key();
        cache.insert(template);

        assert!(cache.get(&key, "<p>a</p>").is_some());
        assert!(cache.get(&key, "<p>b</p>").is_none());
        assert!(cache.get(&TemplateKey::of("<p>b</p>"), "<p>b</p>").is_none());
    }

    #[test]
    fn test_evicts_least_recently_used() {
        let cache = TemplateCache::new(2);
        let (a, b, c) = (compiled("a"), compiled("b"), compiled("c"));
        let (ka, kb, kc) = (a.key(), b.key(), c.key());

        cache.insert(a);
        cache.insert(b);
        // touch `a` so `b` becomes the oldest
        assert!(cache.get(&ka, "a").is_some());
        cache.insert(c);

        assert_eq!(cache.len(), 2);
        assert!(cache.contains(&ka));
        assert!(!cache.contains(&kb));
        assert!(cache.contains(&kc));
    }

    #[test]
    fn test_reinsert_does_not_evict() {
        let cache = TemplateCache::new(1);
        let a = compiled("a");
        cache.insert(Arc::clone(&a));
        cache.insert(a);
        assert_eq!(cache.len(), 1);
        cache.clear();
        assert!(cache.is_empty());
    }
}
