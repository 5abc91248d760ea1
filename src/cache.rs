use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

/// Recently computed embeddings keyed by exact input text.
#[derive(Clone)]
pub struct EmbeddingCache {
    cache: Arc<Mutex<LruCache<String, Vec<f32>>>>,
}

impl EmbeddingCache {
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: Arc::new(Mutex::new(LruCache::new(cap))),
        }
    }

    pub fn insert(&self, text: &str, vector: Vec<f32>) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.put(text.to_string(), vector);
        }
    }

    pub fn get(&self, text: &str) -> Option<Vec<f32>> {
        let mut cache = self.cache.lock().ok()?;
        cache.get(text).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_lru() {
        let cache = EmbeddingCache::new(2);

        cache.insert("one", vec![1.0]);
        cache.insert("two", vec![2.0]);

        // Touch "one" so "two" becomes least recently used.
        assert_eq!(cache.get("one"), Some(vec![1.0]));

        cache.insert("three", vec![3.0]);
        assert!(cache.get("two").is_none());
        assert!(cache.get("one").is_some());
        assert!(cache.get("three").is_some());
    }

    #[test]
    fn test_zero_capacity_still_caches_one() {
        let cache = EmbeddingCache::new(0);
        cache.insert("a", vec![0.5]);
        assert_eq!(cache.get("a"), Some(vec![0.5]));
    }
}
