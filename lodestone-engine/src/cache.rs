//! Embedding cache.
//!
//! Caches (text, model) → vector so repeated queries and unchanged
//! chunk text skip the provider round-trip. Search results are never
//! cached: a search that begins after a write completes must observe
//! that write.

use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;

/// Cache key for embeddings.
#[derive(Clone, Eq, PartialEq, Hash)]
pub struct EmbeddingCacheKey {
    text: String,
    model: String,
}

impl EmbeddingCacheKey {
    pub fn new(text: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            model: model.into(),
        }
    }
}

/// Cache for embedding vectors.
pub struct EmbeddingCache {
    cache: Cache<EmbeddingCacheKey, Arc<Vec<f32>>>,
}

impl EmbeddingCache {
    pub fn new(max_capacity: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_live(ttl)
            .build();
        Self { cache }
    }

    pub async fn get(&self, key: &EmbeddingCacheKey) -> Option<Arc<Vec<f32>>> {
        self.cache.get(key).await
    }

    pub async fn insert(&self, key: EmbeddingCacheKey, value: Vec<f32>) {
        self.cache.insert(key, Arc::new(value)).await;
    }

    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cache_roundtrip() {
        let cache = EmbeddingCache::new(16, Duration::from_secs(60));
        let key = EmbeddingCacheKey::new("hello", "mock");
        assert!(cache.get(&key).await.is_none());

        cache.insert(key.clone(), vec![1.0, 0.0]).await;
        let hit = cache.get(&key).await.unwrap();
        assert_eq!(hit.as_slice(), &[1.0, 0.0]);

        // Distinct model is a distinct key.
        let other = EmbeddingCacheKey::new("hello", "openai");
        assert!(cache.get(&other).await.is_none());
    }
}
