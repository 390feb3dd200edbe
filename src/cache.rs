//! Exact-match memoization of inference results.
//!
//! Unbounded and never evicted; lives as long as the [`PredictionCache`] value.
//! Two concurrent misses on the same vector may both run inference and both
//! insert; the last write wins, which is harmless because the model is
//! deterministic.

use crate::types::{CacheKey, FeatureVector};
use std::collections::HashMap;
use std::sync::RwLock;

/// Feature vector → class id memo shared by all requests
#[derive(Debug, Default)]
pub struct PredictionCache {
    entries: RwLock<HashMap<CacheKey, i64>>,
}

impl PredictionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a vector. Hit/miss accounting lives in `ServiceMetrics`.
    pub fn get(&self, features: &FeatureVector) -> Option<i64> {
        self.entries
            .read()
            .ok()
            .and_then(|entries| entries.get(&features.cache_key()).copied())
    }

    /// Remember the class predicted for a vector
    pub fn insert(&self, features: &FeatureVector, class_id: i64) {
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(features.cache_key(), class_id);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_miss_then_hit() {
        let cache = PredictionCache::new();
        let features = FeatureVector::new(5.1, 3.5, 1.4, 0.2);

        assert_eq!(cache.get(&features), None);
        cache.insert(&features, 0);
        assert_eq!(cache.get(&features), Some(0));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_no_tolerance_between_keys() {
        let cache = PredictionCache::new();
        cache.insert(&FeatureVector::new(5.1, 3.5, 1.4, 0.2), 0);

        assert_eq!(cache.get(&FeatureVector::new(5.1, 3.5, 1.4, 0.21)), None);
        assert_eq!(cache.get(&FeatureVector::new(5.0, 3.5, 1.4, 0.2)), None);
        assert_eq!(cache.get(&FeatureVector::new(5.1, 3.5, 1.4, 0.2)), Some(0));
    }

    #[test]
    fn test_last_write_wins() {
        let cache = PredictionCache::new();
        let features = FeatureVector::new(1.0, 2.0, 3.0, 4.0);
        cache.insert(&features, 1);
        cache.insert(&features, 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&features), Some(1));
    }

    #[test]
    fn test_shared_across_threads() {
        let cache = Arc::new(PredictionCache::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let cache = cache.clone();
                std::thread::spawn(move || {
                    let features = FeatureVector::new(i as f64, 0.0, 0.0, 0.0);
                    cache.insert(&features, i);
                    cache.get(&features)
                })
            })
            .collect();

        for (i, handle) in handles.into_iter().enumerate() {
            assert_eq!(handle.join().unwrap(), Some(i as i64));
        }
        assert_eq!(cache.len(), 8);
    }
}
