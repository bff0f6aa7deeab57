use crate::model::ResolutionOutcome;
use std::collections::HashMap;
use tokio::sync::Mutex;

/// Outcome memo shared by every worker of one scan. No eviction, the key
/// set is bounded by the candidate list.
#[derive(Debug, Default)]
pub struct ResolutionCache {
    entries: Mutex<HashMap<String, ResolutionOutcome>>,
}

impl ResolutionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, name: &str) -> Option<ResolutionOutcome> {
        self.entries.lock().await.get(name).cloned()
    }

    /// First write wins, the stored outcome is returned.
    pub async fn put(&self, name: String, outcome: ResolutionOutcome) -> ResolutionOutcome {
        self.entries
            .lock()
            .await
            .entry(name)
            .or_insert(outcome)
            .clone()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::ResolutionCache;
    use crate::model::ResolutionOutcome;

    #[tokio::test]
    async fn read_after_write() {
        let cache = ResolutionCache::new();
        assert!(cache.is_empty().await);
        assert_eq!(None, cache.get("www.example.com").await);

        let outcome = ResolutionOutcome::Resolved(vec!["10.0.0.1".to_string()]);
        cache.put("www.example.com".to_string(), outcome.clone()).await;

        assert_eq!(Some(outcome), cache.get("www.example.com").await);
        assert_eq!(1, cache.len().await);
    }

    #[tokio::test]
    async fn first_write_wins() {
        let cache = ResolutionCache::new();
        let unresolved = ResolutionOutcome::Unresolved { reason: None };
        let resolved = ResolutionOutcome::Resolved(vec!["10.0.0.1".to_string()]);

        let stored = cache.put("x.example.com".to_string(), unresolved.clone()).await;
        assert_eq!(unresolved, stored);

        let stored = cache.put("x.example.com".to_string(), resolved).await;
        assert_eq!(unresolved, stored);
        assert_eq!(Some(unresolved), cache.get("x.example.com").await);
    }
}
