use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;

use super::domain::{ProfileId, ScoreResult};
use super::fingerprint::CacheKey;

/// Cache backend failure. Read and write failures degrade to uncached
/// computation; they are never surfaced as request failures.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),
}

/// Content-addressable score cache keyed by the derived cache key.
#[async_trait]
pub trait ScoreCache: Send + Sync {
    async fn get(&self, key: &CacheKey) -> Result<Option<ScoreResult>, CacheError>;

    async fn put(&self, key: &CacheKey, value: ScoreResult, ttl: Duration)
        -> Result<(), CacheError>;

    /// Drop every entry tagged with this profile; returns the count removed.
    async fn invalidate_profile(&self, profile_id: &ProfileId) -> Result<usize, CacheError>;
}

struct CacheEntry {
    value: ScoreResult,
    created_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn expired(&self, now: Instant) -> bool {
        now.duration_since(self.created_at) >= self.ttl
    }
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    profile_tags: HashMap<String, HashSet<String>>,
}

/// Mutex-guarded in-memory cache with TTL eviction on read and a
/// profile-tag index for targeted invalidation.
#[derive(Default, Clone)]
pub struct InMemoryScoreCache {
    state: Arc<Mutex<CacheState>>,
}

impl InMemoryScoreCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries; test observability.
    pub fn len(&self) -> usize {
        self.state.lock().expect("cache mutex poisoned").entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ScoreCache for InMemoryScoreCache {
    async fn get(&self, key: &CacheKey) -> Result<Option<ScoreResult>, CacheError> {
        let rendered = key.render();
        let mut state = self.state.lock().expect("cache mutex poisoned");
        let now = Instant::now();

        let expired = state
            .entries
            .get(&rendered)
            .map(|entry| entry.expired(now));
        match expired {
            Some(true) => {
                state.entries.remove(&rendered);
                if let Some(tagged) = state.profile_tags.get_mut(&key.profile_id.0) {
                    tagged.remove(&rendered);
                }
                Ok(None)
            }
            Some(false) => Ok(state.entries.get(&rendered).map(|entry| entry.value.clone())),
            None => Ok(None),
        }
    }

    async fn put(
        &self,
        key: &CacheKey,
        value: ScoreResult,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let rendered = key.render();
        let mut state = self.state.lock().expect("cache mutex poisoned");

        state.entries.insert(
            rendered.clone(),
            CacheEntry {
                value,
                created_at: Instant::now(),
                ttl,
            },
        );
        state
            .profile_tags
            .entry(key.profile_id.0.clone())
            .or_default()
            .insert(rendered);
        Ok(())
    }

    async fn invalidate_profile(&self, profile_id: &ProfileId) -> Result<usize, CacheError> {
        let mut state = self.state.lock().expect("cache mutex poisoned");
        let Some(tagged) = state.profile_tags.remove(&profile_id.0) else {
            return Ok(0);
        };

        let mut removed = 0;
        for rendered in tagged {
            if state.entries.remove(&rendered).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }
}

/// Guarantees at-most-one concurrent computation per key: the first caller
/// computes, concurrent callers for the same key await its value.
pub struct SingleFlight<T> {
    inflight: tokio::sync::Mutex<HashMap<String, Arc<tokio::sync::OnceCell<T>>>>,
}

impl<T: Clone> SingleFlight<T> {
    pub fn new() -> Self {
        Self {
            inflight: tokio::sync::Mutex::new(HashMap::new()),
        }
    }

    /// Run `compute` for `key`, coalescing concurrent callers. Returns the
    /// value and whether this caller performed the computation itself.
    pub async fn run<E, F, Fut>(&self, key: &str, compute: F) -> Result<(T, bool), E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let cell = {
            let mut inflight = self.inflight.lock().await;
            inflight
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::OnceCell::new()))
                .clone()
        };

        let computed = std::sync::atomic::AtomicBool::new(false);
        let result = cell
            .get_or_try_init(|| {
                computed.store(true, std::sync::atomic::Ordering::Relaxed);
                compute()
            })
            .await
            .cloned();

        // The entry is removed regardless of outcome so a failed computation
        // does not poison the key for later callers.
        let mut inflight = self.inflight.lock().await;
        inflight.remove(key);

        result.map(|value| (value, computed.load(std::sync::atomic::Ordering::Relaxed)))
    }
}

impl<T: Clone> Default for SingleFlight<T> {
    fn default() -> Self {
        Self::new()
    }
}
