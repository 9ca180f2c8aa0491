use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::common::*;
use crate::scoring::cache::{InMemoryScoreCache, ScoreCache, SingleFlight};
use crate::scoring::calculator::ScoreCalculator;
use crate::scoring::domain::{ProfileId, ScoreMethod, ScoreMode};
use crate::scoring::fingerprint::CacheKey;

fn sample_key(method: ScoreMethod) -> CacheKey {
    CacheKey::derive(
        &profile(),
        &matching_opportunity().opportunity_id,
        method,
        ScoreMode::Fast,
    )
}

fn sample_result() -> crate::scoring::domain::ScoreResult {
    ScoreCalculator::new().calculate(&matching_opportunity(), &profile())
}

#[tokio::test]
async fn put_then_get_round_trips_within_ttl() {
    let cache = InMemoryScoreCache::new();
    let key = sample_key(ScoreMethod::Calculation);
    let result = sample_result();

    cache
        .put(&key, result.clone(), Duration::from_secs(60))
        .await
        .expect("cache write");

    let cached = cache.get(&key).await.expect("cache read");
    assert_eq!(cached, Some(result));
}

#[tokio::test]
async fn expired_entries_are_evicted_on_read() {
    let cache = InMemoryScoreCache::new();
    let key = sample_key(ScoreMethod::Calculation);

    cache
        .put(&key, sample_result(), Duration::ZERO)
        .await
        .expect("cache write");

    assert_eq!(cache.get(&key).await.expect("cache read"), None);
    assert!(cache.is_empty());
}

#[tokio::test]
async fn profile_invalidation_removes_only_tagged_entries() {
    let cache = InMemoryScoreCache::new();
    let calculation_key = sample_key(ScoreMethod::Calculation);
    let generative_key = sample_key(ScoreMethod::Generative);

    let mut other_profile = profile();
    other_profile.profile_id = ProfileId("prof-other".to_string());
    let other_key = CacheKey::derive(
        &other_profile,
        &matching_opportunity().opportunity_id,
        ScoreMethod::Calculation,
        ScoreMode::Fast,
    );

    let ttl = Duration::from_secs(60);
    cache.put(&calculation_key, sample_result(), ttl).await.expect("write");
    cache.put(&generative_key, sample_result(), ttl).await.expect("write");
    cache.put(&other_key, sample_result(), ttl).await.expect("write");

    let removed = cache
        .invalidate_profile(&ProfileId("prof-1".to_string()))
        .await
        .expect("invalidation");

    assert_eq!(removed, 2);
    assert_eq!(cache.get(&calculation_key).await.expect("read"), None);
    assert!(cache.get(&other_key).await.expect("read").is_some());
}

#[tokio::test]
async fn single_flight_coalesces_concurrent_computations() {
    let flight = Arc::new(SingleFlight::<u32>::new());
    let computations = Arc::new(AtomicU32::new(0));

    let compute = |flight: Arc<SingleFlight<u32>>, counter: Arc<AtomicU32>| async move {
        flight
            .run("key", || async {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok::<u32, std::convert::Infallible>(7)
            })
            .await
    };

    let (first, second) = tokio::join!(
        compute(flight.clone(), computations.clone()),
        compute(flight.clone(), computations.clone())
    );

    let (first_value, first_computed) = first.expect("first call succeeds");
    let (second_value, second_computed) = second.expect("second call succeeds");

    assert_eq!(first_value, 7);
    assert_eq!(second_value, 7);
    assert_eq!(computations.load(Ordering::SeqCst), 1);
    assert_eq!(
        [first_computed, second_computed].iter().filter(|c| **c).count(),
        1
    );
}

#[tokio::test]
async fn single_flight_releases_the_key_after_completion() {
    let flight = SingleFlight::<u32>::new();

    let (value, computed) = flight
        .run("key", || async { Ok::<u32, std::convert::Infallible>(1) })
        .await
        .expect("first run");
    assert!(computed);
    assert_eq!(value, 1);

    // A later call computes again rather than replaying the old value.
    let (value, computed) = flight
        .run("key", || async { Ok::<u32, std::convert::Infallible>(2) })
        .await
        .expect("second run");
    assert!(computed);
    assert_eq!(value, 2);
}
