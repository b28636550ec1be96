//! Height-aware selection distribution over a live-probed pool.

use std::{collections::HashMap, collections::HashSet, sync::Arc};

use chaingate_core::upstream::EndpointPool;

use crate::support::{upstream, REFRESH, TEST_CHAIN, TIMEOUT};

#[tokio::test]
async fn test_highest_endpoint_always_wins() {
    let ahead = upstream(100).await;
    let behind_a = upstream(99).await;
    let behind_b = upstream(99).await;
    let behind_c = upstream(99).await;

    let pool = Arc::new(EndpointPool::new(
        TEST_CHAIN,
        &[ahead.url(), behind_a.url(), behind_b.url(), behind_c.url()],
        TIMEOUT,
        REFRESH,
    ));
    for endpoint in pool.endpoints() {
        endpoint.probe().await.expect("probe mock upstream");
    }

    for _ in 0..1000 {
        let picked = pool.pick(1, &HashSet::new());
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].url(), ahead.url());
    }
}

#[tokio::test]
async fn test_tied_endpoints_are_picked_uniformly() {
    let ahead = upstream(100).await;
    let behind_a = upstream(99).await;
    let behind_b = upstream(99).await;
    let behind_c = upstream(99).await;

    let pool = Arc::new(EndpointPool::new(
        TEST_CHAIN,
        &[ahead.url(), behind_a.url(), behind_b.url(), behind_c.url()],
        TIMEOUT,
        REFRESH,
    ));
    for endpoint in pool.endpoints() {
        endpoint.probe().await.expect("probe mock upstream");
    }

    let exclude: HashSet<String> = [ahead.url()].into_iter().collect();
    let mut counts: HashMap<String, u32> = HashMap::new();
    let draws = 1200u32;
    for _ in 0..draws {
        let picked = pool.pick(1, &exclude);
        assert_eq!(picked.len(), 1);
        *counts.entry(picked[0].url().to_string()).or_default() += 1;
    }

    // Chi-squared against the uniform expectation of 400 per endpoint; the
    // 99.9% critical value for 2 degrees of freedom is 13.8.
    let expected = f64::from(draws) / 3.0;
    let chi_squared: f64 = [behind_a.url(), behind_b.url(), behind_c.url()]
        .iter()
        .map(|url| {
            let observed = f64::from(counts.get(url.as_str()).copied().unwrap_or(0));
            (observed - expected).powi(2) / expected
        })
        .sum();

    assert!(chi_squared < 13.8, "selection skewed: chi^2 = {chi_squared}, counts = {counts:?}");
    assert_eq!(counts.values().sum::<u32>(), draws);
    assert!(!counts.contains_key(&ahead.url()), "excluded endpoint must never be picked");
}
