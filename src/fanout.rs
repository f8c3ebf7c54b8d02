//! Fan-out aggregator: one prediction per registered model, bounded
//! concurrency, best-effort aggregation.
//!
//! Each model gets its own task; a semaphore caps how many upstream calls
//! run at once. Results are collected through an explicit join barrier and
//! routed into successes or failures by outcome. No retries, no cross-model
//! ordering, and no fan-out-level deadline: each call is bounded only by the
//! client's own per-request timeout (or not at all if none is configured).

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::predict::{PredictionClient, PredictionResult};

/// Default number of concurrent upstream calls.
pub const DEFAULT_WORKERS: usize = 3;

/// Merged outcome of predicting across every registered model.
#[derive(Debug)]
pub struct Aggregated {
    /// Model key -> successful result.
    pub successes: BTreeMap<String, PredictionResult>,
    /// Model key -> failed result.
    pub failures: BTreeMap<String, PredictionResult>,
}

impl Aggregated {
    pub fn total(&self) -> usize {
        self.successes.len() + self.failures.len()
    }

    /// The batch counts as successful when at least one model answered.
    pub fn any_success(&self) -> bool {
        !self.successes.is_empty()
    }
}

/// Predict against every registered model concurrently and merge the
/// results. A failed model never aborts the batch or affects the others.
pub async fn predict_all(
    client: Arc<PredictionClient>,
    input: &serde_json::Value,
    workers: usize,
) -> Aggregated {
    let semaphore = Arc::new(Semaphore::new(workers.max(1)));
    let keys: Vec<String> = client.registry().keys().map(str::to_owned).collect();

    let mut handles = Vec::with_capacity(keys.len());
    for key in keys {
        let semaphore = semaphore.clone();
        let client = client.clone();
        let input = input.clone();
        let task_key = key.clone();
        let handle = tokio::spawn(async move {
            // Semaphore is never closed while tasks hold clones of it.
            let _permit = semaphore
                .acquire_owned()
                .await
                .expect("fan-out semaphore closed");
            client.predict(&task_key, &input).await
        });
        handles.push((key, handle));
    }

    let mut aggregated = Aggregated {
        successes: BTreeMap::new(),
        failures: BTreeMap::new(),
    };

    // Join barrier: every registered key produces exactly one result, in
    // whatever order the calls happen to finish.
    for (key, handle) in handles {
        let result = match handle.await {
            Ok(result) => result,
            Err(err) => {
                tracing::error!(model = %key, "prediction task panicked: {err}");
                PredictionResult::failure(&key, format!("Unexpected error: {err}"), None)
            }
        };
        if result.is_success() {
            aggregated.successes.insert(key, result);
        } else {
            aggregated.failures.insert(key, result);
        }
    }

    aggregated
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::time::Duration;

    use httpmock::prelude::*;
    use serde_json::json;

    use crate::registry::Registry;

    fn client_for(base_url: &str) -> Arc<PredictionClient> {
        let registry = Arc::new(Registry::shipping_catalog(base_url, "tok"));
        Arc::new(PredictionClient::new(registry, Some(Duration::from_secs(2))).unwrap())
    }

    #[tokio::test]
    async fn every_registered_key_appears_exactly_once() {
        let server = MockServer::start_async().await;
        // Only the median endpoint answers; the other two 404 inside the mock
        // server, so the batch is mixed.
        server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/served-models/shipping-cost-xgboost-1/invocations");
                then.status(200).json_body(json!({"predictions": [1.0]}));
            })
            .await;

        let client = client_for(&server.base_url());
        let aggregated = predict_all(client.clone(), &json!({"lead_time_days": 7.0}), 3).await;

        let mut seen = BTreeSet::new();
        for key in aggregated.successes.keys().chain(aggregated.failures.keys()) {
            assert!(seen.insert(key.clone()), "duplicate key {key}");
        }
        let expected: BTreeSet<String> =
            client.registry().keys().map(str::to_owned).collect();
        assert_eq!(seen, expected);
    }

    #[tokio::test]
    async fn all_failures_reports_no_success() {
        // Nothing is listening on port 1; every call fails at transport level.
        let client = client_for("http://127.0.0.1:1");
        let aggregated = predict_all(client, &json!({"a": 1}), 3).await;

        assert!(!aggregated.any_success());
        assert_eq!(aggregated.successes.len(), 0);
        assert_eq!(aggregated.failures.len(), 3);
        assert_eq!(aggregated.total(), 3);
    }

    #[tokio::test]
    async fn one_success_makes_the_batch_successful() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/served-models/shipping-cost-90th-percentile-1/invocations");
                then.status(200).json_body(json!({"predictions": [9.9]}));
            })
            .await;
        for path in [
            "/served-models/shipping-cost-10th-percentile-1/invocations",
            "/served-models/shipping-cost-xgboost-1/invocations",
        ] {
            server
                .mock_async(|when, then| {
                    when.method(POST).path(path);
                    then.status(500).body("boom");
                })
                .await;
        }

        let client = client_for(&server.base_url());
        let aggregated = predict_all(client, &json!({"a": 1}), 3).await;

        assert!(aggregated.any_success());
        assert!(aggregated
            .successes
            .contains_key("shipping_cost_90th_percentile"));
        assert_eq!(aggregated.failures.len(), 2);
    }

    #[tokio::test]
    async fn worker_cap_of_one_still_covers_all_models() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST);
                then.status(200).json_body(json!({"predictions": [0.5]}));
            })
            .await;

        let client = client_for(&server.base_url());
        let aggregated = predict_all(client, &json!({"a": 1}), 1).await;

        assert_eq!(aggregated.successes.len(), 3);
        assert!(aggregated.failures.is_empty());
    }
}
