//! Prediction client for upstream model-serving endpoints.
//!
//! `predict` is a total function: every failure mode (unknown model,
//! transport error, non-200 status, unparseable body) resolves to a
//! `PredictionResult` with a failure outcome. Callers pattern-match on the
//! outcome instead of catching errors.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, ClientBuilder};
use serde_json::{json, Value};

use crate::error::Result;
use crate::registry::Registry;

/// Outcome of one upstream prediction call.
#[derive(Debug, Clone)]
pub enum PredictionOutcome {
    Success {
        /// Display name of the model that answered.
        model: String,
        /// Parsed upstream response body, passed through opaquely.
        prediction: Value,
    },
    Failure {
        error: String,
        /// Present for upstream application errors, absent for transport
        /// failures.
        status_code: Option<u16>,
    },
}

#[derive(Debug, Clone)]
pub struct PredictionResult {
    pub model_key: String,
    pub outcome: PredictionOutcome,
}

impl PredictionResult {
    pub fn success(model_key: impl Into<String>, model: String, prediction: Value) -> Self {
        Self {
            model_key: model_key.into(),
            outcome: PredictionOutcome::Success { model, prediction },
        }
    }

    pub fn failure(
        model_key: impl Into<String>,
        error: impl Into<String>,
        status_code: Option<u16>,
    ) -> Self {
        Self {
            model_key: model_key.into(),
            outcome: PredictionOutcome::Failure {
                error: error.into(),
                status_code,
            },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, PredictionOutcome::Success { .. })
    }
}

/// Shape an arbitrary JSON input into the payload the serving endpoint
/// expects. Two known upstream request shapes pass through unchanged;
/// everything else is wrapped under `instances`.
pub fn shape_payload(input: &Value) -> Value {
    match input {
        Value::Object(map) if map.contains_key("dataframe_split") => input.clone(),
        Value::Object(map) if map.contains_key("instances") => input.clone(),
        Value::Array(_) => json!({ "instances": input }),
        other => json!({ "instances": [other] }),
    }
}

/// HTTP client bound to a model registry.
#[derive(Debug)]
pub struct PredictionClient {
    registry: Arc<Registry>,
    http: Client,
}

impl PredictionClient {
    /// Build a client. Without a timeout upstream calls may block
    /// indefinitely; callers opt into that by leaving it unset.
    pub fn new(registry: Arc<Registry>, timeout: Option<Duration>) -> Result<Self> {
        let mut builder = ClientBuilder::new();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build()?;
        Ok(Self { registry, http })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Run one prediction against the endpoint registered under `model_key`.
    pub async fn predict(&self, model_key: &str, input: &Value) -> PredictionResult {
        let descriptor = match self.registry.resolve(model_key) {
            Some(descriptor) => descriptor,
            None => {
                return PredictionResult::failure(
                    model_key,
                    format!("Unknown model: {model_key}"),
                    None,
                )
            }
        };

        let payload = shape_payload(input);
        tracing::info!(model = %descriptor.name, url = %descriptor.url, "making prediction");

        let response = self
            .http
            .post(&descriptor.url)
            .bearer_auth(&descriptor.token)
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await;

        let response = match response {
            Ok(response) => response,
            Err(err) => {
                let error = format!("Request failed: {err}");
                tracing::error!(model = %descriptor.name, "{error}");
                return PredictionResult::failure(model_key, error, None);
            }
        };

        let status = response.status().as_u16();
        if status != 200 {
            let body = response.text().await.unwrap_or_default();
            let error = format!("API request failed with status {status}: {body}");
            tracing::error!(model = %descriptor.name, "{error}");
            return PredictionResult::failure(model_key, error, Some(status));
        }

        match response.json::<Value>().await {
            Ok(prediction) => {
                tracing::info!(model = %descriptor.name, "prediction successful");
                PredictionResult::success(model_key, descriptor.name.clone(), prediction)
            }
            Err(err) => {
                let error = format!("Unexpected error: {err}");
                tracing::error!(model = %descriptor.name, "{error}");
                PredictionResult::failure(model_key, error, None)
            }
        }
    }
}
