use std::{collections::HashMap, net::SocketAddr, sync::Arc};

use anyhow::Context as AnyhowContext;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tokio::{net::TcpListener, signal};

use crate::{
    cli::CliArgs,
    error::Result,
    fanout,
    features,
    lookup::{LookupSource, PartLookupCache, WarehouseSource},
    predict::{PredictionClient, PredictionOutcome, PredictionResult},
    registry::Registry,
};

#[derive(Clone)]
struct ServerState {
    client: Arc<PredictionClient>,
    cache: Arc<PartLookupCache>,
    fanout_workers: usize,
}

impl ServerState {
    fn registry(&self) -> &Registry {
        self.client.registry()
    }
}

pub async fn run(args: &CliArgs) -> Result<()> {
    let addr: SocketAddr = args
        .listen
        .parse()
        .with_context(|| format!("parsing listen address `{}`", args.listen))?;
    url::Url::parse(&args.base_url)
        .with_context(|| format!("parsing upstream base URL `{}`", args.base_url))?;

    let registry = Arc::new(args.registry());
    let client = Arc::new(
        PredictionClient::new(registry.clone(), args.timeout())
            .context("building upstream HTTP client")?,
    );

    let source = match args.warehouse() {
        Some(config) => {
            tracing::info!(host = %config.host, "part-number lookups backed by SQL warehouse");
            Some(Arc::new(WarehouseSource::new(config, reqwest::Client::new()))
                as Arc<dyn LookupSource>)
        }
        None => {
            tracing::info!("no warehouse configured, part-number lookups use the static table");
            None
        }
    };
    let cache = Arc::new(PartLookupCache::new(source, args.cache_ttl()));

    let state = ServerState {
        client,
        cache,
        fanout_workers: args.fanout_workers,
    };

    let listener = TcpListener::bind(addr)
        .await
        .context("binding gateway listen address")?;
    tracing::info!(
        "gateway listening on http://{}",
        listener.local_addr().unwrap_or(addr)
    );

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            if let Err(err) = signal::ctrl_c().await {
                tracing::warn!("failed to listen for shutdown signal: {err:?}");
            }
            tracing::info!("shutdown signal received, stopping gateway");
        })
        .await
        .context("running gateway server")?;

    Ok(())
}

fn router(state: ServerState) -> Router {
    Router::new()
        .route("/api/models", get(list_models))
        .route("/api/predict", post(predict_one))
        .route("/api/predict/all", post(predict_all))
        .route("/api/part-number", get(part_number))
        .route("/api/sku-lookup", get(sku_lookup))
        .route("/api/feature-availability", get(feature_availability))
        .route("/api/health", get(health))
        .route("/metrics", get(metrics))
        .with_state(state)
}

struct ApiError {
    status: StatusCode,
    body: Value,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            body: json!({ "error": message.into() }),
        }
    }

    fn not_found(body: Value) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            body,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

async fn list_models(State(state): State<ServerState>) -> Json<Value> {
    let mut models = Map::new();
    for descriptor in state.registry().models() {
        models.insert(
            descriptor.key.clone(),
            json!({
                "name": &descriptor.name,
                "key": &descriptor.key,
                "description": &descriptor.description,
                "input_schema": &descriptor.input_schema,
                "sample_input": &descriptor.sample_input,
            }),
        );
    }
    Json(Value::Object(models))
}

#[derive(Debug, Deserialize)]
struct PredictRequest {
    model: Option<String>,
    input: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct PredictAllRequest {
    input: Option<Value>,
}

fn success_body(result: &PredictionResult) -> Value {
    match &result.outcome {
        PredictionOutcome::Success { model, prediction } => json!({
            "success": true,
            "model": model,
            "prediction": prediction,
        }),
        PredictionOutcome::Failure { .. } => Value::Null,
    }
}

fn failure_body(result: &PredictionResult) -> Value {
    match &result.outcome {
        PredictionOutcome::Failure { error, status_code } => {
            let mut body = Map::new();
            body.insert("success".to_owned(), Value::Bool(false));
            body.insert("error".to_owned(), Value::String(error.clone()));
            if let Some(code) = status_code {
                body.insert("status_code".to_owned(), Value::Number((*code).into()));
            }
            Value::Object(body)
        }
        PredictionOutcome::Success { .. } => Value::Null,
    }
}

async fn predict_one(
    State(state): State<ServerState>,
    Json(request): Json<PredictRequest>,
) -> Response {
    let model_key = match request.model {
        Some(key) if !key.is_empty() => key,
        _ => return ApiError::bad_request("Model key is required").into_response(),
    };
    let input = match request.input {
        Some(input) if !input.is_null() => input,
        _ => return ApiError::bad_request("Input data is required").into_response(),
    };

    let result = state.client.predict(&model_key, &input).await;
    if result.is_success() {
        Json(success_body(&result)).into_response()
    } else {
        (StatusCode::INTERNAL_SERVER_ERROR, Json(failure_body(&result))).into_response()
    }
}

async fn predict_all(
    State(state): State<ServerState>,
    Json(request): Json<PredictAllRequest>,
) -> Response {
    let input = match request.input {
        Some(input) if !input.is_null() => input,
        _ => return ApiError::bad_request("Input data is required").into_response(),
    };

    let aggregated = fanout::predict_all(state.client.clone(), &input, state.fanout_workers).await;

    let results: Map<String, Value> = aggregated
        .successes
        .iter()
        .map(|(key, result)| (key.clone(), success_body(result)))
        .collect();
    let errors: Map<String, Value> = aggregated
        .failures
        .iter()
        .map(|(key, result)| (key.clone(), failure_body(result)))
        .collect();

    let mut body = json!({
        "success": aggregated.any_success(),
        "total_models": aggregated.total(),
        "successful_predictions": aggregated.successes.len(),
        "failed_predictions": aggregated.failures.len(),
        "results": results,
    });
    if !errors.is_empty() {
        body["errors"] = Value::Object(errors);
    }

    let status = if aggregated.any_success() {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (status, Json(body)).into_response()
}

async fn part_number(
    State(state): State<ServerState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    // `skugroup` is accepted as an alias for `SKUGroup`.
    let sku_group = params
        .get("SKUGroup")
        .or_else(|| params.get("skugroup"))
        .map(String::as_str)
        .unwrap_or_default();
    let region = params.get("region").map(String::as_str).unwrap_or_default();

    if sku_group.is_empty() || region.is_empty() {
        return ApiError::bad_request("SKUGroup and region query parameters are required")
            .into_response();
    }

    match state.cache.part_number(sku_group, region).await {
        Some(part) => Json(json!({
            "SKUGroup": sku_group,
            "region": region,
            "part_number": part,
        }))
        .into_response(),
        None => ApiError::not_found(json!({
            "SKUGroup": sku_group,
            "region": region,
            "part_number": Value::Null,
        }))
        .into_response(),
    }
}

async fn sku_lookup(
    State(state): State<ServerState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let sku = params.get("sku").map(String::as_str).unwrap_or_default();
    if sku.is_empty() {
        return ApiError::bad_request("sku query parameter is required").into_response();
    }

    match state.cache.sku_details(sku).await {
        Some(details) => Json(json!({
            "sku": sku,
            "sku_group": details.sku_group,
            "region": details.region,
        }))
        .into_response(),
        None => ApiError::not_found(json!({
            "sku": sku,
            "sku_group": Value::Null,
            "region": Value::Null,
        }))
        .into_response(),
    }
}

async fn feature_availability(Query(params): Query<HashMap<String, String>>) -> Response {
    let part = params
        .get("part_number")
        .map(String::as_str)
        .unwrap_or_default();
    if part.is_empty() {
        return ApiError::bad_request("part_number query parameter is required").into_response();
    }

    match features::features_for(part) {
        Some(features) => Json(json!({
            "part_number": part,
            "features": features,
        }))
        .into_response(),
        None => ApiError::not_found(json!({
            "part_number": part,
            "features": Value::Null,
        }))
        .into_response(),
    }
}

async fn health(State(state): State<ServerState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "models_configured": state.registry().len(),
    }))
}

async fn metrics() -> &'static str {
    "ok"
}
