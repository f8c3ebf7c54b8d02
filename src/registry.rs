//! Model registry: descriptors for every upstream serving endpoint.
//!
//! Two catalog flavors exist. The static catalog carries the three
//! shipping-cost models with their full input schemas. The generated catalog
//! stamps out `Model-1`..`Model-N` from a template, cycling sample inputs
//! from the static pool. Both are computed once at startup and never mutated.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{json, Value};

/// Immutable description of one upstream model-serving endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ModelDescriptor {
    pub key: String,
    pub name: String,
    pub model_name: String,
    pub url: String,
    #[serde(skip_serializing)]
    pub token: String,
    pub description: String,
    pub input_schema: BTreeMap<String, InputField>,
    pub sample_input: Value,
}

/// One field of a model's input schema, mirroring the serving endpoint's
/// expected columns.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InputField {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub description: &'static str,
    pub min: f64,
    pub max: f64,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub dropdown: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<FieldOption>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldOption {
    pub value: i64,
    pub text: &'static str,
}

impl InputField {
    fn numeric(kind: &'static str, description: &'static str, min: f64, max: f64) -> Self {
        Self {
            kind,
            description,
            min,
            max,
            dropdown: false,
            options: Vec::new(),
        }
    }

    fn dropdown(
        description: &'static str,
        min: f64,
        max: f64,
        options: Vec<FieldOption>,
    ) -> Self {
        Self {
            kind: "long",
            description,
            min,
            max,
            dropdown: true,
            options,
        }
    }
}

/// Lookup table from model key to endpoint descriptor. Immutable after
/// construction; `models()` iterates in key order.
#[derive(Debug)]
pub struct Registry {
    models: BTreeMap<String, ModelDescriptor>,
}

impl Registry {
    pub fn new(descriptors: Vec<ModelDescriptor>) -> Self {
        let models = descriptors
            .into_iter()
            .map(|descriptor| (descriptor.key.clone(), descriptor))
            .collect();
        Self { models }
    }

    /// Static catalog: the three shipping-cost models served upstream.
    pub fn shipping_catalog(base_url: &str, token: &str) -> Self {
        Self::new(shipping_descriptors(base_url, token))
    }

    /// Generated catalog: `count` near-identical descriptors stamped from a
    /// template, sample inputs assigned cyclically from the shipping pool.
    pub fn generated_catalog(base_url: &str, token: &str, count: usize) -> Self {
        Self::new(generate_descriptors(base_url, token, count))
    }

    pub fn resolve(&self, key: &str) -> Option<&ModelDescriptor> {
        self.models.get(key)
    }

    pub fn models(&self) -> impl Iterator<Item = &ModelDescriptor> {
        self.models.values()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.models.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }
}

fn shipping_input_schema() -> BTreeMap<String, InputField> {
    let region_options = vec![
        FieldOption { value: 1, text: "R1" },
        FieldOption { value: 2, text: "R2" },
        FieldOption { value: 3, text: "R3" },
        FieldOption { value: 4, text: "R4" },
    ];
    let product_options = vec![
        FieldOption { value: 1408, text: "D1408" },
        FieldOption { value: 1601, text: "D1601" },
        FieldOption { value: 303, text: "D0303" },
    ];

    let mut schema = BTreeMap::new();
    schema.insert(
        "lead_time_days".to_owned(),
        InputField::numeric("double", "Expected delivery time in days", 1.0, 365.0),
    );
    schema.insert(
        "supplier_reliability_score".to_owned(),
        InputField::numeric("double", "Supplier reliability rating (0-100)", 0.0, 100.0),
    );
    schema.insert(
        "weather_condition_severity".to_owned(),
        InputField::numeric("double", "Weather impact severity score (0-10)", 0.0, 10.0),
    );
    schema.insert(
        "route_risk_level".to_owned(),
        InputField::numeric("double", "Route security and safety risk (0-10)", 0.0, 10.0),
    );
    schema.insert(
        "disruption_likelihood_score".to_owned(),
        InputField::numeric(
            "double",
            "Probability of shipping disruptions (0-100)",
            0.0,
            100.0,
        ),
    );
    schema.insert(
        "risk_classification".to_owned(),
        InputField::numeric("long", "Risk category classification (1-4)", 1.0, 4.0),
    );
    schema.insert(
        "supplier_country".to_owned(),
        InputField::dropdown("Region code", 1.0, 4.0, region_options),
    );
    schema.insert(
        "product_id".to_owned(),
        InputField::dropdown("MGC5 product code", 303.0, 1601.0, product_options),
    );
    schema
}

/// Sample payloads used both by the static catalog and as the cyclic pool
/// for generated catalogs.
pub fn sample_input_pool() -> Vec<Value> {
    vec![
        json!({
            "lead_time_days": 14.5,
            "supplier_reliability_score": 85.2,
            "weather_condition_severity": 3.1,
            "route_risk_level": 2.8,
            "disruption_likelihood_score": 15.6,
            "risk_classification": 3,
            "supplier_country": 2,
            "product_id": 1408
        }),
        json!({
            "lead_time_days": 10.0,
            "supplier_reliability_score": 90.0,
            "weather_condition_severity": 2.5,
            "route_risk_level": 2.0,
            "disruption_likelihood_score": 12.0,
            "risk_classification": 2,
            "supplier_country": 1,
            "product_id": 1601
        }),
        json!({
            "lead_time_days": 7.0,
            "supplier_reliability_score": 88.0,
            "weather_condition_severity": 2.0,
            "route_risk_level": 1.5,
            "disruption_likelihood_score": 10.0,
            "risk_classification": 2,
            "supplier_country": 3,
            "product_id": 303
        }),
    ]
}

fn shipping_descriptors(base_url: &str, token: &str) -> Vec<ModelDescriptor> {
    let base = base_url.trim_end_matches('/');
    let samples = sample_input_pool();

    let specs = [
        (
            "shipping_cost_90th_percentile",
            "Shipping Cost 90th Percentile Model",
            "shipping_cost_90th_percentile-1",
            "shipping-cost-90th-percentile-1",
            "Predicts 90th percentile shipping costs for worst-case scenario planning",
        ),
        (
            "shipping_cost_10th_percentile",
            "Shipping Cost 10th Percentile",
            "shipping_cost_xgboost-1",
            "shipping-cost-10th-percentile-1",
            "XGBoost-based shipping cost prediction model for general use cases",
        ),
        (
            "shipping_cost_median",
            "Shipping Cost Median Model",
            "shipping_cost_median-1",
            "shipping-cost-xgboost-1",
            "Median-based shipping cost prediction for balanced estimates",
        ),
    ];

    specs
        .iter()
        .enumerate()
        .map(|(i, (key, name, model_name, served_model, description))| ModelDescriptor {
            key: (*key).to_owned(),
            name: (*name).to_owned(),
            model_name: (*model_name).to_owned(),
            url: format!("{base}/served-models/{served_model}/invocations"),
            token: token.to_owned(),
            description: (*description).to_owned(),
            input_schema: shipping_input_schema(),
            sample_input: samples[i % samples.len()].clone(),
        })
        .collect()
}

fn generate_descriptors(base_url: &str, token: &str, count: usize) -> Vec<ModelDescriptor> {
    let base = base_url.trim_end_matches('/');
    let samples = sample_input_pool();

    (1..=count)
        .map(|i| ModelDescriptor {
            key: format!("model_{i}"),
            name: format!("Model-{i}"),
            model_name: format!("model-{i}"),
            url: format!("{base}/served-models/model-{i}/invocations"),
            token: token.to_owned(),
            description: format!("Generated serving endpoint Model-{i}"),
            input_schema: shipping_input_schema(),
            sample_input: samples[(i - 1) % samples.len()].clone(),
        })
        .collect()
}
