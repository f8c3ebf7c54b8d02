//! Part-number lookup cache with TTL refresh and static fallback.
//!
//! The forward mapping `(sku_group, region) -> part_number` is the single
//! source of truth; the reverse SKU lookup is a linear scan over it, which is
//! fine while the table stays at tens of rows. Refreshes come from a
//! pluggable `LookupSource`; when the source fails or returns nothing, the
//! cache falls back to the built-in static table and still advances its
//! refresh timestamp so a failing source is not hammered on every call.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use once_cell::sync::Lazy;
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;

/// One row of the part-number table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartRow {
    pub sku_group: String,
    pub region: String,
    pub part_number: String,
}

/// Result of a reverse lookup from part number to its SKU coordinates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkuDetails {
    pub sku_group: String,
    pub region: String,
    pub part_number: String,
}

/// Errors a lookup source can report. They never reach API callers; the
/// cache converts them into a fallback to the static table.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("lookup source request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("lookup source returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("lookup source payload malformed: {0}")]
    Malformed(String),
}

/// External origin of the part-number table. Boxed futures keep the trait
/// object-safe so tests can drop in counting fakes.
pub trait LookupSource: Send + Sync {
    fn fetch_rows(&self) -> BoxFuture<'_, Result<Vec<PartRow>, SourceError>>;
}

/// Static fallback table, keyed by `(sku_group, region)`.
static FALLBACK_TABLE: Lazy<HashMap<(String, String), String>> = Lazy::new(|| {
    let rows = [
        ("D1408", "R1", "PN-140801"),
        ("D1408", "R2", "PN-140802"),
        ("D1408", "R3", "PN-140803"),
        ("D1408", "R4", "PN-140804"),
        ("D1601", "R1", "PN-160101"),
        ("D1601", "R2", "PN-160102"),
        ("D1601", "R3", "PN-160103"),
        ("D1601", "R4", "PN-160104"),
        ("D0303", "R1", "PN-030301"),
        ("D0303", "R2", "PN-030302"),
        ("D0303", "R3", "PN-030303"),
        ("D0303", "R4", "PN-030304"),
    ];
    rows.iter()
        .map(|(group, region, part)| {
            (((*group).to_owned(), (*region).to_owned()), (*part).to_owned())
        })
        .collect()
});

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<(String, String), String>,
    refreshed_at: Option<Instant>,
}

impl CacheState {
    fn is_fresh(&self, ttl: Duration) -> bool {
        match self.refreshed_at {
            Some(at) => at.elapsed() < ttl,
            None => false,
        }
    }
}

/// TTL-refreshed part-number cache. The only shared mutable state in the
/// gateway; readers always see a complete mapping because refreshes swap it
/// under the write lock in one step.
pub struct PartLookupCache {
    source: Option<Arc<dyn LookupSource>>,
    ttl: Duration,
    state: RwLock<CacheState>,
    /// Serializes refresh attempts; single-writer-wins on concurrent expiry.
    refresh_gate: Mutex<()>,
}

impl PartLookupCache {
    pub fn new(source: Option<Arc<dyn LookupSource>>, ttl: Duration) -> Self {
        Self {
            source,
            ttl,
            state: RwLock::new(CacheState::default()),
            refresh_gate: Mutex::new(()),
        }
    }

    /// Forward lookup. Blank arguments are "not found", never an error.
    pub async fn part_number(&self, sku_group: &str, region: &str) -> Option<String> {
        if sku_group.trim().is_empty() || region.trim().is_empty() {
            return None;
        }
        self.ensure_fresh().await;
        let state = self.state.read().await;
        state
            .entries
            .get(&(sku_group.to_owned(), region.to_owned()))
            .cloned()
    }

    /// Reverse lookup: linear scan comparing part numbers. Part numbers are
    /// unique across the table, so the first hit is the only hit.
    pub async fn sku_details(&self, part_number: &str) -> Option<SkuDetails> {
        if part_number.trim().is_empty() {
            return None;
        }
        self.ensure_fresh().await;
        let state = self.state.read().await;
        state
            .entries
            .iter()
            .find(|(_, candidate)| candidate.as_str() == part_number)
            .map(|((sku_group, region), part)| SkuDetails {
                sku_group: sku_group.clone(),
                region: region.clone(),
                part_number: part.clone(),
            })
    }

    async fn ensure_fresh(&self) {
        {
            let state = self.state.read().await;
            if state.is_fresh(self.ttl) {
                return;
            }
        }

        let _gate = self.refresh_gate.lock().await;
        // Another caller may have refreshed while we waited on the gate.
        {
            let state = self.state.read().await;
            if state.is_fresh(self.ttl) {
                return;
            }
        }
        self.refresh().await;
    }

    async fn refresh(&self) {
        let fetched = match &self.source {
            Some(source) => match source.fetch_rows().await {
                Ok(rows) if !rows.is_empty() => Some(
                    rows.into_iter()
                        .map(|row| ((row.sku_group, row.region), row.part_number))
                        .collect::<HashMap<_, _>>(),
                ),
                Ok(_) => {
                    tracing::warn!("lookup source returned no rows, using fallback table");
                    None
                }
                Err(err) => {
                    tracing::warn!("lookup source refresh failed, using fallback table: {err}");
                    None
                }
            },
            None => None,
        };

        let mut state = self.state.write().await;
        match fetched {
            Some(entries) => {
                tracing::info!(rows = entries.len(), "part-number table refreshed from source");
                state.entries = entries;
            }
            None if state.entries.is_empty() => {
                state.entries = FALLBACK_TABLE.clone();
            }
            // Keep the last-known-good mapping on a failed re-refresh.
            None => {}
        }
        // The TTL applies to fallback outcomes too.
        state.refreshed_at = Some(Instant::now());
    }
}

/// Databricks SQL warehouse connection parameters.
#[derive(Debug, Clone)]
pub struct WarehouseConfig {
    pub host: String,
    pub warehouse_id: String,
    pub token: String,
    pub catalog: String,
    pub schema: String,
    pub table: String,
}

/// Lookup source backed by the Databricks SQL statement execution API.
pub struct WarehouseSource {
    config: WarehouseConfig,
    http: reqwest::Client,
}

impl WarehouseSource {
    pub fn new(config: WarehouseConfig, http: reqwest::Client) -> Self {
        Self { config, http }
    }

    fn statement(&self) -> String {
        format!(
            "SELECT sku_group, region, part_number FROM {}.{}.{}",
            self.config.catalog, self.config.schema, self.config.table
        )
    }

    // Bare workspace hostnames get the https scheme; explicit schemes are
    // honored as-is.
    fn endpoint(&self) -> String {
        let host = self.config.host.trim_end_matches('/');
        if host.contains("://") {
            format!("{host}/api/2.0/sql/statements")
        } else {
            format!("https://{host}/api/2.0/sql/statements")
        }
    }

    async fn fetch(&self) -> Result<Vec<PartRow>, SourceError> {
        let url = self.endpoint();
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.config.token)
            .json(&serde_json::json!({
                "warehouse_id": self.config.warehouse_id,
                "statement": self.statement(),
                "wait_timeout": "30s",
            }))
            .send()
            .await?;

        let status = response.status().as_u16();
        if status != 200 {
            let body = response.text().await.unwrap_or_default();
            return Err(SourceError::Status { status, body });
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|err| SourceError::Malformed(err.to_string()))?;

        let rows = body
            .pointer("/result/data_array")
            .and_then(|value| value.as_array())
            .ok_or_else(|| SourceError::Malformed("missing result.data_array".to_owned()))?;

        rows.iter()
            .map(|row| {
                let column = |i: usize| {
                    row.get(i)
                        .and_then(|v| v.as_str())
                        .map(str::to_owned)
                        .ok_or_else(|| {
                            SourceError::Malformed(format!("non-string column {i} in row {row}"))
                        })
                };
                Ok(PartRow {
                    sku_group: column(0)?,
                    region: column(1)?,
                    part_number: column(2)?,
                })
            })
            .collect()
    }
}

impl LookupSource for WarehouseSource {
    fn fetch_rows(&self) -> BoxFuture<'_, Result<Vec<PartRow>, SourceError>> {
        Box::pin(self.fetch())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeSource {
        calls: AtomicUsize,
        rows: Vec<PartRow>,
        fail: bool,
    }

    impl FakeSource {
        fn with_rows(rows: Vec<PartRow>) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                rows,
                fail: false,
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                rows: Vec::new(),
                fail: true,
            })
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl LookupSource for FakeSource {
        fn fetch_rows(&self) -> BoxFuture<'_, Result<Vec<PartRow>, SourceError>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let result = if self.fail {
                Err(SourceError::Malformed("synthetic failure".to_owned()))
            } else {
                Ok(self.rows.clone())
            };
            Box::pin(async move { result })
        }
    }

    fn row(group: &str, region: &str, part: &str) -> PartRow {
        PartRow {
            sku_group: group.to_owned(),
            region: region.to_owned(),
            part_number: part.to_owned(),
        }
    }

    #[tokio::test]
    async fn forward_and_reverse_lookups_agree() {
        let source = FakeSource::with_rows(vec![row("G1", "R1", "P100")]);
        let cache = PartLookupCache::new(Some(source), Duration::from_secs(300));

        assert_eq!(cache.part_number("G1", "R1").await.as_deref(), Some("P100"));
        assert_eq!(
            cache.sku_details("P100").await,
            Some(SkuDetails {
                sku_group: "G1".to_owned(),
                region: "R1".to_owned(),
                part_number: "P100".to_owned(),
            })
        );
    }

    #[tokio::test]
    async fn blank_arguments_are_not_found() {
        let cache = PartLookupCache::new(None, Duration::from_secs(300));
        assert_eq!(cache.part_number("", "R1").await, None);
        assert_eq!(cache.part_number("G1", "  ").await, None);
        assert_eq!(cache.sku_details("").await, None);
    }

    #[tokio::test]
    async fn no_source_serves_the_static_table() {
        let cache = PartLookupCache::new(None, Duration::from_secs(300));
        assert_eq!(
            cache.part_number("D1408", "R2").await.as_deref(),
            Some("PN-140802")
        );
        let details = cache.sku_details("PN-030304").await.unwrap();
        assert_eq!(details.sku_group, "D0303");
        assert_eq!(details.region, "R4");
    }

    #[tokio::test]
    async fn source_failure_falls_back_without_erroring() {
        let source = FakeSource::failing();
        let cache = PartLookupCache::new(Some(source.clone()), Duration::from_secs(300));

        assert_eq!(
            cache.part_number("D1601", "R1").await.as_deref(),
            Some("PN-160101")
        );
        assert_eq!(source.call_count(), 1);
    }

    #[tokio::test]
    async fn lookups_within_ttl_do_not_refresh_again() {
        let source = FakeSource::with_rows(vec![row("G1", "R1", "P100")]);
        let cache = PartLookupCache::new(Some(source.clone()), Duration::from_secs(300));

        cache.part_number("G1", "R1").await;
        cache.part_number("G1", "R1").await;
        cache.sku_details("P100").await;
        assert_eq!(source.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn expiry_triggers_exactly_one_refresh() {
        let source = FakeSource::with_rows(vec![row("G1", "R1", "P100")]);
        let cache = Arc::new(PartLookupCache::new(
            Some(source.clone()),
            Duration::from_secs(60),
        ));

        cache.part_number("G1", "R1").await;
        assert_eq!(source.call_count(), 1);

        tokio::time::advance(Duration::from_secs(61)).await;

        // Concurrent callers racing on the expired cache.
        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                cache.part_number("G1", "R1").await
            }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap().as_deref(), Some("P100"));
        }
        assert_eq!(source.call_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_refresh_also_advances_the_ttl_clock() {
        let source = FakeSource::failing();
        let cache = PartLookupCache::new(Some(source.clone()), Duration::from_secs(60));

        cache.part_number("D1408", "R1").await;
        cache.part_number("D1408", "R1").await;
        // Failure outcome is cached for a full TTL window.
        assert_eq!(source.call_count(), 1);

        tokio::time::advance(Duration::from_secs(61)).await;
        cache.part_number("D1408", "R1").await;
        assert_eq!(source.call_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_refresh_failures_never_empty_the_mapping() {
        let source = FakeSource::failing();
        let cache = PartLookupCache::new(Some(source), Duration::from_secs(60));

        // First refresh fails -> fallback table.
        assert_eq!(
            cache.part_number("D1408", "R1").await.as_deref(),
            Some("PN-140801")
        );
        tokio::time::advance(Duration::from_secs(61)).await;
        // Second refresh fails too -> existing rows are retained, not wiped.
        assert_eq!(
            cache.part_number("D1408", "R1").await.as_deref(),
            Some("PN-140801")
        );
    }

    fn warehouse_config(host: String) -> WarehouseConfig {
        WarehouseConfig {
            host,
            warehouse_id: "wh-123".to_owned(),
            token: "tok".to_owned(),
            catalog: "main".to_owned(),
            schema: "logistics".to_owned(),
            table: "part_numbers".to_owned(),
        }
    }

    #[test]
    fn warehouse_statement_names_the_configured_table() {
        let source = WarehouseSource::new(
            warehouse_config("dbc.cloud.example.com".to_owned()),
            reqwest::Client::new(),
        );
        assert_eq!(
            source.statement(),
            "SELECT sku_group, region, part_number FROM main.logistics.part_numbers"
        );
        assert_eq!(
            source.endpoint(),
            "https://dbc.cloud.example.com/api/2.0/sql/statements"
        );
    }

    #[tokio::test]
    async fn warehouse_source_parses_data_array() {
        use httpmock::prelude::*;

        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/2.0/sql/statements")
                    .header("authorization", "Bearer tok");
                then.status(200).json_body(serde_json::json!({
                    "result": {
                        "data_array": [["G1", "R1", "P100"], ["G2", "R2", "P200"]]
                    }
                }));
            })
            .await;

        let source =
            WarehouseSource::new(warehouse_config(server.base_url()), reqwest::Client::new());
        let rows = source.fetch().await.unwrap();

        mock.assert_async().await;
        assert_eq!(rows, vec![row("G1", "R1", "P100"), row("G2", "R2", "P200")]);
    }

    #[tokio::test]
    async fn warehouse_source_reports_non_200() {
        use httpmock::prelude::*;

        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST);
                then.status(403).body("permission denied");
            })
            .await;

        let source =
            WarehouseSource::new(warehouse_config(server.base_url()), reqwest::Client::new());
        let err = source.fetch().await.unwrap_err();
        assert_matches::assert_matches!(err, SourceError::Status { status: 403, .. });
    }
}
