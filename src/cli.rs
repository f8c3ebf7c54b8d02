use std::time::Duration;

use clap::Parser;

use crate::lookup::WarehouseConfig;
use crate::registry::Registry;

const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8001";

/// Command-line options for the model-serving gateway.
#[derive(Debug, Clone, Parser)]
#[command(author, version, about = "HTTP gateway for Databricks model-serving endpoints", long_about = None)]
pub struct CliArgs {
    /// Listen address for the HTTP server.
    #[arg(long = "listen", value_name = "ADDR", env = "MODELGATE_LISTEN", default_value = DEFAULT_LISTEN_ADDR)]
    pub listen: String,

    /// Base URL of the upstream model-serving workspace.
    #[arg(
        long = "base-url",
        env = "DATABRICKS_BASE_URL",
        default_value = "https://wl-dbr-dbr-dev-ws-wl.cloud.databricks.com/serving-endpoints/shipping-price"
    )]
    pub base_url: String,

    /// Bearer token for upstream model-serving calls.
    #[arg(long = "token", env = "DATABRICKS_TOKEN", default_value = "your-token-here")]
    pub token: String,

    /// Upstream request timeout (seconds). Unset means no timeout: calls
    /// may block for as long as the upstream takes.
    #[arg(long = "timeout", env = "REQUEST_TIMEOUT_SECS", value_parser = clap::value_parser!(u64).range(1..=600))]
    timeout_secs: Option<u64>,

    /// Number of concurrent upstream calls during a fan-out.
    #[arg(long = "fanout-workers", env = "FANOUT_WORKERS", default_value_t = crate::fanout::DEFAULT_WORKERS)]
    pub fanout_workers: usize,

    /// Generate this many templated model descriptors instead of the static
    /// shipping catalog.
    #[arg(long = "model-count", env = "MODEL_COUNT")]
    pub model_count: Option<usize>,

    /// Part-number cache TTL (seconds).
    #[arg(long = "cache-ttl", env = "LOOKUP_CACHE_TTL_SECS", default_value_t = 300, value_parser = clap::value_parser!(u64).range(1..))]
    cache_ttl_secs: u64,

    /// Databricks SQL warehouse hostname for the part-number table. The
    /// warehouse source is enabled only when host and warehouse id are both
    /// set; otherwise lookups use the built-in table.
    #[arg(long = "warehouse-host", env = "DATABRICKS_SQL_HOST")]
    pub warehouse_host: Option<String>,

    /// Databricks SQL warehouse identifier.
    #[arg(long = "warehouse-id", env = "DATABRICKS_SQL_WAREHOUSE_ID")]
    pub warehouse_id: Option<String>,

    /// Catalog holding the part-number table.
    #[arg(long = "lookup-catalog", env = "LOOKUP_CATALOG", default_value = "main")]
    pub lookup_catalog: String,

    /// Schema holding the part-number table.
    #[arg(long = "lookup-schema", env = "LOOKUP_SCHEMA", default_value = "logistics")]
    pub lookup_schema: String,

    /// Part-number table name.
    #[arg(long = "lookup-table", env = "LOOKUP_TABLE", default_value = "part_numbers")]
    pub lookup_table: String,
}

impl CliArgs {
    /// Returns the configured upstream timeout, if any.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// Build the model registry: generated catalog when a count is given,
    /// the static shipping catalog otherwise.
    pub fn registry(&self) -> Registry {
        match self.model_count {
            Some(count) => Registry::generated_catalog(&self.base_url, &self.token, count),
            None => Registry::shipping_catalog(&self.base_url, &self.token),
        }
    }

    /// Warehouse connection parameters when the external lookup source is
    /// fully configured.
    pub fn warehouse(&self) -> Option<WarehouseConfig> {
        let host = self.warehouse_host.clone()?;
        let warehouse_id = self.warehouse_id.clone()?;
        Some(WarehouseConfig {
            host,
            warehouse_id,
            token: self.token.clone(),
            catalog: self.lookup_catalog.clone(),
            schema: self.lookup_schema.clone(),
            table: self.lookup_table.clone(),
        })
    }
}
