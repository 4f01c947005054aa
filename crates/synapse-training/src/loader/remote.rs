use super::DatasetResolver;
use crate::dataset::{Dataset, Table};
use crate::error::{TrainingError, TrainingResult};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::{debug, warn};

/// Data tables probed, in order, when the catalogue title names none of them.
pub const DEFAULT_PROBE_TABLES: [&str; 5] = ["iris", "boston", "youtube", "insurance", "carsales"];

const CATALOGUE_TABLE: &str = "datasets";

type Row = Map<String, Value>;

/// Connection settings for the PostgREST-style dataset store.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteStoreConfig {
    pub url: String,
    pub api_key: String,
    pub timeout: Duration,
    pub probe_tables: Vec<String>,
}

impl RemoteStoreConfig {
    pub fn new(url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            api_key: api_key.into(),
            timeout: Duration::from_secs(10),
            probe_tables: DEFAULT_PROBE_TABLES.iter().map(|t| (*t).to_string()).collect(),
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_probe_tables(mut self, tables: Vec<String>) -> Self {
        self.probe_tables = tables;
        self
    }
}

/// Remote tier: a `datasets` catalogue plus one data table per known dataset family.
///
/// The catalogue row's title picks the table when it contains a known table name;
/// otherwise each table in `probe_tables` is queried for rows referencing the
/// identifier, and the first non-empty one wins.
#[derive(Debug, Clone)]
pub struct RemoteStoreResolver {
    config: RemoteStoreConfig,
    client: Client,
}

impl RemoteStoreResolver {
    #[must_use]
    pub fn new(config: RemoteStoreConfig) -> Self {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { config, client }
    }

    /// Store identifiers are generated ids (uuid-like), never short names.
    #[must_use]
    pub fn matches_shape(dataset_id: &str) -> bool {
        dataset_id.len() > 10 && dataset_id.contains('-')
    }

    async fn select(&self, table: &str, column: &str, dataset_id: &str) -> TrainingResult<Vec<Row>> {
        let url = format!("{}/rest/v1/{table}", self.config.url.trim_end_matches('/'));
        let filter = format!("eq.{dataset_id}");

        let response = self
            .client
            .get(&url)
            .query(&[("select", "*"), (column, filter.as_str())])
            .header("apikey", &self.config.api_key)
            .bearer_auth(&self.config.api_key)
            .send()
            .await
            .map_err(|e| {
                TrainingError::DatasetBackendUnavailable(format!("request to '{table}' failed: {e}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TrainingError::DatasetBackendUnavailable(format!(
                "'{table}' returned {status}: {body}"
            )));
        }

        response.json::<Vec<Row>>().await.map_err(|e| {
            TrainingError::DatasetBackendUnavailable(format!("'{table}' returned malformed rows: {e}"))
        })
    }

    async fn probe(&self, dataset_id: &str) -> Vec<Row> {
        for table in &self.config.probe_tables {
            match self.select(table, "dataset_id", dataset_id).await {
                Ok(rows) if !rows.is_empty() => {
                    debug!(dataset_id = %dataset_id, table = %table, "Probe matched");
                    return rows;
                }
                Ok(_) => {}
                Err(e) => debug!(table = %table, error = %e, "Probe failed, trying next table"),
            }
        }
        Vec::new()
    }
}

#[async_trait]
impl DatasetResolver for RemoteStoreResolver {
    fn name(&self) -> &'static str {
        "remote"
    }

    async fn resolve(&self, dataset_id: &str) -> TrainingResult<Option<Dataset>> {
        if !Self::matches_shape(dataset_id) {
            return Ok(None);
        }

        let catalogue = self.select(CATALOGUE_TABLE, "id", dataset_id).await?;
        let Some(entry) = catalogue.first() else {
            debug!(dataset_id = %dataset_id, "No catalogue entry in remote store");
            return Ok(None);
        };
        let title = entry
            .get("title")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_lowercase();

        let titled = self.config.probe_tables.iter().find(|t| title.contains(t.as_str()));
        let rows = match titled {
            Some(table) => self.select(table, "dataset_id", dataset_id).await?,
            None => self.probe(dataset_id).await,
        };
        if rows.is_empty() {
            warn!(dataset_id = %dataset_id, title = %title, "Catalogue entry has no data rows");
            return Ok(None);
        }

        let name = if title.is_empty() { dataset_id } else { title.as_str() };
        rows_to_table(&rows).into_dataset(name).map(Some)
    }
}

/// Column order follows the first row's keys.
fn rows_to_table(rows: &[Row]) -> Table {
    let columns: Vec<String> = rows.first().map(|r| r.keys().cloned().collect()).unwrap_or_default();
    let rows = rows
        .iter()
        .map(|row| columns.iter().map(|c| row.get(c).map(cell_text).unwrap_or_default()).collect())
        .collect();
    Table { columns, rows }
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
