//! Spreadsheet backend.
//!
//! [`SheetsClient`] speaks the spreadsheet values API and implements
//! [`RowStore`]: full snapshot reads and single-row appends. The same store
//! backs three consumers, each on its own range:
//!
//! - [`TabularAdapter`] searches and appends to the data range,
//! - the registry client reads the role table,
//! - the sheet audit sink appends to the log range.
//!
//! # Wire format
//!
//! | Operation | Request |
//! |-----------|---------|
//! | read | `GET {base}/v4/spreadsheets/{id}/values/{range}` |
//! | append | `POST {base}/v4/spreadsheets/{id}/values/{range}:append?valueInputOption=RAW&insertDataOption=INSERT_ROWS` |
//!
//! Both exchange `{"values": [[...], ...]}`. A read of an empty range omits
//! `values` entirely.

use async_trait::async_trait;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{resolve_token, TabularConfig};
use crate::error::{BackendError, BackendResult};
use crate::http_client::{encode_component, LazyClient};
use crate::models::{BackendKind, Hit, Record};
use crate::traits::{RecordWriter, RowStore, SearchBackend};

// ═══════════════════════════════════════════════════════════════════════
// HTTP row store
// ═══════════════════════════════════════════════════════════════════════

pub struct SheetsClient {
    base_url: String,
    spreadsheet_id: String,
    http: LazyClient,
}

#[derive(Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

#[derive(Serialize)]
struct AppendBody<'a> {
    values: [&'a [String]; 1],
}

impl SheetsClient {
    pub fn new(
        base_url: impl Into<String>,
        spreadsheet_id: impl Into<String>,
        token: Option<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            spreadsheet_id: spreadsheet_id.into(),
            http: LazyClient::new(BackendKind::Tabular, token, timeout),
        }
    }

    pub fn from_config(config: &TabularConfig, timeout: Duration) -> Self {
        Self::new(
            &config.base_url,
            &config.spreadsheet_id,
            resolve_token("tabular", &config.token_env),
            timeout,
        )
    }

    fn values_url(&self, range: &str) -> String {
        format!(
            "{}/v4/spreadsheets/{}/values/{}",
            self.base_url,
            encode_component(&self.spreadsheet_id),
            encode_component(range)
        )
    }
}

/// Cells may come back as numbers or booleans; display them as text.
fn cell_text(cell: &Value) -> String {
    match cell {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[async_trait]
impl RowStore for SheetsClient {
    async fn read_rows(&self, range: &str) -> BackendResult<Vec<Vec<String>>> {
        let req = self.http.request(Method::GET, &self.values_url(range))?;
        let resp = self.http.send(req).await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(BackendError::unavailable(
                BackendKind::Tabular,
                format!("read '{}' returned status {}", range, status.as_u16()),
            ));
        }

        let body: ValueRange = resp
            .json()
            .await
            .map_err(|e| BackendError::from_transport(BackendKind::Tabular, e))?;

        Ok(body
            .values
            .iter()
            .map(|row| row.iter().map(cell_text).collect())
            .collect())
    }

    async fn append_row(&self, range: &str, row: Vec<String>) -> BackendResult<()> {
        let url = format!(
            "{}:append?valueInputOption=RAW&insertDataOption=INSERT_ROWS",
            self.values_url(range)
        );
        let req = self
            .http
            .request(Method::POST, &url)?
            .json(&AppendBody {
                values: [row.as_slice()],
            });
        let resp = self.http.send(req).await?;

        let status = resp.status();
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            let detail: String = detail.chars().take(200).collect();
            return Err(BackendError::WriteError(format!(
                "append to '{}' returned status {}: {}",
                range,
                status.as_u16(),
                detail.trim()
            )));
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Tabular adapter
// ═══════════════════════════════════════════════════════════════════════

/// Row search and append over the data range of a [`RowStore`].
pub struct TabularAdapter {
    store: Arc<dyn RowStore>,
    range: String,
    uppercase_appends: bool,
}

impl TabularAdapter {
    pub fn new(store: Arc<dyn RowStore>, range: impl Into<String>, uppercase_appends: bool) -> Self {
        Self {
            store,
            range: range.into(),
            uppercase_appends,
        }
    }

    pub fn from_config(store: Arc<dyn RowStore>, config: &TabularConfig) -> Self {
        Self::new(store, config.data_range.clone(), config.uppercase_appends)
    }

    /// Read the current snapshot as records.
    pub async fn records(&self) -> BackendResult<Vec<Record>> {
        let rows = self.store.read_rows(&self.range).await?;
        Ok(records_from_rows(&rows))
    }
}

/// Split a snapshot into records. Row 0 is the header row; fully blank rows
/// are skipped.
pub fn records_from_rows(rows: &[Vec<String>]) -> Vec<Record> {
    let Some((headers, data)) = rows.split_first() else {
        return Vec::new();
    };
    data.iter()
        .filter(|row| row.iter().any(|c| !c.trim().is_empty()))
        .map(|row| Record::from_row(headers, row))
        .collect()
}

fn record_to_hit(record: &Record) -> Hit {
    let title = record
        .cells
        .iter()
        .map(|(_, v)| v.trim())
        .find(|v| !v.is_empty())
        .unwrap_or_default()
        .to_string();
    Hit {
        source: BackendKind::Tabular,
        title,
        detail: record.render(),
        link: None,
        native_id: None,
    }
}

#[async_trait]
impl SearchBackend for TabularAdapter {
    fn kind(&self) -> BackendKind {
        BackendKind::Tabular
    }

    fn description(&self) -> &str {
        "Case-insensitive substring search over spreadsheet rows"
    }

    async fn search(&self, term: &str) -> BackendResult<Vec<Hit>> {
        let needle = term.trim().to_lowercase();
        if needle.is_empty() {
            return Ok(Vec::new());
        }
        let records = self.records().await?;
        Ok(records
            .iter()
            .filter(|r| r.joined_text().to_lowercase().contains(&needle))
            .map(record_to_hit)
            .collect())
    }
}

#[async_trait]
impl RecordWriter for TabularAdapter {
    async fn append(&self, fields: Vec<String>) -> BackendResult<()> {
        let row = if self.uppercase_appends {
            fields.iter().map(|f| f.to_uppercase()).collect()
        } else {
            fields
        };
        self.store.append_row(&self.range, row).await
    }
}
