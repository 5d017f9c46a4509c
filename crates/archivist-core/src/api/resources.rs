//! Client for the spreadsheet-backed resource endpoint.
//!
//! The endpoint is a deployed script in front of a spreadsheet: GET returns
//! every row as `{ "data": [...] }`, POST takes a form with an `action`
//! field (`create`, `update`, `delete`) plus the row's fields. The script
//! gives no usable confirmation for writes, so create/update/delete resolve
//! as soon as the request has been sent. Callers should treat any local
//! optimistic state as provisional.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use reqwest::Client;
use serde_json::{Map, Value};
use tracing::debug;

use crate::models::{Record, RecordsResponse};

/// HTTP request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ResourceClient {
    client: Client,
    endpoint: String,
}

impl ResourceClient {
    pub fn new(endpoint: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self::with_client(client, endpoint))
    }

    /// Build on an existing client, sharing its connection pool
    pub fn with_client(client: Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }

    /// Fetch every record. Identifiers come back as text regardless of how
    /// the spreadsheet stored them.
    pub async fn list(&self) -> Result<Vec<Record>> {
        let response = self
            .client
            .get(&self.endpoint)
            .send()
            .await
            .context("Failed to fetch records")?;

        let status = response.status();
        if !status.is_success() {
            bail!("Failed to fetch records (status {})", status);
        }

        let text = response.text().await.context("Failed to read records response body")?;
        let parsed: RecordsResponse = serde_json::from_str(&text)
            .context("Failed to parse records response")?;

        debug!(count = parsed.data.len(), "Records fetched");
        Ok(parsed.data)
    }

    pub async fn create(&self, fields: &Map<String, Value>) -> Result<()> {
        self.submit("create", None, fields).await
    }

    pub async fn update(&self, id: &str, fields: &Map<String, Value>) -> Result<()> {
        self.submit("update", Some(id), fields).await
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        self.submit("delete", Some(id), &Map::new()).await
    }

    async fn submit(&self, action: &str, id: Option<&str>, fields: &Map<String, Value>) -> Result<()> {
        let form = form_pairs(action, id, fields);

        let response = self
            .client
            .post(&self.endpoint)
            .form(&form)
            .send()
            .await
            .with_context(|| format!("Failed to send {} request", action))?;

        // The script's reply is not a confirmation; note it and move on
        debug!(action, id, status = %response.status(), "Record write sent");
        Ok(())
    }
}

/// Build the form body: `action`, then `id` when targeting a record, then fields.
fn form_pairs(action: &str, id: Option<&str>, fields: &Map<String, Value>) -> Vec<(String, String)> {
    let mut pairs = Vec::with_capacity(fields.len() + 2);
    pairs.push(("action".to_string(), action.to_string()));
    if let Some(id) = id {
        pairs.push(("id".to_string(), id.to_string()));
    }
    for (key, value) in fields {
        if key == "action" || (id.is_some() && key == "id") {
            continue;
        }
        pairs.push((key.clone(), form_value(value)));
    }
    pairs
}

fn form_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
