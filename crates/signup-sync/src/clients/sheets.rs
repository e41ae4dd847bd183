//! Google Sheets values API source

use super::{decode, SheetData, SheetSource};
use crate::config::SheetsConfig;
use crate::error::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, instrument};

const SERVICE: &str = "Google Sheets";

pub struct SheetsClient {
    client: Client,
    config: SheetsConfig,
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

impl SheetsClient {
    pub fn new(config: SheetsConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.timeout()).build()?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl SheetSource for SheetsClient {
    #[instrument(skip(self), fields(range = %self.config.range))]
    async fn fetch(&self) -> Result<SheetData> {
        let url = format!(
            "{}/v4/spreadsheets/{}/values/{}",
            self.config.api_base.trim_end_matches('/'),
            self.config.spreadsheet_id,
            self.config.range
        );

        let response = self
            .client
            .get(url)
            .bearer_auth(&self.config.access_token)
            .query(&[("valueRenderOption", "FORMATTED_VALUE")])
            .send()
            .await?;

        let range: ValueRange = decode(SERVICE, response).await?;
        let grid: Vec<Vec<String>> = range
            .values
            .into_iter()
            .map(|row| row.into_iter().map(cell_text).collect())
            .collect();

        let data = SheetData::from_grid(grid);
        info!(
            columns = data.headers.len(),
            rows = data.rows.len(),
            "Fetched sheet values"
        );
        Ok(data)
    }
}

/// Formatted values arrive as strings, but a cell can still come back as a
/// number or boolean depending on the render option
fn cell_text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
