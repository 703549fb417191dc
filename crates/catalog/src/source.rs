use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

use orcabot_core::{CatalogEntry, RetryPolicy};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("price table transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("price table endpoint returned status {0}")]
    Status(u16),
    #[error("price table decode error: {0}")]
    Decode(String),
}

impl CatalogError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Status(status) => *status >= 500,
            Self::Decode(_) => false,
        }
    }
}

#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn fetch(&self) -> Result<Vec<CatalogEntry>, CatalogError>;
}

/// Fetches the published price table as a JSON array of rows. Column headers
/// vary with whoever last edited the sheet, so several spellings are accepted.
pub struct HttpPriceSource {
    client: reqwest::Client,
    url: String,
    retry: RetryPolicy,
}

impl HttpPriceSource {
    pub fn new(url: impl Into<String>, timeout_secs: u64, retry: RetryPolicy) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs.max(1)))
            .build()
            .unwrap_or_default();

        Self { client, url: url.into(), retry }
    }

    async fn fetch_once(&self) -> Result<Vec<CatalogEntry>, CatalogError> {
        let response = self.client.get(&self.url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(CatalogError::Status(status.as_u16()));
        }

        let rows: Vec<RawPriceRow> = response
            .json()
            .await
            .map_err(|error| CatalogError::Decode(error.to_string()))?;

        Ok(rows.into_iter().filter_map(RawPriceRow::into_entry).collect())
    }
}

#[async_trait]
impl PriceSource for HttpPriceSource {
    async fn fetch(&self) -> Result<Vec<CatalogEntry>, CatalogError> {
        let mut attempt = 0;
        loop {
            match self.fetch_once().await {
                Ok(entries) => return Ok(entries),
                Err(error) if error.is_retryable() && attempt < self.retry.max_retries => {
                    let delay = self.retry.backoff(attempt);
                    warn!(
                        event_name = "catalog.fetch_retry",
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "price table fetch failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawPriceRow {
    #[serde(default, alias = "PRODUTO", alias = "Produto")]
    produto: Option<String>,
    #[serde(default, alias = "UNIDADE", alias = "Unidade")]
    unidade: Option<String>,
    #[serde(
        default,
        alias = "PREÇO",
        alias = "Preço",
        alias = "preço",
        alias = "PRECO"
    )]
    preco: Option<serde_json::Value>,
}

impl RawPriceRow {
    fn into_entry(self) -> Option<CatalogEntry> {
        let product = self.produto.map(|value| value.trim().to_string()).unwrap_or_default();
        if product.is_empty() {
            return None;
        }

        let unit = self
            .unidade
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| "UNIDADE".to_string());

        Some(CatalogEntry { product, unit, unit_price: parse_price(self.preco.as_ref()) })
    }
}

/// Normalizes a published price cell into a decimal amount.
///
/// Cells arrive either as numbers or as pt-BR formatted strings like
/// `"R$ 1.234,56"`. A cell that cannot be parsed becomes zero rather than
/// dropping the row, matching how the sales team treats unpriced items.
fn parse_price(raw: Option<&serde_json::Value>) -> Decimal {
    let Some(raw) = raw else { return Decimal::ZERO };

    let text = match raw {
        serde_json::Value::String(value) => value.clone(),
        // Already-numeric cells skip the pt-BR cleanup; a plain `44.13` is a
        // decimal point, not a thousands separator.
        serde_json::Value::Number(value) => {
            return Decimal::from_str(&value.to_string()).unwrap_or(Decimal::ZERO)
        }
        _ => return Decimal::ZERO,
    };

    let cleaned =
        text.trim().replace("R$", "").replace(' ', "").replace('.', "").replace(',', ".");

    Decimal::from_str(&cleaned).unwrap_or(Decimal::ZERO)
}
