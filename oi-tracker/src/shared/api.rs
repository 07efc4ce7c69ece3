//! Metrics API client
//!
//! `GET {base}/api/symbols` returns the catalog as a JSON array of `{symbol, supported}`.
//! `GET {base}/api/coin/{symbol}` returns one metrics record; non-2xx responses may carry
//! a `{"detail": "..."}` body.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::debug;

use super::error::{CatalogError, FetchError, TrackerError};
use super::types::{CardMetrics, SymbolDescriptor};

/// Source of the symbol catalog and per-symbol metrics
#[async_trait]
pub trait MarketApi: Send + Sync + 'static {
    async fn fetch_symbols(&self) -> Result<Vec<SymbolDescriptor>, CatalogError>;

    async fn fetch_coin(&self, symbol: &str) -> Result<CardMetrics, FetchError>;
}

/// `MarketApi` over HTTP
#[derive(Debug, Clone)]
pub struct HttpMarketApi {
    client: Client,
    base_url: String,
}

impl HttpMarketApi {
    pub fn new(base_url: &str, timeout: Option<Duration>) -> Result<Self, TrackerError> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| TrackerError::Client(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn symbols_url(&self) -> String {
        format!("{}/api/symbols", self.base_url)
    }

    fn coin_url(&self, symbol: &str) -> String {
        format!("{}/api/coin/{}", self.base_url, symbol)
    }
}

#[async_trait]
impl MarketApi for HttpMarketApi {
    async fn fetch_symbols(&self) -> Result<Vec<SymbolDescriptor>, CatalogError> {
        let response = self
            .client
            .get(self.symbols_url())
            .send()
            .await
            .map_err(|e| CatalogError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CatalogError::Status(status.as_u16()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| CatalogError::Transport(e.to_string()))?;
        let symbols: Vec<SymbolDescriptor> =
            serde_json::from_str(&body).map_err(|e| CatalogError::Decode(e.to_string()))?;

        debug!("Fetched {} catalog symbols", symbols.len());
        Ok(symbols)
    }

    async fn fetch_coin(&self, symbol: &str) -> Result<CardMetrics, FetchError> {
        let response = self
            .client
            .get(self.coin_url(symbol))
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                message: status_error_message(status, &body),
            });
        }

        parse_metrics(&body)
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    detail: Option<String>,
}

/// Card message for a non-2xx response: the body's `detail` if present, else `HTTP {status}`
pub fn status_error_message(status: StatusCode, body: &str) -> String {
    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|err| err.detail)
        .filter(|detail| !detail.is_empty())
        .unwrap_or_else(|| format!("HTTP {}", status.as_u16()))
}

/// Decode a metrics record, stamping the receipt time
pub fn parse_metrics(body: &str) -> Result<CardMetrics, FetchError> {
    serde_json::from_str(body).map_err(|e| FetchError::Decode(e.to_string()))
}
