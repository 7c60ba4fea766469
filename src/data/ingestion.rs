use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::env;
use tracing::{debug, warn};

const POLYGON_BASE_URL: &str = "https://api.polygon.io";

/// One daily aggregate bar exactly as the provider returns it.
///
/// Field names follow the provider's short codes; the normalizer maps them to
/// readable names and turns `t` into a calendar date.
///
/// # Fields
/// * `t`: bar start as a millisecond Unix timestamp
/// * `o`, `h`, `l`, `c`: open, high, low and close prices
/// * `v`: traded volume
/// * `n`: number of transactions
/// * `vw`: volume weighted average price
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RawBar {
    pub t: i64,
    #[serde(default)]
    pub o: Option<f64>,
    #[serde(default)]
    pub h: Option<f64>,
    #[serde(default)]
    pub l: Option<f64>,
    #[serde(default)]
    pub c: Option<f64>,
    #[serde(default)]
    pub v: Option<f64>,
    #[serde(default)]
    pub n: Option<f64>,
    #[serde(default)]
    pub vw: Option<f64>,
}

/// Envelope of the aggregates endpoint.
#[derive(Debug, Deserialize)]
pub struct AggregatesResponse {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub results: Option<Vec<RawBar>>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl AggregatesResponse {
    /// Decodes a response body.
    ///
    /// # Errors
    /// Returns an error quoting the start of the body when it is not an
    /// aggregates payload, e.g. an HTML page from a proxy.
    pub fn parse(body: &str) -> Result<Self> {
        serde_json::from_str(body).with_context(|| {
            let preview: String = body.chars().take(120).collect();
            format!("Invalid response format from Polygon API: {:?}", preview)
        })
    }

    /// Unwraps the bar list, turning provider-reported failures into errors.
    ///
    /// A response without `results` is a valid "no data" answer and yields an
    /// empty vector.
    pub fn into_bars(self) -> Result<Vec<RawBar>> {
        if let Some(error) = self.error {
            return Err(anyhow::anyhow!("Polygon API error: {}", error));
        }

        match self.status.as_deref() {
            Some("ERROR") | Some("NOT_AUTHORIZED") => {
                return Err(anyhow::anyhow!(
                    "Polygon API rejected the request: {}",
                    self.message.as_deref().unwrap_or("Unknown error")
                ));
            }
            Some("DELAYED") => warn!("Polygon API returned delayed data"),
            _ => {}
        }

        Ok(self.results.unwrap_or_default())
    }
}

/// Source of raw daily bars for a symbol.
///
/// The pipeline only depends on this trait, so it can run against the HTTP
/// client or against bars held in memory.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Fetches the daily bars for `symbol` between `start` and `end`.
    ///
    /// An empty vector means the provider had no data for the range.
    async fn fetch_daily_bars(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<RawBar>>;
}

/// HTTP client for the Polygon daily aggregates endpoint.
///
/// Performs exactly one request per call; retries and rate limiting are left
/// to the caller.
pub struct PolygonClient {
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

impl PolygonClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: POLYGON_BASE_URL.to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Creates a client with the key from `POLYGON_API_KEY`.
    ///
    /// # Errors
    /// Returns an error if the variable is not set.
    pub fn from_env() -> Result<Self> {
        let api_key = env::var("POLYGON_API_KEY")
            .context("POLYGON_API_KEY must be set in environment")?;
        Ok(Self::new(api_key))
    }

    /// Points the client at another host, e.g. a local mock server.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn aggregates_url(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> String {
        format!(
            "{}/v2/aggs/ticker/{}/range/1/day/{}/{}?apiKey={}",
            self.base_url,
            symbol,
            start.format("%Y-%m-%d"),
            end.format("%Y-%m-%d"),
            self.api_key
        )
    }
}

#[async_trait]
impl MarketDataSource for PolygonClient {
    async fn fetch_daily_bars(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<RawBar>> {
        let url = self.aggregates_url(symbol, start, end);
        debug!(symbol, %start, %end, "requesting daily aggregates");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Request for {} aggregates failed", symbol))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .with_context(|| format!("Failed to read {} aggregates response", symbol))?;

        let bars = AggregatesResponse::parse(&body)
            .with_context(|| format!("HTTP {} for {} aggregates", status, symbol))?
            .into_bars()?;
        if bars.is_empty() {
            warn!(symbol, %start, %end, "No data available for the requested range");
        } else {
            debug!(symbol, count = bars.len(), "received daily aggregates");
        }

        Ok(bars)
    }
}
