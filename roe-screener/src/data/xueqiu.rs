//! Xueqiu adapter for per-symbol market multiples.
//!
//! Quote endpoint: `/v5/stock/quote.json?symbol=SH600519&extend=detail`.
//! The endpoint wants an `xq_a_token` cookie; without one it usually answers
//! 400/401 and the affected symbols simply stay unenriched.

use async_trait::async_trait;
use roe_common::config::SourcesConfig;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::debug;

use super::eastmoney::check_status;
use super::provider::{ProviderError, QuoteSource};
use super::{fields, QuoteItems};

const QUOTE_PATH: &str = "/v5/stock/quote.json";

/// Upstream field → canonical item key.
const FIELD_MAP: &[(&str, &str)] = &[
    // 市盈率(动)
    ("pe_forecast", fields::PE_RATIO),
    // 股息率(TTM)
    ("dividend_yield", fields::DIVIDEND_YIELD),
    // 市净率
    ("pb", fields::PB_RATIO),
    // 名称
    ("name", fields::NAME),
];

#[derive(Debug, Deserialize)]
struct QuoteResponse {
    #[serde(default)]
    error_code: i64,
    #[serde(default)]
    error_description: Option<String>,
    data: Option<QuoteData>,
}

#[derive(Debug, Deserialize)]
struct QuoteData {
    quote: Option<Map<String, Value>>,
}

/// Xueqiu quote adapter.
pub struct XueqiuAdapter {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl XueqiuAdapter {
    /// Create from the sources configuration.
    pub fn new(config: &SourcesConfig) -> Self {
        Self::with_base_url(
            &config.xueqiu_url,
            config.xueqiu_token.clone(),
            Duration::from_secs(config.timeout_secs),
        )
    }

    /// Create against an explicit base URL.
    pub fn with_base_url(base_url: &str, token: Option<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent("Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7)")
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.is_empty()),
        }
    }
}

#[async_trait]
impl QuoteSource for XueqiuAdapter {
    fn name(&self) -> &'static str {
        "xueqiu"
    }

    async fn quote(&self, symbol: &str) -> Result<QuoteItems, ProviderError> {
        let url = format!("{}{}", self.base_url, QUOTE_PATH);

        let mut request = self
            .client
            .get(&url)
            .query(&[("symbol", symbol), ("extend", "detail")]);
        if let Some(token) = &self.token {
            request = request.header(reqwest::header::COOKIE, format!("xq_a_token={}", token));
        }

        let response = request.send().await?;
        check_status(&response)?;

        let body: QuoteResponse = response.json().await?;
        if body.error_code != 0 {
            return Err(ProviderError::Internal(format!(
                "Xueqiu API error: code={} {}",
                body.error_code,
                body.error_description.unwrap_or_default()
            )));
        }

        let quote = body
            .data
            .and_then(|d| d.quote)
            .ok_or_else(|| ProviderError::DataNotAvailable(format!("no quote for {}", symbol)))?;

        let items: QuoteItems = FIELD_MAP
            .iter()
            .filter_map(|(upstream, key)| {
                quote
                    .get(*upstream)
                    .map(|value| (key.to_string(), value.clone()))
            })
            .collect();

        debug!(symbol, items = items.len(), "Xueqiu quote fetched");
        Ok(items)
    }
}
