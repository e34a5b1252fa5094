//! Eastmoney adapter for earnings reports and instrument profiles.
//!
//! # Data Sources
//! - Earnings report (业绩报表): datacenter-web.eastmoney.com, report
//!   `RPT_LICO_FN_CPD`, one paginated query per report date
//! - Instrument profile: push2.eastmoney.com quote endpoint, field `f127`
//!   carries the industry

use async_trait::async_trait;
use roe_common::config::SourcesConfig;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use super::parse::{parse_metric, parse_text};
use super::provider::{ProfileSource, ProfitabilitySource, ProviderError};
use super::{fields, FiscalPeriod, InstrumentId, PeriodSnapshot, QuoteItems};

// ============================================================================
// Constants
// ============================================================================

const REPORT_PATH: &str = "/api/data/v1/get";
const PROFILE_PATH: &str = "/api/qt/stock/get";

/// Earnings report table
const REPORT_NAME: &str = "RPT_LICO_FN_CPD";
const REPORT_COLUMNS: &str = "SECURITY_CODE,SECURITY_NAME_ABBR,WEIGHTAVG_ROE";

/// Data-center code for "no rows match the filter"
const CODE_EMPTY_RESULT: i64 = 9201;

/// Hard stop for runaway pagination
const MAX_PAGES: u32 = 200;

// ============================================================================
// Symbol Mapping
// ============================================================================

/// Convert a bare code to the quote API `secid` ("1.600519", "0.000001").
///
/// Shanghai codes (6xxxxx, 9xxxxx B-shares) use market 1, everything else 0.
fn to_secid(id: &InstrumentId) -> String {
    let market = if id.has_prefix("6") || id.has_prefix("9") {
        "1"
    } else {
        "0"
    };
    format!("{}.{}", market, id)
}

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct ReportResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: Option<String>,
    result: Option<ReportResult>,
}

#[derive(Debug, Deserialize)]
struct ReportResult {
    #[serde(default)]
    pages: u32,
    #[serde(default)]
    data: Vec<ReportRow>,
}

#[derive(Debug, Deserialize)]
struct ReportRow {
    #[serde(rename = "SECURITY_CODE")]
    code: Option<String>,
    #[serde(rename = "WEIGHTAVG_ROE")]
    roe: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ProfileResponse {
    #[serde(default)]
    rc: i64,
    data: Option<ProfileData>,
}

#[derive(Debug, Deserialize)]
struct ProfileData {
    f58: Option<Value>,
    f127: Option<Value>,
}

// ============================================================================
// Eastmoney Adapter
// ============================================================================

/// Eastmoney adapter.
pub struct EastmoneyAdapter {
    client: reqwest::Client,
    datacenter_url: String,
    quote_url: String,
    page_size: u32,
}

impl EastmoneyAdapter {
    /// Create from the sources configuration.
    pub fn new(config: &SourcesConfig) -> Self {
        Self::with_base_urls(
            &config.datacenter_url,
            &config.eastmoney_quote_url,
            config.page_size,
            Duration::from_secs(config.timeout_secs),
        )
    }

    /// Create against explicit base URLs.
    pub fn with_base_urls(
        datacenter_url: &str,
        quote_url: &str,
        page_size: u32,
        timeout: Duration,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent("Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7)")
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            datacenter_url: datacenter_url.trim_end_matches('/').to_string(),
            quote_url: quote_url.trim_end_matches('/').to_string(),
            page_size: page_size.max(1),
        }
    }

    /// Fetch one page of the earnings report. `None` means the filter
    /// matched nothing.
    async fn fetch_page(
        &self,
        report_date: &str,
        page: u32,
    ) -> Result<Option<ReportResult>, ProviderError> {
        let url = format!("{}{}", self.datacenter_url, REPORT_PATH);
        let filter = format!("(REPORTDATE='{}')", report_date);
        let page_size = self.page_size.to_string();
        let page_number = page.to_string();

        debug!(report_date, page, "Fetching earnings report page");

        let response = self
            .client
            .get(&url)
            .query(&[
                ("reportName", REPORT_NAME),
                ("columns", REPORT_COLUMNS),
                ("filter", filter.as_str()),
                ("sortColumns", "SECURITY_CODE"),
                ("sortTypes", "1"),
                ("pageSize", page_size.as_str()),
                ("pageNumber", page_number.as_str()),
            ])
            .send()
            .await?;

        check_status(&response)?;

        let body: ReportResponse = response.json().await?;

        if body.code == CODE_EMPTY_RESULT {
            return Ok(None);
        }
        if !body.success {
            return Err(ProviderError::Internal(format!(
                "Eastmoney data center error: code={} message={}",
                body.code,
                body.message.unwrap_or_default()
            )));
        }

        Ok(body.result)
    }
}

/// Map HTTP failure statuses to provider errors.
pub(super) fn check_status(response: &reqwest::Response) -> Result<(), ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    match status.as_u16() {
        401 | 403 => Err(ProviderError::Auth(format!("HTTP {}", status))),
        429 => Err(ProviderError::RateLimited {
            retry_after_secs: response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok()),
        }),
        500..=599 => Err(ProviderError::Unavailable(format!("HTTP {}", status))),
        _ => Err(ProviderError::Network(format!("HTTP {}", status))),
    }
}

// ============================================================================
// Source Implementations
// ============================================================================

#[async_trait]
impl ProfitabilitySource for EastmoneyAdapter {
    fn name(&self) -> &'static str {
        "eastmoney"
    }

    async fn fetch_period(&self, period: &FiscalPeriod) -> Result<PeriodSnapshot, ProviderError> {
        let report_date = period
            .report_date()
            .ok_or_else(|| {
                ProviderError::InvalidRequest(format!(
                    "period '{}' is not a report date",
                    period.id()
                ))
            })?
            .format("%Y-%m-%d")
            .to_string();

        let mut rows = Vec::new();
        let mut page = 1;
        loop {
            let Some(result) = self.fetch_page(&report_date, page).await? else {
                break;
            };
            rows.extend(result.data.into_iter().filter_map(|row| {
                let code = row.code?;
                Some((InstrumentId::from(code), parse_metric(row.roe.as_ref())))
            }));
            if page >= result.pages || page >= MAX_PAGES {
                break;
            }
            page += 1;
        }

        debug!(period = %period, rows = rows.len(), pages = page, "Earnings report fetched");
        Ok(PeriodSnapshot::from_rows(rows))
    }
}

#[async_trait]
impl ProfileSource for EastmoneyAdapter {
    fn name(&self) -> &'static str {
        "eastmoney"
    }

    async fn profile(&self, id: &InstrumentId) -> Result<QuoteItems, ProviderError> {
        let url = format!("{}{}", self.quote_url, PROFILE_PATH);
        let secid = to_secid(id);

        let response = self
            .client
            .get(&url)
            .query(&[("secid", secid.as_str()), ("fields", "f57,f58,f127")])
            .send()
            .await?;

        check_status(&response)?;

        let body: ProfileResponse = response.json().await?;
        if body.rc != 0 {
            return Err(ProviderError::Internal(format!(
                "Eastmoney API error: rc={}",
                body.rc
            )));
        }
        let data = body
            .data
            .ok_or_else(|| ProviderError::DataNotAvailable(format!("no profile for {}", id)))?;

        let mut items = QuoteItems::new();
        if let Some(industry) = parse_text(data.f127.as_ref()) {
            items.insert(fields::INDUSTRY.into(), Value::String(industry));
        }
        if let Some(name) = parse_text(data.f58.as_ref()) {
            items.insert(fields::NAME.into(), Value::String(name));
        }
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_secid() {
        assert_eq!(to_secid(&"600519".into()), "1.600519");
        assert_eq!(to_secid(&"900901".into()), "1.900901");
        assert_eq!(to_secid(&"000001".into()), "0.000001");
        assert_eq!(to_secid(&"300750".into()), "0.300750");
        assert_eq!(to_secid(&"830799".into()), "0.830799");
    }

    #[test]
    fn test_report_row_deserialize() {
        let body = r#"{
            "success": true,
            "code": 0,
            "result": {
                "pages": 1,
                "data": [
                    {"SECURITY_CODE": "000001", "WEIGHTAVG_ROE": 10.2},
                    {"SECURITY_CODE": "000002", "WEIGHTAVG_ROE": null}
                ]
            }
        }"#;
        let parsed: ReportResponse = serde_json::from_str(body).unwrap();
        let result = parsed.result.unwrap();
        assert_eq!(result.pages, 1);
        assert_eq!(result.data.len(), 2);
        assert_eq!(parse_metric(result.data[0].roe.as_ref()), Some(10.2));
        assert_eq!(parse_metric(result.data[1].roe.as_ref()), None);
    }

    #[tokio::test]
    async fn test_fetch_period_rejects_undated_period() {
        let adapter = EastmoneyAdapter::with_base_urls(
            "http://127.0.0.1:9",
            "http://127.0.0.1:9",
            100,
            Duration::from_secs(1),
        );
        let err = adapter
            .fetch_period(&FiscalPeriod::full("Y1"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::InvalidRequest(_)));
    }
}
