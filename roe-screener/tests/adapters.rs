//! HTTP adapter tests against a local mock server.

use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use roe_screener::data::fields;
use roe_screener::{
    EastmoneyAdapter, FiscalPeriod, InstrumentId, ProfileSource, ProfitabilitySource,
    ProviderError, QuoteSource, XueqiuAdapter,
};

fn eastmoney(server: &MockServer) -> EastmoneyAdapter {
    EastmoneyAdapter::with_base_urls(&server.uri(), &server.uri(), 2, Duration::from_secs(5))
}

fn xueqiu(server: &MockServer, token: Option<&str>) -> XueqiuAdapter {
    XueqiuAdapter::with_base_url(
        &server.uri(),
        token.map(str::to_string),
        Duration::from_secs(5),
    )
}

// ============================================================================
// Eastmoney earnings report
// ============================================================================

#[tokio::test]
async fn test_eastmoney_paginates_report() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/data/v1/get"))
        .and(query_param("reportName", "RPT_LICO_FN_CPD"))
        .and(query_param("filter", "(REPORTDATE='2024-12-31')"))
        .and(query_param("pageNumber", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "code": 0,
            "result": {
                "pages": 2,
                "data": [
                    {"SECURITY_CODE": "000001", "WEIGHTAVG_ROE": 10.5},
                    {"SECURITY_CODE": "000002", "WEIGHTAVG_ROE": "-"}
                ]
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/data/v1/get"))
        .and(query_param("pageNumber", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "code": 0,
            "result": {
                "pages": 2,
                "data": [
                    {"SECURITY_CODE": "600519", "WEIGHTAVG_ROE": "33.1"}
                ]
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let snapshot = eastmoney(&server)
        .fetch_period(&FiscalPeriod::parse("20241231"))
        .await
        .unwrap();

    assert_eq!(snapshot.len(), 2);
    assert_eq!(snapshot.get("000001"), Some(10.5));
    assert_eq!(snapshot.get("000002"), None);
    assert_eq!(snapshot.get("600519"), Some(33.1));
}

#[tokio::test]
async fn test_eastmoney_empty_result_is_empty_snapshot() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/data/v1/get"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": false,
            "code": 9201,
            "message": "返回数据为空",
            "result": null
        })))
        .mount(&server)
        .await;

    let snapshot = eastmoney(&server)
        .fetch_period(&FiscalPeriod::parse("20261231"))
        .await
        .unwrap();
    assert!(snapshot.is_empty());
}

#[tokio::test]
async fn test_eastmoney_server_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/data/v1/get"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = eastmoney(&server)
        .fetch_period(&FiscalPeriod::parse("20241231"))
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::Unavailable(_)));
    assert!(err.is_recoverable());
}

#[tokio::test]
async fn test_eastmoney_api_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/data/v1/get"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": false,
            "code": 9501,
            "message": "参数错误",
            "result": null
        })))
        .mount(&server)
        .await;

    let err = eastmoney(&server)
        .fetch_period(&FiscalPeriod::parse("20241231"))
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::Internal(_)));
}

// ============================================================================
// Eastmoney profile
// ============================================================================

#[tokio::test]
async fn test_eastmoney_profile_industry() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/qt/stock/get"))
        .and(query_param("secid", "1.600519"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "rc": 0,
            "data": {"f57": "600519", "f58": "贵州茅台", "f127": "酿酒行业"}
        })))
        .mount(&server)
        .await;

    let items = eastmoney(&server)
        .profile(&InstrumentId::from("600519"))
        .await
        .unwrap();
    assert_eq!(items.get(fields::INDUSTRY), Some(&json!("酿酒行业")));
    assert_eq!(items.get(fields::NAME), Some(&json!("贵州茅台")));
}

#[tokio::test]
async fn test_eastmoney_profile_missing_data() {
    let server = MockServer::start().await;
    let body = json!({"rc": 0, "data": null});

    Mock::given(method("GET"))
        .and(path("/api/qt/stock/get"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(&server)
        .await;

    let err = eastmoney(&server)
        .profile(&InstrumentId::from("000001"))
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::DataNotAvailable(_)));
}

// ============================================================================
// Xueqiu quote
// ============================================================================

#[tokio::test]
async fn test_xueqiu_quote_maps_fields() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v5/stock/quote.json"))
        .and(query_param("symbol", "SH600519"))
        .and(header("cookie", "xq_a_token=secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "error_code": 0,
            "error_description": "",
            "data": {
                "quote": {
                    "symbol": "SH600519",
                    "name": "贵州茅台",
                    "pe_forecast": 24.3,
                    "pe_ttm": 25.1,
                    "dividend_yield": 3.2,
                    "pb": 8.1
                }
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let items = xueqiu(&server, Some("secret"))
        .quote("SH600519")
        .await
        .unwrap();

    assert_eq!(items.len(), 4);
    assert_eq!(items.get(fields::PE_RATIO), Some(&json!(24.3)));
    assert_eq!(items.get(fields::DIVIDEND_YIELD), Some(&json!(3.2)));
    assert_eq!(items.get(fields::PB_RATIO), Some(&json!(8.1)));
    assert_eq!(items.get(fields::NAME), Some(&json!("贵州茅台")));
}

#[tokio::test]
async fn test_xueqiu_null_fields_pass_through() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v5/stock/quote.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "error_code": 0,
            "data": {"quote": {"name": "退市股", "pe_forecast": null, "dividend_yield": null, "pb": null}}
        })))
        .mount(&server)
        .await;

    let items = xueqiu(&server, None).quote("SZ000001").await.unwrap();
    assert_eq!(items.get(fields::PE_RATIO), Some(&json!(null)));
}

#[tokio::test]
async fn test_xueqiu_unauthorized() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v5/stock/quote.json"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let err = xueqiu(&server, None).quote("SH600519").await.unwrap_err();
    assert!(matches!(err, ProviderError::Auth(_)));
    assert!(!err.is_recoverable());
}

#[tokio::test]
async fn test_xueqiu_rate_limited() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v5/stock/quote.json"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "7"))
        .mount(&server)
        .await;

    let err = xueqiu(&server, None).quote("SH600519").await.unwrap_err();
    assert_eq!(
        err,
        ProviderError::RateLimited {
            retry_after_secs: Some(7)
        }
    );
}

#[tokio::test]
async fn test_xueqiu_error_code() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v5/stock/quote.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "error_code": 400016,
            "error_description": "重新登录帐号后再试",
            "data": null
        })))
        .mount(&server)
        .await;

    let err = xueqiu(&server, None).quote("SH600519").await.unwrap_err();
    assert!(matches!(err, ProviderError::Internal(_)));
}
