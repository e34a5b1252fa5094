//! Configuration management for the ROE screener.
//!
//! The screener reads a single JSON file at `~/.roe-screener/config.json`.
//! Every field has a default, so an absent file or an empty object is a
//! valid configuration.
//!
//! # Configuration Priority
//!
//! 1. Environment variables (ROE_* prefix)
//! 2. Explicit config file values
//! 3. Default values
//!
//! # Environment Variable Mapping
//!
//! - `ROE_LOG_LEVEL` → observability.log_level
//! - `ROE_LOG_FORMAT` → observability.log_format
//! - `ROE_XUEQIU_TOKEN` → screener.sources.xueqiu_token
//! - `ROE_MAX_REPORT_LEN` → screener.scoring.max_report_len

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Error;

/// Get the configuration directory path.
pub fn config_dir() -> PathBuf {
    directories::UserDirs::new().map_or_else(
        || PathBuf::from(".roe-screener"),
        |dirs| dirs.home_dir().join(".roe-screener"),
    )
}

/// Get the configuration file path.
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

// ============================================================================
// Root Configuration
// ============================================================================

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// JSON Schema reference
    #[serde(rename = "$schema", default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Screening pipeline configuration
    #[serde(default)]
    pub screener: ScreenerConfig,
}

impl Config {
    /// Load configuration from the default path.
    pub fn load() -> Result<Self> {
        let path = config_path();
        if !path.exists() {
            tracing::info!("Config file not found, using defaults");
            return Ok(Self::default());
        }

        Self::load_from(&path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Load configuration with environment variable overrides.
    pub fn load_with_env(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::load_from(p)?,
            None => Self::load()?,
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary variable lookup.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(level) = lookup("ROE_LOG_LEVEL") {
            self.observability.log_level = level;
        }
        if let Some(format) = lookup("ROE_LOG_FORMAT") {
            self.observability.log_format = format;
        }
        if let Some(token) = lookup("ROE_XUEQIU_TOKEN") {
            self.screener.sources.xueqiu_token = Some(token);
        }
        if let Some(len) = lookup("ROE_MAX_REPORT_LEN") {
            match len.parse() {
                Ok(n) => self.screener.scoring.max_report_len = n,
                Err(_) => tracing::warn!(value = %len, "Ignoring invalid ROE_MAX_REPORT_LEN"),
            }
        }
    }
}

// ============================================================================
// Observability Configuration
// ============================================================================

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level", alias = "level")]
    pub log_level: String,

    /// Log format (json, pretty)
    #[serde(default = "default_log_format", alias = "format")]
    pub log_format: String,

    /// Additional module targets to set to `warn`.
    #[serde(default)]
    pub excluded_targets: Vec<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
            excluded_targets: Vec::new(),
        }
    }
}

// ============================================================================
// Screener Configuration
// ============================================================================

/// Configuration for the ROE screening pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreenerConfig {
    /// Fiscal report dates (YYYYMMDD), oldest first. Only the last may be interim.
    #[serde(default = "default_periods")]
    pub periods: Vec<String>,

    /// Period fetch retry settings
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Market segment exclusion
    #[serde(default)]
    pub segments: SegmentConfig,

    /// Profitability quality thresholds
    #[serde(default)]
    pub quality: QualityConfig,

    /// Market multiple enrichment
    #[serde(default)]
    pub enrichment: EnrichmentConfig,

    /// Scoring and admission bounds
    #[serde(default)]
    pub scoring: ScoringConfig,

    /// Output settings
    #[serde(default)]
    pub output: OutputConfig,

    /// Upstream data source endpoints
    #[serde(default)]
    pub sources: SourcesConfig,
}

impl Default for ScreenerConfig {
    fn default() -> Self {
        Self {
            periods: default_periods(),
            fetch: FetchConfig::default(),
            segments: SegmentConfig::default(),
            quality: QualityConfig::default(),
            enrichment: EnrichmentConfig::default(),
            scoring: ScoringConfig::default(),
            output: OutputConfig::default(),
            sources: SourcesConfig::default(),
        }
    }
}

impl ScreenerConfig {
    /// Check the configuration for values the pipeline cannot run with.
    pub fn validate(&self) -> crate::Result<()> {
        if self.periods.is_empty() {
            return Err(Error::Config("screener.periods must not be empty".into()));
        }
        if self.fetch.max_retries == 0 {
            return Err(Error::Config(
                "screener.fetch.max_retries must be at least 1".into(),
            ));
        }
        if self.fetch.backoff.base_ms == 0 {
            return Err(Error::Config(
                "screener.fetch.backoff.base_ms must be positive".into(),
            ));
        }
        if self.fetch.backoff.kind == BackoffKind::Exponential
            && self.fetch.backoff.cap_ms < self.fetch.backoff.base_ms
        {
            return Err(Error::Config(
                "screener.fetch.backoff.cap_ms must not be below base_ms".into(),
            ));
        }
        if self.enrichment.workers == 0 {
            return Err(Error::Config(
                "screener.enrichment.workers must be at least 1".into(),
            ));
        }
        if self.segments.excluded_prefixes.iter().any(|p| p.is_empty()) {
            return Err(Error::Config(
                "screener.segments.excluded_prefixes must not contain empty strings".into(),
            ));
        }
        if self.quality.consistency_multiplier <= 0.0 {
            return Err(Error::Config(
                "screener.quality.consistency_multiplier must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Short human-readable description of the thresholds in use.
    pub fn summary(&self) -> String {
        format!(
            "avg ROE > {}, min ROE > {}, K = {}, PE < {}, DY > {}, PB < {}",
            self.quality.min_average,
            self.quality.min_floor,
            self.quality.consistency_multiplier,
            self.scoring.max_pe,
            self.scoring.min_dividend_yield,
            self.scoring.max_pb,
        )
    }
}

fn default_periods() -> Vec<String> {
    vec![
        "20201231".into(),
        "20211231".into(),
        "20221231".into(),
        "20231231".into(),
        "20241231".into(),
        "20250630".into(),
    ]
}

// ============================================================================
// Fetch Configuration
// ============================================================================

/// Retry configuration for period fetches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Total attempts per period before giving up with an empty snapshot
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay policy between attempts
    #[serde(default)]
    pub backoff: BackoffConfig,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            backoff: BackoffConfig::default(),
        }
    }
}

/// Backoff kind between retry attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffKind {
    /// Same delay before every retry
    Fixed,
    /// Delay doubles after every failure, up to the cap
    Exponential,
}

/// Delay policy between retry attempts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffConfig {
    #[serde(default = "default_backoff_kind")]
    pub kind: BackoffKind,

    /// First delay in milliseconds
    #[serde(default = "default_backoff_base_ms")]
    pub base_ms: u64,

    /// Upper bound for exponential delays in milliseconds
    #[serde(default = "default_backoff_cap_ms")]
    pub cap_ms: u64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            kind: default_backoff_kind(),
            base_ms: default_backoff_base_ms(),
            cap_ms: default_backoff_cap_ms(),
        }
    }
}

fn default_max_retries() -> u32 {
    10
}

fn default_backoff_kind() -> BackoffKind {
    BackoffKind::Exponential
}

fn default_backoff_base_ms() -> u64 {
    1_000
}

fn default_backoff_cap_ms() -> u64 {
    30_000
}

// ============================================================================
// Segment Configuration
// ============================================================================

/// Instrument-code prefixes excluded from the universe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentConfig {
    /// Leading characters of codes outside the target market
    /// ("2" B-shares, "8"/"9" NEEQ and other boards)
    #[serde(default = "default_excluded_prefixes")]
    pub excluded_prefixes: Vec<String>,
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self {
            excluded_prefixes: default_excluded_prefixes(),
        }
    }
}

fn default_excluded_prefixes() -> Vec<String> {
    vec!["2".into(), "8".into(), "9".into()]
}

// ============================================================================
// Quality Configuration
// ============================================================================

/// Thresholds of the profitability consistency test.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityConfig {
    /// Average ROE (%) must be strictly above this
    #[serde(default = "default_min_average")]
    pub min_average: f64,

    /// Worst period ROE (%) must be strictly above this
    #[serde(default = "default_min_floor")]
    pub min_floor: f64,

    /// Multiplier K of the worst-period consistency test
    #[serde(default = "default_consistency_multiplier")]
    pub consistency_multiplier: f64,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            min_average: default_min_average(),
            min_floor: default_min_floor(),
            consistency_multiplier: default_consistency_multiplier(),
        }
    }
}

impl QualityConfig {
    /// Stricter threshold set: average above 2% and no losing period.
    pub fn strict() -> Self {
        Self {
            min_average: 2.0,
            min_floor: 0.0,
            ..Self::default()
        }
    }
}

fn default_min_average() -> f64 {
    1.0
}

fn default_min_floor() -> f64 {
    -5.0
}

fn default_consistency_multiplier() -> f64 {
    80.0
}

// ============================================================================
// Enrichment Configuration
// ============================================================================

/// Routing rule from code prefixes to exchange codes, tried in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteRule {
    /// Leading characters this rule applies to
    pub prefixes: Vec<String>,
    /// Exchange codes to probe, in order (e.g. "SH", "SZ", "BJ")
    pub exchanges: Vec<String>,
}

impl RouteRule {
    pub fn new(prefixes: &[&str], exchanges: &[&str]) -> Self {
        Self {
            prefixes: prefixes.iter().map(|s| s.to_string()).collect(),
            exchanges: exchanges.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Market multiple enrichment settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentConfig {
    /// Concurrent enrichment workers
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Pause between consecutive candidate probes (milliseconds)
    #[serde(default = "default_probe_pause_ms")]
    pub probe_pause_ms: u64,

    /// Extra full passes over the candidate list after a failed pass
    #[serde(default = "default_reprobe_rounds")]
    pub reprobe_rounds: u32,

    /// Prefixes that never get extra passes
    #[serde(default = "default_no_reprobe_prefixes")]
    pub no_reprobe_prefixes: Vec<String>,

    /// Prefix routing rules, first match wins
    #[serde(default = "default_routes")]
    pub routes: Vec<RouteRule>,

    /// Exchanges to probe when no rule matches
    #[serde(default = "default_fallback_exchanges")]
    pub fallback_exchanges: Vec<String>,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            probe_pause_ms: default_probe_pause_ms(),
            reprobe_rounds: default_reprobe_rounds(),
            no_reprobe_prefixes: default_no_reprobe_prefixes(),
            routes: default_routes(),
            fallback_exchanges: default_fallback_exchanges(),
        }
    }
}

fn default_workers() -> usize {
    20
}

fn default_probe_pause_ms() -> u64 {
    100
}

fn default_reprobe_rounds() -> u32 {
    3
}

fn default_no_reprobe_prefixes() -> Vec<String> {
    vec!["8".into()]
}

fn default_routes() -> Vec<RouteRule> {
    vec![
        RouteRule::new(&["6"], &["SH", "SZ"]),
        RouteRule::new(&["0", "3"], &["SZ", "SH"]),
        RouteRule::new(&["8"], &["BJ", "SZ", "SH"]),
    ]
}

fn default_fallback_exchanges() -> Vec<String> {
    vec!["SH".into(), "SZ".into(), "BJ".into()]
}

// ============================================================================
// Scoring Configuration
// ============================================================================

/// Admission bounds and report size.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// P/E must be strictly below this
    #[serde(default = "default_max_pe")]
    pub max_pe: f64,

    /// Dividend yield (%) must be strictly above this
    #[serde(default = "default_min_dividend_yield")]
    pub min_dividend_yield: f64,

    /// P/B must be strictly below this
    #[serde(default = "default_max_pb")]
    pub max_pb: f64,

    /// Maximum number of ranked instruments in the report
    #[serde(default = "default_max_report_len")]
    pub max_report_len: usize,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            max_pe: default_max_pe(),
            min_dividend_yield: default_min_dividend_yield(),
            max_pb: default_max_pb(),
            max_report_len: default_max_report_len(),
        }
    }
}

fn default_max_pe() -> f64 {
    200.0
}

fn default_min_dividend_yield() -> f64 {
    0.1
}

fn default_max_pb() -> f64 {
    33.0
}

fn default_max_report_len() -> usize {
    1500
}

// ============================================================================
// Output Configuration
// ============================================================================

/// Output configuration for screening results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Whether to write the JSON report file
    #[serde(default = "default_true")]
    pub write_report: bool,

    /// Report file path (`~` is expanded)
    #[serde(default = "default_report_path")]
    pub report_path: String,

    /// Whether to look up the industry of every ranked instrument
    #[serde(default = "default_true")]
    pub include_sector: bool,

    /// Number of ranked instruments echoed to the log
    #[serde(default = "default_console_top")]
    pub console_top: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            write_report: true,
            report_path: default_report_path(),
            include_sector: true,
            console_top: default_console_top(),
        }
    }
}

impl OutputConfig {
    /// Report path with `~` expanded.
    pub fn resolved_report_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.report_path).into_owned())
    }
}

fn default_report_path() -> String {
    "~/.roe-screener/reports/stock_analysis_results.json".to_string()
}

fn default_console_top() -> usize {
    100
}

// ============================================================================
// Sources Configuration
// ============================================================================

/// Upstream data source endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesConfig {
    /// Eastmoney data-center base URL (earnings reports)
    #[serde(default = "default_datacenter_url")]
    pub datacenter_url: String,

    /// Eastmoney quote base URL (instrument profile)
    #[serde(default = "default_eastmoney_quote_url")]
    pub eastmoney_quote_url: String,

    /// Xueqiu quote base URL (market multiples)
    #[serde(default = "default_xueqiu_url")]
    pub xueqiu_url: String,

    /// Xueqiu access token cookie value
    #[serde(default)]
    pub xueqiu_token: Option<String>,

    /// Page size for paginated earnings queries
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            datacenter_url: default_datacenter_url(),
            eastmoney_quote_url: default_eastmoney_quote_url(),
            xueqiu_url: default_xueqiu_url(),
            xueqiu_token: None,
            page_size: default_page_size(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_datacenter_url() -> String {
    "https://datacenter-web.eastmoney.com".into()
}

fn default_eastmoney_quote_url() -> String {
    "https://push2.eastmoney.com".into()
}

fn default_xueqiu_url() -> String {
    "https://stock.xueqiu.com".into()
}

fn default_page_size() -> u32 {
    500
}

fn default_timeout_secs() -> u64 {
    15
}

// Default value functions
fn default_log_level() -> String {
    "info".into()
}
fn default_log_format() -> String {
    "pretty".into()
}
fn default_true() -> bool {
    true
}

// ============================================================================
// Tests
// ============================================================================
