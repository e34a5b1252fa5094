//! Collaborator traits for the screening pipeline.
//!
//! Every upstream source sits behind one of three async traits so the
//! pipeline can run against live HTTP adapters or in-memory mocks alike.

use async_trait::async_trait;
use std::fmt;

use super::{FiscalPeriod, InstrumentId, PeriodSnapshot, QuoteItems};

// ============================================================================
// Provider Error
// ============================================================================

/// Errors specific to data providers.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderError {
    /// Network error (connection failed, timeout)
    Network(String),
    /// Authentication error (missing or expired token)
    Auth(String),
    /// Rate limit exceeded
    RateLimited { retry_after_secs: Option<u64> },
    /// Data not available for the requested period/symbol
    DataNotAvailable(String),
    /// Provider is temporarily unavailable
    Unavailable(String),
    /// Invalid request parameters
    InvalidRequest(String),
    /// Internal provider error (unexpected payload, API error code)
    Internal(String),
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network(msg) => write!(f, "Network error: {}", msg),
            Self::Auth(msg) => write!(f, "Authentication error: {}", msg),
            Self::RateLimited { retry_after_secs } => {
                write!(f, "Rate limited")?;
                if let Some(secs) = retry_after_secs {
                    write!(f, ", retry after {} seconds", secs)?;
                }
                Ok(())
            }
            Self::DataNotAvailable(msg) => write!(f, "Data not available: {}", msg),
            Self::Unavailable(msg) => write!(f, "Provider unavailable: {}", msg),
            Self::InvalidRequest(msg) => write!(f, "Invalid request: {}", msg),
            Self::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for ProviderError {}

impl ProviderError {
    /// Short variant name for structured logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Network(_) => "network",
            Self::Auth(_) => "auth",
            Self::RateLimited { .. } => "rate_limited",
            Self::DataNotAvailable(_) => "data_not_available",
            Self::Unavailable(_) => "unavailable",
            Self::InvalidRequest(_) => "invalid_request",
            Self::Internal(_) => "internal",
        }
    }

    /// Check if the error is transient (another attempt may succeed)
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::RateLimited { .. } | Self::Unavailable(_)
        )
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() || err.is_request() {
            Self::Network(err.to_string())
        } else if err.is_decode() {
            Self::Internal(format!("Failed to parse response: {}", err))
        } else {
            Self::Unavailable(err.to_string())
        }
    }
}

// ============================================================================
// Source Traits
// ============================================================================

/// Full-market profitability snapshot for one fiscal period.
#[async_trait]
pub trait ProfitabilitySource: Send + Sync {
    /// Source name for logging
    fn name(&self) -> &'static str;

    /// Fetch the ROE (%) of every instrument reported for `period`.
    async fn fetch_period(&self, period: &FiscalPeriod) -> Result<PeriodSnapshot, ProviderError>;
}

/// Per-symbol market multiples.
#[async_trait]
pub trait QuoteSource: Send + Sync {
    /// Source name for logging
    fn name(&self) -> &'static str;

    /// Fetch quote items for an exchange-qualified symbol such as `"SH600519"`.
    ///
    /// Items use the keys in [`super::fields`]; values are raw and may be
    /// null or placeholders.
    async fn quote(&self, symbol: &str) -> Result<QuoteItems, ProviderError>;
}

/// Per-instrument descriptive profile.
#[async_trait]
pub trait ProfileSource: Send + Sync {
    /// Source name for logging
    fn name(&self) -> &'static str;

    /// Fetch profile items; the industry is under [`super::fields::INDUSTRY`].
    async fn profile(&self, id: &InstrumentId) -> Result<QuoteItems, ProviderError>;
}

// ============================================================================
// Tests
// ============================================================================
