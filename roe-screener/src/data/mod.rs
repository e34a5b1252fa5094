//! Market data module for A-share fundamentals and quotes.
//!
//! Defines the identifiers and snapshots the screening pipeline consumes,
//! the collaborator traits behind which every upstream source sits, and
//! HTTP adapters for the default sources.
//!
//! # Data Sources
//! - **Eastmoney data center**: per-period earnings report (ROE for every listed stock)
//! - **Eastmoney quote**: per-stock profile (industry classification)
//! - **Xueqiu quote**: per-symbol market multiples (P/E, P/B, dividend yield, name)

mod eastmoney;
pub mod parse;
mod provider;
mod xueqiu;

pub use eastmoney::EastmoneyAdapter;
pub use provider::{ProfileSource, ProfitabilitySource, ProviderError, QuoteSource};
pub use xueqiu::XueqiuAdapter;

use chrono::{Datelike, NaiveDate};
use roe_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

// ============================================================================
// Instrument Identifier
// ============================================================================

/// Exchange-assigned stock code (e.g. "000001", "600519").
///
/// The leading character encodes the market segment; it drives both segment
/// exclusion and exchange routing.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstrumentId(String);

impl InstrumentId {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the code begins with `prefix`.
    pub fn has_prefix(&self, prefix: &str) -> bool {
        self.0.starts_with(prefix)
    }
}

impl fmt::Display for InstrumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for InstrumentId {
    fn from(code: &str) -> Self {
        Self::new(code)
    }
}

impl From<String> for InstrumentId {
    fn from(code: String) -> Self {
        Self(code)
    }
}

impl Borrow<str> for InstrumentId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

// ============================================================================
// Fiscal Periods
// ============================================================================

/// One fiscal reporting period and the factor that annualizes its figures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FiscalPeriod {
    id: String,
    report_date: Option<NaiveDate>,
    annualization: f64,
}

impl FiscalPeriod {
    /// Build a period from its identifier.
    ///
    /// `YYYYMMDD` identifiers are report dates: December 31 is a full year,
    /// any other month end is interim and annualized by `12 / month`
    /// (June 30 → ×2). Other identifiers are full periods.
    pub fn parse(id: &str) -> Self {
        match NaiveDate::parse_from_str(id, "%Y%m%d") {
            Ok(date) => Self {
                id: id.to_string(),
                report_date: Some(date),
                annualization: 12.0 / f64::from(date.month()),
            },
            Err(_) => Self::full(id),
        }
    }

    /// A full-length period without a known report date.
    pub fn full(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            report_date: None,
            annualization: 1.0,
        }
    }

    /// A partial period whose figures are multiplied by `factor`.
    pub fn interim(id: impl Into<String>, factor: f64) -> Self {
        Self {
            id: id.into(),
            report_date: None,
            annualization: factor,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn report_date(&self) -> Option<NaiveDate> {
        self.report_date
    }

    pub fn annualization_factor(&self) -> f64 {
        self.annualization
    }

    pub fn is_interim(&self) -> bool {
        (self.annualization - 1.0).abs() > f64::EPSILON
    }
}

impl fmt::Display for FiscalPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

/// Ordered list of fiscal periods: fetch order and series column order.
///
/// Invariants: non-empty, unique identifiers, dated periods strictly
/// increasing, only the final period may be interim.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodKey {
    periods: Vec<FiscalPeriod>,
}

impl PeriodKey {
    pub fn new(periods: Vec<FiscalPeriod>) -> Result<Self> {
        if periods.is_empty() {
            return Err(Error::InvalidInput("period list is empty".into()));
        }

        let mut seen = HashSet::new();
        for period in &periods {
            if !seen.insert(period.id()) {
                return Err(Error::InvalidInput(format!(
                    "duplicate period '{}'",
                    period.id()
                )));
            }
        }

        let dates: Vec<NaiveDate> = periods.iter().filter_map(|p| p.report_date()).collect();
        if dates.windows(2).any(|w| w[0] >= w[1]) {
            return Err(Error::InvalidInput(
                "report dates must be strictly increasing".into(),
            ));
        }

        if let Some(p) = periods[..periods.len() - 1].iter().find(|p| p.is_interim()) {
            return Err(Error::InvalidInput(format!(
                "interim period '{}' must be the last period",
                p.id()
            )));
        }

        Ok(Self { periods })
    }

    /// Parse each identifier with [`FiscalPeriod::parse`].
    pub fn from_ids<S: AsRef<str>>(ids: &[S]) -> Result<Self> {
        let periods = ids
            .iter()
            .map(|s| FiscalPeriod::parse(s.as_ref()))
            .collect();
        Self::new(periods)
    }

    pub fn len(&self) -> usize {
        self.periods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.periods.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FiscalPeriod> {
        self.periods.iter()
    }

    pub fn last(&self) -> &FiscalPeriod {
        // Non-empty by construction.
        &self.periods[self.periods.len() - 1]
    }

    pub fn ids(&self) -> Vec<String> {
        self.periods.iter().map(|p| p.id().to_string()).collect()
    }
}

// ============================================================================
// Period Snapshot
// ============================================================================

/// ROE (%) of every instrument reported for one period.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PeriodSnapshot {
    values: HashMap<InstrumentId, f64>,
}

impl PeriodSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from parsed rows, dropping missing or non-finite ratios.
    /// A repeated code keeps its last value.
    pub fn from_rows<I>(rows: I) -> Self
    where
        I: IntoIterator<Item = (InstrumentId, Option<f64>)>,
    {
        let mut snapshot = Self::new();
        for (id, value) in rows {
            if let Some(v) = value {
                snapshot.insert(id, v);
            }
        }
        snapshot
    }

    /// Insert a ratio; non-finite values are ignored.
    pub fn insert(&mut self, id: InstrumentId, value: f64) {
        if value.is_finite() {
            self.values.insert(id, value);
        }
    }

    pub fn get(&self, id: &str) -> Option<f64> {
        self.values.get(id).copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn instruments(&self) -> impl Iterator<Item = &InstrumentId> {
        self.values.keys()
    }
}

impl FromIterator<(InstrumentId, f64)> for PeriodSnapshot {
    fn from_iter<T: IntoIterator<Item = (InstrumentId, f64)>>(iter: T) -> Self {
        Self::from_rows(iter.into_iter().map(|(id, v)| (id, Some(v))))
    }
}

// ============================================================================
// Quote Items
// ============================================================================

/// Item → value mapping returned by quote and profile sources.
///
/// Values are kept as raw JSON so that parsing into numbers happens in one
/// place ([`parse`]) and never fails the caller.
pub type QuoteItems = BTreeMap<String, serde_json::Value>;

/// Canonical item keys used by adapters.
pub mod fields {
    /// Dynamic price-to-earnings ratio
    pub const PE_RATIO: &str = "pe_ratio";
    /// Trailing dividend yield (%)
    pub const DIVIDEND_YIELD: &str = "dividend_yield";
    /// Price-to-book ratio
    pub const PB_RATIO: &str = "pb_ratio";
    /// Display name
    pub const NAME: &str = "name";
    /// Industry classification
    pub const INDUSTRY: &str = "industry";
}

// ============================================================================
// Tests
// ============================================================================
