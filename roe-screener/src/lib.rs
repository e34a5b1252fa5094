//! ROE Screener Library
//!
//! Multi-period ROE reconciliation and value scoring for A-share equities.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                         roe-screener                                │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────┐     │
//! │  │  Data Sources   │  │  Pipeline       │  │  Report         │     │
//! │  │  (Eastmoney,    │─▶│  fetch → align  │─▶│  rows + sector  │     │
//! │  │   Xueqiu)       │  │  → filter →     │  │  → JSON         │     │
//! │  │                 │  │  enrich → rank  │  │                 │     │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────┘     │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Key Concepts
//!
//! ## Reconciled series
//! - One ROE slot per fiscal period, `None` when the period was not reported
//! - A trailing half-year is annualized (×2) before averaging
//! - B-shares and NEEQ/BSE codes (`2`, `8`, `9`) are dropped
//!
//! ## Quality filter
//! - Average above a minimum, worst period above a floor
//! - Consistency: `|min| × K > avg` or `min × K > avg`
//!
//! ## Value score
//! - `(avg / 12) / P/B + (100 / P/E) / 12`
//! - Admission: P/E < 200, dividend yield > 0.1%, P/B < 33

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod data;
pub mod pipeline;
pub mod report;

pub use data::{
    EastmoneyAdapter, FiscalPeriod, InstrumentId, PeriodKey, PeriodSnapshot, ProfileSource,
    ProfitabilitySource, ProviderError, QuoteItems, QuoteSource, XueqiuAdapter,
};
pub use pipeline::{RankedReport, Screener, ScreenerResult};
pub use report::{ReportBuilder, ReportRow, ScreenerReport};
