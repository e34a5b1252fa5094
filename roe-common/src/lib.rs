//! ROE Common - Shared configuration, error types and logging for the ROE screener.
//!
//! This crate provides:
//! - Configuration types and loading
//! - Error types and handling utilities
//! - Logging setup

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod logging;

pub use config::{
    BackoffConfig, BackoffKind, Config, EnrichmentConfig, FetchConfig, ObservabilityConfig,
    OutputConfig, QualityConfig, RouteRule, ScoringConfig, ScreenerConfig, SegmentConfig,
    SourcesConfig,
};
pub use error::{Error, Result};
