//! Report rows and JSON output for screening results.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use crate::data::parse::parse_text;
use crate::data::{fields, InstrumentId, ProfileSource};
use crate::pipeline::{FilterResult, RankedReport, ScreenerResult};

// ============================================================================
// Report Row
// ============================================================================

/// One ranked instrument as written to the report.
///
/// Field order is the output column order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportRow {
    pub rank: usize,
    pub instrument: InstrumentId,
    pub display_name: String,
    /// Industry, when the profile lookup succeeded
    pub sector: Option<String>,
    /// ROE per period (%), interim slot annualized; `null` when not reported
    pub period_values: Vec<Option<f64>>,
    pub average_roe: f64,
    pub pe_ratio: f64,
    pub dividend_yield: f64,
    pub pb_ratio: f64,
    pub value_score: f64,
}

/// Turns a ranking into report rows, optionally looking up sectors.
pub struct ReportBuilder {
    profiles: Option<Arc<dyn ProfileSource>>,
}

impl ReportBuilder {
    /// Builder that leaves `sector` empty.
    pub fn new() -> Self {
        Self { profiles: None }
    }

    /// Builder that queries `profiles` once per ranked instrument.
    pub fn with_profiles(profiles: Arc<dyn ProfileSource>) -> Self {
        Self {
            profiles: Some(profiles),
        }
    }

    pub async fn build(&self, report: &RankedReport) -> Vec<ReportRow> {
        let mut rows = Vec::with_capacity(report.len());
        for entry in report.iter() {
            let sector = match &self.profiles {
                Some(source) => self.sector(source.as_ref(), &entry.instrument).await,
                None => None,
            };
            let record = &entry.record;
            rows.push(ReportRow {
                rank: entry.rank,
                instrument: entry.instrument.clone(),
                display_name: record.display_name.clone(),
                sector,
                period_values: record.series.values.clone(),
                average_roe: record.average,
                pe_ratio: record.pe_ratio,
                dividend_yield: record.dividend_yield,
                pb_ratio: record.pb_ratio,
                value_score: record.score,
            });
        }
        rows
    }

    async fn sector(&self, source: &dyn ProfileSource, id: &InstrumentId) -> Option<String> {
        match source.profile(id).await {
            Ok(items) => parse_text(items.get(fields::INDUSTRY)),
            Err(e) => {
                debug!(instrument = %id, error = %e, "Profile lookup failed");
                None
            }
        }
    }
}

impl Default for ReportBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Screener Report
// ============================================================================

/// Serializable run report: funnel summary plus rows.
#[derive(Debug, Clone, Serialize)]
pub struct ScreenerReport {
    pub scan_id: String,
    pub generated_at: DateTime<Utc>,
    pub summary: String,
    pub config_summary: String,
    /// Period ids, matching `period_values` positions
    pub periods: Vec<String>,
    pub filter_results: Vec<FilterResult>,
    pub coverage: BTreeMap<usize, usize>,
    pub rows: Vec<ReportRow>,
}

impl ScreenerReport {
    pub fn new(result: &ScreenerResult, rows: Vec<ReportRow>) -> Self {
        Self {
            scan_id: result.id.clone(),
            generated_at: result.completed_at,
            summary: result.summary(),
            config_summary: result.config_summary.clone(),
            periods: result.periods.clone(),
            filter_results: result.filter_results.clone(),
            coverage: result.coverage.clone(),
            rows,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize report")
    }

    /// Write pretty JSON to `path`, creating parent directories.
    pub fn save_json(&self, path: &Path) -> Result<PathBuf> {
        let content = self.to_json()?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create report directory")?;
        }

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write report file {}", path.display()))?;

        info!(path = %path.display(), rows = self.rows.len(), "Report saved");
        Ok(path.to_path_buf())
    }
}
