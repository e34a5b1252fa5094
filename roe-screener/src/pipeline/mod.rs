//! Screening pipeline.
//!
//! ```text
//! PeriodFetcher ──▶ SeriesReconciler ──▶ UniverseFilter ──▶ MultipleEnricher ──▶ ScoreAndRank
//!  (per period)      (align, annualize,    (level, floor,     (concurrent quote     (value score,
//!                     segment exclusion)    consistency)       probing)              bounds, rank)
//! ```
//!
//! [`Screener`] runs the stages in order and records the funnel.

pub mod enrich;
pub mod fetcher;
pub mod filter;
pub mod reconcile;
pub mod score;

pub use enrich::{EnricherSettings, MultipleEnricher, Multiples, RoutingTable};
pub use fetcher::{Backoff, PeriodFetcher, RetryPolicy};
pub use filter::{FilterOutcome, FilterResult, FilterStage, QualityVerdict, UniverseFilter};
pub use reconcile::{mean, ReconciledSeries, SegmentExclusion, SeriesReconciler};
pub use score::{
    value_score, EnrichedRecord, RankOutcome, RankedEntry, RankedReport, ScoreAndRank,
};

use chrono::{DateTime, Utc};
use roe_common::config::ScreenerConfig;
use roe_common::Result;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

use crate::data::{PeriodKey, ProfitabilitySource, QuoteSource};

// ============================================================================
// Screener Result
// ============================================================================

/// Result of one screening run.
#[derive(Debug, Clone, Serialize)]
pub struct ScreenerResult {
    /// Run ID (timestamp-based)
    pub id: String,
    /// Period ids, in column order
    pub periods: Vec<String>,
    /// Ranked instruments
    pub report: RankedReport,
    /// Filter stage results
    pub filter_results: Vec<FilterResult>,
    /// Reporting periods → retained instruments
    pub coverage: BTreeMap<usize, usize>,
    /// Instruments seen in any period
    pub total_scanned: usize,
    /// Thresholds used
    pub config_summary: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_secs: f64,
}

impl ScreenerResult {
    /// Get the top N ranked entries.
    pub fn top(&self, n: usize) -> &[RankedEntry] {
        self.report.top(n)
    }

    /// Result of one funnel stage.
    pub fn stage(&self, stage: FilterStage) -> Option<&FilterResult> {
        self.filter_results.iter().find(|r| r.stage == stage)
    }

    /// Summary string for logging.
    pub fn summary(&self) -> String {
        format!(
            "Screened {} instruments in {:.1}s: {} ranked ({:.1}%)",
            self.total_scanned,
            self.duration_secs,
            self.report.len(),
            if self.total_scanned > 0 {
                (self.report.len() as f64 / self.total_scanned as f64) * 100.0
            } else {
                0.0
            }
        )
    }
}

// ============================================================================
// Screener
// ============================================================================

/// Runs the full pipeline against the configured sources.
pub struct Screener {
    config: ScreenerConfig,
    periods: PeriodKey,
    fetcher: PeriodFetcher,
    reconciler: SeriesReconciler,
    filter: UniverseFilter,
    enricher: MultipleEnricher,
    ranker: ScoreAndRank,
}

impl Screener {
    /// Validate the configuration and wire the stages.
    pub fn new(
        config: ScreenerConfig,
        profitability: Arc<dyn ProfitabilitySource>,
        quotes: Arc<dyn QuoteSource>,
    ) -> Result<Self> {
        config
            .validate()
            .map_err(|e| e.with_context("invalid screener configuration"))?;
        let periods = PeriodKey::from_ids(&config.periods)
            .map_err(|e| e.with_context("invalid period list"))?;

        Ok(Self {
            periods,
            fetcher: PeriodFetcher::new(profitability, RetryPolicy::from(&config.fetch)),
            reconciler: SeriesReconciler::new(SegmentExclusion::from(&config.segments)),
            filter: UniverseFilter::new(config.quality.clone()),
            enricher: MultipleEnricher::new(
                quotes,
                RoutingTable::from(&config.enrichment),
                EnricherSettings::from(&config.enrichment),
            ),
            ranker: ScoreAndRank::new(config.scoring.clone()),
            config,
        })
    }

    pub fn periods(&self) -> &PeriodKey {
        &self.periods
    }

    /// Run every stage. Source failures degrade to exclusions, so this
    /// always produces a result; an unreachable source gives an empty one.
    pub async fn run(&self) -> ScreenerResult {
        let started_at = Utc::now();
        let id = format!("scan_{}", started_at.format("%Y%m%d_%H%M%S"));

        info!(scan_id = %id, periods = ?self.periods.ids(), "Starting ROE screen");

        // Phase 1: fetch and reconcile
        let snapshots = self.fetcher.fetch_all(&self.periods).await;
        let total_scanned = reconcile::universe(&snapshots).len();
        let reconciled = self.reconciler.reconcile(&self.periods, &snapshots);
        let input_result = FilterResult::new(FilterStage::Input, total_scanned, total_scanned);
        let segment_result =
            FilterResult::new(FilterStage::Segment, total_scanned, reconciled.len());
        info!(
            instruments = total_scanned,
            passed = reconciled.len(),
            "Phase 1 (Reconcile) complete"
        );

        // Phase 2: quality filter
        let FilterOutcome {
            retained,
            result: quality_result,
            coverage,
        } = self.filter.filter(&reconciled);
        info!(passed = retained.len(), "Phase 2 (Quality) complete");

        // Phase 3: enrichment
        let multiples = self.enricher.enrich(retained.keys().cloned()).await;
        info!(enriched = multiples.len(), "Phase 3 (Enrichment) complete");

        // Phase 4: score and rank
        let RankOutcome { report, results } = self.ranker.rank(&retained, &multiples);

        let mut filter_results = vec![input_result, segment_result, quality_result];
        filter_results.extend(results);

        let completed_at = Utc::now();
        let duration_secs = (completed_at - started_at).num_milliseconds() as f64 / 1000.0;

        let result = ScreenerResult {
            id,
            periods: self.periods.ids(),
            report,
            filter_results,
            coverage,
            total_scanned,
            config_summary: self.config.summary(),
            started_at,
            completed_at,
            duration_secs,
        };

        info!(
            scan_id = %result.id,
            ranked = result.report.len(),
            duration = format!("{:.1}s", duration_secs),
            "ROE screen complete"
        );

        result
    }
}
