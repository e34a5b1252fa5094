//! Composite value score, admission bounds and ranking.

use roe_common::config::ScoringConfig;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info, warn};

use super::enrich::Multiples;
use super::filter::{FilterResult, FilterStage};
use super::reconcile::ReconciledSeries;
use crate::data::InstrumentId;

/// `(avg / 12) / pb + (100 / pe) / 12`.
///
/// Monthly ROE per unit of book multiple plus monthly earnings yield.
/// `None` when `pb <= 0` or the result is not finite.
pub fn value_score(average_roe: f64, pe: f64, pb: f64) -> Option<f64> {
    if pb <= 0.0 {
        return None;
    }
    let score = (average_roe / 12.0) / pb + (100.0 / pe) / 12.0;
    score.is_finite().then_some(score)
}

/// Series plus complete multiples and the resulting score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrichedRecord {
    pub series: ReconciledSeries,
    pub average: f64,
    pub pe_ratio: f64,
    pub dividend_yield: f64,
    pub pb_ratio: f64,
    pub display_name: String,
    /// Exchange-qualified symbol the multiples came from
    pub symbol: Option<String>,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedEntry {
    /// 1-based
    pub rank: usize,
    pub instrument: InstrumentId,
    pub record: EnrichedRecord,
}

/// Score-descending, truncated ranking.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RankedReport {
    entries: Vec<RankedEntry>,
}

impl RankedReport {
    pub fn entries(&self) -> &[RankedEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RankedEntry> {
        self.entries.iter()
    }

    pub fn top(&self, n: usize) -> &[RankedEntry] {
        &self.entries[..n.min(self.entries.len())]
    }
}

/// Ranking plus the funnel stages it covers.
#[derive(Debug, Clone)]
pub struct RankOutcome {
    pub report: RankedReport,
    /// Enrichment, Valuation and Final stages
    pub results: Vec<FilterResult>,
}

pub struct ScoreAndRank {
    config: ScoringConfig,
}

impl ScoreAndRank {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    pub fn with_defaults() -> Self {
        Self::new(ScoringConfig::default())
    }

    fn admits(&self, record: &EnrichedRecord) -> bool {
        record.pe_ratio < self.config.max_pe
            && record.dividend_yield > self.config.min_dividend_yield
            && record.pb_ratio < self.config.max_pb
    }

    /// Join series with multiples, score, admit and rank.
    ///
    /// Ties keep instrument-id order.
    pub fn rank(
        &self,
        universe: &BTreeMap<InstrumentId, ReconciledSeries>,
        multiples: &HashMap<InstrumentId, Multiples>,
    ) -> RankOutcome {
        let mut complete = 0usize;
        let mut scored = 0usize;
        let mut admitted: Vec<(InstrumentId, EnrichedRecord)> = Vec::new();

        for (id, series) in universe {
            let Some(m) = multiples.get(id) else {
                continue;
            };
            let (Some(average), Some(pe), Some(dy), Some(pb), Some(name)) = (
                series.average,
                m.pe_ratio,
                m.dividend_yield,
                m.pb_ratio,
                m.display_name.as_ref(),
            ) else {
                debug!(instrument = %id, "Excluded: incomplete multiples");
                continue;
            };
            complete += 1;

            if pb <= 0.0 {
                debug!(instrument = %id, pb, "Excluded: non-positive P/B");
                continue;
            }
            let Some(score) = value_score(average, pe, pb) else {
                warn!(instrument = %id, pe, pb, "Excluded: non-finite value score");
                continue;
            };
            scored += 1;

            let record = EnrichedRecord {
                series: series.clone(),
                average,
                pe_ratio: pe,
                dividend_yield: dy,
                pb_ratio: pb,
                display_name: name.clone(),
                symbol: m.symbol.clone(),
                score,
            };
            if self.admits(&record) {
                admitted.push((id.clone(), record));
            } else {
                debug!(instrument = %id, pe, dy, pb, "Excluded by valuation bounds");
            }
        }

        let valuation_passed = admitted.len();
        admitted.sort_by(|a, b| b.1.score.total_cmp(&a.1.score));
        admitted.truncate(self.config.max_report_len);

        let entries: Vec<RankedEntry> = admitted
            .into_iter()
            .enumerate()
            .map(|(i, (instrument, record))| RankedEntry {
                rank: i + 1,
                instrument,
                record,
            })
            .collect();

        let results = vec![
            FilterResult::new(FilterStage::Enrichment, universe.len(), complete),
            FilterResult::new(FilterStage::Valuation, complete, valuation_passed),
            FilterResult::new(FilterStage::Final, valuation_passed, entries.len()),
        ];

        info!(
            complete,
            scored,
            admitted = valuation_passed,
            ranked = entries.len(),
            "Scoring complete"
        );

        RankOutcome {
            report: RankedReport { entries },
            results,
        }
    }
}
