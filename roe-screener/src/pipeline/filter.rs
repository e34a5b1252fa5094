//! Quality and consistency filter over reconciled series.

use roe_common::config::QualityConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

use super::reconcile::{mean, ReconciledSeries};
use crate::data::InstrumentId;

// ============================================================================
// Filter Stage
// ============================================================================

/// Stages of the screening funnel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterStage {
    /// Input stage (every instrument in any period)
    Input,
    /// Market segment exclusion
    Segment,
    /// ROE level and consistency
    Quality,
    /// Market multiples available
    Enrichment,
    /// Valuation bounds (P/E, P/B, dividend yield)
    Valuation,
    /// Final ranked selection
    Final,
}

impl std::fmt::Display for FilterStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Input => write!(f, "输入"),
            Self::Segment => write!(f, "板块筛选"),
            Self::Quality => write!(f, "质量筛选"),
            Self::Enrichment => write!(f, "行情补全"),
            Self::Valuation => write!(f, "估值筛选"),
            Self::Final => write!(f, "最终结果"),
        }
    }
}

/// Result of a filtering stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterResult {
    /// Stage name
    pub stage: FilterStage,
    /// Number of instruments that passed this stage
    pub passed: usize,
    /// Number of instruments eliminated at this stage
    pub eliminated: usize,
    /// Elimination rate (%)
    pub elimination_rate: f64,
}

impl FilterResult {
    pub fn new(stage: FilterStage, input_count: usize, passed_count: usize) -> Self {
        let eliminated = input_count.saturating_sub(passed_count);
        let elimination_rate = if input_count > 0 {
            (eliminated as f64 / input_count as f64) * 100.0
        } else {
            0.0
        };

        Self {
            stage,
            passed: passed_count,
            eliminated,
            elimination_rate,
        }
    }
}

// ============================================================================
// Universe Filter
// ============================================================================

/// Outcome of the quality test for one instrument.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum QualityVerdict {
    /// Passed; carries the recomputed average
    Retain { average: f64 },
    /// No period reported
    NoData,
    /// Average at or below the minimum
    LowAverage,
    /// Worst period at or below the floor
    LowFloor,
    /// Failed the consistency test
    Inconsistent,
}

/// Instruments that passed, the stage result and the coverage histogram.
#[derive(Debug, Clone)]
pub struct FilterOutcome {
    pub retained: BTreeMap<InstrumentId, ReconciledSeries>,
    pub result: FilterResult,
    /// Number of reporting periods → retained instruments
    pub coverage: BTreeMap<usize, usize>,
}

/// Applies level, floor and consistency thresholds to the period slots.
pub struct UniverseFilter {
    config: QualityConfig,
}

impl UniverseFilter {
    pub fn new(config: QualityConfig) -> Self {
        Self { config }
    }

    pub fn with_defaults() -> Self {
        Self::new(QualityConfig::default())
    }

    /// Judge one series. Only period slots are considered.
    pub fn evaluate(&self, series: &ReconciledSeries) -> QualityVerdict {
        let present = series.present();
        let Some(avg) = mean(&present) else {
            return QualityVerdict::NoData;
        };
        if avg <= self.config.min_average {
            return QualityVerdict::LowAverage;
        }

        let min = present.iter().copied().fold(f64::INFINITY, f64::min);
        if min <= self.config.min_floor {
            return QualityVerdict::LowFloor;
        }

        let k = self.config.consistency_multiplier;
        if min.abs() * k > avg || min * k > avg {
            QualityVerdict::Retain { average: avg }
        } else {
            QualityVerdict::Inconsistent
        }
    }

    /// Filter the whole universe.
    pub fn filter(&self, universe: &BTreeMap<InstrumentId, ReconciledSeries>) -> FilterOutcome {
        let mut retained = BTreeMap::new();
        let mut coverage = BTreeMap::new();

        for (id, series) in universe {
            match self.evaluate(series) {
                QualityVerdict::Retain { average } => {
                    let mut kept = series.clone();
                    kept.average = Some(average);
                    *coverage.entry(kept.present().len()).or_insert(0) += 1;
                    retained.insert(id.clone(), kept);
                }
                verdict => debug!(instrument = %id, ?verdict, "Excluded by quality filter"),
            }
        }

        let result = FilterResult::new(FilterStage::Quality, universe.len(), retained.len());
        for (periods, count) in &coverage {
            info!(periods, count, "Retained instruments by reporting periods");
        }
        info!(
            passed = result.passed,
            eliminated = result.eliminated,
            "Quality filter complete"
        );

        FilterOutcome {
            retained,
            result,
            coverage,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(values: &[Option<f64>]) -> ReconciledSeries {
        ReconciledSeries::new(values.to_vec())
    }

    #[test]
    fn test_filter_result_rates() {
        let r = FilterResult::new(FilterStage::Quality, 200, 50);
        assert_eq!(r.eliminated, 150);
        assert!((r.elimination_rate - 75.0).abs() < 1e-9);

        let empty = FilterResult::new(FilterStage::Input, 0, 0);
        assert_eq!(empty.elimination_rate, 0.0);
    }

    #[test]
    fn test_stage_display() {
        assert_eq!(FilterStage::Quality.to_string(), "质量筛选");
        assert_eq!(FilterStage::Final.to_string(), "最终结果");
    }

    #[test]
    fn test_verdicts() {
        let filter = UniverseFilter::with_defaults();
        assert_eq!(
            filter.evaluate(&series(&[None, None])),
            QualityVerdict::NoData
        );
        assert_eq!(
            filter.evaluate(&series(&[Some(0.5), Some(1.0)])),
            QualityVerdict::LowAverage
        );
        let losing = series(&[Some(-6.0), Some(5.0), Some(5.0), Some(5.0), Some(5.0)]);
        assert_eq!(filter.evaluate(&losing), QualityVerdict::LowFloor);
        assert_eq!(
            filter.evaluate(&series(&[Some(10.0), Some(20.0)])),
            QualityVerdict::Retain { average: 15.0 }
        );
    }

    #[test]
    fn test_inconsistent_series() {
        // min * 80 = 8 is not above avg ≈ 66.7
        let filter = UniverseFilter::with_defaults();
        assert_eq!(
            filter.evaluate(&series(&[Some(0.1), Some(100.0), Some(100.0)])),
            QualityVerdict::Inconsistent
        );
    }

    #[test]
    fn test_strict_rejects_losing_period() {
        let filter = UniverseFilter::new(QualityConfig::strict());
        assert_eq!(
            filter.evaluate(&series(&[Some(-1.0), Some(10.0), Some(10.0)])),
            QualityVerdict::LowFloor
        );
    }

    #[test]
    fn test_filter_overwrites_average_and_counts_coverage() {
        let mut universe = BTreeMap::new();
        universe.insert(
            InstrumentId::from("000001"),
            ReconciledSeries {
                values: vec![Some(10.0), None, Some(20.0)],
                average: None,
            },
        );
        universe.insert(
            InstrumentId::from("000002"),
            series(&[Some(8.0), Some(9.0), Some(10.0)]),
        );
        universe.insert(InstrumentId::from("000003"), series(&[None, None, None]));

        let outcome = UniverseFilter::with_defaults().filter(&universe);
        assert_eq!(outcome.retained.len(), 2);
        assert_eq!(outcome.retained["000001"].average, Some(15.0));
        assert_eq!(outcome.coverage.get(&2), Some(&1));
        assert_eq!(outcome.coverage.get(&3), Some(&1));
        assert_eq!(outcome.result.eliminated, 1);
    }
}
