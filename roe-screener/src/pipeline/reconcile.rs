//! Multi-period alignment of ROE snapshots.

use roe_common::config::SegmentConfig;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use crate::data::{InstrumentId, PeriodKey, PeriodSnapshot};

/// One instrument's aligned ROE history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconciledSeries {
    /// One slot per period, in period order; the interim slot is annualized
    pub values: Vec<Option<f64>>,
    /// Mean of the present slots
    pub average: Option<f64>,
}

impl ReconciledSeries {
    /// Build from slots and compute the average.
    pub fn new(values: Vec<Option<f64>>) -> Self {
        let present: Vec<f64> = values.iter().flatten().copied().collect();
        Self {
            average: mean(&present),
            values,
        }
    }

    /// Period slots followed by the average.
    pub fn slots(&self) -> impl Iterator<Item = Option<f64>> + '_ {
        self.values
            .iter()
            .copied()
            .chain(std::iter::once(self.average))
    }

    /// Values of the periods that reported.
    pub fn present(&self) -> Vec<f64> {
        self.values.iter().flatten().copied().collect()
    }
}

/// Arithmetic mean, `None` for an empty slice.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Drops instruments by leading code characters (B-shares, NEEQ/BSE boards).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SegmentExclusion {
    prefixes: Vec<String>,
}

impl SegmentExclusion {
    pub fn new<S: Into<String>>(prefixes: impl IntoIterator<Item = S>) -> Self {
        Self {
            prefixes: prefixes.into_iter().map(Into::into).collect(),
        }
    }

    /// Keep everything.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn excludes(&self, id: &InstrumentId) -> bool {
        self.prefixes.iter().any(|p| id.has_prefix(p))
    }
}

impl From<&SegmentConfig> for SegmentExclusion {
    fn from(config: &SegmentConfig) -> Self {
        Self::new(config.excluded_prefixes.iter().cloned())
    }
}

/// All instruments that appear in any snapshot.
pub fn universe(snapshots: &BTreeMap<String, PeriodSnapshot>) -> BTreeSet<InstrumentId> {
    snapshots
        .values()
        .flat_map(|s| s.instruments().cloned())
        .collect()
}

/// Merges per-period snapshots into one series per instrument.
#[derive(Debug, Clone, Default)]
pub struct SeriesReconciler {
    exclusion: SegmentExclusion,
}

impl SeriesReconciler {
    pub fn new(exclusion: SegmentExclusion) -> Self {
        Self { exclusion }
    }

    /// Align `snapshots` (keyed by period id) to `periods`.
    ///
    /// A period without a snapshot counts as empty. Output is ordered by
    /// instrument id.
    pub fn reconcile(
        &self,
        periods: &PeriodKey,
        snapshots: &BTreeMap<String, PeriodSnapshot>,
    ) -> BTreeMap<InstrumentId, ReconciledSeries> {
        let empty = PeriodSnapshot::new();
        let columns: Vec<(&PeriodSnapshot, f64)> = periods
            .iter()
            .map(|p| {
                (
                    snapshots.get(p.id()).unwrap_or(&empty),
                    p.annualization_factor(),
                )
            })
            .collect();

        let ids = universe(snapshots);
        let total = ids.len();

        let series: BTreeMap<_, _> = ids
            .into_iter()
            .filter(|id| !self.exclusion.excludes(id))
            .map(|id| {
                let values = columns
                    .iter()
                    .map(|(snapshot, factor)| snapshot.get(id.as_str()).map(|v| v * factor))
                    .collect();
                (id, ReconciledSeries::new(values))
            })
            .collect();

        debug!(
            instruments = total,
            retained = series.len(),
            periods = periods.len(),
            "Series reconciled"
        );
        series
    }
}
