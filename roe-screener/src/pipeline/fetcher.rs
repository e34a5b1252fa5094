//! Per-period snapshot retrieval with bounded retry.

use roe_common::config::{BackoffKind, FetchConfig};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::data::{FiscalPeriod, PeriodKey, PeriodSnapshot, ProfitabilitySource};

// ============================================================================
// Backoff
// ============================================================================

/// Delay between consecutive attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Same delay after every failure
    Fixed(Duration),
    /// `min(base * 2^(attempt-1), cap)`
    Exponential { base: Duration, cap: Duration },
}

impl Backoff {
    /// Delay to wait after the failed `attempt` (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        match *self {
            Self::Fixed(delay) => delay,
            Self::Exponential { base, cap } => {
                let shift = attempt.saturating_sub(1).min(31);
                base.checked_mul(1u32 << shift).unwrap_or(cap).min(cap)
            }
        }
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::Exponential {
            base: Duration::from_secs(1),
            cap: Duration::from_secs(30),
        }
    }
}

/// Retry budget and delay policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            backoff: Backoff::default(),
        }
    }
}

impl From<&FetchConfig> for RetryPolicy {
    fn from(config: &FetchConfig) -> Self {
        let base = Duration::from_millis(config.backoff.base_ms);
        let backoff = match config.backoff.kind {
            BackoffKind::Fixed => Backoff::Fixed(base),
            BackoffKind::Exponential => Backoff::Exponential {
                base,
                cap: Duration::from_millis(config.backoff.cap_ms),
            },
        };
        Self {
            max_attempts: config.max_retries.max(1),
            backoff,
        }
    }
}

// ============================================================================
// Period Fetcher
// ============================================================================

/// Retrieves full-market ROE snapshots one period at a time.
pub struct PeriodFetcher {
    source: Arc<dyn ProfitabilitySource>,
    policy: RetryPolicy,
}

impl PeriodFetcher {
    pub fn new(source: Arc<dyn ProfitabilitySource>, policy: RetryPolicy) -> Self {
        Self { source, policy }
    }

    /// Fetch one period, retrying any provider error.
    ///
    /// Permanent errors are retried too but logged as such. Once the attempt
    /// budget is spent the period is reported as empty; this never fails.
    pub async fn fetch(&self, period: &FiscalPeriod) -> PeriodSnapshot {
        let max = self.policy.max_attempts.max(1);

        for attempt in 1..=max {
            info!(
                period = %period,
                source = self.source.name(),
                attempt,
                max_attempts = max,
                "Fetching ROE snapshot"
            );

            match self.source.fetch_period(period).await {
                Ok(snapshot) => {
                    info!(period = %period, rows = snapshot.len(), "ROE snapshot fetched");
                    return snapshot;
                }
                Err(e) if attempt < max => {
                    let wait = self.policy.backoff.delay(attempt);
                    if e.is_recoverable() {
                        warn!(
                            period = %period,
                            attempt,
                            kind = e.kind(),
                            error = %e,
                            wait_ms = wait.as_millis() as u64,
                            "ROE snapshot fetch failed, retrying"
                        );
                    } else {
                        warn!(
                            period = %period,
                            attempt,
                            kind = e.kind(),
                            error = %e,
                            wait_ms = wait.as_millis() as u64,
                            "ROE snapshot fetch failed with a permanent error, retrying anyway"
                        );
                    }
                    tokio::time::sleep(wait).await;
                }
                Err(e) => {
                    warn!(
                        period = %period,
                        attempts = max,
                        kind = e.kind(),
                        recoverable = e.is_recoverable(),
                        error = %e,
                        "ROE snapshot unavailable, continuing with empty period"
                    );
                }
            }
        }

        PeriodSnapshot::new()
    }

    /// Fetch every period in order, keyed by period id.
    pub async fn fetch_all(&self, periods: &PeriodKey) -> BTreeMap<String, PeriodSnapshot> {
        let mut snapshots = BTreeMap::new();
        for period in periods.iter() {
            let snapshot = self.fetch(period).await;
            snapshots.insert(period.id().to_string(), snapshot);
        }
        snapshots
    }
}
