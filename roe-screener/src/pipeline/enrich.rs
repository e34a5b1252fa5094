//! Concurrent market-multiple enrichment.
//!
//! Every instrument is probed under one or more exchange-qualified symbols
//! (`SH600519`, `SZ000001`, ...) until a quote with all four fields turns up.
//! One task per instrument runs in a `JoinSet`; a semaphore caps how many
//! probe at once.

use roe_common::config::{EnrichmentConfig, RouteRule};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::data::parse::{parse_metric, parse_text};
use crate::data::{fields, InstrumentId, QuoteItems, QuoteSource};

// ============================================================================
// Routing
// ============================================================================

/// Ordered prefix → exchange rules with a fallback list.
#[derive(Debug, Clone)]
pub struct RoutingTable {
    rules: Vec<RouteRule>,
    fallback: Vec<String>,
}

impl RoutingTable {
    pub fn new(rules: Vec<RouteRule>, fallback: Vec<String>) -> Self {
        Self { rules, fallback }
    }

    /// Exchanges to probe for `id`; the first matching rule wins.
    pub fn exchanges_for(&self, id: &InstrumentId) -> &[String] {
        self.rules
            .iter()
            .find(|rule| rule.prefixes.iter().any(|p| id.has_prefix(p)))
            .map(|rule| rule.exchanges.as_slice())
            .unwrap_or(&self.fallback)
    }

    /// Candidate symbols in probe order.
    pub fn candidates(&self, id: &InstrumentId) -> Vec<String> {
        self.exchanges_for(id)
            .iter()
            .map(|exchange| format!("{}{}", exchange, id))
            .collect()
    }
}

impl Default for RoutingTable {
    fn default() -> Self {
        Self::from(&EnrichmentConfig::default())
    }
}

impl From<&EnrichmentConfig> for RoutingTable {
    fn from(config: &EnrichmentConfig) -> Self {
        Self::new(config.routes.clone(), config.fallback_exchanges.clone())
    }
}

// ============================================================================
// Multiples
// ============================================================================

/// Market multiples of one instrument.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Multiples {
    /// Dynamic P/E
    pub pe_ratio: Option<f64>,
    /// Dividend yield (%)
    pub dividend_yield: Option<f64>,
    /// P/B
    pub pb_ratio: Option<f64>,
    pub display_name: Option<String>,
    /// Exchange-qualified symbol that answered
    pub symbol: Option<String>,
}

impl Multiples {
    pub fn missing() -> Self {
        Self::default()
    }

    /// Parse quote items returned for `symbol`.
    pub fn from_items(symbol: &str, items: &QuoteItems) -> Self {
        Self {
            pe_ratio: parse_metric(items.get(fields::PE_RATIO)),
            dividend_yield: parse_metric(items.get(fields::DIVIDEND_YIELD)),
            pb_ratio: parse_metric(items.get(fields::PB_RATIO)),
            display_name: parse_text(items.get(fields::NAME)),
            symbol: Some(symbol.to_string()),
        }
    }

    /// All four fields present.
    pub fn is_complete(&self) -> bool {
        self.pe_ratio.is_some()
            && self.dividend_yield.is_some()
            && self.pb_ratio.is_some()
            && self.display_name.is_some()
    }
}

// ============================================================================
// Enricher
// ============================================================================

/// Probe pacing and concurrency.
#[derive(Debug, Clone)]
pub struct EnricherSettings {
    pub workers: usize,
    pub probe_pause: Duration,
    /// Extra passes over the candidate list after a failed pass
    pub reprobe_rounds: u32,
    pub no_reprobe_prefixes: Vec<String>,
}

impl Default for EnricherSettings {
    fn default() -> Self {
        Self::from(&EnrichmentConfig::default())
    }
}

impl From<&EnrichmentConfig> for EnricherSettings {
    fn from(config: &EnrichmentConfig) -> Self {
        Self {
            workers: config.workers,
            probe_pause: Duration::from_millis(config.probe_pause_ms),
            reprobe_rounds: config.reprobe_rounds,
            no_reprobe_prefixes: config.no_reprobe_prefixes.clone(),
        }
    }
}

impl EnricherSettings {
    /// Number of passes over the candidate list for `id`.
    fn passes_for(&self, id: &InstrumentId) -> u32 {
        if self.no_reprobe_prefixes.iter().any(|p| id.has_prefix(p)) {
            1
        } else {
            1 + self.reprobe_rounds
        }
    }
}

/// Looks up market multiples for a batch of instruments.
pub struct MultipleEnricher {
    source: Arc<dyn QuoteSource>,
    routing: RoutingTable,
    settings: EnricherSettings,
}

impl MultipleEnricher {
    pub fn new(
        source: Arc<dyn QuoteSource>,
        routing: RoutingTable,
        settings: EnricherSettings,
    ) -> Self {
        Self {
            source,
            routing,
            settings,
        }
    }

    /// Enrich every id. Failures yield [`Multiples::missing`]; a panicked
    /// task leaves its instrument out of the map.
    pub async fn enrich<I>(&self, ids: I) -> HashMap<InstrumentId, Multiples>
    where
        I: IntoIterator<Item = InstrumentId>,
    {
        let semaphore = Arc::new(Semaphore::new(self.settings.workers.max(1)));
        let mut tasks = JoinSet::new();

        for id in ids {
            let source = Arc::clone(&self.source);
            let semaphore = Arc::clone(&semaphore);
            let candidates = self.routing.candidates(&id);
            let passes = self.settings.passes_for(&id);
            let pause = self.settings.probe_pause;

            tasks.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return (id, Multiples::missing());
                };
                let multiples = probe(source.as_ref(), &id, &candidates, passes, pause).await;
                (id, multiples)
            });
        }

        let mut results = HashMap::with_capacity(tasks.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((id, multiples)) => {
                    results.insert(id, multiples);
                }
                Err(e) => warn!(error = %e, "Enrichment task failed"),
            }
        }

        let complete = results.values().filter(|m| m.is_complete()).count();
        info!(
            source = self.source.name(),
            total = results.len(),
            complete,
            missing = results.len() - complete,
            "Market multiples enrichment complete"
        );
        results
    }
}

/// Walk the candidate list `passes` times; the first complete quote wins.
async fn probe(
    source: &dyn QuoteSource,
    id: &InstrumentId,
    candidates: &[String],
    passes: u32,
    pause: Duration,
) -> Multiples {
    let mut probes = 0u32;
    for pass in 0..passes {
        for symbol in candidates {
            if probes > 0 && !pause.is_zero() {
                tokio::time::sleep(pause).await;
            }
            probes += 1;

            match source.quote(symbol).await {
                Ok(items) => {
                    let multiples = Multiples::from_items(symbol, &items);
                    if multiples.is_complete() {
                        debug!(instrument = %id, symbol = %symbol, pass, "Quote accepted");
                        return multiples;
                    }
                    debug!(instrument = %id, symbol = %symbol, "Quote incomplete");
                }
                Err(e) => debug!(instrument = %id, symbol = %symbol, error = %e, "Quote failed"),
            }
        }
    }

    debug!(instrument = %id, probes, "No complete quote");
    Multiples::missing()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::ProviderError;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Answers only for the listed symbols and records every call.
    struct ScriptedQuotes {
        answers: HashMap<String, QuoteItems>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedQuotes {
        fn new(answers: &[(&str, QuoteItems)]) -> Self {
            Self {
                answers: answers
                    .iter()
                    .map(|(s, items)| (s.to_string(), items.clone()))
                    .collect(),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl QuoteSource for ScriptedQuotes {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn quote(&self, symbol: &str) -> Result<QuoteItems, ProviderError> {
            self.calls.lock().unwrap().push(symbol.to_string());
            self.answers
                .get(symbol)
                .cloned()
                .ok_or_else(|| ProviderError::DataNotAvailable(symbol.to_string()))
        }
    }

    /// Slow source that tracks how many quotes are in flight.
    struct SlowQuotes {
        delay: Duration,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl SlowQuotes {
        fn new(delay: Duration) -> Self {
            Self {
                delay,
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl QuoteSource for SlowQuotes {
        fn name(&self) -> &'static str {
            "slow"
        }

        async fn quote(&self, _symbol: &str) -> Result<QuoteItems, ProviderError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(full_quote())
        }
    }

    fn full_quote() -> QuoteItems {
        let mut items = QuoteItems::new();
        items.insert(fields::PE_RATIO.into(), json!(12.0));
        items.insert(fields::DIVIDEND_YIELD.into(), json!("3.1"));
        items.insert(fields::PB_RATIO.into(), json!(1.5));
        items.insert(fields::NAME.into(), json!("平安银行"));
        items
    }

    fn settings(reprobe_rounds: u32) -> EnricherSettings {
        EnricherSettings {
            workers: 4,
            probe_pause: Duration::from_millis(100),
            reprobe_rounds,
            no_reprobe_prefixes: vec!["8".into()],
        }
    }

    #[test]
    fn test_routing_defaults() {
        let table = RoutingTable::default();
        assert_eq!(
            table.candidates(&"600519".into()),
            vec!["SH600519", "SZ600519"]
        );
        assert_eq!(
            table.candidates(&"000001".into()),
            vec!["SZ000001", "SH000001"]
        );
        assert_eq!(
            table.candidates(&"300750".into()),
            vec!["SZ300750", "SH300750"]
        );
        assert_eq!(
            table.candidates(&"830799".into()),
            vec!["BJ830799", "SZ830799", "SH830799"]
        );
        assert_eq!(
            table.candidates(&"430047".into()),
            vec!["SH430047", "SZ430047", "BJ430047"]
        );
        assert_eq!(
            table.candidates(&"700001".into()),
            vec!["SH700001", "SZ700001", "BJ700001"]
        );
    }

    #[test]
    fn test_multiples_from_placeholder_items() {
        let mut items = full_quote();
        items.insert(fields::PB_RATIO.into(), json!("--"));
        let m = Multiples::from_items("SZ000001", &items);
        assert_eq!(m.pb_ratio, None);
        assert!(!m.is_complete());
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_candidate_wins() {
        let source = Arc::new(ScriptedQuotes::new(&[("SH000001", full_quote())]));
        let enricher = MultipleEnricher::new(source.clone(), RoutingTable::default(), settings(0));

        let out = enricher.enrich(vec![InstrumentId::from("000001")]).await;
        let m = &out[&InstrumentId::from("000001")];
        assert!(m.is_complete());
        assert_eq!(m.symbol.as_deref(), Some("SH000001"));
        assert_eq!(source.calls(), vec!["SZ000001", "SH000001"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reprobe_rounds() {
        let source = Arc::new(ScriptedQuotes::new(&[]));
        let enricher = MultipleEnricher::new(source.clone(), RoutingTable::default(), settings(3));

        let out = enricher.enrich(vec![InstrumentId::from("600000")]).await;
        assert_eq!(out[&InstrumentId::from("600000")], Multiples::missing());
        // two candidates, four passes
        assert_eq!(source.calls().len(), 8);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_reprobe_prefix() {
        let source = Arc::new(ScriptedQuotes::new(&[]));
        let enricher = MultipleEnricher::new(source.clone(), RoutingTable::default(), settings(3));

        enricher.enrich(vec![InstrumentId::from("830799")]).await;
        assert_eq!(source.calls().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_id_gets_an_entry() {
        let source = Arc::new(ScriptedQuotes::new(&[("SZ000001", full_quote())]));
        let enricher = MultipleEnricher::new(source, RoutingTable::default(), settings(0));

        let ids: Vec<InstrumentId> = ["000001", "000002", "600000"]
            .iter()
            .map(|s| InstrumentId::from(*s))
            .collect();
        let out = enricher.enrich(ids).await;
        assert_eq!(out.len(), 3);
        assert!(out[&InstrumentId::from("000001")].is_complete());
        assert!(!out[&InstrumentId::from("000002")].is_complete());
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_flight_requests_bounded_by_workers() {
        let source = Arc::new(SlowQuotes::new(Duration::from_millis(50)));
        let narrow = EnricherSettings {
            workers: 3,
            ..settings(0)
        };
        let enricher = MultipleEnricher::new(source.clone(), RoutingTable::default(), narrow);

        let ids: Vec<InstrumentId> = (0..30)
            .map(|n| InstrumentId::new(format!("{:06}", n + 1)))
            .collect();
        let out = enricher.enrich(ids).await;

        assert_eq!(out.len(), 30);
        assert!(out.values().all(Multiples::is_complete));
        assert_eq!(source.peak.load(Ordering::SeqCst), 3);
        assert_eq!(source.in_flight.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_between_consecutive_requests() {
        let source = Arc::new(ScriptedQuotes::new(&[]));
        let enricher = MultipleEnricher::new(source.clone(), RoutingTable::default(), settings(3));

        let start = tokio::time::Instant::now();
        enricher.enrich(vec![InstrumentId::from("600000")]).await;

        // eight requests, seven pauses of 100 ms
        assert_eq!(source.calls().len(), 8);
        assert_eq!(start.elapsed(), Duration::from_millis(700));
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_request_is_not_delayed() {
        let source = Arc::new(ScriptedQuotes::new(&[("SH600000", full_quote())]));
        let enricher = MultipleEnricher::new(source, RoutingTable::default(), settings(3));

        let start = tokio::time::Instant::now();
        let out = enricher.enrich(vec![InstrumentId::from("600000")]).await;

        assert!(out[&InstrumentId::from("600000")].is_complete());
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}
