//! Pre-flight check that configured assets exist on the active exchange.

use std::collections::HashMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::AssetsConfig;
use crate::data_source::{DataSource, SourceError, SourceErrorKind};
use crate::domain::symbol::to_compact_pair;
use crate::watcher::WatchTarget;

/// A cross rate computed from two legs that share the configured quote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalculatedPair {
    /// Compact cross symbol, e.g. `ETHBTC`.
    pub symbol: String,
    pub base_leg: String,
    pub quote_leg: String,
}

#[derive(Debug, Clone)]
pub struct ProbeFailure {
    pub symbol: String,
    pub error: SourceError,
}

/// Partition of the configured assets. Missing or unprobeable entries are
/// reported, never fatal.
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub singles: Vec<String>,
    /// Cross pairs listed directly by the exchange.
    pub cross_pairs: Vec<String>,
    pub calculated: Vec<CalculatedPair>,
    pub missing: Vec<String>,
    pub failures: Vec<ProbeFailure>,
}

impl ValidationReport {
    pub fn targets(&self) -> Vec<WatchTarget> {
        self.singles
            .iter()
            .chain(&self.cross_pairs)
            .map(|symbol| WatchTarget::single(symbol.clone()))
            .chain(self.calculated.iter().map(|pair| {
                WatchTarget::calculated(pair.symbol.clone(), pair.base_leg.clone(), pair.quote_leg.clone())
            }))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.singles.is_empty() && self.cross_pairs.is_empty() && self.calculated.is_empty()
    }
}

pub struct AssetValidator {
    source: Arc<dyn DataSource>,
}

impl AssetValidator {
    pub fn new(source: Arc<dyn DataSource>) -> Self {
        Self { source }
    }

    /// Probes every symbol and cross pair once. Only cancellation aborts.
    pub async fn validate(
        &self,
        assets: &AssetsConfig,
        cancel: &CancellationToken,
    ) -> Result<ValidationReport, SourceError> {
        let mut probes = ProbeCache::new(self.source.as_ref(), cancel);
        let mut report = ValidationReport::default();

        for symbol in &assets.symbols {
            let pair = assets.pair_for(symbol);
            match probes.check(&pair).await? {
                Ok(true) => push_unique(&mut report.singles, pair),
                Ok(false) => push_unique(&mut report.missing, pair),
                Err(error) => report.failures.push(ProbeFailure { symbol: pair, error }),
            }
        }

        for cross in &assets.cross_pairs {
            let Some((base, quote)) = cross.split_once('/') else {
                push_unique(&mut report.missing, cross.clone());
                continue;
            };
            let direct = to_compact_pair(cross);

            match probes.check(&direct).await? {
                Ok(true) => {
                    push_unique(&mut report.cross_pairs, direct);
                    continue;
                }
                Ok(false) => {}
                Err(error) => {
                    report.failures.push(ProbeFailure { symbol: direct, error });
                    continue;
                }
            }

            let base_leg = assets.pair_for(base);
            let quote_leg = assets.pair_for(quote);
            let base_ok = probes.check(&base_leg).await?;
            let quote_ok = probes.check(&quote_leg).await?;
            match (base_ok, quote_ok) {
                (Ok(true), Ok(true)) => report.calculated.push(CalculatedPair {
                    symbol: direct,
                    base_leg,
                    quote_leg,
                }),
                (Err(error), _) | (_, Err(error)) => {
                    report.failures.push(ProbeFailure { symbol: direct, error });
                }
                _ => push_unique(&mut report.missing, cross.trim().to_ascii_uppercase()),
            }
        }

        tracing::info!(
            exchange = self.source.name(),
            singles = report.singles.len(),
            cross_pairs = report.cross_pairs.len(),
            calculated = report.calculated.len(),
            missing = ?report.missing,
            failures = report.failures.len(),
            "asset validation finished"
        );
        Ok(report)
    }
}

/// Memoizes probe results so shared legs are only requested once.
struct ProbeCache<'a> {
    source: &'a dyn DataSource,
    cancel: &'a CancellationToken,
    results: HashMap<String, Result<bool, SourceError>>,
}

impl<'a> ProbeCache<'a> {
    fn new(source: &'a dyn DataSource, cancel: &'a CancellationToken) -> Self {
        Self {
            source,
            cancel,
            results: HashMap::new(),
        }
    }

    /// Outer error is cancellation; inner is the per-symbol outcome.
    async fn check(&mut self, symbol: &str) -> Result<Result<bool, SourceError>, SourceError> {
        if let Some(cached) = self.results.get(symbol) {
            return Ok(cached.clone());
        }

        let outcome = self.source.is_symbol_valid(symbol, self.cancel).await;
        if let Err(error) = &outcome {
            if error.kind() == SourceErrorKind::Cancelled {
                return Err(error.clone());
            }
            tracing::warn!(symbol, error = %error, "symbol probe failed");
        }
        self.results.insert(symbol.to_owned(), outcome.clone());
        Ok(outcome)
    }
}

fn push_unique(list: &mut Vec<String>, value: String) {
    if !list.contains(&value) {
        list.push(value);
    }
}
