//! # Watcher
//!
//! Drives evaluation cycles over the `target x timeframe` matrix.
//!
//! Each cycle dispatches one unit per pair to a bounded worker pool. A unit
//! fetches klines and runs every strategy over them. Unit failures are isolated
//! and recorded in the [`CycleReport`]; they never abort the cycle.
//!
//! Two run modes share the same cycle:
//!
//! - [`Watcher::start`] loops at `interval` until stopped or its token fires.
//! - [`Watcher::run_once`] runs one cycle bounded by a timeout.

mod pool;
mod status;

pub use status::{CycleReport, FailureStage, UnitOutcome, UnitReport, WatcherState, WatcherStatus};

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use self::pool::{UnitFuture, UnitHandler, WorkerPool};
use self::status::{lock_run_state, report_status, RunState, SharedRunState};
use crate::aggregation::derive_cross_klines;
use crate::config::{AppConfig, WatcherConfig};
use crate::data_source::{DataSource, KlinesRequest, SourceError, SourceErrorKind};
use crate::notification::{Notification, NotificationLevel, NotificationManager, NotificationType};
use crate::strategy::{build_strategy, MarketData, SignalResult, Strategy, StrategyError};
use crate::{Kline, Timeframe, UtcDateTime};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TargetKind {
    /// Listed directly by the exchange.
    Single,
    /// Derived from two legs quoted in the same currency.
    Calculated { base_leg: String, quote_leg: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WatchTarget {
    pub symbol: String,
    pub kind: TargetKind,
}

impl WatchTarget {
    pub fn single(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            kind: TargetKind::Single,
        }
    }

    pub fn calculated(
        symbol: impl Into<String>,
        base_leg: impl Into<String>,
        quote_leg: impl Into<String>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            kind: TargetKind::Calculated {
                base_leg: base_leg.into(),
                quote_leg: quote_leg.into(),
            },
        }
    }
}

/// One `(target, timeframe)` evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct WorkUnit {
    pub target: WatchTarget,
    pub timeframe: Timeframe,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WatcherError {
    #[error("cannot {action} a watcher in state {state}")]
    InvalidState {
        state: WatcherState,
        action: &'static str,
    },
    #[error("nothing to watch: no targets or no timeframes")]
    NoTargets,
    #[error("cycle timed out after {timeout:?}; {} of {} units cancelled", .report.cancelled, .report.total)]
    Timeout {
        timeout: Duration,
        report: Box<CycleReport>,
    },
    #[error("cycle cancelled; {} of {} units cancelled", .report.cancelled, .report.total)]
    Cancelled { report: Box<CycleReport> },
    /// Some unit exhausted its fetch retries or lost a signal on every channel.
    #[error("{} of {} units failed past recovery", .report.escalated, .report.total)]
    UnitsFailed { report: Box<CycleReport> },
}

/// Shared, immutable per-unit dependencies.
struct UnitContext {
    source: Arc<dyn DataSource>,
    strategies: Vec<Arc<dyn Strategy>>,
    notifications: Arc<NotificationManager>,
    lookback_bars: usize,
    notify_on_error: bool,
}

pub struct Watcher {
    context: Arc<UnitContext>,
    config: WatcherConfig,
    targets: Vec<WatchTarget>,
    timeframes: Vec<Timeframe>,
    run_state: SharedRunState,
    shutdown: CancellationToken,
}

impl Watcher {
    pub fn new(
        source: Arc<dyn DataSource>,
        strategies: Vec<Arc<dyn Strategy>>,
        notifications: Arc<NotificationManager>,
        config: &WatcherConfig,
        targets: Vec<WatchTarget>,
        timeframes: Vec<Timeframe>,
    ) -> Self {
        let required = strategies
            .iter()
            .map(|strategy| strategy.required_data_points())
            .max()
            .unwrap_or(0);

        Self {
            context: Arc::new(UnitContext {
                source,
                strategies,
                notifications,
                lookback_bars: config.lookback_bars.max(required).max(1),
                notify_on_error: config.notify_on_error,
            }),
            config: config.clone(),
            targets,
            timeframes,
            run_state: Arc::new(Mutex::new(RunState::new())),
            shutdown: CancellationToken::new(),
        }
    }

    /// Builds every configured strategy and watches `targets` on the
    /// configured timeframes.
    pub fn from_config(
        config: &AppConfig,
        source: Arc<dyn DataSource>,
        notifications: Arc<NotificationManager>,
        targets: Vec<WatchTarget>,
    ) -> Result<Self, StrategyError> {
        let strategies = config
            .strategies
            .iter()
            .map(|strategy| build_strategy(strategy).map(Arc::<dyn Strategy>::from))
            .collect::<Result<Vec<Arc<dyn Strategy>>, _>>()?;

        Ok(Self::new(
            source,
            strategies,
            notifications,
            &config.watcher,
            targets,
            config.assets.timeframes.clone(),
        ))
    }

    pub fn status(&self) -> WatcherStatus {
        lock_run_state(&self.run_state).snapshot()
    }

    pub fn targets(&self) -> &[WatchTarget] {
        &self.targets
    }

    /// Daemon mode. Runs the first cycle immediately, then one per
    /// `interval`, until [`stop`](Self::stop) is called or `ctx` is cancelled.
    /// Returns once the in-flight cycle and the status task have wound down.
    pub async fn start(&self, ctx: CancellationToken) -> Result<(), WatcherError> {
        if self.targets.is_empty() || self.timeframes.is_empty() {
            return Err(WatcherError::NoTargets);
        }
        {
            let mut run = lock_run_state(&self.run_state);
            if run.state != WatcherState::Created {
                return Err(WatcherError::InvalidState {
                    state: run.state,
                    action: "start",
                });
            }
            run.state = WatcherState::Running;
            run.started_at = Some(UtcDateTime::now());
        }

        tracing::info!(
            targets = self.targets.len(),
            timeframes = self.timeframes.len(),
            interval_secs = self.config.interval_secs,
            max_workers = self.config.max_workers,
            "watcher started"
        );

        // Cancelling `ctx` is equivalent to calling `stop`.
        let link = {
            let shutdown = self.shutdown.clone();
            let ctx = ctx.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = ctx.cancelled() => shutdown.cancel(),
                    _ = shutdown.cancelled() => {}
                }
            })
        };

        let status_task = tokio::spawn(report_status(
            Arc::clone(&self.run_state),
            Arc::clone(&self.context.notifications),
            self.config.status_interval(),
            self.config.heartbeat,
            self.shutdown.child_token(),
        ));

        let mut ticker = tokio::time::interval(self.config.interval().max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }
            // `stop` may land between the tick and the cycle.
            if self.shutdown.is_cancelled() || ctx.is_cancelled() {
                break;
            }

            let cycle_token = self.shutdown.child_token();
            let report = self
                .run_cycle(self.units(&self.targets, &self.timeframes), &cycle_token)
                .await;
            log_cycle(&report);
        }

        self.stop();
        for task in [link, status_task] {
            if let Err(error) = task.await {
                tracing::warn!(error = %error, "watcher background task ended abnormally");
            }
        }
        tracing::info!(cycles = self.status().cycles_run, "watcher stopped");
        Ok(())
    }

    /// Moves to `Stopped` and cancels any in-flight cycle. Safe to call
    /// repeatedly and concurrently with a running cycle; no cycle starts
    /// afterwards.
    pub fn stop(&self) {
        lock_run_state(&self.run_state).state = WatcherState::Stopped;
        self.shutdown.cancel();
    }

    /// Single-run mode over the configured targets and timeframes.
    pub async fn run_configured_once(&self, timeout: Duration) -> Result<CycleReport, WatcherError> {
        self.run_once(&self.targets, &self.timeframes, timeout).await
    }

    /// One cycle over `targets x timeframes`, bounded by `timeout`. Every
    /// worker has finished when this returns.
    ///
    /// Fails with [`WatcherError::UnitsFailed`] once the cycle has drained if
    /// any unit exhausted its fetch retries or found every channel failing.
    pub async fn run_once(
        &self,
        targets: &[WatchTarget],
        timeframes: &[Timeframe],
        timeout: Duration,
    ) -> Result<CycleReport, WatcherError> {
        if targets.is_empty() || timeframes.is_empty() {
            return Err(WatcherError::NoTargets);
        }
        let state = lock_run_state(&self.run_state).state;
        if state == WatcherState::Stopped {
            return Err(WatcherError::InvalidState {
                state,
                action: "run",
            });
        }

        let cycle_token = self.shutdown.child_token();
        let timer = {
            let token = cycle_token.clone();
            tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                token.cancel();
            })
        };

        let report = self.run_cycle(self.units(targets, timeframes), &cycle_token).await;
        timer.abort();
        log_cycle(&report);

        if report.cancelled == 0 {
            if report.escalated > 0 {
                return Err(WatcherError::UnitsFailed {
                    report: Box::new(report),
                });
            }
            return Ok(report);
        }
        if self.shutdown.is_cancelled() {
            return Err(WatcherError::Cancelled {
                report: Box::new(report),
            });
        }
        Err(WatcherError::Timeout {
            timeout,
            report: Box::new(report),
        })
    }

    fn units(&self, targets: &[WatchTarget], timeframes: &[Timeframe]) -> Vec<WorkUnit> {
        targets
            .iter()
            .flat_map(|target| {
                timeframes.iter().map(move |timeframe| WorkUnit {
                    target: target.clone(),
                    timeframe: *timeframe,
                })
            })
            .collect()
    }

    async fn run_cycle(&self, units: Vec<WorkUnit>, cancel: &CancellationToken) -> CycleReport {
        let cycle = {
            let mut run = lock_run_state(&self.run_state);
            run.cycles_run += 1;
            run.cycles_run
        };
        let started_at = UtcDateTime::now();
        let started = Instant::now();

        let context = Arc::clone(&self.context);
        let handler: UnitHandler = Arc::new(move |unit: WorkUnit, cancel: CancellationToken| -> UnitFuture {
            let context = Arc::clone(&context);
            Box::pin(async move { evaluate_unit(&context, unit, &cancel).await })
        });

        let pool = WorkerPool::new(self.config.max_workers, self.config.buffer_size);
        let units = pool.run(units, cancel, handler).await;
        let report = CycleReport::from_units(cycle, started_at, started.elapsed(), units);

        lock_run_state(&self.run_state).last_report = Some(report.clone());
        report
    }
}

fn log_cycle(report: &CycleReport) {
    tracing::info!(
        cycle = report.cycle,
        elapsed_ms = report.elapsed.as_millis() as u64,
        total = report.total,
        completed = report.completed,
        signals = report.signals,
        notified = report.notified,
        skipped = report.skipped,
        failed = report.failed,
        escalated = report.escalated,
        cancelled = report.cancelled,
        "cycle finished"
    );
}

async fn evaluate_unit(context: &UnitContext, unit: WorkUnit, cancel: &CancellationToken) -> UnitOutcome {
    let symbol = unit.target.symbol.as_str();
    let klines = match fetch_klines(context, &unit, cancel).await {
        Ok(klines) => klines,
        Err(error) if error.kind() == SourceErrorKind::Cancelled => return UnitOutcome::Cancelled,
        Err(error) => {
            tracing::warn!(
                symbol,
                timeframe = %unit.timeframe,
                code = error.code(),
                error = %error,
                "kline fetch failed"
            );
            if context.notify_on_error {
                report_failure(context, &unit, &error).await;
            }
            return UnitOutcome::Failed {
                stage: FailureStage::Fetch(error.kind()),
                error: error.to_string(),
            };
        }
    };

    let market = MarketData {
        symbol: symbol.to_owned(),
        timeframe: unit.timeframe,
        klines,
        timestamp: UtcDateTime::now(),
    };

    let mut evaluated = 0;
    let mut signals = 0;
    let mut notified = 0;
    let mut strategy_error = None;
    let mut delivery_error = None;
    for strategy in &context.strategies {
        let required = strategy.required_data_points();
        if market.klines.len() < required {
            tracing::debug!(
                symbol,
                timeframe = %unit.timeframe,
                strategy = strategy.name(),
                required,
                available = market.klines.len(),
                "insufficient data, skipping strategy"
            );
            continue;
        }

        match strategy.evaluate(&market) {
            Ok(Some(signal)) => {
                evaluated += 1;
                signals += 1;
                let notification = signal_notification(strategy.as_ref(), &market, &signal);
                match context.notifications.send(&notification).await {
                    Ok(report) if !report.filtered => notified += 1,
                    Ok(_) => {}
                    Err(error) => {
                        tracing::warn!(
                            symbol,
                            strategy = strategy.name(),
                            error = %error,
                            "signal notification failed"
                        );
                        delivery_error.get_or_insert_with(|| error.to_string());
                    }
                }
            }
            Ok(None) => evaluated += 1,
            Err(StrategyError::InsufficientData { .. }) => {}
            Err(error) => {
                tracing::warn!(
                    symbol,
                    timeframe = %unit.timeframe,
                    strategy = strategy.name(),
                    error = %error,
                    "strategy evaluation failed"
                );
                strategy_error.get_or_insert_with(|| format!("{}: {error}", strategy.name()));
            }
        }
    }

    if let Some(error) = delivery_error {
        return UnitOutcome::Failed {
            stage: FailureStage::Delivery,
            error,
        };
    }
    if let Some(error) = strategy_error {
        return UnitOutcome::Failed {
            stage: FailureStage::Strategy,
            error,
        };
    }
    if evaluated == 0 {
        return UnitOutcome::Skipped {
            reason: format!("{} bars available, no strategy could run", market.klines.len()),
        };
    }
    UnitOutcome::Evaluated { signals, notified }
}

async fn fetch_klines(
    context: &UnitContext,
    unit: &WorkUnit,
    cancel: &CancellationToken,
) -> Result<Vec<Kline>, SourceError> {
    let request = |symbol: &str| KlinesRequest::latest(symbol, unit.timeframe, context.lookback_bars);

    match &unit.target.kind {
        TargetKind::Single => {
            context
                .source
                .klines(request(&unit.target.symbol)?, cancel)
                .await
        }
        TargetKind::Calculated {
            base_leg,
            quote_leg,
        } => {
            let base = context.source.klines(request(base_leg)?, cancel).await?;
            let quote = context.source.klines(request(quote_leg)?, cancel).await?;
            Ok(derive_cross_klines(&base, &quote, &unit.target.symbol)?)
        }
    }
}

fn signal_notification(strategy: &dyn Strategy, market: &MarketData, signal: &SignalResult) -> Notification {
    let mut notification = Notification::new(
        NotificationType::StrategySignal,
        signal.level,
        format!(
            "{} {} {} {}",
            market.symbol,
            market.timeframe,
            strategy.name(),
            signal.kind.as_str().to_uppercase()
        ),
        signal.message.clone(),
    )
    .with_asset(&market.symbol)
    .with_strategy(strategy.name())
    .with_data("timeframe", market.timeframe)
    .with_data("signal", signal.kind)
    .with_data("price", signal.price);

    for (name, value) in &signal.indicators {
        notification = notification.with_data(name.clone(), format!("{value:.2}"));
    }
    notification
}

async fn report_failure(context: &UnitContext, unit: &WorkUnit, error: &SourceError) {
    let notification = Notification::new(
        NotificationType::SystemAlert,
        NotificationLevel::Error,
        format!("{} {} data fetch failed", unit.target.symbol, unit.timeframe),
        error.to_string(),
    )
    .with_asset(&unit.target.symbol)
    .with_data("code", error.code())
    .with_data("exchange", context.source.name());

    if let Err(error) = context.notifications.send(&notification).await {
        tracing::warn!(error = %error, "failure alert delivery failed");
    }
}
