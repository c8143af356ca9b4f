use std::fmt::{Display, Formatter};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::WorkUnit;
use crate::data_source::SourceErrorKind;
use crate::notification::{Notification, NotificationLevel, NotificationManager, NotificationType};
use crate::{Timeframe, UtcDateTime};

/// `Created -> Running -> Stopped`; `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherState {
    Created,
    Running,
    Stopped,
}

impl WatcherState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::Stopped => "stopped",
        }
    }
}

impl Display for WatcherState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a unit failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureStage {
    Fetch(SourceErrorKind),
    /// A strategy errored for a reason other than missing bars.
    Strategy,
    /// Every enabled channel rejected a signal notification.
    Delivery,
}

impl FailureStage {
    /// Retry exhaustion and full fan-out failure fail a single run.
    pub const fn escalates(self) -> bool {
        matches!(self, Self::Fetch(SourceErrorKind::DataFetch) | Self::Delivery)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitOutcome {
    /// Data was fetched and at least one strategy ran.
    Evaluated { signals: usize, notified: usize },
    /// Not enough bars for any strategy.
    Skipped { reason: String },
    Failed { stage: FailureStage, error: String },
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitReport {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub outcome: UnitOutcome,
    pub elapsed: Duration,
}

impl UnitReport {
    pub(crate) fn cancelled(unit: &WorkUnit) -> Self {
        Self {
            symbol: unit.target.symbol.clone(),
            timeframe: unit.timeframe,
            outcome: UnitOutcome::Cancelled,
            elapsed: Duration::ZERO,
        }
    }
}

/// Summary of one evaluation cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub cycle: u64,
    pub started_at: UtcDateTime,
    pub elapsed: Duration,
    pub total: usize,
    pub completed: usize,
    pub signals: usize,
    pub notified: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Failed units whose stage [escalates](FailureStage::escalates).
    pub escalated: usize,
    pub cancelled: usize,
    pub units: Vec<UnitReport>,
}

impl CycleReport {
    pub(crate) fn from_units(
        cycle: u64,
        started_at: UtcDateTime,
        elapsed: Duration,
        units: Vec<UnitReport>,
    ) -> Self {
        let mut report = Self {
            cycle,
            started_at,
            elapsed,
            total: units.len(),
            completed: 0,
            signals: 0,
            notified: 0,
            skipped: 0,
            failed: 0,
            escalated: 0,
            cancelled: 0,
            units: Vec::new(),
        };

        for unit in &units {
            match &unit.outcome {
                UnitOutcome::Evaluated { signals, notified } => {
                    report.completed += 1;
                    report.signals += signals;
                    report.notified += notified;
                }
                UnitOutcome::Skipped { .. } => report.skipped += 1,
                UnitOutcome::Failed { stage, .. } => {
                    report.failed += 1;
                    if stage.escalates() {
                        report.escalated += 1;
                    }
                }
                UnitOutcome::Cancelled => report.cancelled += 1,
            }
        }
        report.units = units;
        report
    }
}

/// Point-in-time copy of the watcher's run state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatcherStatus {
    pub state: WatcherState,
    pub cycles_run: u64,
    pub started_at: Option<UtcDateTime>,
    pub last_report: Option<CycleReport>,
}

#[derive(Debug)]
pub(crate) struct RunState {
    pub state: WatcherState,
    pub cycles_run: u64,
    pub started_at: Option<UtcDateTime>,
    pub last_report: Option<CycleReport>,
}

impl RunState {
    pub fn new() -> Self {
        Self {
            state: WatcherState::Created,
            cycles_run: 0,
            started_at: None,
            last_report: None,
        }
    }

    pub fn snapshot(&self) -> WatcherStatus {
        WatcherStatus {
            state: self.state,
            cycles_run: self.cycles_run,
            started_at: self.started_at,
            last_report: self.last_report.clone(),
        }
    }
}

pub(crate) type SharedRunState = Arc<Mutex<RunState>>;

pub(crate) fn lock_run_state(state: &Mutex<RunState>) -> std::sync::MutexGuard<'_, RunState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Periodically logs a status snapshot and optionally emits a heartbeat.
/// Reads only the shared snapshot, never the live cycle.
pub(crate) async fn report_status(
    run_state: SharedRunState,
    notifications: Arc<NotificationManager>,
    every: Duration,
    heartbeat: bool,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(every.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick completes immediately; the first report waits a full period.
    ticker.tick().await;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let status = lock_run_state(&run_state).snapshot();
        let last = status.last_report.as_ref();
        tracing::info!(
            state = %status.state,
            cycles = status.cycles_run,
            last_total = last.map_or(0, |report| report.total),
            last_failed = last.map_or(0, |report| report.failed),
            last_signals = last.map_or(0, |report| report.signals),
            "watcher status"
        );

        if heartbeat {
            let notification = Notification::new(
                NotificationType::Heartbeat,
                NotificationLevel::Info,
                "tickwatch heartbeat",
                format!("state {}, {} cycles run", status.state, status.cycles_run),
            )
            .with_data("cycles", status.cycles_run);
            if let Err(error) = notifications.send(&notification).await {
                tracing::warn!(error = %error, "heartbeat delivery failed");
            }
        }
    }
}
