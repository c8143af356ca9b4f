use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use super::status::{UnitOutcome, UnitReport};
use super::WorkUnit;

pub(crate) type UnitFuture = Pin<Box<dyn Future<Output = UnitOutcome> + Send + 'static>>;
pub(crate) type UnitHandler = Arc<dyn Fn(WorkUnit, CancellationToken) -> UnitFuture + Send + Sync>;

/// Fixed-size pool draining a bounded task queue.
///
/// Every submitted unit yields exactly one [`UnitReport`]: units still queued
/// or never enqueued when `cancel` fires are reported as cancelled.
pub(crate) struct WorkerPool {
    max_workers: usize,
    buffer_size: usize,
}

impl WorkerPool {
    pub fn new(max_workers: usize, buffer_size: usize) -> Self {
        Self {
            max_workers: max_workers.max(1),
            buffer_size: buffer_size.max(1),
        }
    }

    pub async fn run(
        &self,
        units: Vec<WorkUnit>,
        cancel: &CancellationToken,
        handler: UnitHandler,
    ) -> Vec<UnitReport> {
        if units.is_empty() {
            return Vec::new();
        }

        let (tx, rx) = mpsc::channel::<WorkUnit>(self.buffer_size);
        let rx = Arc::new(Mutex::new(rx));
        let workers = self.max_workers.min(units.len());

        let mut set = JoinSet::new();
        for worker in 0..workers {
            let rx = Arc::clone(&rx);
            let cancel = cancel.clone();
            let handler = Arc::clone(&handler);
            set.spawn(async move { drain_queue(worker, rx, cancel, handler).await });
        }

        let mut reports = Vec::with_capacity(units.len());
        let mut pending = units.into_iter();
        while let Some(unit) = pending.next() {
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                permit = tx.reserve() => permit.ok(),
            };
            match permit {
                Some(permit) => permit.send(unit),
                None => {
                    reports.push(UnitReport::cancelled(&unit));
                    reports.extend(pending.by_ref().map(|unit| UnitReport::cancelled(&unit)));
                    break;
                }
            }
        }
        drop(tx);

        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(worker_reports) => reports.extend(worker_reports),
                Err(error) => tracing::error!(error = %error, "watcher worker aborted"),
            }
        }
        reports
    }
}

async fn drain_queue(
    worker: usize,
    rx: Arc<Mutex<mpsc::Receiver<WorkUnit>>>,
    cancel: CancellationToken,
    handler: UnitHandler,
) -> Vec<UnitReport> {
    let mut reports = Vec::new();

    loop {
        let next = { rx.lock().await.recv().await };
        let Some(unit) = next else {
            break;
        };

        if cancel.is_cancelled() {
            reports.push(UnitReport::cancelled(&unit));
            continue;
        }

        let started = Instant::now();
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => UnitOutcome::Cancelled,
            outcome = handler(unit.clone(), cancel.clone()) => outcome,
        };

        tracing::debug!(
            worker,
            symbol = %unit.target.symbol,
            timeframe = %unit.timeframe,
            outcome = ?outcome,
            "unit finished"
        );
        reports.push(UnitReport {
            symbol: unit.target.symbol,
            timeframe: unit.timeframe,
            outcome,
            elapsed: started.elapsed(),
        });
    }

    reports
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::watcher::WatchTarget;
    use crate::Timeframe;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn units(count: usize) -> Vec<WorkUnit> {
        (0..count)
            .map(|index| WorkUnit {
                target: WatchTarget::single(format!("SYM{index}USDT")),
                timeframe: Timeframe::OneHour,
            })
            .collect()
    }

    #[tokio::test]
    async fn never_exceeds_max_workers() {
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let handler: UnitHandler = {
            let active = Arc::clone(&active);
            let peak = Arc::clone(&peak);
            Arc::new(move |_unit: WorkUnit, _cancel: CancellationToken| -> UnitFuture {
                let active = Arc::clone(&active);
                let peak = Arc::clone(&peak);
                Box::pin(async move {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                    UnitOutcome::Evaluated { signals: 0, notified: 0 }
                })
            })
        };

        let reports = WorkerPool::new(3, 2)
            .run(units(12), &CancellationToken::new(), handler)
            .await;

        assert_eq!(reports.len(), 12);
        assert!(peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn cancelled_before_start_reports_every_unit_cancelled() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let handler: UnitHandler = Arc::new(|_unit: WorkUnit, _cancel: CancellationToken| -> UnitFuture {
            Box::pin(async { UnitOutcome::Evaluated { signals: 0, notified: 0 } })
        });

        let reports = WorkerPool::new(2, 1).run(units(5), &cancel, handler).await;

        assert_eq!(reports.len(), 5);
        assert!(reports
            .iter()
            .all(|report| report.outcome == UnitOutcome::Cancelled));
    }
}
