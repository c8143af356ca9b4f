use std::time::Duration;

use tickwatch_core::{AppConfig, CycleReport, WatcherError};
use tokio_util::sync::CancellationToken;

use super::Runtime;
use crate::cli::OnceArgs;
use crate::error::CliError;

/// Single bounded cycle, optionally over overridden symbols and timeframes.
pub async fn run(config: &AppConfig, args: &OnceArgs) -> Result<(), CliError> {
    let runtime = Runtime::build(config)?;

    let mut assets = config.assets.clone();
    if !args.symbols.is_empty() {
        assets.symbols = args.symbols.clone();
        assets.cross_pairs.clear();
    }
    let timeframes = if args.timeframes.is_empty() {
        assets.timeframes.clone()
    } else {
        args.timeframes.clone()
    };
    let timeout = args
        .timeout_secs
        .map(Duration::from_secs)
        .unwrap_or_else(|| config.watcher.run_timeout());

    let result = async {
        let targets = runtime.targets(&assets, &CancellationToken::new()).await?;
        let watcher = runtime.watcher(config, targets.clone())?;
        match watcher.run_once(&targets, &timeframes, timeout).await {
            Ok(report) => {
                print_summary(&report);
                Ok::<_, CliError>(())
            }
            Err(error) => {
                if let WatcherError::UnitsFailed { report } | WatcherError::Timeout { report, .. } = &error {
                    print_summary(report);
                }
                Err(error.into())
            }
        }
    }
    .await;

    runtime.shutdown().await;
    result
}

fn print_summary(report: &CycleReport) {
    println!(
        "cycle {}: {} units in {:.1}s, {} evaluated, {} signals ({} notified), {} skipped, {} failed ({} unrecovered), {} cancelled",
        report.cycle,
        report.total,
        report.elapsed.as_secs_f64(),
        report.completed,
        report.signals,
        report.notified,
        report.skipped,
        report.failed,
        report.escalated,
        report.cancelled,
    );
}
