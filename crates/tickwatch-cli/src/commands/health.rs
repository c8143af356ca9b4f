use tickwatch_core::AppConfig;
use tokio_util::sync::CancellationToken;

use super::Runtime;
use crate::error::CliError;

/// Probes the first configured pair on the active exchange.
pub async fn run(config: &AppConfig) -> Result<(), CliError> {
    let runtime = Runtime::build(config)?;
    let result = probe(&runtime, config).await;
    runtime.shutdown().await;
    result
}

async fn probe(runtime: &Runtime, config: &AppConfig) -> Result<(), CliError> {
    let exchange = runtime.source.name();
    let Some(symbol) = config.assets.symbols.first() else {
        return Err(CliError::NoAssets {
            exchange: exchange.to_owned(),
        });
    };
    let pair = config.assets.pair_for(symbol);

    let listed = runtime
        .source
        .is_symbol_valid(&pair, &CancellationToken::new())
        .await?;
    if !listed {
        return Err(CliError::NoAssets {
            exchange: exchange.to_owned(),
        });
    }

    let channels = runtime.notifications.notifier_names().await;
    println!("ok: {exchange} reachable, {pair} listed, {} notification channel(s)", channels.len());
    Ok(())
}
