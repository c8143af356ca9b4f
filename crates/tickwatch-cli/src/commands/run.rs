use tickwatch_core::AppConfig;
use tokio_util::sync::CancellationToken;

use super::Runtime;
use crate::error::CliError;

/// Daemon mode: validate assets, then watch until Ctrl-C.
pub async fn run(config: &AppConfig) -> Result<(), CliError> {
    let runtime = Runtime::build(config)?;
    let shutdown = CancellationToken::new();

    let signal = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    if let Err(error) = result {
                        tracing::error!(error = %error, "failed to listen for Ctrl-C");
                    }
                    tracing::info!("shutdown requested");
                    shutdown.cancel();
                }
                _ = shutdown.cancelled() => {}
            }
        })
    };

    let result = async {
        let targets = runtime.targets(&config.assets, &shutdown).await?;
        let watcher = runtime.watcher(config, targets)?;
        watcher.start(shutdown.clone()).await?;
        Ok::<_, CliError>(())
    }
    .await;

    shutdown.cancel();
    let _ = signal.await;
    runtime.shutdown().await;
    result
}
