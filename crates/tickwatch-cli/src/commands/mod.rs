mod health;
mod once;
mod run;
mod version;

use std::sync::Arc;

use tickwatch_core::http_client::HttpClient;
use tickwatch_core::{
    init_logging, AppConfig, AssetsConfig, AssetValidator, DataSource, DataSourceFactory,
    NotificationManager, ReqwestHttpClient, WatchTarget, Watcher,
};
use tokio_util::sync::CancellationToken;

use crate::cli::{Cli, Command};
use crate::error::CliError;

pub async fn run(cli: &Cli) -> Result<(), CliError> {
    if let Command::Version = cli.command {
        version::run();
        return Ok(());
    }

    let config = AppConfig::load(&cli.config)?;
    init_logging(&config.logging)?;
    tracing::debug!(config = %cli.config.display(), "configuration loaded");

    match &cli.command {
        Command::Run => run::run(&config).await,
        Command::Once(args) => once::run(&config, args).await,
        Command::Health => health::run(&config).await,
        Command::Version => Ok(()),
    }
}

/// Everything a watcher needs, built from one config.
struct Runtime {
    source: Arc<dyn DataSource>,
    notifications: Arc<NotificationManager>,
}

impl Runtime {
    fn build(config: &AppConfig) -> Result<Self, CliError> {
        let http: Arc<dyn HttpClient> = Arc::new(ReqwestHttpClient::new());
        let source = DataSourceFactory::create(&config.exchange.source, &config.exchange, Arc::clone(&http))?;
        let notifications = NotificationManager::from_config(&config.notifications, http)?;

        Ok(Self {
            source,
            notifications: Arc::new(notifications),
        })
    }

    /// Validates `assets` against the exchange and returns the watchable set.
    async fn targets(
        &self,
        assets: &AssetsConfig,
        cancel: &CancellationToken,
    ) -> Result<Vec<WatchTarget>, CliError> {
        let report = AssetValidator::new(Arc::clone(&self.source))
            .validate(assets, cancel)
            .await?;
        for missing in &report.missing {
            tracing::warn!(symbol = %missing, exchange = self.source.name(), "asset not listed, skipping");
        }
        if report.is_empty() {
            return Err(CliError::NoAssets {
                exchange: self.source.name().to_owned(),
            });
        }
        Ok(report.targets())
    }

    fn watcher(&self, config: &AppConfig, targets: Vec<WatchTarget>) -> Result<Watcher, CliError> {
        Ok(Watcher::from_config(
            config,
            Arc::clone(&self.source),
            Arc::clone(&self.notifications),
            targets,
        )?)
    }

    async fn shutdown(&self) {
        if let Err(error) = self.notifications.close().await {
            tracing::warn!(error = %error, "notification channels did not close cleanly");
        }
    }
}
