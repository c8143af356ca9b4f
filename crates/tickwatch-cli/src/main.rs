mod cli;
mod commands;
mod error;

use clap::Parser;
use std::process::ExitCode;

use crate::cli::Cli;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match commands::run(&cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!(error = %error, "tickwatch failed");
            eprintln!("error: {error}");
            ExitCode::from(error.exit_code())
        }
    }
}
