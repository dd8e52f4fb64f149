//! linstor CLI entry point.

use std::process::ExitCode;

use clap::Parser;
use tracing::debug;

use linstor_client::cli::{Cli, Command, ConfigAction};
use linstor_client::commands;
use linstor_client::{Client, ClientConfig, ClientResult};
use linstor_core::{TracingConfig, TracingOutputFormat, init_tracing};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut tracing = TracingConfig::from_verbosity(cli.verbose);
    if cli.log_json {
        tracing = tracing.with_format(TracingOutputFormat::Json);
    }
    if let Err(e) = init_tracing(tracing) {
        eprintln!("warning: {}", e);
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> ClientResult<()> {
    let config_path = cli.config.clone().unwrap_or_else(ClientConfig::default_path);
    let mut config = if cli.config.is_some() {
        ClientConfig::load_from(&config_path)?
    } else {
        ClientConfig::load()?
    };
    if let Some(ref controllers) = cli.controllers {
        config = config.with_controllers(controllers);
    }
    if let Some(timeout) = cli.timeout {
        config.controller.request_timeout = timeout;
    }

    let output = cli.output_format();
    let command = match cli.command {
        Command::Config { action } => {
            return match action {
                ConfigAction::Dump => commands::config::dump(&config, &config_path),
                ConfigAction::Path => commands::config::path(&config_path),
            };
        }
        command => command,
    };

    let endpoints = config.endpoints()?;
    debug!(controllers = endpoints.len(), "connecting");
    let client = Client::connect(&endpoints, &config.connect_options()).await?;

    let result = commands::dispatch(&client, command, output).await;
    client.disconnect().await;
    result
}
