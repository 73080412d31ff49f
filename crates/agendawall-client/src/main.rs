//! agendawall CLI entry point.

use std::process::ExitCode;

use clap::Parser;

use agendawall_client::cli::{Cli, Command, ConfigAction};
use agendawall_client::commands;
use agendawall_client::config::ClientConfig;
use agendawall_client::error::{ClientError, ClientResult};
use agendawall_core::{TracingConfig, init_tracing};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let tracing_config = if cli.debug {
        TracingConfig::cli_debug()
    } else {
        match cli.command {
            Command::Serve(ref args) if args.json_logs => TracingConfig::daemon(),
            Command::Serve(_) => TracingConfig::default(),
            _ => TracingConfig::default().with_level(tracing::Level::WARN),
        }
    };
    if let Err(e) = init_tracing(tracing_config) {
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
    let mut config = match cli.config {
        Some(ref path) => ClientConfig::load_from(path).map_err(ClientError::Config)?,
        None => ClientConfig::load().map_err(ClientError::Config)?,
    };
    cli.apply(&mut config);

    match cli.command {
        Command::Serve(ref args) => {
            args.apply(&mut config);
            commands::serve::run(&config).await
        }
        Command::Refresh => commands::control::refresh(&config).await,
        Command::Resync => commands::control::resync(&config).await,
        Command::SetNow { ref time } => commands::control::set_now(&config, time).await,
        Command::Status { json } => commands::control::status(&config, json).await,
        Command::Ping => commands::control::ping(&config).await,
        Command::Shutdown => commands::control::shutdown(&config).await,
        #[cfg(feature = "indico")]
        Command::Fetch(ref args) => commands::fetch::run(args, &config).await,
        Command::Config { ref action } => match action {
            ConfigAction::Dump => commands::config::dump(&config),
            ConfigAction::Validate => commands::config::validate(&config),
            ConfigAction::Path => commands::config::path(),
        },
    }
}
