mod cli;
mod commands;
mod error;
mod output;

use std::time::Duration;

use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use zwjs_api::{Client, ClientConfig};
use zwjs_config::{Config, Profile};

use crate::cli::{Cli, Command, GlobalOpts, OutputFormat};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Setup tracing based on verbosity
    init_tracing(cli.global.verbose);

    // Dispatch and handle errors with proper exit codes
    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

fn init_tracing(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(mut cli: Cli) -> Result<(), CliError> {
    let cfg = zwjs_config::load_config_or_default();
    apply_output_default(&mut cli.global, &cfg)?;

    match cli.command {
        // Config commands don't need a server connection
        Command::Config(args) => commands::config_cmd::handle(args, &cli.global),

        // Shell completions generation
        Command::Completions(args) => {
            use clap::CommandFactory;
            use clap_complete::generate;

            let mut cmd = Cli::command();
            generate(args.shell, &mut cmd, "zwjs", &mut std::io::stdout());
            Ok(())
        }

        // All other commands require a server connection
        cmd => {
            let client_config = build_client_config(&cfg, &cli.global)?;
            tracing::debug!(url = %client_config.url, command = ?cmd, "dispatching command");

            let client = Client::new(client_config);
            commands::dispatch(cmd, &client, &cli.global).await
        }
    }
}

/// Fill in `--output` from `defaults.output` when no flag or env var set it.
fn apply_output_default(global: &mut GlobalOpts, cfg: &Config) -> Result<(), CliError> {
    if global.output.is_none() {
        let format = OutputFormat::from_str(&cfg.defaults.output, true).map_err(|reason| {
            CliError::Validation {
                field: "defaults.output".into(),
                reason,
            }
        })?;
        global.output = Some(format);
    }
    Ok(())
}

/// Build a `ClientConfig` from the config file, profile, and CLI overrides.
///
/// `--server` bypasses the profile's address (and its `disabled` flag); an
/// absent profile falls back to the built-in default server unless it was
/// asked for by name.
fn build_client_config(cfg: &Config, global: &GlobalOpts) -> Result<ClientConfig, CliError> {
    let profile_name = cfg.active_profile_name(global.profile.as_deref());
    let profile = match cfg.profile(&profile_name) {
        Ok(profile) => profile.clone(),
        Err(e) if global.profile.is_some() => return Err(e.into()),
        Err(_) => Profile::default(),
    };

    let client_config = match global.server.as_deref() {
        Some(server) => ClientConfig::from_address(server)?
            .with_request_timeout(cfg.request_timeout(&profile)),
        None => zwjs_config::profile_to_client_config(cfg, &profile, &profile_name)?,
    };

    Ok(match global.timeout {
        Some(0) => client_config.with_request_timeout(None),
        Some(secs) => client_config.with_request_timeout(Some(Duration::from_secs(secs))),
        None => client_config,
    })
}
