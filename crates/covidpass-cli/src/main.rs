//! covidpass - MIT CovidPass from the terminal.
//!
//! Checks access status, lists testing locations and results, and submits
//! daily attestations or at-home test codes. Logs in through Touchstone
//! with a client certificate and keeps the token between runs.

mod commands;
mod format;

use std::io;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use covidpass_core::{read_credentials, ApiError, AuthSession, Config, Credentials};

#[derive(Parser, Debug)]
#[command(name = "covidpass", version, about = "Command-line client for MIT CovidPass")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Check your covid status (default)
    Status,
    /// Print a link to the campus access map
    Map,
    /// List testing locations for the next DAYS days
    Locations {
        #[arg(default_value_t = 4)]
        days: u32,
    },
    /// Show your COUNT most recent test results
    Results {
        #[arg(default_value_t = 5)]
        count: usize,
    },
    /// Submit the daily attestation
    Attest,
    /// Submit a medical at-home test
    Medical,
}

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Command::Status);
    if command == Command::Map {
        println!("{}", commands::MAP_URL);
        return Ok(());
    }

    let config = Config::load()?;
    let credentials = match read_credentials(&config.credentials_file) {
        Ok(credentials) => credentials,
        Err(e) => {
            eprintln!(
                "Could not open `{}` file.",
                config.credentials_file.display()
            );
            eprintln!("Make sure it is in your current working directory.");
            return Err(e.into());
        }
    };

    match run(command, &credentials, &config).await {
        Err(e) if is_connectivity(&e) => {
            eprintln!("Failed to connect to ATLAS/CovidPass servers. Check your internet connection.");
            eprintln!("{e}");
            std::process::exit(1);
        }
        other => other,
    }
}

async fn run(command: Command, credentials: &Credentials, config: &Config) -> Result<()> {
    let mut session = AuthSession::open(credentials, config).await?;
    info!(?command, "Running command");

    match command {
        Command::Status => commands::status(&mut session).await?,
        Command::Locations { days } => commands::locations(&mut session, days).await?,
        Command::Results { count } => commands::results(&mut session, count).await?,
        Command::Attest => commands::attest(&mut session).await?,
        Command::Medical => commands::medical(&mut session).await?,
        Command::Map => println!("{}", commands::MAP_URL),
    }

    session.close()?;
    Ok(())
}

fn is_connectivity(error: &anyhow::Error) -> bool {
    error
        .downcast_ref::<ApiError>()
        .map(ApiError::is_connectivity)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_command_is_status() {
        let cli = Cli::try_parse_from(["covidpass"]).unwrap();
        assert_eq!(cli.command.unwrap_or(Command::Status), Command::Status);
    }

    #[test]
    fn test_numeric_arguments() {
        let cli = Cli::try_parse_from(["covidpass", "locations", "7"]).unwrap();
        assert_eq!(cli.command, Some(Command::Locations { days: 7 }));

        let cli = Cli::try_parse_from(["covidpass", "results"]).unwrap();
        assert_eq!(cli.command, Some(Command::Results { count: 5 }));

        assert!(Cli::try_parse_from(["covidpass", "results", "many"]).is_err());
    }

    #[test]
    fn test_connectivity_detection() {
        let endpoint = ApiError::from_status(reqwest::StatusCode::BAD_GATEWAY, "");
        assert!(!is_connectivity(&anyhow::Error::new(endpoint)));
        assert!(!is_connectivity(&anyhow::anyhow!("other")));
    }
}
