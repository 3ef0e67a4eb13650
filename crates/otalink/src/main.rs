// SPDX-FileCopyrightText: 2026 Otalink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! otalink - operator CLI for the update delivery core.
//!
//! Inspects the configuration, the persisted update sessions and the
//! durable delivery queue.

mod config_cmd;
mod queue;
mod sessions;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use otalink_config::OtalinkConfig;
use otalink_core::{OtalinkError, QueueStatus};
use otalink_storage::SqliteStorage;

/// otalink - firmware and configuration delivery to remote devices.
#[derive(Parser, Debug)]
#[command(name = "otalink", version, about, long_about = None)]
struct Cli {
    /// Read configuration from this file instead of the default hierarchy.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Disable colored output.
    #[arg(long, global = true)]
    plain: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Inspect configuration.
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },
    /// Inspect update sessions.
    Sessions {
        #[command(subcommand)]
        action: SessionsCommands,
    },
    /// Inspect and maintain the delivery queue.
    Queue {
        #[command(subcommand)]
        action: QueueCommands,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Load and validate the configuration, then print the effective values.
    Check,
}

#[derive(Subcommand, Debug)]
enum SessionsCommands {
    /// List sessions, newest first.
    List {
        #[arg(long)]
        device: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Show one session.
    Show {
        id: String,
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand, Debug)]
enum QueueCommands {
    /// List queued messages.
    List {
        /// QUEUED, PROCESSING, SENT, FAILED or EXPIRED.
        #[arg(long, value_parser = parse_queue_status)]
        status: Option<QueueStatus>,
        #[arg(long)]
        device: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Mark every queued message past its TTL as expired.
    Expire,
}

fn parse_queue_status(value: &str) -> Result<QueueStatus, String> {
    value
        .to_ascii_uppercase()
        .parse()
        .map_err(|_| format!("unknown queue status `{value}`"))
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => otalink_config::load_and_validate_path(path),
        None => otalink_config::load_and_validate(),
    };
    let config = match loaded {
        Ok(config) => config,
        Err(errors) => {
            otalink_config::render_errors(&errors);
            return ExitCode::FAILURE;
        }
    };

    init_tracing(&config.log.level);

    match run(cli, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("otalink: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, config: OtalinkConfig) -> Result<(), OtalinkError> {
    if let Commands::Config {
        action: ConfigCommands::Check,
    } = cli.command
    {
        return config_cmd::run_check(&config);
    }

    let storage = SqliteStorage::open(&config.storage).await?;
    let result = match cli.command {
        Commands::Config { .. } => Ok(()),
        Commands::Sessions { action } => match action {
            SessionsCommands::List { device, json } => {
                sessions::run_list(&storage, device.as_deref(), json, cli.plain).await
            }
            SessionsCommands::Show { id, json } => {
                sessions::run_show(&storage, &id, json, cli.plain).await
            }
        },
        Commands::Queue { action } => match action {
            QueueCommands::List {
                status,
                device,
                json,
            } => queue::run_list(&storage, status, device.as_deref(), json, cli.plain).await,
            QueueCommands::Expire => {
                queue::run_expire(&storage, config.queue.claim_lease_ms).await
            }
        },
    };
    storage.database().close().await?;
    result
}

/// Installs the global subscriber. `RUST_LOG` wins over the configured level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("otalink={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn queue_status_is_case_insensitive() {
        assert_eq!(parse_queue_status("failed").unwrap(), QueueStatus::Failed);
        assert_eq!(parse_queue_status("QUEUED").unwrap(), QueueStatus::Queued);
        assert!(parse_queue_status("lost").is_err());
    }

    #[test]
    fn parses_nested_subcommands() {
        let cli = Cli::try_parse_from([
            "otalink", "queue", "list", "--status", "expired", "--device", "dev-1",
        ])
        .unwrap();
        match cli.command {
            Commands::Queue {
                action:
                    QueueCommands::List {
                        status,
                        device,
                        json,
                    },
            } => {
                assert_eq!(status, Some(QueueStatus::Expired));
                assert_eq!(device.as_deref(), Some("dev-1"));
                assert!(!json);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn binary_loads_config_defaults() {
        let config =
            otalink_config::load_and_validate_str("").expect("default config should be valid");
        assert_eq!(config.update.default_chunk_size, 4096);
    }
}
