//! telegram-sender: HTTP bridge to a personal Telegram account
//!
//! Exposes a small JSON API for sending messages from your own account,
//! reading the latest message of a chat, and waiting (by polling) for a reply
//! within a bounded time window.
//!
//! # Architecture
//!
//! - [`main`]: Process entry point with env loading and subcommand dispatch
//! - [`config`]: Environment-driven configuration
//! - [`errors`]: Application error model with HTTP status mapping
//! - [`chat_ref`]: Conversation reference parsing (ids, usernames, links)
//! - [`transport`]: Messaging transport trait and message types
//! - [`telegram`]: MTProto transport and the one-time interactive login
//! - [`session`]: The single shared identity/session holder
//! - [`waiter`]: Bounded polling wait for an inbound reply
//! - [`models`]: Request/response DTOs
//! - [`server`]: axum router and endpoint handlers

mod chat_ref;
mod config;
mod errors;
mod models;
mod server;
mod session;
mod telegram;
#[cfg(test)]
mod testing;
mod transport;
mod waiter;

use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use config::ServerConfig;
use session::SessionHolder;
use telegram::TelegramTransport;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Command line interface
#[derive(Debug, Parser)]
#[command(name = "telegram-sender", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve the HTTP API (default)
    Serve,
    /// Log in interactively once and write the session file
    Auth,
}

/// Application entry point
///
/// Initializes tracing from environment (default level `info`), loads config,
/// and runs the selected subcommand.
///
/// # Environment Variables
///
/// See [`ServerConfig::load_from_env`] for full configuration options.
///
/// # Example
///
/// ```no_run
/// TELEGRAM_API_ID=123456 TELEGRAM_API_HASH=abcdef cargo run -- auth
/// TELEGRAM_API_ID=123456 TELEGRAM_API_HASH=abcdef cargo run
/// ```
#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match ServerConfig::load_from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("configuration error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let result = match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => run_server(config).await,
        Command::Auth => telegram::authenticate_interactive(&config)
            .await
            .map(|_| info!("You can now run `telegram-sender serve`")),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

/// Connect the session (degrading to unauthenticated on failure) and serve
async fn run_server(config: ServerConfig) -> errors::AppResult<()> {
    info!("Telegram Sender v{}", env!("CARGO_PKG_VERSION"));
    info!("Port: {}", config.port);

    let transport = Arc::new(TelegramTransport::new(&config));
    let session = Arc::new(SessionHolder::new(transport));
    session.connect().await;

    server::serve(&config, session).await
}
