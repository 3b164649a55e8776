// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # Spec Gateway CLI
//!
//! The `spec-gateway` binary runs the authenticated gateway in front of a
//! spec engine and carries the small set of administration commands an
//! operator needs before the first login.
//!
//! ## Commands
//!
//! - `spec-gateway serve` - Run the HTTP/WebSocket gateway
//! - `spec-gateway user add` - Create or update a login account
//! - `spec-gateway token issue` - Mint an identity token for scripting
//! - `spec-gateway config show|validate` - Configuration management

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use gateway_core::domain::gateway_config::GatewayConfigManifest;

mod commands;

use commands::{ConfigCommand, TokenCommand, UserCommand};

/// Spec Gateway - authenticated access to the spec engine
#[derive(Parser)]
#[command(name = "spec-gateway")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "SPEC_GATEWAY_CONFIG",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); defaults to the configured level
    #[arg(long, global = true, env = "SPEC_GATEWAY_LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the gateway server
    #[command(name = "serve")]
    Serve,

    /// Manage login accounts
    #[command(name = "user")]
    User {
        #[command(subcommand)]
        command: UserCommand,
    },

    /// Identity token operations
    #[command(name = "token")]
    Token {
        #[command(subcommand)]
        command: TokenCommand,
    },

    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is the normal case outside development.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let config = GatewayConfigManifest::load_or_default(cli.config.clone())
        .context("Failed to load configuration")?;

    let level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| config.spec.observability.log_level.clone());
    init_logging(&level, &config.spec.observability.log_format)?;

    match cli.command {
        Commands::Serve => commands::serve::run(config).await,
        Commands::User { command } => commands::user::handle_command(command, config).await,
        Commands::Token { command } => commands::token::handle_command(command, config),
        Commands::Config { command } => commands::config::handle_command(command, config, cli.config),
    }
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str, format: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    if format == "json" {
        builder.json().init();
    } else {
        builder.compact().init();
    }

    Ok(())
}
