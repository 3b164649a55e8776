// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Token commands
//!
//! Tokens are signed with the configured secret, so anything minted here is
//! accepted by a gateway running with the same configuration.

use anyhow::{Context, Result};
use clap::Subcommand;
use std::time::Duration;

use gateway_core::domain::gateway_config::GatewayConfigManifest;
use gateway_core::infrastructure::auth::TokenAuthority;

#[derive(Subcommand)]
pub enum TokenCommand {
    /// Issue a token for an arbitrary subject
    Issue {
        /// Subject identifier carried in the token
        #[arg(long)]
        subject: String,

        #[arg(long, default_value = "")]
        display_name: String,

        /// Role to embed (repeatable)
        #[arg(long = "role", value_name = "ROLE")]
        roles: Vec<String>,

        /// Lifetime such as `15m` or `2h` (default: configured token_ttl)
        #[arg(long, value_parser = parse_ttl)]
        ttl: Option<Duration>,
    },
}

pub fn handle_command(command: TokenCommand, config: GatewayConfigManifest) -> Result<()> {
    match command {
        TokenCommand::Issue {
            subject,
            display_name,
            roles,
            ttl,
        } => {
            let secret = config.signing_secret();
            let tokens = TokenAuthority::new(secret.as_deref());
            let ttl = ttl.unwrap_or(config.spec.auth.token_ttl);
            let token = tokens
                .issue(&subject, &display_name, &roles, ttl)
                .context("Failed to issue token")?;
            // bare token on stdout so it can be captured by scripts
            println!("{}", token);
            Ok(())
        }
    }
}

fn parse_ttl(raw: &str) -> Result<Duration, String> {
    let ttl = humantime::parse_duration(raw).map_err(|e| e.to_string())?;
    if ttl.is_zero() {
        return Err("ttl must be greater than zero".to_string());
    }
    Ok(ttl)
}
