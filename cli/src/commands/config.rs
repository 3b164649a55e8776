// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use gateway_core::domain::gateway_config::GatewayConfigManifest;

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show the effective configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,

        /// Print the effective configuration as YAML
        #[arg(long)]
        yaml: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },
}

pub fn handle_command(
    command: ConfigCommand,
    config: GatewayConfigManifest,
    config_override: Option<PathBuf>,
) -> Result<()> {
    match command {
        ConfigCommand::Show { paths, yaml } => show(&config, config_override, paths, yaml),
        ConfigCommand::Validate { file: Some(file) } => {
            let config = GatewayConfigManifest::load_or_default(Some(file))
                .context("Failed to load configuration")?;
            validate(&config)
        }
        ConfigCommand::Validate { file: None } => validate(&config),
    }
}

fn show(
    config: &GatewayConfigManifest,
    config_override: Option<PathBuf>,
    show_paths: bool,
    yaml: bool,
) -> Result<()> {
    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        match &config_override {
            Some(path) => println!("  1. --config flag: {}", path.display()),
            None => println!("  1. --config flag: {}", "(not set)".dimmed()),
        }
        println!("  2. ./spec-gateway.yaml");
        println!("  3. ~/.spec-gateway/config.yaml");
        println!();
    }

    if yaml {
        print!("{}", redacted(config).to_yaml_string()?);
        return Ok(());
    }

    let spec = &config.spec;
    println!("{}", "Current configuration:".bold());
    println!();

    println!("{}", "Server:".bold());
    println!("  Listen: {}:{}", spec.server.bind_address, spec.server.port);
    println!();

    println!("{}", "Auth:".bold());
    let secret_state = if config.signing_secret().is_some() {
        "configured".green()
    } else {
        "missing".red()
    };
    println!("  Signing secret: {}", secret_state);
    println!("  Token TTL: {}", humantime::format_duration(spec.auth.token_ttl));
    println!();

    println!("{}", "Storage:".bold());
    match &spec.database.url {
        Some(_) => println!("  PostgreSQL (max {} connections)", spec.database.max_connections),
        None => println!("  In-memory {}", "(not persisted)".dimmed()),
    }
    println!();

    println!("{}", "Spec Engine:".bold());
    println!("  URL: {}", spec.spec_engine.url);
    println!("  Request timeout: {}", humantime::format_duration(spec.spec_engine.request_timeout));
    println!(
        "  Stream read timeout: {}",
        humantime::format_duration(spec.spec_engine.stream_read_timeout)
    );
    println!(
        "  Completion timeout: {}",
        humantime::format_duration(spec.spec_engine.completion_timeout)
    );
    println!();

    println!("{}", "Observability:".bold());
    println!(
        "  Logs: {} ({})",
        spec.observability.log_level, spec.observability.log_format
    );
    match spec.observability.metrics_port {
        Some(port) => println!("  Metrics port: {}", port),
        None => println!("  Metrics: {}", "disabled".dimmed()),
    }

    Ok(())
}

fn validate(config: &GatewayConfigManifest) -> Result<()> {
    println!("Validating configuration...");

    config.validate().context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}

/// Copy of `config` safe to print: literal secrets and database URLs are
/// masked, `env:` references are kept as written.
fn redacted(config: &GatewayConfigManifest) -> GatewayConfigManifest {
    let mask = |value: &Option<String>| {
        value.as_ref().map(|v| {
            if v.starts_with("env:") {
                v.clone()
            } else {
                "********".to_string()
            }
        })
    };
    let mut copy = config.clone();
    copy.spec.auth.jwt_secret = mask(&config.spec.auth.jwt_secret);
    copy.spec.database.url = mask(&config.spec.database.url);
    copy
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redacted_masks_literals_only() {
        let mut config = GatewayConfigManifest::default();
        config.spec.auth.jwt_secret = Some("hunter2".to_string());
        config.spec.database.url = Some("env:DATABASE_URL".to_string());

        let copy = redacted(&config);
        assert_eq!(copy.spec.auth.jwt_secret.as_deref(), Some("********"));
        assert_eq!(copy.spec.database.url.as_deref(), Some("env:DATABASE_URL"));
    }

    #[test]
    fn test_validate_file_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spec-gateway.yaml");
        std::fs::write(
            &path,
            "apiVersion: 100monkeys.ai/v1\nkind: GatewayConfig\nmetadata:\n  name: test\nspec:\n  spec_engine:\n    url: ftp://engine\n",
        )
        .unwrap();

        let config = GatewayConfigManifest::from_yaml_file(&path).unwrap();
        assert!(validate(&config).is_err());
    }
}
