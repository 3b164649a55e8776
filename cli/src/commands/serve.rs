// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! `spec-gateway serve`

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};

use gateway_core::application::create_repositories;
use gateway_core::domain::gateway_config::GatewayConfigManifest;
use gateway_core::infrastructure::auth::Argon2PasswordHasher;
use gateway_core::infrastructure::event_bus::EventBus;
use gateway_core::infrastructure::HttpSpecEngineClient;
use gateway_core::presentation::{router, AppState};

pub async fn run(config: GatewayConfigManifest) -> Result<()> {
    config.validate().context("Configuration validation failed")?;

    info!(
        name = %config.metadata.name,
        spec_engine = %config.spec.spec_engine.url,
        "Spec gateway starting"
    );

    if let Some(port) = config.spec.observability.metrics_port {
        let metrics_addr: SocketAddr = format!("{}:{}", config.spec.server.bind_address, port)
            .parse()
            .context("Invalid metrics listen address")?;
        PrometheusBuilder::new()
            .with_http_listener(metrics_addr)
            .install()
            .context("Failed to install Prometheus exporter")?;
        info!("Prometheus metrics exposed on {}", metrics_addr);
    }

    let repositories = create_repositories(&config.storage_backend())
        .await
        .context("Failed to initialize repositories")?;

    let engine = HttpSpecEngineClient::new(
        &config.spec.spec_engine.url,
        config.spec.spec_engine.request_timeout,
    )
    .context("Failed to create spec engine client")?;

    let event_bus = Arc::new(EventBus::with_default_capacity());
    event_bus.spawn_log_sink();

    let state = AppState::from_config(
        &config,
        repositories,
        Arc::new(engine),
        Arc::new(Argon2PasswordHasher::new()),
        event_bus,
    );
    let app = router(state);

    let addr = format!("{}:{}", config.spec.server.bind_address, config.spec.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("Gateway listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    info!("Gateway shutting down");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}
