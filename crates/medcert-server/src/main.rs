// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Medcert — certificate issuance and verification server
//
// Entry point. Initialises logging, reads secrets from the environment,
// opens the backends, and serves the HTTP routes.

mod config;
mod routes;
mod services;

use std::process::ExitCode;

use config::EnvConfig;
use services::app_services::AppServices;
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "Medcert starting");

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "server stopped");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let env = EnvConfig::from_env()?;
    let services = tokio::task::spawn_blocking(move || AppServices::init(env)).await??;

    let addr = services.config().bind_addr.clone();
    let app = routes::router(services);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("listening on http://{addr}");
    axum::serve(listener, app).await?;
    Ok(())
}
