// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Custodia Systems

use std::{env, net::SocketAddr, sync::Arc};

use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use custodia_server::{
    api::router,
    config::{DATA_DIR_ENV, NETWORK_ENV_ENV, WEBHOOK_SECRET_ENV},
    fee_retry::FeeRetryWorker,
    models::NetworkEnv,
    providers::{CredentialSealer, ProviderGateway},
    state::AppState,
    storage::{RecordStore, StoragePaths},
};

#[tokio::main]
async fn main() {
    init_tracing();

    // Initialize the record store
    let paths = match env::var(DATA_DIR_ENV) {
        Ok(dir) => StoragePaths::new(dir),
        Err(_) => StoragePaths::default(),
    };
    let mut store = RecordStore::new(paths);
    store
        .initialize()
        .expect("Failed to initialize record store");

    // Provider gateway and credential sealer
    let gateway =
        Arc::new(ProviderGateway::from_env().expect("Custody provider configuration missing"));
    let sealer = Arc::new(
        CredentialSealer::from_env(gateway.clone()).expect("Entity secret configuration missing"),
    );

    let network_env = NetworkEnv::from_str_or_default(env::var(NETWORK_ENV_ENV).ok().as_deref());
    let webhook_secret = env::var(WEBHOOK_SECRET_ENV).expect("WEBHOOK_SECRET must be set");

    let state = AppState::new(store, gateway, sealer, network_env, webhook_secret);

    // Background fee retry worker with graceful shutdown
    let shutdown = CancellationToken::new();
    let worker = FeeRetryWorker::new(state.clone());
    tokio::spawn(worker.run(shutdown.clone()));

    let app = router(state);

    // Parse bind address
    let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port: u16 = env::var("PORT")
        .unwrap_or_else(|_| "8080".to_string())
        .parse()
        .unwrap_or(8080);

    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .expect("Failed to parse bind address");

    tracing::info!(%addr, env = ?network_env, "Custodia server listening (docs at /docs)");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind listener");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await
        .expect("HTTP server failed");
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));

    let json = env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

/// Wait for SIGINT/SIGTERM, then cancel background workers.
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
    shutdown.cancel();
}
