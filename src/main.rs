// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::net::SocketAddr;
use std::process;

use axum_server::tls_rustls::RustlsConfig;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use guardian_trust::api::router;
use guardian_trust::config::TrustConfig;
use guardian_trust::state::{AppState, AuthConfig};
use guardian_trust::TrustCore;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));
    let json = std::env::var(guardian_trust::config::LOG_FORMAT_ENV)
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for shutdown signal");
    }
    info!("shutdown signal received");
    shutdown.cancel();
}

#[tokio::main]
async fn main() {
    init_tracing();

    // Install the ring crypto provider for rustls (must be done before any TLS operations)
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        warn!("rustls crypto provider was already installed");
    }

    let config = TrustConfig::from_env();

    let auth_config = match &config.jwt_secret {
        Some(secret) => AuthConfig::hs256(secret.as_bytes()),
        None if cfg!(feature = "dev") => {
            warn!("AUTH_JWT_SECRET not set: accepting unsigned tokens (dev build)");
            AuthConfig::default()
        }
        None => {
            error!("AUTH_JWT_SECRET is required");
            process::exit(1);
        }
    };

    let core = match TrustCore::open(&config).await {
        Ok(core) => core,
        Err(e) => {
            error!(error = %e, data_dir = %config.data_dir.display(), "failed to open trust core");
            process::exit(1);
        }
    };

    let shutdown = CancellationToken::new();
    let sweeper = tokio::spawn(core.sweeper().run(shutdown.clone()));

    let app = router(AppState::new(core).with_auth_config(auth_config));

    let addr: SocketAddr = match format!("{}:{}", config.host, config.port).parse() {
        Ok(addr) => addr,
        Err(e) => {
            error!(error = %e, host = %config.host, port = config.port, "invalid bind address");
            process::exit(1);
        }
    };

    match config.tls_paths() {
        Some((cert, key)) => {
            let tls_config = match RustlsConfig::from_pem_file(cert, key).await {
                Ok(tls_config) => tls_config,
                Err(e) => {
                    error!(error = %e, "failed to load TLS certificate");
                    process::exit(1);
                }
            };

            let handle = axum_server::Handle::new();
            let signal_handle = handle.clone();
            let signal_shutdown = shutdown.clone();
            tokio::spawn(async move {
                shutdown_signal(signal_shutdown).await;
                signal_handle.graceful_shutdown(Some(std::time::Duration::from_secs(10)));
            });

            info!(%addr, "Guardian trust server listening on https (docs at /docs)");
            if let Err(e) = axum_server::bind_rustls(addr, tls_config)
                .handle(handle)
                .serve(app.into_make_service())
                .await
            {
                error!(error = %e, "HTTPS server failed");
            }
        }
        None => {
            let listener = match tokio::net::TcpListener::bind(addr).await {
                Ok(listener) => listener,
                Err(e) => {
                    error!(error = %e, %addr, "failed to bind");
                    process::exit(1);
                }
            };

            warn!("TLS_CERT_PATH/TLS_KEY_PATH not set: serving plain HTTP");
            info!(%addr, "Guardian trust server listening on http (docs at /docs)");
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
                .await
            {
                error!(error = %e, "HTTP server failed");
            }
        }
    }

    shutdown.cancel();
    if let Err(e) = sweeper.await {
        warn!(error = %e, "retention sweeper ended abnormally");
    }
    info!("server stopped");
}
