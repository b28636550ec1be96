use std::{net::SocketAddr, sync::Arc};

use anyhow::{Context, Result};
use axum::serve;
use chaingate_core::{
    auth::{self, ApiKeySet},
    config::AppConfig,
    directory::{self, ChainDirectory},
    metrics,
    upstream::PoolRegistry,
};
use rustls::crypto::{ring::default_provider, CryptoProvider};
use server::{router, state::AppState};
use tokio::{signal, sync::broadcast};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn init_logging(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.clone()));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_file(config.logging.caller)
        .with_line_number(config.logging.caller)
        .with_target(false);

    tracing_subscriber::registry().with(filter).with(fmt_layer).init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install signal handler");
                () = std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<()> {
    CryptoProvider::install_default(default_provider())
        .map_err(|e| anyhow::anyhow!("failed to install crypto provider: {e:?}"))?;

    let config = AppConfig::load().context("configuration failed to load")?;
    init_logging(&config);
    info!("starting chaingate");

    let metrics_handle = if config.metrics.enabled { Some(metrics::install_recorder()) } else { None };

    let api_keys = if config.rate_limit.enabled {
        Arc::new(
            auth::generate_and_store(&config.rate_limit.key_file)
                .context("API key generation failed")?,
        )
    } else {
        Arc::new(ApiKeySet::default())
    };

    let (shutdown_tx, _) = broadcast::channel::<()>(4);

    let registry = Arc::new(PoolRegistry::new());
    let chain_directory = Arc::new(
        ChainDirectory::new(config.upstreams.directory_url.clone())
            .context("chain directory client failed to build")?,
    );
    let config = Arc::new(config);

    info!("taking initial chain snapshot");
    directory::refresh_registry(&chain_directory, &config, &registry)
        .await
        .context("initial chain snapshot failed")?;
    let snapshot_task = directory::start_snapshot_refresh(
        chain_directory,
        Arc::clone(&config),
        Arc::clone(&registry),
        shutdown_tx.subscribe(),
    );

    let state = AppState::new(Arc::clone(&config), registry, api_keys);
    state.response_cache.start_sweeper(shutdown_tx.subscribe());
    state.rate_limit_cache.start_sweeper(shutdown_tx.subscribe());

    if let (Some(handle), Some(port)) = (metrics_handle, config.metrics.port) {
        let metrics_addr = SocketAddr::from(([0, 0, 0, 0], port));
        let mut metrics_shutdown = shutdown_tx.subscribe();
        let metrics_app = router::metrics_router(handle);
        info!(address = %metrics_addr, "metrics server listening");
        tokio::spawn(async move {
            let listener = match tokio::net::TcpListener::bind(metrics_addr).await {
                Ok(listener) => listener,
                Err(e) => {
                    error!(error = %e, "failed to bind metrics port");
                    return;
                }
            };
            let result = serve(listener, metrics_app)
                .with_graceful_shutdown(async move {
                    let _ = metrics_shutdown.recv().await;
                })
                .await;
            if let Err(e) = result {
                error!(error = %e, "metrics server error");
            }
        });
    }

    let app = router::build_router(state);
    let addr: SocketAddr = format!("{}:{}", config.server.bind_address, config.server.port)
        .parse()
        .context("invalid bind address")?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(address = %addr, "gateway listening");

    serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = shutdown_tx.send(());
    snapshot_task.abort();
    info!("server shutdown complete");

    Ok(())
}
