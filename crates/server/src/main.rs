//! Whisper adapter entry point
//!
//! Startup ordering matters: the listening socket is bound before the model
//! loads, so the platform's readiness checks reach the port immediately. The
//! readiness endpoint reports NOT_SERVING until the engine is installed.

use std::time::Duration;

use whisper_adapter_config::Config;
use whisper_adapter_core::ADAPTER;
use whisper_adapter_server::{create_router, init_metrics, AppState};

#[tokio::main]
async fn main() {
    let cfg = match whisper_adapter_config::load() {
        Ok(cfg) => cfg,
        Err(err) => {
            eprintln!("failed to load configuration: {err}");
            std::process::exit(1);
        }
    };

    init_tracing(&cfg);
    tracing::info!(
        adapter = ADAPTER.name,
        adapter_slug = ADAPTER.slug,
        listen_addr = %cfg.listen_addr,
        model_variant = %cfg.model_variant,
        language = %cfg.language,
        data_dir = %cfg.data_dir,
        "starting adapter"
    );

    let _ = init_metrics();

    let state = AppState::new(cfg.clone());
    let router = create_router(state.clone());

    // Bind the port before loading any model so readiness checks succeed
    // while initialisation runs.
    let listener = match tokio::net::TcpListener::bind(&cfg.listen_addr).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!(error = %err, addr = %cfg.listen_addr, "failed to bind listener");
            std::process::exit(1);
        }
    };
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(addr = %addr, "listener bound, port ready");
    }

    let shutdown_state = state.clone();
    let server = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal(shutdown_state))
            .await
    });

    // Model load can take a while; the port is already answering probes.
    let handle = whisper_adapter_engine::build(&cfg);
    if let Some(warning) = &handle.warning {
        tracing::warn!(error = %warning, "engine initialised with warnings");
    }
    if let Some(path) = &handle.model_path {
        tracing::info!(path = %path.display(), "resolved model path");
    }
    let engine = handle.engine.clone();
    state.set_engine(handle.engine);
    state.set_serving(true);
    tracing::info!("adapter ready to serve requests");

    match server.await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => {
            tracing::error!(error = %err, "server terminated with error");
            std::process::exit(1);
        }
        Err(err) => {
            tracing::error!(error = %err, "server task failed");
            std::process::exit(1);
        }
    }

    if let Err(err) = engine.close().await {
        tracing::warn!(error = %err, "failed to close engine");
    }

    let snapshot = state.recorder().snapshot();
    if snapshot.total_streams > 0 {
        tracing::info!(
            total_streams = snapshot.total_streams,
            total_segments = snapshot.total_segments,
            total_transcripts = snapshot.total_transcripts,
            total_final_transcripts = snapshot.total_final_transcripts,
            total_bytes = snapshot.total_bytes,
            total_flushes = snapshot.total_flushes,
            "telemetry totals"
        );
    }
    tracing::info!("adapter stopped");
}

/// Wait for SIGINT or SIGTERM, then flip readiness and bound the drain.
async fn shutdown_signal(state: AppState) {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => tracing::error!(error = %err, "failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }

    state.set_serving(false);
    tracing::info!("shutdown requested, draining streams");

    // Live streams get a bounded drain; after that the process exits.
    tokio::spawn(async {
        tokio::time::sleep(Duration::from_secs(5)).await;
        tracing::warn!("graceful stop timed out, forcing stop");
        std::process::exit(0);
    });
}

fn init_tracing(cfg: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cfg.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
