//! `dlm serve` – restore saved jobs, serve the control plane, save on shutdown.

use anyhow::{Context, Result};
use dlm_core::config::DlmConfig;
use dlm_core::persist;
use dlm_core::{JobDefaults, JobList};
use std::sync::Arc;

use crate::server::{self, AppState};

pub async fn run_serve(mut cfg: DlmConfig, host: Option<String>, port: Option<u16>) -> Result<()> {
    if let Some(host) = host {
        cfg.listen_host = host;
    }
    if let Some(port) = port {
        cfg.listen_port = port;
    }
    let settings_path = cfg.settings_path()?;
    let jobs = Arc::new(JobList::new(JobDefaults::from_config(&cfg)));

    let records = match persist::load_settings(&settings_path) {
        Ok(records) => records,
        Err(e) => {
            tracing::error!("{:#}; no jobs restored", e);
            Vec::new()
        }
    };
    if !records.is_empty() {
        let restore_into = Arc::clone(&jobs);
        tokio::task::spawn_blocking(move || restore_into.restore(&records)).await?;
    }

    let addr = format!("{}:{}", cfg.listen_host, cfg.listen_port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("bind control plane on {}", addr))?;
    let local = listener.local_addr()?;
    tracing::info!("control plane listening on http://{}", local);
    println!("dlm listening on http://{}/index.html", local);

    let app = server::router(Arc::new(AppState {
        jobs: Arc::clone(&jobs),
        static_dir: cfg.static_dir.clone(),
    }));
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("control plane server")?;

    let drain_from = Arc::clone(&jobs);
    let records = tokio::task::spawn_blocking(move || drain_from.drain()).await?;
    persist::save_settings(&settings_path, &records)?;
    println!("saved {} job(s) to {}", records.len(), settings_path.display());
    Ok(())
}

/// Resolves on SIGINT, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("ctrl-c handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!("SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    tracing::info!("shutdown requested; stopping jobs");
}
