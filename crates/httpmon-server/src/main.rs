//! httpmon server
//!
//! Usage: `httpmon-server [config.yaml]` (default `httpmon.yaml`; built-in
//! defaults when the file does not exist).

use std::net::SocketAddr;

use tracing_subscriber::{fmt, EnvFilter};

use httpmon_core::error::{HttpmonError, Result};
use httpmon_server::{app_state, config, router};

#[tokio::main]
async fn main() {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    if let Err(e) = run().await {
        tracing::error!(error = %e, code = e.code().as_str(), "httpmon-server failed");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let path = std::env::args().nth(1).unwrap_or_else(|| "httpmon.yaml".into());
    let cfg = config::load_or_default(&path)?;
    let listen: SocketAddr = cfg
        .server
        .listen
        .parse()
        .map_err(|e| HttpmonError::BadConfig(format!("server.listen: {e}")))?;

    let state = app_state::AppState::new(cfg)?;
    let app = router::build_router(state.clone());

    tracing::info!(%listen, "httpmon-server starting");
    let listener = tokio::net::TcpListener::bind(listen)
        .await
        .map_err(|e| HttpmonError::Internal(format!("bind failed: {e}")))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| HttpmonError::Internal(format!("server failed: {e}")))?;

    state.pool().shutdown();
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "ctrl-c handler failed; graceful shutdown disabled");
        std::future::pending::<()>().await;
    }
}
