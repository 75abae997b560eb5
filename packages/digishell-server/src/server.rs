use anyhow::Context;
use clap::Args;
use digishell_core::{
    ChangeBroadcaster, LinkConfig, LinkSupervisor, ModemController, RemoteLink, SupervisorConfig,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::state::AppState;

#[derive(Args)]
pub struct ServerArgs {
    /// Port to listen on
    #[arg(long, env = "DIGISHELL_PORT", default_value = "8000")]
    pub port: u16,

    /// Host to bind to
    #[arg(long, env = "DIGISHELL_HOST", default_value = "0.0.0.0")]
    pub host: String,
}

pub async fn run(args: ServerArgs) -> anyhow::Result<()> {
    let link_config = LinkConfig::from_env();
    let supervisor_config = SupervisorConfig::from_env();
    info!(fldigi = %link_config.url(), "starting digishell");

    let link = Arc::new(RemoteLink::new(link_config));
    if let Err(e) = link.connect().await {
        warn!(kind = %e.kind, "fldigi not reachable at startup: {}", e);
    }

    let link: Arc<dyn ModemController> = link;
    let broadcaster = Arc::new(ChangeBroadcaster::new());
    let state = Arc::new(AppState::new(link.clone(), broadcaster.clone()));

    let cancel = CancellationToken::new();
    let supervisor = LinkSupervisor::new(link, broadcaster, supervisor_config)
        .with_observer(state.live_tx.clone())
        .with_reconnect_gate(state.reconnect_gate.clone())
        .spawn(cancel.clone());

    let app = crate::state::api_routes().with_state(state);

    let addr: SocketAddr = format!("{}:{}", args.host, args.port)
        .parse()
        .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], args.port)));

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(%addr, "failed to bind: {}", e);
            cancel.cancel();
            return Err(e).with_context(|| format!("binding {addr}"));
        }
    };
    info!("digishell running at http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel.clone()))
        .await
        .context("server error")?;

    cancel.cancel();
    if let Err(e) = supervisor.await {
        warn!("supervisor task ended abnormally: {}", e);
    }
    Ok(())
}

async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("failed to install Ctrl+C handler: {}", e);
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
                error!("failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
        _ = cancel.cancelled() => {},
    }

    info!("shutting down");
    cancel.cancel();
}
