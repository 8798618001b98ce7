use burnbox::{
    admission::AdmissionController, config::AppConfig, lifecycle::Lifecycle, logging, store, web,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load()?;

    // Initialize logging as soon as we know how
    logging::init(&config.log);

    info!("Starting burnbox v{}", env!("CARGO_PKG_VERSION"));

    // Connect the backing store
    let store = store::connect(&config.store).await?;
    if let Err(e) = store.ping().await {
        warn!("Store not answering pings yet: {}", e);
    }

    let lifecycle = Arc::new(Lifecycle::new(store, config.secrets.clone()));
    info!(
        placeholder_ttl_secs = config.secrets.placeholder_ttl_secs,
        message_ttl_secs = config.secrets.message_ttl_secs,
        "Lifecycle engine ready"
    );

    let admission = Arc::new(AdmissionController::new(&config.rate_limit));
    if admission.is_enabled() {
        info!(
            rps = config.rate_limit.rps,
            burst = config.rate_limit.effective_burst(),
            "Admission control enabled"
        );
    }

    let app = web::create_router(web::AppState { lifecycle }, admission, &config.server);

    let addr = config.server.bind_addr();
    let listener = TcpListener::bind(&addr).await?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shut down gracefully");
    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
}
