use std::{net::SocketAddr, sync::Arc};

use {
    axum::{
        Router,
        extract::State,
        response::{IntoResponse, Json},
        routing::get,
    },
    taskbridge_config::BridgeConfig,
    taskbridge_tasks::{Outbox, Poller, Processor},
    taskbridge_whatsapp::HttpMessageSource,
    tokio_util::sync::CancellationToken,
    tower_http::trace::TraceLayer,
    tracing::{info, warn},
};

use crate::{
    state::GatewayState,
    webhook::{receive_handler, verify_handler},
};

// ── Server startup ───────────────────────────────────────────────────────────

/// Build the router (shared between production startup and tests).
pub fn build_app(state: Arc<GatewayState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/webhook", get(verify_handler).post(receive_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the bridge until ctrl-c: webhook server, processor loop and, when a
/// listing URL is configured, the poller.
pub async fn start_gateway(config: BridgeConfig) -> anyhow::Result<()> {
    let config = Arc::new(config);
    let data_dir = config.queue.resolved_data_dir();
    std::fs::create_dir_all(&data_dir)?;

    let state = GatewayState::from_config(Arc::clone(&config))?;
    let cancel = CancellationToken::new();
    let mut loops = Vec::new();

    let processor = Arc::new(Processor::new(
        Arc::clone(&state.store),
        Outbox::in_dir(&data_dir),
        Some(state.responder.clone()),
        config.processor.clone(),
    ));
    loops.push(tokio::spawn(processor.run(cancel.clone())));

    match config.poller.list_url.as_deref() {
        Some(url) if config.poller.enabled() => {
            let source = Arc::new(HttpMessageSource::new(url, &config.whatsapp)?);
            let poller = Arc::new(Poller::new(
                Arc::clone(&state.store),
                source,
                config.access.allowed_senders.clone(),
                config.poller.interval(),
            ));
            loops.push(tokio::spawn(poller.run(cancel.clone())));
        },
        _ => info!("no listing URL configured, offline poller disabled"),
    }

    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(
        addr = %listener.local_addr()?,
        data_dir = %data_dir.display(),
        version = %state.version,
        "taskbridge listening"
    );

    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("shutdown requested"),
            Err(e) => warn!(error = %e, "failed to listen for ctrl-c"),
        }
        signal_cancel.cancel();
    });

    let app = build_app(state);
    let shutdown = cancel.clone();
    let served = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move { shutdown.cancelled().await })
    .await;

    cancel.cancel();
    for handle in loops {
        if let Err(e) = handle.await {
            warn!(error = %e, "background loop ended abnormally");
        }
    }
    info!("taskbridge stopped");
    served.map_err(Into::into)
}

// ── Handlers ─────────────────────────────────────────────────────────────────

async fn health_handler(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    match state.store.counts().await {
        Ok(counts) => Json(serde_json::json!({
            "status": "ok",
            "version": state.version,
            "pending": counts.pending,
        })),
        Err(e) => {
            warn!(error = %e, "health check could not read the queue");
            Json(serde_json::json!({
                "status": "degraded",
                "version": state.version,
                "pending": null,
                "error": e.to_string(),
            }))
        },
    }
}
