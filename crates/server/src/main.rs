//! Lead Engine Server Entry Point

use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use leadflow_config::{load_settings, Settings};
use leadflow_core::{MessageSender, SystemClock, TracingAlerter};
use leadflow_persistence::SimulatedMessageSender;
use leadflow_server::{create_router, init_metrics, spawn_event_recorder, AppState, WhatsAppSender};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Priority: env vars > config/{env}.yaml > config/default.yaml > defaults
    let env = std::env::var("LEADFLOW_ENV").ok();
    let config = match load_settings(env.as_deref()) {
        Ok(settings) => {
            // Tracing not yet initialized
            eprintln!(
                "Loaded configuration from files (env: {})",
                env.as_deref().unwrap_or("default")
            );
            settings
        },
        Err(e) => {
            eprintln!("Failed to load config: {}", e);
            return Err(e.into());
        },
    };

    init_tracing(&config);

    tracing::info!("Starting lead engine server v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        environment = ?config.environment,
        advisors = config.advisors.len(),
        "Configuration loaded"
    );

    let sender: Arc<dyn MessageSender> = if config.whatsapp.enabled {
        let sender = WhatsAppSender::new(&config.whatsapp)?;
        tracing::info!(endpoint = %sender.endpoint(), "WhatsApp Cloud API sender enabled");
        Arc::new(sender)
    } else {
        tracing::warn!("WhatsApp disabled, outbound messages go to the simulated outbox");
        Arc::new(SimulatedMessageSender::new())
    };

    let metrics_handle = if config.observability.metrics_enabled {
        let handle = init_metrics();
        tracing::info!("Initialized Prometheus metrics at /metrics");
        handle
    } else {
        None
    };

    let state = AppState::in_memory(
        config.clone(),
        sender,
        Arc::new(TracingAlerter),
        Arc::new(SystemClock),
    )
    .with_env(env)
    .with_metrics(metrics_handle);

    if state.metrics.is_some() {
        spawn_event_recorder(&state.desk);
    }
    let shutdown_tx = state.desk.start_background_tasks();
    tracing::info!(
        sweep_interval_secs = config.sla.sweep_interval_secs,
        "Timer worker and sweep started"
    );

    let app = create_router(state);

    let ip: std::net::IpAddr = config.server.host.parse()?;
    let addr = SocketAddr::new(ip, config.server.port);
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = shutdown_tx.send(true);
    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        }
    }
}

fn init_tracing(config: &Settings) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = &config.observability.log_level;
        format!("leadflow={},tower_http=debug", level).into()
    });

    let subscriber = tracing_subscriber::registry().with(env_filter);
    let fmt_layer = if config.observability.log_json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };
    subscriber.with(fmt_layer).init();
}
