use anyhow::Context;
use linktree_service::{AppState, build_router};
use siniestro_flow::{FlowConfig, SchemaSource};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing: JSON by default, `LOG_FORMAT=pretty` for development
fn init_tracing() {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "json".to_string());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "linktree_service=debug,siniestro_flow=debug,tower_http=info".into());

    match log_format.as_str() {
        "pretty" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_target(true)
                        .with_level(true),
                )
                .init();
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = FlowConfig::from_env();
    info!(
        backend_url = %config.backend_url,
        fallback = %config.fallback_config.display(),
        timeout_ms = config.http_timeout.as_millis() as u64,
        "Loaded claim flow configuration"
    );

    let state = AppState::from_config(&config);

    // the claim menu retries once on demand, so a failed load here is not fatal
    let load = state.controller.schemas().load().await;
    match load.source {
        SchemaSource::Unavailable => warn!("Starting without form configuration"),
        source => info!(?source, claim_types = load.catalogue.len(), "Form configuration ready"),
    }

    let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    info!("Server running on http://{}", listener.local_addr()?);

    axum::serve(listener, build_router(state)).await?;

    Ok(())
}
