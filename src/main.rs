use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use tutorconnected_api::{
    build_router,
    config::AppConfig,
    database::connection,
    services::sslcommerz_service::SslCommerzService,
    state::AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::from_env().context("loading configuration")?;
    let client = connection::connect(&config)
        .await
        .context("creating MongoDB client")?;

    let app_state = initialize_app_state(client, config);

    if let Err(e) = connection::ensure_indexes(&app_state.db).await {
        tracing::warn!("Failed to ensure indexes: {}", e);
    }

    let addr = app_state.config.socket_addr();
    let app = build_router(app_state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    tracing::info!("Server starting on {}", addr);

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}

fn initialize_app_state(client: mongodb::Client, config: AppConfig) -> AppState {
    let gateway = config.gateway.clone();
    let callback_base = config.base_url.clone();
    let app_state = AppState::new(client, config);

    match gateway {
        Some(gateway_config) => match SslCommerzService::new(gateway_config, &callback_base) {
            Ok(service) => {
                tracing::info!("SSLCommerz gateway initialized");
                app_state.with_gateway(Arc::new(service))
            }
            Err(e) => {
                tracing::error!("Failed to initialize SSLCommerz gateway: {}", e);
                tracing::warn!("Gateway payments will be disabled");
                app_state
            }
        },
        None => app_state,
    }
}
