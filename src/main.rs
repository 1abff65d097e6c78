use std::sync::Arc;

use smartcampus_ai::{
    config::Config,
    create_router,
    services::{LanguageModel, OllamaClient, OllamaOptions, PromptTemplate},
    settings, AppState,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("smartcampus_ai=info,tower_http=info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    tracing::info!(?config, "Starting SmartCampus AI");

    let settings = settings::load_or_create(&config.settings_path);
    let template = PromptTemplate::load_or_default(&config.prompt_template_path)?;
    let model: Arc<dyn LanguageModel> = Arc::new(OllamaClient::new(OllamaOptions::from(&config))?);

    // Bring the model server up in the background; requests wait on the same launch.
    let warmup = Arc::clone(&model);
    tokio::spawn(async move {
        if let Err(e) = warmup.ensure_ready().await {
            tracing::warn!(error = %e, "Model server not ready at startup");
        }
    });

    let state = Arc::new(AppState::new(settings, template, Arc::clone(&model)));
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(config.bind_address()).await?;
    tracing::info!(address = %listener.local_addr()?, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    model.shutdown().await;
    tracing::info!("SmartCampus AI stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown signal received");
}
