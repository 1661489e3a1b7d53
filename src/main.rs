//! Main entry point for the Emoji Gallery service

use emoji_gallery::{
    api,
    backend::ReplicateBackend,
    config::{LoggingConfig, Settings},
    db::Database,
    service::GenerationPipeline,
    storage, AppState,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn init_logging(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let registry = tracing_subscriber::registry().with(filter);
    if logging.format == "pretty" {
        registry.with(fmt::layer().pretty()).init();
    } else {
        registry.with(fmt::layer().json()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Load configuration
    let settings = Settings::load()?;
    settings.validate()?;
    init_logging(&settings.logging);

    info!("Starting Emoji Gallery");
    info!(
        "Loaded configuration: server={}:{} storage={:?} likes={:?}",
        settings.server.host, settings.server.port, settings.storage.provider, settings.likes.consistency
    );

    // Open the database and apply the schema before serving anything
    let db = Database::connect(&settings.database.url, settings.database.max_connections).await?;
    if settings.database.run_migrations {
        db.migrate().await?;
        info!("Database migrations applied");
    }

    let backend = Arc::new(ReplicateBackend::new(&settings.generator)?);
    let object_store = storage::from_config(&settings.storage)?;
    let http = reqwest::Client::builder()
        .timeout(Duration::from_millis(settings.storage.timeout_ms))
        .build()?;

    let pipeline = GenerationPipeline::new(
        backend,
        object_store,
        http,
        settings.storage.bucket.clone(),
        settings.generation.max_prompt_chars,
    );

    let addr = format!("{}:{}", settings.server.host, settings.server.port);

    // Create application state
    let app_state = Arc::new(AppState {
        settings: Arc::new(settings),
        db,
        pipeline,
    });

    // Build the router
    let app = api::routes::create_router(app_state)?;

    info!("Server listening on {}", addr);

    // Start the server
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
