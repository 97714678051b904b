//! Server setup and initialization
//!
//! Wires together all components: function registry, workflow storage and
//! registry, entity service, workflow engine, and HTTP routes.

use crate::{
    api::{create_router, AppState},
    config::{Config, EntityBackend},
    entity::{EntityService, HttpEntityService, InMemoryEntityService, SqliteEntityService},
    functions::{pets, FunctionRegistry},
    runtime::engine::{EngineConfig, WorkflowEngine},
    workflow::{registry::WorkflowRegistry, storage::WorkflowStorage},
};
use anyhow::Result;
use axum::Router;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

/// Build the function registry with every bundled processor and criterion
pub fn default_functions() -> FunctionRegistry {
    let mut functions = FunctionRegistry::new();
    pets::register(&mut functions);
    functions
}

/// Connect the configured Entity Service adapter
pub async fn connect_entity_service(config: &Config) -> Result<Arc<dyn EntityService>> {
    let service: Arc<dyn EntityService> = match config.entities.backend {
        EntityBackend::Memory => {
            tracing::info!("🧠 Using in-memory entity service");
            Arc::new(InMemoryEntityService::new())
        }
        EntityBackend::Sqlite => {
            tracing::info!("🗄️ Using SQLite entity service");
            Arc::new(SqliteEntityService::connect(&config.entities.database_path).await?)
        }
        EntityBackend::Http => {
            tracing::info!("🌐 Using remote entity service at {}", config.entities.api_url);
            Arc::new(HttpEntityService::new(
                config.entities.api_url.clone(),
                config.entities.request_timeout(),
            )?)
        }
    };
    Ok(service)
}

/// Create the main Axum application with all routes
///
/// Loads every stored workflow descriptor before serving; an invalid
/// descriptor aborts startup.
pub async fn create_app(config: Config) -> Result<Router> {
    tracing::info!("⚙️ Registering processors and criteria");
    let functions = Arc::new(default_functions());

    tracing::info!("📋 Initializing workflow storage at {}", config.workflows.dir);
    let storage = WorkflowStorage::new(&config.workflows.dir);
    storage.init().await?;

    tracing::info!("📊 Initializing workflow registry");
    let registry = Arc::new(WorkflowRegistry::with_storage(storage, Arc::clone(&functions)));
    registry
        .init_from_storage()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to load workflows from storage: {}", e))?;

    let entity_service = connect_entity_service(&config).await?;

    tracing::info!("🚀 Initializing workflow engine");
    let engine = Arc::new(WorkflowEngine::new(
        Arc::clone(&registry),
        functions,
        entity_service,
        EngineConfig::from(&config),
    ));

    let app = create_router(AppState {
        registry,
        engine,
        default_version: config.entities.default_version.clone(),
    });

    tracing::info!("✅ Application initialized successfully");
    Ok(app)
}

/// Start the HTTP server with the given configuration
pub async fn start_server(config: Config) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_thread_ids(true)
        .with_level(true)
        .init();

    tracing::info!("Starting entityflow server...");

    let app = create_app(config.clone()).await?;

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&bind_addr).await?;

    tracing::info!("Server listening on http://{}", bind_addr);

    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}
