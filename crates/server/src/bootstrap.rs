use std::sync::Arc;

use risepal_agent::{AgentRuntime, HttpLlmClient, LlmClient, RuntimeDeps};
use risepal_core::audit::TracingAuditSink;
use risepal_core::clock::SystemClock;
use risepal_core::config::AppConfig;
use risepal_core::errors::DomainError;
use risepal_db::repositories::{SqlUserRepository, UserRepository};
use risepal_db::{connect_with_settings, migrations, DbPool};
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub runtime: Arc<AgentRuntime>,
    pub users: Arc<dyn UserRepository>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("completion client setup failed: {0}")]
    Llm(String),
    #[error("dialogue setup failed: {0}")]
    Dialogue(#[from] DomainError),
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    let llm: Arc<dyn LlmClient> = Arc::new(
        HttpLlmClient::from_config(&config.llm)
            .map_err(|error| BootstrapError::Llm(error.to_string()))?,
    );
    bootstrap_with(config, llm).await
}

/// Connects, migrates and wires the runtime around an already loaded config
/// and completion client.
pub async fn bootstrap_with(
    config: AppConfig,
    llm: Arc<dyn LlmClient>,
) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        llm_provider = config.llm.provider.as_str(),
        "starting application bootstrap"
    );

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let deps = RuntimeDeps::sqlite(
        db_pool.clone(),
        llm,
        Arc::new(SystemClock::with_offset_minutes(config.dialogue.utc_offset_minutes)),
        Arc::new(TracingAuditSink),
    );
    let runtime = Arc::new(AgentRuntime::new(deps, &config.dialogue)?);
    let users: Arc<dyn UserRepository> = Arc::new(SqlUserRepository::new(db_pool.clone()));

    Ok(Application { config, db_pool, runtime, users })
}
