use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::info;

use orcabot_agent::{
    AgentRuntime, AgentSettings, DocumentIssuer, OpenAiCompatClient, ReasoningClient, ToolRouter,
};
use orcabot_catalog::{Catalog, HttpPriceSource};
use orcabot_core::config::{AppConfig, ConfigError, LoadOptions};
use orcabot_core::RetryPolicy;
use orcabot_db::repositories::{
    LeadRepository, MessageRepository, QuoteRepository, SqlLeadRepository, SqlMessageRepository,
    SqlQuoteRepository,
};
use orcabot_db::{connect, migrations, DbPool};
use orcabot_whatsapp::{ChatGateway, EvolutionClient};

use crate::documents::QuoteDocumentService;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub runtime: Arc<AgentRuntime>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("artifact storage setup failed: {0}")]
    Artifacts(#[source] std::io::Error),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(event_name = "system.bootstrap.start", "starting application bootstrap");

    let db_pool =
        connect(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(event_name = "system.bootstrap.database_connected", "database connection established");

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(event_name = "system.bootstrap.migrations_applied", "database migrations applied");

    let leads: Arc<dyn LeadRepository> = Arc::new(SqlLeadRepository::new(db_pool.clone()));
    let messages: Arc<dyn MessageRepository> = Arc::new(SqlMessageRepository::new(db_pool.clone()));
    let quotes: Arc<dyn QuoteRepository> = Arc::new(SqlQuoteRepository::new(db_pool.clone()));

    let retry = RetryPolicy::default();

    let catalog = Arc::new(Catalog::new(
        Arc::new(HttpPriceSource::new(config.catalog.source_url.clone(), 30, retry.clone())),
        Duration::from_secs(config.catalog.cache_ttl_secs),
    ));

    let gateway: Arc<dyn ChatGateway> = Arc::new(EvolutionClient::new(
        config.whatsapp.api_url.clone(),
        config.whatsapp.api_key.clone(),
        config.whatsapp.instance.clone(),
        retry.clone(),
    ));

    let reasoning: Arc<dyn ReasoningClient> = Arc::new(OpenAiCompatClient::new(
        config.llm.base_url.clone(),
        config.llm.api_key.clone(),
        config.llm.model.clone(),
        config.llm.timeout_secs,
        RetryPolicy { max_retries: config.llm.max_retries, ..RetryPolicy::default() },
    ));

    let documents: Arc<dyn DocumentIssuer> = Arc::new(
        QuoteDocumentService::new(
            config.server.artifact_dir.clone(),
            config.server.public_base_url.clone(),
            config.company.company_name.clone(),
        )
        .map_err(BootstrapError::Artifacts)?,
    );

    let settings = AgentSettings {
        agent_name: config.company.agent_name.clone(),
        company_name: config.company.company_name.clone(),
        manager_phone: config.whatsapp.manager_phone.clone(),
        quote_validity_days: config.company.quote_validity_days,
        max_history_messages: config.company.max_history_messages,
    };

    let router = ToolRouter::new(
        catalog,
        leads.clone(),
        quotes.clone(),
        gateway.clone(),
        documents,
        settings.clone(),
    );

    let runtime = Arc::new(AgentRuntime::new(
        leads, messages, quotes, reasoning, gateway, router, settings,
    ));

    info!(event_name = "system.bootstrap.complete", "application bootstrap complete");
    Ok(Application { config, db_pool, runtime })
}
