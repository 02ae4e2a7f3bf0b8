//! Process setup: logging and wiring of the pipeline from configuration.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use crate::config::{AiProvider, AppConfig, StorageConfig};
use crate::db;
use crate::repository::{
    MemoryOfferRepository, OfferRepository, RemoteTableRepository, SqliteOfferRepository,
};
use crate::service::ai::{AiClient, GeminiClient, OpenAiClient};
use crate::service::http::{FallbackFetcher, HttpFetcher, PageFetcher, ProxyFetcher};
use crate::service::mailbox::{DirectoryEmailSource, EmailSource, InMemoryEmailSource};
use crate::service::processor::{AnalysisStage, CreationStage, EnrichmentStage, Orchestrator};
use crate::sources::{SourceDirectory, SourceRegistry};

/// Initialize logging with tracing_subscriber. `RUST_LOG` wins over `level`.
pub fn init_logging(level: &str) {
    let mut filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    if let Ok(directive) = "sqlx=warn".parse() {
        filter = filter.add_directive(directive);
    }

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .compact()
        .with_target(false)
        .try_init();
}

pub async fn build_repository(config: &AppConfig) -> Result<Arc<dyn OfferRepository>> {
    let repository: Arc<dyn OfferRepository> = match &config.storage {
        StorageConfig::Sqlite { path } => {
            let pool = db::init_db(path).await?;
            Arc::new(SqliteOfferRepository::new(pool))
        }
        StorageConfig::Remote { base_url, token, table } => Arc::new(RemoteTableRepository::new(
            base_url.as_str(),
            table.as_str(),
            token.as_str(),
            config.retry_delay,
        )?),
        StorageConfig::Memory => Arc::new(MemoryOfferRepository::new()),
    };
    tracing::info!("[PIPELINE] Offer repository: {}", repository.name());
    Ok(repository)
}

pub fn build_fetcher(config: &AppConfig) -> Result<Arc<dyn PageFetcher>> {
    let direct: Arc<dyn PageFetcher> = Arc::new(HttpFetcher::new()?);
    let proxy = match &config.fetch_proxy_url {
        Some(url) => Some(Arc::new(ProxyFetcher::new(url)?) as Arc<dyn PageFetcher>),
        None => None,
    };
    Ok(Arc::new(FallbackFetcher::new(direct, proxy)))
}

pub fn build_ai(config: &AppConfig) -> Result<Arc<dyn AiClient>> {
    let ai = &config.ai;
    let client: Arc<dyn AiClient> = match ai.provider {
        AiProvider::Gemini => {
            let client = GeminiClient::new(ai.api_key.clone(), ai.model.clone())?;
            Arc::new(match &ai.base_url {
                Some(url) => client.with_base_url(url.as_str()),
                None => client,
            })
        }
        AiProvider::OpenAi => {
            let client = OpenAiClient::new(ai.api_key.clone(), ai.model.clone())?;
            Arc::new(match &ai.base_url {
                Some(url) => client.with_base_url(url.as_str()),
                None => client,
            })
        }
    };
    if ai.api_key.is_none() {
        tracing::warn!("[PIPELINE] No AI API key configured, analysis will not run");
    }
    Ok(client)
}

fn build_email_source(config: &AppConfig) -> Arc<dyn EmailSource> {
    match &config.maildrop_dir {
        Some(dir) => Arc::new(DirectoryEmailSource::new(dir.clone())),
        None => {
            tracing::warn!("[PIPELINE] RADAR_MAILDROP_DIR not set, creation stage has no email source");
            Arc::new(InMemoryEmailSource::new())
        }
    }
}

/// Wire every port from `config` into a ready-to-run orchestrator.
pub async fn build_orchestrator(config: &AppConfig) -> Result<Orchestrator> {
    let registry = Arc::new(SourceRegistry::builtin(build_fetcher(config)?));
    let directory = Arc::new(match &config.sources_file {
        Some(path) => SourceDirectory::load_json(path)
            .with_context(|| format!("Failed to load sources from {}", path.display()))?,
        None => SourceDirectory::from_registry(&registry),
    });
    let repository = build_repository(config).await?;

    let creation = CreationStage::new(
        repository.clone(),
        registry.clone(),
        directory.clone(),
        build_email_source(config),
        config.mailbox.as_str(),
    )
    .with_refresh_policy(config.metadata_refresh);

    let enrichment = EnrichmentStage::new(repository.clone(), registry, directory.clone())
        .with_delay(config.fetch_delay);

    let mut analysis = AnalysisStage::new(repository, directory, build_ai(config)?)
        .with_retry_delay(config.retry_delay);
    if let Some(criteria) = &config.criteria {
        analysis = analysis.with_criteria(criteria.as_str());
    }

    Ok(Orchestrator::new(
        Arc::new(creation),
        Arc::new(enrichment),
        Arc::new(analysis),
    ))
}
