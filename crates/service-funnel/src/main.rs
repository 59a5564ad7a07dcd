mod catalog;
mod config;
mod contact;
mod error;
mod generator;
mod matching;
mod model;
mod orchestrator;
mod parser;
mod rate_limit;
mod resolver;
mod server;
mod termination;
mod traversal;

use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use funnel_common::openai::{OpenAiClient, OpenAiClientConfig};

use catalog::CatalogIndex;
use config::Config;
use generator::OpenAiGenerator;
use orchestrator::ConversationOrchestrator;
use rate_limit::RateLimiter;
use server::AppState;
use termination::TerminationPolicy;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    info!("starting service funnel");

    let config = Config::from_env()?;

    let rows = parser::parse_catalog_file(config.catalog_path())?;
    let catalog = Arc::new(CatalogIndex::build(rows)?);
    info!(
        path = %config.catalog_path().display(),
        categories = catalog.category_count(),
        services = catalog.record_count(),
        "catalog loaded"
    );

    let openai_config = OpenAiClientConfig::from_env();
    if openai_config.api_key.is_none() {
        warn!("OPENAI_API_KEY is not set, chat requests will likely be rejected upstream");
    }
    let base_url = openai_config.base_url.clone();
    let generator = OpenAiGenerator::new(
        OpenAiClient::new(openai_config)?,
        config.model.clone(),
        config.max_tokens,
    );
    info!(
        base_url = %base_url,
        model = %generator.model(),
        max_tokens = ?config.max_tokens,
        "text generator configured"
    );

    let contacts = contact::contact_sink_for(config.redis_url.as_deref()).await;
    info!(backend = contacts.backend(), "contact storage selected");

    let orchestrator = Arc::new(ConversationOrchestrator::new(
        catalog,
        config.match_policy.build(),
        TerminationPolicy::new(config.form_history_threshold, &config.form_trigger_phrase),
        Arc::new(generator),
    ));

    let limiter = config.rate_limit_rps.and_then(RateLimiter::new);
    if let Some(rps) = config.rate_limit_rps {
        info!(rps, "chat rate limiting enabled");
    }

    let state = AppState::new(orchestrator, contacts, limiter);
    let app = server::create_router(state, &config.cors_origins);

    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    info!(addr = %config.listen_addr, policy = ?config.match_policy, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    info!("service funnel shut down");
    Ok(())
}
