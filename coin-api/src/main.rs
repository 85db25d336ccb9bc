use std::{sync::Arc, time::Duration};

use actix_web::{middleware::Logger, web, HttpServer};
use anyhow::Context;
use clap::{Parser, Subcommand};
use common::{db::PgStore, memory::MemoryStore, LedgerStore};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use config::Config;
use security::{configure_cors, RateLimiter};
use state::AppState;

mod auth;
mod config;
mod engine;
mod error;
mod metrics;
mod rollover;
mod routes;
mod security;
mod state;
#[cfg(test)]
mod test_support;

#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    #[clap(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API (default)
    Serve,

    /// Apply pending database migrations and exit
    Migrate,
}

async fn open_store(config: &Config) -> anyhow::Result<Arc<dyn LedgerStore>> {
    if config.uses_memory_store() {
        warn!("DATABASE_URL=memory: ledger state lives in this process only");
        return Ok(Arc::new(MemoryStore::new()));
    }

    let store =
        PgStore::establish_connection(&config.database_url, config.database_max_connections)
            .await
            .context("connecting to postgres")?;
    store.migrate().await.context("running migrations")?;
    Ok(Arc::new(store))
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let store = open_store(&config).await?;
    let state = web::Data::new(AppState::new(store, config.clone()));

    rollover::spawn(
        state.store.clone(),
        state.clock.clone(),
        Duration::from_secs(config.rollover_interval_secs.max(1)),
    );

    let rate_limiter =
        RateLimiter::new(config.rate_limit).trust_forwarded(config.trust_forwarded_for);
    let allowed_origins = config.allowed_origins.clone();

    info!("Starting HTTP server on {}", config.server_address());
    HttpServer::new(move || {
        routes::build_app(state.clone())
            .wrap(rate_limiter.clone())
            .wrap(Logger::default())
            .wrap(configure_cors(&allowed_origins))
    })
    .bind(config.server_address())?
    .run()
    .await?;

    Ok(())
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config).await,
        Commands::Migrate => {
            if config.uses_memory_store() {
                info!("In-memory store needs no migrations");
                return Ok(());
            }
            open_store(&config).await?;
            info!("Migrations applied");
            Ok(())
        }
    }
}
