use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use dspace_statistics_common::{Config, Scope};
use dspace_statistics_core::sync::DEFAULT_PAGE_SIZE;
use dspace_statistics_core::{store, Indexer, PgStatisticsStore};
use solr_client::SolrClient;

#[derive(Parser)]
#[command(name = "indexer", about = "Materialize DSpace usage statistics from Solr into Postgres")]
#[command(version)]
struct Cli {
    /// Scope to index (items, communities, collections). Repeat for several; defaults to all.
    #[arg(long = "scope")]
    scopes: Vec<Scope>,

    /// Facet values fetched per Solr request
    #[arg(long, env = "INDEXER_PAGE_SIZE", default_value_t = DEFAULT_PAGE_SIZE)]
    page_size: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("dspace_statistics=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let scopes = if cli.scopes.is_empty() {
        Scope::ALL.to_vec()
    } else {
        cli.scopes
    };

    info!("DSpace statistics indexer starting...");

    let config = Config::indexer_from_env()?;
    config.log_redacted();

    let solr = SolrClient::with_timeout(
        &config.solr_server,
        Duration::from_secs(config.solr_timeout_secs),
    )?;
    let pool = store::connect(&config, false).await?;
    let store = PgStatisticsStore::new(pool);

    let indexer = Indexer::new(Arc::new(solr), Arc::new(store)).with_page_size(cli.page_size);
    let stats = indexer.run(&scopes).await?;

    info!("{stats}");
    Ok(())
}
