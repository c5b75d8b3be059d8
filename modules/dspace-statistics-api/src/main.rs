use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use dspace_statistics_api::{build_router, AppState};
use dspace_statistics_common::Config;
use dspace_statistics_core::{store, PgStatisticsStore};
use solr_client::SolrClient;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("dspace_statistics=info".parse()?),
        )
        .init();

    let config = Config::from_env()?;
    config.log_redacted();

    let solr = SolrClient::with_timeout(
        &config.solr_server,
        Duration::from_secs(config.solr_timeout_secs),
    )?;
    // The API never writes; its connections are read-only.
    let pool = store::connect(&config, true).await?;

    let state = Arc::new(AppState::new(
        Arc::new(PgStatisticsStore::new(pool)),
        Arc::new(solr),
        config.api_base_url.clone(),
    ));

    let app = build_router(state)
        // CORS
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
        // Logging layer: method + path only
        .layer(
            tower_http::trace::TraceLayer::new_for_http().make_span_with(
                |request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        path = %request.uri().path(),
                    )
                },
            ),
        );

    let addr = format!("{}:{}", config.api_host, config.api_port);
    info!("DSpace statistics API starting on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
