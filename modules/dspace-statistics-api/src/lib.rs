//! HTTP API over the materialized statistics tables and live Solr queries.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{rejection::QueryRejection, Path, Query, State},
    routing::get,
    Router,
};

use dspace_statistics_common::Scope;
use dspace_statistics_core::{LiveAggregator, StatisticsIndex, StatisticsStore};

use rest::validate::PagingQuery;

mod docs;
pub mod rest;

pub struct AppState {
    pub store: Arc<dyn StatisticsStore>,
    pub live: LiveAggregator,
    /// Public base URL used for links on the landing page.
    pub api_base_url: String,
}

impl AppState {
    pub fn new(
        store: Arc<dyn StatisticsStore>,
        index: Arc<dyn StatisticsIndex>,
        api_base_url: impl Into<String>,
    ) -> Self {
        Self {
            store,
            live: LiveAggregator::new(index),
            api_base_url: api_base_url.into(),
        }
    }
}

type SharedState = State<Arc<AppState>>;

/// `/{singular}/{id}` and `/{plural}` for one scope. The scope is fixed here,
/// handlers never parse it from the path.
fn scope_routes(scope: Scope) -> Router<Arc<AppState>> {
    Router::new()
        .route(
            &format!("/{}/{{id}}", scope.singular()),
            get(move |state: SharedState, id: Path<String>| {
                rest::get_element(scope, state, id)
            }),
        )
        .route(
            &format!("/{}", scope.plural()),
            get(
                move |state: SharedState, query: Result<Query<PagingQuery>, QueryRejection>| {
                    rest::list_elements(scope, state, query)
                },
            )
            .post(move |state: SharedState, body: Bytes| {
                rest::post_elements(scope, state, body)
            }),
        )
}

/// Full application router without the outer middleware.
pub fn build_router(state: Arc<AppState>) -> Router {
    let mut router = Router::new()
        .route("/", get(docs::landing_page))
        .route("/status", get(rest::status));

    for scope in Scope::ALL {
        router = router.merge(scope_routes(scope));
    }

    router.with_state(state)
}
