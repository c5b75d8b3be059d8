pub mod validate;

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{rejection::QueryRejection, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use tracing::warn;
use uuid::Uuid;

use dspace_statistics_common::{total_pages, Scope, StatisticsError, StatisticsPage};

use crate::AppState;

use validate::{parse_live_request, parse_paging, PagingQuery};

// --- Helpers ---

/// Error bodies are always `{"title": ..., "description": ...}`.
pub fn error_response(status: StatusCode, title: &str, description: impl Into<String>) -> Response {
    (
        status,
        Json(json!({
            "title": title,
            "description": description.into(),
        })),
    )
        .into_response()
}

fn failure_response(scope: Scope, err: StatisticsError) -> Response {
    match err {
        StatisticsError::InvalidInput(msg) => {
            error_response(StatusCode::BAD_REQUEST, "Invalid parameter", msg)
        }
        StatisticsError::NotFound(msg) => error_response(StatusCode::NOT_FOUND, "Not found", msg),
        other => {
            warn!(scope = %scope, error = %other, "Statistics request failed");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error",
                "The statistics backend could not answer the request",
            )
        }
    }
}

// --- Handlers ---

pub async fn status() -> impl IntoResponse {
    Json(json!({ "version": env!("CARGO_PKG_VERSION") }))
}

/// `GET /{scope}/{id}`
pub async fn get_element(
    scope: Scope,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    let uuid = match Uuid::parse_str(&id) {
        Ok(u) => u,
        Err(_) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                "Invalid parameter",
                format!("\"{id}\" is not a valid {} id", scope.singular()),
            )
        }
    };

    match state.store.get(scope, uuid).await {
        Ok(Some(stats)) => Json(stats).into_response(),
        Ok(None) => error_response(
            StatusCode::NOT_FOUND,
            "Not found",
            format!("No statistics recorded for {} {id}", scope.singular()),
        ),
        Err(e) => failure_response(scope, e),
    }
}

/// `GET /{scope}s?limit=&page=`
pub async fn list_elements(
    scope: Scope,
    State(state): State<Arc<AppState>>,
    query: Result<Query<PagingQuery>, QueryRejection>,
) -> Response {
    let Query(params) = match query {
        Ok(q) => q,
        Err(rejection) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                "Invalid parameter",
                format!(
                    "The \"limit\" and \"page\" parameters must be integers: {}",
                    rejection.body_text()
                ),
            )
        }
    };
    let paging = match parse_paging(&params) {
        Ok(p) => p,
        Err(e) => return failure_response(scope, e),
    };

    let total = match state.store.count(scope).await {
        Ok(n) => n,
        Err(e) => return failure_response(scope, e),
    };

    match state.store.list(scope, paging.limit, paging.offset()).await {
        Ok(statistics) => Json(StatisticsPage {
            current_page: paging.page,
            total_pages: total_pages(total, paging.limit),
            limit: paging.limit,
            statistics,
            months: None,
        })
        .into_response(),
        Err(e) => failure_response(scope, e),
    }
}

/// `POST /{scope}s` with a JSON body listing the ids to report on.
pub async fn post_elements(
    scope: Scope,
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Response {
    let request = match parse_live_request(scope, &body) {
        Ok(r) => r,
        Err(e) => return failure_response(scope, e),
    };

    match state.live.live_statistics(scope, &request).await {
        Ok(page) => Json(page).into_response(),
        Err(e) => failure_response(scope, e),
    }
}
