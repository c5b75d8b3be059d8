use std::sync::Arc;

use axum::{extract::State, response::Html};

use dspace_statistics_common::Scope;

use crate::AppState;

const EXAMPLE_ID: &str = "fd8a46d5-1480-4e69-b187-cd3db96d8e4d";

fn scope_section(base: &str, scope: Scope) -> String {
    let singular = scope.singular();
    let plural = scope.plural();
    format!(
        r#"<h2>{title}</h2>
<ul>
  <li><code>GET /{plural}</code> all {plural} with their views and downloads, paged with
    <code>limit</code> (1 to 100, default 100) and <code>page</code> (default 0).
    Example: <a href="{base}/{plural}?limit=10&amp;page=0">{base}/{plural}?limit=10&amp;page=0</a></li>
  <li><code>GET /{singular}/{{id}}</code> views and downloads of one {singular}.
    Example: <a href="{base}/{singular}/{EXAMPLE_ID}">{base}/{singular}/{EXAMPLE_ID}</a></li>
  <li><code>POST /{plural}</code> live views and downloads for a list of {plural}, optionally
    limited to a date range. Body:
    <pre>{{"dateFrom": "2020-01-01T00:00:00Z", "dateTo": "2020-12-31T00:00:00Z", "limit": 10, "page": 0, "countries": false, "monthly": false, "{plural}": ["{EXAMPLE_ID}"]}}</pre>
  </li>
</ul>"#,
        title = plural[..1].to_uppercase() + &plural[1..],
    )
}

/// `GET /` documents the endpoints, linking against the public base URL.
pub async fn landing_page(State(state): State<Arc<AppState>>) -> Html<String> {
    let base = state.api_base_url.trim_end_matches('/');
    let sections: String = Scope::ALL
        .iter()
        .map(|scope| scope_section(base, *scope))
        .collect();

    Html(format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <title>DSpace Statistics API</title>
</head>
<body>
<h1>DSpace Statistics API</h1>
<p>Views and downloads of DSpace items, communities and collections. Table-backed
endpoints are refreshed by the indexer; <code>POST</code> endpoints query Solr directly.
Dates use the format <code>YYYY-MM-DDTHH:MM:SSZ</code>. Errors are returned as
<code>{{"title": ..., "description": ...}}</code>.</p>
{sections}
<p><a href="{base}/status">{base}/status</a> reports the running version.</p>
</body>
</html>"#
    ))
}
