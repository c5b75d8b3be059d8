//! Request parameter validation. Everything that reaches a handler's happy
//! path has passed through here.

use chrono::NaiveDateTime;
use serde::Deserialize;

use dspace_statistics_common::{Result, Scope, StatisticsError};
use dspace_statistics_core::live::{LiveRequest, DEFAULT_LIMIT};

pub const MAX_LIMIT: u64 = 100;
/// Solr's date format. Anything else would be rejected by the `time` filter.
pub const DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

// --- Request shapes ---

/// Query string of `GET /{scope}s`.
#[derive(Debug, Default, Deserialize)]
pub struct PagingQuery {
    pub limit: Option<i64>,
    pub page: Option<i64>,
}

/// Body of `POST /{scope}s`. Only the id list matching the route's scope is read.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveBody {
    date_from: Option<String>,
    date_to: Option<String>,
    limit: Option<i64>,
    page: Option<i64>,
    countries: Option<bool>,
    monthly: Option<bool>,
    items: Option<Vec<String>>,
    communities: Option<Vec<String>>,
    collections: Option<Vec<String>>,
}

impl LiveBody {
    fn take_ids(&mut self, scope: Scope) -> Option<Vec<String>> {
        match scope {
            Scope::Item => self.items.take(),
            Scope::Community => self.communities.take(),
            Scope::Collection => self.collections.take(),
        }
    }
}

/// `limit`/`page` of a table listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paging {
    pub limit: u64,
    pub page: u64,
}

impl Paging {
    pub fn offset(&self) -> u64 {
        self.page.saturating_mul(self.limit)
    }
}

fn invalid(msg: impl Into<String>) -> StatisticsError {
    StatisticsError::InvalidInput(msg.into())
}

// --- Range checks ---

fn check_limit(limit: i64) -> Result<u64> {
    if (1..=MAX_LIMIT as i64).contains(&limit) {
        Ok(limit as u64)
    } else {
        Err(invalid(format!(
            "The \"limit\" parameter must be an integer between 1 and {MAX_LIMIT}"
        )))
    }
}

fn check_page(page: i64) -> Result<u64> {
    u64::try_from(page).map_err(|_| {
        invalid("The \"page\" parameter must be an integer greater than or equal to 0")
    })
}

fn check_date(key: &str, value: Option<String>) -> Result<Option<(String, NaiveDateTime)>> {
    let Some(raw) = value else {
        return Ok(None);
    };
    match NaiveDateTime::parse_from_str(&raw, DATE_FORMAT) {
        Ok(parsed) => Ok(Some((raw, parsed))),
        Err(_) => Err(invalid(format!(
            "The \"{key}\" parameter must be a date in the format YYYY-MM-DDTHH:MM:SSZ"
        ))),
    }
}

fn check_ids(key: &str, ids: Option<Vec<String>>) -> Result<Vec<String>> {
    let Some(ids) = ids else {
        return Err(invalid(format!("The \"{key}\" parameter is required")));
    };
    if ids.is_empty() {
        return Err(invalid(format!("The \"{key}\" parameter must not be empty")));
    }
    if ids.iter().any(|id| id.trim().is_empty()) {
        return Err(invalid(format!("The \"{key}\" parameter must not contain empty ids")));
    }
    Ok(ids)
}

// --- Entry points ---

pub fn parse_paging(query: &PagingQuery) -> Result<Paging> {
    Ok(Paging {
        limit: query.limit.map(check_limit).transpose()?.unwrap_or(DEFAULT_LIMIT),
        page: query.page.map(check_page).transpose()?.unwrap_or(0),
    })
}

pub fn parse_live_request(scope: Scope, body: &[u8]) -> Result<LiveRequest> {
    let mut body: LiveBody = serde_json::from_slice(body)
        .map_err(|e| invalid(format!("Could not read the request body: {e}")))?;

    let date_from = check_date("dateFrom", body.date_from.take())?;
    let date_to = check_date("dateTo", body.date_to.take())?;
    if let (Some((_, from)), Some((_, to))) = (&date_from, &date_to) {
        if from > to {
            return Err(invalid(
                "The \"dateFrom\" parameter must not be later than \"dateTo\"",
            ));
        }
    }

    Ok(LiveRequest {
        date_from: date_from.map(|(raw, _)| raw),
        date_to: date_to.map(|(raw, _)| raw),
        ids: check_ids(scope.body_key(), body.take_ids(scope))?,
        limit: body.limit.map(check_limit).transpose()?.unwrap_or(DEFAULT_LIMIT),
        page: body.page.map(check_page).transpose()?.unwrap_or(0),
        countries: body.countries.unwrap_or(false),
        monthly: body.monthly.unwrap_or(false),
    })
}
