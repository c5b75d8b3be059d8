//! Postgres-backed statistics tables, one per scope.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;
use tracing::warn;
use uuid::Uuid;

use dspace_statistics_common::{Config, ElementStatistics, Metric, Result, Scope};

use crate::traits::{StatisticsStore, UpsertOutcome};

/// Postgres error code for "relation does not exist".
const UNDEFINED_TABLE: &str = "42P01";

pub fn connect_options(config: &Config) -> PgConnectOptions {
    PgConnectOptions::new()
        .host(&config.database_host)
        .port(config.database_port)
        .username(&config.database_user)
        .password(&config.database_pass)
        .database(&config.database_name)
}

/// Open a connection pool. Connections handed to the API are read-only.
pub async fn connect(config: &Config, read_only: bool) -> Result<PgPool> {
    let mut options = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .acquire_timeout(Duration::from_secs(config.database_acquire_timeout_secs));

    if read_only {
        options = options.after_connect(|conn, _meta| {
            Box::pin(async move {
                sqlx::query("SET SESSION CHARACTERISTICS AS TRANSACTION READ ONLY")
                    .execute(&mut *conn)
                    .await?;
                Ok(())
            })
        });
    }

    Ok(options.connect_with(connect_options(config)).await?)
}

/// Collapse a page of facet rows into the rows that can be written.
///
/// Facet values that are not UUIDs (legacy integer ids, garbage in old
/// cores) are skipped. A repeated id keeps its last count, since one
/// `INSERT .. ON CONFLICT` statement cannot touch the same row twice.
pub fn prepare_rows(scope: Scope, rows: &[(String, u64)]) -> (BTreeMap<Uuid, u64>, usize) {
    let mut prepared = BTreeMap::new();
    let mut skipped = 0;
    for (id, count) in rows {
        match Uuid::parse_str(id) {
            Ok(uuid) => {
                prepared.insert(uuid, *count);
            }
            Err(_) => {
                warn!(scope = %scope, id = id.as_str(), "Skipping facet value that is not a UUID");
                skipped += 1;
            }
        }
    }
    (prepared, skipped)
}

fn to_count(n: i64) -> u64 {
    u64::try_from(n).unwrap_or(0)
}

fn to_db_count(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

fn is_undefined_table(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .and_then(|e| e.code())
        .is_some_and(|code| code == UNDEFINED_TABLE)
}

#[derive(Clone)]
pub struct PgStatisticsStore {
    pool: PgPool,
}

impl PgStatisticsStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StatisticsStore for PgStatisticsStore {
    async fn ensure_table(&self, scope: Scope) -> Result<()> {
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} \
             (id UUID PRIMARY KEY, views BIGINT DEFAULT 0, downloads BIGINT DEFAULT 0)",
            scope.table()
        );
        sqlx::query(&sql).execute(&self.pool).await?;
        Ok(())
    }

    async fn upsert_batch(
        &self,
        scope: Scope,
        metric: Metric,
        rows: &[(String, u64)],
    ) -> Result<UpsertOutcome> {
        let (prepared, skipped) = prepare_rows(scope, rows);
        if prepared.is_empty() {
            return Ok(UpsertOutcome { written: 0, skipped });
        }

        let ids: Vec<Uuid> = prepared.keys().copied().collect();
        let counts: Vec<i64> = prepared.values().copied().map(to_db_count).collect();

        // Table and column names come from closed enums, never from input.
        let column = metric.column();
        let sql = format!(
            "INSERT INTO {table} (id, {column}) \
             SELECT * FROM UNNEST($1::uuid[], $2::bigint[]) \
             ON CONFLICT (id) DO UPDATE SET {column} = excluded.{column}",
            table = scope.table(),
        );

        let mut tx = self.pool.begin().await?;
        sqlx::query(&sql)
            .bind(&ids)
            .bind(&counts)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(UpsertOutcome {
            written: ids.len(),
            skipped,
        })
    }

    async fn get(&self, scope: Scope, id: Uuid) -> Result<Option<ElementStatistics>> {
        let sql = format!(
            "SELECT id, views, downloads FROM {} WHERE id = $1",
            scope.table()
        );
        let row = sqlx::query_as::<_, (Uuid, Option<i64>, Option<i64>)>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await;

        match row {
            Ok(row) => Ok(row.map(|(id, views, downloads)| {
                ElementStatistics::new(
                    id.to_string(),
                    to_count(views.unwrap_or(0)),
                    to_count(downloads.unwrap_or(0)),
                )
            })),
            // Nothing synced for this scope yet.
            Err(e) if is_undefined_table(&e) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn count(&self, scope: Scope) -> Result<u64> {
        let sql = format!("SELECT COUNT(id) FROM {}", scope.table());
        match sqlx::query_as::<_, (i64,)>(&sql).fetch_one(&self.pool).await {
            Ok((n,)) => Ok(to_count(n)),
            Err(e) if is_undefined_table(&e) => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self, scope: Scope, limit: u64, offset: u64) -> Result<Vec<ElementStatistics>> {
        let sql = format!(
            "SELECT id, views, downloads FROM {} ORDER BY id ASC LIMIT $1 OFFSET $2",
            scope.table()
        );
        let rows = sqlx::query_as::<_, (Uuid, Option<i64>, Option<i64>)>(&sql)
            .bind(to_db_count(limit))
            .bind(to_db_count(offset))
            .fetch_all(&self.pool)
            .await;

        match rows {
            Ok(rows) => Ok(rows
                .into_iter()
                .map(|(id, views, downloads)| {
                    ElementStatistics::new(
                        id.to_string(),
                        to_count(views.unwrap_or(0)),
                        to_count(downloads.unwrap_or(0)),
                    )
                })
                .collect()),
            Err(e) if is_undefined_table(&e) => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prepare_rows_skips_non_uuid_values_and_keeps_last_duplicate() {
        let id = "fd8a46d5-1480-4e69-b187-cd3db96d8e4d";
        let rows = vec![
            (id.to_string(), 3),
            ("17".to_string(), 8),
            (id.to_string(), 5),
        ];
        let (prepared, skipped) = prepare_rows(Scope::Item, &rows);

        assert_eq!(skipped, 1);
        assert_eq!(prepared.len(), 1);
        assert_eq!(prepared[&Uuid::parse_str(id).unwrap()], 5);
    }

    #[test]
    fn counts_clamp_instead_of_wrapping() {
        assert_eq!(to_db_count(u64::MAX), i64::MAX);
        assert_eq!(to_count(-1), 0);
    }
}
