use thiserror::Error;

pub type Result<T> = std::result::Result<T, StatisticsError>;

#[derive(Error, Debug)]
pub enum StatisticsError {
    /// Malformed request parameters. Reported to the client, never retried.
    #[error("Invalid parameter: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// The statistics index could not be reached or answered with garbage.
    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<solr_client::SolrError> for StatisticsError {
    fn from(err: solr_client::SolrError) -> Self {
        StatisticsError::Upstream(err.to_string())
    }
}

impl From<sqlx::Error> for StatisticsError {
    fn from(err: sqlx::Error) -> Self {
        StatisticsError::Database(err.to_string())
    }
}
