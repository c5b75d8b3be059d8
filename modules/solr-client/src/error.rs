use thiserror::Error;

pub type Result<T> = std::result::Result<T, SolrError>;

#[derive(Debug, Error)]
pub enum SolrError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Solr error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for SolrError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            SolrError::Parse(err.to_string())
        } else {
            SolrError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for SolrError {
    fn from(err: serde_json::Error) -> Self {
        SolrError::Parse(err.to_string())
    }
}
