pub mod error;
pub mod types;

pub use error::{Result, SolrError};
pub use types::{
    CoreStatusResponse, FacetCounts, FacetRange, PivotEntry, SelectParams, SelectResponse,
    StatsResult,
};

use std::time::Duration;

use serde::de::DeserializeOwned;

/// Thin client over a Solr base URL such as `http://localhost:8080/solr`.
#[derive(Clone)]
pub struct SolrClient {
    client: reqwest::Client,
    base_url: String,
}

impl SolrClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Client whose requests fail after `timeout` instead of hanging on a stuck core.
    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// URL of a core, as used in the `shards` parameter.
    pub fn core_url(&self, core: &str) -> String {
        format!("{}/{}", self.base_url, core)
    }

    /// Names of all cores currently loaded, from `admin/cores?action=STATUS`.
    pub async fn core_names(&self) -> Result<Vec<String>> {
        let url = format!("{}/admin/cores", self.base_url);
        let resp = self
            .client
            .get(&url)
            .query(&[("action", "STATUS"), ("wt", "json")])
            .send()
            .await?;

        let status: CoreStatusResponse = read_json(resp).await?;
        Ok(status.status.into_keys().collect())
    }

    /// Run a `select` against one core. `wt=json` is always added.
    pub async fn select(&self, core: &str, params: &SelectParams) -> Result<SelectResponse> {
        let url = format!("{}/{}/select", self.base_url, core);
        tracing::debug!(core, params = ?params.pairs(), "Solr select");

        let resp = self
            .client
            .get(&url)
            .query(params.pairs())
            .query(&[("wt", "json")])
            .send()
            .await?;

        read_json(resp).await
    }
}

async fn read_json<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(SolrError::Api {
            status: status.as_u16(),
            message: body,
        });
    }

    let body = resp.text().await?;
    Ok(serde_json::from_str(&body)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let client = SolrClient::new("http://localhost:8080/solr/");
        assert_eq!(client.base_url(), "http://localhost:8080/solr");
        assert_eq!(
            client.core_url("statistics-2019"),
            "http://localhost:8080/solr/statistics-2019"
        );
    }
}
