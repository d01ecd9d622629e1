//! HTTP adapter for the deployed retrieval service.
//!
//! Wire contract: `POST {endpoint}/search` with a [`SearchRequest`]
//! body, answered by `{"passages": [...]}`.

use serde::Deserialize;

use cf_domain::config::RetrievalConfig;
use cf_domain::{Error, Result};

use crate::{Passage, Retriever, SearchRequest};

pub struct HttpRetriever {
    endpoint: String,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct SearchResponseBody {
    #[serde(default)]
    passages: Vec<Passage>,
}

impl HttpRetriever {
    pub fn from_config(cfg: &RetrievalConfig) -> Result<Self> {
        if cfg.endpoint.is_empty() {
            return Err(Error::Config(
                "retrieval endpoint must not be empty for the HTTP retriever".into(),
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(cfg.request_timeout_secs))
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;
        Ok(Self {
            endpoint: cfg.endpoint.trim_end_matches('/').to_string(),
            client,
        })
    }
}

#[async_trait::async_trait]
impl Retriever for HttpRetriever {
    async fn search(&self, req: SearchRequest) -> Result<Vec<Passage>> {
        let url = format!("{}/search", self.endpoint);
        let response = self
            .client
            .post(&url)
            .json(&req)
            .send()
            .await
            .map_err(|e| Error::Retrieval(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Retrieval(format!("{status}: {body}")));
        }

        let body: SearchResponseBody = response
            .json()
            .await
            .map_err(|e| Error::Retrieval(format!("malformed search response: {e}")))?;
        Ok(body.passages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_endpoint_is_a_config_error() {
        let cfg = RetrievalConfig::default();
        assert!(matches!(
            HttpRetriever::from_config(&cfg),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn endpoint_is_normalized() {
        let cfg = RetrievalConfig {
            endpoint: "https://retrieval.internal/".into(),
            ..Default::default()
        };
        let r = HttpRetriever::from_config(&cfg).unwrap();
        assert_eq!(r.endpoint, "https://retrieval.internal");
    }
}
