use crate::error::{ClientError, Result};
use crate::http::{build_client, read_json, trim_base_url};
use crate::{RerankHit, Reranker};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub const DEFAULT_COHERE_API_URL: &str = "https://api.cohere.com";
pub const DEFAULT_RERANK_MODEL: &str = "rerank-v3.5";

const SERVICE: &str = "cohere";

#[derive(Clone)]
pub struct CohereReranker {
    http: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
}

#[derive(Serialize)]
struct RerankRequest<'a> {
    model: &'a str,
    query: &'a str,
    documents: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    top_n: Option<usize>,
}

#[derive(Deserialize)]
struct RerankResponse {
    results: Vec<RerankHit>,
}

impl CohereReranker {
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(ClientError::InvalidConfig(
                "Cohere API key must be non-empty".to_string(),
            ));
        }
        Ok(Self {
            http: build_client()?,
            api_url: DEFAULT_COHERE_API_URL.to_string(),
            api_key,
            model: DEFAULT_RERANK_MODEL.to_string(),
        })
    }

    #[must_use]
    pub fn with_api_url(mut self, api_url: &str) -> Self {
        self.api_url = trim_base_url(api_url);
        self
    }

    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

#[async_trait]
impl Reranker for CohereReranker {
    async fn rerank(
        &self,
        query: &str,
        documents: &[String],
        top_n: Option<usize>,
    ) -> Result<Vec<RerankHit>> {
        log::info!(
            "Invoking cohere rerank model={} document_count={}",
            self.model,
            documents.len()
        );
        let request = RerankRequest {
            model: &self.model,
            query,
            documents,
            top_n,
        };
        let response = self
            .http
            .post(format!("{}/v2/rerank", self.api_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(ClientError::transport(SERVICE))?;
        let body: RerankResponse = read_json(SERVICE, response).await?;
        Ok(body.results)
    }
}
