//! # IAM Clients
//!
//! The external collaborators the policy pipeline talks to, each behind a
//! trait so the pipeline can be driven by fakes:
//!
//! - [`RepositorySource`]: lists and downloads repository files ([`GithubClient`])
//! - [`Reranker`]: scores documents against a query ([`CohereReranker`])
//! - [`CompletionModel`]: structured language-model completions ([`OpenAiClient`])
//!
//! None of the clients retry or time out on their own.

mod cohere;
mod error;
mod github;
mod github_app;
mod http;
mod openai;
mod structured;

use async_trait::async_trait;
use iam_protocol::{PathFilter, SourceFile};
use serde::{Deserialize, Serialize};

pub use cohere::{CohereReranker, DEFAULT_COHERE_API_URL, DEFAULT_RERANK_MODEL};
pub use error::{ClientError, Result};
pub use github::{decode_content, GithubClient, TreeEntry, DEFAULT_GITHUB_API_URL};
pub use github_app::{GithubApp, APP_JWT_TTL_SECS};
pub use openai::{OpenAiClient, DEFAULT_COMPLETION_MODEL, DEFAULT_OPENAI_API_URL};
pub use structured::{invoke_structured, ResponseFormat, Structured};

/// One scored document; `index` points into the request's document list.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RerankHit {
    pub index: usize,
    pub relevance_score: f64,
}

#[async_trait]
pub trait RepositorySource: Send + Sync {
    /// Files of `repository` at `branch` that pass `filter`.
    ///
    /// The filter is applied before content is fetched.
    async fn list_files(
        &self,
        repository: &str,
        branch: &str,
        filter: &PathFilter,
    ) -> Result<Vec<SourceFile>>;
}

#[async_trait]
pub trait Reranker: Send + Sync {
    async fn rerank(
        &self,
        query: &str,
        documents: &[String],
        top_n: Option<usize>,
    ) -> Result<Vec<RerankHit>>;
}

#[async_trait]
pub trait CompletionModel: Send + Sync {
    /// Raw completion text constrained to `format`.
    async fn complete(&self, prompt: &str, format: &ResponseFormat) -> Result<String>;
}
