use iam_catalog::CatalogError;
use iam_clients::ClientError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("{stage} returned output that does not match its shape: {reason}")]
    MalformedCompletion {
        stage: &'static str,
        raw: String,
        reason: String,
    },

    #[error("Reranker returned document index {index} but only {count} documents were sent")]
    RerankIndex { index: usize, count: usize },

    #[error("Refined policy is not a valid policy document: {0}")]
    InvalidPolicy(String),

    #[error("Extraction task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("Failed to render file for ranking: {0}")]
    Render(#[from] serde_yaml::Error),

    #[error("Failed to render policy: {0}")]
    Output(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
