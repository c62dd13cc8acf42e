use crate::error::{PipelineError, Result};
use iam_clients::{RerankHit, Reranker};
use iam_protocol::{RankedFile, SourceFile};
use std::cmp::Ordering;

/// Query every file is scored against.
pub const RELEVANCE_QUERY: &str = "AWS SDK function calls (boto3, aws-go-sdk, awssdkv3) and wrapper functions that interact with AWS services.";

pub const DEFAULT_TOP_N: usize = 15;
pub const DEFAULT_RELEVANCE_THRESHOLD: f64 = 0.01;

/// Keeps the files most likely to contain AWS SDK usage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RelevanceFilter {
    top_n: Option<usize>,
    threshold: f64,
}

impl Default for RelevanceFilter {
    fn default() -> Self {
        Self::new(Some(DEFAULT_TOP_N), DEFAULT_RELEVANCE_THRESHOLD)
    }
}

impl RelevanceFilter {
    pub fn new(top_n: Option<usize>, threshold: f64) -> Self {
        Self { top_n, threshold }
    }

    pub fn top_n(&self) -> Option<usize> {
        self.top_n
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Score `files` with a single reranker call and keep those at or above
    /// the threshold, best first, at most `top_n` of them.
    pub async fn filter(
        &self,
        reranker: &dyn Reranker,
        files: Vec<SourceFile>,
    ) -> Result<Vec<RankedFile>> {
        if files.is_empty() {
            log::info!("No files to rank");
            return Ok(Vec::new());
        }

        let documents = files
            .iter()
            .map(render_document)
            .collect::<Result<Vec<_>>>()?;
        log::info!(
            "Filtering relevant source files file_count={} top_n={:?} threshold={}",
            files.len(),
            self.top_n,
            self.threshold
        );
        let hits = reranker
            .rerank(RELEVANCE_QUERY, &documents, self.top_n)
            .await?;

        let ranked = self.select(files, hits)?;
        log::info!(
            "Relevant source files filtered successfully relevant_files_count={}",
            ranked.len()
        );
        Ok(ranked)
    }

    /// Apply threshold, ordering and truncation to reranker output.
    pub fn select(&self, files: Vec<SourceFile>, hits: Vec<RerankHit>) -> Result<Vec<RankedFile>> {
        let count = files.len();
        if let Some(hit) = hits.iter().find(|hit| hit.index >= count) {
            return Err(PipelineError::RerankIndex {
                index: hit.index,
                count,
            });
        }

        let mut kept: Vec<RerankHit> = hits
            .into_iter()
            .filter(|hit| hit.relevance_score >= self.threshold)
            .collect();
        kept.sort_by(|a, b| {
            b.relevance_score
                .partial_cmp(&a.relevance_score)
                .unwrap_or(Ordering::Equal)
                .then(a.index.cmp(&b.index))
        });

        let mut slots: Vec<Option<SourceFile>> = files.into_iter().map(Some).collect();
        let mut ranked = Vec::with_capacity(kept.len());
        for hit in kept {
            if self.top_n.is_some_and(|limit| ranked.len() >= limit) {
                break;
            }
            // Duplicate indices keep their best score only.
            let Some(file) = slots[hit.index].take() else {
                continue;
            };
            log::debug!(
                "Relevant file path={} score={}",
                file.path,
                hit.relevance_score
            );
            ranked.push(RankedFile {
                file,
                score: hit.relevance_score,
                rank: ranked.len() + 1,
            });
        }
        Ok(ranked)
    }
}

/// The text the reranker sees for one file.
pub fn render_document(file: &SourceFile) -> Result<String> {
    serde_yaml::to_string(file).map_err(Into::into)
}
