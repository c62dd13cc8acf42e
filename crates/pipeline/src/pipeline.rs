use crate::aggregator::StatementAggregator;
use crate::error::Result;
use crate::extractor::FileExtractor;
use crate::limits::{DEFAULT_EXTRACTION_CONCURRENCY, MAX_EXTRACTION_CONCURRENCY};
use crate::refiner::{PolicyDocument, PolicyRefiner};
use crate::relevance::{RelevanceFilter, DEFAULT_RELEVANCE_THRESHOLD, DEFAULT_TOP_N};
use crate::validator::{validate_calls, RejectedCall, ValidatedCalls};
use iam_catalog::ActionCatalog;
use iam_clients::{CompletionModel, RepositorySource, Reranker};
use iam_protocol::{IamPolicy, PathFilter, RankedFile, SourceFile};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Upper bound on files kept by the relevance filter; `None` keeps all.
    pub top_n: Option<usize>,
    pub relevance_threshold: f64,
    /// Files extracted at the same time.
    pub concurrency: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            top_n: Some(DEFAULT_TOP_N),
            relevance_threshold: DEFAULT_RELEVANCE_THRESHOLD,
            concurrency: DEFAULT_EXTRACTION_CONCURRENCY,
        }
    }
}

/// What happened on the way to the policy.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PipelineReport {
    pub files_considered: usize,
    pub files_relevant: usize,
    pub candidates_extracted: usize,
    pub candidates_accepted: usize,
    pub rejected: Vec<RejectedCall>,
    pub statements: usize,
    pub duration_ms: u64,
}

#[derive(Debug, Clone)]
pub struct PolicyOutcome {
    pub draft: IamPolicy,
    pub policy: PolicyDocument,
    pub report: PipelineReport,
}

impl PolicyOutcome {
    pub fn to_pretty_json(&self) -> Result<String> {
        self.policy.to_pretty_json()
    }
}

struct FileFindings {
    rank: usize,
    extracted: usize,
    validated: ValidatedCalls,
}

/// Repository files in, least-privilege policy out.
pub struct PolicyPipeline {
    catalog: Arc<ActionCatalog>,
    reranker: Arc<dyn Reranker>,
    model: Arc<dyn CompletionModel>,
    config: PipelineConfig,
}

impl PolicyPipeline {
    pub fn new(
        catalog: Arc<ActionCatalog>,
        reranker: Arc<dyn Reranker>,
        model: Arc<dyn CompletionModel>,
    ) -> Self {
        Self {
            catalog,
            reranker,
            model,
            config: PipelineConfig::default(),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// List `repository@branch` through `source`, then [`Self::run`].
    pub async fn run_for_repository(
        &self,
        source: &dyn RepositorySource,
        repository: &str,
        branch: &str,
        filter: &PathFilter,
    ) -> Result<PolicyOutcome> {
        log::info!("Obtaining files repository={repository} branch={branch}");
        let files = source.list_files(repository, branch, filter).await?;
        log::info!("Files obtained successfully file_count={}", files.len());
        self.run(files).await
    }

    pub async fn run(&self, files: Vec<SourceFile>) -> Result<PolicyOutcome> {
        let started = Instant::now();
        let mut report = PipelineReport {
            files_considered: files.len(),
            ..PipelineReport::default()
        };

        let relevance = RelevanceFilter::new(self.config.top_n, self.config.relevance_threshold);
        let ranked = relevance.filter(self.reranker.as_ref(), files).await?;
        report.files_relevant = ranked.len();

        let mut findings = self.extract_all(ranked).await?;
        // Merge in ranking order so the draft does not depend on task timing.
        findings.sort_by_key(|f| f.rank);

        let mut aggregator = StatementAggregator::new();
        for finding in findings {
            report.candidates_extracted += finding.extracted;
            report.candidates_accepted += finding.validated.accepted.len();
            aggregator.extend(&finding.validated.accepted);
            report.rejected.extend(finding.validated.rejected);
        }
        let draft = aggregator.into_policy();
        report.statements = draft.statements.len();
        log::info!(
            "Final list of actions action_count={} statement_count={} rejected_count={}",
            draft.actions().len(),
            report.statements,
            report.rejected.len()
        );

        let policy = PolicyRefiner::new(self.model.clone()).refine(&draft).await?;
        report.duration_ms = started.elapsed().as_millis() as u64;
        log::info!("Policy generated duration_ms={}", report.duration_ms);

        Ok(PolicyOutcome {
            draft,
            policy,
            report,
        })
    }

    /// Extract and validate every ranked file with at most
    /// `config.concurrency` files in flight. The first failure aborts the
    /// remaining work.
    async fn extract_all(&self, ranked: Vec<RankedFile>) -> Result<Vec<FileFindings>> {
        if ranked.is_empty() {
            return Ok(Vec::new());
        }
        let extractor = Arc::new(FileExtractor::new(self.catalog.clone(), self.model.clone())?);
        let limit = self.config.concurrency.clamp(1, MAX_EXTRACTION_CONCURRENCY);
        let permits = Arc::new(Semaphore::new(limit));
        log::info!(
            "Extracting SDK calls file_count={} concurrency={limit}",
            ranked.len()
        );

        let mut tasks = JoinSet::new();
        for ranked_file in ranked {
            let extractor = extractor.clone();
            let catalog = self.catalog.clone();
            let permits = permits.clone();
            tasks.spawn(async move {
                // The semaphore is never closed.
                let _permit = permits
                    .acquire_owned()
                    .await
                    .unwrap_or_else(|_| unreachable!("extraction semaphore closed"));
                let file = &ranked_file.file;
                let calls = extractor.extract(file).await?;
                let extracted = calls.len();
                let validated = validate_calls(&catalog, &file.path, calls);
                log::debug!(
                    "File extracted path={} accepted={} rejected={}",
                    file.path,
                    validated.accepted.len(),
                    validated.rejected.len()
                );
                Ok::<_, crate::PipelineError>(FileFindings {
                    rank: ranked_file.rank,
                    extracted,
                    validated,
                })
            });
        }

        let mut findings = Vec::with_capacity(tasks.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(finding)) => findings.push(finding),
                Ok(Err(err)) => {
                    tasks.abort_all();
                    return Err(err);
                }
                Err(err) => {
                    tasks.abort_all();
                    return Err(err.into());
                }
            }
        }
        Ok(findings)
    }
}
