use crate::http_api::{build_error, build_response};
use crate::server_security::{WebhookSecret, SIGNATURE_HEADER};
use anyhow::{Context as AnyhowContext, Result};
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::Response,
    routing::{get, post},
    Router,
};
use iam_clients::{GithubApp, GithubClient};
use iam_pipeline::{PolicyOutcome, PolicyPipeline};
use iam_protocol::PathFilter;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;

pub(crate) const HEALTH_MESSAGE: &str = "Server is up and running.";
pub(crate) const JOB_QUEUE_CAPACITY: usize = 64;

const SCHEDULING_ACTIONS: &[&str] = &["opened", "edited", "reopened", "synchronize"];

/// One policy run requested by a pull request event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PolicyJob {
    pub repository: String,
    pub branch: String,
    pub issue: u64,
}

pub(crate) struct WebhookState {
    pub secret: Option<WebhookSecret>,
    pub jobs: mpsc::Sender<PolicyJob>,
}

#[derive(Debug, Serialize)]
struct Ack {
    ack: bool,
    op: &'static str,
}

#[derive(Debug, Deserialize)]
struct PullRequestEvent {
    action: Option<String>,
    number: Option<u64>,
    pull_request: Option<PullRequest>,
}

#[derive(Debug, Deserialize)]
struct PullRequest {
    number: Option<u64>,
    head: Head,
}

#[derive(Debug, Deserialize)]
struct Head {
    #[serde(rename = "ref")]
    branch: String,
    repo: Option<Repo>,
}

#[derive(Debug, Deserialize)]
struct Repo {
    full_name: String,
}

pub(crate) fn router(state: Arc<WebhookState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/events", post(events))
        .with_state(state)
}

async fn healthz() -> &'static str {
    HEALTH_MESSAGE
}

async fn events(
    State(state): State<Arc<WebhookState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, StatusCode> {
    if let Some(secret) = &state.secret {
        let Some(signature) = headers
            .get(SIGNATURE_HEADER)
            .and_then(|value| value.to_str().ok())
        else {
            return build_error(
                StatusCode::BAD_REQUEST,
                "missing_signature",
                "X-Hub-Signature-256 header is missing",
            );
        };
        if !secret.verify(&body, signature) {
            log::warn!("Rejected webhook delivery with a bad signature");
            return build_error(
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                "Request signatures didn't match",
            );
        }
    }

    let event: PullRequestEvent = match serde_json::from_slice(&body) {
        Ok(event) => event,
        Err(err) => {
            return build_error(
                StatusCode::BAD_REQUEST,
                "invalid_request",
                format!("Invalid event payload: {err}"),
            )
        }
    };

    let action = event.action.as_deref().unwrap_or_default();
    if !SCHEDULING_ACTIONS.contains(&action) {
        log::debug!("Ignoring webhook event action={action}");
        return build_response(StatusCode::OK, &Ack { ack: true, op: "no-op" });
    }

    let job = match job_from_event(event) {
        Ok(job) => job,
        Err(message) => return build_error(StatusCode::BAD_REQUEST, "invalid_request", message),
    };
    log::info!(
        "Scheduling policy run repository={} branch={} issue={}",
        job.repository,
        job.branch,
        job.issue
    );
    if state.jobs.try_send(job).is_err() {
        return build_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "busy",
            "Policy run queue is full",
        );
    }
    build_response(
        StatusCode::OK,
        &Ack {
            ack: true,
            op: "scheduled",
        },
    )
}

fn job_from_event(event: PullRequestEvent) -> std::result::Result<PolicyJob, String> {
    let pull_request = event
        .pull_request
        .ok_or_else(|| "pull_request is missing from the payload".to_string())?;
    let issue = event
        .number
        .or(pull_request.number)
        .ok_or_else(|| "pull request number is missing from the payload".to_string())?;
    let repository = pull_request
        .head
        .repo
        .map(|repo| repo.full_name)
        .ok_or_else(|| "pull_request.head.repo is missing from the payload".to_string())?;
    Ok(PolicyJob {
        repository,
        branch: pull_request.head.branch,
        issue,
    })
}

/// Runs queued jobs one at a time and comments each policy on its pull request.
pub(crate) struct JobRunner {
    pub github: GithubClient,
    /// When set, each job authenticates as the app installation on its repository.
    pub app: Option<GithubApp>,
    pub pipeline: PolicyPipeline,
    pub filter: PathFilter,
}

impl JobRunner {
    pub(crate) async fn run(self, mut jobs: mpsc::Receiver<PolicyJob>) {
        while let Some(job) = jobs.recv().await {
            if let Err(err) = self.run_job(&job).await {
                log::error!(
                    "Policy run failed repository={} branch={} issue={}: {err:#}",
                    job.repository,
                    job.branch,
                    job.issue
                );
            }
        }
    }

    async fn github_for(&self, job: &PolicyJob) -> Result<GithubClient> {
        match &self.app {
            Some(app) => self
                .github
                .for_installation(&job.repository, app)
                .await
                .context("Failed to obtain a GitHub App installation token"),
            None => Ok(self.github.clone()),
        }
    }

    async fn run_job(&self, job: &PolicyJob) -> Result<()> {
        let github = self.github_for(job).await?;
        let outcome = self
            .pipeline
            .run_for_repository(&github, &job.repository, &job.branch, &self.filter)
            .await
            .context("Policy generation failed")?;
        let body = render_comment(&job.branch, &outcome)?;
        github
            .post_issue_comment(&job.repository, job.issue, &body)
            .await
            .context("Failed to post policy comment")?;
        log::info!(
            "Policy comment posted repository={} issue={}",
            job.repository,
            job.issue
        );
        Ok(())
    }
}

pub(crate) fn render_comment(branch: &str, outcome: &PolicyOutcome) -> Result<String> {
    let policy = outcome.to_pretty_json()?;
    let mut body = format!("IAM policy inferred for `{branch}`:\n\n```json\n{policy}\n```\n");
    if !outcome.report.rejected.is_empty() {
        body.push_str(&format!(
            "\n{} suggested action(s) were dropped because they are not in the AWS action catalog.\n",
            outcome.report.rejected.len()
        ));
    }
    Ok(body)
}
