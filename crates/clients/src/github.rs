use crate::error::{ClientError, Result};
use crate::github_app::GithubApp;
use crate::http::{build_client, ensure_success, read_json, trim_base_url};
use crate::RepositorySource;
use async_trait::async_trait;
use base64::Engine as _;
use iam_protocol::{PathFilter, SourceFile};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

pub const DEFAULT_GITHUB_API_URL: &str = "https://api.github.com";

const SERVICE: &str = "github";
const DEFAULT_FETCH_CONCURRENCY: usize = 8;

#[derive(Clone)]
pub struct GithubClient {
    http: reqwest::Client,
    api_url: String,
    token: Option<String>,
    fetch_concurrency: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TreeEntry {
    pub path: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub url: String,
}

#[derive(Deserialize)]
struct Installation {
    id: u64,
}

#[derive(Deserialize)]
struct InstallationToken {
    token: String,
}

#[derive(Deserialize)]
struct TreeResponse {
    tree: Vec<TreeEntry>,
    #[serde(default)]
    truncated: bool,
}

impl GithubClient {
    pub fn new(token: impl Into<String>) -> Result<Self> {
        let token = token.into();
        if token.trim().is_empty() {
            return Err(ClientError::InvalidConfig(
                "GitHub access token must be non-empty".to_string(),
            ));
        }
        Ok(Self {
            token: Some(token),
            ..Self::unauthenticated()?
        })
    }

    /// A client that sends no credentials until [`GithubClient::with_token`].
    pub fn unauthenticated() -> Result<Self> {
        Ok(Self {
            http: build_client()?,
            api_url: DEFAULT_GITHUB_API_URL.to_string(),
            token: None,
            fetch_concurrency: DEFAULT_FETCH_CONCURRENCY,
        })
    }

    /// Same endpoint and pool, different credentials.
    #[must_use]
    pub fn with_token(&self, token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
            ..self.clone()
        }
    }

    #[must_use]
    pub fn with_api_url(mut self, api_url: &str) -> Self {
        self.api_url = trim_base_url(api_url);
        self
    }

    #[must_use]
    pub fn with_fetch_concurrency(mut self, limit: usize) -> Self {
        self.fetch_concurrency = limit.max(1);
        self
    }

    fn request(&self, method: reqwest::Method, url: reqwest::Url) -> reqwest::RequestBuilder {
        let request = self
            .http
            .request(method, url)
            .header("Accept", "application/vnd.github+json");
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// `{api_url}/{prefix}/{segments...}` with every segment percent-encoded.
    fn endpoint<'a>(
        &self,
        prefix: &str,
        segments: impl IntoIterator<Item = &'a str>,
    ) -> Result<reqwest::Url> {
        let raw = format!("{}/{prefix}", self.api_url);
        let mut url = reqwest::Url::parse(&raw)
            .map_err(|err| ClientError::InvalidConfig(format!("invalid GitHub URL {raw}: {err}")))?;
        url.path_segments_mut()
            .map_err(|()| ClientError::InvalidConfig(format!("GitHub URL cannot take a path: {raw}")))?
            .extend(segments);
        Ok(url)
    }

    /// Every blob in the recursive tree of `branch`.
    pub async fn list_tree(&self, repository: &str, branch: &str) -> Result<Vec<TreeEntry>> {
        let mut url = self.endpoint(
            &format!("repos/{repository}/git/trees"),
            branch.split('/'),
        )?;
        url.query_pairs_mut().append_pair("recursive", "1");
        log::info!("Obtaining file list from github repository={repository} branch={branch}");
        let response = self
            .request(reqwest::Method::GET, url)
            .send()
            .await
            .map_err(ClientError::transport(SERVICE))?;
        let body: TreeResponse = read_json(SERVICE, response).await?;
        if body.truncated {
            log::warn!("GitHub tree listing for {repository}@{branch} is truncated");
        }
        Ok(body
            .tree
            .into_iter()
            .filter(|entry| entry.kind != "tree")
            .collect())
    }

    pub async fn fetch_file(
        &self,
        repository: &str,
        branch: &str,
        entry: &TreeEntry,
    ) -> Result<SourceFile> {
        let mut url = self.endpoint(
            &format!("repos/{repository}/contents"),
            entry.path.split('/'),
        )?;
        url.query_pairs_mut().append_pair("ref", branch);
        log::debug!("Fetching file content path={}", entry.path);
        let response = self
            .request(reqwest::Method::GET, url)
            .send()
            .await
            .map_err(ClientError::transport(SERVICE))?;
        let body: serde_json::Value = read_json(SERVICE, response).await?;

        let content = body
            .as_object()
            .and_then(|object| object.get("content"))
            .and_then(serde_json::Value::as_str)
            .map(decode_content)
            .unwrap_or_default();

        Ok(SourceFile {
            path: entry.path.clone(),
            url: entry.url.clone(),
            size: entry.size,
            content,
        })
    }

    pub async fn post_issue_comment(
        &self,
        repository: &str,
        issue: u64,
        body: &str,
    ) -> Result<()> {
        let issue = issue.to_string();
        let url = self.endpoint(
            &format!("repos/{repository}/issues"),
            [issue.as_str(), "comments"],
        )?;
        log::info!("Posting comment repository={repository} issue={issue}");
        let response = self
            .request(reqwest::Method::POST, url)
            .json(&serde_json::json!({ "body": body }))
            .send()
            .await
            .map_err(ClientError::transport(SERVICE))?;
        ensure_success(SERVICE, response).await?;
        Ok(())
    }

    /// Exchange an app JWT for an access token of the installation on `repository`.
    pub async fn installation_token(&self, repository: &str, app: &GithubApp) -> Result<String> {
        let jwt = app.jwt()?;

        let url = self.endpoint(&format!("repos/{repository}"), ["installation"])?;
        let response = self
            .http
            .get(url)
            .header("Accept", "application/vnd.github+json")
            .bearer_auth(&jwt)
            .send()
            .await
            .map_err(ClientError::transport(SERVICE))?;
        let installation: Installation = read_json(SERVICE, response).await?;
        log::debug!(
            "Resolved app installation repository={repository} installation_id={}",
            installation.id
        );

        let installation_id = installation.id.to_string();
        let url = self.endpoint(
            "app/installations",
            [installation_id.as_str(), "access_tokens"],
        )?;
        let response = self
            .http
            .post(url)
            .header("Accept", "application/vnd.github+json")
            .bearer_auth(&jwt)
            .send()
            .await
            .map_err(ClientError::transport(SERVICE))?;
        let token: InstallationToken = read_json(SERVICE, response).await?;
        if token.token.trim().is_empty() {
            return Err(ClientError::invalid(SERVICE, "installation token is empty"));
        }
        Ok(token.token)
    }

    /// A client acting as the app installation on `repository`.
    pub async fn for_installation(&self, repository: &str, app: &GithubApp) -> Result<Self> {
        let token = self.installation_token(repository, app).await?;
        log::info!(
            "Authenticated as GitHub App repository={repository} client_id={}",
            app.client_id()
        );
        Ok(self.with_token(token))
    }
}

#[async_trait]
impl RepositorySource for GithubClient {
    async fn list_files(
        &self,
        repository: &str,
        branch: &str,
        filter: &PathFilter,
    ) -> Result<Vec<SourceFile>> {
        let entries: Vec<TreeEntry> = self
            .list_tree(repository, branch)
            .await?
            .into_iter()
            .filter(|entry| {
                let keep = filter.allows(&entry.path);
                if !keep {
                    log::debug!("Skipping file because of path filter path={}", entry.path);
                }
                keep
            })
            .collect();
        log::info!(
            "Fetching file contents repository={repository} file_count={}",
            entries.len()
        );

        let permits = Arc::new(Semaphore::new(self.fetch_concurrency));
        let mut tasks = JoinSet::new();
        for (idx, entry) in entries.into_iter().enumerate() {
            let client = self.clone();
            let permits = permits.clone();
            let repository = repository.to_string();
            let branch = branch.to_string();
            tasks.spawn(async move {
                let _permit = permits
                    .acquire_owned()
                    .await
                    .map_err(|_| ClientError::InvalidConfig("fetch pool closed".to_string()))?;
                let file = client.fetch_file(&repository, &branch, &entry).await?;
                Ok::<_, ClientError>((idx, file))
            });
        }

        let mut files = Vec::with_capacity(tasks.len());
        while let Some(joined) = tasks.join_next().await {
            files.push(joined??);
        }
        files.sort_by_key(|(idx, _)| *idx);
        Ok(files.into_iter().map(|(_, file)| file).collect())
    }
}

/// Decode a base64 `content` field; non-UTF-8 payloads decode to an empty string.
pub fn decode_content(encoded: &str) -> String {
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    let Ok(bytes) = base64::engine::general_purpose::STANDARD.decode(compact) else {
        return String::new();
    };
    String::from_utf8(bytes).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_wrapped_base64() {
        // GitHub wraps content at 60 columns.
        assert_eq!(decode_content("aW1wb3J0IGJv\ndG8z\n"), "import boto3");
    }

    #[test]
    fn binary_content_decodes_to_empty() {
        assert_eq!(decode_content("//79"), "");
        assert_eq!(decode_content("not base64!"), "");
    }

    #[test]
    fn tree_entries_parse_without_size() {
        let entry: TreeEntry =
            serde_json::from_str(r#"{"path":"src","type":"tree","url":"u"}"#).unwrap();
        assert_eq!(entry.kind, "tree");
        assert_eq!(entry.size, None);
    }
}
