use anyhow::{Context as AnyhowContext, Result};
use iam_catalog::CatalogSource;
use iam_clients::{
    GithubApp, DEFAULT_COHERE_API_URL, DEFAULT_COMPLETION_MODEL, DEFAULT_GITHUB_API_URL,
    DEFAULT_OPENAI_API_URL, DEFAULT_RERANK_MODEL,
};
use iam_pipeline::PipelineConfig;
use iam_protocol::PathFilter;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub(crate) const CONFIG_ENV: &str = "IAM_FINDER_CONFIG";

pub(crate) const GITHUB_TOKEN_ENV: &str = "GITHUB_TOKEN";
pub(crate) const GITHUB_APP_CLIENT_ID_ENV: &str = "GITHUB_APP_CLIENT_ID";
pub(crate) const GITHUB_APP_PRIVATE_KEY_ENV: &str = "GITHUB_APP_PRIVATE_KEY";
pub(crate) const COHERE_API_KEY_ENV: &str = "COHERE_API_KEY";
pub(crate) const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";
pub(crate) const WEBHOOK_SECRET_ENV: &str = "IAM_FINDER_WEBHOOK_SECRET";

const GITHUB_API_URL_ENV: &str = "IAM_FINDER_GITHUB_API_URL";
const COHERE_API_URL_ENV: &str = "IAM_FINDER_COHERE_API_URL";
const OPENAI_API_URL_ENV: &str = "IAM_FINDER_OPENAI_API_URL";

pub(crate) const DEFAULT_BIND: &str = "127.0.0.1:8080";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct FinderConfig {
    pub pipeline: PipelineConfig,
    pub catalog: CatalogSection,
    pub models: ModelsSection,
    pub paths: PathFilter,
    pub server: ServerSection,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct CatalogSection {
    /// URL or local path; the AWS policy generator feed when unset.
    pub source: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct ModelsSection {
    pub rerank_model: String,
    pub completion_model: String,
}

impl Default for ModelsSection {
    fn default() -> Self {
        Self {
            rerank_model: DEFAULT_RERANK_MODEL.to_string(),
            completion_model: DEFAULT_COMPLETION_MODEL.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct ServerSection {
    pub bind: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
        }
    }
}

impl FinderConfig {
    /// Explicit path, then `IAM_FINDER_CONFIG`, then built-in defaults.
    pub(crate) fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = explicit
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from));
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let raw = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config =
            Self::from_toml_str(&raw).with_context(|| format!("Invalid config {}", path.display()))?;
        log::debug!("Loaded config path={}", path.display());
        Ok(config)
    }

    pub(crate) fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate().map_err(anyhow::Error::msg)?;
        Ok(config)
    }

    pub(crate) fn validate(&self) -> std::result::Result<(), String> {
        let threshold = self.pipeline.relevance_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(format!(
                "pipeline.relevance_threshold ({threshold}) must be within [0, 1]"
            ));
        }

        if self.pipeline.top_n == Some(0) {
            return Err("pipeline.top_n must be > 0".to_string());
        }

        if self.pipeline.concurrency == 0 {
            return Err("pipeline.concurrency must be > 0".to_string());
        }

        if self.paths.extensions.iter().all(|ext| ext.trim().is_empty()) {
            return Err("paths.extensions must list at least one suffix".to_string());
        }

        Ok(())
    }

    pub(crate) fn catalog_source(&self, overridden: Option<&str>) -> CatalogSource {
        overridden
            .or(self.catalog.source.as_deref())
            .map(CatalogSource::parse)
            .unwrap_or_default()
    }
}

/// API base URLs, each overridable through the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Endpoints {
    pub github: String,
    pub cohere: String,
    pub openai: String,
}

impl Endpoints {
    pub(crate) fn from_env() -> Self {
        let read = |key: &str, default: &str| {
            std::env::var(key)
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default.to_string())
        };
        Self {
            github: read(GITHUB_API_URL_ENV, DEFAULT_GITHUB_API_URL),
            cohere: read(COHERE_API_URL_ENV, DEFAULT_COHERE_API_URL),
            openai: read(OPENAI_API_URL_ENV, DEFAULT_OPENAI_API_URL),
        }
    }
}

/// Non-empty value of a secret environment variable.
pub(crate) fn secret_from_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub(crate) fn require_secret(key: &str) -> Result<String> {
    secret_from_env(key).with_context(|| format!("{key} must be set"))
}

/// GitHub App credentials; the private key is the base64 of its PEM file.
pub(crate) fn github_app_from_env() -> Result<Option<GithubApp>> {
    github_app_from(
        secret_from_env(GITHUB_APP_CLIENT_ID_ENV),
        secret_from_env(GITHUB_APP_PRIVATE_KEY_ENV),
    )
}

fn github_app_from(client_id: Option<String>, private_key: Option<String>) -> Result<Option<GithubApp>> {
    match (client_id, private_key) {
        (None, None) => Ok(None),
        (Some(client_id), Some(private_key)) => GithubApp::from_base64_key(client_id, &private_key)
            .map(Some)
            .with_context(|| format!("Invalid {GITHUB_APP_PRIVATE_KEY_ENV}")),
        (Some(_), None) => anyhow::bail!(
            "{GITHUB_APP_PRIVATE_KEY_ENV} must be set together with {GITHUB_APP_CLIENT_ID_ENV}"
        ),
        (None, Some(_)) => anyhow::bail!(
            "{GITHUB_APP_CLIENT_ID_ENV} must be set together with {GITHUB_APP_PRIVATE_KEY_ENV}"
        ),
    }
}
