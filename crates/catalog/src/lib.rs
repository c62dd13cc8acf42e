//! # IAM Catalog
//!
//! The canonical table of AWS services and their IAM actions.
//!
//! The table normally comes from the AWS policy generator feed
//! ([`DEFAULT_CATALOG_URL`]), but a local snapshot of that feed (or a plain
//! `{service: [actions]}` JSON file) works as well and keeps runs
//! reproducible.
//!
//! ```no_run
//! use iam_catalog::{ActionCatalog, CatalogSource};
//!
//! # async fn demo() -> iam_catalog::Result<()> {
//! let client = reqwest::Client::new();
//! let catalog = CatalogSource::parse("catalog.json").load(&client).await?;
//! assert!(catalog.contains("s3", "GetObject"));
//! # Ok(())
//! # }
//! ```

mod catalog;
mod error;

use std::path::PathBuf;

pub use catalog::ActionCatalog;
pub use error::{CatalogError, Result};

pub const DEFAULT_CATALOG_URL: &str = "https://awspolicygen.s3.amazonaws.com/js/policies.js";

/// Where the catalog is loaded from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogSource {
    Url(String),
    File(PathBuf),
}

impl Default for CatalogSource {
    fn default() -> Self {
        Self::Url(DEFAULT_CATALOG_URL.to_string())
    }
}

impl CatalogSource {
    /// `http(s)://` values are URLs, anything else is a local path.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.starts_with("http://") || raw.starts_with("https://") {
            Self::Url(raw.to_string())
        } else {
            Self::File(PathBuf::from(raw))
        }
    }

    pub async fn load(&self, client: &reqwest::Client) -> Result<ActionCatalog> {
        let catalog = match self {
            Self::Url(url) => ActionCatalog::fetch(client, url).await?,
            Self::File(path) => ActionCatalog::load_file(path)?,
        };
        if catalog.is_empty() {
            return Err(CatalogError::Invalid(format!(
                "action catalog from {self} contains no services"
            )));
        }
        Ok(catalog)
    }
}

impl std::fmt::Display for CatalogSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Url(url) => f.write_str(url),
            Self::File(path) => write!(f, "{}", path.display()),
        }
    }
}
