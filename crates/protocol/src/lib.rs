use anyhow::Result;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub mod path_filters;
mod policy;

pub use path_filters::PathFilter;
pub use policy::{IamPolicy, IamStatement, POLICY_VERSION};

/// A repository file as handed over by the repository lister.
///
/// `content` is empty when the file is binary or not valid UTF-8.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
    pub path: String,
    pub url: String,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub content: String,
}

impl SourceFile {
    pub fn new(path: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            url: url.into(),
            size: None,
            content: String::new(),
        }
    }

    #[must_use]
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        let content = content.into();
        self.size = Some(content.len() as u64);
        self.content = content;
        self
    }
}

/// A file that passed the relevance filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedFile {
    pub file: SourceFile,
    pub score: f64,
    /// 1-based position in the filter output.
    pub rank: usize,
}

/// One AWS SDK call reported by the extraction model.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct SdkCallCandidate {
    /// Service name such as ses, sqs, s3 etc.
    pub service: String,
    /// Valid action for the service such as ListTemplates for ses, GetObject for s3 etc.
    pub action: String,
    /// Resource ARN inferred from the SDK call. Use wildcards if it can't be inferred.
    /// Don't use placeholders or example values.
    pub resource: String,
    /// Reason behind picking this call, with a source snippet when applicable.
    pub reasoning: String,
}

impl SdkCallCandidate {
    /// The IAM action string, e.g. `s3:GetObject`.
    pub fn iam_action(&self) -> String {
        format!("{}:{}", self.service, self.action)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, JsonSchema)]
pub struct ErrorEnvelope {
    pub code: String,
    pub message: String,
    pub hint: Option<String>,
}

impl ErrorEnvelope {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            hint: None,
        }
    }

    #[must_use]
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

pub fn serialize_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(Into::into)
}

/// Pretty JSON with four-space indentation.
pub fn serialize_json_pretty<T: Serialize>(value: &T) -> Result<String> {
    let mut out = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
    value.serialize(&mut serializer)?;
    Ok(String::from_utf8(out)?)
}
