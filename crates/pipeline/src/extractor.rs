use crate::error::{PipelineError, Result};
use crate::prompts::{self, SDK_CALLS_SHAPE, SERVICE_NAMES_SHAPE};
use iam_catalog::ActionCatalog;
use iam_clients::{invoke_structured, CompletionModel, Structured};
use iam_protocol::{SdkCallCandidate, SourceFile};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Phase one answer: AWS services a file appears to use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ServiceNames {
    /// AWS service names such as s3, sqs or dynamodb.
    pub service_names: Vec<String>,
}

/// Phase two answer: the SDK calls found in a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct SdkCalls {
    pub sdk_calls: Vec<SdkCallCandidate>,
}

/// Two-phase extraction of SDK calls from one file.
///
/// Phase one narrows the catalog to the services a file mentions, phase two
/// asks for calls against that narrowed catalog only. Both phases see the
/// same file content.
pub struct FileExtractor {
    catalog: Arc<ActionCatalog>,
    model: Arc<dyn CompletionModel>,
    service_names_yaml: String,
}

impl FileExtractor {
    pub fn new(catalog: Arc<ActionCatalog>, model: Arc<dyn CompletionModel>) -> Result<Self> {
        let service_names_yaml = catalog.service_names_yaml()?;
        Ok(Self {
            catalog,
            model,
            service_names_yaml,
        })
    }

    /// Catalog services named by the model for `file`, deduplicated in
    /// first-seen order. Names the catalog does not know are dropped.
    pub async fn discover_services(&self, file: &SourceFile) -> Result<Vec<String>> {
        let prompt = prompts::service_discovery(&file.path, &file.content, &self.service_names_yaml);
        let answer: ServiceNames = expect_parsed(
            SERVICE_NAMES_SHAPE,
            invoke_structured(self.model.as_ref(), SERVICE_NAMES_SHAPE, &prompt).await?,
        )?;

        let mut seen = BTreeSet::new();
        let mut known = Vec::new();
        for name in answer.service_names {
            let name = name.trim().to_string();
            if !self.catalog.contains_service(&name) {
                log::debug!("Ignoring unknown service path={} service={name}", file.path);
                continue;
            }
            if seen.insert(name.clone()) {
                known.push(name);
            }
        }
        log::debug!("Services discovered path={} services={known:?}", file.path);
        Ok(known)
    }

    /// SDK calls in `file` restricted to the actions of `services`.
    pub async fn discover_sdk_calls(
        &self,
        file: &SourceFile,
        services: &[String],
    ) -> Result<Vec<SdkCallCandidate>> {
        let narrowed = self.catalog.subset(services.iter().map(String::as_str));
        let prompt = prompts::sdk_call_discovery(&file.path, &file.content, &narrowed.to_yaml()?);
        let answer: SdkCalls = expect_parsed(
            SDK_CALLS_SHAPE,
            invoke_structured(self.model.as_ref(), SDK_CALLS_SHAPE, &prompt).await?,
        )?;
        log::debug!(
            "SDK calls discovered path={} count={}",
            file.path,
            answer.sdk_calls.len()
        );
        Ok(answer.sdk_calls)
    }

    /// Both phases for one file. A file with no known services yields no
    /// calls without a second model round trip.
    pub async fn extract(&self, file: &SourceFile) -> Result<Vec<SdkCallCandidate>> {
        let services = self.discover_services(file).await?;
        if services.is_empty() {
            log::debug!("No known services, skipping call discovery path={}", file.path);
            return Ok(Vec::new());
        }
        self.discover_sdk_calls(file, &services).await
    }
}

pub(crate) fn expect_parsed<T>(stage: &'static str, result: Structured<T>) -> Result<T> {
    match result {
        Structured::Parsed(value) => Ok(value),
        Structured::Malformed { raw, reason } => {
            Err(PipelineError::MalformedCompletion { stage, raw, reason })
        }
    }
}
