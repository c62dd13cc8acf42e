#![allow(dead_code)]

use async_trait::async_trait;
use iam_clients::{ClientError, CompletionModel, RerankHit, Reranker, ResponseFormat};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Scores a document 0.9 when it contains `needle`, 0.0 otherwise.
pub struct KeywordReranker {
    pub needle: &'static str,
    pub calls: AtomicUsize,
}

impl KeywordReranker {
    pub fn new(needle: &'static str) -> Self {
        Self {
            needle,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Reranker for KeywordReranker {
    async fn rerank(
        &self,
        _query: &str,
        documents: &[String],
        _top_n: Option<usize>,
    ) -> iam_clients::Result<Vec<RerankHit>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(documents
            .iter()
            .enumerate()
            .map(|(index, doc)| RerankHit {
                index,
                relevance_score: if doc.contains(self.needle) { 0.9 } else { 0.0 },
            })
            .collect())
    }
}

/// Canned replies per file path, plus a fixed refinement answer.
#[derive(Default)]
pub struct CannedModel {
    pub services: HashMap<String, String>,
    pub calls: HashMap<String, String>,
    pub refined: Option<String>,
    pub failing_path: Option<String>,
    pub delay: Option<Duration>,
    pub shapes: Mutex<Vec<String>>,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl CannedModel {
    pub fn calls_for(&self, shape: &str) -> usize {
        self.shapes
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.as_str() == shape)
            .count()
    }
}

fn prompt_file_path(prompt: &str) -> String {
    prompt
        .lines()
        .find_map(|line| line.strip_prefix("File Path: "))
        .unwrap_or_default()
        .to_string()
}

#[async_trait]
impl CompletionModel for CannedModel {
    async fn complete(&self, prompt: &str, format: &ResponseFormat) -> iam_clients::Result<String> {
        self.shapes.lock().unwrap().push(format.name.clone());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let path = prompt_file_path(prompt);
        if self.failing_path.as_deref() == Some(path.as_str()) {
            return Err(ClientError::Status {
                service: "openai",
                status: 500,
                body: "upstream failure".to_string(),
            });
        }
        let reply = match format.name.as_str() {
            "service_names" => self.services.get(&path).cloned(),
            "sdk_calls" => self.calls.get(&path).cloned(),
            "refined_policy" => Some(self.refined.clone().unwrap_or_else(|| echo_draft(prompt))),
            _ => None,
        };
        Ok(reply.unwrap_or_else(|| format!(r#"{{"{}":[]}}"#, format.name)))
    }
}

/// Hand the draft policy back unchanged.
fn echo_draft(prompt: &str) -> String {
    let draft = prompt.rsplit("INPUT:\n").next().unwrap_or_default().trim();
    serde_json::json!({ "policy_document": draft }).to_string()
}

pub fn sdk_calls(calls: &[(&str, &str, &str)]) -> String {
    let calls: Vec<serde_json::Value> = calls
        .iter()
        .map(|(service, action, resource)| {
            serde_json::json!({
                "service": service,
                "action": action,
                "resource": resource,
                "reasoning": "client call in source",
            })
        })
        .collect();
    serde_json::json!({ "sdk_calls": calls }).to_string()
}

pub fn service_names(names: &[&str]) -> String {
    serde_json::json!({ "service_names": names }).to_string()
}
