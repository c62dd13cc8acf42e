use async_trait::async_trait;
use iam_clients::{CompletionModel, RerankHit, Reranker, ResponseFormat};
use std::sync::Mutex;

type ScoreFn = Box<dyn Fn(&str) -> f64 + Send + Sync>;
type ReplyFn = Box<dyn Fn(&str, &str) -> iam_clients::Result<String> + Send + Sync>;

/// Scores every document with a closure over its text.
pub struct ScoredReranker {
    score: ScoreFn,
    queries: Mutex<Vec<String>>,
}

impl ScoredReranker {
    pub fn new(score: impl Fn(&str) -> f64 + Send + Sync + 'static) -> Self {
        Self {
            score: Box::new(score),
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.queries.lock().unwrap().len()
    }

    pub fn last_query(&self) -> Option<String> {
        self.queries.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl Reranker for ScoredReranker {
    async fn rerank(
        &self,
        query: &str,
        documents: &[String],
        _top_n: Option<usize>,
    ) -> iam_clients::Result<Vec<RerankHit>> {
        self.queries.lock().unwrap().push(query.to_string());
        Ok(documents
            .iter()
            .enumerate()
            .map(|(index, doc)| RerankHit {
                index,
                relevance_score: (self.score)(doc),
            })
            .collect())
    }
}

/// Replies with a closure over `(prompt, shape name)` and records each shape.
pub struct ScriptedModel {
    reply: ReplyFn,
    shapes: Mutex<Vec<String>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    pub fn new(
        reply: impl Fn(&str, &str) -> iam_clients::Result<String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            reply: Box::new(reply),
            shapes: Mutex::new(Vec::new()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self, shape: &str) -> usize {
        self.shapes
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.as_str() == shape)
            .count()
    }

    pub fn total_calls(&self) -> usize {
        self.shapes.lock().unwrap().len()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionModel for ScriptedModel {
    async fn complete(&self, prompt: &str, format: &ResponseFormat) -> iam_clients::Result<String> {
        self.shapes.lock().unwrap().push(format.name.clone());
        self.prompts.lock().unwrap().push(prompt.to_string());
        (self.reply)(prompt, &format.name)
    }
}

