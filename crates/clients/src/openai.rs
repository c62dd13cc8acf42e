use crate::error::{ClientError, Result};
use crate::http::{build_client, read_json, trim_base_url};
use crate::{CompletionModel, ResponseFormat};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

pub const DEFAULT_OPENAI_API_URL: &str = "https://api.openai.com";
pub const DEFAULT_COMPLETION_MODEL: &str = "gpt-4o-mini";

const SERVICE: &str = "openai";

#[derive(Clone)]
pub struct OpenAiClient {
    http: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
}

#[derive(Deserialize)]
struct ChatCompletion {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
    refusal: Option<String>,
}

impl OpenAiClient {
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(ClientError::InvalidConfig(
                "OpenAI API key must be non-empty".to_string(),
            ));
        }
        Ok(Self {
            http: build_client()?,
            api_url: DEFAULT_OPENAI_API_URL.to_string(),
            api_key,
            model: DEFAULT_COMPLETION_MODEL.to_string(),
        })
    }

    #[must_use]
    pub fn with_api_url(mut self, api_url: &str) -> Self {
        self.api_url = trim_base_url(api_url);
        self
    }

    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    fn request_body(&self, prompt: &str, format: &ResponseFormat) -> serde_json::Value {
        json!({
            "model": self.model,
            "n": 1,
            "messages": [{"role": "user", "content": prompt}],
            "response_format": {
                "type": "json_schema",
                "json_schema": {
                    "name": format.name,
                    "strict": true,
                    "schema": format.schema,
                }
            }
        })
    }
}

#[async_trait]
impl CompletionModel for OpenAiClient {
    async fn complete(&self, prompt: &str, format: &ResponseFormat) -> Result<String> {
        log::debug!(
            "Invoking openai structured completion model={} shape={}",
            self.model,
            format.name
        );
        let response = self
            .http
            .post(format!("{}/v1/chat/completions", self.api_url))
            .bearer_auth(&self.api_key)
            .json(&self.request_body(prompt, format))
            .send()
            .await
            .map_err(ClientError::transport(SERVICE))?;
        let completion: ChatCompletion = read_json(SERVICE, response).await?;

        let Some(choice) = completion.choices.into_iter().next() else {
            return Err(ClientError::invalid(SERVICE, "completion has no choices"));
        };
        if let Some(refusal) = choice.message.refusal.filter(|r| !r.trim().is_empty()) {
            return Err(ClientError::invalid(
                SERVICE,
                format!("model refused the request: {refusal}"),
            ));
        }
        let content = choice
            .message
            .content
            .ok_or_else(|| ClientError::invalid(SERVICE, "completion message has no content"))?;
        log::debug!(
            "Received openai completion shape={} chars={}",
            format.name,
            content.len()
        );
        Ok(content)
    }
}
