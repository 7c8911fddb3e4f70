use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::types::LlmClient;
use super::StructuringError;

pub const DEFAULT_OPENAI_URL: &str = "https://api.openai.com";

/// Client for OpenAI-compatible `/v1/chat/completions` endpoints.
///
/// Blocking, like [`super::ollama::OllamaClient`].
pub struct OpenAiClient {
    base_url: String,
    api_key: String,
    client: reqwest::blocking::Client,
    max_tokens: u32,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: [Message<'a>; 2],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ModelsResponse {
    data: Vec<ModelEntry>,
}

#[derive(Deserialize)]
struct ModelEntry {
    id: String,
}

impl OpenAiClient {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "HTTP client builder failed, using defaults");
                reqwest::blocking::Client::new()
            });
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            client,
            max_tokens: 1000,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn check_status(
        response: reqwest::blocking::Response,
    ) -> Result<reqwest::blocking::Response, StructuringError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().unwrap_or_default();
        Err(StructuringError::RemoteApi {
            status: status.as_u16(),
            body,
        })
    }
}

impl LlmClient for OpenAiClient {
    fn generate(&self, model: &str, prompt: &str, system: &str) -> Result<String, StructuringError> {
        let body = CompletionRequest {
            model,
            messages: [
                Message {
                    role: "system",
                    content: system,
                },
                Message {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: 0.1,
            max_tokens: self.max_tokens,
        };

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .map_err(|e| StructuringError::HttpClient(e.to_string()))?;

        let parsed: CompletionResponse = Self::check_status(response)?
            .json()
            .map_err(|e| StructuringError::ResponseParsing(e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .ok_or_else(|| StructuringError::MalformedResponse("Completion has no content".into()))
    }

    fn is_model_available(&self, model: &str) -> Result<bool, StructuringError> {
        Ok(self.list_models()?.iter().any(|m| m == model))
    }

    fn list_models(&self) -> Result<Vec<String>, StructuringError> {
        let response = self
            .client
            .get(format!("{}/v1/models", self.base_url))
            .bearer_auth(&self.api_key)
            .send()
            .map_err(|e| StructuringError::HttpClient(e.to_string()))?;

        let parsed: ModelsResponse = Self::check_status(response)?
            .json()
            .map_err(|e| StructuringError::ResponseParsing(e.to_string()))?;
        Ok(parsed.data.into_iter().map(|m| m.id).collect())
    }
}
