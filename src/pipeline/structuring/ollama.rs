use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::types::{LlmClient, VisionClient};
use super::StructuringError;

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

/// Ollama HTTP client for local LLM and vision inference.
///
/// Uses the blocking reqwest client: call it from `spawn_blocking` or a
/// plain thread, never directly on an async executor.
pub struct OllamaClient {
    base_url: String,
    client: reqwest::blocking::Client,
    timeout_secs: u64,
}

impl OllamaClient {
    pub fn new(base_url: &str, timeout_secs: u64) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "HTTP client builder failed, using defaults");
                reqwest::blocking::Client::new()
            });

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            timeout_secs,
        }
    }

    /// localhost:11434 with a 5-minute timeout.
    pub fn default_local() -> Self {
        Self::new(DEFAULT_OLLAMA_URL, 300)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn map_send_error(&self, e: reqwest::Error) -> StructuringError {
        if e.is_connect() {
            StructuringError::OllamaConnection(self.base_url.clone())
        } else if e.is_timeout() {
            StructuringError::HttpClient(format!("Request timed out after {}s", self.timeout_secs))
        } else {
            StructuringError::HttpClient(e.to_string())
        }
    }

    fn post_json<B: Serialize, R: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<R, StructuringError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(StructuringError::OllamaError {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json()
            .map_err(|e| StructuringError::ResponseParsing(e.to_string()))
    }
}

/// Request body for /api/generate
#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    system: &'a str,
    stream: bool,
    options: GenerationOptions,
}

/// Deterministic output for extraction.
#[derive(Serialize)]
struct GenerationOptions {
    temperature: f32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

/// Request body for /api/chat. Vision models expect images on a user message.
#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
    options: GenerationOptions,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    images: Option<&'a [String]>,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

#[derive(Deserialize)]
struct TagsResponse {
    models: Vec<TagModel>,
}

#[derive(Deserialize)]
struct TagModel {
    name: String,
}

impl LlmClient for OllamaClient {
    fn generate(&self, model: &str, prompt: &str, system: &str) -> Result<String, StructuringError> {
        let body = GenerateRequest {
            model,
            prompt,
            system,
            stream: false,
            options: GenerationOptions { temperature: 0.0 },
        };
        let parsed: GenerateResponse = self.post_json("/api/generate", &body)?;
        Ok(parsed.response)
    }

    fn is_model_available(&self, model: &str) -> Result<bool, StructuringError> {
        let models = self.list_models()?;
        Ok(models.iter().any(|m| m.starts_with(model)))
    }

    fn list_models(&self) -> Result<Vec<String>, StructuringError> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(StructuringError::OllamaError {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: TagsResponse = response
            .json()
            .map_err(|e| StructuringError::ResponseParsing(e.to_string()))?;
        Ok(parsed.models.into_iter().map(|m| m.name).collect())
    }
}

impl VisionClient for OllamaClient {
    fn chat_with_images(
        &self,
        model: &str,
        prompt: &str,
        images: &[String],
        system: Option<&str>,
    ) -> Result<String, StructuringError> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = system {
            messages.push(ChatMessage {
                role: "system",
                content: system,
                images: None,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: prompt,
            images: Some(images),
        });

        let body = ChatRequest {
            model,
            messages,
            stream: false,
            options: GenerationOptions { temperature: 0.0 },
        };
        let parsed: ChatResponse = self.post_json("/api/chat", &body)?;
        Ok(parsed.message.content)
    }
}

// ──────────────────────────────────────────────
// Mocks
// ──────────────────────────────────────────────

/// Mock LLM client returning a configurable response.
pub struct MockLlmClient {
    response: String,
    available_models: Vec<String>,
    fail: bool,
    calls: AtomicUsize,
}

impl MockLlmClient {
    pub fn new(response: &str) -> Self {
        Self {
            response: response.to_string(),
            available_models: vec!["qwen2.5:7b".to_string()],
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    /// Every call fails with a connection error.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new("")
        }
    }

    pub fn with_models(mut self, models: Vec<String>) -> Self {
        self.available_models = models;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn respond(&self) -> Result<String, StructuringError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            Err(StructuringError::OllamaConnection(DEFAULT_OLLAMA_URL.to_string()))
        } else {
            Ok(self.response.clone())
        }
    }
}

impl LlmClient for MockLlmClient {
    fn generate(&self, _model: &str, _prompt: &str, _system: &str) -> Result<String, StructuringError> {
        self.respond()
    }

    fn is_model_available(&self, model: &str) -> Result<bool, StructuringError> {
        Ok(self.available_models.iter().any(|m| m.starts_with(model)))
    }

    fn list_models(&self) -> Result<Vec<String>, StructuringError> {
        Ok(self.available_models.clone())
    }
}

/// Mock vision client; the same response for every image.
pub struct MockVisionClient {
    inner: MockLlmClient,
}

impl MockVisionClient {
    pub fn new(response: &str) -> Self {
        Self {
            inner: MockLlmClient::new(response).with_models(vec!["qwen2.5vl:7b".to_string()]),
        }
    }

    pub fn failing() -> Self {
        Self {
            inner: MockLlmClient::failing().with_models(vec!["qwen2.5vl:7b".to_string()]),
        }
    }

    pub fn with_models(mut self, models: Vec<String>) -> Self {
        self.inner = self.inner.with_models(models);
        self
    }

    pub fn calls(&self) -> usize {
        self.inner.calls()
    }
}

impl LlmClient for MockVisionClient {
    fn generate(&self, model: &str, prompt: &str, system: &str) -> Result<String, StructuringError> {
        self.inner.generate(model, prompt, system)
    }

    fn is_model_available(&self, model: &str) -> Result<bool, StructuringError> {
        self.inner.is_model_available(model)
    }

    fn list_models(&self) -> Result<Vec<String>, StructuringError> {
        self.inner.list_models()
    }
}

impl VisionClient for MockVisionClient {
    fn chat_with_images(
        &self,
        _model: &str,
        _prompt: &str,
        images: &[String],
        _system: Option<&str>,
    ) -> Result<String, StructuringError> {
        if images.is_empty() {
            return Err(StructuringError::MalformedResponse("no image supplied".into()));
        }
        self.inner.respond()
    }
}
