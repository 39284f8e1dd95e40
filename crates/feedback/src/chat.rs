use crate::error::{FeedbackError, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::env;
use std::time::Duration;

pub const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_API_KEY_ENV: &str = "OPENAI_API_KEY";
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Connection settings for the external completion service.
#[derive(Clone, Debug)]
pub struct CompletionConfig {
    pub base_url: String,
    pub model: String,
    pub api_key_env: String,
    pub timeout: Duration,
}

impl CompletionConfig {
    pub fn from_env() -> Self {
        let base_url = env::var("CIVIC_CHAT_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        let model =
            env::var("CIVIC_CHAT_MODEL").unwrap_or_else(|_| DEFAULT_CHAT_MODEL.to_string());
        let timeout = env::var("CIVIC_CHAT_TIMEOUT_SECS")
            .ok()
            .and_then(|raw| raw.parse::<u64>().ok())
            .map_or(Duration::from_secs(DEFAULT_TIMEOUT_SECS), Duration::from_secs);
        Self {
            base_url,
            model,
            api_key_env: DEFAULT_API_KEY_ENV.to_string(),
            timeout,
        }
    }
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

/// Ordered, role-tagged completion input. Content is either plain text
/// or parts mixing text with one inlined image data-URL.
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: MessageContent,
}

#[derive(Debug, Clone)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone)]
pub enum ContentPart {
    Text(String),
    ImageUrl(String),
}

impl ChatMessage {
    #[must_use]
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: "system",
            content: MessageContent::Text(text.into()),
        }
    }

    #[must_use]
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: "user",
            content: MessageContent::Text(text.into()),
        }
    }

    #[must_use]
    pub fn user_with_image(text: impl Into<String>, image_data_url: impl Into<String>) -> Self {
        Self {
            role: "user",
            content: MessageContent::Parts(vec![
                ContentPart::Text(text.into()),
                ContentPart::ImageUrl(image_data_url.into()),
            ]),
        }
    }

    fn to_value(&self) -> Value {
        match &self.content {
            MessageContent::Text(text) => json!({ "role": self.role, "content": text }),
            MessageContent::Parts(parts) => {
                let parts: Vec<Value> = parts
                    .iter()
                    .map(|part| match part {
                        ContentPart::Text(text) => json!({ "type": "text", "text": text }),
                        ContentPart::ImageUrl(url) => json!({
                            "type": "image_url",
                            "image_url": { "url": url, "detail": "high" }
                        }),
                    })
                    .collect();
                json!({ "role": self.role, "content": parts })
            }
        }
    }
}

/// Per-call generation settings.
#[derive(Debug, Clone, Copy)]
pub struct CompletionOptions {
    pub temperature: f32,
    pub max_tokens: u32,
    /// Ask the service for its structured-JSON response mode.
    pub json_mode: bool,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            temperature: 0.4,
            max_tokens: 500,
            json_mode: false,
        }
    }
}

/// Seam to the external completion service.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<String>;
}

/// OpenAI-compatible `/chat/completions` client.
///
/// Failures surface as [`FeedbackError::CompletionService`] and abort the
/// current turn only; session state is the caller's to keep.
pub struct HttpCompletionBackend {
    client: reqwest::Client,
    config: CompletionConfig,
}

impl HttpCompletionBackend {
    pub fn new(config: CompletionConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| {
                FeedbackError::CompletionService(format!("Failed to build HTTP client: {e}"))
            })?;
        Ok(Self { client, config })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(CompletionConfig::from_env())
    }

    fn url(&self) -> String {
        format!("{}/chat/completions", self.config.base_url)
    }

    fn auth_header(&self) -> Option<String> {
        env::var(&self.config.api_key_env)
            .ok()
            .map(|key| format!("Bearer {key}"))
    }
}

fn make_payload(model: &str, messages: &[ChatMessage], options: &CompletionOptions) -> Value {
    let mut payload = json!({
        "model": model,
        "messages": messages.iter().map(ChatMessage::to_value).collect::<Vec<_>>(),
        "temperature": options.temperature,
        "max_tokens": options.max_tokens,
    });
    if options.json_mode {
        payload["response_format"] = json!({ "type": "json_object" });
    }
    payload
}

fn parse_response_text(body: &str) -> Result<String> {
    let v: Value = serde_json::from_str(body).map_err(|e| {
        FeedbackError::CompletionService(format!("Failed to parse response JSON: {e}"))
    })?;

    if let Some(err) = v.get("error") {
        let message = err["message"].as_str().unwrap_or("Unknown error");
        return Err(FeedbackError::CompletionService(format!(
            "API error: {message}"
        )));
    }

    v["choices"][0]["message"]["content"]
        .as_str()
        .map(std::string::ToString::to_string)
        .ok_or_else(|| {
            FeedbackError::CompletionService("Completion returned no content".to_string())
        })
}

#[async_trait]
impl CompletionBackend for HttpCompletionBackend {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<String> {
        let payload = make_payload(&self.config.model, messages, options);

        let mut builder = self.client.post(self.url()).json(&payload);
        if let Some(auth) = self.auth_header() {
            builder = builder.header("Authorization", auth);
        }

        let response = builder.send().await.map_err(|e| {
            FeedbackError::CompletionService(format!("HTTP request failed: {e}"))
        })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            FeedbackError::CompletionService(format!("Failed to read response: {e}"))
        })?;

        if !status.is_success() {
            let detail = serde_json::from_str::<Value>(&body)
                .ok()
                .and_then(|v| {
                    v["error"]["message"]
                        .as_str()
                        .map(std::string::ToString::to_string)
                })
                .unwrap_or_else(|| format!("HTTP {status}: {body}"));
            return Err(FeedbackError::CompletionService(format!(
                "Chat completions error: {detail}"
            )));
        }

        parse_response_text(&body)
    }
}
