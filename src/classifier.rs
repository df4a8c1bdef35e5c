//! Remote image-to-text service.
//!
//! The worker thread calls [`ClassificationClient::classify`] synchronously;
//! the call may take seconds and may fail. Failures are reported as
//! [`ClassifyError`] and handled by the caller.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::config::Config;

/// Environment variable holding the service key.
pub const API_KEY_VAR: &str = "MISTRAL_API_KEY";

#[derive(Error, Debug)]
pub enum ClassifyError {
    #[error("no API key configured (set MISTRAL_API_KEY)")]
    MissingApiKey,

    #[error("HTTP {code}: {body}")]
    Status { code: u16, body: String },

    #[error("network error: {0}")]
    Transport(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("could not encode drawing: {0}")]
    Encode(#[from] image::ImageError),
}

pub trait ClassificationClient: Send + Sync {
    /// Name what `png` shows, following `prompt`. Returns the raw text.
    fn classify(&self, png: &[u8], prompt: &str) -> Result<String, ClassifyError>;
}

// ============================================================================
// Chat-completions wire types
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: Vec<ContentPart<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: String },
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

/// Vision chat-completions client (Mistral API shape).
#[derive(Debug, Clone)]
pub struct MistralClient {
    endpoint: String,
    model: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl MistralClient {
    pub fn new(endpoint: String, model: String, api_key: Option<String>, timeout: Duration) -> Self {
        Self {
            endpoint,
            model,
            api_key,
            timeout,
        }
    }

    /// Client configured from `config`, key taken from the environment.
    pub fn from_config(config: &Config) -> Self {
        let api_key = std::env::var(API_KEY_VAR).ok().filter(|k| !k.trim().is_empty());
        Self::new(
            config.endpoint.clone(),
            config.model.clone(),
            api_key,
            config.request_timeout(),
        )
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    fn request_body<'a>(&'a self, png: &[u8], prompt: &'a str) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.model,
            temperature: 0.0,
            messages: vec![ChatMessage {
                role: "user",
                content: vec![
                    ContentPart::Text { text: prompt },
                    ContentPart::ImageUrl {
                        image_url: png_data_url(png),
                    },
                ],
            }],
        }
    }
}

impl ClassificationClient for MistralClient {
    fn classify(&self, png: &[u8], prompt: &str) -> Result<String, ClassifyError> {
        let api_key = self.api_key.as_deref().ok_or(ClassifyError::MissingApiKey)?;
        let body = self.request_body(png, prompt);

        let response = ureq::post(&self.endpoint)
            .set("authorization", &format!("Bearer {}", api_key))
            .set("content-type", "application/json")
            .timeout(self.timeout)
            .send_json(&body);

        match response {
            Ok(resp) => {
                let parsed: ChatResponse = resp
                    .into_json()
                    .map_err(|e| ClassifyError::InvalidResponse(e.to_string()))?;
                extract_text(parsed)
            }
            Err(ureq::Error::Status(code, resp)) => Err(ClassifyError::Status {
                code,
                body: resp.into_string().unwrap_or_default(),
            }),
            Err(ureq::Error::Transport(e)) => Err(ClassifyError::Transport(e.to_string())),
        }
    }
}

fn extract_text(response: ChatResponse) -> Result<String, ClassifyError> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| ClassifyError::InvalidResponse("no choices in response".to_string()))
}

pub fn png_data_url(png: &[u8]) -> String {
    format!("data:image/png;base64,{}", BASE64.encode(png))
}
