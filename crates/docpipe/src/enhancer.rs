//! Vision-language enhancement of extracted text.
//!
//! Enhancement is best-effort: every failure is turned into
//! [`Enhancement::Fallback`] carrying the unchanged input text, so callers
//! always hold usable text.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::EnhancerConfig;
use crate::error::ConfigError;
use crate::processor::InputKind;
use crate::task::OutputFormat;

/// Outcome of an enhancement attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Enhancement {
    /// The model's text, replacing the input.
    Enhanced(String),
    /// The original text plus the reason enhancement did not happen.
    Fallback { text: String, reason: String },
}

impl Enhancement {
    pub fn fallback(text: &str, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Enhancement::Fallback {
            text: text.to_string(),
            reason: if reason.trim().is_empty() {
                "unknown error".to_string()
            } else {
                reason
            },
        }
    }

    pub fn is_enhanced(&self) -> bool {
        matches!(self, Enhancement::Enhanced(_))
    }

    pub fn text(&self) -> &str {
        match self {
            Enhancement::Enhanced(text) => text,
            Enhancement::Fallback { text, .. } => text,
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Enhancement::Enhanced(_) => None,
            Enhancement::Fallback { reason, .. } => Some(reason),
        }
    }

    pub fn into_text(self) -> String {
        match self {
            Enhancement::Enhanced(text) => text,
            Enhancement::Fallback { text, .. } => text,
        }
    }
}

#[async_trait]
pub trait Enhancer: Send + Sync {
    async fn enhance(&self, path: &Path, current_text: &str, format: OutputFormat) -> Enhancement;

    async fn is_available(&self) -> bool;
}

/// Why an enhancement request did not produce text.
#[derive(Error, Debug)]
pub enum EnhanceError {
    #[error("timeout")]
    Timeout,

    #[error("request failed: {0}")]
    Request(#[source] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("failed to read image '{path}': {source}")]
    ReadImage {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl From<reqwest::Error> for EnhanceError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            EnhanceError::Timeout
        } else {
            EnhanceError::Request(e)
        }
    }
}

// ─── Wire types (OpenAI-compatible chat completions) ────────────────────────

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: MessageContent,
}

#[derive(Serialize)]
#[serde(untagged)]
enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

fn format_instruction(format: OutputFormat) -> &'static str {
    match format {
        OutputFormat::Json => {
            "Output ONLY valid JSON with keys: title, sections (array of {heading, content}), \
             tables (array of {headers, rows}), metadata."
        }
        OutputFormat::Markdown => {
            "Output clean, well-structured Markdown. Use proper headings (#, ##), bullet points, \
             and Markdown tables where appropriate."
        }
    }
}

fn system_prompt(format: OutputFormat) -> String {
    format!(
        "You are an expert document processing assistant. Your task is to:\n\
         1. Analyze the document image and the OCR-extracted text below.\n\
         2. Correct any OCR errors (especially for Chinese characters).\n\
         3. Reconstruct the document's logical structure.\n\
         4. {}\n\
         5. Preserve all original content. Do NOT summarize or omit information.",
        format_instruction(format)
    )
}

// ─── VisionEnhancer ─────────────────────────────────────────────────────────

/// Client for an OpenAI-compatible vision-language endpoint (e.g. Ollama).
pub struct VisionEnhancer {
    client: Client,
    api_base: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl VisionEnhancer {
    pub fn new(config: &EnhancerConfig) -> Result<Self, ConfigError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }

    async fn build_request(
        &self,
        path: &Path,
        current_text: &str,
        format: OutputFormat,
    ) -> Result<ChatRequest<'_>, EnhanceError> {
        let mut parts = Vec::new();

        // Only raster inputs are attached; PDFs go text-only
        if InputKind::from_path(path) == InputKind::Image {
            let bytes = tokio::fs::read(path)
                .await
                .map_err(|e| EnhanceError::ReadImage {
                    path: path.to_path_buf(),
                    source: e,
                })?;
            let mime = crate::processor::mime_type(path);
            let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
            parts.push(ContentPart::ImageUrl {
                image_url: ImageUrl {
                    url: format!("data:{};base64,{}", mime, encoded),
                },
            });
        }

        parts.push(ContentPart::Text {
            text: format!(
                "OCR extracted text:\n\n{}\n\nPlease process and output the result.",
                current_text
            ),
        });

        Ok(ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: MessageContent::Text(system_prompt(format)),
                },
                ChatMessage {
                    role: "user",
                    content: MessageContent::Parts(parts),
                },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        })
    }

    async fn request_enhancement(
        &self,
        path: &Path,
        current_text: &str,
        format: OutputFormat,
    ) -> Result<String, EnhanceError> {
        let request = self.build_request(path, current_text, format).await?;
        let url = format!("{}/chat/completions", self.api_base);

        let response = self.client.post(&url).json(&request).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EnhanceError::Status {
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| EnhanceError::MalformedResponse(e.to_string()))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| EnhanceError::MalformedResponse("no choices".to_string()))?;

        if content.trim().is_empty() {
            return Err(EnhanceError::MalformedResponse(
                "empty completion".to_string(),
            ));
        }

        Ok(content)
    }
}

#[async_trait]
impl Enhancer for VisionEnhancer {
    async fn enhance(&self, path: &Path, current_text: &str, format: OutputFormat) -> Enhancement {
        tracing::info!(model = %self.model, "Sending document for vision-language enhancement");

        match self.request_enhancement(path, current_text, format).await {
            Ok(text) => {
                tracing::info!(chars = text.chars().count(), "Enhancement complete");
                Enhancement::Enhanced(text)
            }
            Err(EnhanceError::Timeout) => {
                tracing::warn!("Enhancement timed out, falling back to extracted text");
                Enhancement::fallback(current_text, EnhanceError::Timeout.to_string())
            }
            Err(e) => {
                tracing::error!("Enhancement failed: {}", e);
                Enhancement::fallback(current_text, e.to_string())
            }
        }
    }

    async fn is_available(&self) -> bool {
        let url = format!("{}/models", self.api_base);
        match self.client.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }
}

/// Stand-in used when enhancement is switched off in configuration.
#[derive(Debug, Clone, Default)]
pub struct DisabledEnhancer;

#[async_trait]
impl Enhancer for DisabledEnhancer {
    async fn enhance(&self, _path: &Path, current_text: &str, _format: OutputFormat) -> Enhancement {
        Enhancement::fallback(current_text, "enhancer disabled")
    }

    async fn is_available(&self) -> bool {
        false
    }
}
