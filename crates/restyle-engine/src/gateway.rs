use std::io::Cursor;
use std::time::Duration;

use anyhow::Context;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::{Rgb, RgbImage};
use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use thiserror::Error;

use restyle_contracts::chat::{ChatMessage, Product};

use crate::SourceImage;

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_IMAGE_MODEL: &str = "gemini-2.5-flash-image";
pub const DEFAULT_TEXT_MODEL: &str = "gemini-2.5-flash";

const CHAT_SYSTEM_PREAMBLE: &str = "You are an expert interior design assistant. Your role is to \
analyze room images, answer user questions, and provide helpful suggestions. When asked for \
products, find shoppable links. Always format your reply within the specified JSON schema.";

/// Every gateway request is single-attempt: a failure is terminal for
/// that one request and retrying, if it happens at all, is the caller's
/// decision.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The service refused the request on content-policy grounds.
    #[error("request was blocked: {reason}")]
    Blocked { reason: String },
    /// The model answered with text where an image was expected. The
    /// text is carried verbatim to aid diagnosis.
    #[error("model returned a text response: \"{text}\"")]
    NoImage { text: String },
    /// Transport or protocol failure.
    #[error(transparent)]
    Upstream(#[from] anyhow::Error),
}

/// Structured chat result: a reply plus zero or more product
/// suggestions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatReply {
    pub text: String,
    pub products: Vec<Product>,
}

/// Explicit gateway configuration; constructed once at process start
/// and injected. No ambient credentials.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub api_key: String,
    pub api_base: String,
    pub image_model: String,
    pub text_model: String,
    pub request_timeout: Duration,
}

impl GatewayConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_base: DEFAULT_API_BASE.to_string(),
            image_model: DEFAULT_IMAGE_MODEL.to_string(),
            text_model: DEFAULT_TEXT_MODEL.to_string(),
            request_timeout: Duration::from_secs(90),
        }
    }
}

/// The three exchanges the orchestrator needs from the generative
/// model. Implementations must be shareable across the background
/// generation workers.
pub trait DesignGateway: Send + Sync {
    /// Restyles the uploaded photo according to a style prompt;
    /// exactly one image is expected back.
    fn generate_styled_image(
        &self,
        source: &SourceImage,
        style_prompt: &str,
    ) -> Result<Vec<u8>, GatewayError>;

    /// Edits a previously generated PNG according to a free-text
    /// instruction.
    fn refine_image(&self, image_png: &[u8], instruction: &str) -> Result<Vec<u8>, GatewayError>;

    /// Conversational turn over the full prior transcript, optionally
    /// grounded on the currently displayed image.
    fn chat(
        &self,
        history: &[ChatMessage],
        latest_prompt: &str,
        image_context: Option<&[u8]>,
    ) -> Result<ChatReply, GatewayError>;
}

/// REST client for the Gemini `generateContent` endpoint.
pub struct GeminiGateway {
    config: GatewayConfig,
    http: HttpClient,
}

impl GeminiGateway {
    pub fn new(mut config: GatewayConfig) -> Self {
        config.api_base = config.api_base.trim().trim_end_matches('/').to_string();
        if config.api_base.is_empty() {
            config.api_base = DEFAULT_API_BASE.to_string();
        }
        Self {
            config,
            http: HttpClient::new(),
        }
    }

    fn endpoint_for_model(&self, model: &str) -> String {
        let trimmed = model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!("{}/{}:generateContent", self.config.api_base, model_path)
    }

    fn post(&self, endpoint: &str, payload: &Value) -> Result<Value, GatewayError> {
        let response = self
            .http
            .post(endpoint)
            .query(&[("key", self.config.api_key.as_str())])
            .timeout(self.config.request_timeout)
            .json(payload)
            .send()
            .map_err(|raw| {
                GatewayError::Upstream(
                    anyhow::Error::new(raw).context(format!("Gemini request failed ({endpoint})")),
                )
            })?;
        response_json_or_error(response).map_err(GatewayError::Upstream)
    }

    fn request_image(&self, parts: Vec<Value>) -> Result<Vec<u8>, GatewayError> {
        let payload = json!({
            "contents": [{ "role": "user", "parts": parts }],
            "generationConfig": { "responseModalities": ["IMAGE"] },
        });
        let endpoint = self.endpoint_for_model(&self.config.image_model);
        let response = self.post(&endpoint, &payload)?;
        first_image_bytes(&response)
    }
}

impl DesignGateway for GeminiGateway {
    fn generate_styled_image(
        &self,
        source: &SourceImage,
        style_prompt: &str,
    ) -> Result<Vec<u8>, GatewayError> {
        self.request_image(vec![
            inline_image_part(&source.bytes, &source.media_type),
            json!({ "text": style_prompt }),
        ])
    }

    fn refine_image(&self, image_png: &[u8], instruction: &str) -> Result<Vec<u8>, GatewayError> {
        self.request_image(vec![
            inline_image_part(image_png, "image/png"),
            json!({ "text": instruction }),
        ])
    }

    fn chat(
        &self,
        history: &[ChatMessage],
        latest_prompt: &str,
        image_context: Option<&[u8]>,
    ) -> Result<ChatReply, GatewayError> {
        let mut parts = Vec::new();
        if let Some(bytes) = image_context {
            parts.push(inline_image_part(bytes, "image/png"));
        }
        parts.push(json!({ "text": chat_prompt_text(history, latest_prompt) }));

        let payload = json!({
            "contents": [{ "role": "user", "parts": parts }],
            "generationConfig": {
                "responseMimeType": "application/json",
                "responseSchema": chat_response_schema(),
            },
        });
        let endpoint = self.endpoint_for_model(&self.config.text_model);
        let response = self.post(&endpoint, &payload)?;
        let raw = first_text_part(&response).unwrap_or_default();
        Ok(parse_chat_reply(&raw))
    }
}

/// Offline stand-in: deterministic flat-color PNGs seeded from the
/// prompt and input bytes, canned chat replies. Lets the shell and the
/// orchestrator run without a key or network.
pub struct OfflineGateway;

impl DesignGateway for OfflineGateway {
    fn generate_styled_image(
        &self,
        source: &SourceImage,
        style_prompt: &str,
    ) -> Result<Vec<u8>, GatewayError> {
        flat_png(style_prompt, &source.bytes)
    }

    fn refine_image(&self, image_png: &[u8], instruction: &str) -> Result<Vec<u8>, GatewayError> {
        flat_png(instruction, image_png)
    }

    fn chat(
        &self,
        _history: &[ChatMessage],
        latest_prompt: &str,
        _image_context: Option<&[u8]>,
    ) -> Result<ChatReply, GatewayError> {
        Ok(ChatReply {
            text: format!("Offline mode: noted \"{latest_prompt}\"."),
            products: vec![Product {
                item_name: "Sample Floor Lamp".to_string(),
                description: "Placeholder suggestion emitted by the offline gateway.".to_string(),
                purchase_link: "https://example.com/floor-lamp".to_string(),
            }],
        })
    }
}

fn inline_image_part(bytes: &[u8], media_type: &str) -> Value {
    json!({
        "inlineData": {
            "mimeType": media_type,
            "data": BASE64.encode(bytes),
        }
    })
}

fn chat_prompt_text(history: &[ChatMessage], latest_prompt: &str) -> String {
    let transcript = history
        .iter()
        .map(|message| format!("{}: {}", message.role.as_str(), message.content))
        .collect::<Vec<String>>()
        .join("\n");
    format!(
        "{CHAT_SYSTEM_PREAMBLE}\n\nConversation history:\n{transcript}\n\nLatest user prompt: {latest_prompt}"
    )
}

fn chat_response_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "response": {
                "type": "STRING",
                "description": "The textual response to the user.",
            },
            "products": {
                "type": "ARRAY",
                "description": "A list of shoppable products mentioned or relevant to the conversation.",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "itemName": {
                            "type": "STRING",
                            "description": "Name of the furniture or decor item.",
                        },
                        "description": {
                            "type": "STRING",
                            "description": "A brief description of the item.",
                        },
                        "purchaseLink": {
                            "type": "STRING",
                            "description": "A URL to a retail page where a similar item can be purchased.",
                        },
                    },
                    "required": ["itemName", "description", "purchaseLink"],
                },
            },
        },
        "required": ["response"],
    })
}

/// Walks `candidates[].content.parts[]` for the first inline image. If
/// none is present, the failure is classified: a prompt-feedback block
/// reason wins, then any text the model sent instead.
fn first_image_bytes(response: &Value) -> Result<Vec<u8>, GatewayError> {
    for part in candidate_parts(response) {
        let inline = part
            .get("inlineData")
            .or_else(|| part.get("inline_data"))
            .and_then(Value::as_object);
        let Some(inline) = inline else { continue };
        let data = inline
            .get("data")
            .and_then(Value::as_str)
            .unwrap_or_default();
        if data.is_empty() {
            continue;
        }
        let bytes = BASE64
            .decode(data.as_bytes())
            .context("Gemini image base64 decode failed")
            .map_err(GatewayError::Upstream)?;
        return Ok(bytes);
    }

    if let Some(reason) = response
        .get("promptFeedback")
        .and_then(|feedback| feedback.get("blockReason"))
        .and_then(Value::as_str)
    {
        return Err(GatewayError::Blocked {
            reason: reason.to_string(),
        });
    }

    if let Some(text) = first_text_part(response) {
        return Err(GatewayError::NoImage { text });
    }

    Err(GatewayError::Upstream(anyhow::anyhow!(
        "Gemini returned neither an image nor diagnostic text"
    )))
}

fn first_text_part(response: &Value) -> Option<String> {
    candidate_parts(response)
        .into_iter()
        .find_map(|part| part.get("text").and_then(Value::as_str).map(str::to_string))
        .filter(|text| !text.is_empty())
}

fn candidate_parts(response: &Value) -> Vec<Value> {
    let candidates = response
        .get("candidates")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let mut out = Vec::new();
    for candidate in candidates {
        let parts = candidate
            .get("content")
            .and_then(Value::as_object)
            .and_then(|content| content.get("parts"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        out.extend(parts);
    }
    out
}

/// Decodes the structured chat body. A malformed body degrades to the
/// raw text with no products; this is a success path, not an error.
pub fn parse_chat_reply(raw: &str) -> ChatReply {
    let parsed = serde_json::from_str::<Value>(raw)
        .ok()
        .and_then(|value| value.as_object().cloned());
    let Some(object) = parsed else {
        let text = if raw.is_empty() {
            "I'm sorry, I encountered an error.".to_string()
        } else {
            raw.to_string()
        };
        return ChatReply {
            text,
            products: Vec::new(),
        };
    };

    let text = object
        .get("response")
        .and_then(Value::as_str)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| "I'm sorry, I couldn't process that request.".to_string());
    let products = object
        .get("products")
        .and_then(Value::as_array)
        .map(|rows| {
            rows.iter()
                .filter_map(|row| serde_json::from_value::<Product>(row.clone()).ok())
                .collect()
        })
        .unwrap_or_default();
    ChatReply { text, products }
}

fn response_json_or_error(response: HttpResponse) -> anyhow::Result<Value> {
    let status = response.status();
    let code = status.as_u16();
    let body = response
        .text()
        .context("Gemini response body read failed")?;
    if !status.is_success() {
        anyhow::bail!(
            "Gemini request failed ({code}): {}",
            truncate_text(&body, 512)
        );
    }
    let parsed: Value =
        serde_json::from_str(&body).context("Gemini returned invalid JSON payload")?;
    Ok(parsed)
}

fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

fn flat_png(seed_text: &str, seed_bytes: &[u8]) -> Result<Vec<u8>, GatewayError> {
    let mut hasher = Sha256::new();
    hasher.update(seed_text.as_bytes());
    hasher.update(seed_bytes);
    let digest = hasher.finalize();

    let mut canvas = RgbImage::new(64, 64);
    for pixel in canvas.pixels_mut() {
        *pixel = Rgb([digest[0], digest[1], digest[2]]);
    }
    let mut out = Cursor::new(Vec::new());
    canvas
        .write_to(&mut out, image::ImageFormat::Png)
        .context("offline PNG encode failed")
        .map_err(GatewayError::Upstream)?;
    Ok(out.into_inner())
}
