use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;

use serde_json::{json, Map, Value};
use thiserror::Error;
use uuid::Uuid;

use restyle_contracts::chat::{classify, ChatMessage, Route, EDIT_KEYWORDS};
use restyle_contracts::events::EventLog;
use restyle_contracts::styles::StyleCatalog;

pub mod gateway;

use gateway::{ChatReply, DesignGateway, GatewayError};

/// Fixed confirmation appended to the transcript after a successful
/// in-place refinement.
pub const REFINEMENT_CONFIRMATION: &str = "Here's the updated design.";

/// The uploaded photo for one session. Replaced wholesale on a new
/// upload, never mutated in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceImage {
    pub bytes: Vec<u8>,
    pub media_type: String,
}

#[derive(Debug, Error)]
pub enum EngineError {
    /// Bad file type or unreadable file. Raised locally, before any
    /// gateway contact.
    #[error("upload rejected: {reason}")]
    UploadRejected { reason: String },
    #[error("no design session; upload an image first")]
    NoSession,
    #[error("style \"{style}\" has no generated image yet")]
    StyleNotReady { style: String },
    #[error("style catalog is empty")]
    EmptyCatalog,
    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

/// Named export of the currently selected generated image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportArtifact {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Reads and validates an upload from disk. Rejections never reach the
/// gateway.
pub fn read_upload(path: &Path) -> Result<SourceImage, EngineError> {
    let Some(media_type) = mime_for_path(path) else {
        return Err(EngineError::UploadRejected {
            reason: format!("unsupported file type: {}", path.display()),
        });
    };
    let bytes = fs::read(path).map_err(|err| EngineError::UploadRejected {
        reason: format!("failed reading {}: {err}", path.display()),
    })?;
    Ok(SourceImage {
        bytes,
        media_type: media_type.to_string(),
    })
}

fn mime_for_path(path: &Path) -> Option<&'static str> {
    let ext = path
        .extension()
        .and_then(|value| value.to_str())
        .map(|value| value.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        _ => None,
    }
}

/// `ai-design-<style>.png`, with the style name lower-cased and runs of
/// whitespace turned into hyphens.
pub fn export_file_name(style: &str) -> String {
    format!("ai-design-{}.png", style_slug(style))
}

fn style_slug(style: &str) -> String {
    style
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<&str>>()
        .join("-")
}

/// Everything scoped to one uploaded photo. A fresh session (with a
/// fresh token) replaces the previous one on every upload; in-flight
/// results stamped with an older token are dropped instead of merged.
#[derive(Debug)]
struct Session {
    token: Uuid,
    source: SourceImage,
    generated: BTreeMap<String, Vec<u8>>,
    selected: Option<String>,
    transcript: Vec<ChatMessage>,
}

impl Session {
    fn new(token: Uuid, source: SourceImage) -> Self {
        Self {
            token,
            source,
            generated: BTreeMap::new(),
            selected: None,
            transcript: Vec::new(),
        }
    }
}

/// A worker's finished unit, delivered over the completion channel and
/// merged by [`Studio::poll`] on the owner's thread.
enum Completion {
    StyleGenerated {
        token: Uuid,
        style: String,
        result: Result<Vec<u8>, GatewayError>,
    },
    Refined {
        token: Uuid,
        style: String,
        result: Result<Vec<u8>, GatewayError>,
    },
    Replied {
        token: Uuid,
        result: Result<ChatReply, GatewayError>,
    },
}

/// The generation orchestrator. Owns all mutable session state and is
/// the single consumer of worker completions: workers only ever send
/// `(token, key, result)` triples back, so every read-modify-write of
/// the style map and the transcript happens on the caller's thread.
pub struct Studio {
    gateway: Arc<dyn DesignGateway>,
    catalog: StyleCatalog,
    keywords: Vec<String>,
    events: EventLog,
    completions_tx: mpsc::Sender<Completion>,
    completions_rx: mpsc::Receiver<Completion>,
    session: Option<Session>,
    error: Option<String>,
    caption: Option<String>,
    generating: bool,
    chat_pending: usize,
}

impl Studio {
    pub fn new(gateway: Arc<dyn DesignGateway>, catalog: StyleCatalog, events: EventLog) -> Self {
        let (completions_tx, completions_rx) = mpsc::channel();
        Self {
            gateway,
            catalog,
            keywords: EDIT_KEYWORDS.iter().map(|value| value.to_string()).collect(),
            events,
            completions_tx,
            completions_rx,
            session: None,
            error: None,
            caption: None,
            generating: false,
            chat_pending: 0,
        }
    }

    pub fn with_keywords(mut self, keywords: Vec<String>) -> Self {
        self.keywords = keywords;
        self
    }

    /// Replaces the session wholesale and generates the catalog's first
    /// style synchronously. On success the remaining styles are
    /// launched as independent fire-and-forget workers; on failure the
    /// session has no selection and no entries, and the error is the
    /// blocking kind (re-upload to retry).
    pub fn upload(&mut self, source: SourceImage) -> Result<(), EngineError> {
        if !source.media_type.starts_with("image/") {
            return Err(EngineError::UploadRejected {
                reason: format!("unsupported media type: {}", source.media_type),
            });
        }
        let first = self
            .catalog
            .first()
            .cloned()
            .ok_or(EngineError::EmptyCatalog)?;

        let token = Uuid::new_v4();
        self.session = Some(Session::new(token, source.clone()));
        self.error = None;
        self.chat_pending = 0;
        self.generating = true;
        self.caption = Some(format!("Generating {} style...", first.name));
        self.note(
            token,
            "session_started",
            json!({
                "media_type": source.media_type,
                "styles": self.catalog.len(),
            }),
        );

        let result = self.gateway.generate_styled_image(&source, &first.prompt);
        self.generating = false;
        self.caption = None;

        match result {
            Ok(bytes) => {
                if let Some(session) = self.session.as_mut() {
                    session.generated.insert(first.name.clone(), bytes);
                    session.selected = Some(first.name.clone());
                }
                self.note(token, "first_style_ready", json!({ "style": first.name }));
                self.launch_background(token, &source);
                Ok(())
            }
            Err(err) => {
                let message = err.to_string();
                self.note(token, "first_style_failed", json!({ "error": message }));
                self.error = Some(message);
                Err(err.into())
            }
        }
    }

    fn launch_background(&self, token: Uuid, source: &SourceImage) {
        for style in self.catalog.iter().skip(1) {
            let gateway = Arc::clone(&self.gateway);
            let tx = self.completions_tx.clone();
            let source = source.clone();
            let style = style.clone();
            let style_name = style.name.clone();
            let spawned = thread::Builder::new()
                .name(format!("style-gen-{}", style_slug(&style.name)))
                .spawn(move || {
                    let result = gateway.generate_styled_image(&source, &style.prompt);
                    let _ = tx.send(Completion::StyleGenerated {
                        token,
                        style: style.name,
                        result,
                    });
                });
            if let Err(err) = spawned {
                self.note(
                    token,
                    "style_generation_failed",
                    json!({
                        "style": style_name,
                        "error": format!("worker spawn failed: {err}"),
                    }),
                );
            }
        }
    }

    /// Pure state change; only styles that already have a generated
    /// entry can be selected.
    pub fn select_style(&mut self, name: &str) -> Result<(), EngineError> {
        let Some(session) = self.session.as_mut() else {
            return Err(EngineError::NoSession);
        };
        if !session.generated.contains_key(name) {
            return Err(EngineError::StyleNotReady {
                style: name.to_string(),
            });
        }
        session.selected = Some(name.to_string());
        Ok(())
    }

    /// Appends the user message optimistically and launches one chat
    /// worker. Overlapping submissions are accepted: nothing queues or
    /// guards a second message sent before the first resolves.
    pub fn send_message(&mut self, text: &str) -> Result<(), EngineError> {
        let Some(session) = self.session.as_mut() else {
            return Err(EngineError::NoSession);
        };
        let token = session.token;
        session.transcript.push(ChatMessage::user(text));
        self.chat_pending += 1;

        let route = classify(text, self.keywords.iter().map(String::as_str));
        let edit_target = match route {
            Route::Edit => session.selected.clone().and_then(|style| {
                session
                    .generated
                    .get(&style)
                    .map(|bytes| (style, bytes.clone()))
            }),
            Route::Chat => None,
        };

        let gateway = Arc::clone(&self.gateway);
        let tx = self.completions_tx.clone();
        let text = text.to_string();

        let spawned = if let Some((style, image)) = edit_target {
            self.caption = Some(format!("Refining image: {text}"));
            self.note(
                token,
                "chat_turn_started",
                json!({ "route": "edit", "style": style.clone() }),
            );
            thread::Builder::new()
                .name("chat-refine".to_string())
                .spawn(move || {
                    let result = gateway.refine_image(&image, &text);
                    let _ = tx.send(Completion::Refined {
                        token,
                        style,
                        result,
                    });
                })
        } else {
            // The just-appended user message travels as the latest
            // prompt, not as part of the history.
            let history_len = session.transcript.len() - 1;
            let history: Vec<ChatMessage> = session.transcript[..history_len].to_vec();
            let context = session
                .selected
                .as_ref()
                .and_then(|style| session.generated.get(style).cloned());
            self.note(token, "chat_turn_started", json!({ "route": "chat" }));
            thread::Builder::new()
                .name("chat-reply".to_string())
                .spawn(move || {
                    let result = gateway.chat(&history, &text, context.as_deref());
                    let _ = tx.send(Completion::Replied { token, result });
                })
        };

        if let Err(err) = spawned {
            self.chat_pending = self.chat_pending.saturating_sub(1);
            self.caption = None;
            if let Some(session) = self.session.as_mut() {
                session
                    .transcript
                    .push(ChatMessage::model(format!("worker spawn failed: {err}")));
            }
            self.note(
                token,
                "chat_reply_failed",
                json!({ "error": format!("worker spawn failed: {err}") }),
            );
        }
        Ok(())
    }

    /// Drains every completion currently sitting in the channel and
    /// merges it into the session. Never blocks. Returns the number of
    /// completions consumed (merged or dropped as stale).
    pub fn poll(&mut self) -> usize {
        let mut consumed = 0;
        while let Ok(completion) = self.completions_rx.try_recv() {
            self.apply(completion);
            consumed += 1;
        }
        consumed
    }

    fn apply(&mut self, completion: Completion) {
        let current = self.session.as_ref().map(|session| session.token);
        match completion {
            Completion::StyleGenerated {
                token,
                style,
                result,
            } => {
                if current != Some(token) {
                    self.note(
                        token,
                        "stale_result_dropped",
                        json!({ "kind": "style", "style": style }),
                    );
                    return;
                }
                match result {
                    Ok(bytes) => {
                        if let Some(session) = self.session.as_mut() {
                            session.generated.insert(style.clone(), bytes);
                        }
                        self.note(token, "style_ready", json!({ "style": style }));
                    }
                    Err(err) => {
                        // Swallowed: the style simply stays unavailable.
                        self.note(
                            token,
                            "style_generation_failed",
                            json!({ "style": style, "error": err.to_string() }),
                        );
                    }
                }
            }
            Completion::Refined {
                token,
                style,
                result,
            } => {
                if current != Some(token) {
                    self.note(
                        token,
                        "stale_result_dropped",
                        json!({ "kind": "refinement", "style": style }),
                    );
                    return;
                }
                self.finish_chat_turn();
                match result {
                    Ok(bytes) => {
                        if let Some(session) = self.session.as_mut() {
                            session.generated.insert(style.clone(), bytes);
                            session
                                .transcript
                                .push(ChatMessage::model(REFINEMENT_CONFIRMATION));
                        }
                        self.note(token, "refinement_applied", json!({ "style": style }));
                    }
                    Err(err) => {
                        let message = err.to_string();
                        if let Some(session) = self.session.as_mut() {
                            session.transcript.push(ChatMessage::model(message.clone()));
                        }
                        self.note(
                            token,
                            "refinement_failed",
                            json!({ "style": style, "error": message }),
                        );
                    }
                }
            }
            Completion::Replied { token, result } => {
                if current != Some(token) {
                    self.note(token, "stale_result_dropped", json!({ "kind": "chat" }));
                    return;
                }
                self.finish_chat_turn();
                match result {
                    Ok(reply) => {
                        if let Some(session) = self.session.as_mut() {
                            session.transcript.push(ChatMessage::model_with_products(
                                reply.text,
                                reply.products,
                            ));
                        }
                        self.note(token, "chat_reply", Value::Object(Map::new()));
                    }
                    Err(err) => {
                        let message = err.to_string();
                        if let Some(session) = self.session.as_mut() {
                            session.transcript.push(ChatMessage::model(message.clone()));
                        }
                        self.note(token, "chat_reply_failed", json!({ "error": message }));
                    }
                }
            }
        }
    }

    fn finish_chat_turn(&mut self) {
        self.chat_pending = self.chat_pending.saturating_sub(1);
        if self.chat_pending == 0 {
            self.caption = None;
        }
    }

    /// Pure derivation of the download artifact; `None` when no style
    /// is selected.
    pub fn export_artifact(&self) -> Option<ExportArtifact> {
        let session = self.session.as_ref()?;
        let style = session.selected.as_ref()?;
        let bytes = session.generated.get(style)?;
        Some(ExportArtifact {
            file_name: export_file_name(style),
            bytes: bytes.clone(),
        })
    }

    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    pub fn session_token(&self) -> Option<Uuid> {
        self.session.as_ref().map(|session| session.token)
    }

    pub fn source(&self) -> Option<&SourceImage> {
        self.session.as_ref().map(|session| &session.source)
    }

    pub fn selected_style(&self) -> Option<&str> {
        self.session
            .as_ref()
            .and_then(|session| session.selected.as_deref())
    }

    pub fn generated_styles(&self) -> Vec<&str> {
        self.session
            .as_ref()
            .map(|session| session.generated.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    pub fn generated_image(&self, style: &str) -> Option<&[u8]> {
        self.session
            .as_ref()
            .and_then(|session| session.generated.get(style))
            .map(Vec::as_slice)
    }

    pub fn selected_image(&self) -> Option<&[u8]> {
        let session = self.session.as_ref()?;
        let style = session.selected.as_ref()?;
        session.generated.get(style).map(Vec::as_slice)
    }

    pub fn transcript(&self) -> &[ChatMessage] {
        self.session
            .as_ref()
            .map(|session| session.transcript.as_slice())
            .unwrap_or(&[])
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn caption(&self) -> Option<&str> {
        self.caption.as_deref()
    }

    pub fn is_generating(&self) -> bool {
        self.generating
    }

    pub fn chat_pending(&self) -> usize {
        self.chat_pending
    }

    pub fn catalog(&self) -> &StyleCatalog {
        &self.catalog
    }

    fn note(&self, token: Uuid, event_type: &str, payload: Value) {
        // Diagnostics only; a sink failure never fails the operation.
        let payload = payload.as_object().cloned().unwrap_or_default();
        let _ = self.events.emit(event_type, &token.to_string(), payload);
    }
}
