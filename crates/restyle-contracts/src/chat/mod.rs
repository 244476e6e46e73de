mod classifier;

pub use classifier::{classify, Route, EDIT_KEYWORDS};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Model,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::User => "user",
            ChatRole::Model => "model",
        }
    }
}

/// A shoppable suggestion attached to a model reply. Field names follow
/// the structured-response wire schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub item_name: String,
    pub description: String,
    pub purchase_link: String,
}

/// One transcript entry. The transcript is append-only and owned by the
/// orchestrator; it is reset wholesale on every new upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub products: Vec<Product>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
            products: Vec::new(),
        }
    }

    pub fn model(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Model,
            content: content.into(),
            products: Vec::new(),
        }
    }

    pub fn model_with_products(content: impl Into<String>, products: Vec<Product>) -> Self {
        Self {
            role: ChatRole::Model,
            content: content.into(),
            products,
        }
    }
}
