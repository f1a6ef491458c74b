use crate::error::BackendError;
use crate::models::catalog::{ImageBackendFamily, RemoteSource};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A loaded inference engine for one model
///
/// `complete` is blocking and may take seconds; the lifecycle manager calls it
/// from a blocking task.
pub trait ModelBackend: Send + Sync {
    /// Run a single-turn chat completion
    fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, BackendError>;
}

/// Builds backends from catalog coordinates
pub trait BackendLoader: Send + Sync {
    /// Text model from Hub coordinates
    fn load_text(
        &self,
        source: &RemoteSource,
        n_ctx: u32,
    ) -> Result<Arc<dyn ModelBackend>, BackendError>;

    /// Vision projector for an image family; built before the model itself
    fn load_chat_handler(
        &self,
        family: ImageBackendFamily,
        projector: &RemoteSource,
    ) -> Result<ChatHandler, BackendError>;

    /// Multimodal model bound to a chat handler
    fn load_image(
        &self,
        source: &RemoteSource,
        handler: ChatHandler,
        n_ctx: u32,
    ) -> Result<Arc<dyn ModelBackend>, BackendError>;

    /// Model file already on disk
    fn load_local(&self, path: &Path, n_ctx: u32) -> Result<Arc<dyn ModelBackend>, BackendError>;
}

/// Multimodal chat handler: image family plus its resolved projector file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatHandler {
    pub family: ImageBackendFamily,
    pub projector: PathBuf,
}

/// OpenAI-style chat request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: MessageContent,
}

/// Either a plain string or a list of typed parts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

impl ChatRequest {
    /// Single user message, with an image part when `image` is given
    #[must_use]
    pub fn user(message: &str, image: Option<&str>) -> Self {
        let content = match image {
            Some(url) => MessageContent::Parts(vec![
                ContentPart::Text {
                    text: message.to_string(),
                },
                ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: url.to_string(),
                    },
                },
            ]),
            None => MessageContent::Text(message.to_string()),
        };

        Self {
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content,
            }],
        }
    }

    /// Whether any message carries an image part
    #[must_use]
    pub fn has_image(&self) -> bool {
        self.messages.iter().any(|m| match &m.content {
            MessageContent::Parts(parts) => parts
                .iter()
                .any(|p| matches!(p, ContentPart::ImageUrl { .. })),
            MessageContent::Text(_) => false,
        })
    }
}

/// OpenAI-style chat response; unknown fields are ignored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub choices: Vec<Choice>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Choice {
    pub message: ResponseMessage,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseMessage {
    #[serde(default)]
    pub content: Option<String>,
}

impl ChatResponse {
    /// Response with a single assistant choice
    #[must_use]
    pub fn with_content(content: impl Into<String>) -> Self {
        Self {
            choices: vec![Choice {
                message: ResponseMessage {
                    content: Some(content.into()),
                },
            }],
        }
    }

    /// Content of the first choice
    pub fn into_first_content(self) -> Result<String, BackendError> {
        self.choices
            .into_iter()
            .next()
            .ok_or_else(|| BackendError::InvalidResponse("response has no choices".to_string()))?
            .message
            .content
            .ok_or_else(|| BackendError::InvalidResponse("first choice has no content".to_string()))
    }
}
