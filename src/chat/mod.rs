//! Stateless chat-completion proxy.
//!
//! One system turn plus one user turn in, one completion out. No history,
//! no streaming, no retries.

mod azure;

pub use azure::AzureOpenAiBackend;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::{ConfigError, OpenAiSettings, Settings};

// ===== Errors =====

/// Failure reported by a completion backend
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error [{status}]: {message}")]
    Api { status: u16, message: String },

    #[error("response carried no message content")]
    EmptyResponse,
}

/// Errors returned by [`ChatProxy::chat`]
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    /// Rejected before any network call
    #[error("{0}")]
    Validation(String),

    #[error("OpenAI API Error: {0}")]
    Provider(#[from] BackendError),
}

// ===== Request Types =====

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// A completion request with the model parameters already applied
#[derive(Debug, Clone, Serialize)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub max_completion_tokens: u32,
    pub temperature: f32,
}

/// A chat-completion provider
#[async_trait]
pub trait ChatBackend: Send + Sync + std::fmt::Debug {
    /// Model or deployment the backend talks to
    fn model_id(&self) -> &str;

    /// Run one completion and return the reply text
    async fn complete(&self, request: CompletionRequest) -> Result<String, BackendError>;
}

/// Validates the two turns and forwards them to a [`ChatBackend`]
#[derive(Debug, Clone)]
pub struct ChatProxy {
    backend: Arc<dyn ChatBackend>,
    max_tokens: u32,
    temperature: f32,
}

impl ChatProxy {
    pub fn new(backend: Arc<dyn ChatBackend>, max_tokens: u32, temperature: f32) -> Self {
        Self {
            backend,
            max_tokens,
            temperature,
        }
    }

    /// Proxy over Azure OpenAI, configured from settings
    pub fn from_settings(settings: &Settings) -> Result<Self, ConfigError> {
        let backend = AzureOpenAiBackend::from_settings(settings)?;
        let OpenAiSettings {
            max_tokens,
            temperature,
            ..
        } = &settings.openai;
        Ok(Self::new(Arc::new(backend), *max_tokens, *temperature))
    }

    /// Build the `[system, user]` exchange, rejecting missing or blank turns
    pub fn build_messages(system_message: &str, user_message: &str) -> Result<Vec<ChatMessage>, ChatError> {
        if system_message.trim().is_empty() || user_message.trim().is_empty() {
            return Err(ChatError::Validation(
                "Both system_message and user_message cannot be empty.".to_string(),
            ));
        }
        Ok(vec![
            ChatMessage::system(system_message),
            ChatMessage::user(user_message),
        ])
    }

    /// Send one system and one user turn, return the completion text
    pub async fn chat(&self, system_message: &str, user_message: &str) -> Result<String, ChatError> {
        let messages = Self::build_messages(system_message, user_message)?;

        let request = CompletionRequest {
            messages,
            max_completion_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        match self.backend.complete(request).await {
            Ok(reply) => {
                tracing::debug!(model = %self.backend.model_id(), chars = reply.len(), "Chat completion");
                Ok(reply)
            }
            Err(e) => {
                tracing::warn!(model = %self.backend.model_id(), "Chat completion failed: {}", e);
                Err(ChatError::Provider(e))
            }
        }
    }
}
