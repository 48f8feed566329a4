#![deny(
    clippy::all,
    clippy::nursery,
    clippy::pedantic,
    clippy::style,
    clippy::complexity,
    clippy::perf,
    clippy::correctness,
    clippy::suspicious,
    clippy::unwrap_used,
    clippy::expect_used
)]
#![allow(
    clippy::similar_names,
    clippy::missing_safety_doc,
    clippy::missing_panics_doc,
    clippy::missing_errors_doc
)]

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::Stream;
use serde::{Deserialize, Serialize};

pub mod error;
pub mod tokens;
pub mod trim;

pub use error::{GatewayError, StoreError};
pub use trim::{TrimConfig, TrimStrategy};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    Human,
    Assistant,
}

impl Role {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::Human => "human",
            Self::Assistant => "assistant",
        }
    }
}

/// A single role-tagged unit of conversation.
///
/// Messages are immutable once built; a session log only ever grows by
/// appending new ones.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    role: Role,
    content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    token_hint: Option<usize>,
}

impl ChatMessage {
    #[must_use]
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            token_hint: None,
        }
    }

    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    #[must_use]
    pub fn human(content: impl Into<String>) -> Self {
        Self::new(Role::Human, content)
    }

    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Attach a precomputed token count that overrides the gateway's counter.
    #[must_use]
    pub const fn with_token_hint(mut self, tokens: usize) -> Self {
        self.token_hint = Some(tokens);
        self
    }

    #[must_use]
    pub const fn role(&self) -> Role {
        self.role
    }

    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }

    #[must_use]
    pub const fn token_hint(&self) -> Option<usize> {
        self.token_hint
    }
}

/// The fully assembled model input for one turn. Built fresh every turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system_directive: String,
    pub messages: Vec<ChatMessage>,
}

impl Prompt {
    /// Flatten into the wire order: directive first, then the history.
    #[must_use]
    pub fn to_messages(&self) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(self.messages.len() + 1);
        messages.push(ChatMessage::system(self.system_directive.clone()));
        messages.extend(self.messages.iter().cloned());
        messages
    }
}

#[derive(Debug, Clone)]
pub struct LLMResponse {
    pub message: ChatMessage,
    pub usage: Option<Usage>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Incremental content fragments of one generation, in order.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String, GatewayError>> + Send>>;

/// The only point of contact with the remote completion service.
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Blocking completion; returns exactly one assistant message.
    async fn complete(&self, prompt: &Prompt, model: &str) -> Result<LLMResponse, GatewayError>;

    /// Streamed completion. The returned stream ends when generation ends and
    /// cannot be restarted.
    async fn stream(&self, prompt: &Prompt, model: &str) -> Result<FragmentStream, GatewayError>;

    fn get_default_model(&self) -> &str;

    /// Approximate token count of a piece of text. Must return the same value
    /// for the same text for the life of the process.
    fn count_tokens(&self, text: &str) -> usize {
        tokens::estimate_tokens(text)
    }

    fn count_message_tokens(&self, message: &ChatMessage) -> usize {
        message.token_hint().unwrap_or_else(|| {
            self.count_tokens(message.content()) + tokens::role_overhead(message.role())
        })
    }
}

#[async_trait]
impl<T: LLMProvider + ?Sized> LLMProvider for Arc<T> {
    async fn complete(&self, prompt: &Prompt, model: &str) -> Result<LLMResponse, GatewayError> {
        (**self).complete(prompt, model).await
    }

    async fn stream(&self, prompt: &Prompt, model: &str) -> Result<FragmentStream, GatewayError> {
        (**self).stream(prompt, model).await
    }

    fn get_default_model(&self) -> &str {
        (**self).get_default_model()
    }

    fn count_tokens(&self, text: &str) -> usize {
        (**self).count_tokens(text)
    }

    fn count_message_tokens(&self, message: &ChatMessage) -> usize {
        (**self).count_message_tokens(message)
    }
}

/// Keyed checkpoint storage for conversation sessions.
#[async_trait]
pub trait SessionStorage: Send + Sync {
    /// Stored state for a known id, a fresh keyed session for an unknown id,
    /// or an ephemeral session when no id is given.
    async fn load(&self, id: Option<&str>) -> Result<Session, StoreError>;

    /// Overwrite stored state for `session.id`. Ephemeral sessions are not
    /// stored.
    async fn save(&self, session: &Session) -> Result<(), StoreError>;

    async fn list_sessions(&self) -> Result<Vec<String>, StoreError>;

    async fn clear_session(&self, id: &str) -> Result<(), StoreError>;
}

#[async_trait]
impl<T: SessionStorage + ?Sized> SessionStorage for Arc<T> {
    async fn load(&self, id: Option<&str>) -> Result<Session, StoreError> {
        (**self).load(id).await
    }

    async fn save(&self, session: &Session) -> Result<(), StoreError> {
        (**self).save(session).await
    }

    async fn list_sessions(&self) -> Result<Vec<String>, StoreError> {
        (**self).list_sessions().await
    }

    async fn clear_session(&self, id: &str) -> Result<(), StoreError> {
        (**self).clear_session(id).await
    }
}

/// A named, append-only conversation log plus its language preference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    id: Option<String>,
    messages: Vec<ChatMessage>,
    language: Option<String>,
    created_at: DateTime<Utc>,
    last_activity: Option<DateTime<Utc>>,
}

impl Session {
    /// A fresh session stored under `id`.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            messages: Vec::new(),
            language: None,
            created_at: Utc::now(),
            last_activity: None,
        }
    }

    /// A session that lives for one call only.
    #[must_use]
    pub fn ephemeral() -> Self {
        Self {
            id: None,
            messages: Vec::new(),
            language: None,
            created_at: Utc::now(),
            last_activity: None,
        }
    }

    /// Rebuild a session from persisted parts.
    #[must_use]
    pub const fn restore(
        id: String,
        messages: Vec<ChatMessage>,
        language: Option<String>,
        created_at: DateTime<Utc>,
        last_activity: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            id: Some(id),
            messages,
            language,
            created_at,
            last_activity,
        }
    }

    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    #[must_use]
    pub const fn is_ephemeral(&self) -> bool {
        self.id.is_none()
    }

    #[must_use]
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    #[must_use]
    pub fn language(&self) -> Option<&str> {
        self.language.as_deref()
    }

    pub fn set_language(&mut self, language: impl Into<String>) {
        self.language = Some(language.into());
    }

    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[must_use]
    pub const fn last_activity(&self) -> Option<DateTime<Utc>> {
        self.last_activity
    }

    /// Append one message to the end of the log.
    pub fn append(&mut self, message: ChatMessage) {
        self.messages.push(message);
        self.last_activity = Some(Utc::now());
    }

    #[must_use]
    pub const fn message_count(&self) -> usize {
        self.messages.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
