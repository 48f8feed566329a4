//! Turn controller for multi-turn dialogue.
//!
//! The `TurnController` is the main entry point: it owns the gateway, the
//! session store and the immutable conversation configuration, and runs one
//! user turn at a time per session.

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;

use chatrs_core::{
    ChatMessage, GatewayError, LLMProvider, Prompt, Session, SessionStorage, StoreError,
    TrimConfig,
};
use futures::{Stream, StreamExt};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::history::HistoryTrimmer;
use crate::lock::{SessionGuard, SessionLocks};
use crate::prompt::{DEFAULT_DIRECTIVE_TEMPLATE, PromptAssembler};

/// Configuration for conversation management.
///
/// Built once at startup and shared by every turn.
#[derive(Debug, Clone)]
pub struct ConversationConfig {
    /// Model to use for completions
    pub model: String,
    /// Response language for requests that do not name one
    pub default_language: String,
    /// System directive template containing `{language}`
    pub directive_template: String,
    /// History trimming rules
    pub trim: TrimConfig,
    /// Seeded as the head system message of a session with an empty log
    pub system_prompt: Option<String>,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            default_language: "English".to_string(),
            directive_template: DEFAULT_DIRECTIVE_TEMPLATE.to_string(),
            trim: TrimConfig::default(),
            system_prompt: None,
        }
    }
}

impl ConversationConfig {
    /// Set the model name.
    #[must_use]
    pub fn with_model(mut self, model: String) -> Self {
        self.model = model;
        self
    }

    /// Set the fallback response language.
    #[must_use]
    pub fn with_default_language(mut self, language: String) -> Self {
        self.default_language = language;
        self
    }

    /// Set the system directive template.
    #[must_use]
    pub fn with_directive_template(mut self, template: String) -> Self {
        self.directive_template = template;
        self
    }

    /// Set the trimming rules.
    #[must_use]
    pub const fn with_trim(mut self, trim: TrimConfig) -> Self {
        self.trim = trim;
        self
    }

    /// Seed new sessions with a system message.
    #[must_use]
    pub fn with_system_prompt(mut self, prompt: Option<String>) -> Self {
        self.system_prompt = prompt;
        self
    }
}

/// Errors that can occur during a turn.
///
/// A failed turn never changes the stored session.
#[derive(Debug, Error)]
pub enum TurnError {
    #[error("model gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("session store error: {0}")]
    Store(#[from] StoreError),
}

/// Pipeline stage of a turn, reported in debug logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Idle,
    Loading,
    Trimming,
    Assembling,
    Invoking,
    Appending,
    Saved,
    Failed,
}

impl fmt::Display for TurnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Loading => "loading",
            Self::Trimming => "trimming",
            Self::Assembling => "assembling",
            Self::Invoking => "invoking",
            Self::Appending => "appending",
            Self::Saved => "saved",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// One user turn.
#[derive(Debug, Clone)]
pub struct TurnRequest {
    /// User's input message
    pub user_text: String,
    /// Response language; `None` means the configured default
    pub language: Option<String>,
    /// Session to continue; `None` runs an ephemeral turn
    pub session_id: Option<String>,
}

impl TurnRequest {
    #[must_use]
    pub fn new(user_text: impl Into<String>) -> Self {
        Self {
            user_text: user_text.into(),
            language: None,
            session_id: None,
        }
    }

    #[must_use]
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    #[must_use]
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    fn label(&self) -> &str {
        self.session_id.as_deref().unwrap_or("<ephemeral>")
    }
}

/// Lazily produced content fragments of a streaming turn.
///
/// The assistant message is persisted after the last fragment. Dropping the
/// stream early discards the partial reply and leaves the session untouched.
pub type TurnStream<'a> = Pin<Box<dyn Stream<Item = Result<String, TurnError>> + Send + 'a>>;

/// A turn that has been loaded, trimmed and assembled but not yet invoked.
struct PreparedTurn {
    session: Session,
    prompt: Prompt,
    /// Held until the turn is saved or abandoned
    guard: Option<SessionGuard>,
}

/// Multi-turn conversation orchestrator.
pub struct TurnController<P = Arc<dyn LLMProvider>, S = Arc<dyn SessionStorage>>
where
    P: Send + Sync,
    S: Send + Sync,
{
    provider: P,
    storage: S,
    config: ConversationConfig,
    trimmer: HistoryTrimmer,
    assembler: PromptAssembler,
    locks: SessionLocks,
}

impl<P, S> TurnController<P, S>
where
    P: LLMProvider,
    S: SessionStorage,
{
    pub fn new(provider: P, storage: S, config: ConversationConfig) -> Self {
        info!(
            "Creating turn controller: model={}, max_tokens={}",
            config.model, config.trim.max_tokens
        );

        Self {
            trimmer: HistoryTrimmer::new(config.trim.clone()),
            assembler: PromptAssembler::with_template(config.directive_template.clone()),
            provider,
            storage,
            config,
            locks: SessionLocks::new(),
        }
    }

    /// Run one turn and wait for the complete assistant reply.
    pub async fn run_turn(&self, request: TurnRequest) -> Result<ChatMessage, TurnError> {
        let PreparedTurn {
            session,
            prompt,
            guard,
        } = self.prepare(&request).await?;

        Self::enter(&request, TurnState::Invoking);
        let response = self
            .provider
            .complete(&prompt, &self.config.model)
            .await
            .inspect_err(|e| Self::fail(&request, TurnState::Invoking, e))?;

        if let Some(usage) = response.usage {
            debug!(
                "Tokens: {} prompt + {} completion = {} total",
                usage.prompt_tokens, usage.completion_tokens, usage.total_tokens
            );
        }

        self.commit(&request, session, response.message.clone()).await?;
        drop(guard);
        Ok(response.message)
    }

    /// Run one turn, yielding content fragments as the model produces them.
    pub fn stream_turn(&self, request: TurnRequest) -> TurnStream<'_> {
        Box::pin(self.fragments(request))
    }

    fn fragments(
        &self,
        request: TurnRequest,
    ) -> impl Stream<Item = Result<String, TurnError>> + Send + '_ {
        async_stream::try_stream! {
            let PreparedTurn { session, prompt, guard } = self.prepare(&request).await?;

            Self::enter(&request, TurnState::Invoking);
            let mut fragments = self
                .provider
                .stream(&prompt, &self.config.model)
                .await
                .inspect_err(|e| Self::fail(&request, TurnState::Invoking, e))
                .map_err(TurnError::from)?;

            let mut content = String::new();
            while let Some(fragment) = fragments.next().await {
                let fragment = fragment
                    .inspect_err(|e| Self::fail(&request, TurnState::Invoking, e))
                    .map_err(TurnError::from)?;
                content.push_str(&fragment);
                yield fragment;
            }

            self.commit(&request, session, ChatMessage::assistant(content)).await?;
            drop(guard);
        }
    }

    /// Lock, load, append the user message, trim and assemble.
    async fn prepare(&self, request: &TurnRequest) -> Result<PreparedTurn, TurnError> {
        Self::enter(request, TurnState::Idle);

        let guard = match request.session_id.as_deref() {
            Some(id) => Some(self.locks.acquire(id).await),
            None => None,
        };

        Self::enter(request, TurnState::Loading);
        let mut session = self
            .storage
            .load(request.session_id.as_deref())
            .await
            .inspect_err(|e| Self::fail(request, TurnState::Loading, e))?;

        if let Some(system_prompt) = self
            .config
            .system_prompt
            .as_ref()
            .filter(|_| session.is_empty())
        {
            session.append(ChatMessage::system(system_prompt.clone()));
        }

        let language = request
            .language
            .clone()
            .unwrap_or_else(|| self.config.default_language.clone());
        session.set_language(language.clone());
        session.append(ChatMessage::human(request.user_text.clone()));

        info!(
            "Processing turn for session {}: {} messages, language={}",
            request.label(),
            session.message_count(),
            language
        );

        Self::enter(request, TurnState::Trimming);
        let trimmed = self.trimmer.trim(session.messages(), |m| {
            self.provider.count_message_tokens(m)
        });

        Self::enter(request, TurnState::Assembling);
        let prompt = self.assembler.assemble(trimmed, &language);

        Ok(PreparedTurn {
            session,
            prompt,
            guard,
        })
    }

    /// Append the assistant reply and persist the session.
    async fn commit(
        &self,
        request: &TurnRequest,
        mut session: Session,
        reply: ChatMessage,
    ) -> Result<(), TurnError> {
        Self::enter(request, TurnState::Appending);
        session.append(reply);

        self.storage
            .save(&session)
            .await
            .inspect_err(|e| Self::fail(request, TurnState::Appending, e))?;

        Self::enter(request, TurnState::Saved);
        info!(
            "Turn completed for session {}: {} messages",
            request.label(),
            session.message_count()
        );
        Ok(())
    }

    fn enter(request: &TurnRequest, state: TurnState) {
        debug!("Session {} -> {}", request.label(), state);
    }

    fn fail(request: &TurnRequest, during: TurnState, error: &dyn std::error::Error) {
        warn!(
            "Session {} -> {} during {}: {}",
            request.label(),
            TurnState::Failed,
            during,
            error
        );
    }
}
