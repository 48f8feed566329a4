//! Static strategy pattern for CLI commands.
//!
//! Each command is a separate strategy type with its own input, dispatched
//! statically from `main`.

use chatrs_config::{Config, StorageBackend};
use chatrs_conversation::ConversationConfig;
use chatrs_core::SessionStorage;
use chatrs_providers::OpenAIProvider;
use chatrs_session::{MemorySessionStore, SqliteSessionStore};
use std::sync::Arc;
use tracing::info;

mod chat;
mod info;
mod init;
mod sessions;
mod version;

pub use chat::{ChatInput, ChatStrategy};
pub use info::InfoStrategy;
pub use init::InitStrategy;
pub use sessions::{SessionsInput, SessionsStrategy};
pub use version::VersionStrategy;

/// Core trait defining the contract for all command strategies.
///
/// # Example
/// ```rust,ignore
/// struct MyStrategy;
///
/// impl CommandStrategy for MyStrategy {
///     type Input = MyInput;
///
///     async fn execute(&self, input: Self::Input) -> anyhow::Result<()> {
///         Ok(())
///     }
/// }
/// ```
pub trait CommandStrategy: Send + Sync + 'static {
    /// The input type this strategy accepts.
    type Input;

    /// Execute the command with the given input.
    async fn execute(&self, input: Self::Input) -> anyhow::Result<()>;
}

/// Everything a turn-running command needs.
pub struct CommonComponents {
    pub config: Config,
    pub provider: OpenAIProvider,
    pub storage: Arc<dyn SessionStorage>,
}

/// Load config, then build the provider and the session store.
async fn init_common_components() -> anyhow::Result<CommonComponents> {
    let config = Config::load()?;

    let provider = OpenAIProvider::new(config.api_key()?.to_string())
        .with_base_url(config.providers.openai.base_url.clone())
        .with_temperature(config.agents.defaults.temperature)
        .with_max_tokens(config.agents.defaults.max_tokens);

    let storage = open_storage(&config).await?;

    Ok(CommonComponents {
        config,
        provider,
        storage,
    })
}

async fn open_storage(config: &Config) -> anyhow::Result<Arc<dyn SessionStorage>> {
    match config.storage.backend {
        StorageBackend::Memory => {
            info!("Using in-memory session storage");
            Ok(Arc::new(MemorySessionStore::new()))
        }
        StorageBackend::Sqlite => {
            let db_path = config.storage.database_path()?;
            if let Some(parent) = db_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            info!("Database path: {}", db_path.display());
            Ok(Arc::new(SqliteSessionStore::new(&db_path).await?))
        }
    }
}

/// Model precedence: command line, then config file, then the provider's default.
fn build_conversation_config(
    config: &Config,
    provider_model: &str,
    model: Option<String>,
) -> ConversationConfig {
    let defaults = &config.agents.defaults;
    let model = model
        .or_else(|| defaults.model.clone())
        .unwrap_or_else(|| provider_model.to_string());

    let mut conversation = ConversationConfig::default()
        .with_model(model)
        .with_default_language(defaults.language.clone())
        .with_trim(config.trimming.clone())
        .with_system_prompt(defaults.system_prompt.clone());

    if let Some(template) = &defaults.directive_template {
        conversation = conversation.with_directive_template(template.clone());
    }

    conversation
}
