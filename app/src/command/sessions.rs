use chatrs_config::{Config, StorageBackend};

use super::open_storage;

/// Input parameters for the Sessions command strategy.
#[derive(Debug, Clone)]
pub enum SessionsInput {
    List,
    Clear(String),
}

/// Strategy for listing and clearing stored sessions.
#[derive(Debug, Clone, Copy)]
pub struct SessionsStrategy;

impl super::CommandStrategy for SessionsStrategy {
    type Input = SessionsInput;

    async fn execute(&self, input: Self::Input) -> anyhow::Result<()> {
        let config = Config::load()?;

        if config.storage.backend == StorageBackend::Memory {
            println!("Session storage is in-memory; no sessions outlive a chat run.");
            println!("Set storage.backend to \"sqlite\" to keep sessions.");
            return Ok(());
        }

        let storage = open_storage(&config).await?;

        match input {
            SessionsInput::List => {
                let ids = storage.list_sessions().await?;
                if ids.is_empty() {
                    println!("No stored sessions.");
                }
                for id in ids {
                    let session = storage.load(Some(&id)).await?;
                    let last_active = session.last_activity().map_or_else(
                        || "-".to_string(),
                        |t| t.format("%Y-%m-%d %H:%M:%S").to_string(),
                    );
                    println!(
                        "{id}\t{} messages\tlanguage: {}\tlast active: {last_active}",
                        session.message_count(),
                        session.language().unwrap_or("-"),
                    );
                }
            }
            SessionsInput::Clear(id) => {
                storage.clear_session(&id).await?;
                println!("Cleared session: {id}");
            }
        }

        Ok(())
    }
}
