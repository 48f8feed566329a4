use std::collections::HashMap;

use async_trait::async_trait;
use chatrs_core::{Session, SessionStorage, StoreError};
use tokio::sync::RwLock;
use tracing::debug;

/// Process-lifetime session store.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<String, Session>>,
}

impl MemorySessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStorage for MemorySessionStore {
    async fn load(&self, id: Option<&str>) -> Result<Session, StoreError> {
        let Some(id) = id else {
            return Ok(Session::ephemeral());
        };

        let sessions = self.sessions.read().await;
        Ok(sessions
            .get(id)
            .cloned()
            .unwrap_or_else(|| Session::new(id)))
    }

    async fn save(&self, session: &Session) -> Result<(), StoreError> {
        let Some(id) = session.id() else {
            return Ok(());
        };

        self.sessions
            .write()
            .await
            .insert(id.to_string(), session.clone());

        debug!(
            "Saved session {} ({} messages)",
            id,
            session.message_count()
        );
        Ok(())
    }

    async fn list_sessions(&self) -> Result<Vec<String>, StoreError> {
        let mut keys: Vec<String> = self.sessions.read().await.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }

    async fn clear_session(&self, id: &str) -> Result<(), StoreError> {
        self.sessions.write().await.remove(id);
        debug!("Cleared session: {}", id);
        Ok(())
    }
}
