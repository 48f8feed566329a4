use async_trait::async_trait;
use chatrs_core::{ChatMessage, Session, SessionStorage, StoreError};
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ConnectionTrait, Database, DatabaseConnection, DbErr, EntityTrait, QueryOrder, Schema, Set,
};
use std::path::Path;
use tracing::{debug, info};

use crate::entity::sessions;

#[allow(clippy::needless_pass_by_value)]
fn backend_error(err: DbErr) -> StoreError {
    StoreError::Backend(err.to_string())
}

#[allow(clippy::needless_pass_by_value)]
fn serialization_error(err: serde_json::Error) -> StoreError {
    StoreError::Serialization(err.to_string())
}

/// Session store backed by a SQLite file.
///
/// Each session is one row; the message log is kept as a JSON column and
/// rewritten whole on every save.
pub struct SqliteSessionStore {
    db: DatabaseConnection,
}

impl SqliteSessionStore {
    pub async fn new(db_path: &Path) -> Result<Self, StoreError> {
        let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
        info!("Connecting to database: {}", db_url);

        let db = Database::connect(&db_url).await.map_err(backend_error)?;

        let backend = db.get_database_backend();
        let mut stmt = Schema::new(backend).create_table_from_entity(sessions::Entity);
        stmt.if_not_exists();
        db.execute(backend.build(&stmt))
            .await
            .map_err(backend_error)?;

        info!("SqliteSessionStore initialized");
        Ok(Self { db })
    }
}

#[async_trait]
impl SessionStorage for SqliteSessionStore {
    async fn load(&self, id: Option<&str>) -> Result<Session, StoreError> {
        let Some(id) = id else {
            return Ok(Session::ephemeral());
        };

        let Some(model) = sessions::Entity::find_by_id(id.to_owned())
            .one(&self.db)
            .await
            .map_err(backend_error)?
        else {
            debug!("No stored session for {}, starting fresh", id);
            return Ok(Session::new(id));
        };

        let messages: Vec<ChatMessage> =
            serde_json::from_str(&model.messages).map_err(serialization_error)?;

        Ok(Session::restore(
            model.key,
            messages,
            model.language,
            model.created_at,
            model.last_activity,
        ))
    }

    async fn save(&self, session: &Session) -> Result<(), StoreError> {
        let Some(id) = session.id() else {
            return Ok(());
        };

        let messages_json =
            serde_json::to_string(session.messages()).map_err(serialization_error)?;

        let row = sessions::ActiveModel {
            key: Set(id.to_string()),
            messages: Set(messages_json),
            language: Set(session.language().map(str::to_string)),
            created_at: Set(session.created_at()),
            last_activity: Set(session.last_activity()),
        };

        sessions::Entity::insert(row)
            .on_conflict(
                OnConflict::column(sessions::Column::Key)
                    .update_columns([
                        sessions::Column::Messages,
                        sessions::Column::Language,
                        sessions::Column::LastActivity,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await
            .map_err(backend_error)?;

        info!(
            "Saved session {} ({} messages)",
            id,
            session.message_count()
        );
        Ok(())
    }

    async fn list_sessions(&self) -> Result<Vec<String>, StoreError> {
        let models = sessions::Entity::find()
            .order_by_asc(sessions::Column::Key)
            .all(&self.db)
            .await
            .map_err(backend_error)?;

        Ok(models.into_iter().map(|s| s.key).collect())
    }

    async fn clear_session(&self, id: &str) -> Result<(), StoreError> {
        sessions::Entity::delete_by_id(id.to_owned())
            .exec(&self.db)
            .await
            .map_err(backend_error)?;

        info!("Cleared session: {}", id);
        Ok(())
    }
}
