//! Agent session-id store backed by `SQLite`.
//!
//! Maps a host-defined key (typically a worktree path) to the session id the
//! agent assigned, so a later run can `session/load` it.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::acp::client::SessionStore;
use crate::acp::router::DelegateFuture;
use crate::acp::schema::SessionId;
use crate::{AppError, Result};

use super::db::Database;

/// Stored mapping from key to session id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSession {
    /// Host-defined key.
    pub session_key: String,
    /// Agent-assigned session id.
    pub session_id: SessionId,
    /// Last time the mapping was written.
    pub updated_at: DateTime<Utc>,
}

/// Internal row struct for `SQLite` deserialization.
#[derive(sqlx::FromRow)]
struct SessionRow {
    session_key: String,
    session_id: String,
    updated_at: String,
}

impl SessionRow {
    fn into_stored(self) -> Result<StoredSession> {
        let updated_at = DateTime::parse_from_rfc3339(&self.updated_at)
            .map_err(|e| AppError::Db(format!("invalid updated_at: {e}")))?
            .with_timezone(&Utc);
        Ok(StoredSession {
            session_key: self.session_key,
            session_id: SessionId::from(self.session_id),
            updated_at,
        })
    }
}

/// Repository for agent session ids.
#[derive(Clone)]
pub struct SqliteSessionStore {
    db: Arc<Database>,
}

impl SqliteSessionStore {
    /// Create a new store instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert or replace the id stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the upsert fails.
    pub async fn upsert(&self, key: &str, session_id: &SessionId) -> Result<()> {
        sqlx::query(
            "INSERT INTO agent_session (session_key, session_id, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(session_key) DO UPDATE SET
                 session_id = excluded.session_id,
                 updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(session_id.as_str())
        .bind(Utc::now().to_rfc3339())
        .execute(self.db.as_ref())
        .await?;
        Ok(())
    }

    /// Fetch the mapping stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails or the row is corrupt.
    pub async fn find(&self, key: &str) -> Result<Option<StoredSession>> {
        let row: Option<SessionRow> = sqlx::query_as(
            "SELECT session_key, session_id, updated_at
             FROM agent_session
             WHERE session_key = ?1",
        )
        .bind(key)
        .fetch_optional(self.db.as_ref())
        .await?;

        row.map(SessionRow::into_stored).transpose()
    }

    /// Remove the mapping stored under `key`. Removing an unknown key is a
    /// no-op.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the delete fails.
    pub async fn remove(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM agent_session WHERE session_key = ?1")
            .bind(key)
            .execute(self.db.as_ref())
            .await?;
        Ok(())
    }

    /// All stored mappings, most recently written first.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn list(&self) -> Result<Vec<StoredSession>> {
        let rows: Vec<SessionRow> = sqlx::query_as(
            "SELECT session_key, session_id, updated_at
             FROM agent_session
             ORDER BY updated_at DESC",
        )
        .fetch_all(self.db.as_ref())
        .await?;

        rows.into_iter().map(SessionRow::into_stored).collect()
    }
}

impl SessionStore for SqliteSessionStore {
    fn save<'a>(&'a self, key: &'a str, session_id: &'a SessionId) -> DelegateFuture<'a, ()> {
        Box::pin(self.upsert(key, session_id))
    }

    fn clear<'a>(&'a self, key: &'a str) -> DelegateFuture<'a, ()> {
        Box::pin(self.remove(key))
    }

    fn get<'a>(&'a self, key: &'a str) -> DelegateFuture<'a, Option<SessionId>> {
        Box::pin(async move { Ok(self.find(key).await?.map(|stored| stored.session_id)) })
    }
}
