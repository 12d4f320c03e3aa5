//! ScyllaDB-backed session and message stores (spec §3, §5, §6).
//!
//! CQL statements are built with `format!` and rows decoded via
//! `into_typed` against `conversation_sessions`/`conversation_messages`.
//! The per-session lock spec §5 requires ("concurrent appends to the same session are
//! serialized; concurrent appends to different sessions are independent")
//! is implemented at the application layer with one `tokio::sync::Mutex`
//! per session id, since ScyllaDB gives no cross-statement transaction to
//! lean on for the read-check-then-write sequence below.

use std::collections::HashMap as StdHashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex as SyncMutex;
use ragflow_core::{
    ConversationSession, Error, Message, MessageMetadata, MessageRole, MessageType, Result,
    SessionStatus,
};
use tokio::sync::Mutex as AsyncMutex;
use uuid::Uuid;

use crate::client::ScyllaClient;

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create(&self, session: &ConversationSession) -> Result<()>;
    async fn get(&self, id: Uuid) -> Result<Option<ConversationSession>>;
    async fn update_status(&self, id: Uuid, status: SessionStatus) -> Result<()>;

    /// Appends `message`, bumping `message_count` and `updated_at`
    /// atomically with respect to other appends on the same session.
    /// Rejects with `Error::Validation` if the session is full or expired
    /// (spec §3 invariants).
    async fn append_message(&self, session_id: Uuid, message: Message) -> Result<()>;

    /// Most recent `limit` messages, oldest first.
    async fn recent_messages(&self, session_id: Uuid, limit: i32) -> Result<Vec<Message>>;
}

#[derive(Clone)]
pub struct ScyllaSessionStore {
    client: ScyllaClient,
    locks: Arc<SyncMutex<StdHashMap<Uuid, Arc<AsyncMutex<()>>>>>,
}

impl ScyllaSessionStore {
    pub fn new(client: ScyllaClient) -> Self {
        Self { client, locks: Arc::new(SyncMutex::new(StdHashMap::new())) }
    }

    fn lock_for(&self, session_id: Uuid) -> Arc<AsyncMutex<()>> {
        self.locks.lock().entry(session_id).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
    }
}

fn status_str(status: SessionStatus) -> &'static str {
    match status {
        SessionStatus::Active => "ACTIVE",
        SessionStatus::Paused => "PAUSED",
        SessionStatus::Archived => "ARCHIVED",
        SessionStatus::Expired => "EXPIRED",
    }
}

fn status_from_str(s: &str) -> SessionStatus {
    match s {
        "PAUSED" => SessionStatus::Paused,
        "ARCHIVED" => SessionStatus::Archived,
        "EXPIRED" => SessionStatus::Expired,
        _ => SessionStatus::Active,
    }
}

fn role_str(role: MessageRole) -> &'static str {
    match role {
        MessageRole::User => "USER",
        MessageRole::Assistant => "ASSISTANT",
        MessageRole::System => "SYSTEM",
    }
}

fn role_from_str(s: &str) -> MessageRole {
    match s {
        "ASSISTANT" => MessageRole::Assistant,
        "SYSTEM" => MessageRole::System,
        _ => MessageRole::User,
    }
}

fn type_str(kind: MessageType) -> &'static str {
    match kind {
        MessageType::Question => "QUESTION",
        MessageType::Answer => "ANSWER",
        MessageType::FollowUp => "FOLLOW_UP",
        MessageType::Clarification => "CLARIFICATION",
        MessageType::System => "SYSTEM",
    }
}

fn type_from_str(s: &str) -> MessageType {
    match s {
        "ANSWER" => MessageType::Answer,
        "FOLLOW_UP" => MessageType::FollowUp,
        "CLARIFICATION" => MessageType::Clarification,
        "SYSTEM" => MessageType::System,
        _ => MessageType::Question,
    }
}

#[async_trait]
impl SessionStore for ScyllaSessionStore {
    async fn create(&self, session: &ConversationSession) -> Result<()> {
        let query = format!(
            "INSERT INTO {}.conversation_sessions (
                id, user_id, collection_id, name, status, context_window_size,
                max_messages, message_count, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            self.client.keyspace()
        );
        self.client
            .session()
            .query_unpaged(
                query,
                (
                    session.id,
                    session.user_id,
                    session.collection_id,
                    &session.name,
                    status_str(session.status),
                    session.context_window_size as i32,
                    session.max_messages as i32,
                    session.message_count as i32,
                    session.created_at.timestamp_millis(),
                    session.updated_at.timestamp_millis(),
                ),
            )
            .await
            .map_err(|e| Error::Internal(e.to_string()))?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<ConversationSession>> {
        let query = format!(
            "SELECT id, user_id, collection_id, name, status, context_window_size,
                    max_messages, message_count, created_at, updated_at
             FROM {}.conversation_sessions WHERE id = ?",
            self.client.keyspace()
        );
        let result = self
            .client
            .session()
            .query_unpaged(query, (id,))
            .await
            .map_err(|e| Error::Internal(e.to_string()))?;

        let Some(rows) = result.rows else { return Ok(None) };
        let Some(row) = rows.into_iter().next() else { return Ok(None) };

        let (id, user_id, collection_id, name, status, context_window_size, max_messages, message_count, created_at, updated_at): (
            Uuid, Uuid, Uuid, String, String, i32, i32, i32, i64, i64,
        ) = row.into_typed().map_err(|e| Error::Internal(e.to_string()))?;

        Ok(Some(ConversationSession {
            id,
            user_id,
            collection_id,
            name,
            status: status_from_str(&status),
            context_window_size: context_window_size as u32,
            max_messages: max_messages as u32,
            message_count: message_count as u32,
            created_at: DateTime::from_timestamp_millis(created_at).unwrap_or_else(Utc::now),
            updated_at: DateTime::from_timestamp_millis(updated_at).unwrap_or_else(Utc::now),
        }))
    }

    async fn update_status(&self, id: Uuid, status: SessionStatus) -> Result<()> {
        let query = format!(
            "UPDATE {}.conversation_sessions SET status = ?, updated_at = ? WHERE id = ?",
            self.client.keyspace()
        );
        self.client
            .session()
            .query_unpaged(query, (status_str(status), Utc::now().timestamp_millis(), id))
            .await
            .map_err(|e| Error::Internal(e.to_string()))?;
        Ok(())
    }

    async fn append_message(&self, session_id: Uuid, message: Message) -> Result<()> {
        let lock = self.lock_for(session_id);
        let _guard = lock.lock().await;

        let session = self
            .get(session_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("session {session_id}")))?;

        if !session.accepts_writes() {
            return Err(Error::Validation(format!(
                "session {session_id} does not accept writes (status={:?}, message_count={}/{})",
                session.status, session.message_count, session.max_messages
            )));
        }

        let metadata_json = serde_json::to_string(&message.metadata).map_err(|e| Error::Internal(e.to_string()))?;
        let insert = format!(
            "INSERT INTO {}.conversation_messages (
                session_id, created_at, id, role, type, content, metadata_json
            ) VALUES (?, ?, ?, ?, ?, ?, ?)",
            self.client.keyspace()
        );
        self.client
            .session()
            .query_unpaged(
                insert,
                (
                    session_id,
                    message.created_at.timestamp_millis(),
                    message.id,
                    role_str(message.role),
                    type_str(message.kind),
                    &message.content,
                    metadata_json,
                ),
            )
            .await
            .map_err(|e| Error::Internal(e.to_string()))?;

        let update = format!(
            "UPDATE {}.conversation_sessions SET message_count = ?, updated_at = ? WHERE id = ?",
            self.client.keyspace()
        );
        self.client
            .session()
            .query_unpaged(update, (session.message_count as i32 + 1, message.created_at.timestamp_millis(), session_id))
            .await
            .map_err(|e| Error::Internal(e.to_string()))?;

        Ok(())
    }

    async fn recent_messages(&self, session_id: Uuid, limit: i32) -> Result<Vec<Message>> {
        let query = format!(
            "SELECT session_id, created_at, id, role, type, content, metadata_json
             FROM {}.conversation_messages WHERE session_id = ? ORDER BY created_at DESC LIMIT ?",
            self.client.keyspace()
        );
        let result = self
            .client
            .session()
            .query_unpaged(query, (session_id, limit))
            .await
            .map_err(|e| Error::Internal(e.to_string()))?;

        let mut messages = Vec::new();
        if let Some(rows) = result.rows {
            for row in rows {
                let (session_id, created_at, id, role, kind, content, metadata_json): (
                    Uuid, i64, Uuid, String, String, String, String,
                ) = row.into_typed().map_err(|e| Error::Internal(e.to_string()))?;
                let metadata: MessageMetadata =
                    serde_json::from_str(&metadata_json).unwrap_or_default();
                messages.push(Message {
                    id,
                    session_id,
                    role: role_from_str(&role),
                    kind: type_from_str(&kind),
                    content,
                    created_at: DateTime::from_timestamp_millis(created_at).unwrap_or_else(Utc::now),
                    metadata,
                });
            }
        }
        messages.reverse();
        Ok(messages)
    }
}
