//! Database module
//!
//! Provides persistence for conversations and their item payloads.

mod schema;

pub use schema::*;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Arc, Mutex};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Conversation not found: {0}")]
    ConversationNotFound(String),
}

pub type DbResult<T> = Result<T, DbError>;

/// Thread-safe database handle
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.init_schema()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing)
    #[allow(dead_code)] // Used in tests
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> DbResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    // ==================== Conversation Operations ====================

    /// Create a new conversation
    pub fn create_conversation(
        &self,
        title: Option<&str>,
        settings: Option<ConversationSettings>,
    ) -> DbResult<Conversation> {
        let conn = self.conn.lock().unwrap();
        let id = uuid::Uuid::new_v4().simple().to_string();
        let now = Utc::now();
        let settings = settings.unwrap_or_default();
        let settings_json = serde_json::to_string(&settings).unwrap();

        conn.execute(
            "INSERT INTO conversations (id, created_at, updated_at, title, settings)
             VALUES (?1, ?2, ?2, ?3, ?4)",
            params![id, now.to_rfc3339(), title, settings_json],
        )?;

        Ok(Conversation {
            id,
            title: title.map(String::from),
            created_at: now,
            updated_at: now,
            settings,
            messages: Vec::new(),
        })
    }

    /// List conversations, most recently updated first
    pub fn list_conversations(
        &self,
        limit: i64,
        offset: i64,
    ) -> DbResult<Vec<ConversationSummary>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT c.id, c.title, c.created_at, c.updated_at,
                    (SELECT COUNT(*) FROM messages m WHERE m.conversation_id = c.id) AS message_count
             FROM conversations c
             ORDER BY c.updated_at DESC
             LIMIT ?1 OFFSET ?2",
        )?;

        let rows = stmt.query_map(params![limit, offset], |row| {
            Ok(ConversationSummary {
                id: row.get(0)?,
                title: row.get(1)?,
                created_at: parse_datetime(&row.get::<_, String>(2)?),
                updated_at: parse_datetime(&row.get::<_, String>(3)?),
                message_count: row.get(4)?,
            })
        })?;

        rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
    }

    /// Get conversation by ID, messages included
    pub fn get_conversation(&self, id: &str) -> DbResult<Conversation> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, title, created_at, updated_at, settings
             FROM conversations WHERE id = ?1",
        )?;

        let mut conversation = stmt
            .query_row(params![id], |row| {
                let settings_json: String = row.get(4)?;
                let settings: ConversationSettings =
                    serde_json::from_str(&settings_json).unwrap_or_default();
                Ok(Conversation {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    created_at: parse_datetime(&row.get::<_, String>(2)?),
                    updated_at: parse_datetime(&row.get::<_, String>(3)?),
                    settings,
                    messages: Vec::new(),
                })
            })
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => {
                    DbError::ConversationNotFound(id.to_string())
                }
                other => DbError::Sqlite(other),
            })?;

        let mut stmt = conn.prepare(
            "SELECT id, idx, role, payload FROM messages
             WHERE conversation_id = ?1 ORDER BY idx ASC",
        )?;
        let rows = stmt.query_map(params![id], |row| {
            let payload_json: String = row.get(3)?;
            Ok(StoredMessage {
                id: row.get(0)?,
                idx: row.get(1)?,
                role: row.get(2)?,
                payload: serde_json::from_str(&payload_json).unwrap_or(serde_json::Value::Null),
            })
        })?;
        conversation.messages = rows.collect::<Result<Vec<_>, _>>()?;

        Ok(conversation)
    }

    /// Update title and/or settings, bumping `updated_at`
    pub fn update_conversation(
        &self,
        id: &str,
        title: Option<&str>,
        settings: Option<&ConversationSettings>,
    ) -> DbResult<Conversation> {
        {
            let conn = self.conn.lock().unwrap();
            let mut changed = false;

            if let Some(title) = title {
                changed |= conn.execute(
                    "UPDATE conversations SET title = ?1 WHERE id = ?2",
                    params![title, id],
                )? > 0;
            }
            if let Some(settings) = settings {
                let settings_json = serde_json::to_string(settings).unwrap();
                changed |= conn.execute(
                    "UPDATE conversations SET settings = ?1 WHERE id = ?2",
                    params![settings_json, id],
                )? > 0;
            }
            if changed {
                conn.execute(
                    "UPDATE conversations SET updated_at = ?1 WHERE id = ?2",
                    params![Utc::now().to_rfc3339(), id],
                )?;
            }
        }

        self.get_conversation(id)
    }

    // ==================== Item Operations ====================

    /// Raw item payloads in append order, ready to seed an agent
    pub fn items_for_agent(&self, id: &str) -> DbResult<Vec<serde_json::Value>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT payload FROM messages WHERE conversation_id = ?1 ORDER BY idx ASC",
        )?;
        let rows = stmt.query_map(params![id], |row| {
            let payload_json: String = row.get(0)?;
            Ok(serde_json::from_str(&payload_json).unwrap_or(serde_json::Value::Null))
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
    }

    /// Append item payloads to a conversation, bumping `updated_at`
    pub fn append_items(&self, id: &str, items: &[serde_json::Value]) -> DbResult<()> {
        if items.is_empty() {
            return Ok(());
        }

        let conn = self.conn.lock().unwrap();
        let mut idx: i64 = conn.query_row(
            "SELECT COALESCE(MAX(idx), -1) + 1 FROM messages WHERE conversation_id = ?1",
            params![id],
            |row| row.get(0),
        )?;

        for item in items {
            let msg_id = uuid::Uuid::new_v4().simple().to_string();
            conn.execute(
                "INSERT INTO messages (id, conversation_id, idx, role, payload)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![msg_id, id, idx, item_role(item), item.to_string()],
            )?;
            idx += 1;
        }

        conn.execute(
            "UPDATE conversations SET updated_at = ?1 WHERE id = ?2",
            params![Utc::now().to_rfc3339(), id],
        )?;

        Ok(())
    }
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc))
}
