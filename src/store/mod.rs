//! Conversation storage with SQLite
//!
//! The transcript is append-only: rows are written once by the relay and only
//! ever removed by a whole-session purge. Ordering follows the row id, the
//! insertion sequence, so a user turn always sorts before the assistant turn
//! it provoked even if the wall clock steps backwards in between.
//! `created_at` (millisecond precision) is kept for display and date filters.

mod schema;

use anyhow::{anyhow, Context, Result};
use chrono::{NaiveDate, SecondsFormat, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, Value, ValueRef};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde::Serialize;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};

pub use schema::SCHEMA;

/// Summaries per page in the conversation overview
pub const PAGE_SIZE: u32 = 20;

/// Which side of the conversation produced a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

impl ToSql for Role {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Role {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: String| FromSqlError::Other(e.into()))
    }
}

/// A message about to be appended
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub session_id: String,
    pub thread_id: String,
    pub role: Role,
    pub body: String,
    pub visitor_record_id: Option<i64>,
    pub page_id: Option<i64>,
    pub assistant_id: Option<String>,
}

/// Search criteria for the conversation overview
#[derive(Debug, Clone, Default)]
pub struct ConversationFilter {
    /// Substring matched against session id, thread id and message text
    pub search: Option<String>,
    /// Inclusive lower bound on the message date
    pub start_date: Option<NaiveDate>,
    /// Inclusive upper bound on the message date
    pub end_date: Option<NaiveDate>,
}

/// Append-only transcript storage
pub trait ConversationStore: Send + Sync {
    /// Append one message and return its synthetic id
    fn append(&self, message: &NewMessage) -> Result<i64>;

    /// All messages of a thread, oldest first
    fn list_by_thread(&self, thread_id: &str) -> Result<Vec<MessageRow>>;

    /// All messages of a browser session, oldest first
    fn list_by_session(&self, session_id: &str) -> Result<Vec<MessageRow>>;

    /// Conversations grouped by session and thread, most recent activity first
    fn list_conversations(&self, filter: &ConversationFilter, page: u32)
        -> Result<ConversationPage>;

    /// Remove every message of a session, returning how many rows went away
    fn delete_by_session(&self, session_id: &str) -> Result<usize>;
}

/// Storage for visitor intake records
pub trait VisitorStore: Send + Sync {
    fn insert_visitor(
        &self,
        user_name: Option<&str>,
        email: Option<&str>,
        phone: Option<&str>,
    ) -> Result<i64>;

    fn get_visitor(&self, id: i64) -> Result<Option<VisitorRow>>;
}

pub struct ChatStore {
    conn: Mutex<Connection>,
}

impl ChatStore {
    pub fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database {}", path.display()))?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("database connection lock poisoned"))
    }

    // ============================================
    // KNOWLEDGE BASE
    // ============================================

    /// Record an uploaded document
    pub fn insert_pdf(&self, name: &str, path: &str, openai_file_id: Option<&str>) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO pdfs (name, path, openai_file_id, created_at) VALUES (?, ?, ?, ?)",
            params![name, path, openai_file_id, now_timestamp()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn get_pdf(&self, id: i64) -> Result<Option<PdfRow>> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT id, name, path, openai_file_id, created_at FROM pdfs WHERE id = ?",
            params![id],
            map_pdf,
        )
        .optional()
        .map_err(Into::into)
    }

    pub fn list_pdfs(&self) -> Result<Vec<PdfRow>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, name, path, openai_file_id, created_at FROM pdfs ORDER BY created_at DESC, id DESC",
        )?;
        let rows = stmt.query_map([], map_pdf)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn delete_pdf(&self, id: i64) -> Result<bool> {
        let conn = self.conn()?;
        let deleted = conn.execute("DELETE FROM pdfs WHERE id = ?", params![id])?;
        Ok(deleted > 0)
    }

    /// Record an assistant created over uploaded documents
    pub fn insert_assistant(
        &self,
        openai_assistant_id: &str,
        name: &str,
        file_ids: &[String],
    ) -> Result<i64> {
        let file_ids = serde_json::to_string(file_ids)?;
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO assistants (openai_assistant_id, name, openai_file_ids, created_at)
             VALUES (?, ?, ?, ?)",
            params![openai_assistant_id, name, file_ids, now_timestamp()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn list_assistants(&self) -> Result<Vec<AssistantRow>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, openai_assistant_id, name, openai_file_ids, created_at
             FROM assistants ORDER BY created_at DESC, id DESC",
        )?;
        let rows = stmt.query_map([], |row| {
            let file_ids: Option<String> = row.get(3)?;
            Ok(AssistantRow {
                id: row.get(0)?,
                openai_assistant_id: row.get(1)?,
                name: row.get(2)?,
                file_ids: file_ids
                    .and_then(|raw| serde_json::from_str(&raw).ok())
                    .unwrap_or_default(),
                created_at: row.get(4)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }
}

// ============================================
// CONVERSATIONS
// ============================================

const MESSAGE_COLUMNS: &str = "id, session_id, thread_id, user_type, message_text, user_id, \
                               page_id, assistant_id, created_at";

impl ConversationStore for ChatStore {
    fn append(&self, message: &NewMessage) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            r#"INSERT INTO conversations
               (session_id, user_id, page_id, user_type, thread_id, assistant_id, message_text, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
            params![
                message.session_id,
                message.visitor_record_id,
                message.page_id,
                message.role,
                message.thread_id,
                message.assistant_id,
                message.body,
                now_timestamp(),
            ],
        )
        .context("Failed to append conversation message")?;
        Ok(conn.last_insert_rowid())
    }

    fn list_by_thread(&self, thread_id: &str) -> Result<Vec<MessageRow>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM conversations WHERE thread_id = ? ORDER BY id ASC",
            MESSAGE_COLUMNS
        ))?;
        let rows = stmt.query_map(params![thread_id], map_message)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    fn list_by_session(&self, session_id: &str) -> Result<Vec<MessageRow>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM conversations WHERE session_id = ? ORDER BY id ASC",
            MESSAGE_COLUMNS
        ))?;
        let rows = stmt.query_map(params![session_id], map_message)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    fn list_conversations(
        &self,
        filter: &ConversationFilter,
        page: u32,
    ) -> Result<ConversationPage> {
        let mut where_clauses = vec!["1=1".to_string()];
        let mut values: Vec<Value> = vec![];

        if let Some(search) = filter.search.as_deref().filter(|s| !s.trim().is_empty()) {
            where_clauses.push(
                r"(session_id LIKE ?1 ESCAPE '\' OR thread_id LIKE ?1 ESCAPE '\' OR message_text LIKE ?1 ESCAPE '\')"
                    .to_string(),
            );
            values.push(Value::Text(format!("%{}%", escape_like(search.trim()))));
        }
        if let Some(start) = filter.start_date {
            values.push(Value::Text(start.format("%Y-%m-%d").to_string()));
            where_clauses.push(format!("date(created_at) >= ?{}", values.len()));
        }
        if let Some(end) = filter.end_date {
            values.push(Value::Text(end.format("%Y-%m-%d").to_string()));
            where_clauses.push(format!("date(created_at) <= ?{}", values.len()));
        }
        let where_sql = where_clauses.join(" AND ");

        let conn = self.conn()?;

        let total: i64 = conn.query_row(
            &format!(
                "SELECT COUNT(*) FROM (SELECT 1 FROM conversations WHERE {} GROUP BY session_id, thread_id)",
                where_sql
            ),
            params_from_iter(values.iter()),
            |row| row.get(0),
        )?;

        let page = page.max(1);
        let offset = i64::from(page - 1) * i64::from(PAGE_SIZE);
        let limit_idx = values.len() + 1;
        let offset_idx = values.len() + 2;
        values.push(Value::Integer(i64::from(PAGE_SIZE)));
        values.push(Value::Integer(offset));

        let mut stmt = conn.prepare(&format!(
            r#"SELECT session_id, thread_id,
                      MIN(created_at) AS first_message_time,
                      MAX(created_at) AS last_message_time,
                      COUNT(*) AS message_count
               FROM conversations
               WHERE {}
               GROUP BY session_id, thread_id
               ORDER BY MAX(id) DESC
               LIMIT ?{} OFFSET ?{}"#,
            where_sql, limit_idx, offset_idx
        ))?;

        let summaries = stmt
            .query_map(params_from_iter(values.iter()), |row| {
                Ok(ConversationSummary {
                    session_id: row.get(0)?,
                    thread_id: row.get(1)?,
                    first_message_at: row.get(2)?,
                    last_message_at: row.get(3)?,
                    message_count: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let total_pages = ((total as u64).div_ceil(u64::from(PAGE_SIZE))) as u32;

        Ok(ConversationPage {
            summaries,
            total,
            page,
            total_pages,
        })
    }

    fn delete_by_session(&self, session_id: &str) -> Result<usize> {
        let conn = self.conn()?;
        let deleted = conn.execute(
            "DELETE FROM conversations WHERE session_id = ?",
            params![session_id],
        )?;
        Ok(deleted)
    }
}

// ============================================
// VISITORS
// ============================================

impl VisitorStore for ChatStore {
    fn insert_visitor(
        &self,
        user_name: Option<&str>,
        email: Option<&str>,
        phone: Option<&str>,
    ) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO visitors (user_name, email, phone, created_at) VALUES (?, ?, ?, ?)",
            params![user_name, email, phone, now_timestamp()],
        )
        .context("Failed to save visitor information")?;
        Ok(conn.last_insert_rowid())
    }

    fn get_visitor(&self, id: i64) -> Result<Option<VisitorRow>> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT id, user_name, email, phone, created_at FROM visitors WHERE id = ?",
            params![id],
            |row| {
                Ok(VisitorRow {
                    id: row.get(0)?,
                    user_name: row.get(1)?,
                    email: row.get(2)?,
                    phone: row.get(3)?,
                    created_at: row.get(4)?,
                })
            },
        )
        .optional()
        .map_err(Into::into)
    }
}

fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn escape_like(term: &str) -> String {
    term.replace('\\', r"\\")
        .replace('%', r"\%")
        .replace('_', r"\_")
}

fn map_message(row: &rusqlite::Row) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        session_id: row.get(1)?,
        thread_id: row.get(2)?,
        role: row.get(3)?,
        body: row.get(4)?,
        visitor_record_id: row.get(5)?,
        page_id: row.get(6)?,
        assistant_id: row.get(7)?,
        created_at: row.get(8)?,
    })
}

fn map_pdf(row: &rusqlite::Row) -> rusqlite::Result<PdfRow> {
    Ok(PdfRow {
        id: row.get(0)?,
        name: row.get(1)?,
        path: row.get(2)?,
        openai_file_id: row.get(3)?,
        created_at: row.get(4)?,
    })
}

// ============================================
// ROW TYPES
// ============================================

#[derive(Debug, Clone, Serialize)]
pub struct MessageRow {
    pub id: i64,
    pub session_id: String,
    pub thread_id: String,
    pub role: Role,
    pub body: String,
    pub visitor_record_id: Option<i64>,
    pub page_id: Option<i64>,
    pub assistant_id: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct ConversationSummary {
    pub session_id: String,
    pub thread_id: String,
    pub first_message_at: String,
    pub last_message_at: String,
    pub message_count: i64,
}

#[derive(Debug, Clone)]
pub struct ConversationPage {
    pub summaries: Vec<ConversationSummary>,
    /// Conversations matching the filter across all pages
    pub total: i64,
    pub page: u32,
    pub total_pages: u32,
}

#[derive(Debug, Clone)]
pub struct VisitorRow {
    pub id: i64,
    pub user_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct PdfRow {
    pub id: i64,
    pub name: String,
    pub path: String,
    pub openai_file_id: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct AssistantRow {
    pub id: i64,
    pub openai_assistant_id: String,
    pub name: String,
    pub file_ids: Vec<String>,
    pub created_at: String,
}
