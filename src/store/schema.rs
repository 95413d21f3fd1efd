//! SQLite schema definition
//!
//! Four tables:
//! - conversations: append-only transcript, one row per chat turn
//! - visitors: optional name/email/phone captured by the intake form
//! - pdfs: knowledge base documents uploaded to the assistant service
//! - assistants: assistants created over those documents

pub const SCHEMA: &str = r#"
-- ============================================
-- CONVERSATIONS
-- ============================================

-- Every message exchanged, never updated in place
CREATE TABLE IF NOT EXISTS conversations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id TEXT NOT NULL,              -- Browser session token
    user_id INTEGER,                       -- visitors.id once the intake form was submitted
    page_id INTEGER,                       -- Page the widget was embedded on
    user_type TEXT NOT NULL CHECK (user_type IN ('user', 'assistant')),
    thread_id TEXT NOT NULL,               -- Assistant service thread
    assistant_id TEXT,                     -- Assistant that produced / received the turn
    message_text TEXT NOT NULL,
    created_at TEXT NOT NULL               -- RFC 3339 UTC, millisecond precision
);

-- ============================================
-- VISITORS
-- ============================================

CREATE TABLE IF NOT EXISTS visitors (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_name TEXT,
    email TEXT,
    phone TEXT,
    created_at TEXT NOT NULL
);

-- ============================================
-- KNOWLEDGE BASE
-- ============================================

CREATE TABLE IF NOT EXISTS pdfs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    path TEXT NOT NULL,
    openai_file_id TEXT,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS assistants (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    openai_assistant_id TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL,
    openai_file_ids TEXT,                  -- JSON array of vector store / file ids
    created_at TEXT NOT NULL
);

-- ============================================
-- INDEXES
-- ============================================

CREATE INDEX IF NOT EXISTS idx_conversations_session ON conversations(session_id);
CREATE INDEX IF NOT EXISTS idx_conversations_thread ON conversations(thread_id);
CREATE INDEX IF NOT EXISTS idx_conversations_created ON conversations(created_at);

CREATE INDEX IF NOT EXISTS idx_visitors_email ON visitors(email);
CREATE INDEX IF NOT EXISTS idx_pdfs_file_id ON pdfs(openai_file_id);
"#;
