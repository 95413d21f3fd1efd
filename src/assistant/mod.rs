//! Assistant service client trait and shared types
//!
//! The assistant itself is an opaque remote service: threads hold the
//! conversation context, runs execute the assistant against a thread, and the
//! client only ever stores the identifiers the service hands back.

mod openai;

pub use openai::OpenAiAssistant;

use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

use crate::store::Role;

/// Failures talking to the assistant service
#[derive(Debug, Error)]
pub enum AssistantError {
    /// DNS, connect, TLS or timeout failure; the request never got an answer
    #[error("transport error: {0}")]
    Transport(String),

    /// The service answered with an error envelope or a non-2xx status
    #[error("assistant API error [{code}]: {message}")]
    Api { code: String, message: String },

    #[error("no assistant id supplied")]
    MissingAssistantId,

    #[error("no API credential configured")]
    MissingCredential,

    /// A 2xx answer that lacked a field the client needs
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("failed to read upload: {0}")]
    Io(#[from] std::io::Error),
}

/// Reference to a message posted to a remote thread
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRef {
    pub id: String,
}

/// Lifecycle of one assistant run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    InProgress,
    RequiresAction,
    Cancelling,
    Completed,
    Failed,
    Cancelled,
    Expired,
    Incomplete,
    #[serde(other)]
    Unknown,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Queued => "queued",
            RunStatus::InProgress => "in_progress",
            RunStatus::RequiresAction => "requires_action",
            RunStatus::Cancelling => "cancelling",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
            RunStatus::Expired => "expired",
            RunStatus::Incomplete => "incomplete",
            RunStatus::Unknown => "unknown",
        }
    }

    /// Terminal states that will never produce a reply
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            RunStatus::Failed | RunStatus::Cancelled | RunStatus::Expired
        )
    }
}

/// Outcome of a credential check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialStatus {
    Valid,
    Invalid { reason: String },
}

/// Typed wrapper over the assistant HTTP API
///
/// Implementations are stateless apart from credentials, so one instance is
/// shared by every request.
#[async_trait]
pub trait AssistantApi: Send + Sync {
    async fn create_thread(&self) -> Result<String, AssistantError>;

    async fn post_message(
        &self,
        thread_id: &str,
        role: Role,
        body: &str,
    ) -> Result<MessageRef, AssistantError>;

    /// Start a run; fails with `MissingAssistantId` without any request when
    /// no assistant id is supplied.
    async fn start_run(
        &self,
        thread_id: &str,
        assistant_id: Option<&str>,
    ) -> Result<String, AssistantError>;

    async fn run_status(&self, thread_id: &str, run_id: &str) -> Result<RunStatus, AssistantError>;

    async fn cancel_run(&self, thread_id: &str, run_id: &str) -> Result<(), AssistantError>;

    /// Text of the newest message on the thread; empty when it has none
    async fn latest_message(&self, thread_id: &str) -> Result<String, AssistantError>;

    /// Upload a knowledge base document, returning the service's file id
    async fn upload_file(&self, path: &Path) -> Result<String, AssistantError>;

    async fn delete_file(&self, file_id: &str) -> Result<(), AssistantError>;

    /// Create an assistant with file search over the given vector stores
    async fn create_assistant(
        &self,
        name: &str,
        vector_store_ids: &[String],
    ) -> Result<String, AssistantError>;

    async fn verify_credential(&self) -> Result<CredentialStatus, AssistantError>;
}
