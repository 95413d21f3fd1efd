//! Relay failure taxonomy
//!
//! `Display` carries the technical detail for server logs; `user_message`
//! is the only text a browser ever sees.

use thiserror::Error;

use crate::assistant::{AssistantError, RunStatus};

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("no API credential configured")]
    CredentialNotConfigured,

    #[error("no assistant id configured")]
    AssistantNotConfigured,

    #[error("thread creation failed: {0}")]
    ThreadCreationFailed(#[source] AssistantError),

    #[error("message submission failed: {0}")]
    MessageSubmissionFailed(#[source] AssistantError),

    #[error("run start failed: {0}")]
    RunStartFailed(#[source] AssistantError),

    #[error("run status check failed: {0}")]
    RunStatusFailed(#[source] AssistantError),

    #[error("run ended with status '{}'", .0.as_str())]
    RunFailed(RunStatus),

    #[error("run still pending after {attempts} status checks")]
    RunTimeout { attempts: u32 },

    #[error("caller abandoned the request while the run was pending")]
    Cancelled,

    #[error("response retrieval failed: {0}")]
    ResponseRetrievalFailed(#[source] AssistantError),

    #[error("persistence error: {0}")]
    Persistence(String),
}

impl RelayError {
    /// Short, non-technical text for the chat widget
    pub fn user_message(&self) -> String {
        match self {
            RelayError::Validation(message) => message.clone(),
            RelayError::CredentialNotConfigured | RelayError::AssistantNotConfigured => {
                "The chat assistant is not configured yet.".to_string()
            }
            RelayError::ThreadCreationFailed(_) => {
                "Failed to create conversation thread.".to_string()
            }
            RelayError::MessageSubmissionFailed(_) => {
                "Failed to send message to assistant.".to_string()
            }
            RelayError::RunStartFailed(_) => "Failed to run assistant.".to_string(),
            RelayError::RunStatusFailed(_) => "Failed to retrieve run status.".to_string(),
            RelayError::RunFailed(_) => "Assistant run failed.".to_string(),
            RelayError::RunTimeout { .. } => "Assistant response timeout.".to_string(),
            RelayError::Cancelled => "Request cancelled.".to_string(),
            RelayError::ResponseRetrievalFailed(_) => {
                "Failed to retrieve assistant response.".to_string()
            }
            RelayError::Persistence(_) => "Failed to save your information.".to_string(),
        }
    }

    /// Rejected before any side effect
    pub fn is_validation(&self) -> bool {
        matches!(self, RelayError::Validation(_))
    }

    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            RelayError::CredentialNotConfigured | RelayError::AssistantNotConfigured
        )
    }
}
