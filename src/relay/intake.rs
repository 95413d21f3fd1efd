//! Visitor intake form
//!
//! Name, email and phone are all optional individually, but at least one must
//! be present and an email, when given, must look like one.

use regex::Regex;
use std::sync::{Arc, OnceLock};
use tracing::{error, info, warn};

use super::RelayError;
use crate::session::{SessionJar, SessionManager};
use crate::store::VisitorStore;

const MAX_FIELD_CHARS: usize = 255;

fn email_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"^[A-Za-z0-9.!#$%&'*+/=?^_`{|}~-]+@[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?)+$",
        )
        .expect("email pattern is valid")
    })
}

pub fn is_valid_email(email: &str) -> bool {
    email.len() >= 6 && email_pattern().is_match(email)
}

/// Submitted intake fields, trimmed and with blanks dropped
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VisitorInfo {
    pub user_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

impl VisitorInfo {
    pub fn new(user_name: Option<&str>, email: Option<&str>, phone: Option<&str>) -> Self {
        Self {
            user_name: clean(user_name),
            email: clean(email),
            phone: clean(phone),
        }
    }

    pub fn validate(&self) -> Result<(), RelayError> {
        if self.user_name.is_none() && self.email.is_none() && self.phone.is_none() {
            return Err(RelayError::Validation(
                "Please provide at least one piece of information.".to_string(),
            ));
        }
        if let Some(email) = &self.email {
            if !is_valid_email(email) {
                return Err(RelayError::Validation(
                    "Please provide a valid email address.".to_string(),
                ));
            }
        }
        Ok(())
    }
}

fn clean(value: Option<&str>) -> Option<String> {
    let cleaned: String = value?
        .chars()
        .filter(|c| !c.is_control())
        .take(MAX_FIELD_CHARS)
        .collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned.to_string())
    }
}

/// Validates intake submissions, records them and marks the session
pub struct VisitorIntake {
    sessions: Arc<dyn SessionManager>,
    store: Arc<dyn VisitorStore>,
}

impl VisitorIntake {
    pub fn new(sessions: Arc<dyn SessionManager>, store: Arc<dyn VisitorStore>) -> Self {
        Self { sessions, store }
    }

    /// Store the visitor record and return its id
    pub fn submit(&self, jar: &mut SessionJar, info: &VisitorInfo) -> Result<i64, RelayError> {
        info.validate()?;

        let visitor_id = self
            .store
            .insert_visitor(
                info.user_name.as_deref(),
                info.email.as_deref(),
                info.phone.as_deref(),
            )
            .map_err(|e| {
                error!(error = %e, "failed to save visitor information");
                RelayError::Persistence(e.to_string())
            })?;

        let session_id = self.sessions.resolve_session(jar);
        if !self.sessions.mark_visitor_info_captured(jar, visitor_id) {
            warn!(%session_id, visitor_id, "could not persist visitor marker");
        }
        info!(%session_id, visitor_id, "visitor information captured");

        Ok(visitor_id)
    }
}
