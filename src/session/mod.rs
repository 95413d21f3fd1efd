//! Anonymous visitor sessions
//!
//! A browser is identified by an opaque session token it carries in a cookie.
//! The token maps to at most one assistant thread and, once the intake form has
//! been submitted, to a visitor record. Where those bindings live is up to the
//! `SessionManager` implementation; callers only see the trait.

mod cookie;
mod server_side;

pub use cookie::CookieSessionManager;
pub use server_side::ServerSessionManager;

use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue};
use chrono::{Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

pub const SESSION_COOKIE: &str = "sitecompass_session_id";
pub const THREAD_COOKIE: &str = "sitecompass_thread_id";
pub const VISITOR_COOKIE: &str = "sitecompass_user_session_id";

/// Lifetime of every session token
pub const SESSION_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

const MAX_TOKEN_LEN: usize = 255;

/// Mint a new globally unique session id: time component plus 122 random bits
pub fn generate_session_id() -> String {
    format!(
        "sc_{:x}_{}",
        Utc::now().timestamp_millis(),
        Uuid::new_v4().simple()
    )
}

/// Strip anything that is not a plain token character; `None` when nothing is left
pub fn sanitize_token(raw: &str) -> Option<String> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
        .take(MAX_TOKEN_LEN)
        .collect();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

/// Per-request view of the browser's persistent tokens
///
/// Holds the cookies the request arrived with and the `Set-Cookie` values the
/// response will carry. Once committed (the response head is being written)
/// no further cookie can be set.
#[derive(Debug, Default)]
pub struct SessionJar {
    cookies: HashMap<String, String>,
    outgoing: Vec<String>,
    committed: bool,
}

impl SessionJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read every `Cookie` header of a request
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let mut jar = Self::new();
        for value in headers.get_all(COOKIE) {
            let Ok(value) = value.to_str() else {
                continue;
            };
            for pair in value.split(';') {
                if let Some((name, raw)) = pair.split_once('=') {
                    if let Some(token) = sanitize_token(raw) {
                        jar.cookies.insert(name.trim().to_string(), token);
                    }
                }
            }
        }
        jar
    }

    pub fn with_cookie(mut self, name: &str, value: &str) -> Self {
        if let Some(token) = sanitize_token(value) {
            self.cookies.insert(name.to_string(), token);
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    /// Queue a persistent cookie; false once the response is committed
    pub fn set(&mut self, name: &str, value: &str, secure: bool) -> bool {
        if self.committed {
            return false;
        }
        let expires = Utc::now() + ChronoDuration::seconds(SESSION_TTL.as_secs() as i64);
        self.outgoing.push(format!(
            "{}={}; Path=/; Max-Age={}; Expires={}; HttpOnly; SameSite=Lax{}",
            name,
            value,
            SESSION_TTL.as_secs(),
            expires.format("%a, %d %b %Y %H:%M:%S GMT"),
            if secure { "; Secure" } else { "" }
        ));
        self.cookies.insert(name.to_string(), value.to_string());
        true
    }

    /// Queue an expired cookie; false once the response is committed
    pub fn remove(&mut self, name: &str) -> bool {
        if self.committed {
            return false;
        }
        self.outgoing.push(format!(
            "{}=; Path=/; Max-Age=0; Expires=Thu, 01 Jan 1970 00:00:00 GMT; HttpOnly; SameSite=Lax",
            name
        ));
        self.cookies.remove(name);
        true
    }

    pub fn is_committed(&self) -> bool {
        self.committed
    }

    /// Freeze the jar and hand back the queued `Set-Cookie` values
    pub fn commit(&mut self) -> Vec<String> {
        self.committed = true;
        std::mem::take(&mut self.outgoing)
    }

    /// Commit and append the queued cookies to a response header map
    pub fn write_to(&mut self, headers: &mut HeaderMap) {
        for cookie in self.commit() {
            if let Ok(value) = HeaderValue::from_str(&cookie) {
                headers.append(SET_COOKIE, value);
            }
        }
    }
}

/// Maps a browser to its session id, thread and visitor record
pub trait SessionManager: Send + Sync {
    /// Existing session id, or a freshly minted one persisted for 30 days
    fn resolve_session(&self, jar: &mut SessionJar) -> String;

    fn resolve_thread(&self, jar: &SessionJar) -> Option<String>;

    /// Bind a thread to the session, overwriting any previous binding.
    /// Returns false when the id is empty or the binding could not be persisted.
    fn bind_thread(&self, jar: &mut SessionJar, thread_id: &str) -> bool;

    fn visitor_record_id(&self, jar: &SessionJar) -> Option<i64>;

    /// Record that the intake form was submitted for this session
    fn mark_visitor_info_captured(&self, jar: &mut SessionJar, visitor_record_id: i64) -> bool;

    fn is_visitor_info_captured(&self, jar: &SessionJar) -> bool {
        self.visitor_record_id(jar).is_some()
    }

    /// Forget the session and all of its bindings
    fn clear(&self, jar: &mut SessionJar) -> bool;
}

fn parse_record_id(raw: &str) -> Option<i64> {
    raw.parse::<i64>().ok().filter(|id| *id > 0)
}
