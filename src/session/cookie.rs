//! Cookie-only session manager
//!
//! Session id, thread id and visitor record id all travel as HTTP-only
//! cookies; the server keeps no session state.

use tracing::warn;

use super::{
    generate_session_id, parse_record_id, SessionJar, SessionManager, SESSION_COOKIE,
    THREAD_COOKIE, VISITOR_COOKIE,
};

pub struct CookieSessionManager {
    secure: bool,
}

impl CookieSessionManager {
    pub fn new(secure: bool) -> Self {
        Self { secure }
    }
}

impl SessionManager for CookieSessionManager {
    fn resolve_session(&self, jar: &mut SessionJar) -> String {
        if let Some(existing) = jar.get(SESSION_COOKIE) {
            return existing.to_string();
        }

        let session_id = generate_session_id();
        if !jar.set(SESSION_COOKIE, &session_id, self.secure) {
            warn!(%session_id, "response already committed; session cookie not set");
        }
        session_id
    }

    fn resolve_thread(&self, jar: &SessionJar) -> Option<String> {
        jar.get(THREAD_COOKIE).map(String::from)
    }

    fn bind_thread(&self, jar: &mut SessionJar, thread_id: &str) -> bool {
        if thread_id.trim().is_empty() {
            return false;
        }
        jar.set(THREAD_COOKIE, thread_id.trim(), self.secure)
    }

    fn visitor_record_id(&self, jar: &SessionJar) -> Option<i64> {
        jar.get(VISITOR_COOKIE).and_then(parse_record_id)
    }

    fn mark_visitor_info_captured(&self, jar: &mut SessionJar, visitor_record_id: i64) -> bool {
        if visitor_record_id <= 0 {
            return false;
        }
        jar.set(VISITOR_COOKIE, &visitor_record_id.to_string(), self.secure)
    }

    fn clear(&self, jar: &mut SessionJar) -> bool {
        let mut success = true;
        for name in [SESSION_COOKIE, THREAD_COOKIE, VISITOR_COOKIE] {
            if jar.get(name).is_some() && !jar.remove(name) {
                success = false;
            }
        }
        success
    }
}
