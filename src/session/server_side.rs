//! Server-side session bindings
//!
//! Only the session id is a cookie. Thread and visitor bindings are kept in
//! process memory keyed by that token, so they survive a committed response
//! but not a restart. A binding untouched for longer than the cookie lifetime
//! is dropped on the next write.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::{generate_session_id, SessionJar, SessionManager, SESSION_COOKIE, SESSION_TTL};

#[derive(Debug, Clone)]
struct Binding {
    thread_id: Option<String>,
    visitor_record_id: Option<i64>,
    last_seen: Instant,
}

impl Binding {
    fn new() -> Self {
        Self {
            thread_id: None,
            visitor_record_id: None,
            last_seen: Instant::now(),
        }
    }
}

pub struct ServerSessionManager {
    secure: bool,
    ttl: Duration,
    bindings: Mutex<HashMap<String, Binding>>,
}

impl ServerSessionManager {
    pub fn new(secure: bool) -> Self {
        Self::with_ttl(secure, SESSION_TTL)
    }

    pub fn with_ttl(secure: bool, ttl: Duration) -> Self {
        Self {
            secure,
            ttl,
            bindings: Mutex::new(HashMap::new()),
        }
    }

    fn read<T>(&self, jar: &SessionJar, f: impl FnOnce(&Binding) -> Option<T>) -> Option<T> {
        let session_id = jar.get(SESSION_COOKIE)?;
        let bindings = self.bindings.lock().ok()?;
        bindings
            .get(session_id)
            .filter(|b| b.last_seen.elapsed() < self.ttl)
            .and_then(f)
    }

    fn update(&self, jar: &mut SessionJar, f: impl FnOnce(&mut Binding)) -> bool {
        let session_id = self.resolve_session(jar);
        match self.bindings.lock() {
            Ok(mut bindings) => {
                let before = bindings.len();
                bindings.retain(|_, b| b.last_seen.elapsed() < self.ttl);
                if bindings.len() < before {
                    debug!(evicted = before - bindings.len(), "expired session bindings dropped");
                }

                let binding = bindings.entry(session_id).or_insert_with(Binding::new);
                binding.last_seen = Instant::now();
                f(binding);
                true
            }
            Err(_) => {
                warn!("session binding lock poisoned");
                false
            }
        }
    }
}

impl SessionManager for ServerSessionManager {
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
        self.read(jar, |b| b.thread_id.clone())
    }

    fn bind_thread(&self, jar: &mut SessionJar, thread_id: &str) -> bool {
        let thread_id = thread_id.trim();
        if thread_id.is_empty() {
            return false;
        }
        self.update(jar, |b| b.thread_id = Some(thread_id.to_string()))
    }

    fn visitor_record_id(&self, jar: &SessionJar) -> Option<i64> {
        self.read(jar, |b| b.visitor_record_id)
    }

    fn mark_visitor_info_captured(&self, jar: &mut SessionJar, visitor_record_id: i64) -> bool {
        if visitor_record_id <= 0 {
            return false;
        }
        self.update(jar, |b| b.visitor_record_id = Some(visitor_record_id))
    }

    fn clear(&self, jar: &mut SessionJar) -> bool {
        if let Some(session_id) = jar.get(SESSION_COOKIE).map(String::from) {
            if let Ok(mut bindings) = self.bindings.lock() {
                bindings.remove(&session_id);
            }
            return jar.remove(SESSION_COOKIE);
        }
        true
    }
}
