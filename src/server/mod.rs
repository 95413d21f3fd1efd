//! HTTP boundary for the chat widget

pub mod error;
mod handlers;
pub mod token;

pub use error::{ApiError, ApiResult};
pub use token::{TokenError, TokenIssuer};

use anyhow::{Context, Result};
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tracing::{info, warn};

use crate::assistant::{AssistantApi, OpenAiAssistant};
use crate::config::{Config, SessionStoreKind};
use crate::relay::{Relay, RelaySettings, VisitorIntake};
use crate::session::{CookieSessionManager, ServerSessionManager, SessionManager};
use crate::store::{ChatStore, ConversationStore};

/// Shared, read-only per-process state
pub struct AppState {
    pub relay: Arc<Relay>,
    pub intake: VisitorIntake,
    pub store: Arc<dyn ConversationStore>,
    pub tokens: TokenIssuer,
}

impl AppState {
    pub fn from_config(config: &Config) -> Result<Self> {
        let store = Arc::new(
            ChatStore::open(&config.database_path()).context("Failed to open chat database")?,
        );

        let sessions: Arc<dyn SessionManager> = match config.server.session_store {
            SessionStoreKind::Cookie => {
                Arc::new(CookieSessionManager::new(config.server.secure_cookies))
            }
            SessionStoreKind::Server => {
                Arc::new(ServerSessionManager::new(config.server.secure_cookies))
            }
        };

        let assistant: Option<Arc<dyn AssistantApi>> = match OpenAiAssistant::from_config(config) {
            Ok(client) => Some(Arc::new(client)),
            Err(e) => {
                warn!(error = %e, "assistant client unavailable; chat will report not configured");
                None
            }
        };
        if config.assistant_id().is_none() {
            warn!("no assistant id configured; chat will report not configured");
        }

        let relay = Relay::new(
            assistant,
            sessions.clone(),
            store.clone(),
            RelaySettings::from_config(config),
        );

        Ok(Self {
            relay: Arc::new(relay),
            intake: VisitorIntake::new(sessions, store.clone()),
            store,
            tokens: TokenIssuer::from_secret(config.server.token_secret.as_deref()),
        })
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/chat/bootstrap", get(handlers::bootstrap))
        .route("/chat/session", post(handlers::create_session))
        .route("/chat/reset", post(handlers::reset_session))
        .route("/chat/message", post(handlers::send_message))
        .route("/chat/visitor", post(handlers::submit_visitor))
        .with_state(state)
}

/// Bind and serve until Ctrl-C
pub async fn serve(config: &Config) -> Result<()> {
    let state = Arc::new(AppState::from_config(config)?);
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind))?;
    info!(bind = %config.server.bind, "chat relay listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down");
        })
        .await
        .context("Server error")?;
    Ok(())
}
