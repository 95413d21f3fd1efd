//! Chat widget endpoints

use axum::{
    extract::State,
    http::HeaderMap,
    response::{IntoResponse, Response},
    Form, Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::error::{ApiError, ApiResult};
use super::AppState;
use crate::relay::{InboundMessage, VisitorInfo};
use crate::session::SessionJar;
use crate::store::Role;

#[derive(Debug, Deserialize)]
pub struct TokenForm {
    pub token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MessageForm {
    pub token: Option<String>,
    pub message: Option<String>,
    pub page_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct VisitorForm {
    pub token: Option<String>,
    pub user_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HistoryEntry {
    pub role: Role,
    pub message: String,
    pub created_at: String,
}

/// Wrap a handler result in the response envelope and attach queued cookies
fn respond<T: Serialize>(jar: &mut SessionJar, result: ApiResult<T>) -> Response {
    let mut response = match result {
        Ok(data) => Json(json!({ "success": true, "data": data })).into_response(),
        Err(e) => e.into_response(),
    };
    jar.write_to(response.headers_mut());
    response
}

pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// GET /chat/bootstrap
///
/// History is replayed only from rows written under the caller's own session,
/// whatever thread id the browser presents.
pub async fn bootstrap(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let mut jar = SessionJar::from_headers(&headers);
    let sessions = state.relay.sessions();
    let session_id = sessions.resolve_session(&mut jar);

    let history = match sessions.resolve_thread(&jar) {
        Some(thread_id) => match state.store.list_by_thread(&thread_id) {
            Ok(rows) => rows
                .into_iter()
                .filter(|row| row.session_id == session_id)
                .map(|row| HistoryEntry {
                    role: row.role,
                    message: row.body,
                    created_at: row.created_at,
                })
                .collect(),
            Err(e) => {
                warn!(%session_id, %thread_id, error = %e, "failed to load chat history");
                Vec::new()
            }
        },
        None => Vec::new(),
    };

    let data = json!({
        "token": state.tokens.issue(),
        "session_id": session_id,
        "show_visitor_form": state.relay.needs_visitor_info(&jar),
        "history": history,
    });
    respond(&mut jar, Ok(data))
}

/// POST /chat/session
pub async fn create_session(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Form(form): Form<TokenForm>,
) -> Response {
    let mut jar = SessionJar::from_headers(&headers);
    let result = state.tokens.verify(form.token.as_deref()).map_err(ApiError::from).map(|_| {
        let session_id = state.relay.sessions().resolve_session(&mut jar);
        json!({ "session_id": session_id })
    });
    respond(&mut jar, result)
}

/// POST /chat/reset
///
/// Forget the browser's session, thread and visitor bindings; the next page
/// load starts a fresh conversation.
pub async fn reset_session(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Form(form): Form<TokenForm>,
) -> Response {
    let mut jar = SessionJar::from_headers(&headers);
    let result = state.tokens.verify(form.token.as_deref()).map_err(ApiError::from).and_then(|_| {
        if state.relay.sessions().clear(&mut jar) {
            Ok(json!({ "cleared": true }))
        } else {
            Err(ApiError::internal("Could not reset the chat session."))
        }
    });
    respond(&mut jar, result)
}

/// POST /chat/message
///
/// The relay runs on its own task; if the client goes away the drop guard
/// cancels the token and the pending run is abandoned.
pub async fn send_message(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Form(form): Form<MessageForm>,
) -> Response {
    let jar = SessionJar::from_headers(&headers);
    if let Err(e) = state.tokens.verify(form.token.as_deref()) {
        return ApiError::from(e).into_response();
    }

    let message = InboundMessage {
        text: form.message.unwrap_or_default(),
        page_id: form
            .page_id
            .as_deref()
            .and_then(|p| p.trim().parse::<i64>().ok())
            .filter(|p| *p > 0),
    };

    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();
    let relay = state.relay.clone();
    let task = tokio::spawn(async move {
        let mut jar = jar;
        let result = relay.send_message(&mut jar, &message, &cancel).await;
        (jar, result)
    });

    match task.await {
        Ok((mut jar, result)) => respond(&mut jar, result.map_err(ApiError::from)),
        Err(e) => {
            error!(error = %e, "relay task aborted");
            ApiError::internal("An unexpected error occurred.").into_response()
        }
    }
}

/// POST /chat/visitor
pub async fn submit_visitor(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Form(form): Form<VisitorForm>,
) -> Response {
    let mut jar = SessionJar::from_headers(&headers);
    if let Err(e) = state.tokens.verify(form.token.as_deref()) {
        return respond::<()>(&mut jar, Err(e.into()));
    }

    let info = VisitorInfo::new(
        form.user_name.as_deref(),
        form.email.as_deref(),
        form.phone.as_deref(),
    );
    let result = state
        .intake
        .submit(&mut jar, &info)
        .map(|visitor_record_id| {
            info!(visitor_record_id, "visitor intake accepted");
            json!({
                "visitor_record_id": visitor_record_id,
                "message": "Thank you! You can now start chatting.",
            })
        })
        .map_err(ApiError::from);
    respond(&mut jar, result)
}
