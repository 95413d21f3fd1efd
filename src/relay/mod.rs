//! Message relay
//!
//! Drives one chat turn from the browser to the assistant service and back:
//! resolve the thread, record the user's turn, submit it, run the assistant,
//! wait for the run and record the reply.

mod error;
pub mod intake;
mod poll;

#[cfg(test)]
pub(crate) mod testing;

pub use error::RelayError;
pub use intake::{VisitorInfo, VisitorIntake};
pub use poll::{wait_for_run, PollPolicy};

use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::assistant::AssistantApi;
use crate::config::Config;
use crate::session::{SessionJar, SessionManager};
use crate::store::{ConversationStore, NewMessage, Role};

/// Immutable relay configuration, fixed at construction
#[derive(Debug, Clone)]
pub struct RelaySettings {
    pub assistant_id: Option<String>,
    pub poll: PollPolicy,
    pub max_message_chars: usize,
    pub require_visitor_info: bool,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            assistant_id: None,
            poll: PollPolicy::default(),
            max_message_chars: 4000,
            require_visitor_info: false,
        }
    }
}

impl RelaySettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            assistant_id: config.assistant_id().map(String::from),
            poll: PollPolicy {
                interval: config.poll_interval(),
                max_attempts: config.relay.max_poll_attempts,
            },
            max_message_chars: config.relay.max_message_chars,
            require_visitor_info: config.visitor.require_info,
        }
    }
}

/// Where a turn currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayStage {
    Idle,
    ThreadResolved,
    UserMessagePersisted,
    MessageSubmitted,
    RunStarted,
    Polling,
    Completed,
    Failed,
    TimedOut,
    ResponsePersisted,
    Done,
}

impl RelayStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelayStage::Idle => "idle",
            RelayStage::ThreadResolved => "thread_resolved",
            RelayStage::UserMessagePersisted => "user_message_persisted",
            RelayStage::MessageSubmitted => "message_submitted",
            RelayStage::RunStarted => "run_started",
            RelayStage::Polling => "polling",
            RelayStage::Completed => "completed",
            RelayStage::Failed => "failed",
            RelayStage::TimedOut => "timed_out",
            RelayStage::ResponsePersisted => "response_persisted",
            RelayStage::Done => "done",
        }
    }
}

/// A chat message as submitted by the widget
#[derive(Debug, Clone, Default)]
pub struct InboundMessage {
    pub text: String,
    pub page_id: Option<i64>,
}

impl InboundMessage {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            page_id: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RelayReply {
    pub reply: String,
    pub thread_id: String,
    pub session_id: String,
}

pub struct Relay {
    assistant: Option<Arc<dyn AssistantApi>>,
    sessions: Arc<dyn SessionManager>,
    store: Arc<dyn ConversationStore>,
    settings: RelaySettings,
}

impl Relay {
    /// `assistant` is `None` when no API credential is configured
    pub fn new(
        assistant: Option<Arc<dyn AssistantApi>>,
        sessions: Arc<dyn SessionManager>,
        store: Arc<dyn ConversationStore>,
        settings: RelaySettings,
    ) -> Self {
        Self {
            assistant,
            sessions,
            store,
            settings,
        }
    }

    pub fn settings(&self) -> &RelaySettings {
        &self.settings
    }

    pub fn sessions(&self) -> &Arc<dyn SessionManager> {
        &self.sessions
    }

    /// Whether the widget must show the intake form before chatting
    pub fn needs_visitor_info(&self, jar: &SessionJar) -> bool {
        self.settings.require_visitor_info && !self.sessions.is_visitor_info_captured(jar)
    }

    /// Relay one user message and return the assistant's reply
    pub async fn send_message(
        &self,
        jar: &mut SessionJar,
        message: &InboundMessage,
        cancel: &CancellationToken,
    ) -> Result<RelayReply, RelayError> {
        let text = self.validate(&message.text)?;
        let session_id = self.sessions.resolve_session(jar);

        if self.needs_visitor_info(jar) {
            return Err(RelayError::Validation(
                "Please share your contact details before chatting.".to_string(),
            ));
        }

        let assistant = self
            .assistant
            .as_deref()
            .ok_or(RelayError::CredentialNotConfigured)?;
        let assistant_id = self
            .settings
            .assistant_id
            .as_deref()
            .ok_or(RelayError::AssistantNotConfigured)?;

        let mut stage = RelayStage::Idle;
        let result = self
            .run_turn(
                assistant,
                assistant_id,
                jar,
                &session_id,
                text,
                message.page_id,
                cancel,
                &mut stage,
            )
            .await;

        match &result {
            Ok(reply) => info!(
                %session_id,
                thread_id = %reply.thread_id,
                reply_chars = reply.reply.chars().count(),
                "chat turn completed"
            ),
            Err(e) => error!(%session_id, stage = stage.as_str(), error = %e, "chat turn failed"),
        }
        result
    }

    fn validate<'a>(&self, text: &'a str) -> Result<&'a str, RelayError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(RelayError::Validation("Message cannot be empty.".to_string()));
        }
        if text.chars().count() > self.settings.max_message_chars {
            return Err(RelayError::Validation(format!(
                "Message is too long (max {} characters).",
                self.settings.max_message_chars
            )));
        }
        Ok(text)
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_turn(
        &self,
        assistant: &dyn AssistantApi,
        assistant_id: &str,
        jar: &mut SessionJar,
        session_id: &str,
        text: &str,
        page_id: Option<i64>,
        cancel: &CancellationToken,
        stage: &mut RelayStage,
    ) -> Result<RelayReply, RelayError> {
        let thread_id = match self.sessions.resolve_thread(jar) {
            Some(thread_id) => thread_id,
            None => {
                let thread_id = assistant
                    .create_thread()
                    .await
                    .map_err(RelayError::ThreadCreationFailed)?;
                if !self.sessions.bind_thread(jar, &thread_id) {
                    warn!(session_id, %thread_id, "could not bind thread to session");
                }
                thread_id
            }
        };
        advance(stage, RelayStage::ThreadResolved, &thread_id);

        let visitor_record_id = self.sessions.visitor_record_id(jar);
        let record = |role: Role, body: &str| NewMessage {
            session_id: session_id.to_string(),
            thread_id: thread_id.clone(),
            role,
            body: body.to_string(),
            visitor_record_id,
            page_id,
            assistant_id: Some(assistant_id.to_string()),
        };

        if let Err(e) = self.store.append(&record(Role::User, text)) {
            warn!(session_id, %thread_id, error = %e, "failed to record user message");
        }
        advance(stage, RelayStage::UserMessagePersisted, &thread_id);

        assistant
            .post_message(&thread_id, Role::User, text)
            .await
            .map_err(RelayError::MessageSubmissionFailed)?;
        advance(stage, RelayStage::MessageSubmitted, &thread_id);

        let run_id = assistant
            .start_run(&thread_id, Some(assistant_id))
            .await
            .map_err(RelayError::RunStartFailed)?;
        advance(stage, RelayStage::RunStarted, &thread_id);

        advance(stage, RelayStage::Polling, &thread_id);
        match wait_for_run(assistant, &thread_id, &run_id, self.settings.poll, cancel).await {
            Ok(attempts) => {
                debug!(%run_id, attempts, "run completed");
                advance(stage, RelayStage::Completed, &thread_id);
            }
            Err(RelayError::RunTimeout { attempts }) => {
                advance(stage, RelayStage::TimedOut, &thread_id);
                return Err(RelayError::RunTimeout { attempts });
            }
            Err(RelayError::Cancelled) => {
                advance(stage, RelayStage::Failed, &thread_id);
                if let Err(e) = assistant.cancel_run(&thread_id, &run_id).await {
                    warn!(%run_id, error = %e, "failed to cancel abandoned run");
                }
                return Err(RelayError::Cancelled);
            }
            Err(e) => {
                advance(stage, RelayStage::Failed, &thread_id);
                return Err(e);
            }
        }

        let reply = assistant
            .latest_message(&thread_id)
            .await
            .map_err(RelayError::ResponseRetrievalFailed)?;

        match self.store.append(&record(Role::Assistant, &reply)) {
            Ok(_) => advance(stage, RelayStage::ResponsePersisted, &thread_id),
            Err(e) => warn!(session_id, %thread_id, error = %e, "failed to record assistant reply"),
        }

        advance(stage, RelayStage::Done, &thread_id);
        Ok(RelayReply {
            reply,
            thread_id,
            session_id: session_id.to_string(),
        })
    }
}

fn advance(stage: &mut RelayStage, next: RelayStage, thread_id: &str) {
    debug!(thread_id, from = stage.as_str(), to = next.as_str(), "relay stage");
    *stage = next;
}

#[cfg(test)]
mod tests {
    use super::testing::{FailingStore, FakeAssistant};
    use super::*;
    use crate::assistant::RunStatus;
    use crate::session::{CookieSessionManager, ServerSessionManager, SESSION_COOKIE};
    use crate::store::ChatStore;

    struct Harness {
        relay: Relay,
        assistant: Arc<FakeAssistant>,
        store: Arc<ChatStore>,
    }

    fn harness(assistant: FakeAssistant, settings: RelaySettings) -> Harness {
        let assistant = Arc::new(assistant);
        let store = Arc::new(ChatStore::open_in_memory().unwrap());
        let relay = Relay::new(
            Some(assistant.clone()),
            Arc::new(CookieSessionManager::new(false)),
            store.clone(),
            settings,
        );
        Harness {
            relay,
            assistant,
            store,
        }
    }

    fn configured() -> RelaySettings {
        RelaySettings {
            assistant_id: Some("asst_1".to_string()),
            ..RelaySettings::default()
        }
    }

    async fn send(relay: &Relay, jar: &mut SessionJar, text: &str) -> Result<RelayReply, RelayError> {
        relay
            .send_message(jar, &InboundMessage::new(text), &CancellationToken::new())
            .await
    }

    #[tokio::test(start_paused = true)]
    async fn test_fresh_browser_gets_reply_and_transcript() {
        let h = harness(FakeAssistant::completing(), configured());
        let mut jar = SessionJar::new();

        let reply = send(&h.relay, &mut jar, "Hello").await.unwrap();
        assert!(!reply.reply.is_empty());
        assert!(reply.session_id.starts_with("sc_"));
        assert_eq!(jar.get(SESSION_COOKIE), Some(reply.session_id.as_str()));

        let rows = h.store.list_by_thread(&reply.thread_id).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].role, Role::User);
        assert_eq!(rows[0].body, "Hello");
        assert_eq!(rows[0].assistant_id.as_deref(), Some("asst_1"));
        assert_eq!(rows[1].role, Role::Assistant);
        assert_eq!(rows[1].body, "Hi there");
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_message_rejected_before_side_effects() {
        let h = harness(FakeAssistant::completing(), configured());
        let mut jar = SessionJar::new();

        for text in ["", "   \n\t"] {
            let err = send(&h.relay, &mut jar, text).await.unwrap_err();
            assert!(err.is_validation());
        }
        assert_eq!(h.assistant.count("create_thread"), 0);
        assert!(jar.commit().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlong_message_rejected() {
        let h = harness(FakeAssistant::completing(), configured());
        let mut jar = SessionJar::new();
        let err = send(&h.relay, &mut jar, &"x".repeat(4001)).await.unwrap_err();
        assert!(err.is_validation());
        assert_eq!(h.assistant.count("create_thread"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_run_keeps_user_turn_only() {
        let h = harness(
            FakeAssistant::new().with_statuses(&[RunStatus::Failed]),
            configured(),
        );
        let mut jar = SessionJar::new();

        let err = send(&h.relay, &mut jar, "Hello").await.unwrap_err();
        assert!(matches!(err, RelayError::RunFailed(RunStatus::Failed)));

        let session_id = jar.get(SESSION_COOKIE).unwrap().to_string();
        let rows = h.store.list_by_session(&session_id).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].role, Role::User);
        assert_eq!(h.assistant.count("latest_message"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sequential_turns_reuse_thread() {
        let h = harness(FakeAssistant::completing(), configured());
        let mut jar = SessionJar::new();

        let first = send(&h.relay, &mut jar, "Hello").await.unwrap();
        let second = send(&h.relay, &mut jar, "Again").await.unwrap();

        assert_eq!(first.thread_id, second.thread_id);
        assert_eq!(first.session_id, second.session_id);
        assert_eq!(h.assistant.count("create_thread"), 1);
        assert_eq!(h.store.list_by_thread(&first.thread_id).unwrap().len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_returning_browser_reuses_thread_server_side() {
        let assistant = Arc::new(FakeAssistant::completing());
        let store = Arc::new(ChatStore::open_in_memory().unwrap());
        let relay = Relay::new(
            Some(assistant.clone()),
            Arc::new(ServerSessionManager::new(false)),
            store,
            configured(),
        );

        let mut first = SessionJar::new();
        let reply = send(&relay, &mut first, "Hello").await.unwrap();
        first.commit();

        let mut returning = SessionJar::new().with_cookie(SESSION_COOKIE, &reply.session_id);
        let again = send(&relay, &mut returning, "Again").await.unwrap();
        assert_eq!(again.thread_id, reply.thread_id);
        assert_eq!(assistant.count("create_thread"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_writes_no_assistant_row() {
        let h = harness(FakeAssistant::new(), configured());
        let mut jar = SessionJar::new();

        let err = send(&h.relay, &mut jar, "Hello").await.unwrap_err();
        assert!(matches!(err, RelayError::RunTimeout { attempts: 30 }));
        assert_eq!(h.assistant.count("run_status"), 30);

        let session_id = jar.get(SESSION_COOKIE).unwrap().to_string();
        let rows = h.store.list_by_session(&session_id).unwrap();
        assert!(rows.iter().all(|r| r.role == Role::User));
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_assistant_id_never_starts_run() {
        let h = harness(FakeAssistant::completing(), RelaySettings::default());
        let mut jar = SessionJar::new();

        let err = send(&h.relay, &mut jar, "Hello").await.unwrap_err();
        assert!(matches!(err, RelayError::AssistantNotConfigured));
        assert_eq!(h.assistant.count("start_run"), 0);
        assert_eq!(h.assistant.count("create_thread"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_credential_is_configuration_error() {
        let relay = Relay::new(
            None,
            Arc::new(CookieSessionManager::new(false)),
            Arc::new(ChatStore::open_in_memory().unwrap()),
            configured(),
        );
        let err = send(&relay, &mut SessionJar::new(), "Hello").await.unwrap_err();
        assert!(matches!(err, RelayError::CredentialNotConfigured));
        assert!(err.is_configuration());
    }

    #[tokio::test(start_paused = true)]
    async fn test_thread_creation_failure_persists_nothing() {
        let h = harness(
            FakeAssistant::completing().failing("create_thread"),
            configured(),
        );
        let mut jar = SessionJar::new();

        let err = send(&h.relay, &mut jar, "Hello").await.unwrap_err();
        assert!(matches!(err, RelayError::ThreadCreationFailed(_)));
        let session_id = jar.get(SESSION_COOKIE).unwrap().to_string();
        assert!(h.store.list_by_session(&session_id).unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_submission_failure_keeps_user_turn() {
        let h = harness(
            FakeAssistant::completing().failing("post_message"),
            configured(),
        );
        let mut jar = SessionJar::new();

        let err = send(&h.relay, &mut jar, "Hello").await.unwrap_err();
        assert!(matches!(err, RelayError::MessageSubmissionFailed(_)));
        let session_id = jar.get(SESSION_COOKIE).unwrap().to_string();
        assert_eq!(h.store.list_by_session(&session_id).unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reply_survives_persistence_failure() {
        let assistant = Arc::new(FakeAssistant::completing().with_reply("Still here"));
        let relay = Relay::new(
            Some(assistant),
            Arc::new(CookieSessionManager::new(false)),
            Arc::new(FailingStore::failing_on(&[Role::User, Role::Assistant])),
            configured(),
        );

        let reply = send(&relay, &mut SessionJar::new(), "Hello").await.unwrap();
        assert_eq!(reply.reply, "Still here");
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_cancels_remote_run() {
        let h = harness(FakeAssistant::new(), configured());
        let mut jar = SessionJar::new();
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(2500)).await;
            trigger.cancel();
        });

        let err = h
            .relay
            .send_message(&mut jar, &InboundMessage::new("Hello"), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::Cancelled));
        assert_eq!(h.assistant.count("run_status"), 2);
        assert_eq!(h.assistant.count("cancel_run"), 1);
        assert_eq!(h.assistant.count("latest_message"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_visitor_gate_blocks_until_info_captured() {
        let settings = RelaySettings {
            require_visitor_info: true,
            ..configured()
        };
        let h = harness(FakeAssistant::completing(), settings);
        let mut jar = SessionJar::new();

        assert!(h.relay.needs_visitor_info(&jar));
        let err = send(&h.relay, &mut jar, "Hello").await.unwrap_err();
        assert!(err.is_validation());
        assert_eq!(h.assistant.count("create_thread"), 0);

        h.relay.sessions().mark_visitor_info_captured(&mut jar, 7);
        let reply = send(&h.relay, &mut jar, "Hello").await.unwrap();
        let rows = h.store.list_by_thread(&reply.thread_id).unwrap();
        assert_eq!(rows[0].visitor_record_id, Some(7));
    }
}
