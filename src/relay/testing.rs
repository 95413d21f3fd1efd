//! In-memory fakes for relay tests

use async_trait::async_trait;
use std::collections::{HashSet, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::assistant::{AssistantApi, AssistantError, CredentialStatus, MessageRef, RunStatus};
use crate::store::{
    ConversationFilter, ConversationPage, ConversationStore, MessageRow, NewMessage, Role,
};

/// Scripted assistant: run statuses come from a queue, then `InProgress` forever
pub struct FakeAssistant {
    statuses: Mutex<VecDeque<RunStatus>>,
    reply: String,
    failing: HashSet<&'static str>,
    calls: Mutex<Vec<String>>,
    threads: AtomicUsize,
}

impl FakeAssistant {
    pub fn new() -> Self {
        Self {
            statuses: Mutex::new(VecDeque::new()),
            reply: "Hi there".to_string(),
            failing: HashSet::new(),
            calls: Mutex::new(vec![]),
            threads: AtomicUsize::new(0),
        }
    }

    /// Healthy backend: every run completes on the first check
    pub fn completing() -> Self {
        Self::new().with_statuses(&[RunStatus::Completed; 64])
    }

    pub fn with_statuses(self, statuses: &[RunStatus]) -> Self {
        self.statuses.lock().unwrap().extend(statuses.iter().copied());
        self
    }

    pub fn with_reply(mut self, reply: &str) -> Self {
        self.reply = reply.to_string();
        self
    }

    pub fn failing(mut self, operation: &'static str) -> Self {
        self.failing.insert(operation);
        self
    }

    pub fn count(&self, operation: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.as_str() == operation)
            .count()
    }

    fn record(&self, operation: &'static str) -> Result<(), AssistantError> {
        self.calls.lock().unwrap().push(operation.to_string());
        if self.failing.contains(operation) {
            return Err(AssistantError::Api {
                code: "server_error".to_string(),
                message: format!("{} failed", operation),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl AssistantApi for FakeAssistant {
    async fn create_thread(&self) -> Result<String, AssistantError> {
        self.record("create_thread")?;
        let n = self.threads.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("thread_{}", n))
    }

    async fn post_message(
        &self,
        _thread_id: &str,
        _role: Role,
        _body: &str,
    ) -> Result<MessageRef, AssistantError> {
        self.record("post_message")?;
        Ok(MessageRef {
            id: "msg_1".to_string(),
        })
    }

    async fn start_run(
        &self,
        _thread_id: &str,
        assistant_id: Option<&str>,
    ) -> Result<String, AssistantError> {
        assistant_id.ok_or(AssistantError::MissingAssistantId)?;
        self.record("start_run")?;
        Ok("run_1".to_string())
    }

    async fn run_status(&self, _thread_id: &str, _run_id: &str) -> Result<RunStatus, AssistantError> {
        self.record("run_status")?;
        Ok(self
            .statuses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(RunStatus::InProgress))
    }

    async fn cancel_run(&self, _thread_id: &str, _run_id: &str) -> Result<(), AssistantError> {
        self.record("cancel_run")
    }

    async fn latest_message(&self, _thread_id: &str) -> Result<String, AssistantError> {
        self.record("latest_message")?;
        Ok(self.reply.clone())
    }

    async fn upload_file(&self, _path: &Path) -> Result<String, AssistantError> {
        self.record("upload_file")?;
        Ok("file-1".to_string())
    }

    async fn delete_file(&self, _file_id: &str) -> Result<(), AssistantError> {
        self.record("delete_file")
    }

    async fn create_assistant(
        &self,
        _name: &str,
        _vector_store_ids: &[String],
    ) -> Result<String, AssistantError> {
        self.record("create_assistant")?;
        Ok("asst_new".to_string())
    }

    async fn verify_credential(&self) -> Result<CredentialStatus, AssistantError> {
        self.record("verify_credential")?;
        Ok(CredentialStatus::Valid)
    }
}

/// Store that rejects appends for selected roles
pub struct FailingStore {
    inner: crate::store::ChatStore,
    fail_roles: Vec<Role>,
}

impl FailingStore {
    pub fn failing_on(roles: &[Role]) -> Self {
        Self {
            inner: crate::store::ChatStore::open_in_memory().unwrap(),
            fail_roles: roles.to_vec(),
        }
    }
}

impl ConversationStore for FailingStore {
    fn append(&self, message: &NewMessage) -> anyhow::Result<i64> {
        if self.fail_roles.contains(&message.role) {
            anyhow::bail!("disk I/O error");
        }
        self.inner.append(message)
    }

    fn list_by_thread(&self, thread_id: &str) -> anyhow::Result<Vec<MessageRow>> {
        self.inner.list_by_thread(thread_id)
    }

    fn list_by_session(&self, session_id: &str) -> anyhow::Result<Vec<MessageRow>> {
        self.inner.list_by_session(session_id)
    }

    fn list_conversations(
        &self,
        filter: &ConversationFilter,
        page: u32,
    ) -> anyhow::Result<ConversationPage> {
        self.inner.list_conversations(filter, page)
    }

    fn delete_by_session(&self, session_id: &str) -> anyhow::Result<usize> {
        self.inner.delete_by_session(session_id)
    }
}
