//! OpenAI Assistants (v2) implementation
//!
//! JSON over HTTPS with a bearer credential. Every response is checked for the
//! `error.code` / `error.message` envelope before its payload is decoded.

use async_trait::async_trait;
use reqwest::{multipart, Client, Method, Response};
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use super::{AssistantApi, AssistantError, CredentialStatus, MessageRef, RunStatus};
use crate::config::Config;
use crate::store::Role;

/// Beta header selecting the assistants API revision
const ASSISTANT_VERSION: &str = "assistants=v2";

const PDF_MIME: &str = "application/pdf";

// ============================================
// WIRE TYPES
// ============================================

#[derive(Deserialize, Debug)]
struct ErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Deserialize, Debug)]
struct ApiErrorBody {
    code: Option<String>,
    message: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
}

/// Any object the service creates: thread, message, run, file, assistant
#[derive(Deserialize, Debug)]
struct IdObject {
    id: String,
}

#[derive(Deserialize, Debug)]
struct RunObject {
    status: RunStatus,
}

#[derive(Deserialize, Debug)]
struct MessageList {
    #[serde(default)]
    data: Vec<MessageObject>,
}

#[derive(Deserialize, Debug)]
struct MessageObject {
    #[serde(default)]
    content: Vec<MessageContent>,
}

#[derive(Deserialize, Debug)]
struct MessageContent {
    text: Option<MessageText>,
}

#[derive(Deserialize, Debug)]
struct MessageText {
    value: String,
}

impl IdObject {
    fn into_id(self) -> Result<String, AssistantError> {
        if self.id.is_empty() {
            return Err(AssistantError::InvalidResponse("empty 'id' field".to_string()));
        }
        Ok(self.id)
    }
}

impl MessageList {
    /// First text block of the first message; empty when there is none
    fn into_latest_text(self) -> String {
        self.data
            .into_iter()
            .next()
            .and_then(|message| message.content.into_iter().find_map(|part| part.text))
            .map(|text| text.value)
            .unwrap_or_default()
    }
}

pub struct OpenAiAssistant {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    instructions: String,
    request_timeout: Duration,
    upload_timeout: Duration,
}

impl OpenAiAssistant {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        let defaults = crate::config::AssistantConfig::default();
        Self {
            client: Client::new(),
            base_url,
            api_key: api_key.into(),
            model: defaults.model,
            instructions: defaults.instructions,
            request_timeout: Duration::from_secs(defaults.request_timeout_secs),
            upload_timeout: Duration::from_secs(defaults.upload_timeout_secs),
        }
    }

    /// Build a client from configuration; fails when no credential is set
    pub fn from_config(config: &Config) -> Result<Self, AssistantError> {
        let api_key = config.api_key().ok_or(AssistantError::MissingCredential)?;
        let mut client = Self::new(api_key, config.assistant.base_url.clone());
        client.model = config.assistant.model.clone();
        client.instructions = config.assistant.instructions.clone();
        client.request_timeout = config.request_timeout();
        client.upload_timeout = config.upload_timeout();
        Ok(client)
    }

    fn url(&self, action: &str) -> String {
        format!("{}{}", self.base_url, action)
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        action: &str,
        query: &[(&str, &str)],
        body: Option<Value>,
    ) -> Result<T, AssistantError> {
        debug!(%method, action, "assistant request");

        let mut request = self
            .client
            .request(method, self.url(action))
            .bearer_auth(&self.api_key)
            .header("OpenAI-Beta", ASSISTANT_VERSION)
            .timeout(self.request_timeout);

        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await.map_err(transport)?;
        decode(response).await
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, AssistantError> {
    let status = response.status();
    let text = response.text().await.map_err(transport)?;

    if let Ok(ErrorEnvelope { error }) = serde_json::from_str::<ErrorEnvelope>(&text) {
        return Err(AssistantError::Api {
            code: error
                .code
                .or(error.kind)
                .unwrap_or_else(|| status.as_u16().to_string()),
            message: error.message.unwrap_or_else(|| "unknown error".to_string()),
        });
    }

    if !status.is_success() {
        return Err(AssistantError::Api {
            code: status.as_u16().to_string(),
            message: text.chars().take(500).collect(),
        });
    }

    serde_json::from_str(&text).map_err(|e| AssistantError::InvalidResponse(e.to_string()))
}

fn transport(err: reqwest::Error) -> AssistantError {
    AssistantError::Transport(err.to_string())
}

#[async_trait]
impl AssistantApi for OpenAiAssistant {
    async fn create_thread(&self) -> Result<String, AssistantError> {
        let thread: IdObject = self
            .request(Method::POST, "threads", &[], Some(json!({})))
            .await?;
        thread.into_id()
    }

    async fn post_message(
        &self,
        thread_id: &str,
        role: Role,
        body: &str,
    ) -> Result<MessageRef, AssistantError> {
        let message: IdObject = self
            .request(
                Method::POST,
                &format!("threads/{}/messages", thread_id),
                &[],
                Some(json!({ "role": role.as_str(), "content": body })),
            )
            .await?;
        Ok(MessageRef {
            id: message.into_id()?,
        })
    }

    async fn start_run(
        &self,
        thread_id: &str,
        assistant_id: Option<&str>,
    ) -> Result<String, AssistantError> {
        let assistant_id = assistant_id
            .filter(|id| !id.trim().is_empty())
            .ok_or(AssistantError::MissingAssistantId)?;
        let run: IdObject = self
            .request(
                Method::POST,
                &format!("threads/{}/runs", thread_id),
                &[],
                Some(json!({ "assistant_id": assistant_id })),
            )
            .await?;
        run.into_id()
    }

    async fn run_status(&self, thread_id: &str, run_id: &str) -> Result<RunStatus, AssistantError> {
        let run: RunObject = self
            .request(
                Method::GET,
                &format!("threads/{}/runs/{}", thread_id, run_id),
                &[],
                None,
            )
            .await?;
        Ok(run.status)
    }

    async fn cancel_run(&self, thread_id: &str, run_id: &str) -> Result<(), AssistantError> {
        let _: IgnoredAny = self
            .request(
                Method::POST,
                &format!("threads/{}/runs/{}/cancel", thread_id, run_id),
                &[],
                Some(json!({})),
            )
            .await?;
        Ok(())
    }

    async fn latest_message(&self, thread_id: &str) -> Result<String, AssistantError> {
        let messages: MessageList = self
            .request(
                Method::GET,
                &format!("threads/{}/messages", thread_id),
                &[("order", "desc"), ("limit", "1")],
                None,
            )
            .await?;
        Ok(messages.into_latest_text())
    }

    async fn upload_file(&self, path: &Path) -> Result<String, AssistantError> {
        let contents = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "upload.pdf".to_string());

        let part = multipart::Part::bytes(contents)
            .file_name(file_name)
            .mime_str(PDF_MIME)
            .map_err(transport)?;
        let form = multipart::Form::new()
            .text("purpose", "assistants")
            .part("file", part);

        let response = self
            .client
            .post(self.url("files"))
            .bearer_auth(&self.api_key)
            .header("OpenAI-Beta", ASSISTANT_VERSION)
            .timeout(self.upload_timeout)
            .multipart(form)
            .send()
            .await
            .map_err(transport)?;
        let file: IdObject = decode(response).await?;
        file.into_id()
    }

    async fn delete_file(&self, file_id: &str) -> Result<(), AssistantError> {
        let _: IgnoredAny = self
            .request(Method::DELETE, &format!("files/{}", file_id), &[], None)
            .await?;
        Ok(())
    }

    async fn create_assistant(
        &self,
        name: &str,
        vector_store_ids: &[String],
    ) -> Result<String, AssistantError> {
        let mut body = json!({
            "name": name,
            "instructions": self.instructions,
            "tools": [{ "type": "file_search" }],
            "model": self.model,
        });
        if !vector_store_ids.is_empty() {
            body["tool_resources"] = json!({
                "file_search": { "vector_store_ids": vector_store_ids }
            });
        }
        let assistant: IdObject = self
            .request(Method::POST, "assistants", &[], Some(body))
            .await?;
        assistant.into_id()
    }

    async fn verify_credential(&self) -> Result<CredentialStatus, AssistantError> {
        let listed: Result<IgnoredAny, _> = self
            .request(
                Method::GET,
                "assistants",
                &[("order", "desc"), ("limit", "1")],
                None,
            )
            .await;
        match listed {
            Ok(_) => Ok(CredentialStatus::Valid),
            Err(AssistantError::Api { code, .. }) => Ok(CredentialStatus::Invalid { reason: code }),
            Err(e) => Err(e),
        }
    }
}
