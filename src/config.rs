//! Configuration management with YAML support

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable that overrides `assistant.api_key`
pub const API_KEY_ENV: &str = "SITECOMPASS_OPENAI_API_KEY";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub assistant: AssistantConfig,

    #[serde(default)]
    pub relay: RelayConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub visitor: VisitorConfig,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_path")]
    pub path: String,
}

/// Assistant service credentials and model selection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantConfig {
    #[serde(default)]
    pub api_key: Option<String>,

    /// Assistant id issued by the service once a knowledge base is attached
    #[serde(default)]
    pub assistant_id: Option<String>,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_instructions")]
    pub instructions: String,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_upload_timeout")]
    pub upload_timeout_secs: u64,
}

/// Relay polling policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_max_poll_attempts")]
    pub max_poll_attempts: u32,

    #[serde(default = "default_max_message_chars")]
    pub max_message_chars: usize,
}

/// HTTP listener and cookie policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,

    #[serde(default)]
    pub secure_cookies: bool,

    /// Secret used to sign anti-forgery tokens. A random one is used when unset,
    /// which invalidates outstanding tokens on restart.
    #[serde(default)]
    pub token_secret: Option<String>,

    #[serde(default)]
    pub session_store: SessionStoreKind,
}

/// Where thread and visitor bindings live
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStoreKind {
    /// Every binding is a browser cookie
    #[default]
    Cookie,
    /// Only the session id is a cookie; bindings are kept server-side
    Server,
}

/// Visitor intake form policy
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VisitorConfig {
    /// Require name/email/phone before the chat is enabled
    #[serde(default)]
    pub require_info: bool,
}

// Default value functions
fn default_database_path() -> String {
    "~/.local/share/sitecompass/sitecompass.db".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_instructions() -> String {
    "You are a customer support chatbot. Use your knowledge base to best respond to customer queries."
        .to_string()
}

fn default_base_url() -> String {
    "https://api.openai.com/v1/".to_string()
}

fn default_request_timeout() -> u64 {
    60
}

fn default_upload_timeout() -> u64 {
    120
}

fn default_poll_interval() -> u64 {
    1000
}

fn default_max_poll_attempts() -> u32 {
    30
}

fn default_max_message_chars() -> usize {
    4000
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            assistant_id: None,
            model: default_model(),
            instructions: default_instructions(),
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout(),
            upload_timeout_secs: default_upload_timeout(),
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            max_poll_attempts: default_max_poll_attempts(),
            max_message_chars: default_max_message_chars(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            secure_cookies: false,
            token_secret: None,
            session_store: SessionStoreKind::default(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    /// Searches in order:
    /// 1. Provided path
    /// 2. ./sitecompass.yaml (current directory)
    /// 3. ~/.config/sitecompass/sitecompass.yaml
    ///
    /// `SITECOMPASS_OPENAI_API_KEY` wins over the file's `assistant.api_key`.
    pub fn load(path: &str) -> Result<Self> {
        let search_paths = vec![
            shellexpand::tilde(path).to_string(),
            "sitecompass.yaml".to_string(),
            shellexpand::tilde("~/.config/sitecompass/sitecompass.yaml").to_string(),
        ];

        let mut config = Config::default();
        for search_path in &search_paths {
            if std::path::Path::new(search_path).exists() {
                let content = std::fs::read_to_string(search_path)?;
                config = serde_yaml::from_str(&content)?;
                break;
            }
        }

        if let Ok(key) = std::env::var(API_KEY_ENV) {
            if !key.trim().is_empty() {
                config.assistant.api_key = Some(key.trim().to_string());
            }
        }

        Ok(config)
    }

    /// Get the database path, expanding ~ to home directory
    pub fn database_path(&self) -> PathBuf {
        let expanded = shellexpand::tilde(&self.database.path).to_string();
        PathBuf::from(expanded)
    }

    /// API credential, if one is configured and non-blank
    pub fn api_key(&self) -> Option<&str> {
        non_blank(self.assistant.api_key.as_deref())
    }

    /// Assistant id, if one is configured and non-blank
    pub fn assistant_id(&self) -> Option<&str> {
        non_blank(self.assistant.assistant_id.as_deref())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.relay.poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.assistant.request_timeout_secs)
    }

    pub fn upload_timeout(&self) -> Duration {
        Duration::from_secs(self.assistant.upload_timeout_secs)
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
