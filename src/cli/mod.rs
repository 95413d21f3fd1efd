pub mod assistant;
pub mod chats;
pub mod files;
pub mod verify;

use anyhow::Result;

use crate::assistant::OpenAiAssistant;
use crate::config::{Config, API_KEY_ENV};

/// Assistant client for admin commands; these fail fast without a credential
pub fn client(config: &Config) -> Result<OpenAiAssistant> {
    OpenAiAssistant::from_config(config).map_err(|_| {
        anyhow::anyhow!(
            "No API key configured. Set assistant.api_key or {}.",
            API_KEY_ENV
        )
    })
}

/// Shorten to `max` characters on one line
fn truncate(text: &str, max: usize) -> String {
    let line = text.lines().next().unwrap_or("");
    if line.chars().count() > max {
        let cut: String = line.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", cut)
    } else {
        line.to_string()
    }
}

/// `2024-05-01T10:20:30.123Z` -> `05-01 10:20`
fn short_timestamp(ts: &str) -> String {
    if ts.len() >= 16 && ts.is_char_boundary(5) && ts.is_char_boundary(16) {
        format!("{} {}", &ts[5..10], &ts[11..16])
    } else {
        ts.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("first line\nsecond", 20), "first line");
        assert_eq!(truncate("abcdefghij", 6), "abc...");
        assert_eq!(truncate("ééééééé", 5), "éé...");
    }

    #[test]
    fn test_short_timestamp() {
        assert_eq!(short_timestamp("2024-05-01T10:20:30.123Z"), "05-01 10:20");
        assert_eq!(short_timestamp("bad"), "bad");
    }
}
