//! Conversation browsing and cleanup

use anyhow::{Context, Result};
use chrono::NaiveDate;

use super::{short_timestamp, truncate};
use crate::store::{ChatStore, ConversationFilter, ConversationStore, VisitorStore};

pub fn list(
    store: &ChatStore,
    search: Option<String>,
    from: Option<String>,
    to: Option<String>,
    page: u32,
) -> Result<()> {
    let filter = ConversationFilter {
        search,
        start_date: parse_date(from.as_deref())?,
        end_date: parse_date(to.as_deref())?,
    };
    let result = store.list_conversations(&filter, page)?;

    if result.summaries.is_empty() {
        println!("No conversations found.");
        return Ok(());
    }

    println!(
        "{:<40} {:<32} {:<12} {:<12} {}",
        "Session", "Thread", "First", "Last", "Messages"
    );
    println!("{}", "-".repeat(110));

    for summary in &result.summaries {
        println!(
            "{:<40} {:<32} {:<12} {:<12} {}",
            truncate(&summary.session_id, 40),
            truncate(&summary.thread_id, 32),
            short_timestamp(&summary.first_message_at),
            short_timestamp(&summary.last_message_at),
            summary.message_count,
        );
    }

    println!(
        "\nPage {} of {} ({} conversations)",
        result.page, result.total_pages, result.total
    );
    Ok(())
}

pub fn read(store: &ChatStore, thread_id: &str) -> Result<()> {
    let messages = store.list_by_thread(thread_id)?;
    if messages.is_empty() {
        println!("Thread '{}' not found.", thread_id);
        return Ok(());
    }

    println!("\n{}", "=".repeat(80));
    println!("Thread: {}", thread_id);
    println!("Session: {}", messages[0].session_id);
    if let Some(visitor) = messages.iter().find_map(|m| m.visitor_record_id) {
        if let Some(v) = store.get_visitor(visitor)? {
            println!(
                "Visitor: {} | {} | {}",
                v.user_name.as_deref().unwrap_or("-"),
                v.email.as_deref().unwrap_or("-"),
                v.phone.as_deref().unwrap_or("-"),
            );
        }
    }
    println!("{}", "=".repeat(80));

    for msg in messages {
        let page_info = msg
            .page_id
            .map(|p| format!(" | page {}", p))
            .unwrap_or_default();
        println!(
            "\n[{}{}] ({})",
            msg.role.as_str().to_uppercase(),
            page_info,
            msg.created_at
        );
        println!("{}", msg.body);
    }
    Ok(())
}

pub fn delete(store: &ChatStore, session_id: &str) -> Result<()> {
    let deleted = store.delete_by_session(session_id)?;
    if deleted == 0 {
        println!("No messages found for session '{}'.", session_id);
    } else {
        println!("Deleted {} messages from session '{}'.", deleted, session_id);
    }
    Ok(())
}

fn parse_date(raw: Option<&str>) -> Result<Option<NaiveDate>> {
    raw.map(|d| {
        NaiveDate::parse_from_str(d.trim(), "%Y-%m-%d")
            .with_context(|| format!("Invalid date '{}', expected YYYY-MM-DD", d))
    })
    .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{NewMessage, Role};

    #[test]
    fn test_read_thread_with_visitor() {
        let store = ChatStore::open_in_memory().unwrap();
        let visitor = store
            .insert_visitor(Some("Ada"), Some("ada@example.com"), None)
            .unwrap();
        store
            .append(&NewMessage {
                session_id: "sc_1".to_string(),
                thread_id: "thread_1".to_string(),
                role: Role::User,
                body: "Hello".to_string(),
                visitor_record_id: Some(visitor),
                page_id: Some(3),
                assistant_id: Some("asst_1".to_string()),
            })
            .unwrap();

        read(&store, "thread_1").unwrap();
        read(&store, "thread_missing").unwrap();
        delete(&store, "sc_1").unwrap();
        assert!(store.list_by_thread("thread_1").unwrap().is_empty());
    }

    #[test]
    fn test_parse_date() {
        assert_eq!(
            parse_date(Some("2024-05-01")).unwrap(),
            NaiveDate::from_ymd_opt(2024, 5, 1)
        );
        assert!(parse_date(None).unwrap().is_none());
        assert!(parse_date(Some("05/01/2024")).is_err());
    }
}
