use anyhow::{Context, Result};

use crate::assistant::AssistantApi;
use crate::store::ChatStore;

pub async fn create(
    store: &ChatStore,
    assistant: &dyn AssistantApi,
    name: &str,
    vector_store_ids: Vec<String>,
) -> Result<()> {
    let assistant_id = assistant
        .create_assistant(name, &vector_store_ids)
        .await
        .context("Failed to create assistant")?;
    store.insert_assistant(&assistant_id, name, &vector_store_ids)?;

    println!("Assistant '{}' created with ID: {}", name, assistant_id);
    println!("Set assistant.assistant_id to this value to use it for chat.");
    Ok(())
}

pub fn list(store: &ChatStore) -> Result<()> {
    let assistants = store.list_assistants()?;
    if assistants.is_empty() {
        println!("No assistants found.");
        return Ok(());
    }

    println!("{:<32} {:<24} {:<8} {}", "Assistant ID", "Name", "Stores", "Created");
    println!("{}", "-".repeat(90));
    for a in assistants {
        println!(
            "{:<32} {:<24} {:<8} {}",
            a.openai_assistant_id,
            a.name,
            a.file_ids.len(),
            a.created_at
        );
    }
    Ok(())
}
