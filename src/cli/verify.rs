use anyhow::{Context, Result};

use crate::assistant::{AssistantApi, CredentialStatus};

pub async fn run(assistant: &dyn AssistantApi) -> Result<()> {
    match assistant
        .verify_credential()
        .await
        .context("Could not reach the assistant service")?
    {
        CredentialStatus::Valid => println!("API key is valid."),
        CredentialStatus::Invalid { reason } => println!("API key is invalid: {}", reason),
    }
    Ok(())
}
