//! Knowledge base documents

use anyhow::{Context, Result};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::warn;

use super::truncate;
use crate::assistant::AssistantApi;
use crate::store::ChatStore;

const PDF_MAGIC: &[u8] = b"%PDF-";

/// Only PDF documents go into the knowledge base
fn ensure_pdf(path: &Path) -> Result<()> {
    if !path.is_file() {
        anyhow::bail!("File not found: {}", path.display());
    }
    let is_pdf_name = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));
    if !is_pdf_name {
        anyhow::bail!("Only PDF files can be uploaded: {}", path.display());
    }

    let mut header = [0u8; 5];
    let mut file =
        File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    if file.read_exact(&mut header).is_err() || header != PDF_MAGIC {
        anyhow::bail!("Not a valid PDF file: {}", path.display());
    }
    Ok(())
}

pub async fn upload(store: &ChatStore, assistant: &dyn AssistantApi, path: &Path) -> Result<()> {
    ensure_pdf(path)?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    let file_id = assistant
        .upload_file(path)
        .await
        .with_context(|| format!("Failed to upload {}", path.display()))?;
    let id = store.insert_pdf(&name, &path.display().to_string(), Some(&file_id))?;

    println!("Uploaded '{}' as {} (record {})", name, file_id, id);
    Ok(())
}

pub fn list(store: &ChatStore) -> Result<()> {
    let pdfs = store.list_pdfs()?;
    if pdfs.is_empty() {
        println!("No documents uploaded.");
        return Ok(());
    }

    println!("{:<6} {:<30} {:<30} {}", "ID", "Name", "File ID", "Uploaded");
    println!("{}", "-".repeat(90));
    for pdf in pdfs {
        println!(
            "{:<6} {:<30} {:<30} {}",
            pdf.id,
            truncate(&pdf.name, 30),
            pdf.openai_file_id.as_deref().unwrap_or("-"),
            pdf.created_at,
        );
    }
    Ok(())
}

/// Delete the remote file first; the local record goes even if that fails
pub async fn remove(store: &ChatStore, assistant: &dyn AssistantApi, id: i64) -> Result<()> {
    let pdf = store
        .get_pdf(id)?
        .ok_or_else(|| anyhow::anyhow!("Document not found: {}", id))?;

    if let Some(file_id) = &pdf.openai_file_id {
        if let Err(e) = assistant.delete_file(file_id).await {
            warn!(%file_id, error = %e, "failed to delete remote file");
        }
    }
    store.delete_pdf(id)?;
    println!("Removed '{}'", pdf.name);
    Ok(())
}
