//! Source document loading
//!
//! PDFs are loaded one document per page so answers can cite page numbers.
//! Plain text and markdown files become a single document without a page.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::SourceDocument;
use crate::error::AdvisorError;
use crate::Result;

/// Load every supported file directly inside `data_dir`.
///
/// Fails when the directory is missing or empty, or when none of its files
/// could be loaded.
pub async fn load_documents(data_dir: &Path) -> Result<Vec<SourceDocument>> {
    let files = list_files(data_dir).await?;

    if files.is_empty() {
        return Err(AdvisorError::NotFound(format!(
            "No files found in '{}'.",
            data_dir.display()
        )));
    }

    let mut documents = Vec::new();

    for path in files {
        match load_file(&path).await {
            Ok(mut loaded) => {
                debug!(path = %path.display(), documents = loaded.len(), "Loaded file");
                documents.append(&mut loaded);
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Skipping unreadable document");
            }
        }
    }

    if documents.is_empty() {
        return Err(AdvisorError::NotFound(format!(
            "Could not load any documents from '{}'.",
            data_dir.display()
        )));
    }

    info!(
        "Loaded {} document(s) from '{}'",
        documents.len(),
        data_dir.display()
    );
    Ok(documents)
}

async fn list_files(data_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = match tokio::fs::read_dir(data_dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

async fn load_file(path: &Path) -> Result<Vec<SourceDocument>> {
    let source = path.to_string_lossy().to_string();
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase());

    match extension.as_deref() {
        Some("pdf") => {
            let bytes = tokio::fs::read(path).await?;
            let pages = tokio::task::spawn_blocking(move || {
                pdf_extract::extract_text_from_mem_by_pages(&bytes)
            })
            .await
            .map_err(|e| AdvisorError::ToolExecutionError(format!("PDF worker panicked: {}", e)))?
            .map_err(|e| {
                AdvisorError::ValidationError(format!("Could not parse PDF '{}': {}", source, e))
            })?;

            Ok(pages_to_documents(&source, pages))
        }
        Some("txt") | Some("md") | Some("markdown") => {
            let content = tokio::fs::read_to_string(path).await?;
            if content.trim().is_empty() {
                return Ok(Vec::new());
            }
            Ok(vec![SourceDocument::new(content, source, None)])
        }
        _ => {
            debug!(path = %path.display(), "Unsupported file type");
            Ok(Vec::new())
        }
    }
}

fn pages_to_documents(source: &str, pages: Vec<String>) -> Vec<SourceDocument> {
    pages
        .into_iter()
        .enumerate()
        .filter(|(_, text)| !text.trim().is_empty())
        .map(|(i, text)| SourceDocument::new(text, source, Some(i as u32 + 1)))
        .collect()
}
