use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

mod pdf;

pub use pdf::LopdfPageSource;

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("failed to read {path}: {error}")]
    Read { path: String, error: String },
    #[error("no text extractor is registered for {kind} files ({path})")]
    Unsupported { path: String, kind: FileKind },
    #[error("could not extract text from {path}: {reason}")]
    Malformed { path: String, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Pdf,
    WordDocument,
    Text,
}

impl std::fmt::Display for FileKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Pdf => "PDF",
            Self::WordDocument => "Word",
            Self::Text => "text",
        };
        f.write_str(name)
    }
}

pub fn detect_file_kind(path: &Path) -> FileKind {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match extension.as_str() {
        "pdf" => FileKind::Pdf,
        "doc" | "docx" => FileKind::WordDocument,
        _ => FileKind::Text,
    }
}

/// Turns an uploaded essay or rubric file into plain text. An empty string
/// means the file held no text, which is not an error.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract_text(&self, path: &Path) -> Result<String, ExtractionError>;
}

/// Decodes a paged document into the text of each page.
pub trait PageTextSource: Send + Sync {
    fn page_texts(&self, bytes: &[u8]) -> Result<Vec<String>, String>;
}

/// Reads text files directly and hands paged formats to a registered
/// [`PageTextSource`].
#[derive(Clone)]
pub struct DocumentTextExtractor {
    pdf_pages: Option<Arc<dyn PageTextSource>>,
}

impl Default for DocumentTextExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentTextExtractor {
    /// Plain text plus PDF through [`LopdfPageSource`].
    pub fn new() -> Self {
        Self {
            pdf_pages: Some(Arc::new(LopdfPageSource)),
        }
    }

    /// Plain text only; PDFs are reported as unsupported.
    pub fn text_only() -> Self {
        Self { pdf_pages: None }
    }

    pub fn with_pdf_source(mut self, source: Arc<dyn PageTextSource>) -> Self {
        self.pdf_pages = Some(source);
        self
    }
}

#[async_trait]
impl TextExtractor for DocumentTextExtractor {
    async fn extract_text(&self, path: &Path) -> Result<String, ExtractionError> {
        let kind = detect_file_kind(path);
        let display_path = path.to_string_lossy().to_string();
        let source = match kind {
            FileKind::Text => None,
            FileKind::Pdf => Some(self.pdf_pages.as_ref().ok_or_else(|| {
                ExtractionError::Unsupported {
                    path: display_path.clone(),
                    kind,
                }
            })?),
            FileKind::WordDocument => {
                return Err(ExtractionError::Unsupported {
                    path: display_path,
                    kind,
                })
            }
        };

        let bytes = tokio::fs::read(path)
            .await
            .map_err(|error| ExtractionError::Read {
                path: display_path.clone(),
                error: error.to_string(),
            })?;

        let text = match source {
            None => String::from_utf8_lossy(&bytes).to_string(),
            Some(source) => {
                let pages = source
                    .page_texts(&bytes)
                    .map_err(|reason| ExtractionError::Malformed {
                        path: display_path.clone(),
                        reason,
                    })?;
                join_page_texts(&pages)
            }
        };
        debug!(path = %display_path, %kind, chars = text.chars().count(), "extracted text");
        Ok(text)
    }
}

/// Collapses whitespace inside each page and separates pages by a blank line.
pub fn join_page_texts(pages: &[String]) -> String {
    pages
        .iter()
        .map(|page| page.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|page| !page.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}
