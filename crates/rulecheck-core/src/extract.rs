//! Text extraction contract: media type gate, blocking extraction, and the
//! minimum-content check.

use std::sync::Arc;

use crate::backend::PdfBackend;
use crate::{CheckError, PDF_MEDIA_TYPE, Upload};

/// Reject uploads whose declared media type is not `application/pdf`.
///
/// Parameters (`; charset=...`) and letter case are ignored.
pub fn ensure_pdf(upload: &Upload) -> Result<(), CheckError> {
    let declared = upload.content_type.as_deref().unwrap_or("");
    let essence = declared
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();

    if essence == PDF_MEDIA_TYPE {
        Ok(())
    } else if declared.is_empty() {
        Err(CheckError::UnsupportedFileType("no content type".to_string()))
    } else {
        Err(CheckError::UnsupportedFileType(declared.to_string()))
    }
}

/// Whether `data` carries a `%PDF-` marker; readers accept it anywhere in
/// the first 1024 bytes.
pub fn has_pdf_header(data: &[u8]) -> bool {
    data.windows(5).take(1024).any(|w| w == b"%PDF-")
}

/// Number of meaningful characters in extracted text.
pub fn content_length(text: &str) -> usize {
    text.trim().chars().count()
}

/// Extract text from `data` on a blocking thread and check it is long enough
/// to be worth judging.
pub async fn extract_document_text(
    backend: Arc<dyn PdfBackend>,
    data: Vec<u8>,
    min_chars: usize,
) -> Result<String, CheckError> {
    let backend_name = backend.name().to_string();
    let size = data.len();

    let text = tokio::task::spawn_blocking(move || backend.extract_text(&data))
        .await
        .map_err(|e| CheckError::Internal(format!("extraction task failed: {}", e)))?
        .map_err(|e| {
            tracing::warn!(backend = %backend_name, bytes = size, error = %e, "PDF extraction failed");
            CheckError::ExtractionFailed(e.to_string())
        })?;

    let found = content_length(&text);
    tracing::debug!(backend = %backend_name, bytes = size, chars = found, "extracted document text");

    if found < min_chars {
        return Err(CheckError::InsufficientContent {
            found,
            required: min_chars,
        });
    }

    Ok(text)
}
