use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("failed to open PDF: {0}")]
    OpenError(String),
    #[error("failed to extract text: {0}")]
    ExtractionError(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Trait for PDF text extraction backends.
///
/// One implementation is chosen when the process starts and shared by every
/// request; the checker never probes for alternatives at request time.
pub trait PdfBackend: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &str;

    /// Extract the full text content of an in-memory PDF.
    fn extract_text(&self, data: &[u8]) -> Result<String, BackendError>;
}
