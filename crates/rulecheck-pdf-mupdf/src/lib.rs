use std::io::Write;

use mupdf::{Document, TextPageFlags};

use rulecheck_core::extract::has_pdf_header;
use rulecheck_core::{BackendError, PdfBackend};

/// MuPDF-based implementation of [`PdfBackend`].
///
/// This crate is the sole AGPL island: it isolates the mupdf dependency so
/// that the core and its tests never link it.
///
/// Text is read block by block and line by line; pages are separated by a
/// blank line. Nothing is filtered out, since a rule may well be about a
/// header, footer, or page number.
#[derive(Debug, Default)]
pub struct MupdfBackend;

impl MupdfBackend {
    pub fn new() -> Self {
        Self
    }

    fn extract_from_path(&self, path: &str) -> Result<String, BackendError> {
        let document = Document::open(path).map_err(|e| BackendError::OpenError(e.to_string()))?;

        let mut pages_text = Vec::new();
        for page_result in document
            .pages()
            .map_err(|e| BackendError::ExtractionError(e.to_string()))?
        {
            let page = page_result.map_err(|e| BackendError::ExtractionError(e.to_string()))?;
            let text_page = page
                .to_text_page(TextPageFlags::empty())
                .map_err(|e| BackendError::ExtractionError(e.to_string()))?;

            let mut page_text = String::new();
            for block in text_page.blocks() {
                for line in block.lines() {
                    let line_text: String = line
                        .chars()
                        .map(|c| c.char().unwrap_or('\u{FFFD}'))
                        .collect();
                    page_text.push_str(line_text.trim_end());
                    page_text.push('\n');
                }
            }
            pages_text.push(page_text);
        }

        Ok(pages_text.join("\n"))
    }
}

impl PdfBackend for MupdfBackend {
    fn name(&self) -> &str {
        "mupdf"
    }

    fn extract_text(&self, data: &[u8]) -> Result<String, BackendError> {
        if !has_pdf_header(data) {
            return Err(BackendError::OpenError("no PDF header found".into()));
        }

        // MuPDF opens documents by path; the temp file is removed on drop.
        let mut file = tempfile::Builder::new()
            .prefix("rulecheck-")
            .suffix(".pdf")
            .tempfile()?;
        file.write_all(data)?;
        file.flush()?;

        let path = file
            .path()
            .to_str()
            .ok_or_else(|| BackendError::OpenError("invalid temp path encoding".into()))?;
        self.extract_from_path(path)
    }
}
