//! Text extraction for uploaded documents.
//!
//! PDF extraction is per page so passages keep their page numbers for
//! source traceability. Plain-text uploads are treated as a single page.

use dossier_core::error::DossierError;

/// One page of extracted text.
#[derive(Debug, Clone)]
pub struct PageText {
    /// 1-based page number.
    pub page: u32,
    pub text: String,
}

/// Supported upload formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    PlainText,
}

impl DocumentKind {
    /// Map an upload content type to a supported kind.
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        match content_type {
            "application/pdf" => Some(DocumentKind::Pdf),
            "text/plain" => Some(DocumentKind::PlainText),
            _ => None,
        }
    }
}

/// Extract page texts from raw upload bytes.
///
/// A document that parses but yields no text at all (e.g. a scanned
/// image-only PDF) returns an [`DossierError::EmptyDocument`]; so does a
/// PDF that cannot be parsed, since either way there is nothing to index.
pub fn extract_pages(bytes: &[u8], kind: DocumentKind) -> Result<Vec<PageText>, DossierError> {
    let pages = match kind {
        DocumentKind::Pdf => {
            let texts = pdf_extract::extract_text_from_mem_by_pages(bytes)
                .map_err(|e| DossierError::EmptyDocument(format!("PDF extraction failed: {}", e)))?;
            texts
                .into_iter()
                .enumerate()
                .map(|(i, text)| PageText {
                    page: (i + 1) as u32,
                    text,
                })
                .collect::<Vec<_>>()
        }
        DocumentKind::PlainText => {
            let text = String::from_utf8_lossy(bytes).into_owned();
            vec![PageText { page: 1, text }]
        }
    };

    if pages.iter().all(|p| p.text.trim().is_empty()) {
        return Err(DossierError::EmptyDocument(
            "no extractable text in document".to_string(),
        ));
    }

    Ok(pages)
}
