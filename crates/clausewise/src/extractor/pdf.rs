use std::path::Path;

use lopdf::{Dictionary, Object};
use serde_json::{Map, Value};

use crate::document::ContentType;
use crate::error::ExtractError;
use crate::extractor::{insert_text, ExtractionMetadata, TextExtractor};

/// Info dictionary keys copied into metadata, in output order.
const INFO_FIELDS: &[(&[u8], &str)] = &[
    (b"Title", "title"),
    (b"Author", "author"),
    (b"Creator", "creator"),
    (b"Producer", "producer"),
    (b"CreationDate", "creation_date"),
    (b"ModDate", "modification_date"),
];

pub struct PdfExtractor;

impl PdfExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PdfExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl TextExtractor for PdfExtractor {
    fn extract_text(&self, path: &Path) -> Result<String, ExtractError> {
        let _span = tracing::info_span!("extractor.pdf").entered();

        let doc = load_document(path)?;
        Ok(extract_pages(&doc))
    }

    fn extract_metadata(&self, path: &Path) -> Result<ExtractionMetadata, ExtractError> {
        let doc = load_document(path)?;

        let mut metadata = Map::new();
        metadata.insert(
            "page_count".to_string(),
            Value::from(doc.get_pages().len() as u64),
        );
        metadata.insert(
            "encrypted".to_string(),
            Value::from(doc.trailer.get(b"Encrypt").is_ok()),
        );

        if let Some(info) = info_dictionary(&doc) {
            for (key, name) in INFO_FIELDS {
                insert_text(&mut metadata, name, info.get(key).ok().and_then(decode_pdf_string));
            }
        }

        Ok(metadata)
    }

    fn supports(&self, content_type: ContentType) -> bool {
        matches!(content_type, ContentType::Pdf)
    }
}

fn load_document(path: &Path) -> Result<lopdf::Document, ExtractError> {
    let pdf_bytes = std::fs::read(path).map_err(|e| ExtractError::ReadDocument {
        path: path.to_path_buf(),
        source: e,
    })?;

    lopdf::Document::load_mem(&pdf_bytes)
        .map_err(|e| ExtractError::PdfProcessing(format!("Failed to load PDF: {}", e)))
}

/// Pages in order, each as `[PAGE n]\n<text>`, joined by blank lines.
/// A page that fails to extract is logged and skipped; blank pages add nothing.
fn extract_pages(doc: &lopdf::Document) -> String {
    let mut pages = Vec::new();

    for (page_num, _) in doc.get_pages() {
        match doc.extract_text(&[page_num]) {
            Ok(page_text) => {
                let page_text = page_text.trim();
                if !page_text.is_empty() {
                    pages.push(format!("[PAGE {}]\n{}", page_num, page_text));
                }
            }
            Err(e) => {
                tracing::warn!("Failed to extract text from page {}: {}", page_num, e);
            }
        }
    }

    pages.join("\n\n")
}

fn info_dictionary(doc: &lopdf::Document) -> Option<&Dictionary> {
    match doc.trailer.get(b"Info").ok()? {
        Object::Reference(id) => doc.get_dictionary(*id).ok(),
        Object::Dictionary(dict) => Some(dict),
        _ => None,
    }
}

/// Decodes a PDF text string: UTF-16BE with BOM, otherwise byte-per-char.
fn decode_pdf_string(object: &Object) -> Option<String> {
    match object {
        Object::String(bytes, _) => {
            if let Some(utf16) = bytes.strip_prefix(&[0xFE, 0xFF]) {
                let units: Vec<u16> = utf16
                    .chunks_exact(2)
                    .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                    .collect();
                Some(String::from_utf16_lossy(&units))
            } else {
                Some(bytes.iter().map(|&b| b as char).collect())
            }
        }
        Object::Name(name) => Some(String::from_utf8_lossy(name).to_string()),
        _ => None,
    }
}
