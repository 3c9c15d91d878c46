use std::io::{Read, Seek};
use std::path::Path;

use quick_xml::escape::resolve_predefined_entity;
use quick_xml::events::{BytesRef, Event};
use quick_xml::Reader;
use serde_json::{Map, Value};

use crate::document::ContentType;
use crate::error::ExtractError;
use crate::extractor::{insert_text, ExtractionMetadata, TextExtractor};

/// Word-processor extractor. Handles OOXML; legacy `.doc` is routed here too
/// and fails at the zip layer when the file really is the old binary format.
pub struct DocxExtractor;

impl DocxExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for DocxExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl TextExtractor for DocxExtractor {
    fn extract_text(&self, path: &Path) -> Result<String, ExtractError> {
        let _span = tracing::info_span!("extractor.docx").entered();

        let mut archive = open_archive(path)?;
        let xml = read_entry(&mut archive, "word/document.xml")?
            .ok_or_else(|| ExtractError::DocxProcessing("Missing word/document.xml".to_string()))?;

        Ok(parse_body(&xml)?.render())
    }

    fn extract_metadata(&self, path: &Path) -> Result<ExtractionMetadata, ExtractError> {
        let mut archive = open_archive(path)?;
        let mut metadata = Map::new();

        if let Some(xml) = read_entry(&mut archive, "word/document.xml")? {
            let body = parse_body(&xml)?;
            metadata.insert(
                "paragraph_count".to_string(),
                Value::from(body.paragraph_count as u64),
            );
            metadata.insert(
                "table_count".to_string(),
                Value::from(body.tables.len() as u64),
            );
        }

        if let Some(xml) = read_entry(&mut archive, "docProps/core.xml")? {
            let core = parse_core_properties(&xml)?;
            insert_text(&mut metadata, "title", core.title);
            insert_text(&mut metadata, "author", core.creator);
            insert_text(&mut metadata, "created", core.created);
            insert_text(&mut metadata, "modified", core.modified);
        }

        Ok(metadata)
    }

    fn supports(&self, content_type: ContentType) -> bool {
        matches!(content_type, ContentType::Docx | ContentType::Doc)
    }
}

fn open_archive(path: &Path) -> Result<zip::ZipArchive<std::fs::File>, ExtractError> {
    let file = std::fs::File::open(path).map_err(|e| ExtractError::ReadDocument {
        path: path.to_path_buf(),
        source: e,
    })?;

    zip::ZipArchive::new(file)
        .map_err(|e| ExtractError::DocxProcessing(format!("Failed to open DOCX: {}", e)))
}

/// Reads a zip entry as UTF-8. A missing entry is `Ok(None)`.
fn read_entry<R: Read + Seek>(
    archive: &mut zip::ZipArchive<R>,
    name: &str,
) -> Result<Option<String>, ExtractError> {
    let mut entry = match archive.by_name(name) {
        Ok(entry) => entry,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(e) => {
            return Err(ExtractError::DocxProcessing(format!(
                "Failed to open {}: {}",
                name, e
            )))
        }
    };

    let mut content = String::new();
    entry
        .read_to_string(&mut content)
        .map_err(|e| ExtractError::DocxProcessing(format!("Failed to read {}: {}", name, e)))?;
    Ok(Some(content))
}

/// Body content split the way Word models it: top-level paragraphs, then
/// top-level tables as rows of cell texts.
#[derive(Debug, Default)]
struct DocxBody {
    paragraphs: Vec<String>,
    /// Includes blank paragraphs.
    paragraph_count: usize,
    tables: Vec<Vec<Vec<String>>>,
}

impl DocxBody {
    /// Non-blank paragraphs, then each table row as ` | `-joined non-blank cells.
    fn render(&self) -> String {
        let mut lines: Vec<String> = self
            .paragraphs
            .iter()
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect();

        for table in &self.tables {
            for row in table {
                let cells: Vec<&str> = row
                    .iter()
                    .map(|c| c.trim())
                    .filter(|c| !c.is_empty())
                    .collect();
                if !cells.is_empty() {
                    lines.push(cells.join(" | "));
                }
            }
        }

        lines.join("\n")
    }
}

fn parse_body(xml: &str) -> Result<DocxBody, ExtractError> {
    let mut reader = Reader::from_str(xml);

    let mut body = DocxBody::default();
    let mut table_depth = 0usize;
    let mut in_text_element = false;
    let mut paragraph = String::new();
    let mut rows: Vec<Vec<String>> = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut cell: Vec<String> = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => match e.local_name().as_ref() {
                b"tbl" => {
                    table_depth += 1;
                    if table_depth == 1 {
                        rows = Vec::new();
                    }
                }
                b"tr" if table_depth == 1 => row = Vec::new(),
                b"tc" if table_depth == 1 => cell = Vec::new(),
                b"p" => paragraph.clear(),
                b"t" => in_text_element = true,
                _ => {}
            },
            Ok(Event::Empty(ref e)) => match e.local_name().as_ref() {
                b"tab" => paragraph.push('\t'),
                b"br" | b"cr" => paragraph.push('\n'),
                b"p" if table_depth == 0 => {
                    body.paragraphs.push(String::new());
                    body.paragraph_count += 1;
                }
                _ => {}
            },
            Ok(Event::End(ref e)) => match e.local_name().as_ref() {
                b"t" => in_text_element = false,
                b"p" => {
                    let finished = std::mem::take(&mut paragraph);
                    match table_depth {
                        0 => {
                            body.paragraphs.push(finished);
                            body.paragraph_count += 1;
                        }
                        1 => cell.push(finished),
                        // Nested tables do not contribute to the cell text.
                        _ => {}
                    }
                }
                b"tc" if table_depth == 1 => row.push(std::mem::take(&mut cell).join("\n")),
                b"tr" if table_depth == 1 => rows.push(std::mem::take(&mut row)),
                b"tbl" => {
                    if table_depth == 1 {
                        body.tables.push(std::mem::take(&mut rows));
                    }
                    table_depth = table_depth.saturating_sub(1);
                }
                _ => {}
            },
            Ok(Event::Text(e)) => {
                if in_text_element {
                    let decoded = e.decode().unwrap_or_default();
                    paragraph.push_str(&decoded);
                }
            }
            Ok(Event::GeneralRef(e)) => {
                if in_text_element {
                    if let Some(resolved) = resolve_reference(&e) {
                        paragraph.push_str(&resolved);
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(ExtractError::DocxProcessing(format!(
                    "XML parsing error: {}",
                    e
                )));
            }
            _ => {}
        }
    }

    Ok(body)
}

#[derive(Debug, Default)]
struct CoreProperties {
    title: Option<String>,
    creator: Option<String>,
    created: Option<String>,
    modified: Option<String>,
}

fn parse_core_properties(xml: &str) -> Result<CoreProperties, ExtractError> {
    let mut reader = Reader::from_str(xml);

    let mut props = CoreProperties::default();
    let mut current: Option<Vec<u8>> = None;
    let mut value = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                current = Some(e.local_name().as_ref().to_vec());
                value.clear();
            }
            Ok(Event::End(_)) => {
                let text = value.trim();
                if !text.is_empty() {
                    match current.as_deref() {
                        Some(b"title") => props.title = Some(text.to_string()),
                        Some(b"creator") => props.creator = Some(text.to_string()),
                        Some(b"created") => props.created = Some(text.to_string()),
                        Some(b"modified") => props.modified = Some(text.to_string()),
                        _ => {}
                    }
                }
                current = None;
                value.clear();
            }
            Ok(Event::Text(e)) => {
                if current.is_some() {
                    value.push_str(&e.decode().unwrap_or_default());
                }
            }
            Ok(Event::GeneralRef(e)) => {
                if current.is_some() {
                    if let Some(resolved) = resolve_reference(&e) {
                        value.push_str(&resolved);
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(ExtractError::DocxProcessing(format!(
                    "core.xml parsing error: {}",
                    e
                )));
            }
            _ => {}
        }
    }

    Ok(props)
}

/// Text for `&name;` or `&#n;`. Entities other than the five XML ones are dropped.
fn resolve_reference(reference: &BytesRef<'_>) -> Option<String> {
    if let Ok(Some(ch)) = reference.resolve_char_ref() {
        return Some(ch.to_string());
    }
    let name = reference.decode().ok()?;
    resolve_predefined_entity(&name).map(str::to_string)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const W_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";

    /// Wraps body XML in a minimal `word/document.xml`.
    pub(crate) fn document_xml(body: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:document xmlns:w="{}"><w:body>{}</w:body></w:document>"#,
            W_NS, body
        )
    }

    pub(crate) fn paragraph(text: &str) -> String {
        format!(r#"<w:p><w:r><w:t xml:space="preserve">{}</w:t></w:r></w:p>"#, text)
    }

    pub(crate) fn table(rows: &[&[&str]]) -> String {
        let mut xml = String::from("<w:tbl>");
        for row in rows {
            xml.push_str("<w:tr>");
            for cell in *row {
                xml.push_str("<w:tc>");
                xml.push_str(&paragraph(cell));
                xml.push_str("</w:tc>");
            }
            xml.push_str("</w:tr>");
        }
        xml.push_str("</w:tbl>");
        xml
    }

    /// Writes a zip with the given entries to a temp `.docx` file.
    pub(crate) fn build_docx(entries: &[(&str, &str)]) -> NamedTempFile {
        let temp_file = NamedTempFile::with_suffix(".docx").unwrap();
        let file = std::fs::File::create(temp_file.path()).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default();
        for (name, content) in entries {
            writer.start_file(*name, options).unwrap();
            writer.write_all(content.as_bytes()).unwrap();
        }
        writer.finish().unwrap();
        temp_file
    }

    #[test]
    fn test_supports_word_formats() {
        let extractor = DocxExtractor::new();
        assert!(extractor.supports(ContentType::Docx));
        assert!(extractor.supports(ContentType::Doc));
        assert!(!extractor.supports(ContentType::Pdf));
    }

    #[test]
    fn test_paragraphs_then_tables() {
        let body = format!(
            "{}{}{}{}",
            paragraph("First paragraph."),
            table(&[&["Party", "Obligation"], &["Vendor", ""], &["", ""]]),
            paragraph("   "),
            paragraph("Second paragraph."),
        );
        let text = parse_body(&document_xml(&body)).unwrap().render();

        assert_eq!(
            text,
            "First paragraph.\nSecond paragraph.\nParty | Obligation\nVendor"
        );
    }

    #[test]
    fn test_text_runs_keep_spacing() {
        let body = r#"<w:p><w:r><w:t xml:space="preserve">The Vendor </w:t></w:r><w:r><w:t>shall pay</w:t></w:r><w:r><w:tab/><w:t>now</w:t></w:r></w:p>"#;
        let text = parse_body(&document_xml(body)).unwrap().render();
        assert_eq!(text, "The Vendor shall pay\tnow");
    }

    #[test]
    fn test_entity_references_are_resolved() {
        let body = format!(
            "{}{}",
            paragraph("Smith &amp; Jones &lt;Vendor&gt; &#8220;Buyer&#x201D; &quot;Goods&apos;"),
            paragraph("Outside &amp; "),
        );
        let text = parse_body(&document_xml(&body)).unwrap().render();
        assert_eq!(
            text,
            "Smith & Jones <Vendor> \u{201C}Buyer\u{201D} \"Goods'\nOutside &"
        );
    }

    #[test]
    fn test_entity_references_outside_text_runs_are_ignored() {
        let body = r#"<w:p>&amp;<w:r><w:t>Kept</w:t></w:r>&amp;</w:p>"#;
        let text = parse_body(&document_xml(body)).unwrap().render();
        assert_eq!(text, "Kept");
    }

    #[test]
    fn test_counts_include_blank_paragraphs() {
        let body = format!(
            "{}<w:p/>{}{}",
            paragraph("One"),
            paragraph("Two"),
            table(&[&["a"]])
        );
        let parsed = parse_body(&document_xml(&body)).unwrap();
        assert_eq!(parsed.paragraph_count, 3);
        assert_eq!(parsed.tables.len(), 1);
    }

    #[test]
    fn test_extract_text_from_docx_file() {
        let xml = document_xml(&paragraph("This agreement shall be governed by the laws of Delaware."));
        let docx = build_docx(&[("word/document.xml", xml.as_str())]);

        let text = DocxExtractor::new().extract_text(docx.path()).unwrap();
        assert_eq!(text, "This agreement shall be governed by the laws of Delaware.");
    }

    #[test]
    fn test_metadata_from_core_properties() {
        let xml = document_xml(&format!("{}{}", paragraph("One"), table(&[&["x"]])));
        let core = r#"<?xml version="1.0" encoding="UTF-8"?><cp:coreProperties xmlns:cp="http://schemas.openxmlformats.org/package/2006/metadata/core-properties" xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:dcterms="http://purl.org/dc/terms/"><dc:title>Supply Agreement</dc:title><dc:creator>Jane Counsel</dc:creator><dcterms:created>2024-03-01T10:00:00Z</dcterms:created></cp:coreProperties>"#;
        let docx = build_docx(&[("word/document.xml", xml.as_str()), ("docProps/core.xml", core)]);

        let metadata = DocxExtractor::new().extract_metadata(docx.path()).unwrap();
        assert_eq!(metadata["paragraph_count"], 1);
        assert_eq!(metadata["table_count"], 1);
        assert_eq!(metadata["title"], "Supply Agreement");
        assert_eq!(metadata["author"], "Jane Counsel");
        assert_eq!(metadata["created"], "2024-03-01T10:00:00Z");
        assert!(metadata.get("modified").is_none());
    }

    #[test]
    fn test_core_properties_resolve_entities() {
        let core = r#"<?xml version="1.0" encoding="UTF-8"?><cp:coreProperties xmlns:cp="http://schemas.openxmlformats.org/package/2006/metadata/core-properties" xmlns:dc="http://purl.org/dc/elements/1.1/">
  <dc:title>Smith &amp; Jones Supply Agreement</dc:title>
  <dc:creator> Legal &#38; Compliance </dc:creator>
  <dc:description></dc:description>
</cp:coreProperties>"#;
        let props = parse_core_properties(core).unwrap();
        assert_eq!(props.title.as_deref(), Some("Smith & Jones Supply Agreement"));
        assert_eq!(props.creator.as_deref(), Some("Legal & Compliance"));
        assert!(props.created.is_none());
    }

    #[test]
    fn test_missing_document_xml() {
        let docx = build_docx(&[("docProps/core.xml", "<x/>")]);
        match DocxExtractor::new().extract_text(docx.path()) {
            Err(ExtractError::DocxProcessing(msg)) => assert!(msg.contains("word/document.xml")),
            _ => panic!("Expected DocxProcessing error"),
        }
    }

    #[test]
    fn test_legacy_binary_doc_fails() {
        let temp_file = NamedTempFile::with_suffix(".doc").unwrap();
        std::fs::write(temp_file.path(), [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1]).unwrap();

        match DocxExtractor::new().extract_text(temp_file.path()) {
            Err(ExtractError::DocxProcessing(msg)) => assert!(msg.contains("Failed to open DOCX")),
            _ => panic!("Expected DocxProcessing error"),
        }
    }
}
