//! In-memory fixture builders for the supported document formats.

#![allow(dead_code)]

use std::io::{Cursor, Write};

use lopdf::{dictionary, Document, Object, Stream};

const W_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";

/// A PDF with one page per entry. `None` pages have no content stream.
///
/// Text is written with the built-in Courier font, so it must not contain
/// unbalanced parentheses or backslashes.
pub fn pdf_bytes(pages: &[Option<&str>]) -> Vec<u8> {
    pdf_bytes_with_unreadable_pages(pages, &[])
}

/// Like [`pdf_bytes`], but the 1-based pages listed in `unreadable` reference
/// a font descriptor instead of a font, so their text cannot be decoded.
pub fn pdf_bytes_with_unreadable_pages(pages: &[Option<&str>], unreadable: &[u32]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let descriptor_id = doc.add_object(dictionary! {
        "Type" => "FontDescriptor",
        "FontName" => "Courier",
    });
    let unreadable_resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => descriptor_id },
    });

    let mut kids: Vec<Object> = Vec::new();
    for (page_num, page) in (1u32..).zip(pages) {
        let resources = if unreadable.contains(&page_num) {
            unreadable_resources_id
        } else {
            resources_id
        };
        let mut page_dict = dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            "Resources" => resources,
        };
        if let Some(text) = page {
            let content = format!("BT /F1 12 Tf 50 700 Td ({}) Tj ET", text);
            let content_id = doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));
            page_dict.set("Contents", content_id);
        }
        kids.push(doc.add_object(page_dict).into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).expect("Failed to serialize PDF fixture");
    bytes
}

/// A DOCX whose body holds one paragraph per entry.
pub fn docx_bytes(paragraphs: &[&str]) -> Vec<u8> {
    let body: String = paragraphs
        .iter()
        .map(|text| format!(r#"<w:p><w:r><w:t xml:space="preserve">{}</w:t></w:r></w:p>"#, text))
        .collect();
    let document_xml = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:document xmlns:w="{}"><w:body>{}</w:body></w:document>"#,
        W_NS, body
    );

    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default();
    writer
        .start_file("word/document.xml", options)
        .expect("Failed to start zip entry");
    writer
        .write_all(document_xml.as_bytes())
        .expect("Failed to write zip entry");
    writer
        .finish()
        .expect("Failed to finish DOCX fixture")
        .into_inner()
}

/// Contract sentences with known classifications.
pub mod clauses {
    pub const INDEMNITY: &str =
        "The Vendor shall indemnify and hold harmless the Client against any and all claims.";
    pub const PAYMENT: &str =
        "Payment terms are net 30 days from the invoice date under this agreement.";
    pub const TERMINATION: &str =
        "Either party may terminate this agreement for convenience upon thirty days written notice.";
}
