//! Table-driven admission checks run before a document is registered.

mod common;

use assert_fs::prelude::*;

use clausewise::config::UploadConfig;
use clausewise::document::{DOCX_MIME, DOC_MIME, PDF_MIME};
use clausewise::{validate_upload, ClausewiseError, ContentType, Document, DocumentStatus};
use common::{docx_bytes, pdf_bytes, TestHarness};

struct UploadCase {
    name: &'static str,
    filename: &'static str,
    declared: Option<&'static str>,
    size: u64,
    expected: Result<ContentType, &'static str>,
}

const UPLOAD_CASES: &[UploadCase] = &[
    UploadCase {
        name: "pdf_by_extension",
        filename: "contract.pdf",
        declared: None,
        size: 1024,
        expected: Ok(ContentType::Pdf),
    },
    UploadCase {
        name: "docx_declared",
        filename: "Contract.DOCX",
        declared: Some(DOCX_MIME),
        size: 1024,
        expected: Ok(ContentType::Docx),
    },
    UploadCase {
        name: "legacy_doc",
        filename: "old.doc",
        declared: Some(DOC_MIME),
        size: 1024,
        expected: Ok(ContentType::Doc),
    },
    UploadCase {
        name: "empty_file",
        filename: "contract.pdf",
        declared: Some(PDF_MIME),
        size: 0,
        expected: Err("Empty file"),
    },
    UploadCase {
        name: "too_large",
        filename: "contract.pdf",
        declared: Some(PDF_MIME),
        size: 10 * 1024 * 1024 + 1,
        expected: Err("File too large"),
    },
    UploadCase {
        name: "wrong_extension",
        filename: "notes.txt",
        declared: Some("text/plain"),
        size: 10,
        expected: Err("File type not allowed"),
    },
    UploadCase {
        name: "no_extension",
        filename: "contract",
        declared: None,
        size: 10,
        expected: Err("File type not allowed"),
    },
    UploadCase {
        name: "unsupported_declared_type",
        filename: "contract.pdf",
        declared: Some("image/png"),
        size: 10,
        expected: Err("unsupported content type"),
    },
];

#[test]
fn test_upload_admission() {
    let config = UploadConfig::default();

    for case in UPLOAD_CASES {
        let result = validate_upload(case.filename, case.declared, case.size, &config);
        match (&case.expected, result) {
            (Ok(expected), Ok(actual)) => {
                assert_eq!(*expected, actual, "case '{}'", case.name);
            }
            (Err(fragment), Err(e)) => {
                let message = e.to_string();
                assert!(
                    message.contains(fragment),
                    "case '{}': expected error containing '{}', got '{}'",
                    case.name,
                    fragment,
                    message
                );
            }
            (expected, actual) => panic!(
                "case '{}': expected {:?}, got {:?}",
                case.name, expected, actual
            ),
        }
    }
}

#[test]
fn test_size_limit_comes_from_config() {
    let config = UploadConfig {
        max_file_size: 100,
        ..UploadConfig::default()
    };
    assert!(validate_upload("a.pdf", None, 100, &config).is_ok());
    assert!(matches!(
        validate_upload("a.pdf", None, 101, &config),
        Err(ClausewiseError::Validation(_))
    ));
}

#[test]
fn test_admitted_files_become_pending_documents() {
    let temp = assert_fs::TempDir::new().unwrap();
    let pdf = temp.child("msa.pdf");
    pdf.write_binary(&pdf_bytes(&[Some("Governed by the laws of Delaware.")]))
        .unwrap();
    let docx = temp.child("terms.docx");
    docx.write_binary(&docx_bytes(&["Payment terms are net 30 days."]))
        .unwrap();
    let notes = temp.child("notes.txt");
    notes.write_str("not a contract").unwrap();

    let harness = TestHarness::new();
    let store = harness.store();
    let mut admitted = Vec::new();

    for child in [&pdf, &docx, &notes] {
        let path = child.path();
        let filename = path.file_name().unwrap().to_string_lossy().to_string();
        let size = std::fs::metadata(path).unwrap().len();

        match validate_upload(&filename, None, size, &harness.config.upload) {
            Ok(content_type) => {
                let document = Document::new(&filename, path, content_type.mime(), size);
                clausewise::DocumentStore::insert_document(store.as_ref(), &document).unwrap();
                admitted.push(document);
            }
            Err(e) => assert!(e.to_string().contains("File type not allowed")),
        }
    }

    assert_eq!(admitted.len(), 2);
    for document in &admitted {
        let stored = harness.load(document);
        assert_eq!(stored.status, DocumentStatus::Pending);
        assert_eq!(stored.file_path, document.file_path);
        assert_eq!(stored.total_clauses_found, 0);
        assert!(stored.processing_started_at.is_none());
    }
    assert_eq!(admitted[0].content_type, PDF_MIME);
    assert_eq!(admitted[1].content_type, DOCX_MIME);

    temp.close().unwrap();
}
