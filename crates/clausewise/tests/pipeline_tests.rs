//! End-to-end processing through the job queue against a SQLite database.

mod common;

use clausewise::{
    Category, DocumentStatus, DocumentStore, Job, JobPayload, JobState, Playbook, QueueError,
};
use clausewise::document::PDF_MIME;
use common::{clauses, pdf_bytes_with_unreadable_pages, TestHarness};

#[test]
fn test_pdf_processed_and_persisted() {
    let harness = TestHarness::new();
    let text = format!("{} {}", clauses::INDEMNITY, clauses::PAYMENT);
    let document = harness.ingest_pdf("msa.pdf", &[Some(text.as_str())]);

    let snapshot = harness.run_job(Job::process(&document.id.to_string(), None));
    assert_eq!(snapshot.state, JobState::Succeeded, "{:?}", snapshot.error);
    assert_eq!(snapshot.progress, 1.0);

    let report = match snapshot.result {
        Some(JobPayload::Processing(report)) => report,
        other => panic!("unexpected payload: {:?}", other),
    };
    assert_eq!(report.document_id, document.id);
    assert_eq!(report.status, DocumentStatus::Complete);
    assert_eq!(report.total_clauses, 2);

    // A fresh connection sees everything the worker wrote.
    let store = harness.reopen_store();
    let stored = store.load_document(&document.id).unwrap().unwrap();
    assert_eq!(stored.status, DocumentStatus::Complete);
    assert!(stored.error_message.is_none());
    assert!(stored.processing_started_at.is_some());
    assert!(stored.processing_completed_at.is_some());
    assert!(stored.extracted_text_length.unwrap() > 0);
    assert_eq!(stored.metadata["strategy_used"], "rule_based");

    let persisted = store.list_clauses(&document.id).unwrap();
    assert_eq!(persisted.len() as u64, stored.total_clauses_found);
    let categories: Vec<Category> = persisted.iter().map(|c| c.finding.category).collect();
    assert_eq!(categories, vec![Category::Liability, Category::Payment]);
    assert!(persisted
        .windows(2)
        .all(|pair| pair[0].finding.start_position <= pair[1].finding.start_position));
    assert!(persisted.iter().all(|c| c.document_id == document.id));
    assert!(persisted.iter().all(|c| c.finding.page_number == Some(1)));
}

#[test]
fn test_docx_processed_with_ml_fallback() {
    let harness = TestHarness::new();
    let document = harness.ingest_docx("terms.docx", &[clauses::TERMINATION, clauses::PAYMENT]);

    let snapshot = harness.run_job(Job::process(&document.id.to_string(), Some("ml_model")));
    assert_eq!(snapshot.state, JobState::Succeeded, "{:?}", snapshot.error);

    let stored = harness.load(&document);
    assert_eq!(stored.status, DocumentStatus::Complete);
    assert_eq!(stored.metadata["strategy_used"], "ml_model");
    assert_eq!(stored.metadata["fallback"], true);

    let persisted = harness.store().list_clauses(&document.id).unwrap();
    assert_eq!(persisted.len(), 2);
    assert_eq!(persisted[0].finding.category, Category::Termination);
    assert_eq!(
        persisted[0].finding.subcategory.as_deref(),
        Some("for_convenience")
    );
    assert!(persisted.iter().all(|c| c.finding.page_number.is_none()));
}

#[test]
fn test_unknown_strategy_falls_back_to_rule_based() {
    let harness = TestHarness::new();
    let document = harness.ingest_pdf("msa.pdf", &[Some(clauses::INDEMNITY)]);

    let snapshot = harness.run_job(Job::process(&document.id.to_string(), Some("xyz")));
    assert_eq!(snapshot.state, JobState::Succeeded, "{:?}", snapshot.error);
    assert_eq!(harness.load(&document).metadata["strategy_used"], "rule_based");
}

#[test]
fn test_blank_pdf_marks_document_error() {
    let harness = TestHarness::new();
    let document = harness.ingest_pdf("scan.pdf", &[None, None]);

    let snapshot = harness.run_job(Job::process(&document.id.to_string(), None));
    assert_eq!(snapshot.state, JobState::Failed);
    assert!(snapshot.result.is_none());
    assert!(snapshot
        .error
        .as_deref()
        .unwrap()
        .contains("failed to extract text"));

    let stored = harness.load(&document);
    assert_eq!(stored.status, DocumentStatus::Error);
    assert!(stored
        .error_message
        .as_deref()
        .unwrap()
        .contains("failed to extract text"));
    assert_eq!(stored.total_clauses_found, 0);
    assert!(harness.store().list_clauses(&document.id).unwrap().is_empty());
}

#[test]
fn test_pdf_with_undecodable_pages() {
    let harness = TestHarness::new();

    let mixed = pdf_bytes_with_unreadable_pages(
        &[Some("Garbled cover page"), Some(clauses::PAYMENT)],
        &[1],
    );
    let document = harness.ingest("mixed.pdf", &mixed, PDF_MIME);
    let snapshot = harness.run_job(Job::process(&document.id.to_string(), None));
    assert_eq!(snapshot.state, JobState::Succeeded, "{:?}", snapshot.error);
    let persisted = harness.store().list_clauses(&document.id).unwrap();
    assert_eq!(persisted.len(), 1);
    assert_eq!(persisted[0].finding.category, Category::Payment);
    assert_eq!(persisted[0].finding.page_number, Some(2));

    let garbled = pdf_bytes_with_unreadable_pages(
        &[Some(clauses::INDEMNITY), Some(clauses::PAYMENT)],
        &[1, 2],
    );
    let document = harness.ingest("garbled.pdf", &garbled, PDF_MIME);
    let snapshot = harness.run_job(Job::process(&document.id.to_string(), None));
    assert_eq!(snapshot.state, JobState::Failed);
    assert!(snapshot
        .error
        .as_deref()
        .unwrap()
        .contains("failed to extract text"));
    assert_eq!(harness.load(&document).status, DocumentStatus::Error);
}

#[test]
fn test_completed_document_is_not_reprocessed() {
    let harness = TestHarness::new();
    let document = harness.ingest_pdf("msa.pdf", &[Some(clauses::INDEMNITY)]);
    let id = document.id.to_string();

    assert_eq!(harness.run_job(Job::process(&id, None)).state, JobState::Succeeded);
    let first = harness.load(&document);

    let snapshot = harness.run_job(Job::process(&id, None));
    assert_eq!(snapshot.state, JobState::Failed);
    assert!(snapshot.error.as_deref().unwrap().contains("is not pending"));

    let second = harness.load(&document);
    assert_eq!(second.status, DocumentStatus::Complete);
    assert_eq!(second.updated_at, first.updated_at);
    assert_eq!(harness.store().list_clauses(&document.id).unwrap().len(), 1);
}

#[test]
fn test_unknown_document_fails_with_not_found() {
    let harness = TestHarness::new();
    let id = clausewise::DocumentId::new().to_string();

    let snapshot = harness.run_job(Job::process(&id, None));
    assert_eq!(snapshot.state, JobState::Failed);
    assert!(snapshot.error.as_deref().unwrap().contains("not found"));
}

#[test]
fn test_playbook_comparison_leaves_document_pending() {
    let harness = TestHarness::new();
    let document = harness.ingest_pdf("msa.pdf", &[Some(clauses::INDEMNITY)]);
    let playbook = Playbook::new(
        "Standard vendor terms",
        serde_json::json!({ "liability": { "max_risk": "medium" } }),
    );
    harness.store().insert_playbook(&playbook).unwrap();

    let queue = harness.queue(1);
    let handle = queue
        .submit(&document.id.to_string(), Some(&playbook.id.to_string()))
        .unwrap();
    let snapshot = queue.wait_for(&handle, common::harness::JOB_TIMEOUT).unwrap();
    queue.shutdown();
    queue.wait();

    assert_eq!(snapshot.state, JobState::Succeeded, "{:?}", snapshot.error);
    let result = match snapshot.result {
        Some(JobPayload::Playbook(result)) => result,
        other => panic!("unexpected payload: {:?}", other),
    };
    assert_eq!(result.clauses.len(), 1);
    assert_eq!(result.metadata["analysis_type"], "playbook_comparison");
    assert_eq!(result.metadata["playbook_name"], "Standard vendor terms");
    assert_eq!(result.metadata["playbook_id"], playbook.id.to_string());

    let stored = harness.load(&document);
    assert_eq!(stored.status, DocumentStatus::Pending);
    assert!(harness.store().list_clauses(&document.id).unwrap().is_empty());
}

#[test]
fn test_playbook_comparison_requires_playbook() {
    let harness = TestHarness::new();
    let document = harness.ingest_pdf("msa.pdf", &[Some(clauses::INDEMNITY)]);
    let missing = clausewise::PlaybookId::new().to_string();

    let snapshot = harness.run_job(Job::playbook(&document.id.to_string(), &missing));
    assert_eq!(snapshot.state, JobState::Failed);
    assert!(snapshot.error.as_deref().unwrap().contains("Playbook"));
    assert_eq!(harness.load(&document).status, DocumentStatus::Pending);
}

#[test]
fn test_many_documents_across_workers() {
    let harness = TestHarness::new();
    let documents: Vec<_> = (0..6)
        .map(|i| harness.ingest_pdf(&format!("contract-{}.pdf", i), &[Some(clauses::PAYMENT)]))
        .collect();

    let queue = harness.queue(3);
    let handles: Vec<_> = documents
        .iter()
        .map(|d| queue.submit(&d.id.to_string(), None).unwrap())
        .collect();

    for handle in &handles {
        let snapshot = queue.wait_for(handle, common::harness::JOB_TIMEOUT).unwrap();
        assert_eq!(snapshot.state, JobState::Succeeded, "{:?}", snapshot.error);
    }
    queue.shutdown();
    queue.wait();

    for document in &documents {
        let stored = harness.load(document);
        assert_eq!(stored.status, DocumentStatus::Complete);
        assert_eq!(stored.total_clauses_found, 1);
    }
}

#[test]
fn test_submit_after_shutdown_is_rejected() {
    let harness = TestHarness::new();
    let document = harness.ingest_pdf("msa.pdf", &[Some(clauses::INDEMNITY)]);

    let queue = harness.queue(1);
    queue.shutdown();
    assert_eq!(
        queue.submit(&document.id.to_string(), None).unwrap_err(),
        QueueError::Closed
    );
    queue.wait();
    assert_eq!(harness.load(&document).status, DocumentStatus::Pending);
}

#[test]
fn test_deleting_document_removes_its_clauses() {
    let harness = TestHarness::new();
    let document = harness.ingest_pdf("msa.pdf", &[Some(clauses::INDEMNITY)]);
    harness.run_job(Job::process(&document.id.to_string(), None));

    let store = harness.store();
    assert_eq!(store.list_clauses(&document.id).unwrap().len(), 1);
    assert!(store.delete_document(&document.id).unwrap());
    assert!(store.load_document(&document.id).unwrap().is_none());
    assert!(store.list_clauses(&document.id).unwrap().is_empty());
}
