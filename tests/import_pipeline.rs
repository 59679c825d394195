mod common;

use common::{TestWorkspace, count};
use report_intake::import::{self, FailureReason, ImportError, ImportOptions};
use report_intake::sources::SourceKind;

const INVOICE_EXPORT: &str = r#"{
  "generated": "2024-03-20",
  "records": [
    {"Invoice No.": "Invoice No.", "Supplier Code": "Supplier Code", "Amount": "Amount"},
    {"Invoice No.": "INV-001", "Supplier Code": 72195, "Supplier Name": " ACME  ",
     "Invoice Date": "05/01/2567", "Invoice Received Date": "2024-15-03 09:00:00",
     "Amount": "12,500.75", "Status": "Paid"},
    {"Invoice No.": "INV-001", "Supplier Code": "72195", "Amount": "1"},
    {"Invoice No.": null, "Supplier Code": "72195", "Amount": "2"},
    {"Invoice No.": "INV-002", "Supplier Code": "72195", "Invoice Date": "?", "Amount": ""}
  ]
}"#;

#[test]
fn invoice_export_lands_with_every_row_accounted_for() {
    let workspace = TestWorkspace::new();
    let conn = workspace.connection();
    let mut options = ImportOptions::new(SourceKind::InvoiceReport);
    options.keep_failures = true;

    let report = import::run(&conn, &options, INVOICE_EXPORT.as_bytes()).expect("import runs");
    let s = &report.summary;
    assert_eq!(s.total, 5);
    assert_eq!(s.skipped_header, 1);
    assert_eq!(s.inserted, 2);
    assert_eq!(s.failed_duplicate, 1);
    assert_eq!(s.failed_not_null, 1);
    assert_eq!(s.failed, s.failed_validation + s.failed_duplicate + s.failed_other);
    assert_eq!(s.total, s.inserted + s.failed + s.skipped_header);
    assert_eq!(s.corrections.day_month_swaps, 1);
    assert!(s.is_complete());

    let reasons: Vec<_> = report.failures.iter().map(|f| f.reason).collect();
    assert_eq!(
        reasons,
        vec![
            FailureReason::SkippedHeader,
            FailureReason::DuplicateKey,
            FailureReason::NotNullViolation
        ]
    );
    assert_eq!(report.failures[1].row, 3);

    let (code, name, date, received, amount): (String, String, String, String, f64) = conn
        .query_row(
            "SELECT supplier_code, supplier_name, invoice_date, invoice_received_date, amount \
             FROM invoice_detail_report WHERE invoice_no = 'INV-001'",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
        )
        .expect("first invoice stored");
    assert_eq!(code, "72195");
    assert_eq!(name, "ACME");
    assert_eq!(date, "2024-01-05");
    assert_eq!(received, "2024-03-15 09:00:00");
    assert!((amount - 12500.75).abs() < 1e-9);

    let (date, amount): (Option<String>, Option<f64>) = conn
        .query_row(
            "SELECT invoice_date, amount FROM invoice_detail_report WHERE invoice_no = 'INV-002'",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .expect("second invoice stored");
    assert_eq!((date, amount), (None, None));
}

#[test]
fn match_keys_make_reruns_idempotent() {
    let workspace = TestWorkspace::new();
    let conn = workspace.connection();
    let rows = r#"[
        {"invoice_no": "A-1", "supplier_code": "S1", "invoice_date": "01/02/24", "amount_incl_vat": "107"},
        {"invoice_no": "A-2", "supplier_code": "S1", "amount_incl_vat": 214}
    ]"#;
    let mut options = ImportOptions::new(SourceKind::LegacyInvoice);
    options.match_keys = vec!["invoice_no".into(), "supplier_code".into()];

    for _ in 0..3 {
        let report = import::run(&conn, &options, rows.as_bytes()).expect("import runs");
        assert_eq!(report.summary.inserted, 2);
        assert_eq!(report.summary.failed, 0);
    }
    assert_eq!(count(&conn, "gec_invoice_legacy"), 2);

    let plain = ImportOptions::new(SourceKind::LegacyInvoice);
    let report = import::run(&conn, &plain, rows.as_bytes()).expect("import runs");
    assert_eq!(report.summary.failed_duplicate, 2);
    assert_eq!(count(&conn, "gec_invoice_legacy"), 2);
}

#[test]
fn match_keys_without_unique_index_are_refused() {
    let workspace = TestWorkspace::new();
    let conn = workspace.connection();
    let mut options = ImportOptions::new(SourceKind::LegacyInvoice);
    options.match_keys = vec!["invoice_no".into()];
    let err = import::run(&conn, &options, "[]".as_bytes()).unwrap_err();
    assert!(matches!(err, ImportError::NotUniqueKey { .. }), "{err}");
}

#[test]
fn truncated_input_keeps_rows_already_written() {
    let workspace = TestWorkspace::new();
    let conn = workspace.connection();
    let truncated = r#"[{"invoice_no": "T-1", "supplier_code": "S9"}, {"invoice_no": "T-2", "#;
    let report = import::run(
        &conn,
        &ImportOptions::new(SourceKind::LegacyInvoice),
        truncated.as_bytes(),
    )
    .expect("summary is still produced");
    assert_eq!(report.summary.inserted, 1);
    assert!(report.summary.stream_error.is_some());
    assert_eq!(count(&conn, "gec_invoice_legacy"), 1);
}

#[test]
fn custom_pointer_reaches_nested_rows() {
    let workspace = TestWorkspace::new();
    let conn = workspace.connection();
    let doc = r#"{"data": {"batches": [{"rows": [{"invoice_no": "N-1", "supplier_code": "S1"}]}]}}"#;
    let mut options = ImportOptions::new(SourceKind::LegacyInvoice);
    options.pointer = Some("/data/batches/0/rows".into());
    let report = import::run(&conn, &options, doc.as_bytes()).expect("import runs");
    assert_eq!(report.summary.inserted, 1);
}

#[test]
fn remittance_advice_sheets_fall_back_to_root_supplier() {
    let workspace = TestWorkspace::new();
    let conn = workspace.connection();
    let doc = r#"{
      "sheets": [
        {"name": "Jan", "rows": [
          {"วันที่": "05/01/2567", "เลขที่เอกสาร": 5100000001.0, "ประเภทเอกสาร": "RV", "จำนวน": "1,250.00"},
          {"supplier_code": "80001", "เลขที่เอกสาร": "5100000002", "ประเภทเอกสาร": "RV", "จำนวน": "10"}
        ]},
        {"name": "notes"},
        {"rows": [{"เลขที่เอกสาร": "5100000003", "ประเภทเอกสาร": "CN", "จำนวน": "-5"}]}
      ],
      "supplier_code": 72195
    }"#;

    let report = import::run(
        &conn,
        &ImportOptions::new(SourceKind::RemittanceAdvice),
        doc.as_bytes(),
    )
    .expect("import runs");
    assert_eq!(report.summary.total, 3);
    assert_eq!(report.summary.inserted, 3);
    assert_eq!(report.summary.failed, 0);

    let rows: Vec<(String, String, Option<String>)> = conn
        .prepare("SELECT doc_no, supplier_code, invoice_date FROM rm_detail_report ORDER BY doc_no")
        .expect("query")
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))
        .expect("rows")
        .collect::<rusqlite::Result<_>>()
        .expect("decode rows");
    assert_eq!(
        rows,
        vec![
            ("5100000001".to_string(), "72195".to_string(), Some("2024-01-05".to_string())),
            ("5100000002".to_string(), "80001".to_string(), None),
            ("5100000003".to_string(), "72195".to_string(), None),
        ]
    );
}

#[test]
fn remittance_advice_rows_without_any_supplier_fail() {
    let workspace = TestWorkspace::new();
    let conn = workspace.connection();
    let doc = r#"{"sheets": [{"rows": [
        {"เลขที่เอกสาร": "X-1"},
        {"supplier_code": "S2", "เลขที่เอกสาร": "X-2"}
    ]}]}"#;
    let mut options = ImportOptions::new(SourceKind::RemittanceAdvice);
    options.keep_failures = true;

    let report = import::run(&conn, &options, doc.as_bytes()).expect("import runs");
    assert_eq!(report.summary.inserted, 1);
    assert_eq!(report.summary.failed_validation, 1);
    assert_eq!(report.failures[0].row, 1);
    assert!(report.failures[0].detail.starts_with("supplier_code:"));
    assert_eq!(count(&conn, "rm_detail_report"), 1);
}

#[test]
fn null_match_key_is_a_not_null_failure() {
    let workspace = TestWorkspace::new();
    let conn = workspace.connection();
    let mut options = ImportOptions::new(SourceKind::LegacyInvoice);
    options.match_keys = vec!["invoice_no".into(), "supplier_code".into()];
    let rows = r#"[{"invoice_no": "K-1"}, {"invoice_no": "K-2", "supplier_code": "S1"}]"#;

    for _ in 0..2 {
        let report = import::run(&conn, &options, rows.as_bytes()).expect("import runs");
        assert_eq!(report.summary.inserted, 1);
        assert_eq!(report.summary.failed_not_null, 1);
        assert_eq!(report.summary.samples[0].reason, FailureReason::NotNullViolation);
    }
    assert_eq!(count(&conn, "gec_invoice_legacy"), 1);
}
