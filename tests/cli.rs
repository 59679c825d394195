mod common;

use assert_cmd::Command;
use common::{TAX_ID, TestWorkspace, count};
use predicates::str::contains;
use serde_json::Value;

fn intake_cmd(workspace: &TestWorkspace) -> Command {
    let mut cmd = Command::cargo_bin("report-intake").expect("binary exists");
    cmd.env("RUST_LOG", "off")
        .arg("--database")
        .arg(workspace.database());
    cmd
}

fn init(workspace: &TestWorkspace) {
    intake_cmd(workspace).arg("init-db").assert().success();
}

#[test]
fn init_db_can_be_repeated() {
    let workspace = TestWorkspace::new();
    init(&workspace);
    init(&workspace);
    let conn = workspace.connection();
    assert_eq!(count(&conn, "company_entity"), 0);
}

#[test]
fn import_prints_summary_and_dumps_failures() {
    let workspace = TestWorkspace::new();
    init(&workspace);
    let input = workspace.write(
        "legacy.json",
        r#"[
            {"invoice_no": "L-1", "supplier_code": "S1", "amount_incl_vat": "1,070.00"},
            {"invoice_no": "L-1", "supplier_code": "S1"},
            "L-2"
        ]"#,
    );
    let dump = workspace.path().join("failures.json");

    intake_cmd(&workspace)
        .args(["import", "legacy-invoice", "-i"])
        .arg(&input)
        .arg("--dump-fail")
        .arg(&dump)
        .assert()
        .success()
        .stdout(contains("inserted"))
        .stdout(contains("failed_duplicate"));

    let failures: Value =
        serde_json::from_str(&std::fs::read_to_string(&dump).expect("dump written"))
            .expect("dump is JSON");
    let failures = failures.as_array().expect("array of failures");
    assert_eq!(failures.len(), 2);
    assert_eq!(failures[0]["reason"], "duplicate_key");
    assert_eq!(failures[1]["reason"], "validation");
    assert_eq!(failures[1]["data"], "L-2");

    let conn = workspace.connection();
    assert_eq!(count(&conn, "gec_invoice_legacy"), 1);
}

#[test]
fn import_reads_stdin_and_reports_json() {
    let workspace = TestWorkspace::new();
    init(&workspace);
    let assert = intake_cmd(&workspace)
        .args(["import", "remittance-summary", "-i", "-", "--json", "--dry-run"])
        .write_stdin("[]")
        .assert()
        .success();
    let summary: Value = serde_json::from_slice(&assert.get_output().stdout).expect("JSON summary");
    assert_eq!(summary["total"], 0);
    assert_eq!(summary["dry_run"], true);
}

#[test]
fn truncated_input_exits_non_zero_after_writing() {
    let workspace = TestWorkspace::new();
    init(&workspace);
    let input = workspace.write(
        "broken.json",
        r#"[{"invoice_no": "B-1", "supplier_code": "S1"}, {"invoice_no": "#,
    );
    intake_cmd(&workspace)
        .args(["import", "legacy-invoice", "-i"])
        .arg(&input)
        .assert()
        .failure()
        .stdout(contains("stream_error"))
        .stderr(contains("Input ended early"));
    let conn = workspace.connection();
    assert_eq!(count(&conn, "gec_invoice_legacy"), 1);
}

#[test]
fn unreadable_root_is_fatal() {
    let workspace = TestWorkspace::new();
    init(&workspace);
    let input = workspace.write("garbage.json", "<html>");
    intake_cmd(&workspace)
        .args(["import", "invoice-report", "-i"])
        .arg(&input)
        .assert()
        .failure()
        .stderr(contains("error:"));
}

#[test]
fn thai_codepage_input_is_decoded() {
    let workspace = TestWorkspace::new();
    init(&workspace);
    let text = r#"[{"เลขที่เอกสาร": "D-77", "วันที่เอกสาร": "05/01/2567"}]"#;
    let (bytes, _, _) = encoding_rs::WINDOWS_874.encode(text);
    let input = workspace.path().join("sale.json");
    std::fs::write(&input, bytes.as_ref()).expect("write encoded input");

    intake_cmd(&workspace)
        .args(["import", "sale-invoice", "--input-encoding", "windows-874", "-i"])
        .arg(&input)
        .assert()
        .success();
    let conn = workspace.connection();
    assert_eq!(count(&conn, "sale_invoice_report"), 1);
}

#[test]
fn intake_rejects_the_whole_batch_with_422() {
    let workspace = TestWorkspace::new();
    init(&workspace);
    let body = workspace.write(
        "po.json",
        r#"[{"po_no": "P-1", "po_date": "2024-01-05"}, {"po_no": "P-2", "po_date": "yesterday"}]"#,
    );
    let assert = intake_cmd(&workspace)
        .args(["intake", "purchase-order", "-i"])
        .arg(&body)
        .assert()
        .failure()
        .stderr(contains("status 422"));
    let response: Value = serde_json::from_slice(&assert.get_output().stdout).expect("envelope");
    assert_eq!(response["success"], false);
    assert!(response["messages"]["1.po_date"].is_array());
    let conn = workspace.connection();
    assert_eq!(count(&conn, "gec_purchase_order"), 0);
}

#[test]
fn financials_round_trip_through_the_cli() {
    let workspace = TestWorkspace::new();
    init(&workspace);
    let registry = workspace.write(
        "registry.json",
        &format!(r#"{{"searchResults": [{{"registrationNo": "{TAX_ID}", "companyName": "ACME"}}]}}"#),
    );
    intake_cmd(&workspace)
        .args(["registry", "-i"])
        .arg(&registry)
        .assert()
        .success()
        .stdout(contains("payload_id"));

    workspace.write(
        &format!("fs/{TAX_ID}_income.json"),
        r#"{"2566": [{"item_en": "net_profit", "amount": "-12.5"}]}"#,
    );
    intake_cmd(&workspace)
        .args(["import-financial", "--dir"])
        .arg(workspace.path().join("fs"))
        .assert()
        .success()
        .stdout(contains("files"));

    let assert = intake_cmd(&workspace)
        .args(["financials", TAX_ID, "--year", "2023"])
        .assert()
        .success();
    let response: Value = serde_json::from_slice(&assert.get_output().stdout).expect("envelope");
    assert_eq!(response["data"]["income"]["net_profit"], "-12.50");
    assert!(response["data"]["balance"].is_null());

    intake_cmd(&workspace)
        .args(["financials", TAX_ID, "--from", "2010", "--to", "2012"])
        .assert()
        .failure()
        .stderr(contains("status 404"));

    intake_cmd(&workspace)
        .args(["financials", "12345", "--year", "2023"])
        .assert()
        .failure()
        .stderr(contains("status 422"));
}

#[test]
fn config_file_supplies_the_database() {
    let workspace = TestWorkspace::new();
    let config = workspace.write(
        "intake.yml",
        &format!("database: {}\nmax_log_errors: 3\n", workspace.database().display()),
    );
    Command::cargo_bin("report-intake")
        .expect("binary exists")
        .env("RUST_LOG", "off")
        .arg("--config")
        .arg(&config)
        .arg("init-db")
        .assert()
        .success();
    assert!(workspace.database().exists());
}
