use std::fmt::Write as _;

use criterion::{BatchSize, Criterion, Throughput, criterion_group, criterion_main};
use report_intake::import::{self, ImportOptions};
use report_intake::sources::SourceKind;
use report_intake::tables;
use rusqlite::Connection;

fn generate_invoices(rows: usize) -> String {
    let mut doc = String::from("{\"records\": [");
    for i in 0..rows {
        if i > 0 {
            doc.push(',');
        }
        let day = (i % 28) + 1;
        let _ = write!(
            doc,
            r#"{{"Invoice No.": "INV-{i:07}", "Supplier Code": {supplier}, "Supplier Name": "Supplier {supplier}",
               "Invoice Date": "{day:02}/01/2567", "Invoice Received Date": "2024-{day:02}-01 08:30:00",
               "Related Document": "PO-{i}", "Amount": "{amount},{cents:03}.50", "Status": "Paid"}}"#,
            supplier = 70_000 + i % 50,
            amount = i % 900 + 1,
            cents = i % 1000,
        );
    }
    doc.push_str("]}");
    doc
}

fn fresh_store() -> Connection {
    let conn = Connection::open_in_memory().expect("in-memory store");
    tables::bootstrap(&conn).expect("create tables");
    conn
}

fn bench_import(c: &mut Criterion) {
    let rows = 20_000;
    let doc = generate_invoices(rows);
    let insert = ImportOptions::new(SourceKind::InvoiceReport);
    let mut dry_run = ImportOptions::new(SourceKind::InvoiceReport);
    dry_run.dry_run = true;

    let mut group = c.benchmark_group("invoice_report_import");
    group.throughput(Throughput::Elements(rows as u64));
    group.sample_size(10);

    group.bench_function("dry_run", |b| {
        b.iter_batched(
            fresh_store,
            |conn| {
                import::run(&conn, &dry_run, doc.as_bytes()).expect("dry run");
            },
            BatchSize::PerIteration,
        );
    });

    group.bench_function("insert", |b| {
        b.iter_batched(
            fresh_store,
            |conn| {
                import::run(&conn, &insert, doc.as_bytes()).expect("insert run");
            },
            BatchSize::PerIteration,
        );
    });

    group.finish();
}

criterion_group!(benches, bench_import);
criterion_main!(benches);
