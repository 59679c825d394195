//! Catalog of streaming import sources.
//!
//! Each source names its default table and JSON pointer, the dictionary that
//! turns vendor column labels into canonical keys, the header labels that
//! betray a repeated header row, the per-field normalization plan and the
//! validation rules applied after normalization.

use std::fmt;

use clap::ValueEnum;
use rust_decimal::Decimal;

use crate::data::{Cell, Record};
use crate::header::HeaderLabels;
use crate::normalize::{self, Corrections};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum SourceKind {
    /// Supplier invoice register exported from the procurement portal
    InvoiceReport,
    /// Legacy invoice dump with canonical keys
    LegacyInvoice,
    /// Remittance advice lines (Thai column labels)
    Remittance,
    /// Remittance advice workbook: rows per sheet, supplier code at the root
    RemittanceAdvice,
    /// Remittance summary rows with canonical keys
    RemittanceSummary,
    /// Retail sale invoices per supplier round
    SaleInvoice,
    /// Retail sale lines per product and supplier round
    SaleSupplier,
}

impl SourceKind {
    pub fn spec(self) -> &'static SourceSpec {
        match self {
            SourceKind::InvoiceReport => &INVOICE_REPORT,
            SourceKind::LegacyInvoice => &LEGACY_INVOICE,
            SourceKind::Remittance => &REMITTANCE,
            SourceKind::RemittanceAdvice => &REMITTANCE_ADVICE,
            SourceKind::RemittanceSummary => &REMITTANCE_SUMMARY,
            SourceKind::SaleInvoice => &SALE_INVOICE,
            SourceKind::SaleSupplier => &SALE_SUPPLIER,
        }
    }

    pub fn as_str(self) -> &'static str {
        self.spec().name
    }

    pub fn from_str_name(name: &str) -> Option<Self> {
        Self::value_variants()
            .iter()
            .copied()
            .find(|kind| kind.as_str() == name)
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fill {
    /// Copy another canonical field when the target is missing or null.
    From(&'static str),
    Zero,
}

/// Which canonical fields get which normalizer.
#[derive(Debug, Clone, Copy)]
pub struct NormalizationPlan {
    pub dates: &'static [&'static str],
    /// Date-times prone to day/month transposition.
    pub datetimes: &'static [&'static str],
    pub amounts: &'static [&'static str],
    pub texts: &'static [&'static str],
    /// Document numbers that spreadsheets export as floats (`12345.0`).
    pub document_numbers: &'static [&'static str],
    pub fills: &'static [(&'static str, Fill)],
}

impl NormalizationPlan {
    pub fn apply(&self, record: &mut Record, corrections: &mut Corrections) {
        for field in self.texts {
            rewrite(record, field, |cell| match cell {
                Cell::Text(text) => normalize::null_if_empty(&text).into(),
                Cell::Integer(i) => Cell::Text(i.to_string()),
                Cell::Decimal(d) => Cell::Text(d.normalize().to_string()),
                other => other,
            });
        }
        for field in self.document_numbers {
            rewrite(record, field, |cell| match cell {
                Cell::Text(text) => normalize::null_if_empty(&text)
                    .map(|text| normalize::strip_trailing_zero_fraction(&text))
                    .into(),
                Cell::Integer(i) => Cell::Text(i.to_string()),
                Cell::Decimal(d) => Cell::Text(d.normalize().to_string()),
                other => other,
            });
        }
        for field in self.dates {
            rewrite(record, field, |cell| match cell {
                Cell::Text(text) => normalize::normalize_date(&text).into(),
                Cell::Integer(i) => normalize::normalize_date(&i.to_string()).into(),
                Cell::DateTime(dt) => Cell::Date(dt.date()),
                other => other,
            });
        }
        for field in self.datetimes {
            rewrite(record, field, |cell| match cell {
                Cell::Text(text) => normalize::normalize_datetime(&text, corrections).into(),
                other => other,
            });
        }
        for field in self.amounts {
            rewrite(record, field, |cell| match cell {
                Cell::Text(text) => normalize::normalize_amount_str(&text).into(),
                Cell::Integer(i) => Cell::Decimal(Decimal::from(i)),
                Cell::Bool(_) => Cell::Null,
                other => other,
            });
        }
        for (target, fill) in self.fills {
            let missing = record.get(*target).is_none_or(Cell::is_null);
            if !missing {
                continue;
            }
            let value = match fill {
                Fill::From(source) => record.get(*source).filter(|c| !c.is_null()).cloned(),
                Fill::Zero => Some(Cell::Decimal(Decimal::ZERO)),
            };
            if let Some(value) = value {
                record.insert(target.to_string(), value);
            }
        }
    }
}

fn rewrite(record: &mut Record, field: &str, mut f: impl FnMut(Cell) -> Cell) {
    if let Some(cell) = record.remove(field) {
        record.insert(field.to_string(), f(cell));
    }
}

#[derive(Debug)]
pub struct SourceSpec {
    pub name: &'static str,
    pub table: &'static str,
    /// RFC 6901 pointer to the row array; empty for an array root, `*` for
    /// every member at one level.
    pub pointer: &'static str,
    /// `(root member, canonical field)`: the root value stands in when a row
    /// leaves the field empty.
    pub root_fallbacks: &'static [(&'static str, &'static str)],
    pub dictionary: &'static [(&'static str, &'static str)],
    pub headers: HeaderLabels,
    pub plan: NormalizationPlan,
    pub rules: &'static [(&'static str, &'static str)],
}

const NO_FIELDS: &[&str] = &[];

pub static INVOICE_REPORT: SourceSpec = SourceSpec {
    name: "invoice-report",
    table: "invoice_detail_report",
    pointer: "/records",
    root_fallbacks: &[],
    dictionary: &[
        ("Invoice No.", "invoice_no"),
        ("Supplier Code", "supplier_code"),
        ("Supplier Name", "supplier_name"),
        ("Invoice Date", "invoice_date"),
        ("Invoice Received Date", "invoice_received_date"),
        ("Related Document", "po_no"),
        ("Amount", "amount"),
        ("Status", "status"),
    ],
    headers: HeaderLabels(&[
        ("invoice_no", &["Invoice No", "Invoice No."]),
        ("supplier_code", &["Supplier Code"]),
        ("supplier_name", &["Supplier Name"]),
        ("invoice_date", &["Invoice Date"]),
        ("invoice_received_date", &["Invoice Received Date"]),
        ("po_no", &["Related Document", "PO No", "PO No."]),
        ("amount", &["Amount", "Amount (THB)", "Amount Include VAT"]),
        ("status", &["Status"]),
    ]),
    plan: NormalizationPlan {
        dates: &["invoice_date"],
        datetimes: &["invoice_received_date"],
        amounts: &["amount"],
        texts: &["invoice_no", "supplier_code", "supplier_name", "po_no", "status"],
        document_numbers: NO_FIELDS,
        fills: &[],
    },
    rules: &[
        ("invoice_no", "nullable|string"),
        ("supplier_code", "nullable|string"),
        ("supplier_name", "nullable|string"),
        ("invoice_date", "nullable|date_format:%Y-%m-%d"),
        ("invoice_received_date", "nullable|date"),
        ("po_no", "nullable|string"),
        ("amount", "nullable|numeric"),
        ("status", "nullable|string|max:50"),
    ],
};

pub static LEGACY_INVOICE: SourceSpec = SourceSpec {
    name: "legacy-invoice",
    table: "gec_invoice_legacy",
    pointer: "",
    root_fallbacks: &[],
    dictionary: &[
        ("invoice_no", "invoice_no"),
        ("invoice_date", "invoice_date"),
        ("po_no", "po_no"),
        ("po_date", "po_date"),
        ("supplier_code", "supplier_code"),
        ("buyer_code", "buyer_code"),
        ("amount_excl_vat", "amount_excl_vat"),
        ("vat_amount", "vat_amount"),
        ("amount_incl_vat", "amount_incl_vat"),
    ],
    headers: HeaderLabels(&[
        ("invoice_no", &["invoice_no", "Invoice No", "Invoice No."]),
        ("po_no", &["po_no", "PO No", "PO No."]),
    ]),
    plan: NormalizationPlan {
        dates: &["invoice_date", "po_date"],
        datetimes: NO_FIELDS,
        amounts: &["amount_excl_vat", "vat_amount", "amount_incl_vat"],
        texts: &["supplier_code", "buyer_code"],
        document_numbers: &["invoice_no", "po_no"],
        fills: &[],
    },
    rules: &[
        ("invoice_no", "nullable|string"),
        ("invoice_date", "nullable|date"),
        ("po_no", "nullable|string"),
        ("po_date", "nullable|date"),
        ("supplier_code", "nullable|string"),
        ("buyer_code", "nullable|string"),
        ("amount_excl_vat", "nullable|numeric"),
        ("vat_amount", "nullable|numeric"),
        ("amount_incl_vat", "nullable|numeric"),
    ],
};

pub static REMITTANCE: SourceSpec = SourceSpec {
    name: "remittance",
    table: "rm_detail_report",
    pointer: "/transactions",
    root_fallbacks: &[],
    dictionary: &[
        ("วันที่", "invoice_date"),
        ("วันที่เอกสาร", "report_date"),
        ("วันที่จ่ายเงิน", "payment_date"),
        ("รหัสผู้ขาย", "supplier_code"),
        ("รหัสสาขา", "branch_code"),
        ("ประเภทเอกสาร", "doc_type"),
        ("เลขที่เอกสาร", "doc_no"),
        ("เลขที่เอกสารอ้างอิง", "doc_ref_no"),
        ("จำนวน", "rm_amount"),
    ],
    headers: HeaderLabels(&[
        ("doc_no", &["เลขที่เอกสาร"]),
        ("supplier_code", &["รหัสผู้ขาย"]),
    ]),
    plan: NormalizationPlan {
        dates: &["invoice_date", "report_date", "payment_date"],
        datetimes: NO_FIELDS,
        amounts: &["rm_amount"],
        texts: &["supplier_code", "branch_code", "doc_type"],
        document_numbers: &["doc_no", "doc_ref_no"],
        fills: &[("report_date", Fill::From("invoice_date"))],
    },
    rules: &[
        ("report_date", "nullable|date_format:%Y-%m-%d"),
        ("payment_date", "nullable|date_format:%Y-%m-%d"),
        ("invoice_date", "nullable|date_format:%Y-%m-%d"),
        ("supplier_code", "nullable|string"),
        ("branch_code", "nullable|string"),
        ("doc_type", "nullable|string|max:20"),
        ("doc_no", "nullable|string"),
        ("doc_ref_no", "nullable|string"),
        ("rm_amount", "nullable|numeric"),
    ],
};

pub static REMITTANCE_ADVICE: SourceSpec = SourceSpec {
    name: "remittance-advice",
    table: "rm_detail_report",
    pointer: "/sheets/*/rows",
    root_fallbacks: &[("supplier_code", "supplier_code")],
    dictionary: &[
        ("supplier_code", "supplier_code"),
        ("วันที่", "invoice_date"),
        ("วันที่จ่ายเงิน", "payment_date"),
        ("รหัสสาขา", "branch_code"),
        ("ประเภทเอกสาร", "doc_type"),
        ("เลขที่เอกสาร", "doc_no"),
        ("เลขที่เอกสารอ้างอิง", "doc_ref_no"),
        ("จำนวน", "rm_amount"),
    ],
    headers: HeaderLabels(&[("doc_no", &["เลขที่เอกสาร"])]),
    plan: NormalizationPlan {
        dates: &["invoice_date", "payment_date"],
        datetimes: NO_FIELDS,
        amounts: &["rm_amount"],
        texts: &["supplier_code", "branch_code", "doc_type"],
        document_numbers: &["doc_no", "doc_ref_no"],
        fills: &[],
    },
    rules: &[
        ("supplier_code", "required|string"),
        ("invoice_date", "nullable|date_format:%Y-%m-%d"),
        ("payment_date", "nullable|date_format:%Y-%m-%d"),
        ("branch_code", "nullable|string"),
        ("doc_type", "nullable|string|max:20"),
        ("doc_no", "nullable|string"),
        ("doc_ref_no", "nullable|string"),
        ("rm_amount", "nullable|numeric"),
    ],
};

pub static REMITTANCE_SUMMARY: SourceSpec = SourceSpec {
    name: "remittance-summary",
    table: "rm_report",
    pointer: "",
    root_fallbacks: &[],
    dictionary: &[
        ("remittance_no", "remittance_no"),
        ("supplier_code", "supplier_code"),
        ("supplier_name", "supplier_name"),
        ("branch", "branch"),
        ("remittance_date", "remittance_date"),
        ("pay_date", "pay_date"),
        ("sent_date", "sent_date"),
        ("amount", "amount"),
        ("status", "status"),
    ],
    headers: HeaderLabels::NONE,
    plan: NormalizationPlan {
        dates: &["remittance_date", "pay_date", "sent_date"],
        datetimes: NO_FIELDS,
        amounts: &["amount"],
        texts: &["supplier_code", "supplier_name", "branch", "status"],
        document_numbers: &["remittance_no"],
        fills: &[("amount", Fill::Zero)],
    },
    rules: &[
        ("remittance_no", "nullable|string"),
        ("supplier_code", "nullable|string"),
        ("supplier_name", "nullable|string"),
        ("branch", "nullable|string"),
        ("remittance_date", "nullable|date"),
        ("pay_date", "nullable|date"),
        ("sent_date", "nullable|date"),
        ("amount", "nullable|numeric"),
        ("status", "nullable|string|max:50"),
    ],
};

pub static SALE_INVOICE: SourceSpec = SourceSpec {
    name: "sale-invoice",
    table: "sale_invoice_report",
    pointer: "",
    root_fallbacks: &[],
    dictionary: &[
        ("เลขที่เอกสาร", "doc_no"),
        ("Invoice no.", "invoice_no"),
        ("วันที่เอกสาร", "invoice_date"),
        ("PO no.", "po_no"),
        ("CN. Ref. Doc.", "cn_ref_doc"),
        ("Assignment", "assignment"),
        ("จำนวนเงิน", "amount"),
        ("ภาษี", "vat"),
        ("จำนวนเงินสุทธิ", "net_amount"),
        ("start_round_date", "start_round_date"),
        ("end_round_date", "end_round_date"),
        ("supplier_name", "supplier_name"),
        ("supplier_num", "supplier_code"),
    ],
    headers: HeaderLabels(&[
        ("doc_no", &["เลขที่เอกสาร"]),
        ("invoice_no", &["Invoice no."]),
    ]),
    plan: NormalizationPlan {
        dates: &["invoice_date", "start_round_date", "end_round_date"],
        datetimes: NO_FIELDS,
        amounts: &["amount", "vat", "net_amount"],
        texts: &["assignment", "supplier_name", "supplier_code"],
        document_numbers: &["doc_no", "invoice_no", "po_no", "cn_ref_doc"],
        fills: &[],
    },
    rules: &[
        ("doc_no", "nullable|string"),
        ("invoice_no", "nullable|string"),
        ("invoice_date", "nullable|date_format:%Y-%m-%d"),
        ("po_no", "nullable|string"),
        ("cn_ref_doc", "nullable|string"),
        ("assignment", "nullable|string"),
        ("amount", "nullable|numeric"),
        ("vat", "nullable|numeric"),
        ("net_amount", "nullable|numeric"),
        ("start_round_date", "nullable|date_format:%Y-%m-%d"),
        ("end_round_date", "nullable|date_format:%Y-%m-%d"),
        ("supplier_name", "nullable|string"),
        ("supplier_code", "nullable|string"),
    ],
};

pub static SALE_SUPPLIER: SourceSpec = SourceSpec {
    name: "sale-supplier",
    table: "sale_supplier_report",
    pointer: "",
    root_fallbacks: &[],
    dictionary: &[
        ("รหัสสินค้า", "product_code"),
        ("บาร์โค้ด", "barcode"),
        ("ชื่อสินค้า", "product_name"),
        ("Invoice no.", "invoice_no"),
        ("Document", "doc_no"),
        ("ราคาทุน/หน่วย", "cost_per_unit"),
        ("จำนวนที่ขาย", "qty_sold"),
        ("จำนวนเงิน", "amount"),
        ("ภาษี", "vat"),
        ("จำนวนเงินสุทธิ", "net_amount"),
        ("start_round_date", "start_round_date"),
        ("end_round_date", "end_round_date"),
        ("supplier_name", "supplier_name"),
        ("supplier_num", "supplier_code"),
    ],
    headers: HeaderLabels(&[
        ("product_code", &["รหัสสินค้า"]),
        ("barcode", &["บาร์โค้ด"]),
    ]),
    plan: NormalizationPlan {
        dates: &["start_round_date", "end_round_date"],
        datetimes: NO_FIELDS,
        amounts: &["cost_per_unit", "qty_sold", "amount", "vat", "net_amount"],
        texts: &["product_name", "supplier_name", "supplier_code"],
        document_numbers: &["product_code", "barcode", "invoice_no", "doc_no"],
        fills: &[],
    },
    rules: &[
        ("product_code", "nullable|string"),
        ("barcode", "nullable|string"),
        ("product_name", "nullable|string"),
        ("invoice_no", "nullable|string"),
        ("doc_no", "nullable|string"),
        ("cost_per_unit", "nullable|numeric"),
        ("qty_sold", "nullable|numeric"),
        ("amount", "nullable|numeric"),
        ("vat", "nullable|numeric"),
        ("net_amount", "nullable|numeric"),
        ("start_round_date", "nullable|date_format:%Y-%m-%d"),
        ("end_round_date", "nullable|date_format:%Y-%m-%d"),
        ("supplier_name", "nullable|string"),
        ("supplier_code", "nullable|string"),
    ],
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::FieldDictionary;
    use crate::rules::RuleSet;
    use chrono::NaiveDate;
    use serde_json::json;
    use std::str::FromStr;

    const ALL: &[SourceKind] = &[
        SourceKind::InvoiceReport,
        SourceKind::LegacyInvoice,
        SourceKind::Remittance,
        SourceKind::RemittanceAdvice,
        SourceKind::RemittanceSummary,
        SourceKind::SaleInvoice,
        SourceKind::SaleSupplier,
    ];

    #[test]
    fn every_source_is_well_formed() {
        for kind in ALL {
            let spec = kind.spec();
            let dictionary = FieldDictionary::new(spec.name, spec.dictionary).unwrap();
            let targets: Vec<_> = dictionary.targets().collect();
            let rules = RuleSet::parse(spec.rules).unwrap();
            for field in rules.fields() {
                assert!(
                    targets.iter().any(|t| *t == field),
                    "{}: rule for unmapped {field}",
                    spec.name
                );
            }
            for (_, field) in spec.root_fallbacks {
                assert!(targets.contains(field), "{}: fallback for unmapped {field}", spec.name);
            }
            assert!(crate::tables::find(spec.table).is_some(), "{}", spec.table);
        }
    }

    #[test]
    fn remittance_plan_fills_report_date() {
        let dictionary = FieldDictionary::new("remittance", REMITTANCE.dictionary).unwrap();
        let raw = json!({
            "วันที่": "05/01/2567",
            "เลขที่เอกสาร": 5100012345.0,
            "จำนวน": "1,250.00",
        });
        let mut record = dictionary.map(raw.as_object().unwrap());
        let mut corrections = Corrections::default();
        REMITTANCE.plan.apply(&mut record, &mut corrections);
        let expected = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
        assert_eq!(record["invoice_date"], Cell::Date(expected));
        assert_eq!(record["report_date"], Cell::Date(expected));
        assert_eq!(record["doc_no"], Cell::Text("5100012345".into()));
        assert_eq!(
            record["rm_amount"],
            Cell::Decimal(Decimal::from_str("1250.00").unwrap())
        );
    }

    #[test]
    fn numeric_codes_become_text() {
        let mut record = Record::new();
        record.insert("supplier_code".into(), Cell::Integer(72195));
        INVOICE_REPORT
            .plan
            .apply(&mut record, &mut Corrections::default());
        assert_eq!(record["supplier_code"], Cell::Text("72195".into()));
    }
}
