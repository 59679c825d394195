//! Public intake endpoints.
//!
//! Unlike the streaming importers an intake batch is all-or-nothing: every
//! item is validated first, and only a fully valid batch is written, inside
//! one transaction.

use std::collections::BTreeMap;

use chrono::Local;
use clap::ValueEnum;
use log::{error, info, warn};
use rusqlite::Connection;
use serde_json::{Value, json};
use thiserror::Error;

use crate::api::ApiResponse;
use crate::data::{Cell, Record, record_to_json};
use crate::mapping::{FieldDictionary, MappingError};
use crate::normalize::normalize_identifier;
use crate::rules::{FieldErrors, RuleParseError, RuleSet};
use crate::store::{self, WriteFailure, WriteMode};
use crate::tables;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Endpoint {
    /// Balance-sheet lines with English labels, upserted per company and year
    BalanceSheet,
    /// Income-statement lines with English labels, upserted per company and year
    IncomeStatement,
    PurchaseOrder,
    Invoice,
    LegacyInvoice,
    /// Supplier registry rows; registers unknown companies
    Supplier,
}

struct EndpointSpec {
    table: &'static str,
    dictionary: Option<&'static [(&'static str, &'static str)]>,
    renames: &'static [(&'static str, &'static str)],
    upsert_keys: &'static [&'static str],
    rules: &'static [(&'static str, &'static str)],
}

impl Endpoint {
    fn spec(self) -> &'static EndpointSpec {
        match self {
            Endpoint::BalanceSheet => &BALANCE_SHEET,
            Endpoint::IncomeStatement => &INCOME_STATEMENT,
            Endpoint::PurchaseOrder => &PURCHASE_ORDER,
            Endpoint::Invoice => &INVOICE,
            Endpoint::LegacyInvoice => &LEGACY_INVOICE,
            Endpoint::Supplier => &SUPPLIER,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Endpoint::BalanceSheet => "balance-sheet",
            Endpoint::IncomeStatement => "income-statement",
            Endpoint::PurchaseOrder => "purchase-order",
            Endpoint::Invoice => "invoice",
            Endpoint::LegacyInvoice => "legacy-invoice",
            Endpoint::Supplier => "supplier",
        }
    }
}

#[derive(Debug, Error)]
pub enum IntakeError {
    #[error("Validation failed")]
    Validation(FieldErrors),
    #[error(transparent)]
    Mapping(#[from] MappingError),
    #[error(transparent)]
    Rules(#[from] RuleParseError),
    #[error(transparent)]
    Write(#[from] WriteFailure),
    #[error(transparent)]
    Store(#[from] rusqlite::Error),
}

/// Validates and persists one request body, mapping every outcome to a
/// response.
pub fn handle(conn: &Connection, endpoint: Endpoint, body: &Value) -> ApiResponse {
    match submit(conn, endpoint, body) {
        Ok(stored) => ApiResponse::new(
            200,
            json!({
                "success": true,
                "count_req": body.as_array().map_or(0, Vec::len),
                "count_output": stored.len(),
                "data": stored.iter().map(record_to_json).collect::<Vec<_>>(),
            }),
        ),
        Err(IntakeError::Validation(errors)) => {
            warn!(
                "{} intake rejected {} field(s), first: {}",
                endpoint.name(),
                errors.0.len(),
                errors.first_message().unwrap_or_default()
            );
            ApiResponse::validation_failed(errors.0)
        }
        Err(err) => {
            error!("{} intake failed: {err}", endpoint.name());
            ApiResponse::server_error(err.to_string())
        }
    }
}

/// Returns the rows as written, timestamps included.
pub fn submit(
    conn: &Connection,
    endpoint: Endpoint,
    body: &Value,
) -> Result<Vec<Record>, IntakeError> {
    let spec = endpoint.spec();
    let rules = RuleSet::parse(spec.rules)?;
    let dictionary = spec
        .dictionary
        .map(|entries| FieldDictionary::new(endpoint.name(), entries))
        .transpose()?;

    let Some(items) = body.as_array() else {
        return Err(IntakeError::Validation(FieldErrors(BTreeMap::from([(
            "body".to_string(),
            vec!["The request body must be an array.".to_string()],
        )]))));
    };

    let mut valid = Vec::with_capacity(items.len());
    let mut errors = BTreeMap::new();
    for (index, item) in items.iter().enumerate() {
        let Some(object) = item.as_object() else {
            errors.insert(index.to_string(), vec!["The item must be an object.".to_string()]);
            continue;
        };
        let mut record = match &dictionary {
            Some(dictionary) => dictionary.map(object),
            None => object
                .iter()
                .map(|(key, value)| (key.clone(), Cell::from_json(value.clone())))
                .collect::<Record>(),
        };
        for (from, to) in spec.renames {
            if let Some(cell) = record.remove(*from) {
                record.insert(to.to_string(), cell);
            }
        }
        match rules.validate(record) {
            Ok(record) => valid.push(record),
            Err(FieldErrors(fields)) => {
                for (field, messages) in fields {
                    errors.insert(format!("{index}.{field}"), messages);
                }
            }
        }
    }
    if !errors.is_empty() {
        return Err(IntakeError::Validation(FieldErrors(errors)));
    }

    let mode = if spec.upsert_keys.is_empty() {
        WriteMode::Insert
    } else {
        WriteMode::Upsert {
            keys: spec.upsert_keys.iter().map(|k| k.to_string()).collect(),
        }
    };
    let now = Cell::DateTime(Local::now().naive_local());
    let tx = conn.unchecked_transaction()?;
    for record in &mut valid {
        record.insert("created_at".into(), now.clone());
        record.insert("updated_at".into(), now.clone());
        if endpoint == Endpoint::Supplier {
            register_company(&tx, record, &now)?;
        }
        store::write_record(&tx, spec.table, record, &mode)?;
    }
    tx.commit()?;
    info!("{} intake stored {} row(s)", endpoint.name(), valid.len());
    Ok(valid)
}

/// Creates the `company_entity` row for a supplier the registry has not
/// delivered yet. Existing companies are left untouched.
fn register_company(conn: &Connection, supplier: &Record, now: &Cell) -> Result<(), IntakeError> {
    let Some(registration_id) = supplier.get("registration_id").and_then(Cell::as_text) else {
        return Ok(());
    };
    let registered_no = normalize_identifier(registration_id);
    if store::parent_exists(conn, tables::COMPANY_ENTITY, "registered_no", &registered_no)? {
        return Ok(());
    }
    let mut company = Record::new();
    company.insert("registered_no".into(), Cell::Text(registered_no));
    for (from, to) in [
        ("supplier_name", "company_name"),
        ("registration_date", "registration_date"),
        ("registered_capital", "registered_capital"),
        ("size", "business_size"),
    ] {
        if let Some(cell) = supplier.get(from) {
            company.insert(to.into(), cell.clone());
        }
    }
    company.insert("created_at".into(), now.clone());
    company.insert("updated_at".into(), now.clone());
    store::write_record(conn, tables::COMPANY_ENTITY, &company, &WriteMode::Insert)?;
    Ok(())
}

static BALANCE_SHEET: EndpointSpec = EndpointSpec {
    table: "bol_balance_sheet_raw",
    dictionary: Some(&[
        ("company_id", "company_id"),
        ("company_name", "company_name"),
        ("year", "year"),
        ("Assets", "assets"),
        ("Cash and deposits at financial institutions", "cash_and_deposits_at_financial_institutions"),
        ("Accounts receivable", "accounts_receivable"),
        ("Accounts and notes receivable - net", "accounts_and_notes_receivable_net"),
        ("Total short-term loans consolidation", "total_short_term_loans_consolidation"),
        ("Inventories-net", "inventories_net"),
        ("Accrued income", "accrued_income"),
        ("Prepaid expenses", "prepaid_expenses"),
        ("Other current assets", "other_current_assets"),
        ("Others - Total current assets", "others_total_current_assets"),
        ("Total current assets", "total_current_assets"),
        ("Total long-term loans and investments", "total_long_term_loans_and_investments"),
        ("Property, plant and equipment - net", "property_plant_and_equipment_net"),
        ("Other non-current assets", "other_non_current_assets"),
        ("Others - Total non-current assets", "others_total_non_current_assets"),
        ("Total non-current assets", "total_non_current_assets"),
        ("Total assets", "total_assets"),
        ("Liabilities and shareholders' equity", "liabilities_and_shareholders_equity"),
        ("Liabilities", "liabilities"),
        (
            "Bank overdrafts and short-term loans from financial institutions",
            "bank_overdrafts_and_short_term_loans_from_financial_institutions",
        ),
        ("Accounts payable", "accounts_payable"),
        ("Total accounts payable and notes payable", "total_accounts_payable_and_notes_payable"),
        ("Current portion of long-term loans", "current_portion_of_long_term_loans"),
        ("Total short-term loans", "total_short_term_loans"),
        ("Accrued expenses", "accrued_expenses"),
        ("Unearned revenues", "unearned_revenues"),
        ("Other current liabilities", "other_current_liabilities"),
        ("Others - Total current liabilities", "others_total_current_liabilities"),
        ("Total current liabilities", "total_current_liabilities"),
        ("Total long-term loans", "total_long_term_loans"),
        ("Other non-current liabilities", "other_non_current_liabilities"),
        ("Others - Total non-current liabilities", "others_total_non_current_liabilities"),
        ("Total non-current liabilities", "total_non_current_liabilities"),
        ("Total Liabilities", "total_liabilities"),
        ("Shareholder's equity", "shareholders_equity"),
        ("Authorized preferred stocks", "authorized_preferred_stocks"),
        ("Authorized common stocks", "authorized_common_stocks"),
        ("Issued and paid-up preferred stocks", "issued_and_paid_up_preferred_stocks"),
        ("Issued and paid-up common stocks", "issued_and_paid_up_common_stocks"),
        (
            "Appraisal surplus on property, plant and equipment",
            "appraisal_surplus_on_property_plant_and_equipment",
        ),
        ("Accumulated retained earnings", "accumulated_retained_earnings"),
        ("Others", "others"),
        ("Total shareholders' equity", "total_shareholders_equity"),
        ("Total liabilities and shareholders' equity", "total_liabilities_and_shareholders_equity"),
        (
            "Additional information for shareholders' equity",
            "additional_information_for_shareholders_equity",
        ),
        ("Common stocks", "common_stocks"),
        ("No.of shares - Authorized", "no_of_shares_authorized"),
        ("Par value (Baht) - Authorized", "par_value_baht_authorized"),
        ("No.of shares - Issued and paid-up", "no_of_shares_issued_and_paid_up"),
        ("Par value (Baht) - Issued and Paid-up", "par_value_baht_issued_and_paid_up"),
    ]),
    renames: &[],
    upsert_keys: &["company_id", "year"],
    rules: &[
        ("company_id", "required|string"),
        ("company_name", "nullable|string"),
        ("year", "required|integer"),
        ("assets", "nullable|numeric"),
        ("cash_and_deposits_at_financial_institutions", "nullable|numeric"),
        ("accounts_receivable", "nullable|numeric"),
        ("accounts_and_notes_receivable_net", "nullable|numeric"),
        ("total_short_term_loans_consolidation", "nullable|numeric"),
        ("inventories_net", "nullable|numeric"),
        ("accrued_income", "nullable|numeric"),
        ("prepaid_expenses", "nullable|numeric"),
        ("other_current_assets", "nullable|numeric"),
        ("others_total_current_assets", "nullable|numeric"),
        ("total_current_assets", "nullable|numeric"),
        ("total_long_term_loans_and_investments", "nullable|numeric"),
        ("property_plant_and_equipment_net", "nullable|numeric"),
        ("other_non_current_assets", "nullable|numeric"),
        ("others_total_non_current_assets", "nullable|numeric"),
        ("total_non_current_assets", "nullable|numeric"),
        ("total_assets", "nullable|numeric"),
        ("liabilities_and_shareholders_equity", "nullable|numeric"),
        ("liabilities", "nullable|numeric"),
        ("bank_overdrafts_and_short_term_loans_from_financial_institutions", "nullable|numeric"),
        ("accounts_payable", "nullable|numeric"),
        ("total_accounts_payable_and_notes_payable", "nullable|numeric"),
        ("current_portion_of_long_term_loans", "nullable|numeric"),
        ("total_short_term_loans", "nullable|numeric"),
        ("accrued_expenses", "nullable|numeric"),
        ("unearned_revenues", "nullable|numeric"),
        ("other_current_liabilities", "nullable|numeric"),
        ("others_total_current_liabilities", "nullable|numeric"),
        ("total_current_liabilities", "nullable|numeric"),
        ("total_long_term_loans", "nullable|numeric"),
        ("other_non_current_liabilities", "nullable|numeric"),
        ("others_total_non_current_liabilities", "nullable|numeric"),
        ("total_non_current_liabilities", "nullable|numeric"),
        ("total_liabilities", "nullable|numeric"),
        ("shareholders_equity", "nullable|numeric"),
        ("authorized_preferred_stocks", "nullable|numeric"),
        ("authorized_common_stocks", "nullable|numeric"),
        ("issued_and_paid_up_preferred_stocks", "nullable|numeric"),
        ("issued_and_paid_up_common_stocks", "nullable|numeric"),
        ("appraisal_surplus_on_property_plant_and_equipment", "nullable|numeric"),
        ("accumulated_retained_earnings", "nullable|numeric"),
        ("others", "nullable|numeric"),
        ("total_shareholders_equity", "nullable|numeric"),
        ("total_liabilities_and_shareholders_equity", "nullable|numeric"),
        ("additional_information_for_shareholders_equity", "nullable|numeric"),
        ("common_stocks", "nullable|numeric"),
        ("no_of_shares_authorized", "nullable|integer"),
        ("par_value_baht_authorized", "nullable|numeric"),
        ("no_of_shares_issued_and_paid_up", "nullable|integer"),
        ("par_value_baht_issued_and_paid_up", "nullable|numeric"),
    ],
};

static INCOME_STATEMENT: EndpointSpec = EndpointSpec {
    table: "bol_income_statement_raw",
    dictionary: Some(&[
        ("company_id", "company_id"),
        ("company_name", "company_name"),
        ("year", "year"),
        ("Net Sales", "net_sales"),
        ("Total other income", "total_other_income"),
        ("Total revenue", "total_revenue"),
        ("Cost of sales /services", "cost_of_sales_services"),
        ("Gross profit (loss)", "gross_profit_loss"),
        ("Total operating expenses", "total_operating_expenses"),
        ("Operating income (loss)", "operating_income_loss"),
        ("Other expenses", "other_expenses"),
        (
            "Income (loss) before depreciation and amortization",
            "income_loss_before_depreciation_and_amoritization",
        ),
        (
            "Income (loss) before interest and income taxes",
            "income_loss_before_interest_and_income_taxes",
        ),
        ("Interest expenses", "interest_expenses"),
        ("Income taxes", "income_taxes"),
        ("Extraordinary items", "extraordinary_items"),
        ("Others", "others"),
        ("Net income (loss)", "net_income_loss"),
        ("Earnings (loss) per share", "earnings_loss_per_share"),
        (
            "Number of Weighted Average Ordinary Shares",
            "number_of_weighted_average_ordinary_shares",
        ),
    ]),
    renames: &[],
    upsert_keys: &["company_id", "year"],
    rules: &[
        ("company_id", "required|string"),
        ("company_name", "nullable|string"),
        ("year", "required|integer"),
        ("net_sales", "nullable|numeric"),
        ("total_other_income", "nullable|numeric"),
        ("total_revenue", "nullable|numeric"),
        ("cost_of_sales_services", "nullable|numeric"),
        ("gross_profit_loss", "nullable|numeric"),
        ("total_operating_expenses", "nullable|numeric"),
        ("operating_income_loss", "nullable|numeric"),
        ("other_expenses", "nullable|numeric"),
        ("income_loss_before_depreciation_and_amoritization", "nullable|numeric"),
        ("income_loss_before_interest_and_income_taxes", "nullable|numeric"),
        ("interest_expenses", "nullable|numeric"),
        ("income_taxes", "nullable|numeric"),
        ("extraordinary_items", "nullable|numeric"),
        ("others", "nullable|numeric"),
        ("net_income_loss", "nullable|numeric"),
        ("earnings_loss_per_share", "nullable|numeric"),
        ("number_of_weighted_average_ordinary_shares", "nullable|numeric"),
    ],
};

static PURCHASE_ORDER: EndpointSpec = EndpointSpec {
    table: "gec_purchase_order",
    dictionary: None,
    renames: &[],
    upsert_keys: &[],
    rules: &[
        ("po_no", "nullable|string"),
        ("po_date", "nullable|date"),
        ("supplier_name", "nullable|string"),
        ("buyer_name", "nullable|string"),
        ("delivery_date", "nullable|date"),
        ("payment_term", "nullable|string"),
        ("amount_excl_vat", "nullable|numeric"),
        ("vat_amount", "nullable|numeric"),
        ("amount_incl_vat", "nullable|numeric"),
    ],
};

static INVOICE: EndpointSpec = EndpointSpec {
    table: "gec_invoice",
    dictionary: None,
    renames: &[],
    upsert_keys: &[],
    rules: &[
        ("invoice_no", "nullable|string"),
        ("po_no", "nullable|string"),
        ("invoice_date", "nullable|date"),
        ("supplier_name", "nullable|string"),
        ("buyer_name", "nullable|string"),
        ("amount_excl_vat", "nullable|numeric"),
        ("vat_amount", "nullable|numeric"),
        ("amount_incl_vat", "nullable|numeric"),
    ],
};

static LEGACY_INVOICE: EndpointSpec = EndpointSpec {
    table: "gec_invoice_legacy",
    dictionary: None,
    renames: &[],
    upsert_keys: &[],
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

static SUPPLIER: EndpointSpec = EndpointSpec {
    table: "dbd_supplier",
    dictionary: None,
    renames: &[("No", "gec_no"), ("group", "group_id")],
    upsert_keys: &[],
    rules: &[
        ("gec_no", "nullable|integer"),
        ("registration_id", "required|string|max:20"),
        ("supplier_id", "required|integer"),
        ("is_supplier", "required|integer"),
        ("start_effective_date", "nullable|date"),
        ("size", "nullable|string|max:10"),
        ("supplier_name", "required|string|max:255"),
        ("registration_date", "nullable|date"),
        ("registered_capital", "nullable|numeric"),
        ("trade_receivables_net", "nullable|numeric"),
        ("inventory", "nullable|numeric"),
        ("current_assets", "nullable|numeric"),
        ("property_plant_equipment", "nullable|numeric"),
        ("non_current_assets", "nullable|numeric"),
        ("total_assets", "nullable|numeric"),
        ("current_liabilities", "nullable|numeric"),
        ("non_current_liabilities", "nullable|numeric"),
        ("total_liabilities", "nullable|numeric"),
        ("shareholders_equity", "nullable|numeric"),
        ("liabilities_and_equity", "nullable|numeric"),
        ("group_id", "nullable|numeric"),
        ("main_revenue", "nullable|numeric"),
        ("total_revenue_fs", "nullable|numeric"),
        ("cost_of_goods_sold", "nullable|numeric"),
        ("gross_profit", "nullable|numeric"),
        ("selling_and_admin_expenses", "nullable|numeric"),
        ("total_expenses", "nullable|numeric"),
        ("interest_expense", "nullable|numeric"),
        ("profit_before_tax", "nullable|numeric"),
        ("income_tax", "nullable|numeric"),
        ("net_profit", "nullable|numeric"),
        ("no_of_buyer", "nullable|integer"),
        ("roa_percent", "nullable|numeric"),
        ("roe_percent", "nullable|numeric"),
        ("gross_profit_margin_percent", "nullable|numeric"),
        ("operating_margin_percent", "nullable|numeric"),
        ("net_margin_percent", "nullable|numeric"),
        ("asset_turnover_ratio", "nullable|numeric"),
        ("receivables_turnover_ratio", "nullable|numeric"),
        ("inventory_turnover_ratio", "nullable|numeric"),
        ("operating_expense_ratio", "nullable|numeric"),
        ("current_ratio", "nullable|numeric"),
        ("debt_to_asset_ratio", "nullable|numeric"),
        ("asset_to_equity_ratio", "nullable|numeric"),
        ("debt_to_equity_ratio", "nullable|numeric"),
    ],
};
