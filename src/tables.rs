//! Destination table catalog and bootstrap DDL.

use std::fmt::Write as _;

use itertools::Itertools;
use rusqlite::Connection;

use crate::store::quote_ident;

pub const BALANCE_SHEET: &str = "company_balance_sheet";
pub const INCOME_STATEMENT: &str = "company_income_statement";
pub const FINANCIAL_RATIOS: &str = "company_financial_ratios";
pub const COMPANY_ENTITY: &str = "company_entity";
pub const COMPANY_DIRECTOR: &str = "company_director";
pub const COMPANY_SHAREHOLDER: &str = "company_shareholder";
pub const COMPANY_FINANCIAL_YEAR: &str = "company_financial_year";
pub const REGISTRY_RAW_PAYLOAD: &str = "registry_raw_payload";

pub const BALANCE_FIELDS: &[&str] = &[
    "accounts_receivable_net",
    "inventories",
    "current_assets",
    "property_plant_equipment",
    "non_current_assets",
    "total_assets",
    "current_liabilities",
    "non_current_liabilities",
    "total_liabilities",
    "shareholders_equity",
    "total_liabilities_and_shareholder_equity",
];

pub const INCOME_FIELDS: &[&str] = &[
    "net_revenue",
    "total_revenue",
    "cost_of_goods_sold",
    "gross_profit",
    "operating_expenses",
    "total_expenses",
    "interest_expenses",
    "profit_before_tax",
    "income_tax_expenses",
    "net_profit",
];

pub const RATIO_FIELDS: &[&str] = &[
    "return_on_assets_percent",
    "return_on_equity_percent",
    "gross_profit_margin_percent",
    "operating_profit_margin_percent",
    "net_profit_margin_percent",
    "current_ratio_times",
    "accounts_receivable_turnover_times",
    "inventory_turnover_times",
    "accounts_payable_turnover_times",
    "total_asset_turnover_times",
    "operating_expense_ratio_percent",
    "total_assets_to_shareholders_equity_ratio_times",
    "total_liabilities_to_total_assets_ratio_times",
    "debt_to_equity_ratio_times",
    "debt_to_working_capital_ratio_times",
];

/// Registry line items; the payload carries each under its lowerCamelCase name.
pub const REGISTRY_FINANCIAL_FIELDS: &[&str] = &[
    "total_assets",
    "retained_earning",
    "total_revenue",
    "gross_profit",
    "income_before_depreciation",
    "income_before_interest_and_income_taxes",
    "net_income",
    "account_receivable",
    "account_notes_receivable_net",
    "inventories",
    "short_term_loans_assets",
    "total_current_assets",
    "long_term_loans_assets",
    "property_plant_equipment_net",
    "total_non_current_assets",
    "cash_and_deposits_at_financial_institutions",
    "accounts_payable",
    "total_current_liabilities",
    "total_non_current_liabilities",
    "total_liabilities",
    "authorized_common_stocks",
    "issued_paid_up_common_stocks",
    "total_shareholders_equity",
    "total_liabilities_shareholders_equity",
    "net_sales",
    "cost_of_sales_services",
    "operating_expenses",
    "earnings_loss_per_share",
    "short_term_loan",
    "interest_expenses",
    "current_ratio",
    "quick_ratio",
    "accounts_receivable_turnover",
    "accounts_payable_turnover",
    "average_payment_period",
    "inventory_turnover",
    "collection_period",
    "day_sales_inventory",
    "gross_profit_margin_percent",
    "net_profit_margin_percent",
    "roa",
    "roe",
    "debt_ratio",
    "debt_equity_ratio",
    "interest_coverage",
    "net_sales_growth_percent",
    "total_revenue_growth_percent",
    "net_profit_growth_percent",
    "total_asset_growth_percent",
];

pub const COMPANY_DECIMAL_FIELDS: &[&str] = &[
    "registered_capital",
    "year_in_business",
    "fs_score",
    "company_credit_start",
    "company_credit_end",
    "credit_term_start",
    "credit_term_end",
];

pub const BOL_BALANCE_NUMERIC_FIELDS: &[&str] = &[
    "assets",
    "cash_and_deposits_at_financial_institutions",
    "accounts_receivable",
    "accounts_and_notes_receivable_net",
    "total_short_term_loans_consolidation",
    "inventories_net",
    "accrued_income",
    "prepaid_expenses",
    "other_current_assets",
    "others_total_current_assets",
    "total_current_assets",
    "total_long_term_loans_and_investments",
    "property_plant_and_equipment_net",
    "other_non_current_assets",
    "others_total_non_current_assets",
    "total_non_current_assets",
    "total_assets",
    "liabilities_and_shareholders_equity",
    "liabilities",
    "bank_overdrafts_and_short_term_loans_from_financial_institutions",
    "accounts_payable",
    "total_accounts_payable_and_notes_payable",
    "current_portion_of_long_term_loans",
    "total_short_term_loans",
    "accrued_expenses",
    "unearned_revenues",
    "other_current_liabilities",
    "others_total_current_liabilities",
    "total_current_liabilities",
    "total_long_term_loans",
    "other_non_current_liabilities",
    "others_total_non_current_liabilities",
    "total_non_current_liabilities",
    "total_liabilities",
    "shareholders_equity",
    "authorized_preferred_stocks",
    "authorized_common_stocks",
    "issued_and_paid_up_preferred_stocks",
    "issued_and_paid_up_common_stocks",
    "appraisal_surplus_on_property_plant_and_equipment",
    "accumulated_retained_earnings",
    "others",
    "total_shareholders_equity",
    "total_liabilities_and_shareholders_equity",
    "additional_information_for_shareholders_equity",
    "common_stocks",
    "par_value_baht_authorized",
    "par_value_baht_issued_and_paid_up",
];

pub const BOL_INCOME_NUMERIC_FIELDS: &[&str] = &[
    "net_sales",
    "total_other_income",
    "total_revenue",
    "cost_of_sales_services",
    "gross_profit_loss",
    "total_operating_expenses",
    "operating_income_loss",
    "other_expenses",
    "income_loss_before_depreciation_and_amoritization",
    "income_loss_before_interest_and_income_taxes",
    "interest_expenses",
    "income_taxes",
    "extraordinary_items",
    "others",
    "net_income_loss",
    "earnings_loss_per_share",
    "number_of_weighted_average_ordinary_shares",
];

pub const SUPPLIER_NUMERIC_FIELDS: &[&str] = &[
    "registered_capital",
    "trade_receivables_net",
    "inventory",
    "current_assets",
    "property_plant_equipment",
    "non_current_assets",
    "total_assets",
    "current_liabilities",
    "non_current_liabilities",
    "total_liabilities",
    "shareholders_equity",
    "liabilities_and_equity",
    "group_id",
    "main_revenue",
    "total_revenue_fs",
    "cost_of_goods_sold",
    "gross_profit",
    "selling_and_admin_expenses",
    "total_expenses",
    "interest_expense",
    "profit_before_tax",
    "income_tax",
    "net_profit",
    "roa_percent",
    "roe_percent",
    "gross_profit_margin_percent",
    "operating_margin_percent",
    "net_margin_percent",
    "asset_turnover_ratio",
    "receivables_turnover_ratio",
    "inventory_turnover_ratio",
    "operating_expense_ratio",
    "current_ratio",
    "debt_to_asset_ratio",
    "asset_to_equity_ratio",
    "debt_to_equity_ratio",
];

/// Column layout of one destination table.
#[derive(Debug, Clone, Copy)]
pub struct TableDef {
    pub name: &'static str,
    /// Natural key backed by a unique index; empty for append-only tables.
    pub key: &'static [&'static str],
    pub text: &'static [&'static str],
    pub integers: &'static [&'static str],
    pub dates: &'static [&'static str],
    pub decimals: &'static [&'static str],
    pub not_null: &'static [&'static str],
    pub timestamps: bool,
    pub soft_delete: bool,
}

const EMPTY: &[&str] = &[];

const fn table(name: &'static str) -> TableDef {
    TableDef {
        name,
        key: EMPTY,
        text: EMPTY,
        integers: EMPTY,
        dates: EMPTY,
        decimals: EMPTY,
        not_null: EMPTY,
        timestamps: true,
        soft_delete: false,
    }
}

pub const TABLES: &[TableDef] = &[
    TableDef {
        key: &["tax_id", "fiscal_year"],
        text: &["tax_id"],
        integers: &["fiscal_year"],
        decimals: BALANCE_FIELDS,
        not_null: &["tax_id", "fiscal_year"],
        ..table(BALANCE_SHEET)
    },
    TableDef {
        key: &["tax_id", "fiscal_year"],
        text: &["tax_id"],
        integers: &["fiscal_year"],
        decimals: INCOME_FIELDS,
        not_null: &["tax_id", "fiscal_year"],
        ..table(INCOME_STATEMENT)
    },
    TableDef {
        key: &["tax_id", "fiscal_year"],
        text: &["tax_id"],
        integers: &["fiscal_year"],
        decimals: RATIO_FIELDS,
        not_null: &["tax_id", "fiscal_year"],
        ..table(FINANCIAL_RATIOS)
    },
    TableDef {
        key: &["registered_no"],
        text: &[
            "registered_no",
            "company_name",
            "company_status",
            "address",
            "telephone_no",
            "business_size",
            "company_type",
            "registration_no_previous",
            "importer_exporter",
            "sub_district",
            "district",
            "province",
            "region",
            "official_signatory",
            "tsic_code1",
            "description_tsic_code1",
            "tsic_code2",
            "description_tsic_code2",
            "tsic_code3",
            "description_tsic_code3",
            "naics_code1",
            "description_naics_code1",
            "naics_code2",
            "description_naics_code2",
            "naics_code3",
            "description_naics_code3",
            "fs_class_code",
            "description_fs_class_code",
        ],
        dates: &["registration_date", "inactive_date"],
        decimals: COMPANY_DECIMAL_FIELDS,
        not_null: &["registered_no"],
        ..table(COMPANY_ENTITY)
    },
    TableDef {
        key: &["registered_no", "prefix_name", "first_name", "last_name"],
        text: &["registered_no", "prefix_name", "first_name", "last_name", "director_no"],
        not_null: &["registered_no", "prefix_name", "first_name", "last_name"],
        soft_delete: true,
        ..table(COMPANY_DIRECTOR)
    },
    TableDef {
        key: &["registered_no", "prefix_name", "first_name", "last_name"],
        text: &[
            "registered_no",
            "prefix_name",
            "first_name",
            "last_name",
            "director_no",
            "nationality",
        ],
        decimals: &["percent_share", "no_of_share", "baht_share"],
        not_null: &["registered_no", "prefix_name", "first_name", "last_name"],
        soft_delete: true,
        ..table(COMPANY_SHAREHOLDER)
    },
    TableDef {
        key: &["registered_no", "fiscal_year"],
        text: &["registered_no", "fs_type"],
        integers: &["fiscal_year"],
        dates: &["financial_date"],
        decimals: REGISTRY_FINANCIAL_FIELDS,
        not_null: &["registered_no", "fiscal_year"],
        ..table(COMPANY_FINANCIAL_YEAR)
    },
    TableDef {
        key: &["payload_id"],
        text: &["payload_id", "registration_no", "raw_json", "sha256", "received_at"],
        not_null: &["payload_id", "raw_json", "sha256", "received_at"],
        timestamps: false,
        ..table(REGISTRY_RAW_PAYLOAD)
    },
    TableDef {
        key: &["invoice_no", "supplier_code"],
        text: &["invoice_no", "supplier_code", "supplier_name", "po_no", "status"],
        dates: &["invoice_date", "invoice_received_date"],
        decimals: &["amount"],
        not_null: &["invoice_no"],
        ..table("invoice_detail_report")
    },
    TableDef {
        key: &["invoice_no", "supplier_code"],
        text: &["invoice_no", "po_no", "supplier_code", "buyer_code"],
        dates: &["invoice_date", "po_date"],
        decimals: &["amount_excl_vat", "vat_amount", "amount_incl_vat"],
        not_null: &["invoice_no"],
        ..table("gec_invoice_legacy")
    },
    TableDef {
        key: &["supplier_code", "doc_type", "doc_no"],
        text: &["supplier_code", "branch_code", "doc_type", "doc_no", "doc_ref_no"],
        dates: &["invoice_date", "report_date", "payment_date"],
        decimals: &["rm_amount"],
        not_null: &["doc_no"],
        ..table("rm_detail_report")
    },
    TableDef {
        key: &["remittance_no", "supplier_code"],
        text: &["remittance_no", "supplier_code", "supplier_name", "branch", "status"],
        dates: &["remittance_date", "pay_date", "sent_date"],
        decimals: &["amount"],
        not_null: &["remittance_no"],
        ..table("rm_report")
    },
    TableDef {
        key: &["supplier_code", "doc_no", "invoice_no"],
        text: &[
            "doc_no",
            "invoice_no",
            "po_no",
            "cn_ref_doc",
            "assignment",
            "supplier_name",
            "supplier_code",
        ],
        dates: &["invoice_date", "start_round_date", "end_round_date"],
        decimals: &["amount", "vat", "net_amount"],
        not_null: &["doc_no"],
        ..table("sale_invoice_report")
    },
    TableDef {
        text: &[
            "product_code",
            "barcode",
            "product_name",
            "invoice_no",
            "doc_no",
            "supplier_name",
            "supplier_code",
        ],
        dates: &["start_round_date", "end_round_date"],
        decimals: &["cost_per_unit", "qty_sold", "amount", "vat", "net_amount"],
        ..table("sale_supplier_report")
    },
    TableDef {
        text: &["po_no", "supplier_name", "buyer_name", "payment_term"],
        dates: &["po_date", "delivery_date"],
        decimals: &["amount_excl_vat", "vat_amount", "amount_incl_vat"],
        ..table("gec_purchase_order")
    },
    TableDef {
        text: &["invoice_no", "po_no", "supplier_name", "buyer_name"],
        dates: &["invoice_date"],
        decimals: &["amount_excl_vat", "vat_amount", "amount_incl_vat"],
        ..table("gec_invoice")
    },
    TableDef {
        key: &["company_id", "year"],
        text: &["company_id", "company_name"],
        integers: &[
            "year",
            "no_of_shares_authorized",
            "no_of_shares_issued_and_paid_up",
        ],
        decimals: BOL_BALANCE_NUMERIC_FIELDS,
        not_null: &["company_id", "year"],
        ..table("bol_balance_sheet_raw")
    },
    TableDef {
        key: &["company_id", "year"],
        text: &["company_id", "company_name"],
        integers: &["year"],
        decimals: BOL_INCOME_NUMERIC_FIELDS,
        not_null: &["company_id", "year"],
        ..table("bol_income_statement_raw")
    },
    TableDef {
        text: &["registration_id", "size", "supplier_name"],
        integers: &["gec_no", "supplier_id", "is_supplier", "no_of_buyer"],
        dates: &["start_effective_date", "registration_date"],
        decimals: SUPPLIER_NUMERIC_FIELDS,
        not_null: &["registration_id", "supplier_id", "is_supplier", "supplier_name"],
        ..table("dbd_supplier")
    },
];

pub fn find(name: &str) -> Option<&'static TableDef> {
    TABLES.iter().find(|def| def.name == name)
}

impl TableDef {
    pub fn ddl(&self) -> String {
        let mut columns = vec!["id INTEGER PRIMARY KEY AUTOINCREMENT".to_string()];
        let typed = self
            .text
            .iter()
            .map(|c| (c, "TEXT"))
            .chain(self.integers.iter().map(|c| (c, "INTEGER")))
            .chain(self.dates.iter().map(|c| (c, "TEXT")))
            .chain(self.decimals.iter().map(|c| (c, "DECIMAL(20,2)")));
        for (column, sql_type) in typed {
            let mut line = format!("{} {sql_type}", quote_ident(column));
            if self.not_null.contains(column) {
                line.push_str(" NOT NULL");
            }
            columns.push(line);
        }
        if self.timestamps {
            columns.push("created_at TEXT".to_string());
            columns.push("updated_at TEXT".to_string());
        }
        if self.soft_delete {
            columns.push("deleted_at TEXT".to_string());
        }
        if !self.key.is_empty() {
            columns.push(format!(
                "UNIQUE ({})",
                self.key.iter().map(|c| quote_ident(c)).join(", ")
            ));
        }
        let mut ddl = String::new();
        let _ = write!(
            ddl,
            "CREATE TABLE IF NOT EXISTS {} (\n    {}\n);",
            quote_ident(self.name),
            columns.join(",\n    ")
        );
        ddl
    }
}

/// Creates every known table that does not exist yet.
pub fn bootstrap(conn: &Connection) -> rusqlite::Result<()> {
    let script = TABLES.iter().map(TableDef::ddl).join("\n");
    conn.execute_batch(&format!("BEGIN;\n{script}\nCOMMIT;"))
}
