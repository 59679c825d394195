//! Command-line surface.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::intake::Endpoint;
use crate::sources::SourceKind;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Normalize vendor report JSON into a relational store",
    long_about = None
)]
pub struct Cli {
    /// SQLite database file (overrides the config file)
    #[arg(long, global = true)]
    pub database: Option<PathBuf>,
    /// YAML settings file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Create every destination table (safe to repeat)
    InitDb,
    /// Stream a report export into its destination table
    Import(ImportArgs),
    /// Upsert per-company balance/income/ratio statement files
    ImportFinancial(ImportFinancialArgs),
    /// Store a company registry response (entities, people, financial years)
    Registry(RegistryArgs),
    /// Submit a JSON array body to an intake endpoint and print the response
    Intake(IntakeArgs),
    /// Print the financial statements of a company
    Financials(FinancialsArgs),
}

#[derive(Debug, Args)]
pub struct ImportArgs {
    /// Report source the file was exported from
    #[arg(value_enum)]
    pub source: SourceKind,
    /// Input JSON file ('-' for stdin)
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Destination table (defaults to the source's table)
    #[arg(long)]
    pub table: Option<String>,
    /// JSON pointer to the row array, e.g. /records ('' for an array root, * for every member)
    #[arg(long)]
    pub pointer: Option<String>,
    /// Upsert on these columns; they must form a unique index
    #[arg(long = "match", value_delimiter = ',')]
    pub match_keys: Vec<String>,
    /// Run the whole pipeline without writing
    #[arg(long)]
    pub dry_run: bool,
    /// Skip the source's validation rules
    #[arg(long)]
    pub no_validate: bool,
    /// Number of failure samples kept in the summary
    #[arg(long)]
    pub max_log_errors: Option<usize>,
    /// Write every failed row, with its reason, to this JSON file
    #[arg(long = "dump-fail")]
    pub dump_fail: Option<PathBuf>,
    /// Character encoding of the input file (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
    /// Print the summary as JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct ImportFinancialArgs {
    /// Directory holding <tax_id>_<balance|income|ratios>.json files
    #[arg(long)]
    pub dir: PathBuf,
    /// Only import files for this company
    #[arg(long = "tax-id")]
    pub tax_id: Option<String>,
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Debug, Args)]
pub struct RegistryArgs {
    /// Registry response JSON ('-' for stdin)
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Registration number the response was requested for
    #[arg(long = "registration-no")]
    pub registration_no: Option<String>,
}

#[derive(Debug, Args)]
pub struct IntakeArgs {
    #[arg(value_enum)]
    pub endpoint: Endpoint,
    /// Request body JSON ('-' for stdin)
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
}

#[derive(Debug, Args)]
pub struct FinancialsArgs {
    /// 10 to 15 digit tax identifier
    pub tax_id: String,
    /// Single fiscal year
    #[arg(long, conflicts_with_all = ["from", "to"])]
    pub year: Option<i64>,
    /// First fiscal year of a range
    #[arg(long, requires = "to")]
    pub from: Option<i64>,
    /// Last fiscal year of a range
    #[arg(long, requires = "from")]
    pub to: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn match_keys_split_on_commas() {
        let cli = Cli::try_parse_from([
            "report-intake",
            "import",
            "legacy-invoice",
            "-i",
            "rows.json",
            "--match",
            "invoice_no,supplier_code",
        ])
        .unwrap();
        let Commands::Import(args) = cli.command else {
            panic!("expected import");
        };
        assert_eq!(args.source, SourceKind::LegacyInvoice);
        assert_eq!(args.match_keys, vec!["invoice_no", "supplier_code"]);
    }

    #[test]
    fn year_conflicts_with_range() {
        let parsed = Cli::try_parse_from([
            "report-intake",
            "financials",
            "0105537086874",
            "--year",
            "2023",
            "--from",
            "2020",
            "--to",
            "2022",
        ]);
        assert!(parsed.is_err());
    }
}
