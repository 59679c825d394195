pub mod api;
pub mod cli;
pub mod config;
pub mod data;
pub mod financial;
pub mod header;
pub mod import;
pub mod intake;
pub mod io_utils;
pub mod mapping;
pub mod names;
pub mod normalize;
pub mod registry;
pub mod report;
pub mod rules;
pub mod schema;
pub mod sources;
pub mod store;
pub mod stream;
pub mod table;
pub mod tables;

use std::{env, path::Path, sync::OnceLock};

use anyhow::{Context, Result, bail};
use clap::Parser;
use encoding_rs::UTF_8;
use log::{LevelFilter, info, warn};
use rusqlite::Connection;
use serde_json::Value;

use crate::api::ApiResponse;
use crate::cli::{Cli, Commands};
use crate::config::Settings;
use crate::import::ImportOptions;

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("report_intake", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    let settings = Settings::load_or_default(cli.config.as_deref())?;
    let database = cli.database.clone().unwrap_or_else(|| settings.database.clone());
    let conn = store::open(&database, settings.busy_timeout())?;
    match cli.command {
        Commands::InitDb => handle_init_db(&conn, &database),
        Commands::Import(args) => handle_import(&conn, &settings, &args),
        Commands::ImportFinancial(args) => handle_import_financial(&conn, &args),
        Commands::Registry(args) => handle_registry(&conn, &args),
        Commands::Intake(args) => handle_intake(&conn, &args),
        Commands::Financials(args) => handle_financials(&conn, &args),
    }
}

fn handle_init_db(conn: &Connection, database: &Path) -> Result<()> {
    tables::bootstrap(conn).with_context(|| format!("Creating tables in {database:?}"))?;
    info!(
        "{} table(s) ready in {database:?}",
        tables::TABLES.len()
    );
    Ok(())
}

fn handle_import(conn: &Connection, settings: &Settings, args: &cli::ImportArgs) -> Result<()> {
    let encoding = io_utils::resolve_encoding(args.input_encoding.as_deref())?;
    let reader = io_utils::open_input(&args.input, encoding)?;
    let options = ImportOptions {
        table: args
            .table
            .clone()
            .or_else(|| settings.table_for(args.source).map(str::to_string)),
        pointer: args.pointer.clone(),
        match_keys: args
            .match_keys
            .iter()
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty())
            .collect(),
        dry_run: args.dry_run,
        validate: !args.no_validate,
        max_log_errors: args.max_log_errors.unwrap_or(settings.max_log_errors),
        reclaim_every: settings.reclaim_every,
        keep_failures: args.dump_fail.is_some(),
        ..ImportOptions::new(args.source)
    };
    info!(
        "Importing {} from '{}' ({})",
        args.source,
        args.input.display(),
        encoding.name()
    );
    let report = import::run(conn, &options, reader)
        .with_context(|| format!("Importing {:?} as {}", args.input, args.source))?;

    if let Some(path) = &args.dump_fail {
        io_utils::write_json(path, &report.failures)
            .with_context(|| format!("Writing failures to {path:?}"))?;
        info!("{} failure(s) written to {path:?}", report.failures.len());
    }
    if args.json {
        io_utils::write_json(Path::new("-"), &report.summary)?;
    } else {
        print!("{}", table::render_import_summary(&report.summary));
    }

    if let Some(message) = &report.summary.stream_error {
        bail!(
            "Input ended early after {} row(s): {message}",
            report.summary.total
        );
    }
    Ok(())
}

fn handle_import_financial(conn: &Connection, args: &cli::ImportFinancialArgs) -> Result<()> {
    let options = financial::FinancialOptions {
        dir: args.dir.clone(),
        tax_id: args.tax_id.clone(),
        dry_run: args.dry_run,
    };
    let summary = financial::import_dir(conn, &options)?;
    print!("{}", table::render_financial_summary(&summary));
    Ok(())
}

fn read_json(path: &Path) -> Result<Value> {
    let reader = io_utils::open_input(path, UTF_8)?;
    serde_json::from_reader(reader).with_context(|| format!("Parsing JSON from {path:?}"))
}

fn handle_registry(conn: &Connection, args: &cli::RegistryArgs) -> Result<()> {
    let document = read_json(&args.input)?;
    let outcome = registry::store_results(conn, args.registration_no.as_deref(), &document)
        .with_context(|| format!("Storing registry response {:?}", args.input))?;
    for failure in &outcome.failed {
        warn!("{}: {}", failure.registered_no, failure.error);
    }
    io_utils::write_json(Path::new("-"), &outcome)
}

fn handle_intake(conn: &Connection, args: &cli::IntakeArgs) -> Result<()> {
    let body = read_json(&args.input)?;
    let response = intake::handle(conn, args.endpoint, &body);
    finish_response(args.endpoint.name(), &response)
}

fn handle_financials(conn: &Connection, args: &cli::FinancialsArgs) -> Result<()> {
    let response = match (args.year, args.from, args.to) {
        (Some(year), _, _) => report::year_endpoint(conn, &args.tax_id, year),
        (None, Some(from), Some(to)) => report::range_endpoint(conn, &args.tax_id, from, to),
        _ => bail!("Pass either --year or both --from and --to"),
    };
    finish_response("financials", &response)
}

fn finish_response(name: &str, response: &ApiResponse) -> Result<()> {
    io_utils::write_json(Path::new("-"), &response.body)?;
    if !response.is_success() {
        bail!("{name} responded with status {}", response.status);
    }
    info!("{name} responded with status {}", response.status);
    Ok(())
}
