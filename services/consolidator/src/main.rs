//! Consolidator CLI - Turns a supplier cost spreadsheet into per-supplier totals
//!
//! Responsibilities:
//! - Load settings (.env, environment, flags) and the alias configuration
//! - Read the input file (xlsx/xls/ods, csv, json) into a table
//! - Ingest: resolve headers, normalize rows, canonicalize names, aggregate
//! - Optionally validate, filter, sort and page
//! - Emit the selected view as JSON

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use consolidator::config::Settings;
use consolidator::report::{
    best_supplier, hours_summary, paginate, profile_breakdown, sort_suppliers, SortKey,
    SupplierFilter, UploadSummary,
};
use consolidator::source::read_table;
use consolidator::{validate, Canonicalizer, IngestStats, Pipeline, SupplierAggregate};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
enum View {
    /// Supplier aggregates with line items
    #[default]
    Suppliers,
    /// Total hours per supplier
    Hours,
    /// Value and hours per supplier and profile
    Profiles,
    /// The supplier with the highest total
    Best,
}

#[derive(Parser, Debug)]
#[command(name = "consolidator", about = "Consolidates supplier cost spreadsheets per canonical supplier")]
struct Args {
    /// Spreadsheet to process (xlsx, xls, ods, csv or json)
    #[arg(long, short, required_unless_present = "explain")]
    input: Option<PathBuf>,

    /// Sheet to read from a workbook (default: the technical detail sheet)
    #[arg(long)]
    sheet: Option<String>,

    /// Alias configuration file (overrides CONSOLIDATOR_ALIASES)
    #[arg(long)]
    aliases: Option<PathBuf>,

    /// Fuzzy match threshold in [0, 1] (overrides CONSOLIDATOR_FUZZY_THRESHOLD)
    #[arg(long)]
    threshold: Option<f64>,

    /// Drop profile-less items and suppliers without positive value
    #[arg(long, default_value = "false")]
    validate: bool,

    /// Sort suppliers by this metric, largest first (default: input order)
    #[arg(long, value_enum)]
    sort: Option<SortKey>,

    /// Keep suppliers whose name contains this text
    #[arg(long)]
    supplier: Option<String>,

    #[arg(long)]
    min_value: Option<f64>,

    #[arg(long)]
    max_value: Option<f64>,

    #[arg(long)]
    min_hours: Option<f64>,

    #[arg(long)]
    max_hours: Option<f64>,

    /// Output view
    #[arg(long, value_enum, default_value_t = View::Suppliers)]
    view: View,

    /// Skip this many entries of the selected view
    #[arg(long, default_value_t = 0)]
    skip: usize,

    /// Emit at most this many entries of the selected view
    #[arg(long)]
    limit: Option<usize>,

    /// Write JSON here instead of stdout
    #[arg(long, short)]
    output: Option<PathBuf>,

    /// Show how a supplier name is canonicalized (repeatable)
    #[arg(long)]
    explain: Vec<String>,
}

impl Args {
    fn filter(&self) -> SupplierFilter {
        SupplierFilter {
            name: self.supplier.clone(),
            min_value: self.min_value,
            max_value: self.max_value,
            min_hours: self.min_hours,
            max_hours: self.max_hours,
        }
    }

    /// Filter, then sort when a key was given. Input order survives otherwise.
    fn arrange(&self, suppliers: Vec<SupplierAggregate>) -> Vec<SupplierAggregate> {
        let mut suppliers = self.filter().apply(suppliers);
        if let Some(key) = self.sort {
            sort_suppliers(&mut suppliers, key);
        }
        suppliers
    }

    fn page<T>(&self, items: Vec<T>) -> Vec<T> {
        paginate(items, self.skip, self.limit)
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();
}

fn write_json<T: Serialize>(value: &T, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create output file {}", path.display()))?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, value)?;
            writer.flush()?;
            info!(path = %path.display(), "output written");
        }
        None => {
            let stdout = io::stdout();
            let mut writer = stdout.lock();
            serde_json::to_writer_pretty(&mut writer, value)?;
            writeln!(writer)?;
        }
    }
    Ok(())
}

fn explain(canonicalizer: &Canonicalizer, names: &[String], output: Option<&Path>) -> Result<()> {
    let resolutions: Vec<_> = names
        .iter()
        .map(|name| canonicalizer.resolve(Some(name)))
        .collect();
    write_json(&resolutions, output)
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();
    let args = Args::parse();

    let settings = Settings::from_env()?.with_overrides(args.aliases.clone(), args.threshold);
    let config = settings.alias_config().context("Failed to load alias configuration")?;
    let pipeline = Pipeline::from_config(&config);
    info!(
        aliases = pipeline.canonicalizer().table().len(),
        threshold = pipeline.canonicalizer().threshold(),
        "alias table ready"
    );

    let Some(input) = &args.input else {
        return explain(pipeline.canonicalizer(), &args.explain, args.output.as_deref());
    };
    for name in &args.explain {
        let resolution = pipeline.canonicalizer().resolve(Some(name));
        info!(raw = %name, canonical = %resolution.canonical, rule = ?resolution.rule, "explain");
    }

    let table = read_table(input, args.sheet.as_deref(), pipeline.schema())?;
    let ingestion = pipeline
        .ingest(&table)
        .with_context(|| format!("Cannot consolidate {}", input.display()))?;

    if ingestion.stats.line_items == 0 {
        bail!("file contains no valid data");
    }

    let mut suppliers = ingestion.suppliers;
    if args.validate {
        suppliers = validate(suppliers);
    }
    let suppliers = args.arrange(suppliers);

    let filename = input
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| input.display().to_string());
    let upload = UploadSummary::new(filename, &suppliers);
    info!(
        upload_id = %upload.upload_id,
        suppliers = upload.suppliers,
        items = upload.rows,
        "consolidation complete"
    );

    let output = args.output.as_deref();
    let unidentified = pipeline.canonicalizer().unidentified();
    match args.view {
        View::Suppliers => emit(upload, ingestion.stats, args.page(suppliers), output),
        View::Hours => {
            let summary = hours_summary(&suppliers, unidentified);
            emit(upload, ingestion.stats, args.page(summary), output)
        }
        View::Profiles => emit(upload, ingestion.stats, args.page(profile_breakdown(&suppliers)), output),
        View::Best => {
            let Some(best) = best_supplier(&suppliers) else {
                bail!("no supplier with a non-zero total");
            };
            emit(upload, ingestion.stats, vec![best], output)
        }
    }
}

/// Top-level JSON document.
#[derive(Debug, Serialize)]
struct Report<T> {
    upload: UploadSummary,
    stats: IngestStats,
    count: usize,
    data: Vec<T>,
}

fn emit<T: Serialize>(upload: UploadSummary, stats: IngestStats, data: Vec<T>, output: Option<&Path>) -> Result<()> {
    let report = Report {
        upload,
        stats,
        count: data.len(),
        data,
    };
    write_json(&report, output)
}
