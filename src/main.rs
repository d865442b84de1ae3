mod config;
mod ingest;
mod invoice_db;
mod money;
mod nfse;
mod reports;

use clap::{Parser, Subcommand};
use invoice_db::{InvoiceRepository, InvoiceStore};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Ingest NFS-e service invoices and report on them.
#[derive(Parser)]
#[command(name = "nfse-ledger", version)]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true, default_value = ".config/nfse.toml")]
    config: PathBuf,

    /// Database path, overrides `db_path` from the config
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Parse and store NFS-e XML files (directories are read one level deep)
    Ingest {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Show stored invoices with totals
    List {
        /// First issue date, YYYY-MM-DD
        #[arg(long)]
        start: Option<String>,
        /// Last issue date, YYYY-MM-DD
        #[arg(long)]
        end: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Delete every stored invoice
    Clear {
        /// Confirm the irreversible delete
        #[arg(long)]
        yes: bool,
    },
    /// Write a report of all stored invoices
    Export {
        #[command(subcommand)]
        format: ExportFormat,
    },
}

#[derive(Subcommand)]
enum ExportFormat {
    Csv { out: PathBuf },
    Pdf { out: PathBuf },
}

fn open_store(db_path: &Path) -> Result<InvoiceStore, Box<dyn std::error::Error>> {
    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    Ok(InvoiceStore::new(db_path)?)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // init tracing
    tracing_subscriber::fmt()
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let cfg = config::Config::load_or_default(&cli.config)?;
    let db_path = cli.db.unwrap_or_else(|| PathBuf::from(&cfg.db_path));
    let db = open_store(&db_path)?;

    match cli.command {
        Command::Ingest { paths } => {
            let submissions = ingest::collect_submissions(&paths);
            let outcome = ingest::ingest_batch(&db, submissions);

            if outcome.succeeded > 0 {
                println!("{} arquivo(s) carregado(s) com sucesso!", outcome.succeeded);
            }
            if outcome.failed > 0 {
                println!("{} arquivo(s) falharam ao carregar:", outcome.failed);
                for failure in &outcome.failures {
                    println!("  {}: {}", failure.filename, failure.reason);
                }
            }
            for warning in &outcome.warnings {
                println!("  aviso: {warning}");
            }
        }
        Command::List { start, end, json } => {
            let result = reports::query_invoices(&db, start.as_deref(), end.as_deref())?;
            if let Some(ref warning) = result.warning {
                eprintln!("{warning}");
            }
            if json {
                let totals = reports::Totals::of(&result.records)?;
                let body = serde_json::json!({
                    "records": result.records,
                    "totals": totals,
                    "warning": result.warning,
                });
                println!("{}", serde_json::to_string_pretty(&body)?);
            } else {
                print!("{}", reports::render_table(&result.records, &cfg.currency)?);
            }
        }
        Command::Clear { yes } => {
            if !yes {
                return Err("refusing to delete all invoices without --yes".into());
            }
            let removed = db.delete_all()?;
            println!("{removed} nota(s) removida(s)");
        }
        Command::Export { format } => {
            let records = db.query_all()?;
            match format {
                ExportFormat::Csv { out } => {
                    reports::write_csv_file(&out, &records, &cfg.currency)?;
                }
                ExportFormat::Pdf { out } => {
                    reports::write_pdf_file(&out, &records, &cfg.currency)?;
                }
            }
        }
    }

    let total = db.count()?;
    info!(invoices_total = total, "Database statistics");

    Ok(())
}
