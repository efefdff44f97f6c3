use std::path::PathBuf;
use std::process::ExitCode;
use std::str::FromStr;

use anyhow::{Context, Result, anyhow};
use clap::{Args, Parser, Subcommand};
use netto_sheet::{
    ColumnWidth, ProcessOptions, ProcessReport, dump_docx_entries_to_csv, process_docx_file,
};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "docx-netto",
    version,
    about = "Average netto min/max characteristics in .docx specification tables"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Append the processed-value column and write a new document.
    Process(ProcessArgs),
    /// Write the extracted characteristics as CSV.
    Dump(DumpArgs),
}

#[derive(Debug, Args)]
struct ProcessArgs {
    /// Input .docx path.
    #[arg(short, long)]
    input: PathBuf,

    /// Output .docx path.
    #[arg(short, long)]
    output: PathBuf,

    /// Width of the new column: 1.5in, 3.8cm or twips.
    #[arg(long, default_value = "1.5in")]
    column_width: String,

    /// Enable verbose warning output.
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Args)]
struct DumpArgs {
    /// Input .docx path.
    #[arg(short, long)]
    input: PathBuf,

    /// Output CSV path.
    #[arg(short, long)]
    output: PathBuf,

    /// Keep values exactly as they appear in the document.
    #[arg(long)]
    raw: bool,

    /// Output delimiter character.
    #[arg(long, default_value = ",")]
    delimiter: char,

    /// Enable verbose warning output.
    #[arg(short, long)]
    verbose: bool,
}

fn log_report(report: &ProcessReport, verbose: bool) {
    if report.warnings.is_empty() {
        return;
    }

    eprintln!("warning: {} issue(s) detected", report.warnings.len());
    if verbose {
        for warning in &report.warnings {
            eprintln!(
                "  - {:?} table={:?}: {}",
                warning.code, warning.table_index, warning.message
            );
        }
    }
}

fn run_process(args: &ProcessArgs) -> Result<ProcessReport> {
    let column_width = ColumnWidth::from_str(&args.column_width)
        .map_err(|error| anyhow!("invalid column width: {error}"))
        .context("failed to parse --column-width")?;
    let options = ProcessOptions {
        column_width,
        ..ProcessOptions::default()
    };

    process_docx_file(&args.input, &args.output, &options)
        .with_context(|| format!("failed to process '{}'", args.input.display()))
}

fn run_dump(args: &DumpArgs) -> Result<ProcessReport> {
    if !args.delimiter.is_ascii() {
        anyhow::bail!("delimiter must be a single ASCII character");
    }

    dump_docx_entries_to_csv(
        &args.input,
        &args.output,
        args.raw,
        args.delimiter as u8,
        &ProcessOptions::default(),
    )
    .with_context(|| format!("failed to extract characteristics from '{}'", args.input.display()))
}

fn exit_code(result: Result<ProcessReport>, verbose: bool) -> ExitCode {
    match result {
        Ok(report) => {
            log_report(&report, verbose);
            if report.entry_count > 0 {
                ExitCode::SUCCESS
            } else {
                eprintln!("no characteristic table found; nothing was written");
                ExitCode::from(2)
            }
        }
        Err(error) => {
            eprintln!("error: {error:#}");
            ExitCode::from(1)
        }
    }
}

fn main() -> ExitCode {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("netto_sheet=warn"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Process(args) => exit_code(run_process(&args), args.verbose),
        Commands::Dump(args) => exit_code(run_dump(&args), args.verbose),
    }
}
