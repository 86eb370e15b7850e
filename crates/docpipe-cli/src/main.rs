//! docpipe CLI - Convert batches of office documents to PDF or DOCX.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use docpipe_core::{
    AppConfig, ConversionRequest, Error, Metadata, Pipeline, PipelineError, WorkDir,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "docpipe")]
#[command(author, version, about = "Convert office documents to PDF or DOCX", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Output directory (default: current directory)
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    /// Config file path
    #[arg(short, long, global = true, env = "DOCPIPE_CONFIG")]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert documents to PDF
    Pdf(PdfArgs),

    /// Convert documents to DOCX
    Docx {
        /// Input documents
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },
}

#[derive(Args, Debug)]
struct PdfArgs {
    /// Input documents
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Landscape orientation (ignored by the LibreOffice converter, which
    /// keeps each document's own page setup)
    #[arg(long)]
    landscape: bool,

    /// Pages to export (e.g., "1-5" or "1,3,5")
    #[arg(long, default_value = "")]
    page_ranges: String,

    /// Export form fields as widgets
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    export_form_fields: bool,

    /// Put each spreadsheet sheet on a single page
    #[arg(long)]
    single_page_sheets: bool,

    /// PDF/A variant (e.g., "PDF/A-2b")
    #[arg(long)]
    pdfa: Option<String>,

    /// Produce PDF/UA
    #[arg(long)]
    pdfua: bool,

    /// Let the converter produce PDF/A and PDF/UA directly
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    native_pdf_formats: bool,

    /// Merge all PDFs into one
    #[arg(long)]
    merge: bool,

    /// Metadata to write, as a JSON object
    #[arg(long, default_value = "")]
    metadata: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file if present (before parsing args so env vars are available)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Setup logging
    let log_level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => report(&err),
    }
}

/// Print the failure and pick the exit code: 2 for bad input, 1 otherwise.
#[allow(clippy::print_stderr)]
fn report(err: &anyhow::Error) -> ExitCode {
    if let Some(failure) = err.downcast_ref::<PipelineError>() {
        eprintln!("Error: {}", failure.public_message());
        tracing::debug!("{failure:#}");
        return ExitCode::from(if failure.is_client_error() { 2 } else { 1 });
    }

    eprintln!("Error: {err:#}");
    if matches!(err.downcast_ref::<Error>(), Some(Error::InvalidRequest(_))) {
        ExitCode::from(2)
    } else {
        ExitCode::from(1)
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = if let Some(config_path) = &cli.config {
        AppConfig::from_file(config_path).context("Failed to load config file")?
    } else {
        AppConfig::load()
    };

    let pipeline = Pipeline::from_config(&config);

    // The work directory is removed when it goes out of scope
    let work = match &config.work_root {
        Some(root) => WorkDir::new_in(root),
        None => WorkDir::new(),
    }
    .context("Failed to create working directory")?;

    let output_dir = cli.output.unwrap_or_else(|| PathBuf::from("."));
    std::fs::create_dir_all(&output_dir)
        .context(format!("Failed to create {}", output_dir.display()))?;

    let outputs = match cli.command {
        Command::Pdf(args) => {
            let inputs = import_all(&work, &args.inputs)?;
            let metadata = Metadata::from_json(&args.metadata)?;

            let mut builder = ConversionRequest::builder(inputs)
                .allowed_extensions(pipeline.converter().extensions())
                .landscape(args.landscape)
                .page_ranges(args.page_ranges)
                .export_form_fields(args.export_form_fields)
                .single_page_sheets(args.single_page_sheets)
                .pdfua(args.pdfua)
                .native_pdf_formats(args.native_pdf_formats)
                .merge(args.merge)
                .metadata(metadata);
            if let Some(pdfa) = args.pdfa {
                builder = builder.pdfa(pdfa);
            }
            let request = builder.build()?;

            let spinner = spinner(format!("Converting {} file(s) to PDF", request.inputs().len()));
            let result = pipeline.run_pdf(&request, &work).await;
            spinner.finish_and_clear();
            result?
        }
        Command::Docx { inputs } => {
            let inputs = import_all(&work, &inputs)?;
            let request = ConversionRequest::builder(inputs)
                .allowed_extensions(pipeline.converter().extensions())
                .build()?;

            let spinner = spinner(format!("Converting {} file(s) to DOCX", request.inputs().len()));
            let result = pipeline.run_docx(&request, &work).await;
            spinner.finish_and_clear();
            result?
        }
    };

    for output in &outputs {
        let saved = save(output, &output_dir)?;
        info!("Saved {}", saved.display());

        // CLI output is intentional
        #[allow(clippy::print_stdout)]
        {
            println!("{}", saved.display());
        }
    }

    Ok(())
}

fn import_all(work: &WorkDir, inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    inputs
        .iter()
        .map(|input| {
            work.import(input)
                .context(format!("Failed to read input: {}", input.display()))
        })
        .collect()
}

fn save(output: &Path, output_dir: &Path) -> Result<PathBuf> {
    let name = output
        .file_name()
        .context(format!("Output has no file name: {}", output.display()))?;
    let target = output_dir.join(name);
    std::fs::copy(output, &target)
        .context(format!("Failed to write output: {}", target.display()))?;
    Ok(target)
}

fn spinner(message: String) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    // Template is hardcoded and valid, unwrap is safe
    #[allow(clippy::unwrap_used)]
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap(),
    );
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}
