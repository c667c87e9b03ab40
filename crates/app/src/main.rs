use std::path::PathBuf;
use std::sync::Arc;

use albaran_core::AlbaranConfig;
use albaran_ocr::{AlbaranPipeline, OcrBackend, TesseractCli};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod export;

use export::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "albaran", version, about = "Extract product lines from fish-market delivery notes")]
struct Cli {
    /// TOML configuration file
    #[arg(short = 'c', long = "config", global = true)]
    config: Option<PathBuf>,

    /// OCR language hint (overrides the config file)
    #[arg(short = 'l', long = "lang", global = true)]
    lang: Option<String>,

    /// Resolution the pages were rasterized at (overrides the config file)
    #[arg(long = "dpi", global = true)]
    dpi: Option<u32>,

    /// Path to the tesseract executable
    #[arg(long = "tesseract", global = true, default_value = "tesseract")]
    tesseract: PathBuf,

    /// Use the linked libtesseract instead of the executable
    #[cfg(feature = "tesseract")]
    #[arg(long = "in-process", global = true)]
    in_process: bool,

    /// Debug-level logging (RUST_LOG takes precedence)
    #[arg(short = 'v', long = "verbose", global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract one document from its page images
    Extract {
        /// Page images, in page order
        #[arg(required = true)]
        pages: Vec<PathBuf>,
        #[arg(short = 'f', long = "format", value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,
        /// Write here instead of stdout
        #[arg(short = 'o', long = "output")]
        output: Option<PathBuf>,
    },
    /// Process every document in a folder, skipping the ones that fail
    Batch {
        dir: PathBuf,
        #[arg(long = "out")]
        out: PathBuf,
        #[arg(short = 'f', long = "format", value_enum, value_delimiter = ',', default_values_t = [OutputFormat::Json, OutputFormat::Csv, OutputFormat::Txt])]
        formats: Vec<OutputFormat>,
    },
    /// Process page images as they are dropped into a folder
    Watch {
        dir: PathBuf,
        #[arg(long = "out")]
        out: PathBuf,
        #[arg(short = 'f', long = "format", value_enum, value_delimiter = ',', default_values_t = [OutputFormat::Json, OutputFormat::Csv, OutputFormat::Txt])]
        formats: Vec<OutputFormat>,
    },
    /// Extract from saved OCR results (.json token table, .tsv, or plain text), one file per page
    FromOcr {
        #[arg(required = true)]
        files: Vec<PathBuf>,
        #[arg(short = 'f', long = "format", value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,
        #[arg(short = 'o', long = "output")]
        output: Option<PathBuf>,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(cli: &Cli) -> Result<AlbaranConfig> {
    let mut config = match &cli.config {
        Some(path) => AlbaranConfig::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => AlbaranConfig::default(),
    };
    if let Some(lang) = &cli.lang {
        config.lang = lang.clone();
    }
    if let Some(dpi) = cli.dpi {
        config.dpi = dpi;
    }
    config.validate()?;
    Ok(config)
}

fn backend(cli: &Cli, config: &AlbaranConfig) -> Box<dyn OcrBackend> {
    #[cfg(feature = "tesseract")]
    if cli.in_process {
        return Box::new(albaran_ocr::TesseractRecognizer::new(None).with_dpi(config.dpi));
    }
    Box::new(TesseractCli::new().with_program(&cli.tesseract).with_dpi(config.dpi))
}

async fn emit(bytes: Vec<u8>, output: Option<PathBuf>) -> Result<()> {
    match output {
        Some(path) => tokio::fs::write(&path, bytes)
            .await
            .with_context(|| format!("writing {}", path.display())),
        None => {
            use std::io::Write;
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&bytes)?;
            stdout.write_all(b"\n")?;
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = load_config(&cli)?;
    let pipeline = Arc::new(AlbaranPipeline::new(backend(&cli, &config), config));

    match cli.command {
        Command::Extract { pages, format, output } => {
            let doc = commands::extract_document(pipeline, pages).await?;
            emit(export::render(&doc, format)?, output).await?;
        }
        Command::Batch { dir, out, formats } => {
            let summary = commands::run_batch(pipeline, &dir, &out, &formats).await?;
            tracing::info!(
                processed = summary.processed,
                failed = summary.failed,
                products = summary.products,
                "Batch finished"
            );
        }
        Command::Watch { dir, out, formats } => {
            commands::run_watch(pipeline, &dir, &out, &formats).await?;
        }
        Command::FromOcr { files, format, output } => {
            let doc = commands::extract_saved(pipeline.as_ref(), &files)?;
            emit(export::render(&doc, format)?, output).await?;
        }
    }
    Ok(())
}
