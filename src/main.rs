//! flowtag CLI entry point.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use flowtag::settings::{self, Settings};
use flowtag::{
    ExecMode, FlowLogGenerator, FlowLogProcessor, IanaProtocols, ProtocolPool, ReadOptions,
    ReferenceTables, TableFileReader, TableFileWriter, TableSource, Tags,
};

/// Count flow-log records per tag and per port/protocol combination.
#[derive(Parser, Debug)]
#[command(name = "flowtag", version, about)]
struct Args {
    /// Flow log to process (ignored with --generate)
    #[arg(default_value_os_t = settings::data_path(settings::FLOW_LOG_FILE))]
    flow_log: PathBuf,

    /// Tag lookup table with (port, protocol, tag) rows
    #[arg(default_value_os_t = settings::data_path(settings::LOOKUP_TABLE_FILE))]
    lookup_table: PathBuf,

    /// Report destination
    #[arg(default_value_os_t = settings::data_path(settings::OUTPUT_FILE))]
    output: PathBuf,

    /// IANA protocol-number registry; a built-in excerpt is used if missing
    #[arg(long, default_value_os_t = settings::data_path(settings::IANA_PROTOCOLS_FILE))]
    iana: PathBuf,

    /// Count this many MiB of randomly generated flow-log records instead of
    /// reading the flow log
    #[arg(long, value_name = "MIB")]
    generate: Option<u64>,

    /// JSON settings file (environment variables still apply on top)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Mirror every raw row to the debug file and report the row count
    #[arg(long)]
    debug: bool,

    /// Count on a single thread
    #[arg(long, conflicts_with = "threads")]
    sequential: bool,

    /// Worker threads for parallel counting
    #[arg(long)]
    threads: Option<usize>,

    /// Write run metrics as JSON to this file
    #[arg(long)]
    metrics: Option<PathBuf>,

    /// Verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let filter = match args.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .init();

    let settings = load_settings(&args)?;
    let options = ReadOptions::default().header_ratio(settings.header_ratio);

    let pool = ProtocolPool::with_interning(settings.intern);
    let iana = load_iana(&args.iana, &options, settings.mode)?;
    let tags_source = TableFileReader::with_options(&args.lookup_table, options.clone())?;
    let tags = Tags::load(&tags_source, &pool, settings.mode)?;
    let tables = Arc::new(ReferenceTables { iana, tags, pool });

    let input: Box<dyn TableSource> = match args.generate {
        Some(mebibytes) => Box::new(FlowLogGenerator::of_mebibytes(mebibytes)),
        None => Box::new(TableFileReader::with_options(&args.flow_log, options)?),
    };
    let output = TableFileWriter::create(&args.output)?;
    let mut processor =
        FlowLogProcessor::from_settings(input, tables, Box::new(output), &settings)?;

    let result = processor.run();
    processor.close();
    let counts = result?;

    if let Some(path) = &args.metrics {
        processor.metrics().save_to_file(path)?;
    }
    eprintln!(
        "Counted {} records: {} tags, {} port/protocol combinations -> {}",
        counts.total(),
        counts.tags.len(),
        counts.combinations.len(),
        args.output.display()
    );
    Ok(())
}

fn load_settings(args: &Args) -> Result<Settings> {
    let mut settings = match &args.config {
        Some(path) => Settings::from_json_file(path)?.apply_env(|key| std::env::var(key).ok())?,
        None => Settings::from_env()?,
    };
    if args.debug {
        settings.debug = true;
    }
    if let Some(threads) = args.threads {
        settings.mode = ExecMode::with_threads(threads);
    }
    if args.sequential {
        settings.mode = ExecMode::Sequential;
    }
    Ok(settings)
}

fn load_iana(path: &Path, options: &ReadOptions, mode: ExecMode) -> Result<IanaProtocols> {
    if !path.exists() {
        warn!(path = %path.display(), "IANA protocol file not found, using built-in table");
        return Ok(IanaProtocols::well_known());
    }
    let source = TableFileReader::with_options(path, options.clone())
        .with_context(|| format!("open IANA protocols {}", path.display()))?;
    IanaProtocols::load(&source, mode)
}
