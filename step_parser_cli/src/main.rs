use std::{
    fs, io,
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};

use anyhow::Context;
use chart_schema::MetadataTable;
use clap::{Args, Parser, Subcommand};
use step_parser::{
    batch::{self, BatchOptions},
    AnalyzeOptions,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod report;

use report::{ErrorLog, ProgressPrinter};

const DEFAULT_ERROR_LOG: &str = "step_parser_error.log";

#[derive(Debug, Parser)]
#[command(name = "step_parser")]
#[command(about = "StepMania chart metadata extractor", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Analyze one simfile and print its records as JSON
    Analyze {
        input: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[command(flatten)]
        options: OptionArgs,
    },
    /// Analyze every .sm file under a directory into one CSV table
    Batch {
        root: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long, default_value = DEFAULT_ERROR_LOG)]
        error_log: PathBuf,
        /// Stop on the first failure that is not a known chart problem
        #[arg(long)]
        raise_on_unknown_failure: bool,
        #[command(flatten)]
        options: OptionArgs,
    },
}

#[derive(Debug, Args)]
struct OptionArgs {
    /// JSON file with analysis options; flags below override it
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    stream_note_threshold: Option<usize>,
    #[arg(long)]
    invalid_crossover_threshold: Option<usize>,
    /// Encoding tried when a file is not UTF-8, e.g. shift_jis
    #[arg(long)]
    fallback_encoding: Option<String>,
}

impl OptionArgs {
    fn resolve(self) -> anyhow::Result<AnalyzeOptions> {
        let mut options = match &self.config {
            Some(path) => AnalyzeOptions::from_json_file(path)
                .with_context(|| format!("failed to load config: {}", path.display()))?,
            None => AnalyzeOptions::default(),
        };
        if let Some(n) = self.stream_note_threshold {
            options.stream_note_threshold = n;
        }
        if let Some(n) = self.invalid_crossover_threshold {
            options.invalid_crossover_threshold = n;
        }
        if self.fallback_encoding.is_some() {
            options.fallback_encoding = self.fallback_encoding;
        }
        Ok(options)
    }
}

fn main() -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("step_parser=info,step_parser_cli=info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Analyze {
            input,
            output,
            options,
        } => analyze(&input, output.as_deref(), &options.resolve()?),
        Command::Batch {
            root,
            output,
            error_log,
            raise_on_unknown_failure,
            options,
        } => {
            let options = BatchOptions {
                analyze: options.resolve()?,
                strict: raise_on_unknown_failure,
            };
            let output = output.unwrap_or_else(default_output_path);
            run_batch(&root, &output, &error_log, &options)
        }
    }
}

fn analyze(input: &Path, output: Option<&Path>, options: &AnalyzeOptions) -> anyhow::Result<()> {
    let records = step_parser::analyze_file_with_options(input, options)
        .with_context(|| format!("analyze failed: {}", input.display()))?;

    let json = serde_json::to_string_pretty(&records).context("failed to serialize records")?;
    match output {
        Some(path) => fs::write(path, json)
            .with_context(|| format!("failed to write: {}", path.display()))?,
        None => println!("{json}"),
    }
    Ok(())
}

fn run_batch(
    root: &Path,
    output: &Path,
    error_log: &Path,
    options: &BatchOptions,
) -> anyhow::Result<()> {
    let paths = batch::discover_chart_files(root)
        .with_context(|| format!("failed to scan: {}", root.display()))?;
    info!(root = %root.display(), files = paths.len(), "starting batch");

    let mut progress = ProgressPrinter::new(io::stdout().lock());
    let mut error_log = ErrorLog::new(error_log);
    let mut write_error = None;
    let result = batch::run_batch(&paths, options, |_, failure| {
        let written = progress
            .mark(batch::progress_mark(failure))
            .context("failed to write progress")
            .and_then(|()| failure.map_or(Ok(()), |err| error_log.append(err)));
        if let Err(e) = written {
            write_error.get_or_insert(e);
        }
    });
    progress.finish().context("failed to write progress")?;
    if let Some(e) = write_error {
        return Err(e);
    }
    let report = result.context("batch aborted on unexpected failure")?;

    let table = MetadataTable::from_records(&report.records);
    report::write_table_csv(&table, output)?;

    info!(
        files = report.files_seen,
        succeeded = report.succeeded(),
        failed = report.failures.len(),
        output = %output.display(),
        "wrote metadata table"
    );
    Ok(())
}

fn default_output_path() -> PathBuf {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    PathBuf::from(format!("step_parser_output_{secs}.csv"))
}
