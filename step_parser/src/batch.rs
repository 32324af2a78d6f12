use std::{
    fs,
    path::{Path, PathBuf},
};

use chart_schema::DifficultyMetadata;
use tracing::{debug, error, info, warn};

use crate::{analyze_file_with_options, AnalyzeOptions, ChartError, ChartErrorKind};

pub const CHART_EXTENSION: &str = "sm";

/// Progress mark for a file that produced records.
pub const SUCCESS_MARK: char = '.';

/// `.` for a file that produced records, otherwise the mark of its error kind.
pub fn progress_mark(failure: Option<&ChartError>) -> char {
    failure.map_or(SUCCESS_MARK, |e| e.kind.progress_mark())
}

#[derive(Debug, Clone, Default)]
pub struct BatchOptions {
    pub analyze: AnalyzeOptions,
    /// Abort on the first `Unexpected` failure instead of tallying it.
    pub strict: bool,
}

#[derive(Debug, Clone)]
pub struct BatchFailure {
    pub path: PathBuf,
    pub error: ChartError,
}

#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub records: Vec<DifficultyMetadata>,
    pub failures: Vec<BatchFailure>,
    pub files_seen: usize,
}

impl BatchReport {
    pub fn failure_count(&self, kind: ChartErrorKind) -> usize {
        self.failures.iter().filter(|f| f.error.kind == kind).count()
    }

    pub fn succeeded(&self) -> usize {
        self.files_seen - self.failures.len()
    }
}

/// Every `.sm` file under `root`, extension matched case-insensitively, in path order.
pub fn discover_chart_files(root: impl AsRef<Path>) -> Result<Vec<PathBuf>, ChartError> {
    let mut found = Vec::new();
    collect_chart_files(root.as_ref(), &mut found)?;
    found.sort();
    debug!(root = %root.as_ref().display(), count = found.len(), "discovered simfiles");
    Ok(found)
}

fn collect_chart_files(dir: &Path, found: &mut Vec<PathBuf>) -> Result<(), ChartError> {
    let read_error = |e: std::io::Error| {
        ChartError::new("E2001", format!("failed to read directory: {e}"))
            .with_file(dir.display().to_string())
    };
    for entry in fs::read_dir(dir).map_err(read_error)? {
        let path = entry.map_err(read_error)?.path();
        if path.is_dir() {
            collect_chart_files(&path, found)?;
        } else if is_chart_file(&path) {
            found.push(path);
        }
    }
    Ok(())
}

fn is_chart_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(CHART_EXTENSION))
}

/// Analyzes each file in turn, calling `on_file` once per file with its failure, if any.
///
/// `on_file` sees each failure before the run moves on, the fatal one included.
/// Failures are kept in the report and the run continues, except that in strict
/// mode an `Unexpected` failure is returned immediately.
pub fn run_batch<P: AsRef<Path>>(
    paths: &[P],
    options: &BatchOptions,
    mut on_file: impl FnMut(&Path, Option<&ChartError>),
) -> Result<BatchReport, ChartError> {
    let mut report = BatchReport::default();

    for path in paths {
        let path = path.as_ref();
        report.files_seen += 1;
        match analyze_file_with_options(path, &options.analyze) {
            Ok(records) => {
                debug!(file = %path.display(), difficulties = records.len(), "analyzed simfile");
                report.records.extend(records);
                on_file(path, None);
            }
            Err(err) => {
                on_file(path, Some(&err));
                if err.is_unexpected() {
                    error!(file = %path.display(), code = err.code, "{}", err.message);
                    if options.strict {
                        return Err(err);
                    }
                } else {
                    warn!(file = %path.display(), code = err.code, "{}", err.message);
                }
                report.failures.push(BatchFailure {
                    path: path.to_path_buf(),
                    error: err,
                });
            }
        }
    }

    info!(
        files = report.files_seen,
        records = report.records.len(),
        failures = report.failures.len(),
        "batch finished"
    );
    Ok(report)
}
