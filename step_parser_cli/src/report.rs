use std::{
    fs::{File, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
};

use anyhow::Context;
use chart_schema::MetadataTable;
use step_parser::ChartError;

const MARKS_PER_LINE: usize = 50;
const FILES_PER_SUMMARY: usize = 500;

pub fn write_table_csv(table: &MetadataTable, path: &Path) -> anyhow::Result<()> {
    let file =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    write_table_rows(table, &mut csv::Writer::from_writer(file))
        .with_context(|| format!("failed to write {}", path.display()))
}

fn write_table_rows<W: Write>(
    table: &MetadataTable,
    writer: &mut csv::Writer<W>,
) -> anyhow::Result<()> {
    writer.write_record(&table.columns)?;
    for row in &table.rows {
        writer.write_record(row)?;
    }
    writer.flush()?;
    Ok(())
}

/// Append-only failure log shared across runs; the file is opened on the first failure.
pub struct ErrorLog {
    path: PathBuf,
    file: Option<File>,
}

impl ErrorLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: None,
        }
    }

    pub fn append(&mut self, error: &ChartError) -> anyhow::Result<()> {
        let file = match self.file.take() {
            Some(file) => file,
            None => OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .with_context(|| format!("failed to open error log {}", self.path.display()))?,
        };
        let file = self.file.insert(file);
        writeln!(file, "{}", error.log_line())
            .and_then(|()| file.flush())
            .with_context(|| format!("failed to write error log {}", self.path.display()))
    }
}

/// Prints one mark per file, wrapping every 50 files and summarising every 500.
pub struct ProgressPrinter<W: Write> {
    out: W,
    done: usize,
}

impl<W: Write> ProgressPrinter<W> {
    pub fn new(out: W) -> Self {
        Self { out, done: 0 }
    }

    pub fn mark(&mut self, mark: char) -> io::Result<()> {
        self.done += 1;
        write!(self.out, "{mark}")?;
        if self.done % MARKS_PER_LINE == 0 {
            writeln!(self.out)?;
        }
        if self.done % FILES_PER_SUMMARY == 0 {
            writeln!(self.out, "{} files processed", self.done)?;
        }
        self.out.flush()
    }

    pub fn finish(&mut self) -> io::Result<()> {
        if self.done % MARKS_PER_LINE != 0 {
            writeln!(self.out)?;
        }
        self.out.flush()
    }
}
