use std::{fs, path::Path};

use chart_schema::DifficultyMetadata;
use encoding_rs::Encoding;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub mod batch;
pub mod density;
mod error;
pub mod metadata;
pub mod parser;
pub mod patterns;
pub mod time_map;

pub use error::{ChartError, ChartErrorKind};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzeOptions {
    /// A measure is stream when this many of its rows hold a steppable note.
    pub stream_note_threshold: usize,
    /// Steps spent crossed over before the footing is forcibly corrected.
    pub invalid_crossover_threshold: usize,
    /// `encoding_rs` label used when a file is not valid UTF-8 (e.g. `shift_jis`).
    pub fallback_encoding: Option<String>,
}

impl Default for AnalyzeOptions {
    fn default() -> Self {
        Self {
            stream_note_threshold: density::DEFAULT_STREAM_NOTE_THRESHOLD,
            invalid_crossover_threshold: patterns::DEFAULT_INVALID_CROSSOVER_THRESHOLD,
            fallback_encoding: None,
        }
    }
}

impl AnalyzeOptions {
    /// Loads options from JSON; absent fields keep their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ChartError> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|e| {
            ChartError::new("E2001", format!("failed to read options: {e}"))
                .with_file(path.display().to_string())
        })?;
        serde_json::from_slice(&bytes).map_err(|e| {
            ChartError::new("E2004", format!("invalid options json: {e}"))
                .with_file(path.display().to_string())
        })
    }
}

pub fn analyze_file(path: impl AsRef<Path>) -> Result<Vec<DifficultyMetadata>, ChartError> {
    analyze_file_with_options(path, &AnalyzeOptions::default())
}

pub fn analyze_file_with_options(
    path: impl AsRef<Path>,
    options: &AnalyzeOptions,
) -> Result<Vec<DifficultyMetadata>, ChartError> {
    let path = path.as_ref();
    debug!(file = %path.display(), "analyzing simfile");
    let bytes = fs::read(path).map_err(|e| {
        ChartError::new("E2001", format!("failed to read simfile: {e}"))
            .with_file(path.display().to_string())
    })?;
    decode_chart_bytes(&bytes, options)
        .and_then(|src| analyze_str_with_options(&src, options))
        .map_err(|e| e.with_file(path.display().to_string()))
}

pub fn analyze_str(src: &str) -> Result<Vec<DifficultyMetadata>, ChartError> {
    analyze_str_with_options(src, &AnalyzeOptions::default())
}

pub fn analyze_str_with_options(
    src: &str,
    options: &AnalyzeOptions,
) -> Result<Vec<DifficultyMetadata>, ChartError> {
    let parsed = parser::parse_simfile(src)?;
    metadata::build_song_records(&parsed, options)
}

pub fn decode_chart_bytes(bytes: &[u8], options: &AnalyzeOptions) -> Result<String, ChartError> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    let utf8_error = match std::str::from_utf8(bytes) {
        Ok(text) => return Ok(text.to_string()),
        Err(e) => e,
    };

    let Some(label) = &options.fallback_encoding else {
        return Err(ChartError::new(
            "E2002",
            format!("invalid UTF-8 after byte {}", utf8_error.valid_up_to()),
        ));
    };
    let encoding = Encoding::for_label(label.trim().as_bytes()).ok_or_else(|| {
        ChartError::new("E2003", format!("unknown fallback encoding: {label}"))
    })?;
    let (text, had_errors) = encoding.decode_without_bom_handling(bytes);
    if had_errors {
        return Err(ChartError::new(
            "E2002",
            format!("file is neither UTF-8 nor valid {}", encoding.name()),
        ));
    }
    debug!(encoding = encoding.name(), "decoded simfile with fallback encoding");
    Ok(text.into_owned())
}

#[cfg(test)]
mod tests;
