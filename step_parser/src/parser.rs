use std::collections::HashMap;

use tracing::debug;

use crate::ChartError;

pub const SINGLE_MODE: &str = "dance-single";
pub const LANES: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteSymbol {
    Empty,
    Tap,
    HoldHead,
    Tail,
    RollHead,
    Mine,
    /// Lifts, fakes, keysounds and anything else that is neither stepped on nor counted.
    Other,
}

impl NoteSymbol {
    pub fn from_char(ch: char) -> Self {
        match ch {
            '0' => Self::Empty,
            '1' => Self::Tap,
            '2' => Self::HoldHead,
            '3' => Self::Tail,
            '4' => Self::RollHead,
            'M' | 'm' => Self::Mine,
            _ => Self::Other,
        }
    }

    pub const fn is_steppable(self) -> bool {
        matches!(self, Self::Tap | Self::HoldHead | Self::RollHead)
    }
}

pub type Row = [NoteSymbol; LANES];

pub fn steppable_lanes(row: &Row) -> usize {
    row.iter().filter(|s| s.is_steppable()).count()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Measure {
    pub rows: Vec<Row>,
}

impl Measure {
    pub fn steppable_rows(&self) -> usize {
        self.rows.iter().filter(|r| steppable_lanes(r) > 0).count()
    }

    pub fn steppable_notes(&self) -> usize {
        self.rows.iter().map(steppable_lanes).sum()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DifficultyChart {
    pub mode: String,
    pub description: String,
    pub difficulty: String,
    pub rating: u32,
    pub measures: Vec<Measure>,
}

/// Header values keyed by uppercase name without the leading `#` (`TITLE`, `BPMS`, ...).
pub type Metadata = HashMap<String, String>;

#[derive(Debug, Clone)]
pub struct ParsedSimfile {
    pub metadata: Metadata,
    pub charts: Vec<DifficultyChart>,
}

impl ParsedSimfile {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.metadata.get(name).map(String::as_str)
    }
}

pub fn parse_simfile(src: &str) -> Result<ParsedSimfile, ChartError> {
    let cleaned = strip_comments(src);
    let cleaned = strip_trailing_garbage(&cleaned);

    let mut metadata = Metadata::new();
    let mut charts = Vec::new();
    let mut dropped = 0usize;

    for section in cleaned.split(';') {
        let (head, body) = section.split_once(':').unwrap_or((section, ""));
        // junk written between a `;` and the next `#` is ignored
        let Some(hash) = head.rfind('#') else {
            continue;
        };
        let header = head[hash..].trim();
        if header.len() <= 1 {
            continue;
        }

        if header.eq_ignore_ascii_case("#NOTES") {
            match parse_notes_section(body)? {
                Some(chart) => charts.push(chart),
                None => dropped += 1,
            }
        } else {
            metadata.insert(header[1..].to_uppercase(), body.trim().to_string());
        }
    }

    debug!(
        headers = metadata.len(),
        charts = charts.len(),
        dropped,
        "parsed simfile sections"
    );

    if charts.is_empty() {
        return Err(ChartError::new(
            "E4001",
            format!("no {SINGLE_MODE} stepcharts ({dropped} other charts dropped)"),
        ));
    }

    Ok(ParsedSimfile { metadata, charts })
}

fn parse_notes_section(body: &str) -> Result<Option<DifficultyChart>, ChartError> {
    let fields: Vec<&str> = body.split(':').map(str::trim).collect();
    // some files carry extra fields after the note data, they are ignored
    let [mode, description, difficulty, rating, _radar, note_data, ..] = fields[..] else {
        return Err(ChartError::new(
            "E1001",
            format!("#NOTES section needs 6 fields, found {}", fields.len()),
        )
        .with_context(fields.first().copied().unwrap_or_default()));
    };

    if mode != SINGLE_MODE || note_data.is_empty() {
        debug!(mode, difficulty, "skipping chart");
        return Ok(None);
    }

    let rating: u32 = rating.parse().map_err(|_| {
        ChartError::new("E1002", format!("invalid rating {rating:?}")).with_difficulty(difficulty)
    })?;

    let measures = parse_measures(note_data)
        .map_err(|e| e.with_difficulty(difficulty))?;
    if measures.is_empty() {
        return Err(
            ChartError::new("E1005", "chart has no measures").with_difficulty(difficulty),
        );
    }

    Ok(Some(DifficultyChart {
        mode: mode.to_string(),
        description: description.to_string(),
        difficulty: difficulty.to_string(),
        rating,
        measures,
    }))
}

pub fn parse_measures(note_data: &str) -> Result<Vec<Measure>, ChartError> {
    let mut measures = Vec::new();
    for raw_measure in note_data.split(',') {
        if raw_measure.trim().is_empty() {
            continue;
        }
        let measure_index = measures.len();
        let mut rows = Vec::new();
        for line in raw_measure.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            rows.push(parse_row(trimmed, measure_index, rows.len())?);
        }
        measures.push(Measure { rows });
    }
    Ok(measures)
}

fn parse_row(trimmed: &str, measure: usize, row: usize) -> Result<Row, ChartError> {
    let malformed = || {
        ChartError::new(
            "E5001",
            format!(
                "row must have {LANES} symbols (measure={measure}, row={row}, context={trimmed})"
            ),
        )
        .with_measure(measure)
        .with_row(row)
        .with_context(trimmed)
    };

    let mut chars = trimmed.chars();
    let mut cells = [NoteSymbol::Empty; LANES];
    for cell in cells.iter_mut() {
        *cell = NoteSymbol::from_char(chars.next().ok_or_else(malformed)?);
    }
    if chars.next().is_some() {
        return Err(malformed());
    }
    Ok(cells)
}

fn strip_comments(src: &str) -> String {
    src.lines()
        .map(strip_inline_comment)
        .collect::<Vec<_>>()
        .join("\n")
}

fn strip_inline_comment(line: &str) -> &str {
    match line.find("//") {
        Some(i) => &line[..i],
        None => line,
    }
}

/// Drops a tail of stray word characters left behind the final `;`.
fn strip_trailing_garbage(src: &str) -> &str {
    let Some(last) = src.rfind(';') else {
        return src;
    };
    let tail = &src[last + 1..];
    if tail
        .chars()
        .all(|c| c.is_whitespace() || c.is_alphanumeric() || c == '_')
    {
        &src[..=last]
    } else {
        src
    }
}
