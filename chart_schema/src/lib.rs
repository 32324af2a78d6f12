use serde::{Deserialize, Serialize};
use std::fmt;

/// Song-level values shared by every difficulty of one simfile.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SongMetadata {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub song_seconds: f64,
    pub bpm_change_count: usize,
    pub stop_count: usize,
    pub bpm_min: f64,
    pub bpm_max: f64,
    pub bpm_weighted_avg: f64,
    pub bpm_mode: f64,
}

/// Run-length statistics over either the stream runs or the break runs of a breakdown.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunStats {
    pub count: usize,
    pub max: u32,
    pub mean: f64,
    /// Sample standard deviation, only present with at least two runs.
    #[serde(default)]
    pub stdev: Option<f64>,
    pub total: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum NpsMode {
    Value(f64),
    NoUniqueMode,
}

impl fmt::Display for NpsMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NpsMode::Value(v) => write!(f, "{v}"),
            NpsMode::NoUniqueMode => f.write_str("no_unique_mode"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NpsStats {
    pub song_nps: f64,
    pub per_measure_max: f64,
    pub per_measure_avg: f64,
    pub per_measure_median: f64,
    #[serde(default)]
    pub per_measure_std: Option<f64>,
    pub per_measure_mode: NpsMode,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct NoteCounts {
    pub step_count: u32,
    pub jumps: u32,
    pub hands: u32,
    pub quads: u32,
    pub mines: u32,
    pub holds: u32,
    pub rolls: u32,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TechCounts {
    pub crossovers: u32,
    pub footswitches: u32,
    pub crossover_footswitches: u32,
    pub jacks: u32,
    pub invalid_crossovers: u32,
}

impl TechCounts {
    pub fn merge(&mut self, other: TechCounts) {
        self.crossovers += other.crossovers;
        self.footswitches += other.footswitches;
        self.crossover_footswitches += other.crossover_footswitches;
        self.jacks += other.jacks;
        self.invalid_crossovers += other.invalid_crossovers;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DifficultyMetadata {
    pub difficulty: String,
    pub description: String,
    pub rating: u32,
    pub measure_count: usize,
    /// Tokens like `"(16)"` (break) and `"32"` (stream), in chart order.
    pub breakdown: Vec<String>,
    pub stream_total: u32,
    #[serde(default)]
    pub streams: Option<RunStats>,
    #[serde(default)]
    pub breaks: Option<RunStats>,
    pub notes: NoteCounts,
    pub density: NpsStats,
    pub tech: TechCounts,
    pub song: SongMetadata,
}

impl DifficultyMetadata {
    pub fn breakdown_string(&self) -> String {
        self.breakdown.join("-")
    }
}

/// One row per difficulty, song-level values repeated on every row.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MetadataTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

const COLUMNS: &[&str] = &[
    "title",
    "artist",
    "difficulty",
    "description",
    "rating",
    "measure_count",
    "breakdown",
    "stream_total",
    "stream_count",
    "stream_size_max",
    "stream_size_avg",
    "stream_size_std",
    "break_count",
    "break_size_max",
    "break_size_avg",
    "break_size_std",
    "break_total",
    "step_count",
    "jumps",
    "hands",
    "quads",
    "mines",
    "holds",
    "rolls",
    "song_nps",
    "nps_per_measure_max",
    "nps_per_measure_avg",
    "nps_per_measure_median",
    "nps_per_measure_std",
    "nps_per_measure_mode",
    "crossovers",
    "footswitches",
    "crossover_footswitches",
    "jacks",
    "invalid_crossovers",
    "song_seconds",
    "bpm_change_count",
    "stop_count",
    "bpm_min",
    "bpm_max",
    "bpm_weighted_avg",
    "bpm_mode",
];

impl MetadataTable {
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a DifficultyMetadata>) -> Self {
        Self {
            columns: COLUMNS.iter().map(|c| c.to_string()).collect(),
            rows: records.into_iter().map(flatten_record).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }
}

fn opt<T: ToString>(v: Option<T>) -> String {
    v.map(|v| v.to_string()).unwrap_or_default()
}

fn flatten_record(r: &DifficultyMetadata) -> Vec<String> {
    let streams = r.streams.as_ref();
    let breaks = r.breaks.as_ref();
    vec![
        r.song.title.clone().unwrap_or_default(),
        r.song.artist.clone().unwrap_or_default(),
        r.difficulty.clone(),
        r.description.clone(),
        r.rating.to_string(),
        r.measure_count.to_string(),
        r.breakdown_string(),
        r.stream_total.to_string(),
        opt(streams.map(|s| s.count)),
        opt(streams.map(|s| s.max)),
        opt(streams.map(|s| s.mean)),
        opt(streams.and_then(|s| s.stdev)),
        opt(breaks.map(|s| s.count)),
        opt(breaks.map(|s| s.max)),
        opt(breaks.map(|s| s.mean)),
        opt(breaks.and_then(|s| s.stdev)),
        opt(breaks.map(|s| s.total)),
        r.notes.step_count.to_string(),
        r.notes.jumps.to_string(),
        r.notes.hands.to_string(),
        r.notes.quads.to_string(),
        r.notes.mines.to_string(),
        r.notes.holds.to_string(),
        r.notes.rolls.to_string(),
        r.density.song_nps.to_string(),
        r.density.per_measure_max.to_string(),
        r.density.per_measure_avg.to_string(),
        r.density.per_measure_median.to_string(),
        opt(r.density.per_measure_std),
        r.density.per_measure_mode.to_string(),
        r.tech.crossovers.to_string(),
        r.tech.footswitches.to_string(),
        r.tech.crossover_footswitches.to_string(),
        r.tech.jacks.to_string(),
        r.tech.invalid_crossovers.to_string(),
        r.song.song_seconds.to_string(),
        r.song.bpm_change_count.to_string(),
        r.song.stop_count.to_string(),
        r.song.bpm_min.to_string(),
        r.song.bpm_max.to_string(),
        r.song.bpm_weighted_avg.to_string(),
        r.song.bpm_mode.to_string(),
    ]
}
