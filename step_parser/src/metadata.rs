use chart_schema::{DifficultyMetadata, NoteCounts, NpsStats, RunStats, SongMetadata, TechCounts};
use tracing::debug;

use crate::density::{self, BreakdownToken};
use crate::parser::{DifficultyChart, ParsedSimfile};
use crate::patterns;
use crate::time_map::{parse_pause_events, parse_tempo_events, TimeMap};
use crate::{AnalyzeOptions, ChartError};

/// Builds the time map shared by all charts of the song.
///
/// Every chart gets a per-measure timeline; the song length follows the first chart.
pub fn song_time_map(parsed: &ParsedSimfile) -> Result<TimeMap, ChartError> {
    let tempos = parse_tempo_events(parsed.header("BPMS").unwrap_or_default())?;
    let pauses = parse_pause_events(parsed.header("STOPS").unwrap_or_default())?;
    let timeline = parsed
        .charts
        .iter()
        .map(|c| c.measures.len())
        .max()
        .unwrap_or_default();
    let song_measures = parsed.charts.first().map_or(0, |c| c.measures.len());
    TimeMap::build(tempos, pauses, timeline, song_measures)
}

pub fn song_metadata(parsed: &ParsedSimfile, time_map: &TimeMap) -> SongMetadata {
    let text = |name: &str| {
        parsed
            .header(name)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };
    let tempo = time_map.tempo_stats();
    SongMetadata {
        title: text("TITLE"),
        artist: text("ARTIST"),
        song_seconds: time_map.song_seconds(),
        bpm_change_count: tempo.change_count,
        stop_count: time_map.pauses().len(),
        bpm_min: tempo.min,
        bpm_max: tempo.max,
        bpm_weighted_avg: tempo.weighted_avg,
        bpm_mode: tempo.mode,
    }
}

/// Per-difficulty record, filled stage by stage.
///
/// Stages: stream breakdown → note counts → step density (needs note counts)
/// → tech patterns → [`finish`](Self::finish) with the song-level values.
#[derive(Debug)]
pub struct DifficultyMetadataBuilder<'a> {
    chart: &'a DifficultyChart,
    breakdown: Option<Vec<BreakdownToken>>,
    streams: Option<RunStats>,
    breaks: Option<RunStats>,
    stream_total: u32,
    notes: Option<NoteCounts>,
    density: Option<NpsStats>,
    tech: Option<TechCounts>,
}

fn missing_stage(stage: &str) -> ChartError {
    ChartError::new("E5002", format!("metadata stage not computed: {stage}"))
}

impl<'a> DifficultyMetadataBuilder<'a> {
    pub fn new(chart: &'a DifficultyChart) -> Self {
        Self {
            chart,
            breakdown: None,
            streams: None,
            breaks: None,
            stream_total: 0,
            notes: None,
            density: None,
            tech: None,
        }
    }

    pub fn stream_breakdown(mut self, stream_note_threshold: usize) -> Self {
        let tokens = density::stream_breakdown(&self.chart.measures, stream_note_threshold);
        let (streams, breaks) = density::split_runs(&tokens);
        self.stream_total = streams.iter().sum();
        self.streams = density::run_stats(&streams);
        self.breaks = density::run_stats(&breaks);
        self.breakdown = Some(tokens);
        self
    }

    pub fn note_counts(mut self) -> Self {
        self.notes = Some(density::count_notes(&self.chart.measures));
        self
    }

    pub fn step_density(mut self, time_map: &TimeMap) -> Result<Self, ChartError> {
        let notes = self.notes.ok_or_else(|| missing_stage("note counts"))?;
        let per_measure = density::measure_nps(&self.chart.measures, time_map);
        self.density = Some(density::nps_stats(
            notes.step_count,
            time_map.song_seconds(),
            &per_measure,
        ));
        Ok(self)
    }

    pub fn tech_patterns(mut self, invalid_crossover_threshold: usize) -> Self {
        self.tech = Some(patterns::detect_tech_patterns(
            &self.chart.measures,
            invalid_crossover_threshold,
        ));
        self
    }

    pub fn finish(self, song: &SongMetadata) -> Result<DifficultyMetadata, ChartError> {
        let breakdown = self.breakdown.ok_or_else(|| missing_stage("stream breakdown"))?;
        Ok(DifficultyMetadata {
            difficulty: self.chart.difficulty.clone(),
            description: self.chart.description.clone(),
            rating: self.chart.rating,
            measure_count: self.chart.measures.len(),
            breakdown: breakdown.iter().map(ToString::to_string).collect(),
            stream_total: self.stream_total,
            streams: self.streams,
            breaks: self.breaks,
            notes: self.notes.ok_or_else(|| missing_stage("note counts"))?,
            density: self.density.ok_or_else(|| missing_stage("step density"))?,
            tech: self.tech.ok_or_else(|| missing_stage("tech patterns"))?,
            song: song.clone(),
        })
    }
}

pub fn build_song_records(
    parsed: &ParsedSimfile,
    options: &AnalyzeOptions,
) -> Result<Vec<DifficultyMetadata>, ChartError> {
    let time_map = song_time_map(parsed)?;
    let song = song_metadata(parsed, &time_map);

    parsed
        .charts
        .iter()
        .map(|chart| {
            debug!(difficulty = %chart.difficulty, measures = chart.measures.len(), "analyzing chart");
            build_difficulty(chart, &time_map, &song, options)
                .map_err(|e| e.with_difficulty(&chart.difficulty))
        })
        .collect()
}

fn build_difficulty(
    chart: &DifficultyChart,
    time_map: &TimeMap,
    song: &SongMetadata,
    options: &AnalyzeOptions,
) -> Result<DifficultyMetadata, ChartError> {
    DifficultyMetadataBuilder::new(chart)
        .stream_breakdown(options.stream_note_threshold)
        .note_counts()
        .step_density(time_map)?
        .tech_patterns(options.invalid_crossover_threshold)
        .finish(song)
}
