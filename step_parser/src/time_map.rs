use tracing::debug;

use crate::ChartError;

pub const BEATS_PER_MEASURE: f64 = 4.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TempoEvent {
    pub beat: f64,
    pub bpm: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PauseEvent {
    pub beat: f64,
    pub seconds: f64,
}

/// An entry of a measure-local timeline; beats are relative to the measure start.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TimingEvent {
    Tempo { beat: f64, bpm: f64 },
    Pause { beat: f64, seconds: f64 },
}

impl TimingEvent {
    pub fn beat(&self) -> f64 {
        match *self {
            TimingEvent::Tempo { beat, .. } | TimingEvent::Pause { beat, .. } => beat,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MeasureTiming {
    /// Sorted by local beat; always starts with a tempo at beat 0.
    pub events: Vec<TimingEvent>,
    pub seconds: f64,
}

impl MeasureTiming {
    fn new(events: Vec<TimingEvent>) -> Self {
        let seconds = accumulated_measure_seconds(&events);
        Self { events, seconds }
    }

    /// Tempo in effect at the end of the measure.
    pub fn final_bpm(&self) -> Option<f64> {
        self.events.iter().rev().find_map(|e| match *e {
            TimingEvent::Tempo { bpm, .. } => Some(bpm),
            TimingEvent::Pause { .. } => None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TempoStats {
    pub change_count: usize,
    pub min: f64,
    pub max: f64,
    pub weighted_avg: f64,
    pub mode: f64,
}

/// Beat-to-seconds model of one song, computed once from its tempo and pause lists.
#[derive(Debug, Clone)]
pub struct TimeMap {
    tempos: Vec<TempoEvent>,
    pauses: Vec<PauseEvent>,
    measures: Vec<MeasureTiming>,
    song_measure_count: usize,
    song_seconds: f64,
}

impl TimeMap {
    /// `timeline_measures` is how many measures get a local timeline,
    /// `song_measure_count` how many of them make up the song length.
    pub fn build(
        mut tempos: Vec<TempoEvent>,
        mut pauses: Vec<PauseEvent>,
        timeline_measures: usize,
        song_measure_count: usize,
    ) -> Result<Self, ChartError> {
        tempos.sort_by(|a, b| a.beat.total_cmp(&b.beat));
        pauses.sort_by(|a, b| a.beat.total_cmp(&b.beat));

        match tempos.first() {
            Some(first) if first.beat == 0.0 => {}
            Some(first) => {
                return Err(ChartError::new(
                    "E3001",
                    format!("no tempo at beat 0 (first tempo at beat {})", first.beat),
                ));
            }
            None => return Err(ChartError::new("E3001", "no tempo at beat 0 (empty tempo list)")),
        }
        if let Some(bad) = tempos.iter().find(|t| !(t.bpm.is_finite() && t.bpm > 0.0)) {
            return Err(ChartError::new(
                "E1004",
                format!("tempo must be > 0 (beat={}, bpm={})", bad.beat, bad.bpm),
            ));
        }

        let measures = localize(&tempos, &pauses, timeline_measures.max(song_measure_count));
        let song_seconds: f64 = measures
            .iter()
            .take(song_measure_count)
            .map(|m| m.seconds)
            .sum();

        debug!(
            tempos = tempos.len(),
            pauses = pauses.len(),
            measures = measures.len(),
            song_seconds,
            "built time map"
        );

        Ok(Self {
            tempos,
            pauses,
            measures,
            song_measure_count,
            song_seconds,
        })
    }

    pub fn tempos(&self) -> &[TempoEvent] {
        &self.tempos
    }

    pub fn pauses(&self) -> &[PauseEvent] {
        &self.pauses
    }

    pub fn measures(&self) -> &[MeasureTiming] {
        &self.measures
    }

    pub fn measure_seconds(&self, index: usize) -> Option<f64> {
        self.measures.get(index).map(|m| m.seconds)
    }

    pub fn song_seconds(&self) -> f64 {
        self.song_seconds
    }

    pub fn song_beats(&self) -> f64 {
        self.song_measure_count as f64 * BEATS_PER_MEASURE
    }

    pub fn tempo_stats(&self) -> TempoStats {
        let (weighted_avg, mode) = weighted_tempo(&self.tempos, self.song_beats());
        let bpms = self.tempos.iter().map(|t| t.bpm);
        TempoStats {
            change_count: self.tempos.len() - 1,
            min: bpms.clone().fold(f64::INFINITY, f64::min),
            max: bpms.fold(f64::NEG_INFINITY, f64::max),
            weighted_avg,
            mode,
        }
    }
}

/// Parses a `beat=value,beat=value` header value, sorted by beat.
pub fn parse_beat_pairs(raw: &str, what: &str) -> Result<Vec<(f64, f64)>, ChartError> {
    let mut pairs = Vec::new();
    for chunk in raw.split(',') {
        let chunk = chunk.trim();
        if chunk.is_empty() {
            continue;
        }
        let invalid = || ChartError::new("E1003", format!("invalid {what} entry")).with_context(chunk);
        let (beat, value) = chunk.split_once('=').ok_or_else(invalid)?;
        let beat: f64 = beat.trim().parse().map_err(|_| invalid())?;
        let value: f64 = value.trim().parse().map_err(|_| invalid())?;
        if !(beat.is_finite() && value.is_finite()) {
            return Err(invalid());
        }
        pairs.push((beat, value));
    }
    pairs.sort_by(|a, b| a.0.total_cmp(&b.0));
    Ok(pairs)
}

pub fn parse_tempo_events(raw: &str) -> Result<Vec<TempoEvent>, ChartError> {
    Ok(parse_beat_pairs(raw, "BPMS")?
        .into_iter()
        .map(|(beat, bpm)| TempoEvent { beat, bpm })
        .collect())
}

pub fn parse_pause_events(raw: &str) -> Result<Vec<PauseEvent>, ChartError> {
    Ok(parse_beat_pairs(raw, "STOPS")?
        .into_iter()
        .map(|(beat, seconds)| PauseEvent { beat, seconds })
        .collect())
}

fn measure_position(beat: f64) -> Option<(usize, f64)> {
    if beat < 0.0 {
        return None;
    }
    let measure = (beat / BEATS_PER_MEASURE).floor();
    Some((measure as usize, beat - measure * BEATS_PER_MEASURE))
}

fn localize(tempos: &[TempoEvent], pauses: &[PauseEvent], measure_count: usize) -> Vec<MeasureTiming> {
    let mut grouped: Vec<Vec<TimingEvent>> = vec![Vec::new(); measure_count];

    for t in tempos {
        if let Some((m, beat)) = measure_position(t.beat) {
            if let Some(events) = grouped.get_mut(m) {
                events.push(TimingEvent::Tempo { beat, bpm: t.bpm });
            }
        }
    }
    for p in pauses {
        if let Some((m, beat)) = measure_position(p.beat) {
            if let Some(events) = grouped.get_mut(m) {
                events.push(TimingEvent::Pause {
                    beat,
                    seconds: p.seconds,
                });
            }
        }
    }

    let mut carried = tempos[0].bpm;
    let mut measures = Vec::with_capacity(measure_count);
    for mut events in grouped {
        events.sort_by(|a, b| a.beat().total_cmp(&b.beat()));
        let opens_with_tempo = events
            .iter()
            .find_map(|e| match *e {
                TimingEvent::Tempo { beat, .. } => Some(beat == 0.0),
                TimingEvent::Pause { .. } => None,
            })
            .unwrap_or(false);
        if !opens_with_tempo {
            events.insert(0, TimingEvent::Tempo { beat: 0.0, bpm: carried });
        }
        let timing = MeasureTiming::new(events);
        if let Some(bpm) = timing.final_bpm() {
            carried = bpm;
        }
        measures.push(timing);
    }
    measures
}

/// Seconds spent in one measure: tempo segments up to beat 4 plus every pause.
pub fn accumulated_measure_seconds(events: &[TimingEvent]) -> f64 {
    let mut seconds = 0.0;
    let mut last: Option<(f64, f64)> = None;

    for event in events {
        match *event {
            TimingEvent::Pause { seconds: pause, .. } => seconds += pause,
            TimingEvent::Tempo { beat, bpm } => {
                if let Some((last_beat, last_bpm)) = last {
                    seconds += 60.0 * (beat - last_beat) / last_bpm;
                }
                last = Some((beat, bpm));
            }
        }
    }
    if let Some((last_beat, last_bpm)) = last {
        seconds += 60.0 * (BEATS_PER_MEASURE - last_beat) / last_bpm;
    }
    seconds
}

/// Returns `(weighted average, mode)` of the tempo over `song_beats`, both weighted by beats.
pub fn weighted_tempo(tempos: &[TempoEvent], song_beats: f64) -> (f64, f64) {
    let mut durations: Vec<(f64, f64)> = Vec::new();
    let mut add = |bpm: f64, beats: f64| {
        match durations.iter().position(|(b, _)| *b == bpm) {
            Some(i) => durations[i].1 += beats,
            None => durations.push((bpm, beats)),
        }
    };

    let clip = |beat: f64| beat.clamp(0.0, song_beats.max(0.0));
    for pair in tempos.windows(2) {
        add(pair[0].bpm, clip(pair[1].beat) - clip(pair[0].beat));
    }
    if let Some(last) = tempos.last() {
        add(last.bpm, clip(song_beats) - clip(last.beat));
    }

    let total: f64 = durations.iter().map(|(_, d)| d).sum();
    let initial = tempos.first().map_or(0.0, |t| t.bpm);
    if total <= 0.0 {
        return (initial, initial);
    }
    let weighted_avg = durations.iter().map(|(bpm, d)| bpm * d).sum::<f64>() / total;
    let mode = durations
        .iter()
        .max_by(|a, b| a.1.total_cmp(&b.1).then(a.0.total_cmp(&b.0)))
        .map_or(initial, |(bpm, _)| *bpm);
    (weighted_avg, mode)
}
