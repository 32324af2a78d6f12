use std::fmt;

use chart_schema::{NoteCounts, NpsMode, NpsStats, RunStats};

use crate::parser::{steppable_lanes, Measure, NoteSymbol};
use crate::time_map::TimeMap;

pub const DEFAULT_STREAM_NOTE_THRESHOLD: usize = 14;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakdownToken {
    Stream(u32),
    Break(u32),
}

impl fmt::Display for BreakdownToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BreakdownToken::Stream(n) => write!(f, "{n}"),
            BreakdownToken::Break(n) => write!(f, "({n})"),
        }
    }
}

pub fn is_stream_measure(measure: &Measure, stream_note_threshold: usize) -> bool {
    measure.rows.len() >= stream_note_threshold
        && measure.steppable_rows() >= stream_note_threshold
}

/// Alternating break/stream runs covering every measure once.
///
/// The walk starts in break state, so a chart opening with stream gets a leading `(0)`.
/// The run in progress at the end is always emitted.
pub fn stream_breakdown(measures: &[Measure], stream_note_threshold: usize) -> Vec<BreakdownToken> {
    let mut tokens = Vec::new();
    let mut in_stream = false;
    let mut run = 0u32;

    for measure in measures {
        let stream = is_stream_measure(measure, stream_note_threshold);
        if stream != in_stream {
            tokens.push(if in_stream {
                BreakdownToken::Stream(run)
            } else {
                BreakdownToken::Break(run)
            });
            in_stream = stream;
            run = 0;
        }
        run += 1;
    }
    tokens.push(if in_stream {
        BreakdownToken::Stream(run)
    } else {
        BreakdownToken::Break(run)
    });
    tokens
}

pub fn split_runs(tokens: &[BreakdownToken]) -> (Vec<u32>, Vec<u32>) {
    let mut streams = Vec::new();
    let mut breaks = Vec::new();
    for token in tokens {
        match *token {
            BreakdownToken::Stream(n) => streams.push(n),
            BreakdownToken::Break(n) => breaks.push(n),
        }
    }
    (streams, breaks)
}

pub fn run_stats(sizes: &[u32]) -> Option<RunStats> {
    let max = *sizes.iter().max()?;
    let values: Vec<f64> = sizes.iter().map(|&s| f64::from(s)).collect();
    Some(RunStats {
        count: sizes.len(),
        max,
        mean: mean(&values)?,
        stdev: sample_stdev(&values),
        total: sizes.iter().sum(),
    })
}

pub fn count_notes(measures: &[Measure]) -> NoteCounts {
    let mut counts = NoteCounts::default();
    for row in measures.iter().flat_map(|m| &m.rows) {
        match steppable_lanes(row) {
            2 => counts.jumps += 1,
            3 => counts.hands += 1,
            4 => counts.quads += 1,
            _ => {}
        }
        for symbol in row {
            if symbol.is_steppable() {
                counts.step_count += 1;
            }
            match symbol {
                NoteSymbol::Mine => counts.mines += 1,
                NoteSymbol::HoldHead => counts.holds += 1,
                NoteSymbol::RollHead => counts.rolls += 1,
                _ => {}
            }
        }
    }
    counts
}

/// Notes per second of every measure, each over its own time span.
pub fn measure_nps(measures: &[Measure], time_map: &TimeMap) -> Vec<f64> {
    measures
        .iter()
        .enumerate()
        .filter_map(|(i, measure)| {
            let seconds = time_map.measure_seconds(i)?;
            // warps can leave a measure with no duration
            Some(if seconds > 0.0 {
                measure.steppable_notes() as f64 / seconds
            } else {
                0.0
            })
        })
        .collect()
}

pub fn nps_stats(step_count: u32, song_seconds: f64, per_measure: &[f64]) -> NpsStats {
    NpsStats {
        song_nps: if song_seconds > 0.0 {
            f64::from(step_count) / song_seconds
        } else {
            0.0
        },
        per_measure_max: per_measure.iter().copied().fold(0.0, f64::max),
        per_measure_avg: mean(per_measure).unwrap_or(0.0),
        per_measure_median: median(per_measure).unwrap_or(0.0),
        per_measure_std: sample_stdev(per_measure),
        per_measure_mode: mode(per_measure),
    }
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    Some(if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    })
}

/// Standard deviation with the N-1 denominator; needs two samples.
pub fn sample_stdev(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values)?;
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    Some(var.sqrt())
}

pub fn mode(values: &[f64]) -> NpsMode {
    let mut tally: Vec<(f64, usize)> = Vec::new();
    for &v in values {
        match tally.iter().position(|(x, _)| *x == v) {
            Some(i) => tally[i].1 += 1,
            None => tally.push((v, 1)),
        }
    }
    let Some(top) = tally.iter().map(|(_, n)| *n).max() else {
        return NpsMode::NoUniqueMode;
    };
    let mut winners = tally.iter().filter(|(_, n)| *n == top);
    match (winners.next(), winners.next()) {
        (Some((v, _)), None) => NpsMode::Value(*v),
        _ => NpsMode::NoUniqueMode,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_measures;
    use crate::time_map::{PauseEvent, TempoEvent};

    fn stream_measure() -> String {
        "1000\n0100\n0010\n0001\n".repeat(4)
    }

    fn break_measure() -> String {
        "1000\n0000\n0000\n0000\n".to_string()
    }

    fn chart(layout: &str) -> Vec<Measure> {
        let data: Vec<String> = layout
            .chars()
            .map(|c| if c == 'S' { stream_measure() } else { break_measure() })
            .collect();
        parse_measures(&data.join(",\n")).unwrap()
    }

    fn tokens(layout: &str) -> Vec<String> {
        stream_breakdown(&chart(layout), DEFAULT_STREAM_NOTE_THRESHOLD)
            .iter()
            .map(ToString::to_string)
            .collect()
    }

    #[test]
    fn breakdown_alternates_runs() {
        assert_eq!(tokens("BBSSSBS"), vec!["(2)", "3", "(1)", "1"]);
        assert_eq!(tokens("BB"), vec!["(2)"]);
    }

    #[test]
    fn chart_opening_with_stream_gets_leading_zero_break() {
        assert_eq!(tokens("SSB"), vec!["(0)", "2", "(1)"]);
    }

    #[test]
    fn breakdown_covers_every_measure() {
        for layout in ["S", "B", "SBSBBS", "BSSSSB", "SSSS"] {
            let measures = chart(layout);
            let (streams, breaks) = split_runs(&stream_breakdown(&measures, 14));
            let total: u32 = streams.iter().chain(&breaks).sum();
            assert_eq!(total as usize, measures.len(), "{layout}");
        }
    }

    #[test]
    fn sparse_measure_with_many_rows_is_not_stream() {
        let data = format!("{}{}", "1000\n".repeat(13), "0000\n".repeat(3));
        let measures = parse_measures(&data).unwrap();
        assert_eq!(measures[0].rows.len(), 16);
        assert!(!is_stream_measure(&measures[0], 14));
        assert!(is_stream_measure(&measures[0], 13));
    }

    #[test]
    fn run_stats_need_two_samples_for_stdev() {
        let stats = run_stats(&[4]).unwrap();
        assert_eq!(stats.count, 1);
        assert_eq!(stats.stdev, None);

        let stats = run_stats(&[2, 4, 6]).unwrap();
        assert_eq!(stats.max, 6);
        assert_eq!(stats.total, 12);
        assert!((stats.mean - 4.0).abs() < 1e-12);
        assert!((stats.stdev.unwrap() - 2.0).abs() < 1e-12);

        assert!(run_stats(&[]).is_none());
    }

    #[test]
    fn note_counts_by_row_and_lane() {
        let measures = parse_measures("1100\n1110\n1111\n2004\nM00M\n3003\n0010\n").unwrap();
        let counts = count_notes(&measures);
        assert_eq!(counts.jumps, 2);
        assert_eq!(counts.hands, 1);
        assert_eq!(counts.quads, 1);
        assert_eq!(counts.mines, 2);
        assert_eq!(counts.holds, 1);
        assert_eq!(counts.rolls, 1);
        assert_eq!(counts.step_count, 2 + 3 + 4 + 2 + 1);
    }

    #[test]
    fn nps_per_measure_uses_local_tempo() {
        let measures = parse_measures("1000\n0100\n0010\n0001\n,\n1000\n0100\n0010\n0001\n").unwrap();
        let time_map = TimeMap::build(
            vec![
                TempoEvent { beat: 0.0, bpm: 120.0 },
                TempoEvent { beat: 4.0, bpm: 240.0 },
            ],
            vec![],
            2,
            2,
        )
        .unwrap();
        let nps = measure_nps(&measures, &time_map);
        assert_eq!(nps, vec![2.0, 4.0]);

        let stats = nps_stats(8, time_map.song_seconds(), &nps);
        assert!((stats.song_nps - 8.0 / 3.0).abs() < 1e-12);
        assert_eq!(stats.per_measure_max, 4.0);
        assert_eq!(stats.per_measure_median, 3.0);
        assert_eq!(stats.per_measure_mode, NpsMode::NoUniqueMode);
        assert!(stats.per_measure_std.is_some());
    }

    #[test]
    fn measure_without_duration_has_zero_nps() {
        let measures = parse_measures("1000\n0100\n0010\n0001\n,\n1000\n0100\n").unwrap();
        let time_map = TimeMap::build(
            vec![TempoEvent { beat: 0.0, bpm: 120.0 }],
            vec![PauseEvent { beat: 0.0, seconds: -2.0 }],
            2,
            2,
        )
        .unwrap();
        assert_eq!(time_map.measure_seconds(0), Some(0.0));

        let nps = measure_nps(&measures, &time_map);
        assert_eq!(nps, vec![0.0, 1.0]);
        assert!(nps.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn mode_reports_unique_value_or_sentinel() {
        assert_eq!(mode(&[2.0, 3.0, 2.0]), NpsMode::Value(2.0));
        assert_eq!(mode(&[5.0]), NpsMode::Value(5.0));
        assert_eq!(mode(&[1.0, 2.0]), NpsMode::NoUniqueMode);
        assert_eq!(mode(&[]), NpsMode::NoUniqueMode);
    }

    #[test]
    fn median_of_even_and_odd_samples() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), Some(2.5));
        assert_eq!(median(&[]), None);
    }
}
