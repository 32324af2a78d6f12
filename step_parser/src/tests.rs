use super::*;
use crate::batch::{discover_chart_files, progress_mark, run_batch, BatchOptions};
use chart_schema::{MetadataTable, NpsMode, TechCounts};
use std::{fs, path::PathBuf};

fn simfile(bpms: &str, charts: &[(&str, &str, &str)]) -> String {
    let mut src = format!("#TITLE:Test Song;\n#ARTIST:Someone;\n#BPMS:{bpms};\n#STOPS:;\n");
    for (mode, difficulty, notes) in charts {
        src.push_str(&format!(
            "#NOTES:\n     {mode}:\n     :\n     {difficulty}:\n     5:\n     0.1,0.2,0.3,0.4,0.5:\n{notes}\n;\n"
        ));
    }
    src
}

fn stream_measures(count: usize) -> String {
    vec!["1000\n0100\n0010\n0001\n".repeat(4); count].join(",\n")
}

fn write_file(dir: &std::path::Path, name: &str, bytes: impl AsRef<[u8]>) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, bytes).unwrap();
    path
}

#[test]
fn single_ldur_measure_has_no_tech() {
    let src = simfile("0.000=120.000", &[("dance-single", "Beginner", "1000\n0100\n0010\n0001")]);
    let records = analyze_str(&src).unwrap();
    assert_eq!(records.len(), 1);

    let record = &records[0];
    assert_eq!(record.difficulty, "Beginner");
    assert_eq!(record.rating, 5);
    assert_eq!(record.measure_count, 1);
    assert_eq!(record.breakdown, vec!["(1)"]);
    assert_eq!(record.notes.step_count, 4);
    assert_eq!(record.tech, TechCounts::default());
    assert_eq!(record.song.title.as_deref(), Some("Test Song"));
    assert_eq!(record.song.song_seconds, 2.0);
    assert_eq!(record.song.bpm_weighted_avg, 120.0);
    assert_eq!(record.density.per_measure_mode, NpsMode::Value(2.0));
}

#[test]
fn every_single_chart_gets_a_record_sharing_song_values() {
    let src = simfile(
        "0=150",
        &[
            ("dance-single", "Easy", "1000\n0000\n0000\n0000"),
            ("dance-double", "Easy", "10000000"),
            ("dance-single", "Challenge", stream_measures(3).as_str()),
        ],
    );
    let records = analyze_str(&src).unwrap();
    let names: Vec<&str> = records.iter().map(|r| r.difficulty.as_str()).collect();
    assert_eq!(names, vec!["Easy", "Challenge"]);
    assert_eq!(records[0].song, records[1].song);
    assert_eq!(records[1].breakdown, vec!["(0)", "3"]);
    assert_eq!(records[1].stream_total, 3);
}

#[test]
fn tempo_change_averages_by_beats() {
    let src = simfile(
        "0=120,4=240",
        &[("dance-single", "Hard", "1000\n0100\n0010\n0001\n,\n1000\n0100\n0010\n0001")],
    );
    let records = analyze_str(&src).unwrap();
    let song = &records[0].song;
    assert_eq!(song.bpm_change_count, 1);
    assert_eq!(song.bpm_min, 120.0);
    assert_eq!(song.bpm_max, 240.0);
    assert!((song.bpm_weighted_avg - 180.0).abs() < 1e-9);
    assert_eq!(song.bpm_mode, 240.0);
    assert!((song.song_seconds - 3.0).abs() < 1e-9);
    assert!(song.bpm_min <= song.bpm_weighted_avg && song.bpm_weighted_avg <= song.bpm_max);
}

#[test]
fn stops_lengthen_the_song() {
    let notes = "1000\n0100\n0010\n0001";
    let plain = simfile("0=120", &[("dance-single", "Easy", notes)]);
    let stopped = plain.replace("#STOPS:;", "#STOPS:1.000=0.750;");
    let plain = analyze_str(&plain).unwrap().remove(0).song;
    let stopped = analyze_str(&stopped).unwrap().remove(0).song;
    assert_eq!(stopped.stop_count, 1);
    assert!((stopped.song_seconds - plain.song_seconds - 0.75).abs() < 1e-9);
}

#[test]
fn missing_initial_tempo_is_reported() {
    let src = simfile("4=120", &[("dance-single", "Easy", "1000")]);
    let err = analyze_str(&src).unwrap_err();
    assert_eq!(err.kind, ChartErrorKind::MissingInitialTempo);
    assert_eq!(err.code, "E3001");
}

#[test]
fn doubles_only_file_has_no_eligible_chart() {
    let src = simfile("0=120", &[("dance-double", "Hard", "10000001")]);
    let err = analyze_str(&src).unwrap_err();
    assert_eq!(err.kind, ChartErrorKind::NoEligibleChart);
    assert_eq!(err.kind.progress_mark(), '0');
}

#[test]
fn stream_threshold_is_configurable() {
    let half_stream = format!("{}{}", "1000\n".repeat(8), "0000\n".repeat(8));
    let src = simfile("0=120", &[("dance-single", "Easy", half_stream.as_str())]);

    let records = analyze_str(&src).unwrap();
    assert_eq!(records[0].breakdown, vec!["(1)"]);

    let options = AnalyzeOptions {
        stream_note_threshold: 8,
        ..AnalyzeOptions::default()
    };
    let records = analyze_str_with_options(&src, &options).unwrap();
    assert_eq!(records[0].breakdown, vec!["(0)", "1"]);
}

#[test]
fn breakdown_runs_add_up_to_measure_count() {
    let notes = [
        stream_measures(2),
        "1000\n0000\n0000\n0000".to_string(),
        stream_measures(1),
        "0000\n0000\n0000\n0000".to_string(),
    ]
    .join(",\n");
    let src = simfile("0=180", &[("dance-single", "Medium", notes.as_str())]);
    let records = analyze_str(&src).unwrap();
    let record = &records[0];
    let breaks = record.breaks.as_ref().map_or(0, |b| b.total);
    assert_eq!((record.stream_total + breaks) as usize, record.measure_count);
    assert_eq!(record.breakdown_string(), "(0)-2-(1)-1-(1)");
}

#[test]
fn utf8_bom_is_skipped() {
    let src = simfile("0=120", &[("dance-single", "Easy", "1000")]);
    let mut bytes = b"\xEF\xBB\xBF".to_vec();
    bytes.extend_from_slice(src.as_bytes());
    let text = decode_chart_bytes(&bytes, &AnalyzeOptions::default()).unwrap();
    assert!(text.starts_with("#TITLE"));
}

#[test]
fn invalid_utf8_is_a_decode_error_unless_a_fallback_is_set() {
    let dir = tempfile::tempdir().unwrap();
    let src = simfile("0=120", &[("dance-single", "Easy", "1000")]);
    // "テスト" in Shift_JIS
    let sjis = src.replace("Test Song", "\u{0}").into_bytes();
    let mut bytes = Vec::new();
    for b in sjis {
        if b == 0 {
            bytes.extend_from_slice(&[0x83, 0x65, 0x83, 0x58, 0x83, 0x67]);
        } else {
            bytes.push(b);
        }
    }
    let path = write_file(dir.path(), "sjis.sm", &bytes);

    let err = analyze_file(&path).unwrap_err();
    assert_eq!(err.kind, ChartErrorKind::Decode);
    assert_eq!(err.file.as_deref(), Some(path.display().to_string().as_str()));

    let options = AnalyzeOptions {
        fallback_encoding: Some("shift_jis".to_string()),
        ..AnalyzeOptions::default()
    };
    let records = analyze_file_with_options(&path, &options).unwrap();
    assert_eq!(records[0].song.title.as_deref(), Some("テスト"));
}

#[test]
fn bad_fallback_input_and_labels_are_rejected() {
    let options = AnalyzeOptions {
        fallback_encoding: Some("shift_jis".to_string()),
        ..AnalyzeOptions::default()
    };
    let err = decode_chart_bytes(b"#TITLE:\xFF;", &options).unwrap_err();
    assert_eq!(err.code, "E2002");

    let options = AnalyzeOptions {
        fallback_encoding: Some("not-an-encoding".to_string()),
        ..AnalyzeOptions::default()
    };
    let err = decode_chart_bytes(b"#TITLE:\xFF;", &options).unwrap_err();
    assert_eq!(err.code, "E2003");
    assert!(err.is_unexpected());
}

#[test]
fn missing_file_is_unexpected() {
    let dir = tempfile::tempdir().unwrap();
    let err = analyze_file(dir.path().join("missing.sm")).unwrap_err();
    assert_eq!(err.code, "E2001");
    assert!(err.file.is_some());
}

#[test]
fn options_load_from_json_with_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(dir.path(), "options.json", r#"{ "stream_note_threshold": 16 }"#);
    let options = AnalyzeOptions::from_json_file(&path).unwrap();
    assert_eq!(options.stream_note_threshold, 16);
    assert_eq!(options.invalid_crossover_threshold, 9);
    assert_eq!(options.fallback_encoding, None);

    let bad = write_file(dir.path(), "bad.json", "{ nope");
    assert_eq!(AnalyzeOptions::from_json_file(&bad).unwrap_err().code, "E2004");
}

#[test]
fn batch_tallies_failures_and_keeps_going() {
    let dir = tempfile::tempdir().unwrap();
    let good = simfile("0=120", &[("dance-single", "Easy", "1000\n0100\n0010\n0001")]);
    write_file(dir.path(), "a/good.sm", &good);
    write_file(dir.path(), "b/doubles.SM", simfile("0=120", &[("dance-double", "Easy", "10000000")]));
    write_file(dir.path(), "c/late.sm", simfile("1=120", &[("dance-single", "Easy", "1000")]));
    write_file(dir.path(), "c/broken.sm", simfile("0=120", &[("dance-single", "Easy", "10")]));
    write_file(dir.path(), "c/notes.txt", "ignored");

    let paths = discover_chart_files(dir.path()).unwrap();
    assert_eq!(paths.len(), 4);

    let mut marks = String::new();
    let report = run_batch(&paths, &BatchOptions::default(), |_, failure| {
        marks.push(progress_mark(failure))
    })
    .unwrap();
    assert_eq!(marks, ".0XX");
    assert_eq!(report.files_seen, 4);
    assert_eq!(report.succeeded(), 1);
    assert_eq!(report.records.len(), 1);
    assert_eq!(report.failure_count(ChartErrorKind::NoEligibleChart), 1);
    assert_eq!(report.failure_count(ChartErrorKind::MissingInitialTempo), 1);
    assert_eq!(report.failure_count(ChartErrorKind::Unexpected), 1);

    let table = MetadataTable::from_records(&report.records);
    assert_eq!(table.rows.len(), 1);
}

#[test]
fn strict_batch_reports_every_failure_before_stopping() {
    let dir = tempfile::tempdir().unwrap();
    let doubles = write_file(
        dir.path(),
        "a.sm",
        simfile("0=120", &[("dance-double", "Easy", "10000000")]),
    );
    let broken = write_file(dir.path(), "b.sm", simfile("0=120", &[("dance-single", "Easy", "10")]));
    let good = write_file(
        dir.path(),
        "c.sm",
        simfile("0=120", &[("dance-single", "Easy", "1000")]),
    );

    let options = BatchOptions {
        strict: true,
        ..BatchOptions::default()
    };
    let mut seen = Vec::new();
    let err = run_batch(&[doubles, broken, good], &options, |path, failure| {
        seen.push((path.to_path_buf(), failure.map(|e| e.code)))
    })
    .unwrap_err();
    assert_eq!(err.code, "E5001");

    let codes: Vec<Option<&str>> = seen.iter().map(|(_, code)| *code).collect();
    assert_eq!(codes, vec![Some("E4001"), Some("E5001")]);
    assert!(seen[1].0.ends_with("b.sm"));
}
