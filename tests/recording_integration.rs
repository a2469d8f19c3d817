//! Integration tests for recording sessions
//!
//! Covers record files written by a session and read back by the loader,
//! plus the aggregate summary file across several sessions.

mod common;

use common::assert_float_eq;
use common::builders::{recording_in, ConfigBuilder, ReadingEventBuilder};
use common::mock_helpers::{finite_link, FlakyWriter};
use common::wait_until;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tensile_lab::backend::MockLink;
use tensile_lab::config::ValueColumn;
use tensile_lab::pipeline::{AcquisitionPipeline, FnObserver, SharedCalibration};
use tensile_lab::session::{
    load_recorded_file, load_recorded_file_with_report, RecordingSession, SessionRecorder,
    SummaryLog,
};
use tensile_lab::types::ReadingEvent;

fn summary_rows(dir: &std::path::Path) -> Vec<String> {
    std::fs::read_to_string(dir.join("doe_summary.csv"))
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect()
}

#[test]
fn test_recorded_file_loads_back() {
    let dir = tempfile::tempdir().unwrap();
    let settings = recording_in(dir.path());
    let mut session = RecordingSession::begin("roundtrip", &settings).unwrap();

    let forces = [0.0, 1.25, -0.3333333333333333, 42.000001, 7.5];
    for (k, force) in forces.iter().enumerate() {
        let event = ReadingEventBuilder::new(*force)
            .sequence(k as u64)
            .elapsed(k as f64 * 0.01)
            .build();
        session.record(&event).unwrap();
    }
    let (_, path, rows, _) = session.finish().unwrap();
    assert_eq!(rows, forces.len() as u64);

    let readings = load_recorded_file(&path).unwrap();
    assert_eq!(readings.len(), forces.len());
    for (k, (reading, force)) in readings.iter().zip(forces.iter()).enumerate() {
        assert_float_eq(reading.elapsed_secs, k as f64 * 0.01, 1e-9);
        assert_float_eq(reading.force, *force, 1e-12);
    }
}

#[test]
fn test_raw_column_recording() {
    let dir = tempfile::tempdir().unwrap();
    let mut settings = recording_in(dir.path());
    settings.value_column = ValueColumn::Raw;

    let mut session = RecordingSession::begin("raw_run", &settings).unwrap();
    for raw in [2180, -15, 4360] {
        session
            .record(&ReadingEventBuilder::new(0.5).raw(raw).build())
            .unwrap();
    }
    let (_, path, _, _) = session.finish().unwrap();

    let content = std::fs::read_to_string(&path).unwrap();
    assert!(content.starts_with("Time_Sec,Raw_Force\n"));

    let loaded = load_recorded_file_with_report(&path).unwrap();
    assert_eq!(loaded.value_column, ValueColumn::Raw);
    assert_eq!(loaded.garbled_fields, 0);
    let values: Vec<f64> = loaded.readings.iter().map(|r| r.force).collect();
    assert_eq!(values, vec![2180.0, -15.0, 4360.0]);
}

#[test]
fn test_end_without_begin_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let mut recorder = SessionRecorder::new();

    assert!(recorder.end(3.0).unwrap().is_none());
    assert!(!dir.path().join("doe_summary.csv").exists());
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn test_summary_header_written_once() {
    let dir = tempfile::tempdir().unwrap();
    let settings = recording_in(dir.path());
    let mut recorder = SessionRecorder::new();

    for (label, peak) in [("first", 2.5), ("second", 10.25)] {
        recorder.begin(label, &settings).unwrap();
        recorder
            .record(&ReadingEventBuilder::new(peak).build(), peak)
            .unwrap();
        let summary = recorder.end(peak).unwrap().unwrap();
        assert_eq!(summary.label, label);
        assert_eq!(summary.rows, 1);
    }

    let rows = summary_rows(dir.path());
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0], "Filename,Peak_Force_Kg,Date_Time");
    assert!(rows[1].starts_with("first,2.50,"));
    assert!(rows[2].starts_with("second,10.25,"));
}

#[test]
fn test_begin_in_missing_directory_fails() {
    let dir = tempfile::tempdir().unwrap();
    let settings = recording_in(&dir.path().join("missing"));
    let mut recorder = SessionRecorder::new();

    assert!(recorder.begin("lost", &settings).is_err());
    assert!(!recorder.is_recording());
}

#[test]
fn test_peak_resets_between_sessions() {
    let dir = tempfile::tempdir().unwrap();
    let config = ConfigBuilder::new().window(1).build();
    let mut pipeline =
        AcquisitionPipeline::new(&config, SharedCalibration::new(config.calibration.factor));
    let settings = recording_in(dir.path());
    let (feeder, link) = MockLink::channel("mock0");
    pipeline.start(Box::new(link)).unwrap();

    pipeline.begin_recording("heavy", &settings).unwrap();
    feeder.send_sample(4360);
    assert!(wait_until(|| {
        pipeline.tick();
        pipeline.stats().rows_recorded == 1
    }));
    let heavy = pipeline.end_recording().unwrap().unwrap();

    pipeline.begin_recording("light", &settings).unwrap();
    assert_eq!(pipeline.peak(), 0.0);
    feeder.send_sample(2180);
    assert!(wait_until(|| {
        pipeline.tick();
        pipeline.stats().rows_recorded == 2
    }));
    let light = pipeline.end_recording().unwrap().unwrap();
    pipeline.stop();

    assert_float_eq(heavy.peak, 2.0, 1e-9);
    assert_float_eq(light.peak, 1.0, 1e-9);
    let rows = summary_rows(dir.path());
    assert!(rows[1].starts_with("heavy,2.00,"));
    assert!(rows[2].starts_with("light,1.00,"));
}

#[test]
fn test_session_from_live_stream() {
    let dir = tempfile::tempdir().unwrap();
    let config = ConfigBuilder::new().window(3).build();
    let mut pipeline =
        AcquisitionPipeline::new(&config, SharedCalibration::new(config.calibration.factor));

    // Recording begins before the reader starts, so every sample lands in it
    let path = pipeline
        .begin_recording("stream.csv", &recording_in(dir.path()))
        .unwrap();
    pipeline
        .start(Box::new(finite_link("mock0", &[2180, 2180, 4360])))
        .unwrap();
    assert!(wait_until(|| pipeline.tick().link_error.is_some()));
    pipeline.stop();
    let summary = pipeline.end_recording().unwrap().unwrap();

    assert_eq!(path, dir.path().join("stream.csv"));
    assert_eq!(summary.rows, 3);
    let readings = load_recorded_file(&path).unwrap();
    let forces: Vec<String> = readings.iter().map(|r| format!("{:.2}", r.force)).collect();
    assert_eq!(forces, vec!["1.00", "1.00", "1.33"]);
    assert!(readings.windows(2).all(|w| w[0].elapsed_secs <= w[1].elapsed_secs));
}

fn observed(pipeline: &mut AcquisitionPipeline) -> Arc<Mutex<Vec<ReadingEvent>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    pipeline.add_observer(Box::new(FnObserver(move |e: &ReadingEvent| {
        sink.lock().unwrap().push(*e)
    })));
    seen
}

#[test]
fn test_reloaded_session_matches_observed_readings() {
    let dir = tempfile::tempdir().unwrap();
    let config = ConfigBuilder::new().build();
    let mut pipeline =
        AcquisitionPipeline::new(&config, SharedCalibration::new(config.calibration.factor));
    let seen = observed(&mut pipeline);
    let (feeder, link) = MockLink::channel("mock0");
    pipeline.start(Box::new(link)).unwrap();

    // The stream runs for a while before the session begins
    std::thread::sleep(Duration::from_millis(500));
    let path = pipeline
        .begin_recording("late_start", &recording_in(dir.path()))
        .unwrap();
    for value in [2180, 4360, 6540] {
        feeder.send_sample(value);
    }
    assert!(wait_until(|| {
        pipeline.tick();
        pipeline.stats().rows_recorded == 3
    }));
    pipeline.stop();
    pipeline.end_recording().unwrap().unwrap();

    let seen = seen.lock().unwrap();
    let reloaded = load_recorded_file(&path).unwrap();
    assert_eq!(reloaded.len(), seen.len());
    assert!(seen[0].reading.elapsed_secs < 0.4);
    for (observed, loaded) in seen.iter().zip(reloaded.iter()) {
        assert_float_eq(loaded.elapsed_secs, observed.reading.elapsed_secs, 1e-3);
        assert_eq!(loaded.force, observed.reading.force);
    }
}

#[test]
fn test_write_failure_mid_session() {
    let dir = tempfile::tempdir().unwrap();
    let config = ConfigBuilder::new().window(1).build();
    let mut pipeline =
        AcquisitionPipeline::new(&config, SharedCalibration::new(config.calibration.factor));
    let seen = observed(&mut pipeline);
    let (feeder, link) = MockLink::channel("mock0");
    pipeline.start(Box::new(link)).unwrap();

    let writer = FlakyWriter::default();
    let session = RecordingSession::with_writer(
        "flaky",
        dir.path().join("flaky.csv"),
        Box::new(writer.clone()),
        ValueColumn::Force,
    )
    .unwrap();
    pipeline
        .begin_session(session, SummaryLog::new(dir.path().join("doe_summary.csv")))
        .unwrap();

    feeder.send_sample(2180);
    assert!(wait_until(|| {
        pipeline.tick();
        pipeline.stats().rows_recorded == 1
    }));

    writer.fail_writes();
    feeder.send_sample(4360);
    let mut recording_error = None;
    assert!(wait_until(|| {
        let outcome = pipeline.tick();
        recording_error = recording_error.take().or(outcome.recording_error);
        recording_error.is_some()
    }));
    let err = recording_error.unwrap();
    assert!(err.to_string().contains("flaky.csv"));
    assert!(!pipeline.is_recording());
    assert!(pipeline.end_recording().unwrap().is_none());

    let rows = summary_rows(dir.path());
    assert_eq!(rows.len(), 2);
    assert!(rows[1].starts_with("flaky,2.00,"));
    let first_elapsed = seen.lock().unwrap()[0].reading.elapsed_secs;
    assert_eq!(
        writer.text(),
        format!("Time_Sec,Force_Kg\n{:.3},1\n", first_elapsed)
    );

    // Streaming carries on without the session
    feeder.send_sample(6540);
    assert!(wait_until(|| {
        pipeline.tick();
        seen.lock().unwrap().len() == 3
    }));
    pipeline.stop();
    assert!(!pipeline.is_running());
    assert_eq!(pipeline.stats().rows_recorded, 1);
    assert_eq!(pipeline.stats().readings_published, 3);
}
