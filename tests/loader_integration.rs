// Integration tests for loading recorded sessions from JSON Lines files
//
// Recordings are written to a temp dir, read back through the producer, loaded
// into a session and replayed to completion.

use std::{fs::File, io::Write, path::Path, time::Duration};

use gridcast::{
    JsonlTelemetryProducer, ReplayConfig, ReplayError, ReplayEvent, ReplaySession, SessionKey,
    replay::{load_qualifying_lap, load_race},
    telemetry::{
        DriverState, EventKind, Frame, LapTrace, Rgb, SessionMeta, TelemetryRecord,
        TrackStatusInterval,
    },
    writer,
};
use tempfile::TempDir;

fn session_meta(session_type: &str) -> SessionMeta {
    SessionMeta {
        event_name: "Recorded Grand Prix".to_string(),
        location: "Monza".to_string(),
        country: "Italy".to_string(),
        year: 2023,
        round: 14,
        session_type: session_type.to_string(),
        total_laps: 51,
    }
}

fn oval_lap(driver: &str, segment: &str, samples: usize) -> LapTrace {
    let points: Vec<(f64, f64)> = (0..samples)
        .map(|i| {
            let angle = i as f64 / samples as f64 * std::f64::consts::TAU;
            (angle.cos() * 1500.0, angle.sin() * 800.0)
        })
        .collect();
    LapTrace {
        driver: driver.to_string(),
        segment: Some(segment.to_string()),
        t: (0..samples).map(|i| i as f64 * 0.5).collect(),
        x: points.iter().map(|p| p.0).collect(),
        y: points.iter().map(|p| p.1).collect(),
        speed: vec![280.0; samples],
        gear: vec![7; samples],
        throttle: vec![100.0; samples],
        brake: vec![0.0; samples],
        drs: vec![0; samples],
    }
}

/// 300 race frames; SAI retires after frame 149, a VSC runs from 2s to 4s
fn race_records() -> Vec<TelemetryRecord> {
    let mut records = vec![
        TelemetryRecord::Session(session_meta("R")),
        TelemetryRecord::DriverColor {
            code: "SAI".to_string(),
            color: Rgb(232, 0, 32),
        },
    ];
    records.extend((0..300).map(|i| {
        let mut frame = Frame {
            t: i as f64 * 0.04,
            ..Default::default()
        };
        for code in ["SAI", "VER"] {
            if code == "SAI" && i >= 150 {
                continue;
            }
            frame.drivers.insert(
                code.to_string(),
                DriverState {
                    lap: 7,
                    ..Default::default()
                },
            );
        }
        TelemetryRecord::Frame(Box::new(frame))
    }));
    records.push(TelemetryRecord::TrackStatus(TrackStatusInterval {
        status: "6".to_string(),
        start_time: 2.0,
        end_time: Some(4.0),
    }));
    records.push(TelemetryRecord::Session(session_meta("Q")));
    records.push(TelemetryRecord::DriverColor {
        code: "VER".to_string(),
        color: Rgb(54, 113, 198),
    });
    records.push(TelemetryRecord::QualifyingLap(oval_lap("VER", "Q3", 200)));
    records.push(TelemetryRecord::QualifyingLap(oval_lap("SAI", "Q1", 180)));
    records
}

fn write_recording(path: &Path, records: &[TelemetryRecord]) {
    let mut file = File::create(path).unwrap();
    for record in records {
        writeln!(file, "{}", serde_json::to_string(record).unwrap()).unwrap();
    }
}

#[test]
fn test_load_race_from_recording() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("monza.jsonl");
    write_recording(&path, &race_records());

    let mut producer = JsonlTelemetryProducer::from_file(&path).unwrap();
    let replay =
        load_race(&mut producer, &SessionKey::race(2023, 14), &ReplayConfig::default()).unwrap();

    assert_eq!(replay.store.len(), 300);
    assert_eq!(replay.meta.location, "Monza");

    let geometry = replay.geometry.expect("track outline from the Q3 lap");
    assert_eq!(geometry.len(), 200);
    assert_eq!(geometry.inner.len(), 200);
    assert_eq!(geometry.outer.len(), 200);

    assert_eq!(replay.events.len(), 2);
    assert_eq!(replay.events[0].kind, EventKind::Retirement);
    assert_eq!(replay.events[0].label, "SAI");
    assert_eq!(replay.events[0].start_frame, 150);
    assert_eq!(replay.events[0].lap, Some(7));
    assert_eq!(replay.events[1].kind, EventKind::VirtualSafetyCar);
    assert_eq!(replay.events[1].start_frame, 50);
    assert_eq!(replay.events[1].end_frame, Some(100));
}

#[test]
fn test_missing_session_leaves_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("monza.jsonl");
    write_recording(&path, &race_records());

    let mut producer = JsonlTelemetryProducer::from_file(&path).unwrap();
    let result = load_race(
        &mut producer,
        &SessionKey::new(2023, 14, "S"),
        &ReplayConfig::default(),
    );
    assert!(matches!(result, Err(ReplayError::SessionNotFound { .. })));
}

#[test]
fn test_qualifying_lap_replay_from_recording() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("monza.jsonl");
    write_recording(&path, &race_records());

    let mut producer = JsonlTelemetryProducer::from_file(&path).unwrap();
    let replay = load_qualifying_lap(
        &mut producer,
        &SessionKey::qualifying(2023, 14),
        "SAI",
        "Q3",
        &ReplayConfig::default(),
    )
    .unwrap();

    assert_eq!(replay.meta.event_name, "Recorded Grand Prix - SAI Q1");
    assert_eq!(replay.store.len(), 180);
    assert_eq!(replay.geometry.map(|g| g.len()), Some(180));
}

#[tokio::test(start_paused = true)]
async fn test_recorded_race_replays_to_the_end() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("monza.jsonl");
    let output = dir.path().join("events.jsonl");
    write_recording(&path, &race_records());

    let mut producer = JsonlTelemetryProducer::from_file(&path).unwrap();
    let replay =
        load_race(&mut producer, &SessionKey::race(2023, 14), &ReplayConfig::default()).unwrap();

    let session = ReplaySession::new(ReplayConfig::default());
    session.load(replay).await;
    let viewer = session.connect().await;
    session.set_speed(4.0).await.unwrap();

    let out = File::create(&output).unwrap();
    let writer_thread = std::thread::spawn(move || writer::write_events(viewer, out));
    session.play().await.unwrap();

    tokio::time::sleep(Duration::from_secs(5)).await;
    let written = writer_thread.join().unwrap().unwrap();
    // Initial state, 60 frames and the end marker
    assert_eq!(written, 62);

    let events: Vec<ReplayEvent> = serde_jsonlines::json_lines(&output)
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert!(matches!(events[0], ReplayEvent::InitialState(_)));
    match &events[1] {
        ReplayEvent::Frame(update) => {
            assert_eq!(update.frame, 0);
            assert_eq!(update.drivers.len(), 2);
            let sai = update.drivers.iter().find(|d| d.code == "SAI").unwrap();
            assert_eq!(sai.color, "#e80020");
        }
        other => panic!("Expected first frame, got {:?}", other),
    }
    assert_eq!(events.last(), Some(&ReplayEvent::EndOfReplay));
    assert!(!session.state().await.is_playing);
}
