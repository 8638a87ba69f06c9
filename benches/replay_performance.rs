use criterion::{Criterion, black_box, criterion_group, criterion_main};
use gridcast::replay::{FrameStore, FrameUpdate, ReplayEvent};
use gridcast::telemetry::{
    DriverState, Frame, Rgb, TrackStatusInterval, events::ExtractionParams,
    extract_timeline_events,
};
use gridcast::track::{Point2D, derive_corridor};
use std::collections::HashMap;
use std::time::Duration;

const DRIVERS: [&str; 20] = [
    "VER", "PER", "HAM", "RUS", "LEC", "SAI", "NOR", "PIA", "ALO", "STR", "GAS", "OCO", "ALB",
    "SAR", "TSU", "RIC", "BOT", "ZHO", "MAG", "HUL",
];

fn create_sample_frame(frame_no: usize) -> Frame {
    let drivers = DRIVERS
        .iter()
        .enumerate()
        // One driver retires every 5000 frames
        .filter(|(i, _)| frame_no < (20 - i) * 5000)
        .map(|(i, code)| {
            (
                code.to_string(),
                DriverState {
                    x: (frame_no as f64 * 0.01 + i as f64).cos() * 1000.0,
                    y: (frame_no as f64 * 0.01 + i as f64).sin() * 1000.0,
                    speed: 250.0,
                    gear: 7,
                    throttle: 100.0,
                    lap: (frame_no / 2250) as u32 + 1,
                    position: i as u32 + 1,
                    ..Default::default()
                },
            )
        })
        .collect();

    Frame {
        t: frame_no as f64 * 0.04,
        drivers,
        weather: None,
    }
}

fn create_colors() -> HashMap<String, Rgb> {
    DRIVERS
        .iter()
        .map(|code| (code.to_string(), Rgb(200, 30, 30)))
        .collect()
}

fn bench_frame_store(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_store");
    let frames: Vec<Frame> = (0..60_000).map(create_sample_frame).collect();

    group.bench_function("downsample_full_race", |b| {
        b.iter(|| black_box(FrameStore::from_raw(frames.clone(), create_colors(), 50_000)));
    });

    group.finish();
}

fn bench_event_extraction(c: &mut Criterion) {
    let mut group = c.benchmark_group("event_extraction");
    let frames: Vec<Frame> = (0..50_000).map(create_sample_frame).collect();
    let statuses: Vec<TrackStatusInterval> = (0..40)
        .map(|i| TrackStatusInterval {
            status: ["2", "4", "6"][i % 3].to_string(),
            start_time: i as f64 * 45.0,
            end_time: Some(i as f64 * 45.0 + 20.0),
        })
        .collect();
    let params = ExtractionParams {
        sample_stride: 25,
        frames_per_second: 25.0,
        default_window_s: 10.0,
    };

    group.bench_function("extract_timeline_events", |b| {
        b.iter(|| black_box(extract_timeline_events(&frames, &statuses, &params)));
    });

    group.finish();
}

fn bench_rendering(c: &mut Criterion) {
    let mut group = c.benchmark_group("rendering");
    let store = FrameStore::from_raw(
        (0..100).map(create_sample_frame).collect(),
        create_colors(),
        50_000,
    );
    let frame = create_sample_frame(50);

    group.bench_function("render_frame", |b| {
        b.iter(|| black_box(FrameUpdate::render(50, &frame, &store)));
    });

    let event = ReplayEvent::Frame(Box::new(FrameUpdate::render(50, &frame, &store)));
    group.bench_function("serialize_frame_event", |b| {
        b.iter(|| black_box(serde_json::to_string(&event).unwrap()));
    });

    group.finish();
}

fn bench_geometry(c: &mut Criterion) {
    let mut group = c.benchmark_group("geometry");
    let centerline: Vec<Point2D> = (0..800)
        .map(|i| {
            let angle = i as f64 / 800.0 * std::f64::consts::TAU;
            Point2D::new(angle.cos() * 2000.0, angle.sin() * 1200.0)
        })
        .collect();

    group.bench_function("derive_corridor", |b| {
        b.iter(|| black_box(derive_corridor(&centerline, 200.0).unwrap()));
    });

    group.finish();
}

criterion_group! {
    name = benches;
    config = Criterion::default()
        .measurement_time(Duration::from_secs(10))
        .sample_size(50);
    targets = bench_frame_store, bench_event_extraction, bench_rendering, bench_geometry
}
criterion_main!(benches);
