//! Benchmarks for the sample processing hot path
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::io::Cursor;
use tensile_lab::backend::framer::LineFramer;
use tensile_lab::pipeline::{convert, parse_sample, CalibrationState, PeakTracker, SmoothingFilter};
use tensile_lab::types::Reading;

fn sample_lines(count: usize) -> Vec<String> {
    (0..count)
        .map(|i| format!("Force: {}", (i as i64 * 37) % 9000 - 4500))
        .collect()
}

fn bench_sample_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("sample_parsing");
    let lines = sample_lines(1000);

    group.throughput(Throughput::Elements(lines.len() as u64));
    group.bench_function("valid", |b| {
        b.iter(|| {
            for line in &lines {
                let _ = black_box(parse_sample(black_box(line)));
            }
        });
    });

    let noise = ["Forcex:abc", "Force:", "HX711 ready", "Force: 12.5"];
    group.throughput(Throughput::Elements(noise.len() as u64));
    group.bench_function("malformed", |b| {
        b.iter(|| {
            for line in &noise {
                let _ = black_box(parse_sample(black_box(line)));
            }
        });
    });

    group.finish();
}

fn bench_smoothing(c: &mut Criterion) {
    let mut group = c.benchmark_group("smoothing_filter");

    for window in [5, 10, 50].iter() {
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::new("push", window), window, |b, &window| {
            let mut filter = SmoothingFilter::new(window);
            let mut i = 0i64;
            b.iter(|| {
                let smoothed = filter.push(black_box(i % 4096));
                i = i.wrapping_add(1);
                smoothed
            });
        });
    }

    group.finish();
}

fn bench_line_to_reading(c: &mut Criterion) {
    let mut group = c.benchmark_group("line_to_reading");

    for size in [1000, 10_000].iter() {
        let mut bytes = Vec::new();
        for line in sample_lines(*size) {
            bytes.extend_from_slice(line.as_bytes());
            bytes.extend_from_slice(b"\r\n");
        }

        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::new("frame_parse_convert", size), &bytes, |b, bytes| {
            let state = CalibrationState::new(2180.0);
            b.iter(|| {
                let mut framer = LineFramer::new(Cursor::new(bytes.as_slice()), 256);
                let mut filter = SmoothingFilter::new(10);
                let mut peak = PeakTracker::new();
                let mut readings = Vec::with_capacity(*size);
                loop {
                    let line = match framer.next_line() {
                        Ok(Some(line)) => line,
                        Ok(None) => continue,
                        // End of input
                        Err(_) => break,
                    };
                    if let Ok(raw) = parse_sample(&line) {
                        let force = convert(filter.push(raw), &state);
                        peak.update(force);
                        readings.push(Reading::new(readings.len() as f64 * 0.01, force));
                    }
                }
                black_box((readings, peak.peak()))
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_sample_parsing,
    bench_smoothing,
    bench_line_to_reading,
);

criterion_main!(benches);
