//! Benchmarks for the demo byte stream and header parsing
//!
//! Run with: cargo bench --bench demo_stream
//!
//! Covers recording a run into a fresh stream, the rewind and re-record cycle
//! used by key frames, and opening a finished demo for playback.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;
use tick_demo::{
    parse_header, CompatibilityLevel, DemoOverrides, HeaderContext, SessionBuilder, Strictness,
    TickCommand,
};

fn command(i: usize) -> TickCommand {
    TickCommand {
        forward: 25 + (i % 25) as i8,
        angle_turn: (i % 64) as i16 * 32,
        ..TickCommand::EMPTY
    }
}

fn builder(level: CompatibilityLevel) -> SessionBuilder {
    SessionBuilder::new().with_overrides(DemoOverrides {
        complevel: Some(level),
        ..DemoOverrides::default()
    })
}

fn recorded_demo(level: CompatibilityLevel, ticks: usize) -> Vec<u8> {
    let mut session = builder(level).start_recording().unwrap_or_else(|err| panic!("{err}"));
    for i in 0..ticks {
        session.record(&command(i)).unwrap_or_else(|err| panic!("{err}"));
    }
    session.finalize()
}

fn bench_record(c: &mut Criterion) {
    let mut group = c.benchmark_group("Record");

    // One hour at 35 tics per second is 126000 ticks.
    for ticks in [350usize, 35_000, 126_000] {
        group.throughput(Throughput::Elements(ticks as u64));
        group.bench_with_input(BenchmarkId::new("mbf21", ticks), &ticks, |b, &ticks| {
            b.iter(|| recorded_demo(CompatibilityLevel::Mbf21, black_box(ticks)));
        });
    }

    group.finish();
}

fn bench_rewind(c: &mut Criterion) {
    let mut group = c.benchmark_group("Rewind and re-record");

    for back in [35usize, 350, 3500] {
        group.bench_with_input(BenchmarkId::new("ticks_back", back), &back, |b, &back| {
            let mut session = builder(CompatibilityLevel::Mbf21)
                .start_recording()
                .unwrap_or_else(|err| panic!("{err}"));
            for i in 0..10_000 {
                session.record(&command(i)).unwrap_or_else(|err| panic!("{err}"));
            }
            let bpt = session.stream().bytes_per_tic();
            b.iter(|| {
                let cursor = session.stream().cursor() - back * bpt;
                session
                    .stream_mut()
                    .set_cursor(black_box(cursor))
                    .unwrap_or_else(|err| panic!("{err}"));
                for i in 0..back {
                    session.record(&command(i)).unwrap_or_else(|err| panic!("{err}"));
                }
            });
        });
    }

    group.finish();
}

fn bench_open(c: &mut Criterion) {
    let mut group = c.benchmark_group("Open demo");
    let ctx = HeaderContext::default();

    for level in [
        CompatibilityLevel::Doom2_19,
        CompatibilityLevel::Boom202,
        CompatibilityLevel::PrBoom6,
        CompatibilityLevel::Mbf21,
    ] {
        let demo = recorded_demo(level, 35_000);
        group.bench_with_input(
            BenchmarkId::new("parse_header", level.as_u8()),
            &demo,
            |b, demo| {
                b.iter(|| parse_header(black_box(demo), &ctx, Strictness::Strict));
            },
        );
        group.bench_with_input(BenchmarkId::new("playback", level.as_u8()), &demo, |b, demo| {
            b.iter(|| {
                let mut playback = SessionBuilder::new()
                    .start_playback("bench", demo.clone(), Strictness::Strict)
                    .and_then(|outcome| outcome.into_result())
                    .unwrap_or_else(|err| panic!("{err}"));
                let mut count = 0usize;
                while let Ok(Some(_)) = playback.read_tick() {
                    count += 1;
                }
                count
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_record, bench_rewind, bench_open);
criterion_main!(benches);
