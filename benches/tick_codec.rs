//! Benchmarks for tick record encoding and decoding
//!
//! Run with: cargo bench --bench tick_codec
//!
//! Every recorded or replayed tick goes through the codec once per player, so
//! these cover each record layout with a realistic command mix.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;
use tick_demo::__internal::{ByteReader, ByteWriter};
use tick_demo::{Era, TicFormat, TickCodec, TickCommand};

/// Walking, turning and occasionally firing.
fn play_commands(ticks: usize) -> Vec<TickCommand> {
    (0..ticks)
        .map(|i| TickCommand {
            forward: if i % 4 == 3 { 0 } else { 50 },
            side: if i % 11 == 5 { -40 } else { 0 },
            angle_turn: ((i as i32 * 640) % 4096 - 2048) as i16,
            buttons: u8::from(i % 7 == 0),
            ..TickCommand::EMPTY
        })
        .collect()
}

fn layouts() -> Vec<(&'static str, TickCodec)> {
    vec![
        ("vanilla", TickCodec::new(Era::Vanilla, TicFormat::default())),
        (
            "longtics",
            TickCodec::new(
                Era::Mbf21,
                TicFormat {
                    longtics: true,
                    ..TicFormat::default()
                },
            ),
        ),
        ("tasdoom", TickCodec::new(Era::TasDoom, TicFormat::default())),
        (
            "raven",
            TickCodec::new(
                Era::Raven,
                TicFormat {
                    raven: true,
                    ..TicFormat::default()
                },
            ),
        ),
        (
            "extended",
            TickCodec::new(
                Era::Mbf21,
                TicFormat {
                    longtics: true,
                    extended: true,
                    ..TicFormat::default()
                },
            ),
        ),
    ]
}

fn bench_encode(c: &mut Criterion) {
    let commands = play_commands(1024);
    let mut group = c.benchmark_group("Tick encode");
    group.throughput(Throughput::Elements(commands.len() as u64));

    for (name, codec) in layouts() {
        group.bench_with_input(BenchmarkId::new("layout", name), &codec, |b, codec| {
            b.iter(|| {
                let mut out = ByteWriter::new();
                for cmd in &commands {
                    codec.encode(black_box(cmd), &mut out);
                }
                out.into_inner()
            });
        });
    }

    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let commands = play_commands(1024);
    let mut group = c.benchmark_group("Tick decode");
    group.throughput(Throughput::Elements(commands.len() as u64));

    for (name, codec) in layouts() {
        let mut out = ByteWriter::new();
        for cmd in &commands {
            codec.encode(cmd, &mut out);
        }
        let encoded = out.into_inner();

        group.bench_with_input(BenchmarkId::new("layout", name), &encoded, |b, encoded| {
            b.iter(|| {
                let mut reader = ByteReader::new(black_box(encoded.as_slice()));
                let mut count = 0usize;
                while codec.decode(&mut reader).is_some() {
                    count += 1;
                }
                count
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_encode, bench_decode);
criterion_main!(benches);
