//! Performance benchmarks for command framing.
//!
//! Run benchmarks with:
//! ```sh
//! cargo bench --bench chunker_bench
//! ```

use cellar_protocol::{ControlCommand, chunk};
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;

/// Benchmark chunking commands of increasing length.
fn bench_chunk(c: &mut Criterion) {
    let mut group = c.benchmark_group("chunk");

    for byte_len in [10usize, 64, 512].iter() {
        group.throughput(Throughput::Bytes(*byte_len as u64));

        let input = "a5".repeat(*byte_len);

        group.bench_with_input(BenchmarkId::from_parameter(byte_len), &input, |b, input| {
            b.iter(|| black_box(chunk(black_box(input)).unwrap()));
        });
    }

    group.finish();
}

/// Benchmark validation plus framing as done before every write.
fn bench_validate_and_frame(c: &mut Criterion) {
    let mut group = c.benchmark_group("validate_and_frame");
    group.throughput(Throughput::Elements(1));

    let input = "0123456789abcdef".repeat(6);

    group.bench_function("control_command_frames", |b| {
        b.iter(|| {
            let command = ControlCommand::new(black_box(input.as_str())).unwrap();
            black_box(command.frames());
        });
    });

    group.finish();
}

criterion_group!(benches, bench_chunk, bench_validate_and_frame);
criterion_main!(benches);
