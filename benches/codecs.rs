//! Codec benchmarks
//!
//! Measures lz4mod decompression and s3dc dequantization throughput over
//! synthetic payloads of realistic volume sizes.
//!
//! Run: cargo bench --bench codecs

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use bvp::codec::{lz4mod, s3dc};
use bvp::{ElementKind, Format};
use std::sync::Arc;

/// Encode `len` repeats of one byte: a single literal and one long match
fn repeating_stream(byte: u8, len: usize) -> Vec<u8> {
    assert!(len >= 16);
    let mut out = vec![0x1F, byte, 0x01, 0x00];
    // match length 15 plus escape continuation, output is 16 + sum
    let mut extra = len - 16;
    while extra >= 255 {
        out.push(255);
        extra -= 255;
    }
    out.push(extra as u8);
    out
}

/// Encode barely compressible data: runs of 14 literals glued by short
/// matches, so the decoder alternates between both copy paths
fn literal_heavy_stream(len: usize) -> Vec<u8> {
    let mut out = Vec::new();
    let mut produced = 0usize;
    let mut value = 0u8;
    while produced + 18 <= len {
        out.push(0xE4);
        for _ in 0..14 {
            out.push(value);
            value = value.wrapping_mul(31).wrapping_add(7);
        }
        out.extend([0x01, 0x00]);
        produced += 18;
    }
    // close with one final literal run
    let tail = (len - produced).min(14);
    out.push((tail as u8) << 4);
    out.extend(std::iter::repeat(value).take(tail));
    out
}

fn bench_lz4mod(c: &mut Criterion) {
    let mut group = c.benchmark_group("codecs/lz4mod");

    for &size in &[4 * 1024usize, 64 * 1024, 1024 * 1024] {
        let repeating = repeating_stream(0x5A, size);
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(
            BenchmarkId::new("repeating", size),
            &repeating,
            |b, input| {
                b.iter(|| lz4mod::decompress(input).unwrap());
            },
        );

        let literals = literal_heavy_stream(size);
        group.bench_with_input(
            BenchmarkId::new("literal_heavy", size),
            &literals,
            |b, input| {
                b.iter(|| lz4mod::decompress(input).unwrap());
            },
        );

        group.bench_with_input(
            BenchmarkId::new("size_prepass", size),
            &repeating,
            |b, input| {
                b.iter(|| lz4mod::decompressed_size(input).unwrap());
            },
        );
    }

    group.finish();
}

fn bench_s3dc(c: &mut Criterion) {
    let mut group = c.benchmark_group("codecs/s3dc");

    // 64^3 volume quantized at 4 bits over 4^3 microblocks
    let dimensions = vec![64i64, 64, 64];
    let format = Arc::new(
        Format::new("mono", 1, ElementKind::Unsigned, 1, vec![4, 4, 4]).with_index_bits(4),
    );
    let slices = 16 * 16 * 16;
    let slice_bytes = 32;

    let mut dense = Vec::with_capacity(slices * slice_bytes);
    let mut dense_ranges = Vec::with_capacity(slices * 2);
    for i in 0..slices {
        for j in 0..slice_bytes {
            dense.push((i + j) as u8 | 1);
        }
        dense_ranges.extend([10, 200]);
    }

    // every tenth microblock carries data, the rest hit the zero fast path
    let mut sparse = vec![0u8; slices * slice_bytes];
    let mut sparse_ranges = vec![0u8; slices * 2];
    for i in (0..slices).step_by(10) {
        sparse[i * slice_bytes..(i + 1) * slice_bytes].fill(0x73);
        sparse_ranges[i * 2] = 10;
        sparse_ranges[i * 2 + 1] = 200;
    }

    let voxels = 64u64 * 64 * 64;
    group.throughput(Throughput::Bytes(voxels));
    group.bench_with_input(
        BenchmarkId::new("dense", voxels),
        &(dense, dense_ranges),
        |b, (input, ranges)| {
            b.iter(|| s3dc::decode(input, ranges, &dimensions, &format).unwrap());
        },
    );
    group.bench_with_input(
        BenchmarkId::new("sparse", voxels),
        &(sparse, sparse_ranges),
        |b, (input, ranges)| {
            b.iter(|| s3dc::decode(input, ranges, &dimensions, &format).unwrap());
        },
    );

    group.finish();
}

criterion_group!(benches, bench_lz4mod, bench_s3dc);
criterion_main!(benches);
