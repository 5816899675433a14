use bsc_service::{compress_slice, decompress_slice, Coder, CompressOptions, DecompressOptions};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn text(len: usize) -> Vec<u8> {
    let words = ["suffix", "array", "rank", "bucket", "run", "the", "a", "block"];
    let mut rng = StdRng::seed_from_u64(1);
    let mut out = Vec::with_capacity(len + 16);
    while out.len() < len {
        out.extend_from_slice(words[rng.gen_range(0..words.len())].as_bytes());
        out.push(b' ');
    }
    out.truncate(len);
    out
}

fn bench_compress(c: &mut Criterion) {
    let data = text(1 << 20);
    let mut group = c.benchmark_group("compress");
    group.throughput(Throughput::Bytes(data.len() as u64));
    group.sample_size(10);
    for coder in Coder::ALL {
        let opts = CompressOptions::with_coder(coder);
        group.bench_with_input(BenchmarkId::from_parameter(coder.level()), &opts, |b, opts| {
            b.iter(|| compress_slice(black_box(&data), opts).unwrap())
        });
    }
    group.finish();
}

fn bench_decompress(c: &mut Criterion) {
    let data = text(1 << 20);
    let mut group = c.benchmark_group("decompress");
    group.throughput(Throughput::Bytes(data.len() as u64));
    group.sample_size(10);
    for coder in Coder::ALL {
        let container = compress_slice(&data, &CompressOptions::with_coder(coder)).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(coder.level()), &container, |b, container| {
            b.iter(|| decompress_slice(black_box(container), &DecompressOptions::default()).unwrap())
        });
    }
    group.finish();
}

criterion_group!(benches, bench_compress, bench_decompress);
criterion_main!(benches);
