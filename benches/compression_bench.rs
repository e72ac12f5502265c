use criterion::{black_box, criterion_group, criterion_main, Criterion};
use godb::codec::{get_codec, CodecTag};

fn bench_compression(c: &mut Criterion) {
    let data = vec![0u8; 1024 * 1024];

    c.bench_function("zstd_compress_1mb", |b| {
        let mut codec = get_codec(CodecTag::Zstd);
        codec.set_level(3);
        b.iter(|| {
            let mut scratch = Vec::new();
            let mut sink = Vec::new();
            codec.compress(black_box(&data), &mut scratch, &mut sink).unwrap();
        });
    });

    c.bench_function("lz4_compress_1mb", |b| {
        let mut codec = get_codec(CodecTag::Lz4);
        b.iter(|| {
            let mut scratch = Vec::new();
            let mut sink = Vec::new();
            codec.compress(black_box(&data), &mut scratch, &mut sink).unwrap();
        });
    });
}

criterion_group!(benches, bench_compression);
criterion_main!(benches);
