//! 解码性能基准测试.
//!
//! 覆盖页面同步、完整流解码与 IMDCT 等核心路径, 输入为合成流.

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use oggvorbis::codec::decoders::vorbis::imdct::Imdct;
use oggvorbis::core::OvError;
use oggvorbis::format::PageDemuxer;
use oggvorbis::{DecoderConfig, StreamDecoder};

#[path = "../tests/common/mod.rs"]
mod common;

use common::{StreamSpec, build_stream};

fn long_spec() -> StreamSpec {
    StreamSpec {
        blocks: (0..256).map(|i| i % 8 != 0).collect(),
        energetic_partitions: 32,
        ..StreamSpec::default()
    }
}

fn bench_page_sync(c: &mut Criterion) {
    let bytes = build_stream(&StreamSpec {
        page_size: 256,
        ..long_spec()
    });
    c.bench_function("ogg_page_sync", |b| {
        b.iter(|| {
            let mut demuxer = PageDemuxer::new();
            demuxer.feed(black_box(&bytes));
            let mut pages = 0;
            while demuxer.next_page().is_ok() {
                pages += 1;
            }
            pages
        });
    });
}

fn bench_stream_decode(c: &mut Criterion) {
    let bytes = build_stream(&long_spec());
    c.bench_function("vorbis_stream_decode_stereo", |b| {
        b.iter(|| {
            let mut decoder = StreamDecoder::new(DecoderConfig::default());
            decoder.feed(black_box(&bytes));
            decoder.finish();
            let mut samples = 0u64;
            loop {
                match decoder.next_frame() {
                    Ok(frame) => samples += u64::from(frame.nb_samples),
                    Err(OvError::EndOfStream) => break,
                    Err(_) => {}
                }
            }
            samples
        });
    });
}

fn bench_imdct(c: &mut Criterion) {
    let mut imdct = Imdct::new(2048);
    let spectrum: Vec<f32> = (0..1024).map(|i| ((i * 7) % 13) as f32 / 13.0 - 0.5).collect();
    let mut out = vec![0.0f32; 2048];
    c.bench_function("imdct_2048", |b| {
        b.iter(|| imdct.inverse(black_box(&spectrum), &mut out));
    });
}

criterion_group!(benches, bench_page_sync, bench_stream_decode, bench_imdct);
criterion_main!(benches);
