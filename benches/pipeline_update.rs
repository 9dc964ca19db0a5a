//! Benchmarks for pipeline updates and extent translation
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use vispipe::pipeline::nodes::{ExtractVoiNode, ImageToPointsNode, WaveletSourceNode};
use vispipe::pipeline::{
    compute_local_extent_with_ghosts, BuiltinNode, Extent, MemorySink, NodeId,
    ParallelPieceWriter, Pipeline, SplitMode,
};
use vispipe::ExecutiveConfig;

fn cube(n: i32) -> Extent {
    Extent::new(0, n - 1, 0, n - 1, 0, n - 1)
}

/// wavelet -> voi chain of `depth` filters
fn chain(whole: Extent, depth: usize) -> (Pipeline, NodeId) {
    let mut pipeline = Pipeline::default();
    let mut last = pipeline.add_node(BuiltinNode::WaveletSource(
        WaveletSourceNode::new().with_whole_extent(whole),
    ));
    for _ in 0..depth {
        let voi = pipeline.add_node(BuiltinNode::ExtractVoi(ExtractVoiNode::new(whole)));
        pipeline.connect_nodes(last, voi).unwrap();
        last = voi;
    }
    (pipeline, last)
}

fn bench_translation(c: &mut Criterion) {
    let mut group = c.benchmark_group("extent_translation");
    let whole = cube(256);

    for mode in SplitMode::all() {
        group.bench_with_input(BenchmarkId::new("1024_pieces", mode), mode, |b, &mode| {
            b.iter(|| {
                for piece in 0..1024 {
                    black_box(
                        compute_local_extent_with_ghosts(&whole, 1024, piece, 1, mode).unwrap(),
                    );
                }
            });
        });
    }

    group.finish();
}

fn bench_cached_update(c: &mut Criterion) {
    let mut group = c.benchmark_group("cached_update");

    for depth in [1usize, 10, 50].iter() {
        let (mut pipeline, target) = chain(cube(8), *depth);
        pipeline.update(target).unwrap();

        group.bench_with_input(BenchmarkId::new("reuse", depth), depth, |b, _| {
            b.iter(|| black_box(pipeline.update(target).unwrap()));
        });
    }

    group.finish();
}

fn bench_piece_streaming(c: &mut Criterion) {
    let mut group = c.benchmark_group("piece_streaming");
    group.sample_size(20);

    for size in [16, 32].iter() {
        let whole = cube(*size);
        group.throughput(Throughput::Elements(whole.num_points() as u64));
        group.bench_with_input(BenchmarkId::new("write_8_pieces", size), &whole, |b, &whole| {
            b.iter(|| {
                let mut pipeline = Pipeline::new(ExecutiveConfig::default().with_split_mode(SplitMode::ZSlab));
                let source = pipeline.add_node(BuiltinNode::WaveletSource(
                    WaveletSourceNode::new().with_whole_extent(whole),
                ));
                let points = pipeline.add_node(BuiltinNode::ImageToPoints(ImageToPointsNode::new()));
                pipeline.connect_nodes(source, points).unwrap();
                let mut sink = MemorySink::new();
                let summary = ParallelPieceWriter::all(8)
                    .unwrap()
                    .write(&mut pipeline, points, &mut sink)
                    .unwrap();
                black_box(summary.total_points())
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_translation,
    bench_cached_update,
    bench_piece_streaming,
);

criterion_main!(benches);
