use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;

use slitedge::synthetic::{multi_slit_frame, two_slit_frame};
use slitedge::{SlitTraceConfig, SlitTracer, TraceFrame};

fn slit_tracing_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("slit_tracing");
    group.sample_size(20);

    let tracer = SlitTracer::new();
    let frame = TraceFrame::new(two_slit_frame().render());
    group.bench_function("two_slit_100x120", |b| {
        b.iter(|| tracer.trace(black_box(&frame), 1.0))
    });

    for count in [4, 12] {
        let frame = TraceFrame::new(multi_slit_frame(1024, 512, count).render());
        group.bench_with_input(BenchmarkId::new("multi_slit_1024x512", count), &frame, |b, frame| {
            b.iter(|| tracer.trace(black_box(frame), 0.2))
        });
    }

    let echelle = SlitTracer::from_config(SlitTraceConfig::echelle()).expect("valid preset");
    let frame = TraceFrame::new(multi_slit_frame(1024, 512, 8).render());
    group.bench_function("echelle_1024x512", |b| b.iter(|| echelle.trace(black_box(&frame), 0.2)));

    group.finish();
}

criterion_group!(benches, slit_tracing_benchmarks);
criterion_main!(benches);
