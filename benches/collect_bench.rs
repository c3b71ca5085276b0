//! Benchmarks for ceph-collect
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn benchmark_normalize_path(c: &mut Criterion) {
    use ceph_collect::artifact::normalize_path;

    c.bench_function("normalize_path", |b| {
        b.iter(|| {
            let path = normalize_path(black_box("/osd//12/journal///smartctl/"));
            black_box(path);
        })
    });
}

fn benchmark_path_filter(c: &mut Criterion) {
    use ceph_collect::filter::PathFilter;

    let filter = PathFilter::new([r"smartctl", r"osd/\d+/journal", r"^perf_stats/", r"hdparm$"])
        .unwrap();
    let paths = [
        "master/status",
        "hosts/ceph-node-01/lshw",
        "osd/12/journal/stats",
        "osd/12/data/smartctl",
        "perf_stats/ceph-node-01/1700000000-0-disk",
    ];

    c.bench_function("path_filter_allowed", |b| {
        b.iter(|| {
            for path in &paths {
                black_box(filter.allowed(black_box(path)));
            }
        })
    });
}

criterion_group!(benches, benchmark_normalize_path, benchmark_path_filter);
criterion_main!(benches);
