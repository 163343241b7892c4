use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use powertrain::validation::Metrics;

fn series(n: usize) -> (Vec<f64>, Vec<f64>) {
    let y_true: Vec<f64> = (0..n).map(|i| 0.1 + i as f64 * 0.01).collect();
    let y_pred: Vec<f64> = y_true.iter().map(|t| t * 1.05).collect();
    (y_true, y_pred)
}

fn bench_link_metrics(c: &mut Criterion) {
    for size in [100, 10_000, 100_000] {
        let (y_true, y_pred) = series(size);

        c.bench_with_input(BenchmarkId::new("mae", size), &size, |b, _| {
            b.iter(|| black_box(Metrics::mae(black_box(&y_true), black_box(&y_pred))));
        });
        c.bench_with_input(BenchmarkId::new("mape", size), &size, |b, _| {
            b.iter(|| black_box(Metrics::mape(black_box(&y_true), black_box(&y_pred))));
        });
        c.bench_with_input(BenchmarkId::new("weighted_rpd", size), &size, |b, _| {
            b.iter(|| black_box(Metrics::weighted_rpd(black_box(&y_true), black_box(&y_pred))));
        });
    }
}

criterion_group!(benches, bench_link_metrics);
criterion_main!(benches);
