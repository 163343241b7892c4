//! Compares the explicit-bin, random forest and NGBoost backends on synthetic
//! link data.
//!
//! Usage:
//!   cargo run --release --package benchmarks -- [n_links]
//!
//! Set `RUST_LOG=info` to see the training pipeline's own log output.

use benchmarks::{time_fn, BenchmarkStats, SyntheticLinks, Timer};
use log::info;
use powertrain::prelude::*;

const PREDICT_REPEATS: usize = 20;

fn report(name: &str, method: PredictMethod, model: &Model, train_ms: f64, links: &LinkTable) {
    let mut times = Vec::with_capacity(PREDICT_REPEATS);
    for _ in 0..PREDICT_REPEATS {
        let (_, elapsed) = time_fn(|| model.predict(links));
        times.push(elapsed.as_secs_f64() * 1000.0);
    }

    println!("{name} ({method})");
    println!("  train:   {train_ms:>10.2} ms");
    if let Some(stats) = BenchmarkStats::from_times(times) {
        println!(
            "  predict: {:>10.2} ms median ({:.2} .. {:.2}) for {} links",
            stats.median_ms,
            stats.min_ms,
            stats.max_ms,
            links.n_rows()
        );
    }
    if let Some(errors) = model.errors() {
        for (target, metrics) in errors {
            for (metric, value) in metrics {
                println!("  {target}.{metric}: {value:.4}");
            }
        }
    }
    println!();
}

fn run<R: Regressor>(
    name: &str,
    regressor: R,
    method: PredictMethod,
    links: &LinkTable,
    total: &mut Timer,
) -> Result<()> {
    let config = SyntheticLinks::config(method)?;
    let trainer = Trainer::new(regressor);

    total.start();
    let (model, elapsed) = time_fn(|| trainer.train(links, &config));
    total.stop();

    report(name, method, &model?, elapsed.as_secs_f64() * 1000.0, links);
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_default_env().init();

    let n_links: usize = std::env::args()
        .nth(1)
        .and_then(|arg| arg.parse().ok())
        .unwrap_or(5_000);
    let data = SyntheticLinks::generate(n_links, 7);
    info!("generated {n_links} synthetic links");

    println!("powertrain backend comparison, {n_links} links");
    println!();

    let mut total = Timer::new();
    for method in [PredictMethod::Rate, PredictMethod::Raw] {
        run("explicit_bin", ExplicitBin::new(), method, data.table(), &mut total)?;
        run(
            "random_forest",
            RandomForest::new().n_estimators(50),
            method,
            data.table(),
            &mut total,
        )?;
        run(
            "ngboost",
            NGBoost::new().verbose(false),
            method,
            data.table(),
            &mut total,
        )?;
    }

    println!("total training time: {:.2} ms", total.total_ms());
    Ok(())
}
