//! End-to-end workflow: train a vehicle energy model, persist it, apply it.
//!
//! This example demonstrates:
//! - Loading link-level driving data from CSV (or synthesizing it)
//! - Declaring features, distance and energy targets with a `FeaturePack`
//! - Training an NGBoost model and inspecting its held-out errors
//! - Saving the model as JSON and loading it back
//! - Predicting per-link energy and the per-row predictive distribution
//!
//! Run with: cargo run --example train_link_model [links.csv]
//!
//! A CSV must have a `link_id` column plus numeric `speed`, `grade`, `miles`
//! and `kwh` columns. Set `RUST_LOG=debug` to follow boosting progress.

use ndarray::Array2;
use powertrain::estimator::FittedEstimator;
use powertrain::prelude::*;
use std::error::Error;

fn synthetic_links(n: usize) -> Result<LinkTable> {
    let speed: Vec<f64> = (0..n).map(|i| 5.0 + (i * 37 % 75) as f64).collect();
    let grade: Vec<f64> = (0..n).map(|i| ((i * 13 % 11) as f64 - 5.0) / 100.0).collect();
    let miles: Vec<f64> = (0..n).map(|i| 0.05 + (i * 7 % 20) as f64 / 10.0).collect();
    let kwh = speed
        .iter()
        .zip(&grade)
        .zip(&miles)
        .map(|((s, g), d)| d * (0.18 + 0.00008 * (s - 40.0).powi(2) + 2.0 * g).max(0.02))
        .collect();

    LinkTable::from_columns(vec![
        ("speed", speed),
        ("grade", grade),
        ("miles", miles),
        ("kwh", kwh),
    ])
}

fn main() -> std::result::Result<(), Box<dyn Error>> {
    env_logger::Builder::from_default_env().init();

    println!("=== Link Energy Model ===\n");

    // 1. Load or synthesize training data
    let links = match std::env::args().nth(1) {
        Some(path) => LinkTable::from_csv_path(&path, Some("link_id"))?,
        None => synthetic_links(2_000)?,
    };
    println!("Loaded {} links with columns {:?}", links.n_rows(), links.column_names());

    // 2. Describe the model
    let pack = FeaturePack::new(
        vec![
            DataColumn::new("speed", "mph"),
            DataColumn::new("grade", "decimal"),
        ],
        DataColumn::new("miles", "miles"),
        vec![DataColumn::new("kwh", "kilowatt_hour")],
    )?;
    let config = ModelConfig::builder("2016 compact BEV", PowertrainType::Bev, pack)
        .energy_rate_limits(0.0, 2.0)
        .build()?;

    // 3. Train
    let trainer = Trainer::new(NGBoost::new().n_estimators(200).learning_rate(0.05));
    let prepared = trainer.prepare(&links, &config)?;
    println!(
        "Range filter dropped {:?}; {} train / {} test links",
        prepared.filtered_counts,
        prepared.train.n_rows(),
        prepared.test.n_rows()
    );
    let model = trainer.train(&links, &config)?;

    if let Some(errors) = model.errors() {
        println!("\nHeld-out errors:");
        for (target, metrics) in errors {
            for (name, value) in metrics {
                println!("  {target}.{name} = {value:.4}");
            }
        }
    }

    // 4. Persist and reload
    let path = std::env::temp_dir().join("compact_bev.json");
    model.to_file(&path)?;
    let loaded = Model::from_file(&path)?;
    println!("\nSaved and reloaded model from {}", path.display());

    // 5. Predict on new links
    let route = LinkTable::from_columns(vec![
        ("speed", vec![25.0, 45.0, 65.0]),
        ("grade", vec![0.0, 0.02, -0.01]),
        ("miles", vec![0.4, 1.5, 3.0]),
    ])?
    .with_index(vec!["main_st".into(), "hwy_ramp".into(), "i70_w".into()])?;

    let energy = loaded.predict(&route)?;
    println!("\nPredicted energy:");
    for (link, kwh) in energy.index().iter().zip(energy.column("kwh").unwrap_or(&[])) {
        println!("  {link:>10}: {kwh:.3} kWh");
    }

    // 6. Predictive distribution of the energy rate per link
    // Inputs go through the same dtype cast `predict` applies.
    if let FittedEstimator::NGBoost(ngb) = loaded.estimator() {
        let loaded_config = loaded.config();
        let mut x: Array2<f64> = route.select(&loaded_config.feature_pack().feature_name_list())?;
        loaded_config.feature_dtype().cast(&mut x);
        for (link, dist) in route.index().iter().zip(ngb.predict_distribution(x.view())?) {
            println!("  {link:>10}: rate distribution {dist:?}");
        }
    }

    Ok(())
}
