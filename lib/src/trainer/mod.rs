//! Training pipeline: energy rates, range filtering, split, fit, validation.

use crate::config::{ModelConfig, PredictMethod};
use crate::dataset::LinkTable;
use crate::error::{NullKind, PowertrainError, Result};
use crate::estimator::{input_names, Regressor};
use crate::features::rate_name;
use crate::model::{Metadata, Model};
use crate::validation::compute_errors;
use log::info;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::BTreeMap;

/// Data after rate derivation, range filtering and splitting.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedData {
    /// Input table plus one `<target>_rate` column per target, restricted to
    /// rows whose rates are within range.
    pub filtered: LinkTable,
    /// Number of rows outside the accepted range, per energy target.
    pub filtered_counts: BTreeMap<String, usize>,
    pub train: LinkTable,
    pub test: LinkTable,
}

/// Trains a [`Model`] with a given backend.
///
/// The trainer holds only the unfitted backend and can be reused for any
/// number of tables and configs.
///
/// # Example
///
/// ```rust
/// use powertrain::prelude::*;
///
/// let n = 40;
/// let speed: Vec<f64> = (0..n).map(|i| 20.0 + i as f64).collect();
/// let miles = vec![0.5; n];
/// let kwh: Vec<f64> = speed.iter().map(|s| 0.5 * (0.2 + s / 200.0)).collect();
/// let links = LinkTable::from_columns(vec![("speed", speed), ("miles", miles), ("kwh", kwh)])
///     .unwrap();
///
/// let pack = FeaturePack::new(
///     vec![DataColumn::new("speed", "mph")],
///     DataColumn::new("miles", "miles"),
///     vec![DataColumn::new("kwh", "kilowatt_hour")],
/// )
/// .unwrap();
/// let config = ModelConfig::builder("demo car", PowertrainType::Bev, pack)
///     .build()
///     .unwrap();
///
/// let model = Trainer::new(ExplicitBin::new()).train(&links, &config).unwrap();
/// assert!(model.is_validated());
/// ```
#[derive(Debug, Clone)]
pub struct Trainer<R: Regressor> {
    regressor: R,
}

impl<R: Regressor> Trainer<R> {
    pub fn new(regressor: R) -> Self {
        Self { regressor }
    }

    pub fn regressor(&self) -> &R {
        &self.regressor
    }

    /// Derives energy rates, drops out-of-range rows and splits the rest.
    ///
    /// # Errors
    /// - [`PowertrainError::MissingColumn`] if a feature, the distance or an
    ///   energy column is absent;
    /// - [`PowertrainError::DivisionHazard`] if any distance is zero;
    /// - [`PowertrainError::InvalidInput`] if fewer than two rows survive the
    ///   range filter.
    pub fn prepare(&self, data: &LinkTable, config: &ModelConfig) -> Result<PreparedData> {
        let pack = config.feature_pack();
        let distance_name = &pack.distance().name;

        let mut required = pack.feature_name_list();
        required.push(distance_name.clone());
        required.extend(pack.energy_name_list());
        let missing = data.missing_columns(&required);
        if !missing.is_empty() {
            return Err(PowertrainError::MissingColumn { columns: missing });
        }

        let distance = data.require_column(distance_name)?;
        let zero_rows: Vec<usize> = distance
            .iter()
            .enumerate()
            .filter_map(|(row, &d)| (d == 0.0).then_some(row))
            .collect();
        if let Some(&first) = zero_rows.first() {
            return Err(PowertrainError::DivisionHazard {
                count: zero_rows.len(),
                link_id: data.index()[first].clone(),
            });
        }

        let mut table = data.clone();
        let mut keep = vec![true; table.n_rows()];
        let mut filtered_counts = BTreeMap::new();

        for (i, target) in pack.energy().iter().enumerate() {
            let energy = data.require_column(&target.name)?;
            let rates: Vec<f64> = energy.iter().zip(distance).map(|(e, d)| e / d).collect();
            let range = config.target_range(i);

            let mut outside = 0;
            for (k, &rate) in keep.iter_mut().zip(&rates) {
                if !rate.is_nan() && !range.contains(rate) {
                    *k = false;
                    outside += 1;
                }
            }
            info!(
                "filtered out {} rows with energy rates outside of the limits of {} and {} for energy target {}",
                outside,
                range.lower(),
                range.upper(),
                target.name
            );
            filtered_counts.insert(target.name.clone(), outside);
            table.insert_column(rate_name(&target.name), rates)?;
        }

        let filtered = table.filter(&keep)?;
        let (train, test) = train_test_split(&filtered, config.test_size(), config.random_seed())?;

        Ok(PreparedData {
            filtered,
            filtered_counts,
            train,
            test,
        })
    }

    /// Runs the full pipeline and returns a validated model.
    ///
    /// No partial model is returned: any failure, including one from the
    /// backend's fit, aborts training.
    pub fn train(&self, data: &LinkTable, config: &ModelConfig) -> Result<Model> {
        let prepared = self.prepare(data, config)?;
        let pack = config.feature_pack();
        let method = config.predict_method();

        let inputs = input_names(pack, method);
        let targets = match method {
            PredictMethod::Rate => pack.energy_rate_name_list(),
            PredictMethod::Raw => pack.energy_name_list(),
        };

        let null_features = prepared.filtered.null_columns(&inputs);
        if !null_features.is_empty() {
            return Err(PowertrainError::NullValue {
                kind: NullKind::Feature,
                columns: null_features,
            });
        }
        let null_targets = prepared.filtered.null_columns(&targets);
        if !null_targets.is_empty() {
            return Err(PowertrainError::NullValue {
                kind: NullKind::Target,
                columns: null_targets,
            });
        }

        let mut x = prepared.train.select(&inputs)?;
        config.feature_dtype().cast(&mut x);
        let y = prepared.train.select(&targets)?;

        info!(
            "training {} model on {} rows ({} held out) with inputs [{}]",
            config.vehicle_description(),
            prepared.train.n_rows(),
            prepared.test.n_rows(),
            inputs.join(", ")
        );
        let estimator = self.regressor.fit(x.view(), y.view())?.into();

        let model = Model::build(estimator, Metadata::new(config.clone()))?;
        let errors = compute_errors(&prepared.test, &model)?;
        Ok(model.set_errors(errors))
    }
}

/// Seeded shuffle split of `table` into `(train, test)`.
///
/// The test partition holds `ceil(n * test_size)` rows, kept within
/// `1..n`. The same seed always yields the same partitions.
///
/// # Errors
/// [`PowertrainError::InvalidInput`] if the table has fewer than two rows or
/// `test_size` is outside `(0, 1)`.
pub fn train_test_split(
    table: &LinkTable,
    test_size: f64,
    seed: u64,
) -> Result<(LinkTable, LinkTable)> {
    let n = table.n_rows();
    if n < 2 {
        return Err(PowertrainError::InvalidInput(format!(
            "need at least 2 rows to split into train and test, got {n}"
        )));
    }
    if !(test_size > 0.0 && test_size < 1.0) {
        return Err(PowertrainError::InvalidInput(format!(
            "test_size must be in (0, 1), got {test_size}"
        )));
    }

    let n_test = ((n as f64 * test_size).ceil() as usize).clamp(1, n - 1);
    let n_train = n - n_test;

    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    Ok((
        table.take_rows(&indices[..n_train])?,
        table.take_rows(&indices[n_train..])?,
    ))
}
