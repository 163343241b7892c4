//! # powertrain
//!
//! Vehicle energy-consumption models trained on link-level driving data.
//!
//! A model predicts the energy a vehicle spends on each road link from link
//! features such as speed and grade. Training data is a [`LinkTable`] with one
//! row per link pass; a [`FeaturePack`] names the feature, distance and energy
//! columns, and a [`ModelConfig`] fixes how the model is trained and applied.
//!
//! ## Core Design Principles
//!
//! - **Unfitted vs fitted**: backends implement [`Regressor`] and only their
//!   fitted state can predict. A [`Model`] always holds a fitted estimator.
//! - **Immutable values**: configs are built once; training never mutates the
//!   caller's table; attaching validation errors returns a new model.
//! - **Atomic persistence**: a model serializes config, estimator blob and
//!   error metrics as one JSON document.
//!
//! ## Quick Start
//!
//! ```rust
//! use powertrain::prelude::*;
//!
//! let n = 50;
//! let speed: Vec<f64> = (0..n).map(|i| 25.0 + i as f64).collect();
//! let grade: Vec<f64> = (0..n).map(|i| (i % 5) as f64 * 0.01).collect();
//! let miles: Vec<f64> = (0..n).map(|i| 0.2 + (i % 7) as f64 * 0.1).collect();
//! let kwh: Vec<f64> = speed.iter().zip(&miles).map(|(s, d)| d * (0.2 + s / 300.0)).collect();
//!
//! let links = LinkTable::from_columns(vec![
//!     ("speed", speed),
//!     ("grade", grade),
//!     ("miles", miles),
//!     ("kwh", kwh),
//! ])
//! .unwrap();
//!
//! let pack = FeaturePack::new(
//!     vec![DataColumn::new("speed", "mph"), DataColumn::new("grade", "decimal")],
//!     DataColumn::new("miles", "miles"),
//!     vec![DataColumn::new("kwh", "kilowatt_hour")],
//! )
//! .unwrap();
//! let config = ModelConfig::builder("2016 compact BEV", PowertrainType::Bev, pack)
//!     .build()
//!     .unwrap();
//!
//! let model = Trainer::new(NGBoost::new().n_estimators(50).verbose(false))
//!     .train(&links, &config)
//!     .unwrap();
//!
//! let restored = Model::from_json(&model.to_json().unwrap()).unwrap();
//! assert_eq!(restored.predict(&links).unwrap(), model.predict(&links).unwrap());
//! ```
//!
//! ## Module Structure
//!
//! - `features`: feature packs, columns and valid ranges
//! - `config`: model configuration and its builder
//! - `dataset`: link tables and CSV loading
//! - `estimator`: the `Regressor` contract and the explicit-bin, random forest and NGBoost backends
//! - `trainer`: rate derivation, range filtering, split and fit
//! - `model`: trained models and their persisted form
//! - `validation`: held-out error metrics
//! - `serialization`: opaque blob encoding for fitted state

/// Model configuration.
pub mod config;

/// Link tables and CSV input/output.
pub mod dataset;

/// Crate-wide error type.
pub mod error;

/// Estimator backends.
pub mod estimator;

/// Feature and target declarations.
pub mod features;

/// Trained models.
pub mod model;

/// Fitted-state encoding.
pub mod serialization;

/// Training pipeline.
pub mod trainer;

/// Held-out error metrics.
pub mod validation;

pub use config::{FeatureDtype, ModelConfig, ModelConfigBuilder, PowertrainType, PredictMethod};
pub use dataset::LinkTable;
pub use error::{NullKind, PowertrainError, Result};
pub use estimator::{ExplicitBin, FittedEstimator, NGBoost, RandomForest, Regressor};
pub use features::{DataColumn, FeaturePack, FeatureRange};
pub use model::Model;
pub use trainer::Trainer;
pub use validation::{compute_errors, ModelErrors};

/// Everything needed to train, persist and apply a model.
pub mod prelude {
    pub use crate::config::{FeatureDtype, ModelConfig, PowertrainType, PredictMethod};
    pub use crate::dataset::LinkTable;
    pub use crate::error::{PowertrainError, Result};
    pub use crate::estimator::{
        BinStrategy, Distribution, ExplicitBin, FittedEstimator, NGBoost, RandomForest, Regressor,
    };
    pub use crate::features::{DataColumn, FeaturePack, FeatureRange};
    pub use crate::model::Model;
    pub use crate::trainer::Trainer;
}
