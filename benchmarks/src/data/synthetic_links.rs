use powertrain::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::Path;

/// Synthetic link-level driving data.
///
/// Each link has a speed (mph), a grade (decimal) and a length (miles). The
/// energy (kWh) follows a smooth electric-vehicle style consumption curve:
/// a U-shaped rate in speed, a linear grade term and multiplicative noise.
///
/// Columns: `speed`, `grade`, `miles`, `kwh`.
#[derive(Debug, Clone)]
pub struct SyntheticLinks {
    table: LinkTable,
}

impl SyntheticLinks {
    /// Generates `n` links from a fixed seed.
    pub fn generate(n: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut speed = Vec::with_capacity(n);
        let mut grade = Vec::with_capacity(n);
        let mut miles = Vec::with_capacity(n);
        let mut kwh = Vec::with_capacity(n);

        for _ in 0..n {
            let s: f64 = rng.gen_range(5.0..80.0);
            let g: f64 = rng.gen_range(-0.06..0.06);
            let d: f64 = rng.gen_range(0.02..2.0);
            let noise: f64 = rng.gen_range(0.95..1.05);
            speed.push(s);
            grade.push(g);
            miles.push(d);
            kwh.push(d * Self::true_rate(s, g) * noise);
        }

        let table = LinkTable::from_columns(vec![
            ("speed", speed),
            ("grade", grade),
            ("miles", miles),
            ("kwh", kwh),
        ]);
        match table {
            Ok(table) => Self { table },
            Err(e) => unreachable!("generated columns have equal length: {e}"),
        }
    }

    /// Loads links previously written with [`Self::write_csv`].
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self {
            table: LinkTable::from_csv_path(path, Some("link_id"))?,
        })
    }

    pub fn write_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = std::fs::File::create(path)?;
        self.table.write_csv(file, "link_id")
    }

    /// Noise-free energy rate in kWh per mile.
    pub fn true_rate(speed: f64, grade: f64) -> f64 {
        let speed_term = 0.18 + 0.00008 * (speed - 40.0).powi(2);
        (speed_term + 2.5 * grade).max(0.02)
    }

    pub fn table(&self) -> &LinkTable {
        &self.table
    }

    pub fn feature_pack() -> FeaturePack {
        let pack = FeaturePack::new(
            vec![
                DataColumn::new("speed", "mph"),
                DataColumn::new("grade", "decimal"),
            ],
            DataColumn::new("miles", "miles"),
            vec![DataColumn::new("kwh", "kilowatt_hour")],
        );
        match pack {
            Ok(pack) => pack,
            Err(e) => unreachable!("static feature pack is valid: {e}"),
        }
    }

    pub fn config(predict_method: PredictMethod) -> Result<ModelConfig> {
        ModelConfig::builder(
            "synthetic compact BEV",
            PowertrainType::Bev,
            Self::feature_pack(),
        )
        .energy_rate_limits(0.0, 2.0)
        .predict_method(predict_method)
        .build()
    }
}
