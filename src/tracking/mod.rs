//! Experiment logging sinks.

mod run_store;

use std::collections::BTreeMap;
use std::path::Path;

use tracing::info;

use crate::dataset::Dataset;
use crate::error::Result;

pub use run_store::FileRunLogger;

pub type Params = BTreeMap<String, String>;
pub type Metrics = BTreeMap<String, f64>;

/// Receives a finished dataset plus run parameters, metrics and artifacts.
///
/// Callers persist the dataset locally before logging, so a failing sink
/// never affects the written output.
pub trait ExperimentLogger {
    fn log_dataset(&mut self, dataset: &Dataset, name: &str, description: &str) -> Result<()>;

    fn log_params(&mut self, params: &Params) -> Result<()>;

    fn log_metrics(&mut self, metrics: &Metrics) -> Result<()>;

    fn log_artifact(&mut self, path: &Path) -> Result<()>;
}

/// Standard dataset parameters: sample and feature counts plus column names.
pub fn dataset_params(dataset: &Dataset) -> Params {
    let mut params = Params::new();
    params.insert("num_samples".into(), dataset.num_samples().to_string());
    params.insert("num_features".into(), dataset.num_features().to_string());
    params.insert("features_names".into(), dataset.feature_names().join(","));
    params
}

/// Emits everything as structured `tracing` events.
#[derive(Debug, Default)]
pub struct TracingLogger;

impl ExperimentLogger for TracingLogger {
    fn log_dataset(&mut self, dataset: &Dataset, name: &str, description: &str) -> Result<()> {
        let stats = serde_json::to_string(&dataset.describe())?;
        info!(
            dataset = name,
            description,
            num_samples = dataset.num_samples(),
            num_features = dataset.num_features(),
            stats = %stats,
            "dataset logged"
        );
        Ok(())
    }

    fn log_params(&mut self, params: &Params) -> Result<()> {
        for (key, value) in params {
            info!(param = %key, value = %value, "run parameter");
        }
        Ok(())
    }

    fn log_metrics(&mut self, metrics: &Metrics) -> Result<()> {
        for (key, value) in metrics {
            info!(metric = %key, value, "run metric");
        }
        Ok(())
    }

    fn log_artifact(&mut self, path: &Path) -> Result<()> {
        info!(artifact = %path.display(), "run artifact");
        Ok(())
    }
}
