use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;
use tracing::{debug, info};
use uuid::Uuid;

use super::{dataset_params, ExperimentLogger, Metrics, Params};
use crate::dataset::{write_dataset, Dataset};
use crate::error::{Result, VoxsetError};

/// Stores each run in its own directory `<root>/<run-id>/`: `params.json`,
/// `metrics.json`, per-dataset description, statistics and copy, and an
/// `artifacts/` folder.
#[derive(Debug)]
pub struct FileRunLogger {
    run_id: String,
    dir: PathBuf,
    params: Params,
    metrics: Metrics,
}

impl FileRunLogger {
    /// Create a fresh run directory under `root`.
    pub fn create(root: &Path) -> Result<Self> {
        let uuid = Uuid::new_v4().simple().to_string();
        let run_id = format!("{}-{}", Local::now().format("%Y%m%d-%H%M%S"), &uuid[..8]);
        let dir = root.join(&run_id);
        fs::create_dir_all(&dir)?;
        info!(run_id = %run_id, dir = %dir.display(), "run started");
        Ok(Self {
            run_id,
            dir,
            params: Params::new(),
            metrics: Metrics::new(),
        })
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn write_json<T: serde::Serialize>(&self, name: &str, value: &T) -> Result<()> {
        let path = self.dir.join(name);
        fs::write(&path, serde_json::to_vec_pretty(value)?)?;
        debug!(path = %path.display(), "run file written");
        Ok(())
    }
}

impl ExperimentLogger for FileRunLogger {
    fn log_dataset(&mut self, dataset: &Dataset, name: &str, description: &str) -> Result<()> {
        fs::write(self.dir.join(format!("{name}-description.txt")), description)?;
        self.write_json(&format!("{name}-stats.json"), &dataset.describe())?;
        write_dataset(dataset, &self.dir.join(format!("{name}.csv")), b',')?;
        self.log_params(&dataset_params(dataset))
    }

    fn log_params(&mut self, params: &Params) -> Result<()> {
        self.params
            .extend(params.iter().map(|(k, v)| (k.clone(), v.clone())));
        self.write_json("params.json", &self.params)
    }

    fn log_metrics(&mut self, metrics: &Metrics) -> Result<()> {
        for (key, value) in metrics {
            if !value.is_finite() {
                return Err(VoxsetError::Config(format!(
                    "metric `{key}` is not finite"
                )));
            }
            self.metrics.insert(key.clone(), *value);
        }
        self.write_json("metrics.json", &self.metrics)
    }

    fn log_artifact(&mut self, path: &Path) -> Result<()> {
        let artifacts = self.dir.join("artifacts");
        fs::create_dir_all(&artifacts)?;
        let name = path.file_name().ok_or_else(|| {
            VoxsetError::Config(format!("artifact {} has no file name", path.display()))
        })?;
        fs::copy(path, artifacts.join(name))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Table;
    use crate::types::Cell;

    fn dataset() -> Dataset {
        let mut table = Table::new(vec!["file".into(), "age".into()]);
        table.push_row(vec![Cell::from("F-1_x.wav"), Cell::Number(30.0)]);
        table.push_row(vec![Cell::from("M-2_x.wav"), Cell::Number(40.0)]);
        Dataset {
            table,
            spectrograms: Vec::new(),
        }
    }

    #[test]
    fn writes_run_files() {
        let root = tempfile::tempdir().unwrap();
        let mut logger = FileRunLogger::create(root.path()).unwrap();
        logger.log_dataset(&dataset(), "sentences", "two rows").unwrap();
        let mut metrics = Metrics::new();
        metrics.insert("rows".into(), 2.0);
        logger.log_metrics(&metrics).unwrap();

        let dir = logger.dir();
        assert!(dir.starts_with(root.path()));
        assert_eq!(
            fs::read_to_string(dir.join("sentences-description.txt")).unwrap(),
            "two rows"
        );
        assert!(dir.join("sentences.csv").exists());

        let params: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(dir.join("params.json")).unwrap()).unwrap();
        assert_eq!(params["num_samples"], "2");
        assert_eq!(params["features_names"], "file,age");

        let stats: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(dir.join("sentences-stats.json")).unwrap())
                .unwrap();
        assert_eq!(stats[0]["column"], "age");
        assert_eq!(stats[0]["mean"], 35.0);

        let metrics: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(dir.join("metrics.json")).unwrap()).unwrap();
        assert_eq!(metrics["rows"], 2.0);
    }

    #[test]
    fn copies_artifacts() {
        let root = tempfile::tempdir().unwrap();
        let source = root.path().join("config.json");
        fs::write(&source, "{}").unwrap();
        let mut logger = FileRunLogger::create(&root.path().join("runs")).unwrap();
        logger.log_artifact(&source).unwrap();
        assert!(logger.dir().join("artifacts/config.json").exists());
    }

    #[test]
    fn rejects_non_finite_metrics() {
        let root = tempfile::tempdir().unwrap();
        let mut logger = FileRunLogger::create(root.path()).unwrap();
        let mut metrics = Metrics::new();
        metrics.insert("bad".into(), f64::NAN);
        assert!(logger.log_metrics(&metrics).is_err());
    }
}
