//! End-to-end dataset build: assemble, write locally, then log the run.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use tracing::{info, warn};

use crate::config::DataConfig;
use crate::dataset::writer::spectrogram_path;
use crate::dataset::{write_dataset, AssemblyReport, Dataset, DatasetAssembler};
use crate::tracking::{ExperimentLogger, Metrics, Params};

/// What a build produced.
#[derive(Debug, Clone)]
pub struct BuildOutcome {
    pub rows: usize,
    pub output_path: PathBuf,
    pub report: AssemblyReport,
}

/// Output file for `output`: used as is when it names a file, otherwise
/// `<output>/<dataset_name>_<YYYYmmdd_HHMMSS>.csv`.
pub fn resolve_output_path(output: &Path, dataset_name: &str, now: DateTime<Local>) -> PathBuf {
    if output.is_dir() || output.extension().is_none() {
        output.join(format!("{dataset_name}_{}.csv", now.format("%Y%m%d_%H%M%S")))
    } else {
        output.to_path_buf()
    }
}

pub fn build(config: &DataConfig, logger: &mut dyn ExperimentLogger) -> Result<BuildOutcome> {
    config.validate().context("invalid configuration")?;
    let base_dir = config
        .base_dir
        .as_deref()
        .context("base_dir must be set")?;
    let output = config.output.as_deref().context("output must be set")?;

    let extractor = config.extractor.build();
    let kind = extractor.kind();
    let assembler = DatasetAssembler::new(extractor, config.assembler.clone())?;
    let (dataset, report) = assembler
        .assemble(base_dir)
        .with_context(|| format!("failed to assemble dataset from {:?}", base_dir))?;

    let output_path = resolve_output_path(output, &config.dataset_name, Local::now());
    let rows = write_dataset(&dataset, &output_path, config.delimiter_byte()?)
        .with_context(|| format!("failed to write dataset to {:?}", output_path))?;
    info!(rows, path = %output_path.display(), "dataset saved");

    let mut params = Params::new();
    params.insert("extractor".into(), kind.as_str().into());
    params.insert("schema_version".into(), kind.schema_version().into());
    params.insert("sample_rate".into(), config.extractor.sample_rate.to_string());
    params.insert("input_dir".into(), base_dir.display().to_string());
    params.insert("output_path".into(), output_path.display().to_string());
    params.insert(
        "exclude_segments".into(),
        config.assembler.exclude_segments.to_string(),
    );
    params.insert("jobs".into(), config.assembler.jobs.to_string());

    let mut metrics = Metrics::new();
    metrics.insert("rows".into(), rows as f64);
    metrics.insert("skipped_files".into(), report.skipped as f64);
    metrics.insert("unmatched_eval".into(), report.unmatched_eval as f64);
    metrics.insert(
        "unmatched_participant".into(),
        report.unmatched_participant as f64,
    );
    metrics.insert(
        "duplicate_audio_keys".into(),
        report.duplicate_audio_keys.len() as f64,
    );

    log_run(logger, config, &dataset, &output_path, &params, &metrics);

    Ok(BuildOutcome {
        rows,
        output_path,
        report,
    })
}

/// Sink failures only warn; the dataset is already on disk.
fn log_run(
    logger: &mut dyn ExperimentLogger,
    config: &DataConfig,
    dataset: &Dataset,
    output_path: &Path,
    params: &Params,
    metrics: &Metrics,
) {
    if let Err(err) = logger.log_dataset(dataset, &config.dataset_name, &config.description) {
        warn!(error = %err, "failed to log dataset");
    }
    if let Err(err) = logger.log_params(params) {
        warn!(error = %err, "failed to log parameters");
    }
    if let Err(err) = logger.log_metrics(metrics) {
        warn!(error = %err, "failed to log metrics");
    }
    if !dataset.spectrograms.is_empty() {
        let sidecar = spectrogram_path(output_path);
        if let Err(err) = logger.log_artifact(&sidecar) {
            warn!(error = %err, artifact = %sidecar.display(), "failed to log artifact");
        }
    }
}
