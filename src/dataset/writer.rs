use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use ndarray::Array2;
use serde::Serialize;
use tracing::info;

use super::Dataset;
use crate::error::Result;

#[derive(Serialize)]
struct SpectrogramEntry<'a> {
    file: &'a str,
    spectrogram: &'a Array2<f32>,
}

/// Write the dataset as a delimited file with a header row. Missing cells are
/// written empty. Spectrograms, when present, go to a JSON sidecar next to
/// it. Returns the number of data rows written.
pub fn write_dataset(dataset: &Dataset, path: &Path, delimiter: u8) -> Result<usize> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .from_path(path)?;
    writer.write_record(dataset.table.columns())?;
    for row in dataset.table.rows() {
        writer.write_record(row.iter().map(|cell| cell.to_string()))?;
    }
    writer.flush()?;

    if !dataset.spectrograms.is_empty() {
        let sidecar = write_spectrograms(dataset, path)?;
        info!(
            path = %sidecar.display(),
            count = dataset.spectrograms.len(),
            "spectrograms written"
        );
    }
    info!(path = %path.display(), rows = dataset.table.len(), "dataset written");
    Ok(dataset.table.len())
}

/// `<stem>.spectrograms.json` beside `dataset_path`.
pub fn spectrogram_path(dataset_path: &Path) -> PathBuf {
    let stem = dataset_path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "dataset".to_string());
    dataset_path.with_file_name(format!("{stem}.spectrograms.json"))
}

pub fn write_spectrograms(dataset: &Dataset, dataset_path: &Path) -> Result<PathBuf> {
    let path = spectrogram_path(dataset_path);
    let entries: Vec<SpectrogramEntry<'_>> = dataset
        .spectrograms
        .iter()
        .map(|(file, spectrogram)| SpectrogramEntry { file, spectrogram })
        .collect();
    let writer = BufWriter::new(File::create(&path)?);
    serde_json::to_writer(writer, &entries)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Table;
    use crate::types::Cell;

    #[test]
    fn missing_cells_are_written_empty() {
        let dir = tempfile::tempdir().unwrap();
        let mut table = Table::new(vec!["file".into(), "age".into(), "f0_mean".into()]);
        table.push_row(vec![Cell::from("F-1_x.wav"), Cell::Number(30.0), Cell::Missing]);
        let dataset = Dataset {
            table,
            spectrograms: Vec::new(),
        };
        let path = dir.path().join("out/data.csv");
        assert_eq!(write_dataset(&dataset, &path, b',').unwrap(), 1);
        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text, "file,age,f0_mean\nF-1_x.wav,30,\n");
        assert!(!spectrogram_path(&path).exists());
    }

    #[test]
    fn spectrograms_go_to_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let mut table = Table::new(vec!["file".into()]);
        table.push_row(vec![Cell::from("a.wav")]);
        let dataset = Dataset {
            table,
            spectrograms: vec![("a.wav".to_string(), Array2::from_elem((2, 3), -80.0))],
        };
        let path = dir.path().join("mel.csv");
        write_dataset(&dataset, &path, b',').unwrap();
        let sidecar = spectrogram_path(&path);
        assert!(sidecar.ends_with("mel.spectrograms.json"));
        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(sidecar).unwrap()).unwrap();
        assert_eq!(json[0]["file"], "a.wav");
        assert_eq!(json[0]["spectrogram"]["dim"], serde_json::json!([2, 3]));
    }
}
