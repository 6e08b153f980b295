//! Dataset assembly: audio rows joined with evaluation and participant
//! metadata, then written as a delimited file.

pub mod assembler;
pub mod compare;
pub mod keys;
pub mod table;
pub mod writer;

use ndarray::Array2;
use serde::Serialize;

use crate::types::Cell;

pub use assembler::{
    AssemblerSettings, AssemblyReport, DatasetAssembler, DuplicateKey, Layout, MetadataSource,
};
pub use compare::{compare, compare_files, Comparison, RawRecords};
pub use keys::{KeyNormalizer, MetadataKey, PrefixRule};
pub use table::Table;
pub use writer::{write_dataset, write_spectrograms};

/// Final dataset. Immutable once returned by the assembler.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub table: Table,
    /// Per-file spectrograms in row order; empty for variants without one.
    pub spectrograms: Vec<(String, Array2<f32>)>,
}

/// Summary statistics of one numeric column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnSummary {
    pub column: String,
    pub count: usize,
    pub mean: Option<f64>,
    pub std: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl Dataset {
    pub fn num_samples(&self) -> usize {
        self.table.len()
    }

    pub fn num_features(&self) -> usize {
        self.table.columns().len()
    }

    pub fn feature_names(&self) -> &[String] {
        self.table.columns()
    }

    /// Count, mean, sample standard deviation, min and max for every column
    /// whose present cells are all numbers.
    pub fn describe(&self) -> Vec<ColumnSummary> {
        self.table
            .columns()
            .iter()
            .enumerate()
            .filter_map(|(index, name)| {
                let mut values = Vec::new();
                for cell in self.table.column(index) {
                    match cell {
                        Cell::Number(value) => values.push(*value),
                        Cell::Missing => {}
                        Cell::Text(_) => return None,
                    }
                }
                (!values.is_empty()).then(|| summarize(name, &values))
            })
            .collect()
    }
}

fn summarize(name: &str, values: &[f64]) -> ColumnSummary {
    let count = values.len();
    let mean = values.iter().sum::<f64>() / count as f64;
    let std = (count > 1).then(|| {
        let ss: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
        (ss / (count - 1) as f64).sqrt()
    });
    ColumnSummary {
        column: name.to_string(),
        count,
        mean: Some(mean),
        std,
        min: values.iter().copied().reduce(f64::min),
        max: values.iter().copied().reduce(f64::max),
    }
}
