use std::path::Path;

use serde::Serialize;

use crate::error::{Result, VoxsetError};

/// Header and records of a delimited file, fields kept as written.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRecords {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RawRecords {
    pub fn read(path: &Path, delimiter: u8) -> Result<Self> {
        let table_error = |source| VoxsetError::Table {
            path: path.to_path_buf(),
            source,
        };
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .flexible(true)
            .from_path(path)
            .map_err(table_error)?;
        let header = reader
            .headers()
            .map_err(table_error)?
            .iter()
            .map(str::to_string)
            .collect();
        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(table_error)?;
            rows.push(record.iter().map(str::to_string).collect());
        }
        Ok(Self { header, rows })
    }
}

/// Differences between two datasets, compared field by field as text.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Comparison {
    /// `(left header, right header)` when the headers differ.
    pub header_diff: Option<(Vec<String>, Vec<String>)>,
    pub left_rows: usize,
    pub right_rows: usize,
    /// 1-based indices of data rows that differ, over the common prefix.
    pub differing_rows: Vec<usize>,
}

impl Comparison {
    pub fn is_identical(&self) -> bool {
        self.header_diff.is_none()
            && self.left_rows == self.right_rows
            && self.differing_rows.is_empty()
    }
}

pub fn compare(left: &RawRecords, right: &RawRecords) -> Comparison {
    let header_diff =
        (left.header != right.header).then(|| (left.header.clone(), right.header.clone()));
    let differing_rows = left
        .rows
        .iter()
        .zip(&right.rows)
        .enumerate()
        .filter(|(_, (a, b))| a != b)
        .map(|(index, _)| index + 1)
        .collect();
    Comparison {
        header_diff,
        left_rows: left.rows.len(),
        right_rows: right.rows.len(),
        differing_rows,
    }
}

/// Read both files and compare them.
pub fn compare_files(left: &Path, right: &Path, delimiter: u8) -> Result<Comparison> {
    let left = RawRecords::read(left, delimiter)?;
    let right = RawRecords::read(right, delimiter)?;
    Ok(compare(&left, &right))
}
