use std::collections::HashMap;
use std::path::Path;

use crate::error::{Result, VoxsetError};
use crate::types::Cell;

/// Row-oriented table of typed cells with named columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

/// Outcome of a left join.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinOutcome {
    pub table: Table,
    /// Left rows that found no match on the right.
    pub unmatched: usize,
    /// Left keys shared by more than one row, with their row counts, sorted
    /// by key. Only collected when the join is not one-to-one.
    pub duplicate_left_keys: Vec<(String, usize)>,
}

impl Table {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Read a delimited file with a header row. Every field is parsed with
    /// [`Cell::parse`]; short rows are padded with missing cells.
    pub fn read_delimited(path: &Path, delimiter: u8) -> Result<Self> {
        let table_error = |source| VoxsetError::Table {
            path: path.to_path_buf(),
            source,
        };
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .flexible(true)
            .from_path(path)
            .map_err(table_error)?;
        let columns: Vec<String> = reader
            .headers()
            .map_err(table_error)?
            .iter()
            .map(|name| name.trim().to_string())
            .collect();
        let mut table = Table::new(columns);
        for record in reader.records() {
            let record = record.map_err(table_error)?;
            let mut row: Vec<Cell> = record.iter().map(Cell::parse).collect();
            row.resize(table.columns.len(), Cell::Missing);
            table.rows.push(row);
        }
        Ok(table)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn push_row(&mut self, row: Vec<Cell>) {
        debug_assert_eq!(row.len(), self.columns.len());
        self.rows.push(row);
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column == name)
    }

    pub fn require_column(&self, table: &str, name: &str) -> Result<usize> {
        self.column_index(name)
            .ok_or_else(|| VoxsetError::MissingColumn {
                table: table.to_string(),
                column: name.to_string(),
            })
    }

    pub fn column(&self, index: usize) -> impl Iterator<Item = &Cell> {
        self.rows.iter().map(move |row| &row[index])
    }

    pub fn cell(&self, row: usize, name: &str) -> Option<&Cell> {
        let index = self.column_index(name)?;
        self.rows.get(row).map(|cells| &cells[index])
    }

    /// Keep only `names`, in that order.
    pub fn select<S: AsRef<str>>(&self, table: &str, names: &[S]) -> Result<Table> {
        let indices = names
            .iter()
            .map(|name| self.require_column(table, name.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Table {
            columns: names.iter().map(|name| name.as_ref().to_string()).collect(),
            rows: self
                .rows
                .iter()
                .map(|row| indices.iter().map(|&i| row[i].clone()).collect())
                .collect(),
        })
    }

    /// Append a column; `values` must have one entry per row.
    pub fn add_column(&mut self, name: impl Into<String>, values: Vec<Cell>) {
        debug_assert_eq!(values.len(), self.rows.len());
        self.columns.push(name.into());
        for (row, value) in self.rows.iter_mut().zip(values) {
            row.push(value);
        }
    }

    pub fn map_column(&mut self, index: usize, f: impl Fn(&Cell) -> Cell) {
        for row in &mut self.rows {
            row[index] = f(&row[index]);
        }
    }

    /// Drop every column for which `drop` returns true.
    pub fn drop_columns_where(&mut self, mut drop: impl FnMut(&str) -> bool) {
        let keep: Vec<bool> = self.columns.iter().map(|name| !drop(name)).collect();
        let mut flags = keep.iter();
        self.columns.retain(|_| *flags.next().unwrap_or(&true));
        for row in &mut self.rows {
            let mut flags = keep.iter();
            row.retain(|_| *flags.next().unwrap_or(&true));
        }
    }

    /// Drop named columns; names that are not present are ignored.
    pub fn drop_columns<S: AsRef<str>>(&mut self, names: &[S]) {
        self.drop_columns_where(|column| names.iter().any(|name| name.as_ref() == column));
    }

    pub fn retain_rows(&mut self, mut keep: impl FnMut(&[Cell]) -> bool) {
        self.rows.retain(|row| keep(row));
    }

    pub fn lowercase_columns(&mut self) {
        for column in &mut self.columns {
            *column = column.to_lowercase();
        }
    }

    /// Columns with no present value in any row.
    pub fn all_missing_columns(&self) -> Vec<String> {
        self.columns
            .iter()
            .enumerate()
            .filter(|(index, _)| self.column(*index).all(Cell::is_missing))
            .map(|(_, name)| name.clone())
            .collect()
    }

    /// Left outer join on `left_key = right_key`.
    ///
    /// The output keeps every left row exactly once and in order. Right-side
    /// keys must be unique, and when `one_to_one` is set so must the left
    /// keys; violations are reported as [`VoxsetError::JoinCardinality`].
    /// Otherwise repeated left keys are joined and listed in
    /// [`JoinOutcome::duplicate_left_keys`].
    /// The right key column is not repeated; other right columns whose name
    /// collides with a left column get a `_{right_name}` suffix.
    pub fn left_join(
        &self,
        right: &Table,
        left_key: &str,
        right_key: &str,
        right_name: &str,
        one_to_one: bool,
    ) -> Result<JoinOutcome> {
        let left_index = self.require_column("audio", left_key)?;
        let right_index = right.require_column(right_name, right_key)?;

        let right_lookup = unique_keys(right, right_index, right_name)?;
        let duplicate_left_keys = if one_to_one {
            unique_keys(self, left_index, "audio")?;
            Vec::new()
        } else {
            duplicate_keys(self, left_index)
        };

        let carried: Vec<usize> = (0..right.columns.len())
            .filter(|&i| i != right_index)
            .collect();
        let mut columns = self.columns.clone();
        for &i in &carried {
            let name = &right.columns[i];
            if self.columns.contains(name) {
                columns.push(format!("{name}_{right_name}"));
            } else {
                columns.push(name.clone());
            }
        }

        let mut unmatched = 0;
        let rows = self
            .rows
            .iter()
            .map(|row| {
                let matched = row[left_index]
                    .key_string()
                    .and_then(|key| right_lookup.get(&key).copied());
                let mut joined = row.clone();
                match matched {
                    Some(r) => joined.extend(carried.iter().map(|&i| right.rows[r][i].clone())),
                    None => {
                        unmatched += 1;
                        joined.extend(carried.iter().map(|_| Cell::Missing));
                    }
                }
                joined
            })
            .collect();

        Ok(JoinOutcome {
            table: Table { columns, rows },
            unmatched,
            duplicate_left_keys,
        })
    }
}

/// Key → row index, failing on the first key that occurs more than once.
/// Rows with a missing key never match and are not indexed.
fn unique_keys(table: &Table, index: usize, name: &str) -> Result<HashMap<String, usize>> {
    if let Some((key, count)) = duplicate_keys(table, index).into_iter().next() {
        return Err(VoxsetError::JoinCardinality {
            table: name.to_string(),
            key,
            count,
        });
    }
    let mut lookup = HashMap::new();
    for (row_index, row) in table.rows.iter().enumerate() {
        if let Some(key) = row[index].key_string() {
            lookup.entry(key).or_insert(row_index);
        }
    }
    Ok(lookup)
}

/// Keys present in more than one row, with counts, sorted by key.
fn duplicate_keys(table: &Table, index: usize) -> Vec<(String, usize)> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for row in &table.rows {
        if let Some(key) = row[index].key_string() {
            *counts.entry(key).or_default() += 1;
        }
    }
    let mut duplicates: Vec<(String, usize)> =
        counts.into_iter().filter(|(_, count)| *count > 1).collect();
    duplicates.sort();
    duplicates
}
