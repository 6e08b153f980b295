use std::collections::HashSet;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::keys::{default_prefix_rules, sample_name, KeyNormalizer, MetadataKey, PrefixRule};
use super::table::Table;
use super::Dataset;
use crate::error::{DecodeError, Result, VoxsetError};
use crate::features::{label_from_path, FeatureExtractor, FeatureRecord};
use crate::types::Cell;

const KEY_COLUMN: &str = "__join_key";

/// Where audio files sit relative to the base directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Layout {
    /// Files directly under the base directory.
    #[default]
    Flat,
    /// Files one subdirectory level below the base directory.
    Nested,
}

impl Layout {
    fn depth(&self) -> usize {
        match self {
            Layout::Flat => 1,
            Layout::Nested => 2,
        }
    }
}

/// A metadata table joined onto the audio rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataSource {
    pub path: PathBuf,
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
    pub key: MetadataKey,
    /// Audio-side column matched against `key`.
    pub join_on: String,
    /// Columns kept from the table; all columns when unset.
    #[serde(default)]
    pub columns: Option<Vec<String>>,
    /// Columns coerced to numbers; unparseable values become missing.
    #[serde(default)]
    pub numeric_columns: Vec<String>,
    /// Also require unique keys on the audio side.
    #[serde(default)]
    pub one_to_one: bool,
}

fn default_delimiter() -> char {
    ','
}

impl MetadataSource {
    /// Tab-delimited evaluation scores keyed by `SEX-DONOR`.
    pub fn evaluation(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            delimiter: '\t',
            key: MetadataKey::compound("SEX", "DONOR"),
            join_on: "sample_name".to_string(),
            columns: None,
            numeric_columns: Vec::new(),
            one_to_one: false,
        }
    }

    /// Comma-delimited participant demographics keyed by `Participant`.
    pub fn participants(path: impl Into<PathBuf>, join_on: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            delimiter: ',',
            key: MetadataKey::column("Participant"),
            join_on: join_on.into(),
            columns: Some(vec!["Participant".into(), "Age".into(), "Sex".into()]),
            numeric_columns: vec!["Age".into()],
            one_to_one: false,
        }
    }

    fn delimiter_byte(&self) -> Result<u8> {
        u8::try_from(self.delimiter)
            .ok()
            .filter(u8::is_ascii)
            .ok_or_else(|| {
                VoxsetError::Config(format!(
                    "delimiter {:?} for {} is not a single ASCII character",
                    self.delimiter,
                    self.path.display()
                ))
            })
    }

    /// Read, project, coerce and key the table.
    fn load(&self, name: &str, normalizer: &KeyNormalizer) -> Result<Table> {
        let raw = Table::read_delimited(&self.path, self.delimiter_byte()?)?;
        let mut table = match &self.columns {
            Some(columns) => {
                let mut keep: Vec<String> = columns.clone();
                for source in self.key.source_columns() {
                    if !keep.iter().any(|c| c == source) {
                        keep.push(source.to_string());
                    }
                }
                raw.select(name, &keep)?
            }
            None => raw,
        };
        for column in &self.numeric_columns {
            let index = table.require_column(name, column)?;
            table.map_column(index, Cell::to_numeric);
        }
        let keys = self.key.derive(&table, name, normalizer)?;
        table.add_column(KEY_COLUMN, keys);
        debug!(table = name, rows = table.len(), path = %self.path.display(), "metadata loaded");
        Ok(table)
    }
}

/// Assembly configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssemblerSettings {
    pub layout: Layout,
    /// Audio file extension, matched case-insensitively.
    pub extension: String,
    pub exclude_segments: bool,
    pub segment_marker: String,
    /// Removed from the file name to form `sample_name`; the label is used
    /// when unset.
    pub sample_suffix: Option<String>,
    pub evaluation: Option<MetadataSource>,
    pub participants: Option<MetadataSource>,
    pub prefix_rules: Vec<PrefixRule>,
    /// Administrative and identifier columns removed from the output.
    pub drop_columns: Vec<String>,
    /// Columns whose name contains any of these are removed.
    pub drop_containing: Vec<String>,
    /// Only rows whose `file` matches are kept.
    pub file_pattern: Option<String>,
    /// Add a `gender` column: the label text before the first `-`.
    pub gender_column: bool,
    /// Worker threads for extraction; 1 runs sequentially.
    pub jobs: usize,
}

impl Default for AssemblerSettings {
    fn default() -> Self {
        Self {
            layout: Layout::Flat,
            extension: "wav".to_string(),
            exclude_segments: false,
            segment_marker: "segment".to_string(),
            sample_suffix: None,
            evaluation: None,
            participants: None,
            prefix_rules: default_prefix_rules(),
            drop_columns: ["SEX", "DONOR", "stimulussex", "Participant"]
                .into_iter()
                .map(String::from)
                .collect(),
            drop_containing: vec!["Face".to_string(), "Video".to_string()],
            file_pattern: None,
            gender_column: false,
            jobs: 1,
        }
    }
}

/// Counts gathered while assembling.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AssemblyReport {
    pub processed: usize,
    pub skipped: usize,
    pub skipped_files: Vec<String>,
    pub unmatched_eval: usize,
    pub unmatched_participant: usize,
    /// Audio-side join keys shared by several rows.
    pub duplicate_audio_keys: Vec<DuplicateKey>,
    pub all_missing_columns: Vec<String>,
}

/// A join key carried by more than one audio row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateKey {
    /// Metadata table the rows were joined against.
    pub table: String,
    pub key: String,
    pub count: usize,
}

/// Builds a [`Dataset`] from a directory of recordings and two metadata tables.
pub struct DatasetAssembler {
    extractor: Box<dyn FeatureExtractor>,
    settings: AssemblerSettings,
    normalizer: KeyNormalizer,
    file_pattern: Option<Regex>,
}

impl DatasetAssembler {
    pub fn new(extractor: Box<dyn FeatureExtractor>, settings: AssemblerSettings) -> Result<Self> {
        let normalizer = KeyNormalizer::new(&settings.prefix_rules)?;
        let file_pattern = settings
            .file_pattern
            .as_deref()
            .map(Regex::new)
            .transpose()
            .map_err(|err| VoxsetError::Config(format!("invalid file_pattern: {err}")))?;
        if settings.jobs == 0 {
            return Err(VoxsetError::Config("jobs must be at least 1".to_string()));
        }
        Ok(Self {
            extractor,
            settings,
            normalizer,
            file_pattern,
        })
    }

    pub fn extractor(&self) -> &dyn FeatureExtractor {
        self.extractor.as_ref()
    }

    pub fn settings(&self) -> &AssemblerSettings {
        &self.settings
    }

    /// Audio files under `base_dir` for the configured layout, sorted by path.
    pub fn enumerate(&self, base_dir: &Path) -> Result<Vec<PathBuf>> {
        if !base_dir.is_dir() {
            return Err(VoxsetError::Config(format!(
                "audio directory {} does not exist",
                base_dir.display()
            )));
        }
        let depth = self.settings.layout.depth();
        let mut files: Vec<PathBuf> = WalkDir::new(base_dir)
            .follow_links(true)
            .min_depth(depth)
            .max_depth(depth)
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(err) => {
                    warn!(error = %err, "skipping unreadable directory entry");
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|path| self.accepts(path))
            .collect();
        files.sort();
        Ok(files)
    }

    fn accepts(&self, path: &Path) -> bool {
        let extension_ok = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case(&self.settings.extension));
        if !extension_ok {
            return false;
        }
        let is_segment = path
            .file_name()
            .map(|name| name.to_string_lossy().contains(&self.settings.segment_marker))
            .unwrap_or(false);
        !(self.settings.exclude_segments && is_segment)
    }

    /// Extract every file, keeping enumeration order. Runs on a dedicated
    /// pool of `jobs` threads when `jobs > 1`.
    fn extract_all(
        &self,
        paths: &[PathBuf],
    ) -> Result<Vec<(PathBuf, std::result::Result<FeatureRecord, DecodeError>)>> {
        let run = |path: &PathBuf| {
            let label = label_from_path(path);
            debug!(file = %path.display(), label = %label, "extracting");
            (path.clone(), self.extractor.try_extract(path, &label))
        };
        if self.settings.jobs <= 1 {
            return Ok(paths.iter().map(run).collect());
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.settings.jobs)
            .build()
            .map_err(|err| VoxsetError::Config(format!("failed to start worker pool: {err}")))?;
        Ok(pool.install(|| paths.par_iter().map(run).collect()))
    }

    pub fn assemble(&self, base_dir: &Path) -> Result<(Dataset, AssemblyReport)> {
        let evaluation = self
            .settings
            .evaluation
            .as_ref()
            .map(|source| source.load("evaluation", &self.normalizer))
            .transpose()?;
        let participants = self
            .settings
            .participants
            .as_ref()
            .map(|source| source.load("participants", &self.normalizer))
            .transpose()?;

        let paths = self.enumerate(base_dir)?;
        info!(
            base_dir = %base_dir.display(),
            files = paths.len(),
            extractor = self.extractor.kind().as_str(),
            jobs = self.settings.jobs,
            "assembling dataset"
        );

        let mut report = AssemblyReport::default();
        let mut records = Vec::with_capacity(paths.len());
        for (path, outcome) in self.extract_all(&paths)? {
            match outcome {
                Ok(record) => records.push(record),
                Err(err) => {
                    warn!(file = %path.display(), error = %err.reason, "skipping undecodable file");
                    report.skipped += 1;
                    report.skipped_files.push(path.display().to_string());
                }
            }
        }
        report.processed = records.len();
        if records.is_empty() {
            return Err(VoxsetError::EmptyDataset {
                base_dir: base_dir.to_path_buf(),
                skipped: report.skipped,
            });
        }

        let (mut table, mut spectrograms) = self.base_table(records);

        if let (Some(source), Some(evaluation)) = (&self.settings.evaluation, &evaluation) {
            let outcome = table.left_join(
                evaluation,
                &source.join_on,
                KEY_COLUMN,
                "evaluation",
                source.one_to_one,
            )?;
            report.unmatched_eval = outcome.unmatched;
            note_duplicates(&mut report, "evaluation", outcome.duplicate_left_keys);
            table = outcome.table;
        }
        if let (Some(source), Some(participants)) = (&self.settings.participants, &participants) {
            let outcome = table.left_join(
                participants,
                &source.join_on,
                KEY_COLUMN,
                "participants",
                source.one_to_one,
            )?;
            report.unmatched_participant = outcome.unmatched;
            note_duplicates(&mut report, "participants", outcome.duplicate_left_keys);
            table = outcome.table;
        }
        if report.unmatched_eval > 0 || report.unmatched_participant > 0 {
            info!(
                unmatched_eval = report.unmatched_eval,
                unmatched_participant = report.unmatched_participant,
                "audio rows without metadata match"
            );
        }

        self.finalize(&mut table, &mut spectrograms)?;

        report.all_missing_columns = table.all_missing_columns();
        for column in &report.all_missing_columns {
            warn!(column = %column, "column has no values in any row");
        }
        info!(
            rows = table.len(),
            columns = table.columns().len(),
            skipped = report.skipped,
            "dataset assembled"
        );
        Ok((
            Dataset {
                table,
                spectrograms,
            },
            report,
        ))
    }

    fn base_table(
        &self,
        records: Vec<FeatureRecord>,
    ) -> (Table, Vec<(String, ndarray::Array2<f32>)>) {
        let schema = self.extractor.schema();
        let mut columns = vec!["file".to_string(), "label".to_string()];
        if self.settings.gender_column {
            columns.push("gender".to_string());
        }
        columns.extend(schema.iter().cloned());
        columns.push("sample_name".to_string());

        let suffix = self.settings.sample_suffix.as_deref();
        let mut table = Table::new(columns);
        let mut spectrograms = Vec::new();
        for record in records {
            let mut row = Vec::with_capacity(schema.len() + 4);
            let sample = sample_name(&record.file, &record.label, suffix);
            row.push(Cell::from(record.file.as_str()));
            row.push(Cell::from(record.label.as_str()));
            if self.settings.gender_column {
                let gender = record.label.split('-').next().unwrap_or_default();
                row.push(Cell::from(gender));
            }
            row.extend(schema.iter().map(|key| Cell::from(record.get(key).flatten())));
            row.push(Cell::from(sample));
            table.push_row(row);
            if let Some(spectrogram) = record.spectrogram {
                spectrograms.push((record.file, spectrogram));
            }
        }
        (table, spectrograms)
    }

    fn finalize(
        &self,
        table: &mut Table,
        spectrograms: &mut Vec<(String, ndarray::Array2<f32>)>,
    ) -> Result<()> {
        if let Some(pattern) = &self.file_pattern {
            let file_index = table.require_column("audio", "file")?;
            let before = table.len();
            table.retain_rows(|row| {
                row[file_index]
                    .as_text()
                    .is_some_and(|file| pattern.is_match(file))
            });
            let kept: HashSet<String> = table
                .column(file_index)
                .filter_map(|cell| cell.as_text().map(str::to_string))
                .collect();
            spectrograms.retain(|(file, _)| kept.contains(file));
            if table.len() < before {
                info!(
                    removed = before - table.len(),
                    pattern = %pattern,
                    "rows removed by file pattern"
                );
            }
        }
        table.drop_columns(&self.settings.drop_columns);
        let topics = &self.settings.drop_containing;
        table.drop_columns_where(|name| topics.iter().any(|topic| name.contains(topic.as_str())));
        table.lowercase_columns();
        Ok(())
    }
}

fn note_duplicates(report: &mut AssemblyReport, table: &str, duplicates: Vec<(String, usize)>) {
    for (key, count) in duplicates {
        warn!(table, key = %key, count, "audio rows share a join key");
        report.duplicate_audio_keys.push(DuplicateKey {
            table: table.to_string(),
            key,
            count,
        });
    }
}
