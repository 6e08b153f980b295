//! Join-key derivation for audio rows and metadata tables.

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::table::Table;
use crate::error::{Result, VoxsetError};
use crate::types::Cell;

/// Ordered regex substitution applied to derived metadata keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrefixRule {
    pub pattern: String,
    pub replacement: String,
}

impl PrefixRule {
    pub fn new(pattern: impl Into<String>, replacement: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            replacement: replacement.into(),
        }
    }
}

/// Legacy sex codes: `FO-12` becomes `F-12`, `H-7` becomes `M-7`.
pub fn default_prefix_rules() -> Vec<PrefixRule> {
    vec![PrefixRule::new("^FO", "F"), PrefixRule::new("^H", "M")]
}

/// Compiled prefix rules. The first matching rule is applied once; later
/// rules never see its output.
#[derive(Debug, Clone)]
pub struct KeyNormalizer {
    rules: Vec<(Regex, String)>,
}

impl KeyNormalizer {
    pub fn new(rules: &[PrefixRule]) -> Result<Self> {
        let rules = rules
            .iter()
            .map(|rule| {
                Regex::new(&rule.pattern)
                    .map(|regex| (regex, rule.replacement.clone()))
                    .map_err(|err| {
                        VoxsetError::Config(format!("invalid key rule `{}`: {err}", rule.pattern))
                    })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rules })
    }

    pub fn normalize(&self, key: &str) -> String {
        self.rules
            .iter()
            .find(|(regex, _)| regex.is_match(key))
            .map(|(regex, replacement)| regex.replace(key, replacement.as_str()).into_owned())
            .unwrap_or_else(|| key.to_string())
    }
}

/// How a metadata table's join key is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataKey {
    /// `{sex}-{id}` from two columns, then normalized by the prefix rules.
    Compound { sex: String, id: String },
    /// One column used as is.
    Column { column: String },
}

impl MetadataKey {
    pub fn column(name: impl Into<String>) -> Self {
        MetadataKey::Column {
            column: name.into(),
        }
    }

    pub fn compound(sex: impl Into<String>, id: impl Into<String>) -> Self {
        MetadataKey::Compound {
            sex: sex.into(),
            id: id.into(),
        }
    }

    /// Columns the key is read from.
    pub fn source_columns(&self) -> Vec<&str> {
        match self {
            MetadataKey::Compound { sex, id } => vec![sex.as_str(), id.as_str()],
            MetadataKey::Column { column } => vec![column.as_str()],
        }
    }

    /// One key per row of `table`; rows lacking a part get a missing key.
    pub fn derive(
        &self,
        table: &Table,
        table_name: &str,
        normalizer: &KeyNormalizer,
    ) -> Result<Vec<Cell>> {
        match self {
            MetadataKey::Column { column } => {
                let index = table.require_column(table_name, column)?;
                Ok(table
                    .column(index)
                    .map(|cell| cell.key_string().map(Cell::from).unwrap_or_default())
                    .collect())
            }
            MetadataKey::Compound { sex, id } => {
                let sex_index = table.require_column(table_name, sex)?;
                let id_index = table.require_column(table_name, id)?;
                Ok(table
                    .rows()
                    .iter()
                    .map(|row| {
                        match (row[sex_index].key_string(), row[id_index].key_string()) {
                            (Some(sex), Some(id)) => {
                                Cell::from(normalizer.normalize(&format!("{sex}-{id}")))
                            }
                            _ => Cell::Missing,
                        }
                    })
                    .collect())
            }
        }
    }
}

/// `file` with `suffix` removed; `label` when no suffix is configured.
pub fn sample_name(file: &str, label: &str, suffix: Option<&str>) -> String {
    match suffix {
        Some(suffix) if !suffix.is_empty() => file.replace(suffix, ""),
        _ => label.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalizer() -> KeyNormalizer {
        KeyNormalizer::new(&default_prefix_rules()).unwrap()
    }

    #[test]
    fn legacy_prefixes_collapse() {
        let n = normalizer();
        assert_eq!(n.normalize("FO-12"), "F-12");
        assert_eq!(n.normalize("H-7"), "M-7");
        assert_eq!(n.normalize("F-3"), "F-3");
        assert_eq!(n.normalize("M-4"), "M-4");
    }

    #[test]
    fn first_matching_rule_wins() {
        let n = KeyNormalizer::new(&[
            PrefixRule::new("^HO", "F"),
            PrefixRule::new("^F", "X"),
        ])
        .unwrap();
        assert_eq!(n.normalize("HO-1"), "F-1");
    }

    #[test]
    fn invalid_rule_is_config_error() {
        let err = KeyNormalizer::new(&[PrefixRule::new("(", "x")]).unwrap_err();
        assert!(matches!(err, VoxsetError::Config(_)));
    }

    #[test]
    fn compound_key_reads_sex_and_donor() {
        let mut table = Table::new(vec!["SEX".into(), "DONOR".into()]);
        table.push_row(vec![Cell::parse("FO"), Cell::parse("12")]);
        table.push_row(vec![Cell::parse("H"), Cell::parse("7")]);
        table.push_row(vec![Cell::Missing, Cell::parse("9")]);
        let keys = MetadataKey::compound("SEX", "DONOR")
            .derive(&table, "evaluation", &normalizer())
            .unwrap();
        assert_eq!(keys, vec![Cell::from("F-12"), Cell::from("M-7"), Cell::Missing]);
    }

    #[test]
    fn column_key_prints_integers_plainly() {
        let mut table = Table::new(vec!["Participant".into()]);
        table.push_row(vec![Cell::parse("3")]);
        let keys = MetadataKey::column("Participant")
            .derive(&table, "participants", &normalizer())
            .unwrap();
        assert_eq!(keys, vec![Cell::from("3")]);
    }

    #[test]
    fn metadata_key_parses_from_json() {
        let compound: MetadataKey =
            serde_json::from_str(r#"{"sex": "SEX", "id": "DONOR"}"#).unwrap();
        assert_eq!(compound, MetadataKey::compound("SEX", "DONOR"));
        let column: MetadataKey = serde_json::from_str(r#"{"column": "Participant"}"#).unwrap();
        assert_eq!(column, MetadataKey::column("Participant"));
    }

    #[test]
    fn sample_name_strips_suffix() {
        assert_eq!(
            sample_name("F-1_VoiceVowel.wav", "F-1", Some("_VoiceVowel.wav")),
            "F-1"
        );
        assert_eq!(sample_name("F-1_x.wav", "F-1", None), "F-1");
    }
}
