mod common;

use std::path::Path;

use common::{capture_warnings, write_corrupt_wav, write_text, write_voice_like_wav};
use voxset::config::{Corpus, DataConfig};
use voxset::dataset::{
    AssemblerSettings, AssemblyReport, Dataset, DatasetAssembler, DuplicateKey, MetadataKey,
    MetadataSource,
};
use voxset::features::{ExtractorKind, ExtractorSettings};
use voxset::types::Cell;
use voxset::VoxsetError;

fn assembler(kind: ExtractorKind, settings: AssemblerSettings) -> DatasetAssembler {
    let extractor = ExtractorSettings {
        kind,
        ..ExtractorSettings::default()
    }
    .build();
    DatasetAssembler::new(extractor, settings).expect("valid assembler settings")
}

fn row_of(dataset: &Dataset, file: &str) -> usize {
    let index = dataset.table.column_index("file").expect("file column");
    dataset
        .table
        .rows()
        .iter()
        .position(|row| row[index].as_text() == Some(file))
        .unwrap_or_else(|| panic!("no row for {file}"))
}

fn write_scenario(dir: &Path) {
    write_voice_like_wav(&dir.join("audio/F-1_x.wav"), 210.0, 0.6, 1);
    write_voice_like_wav(&dir.join("audio/M-2_y.wav"), 120.0, 0.6, 2);
    write_voice_like_wav(&dir.join("audio/F-3_z.wav"), 230.0, 0.6, 1);
    write_text(
        &dir.join("participants.csv"),
        "Participant,Age,Sex,CollectionDate,Experimenter\n\
         1,30,F,2021-03-01,A\n\
         2,45,M,2021-03-02,B\n\
         3,22,F,2021-03-03,A\n",
    );
    write_text(
        &dir.join("eval.tsv"),
        "SEX\tDONOR\tstimulussex\tscore\tFaceRating\tVideoRating\n\
         FO\t1\tF\t4.5\t1\t2\n\
         H\t2\tM\t3.0\t2\t3\n",
    );
}

fn scenario_settings(dir: &Path) -> AssemblerSettings {
    let mut participants = MetadataSource::participants(dir.join("participants.csv"), "label");
    participants.key = MetadataKey::compound("Sex", "Participant");
    AssemblerSettings {
        evaluation: Some(MetadataSource::evaluation(dir.join("eval.tsv"))),
        participants: Some(participants),
        ..AssemblerSettings::default()
    }
}

#[test]
fn three_files_join_evaluation_and_participants() {
    let dir = tempfile::tempdir().unwrap();
    write_scenario(dir.path());

    let (dataset, report) = assembler(ExtractorKind::Prosody, scenario_settings(dir.path()))
        .assemble(&dir.path().join("audio"))
        .unwrap();

    assert_eq!(dataset.table.len(), 3);
    assert_eq!(
        report,
        AssemblyReport {
            processed: 3,
            unmatched_eval: 1,
            ..report.clone()
        }
    );
    assert_eq!(report.unmatched_participant, 0);

    let columns = dataset.table.columns();
    for expected in ["file", "label", "duration", "f0_mean", "sample_name", "score", "age", "sex"] {
        assert!(columns.iter().any(|c| c == expected), "missing {expected}");
    }
    for dropped in ["sex_participants", "donor", "stimulussex", "participant", "facerating"] {
        assert!(!columns.iter().any(|c| c == dropped), "kept {dropped}");
    }
    assert!(columns.iter().all(|c| *c == c.to_lowercase()));

    let first = row_of(&dataset, "F-1_x.wav");
    assert_eq!(dataset.table.cell(first, "score"), Some(&Cell::Number(4.5)));
    assert_eq!(dataset.table.cell(first, "age"), Some(&Cell::Number(30.0)));

    let third = row_of(&dataset, "F-3_z.wav");
    assert_eq!(dataset.table.cell(third, "score"), Some(&Cell::Missing));
    assert_eq!(dataset.table.cell(third, "age"), Some(&Cell::Number(22.0)));
    assert_eq!(dataset.table.cell(third, "label"), Some(&Cell::from("F-3")));
}

#[test]
fn corrupt_file_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    for i in 0..9 {
        write_voice_like_wav(&dir.path().join(format!("F-{i}_x.wav")), 200.0, 0.3, 1);
    }
    write_corrupt_wav(&dir.path().join("M-99_x.wav"));

    let (dataset, report) = assembler(ExtractorKind::Prosody, AssemblerSettings::default())
        .assemble(dir.path())
        .unwrap();
    assert_eq!(dataset.table.len(), 9);
    assert_eq!(report.skipped, 1);
    assert!(report.skipped_files[0].ends_with("M-99_x.wav"));
}

#[test]
fn no_valid_files_is_empty_dataset() {
    let dir = tempfile::tempdir().unwrap();
    write_corrupt_wav(&dir.path().join("F-1_x.wav"));
    write_text(&dir.path().join("readme.txt"), "not audio");

    let err = assembler(ExtractorKind::Prosody, AssemblerSettings::default())
        .assemble(dir.path())
        .unwrap_err();
    assert!(matches!(err, VoxsetError::EmptyDataset { skipped: 1, .. }));

    let empty = tempfile::tempdir().unwrap();
    let err = assembler(ExtractorKind::Prosody, AssemblerSettings::default())
        .assemble(empty.path())
        .unwrap_err();
    assert!(matches!(err, VoxsetError::EmptyDataset { skipped: 0, .. }));
}

#[test]
fn duplicate_participant_is_join_cardinality_error() {
    let dir = tempfile::tempdir().unwrap();
    write_scenario(dir.path());
    write_text(
        &dir.path().join("participants.csv"),
        "Participant,Age,Sex\n1,30,F\n1,31,F\n2,45,M\n",
    );

    let err = assembler(ExtractorKind::Prosody, scenario_settings(dir.path()))
        .assemble(&dir.path().join("audio"))
        .unwrap_err();
    match err {
        VoxsetError::JoinCardinality { table, key, count } => {
            assert_eq!(table, "participants");
            assert_eq!(key, "F-1");
            assert_eq!(count, 2);
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn non_numeric_age_becomes_missing() {
    let dir = tempfile::tempdir().unwrap();
    write_scenario(dir.path());
    write_text(
        &dir.path().join("participants.csv"),
        "Participant,Age,Sex\n1,unknown,F\n2,45,M\n3,22,F\n",
    );

    let (dataset, _) = assembler(ExtractorKind::Prosody, scenario_settings(dir.path()))
        .assemble(&dir.path().join("audio"))
        .unwrap();
    let first = row_of(&dataset, "F-1_x.wav");
    assert_eq!(dataset.table.cell(first, "age"), Some(&Cell::Missing));
}

#[test]
fn vowel_corpus_uses_nested_layout_and_file_pattern() {
    let dir = tempfile::tempdir().unwrap();
    let audio = dir.path().join("vowels");
    write_voice_like_wav(&audio.join("F/F-1_VoiceVowel.wav"), 220.0, 0.5, 1);
    write_voice_like_wav(&audio.join("M/M-2_VoiceVowel.wav"), 110.0, 0.5, 1);
    write_voice_like_wav(&audio.join("M/extra_VoiceVowel.wav"), 110.0, 0.5, 1);
    write_voice_like_wav(&audio.join("stray_VoiceVowel.wav"), 110.0, 0.5, 1);
    write_text(
        &dir.path().join("participants.csv"),
        "Participant,Age,Sex\nF-1,61,F\nM-2,24,M\n",
    );
    write_text(
        &dir.path().join("eval.tsv"),
        "SEX\tDONOR\tstimulussex\tpleasantness\nFO\t1\tF\t5\nH\t2\tM\t2\n",
    );

    let mut config = DataConfig::preset(Corpus::Vowel);
    config.extractor.kind = ExtractorKind::Prosody;
    if let Some(source) = config.assembler.evaluation.as_mut() {
        source.path = dir.path().join("eval.tsv");
    }
    if let Some(source) = config.assembler.participants.as_mut() {
        source.path = dir.path().join("participants.csv");
    }

    let (dataset, report) = DatasetAssembler::new(config.extractor.build(), config.assembler)
        .unwrap()
        .assemble(&audio)
        .unwrap();
    assert_eq!(report.processed, 3);
    assert_eq!(dataset.table.len(), 2);

    let male = row_of(&dataset, "M-2_VoiceVowel.wav");
    assert_eq!(dataset.table.cell(male, "sample_name"), Some(&Cell::from("M-2")));
    assert_eq!(dataset.table.cell(male, "pleasantness"), Some(&Cell::Number(2.0)));
    assert_eq!(dataset.table.cell(male, "age"), Some(&Cell::Number(24.0)));
}

#[test]
fn parallel_run_matches_sequential_run() {
    let dir = tempfile::tempdir().unwrap();
    for (i, f0) in [180.0, 120.0, 240.0, 150.0, 200.0].into_iter().enumerate() {
        write_voice_like_wav(&dir.path().join(format!("F-{i}_x.wav")), f0, 0.4, 1);
    }

    let sequential = assembler(ExtractorKind::Prosody, AssemblerSettings::default())
        .assemble(dir.path())
        .unwrap()
        .0;
    let parallel = assembler(
        ExtractorKind::Prosody,
        AssemblerSettings {
            jobs: 3,
            ..AssemblerSettings::default()
        },
    )
    .assemble(dir.path())
    .unwrap()
    .0;
    assert_eq!(sequential.table, parallel.table);
}

#[test]
fn mel_dataset_carries_fixed_shape_spectrograms() {
    let dir = tempfile::tempdir().unwrap();
    write_voice_like_wav(&dir.path().join("F-1_x.wav"), 200.0, 0.5, 1);
    write_voice_like_wav(&dir.path().join("M-2_x.wav"), 110.0, 4.0, 1);

    let (dataset, _) = assembler(ExtractorKind::Mel, AssemblerSettings::default())
        .assemble(dir.path())
        .unwrap();
    assert_eq!(dataset.spectrograms.len(), 2);
    for (_, spectrogram) in &dataset.spectrograms {
        assert_eq!(spectrogram.dim(), (128, 93));
    }
    assert!(dataset
        .table
        .columns()
        .iter()
        .any(|c| c == "mel_strength_127"));
}

#[test]
fn shared_audio_keys_are_reported() {
    let dir = tempfile::tempdir().unwrap();
    write_voice_like_wav(&dir.path().join("audio/F-1_a.wav"), 210.0, 0.4, 1);
    write_voice_like_wav(&dir.path().join("audio/F-1_b.wav"), 205.0, 0.4, 1);
    write_voice_like_wav(&dir.path().join("audio/M-2_a.wav"), 120.0, 0.4, 1);
    write_text(
        &dir.path().join("participants.csv"),
        "Participant,Age,Sex\nF-1,30,F\nM-2,45,M\n",
    );
    let settings = AssemblerSettings {
        participants: Some(MetadataSource::participants(
            dir.path().join("participants.csv"),
            "label",
        )),
        ..AssemblerSettings::default()
    };

    let (outcome, logs) = capture_warnings(|| {
        assembler(ExtractorKind::Prosody, settings).assemble(&dir.path().join("audio"))
    });
    let (dataset, report) = outcome.unwrap();

    assert_eq!(dataset.table.len(), 3);
    assert_eq!(
        report.duplicate_audio_keys,
        vec![DuplicateKey {
            table: "participants".to_string(),
            key: "F-1".to_string(),
            count: 2,
        }]
    );
    let warnings: Vec<&str> = logs
        .lines()
        .filter(|line| line.contains("audio rows share a join key"))
        .collect();
    assert_eq!(warnings.len(), 1, "{logs}");
    assert!(warnings[0].contains("key=F-1"), "{logs}");
    assert!(warnings[0].contains("count=2"), "{logs}");
}

#[test]
fn librosa_corpus_adds_gender_column() {
    let dir = tempfile::tempdir().unwrap();
    write_voice_like_wav(&dir.path().join("audio/F-1_x.wav"), 210.0, 0.4, 1);
    write_voice_like_wav(&dir.path().join("audio/M-2_x.wav"), 120.0, 0.4, 1);
    write_text(
        &dir.path().join("participants.csv"),
        "Participant,Age,Sex,CollectionDate,Experimenter,RESTRICTION OF USE\n\
         F-1,30,F,2021-03-01,A,none\n\
         M-2,45,M,2021-03-02,B,none\n",
    );

    let mut config = DataConfig::preset(Corpus::Librosa);
    if let Some(source) = config.assembler.participants.as_mut() {
        source.path = dir.path().join("participants.csv");
    }
    let (dataset, report) = DatasetAssembler::new(config.extractor.build(), config.assembler)
        .unwrap()
        .assemble(&dir.path().join("audio"))
        .unwrap();

    assert!(report.duplicate_audio_keys.is_empty());
    let columns = dataset.table.columns();
    assert_eq!(&columns[..3], ["file", "label", "gender"]);
    for dropped in ["sex", "participant", "collectiondate", "experimenter"] {
        assert!(!columns.iter().any(|c| c == dropped), "kept {dropped}");
    }
    let male = row_of(&dataset, "M-2_x.wav");
    assert_eq!(dataset.table.cell(male, "gender"), Some(&Cell::from("M")));
    assert_eq!(dataset.table.cell(male, "age"), Some(&Cell::Number(45.0)));

    let (plain, _) = assembler(ExtractorKind::Prosody, AssemblerSettings::default())
        .assemble(&dir.path().join("audio"))
        .unwrap();
    assert!(!plain.table.columns().iter().any(|c| c == "gender"));
}
