use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use voxset::cli::{BuildArgs, Cli, Command, CompareArgs, ExtractArgs};
use voxset::dataset::{compare, RawRecords};
use voxset::features::label_from_path;
use voxset::pipeline;
use voxset::tracking::{ExperimentLogger, FileRunLogger, TracingLogger};

fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Build(args) => handle_build(&args),
        Command::Extract(args) => handle_extract(&args),
        Command::Compare(args) => handle_compare(&args),
    }
}

fn handle_build(args: &BuildArgs) -> Result<ExitCode> {
    let config = args.data_config()?;
    let mut logger: Box<dyn ExperimentLogger> = match &config.runs_dir {
        Some(dir) => {
            let logger = FileRunLogger::create(dir)
                .with_context(|| format!("failed to create run directory under {:?}", dir))?;
            info!(run_id = logger.run_id(), "logging run to file store");
            Box::new(logger)
        }
        None => Box::new(TracingLogger),
    };

    let outcome = pipeline::build(&config, logger.as_mut())?;
    println!(
        "Created dataset with {} samples at {}",
        outcome.rows,
        outcome.output_path.display()
    );
    if outcome.report.skipped > 0 {
        println!("Skipped {} undecodable files", outcome.report.skipped);
    }
    Ok(ExitCode::SUCCESS)
}

fn handle_extract(args: &ExtractArgs) -> Result<ExitCode> {
    let settings = args.settings();
    settings
        .validate()
        .map_err(anyhow::Error::msg)
        .context("invalid extractor settings")?;
    let extractor = settings.build();
    let label = label_from_path(&args.file);
    let mut record = extractor
        .try_extract(&args.file, &label)
        .with_context(|| format!("failed to load {:?}", args.file))?;
    if args.no_spectrogram {
        record.spectrogram = None;
    }
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(ExitCode::SUCCESS)
}

fn handle_compare(args: &CompareArgs) -> Result<ExitCode> {
    let delimiter = u8::try_from(args.delimiter)
        .ok()
        .filter(u8::is_ascii)
        .context("delimiter must be a single ASCII character")?;
    let left = RawRecords::read(&args.left, delimiter)
        .with_context(|| format!("failed to read {:?}", args.left))?;
    let right = RawRecords::read(&args.right, delimiter)
        .with_context(|| format!("failed to read {:?}", args.right))?;

    let diff = compare(&left, &right);
    if let Some((left_header, right_header)) = &diff.header_diff {
        println!("Headers differ!");
        println!("{:?}", left_header);
        println!("{:?}", right_header);
    }
    if diff.left_rows != diff.right_rows {
        println!("Row counts differ: {} vs {}", diff.left_rows, diff.right_rows);
    }
    for row in &diff.differing_rows {
        println!("Row {row} differs");
    }
    println!("Files are identical: {}", diff.is_identical());
    Ok(if diff.is_identical() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
