use anyhow::Result;
use message_decoding_r1::mapping::MAPPING_KEYS;
use message_decoding_r1::pipeline::{self, PipelineConfig, VerifyMode};
use message_decoding_r1::schema::r1_features;
use message_decoding_r1::source::Source;
use polars::prelude::*;
use rstest::*;
use std::fs::File;
use std::path::{Path, PathBuf};

const PNG_HEADER: &[u8] = &[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];

/// Writes a source parquet file shaped like the Hub dataset. Rows whose index
/// is a multiple of `broken_every` get a wrong decoded message.
fn write_source(dir: &Path, rows: usize, broken_every: Option<usize>) -> Result<PathBuf> {
    let bytes: Vec<Option<&[u8]>> = (0..rows).map(|_| Some(PNG_HEADER)).collect();
    let paths: Vec<String> = (0..rows).map(|i| format!("images/{i}.png")).collect();
    let image = DataFrame::new(vec![
        Column::new("bytes".into(), bytes),
        Column::new("path".into(), paths.clone()),
    ])?
    .into_struct("image".into())
    .into_series()
    .into_column();

    // identity mapping: every key maps to itself
    let mapping_columns = MAPPING_KEYS
        .iter()
        .map(|key| Column::new((*key).into(), vec![key.to_string(); rows]))
        .collect();
    let mapping = DataFrame::new(mapping_columns)?
        .into_struct("mapping".into())
        .into_series()
        .into_column();

    let decoded: Vec<&str> = (0..rows)
        .map(|i| match broken_every {
            Some(n) if i % n == 0 => "wrong answer",
            _ => "hello world",
        })
        .collect();

    let mut df = DataFrame::new(vec![
        image,
        Column::new("coded_message".into(), vec!["hello_world"; rows]),
        Column::new("decoded_message".into(), decoded),
        mapping,
        Column::new("task".into(), vec!["sequence"; rows]),
        Column::new("file_path".into(), paths),
    ])?;

    let path = dir.join("source.parquet");
    let mut file = File::create(&path)?;
    ParquetWriter::new(&mut file).finish(&mut df)?;
    Ok(path)
}

fn read_parquet(path: &Path) -> Result<DataFrame> {
    let mut file = File::open(path)?;
    Ok(ParquetReader::new(&mut file).finish()?)
}

/// Paths of every image found in the message content of a shard.
fn image_paths(path: &Path) -> Result<Vec<String>> {
    let df = read_parquet(path)?;
    let mut paths = vec![];
    let conversations = df.column("messages")?.as_materialized_series().list()?;
    for turns in conversations.into_iter().flatten() {
        let contents = turns.struct_()?.field_by_name("content")?;
        for content in contents.list()?.into_iter().flatten() {
            let images = content.struct_()?.field_by_name("image")?;
            let image_paths = images.struct_()?.field_by_name("path")?;
            paths.extend(image_paths.str()?.into_iter().flatten().map(str::to_string));
        }
    }
    Ok(paths)
}

#[fixture]
fn workspace() -> tempfile::TempDir {
    tempfile::tempdir().unwrap()
}

#[rstest]
fn test_build_from_local_source(workspace: tempfile::TempDir) -> Result<()> {
    let source = write_source(workspace.path(), 30, None)?;
    let out = workspace.path().join("out");
    let config = PipelineConfig::new(Source::Local(vec![source]), &out);

    let report = pipeline::run(&config)?;
    assert_eq!(report.train_rows, 27);
    assert_eq!(report.test_rows, 3);
    assert_eq!(report.mismatches, 0);

    let train = read_parquet(&out.join("data/train-00000-of-00001.parquet"))?;
    let test = read_parquet(&out.join("data/test-00000-of-00001.parquet"))?;
    assert_eq!(train.height(), 27);
    assert_eq!(test.height(), 3);
    r1_features().check_frame(&train)?;
    assert!(train.column("image").is_err());
    assert_eq!(image_paths(&out.join("data/train-00000-of-00001.parquet"))?.len(), 27);

    let coded = train
        .column("coded_message")?
        .as_materialized_series()
        .str()?
        .get(0)
        .map(str::to_string);
    assert_eq!(coded.as_deref(), Some("h e l l o _ w o r l d"));
    let decoded = train
        .column("decoded_message")?
        .as_materialized_series()
        .str()?
        .get(0)
        .map(str::to_string);
    assert_eq!(decoded.as_deref(), Some("hello world"));

    let card = std::fs::read_to_string(out.join("README.md"))?;
    assert!(card.contains("num_examples: 27"));
    assert!(card.contains("path: data/test-*"));
    Ok(())
}

#[rstest]
fn test_limit_and_seed(workspace: tempfile::TempDir) -> Result<()> {
    let source = write_source(workspace.path(), 50, None)?;
    let mut config =
        PipelineConfig::new(Source::Local(vec![source]), workspace.path().join("a"));
    config.limit = Some(20);
    config.test_size = 0.25;

    let report = pipeline::run(&config)?;
    assert_eq!(report.train_rows + report.test_rows, 20);
    assert_eq!(report.test_rows, 5);

    config.output_dir = workspace.path().join("b");
    let again = pipeline::run(&config)?;
    let first = image_paths(&report.files[1].local_path)?;
    let second = image_paths(&again.files[1].local_path)?;
    assert_eq!(first.len(), 5);
    assert_eq!(first, second);
    Ok(())
}

#[rstest]
fn test_verify_modes(workspace: tempfile::TempDir) -> Result<()> {
    let source = write_source(workspace.path(), 10, Some(5))?;
    let mut config =
        PipelineConfig::new(Source::Local(vec![source]), workspace.path().join("out"));

    let report = pipeline::run(&config)?;
    assert_eq!(report.mismatches, 2);

    config.verify = VerifyMode::Strict;
    assert!(pipeline::run(&config).is_err());

    config.verify = VerifyMode::Off;
    assert_eq!(pipeline::run(&config)?.mismatches, 0);
    Ok(())
}
