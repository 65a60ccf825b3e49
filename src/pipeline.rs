//! The build-and-publish pipeline
//!
//! fetch -> read -> extract -> verify -> transform -> split -> write -> push

use crate::card::{DatasetCard, CARD_FILENAME};
use crate::error::{Error, Result};
use crate::example::DecodingExample;
use crate::frame::{write_split, SplitFile, DEFAULT_MAX_SHARD_BYTES};
use crate::hub::{CommitInfo, HubClient, UploadFile, DEFAULT_ENDPOINT, DEFAULT_REVISION};
use crate::messages::{generate_r1_messages, R1Record};
use crate::prompt::R1PromptFormatter;
use crate::schema::r1_features;
use crate::secrets::SecretString;
use crate::source::{examples_from_frame, fetch_parquet, read_frame, Source};
use crate::split::{train_test_split, DEFAULT_SEED, DEFAULT_TEST_SIZE};
use std::path::PathBuf;

pub const DEFAULT_TARGET_REPO: &str = "sunildkumar/message-decoding-words-and-sequences-r1";
pub const TOKEN_ENV_VAR: &str = "HUGGINGFACE_HUB_TOKEN";
pub const TRAIN_SPLIT: &str = "train";
pub const TEST_SPLIT: &str = "test";

/// What to do with rows whose mapping does not decode to the stated answer.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum VerifyMode {
    /// Skip the check.
    Off,
    /// Log mismatches and keep the rows.
    #[default]
    Warn,
    /// Fail on the first mismatch.
    Strict,
}

#[derive(Debug, Clone)]
pub struct PushConfig {
    pub repo_id: String,
    pub private: bool,
    pub revision: String,
    pub commit_message: String,
    pub endpoint: String,
}

impl PushConfig {
    pub fn new(repo_id: impl Into<String>) -> Self {
        Self {
            repo_id: repo_id.into(),
            private: false,
            revision: DEFAULT_REVISION.to_string(),
            commit_message: "Upload dataset".to_string(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub source: Source,
    /// Directory that image paths in the source are relative to.
    pub image_root: Option<PathBuf>,
    pub output_dir: PathBuf,
    pub test_size: f64,
    pub seed: u64,
    /// Keep only the first `limit` source rows.
    pub limit: Option<usize>,
    pub verify: VerifyMode,
    pub max_shard_bytes: usize,
    pub push: Option<PushConfig>,
    pub token: Option<SecretString>,
}

impl PipelineConfig {
    pub fn new(source: Source, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            source,
            image_root: None,
            output_dir: output_dir.into(),
            test_size: DEFAULT_TEST_SIZE,
            seed: DEFAULT_SEED,
            limit: None,
            verify: VerifyMode::default(),
            max_shard_bytes: DEFAULT_MAX_SHARD_BYTES,
            push: None,
            token: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub train_rows: usize,
    pub test_rows: usize,
    /// Rows whose mapping did not reproduce the decoded message.
    pub mismatches: usize,
    pub files: Vec<SplitFile>,
    pub card_path: PathBuf,
    pub pushed: Option<(String, CommitInfo)>,
}

/// Load the source dataset as typed examples, honoring `limit`.
pub fn load_examples(config: &PipelineConfig) -> Result<Vec<DecodingExample>> {
    tracing::info!(source = %config.source, "fetching source dataset");
    let paths = fetch_parquet(&config.source, config.token.as_ref())?;
    let mut df = read_frame(&paths)?;
    if let Some(limit) = config.limit {
        df = df.head(Some(limit));
    }
    tracing::info!(rows = df.height(), "processing examples");
    examples_from_frame(&df, config.image_root.as_deref())
}

/// Check each example's mapping against its decoded message.
///
/// Returns the number of mismatching rows.
pub fn verify_examples(examples: &[DecodingExample], mode: VerifyMode) -> Result<usize> {
    if mode == VerifyMode::Off {
        return Ok(0);
    }
    let mut mismatches = 0_usize;
    for (row, example) in examples.iter().enumerate() {
        if example
            .mapping
            .verify(&example.coded_message, &example.decoded_message)
        {
            continue;
        }
        let decoded = example.mapping.decode(&example.coded_message);
        if mode == VerifyMode::Strict {
            return Err(Error::invalid_row(
                row,
                format!(
                    "mapping decodes to {decoded:?}, expected {:?}",
                    example.decoded_message
                ),
            ));
        }
        tracing::warn!(
            row,
            expected = example.decoded_message.as_str(),
            decoded = ?decoded,
            "mapping does not reproduce the decoded message"
        );
        mismatches += 1;
    }
    Ok(mismatches)
}

/// Wrap every example in the R1 conversation template.
pub fn transform(examples: &[DecodingExample]) -> Vec<R1Record> {
    let prompt_formatter = R1PromptFormatter;
    examples
        .iter()
        .map(|example| generate_r1_messages(example, &prompt_formatter))
        .collect()
}

/// Run the whole pipeline described by `config`.
pub fn run(config: &PipelineConfig) -> Result<PipelineReport> {
    let examples = load_examples(config)?;
    let mismatches = verify_examples(&examples, config.verify)?;
    let records = transform(&examples);
    build_from_records(config, records, mismatches)
}

/// Split, write and optionally push already transformed records.
pub fn build_from_records(
    config: &PipelineConfig,
    records: Vec<R1Record>,
    mismatches: usize,
) -> Result<PipelineReport> {
    let (train, test) = train_test_split(records, config.test_size, config.seed)?;
    tracing::info!(train = train.len(), test = test.len(), "split dataset");

    let mut files = write_split(
        &config.output_dir,
        TRAIN_SPLIT,
        &train,
        config.max_shard_bytes,
    )?;
    files.extend(write_split(
        &config.output_dir,
        TEST_SPLIT,
        &test,
        config.max_shard_bytes,
    )?);

    let card = DatasetCard::new(r1_features(), &files, config.source.to_string());
    let card_path = card.write(&config.output_dir)?;
    tracing::info!(path = %card_path.display(), "wrote dataset card");

    let pushed = match &config.push {
        Some(push) => {
            let commit = push_files(config, push, &files, &card_path)?;
            Some((push.repo_id.clone(), commit))
        }
        None => None,
    };

    Ok(PipelineReport {
        train_rows: train.len(),
        test_rows: test.len(),
        mismatches,
        files,
        card_path,
        pushed,
    })
}

fn push_files(
    config: &PipelineConfig,
    push: &PushConfig,
    files: &[SplitFile],
    card_path: &std::path::Path,
) -> Result<CommitInfo> {
    let token = config.token.clone().ok_or_else(|| {
        Error::Hub(format!("pushing requires a token (--token or {TOKEN_ENV_VAR})"))
    })?;
    let client = HubClient::new(push.endpoint.as_str(), token)?;
    client.create_repo(&push.repo_id, push.private)?;

    let mut uploads: Vec<UploadFile> = files
        .iter()
        .map(|f| UploadFile::new(f.repo_path.as_str(), f.local_path.as_path()))
        .collect();
    uploads.push(UploadFile::new(CARD_FILENAME, card_path));

    tracing::info!(
        repo_id = push.repo_id.as_str(),
        files = uploads.len(),
        "pushing dataset to the Hub"
    );
    client.upload_folder(
        &push.repo_id,
        &push.revision,
        &uploads,
        &push.commit_message,
    )
}
