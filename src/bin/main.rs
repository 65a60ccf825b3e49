use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use comfy_table::Table;
use itertools::Itertools;
use message_decoding_r1::frame::DEFAULT_MAX_SHARD_BYTES;
use message_decoding_r1::hub::{DEFAULT_ENDPOINT, DEFAULT_REVISION};
use message_decoding_r1::pipeline::{
    self, PipelineConfig, PipelineReport, PushConfig, VerifyMode, DEFAULT_TARGET_REPO,
    TOKEN_ENV_VAR,
};
use message_decoding_r1::secrets::SecretString;
use message_decoding_r1::source::{Source, DEFAULT_SOURCE_REPO, DEFAULT_SOURCE_SPLIT};
use message_decoding_r1::split::{DEFAULT_SEED, DEFAULT_TEST_SIZE};
use std::path::PathBuf;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Token variable read when `HUGGINGFACE_HUB_TOKEN` is not set.
const FALLBACK_TOKEN_ENV_VAR: &str = "HF_TOKEN";

/// CLI
#[derive(Debug, Parser)]
#[command(name = "message-decoding-r1")]
#[command(
    about = "Build the R1 chat-formatted message decoding dataset and push it to the Hub.",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Build train/test parquet shards and a dataset card locally
    Build(BuildArgs),
    /// Build, then publish the result to a Hub dataset repo
    Push(PushArgs),
    /// Print one formatted record and the task distribution
    Preview {
        #[command(flatten)]
        source: SourceArgs,
        /// Row of the source dataset to format
        #[arg(long, default_value_t = 0)]
        index: usize,
    },
}

#[derive(Debug, Args)]
struct SourceArgs {
    /// Source dataset repo on the Hub
    #[arg(long, default_value = DEFAULT_SOURCE_REPO)]
    source_repo: String,
    /// Split of the source dataset
    #[arg(long, default_value = DEFAULT_SOURCE_SPLIT)]
    source_split: String,
    /// Revision of the source dataset
    #[arg(long)]
    source_revision: Option<String>,
    /// Read local parquet files instead of the Hub
    #[arg(long, num_args = 1..)]
    local: Vec<PathBuf>,
    /// Directory that the source `file_path` column is relative to
    #[arg(long)]
    image_root: Option<PathBuf>,
    /// Only process the first N source rows
    #[arg(long)]
    limit: Option<usize>,
    /// Hub access token
    #[arg(long, env = TOKEN_ENV_VAR, hide_env_values = true)]
    token: Option<String>,
}

impl SourceArgs {
    fn source(&self) -> Source {
        if self.local.is_empty() {
            Source::Hub {
                repo_id: self.source_repo.clone(),
                split: self.source_split.clone(),
                revision: self.source_revision.clone(),
            }
        } else {
            Source::Local(self.local.clone())
        }
    }

    fn token(&self) -> Option<SecretString> {
        SecretString::from_option(self.token.clone())
            .or_else(|| SecretString::from_option(std::env::var(FALLBACK_TOKEN_ENV_VAR).ok()))
    }
}

#[derive(Debug, Args)]
struct BuildArgs {
    #[command(flatten)]
    source: SourceArgs,
    /// Where the Hub-layout dataset folder is written
    #[arg(long, short, default_value = "data/message-decoding-r1")]
    output_dir: PathBuf,
    /// Fraction of rows that go to the test split
    #[arg(long, default_value_t = DEFAULT_TEST_SIZE)]
    test_size: f64,
    /// Seed of the train/test shuffle
    #[arg(long, default_value_t = DEFAULT_SEED)]
    seed: u64,
    /// How to treat rows whose mapping does not decode to the answer
    #[arg(long, value_enum, default_value_t = VerifyMode::Warn)]
    verify: VerifyMode,
    /// Upper bound on the payload of a single parquet shard, in bytes
    #[arg(long, default_value_t = DEFAULT_MAX_SHARD_BYTES)]
    max_shard_bytes: usize,
}

impl BuildArgs {
    fn config(&self) -> PipelineConfig {
        let mut config = PipelineConfig::new(self.source.source(), &self.output_dir);
        config.image_root = self.source.image_root.clone();
        config.test_size = self.test_size;
        config.seed = self.seed;
        config.limit = self.source.limit;
        config.verify = self.verify;
        config.max_shard_bytes = self.max_shard_bytes;
        config.token = self.source.token();
        config
    }
}

#[derive(Debug, Args)]
struct PushArgs {
    #[command(flatten)]
    build: BuildArgs,
    /// Target dataset repo
    #[arg(long, default_value = DEFAULT_TARGET_REPO)]
    repo_id: String,
    /// Create the repo as private
    #[arg(long)]
    private: bool,
    /// Branch to commit to
    #[arg(long, default_value = DEFAULT_REVISION)]
    revision: String,
    #[arg(long, default_value = "Upload dataset")]
    commit_message: String,
    #[arg(long, default_value = DEFAULT_ENDPOINT)]
    endpoint: String,
}

fn print_report(report: &PipelineReport) {
    println!("Training set length: {}", report.train_rows);
    println!("Test set length: {}", report.test_rows);
    if report.mismatches > 0 {
        println!("Rows failing mapping check: {}", report.mismatches);
    }
    for file in &report.files {
        println!("  {} ({} rows)", file.local_path.display(), file.num_rows);
    }
    println!("Dataset card: {}", report.card_path.display());
    if let Some((repo_id, commit)) = &report.pushed {
        match &commit.commit_url {
            Some(url) => println!("Pushed to {repo_id}: {url}"),
            None => println!("Pushed to {repo_id}"),
        }
    }
}

fn preview(source: &SourceArgs, index: usize) -> anyhow::Result<()> {
    let mut config = PipelineConfig::new(source.source(), PathBuf::new());
    config.image_root = source.image_root.clone();
    config.limit = source.limit;
    config.token = source.token();

    let examples = pipeline::load_examples(&config)?;
    let Some(example) = examples.get(index) else {
        bail!("index {index} out of range, dataset has {} rows", examples.len());
    };
    println!("Example entry:\n{example}\n");

    let record = pipeline::transform(std::slice::from_ref(example))
        .pop()
        .context("transform produced no record")?;
    println!("{}\n", serde_json::to_string_pretty(&record)?);

    let mut table = Table::new();
    table.set_header(vec!["task", "count"]);
    for (task, count) in examples
        .iter()
        .map(|e| e.task.as_str())
        .counts()
        .into_iter()
        .sorted()
    {
        table.add_row(vec![task.to_string(), count.to_string()]);
    }
    println!("{table}");
    Ok(())
}

/// Log filter from `RUST_LOG`-style directives, `info` when none are given.
fn log_filter(directives: Option<&str>) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .parse_lossy(directives.unwrap_or_default())
}

fn main() -> anyhow::Result<()> {
    // a missing .env is fine
    dotenv::dotenv().ok();

    let directives = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(directives.as_deref()))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Build(args) => {
            let report = pipeline::run(&args.config()).context("building dataset")?;
            print_report(&report);
        }
        Commands::Push(args) => {
            let mut config = args.build.config();
            if config.token.is_none() {
                bail!("pushing requires --token, {TOKEN_ENV_VAR} or {FALLBACK_TOKEN_ENV_VAR}");
            }
            config.push = Some(PushConfig {
                repo_id: args.repo_id,
                private: args.private,
                revision: args.revision,
                commit_message: args.commit_message,
                endpoint: args.endpoint,
            });
            let report = pipeline::run(&config).context("building and pushing dataset")?;
            print_report(&report);
        }
        Commands::Preview { source, index } => preview(&source, index)?,
    }
    Ok(())
}
