//! Loading the labeled source dataset

use crate::error::{Error, Result};
use crate::example::{DecodingExample, ImageData};
use crate::mapping::CharMapping;
use crate::secrets::SecretString;
use hf_hub::api::sync::{Api, ApiBuilder, ApiRepo};
use hf_hub::{Repo, RepoType};
use polars::prelude::*;
use std::collections::BTreeMap;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use tqdm::tqdm;

pub const DEFAULT_SOURCE_REPO: &str = "sunildkumar/message-decoding-words-and-sequences";
pub const DEFAULT_SOURCE_SPLIT: &str = "train";

/// Branch where the Hub keeps auto-converted parquet copies of a dataset.
const PARQUET_CONVERSION_REVISION: &str = "refs/convert/parquet";

/// Where the labeled puzzles come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// A split of a dataset repository on the Hub.
    Hub {
        repo_id: String,
        split: String,
        revision: Option<String>,
    },
    /// Parquet files already on disk.
    Local(Vec<PathBuf>),
}

impl Default for Source {
    fn default() -> Self {
        Self::Hub {
            repo_id: DEFAULT_SOURCE_REPO.to_string(),
            split: DEFAULT_SOURCE_SPLIT.to_string(),
            revision: None,
        }
    }
}

impl Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Hub {
                repo_id,
                split,
                revision,
            } => {
                write!(f, "{repo_id}[{split}]")?;
                if let Some(rev) = revision {
                    write!(f, "@{rev}")?;
                }
                Ok(())
            }
            Self::Local(paths) => write!(f, "{} local parquet file(s)", paths.len()),
        }
    }
}

fn build_api(token: Option<&SecretString>) -> Result<Api> {
    let mut builder = ApiBuilder::new().with_progress(true);
    if let Some(secret) = token {
        builder = builder.with_token(Some(secret.expose_secret().to_string()));
    }
    Ok(builder.build()?)
}

fn dataset_repo(api: &Api, repo_id: &str, revision: Option<&str>) -> ApiRepo {
    match revision {
        Some(rev) => api.repo(Repo::with_revision(
            repo_id.to_string(),
            RepoType::Dataset,
            rev.to_string(),
        )),
        None => api.repo(Repo::new(repo_id.to_string(), RepoType::Dataset)),
    }
}

/// Files of the first layout in `layouts` that matches anything, sorted.
fn first_layout<S: AsRef<str>>(files: &[S], layouts: &[&dyn Fn(&str) -> bool]) -> Vec<String> {
    for matches in layouts {
        let mut selected: Vec<String> = files
            .iter()
            .map(AsRef::as_ref)
            .filter(|name| matches(name))
            .map(str::to_string)
            .collect();
        if !selected.is_empty() {
            selected.sort();
            return selected;
        }
    }
    vec![]
}

/// `00000-of-00003.parquet`
fn is_shard_suffix(rest: &str) -> bool {
    let Some((index, total)) = rest
        .strip_suffix(".parquet")
        .and_then(|stem| stem.split_once("-of-"))
    else {
        return false;
    };
    [index, total]
        .iter()
        .all(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
}

/// Pick the parquet files of `split` out of a main-branch file listing.
///
/// Layouts are tried in order and the first one present wins:
/// 1. `data/{split}.parquet`
/// 2. `data/{split}-00000-of-00001.parquet`
/// 3. `data/{split}-NNNNN-of-MMMMM.parquet`
pub fn select_split_files<S: AsRef<str>>(files: &[S], split: &str) -> Vec<String> {
    let single = format!("data/{split}.parquet");
    let single_shard = format!("data/{split}-00000-of-00001.parquet");
    let shard_prefix = format!("data/{split}-");
    first_layout(
        files,
        &[
            &|name: &str| name == single,
            &|name: &str| name == single_shard,
            &|name: &str| name.strip_prefix(&shard_prefix).is_some_and(is_shard_suffix),
        ],
    )
}

/// Pick the parquet files of `split` out of a `refs/convert/parquet` listing:
/// `{split}/*.parquet`, else `default/{split}/*.parquet`.
pub fn select_converted_files<S: AsRef<str>>(files: &[S], split: &str) -> Vec<String> {
    let flat = format!("{split}/");
    let nested = format!("default/{split}/");
    let in_dir = |name: &str, dir: &str| {
        name.strip_prefix(dir)
            .is_some_and(|rest| !rest.contains('/') && rest.ends_with(".parquet"))
    };
    first_layout(
        files,
        &[
            &|name: &str| in_dir(name, &flat),
            &|name: &str| in_dir(name, &nested),
        ],
    )
}

fn download_split<F>(repo: &ApiRepo, select: F) -> Result<Vec<PathBuf>>
where
    F: Fn(&[String]) -> Vec<String>,
{
    let listing: Vec<String> = repo
        .info()?
        .siblings
        .into_iter()
        .map(|s| s.rfilename)
        .collect();
    select(&listing)
        .iter()
        .map(|name| {
            tracing::info!(file = name.as_str(), "downloading shard");
            repo.get(name).map_err(Error::from)
        })
        .collect()
}

/// Resolve a source to local parquet paths, downloading from the Hub if needed.
pub fn fetch_parquet(source: &Source, token: Option<&SecretString>) -> Result<Vec<PathBuf>> {
    match source {
        Source::Local(paths) => {
            if paths.is_empty() {
                return Err(Error::Hub("no local parquet files given".to_string()));
            }
            if let Some(missing) = paths.iter().find(|p| !p.exists()) {
                return Err(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("{} does not exist", missing.display()),
                )));
            }
            Ok(paths.clone())
        }
        Source::Hub {
            repo_id,
            split,
            revision,
        } => {
            let api = build_api(token)?;

            let repo = dataset_repo(&api, repo_id, revision.as_deref());
            let paths = download_split(&repo, |files| select_split_files(files, split))?;
            if !paths.is_empty() {
                return Ok(paths);
            }

            tracing::warn!(
                repo_id = repo_id.as_str(),
                "no parquet shards on the main branch, trying {PARQUET_CONVERSION_REVISION}"
            );
            let converted = dataset_repo(&api, repo_id, Some(PARQUET_CONVERSION_REVISION));
            let paths = download_split(&converted, |files| select_converted_files(files, split))?;
            if paths.is_empty() {
                return Err(Error::Hub(format!(
                    "No parquet files found for split '{split}' in dataset '{repo_id}'"
                )));
            }
            Ok(paths)
        }
    }
}

/// Read and stack parquet files into one frame.
pub fn read_frame<P: AsRef<Path>>(paths: &[P]) -> Result<DataFrame> {
    let mut frames = paths.iter().map(|path| -> Result<DataFrame> {
        let mut file = std::fs::File::open(path.as_ref())?;
        Ok(ParquetReader::new(&mut file).finish()?)
    });
    let mut df = frames
        .next()
        .ok_or_else(|| Error::Schema("no parquet files to read".to_string()))??;
    for frame in frames {
        df.vstack_mut(&frame?)?;
    }
    df.as_single_chunk_par();
    Ok(df)
}

fn column<'a>(df: &'a DataFrame, name: &str) -> Result<&'a Series> {
    df.column(name)
        .map(Column::as_materialized_series)
        .map_err(|_| Error::Schema(format!("source is missing column `{name}`")))
}

fn required<T>(value: Option<T>, row: usize, field: &str) -> Result<T> {
    value.ok_or_else(|| Error::invalid_row(row, format!("`{field}` is null")))
}

fn load_image_bytes(
    row: usize,
    image: ImageData,
    file_path: Option<&str>,
    image_root: Option<&Path>,
) -> Result<ImageData> {
    if image.has_bytes() {
        return Ok(image);
    }
    let root = image_root.ok_or_else(|| {
        Error::invalid_row(row, "image has no embedded bytes and no image root was given")
    })?;
    let relative = file_path
        .or(image.path.as_deref())
        .ok_or_else(|| Error::invalid_row(row, "image has neither bytes nor a path"))?;
    let bytes = std::fs::read(root.join(relative))?;
    Ok(ImageData::from_bytes(bytes, Some(relative.to_string())))
}

/// Turn the rows of a source frame into typed examples.
///
/// `image_root` is used to read image files for rows whose image cell only
/// carries a path.
pub fn examples_from_frame(
    df: &DataFrame,
    image_root: Option<&Path>,
) -> Result<Vec<DecodingExample>> {
    let coded = column(df, "coded_message")?.str()?;
    let decoded = column(df, "decoded_message")?.str()?;
    let task = column(df, "task")?.str()?;
    let file_path = match df.column("file_path") {
        Ok(c) => Some(c.as_materialized_series().str()?),
        Err(_) => None,
    };

    let image = column(df, "image")?.struct_().map_err(|_| {
        Error::Schema("source column `image` must be a {bytes, path} struct".to_string())
    })?;
    let image_bytes = image.field_by_name("bytes")?;
    let image_bytes = image_bytes.binary()?;
    let image_path = image.field_by_name("path")?;
    let image_path = image_path.str()?;

    let mapping = column(df, "mapping")?.struct_()?;
    let mapping_fields = mapping.fields_as_series();
    let mapping_columns = mapping_fields
        .iter()
        .map(|s| -> Result<_> { Ok((s.name().to_string(), s.str()?)) })
        .collect::<Result<Vec<_>>>()?;

    let mut examples = Vec::with_capacity(df.height());
    for row in tqdm(0..df.height()) {
        let mut symbols = BTreeMap::new();
        for (key, values) in &mapping_columns {
            let symbol = required(values.get(row), row, &format!("mapping.{key}"))?;
            symbols.insert(key.clone(), symbol.to_string());
        }
        let mapping =
            CharMapping::new(symbols).map_err(|e| Error::invalid_row(row, e.to_string()))?;

        let row_file_path = file_path.and_then(|c| c.get(row));
        let image = ImageData {
            bytes: image_bytes.get(row).map(<[u8]>::to_vec),
            path: image_path.get(row).map(str::to_string),
        };
        let image = load_image_bytes(row, image, row_file_path, image_root)?;

        examples.push(DecodingExample {
            image,
            coded_message: required(coded.get(row), row, "coded_message")?.to_string(),
            mapping,
            decoded_message: required(decoded.get(row), row, "decoded_message")?.to_string(),
            task: required(task.get(row), row, "task")?.to_string(),
            file_path: row_file_path.map(str::to_string),
        });
    }
    Ok(examples)
}
