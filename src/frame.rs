//! Encoding R1 records as polars frames and writing parquet shards

use crate::error::{Error, Result};
use crate::mapping::MAPPING_KEYS;
use crate::messages::{ContentPart, Message, R1Record};
use crate::example::ImageData;
use crate::schema::{r1_features, Feature, Features};
use polars::prelude::*;
use std::fs::{create_dir_all, File};
use std::path::{Path, PathBuf};

/// Directory inside the dataset repo that holds the parquet shards.
pub const DATA_DIR: &str = "data";

/// Default upper bound on the payload written into one shard (500MB).
pub const DEFAULT_MAX_SHARD_BYTES: usize = 500 * 1024 * 1024;

/// A parquet shard written for one split.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitFile {
    pub split: String,
    /// Path relative to the dataset root, with `/` separators.
    pub repo_path: String,
    pub local_path: PathBuf,
    pub num_rows: usize,
    /// Size of the parquet file on disk.
    pub num_bytes: u64,
    /// Estimated in-memory size of the encoded rows.
    pub dataset_bytes: u64,
}

/// Build a frame matching [`r1_features`] from the given records.
pub fn records_to_frame(records: &[R1Record]) -> Result<DataFrame> {
    let features = r1_features();
    if records.is_empty() {
        return empty_frame(&features);
    }

    let messages = messages_column(records)?;
    let coded = string_column("coded_message", records, |r| &r.coded_message);
    let mapping = mapping_column(records)?;
    let decoded = string_column("decoded_message", records, |r| &r.decoded_message);
    let task = string_column("task", records, |r| &r.task);

    let df = DataFrame::new(vec![messages, coded, mapping, decoded, task])?;
    features.check_frame(&df)?;
    Ok(df)
}

fn empty_frame(features: &Features) -> Result<DataFrame> {
    let columns = features
        .columns()
        .iter()
        .map(|(name, f)| Series::new_empty(name.as_str().into(), &f.dtype()).into_column())
        .collect();
    Ok(DataFrame::new(columns)?)
}

fn string_column<F>(name: &str, records: &[R1Record], field: F) -> Column
where
    F: Fn(&R1Record) -> &String,
{
    let values: Vec<&str> = records.iter().map(|r| field(r).as_str()).collect();
    Column::new(name.into(), values)
}

fn image_series(image: Option<&ImageData>) -> Result<Series> {
    let Some(image) = image else {
        return Ok(Series::full_null("image".into(), 1, &Feature::Image.dtype()));
    };
    let fields = DataFrame::new(vec![
        Column::new("bytes".into(), vec![image.bytes.as_deref()]),
        Column::new("path".into(), vec![image.path.as_deref()]),
    ])?;
    Ok(fields.into_struct("image".into()).into_series())
}

fn content_series(content: &[ContentPart]) -> Result<Series> {
    // text parts get a null image struct, not a struct of nulls
    let mut image = Series::full_null("image".into(), 0, &Feature::Image.dtype());
    for part in content {
        image.append(&image_series(part.as_image())?)?;
    }
    let text: Vec<Option<&str>> = content.iter().map(ContentPart::as_text).collect();
    let kind: Vec<&str> = content.iter().map(ContentPart::kind).collect();
    let fields = DataFrame::new(vec![
        image.into_column(),
        Column::new("text".into(), text),
        Column::new("type".into(), kind),
    ])?;
    Ok(fields.into_struct("content".into()).into_series())
}

fn message_series(messages: &[Message]) -> Result<Series> {
    let contents = messages
        .iter()
        .map(|m| content_series(&m.content))
        .collect::<Result<Vec<_>>>()?;
    let content: ListChunked = contents.into_iter().map(Some).collect();
    let roles: Vec<&str> = messages.iter().map(|m| m.role.as_str()).collect();

    let fields = DataFrame::new(vec![
        content.with_name("content".into()).into_series().into_column(),
        Column::new("role".into(), roles),
    ])?;
    Ok(fields.into_struct("messages".into()).into_series())
}

fn messages_column(records: &[R1Record]) -> Result<Column> {
    let per_row = records
        .iter()
        .map(|r| message_series(&r.messages))
        .collect::<Result<Vec<_>>>()?;
    let messages: ListChunked = per_row.into_iter().map(Some).collect();
    Ok(messages.with_name("messages".into()).into_series().into_column())
}

fn mapping_column(records: &[R1Record]) -> Result<Column> {
    let columns = MAPPING_KEYS
        .iter()
        .map(|key| {
            let values: Vec<Option<&str>> = records.iter().map(|r| r.mapping.get(key)).collect();
            Column::new((*key).into(), values)
        })
        .collect();
    let fields = DataFrame::new(columns)?;
    Ok(fields.into_struct("mapping".into()).into_series().into_column())
}

/// Cut records into contiguous shards of at most `max_shard_bytes` payload.
///
/// A record larger than the limit gets a shard of its own; there is always at
/// least one shard, even for no records.
pub fn shard_records(records: &[R1Record], max_shard_bytes: usize) -> Vec<&[R1Record]> {
    let mut shards = Vec::new();
    let mut start = 0_usize;
    let mut current = 0_usize;
    for (i, record) in records.iter().enumerate() {
        let size = record.payload_bytes();
        if i > start && current + size > max_shard_bytes {
            shards.push(&records[start..i]);
            start = i;
            current = 0;
        }
        current += size;
    }
    shards.push(&records[start..]);
    shards
}

/// Hub shard name, e.g. `data/train-00000-of-00002.parquet`.
pub fn shard_repo_path(split: &str, index: usize, total: usize) -> String {
    format!("{DATA_DIR}/{split}-{index:05}-of-{total:05}.parquet")
}

/// Write one split under `root` as one or more parquet shards.
pub fn write_split<P: AsRef<Path>>(
    root: P,
    split: &str,
    records: &[R1Record],
    max_shard_bytes: usize,
) -> Result<Vec<SplitFile>> {
    if max_shard_bytes == 0 {
        return Err(Error::Schema("max shard size must be positive".to_string()));
    }
    create_dir_all(root.as_ref().join(DATA_DIR))?;

    let shards = shard_records(records, max_shard_bytes);
    let total = shards.len();
    let mut files = Vec::with_capacity(total);
    for (index, shard) in shards.into_iter().enumerate() {
        let repo_path = shard_repo_path(split, index, total);
        let local_path = root.as_ref().join(&repo_path);

        let mut df = records_to_frame(shard)?;
        let dataset_bytes = df.estimated_size() as u64;
        let mut file = File::create(&local_path)?;
        ParquetWriter::new(&mut file).finish(&mut df)?;
        let num_bytes = std::fs::metadata(&local_path)?.len();

        tracing::info!(
            split,
            path = %local_path.display(),
            rows = shard.len(),
            bytes = num_bytes,
            "wrote shard"
        );
        files.push(SplitFile {
            split: split.to_string(),
            repo_path,
            local_path,
            num_rows: shard.len(),
            num_bytes,
            dataset_bytes,
        });
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::tests::r1_record;
    use polars::prelude::ParquetReader;
    use rstest::*;

    #[rstest]
    fn test_records_to_frame_schema(r1_record: R1Record) {
        let records = vec![r1_record.clone(), r1_record];
        let df = records_to_frame(&records).unwrap();
        assert_eq!(df.height(), 2);
        assert!(r1_features().check_frame(&df).is_ok());
    }

    #[test]
    fn test_empty_frame_keeps_schema() {
        let df = records_to_frame(&[]).unwrap();
        assert_eq!(df.height(), 0);
        assert!(r1_features().check_frame(&df).is_ok());
    }

    #[rstest]
    fn test_frame_values(r1_record: R1Record) {
        let df = records_to_frame(std::slice::from_ref(&r1_record)).unwrap();
        let coded = df
            .column("coded_message")
            .unwrap()
            .as_materialized_series()
            .str()
            .unwrap()
            .get(0)
            .map(str::to_string);
        assert_eq!(coded.as_deref(), Some("d b u _ e p h"));

        let mapping = df.column("mapping").unwrap().as_materialized_series();
        let a = mapping.struct_().unwrap().field_by_name("a").unwrap();
        assert_eq!(a.str().unwrap().get(0), Some("b"));

        let messages = df.column("messages").unwrap().as_materialized_series();
        let first_row = messages.list().unwrap().get_as_series(0).unwrap();
        assert_eq!(first_row.len(), 3);
        let roles = first_row.struct_().unwrap().field_by_name("role").unwrap();
        assert_eq!(roles.str().unwrap().get(1), Some("user"));
    }

    #[rstest]
    fn test_image_lives_in_user_content(r1_record: R1Record) {
        let df = records_to_frame(std::slice::from_ref(&r1_record)).unwrap();
        let messages = df.column("messages").unwrap().as_materialized_series();
        let turns = messages.list().unwrap().get_as_series(0).unwrap();
        let content = turns.struct_().unwrap().field_by_name("content").unwrap();
        let content = content.list().unwrap();

        let system = content.get_as_series(0).unwrap();
        let system_images = system.struct_().unwrap().field_by_name("image").unwrap();
        assert_eq!(system_images.null_count(), 1);

        let user = content.get_as_series(1).unwrap();
        let user_fields = user.struct_().unwrap();
        let images = user_fields.field_by_name("image").unwrap();
        assert_eq!(images.len(), 2);
        assert_eq!(images.is_null().get(0), Some(false));
        assert_eq!(images.is_null().get(1), Some(true));

        let paths = images.struct_().unwrap().field_by_name("path").unwrap();
        assert_eq!(paths.str().unwrap().get(0), Some("images/0.png"));
        let bytes = images.struct_().unwrap().field_by_name("bytes").unwrap();
        assert_eq!(
            bytes.binary().unwrap().get(0).map(<[u8]>::len),
            r1_record.image().map(ImageData::byte_len)
        );

        let kinds = user_fields.field_by_name("type").unwrap();
        assert_eq!(kinds.str().unwrap().get(0), Some("image"));
        let texts = user_fields.field_by_name("text").unwrap();
        assert_eq!(texts.str().unwrap().get(0), None);
    }

    #[rstest]
    fn test_shard_records(r1_record: R1Record) {
        let size = r1_record.payload_bytes();
        let records = vec![r1_record; 5];

        let single = shard_records(&records, usize::MAX);
        assert_eq!(single.len(), 1);
        assert_eq!(single[0].len(), 5);

        let pairs = shard_records(&records, size * 2);
        let lens: Vec<usize> = pairs.iter().map(|s| s.len()).collect();
        assert_eq!(lens, vec![2, 2, 1]);

        let tiny = shard_records(&records, 1);
        assert_eq!(tiny.len(), 5);

        assert_eq!(shard_records(&[], 10).len(), 1);
    }

    #[test]
    fn test_shard_repo_path() {
        assert_eq!(
            shard_repo_path("train", 0, 1),
            "data/train-00000-of-00001.parquet"
        );
        assert_eq!(
            shard_repo_path("test", 12, 30),
            "data/test-00012-of-00030.parquet"
        );
    }

    #[rstest]
    fn test_write_split_roundtrip(r1_record: R1Record) {
        let dir = tempfile::tempdir().unwrap();
        let records = vec![r1_record; 3];
        let files = write_split(dir.path(), "train", &records, usize::MAX).unwrap();

        assert_eq!(files.len(), 1);
        assert_eq!(files[0].repo_path, "data/train-00000-of-00001.parquet");
        assert_eq!(files[0].num_rows, 3);
        assert!(files[0].num_bytes > 0);

        let mut file = File::open(&files[0].local_path).unwrap();
        let df = ParquetReader::new(&mut file).finish().unwrap();
        assert_eq!(df.height(), 3);
        assert_eq!(df.get_column_names().len(), 5);
    }

    #[rstest]
    fn test_write_split_rejects_zero_shard_size(r1_record: R1Record) {
        let dir = tempfile::tempdir().unwrap();
        assert!(write_split(dir.path(), "train", &[r1_record], 0).is_err());
    }
}
