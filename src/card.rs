//! Dataset card (`README.md`) with the Hub `dataset_info` front matter

use crate::error::Result;
use crate::frame::{SplitFile, DATA_DIR};
use crate::schema::Features;
use serde::Serialize;
use std::path::{Path, PathBuf};

pub const CARD_FILENAME: &str = "README.md";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SplitInfo {
    pub name: String,
    pub num_bytes: u64,
    pub num_examples: usize,
}

#[derive(Debug, Serialize)]
struct DatasetInfo {
    features: serde_yaml::Value,
    splits: Vec<SplitInfo>,
    download_size: u64,
    dataset_size: u64,
}

#[derive(Debug, Serialize)]
struct DataFiles {
    split: String,
    path: String,
}

#[derive(Debug, Serialize)]
struct Config {
    config_name: String,
    data_files: Vec<DataFiles>,
}

#[derive(Debug, Serialize)]
struct FrontMatter {
    dataset_info: DatasetInfo,
    configs: Vec<Config>,
}

/// README of the published dataset.
#[derive(Debug, Clone)]
pub struct DatasetCard {
    features: Features,
    splits: Vec<SplitInfo>,
    download_size: u64,
    source: String,
}

impl DatasetCard {
    /// Aggregate per-shard files into per-split totals, keeping split order.
    pub fn new(features: Features, files: &[SplitFile], source: impl Into<String>) -> Self {
        let mut splits: Vec<SplitInfo> = vec![];
        for file in files {
            match splits.iter_mut().find(|s| s.name == file.split) {
                Some(info) => {
                    info.num_bytes += file.dataset_bytes;
                    info.num_examples += file.num_rows;
                }
                None => splits.push(SplitInfo {
                    name: file.split.clone(),
                    num_bytes: file.dataset_bytes,
                    num_examples: file.num_rows,
                }),
            }
        }
        Self {
            features,
            splits,
            download_size: files.iter().map(|f| f.num_bytes).sum(),
            source: source.into(),
        }
    }

    pub fn splits(&self) -> &[SplitInfo] {
        &self.splits
    }

    fn front_matter(&self) -> FrontMatter {
        FrontMatter {
            dataset_info: DatasetInfo {
                features: self.features.to_yaml(),
                splits: self.splits.clone(),
                download_size: self.download_size,
                dataset_size: self.splits.iter().map(|s| s.num_bytes).sum(),
            },
            configs: vec![Config {
                config_name: "default".to_string(),
                data_files: self
                    .splits
                    .iter()
                    .map(|s| DataFiles {
                        split: s.name.clone(),
                        path: format!("{DATA_DIR}/{}-*", s.name),
                    })
                    .collect(),
            }],
        }
    }

    pub fn render(&self) -> Result<String> {
        let yaml = serde_yaml::to_string(&self.front_matter())?;
        let counts = self
            .splits
            .iter()
            .map(|s| format!("| {} | {} |", s.name, s.num_examples))
            .collect::<Vec<_>>()
            .join("\n");
        Ok(format!(
            "---\n{yaml}---\n\n\
            # Message decoding (R1 chat format)\n\n\
            Coded-message decoding puzzles from `{source}`, wrapped in a \
            system / user / assistant conversation for instruction-tuning \
            vision-language models.\n\n\
            The user turn holds the decoder image as its first content item, \
            followed by the decoding instructions. The \
            assistant turn opens with a `<think>` tag for the model to \
            continue. `coded_message` is spaced one character apart and \
            `decoded_message` holds the plain answer.\n\n\
            | split | examples |\n\
            | --- | --- |\n\
            {counts}\n",
            source = self.source,
        ))
    }

    /// Write the card as `README.md` under `root`.
    pub fn write<P: AsRef<Path>>(&self, root: P) -> Result<PathBuf> {
        let path = root.as_ref().join(CARD_FILENAME);
        std::fs::write(&path, self.render()?)?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::r1_features;
    use rstest::*;

    fn split_file(split: &str, index: usize, rows: usize) -> SplitFile {
        SplitFile {
            split: split.to_string(),
            repo_path: format!("data/{split}-{index:05}-of-00002.parquet"),
            local_path: PathBuf::from(format!("/tmp/{split}-{index}.parquet")),
            num_rows: rows,
            num_bytes: 100,
            dataset_bytes: 1000,
        }
    }

    #[fixture]
    fn card() -> DatasetCard {
        let files = vec![
            split_file("train", 0, 40),
            split_file("train", 1, 50),
            split_file("test", 0, 10),
        ];
        DatasetCard::new(r1_features(), &files, "owner/source")
    }

    #[rstest]
    fn test_split_totals(card: DatasetCard) {
        assert_eq!(
            card.splits(),
            &[
                SplitInfo {
                    name: "train".to_string(),
                    num_bytes: 2000,
                    num_examples: 90
                },
                SplitInfo {
                    name: "test".to_string(),
                    num_bytes: 1000,
                    num_examples: 10
                },
            ]
        );
    }

    #[rstest]
    fn test_front_matter(card: DatasetCard) {
        let rendered = card.render().unwrap();
        assert!(rendered.starts_with("---\ndataset_info:\n  features:\n"));

        let front = rendered.split("---\n").nth(1).unwrap();
        let parsed: serde_yaml::Value = serde_yaml::from_str(front).unwrap();
        assert_eq!(parsed["dataset_info"]["download_size"].as_u64(), Some(300));
        assert_eq!(parsed["dataset_info"]["dataset_size"].as_u64(), Some(3000));
        assert_eq!(
            parsed["configs"][0]["data_files"][0]["path"].as_str(),
            Some("data/train-*")
        );
        assert_eq!(
            parsed["dataset_info"]["features"][0]["list"][0]["list"][0]["dtype"].as_str(),
            Some("image")
        );
        assert_eq!(
            parsed["dataset_info"]["features"][1]["name"].as_str(),
            Some("coded_message")
        );
    }

    #[rstest]
    fn test_body_mentions_source_and_counts(card: DatasetCard) {
        let rendered = card.render().unwrap();
        assert!(rendered.contains("`owner/source`"));
        assert!(rendered.contains("| train | 90 |"));
        assert!(rendered.contains("| test | 10 |"));
    }

    #[rstest]
    fn test_write(card: DatasetCard) {
        let dir = tempfile::tempdir().unwrap();
        let path = card.write(dir.path()).unwrap();
        assert_eq!(path.file_name().unwrap(), CARD_FILENAME);
        assert!(std::fs::read_to_string(path).unwrap().contains("dataset_info"));
    }
}
