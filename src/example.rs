//! Source rows of the coded-message decoding dataset

use crate::mapping::CharMapping;
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// Storage layout of an image cell: raw encoded bytes and/or a file path.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageData {
    #[serde(skip_serializing)]
    pub bytes: Option<Vec<u8>>,
    pub path: Option<String>,
}

impl ImageData {
    pub fn from_bytes(bytes: Vec<u8>, path: Option<String>) -> Self {
        Self {
            bytes: Some(bytes),
            path,
        }
    }

    pub fn byte_len(&self) -> usize {
        self.bytes.as_ref().map_or(0, Vec::len)
    }

    pub fn has_bytes(&self) -> bool {
        self.bytes.as_ref().is_some_and(|b| !b.is_empty())
    }
}

/// A single labeled puzzle: decoder image, coded message and its answer.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodingExample {
    pub image: ImageData,
    pub coded_message: String,
    pub mapping: CharMapping,
    pub decoded_message: String,
    pub task: String,
    pub file_path: Option<String>,
}

impl Display for DecodingExample {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Coded: {}\nDecoded: {}\nTask: {}",
            self.coded_message, self.decoded_message, self.task
        )
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::mapping::tests::shift_mapping;
    use rstest::*;

    /// 1x1 PNG signature plus padding; the contents are never decoded.
    pub(crate) const FAKE_PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a, 0, 0];

    #[fixture]
    pub(crate) fn decoding_example(shift_mapping: CharMapping) -> DecodingExample {
        DecodingExample {
            image: ImageData::from_bytes(FAKE_PNG.to_vec(), Some("images/0.png".to_string())),
            coded_message: "dbu_eph".to_string(),
            mapping: shift_mapping,
            decoded_message: "cat dog".to_string(),
            task: "word".to_string(),
            file_path: Some("images/0.png".to_string()),
        }
    }

    #[rstest]
    fn test_display(decoding_example: DecodingExample) {
        assert_eq!(
            decoding_example.to_string(),
            "Coded: dbu_eph\nDecoded: cat dog\nTask: word"
        );
    }

    #[rstest]
    fn test_image_data(decoding_example: DecodingExample) {
        assert!(decoding_example.image.has_bytes());
        assert_eq!(decoding_example.image.byte_len(), FAKE_PNG.len());
        assert!(!ImageData::default().has_bytes());
    }
}
