//! Declared output schema
//!
//! The feature tree is the single source of truth for both the parquet column
//! types and the `dataset_info.features` block of the dataset card.

use crate::error::{Error, Result};
use crate::mapping::MAPPING_KEYS;
use polars::prelude::*;
use serde_yaml::{Mapping, Value as Yaml};

/// Scalar dtypes, named as the Hub names them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    String,
    Binary,
}

impl ValueType {
    pub fn hub_name(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Binary => "binary",
        }
    }

    pub fn dtype(&self) -> DataType {
        match self {
            Self::String => DataType::String,
            Self::Binary => DataType::Binary,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Feature {
    Value(ValueType),
    /// Stored as `{bytes: binary, path: string}`.
    Image,
    Struct(Vec<(String, Feature)>),
    List(Box<Feature>),
}

impl Feature {
    pub fn string() -> Self {
        Self::Value(ValueType::String)
    }

    pub fn list(inner: Feature) -> Self {
        Self::List(Box::new(inner))
    }

    pub fn fields<'a>(fields: impl IntoIterator<Item = (&'a str, Feature)>) -> Self {
        Self::Struct(
            fields
                .into_iter()
                .map(|(name, f)| (name.to_string(), f))
                .collect(),
        )
    }

    /// Polars dtype the column must have.
    pub fn dtype(&self) -> DataType {
        match self {
            Self::Value(v) => v.dtype(),
            Self::Image => DataType::Struct(vec![
                Field::new("bytes".into(), DataType::Binary),
                Field::new("path".into(), DataType::String),
            ]),
            Self::Struct(fields) => DataType::Struct(
                fields
                    .iter()
                    .map(|(name, f)| Field::new(name.as_str().into(), f.dtype()))
                    .collect(),
            ),
            Self::List(inner) => DataType::List(Box::new(inner.dtype())),
        }
    }

    fn yaml_body(&self, out: &mut Mapping) {
        match self {
            Self::Value(v) => {
                out.insert("dtype".into(), v.hub_name().into());
            }
            Self::Image => {
                out.insert("dtype".into(), "image".into());
            }
            Self::Struct(fields) => {
                out.insert("struct".into(), named_yaml(fields));
            }
            Self::List(inner) => {
                out.insert("list".into(), inner.yaml_list_item());
            }
        }
    }

    fn yaml_list_item(&self) -> Yaml {
        match self {
            Self::Value(v) => v.hub_name().into(),
            Self::Image => "image".into(),
            Self::Struct(fields) => named_yaml(fields),
            Self::List(_) => {
                let mut body = Mapping::new();
                self.yaml_body(&mut body);
                Yaml::Mapping(body)
            }
        }
    }
}

fn named_yaml(fields: &[(String, Feature)]) -> Yaml {
    Yaml::Sequence(
        fields
            .iter()
            .map(|(name, feature)| {
                let mut entry = Mapping::new();
                entry.insert("name".into(), name.as_str().into());
                feature.yaml_body(&mut entry);
                Yaml::Mapping(entry)
            })
            .collect(),
    )
}

/// Ordered top-level columns of a dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Features(Vec<(String, Feature)>);

impl Features {
    pub fn new<'a>(columns: impl IntoIterator<Item = (&'a str, Feature)>) -> Self {
        Self(
            columns
                .into_iter()
                .map(|(name, f)| (name.to_string(), f))
                .collect(),
        )
    }

    pub fn columns(&self) -> &[(String, Feature)] {
        &self.0
    }

    pub fn get(&self, name: &str) -> Option<&Feature> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, f)| f)
    }

    /// The `dataset_info.features` list of a dataset card.
    pub fn to_yaml(&self) -> Yaml {
        named_yaml(&self.0)
    }

    /// Error unless `df` has exactly the declared columns, in order, with the
    /// declared dtypes.
    pub fn check_frame(&self, df: &DataFrame) -> Result<()> {
        let columns = df.get_columns();
        if columns.len() != self.0.len() {
            return Err(Error::Schema(format!(
                "expected {} columns, frame has {}",
                self.0.len(),
                columns.len()
            )));
        }
        for (column, (name, feature)) in columns.iter().zip(self.0.iter()) {
            if column.name().as_str() != name {
                return Err(Error::Schema(format!(
                    "expected column `{name}`, found `{}`",
                    column.name()
                )));
            }
            let expected = feature.dtype();
            if column.dtype() != &expected {
                return Err(Error::Schema(format!(
                    "column `{name}` has dtype {}, expected {expected}",
                    column.dtype()
                )));
            }
        }
        Ok(())
    }
}

/// Content item of a chat message: `{image, text, type}`.
///
/// Exactly one of `image` and `text` is set, depending on `type`.
pub fn content_feature() -> Feature {
    Feature::fields([
        ("image", Feature::Image),
        ("text", Feature::string()),
        ("type", Feature::string()),
    ])
}

/// A chat message: `{content: [...], role}`.
pub fn message_feature() -> Feature {
    Feature::fields([
        ("content", Feature::list(content_feature())),
        ("role", Feature::string()),
    ])
}

pub fn mapping_feature() -> Feature {
    Feature::fields(MAPPING_KEYS.iter().map(|k| (*k, Feature::string())))
}

/// The fixed schema of the published R1 dataset.
pub fn r1_features() -> Features {
    Features::new([
        ("messages", Feature::list(message_feature())),
        ("coded_message", Feature::string()),
        ("mapping", mapping_feature()),
        ("decoded_message", Feature::string()),
        ("task", Feature::string()),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_r1_feature_order() {
        let features = r1_features();
        let names: Vec<&str> = features.columns().iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "messages",
                "coded_message",
                "mapping",
                "decoded_message",
                "task"
            ]
        );
    }

    #[test]
    fn test_content_carries_image() {
        let Feature::Struct(fields) = content_feature() else {
            panic!("content must be a struct");
        };
        let names: Vec<&str> = fields.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["image", "text", "type"]);
        assert_eq!(fields[0].1, Feature::Image);
    }

    #[test]
    fn test_image_dtype() {
        let DataType::Struct(fields) = Feature::Image.dtype() else {
            panic!("image must be a struct");
        };
        let names: Vec<&str> = fields.iter().map(|f| f.name().as_str()).collect();
        assert_eq!(names, vec!["bytes", "path"]);
        assert_eq!(fields[0].dtype(), &DataType::Binary);
    }

    #[test]
    fn test_mapping_has_all_keys() {
        let Feature::Struct(fields) = mapping_feature() else {
            panic!("mapping must be a struct");
        };
        assert_eq!(fields.len(), 27);
        assert_eq!(fields[0].0, "_");
        assert_eq!(fields[26].0, "z");
    }

    #[test]
    fn test_yaml_rendering() {
        let yaml = serde_yaml::to_string(&r1_features().to_yaml()).unwrap();
        assert!(yaml.starts_with("- name: messages\n  list:\n  - name: content\n    list:\n"));
        assert!(yaml.contains("    - name: image\n      dtype: image\n"));
        assert!(!yaml.contains("\n- name: image\n"));
        assert!(yaml.contains("- name: mapping\n  struct:\n  - name: _\n    dtype: string\n"));
        assert!(yaml.contains("- name: task\n  dtype: string\n"));
    }

    #[test]
    fn test_check_frame_rejects_mismatch() {
        let features = Features::new([("task", Feature::string())]);
        let ok = DataFrame::new(vec![Column::new("task".into(), ["word"])]).unwrap();
        assert!(features.check_frame(&ok).is_ok());

        let renamed = DataFrame::new(vec![Column::new("kind".into(), ["word"])]).unwrap();
        assert!(features.check_frame(&renamed).is_err());

        let wrong_type = DataFrame::new(vec![Column::new("task".into(), [1_i32])]).unwrap();
        let err = features.check_frame(&wrong_type).unwrap_err();
        assert!(err.to_string().contains("column `task` has dtype"));
    }
}
