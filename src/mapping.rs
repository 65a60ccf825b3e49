//! Character mapping between plain letters and coded symbols

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The fixed key set of every mapping, in column order.
pub const MAPPING_KEYS: [&str; 27] = [
    "_", "a", "b", "c", "d", "e", "f", "g", "h", "i", "j", "k", "l", "m", "n", "o", "p", "q",
    "r", "s", "t", "u", "v", "w", "x", "y", "z",
];

/// Coded symbol that always stands for a space in the decoded message.
pub const WORD_SEPARATOR: char = '_';

/// A mapping from each plain key (`_`, `a`..`z`) to its coded symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<String, String>", into = "BTreeMap<String, String>")]
pub struct CharMapping {
    symbols: BTreeMap<String, String>,
}

impl CharMapping {
    pub fn new(symbols: BTreeMap<String, String>) -> Result<Self> {
        if let Some(unknown) = symbols.keys().find(|k| !MAPPING_KEYS.contains(&k.as_str())) {
            return Err(Error::Mapping(format!("unknown mapping key `{unknown}`")));
        }
        if let Some(missing) = MAPPING_KEYS.iter().find(|k| !symbols.contains_key(**k)) {
            return Err(Error::Mapping(format!("missing mapping key `{missing}`")));
        }
        Ok(Self { symbols })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.symbols.get(key).map(String::as_str)
    }

    /// Iterate `(key, symbol)` pairs in `MAPPING_KEYS` order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> + '_ {
        MAPPING_KEYS
            .iter()
            .filter_map(|k| self.get(k).map(|symbol| (*k, symbol)))
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Decode a coded message by inverting the mapping.
    ///
    /// Whitespace in `coded` is ignored, so both the raw and the spaced-out
    /// forms decode the same. Symbols are matched longest first. Returns
    /// `None` when some part of the message matches no symbol.
    pub fn decode(&self, coded: &str) -> Option<String> {
        let mut inverse: Vec<(&str, &str)> = self
            .iter()
            .filter(|(_, symbol)| !symbol.is_empty())
            .map(|(key, symbol)| (symbol, key))
            .collect();
        inverse.sort_by(|a, b| b.0.len().cmp(&a.0.len()));

        let compact: String = coded.chars().filter(|c| !c.is_whitespace()).collect();
        let mut rest = compact.as_str();
        let mut decoded = String::with_capacity(compact.len());
        while let Some(first) = rest.chars().next() {
            match inverse.iter().find(|(symbol, _)| rest.starts_with(symbol)) {
                Some((symbol, key)) => {
                    if *key == "_" {
                        decoded.push(' ');
                    } else {
                        decoded.push_str(key);
                    }
                    rest = &rest[symbol.len()..];
                }
                None if first == WORD_SEPARATOR => {
                    decoded.push(' ');
                    rest = &rest[first.len_utf8()..];
                }
                None => return None,
            }
        }
        Some(decoded)
    }

    /// Whether `coded` decodes to exactly `decoded` under this mapping.
    pub fn verify(&self, coded: &str, decoded: &str) -> bool {
        self.decode(coded).is_some_and(|d| d == decoded)
    }
}

impl TryFrom<BTreeMap<String, String>> for CharMapping {
    type Error = Error;

    fn try_from(value: BTreeMap<String, String>) -> Result<Self> {
        Self::new(value)
    }
}

impl From<CharMapping> for BTreeMap<String, String> {
    fn from(value: CharMapping) -> Self {
        value.symbols
    }
}
