//! Core data model.
//!
//! An input item is one ranked character. Each item yields zero or more
//! output records, persisted one per line as tab-separated fields. Keys of
//! finished items accumulate in the processed set.

use std::collections::HashSet;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// One unit of input eligible for generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputItem {
    /// Priority rank. Lower is more important. Used for ordering and the
    /// cutoff only; two items may share a rank.
    pub rank: u32,

    /// Natural identifier of the item (a single character).
    pub key: String,
}

impl InputItem {
    pub fn new(rank: u32, key: impl Into<String>) -> Self {
        Self {
            rank,
            key: key.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

/// One generated phrase for a key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputRecord {
    pub key: String,
    pub phrase: String,
    pub pinyin: String,
    pub translation: String,
    pub context: String,
}

impl OutputRecord {
    /// Render as a single results-log line: `key\tphrase\tpinyin\ttranslation\tcontext`.
    ///
    /// Tabs and line breaks inside a field are collapsed to a space so the
    /// line always splits back into exactly five fields.
    pub fn to_line(&self) -> String {
        [
            &self.key,
            &self.phrase,
            &self.pinyin,
            &self.translation,
            &self.context,
        ]
        .iter()
        .map(|field| sanitize_field(field))
        .collect::<Vec<_>>()
        .join("\t")
    }
}

/// Error returned when a results line does not have five tab-separated fields.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("expected 5 tab-separated fields, found {found}")]
pub struct ParseRecordError {
    pub found: usize,
}

impl FromStr for OutputRecord {
    type Err = ParseRecordError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim_end_matches(['\r', '\n']);
        let fields: Vec<&str> = line.split('\t').collect();
        let [key, phrase, pinyin, translation, context] = fields.as_slice() else {
            return Err(ParseRecordError {
                found: fields.len(),
            });
        };
        Ok(Self {
            key: key.to_string(),
            phrase: phrase.to_string(),
            pinyin: pinyin.to_string(),
            translation: translation.to_string(),
            context: context.to_string(),
        })
    }
}

fn sanitize_field(field: &str) -> String {
    if field.contains(['\t', '\r', '\n']) {
        field
            .split(['\t', '\r', '\n'])
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    } else {
        field.to_string()
    }
}

// ---------------------------------------------------------------------------
// Processed set
// ---------------------------------------------------------------------------

/// Keys already completed by earlier runs.
///
/// Rebuilt from the processed log at startup. Duplicate markers in the log
/// collapse to a single member.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessedSet {
    keys: HashSet<String>,
}

impl ProcessedSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from the contents of a processed log (one key per line).
    /// Blank lines are ignored.
    pub fn from_log(contents: &str) -> Self {
        contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl FromIterator<String> for ProcessedSet {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self {
            keys: iter.into_iter().collect(),
        }
    }
}
