//! Mail-merge records and `${field}` substitution.

use crate::error::LabelError;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::fmt::Debug;

/// One row of merge data. Printing reads records, never changes them.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "RecordRepr")]
pub struct MergeRecord {
    fields: Vec<(String, String)>,
    selected: bool,
}

impl MergeRecord {
    pub fn new<K, V>(fields: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            fields: fields
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            selected: true,
        }
    }

    pub fn with_selected(mut self, selected: bool) -> Self {
        self.selected = selected;
        self
    }

    pub fn is_selected(&self) -> bool {
        self.selected
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == field)
            .map(|(_, v)| v.as_str())
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RecordRepr {
    Flagged {
        #[serde(default = "selected_default")]
        selected: bool,
        fields: Map<String, Value>,
    },
    Plain(Map<String, Value>),
}

// Keeps source field order. Non-string scalars keep their JSON text; null is
// an empty field.
fn field_pairs(fields: Map<String, Value>) -> Vec<(String, String)> {
    fields
        .into_iter()
        .map(|(key, value)| {
            let text = match value {
                Value::String(text) => text,
                Value::Null => String::new(),
                other => other.to_string(),
            };
            (key, text)
        })
        .collect()
}

fn selected_default() -> bool {
    true
}

impl From<RecordRepr> for MergeRecord {
    fn from(repr: RecordRepr) -> Self {
        match repr {
            RecordRepr::Flagged { selected, fields } => {
                MergeRecord::new(field_pairs(fields)).with_selected(selected)
            }
            RecordRepr::Plain(fields) => MergeRecord::new(field_pairs(fields)),
        }
    }
}

/// Ordered supply of merge records, produced by whatever reader the caller
/// uses.
pub trait MergeSource: Debug {
    fn records(&self) -> Result<Vec<MergeRecord>, LabelError>;
}

/// Records already held in memory.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct RecordList(Vec<MergeRecord>);

impl RecordList {
    pub fn new(records: Vec<MergeRecord>) -> Self {
        Self(records)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn selected_count(&self) -> usize {
        self.0.iter().filter(|r| r.is_selected()).count()
    }
}

impl MergeSource for RecordList {
    fn records(&self) -> Result<Vec<MergeRecord>, LabelError> {
        Ok(self.0.clone())
    }
}

impl FromIterator<MergeRecord> for RecordList {
    fn from_iter<I: IntoIterator<Item = MergeRecord>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Replaces `${field}` placeholders with values from `record`.
///
/// Fields missing from the record expand to nothing. Without a record the
/// text is returned unchanged, placeholders included, so a design previews
/// with its field names visible. An unterminated `${` is kept literally.
pub fn expand(text: &str, record: Option<&MergeRecord>) -> String {
    let Some(record) = record else {
        return text.to_string();
    };
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let name = &after[..end];
                if let Some(value) = record.get(name) {
                    out.push_str(value);
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}
