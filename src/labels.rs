use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Result;
use thiserror::Error;

use crate::model::ParseWarning;
use crate::util::read_text;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelMap {
    labels: BTreeMap<String, bool>,
}

impl LabelMap {
    pub fn get(&self, identifier: &str) -> Option<bool> {
        self.labels.get(identifier).copied()
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.labels.contains_key(identifier)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn positives(&self) -> usize {
        self.labels.values().filter(|value| **value).count()
    }

    pub fn identifiers(&self) -> impl Iterator<Item = &str> {
        self.labels.keys().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<(S, bool)> for LabelMap {
    fn from_iter<I: IntoIterator<Item = (S, bool)>>(iter: I) -> Self {
        Self {
            labels: iter
                .into_iter()
                .map(|(identifier, value)| (identifier.into(), value))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LabelError {
    #[error("expected `identifier<TAB>0|1`, found {found} field(s)")]
    WrongFieldCount { found: usize },
    #[error("label must be 0 or 1, found `{0}`")]
    InvalidValue(String),
    #[error("conflicting duplicate label for `{identifier}`; keeping first value")]
    Conflicting { identifier: String },
}

#[derive(Debug, Clone, Default)]
pub struct LoadedLabels {
    pub labels: LabelMap,
    pub warnings: Vec<ParseWarning>,
}

pub fn load_labels(path: &Path) -> Result<LoadedLabels> {
    let text = read_text(path)?;
    Ok(parse_labels(&text))
}

pub fn parse_labels(text: &str) -> LoadedLabels {
    let mut labels = BTreeMap::<String, bool>::new();
    let mut warnings = Vec::new();

    for (index, line) in text.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let result = parse_label_line(trimmed).and_then(|(identifier, value)| {
            match labels.entry(identifier.to_string()) {
                Entry::Vacant(slot) => {
                    slot.insert(value);
                    Ok(())
                }
                Entry::Occupied(existing) if *existing.get() == value => Ok(()),
                Entry::Occupied(_) => Err(LabelError::Conflicting {
                    identifier: identifier.to_string(),
                }),
            }
        });

        if let Err(err) = result {
            warnings.push(ParseWarning {
                line: index + 1,
                reason: err.to_string(),
            });
        }
    }

    LoadedLabels {
        labels: LabelMap { labels },
        warnings,
    }
}

fn parse_label_line(line: &str) -> Result<(&str, bool), LabelError> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    let [identifier, value] = fields.as_slice() else {
        return Err(LabelError::WrongFieldCount {
            found: fields.len(),
        });
    };

    match *value {
        "1" => Ok((*identifier, true)),
        "0" => Ok((*identifier, false)),
        other => Err(LabelError::InvalidValue(other.to_string())),
    }
}
