#![forbid(unsafe_code)]

use crate::{Store, StoreError};
use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SelectOption {
    pub key: String,
    pub value: String,
}

impl SelectOption {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn boolean() -> Vec<Self> {
        vec![Self::new("0", "FALSE"), Self::new("1", "TRUE")]
    }
}

fn pair_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"([^|\n]*)\|([^|\n]*)").ok())
        .as_ref()
}

/// Parses the static option list of a `select` field: `key|label` pairs when the
/// text contains `|`, otherwise one option per line used as both key and label.
pub fn parse_select_options(text: &str) -> Vec<SelectOption> {
    let text = text.replace('\r', "");
    if text.contains('|') {
        let Some(pattern) = pair_pattern() else {
            return Vec::new();
        };
        return pattern
            .captures_iter(&text)
            .map(|caps| SelectOption::new(&caps[1], &caps[2]))
            .collect();
    }
    text.split('\n')
        .map(|line| SelectOption::new(line, line))
        .collect()
}

/// Label of the last option whose key matches.
pub fn label_for<'a>(options: &'a [SelectOption], key: &str) -> Option<&'a str> {
    options
        .iter()
        .rev()
        .find(|option| option.key == key)
        .map(|option| option.value.as_str())
}

impl Store {
    /// Options of a `sqlMatrix` field: first column is the key, second the label.
    pub fn sql_options(&self, query: &str) -> Result<Vec<SelectOption>, StoreError> {
        let cols = self.cols(query)?;
        let (Some(key), Some(label)) = (cols.first(), cols.get(1)) else {
            return Ok(Vec::new());
        };
        Ok(self
            .rows(query, &[])?
            .iter()
            .map(|row| {
                SelectOption::new(
                    row.get(key).cloned().unwrap_or_default(),
                    row.get(label).cloned().unwrap_or_default(),
                )
            })
            .collect())
    }
}
