#![forbid(unsafe_code)]

use crate::Row;
use crate::options::SelectOption;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunResult {
    pub changes: i64,
    pub last_id: i64,
}

/// A permitted action as offered to the caller.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Command {
    pub name: String,
    pub label: String,
    pub linker: bool,
}

/// A field descriptor resolved for one action context.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Field {
    #[serde(rename = "type")]
    pub field_type: String,
    pub name: String,
    pub label: String,
    pub value: String,
    pub options: Vec<SelectOption>,
    pub search_index: i64,
    pub search_size: i64,
    pub list_index: i64,
    pub list_size: i64,
    pub edit_index: i64,
    pub edit_size: i64,
}

/// A related module, or the active link target of a linking session.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LinkRef {
    pub module_id: i64,
    pub field_id: i64,
    pub label: String,
    pub module_label: String,
}

impl LinkRef {
    pub fn is_active(&self) -> bool {
        self.module_id > 0 && self.field_id > 0 && !self.label.is_empty()
    }
}

/// Entry of the breadcrumb path or of the navigation tree.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleNode {
    pub id: i64,
    pub name: String,
    pub label: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchMatrix {
    pub rows: Vec<Row>,
    pub cols: Vec<String>,
    pub labels: BTreeMap<String, String>,
}
