#![forbid(unsafe_code)]

use mt_storage::{Command, Field, LinkRef, ModuleNode, Row, Store};
use serde::Serialize;
use std::collections::BTreeMap;

/// Everything a renderer needs for the resolved state. The template is chosen by `action_type`.
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub action: String,
    pub action_type: String,
    pub module_id: i64,
    pub module_name: String,
    pub module_label: String,
    pub owner: i64,
    pub session: String,
    pub language: String,
    pub id: i64,
    pub values: BTreeMap<String, String>,
    pub fields: Vec<Field>,
    pub commands: Vec<Command>,
    pub search_rows: Vec<Row>,
    pub search_cols: Vec<String>,
    pub search_labels: BTreeMap<String, String>,
    pub search_count: i64,
    pub search_limit: i64,
    pub search_offset: i64,
    pub search_last: i64,
    pub search_links: Vec<String>,
    pub search_order: BTreeMap<String, String>,
    pub link: LinkRef,
    pub linking: bool,
    pub links: Vec<LinkRef>,
    /// Related modules keyed back to this record by a foreign-key field.
    pub sub_modules: Vec<LinkRef>,
    pub path: Vec<ModuleNode>,
    pub tree: Vec<ModuleNode>,
    pub info: Vec<String>,
    pub alert: Vec<String>,
}

impl Response {
    /// Translates `word` for the current owner and queues it as an info message.
    pub fn info(&mut self, store: &Store, word: &str) {
        let text = store.translate(word, Some(self.owner));
        tracing::debug!(module = %self.module_name, message = %text, "info");
        self.info.push(text);
    }

    pub fn alert(&mut self, store: &Store, word: &str) {
        let text = store.translate(word, Some(self.owner));
        tracing::debug!(module = %self.module_name, message = %text, "alert");
        self.alert.push(text);
    }

    pub fn value(&self, key: &str) -> &str {
        self.values.get(key).map(String::as_str).unwrap_or_default()
    }
}
