#![forbid(unsafe_code)]

use mt_storage::LinkRef;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One client turn. Every field is optional on the wire.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Request {
    pub action: String,
    pub session: String,
    pub module_id: i64,
    pub module_name: String,
    pub id: i64,
    pub id_list: Vec<i64>,
    pub values: BTreeMap<String, String>,
    pub search_limit: i64,
    pub search_offset: i64,
    /// Column name to `ASC`/`DESC`.
    pub search_order: BTreeMap<String, String>,
    pub search_link: bool,
    pub search_link_clean: bool,
    pub link: LinkRef,
    pub language: String,
}

impl Request {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            ..Self::default()
        }
    }

    pub fn with_session(mut self, session: impl Into<String>) -> Self {
        self.session = session.into();
        self
    }

    pub fn with_module(mut self, name: impl Into<String>) -> Self {
        self.module_name = name.into();
        self
    }

    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sparse_json_fills_defaults() {
        let request: Request = serde_json::from_str(
            r#"{"action":"login","values":{"username":"admin"},"searchOrder":{"name":"ASC"},"idList":[3,4]}"#,
        )
        .expect("parse request");
        assert_eq!(request.action, "login");
        assert_eq!(request.values.get("username").map(String::as_str), Some("admin"));
        assert_eq!(request.search_order.get("name").map(String::as_str), Some("ASC"));
        assert_eq!(request.id_list, vec![3, 4]);
        assert_eq!(request.module_id, 0);
        assert!(!request.link.is_active());
    }
}
