#![forbid(unsafe_code)]

/// A record-to-record relation: `module_id/field_id` is the source record,
/// `link_module_id/link_field_id` the record it is linked to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LinkEdge {
    pub module_id: i64,
    pub field_id: i64,
    pub link_module_id: i64,
    pub link_field_id: i64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompiledSearch {
    pub sql: String,
    pub args: Vec<String>,
}
