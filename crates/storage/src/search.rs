#![forbid(unsafe_code)]

use crate::options::{SelectOption, label_for, parse_select_options};
use crate::{CompiledSearch, SearchMatrix, Store, StoreError, identifier};
use mt_core::ident::is_identifier;
use mt_core::value::number;
use mt_core::{FieldType, FilterKey, Value, names};
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;

fn order_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(
                r"^\s*([A-Za-z0-9_]+\s+(ASC|DESC)\s*,\s*)*[A-Za-z0-9_]+\s+(ASC|DESC)\s*$",
            )
            .ok()
        })
        .as_ref()
}

pub fn order_is_valid(order: &str) -> bool {
    order_pattern().is_some_and(|pattern| pattern.is_match(order))
}

/// ORDER BY / LIMIT / OFFSET tail. Order expressions outside the
/// `field ASC|DESC[, ...]` grammar are dropped.
pub fn order_and_limit(order: &str, limit: i64, offset: i64) -> String {
    if !order_is_valid(order) {
        tracing::warn!(order, "order expression rejected");
        return format!("LIMIT {limit} OFFSET {offset}");
    }
    format!("ORDER BY {order} LIMIT {limit} OFFSET {offset}")
}

/// Rewrites a search query into its COUNT form: the span from the first top-level
/// `FROM` keyword up to the last top-level `LIMIT` keyword.
pub fn count_query(sql: &str) -> Option<String> {
    let tokens = keyword_positions(sql);
    let start = tokens
        .iter()
        .find(|token| token.depth == 0 && token.word.eq_ignore_ascii_case("FROM"))?
        .start;
    let stop = tokens
        .iter()
        .rev()
        .find(|token| {
            token.depth == 0 && token.start > start && token.word.eq_ignore_ascii_case("LIMIT")
        })
        .map(|token| token.start)
        .unwrap_or(sql.len());
    Some(format!("SELECT COUNT(*) {}", sql[start..stop].trim_end()))
}

struct Token<'a> {
    word: &'a str,
    start: usize,
    depth: usize,
}

/// Word tokens outside string literals, with their parenthesis depth.
fn keyword_positions(sql: &str) -> Vec<Token<'_>> {
    let bytes = sql.as_bytes();
    let mut tokens = Vec::new();
    let mut depth = 0usize;
    let mut index = 0usize;
    while index < bytes.len() {
        let byte = bytes[index];
        match byte {
            b'\'' | b'"' | b'`' => {
                index += 1;
                while index < bytes.len() && bytes[index] != byte {
                    index += 1;
                }
                index += 1;
            }
            b'(' => {
                depth += 1;
                index += 1;
            }
            b')' => {
                depth = depth.saturating_sub(1);
                index += 1;
            }
            _ if byte.is_ascii_alphanumeric() || byte == b'_' => {
                let start = index;
                while index < bytes.len()
                    && (bytes[index].is_ascii_alphanumeric() || bytes[index] == b'_')
                {
                    index += 1;
                }
                tokens.push(Token {
                    word: &sql[start..index],
                    start,
                    depth,
                });
            }
            _ => index += 1,
        }
    }
    tokens
}

/// Replaces the first projection column named `column` (before the top-level FROM).
fn replace_projection_column(sql: &str, column: &str, replacement: &str) -> String {
    let tokens = keyword_positions(sql);
    let from = tokens
        .iter()
        .find(|token| token.depth == 0 && token.word.eq_ignore_ascii_case("FROM"))
        .map(|token| token.start)
        .unwrap_or(sql.len());
    match tokens
        .iter()
        .find(|token| token.start < from && token.word == column)
    {
        Some(token) => format!(
            "{}{}{}",
            &sql[..token.start],
            replacement,
            &sql[token.start + column.len()..]
        ),
        None => sql.to_string(),
    }
}

struct ListColumn {
    field_type: FieldType,
    options: Option<Vec<SelectOption>>,
    translate: bool,
}

impl Store {
    /// Compiles the list query of a module: `ejaId` plus the list fields,
    /// scoped to the owner set, with one predicate per non-empty filter.
    pub fn search_query(
        &self,
        owner: i64,
        module_name: &str,
        filters: &BTreeMap<String, String>,
    ) -> Result<CompiledSearch, StoreError> {
        let table = identifier(module_name)?;
        let module_id = self.module_id_by_name(table)?;
        let fields = self.rows(
            "SELECT name, type, powerList FROM ejaFields WHERE ejaModuleId=? ORDER BY powerList",
            &crate::args![module_id],
        )?;

        let mut types = BTreeMap::from([
            (names::ID.to_string(), FieldType::Integer),
            (names::OWNER.to_string(), FieldType::Integer),
            (names::LOG.to_string(), FieldType::Datetime),
        ]);
        let mut sql = String::from("SELECT ejaId");
        for field in &fields {
            let name = field.get("name").map(String::as_str).unwrap_or_default();
            if !is_identifier(name) {
                continue;
            }
            if field.get("powerList").is_some_and(|power| number(power) > 0) {
                sql.push(',');
                sql.push_str(name);
            }
            let field_type = field.get("type").map(String::as_str).unwrap_or_default();
            types.insert(name.to_string(), FieldType::parse(field_type));
        }
        sql.push_str(&format!(
            " FROM {table} WHERE ejaOwner IN ({}) ",
            self.owners_csv(owner, module_id)
        ));

        let mut args = Vec::new();
        for (raw, value) in filters {
            if value.is_empty() {
                continue;
            }
            let key = FilterKey::parse(raw);
            if !is_identifier(key.field) {
                continue;
            }
            let Some(field_type) = types.get(key.field) else {
                continue;
            };
            let predicate = field_type.predicate(key.bound);
            sql.push_str(&predicate.render(key.field));
            args.push(predicate.argument(value));
        }

        Ok(CompiledSearch { sql, args })
    }

    /// Total rows of a search query; 0 when it cannot be counted.
    pub fn search_count(&self, sql: &str, args: &[String]) -> i64 {
        let Some(query) = count_query(sql) else {
            return 0;
        };
        self.number(&query, &text_args(args)).unwrap_or_default()
    }

    /// Runs a list query and shapes every row for display.
    pub fn search_matrix(
        &self,
        owner: i64,
        module_id: i64,
        sql: &str,
        args: &[String],
    ) -> Result<SearchMatrix, StoreError> {
        let fields = self.rows(
            "SELECT * FROM ejaFields WHERE ejaModuleId=? AND powerList>0 ORDER BY powerList",
            &crate::args![module_id],
        )?;

        let mut query = sql.to_string();
        let mut header = BTreeMap::new();
        for field in &fields {
            let get = |key: &str| field.get(key).map(String::as_str).unwrap_or_default();
            let name = get("name");
            let field_type = FieldType::parse(get("type"));
            let options = match field_type {
                FieldType::Boolean => Some(SelectOption::boolean()),
                FieldType::Select => Some(parse_select_options(get("value"))),
                FieldType::SqlMatrix => Some(self.sql_options(get("value")).unwrap_or_default()),
                _ => None,
            };
            if field_type.is_computed() && is_identifier(name) {
                query = replace_projection_column(
                    &query,
                    name,
                    &format!("({}) AS {name}", get("value")),
                );
            }
            header.insert(
                name.to_string(),
                ListColumn {
                    field_type,
                    options,
                    translate: number(get("translate")) > 0,
                },
            );
        }

        let args = text_args(args);
        let cols = self.cols(&query)?;
        let mut rows = self.rows(&query, &args)?;
        let labels = cols
            .iter()
            .map(|col| (col.clone(), self.translate(col, Some(owner))))
            .collect();

        for row in &mut rows {
            for (name, column) in &header {
                self.shape_cell(owner, row, name, column);
            }
        }

        Ok(SearchMatrix { rows, cols, labels })
    }

    fn shape_cell(&self, owner: i64, row: &mut crate::Row, name: &str, column: &ListColumn) {
        let record_id = row.get(names::ID).cloned().unwrap_or_default();
        let Some(cell) = row.get_mut(name) else {
            return;
        };
        if let Some(options) = &column.options
            && !cell.is_empty()
        {
            if name.starts_with(names::ID) {
                *cell = record_id;
            } else if let Some(label) = label_for(options, cell) {
                *cell = label.to_string();
            }
        }
        if let Some(truncated) = column.field_type.display_timestamp(cell) {
            *cell = truncated;
        }
        if column.translate {
            *cell = self.translate(cell, Some(owner));
        }
    }
}

fn text_args(args: &[String]) -> Vec<Value> {
    args.iter().map(Value::from).collect()
}
