#![forbid(unsafe_code)]

use crate::options::{SelectOption, parse_select_options};
use crate::{Field, Row, Store, StoreError};
use mt_core::action::ActionType;
use mt_core::ident::is_identifier;
use mt_core::names;
use mt_core::value::number;
use mt_core::FieldType;
use std::collections::BTreeMap;

impl Store {
    pub fn module_id_by_name(&self, name: &str) -> Result<i64, StoreError> {
        if !is_identifier(name) {
            return Ok(0);
        }
        self.number(
            "SELECT ejaId FROM ejaModules WHERE name=?",
            &crate::args![name],
        )
    }

    pub fn module_name_by_id(&self, id: i64) -> Result<String, StoreError> {
        let name = self.value(
            "SELECT name FROM ejaModules WHERE ejaId=?",
            &crate::args![id],
        )?;
        Ok(if is_identifier(&name) { name } else { String::new() })
    }

    /// Id of a well-known module; 0 when it is missing or cannot be read.
    pub(crate) fn system_id(&self, name: &str) -> i64 {
        self.module_id_by_name(name).unwrap_or_default()
    }

    pub fn module_row(&self, id: i64) -> Result<Row, StoreError> {
        self.row(
            "SELECT * FROM ejaModules WHERE ejaId=?",
            &crate::args![id],
        )
    }

    pub fn field_type(&self, module_id: i64, field: &str) -> Result<Option<FieldType>, StoreError> {
        let raw = self.value(
            "SELECT type FROM ejaFields WHERE ejaModuleId=? AND name=?",
            &crate::args![module_id, field],
        )?;
        Ok((!raw.is_empty()).then(|| FieldType::parse(&raw)))
    }

    /// Names of the fields visible in `context`, in display order.
    pub fn field_names(&self, module_id: i64, context: ActionType) -> Result<Vec<String>, StoreError> {
        let power = context.power_column();
        let rows = self.rows(
            &format!(
                "SELECT name FROM ejaFields WHERE ejaModuleId=? AND {power}>0 AND {power}!='' ORDER BY {power} ASC"
            ),
            &crate::args![module_id],
        )?;
        Ok(rows
            .into_iter()
            .filter_map(|mut row| row.remove("name"))
            .collect())
    }

    /// Field descriptors for `context`, with values resolved from `values`, then
    /// the stored default.
    pub fn fields(
        &self,
        owner: i64,
        module_id: i64,
        context: ActionType,
        values: &BTreeMap<String, String>,
    ) -> Result<Vec<Field>, StoreError> {
        let power = context.power_column();
        let rows = self.rows(
            &format!(
                "SELECT * FROM ejaFields WHERE ejaModuleId=? AND {power}>0 AND {power}!='' ORDER BY {power} ASC"
            ),
            &crate::args![module_id],
        )?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let get = |key: &str| row.get(key).map(String::as_str).unwrap_or_default();
            let name = get("name").to_string();
            let stored = get("value");
            let field_type = FieldType::parse(get("type"));

            let mut value = match values.get(&name) {
                Some(value) if !value.is_empty() => value.clone(),
                _ => stored.to_string(),
            };
            let options = match field_type {
                FieldType::Select => parse_select_options(stored),
                FieldType::SqlMatrix => self.sql_options(stored).unwrap_or_default(),
                _ => Vec::<SelectOption>::new(),
            };
            if field_type.is_computed() {
                value = self.value(stored, &[]).unwrap_or_default();
            }
            if number(get("translate")) > 0 {
                value = self.translate(&value, Some(owner));
            }
            if context == ActionType::Edit && name == names::OWNER && number(&value) < 1 {
                value = owner.to_string();
            }

            out.push(Field {
                field_type: field_type.as_str().to_string(),
                label: self.translate(&name, Some(owner)),
                value,
                options,
                search_index: number(get("powerSearch")),
                search_size: number(get("sizeSearch")),
                list_index: number(get("powerList")),
                list_size: number(get("sizeList")),
                edit_index: number(get("powerEdit")),
                edit_size: number(get("sizeEdit")),
                name,
            });
        }
        Ok(out)
    }
}
