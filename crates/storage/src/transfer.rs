#![forbid(unsafe_code)]

use crate::{Store, StoreError, identifier, now};
use mt_core::value::number;
use mt_core::{FieldType, Value, names};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Portable description of a module: settings, fields, commands, translations
/// and optionally its records. Also the format of the built-in setup assets.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ModuleDefinition {
    pub name: String,
    pub module: ModuleSettings,
    pub field: Vec<ModuleField>,
    pub translation: Vec<ModuleTranslation>,
    pub command: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub data: Vec<BTreeMap<String, serde_json::Value>>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ModuleSettings {
    pub parent_name: String,
    pub power: i64,
    pub search_limit: i64,
    pub sql_created: i64,
    pub sort_list: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ModuleField {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
    pub value: String,
    pub translate: i64,
    pub power_search: i64,
    pub power_list: i64,
    pub power_edit: i64,
    pub size_search: i64,
    pub size_list: i64,
    pub size_edit: i64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ModuleTranslation {
    pub eja_language: String,
    pub eja_module_name: String,
    pub word: String,
    pub translation: String,
}

/// Owner of imported rows.
const IMPORT_OWNER: i64 = 1;

impl Store {
    pub fn module_export(&self, module_id: i64, with_data: bool) -> Result<ModuleDefinition, StoreError> {
        let name = self.module_name_by_id(module_id)?;
        if name.is_empty() {
            return Err(StoreError::ModuleNotFound);
        }
        let row = self.row(
            r#"
            SELECT a.searchLimit, a.sqlCreated, a.power, a.sortList,
                   (SELECT x.name FROM ejaModules AS x WHERE x.ejaId=a.parentId) AS parentName
            FROM ejaModules AS a WHERE ejaId=?
            "#,
            &crate::args![module_id],
        )?;
        let get = |key: &str| row.get(key).cloned().unwrap_or_default();

        let mut definition = ModuleDefinition {
            module: ModuleSettings {
                parent_name: get("parentName"),
                power: number(&get("power")),
                search_limit: number(&get("searchLimit")),
                sql_created: number(&get("sqlCreated")),
                sort_list: get("sortList"),
            },
            ..ModuleDefinition::default()
        };

        for field in self.rows(
            "SELECT * FROM ejaFields WHERE ejaModuleId=? ORDER BY ejaId ASC",
            &crate::args![module_id],
        )? {
            let get = |key: &str| field.get(key).cloned().unwrap_or_default();
            definition.field.push(ModuleField {
                name: get("name"),
                field_type: get("type"),
                value: get("value"),
                translate: number(&get("translate")),
                power_search: number(&get("powerSearch")),
                power_list: number(&get("powerList")),
                power_edit: number(&get("powerEdit")),
                size_search: number(&get("sizeSearch")),
                size_list: number(&get("sizeList")),
                size_edit: number(&get("sizeEdit")),
            });
        }

        for translation in self.rows(
            r#"
            SELECT ejaLanguage, word, translation,
                   (SELECT ejaModules.name FROM ejaModules WHERE ejaModules.ejaId=ejaModuleId) AS ejaModuleName
            FROM ejaTranslations
            WHERE ejaModuleId=? OR word=?
            ORDER BY ejaId ASC
            "#,
            &crate::args![module_id, name.as_str()],
        )? {
            let get = |key: &str| translation.get(key).cloned().unwrap_or_default();
            definition.translation.push(ModuleTranslation {
                eja_language: get("ejaLanguage"),
                eja_module_name: get("ejaModuleName"),
                word: get("word"),
                translation: get("translation"),
            });
        }

        definition.command = self
            .rows(
                "SELECT name FROM ejaCommands WHERE ejaId IN (SELECT ejaCommandId FROM ejaPermissions WHERE ejaModuleId=?) ORDER BY ejaId ASC",
                &crate::args![module_id],
            )?
            .into_iter()
            .filter_map(|mut row| row.remove("name"))
            .collect();

        if with_data {
            let table = identifier(&name)?;
            for mut record in self.rows(&format!("SELECT * FROM {table}"), &[])? {
                for column in names::SYSTEM_COLUMNS {
                    record.remove(column);
                }
                definition
                    .data
                    .push(record.into_iter().map(|(k, v)| (k, serde_json::Value::String(v))).collect());
            }
        }

        definition.name = name;
        Ok(definition)
    }

    /// Appends the data rows of `definition` to an existing module.
    pub fn module_append(&self, definition: &ModuleDefinition, name: &str) -> Result<usize, StoreError> {
        let name = if name.is_empty() { definition.name.as_str() } else { name };
        if self.module_id_by_name(name)? < 1 {
            return Err(StoreError::ModuleNotFound);
        }
        self.insert_data(name, &definition.data)
    }

    /// Creates or refreshes a module from `definition`: fields, permissions (granted
    /// to the import owner), translations, then data rows.
    pub fn module_import(&self, definition: &ModuleDefinition, name: &str) -> Result<i64, StoreError> {
        let name = identifier(if name.is_empty() { definition.name.as_str() } else { name })?;
        let settings = &definition.module;

        let mut module_id = self.module_id_by_name(name)?;
        if module_id < 1 {
            module_id = self
                .run(
                    r#"
                    INSERT INTO ejaModules (ejaId, ejaOwner, ejaLog, name, power, searchLimit, sqlCreated, sortList, parentId)
                    VALUES (NULL, ?, ?, ?, ?, ?, ?, ?, ?)
                    "#,
                    &crate::args![
                        IMPORT_OWNER,
                        now(),
                        name,
                        settings.power,
                        settings.search_limit,
                        settings.sql_created,
                        settings.sort_list.as_str(),
                        self.module_id_by_name(&settings.parent_name)?
                    ],
                )?
                .last_id;
            self.table_add(name, false)?;
        }

        self.run(
            "DELETE FROM ejaFields WHERE ejaModuleId=?",
            &crate::args![module_id],
        )?;
        for field in &definition.field {
            let field_type = FieldType::parse(&field.field_type);
            if settings.sql_created > 0
                && !names::is_system_column(&field.name)
                && !self.field_exists(name, &field.name)?
            {
                self.field_add(name, &field.name, &field_type)?;
            }
            self.run(
                r#"
                INSERT INTO ejaFields
                  (ejaId, ejaOwner, ejaLog, ejaModuleId, name, type, value, translate,
                   powerSearch, powerList, powerEdit, sizeSearch, sizeList, sizeEdit)
                VALUES (NULL, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
                &crate::args![
                    IMPORT_OWNER,
                    now(),
                    module_id,
                    field.name.as_str(),
                    field.field_type.as_str(),
                    field.value.as_str(),
                    field.translate,
                    field.power_search,
                    field.power_list,
                    field.power_edit,
                    field.size_search,
                    field.size_list,
                    field.size_edit
                ],
            )?;
        }

        let permissions = self.system_id(names::PERMISSIONS);
        let users = self.system_id(names::USERS);
        self.run(
            r#"
            DELETE FROM ejaLinks
            WHERE dstModuleId=? AND srcModuleId=?
              AND srcFieldId IN (SELECT t.ejaId FROM ejaPermissions AS t WHERE t.ejaModuleId=?)
            "#,
            &crate::args![users, permissions, module_id],
        )?;
        self.run(
            "DELETE FROM ejaPermissions WHERE ejaModuleId=?",
            &crate::args![module_id],
        )?;
        for command in &definition.command {
            let permission_id = self
                .run(
                    r#"
                    INSERT INTO ejaPermissions (ejaId, ejaOwner, ejaLog, ejaModuleId, ejaCommandId)
                    VALUES (NULL, ?, ?, ?, (SELECT t.ejaId FROM ejaCommands AS t WHERE t.name=? LIMIT 1))
                    "#,
                    &crate::args![IMPORT_OWNER, now(), module_id, command.as_str()],
                )?
                .last_id;
            self.run(
                r#"
                INSERT INTO ejaLinks (ejaId, ejaOwner, ejaLog, srcModuleId, srcFieldId, dstModuleId, dstFieldId, power)
                VALUES (NULL, ?, ?, ?, ?, ?, ?, 1)
                "#,
                &crate::args![IMPORT_OWNER, now(), permissions, permission_id, users, IMPORT_OWNER],
            )?;
        }

        self.run(
            "DELETE FROM ejaTranslations WHERE ejaModuleId=?",
            &crate::args![module_id],
        )?;
        self.run(
            "DELETE FROM ejaTranslations WHERE word=? AND ejaModuleId < 1",
            &crate::args![name],
        )?;
        for translation in &definition.translation {
            let scope = if translation.eja_module_name == name { module_id } else { 0 };
            self.run(
                r#"
                INSERT INTO ejaTranslations (ejaId, ejaOwner, ejaLog, ejaModuleId, ejaLanguage, word, translation)
                VALUES (NULL, ?, ?, ?, ?, ?, ?)
                "#,
                &crate::args![
                    IMPORT_OWNER,
                    now(),
                    scope,
                    translation.eja_language.as_str(),
                    translation.word.as_str(),
                    translation.translation.as_str()
                ],
            )?;
        }

        self.insert_data(name, &definition.data)?;
        Ok(module_id)
    }

    /// Inserts records owned by the import owner. Rows with an invalid column name are skipped.
    pub(crate) fn insert_data(
        &self,
        table: &str,
        data: &[BTreeMap<String, serde_json::Value>],
    ) -> Result<usize, StoreError> {
        let table = identifier(table)?;
        let mut inserted = 0;
        for record in data {
            let mut columns = vec![names::OWNER.to_string(), names::LOG.to_string()];
            let mut args = vec![Value::from(IMPORT_OWNER), Value::from(now())];
            let mut valid = true;
            for (column, value) in record {
                if names::is_system_column(column) {
                    continue;
                }
                if identifier(column).is_err() {
                    valid = false;
                    break;
                }
                columns.push(column.clone());
                args.push(json_value(value));
            }
            if !valid {
                tracing::warn!(table, "import row skipped: invalid column name");
                continue;
            }
            let placeholders = vec!["?"; columns.len()].join(", ");
            self.run(
                &format!(
                    "INSERT INTO {table} ({}) VALUES ({placeholders})",
                    columns.join(", ")
                ),
                &args,
            )?;
            inserted += 1;
        }
        Ok(inserted)
    }
}

fn json_value(value: &serde_json::Value) -> Value {
    match value {
        serde_json::Value::Null => Value::from(""),
        serde_json::Value::Bool(flag) => Value::from(*flag),
        serde_json::Value::Number(number) => match number.as_i64() {
            Some(integer) => Value::from(integer),
            None => Value::from(number.as_f64().unwrap_or_default()),
        },
        serde_json::Value::String(text) => Value::from(text.as_str()),
        other => Value::from(other.to_string()),
    }
}
