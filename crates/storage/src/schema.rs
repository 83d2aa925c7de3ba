#![forbid(unsafe_code)]

use crate::{Store, StoreError, identifier};
use mt_core::FieldType;

impl Store {
    /// Looks in both the main and the temporary schema.
    pub fn table_exists(&self, name: &str) -> Result<bool, StoreError> {
        let name = identifier(name)?;
        let count = self.number(
            r#"
            SELECT COUNT(*) FROM (
              SELECT name FROM sqlite_master WHERE type='table' AND name=?1
              UNION ALL
              SELECT name FROM sqlite_temp_master WHERE type='table' AND name=?1
            )
            "#,
            &crate::args![name],
        )?;
        Ok(count > 0)
    }

    pub fn field_exists(&self, table: &str, field: &str) -> Result<bool, StoreError> {
        let table = identifier(table)?;
        let field = identifier(field)?;
        let columns = self.rows(&format!("PRAGMA table_info({table})"), &[])?;
        Ok(columns
            .iter()
            .any(|column| column.get("name").is_some_and(|name| name == field)))
    }

    /// Creates a module table with the system columns. Existing tables are left alone.
    pub fn table_add(&self, name: &str, temporary: bool) -> Result<(), StoreError> {
        let name = identifier(name)?;
        let scope = if temporary { "TEMPORARY " } else { "" };
        self.run(
            &format!(
                "CREATE {scope}TABLE IF NOT EXISTS {name} (ejaId INTEGER PRIMARY KEY, ejaOwner INTEGER, ejaLog DATETIME)"
            ),
            &[],
        )?;
        Ok(())
    }

    pub fn table_del(&self, name: &str) -> Result<(), StoreError> {
        let name = identifier(name)?;
        self.run(&format!("DROP TABLE IF EXISTS {name}"), &[])?;
        Ok(())
    }

    /// Adds the physical column backing a field. Computed types own no column.
    pub fn field_add(
        &self,
        table: &str,
        field: &str,
        field_type: &FieldType,
    ) -> Result<(), StoreError> {
        if !field_type.has_column() {
            return Ok(());
        }
        let table = identifier(table)?;
        let field = identifier(field)?;
        if !self.table_exists(table)? {
            return Err(StoreError::TableMissing(table.to_string()));
        }
        if self.field_exists(table, field)? {
            return Err(StoreError::FieldExists(field.to_string()));
        }
        self.run(
            &format!(
                "ALTER TABLE {table} ADD {field} {}",
                field_type.sql_column_type()
            ),
            &[],
        )?;
        Ok(())
    }
}
