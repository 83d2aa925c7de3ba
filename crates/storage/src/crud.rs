#![forbid(unsafe_code)]

use crate::{Row, Store, StoreError, now, password_digest};
use mt_core::{FieldType, Value, names};

/// Value written for a field: passwords are stored as digests (a 64-char value
/// is taken as one already), everything else follows [`Value::coerce`].
pub fn stored_value(field_type: Option<&FieldType>, raw: &str) -> Value {
    match field_type {
        Some(FieldType::Password) if raw.chars().count() == 64 => Value::from(raw),
        Some(FieldType::Password) => Value::from(password_digest(raw)),
        Some(field_type) => Value::coerce(field_type, raw),
        None => Value::from(raw),
    }
}

impl Store {
    fn module_table(&self, module_id: i64) -> Result<String, StoreError> {
        let name = self.module_name_by_id(module_id)?;
        if name.is_empty() {
            return Err(StoreError::ModuleNotFound);
        }
        if !self.table_exists(&name)? {
            return Err(StoreError::TableMissing(name));
        }
        Ok(name)
    }

    /// Inserts an empty record owned by `owner` and returns its id.
    pub fn new_record(&self, owner: i64, module_id: i64) -> Result<i64, StoreError> {
        let table = self.module_table(module_id)?;
        let run = self.run(
            &format!("INSERT INTO {table} (ejaOwner, ejaLog) VALUES (?, ?)"),
            &crate::args![owner, now()],
        )?;
        Ok(run.last_id)
    }

    /// One record, if it belongs to the owner set of `owner`; empty otherwise.
    pub fn get(&self, owner: i64, module_id: i64, id: i64) -> Result<Row, StoreError> {
        let table = self.module_table(module_id)?;
        self.row(
            &format!(
                "SELECT * FROM {table} WHERE ejaId=? AND ejaOwner IN ({})",
                self.owners_csv(owner, module_id)
            ),
            &crate::args![id],
        )
    }

    /// Writes one column of an owned record; returns the number of rows changed.
    pub fn put(
        &self,
        owner: i64,
        module_id: i64,
        id: i64,
        field: &str,
        value: Value,
    ) -> Result<i64, StoreError> {
        let table = self.module_table(module_id)?;
        if field == names::ID || !self.field_exists(&table, field)? {
            return Err(StoreError::UnknownField(field.to_string()));
        }
        let run = self.run(
            &format!(
                "UPDATE {table} SET {field}=? WHERE ejaId=? AND ejaOwner IN ({})",
                self.owners_csv(owner, module_id)
            ),
            &[value, Value::from(id)],
        )?;
        Ok(run.changes)
    }

    /// Deletes an owned record and every link touching it. Deleting a module row
    /// whose table exists also drops the table and the module's metadata.
    pub fn del(&self, owner: i64, module_id: i64, id: i64) -> Result<i64, StoreError> {
        let module_name = self.module_name_by_id(module_id)?;
        if module_name.is_empty() {
            return Err(StoreError::ModuleNotFound);
        }
        let owners = self.owners_csv(owner, module_id);

        if module_name == names::MODULES {
            let table = self.value(
                &format!("SELECT name FROM ejaModules WHERE ejaId=? AND ejaOwner IN ({owners})"),
                &crate::args![id],
            )?;
            if !table.is_empty() && self.table_exists(&table)? {
                self.module_purge(id, &table)?;
            }
        }

        let run = self.run(
            &format!(
                "DELETE FROM {} WHERE ejaId=? AND ejaOwner IN ({owners})",
                crate::identifier(&module_name)?
            ),
            &crate::args![id],
        )?;
        if run.changes > 0 {
            self.links_purge_record(module_id, id)?;
        }
        Ok(run.changes)
    }

    fn module_purge(&self, module_id: i64, table: &str) -> Result<(), StoreError> {
        self.table_del(table)?;
        self.run(
            "DELETE FROM ejaLinks WHERE srcModuleId=? AND srcFieldId IN (SELECT ejaId FROM ejaPermissions WHERE ejaModuleId=?)",
            &crate::args![self.system_id(names::PERMISSIONS), module_id],
        )?;
        for sql in [
            "DELETE FROM ejaFields WHERE ejaModuleId=?",
            "DELETE FROM ejaPermissions WHERE ejaModuleId=?",
            "DELETE FROM ejaTranslations WHERE ejaModuleId=?",
        ] {
            self.run(sql, &crate::args![module_id])?;
        }
        self.run(
            "DELETE FROM ejaModuleLinks WHERE dstModuleId=? OR srcModuleId=?",
            &crate::args![module_id, module_id],
        )?;
        Ok(())
    }
}
