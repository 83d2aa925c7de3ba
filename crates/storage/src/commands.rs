#![forbid(unsafe_code)]

use crate::{Command, Store, StoreError, now};
use mt_core::action::ActionType;
use mt_core::ids_to_csv;
use mt_core::names;
use mt_core::value::number;

impl Store {
    /// Commands `user` may run on `module_id`, granted directly or through one of
    /// the user's groups. With a context, only commands with a positive power in
    /// that context are returned, in power order.
    pub fn commands(
        &self,
        user: i64,
        module_id: i64,
        context: Option<ActionType>,
    ) -> Result<Vec<Command>, StoreError> {
        let module_name = self.module_name_by_id(module_id)?;
        if module_name.is_empty() {
            return Err(StoreError::ModuleNotFound);
        }

        let mut commands = Vec::new();
        if module_name == names::LOGIN {
            commands.push(Command {
                name: "login".to_string(),
                label: self.translate("login", Some(user)),
                linker: false,
            });
        }

        let ordering = context
            .map(|context| {
                let power = context.power_column();
                format!(" AND {power} > 0 ORDER BY {power} ASC ")
            })
            .unwrap_or_default();
        let groups = ids_to_csv(&self.user_group_list(user));
        let rows = self.rows(
            &format!(
                r#"
                SELECT *
                FROM ejaCommands
                WHERE ejaId IN (
                  SELECT ejaCommandId
                  FROM ejaPermissions
                  WHERE ejaModuleId=? AND ejaId IN (
                    SELECT srcFieldId
                    FROM ejaLinks
                    WHERE srcModuleId=? AND (
                      (dstModuleId=? AND dstFieldId=?)
                      OR (dstModuleId=? AND dstFieldId IN ({groups}))
                    )
                  )
                ) {ordering}"#
            ),
            &crate::args![
                module_id,
                self.system_id(names::PERMISSIONS),
                self.system_id(names::USERS),
                user,
                self.system_id(names::GROUPS)
            ],
        )?;

        for row in rows {
            let name = row.get("name").cloned().unwrap_or_default();
            commands.push(Command {
                label: self.translate(&name, Some(user)),
                linker: row.get("linking").is_some_and(|flag| number(flag) > 0),
                name,
            });
        }
        Ok(commands)
    }

    pub fn permission_count(&self, module_id: i64) -> Result<i64, StoreError> {
        self.number(
            "SELECT COUNT(*) FROM ejaPermissions WHERE ejaModuleId=?",
            &crate::args![module_id],
        )
    }

    /// Grants every command flagged `defaultCommand` on `module_id`.
    pub fn permission_add_default(&self, owner: i64, module_id: i64) -> Result<i64, StoreError> {
        let run = self.run(
            r#"
            INSERT INTO ejaPermissions (ejaId, ejaOwner, ejaLog, ejaModuleId, ejaCommandId)
            SELECT NULL, ?, ?, ?, ejaId FROM ejaCommands WHERE defaultCommand>0
            "#,
            &crate::args![owner, now(), module_id],
        )?;
        Ok(run.changes)
    }

    pub fn permission_add(&self, owner: i64, module_id: i64, command: &str) -> Result<i64, StoreError> {
        let run = self.run(
            r#"
            INSERT INTO ejaPermissions (ejaId, ejaOwner, ejaLog, ejaModuleId, ejaCommandId)
            SELECT NULL, ?, ?, ?, ejaId FROM ejaCommands WHERE name=?
            "#,
            &crate::args![owner, now(), module_id, command],
        )?;
        if run.changes == 0 {
            return Err(StoreError::UnknownCommand(command.to_string()));
        }
        Ok(run.changes)
    }

    /// Links every permission of `module_id` to `user`.
    pub fn user_permission_copy(&self, user: i64, module_id: i64) -> Result<i64, StoreError> {
        let run = self.run(
            r#"
            INSERT INTO ejaLinks (ejaId, ejaOwner, ejaLog, srcModuleId, srcFieldId, dstModuleId, dstFieldId, power)
            SELECT NULL, 1, ?, ?, ejaId, ?, ?, 2
            FROM ejaPermissions
            WHERE ejaModuleId = ?
            "#,
            &crate::args![
                now(),
                self.system_id(names::PERMISSIONS),
                self.system_id(names::USERS),
                user,
                module_id
            ],
        )?;
        Ok(run.changes)
    }
}

pub fn command_exists(commands: &[Command], name: &str) -> bool {
    commands.iter().any(|command| command.name == name)
}
