#![forbid(unsafe_code)]

use crate::{ModuleNode, Store, StoreError};
use mt_core::ids_to_csv;
use mt_core::names;
use mt_core::value::number;

/// Owner id with unrestricted navigation.
const ADMIN_OWNER: i64 = 1;

impl Store {
    /// Whether `owner` holds any permission on `module_id`, directly or through a group.
    pub fn module_permitted(&self, owner: i64, module_id: i64) -> Result<bool, StoreError> {
        if owner == ADMIN_OWNER {
            return Ok(true);
        }
        let groups = ids_to_csv(&self.user_group_list(owner));
        let found = self.number(
            &format!(
                r#"
                SELECT ejaId FROM ejaLinks
                WHERE srcModuleId = ?
                  AND srcFieldId IN (SELECT ejaId FROM ejaPermissions WHERE ejaModuleId = ?)
                  AND ((dstFieldId = ? AND dstModuleId = ?) OR (dstModuleId = ? AND dstFieldId IN ({groups})))
                LIMIT 1
                "#
            ),
            &crate::args![
                self.system_id(names::PERMISSIONS),
                module_id,
                owner,
                self.system_id(names::USERS),
                self.system_id(names::GROUPS)
            ],
        )?;
        Ok(found > 0)
    }

    /// Breadcrumb from the root down to the parent of `module_id`. The walk stops
    /// at the first module the owner has no permission on.
    pub fn module_path(&self, owner: i64, module_id: i64) -> Result<Vec<ModuleNode>, StoreError> {
        let mut path = Vec::new();
        let mut id = module_id;
        let mut seen = std::collections::BTreeSet::new();
        while id != 0 && seen.insert(id) {
            let row = self.row(
                "SELECT ejaId, parentId, name FROM ejaModules WHERE ejaId=?",
                &crate::args![id],
            )?;
            let name = row.get("name").cloned().unwrap_or_default();
            path.push(ModuleNode {
                id: row.get("ejaId").map(|v| number(v)).unwrap_or_default(),
                label: self.translate(&name, Some(owner)),
                name,
            });
            let parent = row.get("parentId").map(|v| number(v)).unwrap_or_default();
            id = if !row.is_empty() && parent > 0 && self.module_permitted(owner, id)? {
                parent
            } else {
                0
            };
        }
        path.reverse();
        path.pop();
        Ok(path)
    }

    /// Navigable children of `module_id`, or the other root modules when it has
    /// none and sits at the top. Sub-modules are reached through their parent record.
    pub fn module_tree(
        &self,
        owner: i64,
        module_id: i64,
        path: &[ModuleNode],
    ) -> Result<Vec<ModuleNode>, StoreError> {
        let mut rows = self.rows(
            "SELECT ejaId, name FROM ejaModules WHERE parentId=? ORDER BY power ASC",
            &crate::args![module_id],
        )?;
        if rows.is_empty() && path.is_empty() {
            rows = self.rows(
                "SELECT ejaId, name FROM ejaModules WHERE parentId=0 AND ejaId!=? ORDER BY power ASC",
                &crate::args![module_id],
            )?;
        }

        let mut tree = Vec::new();
        for row in rows {
            let id = row.get("ejaId").map(|v| number(v)).unwrap_or_default();
            if !self.module_permitted(owner, id)? || self.is_sub_module(id)? {
                continue;
            }
            let name = row.get("name").cloned().unwrap_or_default();
            tree.push(ModuleNode {
                id,
                label: self.translate(&name, Some(owner)),
                name,
            });
        }
        Ok(tree)
    }
}
