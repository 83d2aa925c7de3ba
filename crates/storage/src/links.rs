#![forbid(unsafe_code)]

use crate::{LinkEdge, LinkRef, RunResult, Store, StoreError, now};
use mt_core::names;
use mt_core::value::number;

/// The meanings an `ejaLinks` row can carry. All of them share one edge shape.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkKind {
    /// A group row (src) containing a user row (dst).
    Membership,
    /// A permission row (src) granted to a user or group row (dst).
    Grant,
    /// A module row (src) shared with a group row (dst).
    ModuleShare,
    /// Any business relation between two records.
    Record,
}

impl LinkKind {
    pub fn classify(store: &Store, src_module_id: i64, dst_module_id: i64) -> Self {
        let groups = store.system_id(names::GROUPS);
        let users = store.system_id(names::USERS);
        if src_module_id == groups && dst_module_id == users {
            Self::Membership
        } else if src_module_id == store.system_id(names::PERMISSIONS)
            && (dst_module_id == users || dst_module_id == groups)
        {
            Self::Grant
        } else if src_module_id == store.system_id(names::MODULES) && dst_module_id == groups {
            Self::ModuleShare
        } else {
            Self::Record
        }
    }

    /// `(src, dst)` module ids of the kinds bound to fixed system modules.
    /// Grants may target users or groups and records any module, so they have none.
    pub fn endpoints(self, store: &Store) -> Option<(i64, i64)> {
        match self {
            Self::Membership => Some((
                store.system_id(names::GROUPS),
                store.system_id(names::USERS),
            )),
            Self::ModuleShare => Some((
                store.system_id(names::MODULES),
                store.system_id(names::GROUPS),
            )),
            Self::Grant | Self::Record => None,
        }
    }
}

impl Store {
    pub fn link_add(&self, owner: i64, edge: LinkEdge) -> Result<RunResult, StoreError> {
        tracing::debug!(
            owner,
            kind = ?LinkKind::classify(self, edge.module_id, edge.link_module_id),
            src = edge.field_id,
            dst = edge.link_field_id,
            "link added"
        );
        self.run(
            "INSERT INTO ejaLinks (ejaOwner, ejaLog, srcModuleId, srcFieldId, dstModuleId, dstFieldId, power) VALUES (?, ?, ?, ?, ?, ?, 1)",
            &crate::args![
                owner,
                now(),
                edge.module_id,
                edge.field_id,
                edge.link_module_id,
                edge.link_field_id
            ],
        )
    }

    pub fn link_del(&self, owner: i64, edge: LinkEdge) -> Result<RunResult, StoreError> {
        tracing::debug!(
            owner,
            kind = ?LinkKind::classify(self, edge.module_id, edge.link_module_id),
            src = edge.field_id,
            dst = edge.link_field_id,
            "link removed"
        );
        self.run(
            "DELETE FROM ejaLinks WHERE ejaOwner=? AND srcModuleId=? AND srcFieldId=? AND dstModuleId=? AND dstFieldId=?",
            &crate::args![
                owner,
                edge.module_id,
                edge.field_id,
                edge.link_module_id,
                edge.link_field_id
            ],
        )
    }

    /// Duplicates every link pointing at `old_id` onto `new_id`.
    pub fn link_copy(
        &self,
        owner: i64,
        new_id: i64,
        module_id: i64,
        old_id: i64,
    ) -> Result<RunResult, StoreError> {
        self.run(
            r#"
            INSERT INTO ejaLinks (ejaId, ejaOwner, ejaLog, srcModuleId, srcFieldId, dstModuleId, dstFieldId, power)
            SELECT NULL, ?, ?, srcModuleId, srcFieldId, dstModuleId, ?, power
            FROM ejaLinks
            WHERE dstModuleId=? AND dstFieldId=?
            "#,
            &crate::args![owner, now(), new_id, module_id, old_id],
        )
    }

    /// Removes every link touching a record, in either direction, whoever owns it.
    pub fn links_purge_record(&self, module_id: i64, id: i64) -> Result<RunResult, StoreError> {
        self.run(
            "DELETE FROM ejaLinks WHERE (srcModuleId=? AND srcFieldId=?) OR (dstModuleId=? AND dstFieldId=?)",
            &crate::args![module_id, id, module_id, id],
        )
    }

    /// Modules declared as related to `module_id`, in power order.
    pub fn module_links(&self, owner: i64, module_id: i64) -> Result<Vec<LinkRef>, StoreError> {
        self.related_modules(owner, module_id, false)
    }

    /// Related modules that reference `module_id` through a foreign-key field.
    pub fn sub_modules(&self, owner: i64, module_id: i64) -> Result<Vec<LinkRef>, StoreError> {
        self.related_modules(owner, module_id, true)
    }

    fn related_modules(
        &self,
        owner: i64,
        module_id: i64,
        keyed_only: bool,
    ) -> Result<Vec<LinkRef>, StoreError> {
        let keyed = if keyed_only { "AND srcFieldName != ''" } else { "" };
        let rows = self.rows(
            &format!(
                r#"
                SELECT srcModuleId, (SELECT name FROM ejaModules WHERE ejaId=srcModuleId) AS srcModuleName
                FROM ejaModuleLinks
                WHERE dstModuleId=? {keyed}
                ORDER BY power ASC
                "#
            ),
            &crate::args![module_id],
        )?;
        Ok(rows
            .iter()
            .map(|row| {
                let name = row.get("srcModuleName").map(String::as_str).unwrap_or_default();
                LinkRef {
                    module_id: row.get("srcModuleId").map(|id| number(id)).unwrap_or_default(),
                    label: self.translate(name, Some(owner)),
                    ..LinkRef::default()
                }
            })
            .collect())
    }

    /// Field of `module_id` holding the id of a `linked_module_id` record, if declared.
    pub fn module_links_field_name(
        &self,
        module_id: i64,
        linked_module_id: i64,
    ) -> Result<String, StoreError> {
        self.value(
            "SELECT srcFieldName FROM ejaModuleLinks WHERE srcModuleId=? AND dstModuleId=? AND srcFieldName != '' LIMIT 1",
            &crate::args![module_id, linked_module_id],
        )
    }

    pub fn is_sub_module(&self, module_id: i64) -> Result<bool, StoreError> {
        Ok(self.number(
            "SELECT COUNT(*) FROM ejaModuleLinks WHERE srcModuleId=? AND srcFieldName != ''",
            &crate::args![module_id],
        )? > 0)
    }

    /// Ids of `dst_module_id` records the owner linked to the given record,
    /// prefixed with the `"0"` sentinel.
    pub fn search_links(
        &self,
        owner: i64,
        src_module_id: i64,
        src_field_id: i64,
        dst_module_id: i64,
    ) -> Result<Vec<String>, StoreError> {
        let ids = self.id_list(
            "SELECT srcFieldId FROM ejaLinks WHERE ejaOwner=? AND dstModuleId=? AND dstFieldId=? AND srcModuleId=?",
            &crate::args![owner, src_module_id, src_field_id, dst_module_id],
        )?;
        let mut result = vec!["0".to_string()];
        result.extend(ids.into_iter().map(|id| id.to_string()));
        Ok(result)
    }

    /// Predicate restricting a search to the records linked to the given record.
    pub fn search_query_links(
        &self,
        owner: i64,
        src_module_id: i64,
        src_field_id: i64,
        dst_module_id: i64,
    ) -> Result<String, StoreError> {
        let links = self.search_links(owner, src_module_id, src_field_id, dst_module_id)?;
        Ok(format!(" AND ejaId IN ({}) ", links.join(",")))
    }
}
