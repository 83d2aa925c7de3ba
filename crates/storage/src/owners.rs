#![forbid(unsafe_code)]

use crate::{LinkKind, Store, StoreError};
use mt_core::ids_to_csv;
use std::collections::BTreeSet;

/// Delegation rounds walked by [`Store::owners`]. Chains deeper than this are
/// not guaranteed to be complete.
pub const MAX_DELEGATION_DEPTH: usize = 10;

impl Store {
    /// Groups `user` belongs to; `[0]` when there are none so the result can
    /// always be used inside `IN (...)`.
    pub fn user_group_list(&self, user: i64) -> Vec<i64> {
        let groups = match LinkKind::Membership.endpoints(self) {
            Some((groups, users)) => self.id_list(
                "SELECT srcFieldId FROM ejaLinks WHERE srcModuleId=? AND dstModuleId=? AND dstFieldId=?",
                &crate::args![groups, users, user],
            ),
            None => Ok(Vec::new()),
        };
        match groups {
            Ok(groups) if !groups.is_empty() => groups,
            _ => vec![0],
        }
    }

    /// Owner ids whose records `owner` may act on in `module_id`: the actor,
    /// every account delegated to it, and the members of groups sharing the module
    /// with the actor. Storage errors shrink the set but never below the actor.
    pub fn owners(&self, owner: i64, module_id: i64) -> BTreeSet<i64> {
        let mut result = self.delegated_owners(owner);
        match self.group_owners(owner, module_id) {
            Ok(shared) => result.extend(shared),
            Err(err) => tracing::warn!(owner, module_id, error = %err, "group sharing skipped"),
        }
        result
    }

    pub fn owners_csv(&self, owner: i64, module_id: i64) -> String {
        ids_to_csv(&self.owners(owner, module_id))
    }

    fn delegated_owners(&self, owner: i64) -> BTreeSet<i64> {
        let mut owners = BTreeSet::from([owner]);
        for _ in 0..MAX_DELEGATION_DEPTH {
            let csv = ids_to_csv(&owners);
            let found = match self.id_list(
                &format!("SELECT ejaId FROM ejaUsers WHERE ejaOwner IN ({csv}) AND ejaId NOT IN ({csv})"),
                &[],
            ) {
                Ok(found) => found,
                Err(_) => break,
            };
            let before = owners.len();
            owners.extend(found);
            if owners.len() == before {
                break;
            }
        }
        owners
    }

    /// Members of every group that both contains `owner` and is linked from the module row.
    fn group_owners(&self, owner: i64, module_id: i64) -> Result<Vec<i64>, StoreError> {
        let (Some((groups, users)), Some((modules, shared))) = (
            LinkKind::Membership.endpoints(self),
            LinkKind::ModuleShare.endpoints(self),
        ) else {
            return Ok(Vec::new());
        };
        self.id_list(
            r#"
            SELECT dstFieldId
            FROM ejaLinks
            WHERE srcModuleId = ? AND dstModuleId = ? AND srcFieldId IN (
              SELECT srcFieldId
              FROM ejaLinks
              WHERE srcModuleId = ? AND dstModuleId = ? AND dstFieldId = ? AND srcFieldId IN (
                SELECT dstFieldId
                FROM ejaLinks
                WHERE srcModuleId = ? AND srcFieldId = ? AND dstModuleId = ?
              )
            )
            "#,
            &crate::args![groups, users, groups, users, owner, modules, module_id, shared],
        )
    }
}
