#![forbid(unsafe_code)]

use crate::transfer::ModuleDefinition;
use crate::{Store, StoreError, now, password_digest};
use mt_core::{FieldType, names};
use std::path::PathBuf;

/// Built-in module definitions, applied in this order.
const BUILTIN: [(&str, &str); 15] = [
    ("eja", include_str!("../assets/eja.json")),
    ("ejaCommands", include_str!("../assets/ejaCommands.json")),
    ("ejaModules", include_str!("../assets/ejaModules.json")),
    ("ejaFields", include_str!("../assets/ejaFields.json")),
    ("ejaPermissions", include_str!("../assets/ejaPermissions.json")),
    ("ejaLinks", include_str!("../assets/ejaLinks.json")),
    ("ejaModuleLinks", include_str!("../assets/ejaModuleLinks.json")),
    ("ejaUsers", include_str!("../assets/ejaUsers.json")),
    ("ejaGroups", include_str!("../assets/ejaGroups.json")),
    ("ejaTranslations", include_str!("../assets/ejaTranslations.json")),
    ("ejaSessions", include_str!("../assets/ejaSessions.json")),
    ("ejaLogin", include_str!("../assets/ejaLogin.json")),
    ("ejaProfile", include_str!("../assets/ejaProfile.json")),
    ("ejaExport", include_str!("../assets/ejaExport.json")),
    ("ejaImport", include_str!("../assets/ejaImport.json")),
];

/// Declared relations between the system modules: (dst, src, power).
const MODULE_LINKS: [(&str, &str, i64); 4] = [
    (names::GROUPS, names::PERMISSIONS, 2),
    (names::GROUPS, names::MODULES, 1),
    (names::USERS, names::GROUPS, 1),
    (names::USERS, names::PERMISSIONS, 2),
];

#[derive(Clone, Debug, Default)]
pub struct SetupRequest {
    pub user: String,
    pub pass: String,
    /// Directory of `*.json` module definitions used instead of the built-in set.
    pub definitions: Option<PathBuf>,
}

/// Initializes an empty database: system tables, modules, commands, the
/// default module links and the administrator account. Returns the admin id.
pub fn setup(store: &Store, request: &SetupRequest) -> Result<i64, StoreError> {
    if request.user.trim().is_empty() || request.pass.is_empty() {
        return Err(StoreError::InvalidInput("setup admin user/pass are mandatory"));
    }
    if store.table_exists(names::MODULES)? {
        return Err(StoreError::InvalidInput("database already initialized"));
    }

    let mut modules = match &request.definitions {
        Some(dir) => load_definitions(dir)?,
        None => BUILTIN
            .iter()
            .map(|(_, json)| serde_json::from_str::<ModuleDefinition>(json))
            .collect::<Result<Vec<_>, _>>()?,
    };
    tracing::info!(modules = modules.len(), "setup started");

    for module in &mut modules {
        store.table_add(&module.name, false)?;
        for field in &module.field {
            if names::is_system_column(&field.name) {
                continue;
            }
            match store.field_add(&module.name, &field.name, &FieldType::parse(&field.field_type)) {
                Ok(()) | Err(StoreError::FieldExists(_)) => {}
                Err(err) => return Err(err),
            }
        }
        if module.name == names::COMMANDS {
            store.insert_data(names::COMMANDS, &module.data)?;
            module.data.clear();
        }
    }

    for module in &modules {
        let settings = &module.module;
        store.run(
            r#"
            INSERT INTO ejaModules (ejaId, ejaOwner, ejaLog, name, power, searchLimit, sqlCreated, sortList, parentId)
            VALUES (NULL, 1, ?, ?, ?, ?, ?, ?, 0)
            "#,
            &crate::args![
                now(),
                module.name.as_str(),
                settings.power,
                settings.search_limit,
                settings.sql_created,
                settings.sort_list.as_str()
            ],
        )?;
    }
    for module in &modules {
        let parent_id = store.module_id_by_name(&module.module.parent_name)?;
        let module_id = store.module_id_by_name(&module.name)?;
        if parent_id > 0 && module_id > 0 {
            store.run(
                "UPDATE ejaModules SET parentId=? WHERE ejaId=?",
                &crate::args![parent_id, module_id],
            )?;
        }
    }
    for module in &modules {
        store.module_import(module, &module.name)?;
    }

    for (dst, src, power) in MODULE_LINKS {
        store.run(
            "INSERT INTO ejaModuleLinks (ejaOwner, ejaLog, dstModuleId, srcModuleId, srcFieldName, power) VALUES (1, ?, ?, ?, '', ?)",
            &crate::args![
                now(),
                store.module_id_by_name(dst)?,
                store.module_id_by_name(src)?,
                power
            ],
        )?;
    }

    let admin = store
        .run(
            "INSERT INTO ejaUsers (ejaOwner, ejaLog, username, password, defaultModuleId, ejaLanguage) VALUES (1, ?, ?, ?, ?, ?)",
            &crate::args![
                now(),
                request.user.trim(),
                password_digest(&request.pass),
                store.module_id_by_name(names::ROOT)?,
                "en"
            ],
        )?
        .last_id;
    tracing::info!(admin, "setup completed");
    Ok(admin)
}

fn load_definitions(dir: &std::path::Path) -> Result<Vec<ModuleDefinition>, StoreError> {
    let mut paths = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|entry| entry.path()))
        .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
        .collect::<Vec<_>>();
    paths.sort();
    let mut modules = Vec::with_capacity(paths.len());
    for path in paths {
        let raw = std::fs::read_to_string(&path)?;
        modules.push(serde_json::from_str(&raw)?);
    }
    Ok(modules)
}
