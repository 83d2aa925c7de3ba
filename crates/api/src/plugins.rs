#![forbid(unsafe_code)]

//! Per-module extension hooks. A hook runs after the response is assembled and
//! may rewrite any part of it.

use crate::{ApiError, Response};
use mt_core::names;
use mt_core::value::number;
use mt_storage::{ModuleDefinition, Store, password_digest};

pub type Plugin = fn(&Store, &mut Response) -> Result<(), ApiError>;

const PLUGINS: [(&str, Plugin); 3] = [
    (names::PROFILE, profile),
    (names::EXPORT, export),
    (names::IMPORT, import),
];

pub fn lookup(module_name: &str) -> Option<Plugin> {
    PLUGINS
        .iter()
        .find(|(name, _)| *name == module_name)
        .map(|(_, plugin)| *plugin)
}

const PASSWORD_FIELDS: [&str; 3] = ["passwordOld", "passwordNew", "passwordRepeat"];

/// Password change for the signed-in user.
fn profile(store: &Store, out: &mut Response) -> Result<(), ApiError> {
    out.alert.clear();
    if out.action == "run" {
        let old = out.value("passwordOld");
        let new = out.value("passwordNew");
        let repeat = out.value("passwordRepeat");
        if old.is_empty() || new.is_empty() || repeat.is_empty() {
            out.alert(store, "passwordEmptyError");
        } else if new != repeat {
            out.alert(store, "passwordMatchError");
        } else {
            let user = store.user_by_id(out.owner)?;
            if user.get("password").map(String::as_str) != Some(password_digest(old).as_str()) {
                out.alert(store, "passwordOldError");
            } else {
                let new = new.to_string();
                store.password_update(out.owner, &new)?;
                tracing::info!(user = out.owner, "password changed");
                out.info(store, "passwordUpdated");
            }
        }
    }
    for key in PASSWORD_FIELDS {
        set_value(out, key, String::new());
    }
    Ok(())
}

fn export(store: &Store, out: &mut Response) -> Result<(), ApiError> {
    if out.action != "run" {
        return Ok(());
    }
    let module_id = number(out.value("ejaModuleId"));
    let with_data = number(out.value("dataExport")) > 0;
    if module_id < 1 {
        return Ok(());
    }
    match store.module_export(module_id, with_data) {
        Ok(definition) => {
            set_value(out, "export", serde_json::to_string_pretty(&definition)?);
            out.info(store, "ejaExportOk");
        }
        Err(err) => {
            tracing::warn!(module_id, error = %err, "module export failed");
            out.alert(store, "ejaExportError");
        }
    }
    Ok(())
}

/// Imports a definition under `moduleName`, or only appends its rows when `dataOnly` is set.
fn import(store: &Store, out: &mut Response) -> Result<(), ApiError> {
    if out.action != "run" {
        return Ok(());
    }
    let data_only = number(out.value("dataOnly")) > 0;
    let result = serde_json::from_str::<ModuleDefinition>(out.value("import"))
        .map_err(mt_storage::StoreError::from)
        .and_then(|definition| {
            let name = match out.value("moduleName") {
                "" => definition.name.clone(),
                name => name.to_string(),
            };
            if data_only {
                store.module_append(&definition, &name).map(|_| ())
            } else {
                store.module_import(&definition, &name).map(|_| ())
            }
        });
    match result {
        Ok(()) => out.info(store, "ejaImportOk"),
        Err(err) => {
            tracing::warn!(error = %err, "module import failed");
            out.alert(store, "ejaImportError");
        }
    }
    Ok(())
}

/// Updates a value and the rendered field carrying it.
fn set_value(out: &mut Response, key: &str, value: String) {
    for field in out.fields.iter_mut().filter(|field| field.name == key) {
        field.value = value.clone();
    }
    if out.values.contains_key(key) || !value.is_empty() {
        out.values.insert(key.to_string(), value);
    }
}
