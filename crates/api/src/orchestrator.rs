#![forbid(unsafe_code)]

use crate::{ApiError, Config, Request, Response, plugins};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use mt_core::FieldType;
use mt_core::action::{Action, ActionType};
use mt_core::ident::is_identifier;
use mt_core::names;
use mt_core::value::number;
use mt_storage::{
    LinkEdge, LinkRef, Row, SessionKey, SessionStore, Store, StoreError, command_exists,
    order_and_limit, stored_value,
};

/// Request value carrying an externally issued identity token.
pub const SSO_TOKEN_VALUE: &str = "ssoToken";

/// Maps an external identity token to a local username.
pub trait SsoResolver {
    fn username(&self, token: &str) -> Option<String>;
}

/// Resolver that vouches for nobody.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoSso;

impl SsoResolver for NoSso {
    fn username(&self, _token: &str) -> Option<String> {
        None
    }
}

/// Opens the configured database, runs one request and closes it again.
pub fn handle(config: &Config, request: Request, keep_session: bool) -> Result<Response, ApiError> {
    let mut store = Store::open(&config.db_name)?;
    store.set_translation_debug(config.translation_debug);
    run(&store, config, request, keep_session)
}

pub fn run(
    store: &Store,
    config: &Config,
    request: Request,
    keep_session: bool,
) -> Result<Response, ApiError> {
    run_with(store, config, request, keep_session, &NoSso)
}

/// Drives one request through authentication, the permission gate, action
/// dispatch and response assembly. Fails only when no user can be resolved or
/// storage fails; every other problem ends up in `alert`.
pub fn run_with(
    store: &Store,
    config: &Config,
    request: Request,
    keep_session: bool,
    sso: &dyn SsoResolver,
) -> Result<Response, ApiError> {
    let mut turn = Turn::new(store, config, request);
    turn.authenticate(sso)?;
    if turn.action == Action::Login {
        turn.out.values.remove("password");
    }

    if turn.out.owner == 0 {
        if !turn.out.values.is_empty() {
            let text = store.translate_in("ejaNotAuthorized", &turn.out.language);
            tracing::debug!(message = %text, "alert");
            turn.out.alert.push(text);
        }
        turn.out.action = turn.action.as_str().to_string();
        return Err(ApiError::NotAuthorized(Box::new(turn.out)));
    }

    turn.resolve_module()?;
    if turn.permitted()? {
        turn.dispatch()?;
    }
    turn.assemble()?;

    if let Some(plugin) = plugins::lookup(&turn.out.module_name) {
        plugin(store, &mut turn.out)?;
    }
    turn.teardown(keep_session)
}

/// Working state of one request.
struct Turn<'a> {
    store: &'a Store,
    config: &'a Config,
    out: Response,
    action: Action,
    action_type: Option<ActionType>,
    id_list: Vec<i64>,
    search_link: bool,
    search_link_clean: bool,
    sql_query64: String,
    sql_query_args: Vec<String>,
    sql_query: String,
    linking_field: String,
}

impl<'a> Turn<'a> {
    fn new(store: &'a Store, config: &'a Config, request: Request) -> Self {
        let language = if request.language.is_empty() {
            config.language.clone()
        } else {
            request.language
        };
        Self {
            store,
            config,
            action: Action::parse(&request.action),
            action_type: None,
            id_list: request.id_list,
            search_link: request.search_link,
            search_link_clean: request.search_link_clean,
            sql_query64: String::new(),
            sql_query_args: Vec::new(),
            sql_query: String::new(),
            linking_field: String::new(),
            out: Response {
                action: request.action,
                session: request.session,
                module_id: request.module_id,
                module_name: request.module_name,
                id: request.id,
                values: request.values,
                search_limit: request.search_limit,
                search_offset: request.search_offset,
                search_order: request.search_order,
                link: request.link,
                language,
                ..Response::default()
            },
        }
    }

    fn owner(&self) -> i64 {
        self.out.owner
    }

    fn authenticate(&mut self, sso: &dyn SsoResolver) -> Result<(), ApiError> {
        let store = self.store;
        let window = self.config.session_window_secs;

        let mut user = Row::new();
        if self.action == Action::Login {
            let username = self.out.value("username");
            let password = self.out.value("password");
            if !username.is_empty() && !password.is_empty() {
                user = store.user_by_credentials(username, password)?;
            }
        }
        let token = self.out.value(SSO_TOKEN_VALUE);
        if user.is_empty()
            && !token.is_empty()
            && let Some(username) = sso.username(token)
        {
            user = store.user_by_username(&username)?;
        }
        let logged_in = user_id(&user);
        if logged_in > 0 {
            self.out.session = store.session_init(logged_in, window)?;
            tracing::info!(user = logged_in, "session started");
        }

        if !self.out.session.is_empty() {
            if user.is_empty() {
                user = store.user_by_session_token(&self.out.session, window)?;
            }
            if !user.is_empty() {
                self.out.owner = user_id(&user);
                if let Some(language) = user.get("ejaLanguage").filter(|value| !value.is_empty()) {
                    self.out.language = language.clone();
                }
            }
            if self.out.module_id == 0 && !self.out.module_name.is_empty() {
                self.out.module_id = store.module_id_by_name(&self.out.module_name)?;
            }
            if self.out.module_id == 0 {
                self.out.module_id = user.get("defaultModuleId").map(|id| number(id)).unwrap_or_default();
                self.out.module_name = store.module_name_by_id(self.out.module_id)?;
            }
        }

        if self.action == Action::Logout && self.out.owner > 0 {
            store.session_reset(self.out.owner)?;
            tracing::info!(user = self.out.owner, "session closed");
            self.out.session.clear();
            self.out.owner = 0;
        }
        Ok(())
    }

    fn resolve_module(&mut self) -> Result<(), ApiError> {
        if self.out.module_id == 0 {
            self.out.module_id = self.store.module_id_by_name(names::ROOT)?;
        }
        if self.out.module_name.is_empty() {
            self.out.module_name = self.store.module_name_by_id(self.out.module_id)?;
        }
        Ok(())
    }

    /// Loads the full command set and checks the requested action against it.
    fn permitted(&mut self) -> Result<bool, ApiError> {
        let commands = tolerate(self.store.commands(self.owner(), self.out.module_id, None))?;
        let allowed = self.action.is_none()
            || self.action == Action::Login
            || command_exists(&commands, self.action.as_str());
        self.out.commands = commands;
        if !allowed {
            tracing::info!(
                user = self.owner(),
                module = %self.out.module_name,
                action = self.action.as_str(),
                "action not permitted"
            );
            self.out.alert(self.store, "ejaNotPermitted");
        }
        Ok(allowed)
    }

    fn dispatch(&mut self) -> Result<(), ApiError> {
        if self.search_link_clean {
            self.store.session_clean_search(self.owner())?;
        }
        self.continue_session()?;
        self.resolve_link()?;
        self.edit()?;
        self.create()?;
        self.save()?;
        self.delete()?;

        if self.action == Action::List && self.sql_query64.is_empty() {
            self.out.values.clear();
            self.action = Action::None;
            self.out.id = 0;
        }
        if self.action.is_paging() || self.action_type == Some(ActionType::List) {
            self.search()?;
        }
        self.linking_last_step()
    }

    /// Restores search, paging and link context persisted by earlier requests.
    fn continue_session(&mut self) -> Result<(), ApiError> {
        let rows = self.store.session_load(self.owner(), self.out.module_id)?;
        let request_limit = self.out.search_limit > 0;
        let request_offset = self.out.search_offset > 0;
        let mut args = Vec::new();
        let mut stored_link = LinkRef::default();

        for row in rows {
            let get = |key: &str| row.get(key).map(String::as_str).unwrap_or_default();
            let value = get("value");
            let sub = get("sub");
            match SessionKey::parse(get("name")) {
                Some(SessionKey::SearchLimit) if !request_limit => {
                    self.out.search_limit = number(value);
                }
                Some(SessionKey::SearchOffset) if !request_offset => {
                    self.out.search_offset = number(value);
                }
                Some(SessionKey::SearchOrder) => {
                    self.out
                        .search_order
                        .entry(sub.to_string())
                        .or_insert_with(|| value.to_string());
                }
                Some(SessionKey::SqlQuery64) => self.sql_query64 = value.to_string(),
                Some(SessionKey::SqlQueryArgs) => args.push((number(sub), value.to_string())),
                Some(SessionKey::Link) => match sub {
                    "ModuleId" => stored_link.module_id = number(value),
                    "FieldId" => stored_link.field_id = number(value),
                    "Label" => stored_link.label = value.to_string(),
                    _ => {}
                },
                _ => {}
            }
        }

        args.sort_by_key(|(index, _)| *index);
        self.sql_query_args = args.into_iter().map(|(_, value)| value).collect();
        if !self.out.link.is_active() {
            self.out.link = stored_link;
        }
        Ok(())
    }

    fn resolve_link(&mut self) -> Result<(), ApiError> {
        if !self.out.link.is_active() {
            return Ok(());
        }
        let store = self.store;
        let owner = self.owner();
        let module_id = self.out.module_id;

        self.out.linking = true;
        let linked_module = store.module_name_by_id(self.out.link.module_id)?;
        self.out.link.module_label = store.translate(&linked_module, Some(owner));
        self.linking_field = store.module_links_field_name(module_id, self.out.link.module_id)?;
        if !self.linking_field.is_empty() && self.action != Action::Search {
            self.out
                .values
                .insert(self.linking_field.clone(), self.out.link.field_id.to_string());
        }

        if module_id == self.out.link.module_id && self.out.id == self.out.link.field_id && self.out.id > 0 {
            store.session_clean_link(owner)?;
            self.out.link = LinkRef::default();
            self.out.linking = false;
            self.linking_field.clear();
            self.action = Action::Edit;
        }

        for &record in &self.id_list {
            let edge = LinkEdge {
                module_id,
                field_id: record,
                link_module_id: self.out.link.module_id,
                link_field_id: self.out.link.field_id,
            };
            match self.action {
                Action::Link => {
                    store.link_del(owner, edge)?;
                    store.link_add(owner, edge)?;
                }
                Action::Unlink => {
                    store.link_del(owner, edge)?;
                }
                _ => {}
            }
        }
        if matches!(self.action, Action::Link | Action::Unlink) {
            self.id_list.clear();
            self.action_type = Some(ActionType::List);
        }
        Ok(())
    }

    fn edit(&mut self) -> Result<(), ApiError> {
        if self.out.id > 0 && self.action == Action::Edit {
            self.out.values = tolerate(self.store.get(self.owner(), self.out.module_id, self.out.id))?;
        }
        Ok(())
    }

    /// `new` and `copy` both start from a fresh owned row; `copy` also carries the links.
    fn create(&mut self) -> Result<(), ApiError> {
        if !matches!(self.action, Action::New | Action::Copy) {
            return Ok(());
        }
        let copy_id = self.out.id;
        self.out.id = self.new_record()?;
        if self.out.id < 1 {
            self.out.alert(self.store, "ejaActionNewError");
        } else {
            self.store
                .link_copy(self.owner(), self.out.id, self.out.module_id, copy_id)?;
        }
        Ok(())
    }

    fn new_record(&self) -> Result<i64, ApiError> {
        Ok(tolerate(self.store.new_record(self.owner(), self.out.module_id))?)
    }

    fn save(&mut self) -> Result<(), ApiError> {
        if self.out.values.is_empty() || !self.action.writes_values() {
            return Ok(());
        }
        let store = self.store;
        let owner = self.owner();

        if self.out.module_name == names::MODULES {
            self.save_module()?;
        }
        if self.out.module_name == names::FIELDS {
            let table = store.module_name_by_id(number(self.out.value("ejaModuleId")))?;
            let field_type = FieldType::parse(self.out.value("type"));
            match store.field_add(&table, self.out.value("name"), &field_type) {
                Ok(()) => self.out.info(store, "ejaSqlFieldCreated"),
                Err(err) => {
                    tracing::warn!(table = %table, error = %err, "field column not created");
                    self.out.alert(store, "ejaSqlFieldNotCreated");
                }
            }
        }

        if self.out.id < 1 {
            self.out.id = self.new_record()?;
        }
        if self.out.id < 1 {
            self.out.alert(store, "ejaErrorEditId");
            return Ok(());
        }

        let values = std::mem::take(&mut self.out.values);
        for (key, raw) in &values {
            if key == names::OWNER && number(raw) < 1 {
                continue;
            }
            let field_type = store.field_type(self.out.module_id, key)?;
            match store.put(owner, self.out.module_id, self.out.id, key, stored_value(field_type.as_ref(), raw)) {
                Ok(_) => {}
                Err(StoreError::UnknownField(_) | StoreError::InvalidIdentifier(_)) => {
                    tracing::debug!(field = %key, "value without column skipped");
                }
                Err(err) => return Err(err.into()),
            }
        }
        self.out.values = match store.get(owner, self.out.module_id, self.out.id) {
            Ok(row) => row,
            Err(err) => {
                tracing::warn!(id = self.out.id, error = %err, "saved record not reloaded");
                values
            }
        };
        Ok(())
    }

    /// Side effects of saving a row of the module registry.
    fn save_module(&mut self) -> Result<(), ApiError> {
        let store = self.store;
        let owner = self.owner();
        let sql_created = number(self.out.value("sqlCreated")) > 0;

        if sql_created {
            match store.table_add(self.out.value("name"), false) {
                Ok(()) => self.out.info(store, "ejaSqlModuleCreated"),
                Err(err) => {
                    tracing::warn!(error = %err, "module table not created");
                    self.out.alert(store, "ejaSqlModuleNotCreated");
                }
            }
        }

        let module = self.out.id;
        if self.action == Action::Save && module > 0 && store.permission_count(module)? == 0 {
            if sql_created {
                store.permission_add_default(owner, module)?;
                self.out.info(store, "ejaModulePermissionsAddDefault");
            } else {
                store.permission_add(owner, module, "logout")?;
                self.out.info(store, "ejaModulePermissionAdd");
            }
            store.user_permission_copy(owner, module)?;
        }
        Ok(())
    }

    fn delete(&mut self) -> Result<(), ApiError> {
        if self.action != Action::Delete {
            return Ok(());
        }
        let store = self.store;
        if self.id_list.is_empty() && self.out.id > 0 {
            self.id_list.push(self.out.id);
        }
        for record in std::mem::take(&mut self.id_list) {
            let result = store.del(self.owner(), self.out.module_id, record);
            if self.out.module_name == names::MODULES {
                match result {
                    Ok(changes) if changes > 0 => self.out.info(store, "ejaSqlModuleDeleteTrue"),
                    _ => self.out.alert(store, "ejaSqlModuleDeleteFalse"),
                }
            } else {
                tolerate(result)?;
            }
        }
        self.action_type = Some(ActionType::List);
        Ok(())
    }

    fn search(&mut self) -> Result<(), ApiError> {
        let store = self.store;
        let owner = self.owner();
        let module_id = self.out.module_id;
        self.action_type = Some(ActionType::List);

        let order_fields = store.field_names(module_id, ActionType::List)?;
        let defaults = store.module_row(module_id)?;
        let default = |key: &str| defaults.get(key).map(String::as_str).unwrap_or_default();

        if self.action == Action::Search {
            self.sql_query64.clear();
            self.sql_query_args.clear();
            self.out.search_offset = 0;
        }

        if self.out.search_limit < 1 {
            self.out.search_limit = number(default("searchLimit"));
        }
        if self.out.search_limit < 1 {
            self.out.search_limit = self.config.default_search_limit;
        }
        let limit = self.out.search_limit;
        if self.action == Action::Previous && self.out.search_offset >= limit {
            self.out.search_offset -= limit;
        }
        if self.action == Action::Next {
            self.out.search_offset += limit;
        }

        let mut sql = String::new();
        if !self.sql_query64.is_empty() {
            match STANDARD
                .decode(&self.sql_query64)
                .ok()
                .and_then(|bytes| String::from_utf8(bytes).ok())
            {
                Some(text) => sql = text,
                None => {
                    tracing::warn!(owner, "stored query unreadable, rebuilding");
                    self.sql_query64.clear();
                    self.sql_query_args.clear();
                }
            }
        }
        if self.sql_query64.is_empty() {
            let compiled = store.search_query(owner, &self.out.module_name, &self.out.values)?;
            self.sql_query64 = STANDARD.encode(compiled.sql.as_bytes());
            store.session_put(owner, SessionKey::SqlQuery64, &self.sql_query64, "")?;
            store.session_put_args(owner, &compiled.args)?;
            sql = compiled.sql;
            self.sql_query_args = compiled.args;
        }

        let mut order = Vec::new();
        for key in &order_fields {
            let Some(direction) = self.out.search_order.get(key) else {
                continue;
            };
            if direction == "ASC" || direction == "DESC" {
                store.session_put(owner, SessionKey::SearchOrder, direction, key)?;
                order.push(format!("{key} {direction}"));
            }
        }
        let mut order = order.join(",");
        if order.is_empty() && !default("sortList").is_empty() {
            order = format!("{} ASC", default("sortList"));
        }
        if order.is_empty() {
            order = self.config.default_search_order.clone();
        }

        let mut links = String::new();
        if !self.linking_field.is_empty() && is_identifier(&self.linking_field) {
            links = format!(" AND {}=? ", self.linking_field);
            self.sql_query_args.push(self.out.link.field_id.to_string());
        } else if self.search_link {
            links = store.search_query_links(owner, self.out.link.module_id, self.out.link.field_id, module_id)?;
        }

        let base = format!("{sql}{links}");
        self.sql_query = format!(
            "{base} {}",
            order_and_limit(&order, limit, self.out.search_offset)
        );
        self.out.search_count = store.search_count(&base, &self.sql_query_args);
        self.out.search_last = (self.out.search_offset + limit).min(self.out.search_count);

        store.session_put(owner, SessionKey::SearchLimit, &limit.to_string(), "")?;
        store.session_put(
            owner,
            SessionKey::SearchOffset,
            &self.out.search_offset.to_string(),
            "",
        )?;
        self.out.id = 0;
        Ok(())
    }

    fn linking_last_step(&mut self) -> Result<(), ApiError> {
        if !self.out.linking {
            return Ok(());
        }
        let store = self.store;
        let owner = self.owner();
        let link = &self.out.link;
        store.session_put(owner, SessionKey::Link, &link.module_id.to_string(), "ModuleId")?;
        store.session_put(owner, SessionKey::Link, &link.field_id.to_string(), "FieldId")?;
        store.session_put(owner, SessionKey::Link, &link.label, "Label")?;
        self.out.search_links =
            store.search_links(owner, link.module_id, link.field_id, self.out.module_id)?;
        if !self.linking_field.is_empty() {
            self.out.linking = false;
        }
        Ok(())
    }

    /// Fills in the state the renderer needs for the resolved action type.
    fn assemble(&mut self) -> Result<(), ApiError> {
        let store = self.store;
        let owner = self.owner();
        let module_id = self.out.module_id;
        self.out.module_label = store.translate(&self.out.module_name, Some(owner));

        let action_type = match self.action_type {
            Some(ActionType::List) => {
                match store.search_matrix(owner, module_id, &self.sql_query, &self.sql_query_args) {
                    Ok(matrix) => {
                        self.out.search_rows = matrix.rows;
                        self.out.search_cols = matrix.cols;
                        self.out.search_labels = matrix.labels;
                    }
                    Err(err) => {
                        tracing::error!(module = %self.out.module_name, error = %err, "list not rendered");
                        self.out.alert(store, "ejaSearchError");
                    }
                }
                ActionType::List
            }
            _ if self.out.id > 0 => {
                self.out.links = store.module_links(owner, module_id)?;
                self.out.sub_modules = store.sub_modules(owner, module_id)?;
                store.session_put(owner, SessionKey::RecordId, &self.out.id.to_string(), "")?;
                ActionType::Edit
            }
            _ => {
                store.session_clean_search(owner)?;
                ActionType::Search
            }
        };

        self.out.action = self.action.as_str().to_string();
        self.out.action_type = action_type.as_str().to_string();
        self.out.commands = tolerate(store.commands(owner, module_id, Some(action_type)))?;
        self.out.fields = store.fields(owner, module_id, action_type, &self.out.values)?;
        self.out.path = store.module_path(owner, module_id)?;
        self.out.tree = store.module_tree(owner, module_id, &self.out.path)?;
        Ok(())
    }

    fn teardown(mut self, keep_session: bool) -> Result<Response, ApiError> {
        let owner = self.owner();
        if owner > 0 {
            if keep_session {
                self.out.session = self
                    .store
                    .session_refresh(owner, self.config.session_window_secs)?;
            } else {
                self.store.session_reset(owner)?;
                self.out.session.clear();
            }
        }
        Ok(self.out)
    }
}

fn user_id(user: &Row) -> i64 {
    user.get(names::ID).map(|id| number(id)).unwrap_or_default()
}

/// Unknown modules and missing tables read as empty results.
fn tolerate<T: Default>(result: Result<T, StoreError>) -> Result<T, StoreError> {
    match result {
        Err(StoreError::ModuleNotFound | StoreError::TableMissing(_)) => Ok(T::default()),
        other => other,
    }
}
