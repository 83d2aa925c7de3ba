#![forbid(unsafe_code)]

use mt_api::{ApiError, Config, Request, Response, SSO_TOKEN_VALUE, SsoResolver, run, run_with};
use mt_storage::{LinkRef, SetupRequest, Store, password_digest, setup};
use std::path::PathBuf;

fn temp_storage_dir(test_name: &str) -> PathBuf {
    let base = std::env::temp_dir();
    let pid = std::process::id();
    let nonce = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let dir = base.join(format!("mt_api_{test_name}_{pid}_{nonce}"));
    std::fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

fn ready(test_name: &str) -> (Store, Config) {
    let path = temp_storage_dir(test_name).join("metatable.db");
    let store = Store::open(&path).expect("open store");
    setup(
        &store,
        &SetupRequest {
            user: "admin".to_string(),
            pass: "secret".to_string(),
            definitions: None,
        },
    )
    .expect("setup");
    let config = Config {
        db_name: path,
        ..Config::default()
    };
    (store, config)
}

fn login(store: &Store, config: &Config) -> String {
    let response = run(
        store,
        config,
        Request::new("login")
            .with_value("username", "admin")
            .with_value("password", "secret"),
        true,
    )
    .expect("login");
    assert!(!response.session.is_empty(), "login should issue a session token");
    response.session
}

fn call(store: &Store, config: &Config, request: Request) -> Response {
    let action = request.action.clone();
    run(store, config, request, true).unwrap_or_else(|err| panic!("{action} failed: {err}"))
}

fn module_id(store: &Store, name: &str) -> i64 {
    let id = store.module_id_by_name(name).expect("module lookup");
    assert!(id > 0, "module {name} should exist");
    id
}

fn save_group(store: &Store, config: &Config, session: &str, name: &str) -> i64 {
    let saved = call(
        store,
        config,
        Request::new("save")
            .with_session(session)
            .with_module("ejaGroups")
            .with_value("name", name),
    );
    assert_eq!(saved.action_type, "Edit");
    assert!(saved.id > 0, "group {name} should get an id");
    saved.id
}

#[test]
fn login_opens_the_default_module() {
    let (store, config) = ready("login_opens_the_default_module");

    let response = run(
        &store,
        &config,
        Request::new("login")
            .with_value("username", "admin")
            .with_value("password", "secret"),
        true,
    )
    .expect("login");

    assert_eq!(response.owner, 1);
    assert_eq!(response.session.len(), 64);
    assert_eq!(response.module_name, "eja");
    assert_eq!(response.module_label, "Home");
    assert_eq!(response.action_type, "Search");
    assert!(!response.values.contains_key("password"));
    assert!(response.tree.iter().any(|node| node.name == "ejaUsers"));
    assert!(response.alert.is_empty());

    let next = call(
        &store,
        &config,
        Request::new("").with_session(&response.session),
    );
    assert_eq!(next.owner, 1, "the token should resolve to the same user");
}

#[test]
fn wrong_credentials_are_not_authorized() {
    let (store, config) = ready("wrong_credentials_are_not_authorized");

    let err = run(
        &store,
        &config,
        Request::new("login")
            .with_value("username", "admin")
            .with_value("password", "nope"),
        true,
    )
    .expect_err("wrong password");
    assert_eq!(err.code(), "ejaNotAuthorized");
    let response = err.response().expect("partial response");
    assert_eq!(response.alert, vec!["Not authorized".to_string()]);
    assert!(!response.values.contains_key("password"));
    assert_eq!(response.owner, 0);

    let err = run(&store, &config, Request::new("list"), true).expect_err("no session");
    let ApiError::NotAuthorized(response) = err else {
        panic!("expected NotAuthorized");
    };
    assert!(response.alert.is_empty(), "no values means no alert");
}

#[test]
fn unpermitted_action_alerts_and_renders() {
    let (store, config) = ready("unpermitted_action_alerts_and_renders");
    let session = login(&store, &config);

    let response = call(
        &store,
        &config,
        Request::new("run").with_session(&session).with_module("ejaUsers"),
    );
    assert_eq!(response.alert, vec!["Permission denied".to_string()]);
    assert_eq!(response.action_type, "Search");
    assert!(response.commands.iter().any(|command| command.name == "search"));
}

#[test]
fn save_then_edit_round_trips_with_password_digest() {
    let (store, config) = ready("save_then_edit_round_trips_with_password_digest");
    let session = login(&store, &config);

    let created = call(
        &store,
        &config,
        Request::new("new").with_session(&session).with_module("ejaUsers"),
    );
    assert_eq!(created.action_type, "Edit");
    assert!(created.id > 0);
    assert!(created.links.iter().any(|link| link.label == "Groups"));

    let saved = call(
        &store,
        &config,
        Request {
            id: created.id,
            ..Request::new("save")
                .with_session(&session)
                .with_module("ejaUsers")
                .with_value("username", "bob")
                .with_value("password", "pw")
                .with_value("ejaLanguage", "en")
                .with_value("notAColumn", "ignored")
        },
    );
    assert_eq!(saved.id, created.id);
    assert_eq!(saved.value("username"), "bob");
    assert_eq!(saved.value("password"), password_digest("pw"));
    assert!(!saved.values.contains_key("notAColumn"));

    let edited = call(
        &store,
        &config,
        Request {
            id: created.id,
            ..Request::new("edit").with_session(&session).with_module("ejaUsers")
        },
    );
    assert_eq!(edited.action_type, "Edit");
    assert_eq!(edited.values, saved.values);
    assert_eq!(edited.value("password").len(), 64);

    let deleted = call(
        &store,
        &config,
        Request {
            id: created.id,
            ..Request::new("delete").with_session(&session).with_module("ejaUsers")
        },
    );
    assert_eq!(deleted.action_type, "List");
    assert_eq!(deleted.id, 0);
    assert!(
        deleted
            .search_rows
            .iter()
            .all(|row| row.get("username").map(String::as_str) != Some("bob"))
    );
    assert!(store.user_by_username("bob").expect("lookup").is_empty());
}

#[test]
fn paging_moves_by_the_page_size() {
    let (store, config) = ready("paging_moves_by_the_page_size");
    let session = login(&store, &config);
    for index in 0..5 {
        save_group(&store, &config, &session, &format!("group{index}"));
    }

    let first = call(
        &store,
        &config,
        Request {
            search_limit: 2,
            ..Request::new("search").with_session(&session).with_module("ejaGroups")
        },
    );
    assert_eq!(first.action_type, "List");
    assert_eq!(first.search_offset, 0);
    assert_eq!(first.search_limit, 2);
    assert!(first.search_count >= 5);
    assert_eq!(first.search_last, 2);
    assert_eq!(first.search_rows.len(), 2);
    assert_eq!(
        first.search_rows[0].get("name").map(String::as_str),
        Some("group0"),
        "the module sorts by name"
    );

    let next = call(
        &store,
        &config,
        Request::new("next").with_session(&session).with_module("ejaGroups"),
    );
    assert_eq!(next.search_limit, 2);
    assert_eq!(next.search_offset, 2);
    assert_eq!(next.search_last, 4);
    assert_eq!(
        next.search_rows[0].get("name").map(String::as_str),
        Some("group2")
    );

    let previous = call(
        &store,
        &config,
        Request::new("previous").with_session(&session).with_module("ejaGroups"),
    );
    assert_eq!(previous.search_offset, 0);
}

#[test]
fn list_without_a_stored_query_shows_the_search_form() {
    let (store, config) = ready("list_without_a_stored_query_shows_the_search_form");
    let session = login(&store, &config);

    let response = call(
        &store,
        &config,
        Request::new("list")
            .with_session(&session)
            .with_module("ejaGroups")
            .with_value("name", "stale"),
    );
    assert_eq!(response.action_type, "Search");
    assert!(response.values.is_empty());
    assert!(response.fields.iter().all(|field| field.value.is_empty()));
}

#[test]
fn module_and_field_admin_creates_and_drops_tables() {
    let (store, config) = ready("module_and_field_admin_creates_and_drops_tables");
    let session = login(&store, &config);
    let root = module_id(&store, "eja").to_string();

    let created = call(
        &store,
        &config,
        Request::new("new").with_session(&session).with_module("ejaModules"),
    );
    let notes = created.id;
    let saved = call(
        &store,
        &config,
        Request {
            id: notes,
            ..Request::new("save")
                .with_session(&session)
                .with_module("ejaModules")
                .with_value("name", "notes")
                .with_value("sqlCreated", "1")
                .with_value("parentId", root)
                .with_value("power", "30")
        },
    );
    assert!(saved.info.contains(&"Module table created".to_string()), "{:?}", saved.info);
    assert!(saved.info.contains(&"Default permissions added".to_string()));
    assert!(store.table_exists("notes").expect("table lookup"));
    assert_eq!(module_id(&store, "notes"), notes);
    let commands = store.commands(1, notes, None).expect("commands");
    assert!(commands.iter().any(|command| command.name == "list"));

    let field = call(
        &store,
        &config,
        Request::new("new").with_session(&session).with_module("ejaFields"),
    );
    let saved = call(
        &store,
        &config,
        Request {
            id: field.id,
            ..Request::new("save")
                .with_session(&session)
                .with_module("ejaFields")
                .with_value("ejaModuleId", notes.to_string())
                .with_value("name", "body")
                .with_value("type", "text")
                .with_value("powerList", "1")
                .with_value("powerEdit", "1")
        },
    );
    assert_eq!(saved.info, vec!["Field column created".to_string()]);
    assert!(store.field_exists("notes", "body").expect("field lookup"));

    let deleted = call(
        &store,
        &config,
        Request {
            id: notes,
            ..Request::new("delete").with_session(&session).with_module("ejaModules")
        },
    );
    assert_eq!(deleted.info, vec!["Module deleted".to_string()]);
    assert!(!store.table_exists("notes").expect("table lookup"));
    assert_eq!(store.permission_count(notes).expect("count"), 0);

    let again = call(
        &store,
        &config,
        Request {
            id: notes,
            ..Request::new("delete").with_session(&session).with_module("ejaModules")
        },
    );
    assert_eq!(again.alert, vec!["Module not deleted".to_string()]);
}

#[test]
fn link_and_unlink_group_membership() {
    let (store, config) = ready("link_and_unlink_group_membership");
    let session = login(&store, &config);
    let group = save_group(&store, &config, &session, "staff");
    let user = call(
        &store,
        &config,
        Request::new("save")
            .with_session(&session)
            .with_module("ejaUsers")
            .with_value("username", "bob"),
    )
    .id;
    let users = module_id(&store, "ejaUsers");

    let linked = call(
        &store,
        &config,
        Request {
            id_list: vec![group],
            link: LinkRef {
                module_id: users,
                field_id: user,
                label: "bob".to_string(),
                ..LinkRef::default()
            },
            ..Request::new("link").with_session(&session).with_module("ejaGroups")
        },
    );
    assert_eq!(linked.action_type, "List");
    assert!(linked.linking);
    assert_eq!(linked.link.module_label, "Users");
    assert_eq!(linked.search_links, vec!["0".to_string(), group.to_string()]);
    assert_eq!(store.user_group_list(user), vec![group]);

    let unlinked = call(
        &store,
        &config,
        Request {
            id_list: vec![group],
            ..Request::new("unlink").with_session(&session).with_module("ejaGroups")
        },
    );
    assert!(unlinked.linking, "the link target is restored from the session");
    assert_eq!(unlinked.search_links, vec!["0".to_string()]);
    assert_eq!(store.user_group_list(user), vec![0]);

    let back = call(
        &store,
        &config,
        Request {
            id: user,
            ..Request::new("edit").with_session(&session).with_module("ejaUsers")
        },
    );
    assert!(!back.linking, "opening the link target ends linking");
    assert_eq!(back.value("username"), "bob");
}

#[test]
fn export_then_import_through_plugins() {
    let (store, config) = ready("export_then_import_through_plugins");
    let session = login(&store, &config);
    save_group(&store, &config, &session, "staff");
    let groups = module_id(&store, "ejaGroups");

    let exported = call(
        &store,
        &config,
        Request::new("run")
            .with_session(&session)
            .with_module("ejaExport")
            .with_value("ejaModuleId", groups.to_string())
            .with_value("dataExport", "1"),
    );
    assert_eq!(exported.info, vec!["Module exported".to_string()]);
    let json = exported.value("export").to_string();
    assert!(json.contains("\"staff\""), "export should carry data rows");

    let imported = call(
        &store,
        &config,
        Request::new("run")
            .with_session(&session)
            .with_module("ejaImport")
            .with_value("moduleName", "teams")
            .with_value("import", json.as_str()),
    );
    assert_eq!(imported.info, vec!["Module imported".to_string()]);
    module_id(&store, "teams");
    let count = store
        .value("SELECT COUNT(*) FROM teams WHERE name=?", &mt_storage::args!["staff"])
        .expect("count");
    assert_eq!(count, "1");

    let broken = call(
        &store,
        &config,
        Request::new("run")
            .with_session(&session)
            .with_module("ejaImport")
            .with_value("import", "{not json"),
    );
    assert_eq!(broken.alert, vec!["Module import failed".to_string()]);
}

#[test]
fn profile_changes_the_password() {
    let (store, config) = ready("profile_changes_the_password");
    let session = login(&store, &config);

    let mismatch = call(
        &store,
        &config,
        Request::new("run")
            .with_session(&session)
            .with_module("ejaProfile")
            .with_value("passwordOld", "secret")
            .with_value("passwordNew", "one")
            .with_value("passwordRepeat", "two"),
    );
    assert_eq!(mismatch.alert, vec!["The new passwords do not match".to_string()]);

    let changed = call(
        &store,
        &config,
        Request::new("run")
            .with_session(&session)
            .with_module("ejaProfile")
            .with_value("passwordOld", "secret")
            .with_value("passwordNew", "next")
            .with_value("passwordRepeat", "next"),
    );
    assert!(changed.alert.is_empty());
    assert_eq!(changed.info, vec!["Password updated".to_string()]);
    assert_eq!(changed.value("passwordNew"), "");
    assert!(changed.fields.iter().all(|field| field.value.is_empty()));
    assert!(!store.user_by_credentials("admin", "next").expect("lookup").is_empty());
}

#[test]
fn dropping_the_session_invalidates_the_token() {
    let (store, config) = ready("dropping_the_session_invalidates_the_token");
    let session = login(&store, &config);

    let response = run(
        &store,
        &config,
        Request::new("").with_session(&session),
        false,
    )
    .expect("last request");
    assert_eq!(response.session, "");

    let err = run(&store, &config, Request::new("").with_session(&session), true)
        .expect_err("token is gone");
    assert_eq!(err.code(), "ejaNotAuthorized");

    let session = login(&store, &config);
    let err = run(&store, &config, Request::new("logout").with_session(&session), true)
        .expect_err("logout ends the session");
    assert_eq!(err.response().map(|response| response.owner), Some(0));
    assert!(run(&store, &config, Request::new("").with_session(&session), true).is_err());
}

struct FixedSso;

impl SsoResolver for FixedSso {
    fn username(&self, token: &str) -> Option<String> {
        (token == "trusted").then(|| "admin".to_string())
    }
}

#[test]
fn sso_token_signs_in_a_known_user() {
    let (store, config) = ready("sso_token_signs_in_a_known_user");

    let response = run_with(
        &store,
        &config,
        Request::new("").with_value(SSO_TOKEN_VALUE, "trusted"),
        true,
        &FixedSso,
    )
    .expect("sso login");
    assert_eq!(response.owner, 1);
    assert!(!response.session.is_empty());

    let err = run_with(
        &store,
        &config,
        Request::new("").with_value(SSO_TOKEN_VALUE, "forged"),
        true,
        &FixedSso,
    )
    .expect_err("unknown token");
    assert_eq!(err.code(), "ejaNotAuthorized");
}

#[test]
fn broken_list_query_alerts_instead_of_failing() {
    let (store, config) = ready("broken_list_query_alerts_instead_of_failing");
    let session = login(&store, &config);
    save_group(&store, &config, &session, "staff");
    store.table_del("ejaGroups").expect("drop groups table");

    let response = call(
        &store,
        &config,
        Request::new("search").with_session(&session).with_module("ejaGroups"),
    );
    assert_eq!(response.action_type, "List");
    assert!(response.search_rows.is_empty());
    assert_eq!(response.alert, vec!["Search failed".to_string()]);
}

#[test]
fn edit_lists_keyed_sub_modules() {
    let (store, config) = ready("edit_lists_keyed_sub_modules");
    let session = login(&store, &config);
    let users = module_id(&store, "ejaUsers");
    let groups = module_id(&store, "ejaGroups");
    store
        .run(
            "INSERT INTO ejaModuleLinks (ejaOwner, dstModuleId, srcModuleId, srcFieldName, power) VALUES (1, ?, ?, 'userId', 1)",
            &mt_storage::args![users, groups],
        )
        .expect("module link");

    let edited = call(
        &store,
        &config,
        Request {
            id: 1,
            ..Request::new("edit").with_session(&session).with_module("ejaUsers")
        },
    );
    assert_eq!(edited.action_type, "Edit");
    assert_eq!(
        edited.sub_modules.iter().map(|link| link.module_id).collect::<Vec<_>>(),
        vec![groups]
    );

    let listed = call(
        &store,
        &config,
        Request::new("search").with_session(&session).with_module("ejaUsers"),
    );
    assert_eq!(listed.action_type, "List");
    assert!(listed.sub_modules.is_empty(), "only the Edit state carries sub modules");
}
