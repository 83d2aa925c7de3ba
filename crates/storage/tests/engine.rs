#![forbid(unsafe_code)]

use mt_core::Value;
use mt_core::action::ActionType;
use mt_storage::{
    LinkEdge, LinkKind, MAX_DELEGATION_DEPTH, ModuleDefinition, ModuleField, ModuleSettings,
    SessionKey, SessionStore, SetupRequest, Store, StoreError, command_exists, session_token,
    setup, unix_secs,
};
use std::collections::BTreeSet;
use std::path::PathBuf;

fn temp_storage_dir(test_name: &str) -> PathBuf {
    let base = std::env::temp_dir();
    let pid = std::process::id();
    let nonce = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let dir = base.join(format!("mt_storage_{test_name}_{pid}_{nonce}"));
    std::fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

fn ready_store(test_name: &str) -> Store {
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
    store
}

fn field(name: &str, field_type: &str, power: i64) -> ModuleField {
    ModuleField {
        name: name.to_string(),
        field_type: field_type.to_string(),
        power_search: power,
        power_list: power,
        power_edit: power,
        ..ModuleField::default()
    }
}

fn items_module(store: &Store) -> i64 {
    let definition = ModuleDefinition {
        name: "items".to_string(),
        module: ModuleSettings {
            parent_name: "eja".to_string(),
            power: 50,
            search_limit: 5,
            sql_created: 1,
            sort_list: "title".to_string(),
        },
        field: vec![field("title", "text", 1), field("qty", "integer", 2)],
        command: ["list", "search", "edit", "new", "save", "delete"]
            .into_iter()
            .map(str::to_string)
            .collect(),
        ..ModuleDefinition::default()
    };
    store.module_import(&definition, "").expect("import items")
}

fn module(store: &Store, name: &str) -> i64 {
    let id = store.module_id_by_name(name).expect("module lookup");
    assert!(id > 0, "module {name} should exist");
    id
}

/// Gives `items` a translated label and a keyed relation to `target`.
fn relate_items(store: &Store, items: i64, target: i64) {
    store
        .run(
            "INSERT INTO ejaTranslations (ejaOwner, ejaModuleId, ejaLanguage, word, translation) VALUES (1, ?, 'en', 'items', 'Items')",
            &mt_storage::args![items],
        )
        .expect("translation");
    store
        .run(
            "INSERT INTO ejaModuleLinks (ejaOwner, dstModuleId, srcModuleId, srcFieldName, power) VALUES (1, ?, ?, 'userId', 1)",
            &mt_storage::args![target, items],
        )
        .expect("module link");
}

fn count_rows(store: &Store, table: &str, column: &str, id: i64) -> i64 {
    store
        .value(
            &format!("SELECT COUNT(*) FROM {table} WHERE {column}=?"),
            &mt_storage::args![id],
        )
        .expect("count")
        .parse()
        .expect("numeric count")
}

#[test]
fn setup_installs_system_modules_and_admin() {
    let store = ready_store("setup_installs_system_modules_and_admin");

    let admin = store
        .user_by_credentials("admin", "secret")
        .expect("credentials lookup");
    assert_eq!(admin.get("ejaId").map(String::as_str), Some("1"));
    assert_eq!(
        admin.get("defaultModuleId").cloned(),
        Some(module(&store, "eja").to_string())
    );
    assert!(store.user_by_credentials("admin", "wrong").expect("lookup").is_empty());

    let modules = module(&store, "ejaModules");
    let commands = store.commands(1, modules, None).expect("commands");
    assert!(command_exists(&commands, "search"));
    assert!(command_exists(&commands, "save"));
    assert!(command_exists(&commands, "link"));

    let list = store
        .commands(1, modules, Some(ActionType::List))
        .expect("list commands");
    assert!(!command_exists(&list, "save"), "save has no list power");

    let login = store
        .commands(0, module(&store, "ejaLogin"), None)
        .expect("login commands");
    assert_eq!(login.first().map(|c| c.name.as_str()), Some("login"));

    let err = setup(
        &store,
        &SetupRequest {
            user: "admin".to_string(),
            pass: "secret".to_string(),
            definitions: None,
        },
    )
    .expect_err("second setup must fail");
    assert!(matches!(err, StoreError::InvalidInput(_)));
}

#[test]
fn unknown_module_has_no_commands() {
    let store = ready_store("unknown_module_has_no_commands");
    let err = store.commands(1, 9999, None).expect_err("missing module");
    assert!(matches!(err, StoreError::ModuleNotFound));
}

#[test]
fn records_round_trip_and_respect_ownership() {
    let store = ready_store("records_round_trip_and_respect_ownership");
    let items = items_module(&store);
    let users = module(&store, "ejaUsers");

    let id = store.new_record(1, items).expect("new record");
    assert!(id > 0);
    assert_eq!(
        store.put(1, items, id, "title", Value::from("hello")).expect("put"),
        1
    );
    assert_eq!(store.put(1, items, id, "qty", Value::from(4_i64)).expect("put"), 1);
    let row = store.get(1, items, id).expect("get");
    assert_eq!(row.get("title").map(String::as_str), Some("hello"));
    assert_eq!(row.get("qty").map(String::as_str), Some("4"));

    let err = store
        .put(1, items, id, "missing", Value::from("x"))
        .expect_err("unknown column");
    assert!(matches!(err, StoreError::UnknownField(_)));
    let err = store
        .put(1, items, id, "ejaId", Value::from(9_i64))
        .expect_err("id is not writable");
    assert!(matches!(err, StoreError::UnknownField(_)));

    let guest = store.new_record(1, users).expect("new user");
    assert!(store.get(guest, items, id).expect("get").is_empty());
    assert_eq!(store.del(guest, items, id).expect("foreign delete"), 0);
    assert!(store.owners(1, items).contains(&guest), "admin owns the guest account");
    assert!(store.owners(guest, items).contains(&guest));

    assert_eq!(store.del(1, items, id).expect("delete"), 1);
    assert!(store.get(1, items, id).expect("get").is_empty());
}

#[test]
fn owners_always_contain_the_actor() {
    let store = ready_store("owners_always_contain_the_actor");
    for actor in [1, 7, 12345] {
        assert!(store.owners(actor, 0).contains(&actor));
        assert!(store.owners(actor, 9999).contains(&actor));
    }
}

#[test]
fn owners_follow_delegation_chains() {
    let store = ready_store("owners_follow_delegation_chains");
    let users = module(&store, "ejaUsers");
    let items = items_module(&store);

    let manager = store.new_record(1, users).expect("manager");
    let clerk = store.new_record(manager, users).expect("clerk");
    let owners = store.owners(1, items);
    assert!(owners.contains(&manager));
    assert!(owners.contains(&clerk), "delegation is transitive");

    let managed = store.owners(manager, items);
    assert!(managed.contains(&clerk));
    assert!(!managed.contains(&1));
}

#[test]
fn delegation_cycles_terminate() {
    let store = ready_store("delegation_cycles_terminate");
    let users = module(&store, "ejaUsers");
    let items = items_module(&store);

    let manager = store.new_record(1, users).expect("manager");
    let clerk = store.new_record(manager, users).expect("clerk");
    assert_eq!(
        store
            .put(1, users, manager, "ejaOwner", Value::from(clerk))
            .expect("close the cycle"),
        1
    );

    assert_eq!(store.owners(manager, items), BTreeSet::from([manager, clerk]));
    assert_eq!(store.owners(clerk, items), BTreeSet::from([manager, clerk]));
}

#[test]
fn delegation_walk_stops_at_the_depth_bound() {
    let store = ready_store("delegation_walk_stops_at_the_depth_bound");
    let users = module(&store, "ejaUsers");
    let items = items_module(&store);

    let mut chain = vec![store.new_record(1, users).expect("head")];
    for _ in 0..12 {
        let last = *chain.last().expect("chain head");
        chain.push(store.new_record(last, users).expect("delegate"));
    }

    let owners = store.owners(chain[0], items);
    assert_eq!(owners.len(), MAX_DELEGATION_DEPTH + 1);
    assert!(owners.contains(&chain[MAX_DELEGATION_DEPTH]));
    assert!(
        !owners.contains(&chain[MAX_DELEGATION_DEPTH + 1]),
        "chains past the bound are cut off"
    );
    assert!(store.owners(chain[2], items).contains(&chain[12]));
}

#[test]
fn owners_include_members_of_groups_sharing_the_module() {
    let store = ready_store("owners_include_members_of_groups_sharing_the_module");
    let users = module(&store, "ejaUsers");
    let groups = module(&store, "ejaGroups");
    let modules = module(&store, "ejaModules");
    let items = items_module(&store);

    let alice = store.new_record(1, users).expect("alice");
    let bob = store.new_record(1, users).expect("bob");
    let group = store.new_record(1, groups).expect("group");
    for member in [alice, bob] {
        store
            .link_add(
                1,
                LinkEdge {
                    module_id: groups,
                    field_id: group,
                    link_module_id: users,
                    link_field_id: member,
                },
            )
            .expect("membership");
    }
    assert!(
        !store.owners(alice, items).contains(&bob),
        "membership alone shares nothing"
    );

    let share = LinkEdge {
        module_id: modules,
        field_id: items,
        link_module_id: groups,
        link_field_id: group,
    };
    assert_eq!(LinkKind::classify(&store, modules, groups), LinkKind::ModuleShare);
    assert_eq!(LinkKind::ModuleShare.endpoints(&store), Some((modules, groups)));
    store.link_add(1, share).expect("share module");

    assert_eq!(store.owners(alice, items), BTreeSet::from([alice, bob]));
    assert!(store.owners(bob, items).contains(&alice));
    assert!(
        !store.owners(alice, users).contains(&bob),
        "sharing is scoped to the linked module"
    );
}

#[test]
fn group_membership_links_are_added_and_removed() {
    let store = ready_store("group_membership_links_are_added_and_removed");
    let users = module(&store, "ejaUsers");
    let groups = module(&store, "ejaGroups");

    let member = store.new_record(1, users).expect("user");
    let group = store.new_record(1, groups).expect("group");
    let edge = LinkEdge {
        module_id: groups,
        field_id: group,
        link_module_id: users,
        link_field_id: member,
    };
    assert_eq!(LinkKind::classify(&store, groups, users), LinkKind::Membership);
    assert_eq!(LinkKind::Membership.endpoints(&store), Some((groups, users)));
    assert_eq!(LinkKind::Record.endpoints(&store), None);

    store.link_add(1, edge).expect("link");
    assert_eq!(store.user_group_list(member), vec![group]);
    assert_eq!(
        store.search_links(1, users, member, groups).expect("links"),
        vec!["0".to_string(), group.to_string()]
    );

    assert_eq!(store.link_del(1, edge).expect("unlink").changes, 1);
    assert_eq!(store.user_group_list(member), vec![0]);
}

#[test]
fn deleting_a_record_purges_its_links() {
    let store = ready_store("deleting_a_record_purges_its_links");
    let users = module(&store, "ejaUsers");
    let groups = module(&store, "ejaGroups");
    let member = store.new_record(1, users).expect("user");
    let group = store.new_record(1, groups).expect("group");
    store
        .link_add(
            member,
            LinkEdge {
                module_id: groups,
                field_id: group,
                link_module_id: users,
                link_field_id: member,
            },
        )
        .expect("link");

    assert_eq!(store.del(1, groups, group).expect("delete group"), 1);
    assert_eq!(store.user_group_list(member), vec![0]);
}

#[test]
fn deleting_a_module_drops_table_and_metadata() {
    let store = ready_store("deleting_a_module_drops_table_and_metadata");
    let items = items_module(&store);
    let modules = module(&store, "ejaModules");
    let users = module(&store, "ejaUsers");
    relate_items(&store, items, users);
    assert!(store.table_exists("items").expect("exists"));
    assert!(store.permission_count(items).expect("count") > 0);
    assert_eq!(count_rows(&store, "ejaTranslations", "ejaModuleId", items), 1);
    assert_eq!(count_rows(&store, "ejaModuleLinks", "srcModuleId", items), 1);

    assert_eq!(store.del(1, modules, items).expect("delete module"), 1);
    assert!(!store.table_exists("items").expect("exists"));
    assert_eq!(store.permission_count(items).expect("count"), 0);
    assert_eq!(store.field_type(items, "title").expect("type"), None);
    assert_eq!(store.module_id_by_name("items").expect("lookup"), 0);
    assert_eq!(count_rows(&store, "ejaTranslations", "ejaModuleId", items), 0);
    assert_eq!(count_rows(&store, "ejaModuleLinks", "srcModuleId", items), 0);
}

#[test]
fn deleting_a_module_without_table_keeps_its_metadata() {
    let store = ready_store("deleting_a_module_without_table_keeps_its_metadata");
    let items = items_module(&store);
    let modules = module(&store, "ejaModules");
    let users = module(&store, "ejaUsers");
    relate_items(&store, items, users);
    let permissions = store.permission_count(items).expect("count");
    assert!(permissions > 0);

    store.table_del("items").expect("drop table");
    assert_eq!(store.del(1, modules, items).expect("delete module row"), 1);

    assert_eq!(store.module_id_by_name("items").expect("lookup"), 0);
    assert_eq!(store.permission_count(items).expect("count"), permissions);
    assert_eq!(
        store.field_type(items, "title").expect("type"),
        Some(mt_core::FieldType::Text)
    );
    assert_eq!(count_rows(&store, "ejaTranslations", "ejaModuleId", items), 1);
    assert_eq!(count_rows(&store, "ejaModuleLinks", "srcModuleId", items), 1);
}

#[test]
fn sub_modules_list_keyed_relations_only() {
    let store = ready_store("sub_modules_list_keyed_relations_only");
    let items = items_module(&store);
    let users = module(&store, "ejaUsers");
    assert!(store.sub_modules(1, users).expect("sub modules").is_empty());
    assert!(!store.is_sub_module(items).expect("keyed"));

    relate_items(&store, items, users);
    let subs = store.sub_modules(1, users).expect("sub modules");
    assert_eq!(subs.len(), 1);
    assert_eq!(subs[0].module_id, items);
    assert_eq!(subs[0].label, "items", "module-scoped labels need a session in that module");
    assert!(store.is_sub_module(items).expect("keyed"));
    assert_eq!(
        store.module_links_field_name(items, users).expect("field name"),
        "userId"
    );
    assert!(
        store
            .module_links(1, users)
            .expect("links")
            .iter()
            .any(|link| link.module_id == items)
    );
}

#[test]
fn module_export_feeds_import_under_a_new_name() {
    let store = ready_store("module_export_feeds_import_under_a_new_name");
    let items = items_module(&store);
    let id = store.new_record(1, items).expect("record");
    store.put(1, items, id, "title", Value::from("kept")).expect("put");

    let exported = store.module_export(items, true).expect("export");
    assert_eq!(exported.name, "items");
    assert_eq!(exported.module.parent_name, "eja");
    assert_eq!(exported.field.len(), 2);
    assert!(exported.command.contains(&"save".to_string()));
    assert_eq!(exported.data.len(), 1);
    assert!(!exported.data[0].contains_key("ejaId"));

    let copies = store.module_import(&exported, "copies").expect("import copy");
    assert_ne!(copies, items);
    assert!(store.table_exists("copies").expect("exists"));
    let rows = store.rows("SELECT title FROM copies", &[]).expect("rows");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("title").map(String::as_str), Some("kept"));

    assert_eq!(store.module_append(&exported, "copies").expect("append"), 1);
    assert_eq!(store.rows("SELECT ejaId FROM copies", &[]).expect("rows").len(), 2);
}

#[test]
fn session_entries_survive_reload_until_reset() {
    let store = ready_store("session_entries_survive_reload_until_reset");
    let items = items_module(&store);

    store
        .session_put(1, SessionKey::SearchLimit, "7", "")
        .expect("put limit");
    store
        .session_put_args(1, &["a".to_string(), "b".to_string()])
        .expect("put args");
    let rows = store.session_load(1, items).expect("load");
    let value = |name: &str| {
        rows.iter()
            .filter(|row| row.get("name").map(String::as_str) == Some(name))
            .filter_map(|row| row.get("value").cloned())
            .collect::<Vec<_>>()
    };
    assert_eq!(value("SearchLimit"), vec!["7".to_string()]);
    assert_eq!(value("SqlQueryArgs"), vec!["a".to_string(), "b".to_string()]);
    assert_eq!(value("ejaModuleName"), vec!["items".to_string()]);
    assert!(value("ejaOwners").contains(&"1".to_string()));

    store.session_clean_search(1).expect("clean");
    let rows = store.session_load(1, items).expect("reload");
    assert!(!rows.iter().any(|row| row.get("name").map(String::as_str) == Some("SearchLimit")));

    store.session_reset(1).expect("reset");
    let stored = store
        .rows("SELECT * FROM ejaSessions WHERE ejaOwner=1", &[])
        .expect("rows");
    assert!(stored.is_empty());
}

#[test]
fn session_tokens_resolve_to_their_user() {
    let store = ready_store("session_tokens_resolve_to_their_user");
    let token = store.session_init(1, 3600).expect("init");
    assert_eq!(token.len(), 64);

    let user = store.user_by_session_token(&token, 3600).expect("lookup");
    assert_eq!(user.get("username").map(String::as_str), Some("admin"));
    assert_eq!(store.session_refresh(1, 3600).expect("refresh"), token);
    assert!(store.user_by_session_token("bogus", 3600).expect("lookup").is_empty());

    store.session_reset(1).expect("reset");
    assert!(store.user_by_session_token(&token, 3600).expect("lookup").is_empty());
}

#[test]
fn session_tokens_span_two_adjacent_windows() {
    let store = ready_store("session_tokens_span_two_adjacent_windows");
    let window_secs = 1_000_000_000_i64;
    let current = store.session_init(1, window_secs).expect("init");
    let seed = store
        .value("SELECT ejaSession FROM ejaUsers WHERE ejaId=1", &[])
        .expect("seed");
    assert_eq!(seed.len(), 64);
    let window = unix_secs() / window_secs;
    assert_eq!(current, session_token(&seed, window));

    let previous = session_token(&seed, window - 1);
    let expired = session_token(&seed, window - 2);
    let user = store.user_by_session_token(&previous, window_secs).expect("lookup");
    assert_eq!(user.get("username").map(String::as_str), Some("admin"));
    assert!(store.user_by_session_token(&expired, window_secs).expect("lookup").is_empty());

    store
        .run(
            "UPDATE ejaUsers SET ejaSessionToken=? WHERE ejaId=1",
            &mt_storage::args![expired.as_str()],
        )
        .expect("stale token");
    assert!(
        store.user_by_session_token(&expired, window_secs).expect("lookup").is_empty(),
        "an indexed token is still checked against its window"
    );
    assert_eq!(store.session_refresh(1, window_secs).expect("refresh"), current);
    assert_eq!(
        store
            .user_by_session_token(&current, window_secs)
            .expect("lookup")
            .get("ejaId")
            .map(String::as_str),
        Some("1")
    );
}

#[test]
fn translations_fall_back_to_the_word() {
    let store = ready_store("translations_fall_back_to_the_word");
    assert_eq!(store.translate("ejaUsers", Some(1)), "Users");
    assert_eq!(store.translate_in("ejaUsers", "en"), "Users");
    assert_eq!(store.translate("neverTranslated", Some(1)), "neverTranslated");
}

#[test]
fn tree_and_path_follow_module_parents() {
    let store = ready_store("tree_and_path_follow_module_parents");
    let root = module(&store, "eja");
    let fields = module(&store, "ejaFields");

    let path = store.module_path(1, fields).expect("path");
    assert_eq!(
        path.iter().map(|node| node.name.as_str()).collect::<Vec<_>>(),
        vec!["eja", "ejaModules"]
    );

    let tree = store.module_tree(1, root, &[]).expect("tree");
    let names = tree.iter().map(|node| node.name.as_str()).collect::<Vec<_>>();
    assert!(names.contains(&"ejaModules"));
    assert!(names.contains(&"ejaUsers"));
    assert!(!names.contains(&"ejaFields"), "grandchildren are not listed at the root");
}
