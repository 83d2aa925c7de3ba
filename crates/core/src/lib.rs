#![forbid(unsafe_code)]

pub mod fields;
pub mod value;

pub use fields::{Bound, FieldType, FilterKey, Predicate};
pub use value::Value;

pub mod ident {
    pub const MAX_IDENTIFIER_LEN: usize = 128;

    #[derive(Clone, Debug, PartialEq, Eq)]
    pub enum IdentifierError {
        Empty,
        TooLong,
        InvalidFirstChar,
        InvalidChar { ch: char, index: usize },
    }

    impl std::fmt::Display for IdentifierError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                Self::Empty => write!(f, "identifier is empty"),
                Self::TooLong => write!(f, "identifier exceeds {MAX_IDENTIFIER_LEN} chars"),
                Self::InvalidFirstChar => write!(f, "identifier must start with a letter or '_'"),
                Self::InvalidChar { ch, index } => {
                    write!(f, "invalid char {ch:?} at index {index}")
                }
            }
        }
    }

    impl std::error::Error for IdentifierError {}

    /// Table and column names are interpolated into SQL text, so they must match
    /// `^[a-zA-Z_][a-zA-Z0-9_]{0,127}$`.
    pub fn validate_identifier(value: &str) -> Result<(), IdentifierError> {
        let mut chars = value.chars();
        let Some(first) = chars.next() else {
            return Err(IdentifierError::Empty);
        };
        if !(first.is_ascii_alphabetic() || first == '_') {
            return Err(IdentifierError::InvalidFirstChar);
        }
        for (index, ch) in value.chars().enumerate().skip(1) {
            if index >= MAX_IDENTIFIER_LEN {
                return Err(IdentifierError::TooLong);
            }
            if ch.is_ascii_alphanumeric() || ch == '_' {
                continue;
            }
            return Err(IdentifierError::InvalidChar { ch, index });
        }
        Ok(())
    }

    pub fn is_identifier(value: &str) -> bool {
        validate_identifier(value).is_ok()
    }
}

/// Names of the built-in system modules and of the columns every module table carries.
pub mod names {
    pub const ROOT: &str = "eja";
    pub const MODULES: &str = "ejaModules";
    pub const FIELDS: &str = "ejaFields";
    pub const COMMANDS: &str = "ejaCommands";
    pub const PERMISSIONS: &str = "ejaPermissions";
    pub const LINKS: &str = "ejaLinks";
    pub const MODULE_LINKS: &str = "ejaModuleLinks";
    pub const USERS: &str = "ejaUsers";
    pub const GROUPS: &str = "ejaGroups";
    pub const TRANSLATIONS: &str = "ejaTranslations";
    pub const SESSIONS: &str = "ejaSessions";
    pub const SESSION_TRANSIENT: &str = "ejaSession";
    pub const LOGIN: &str = "ejaLogin";
    pub const PROFILE: &str = "ejaProfile";
    pub const EXPORT: &str = "ejaExport";
    pub const IMPORT: &str = "ejaImport";

    pub const ID: &str = "ejaId";
    pub const OWNER: &str = "ejaOwner";
    pub const LOG: &str = "ejaLog";

    pub const SYSTEM_COLUMNS: [&str; 3] = [ID, OWNER, LOG];

    pub fn is_system_column(name: &str) -> bool {
        SYSTEM_COLUMNS.contains(&name)
    }
}

pub mod action {
    /// The resolved UI state. Also selects the `power{Ctx}` metadata column.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub enum ActionType {
        List,
        Edit,
        Search,
    }

    impl ActionType {
        pub fn parse(value: &str) -> Option<Self> {
            match value {
                "List" => Some(Self::List),
                "Edit" => Some(Self::Edit),
                "Search" => Some(Self::Search),
                _ => None,
            }
        }

        pub fn as_str(self) -> &'static str {
            match self {
                Self::List => "List",
                Self::Edit => "Edit",
                Self::Search => "Search",
            }
        }

        pub fn power_column(self) -> &'static str {
            match self {
                Self::List => "powerList",
                Self::Edit => "powerEdit",
                Self::Search => "powerSearch",
            }
        }
    }

    #[derive(Clone, Debug, PartialEq, Eq, Default)]
    pub enum Action {
        #[default]
        None,
        Login,
        Logout,
        List,
        Search,
        Next,
        Previous,
        Edit,
        New,
        Copy,
        Save,
        Delete,
        Link,
        Unlink,
        Run,
        Other(String),
    }

    impl Action {
        pub fn parse(value: &str) -> Self {
            match value {
                "" => Self::None,
                "login" => Self::Login,
                "logout" => Self::Logout,
                "list" => Self::List,
                "search" => Self::Search,
                "next" => Self::Next,
                "previous" => Self::Previous,
                "edit" => Self::Edit,
                "new" => Self::New,
                "copy" => Self::Copy,
                "save" => Self::Save,
                "delete" => Self::Delete,
                "link" => Self::Link,
                "unlink" => Self::Unlink,
                "run" => Self::Run,
                other => Self::Other(other.to_string()),
            }
        }

        /// Command name checked against the permitted command set.
        pub fn as_str(&self) -> &str {
            match self {
                Self::None => "",
                Self::Login => "login",
                Self::Logout => "logout",
                Self::List => "list",
                Self::Search => "search",
                Self::Next => "next",
                Self::Previous => "previous",
                Self::Edit => "edit",
                Self::New => "new",
                Self::Copy => "copy",
                Self::Save => "save",
                Self::Delete => "delete",
                Self::Link => "link",
                Self::Unlink => "unlink",
                Self::Run => "run",
                Self::Other(name) => name,
            }
        }

        pub fn is_none(&self) -> bool {
            matches!(self, Self::None)
        }

        pub fn is_paging(&self) -> bool {
            matches!(self, Self::List | Self::Search | Self::Next | Self::Previous)
        }

        pub fn writes_values(&self) -> bool {
            matches!(self, Self::Save | Self::Copy | Self::New)
        }
    }
}

pub fn ids_to_csv<'a>(ids: impl IntoIterator<Item = &'a i64>) -> String {
    ids.into_iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(",")
}
