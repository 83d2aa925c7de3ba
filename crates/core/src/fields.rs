#![forbid(unsafe_code)]

/// Declared type of a field. Drives the physical column type and the search predicate.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum FieldType {
    Text,
    Textarea,
    Integer,
    Decimal,
    Boolean,
    Date,
    Time,
    Datetime,
    Password,
    Select,
    SqlMatrix,
    SqlValue,
    SqlHidden,
    Multiple,
    SqlMultiple,
    Label,
    Other(String),
}

impl FieldType {
    pub fn parse(value: &str) -> Self {
        match value {
            "text" => Self::Text,
            "textarea" => Self::Textarea,
            "integer" => Self::Integer,
            "decimal" => Self::Decimal,
            "boolean" => Self::Boolean,
            "date" => Self::Date,
            "time" => Self::Time,
            "datetime" => Self::Datetime,
            "password" => Self::Password,
            "select" => Self::Select,
            "sqlMatrix" => Self::SqlMatrix,
            "sqlValue" => Self::SqlValue,
            "sqlHidden" => Self::SqlHidden,
            "multiple" => Self::Multiple,
            "sqlMultiple" => Self::SqlMultiple,
            "label" => Self::Label,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Text => "text",
            Self::Textarea => "textarea",
            Self::Integer => "integer",
            Self::Decimal => "decimal",
            Self::Boolean => "boolean",
            Self::Date => "date",
            Self::Time => "time",
            Self::Datetime => "datetime",
            Self::Password => "password",
            Self::Select => "select",
            Self::SqlMatrix => "sqlMatrix",
            Self::SqlValue => "sqlValue",
            Self::SqlHidden => "sqlHidden",
            Self::Multiple => "multiple",
            Self::SqlMultiple => "sqlMultiple",
            Self::Label => "label",
            Self::Other(name) => name,
        }
    }

    pub fn sql_column_type(&self) -> &'static str {
        match self {
            Self::Boolean | Self::Integer => "INTEGER",
            Self::Decimal => "DOUBLE",
            Self::Date => "DATE",
            Self::Time => "TIME",
            Self::Datetime => "DATETIME",
            _ => "TEXT",
        }
    }

    /// `label` and `sqlValue` fields are computed, they own no physical column.
    pub fn has_column(&self) -> bool {
        !matches!(self, Self::Label | Self::SqlValue)
    }

    /// Fields whose list value is produced by a stored subquery.
    pub fn is_computed(&self) -> bool {
        matches!(self, Self::SqlValue | Self::SqlHidden)
    }

    pub fn predicate(&self, bound: Option<Bound>) -> Predicate {
        match self {
            Self::Boolean => Predicate::Equal,
            Self::Integer | Self::Decimal | Self::Date | Self::Time | Self::Datetime => {
                match bound {
                    Some(Bound::Start) => Predicate::AtLeast,
                    Some(Bound::Stop) => Predicate::AtMost,
                    None => Predicate::Equal,
                }
            }
            Self::Multiple | Self::SqlMultiple => Predicate::Contains,
            _ => Predicate::Like,
        }
    }

    /// Truncates an ISO-like timestamp of at least 19 chars to the part the type displays.
    pub fn display_timestamp(&self, raw: &str) -> Option<String> {
        if raw.len() < 19 || !raw.is_char_boundary(10) || !raw.is_char_boundary(11) {
            return None;
        }
        if !raw.is_char_boundary(19) {
            return None;
        }
        match self {
            Self::Datetime => Some(format!("{} {}", &raw[..10], &raw[11..19])),
            Self::Date => Some(raw[..10].to_string()),
            Self::Time => Some(raw[11..19].to_string()),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Bound {
    Start,
    Stop,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Predicate {
    Equal,
    AtLeast,
    AtMost,
    Contains,
    Like,
}

impl Predicate {
    pub fn render(self, column: &str) -> String {
        match self {
            Self::Equal => format!(" AND {column} = ? "),
            Self::AtLeast => format!(" AND {column} >= ? "),
            Self::AtMost => format!(" AND {column} <= ? "),
            Self::Contains => format!(" AND (',' || {column} || ',') LIKE ? "),
            Self::Like => format!(" AND {column} LIKE ? "),
        }
    }

    pub fn argument(self, value: &str) -> String {
        match self {
            Self::Contains => format!("%,{value},%"),
            _ => value.to_string(),
        }
    }
}

/// A search filter key: `name`, `name.start` or `name.stop`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FilterKey<'a> {
    pub field: &'a str,
    pub bound: Option<Bound>,
}

impl<'a> FilterKey<'a> {
    pub fn parse(raw: &'a str) -> Self {
        let parts = raw.split('.').collect::<Vec<_>>();
        let bound = match parts.as_slice() {
            [_, "start"] => Some(Bound::Start),
            [_, "stop"] => Some(Bound::Stop),
            _ => None,
        };
        Self {
            field: parts.first().copied().unwrap_or_default(),
            bound,
        }
    }
}
