#![forbid(unsafe_code)]

use crate::fields::FieldType;

/// A column value. Storage keeps every value as text; conversions are lossy
/// and never fail (non-numeric text reads as zero).
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Text(String),
    Integer(i64),
    Decimal(f64),
    Boolean(bool),
}

impl Value {
    /// Coerces raw request text into the value written for a field of `field_type`.
    /// Password hashing is left to the storage layer.
    pub fn coerce(field_type: &FieldType, raw: &str) -> Self {
        match field_type {
            FieldType::Boolean | FieldType::Integer => Self::Integer(number(raw)),
            FieldType::Decimal => Self::Decimal(decimal(raw)),
            _ => Self::Text(raw.to_string()),
        }
    }

    pub fn as_integer(&self) -> i64 {
        match self {
            Self::Text(text) => number(text),
            Self::Integer(value) => *value,
            Self::Decimal(value) => *value as i64,
            Self::Boolean(value) => i64::from(*value),
        }
    }

    pub fn as_decimal(&self) -> f64 {
        match self {
            Self::Text(text) => decimal(text),
            Self::Integer(value) => *value as f64,
            Self::Decimal(value) => *value,
            Self::Boolean(value) => f64::from(u8::from(*value)),
        }
    }

    pub fn as_text(&self) -> String {
        self.to_string()
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text(text) => f.write_str(text),
            Self::Integer(value) => write!(f, "{value}"),
            Self::Decimal(value) => write!(f, "{value}"),
            Self::Boolean(value) => f.write_str(if *value { "1" } else { "0" }),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&String> for Value {
    fn from(value: &String) -> Self {
        Self::Text(value.clone())
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Decimal(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

/// Integer reading of stored text; anything that is not a plain integer is 0.
pub fn number(text: &str) -> i64 {
    text.parse::<i64>().unwrap_or(0)
}

pub fn decimal(text: &str) -> f64 {
    text.parse::<f64>().unwrap_or(0.0)
}
