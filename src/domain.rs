use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::CensusError;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct TaskId(u64);

impl TaskId {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TaskId {
    type Err = CensusError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        value
            .trim()
            .parse::<u64>()
            .map(Self)
            .map_err(|_| CensusError::InvalidTaskId(value.to_string()))
    }
}

/// One document to fetch. Consumed by exactly one worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Task {
    pub id: TaskId,
    pub url: String,
}

impl Task {
    pub fn new(id: u64, url: impl Into<String>) -> Self {
        Self {
            id: TaskId(id),
            url: url.into(),
        }
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {}", self.id, self.url)
    }
}

/// Scalar attribute value as it appeared in the document.
///
/// Strings and numbers are kept apart, so `"1"` and `1` count as different
/// values. Non-integral numbers keep their JSON spelling. `null` is a value
/// like any other.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AttributeValue {
    Null,
    Bool(bool),
    Integer(i64),
    Decimal(String),
    Text(String),
}

impl AttributeValue {
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(AttributeValue::Null),
            Value::Bool(flag) => Some(AttributeValue::Bool(*flag)),
            Value::Number(number) => Some(
                number
                    .as_i64()
                    .map(AttributeValue::Integer)
                    .unwrap_or_else(|| AttributeValue::Decimal(number.to_string())),
            ),
            Value::String(text) => Some(AttributeValue::Text(text.clone())),
            Value::Array(_) | Value::Object(_) => None,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            AttributeValue::Null => Value::Null,
            AttributeValue::Bool(flag) => Value::Bool(*flag),
            AttributeValue::Integer(value) => Value::from(*value),
            AttributeValue::Decimal(raw) => raw
                .parse::<serde_json::Number>()
                .map(Value::Number)
                .unwrap_or_else(|_| Value::String(raw.clone())),
            AttributeValue::Text(text) => Value::String(text.clone()),
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Null => write!(f, "null"),
            AttributeValue::Bool(flag) => write!(f, "{flag}"),
            AttributeValue::Integer(value) => write!(f, "{value}"),
            AttributeValue::Decimal(raw) => write!(f, "{raw}"),
            AttributeValue::Text(text) => write!(f, "{text}"),
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::Text(value.to_string())
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        AttributeValue::Integer(value)
    }
}

impl Serialize for AttributeValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for AttributeValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Value::deserialize(deserializer)?;
        AttributeValue::from_json(&raw).ok_or_else(|| {
            D::Error::custom(format!(
                "attribute value must be a scalar, got {raw}"
            ))
        })
    }
}

/// One `{ "trait_type": ..., "value": ... }` entry. Any other keys of the
/// entry (`display_type` and friends) are carried along untouched.
///
/// A scalar `trait_type` that is not a string is kept in its JSON spelling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributePair {
    #[serde(deserialize_with = "scalar_name")]
    pub trait_type: String,
    pub value: AttributeValue,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AttributePair {
    pub fn new(trait_type: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        Self {
            trait_type: trait_type.into(),
            value: value.into(),
            extra: Map::new(),
        }
    }
}

fn scalar_name<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match AttributeValue::deserialize(deserializer)? {
        AttributeValue::Text(text) => Ok(text),
        other => Ok(other.to_string()),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    pub id: TaskId,
    pub attributes: Vec<AttributePair>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HttpMethod::Get => write!(f, "GET"),
        }
    }
}

impl FromStr for HttpMethod {
    type Err = CensusError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            _ => Err(CensusError::UnsupportedMethod(value.to_string())),
        }
    }
}
