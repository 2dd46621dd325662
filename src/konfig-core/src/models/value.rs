use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;
use std::fmt;

pub type Fields = BTreeMap<String, FieldValue>;

/// Typed value of one declared or observed field.
///
/// `String`, `Integer`, `Float` and `Boolean` are scalars; `List` keeps its order
/// and `Map` holds nested settings. JSON `null` has no representation: a field
/// that is null is simply unset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub enum FieldValue {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    List(Vec<FieldValue>),
    Map(Fields),
}

impl FieldValue {
    /// Converts a JSON value, dropping nulls at every depth.
    pub fn from_json(value: Value) -> Option<FieldValue> {
        match value {
            Value::Null => None,
            Value::Bool(b) => Some(FieldValue::Boolean(b)),
            Value::Number(n) => Some(match n.as_i64() {
                Some(i) => FieldValue::Integer(i),
                None => FieldValue::Float(n.as_f64().unwrap_or_default()),
            }),
            Value::String(s) => Some(FieldValue::String(s)),
            Value::Array(items) => Some(FieldValue::List(
                items.into_iter().filter_map(FieldValue::from_json).collect(),
            )),
            Value::Object(map) => Some(FieldValue::Map(
                map.into_iter()
                    .filter_map(|(k, v)| FieldValue::from_json(v).map(|v| (k, v)))
                    .collect(),
            )),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::String(s) => Value::String(s.clone()),
            FieldValue::Integer(i) => Value::Number((*i).into()),
            FieldValue::Float(f) => Number::from_f64(*f).map(Value::Number).unwrap_or(Value::Null),
            FieldValue::Boolean(b) => Value::Bool(*b),
            FieldValue::List(items) => Value::Array(items.iter().map(FieldValue::to_json).collect()),
            FieldValue::Map(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect::<Map<String, Value>>(),
            ),
        }
    }

    /// Empty strings, lists and maps count as unset. `false` and `0` do not.
    pub fn is_empty(&self) -> bool {
        match self {
            FieldValue::String(s) => s.is_empty(),
            FieldValue::List(items) => items.is_empty(),
            FieldValue::Map(map) => map.is_empty(),
            _ => false,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            FieldValue::String(_) => "string",
            FieldValue::Integer(_) => "integer",
            FieldValue::Float(_) => "number",
            FieldValue::Boolean(_) => "boolean",
            FieldValue::List(_) => "list",
            FieldValue::Map(_) => "map",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[FieldValue]> {
        match self {
            FieldValue::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&Fields> {
        match self {
            FieldValue::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Builds a list of strings.
    pub fn strings<I, S>(items: I) -> FieldValue
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        FieldValue::List(items.into_iter().map(|s| FieldValue::String(s.into())).collect())
    }
}

/// JSON type label used in decode errors.
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

impl TryFrom<Value> for FieldValue {
    type Error = String;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        FieldValue::from_json(value).ok_or_else(|| "null is not a field value; omit the field instead".to_string())
    }
}

impl From<FieldValue> for Value {
    fn from(value: FieldValue) -> Self {
        value.to_json()
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::String(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::String(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Integer(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Boolean(value)
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::String(s) => f.write_str(s),
            other => write!(f, "{}", other.to_json()),
        }
    }
}
