use konfig_errors::{DecodeError, ValidationError};
use serde_json::{Map, Value};

use crate::core::Resolution;
use crate::models::{
    json_type_name, DeclaredResource, FieldPolicy, FieldSpec, FieldType, FieldValue, Fields, KindDescriptor,
    Snapshot,
};

/// Encoded request payload.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Empty,
    Json(Value),
    /// `application/x-www-form-urlencoded` pairs with dotted keys.
    Form(Vec<(String, String)>),
}

impl RequestBody {
    pub fn is_empty(&self) -> bool {
        matches!(self, RequestBody::Empty)
    }
}

/// Rejects unknown keys and values of the wrong shape.
pub fn validate(declared: &DeclaredResource) -> Result<(), ValidationError> {
    let descriptor = declared.descriptor();
    for (name, value) in &declared.fields {
        if value.is_empty() {
            continue;
        }
        let expected = if let Some(spec) = descriptor.field(name) {
            if spec.ty.accepts(value) {
                continue;
            }
            spec.ty.name()
        } else if descriptor.scopes.get(name).is_some() {
            if value.as_str().is_some() {
                continue;
            }
            "an identifier string"
        } else if descriptor.alternative_for_serialized(name).is_some() {
            if value.as_str().is_some() {
                continue;
            }
            "a JSON document string"
        } else {
            return Err(ValidationError::UnknownField {
                kind: descriptor.name,
                field: name.clone(),
            });
        };
        return Err(ValidationError::TypeMismatch {
            kind: descriptor.name,
            field: name.clone(),
            expected,
        });
    }
    Ok(())
}

/// Builds the request body for create and update.
pub fn encode(declared: &DeclaredResource, resolution: &Resolution) -> Result<RequestBody, ValidationError> {
    let descriptor = declared.descriptor();
    validate(declared)?;

    let mut body = Map::new();
    let mut serialized_used = false;

    for alt in descriptor.alternatives {
        match (declared.get(alt.structured), declared.get_str(alt.serialized)) {
            (Some(_), Some(_)) => {
                return Err(ValidationError::ConflictingFields {
                    kind: descriptor.name,
                    structured: alt.structured,
                    serialized: alt.serialized,
                });
            }
            (None, Some(text)) => {
                body.insert(alt.structured.to_string(), parse_blob(descriptor, alt.serialized, text)?);
                serialized_used = true;
            }
            _ => {}
        }
    }

    for spec in descriptor.fields {
        if body.contains_key(spec.name) {
            continue;
        }
        match declared.get(spec.name) {
            Some(value) => {
                body.insert(spec.name.to_string(), encode_value(spec, value));
            }
            None if spec.policy == FieldPolicy::Required => {
                return Err(ValidationError::MissingField {
                    kind: descriptor.name,
                    field: spec.name,
                });
            }
            None => {}
        }
    }

    if let Some((key, reference)) = resolution.body_linkage() {
        body.insert(key.to_string(), reference);
    }

    if descriptor.legacy_form && resolution.is_legacy_path() && !serialized_used {
        return Ok(RequestBody::Form(flatten_form(&body)));
    }
    Ok(RequestBody::Json(Value::Object(body)))
}

/// Parses serialized settings. Only a JSON object is accepted.
pub fn parse_blob(descriptor: &KindDescriptor, field: &'static str, text: &str) -> Result<Value, ValidationError> {
    let malformed = |message: String| ValidationError::MalformedJson {
        kind: descriptor.name,
        field,
        message,
    };
    match serde_json::from_str::<Value>(text) {
        Ok(value @ Value::Object(_)) => Ok(value),
        Ok(other) => Err(malformed(format!("found {}", json_type_name(&other)))),
        Err(e) => Err(malformed(e.to_string())),
    }
}

fn encode_value(spec: &FieldSpec, value: &FieldValue) -> Value {
    match (spec.ty, value) {
        (FieldType::CommaList, FieldValue::List(items)) => Value::String(
            items
                .iter()
                .filter_map(FieldValue::as_str)
                .collect::<Vec<_>>()
                .join(","),
        ),
        (FieldType::Reference, FieldValue::String(id)) => serde_json::json!({ "id": id }),
        _ => value.to_json(),
    }
}

pub fn decode(declared: &DeclaredResource, body: &[u8]) -> Result<Snapshot, DecodeError> {
    let kind = declared.descriptor().name;
    let value: Value = serde_json::from_slice(body).map_err(|source| DecodeError::InvalidJson { kind, source })?;
    decode_value(declared, value)
}

/// Folds a response entity into a snapshot.
///
/// Server list order wins. Write-only fields are dropped. Scope fields come from
/// `declared`; the server's linkage is only adopted for scope fields the
/// declared resource leaves empty.
pub fn decode_value(declared: &DeclaredResource, value: Value) -> Result<Snapshot, DecodeError> {
    let descriptor = declared.descriptor();
    let kind = descriptor.name;
    let mut object = match value {
        Value::Object(object) => object,
        other => {
            return Err(DecodeError::NotAnObject {
                kind,
                found: json_type_name(&other),
            });
        }
    };

    let id = match object.get(descriptor.id_key) {
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => {
            return Err(DecodeError::MissingIdentifier {
                kind,
                key: descriptor.id_key,
            });
        }
    };

    let mut fields = Fields::new();
    for spec in descriptor.fields {
        if spec.policy == FieldPolicy::WriteOnly {
            continue;
        }
        let Some(raw) = object.remove(spec.name) else {
            continue;
        };
        if let Some(value) = decode_field(descriptor, spec, raw)? {
            fields.insert(spec.name.to_string(), value);
        }
    }

    for scope in descriptor.scopes.fields {
        let linked = match declared.get(scope.field) {
            Some(value) => Some(value.clone()),
            None => object.get(scope.response_key).and_then(linkage_value),
        };
        if let Some(value) = linked {
            fields.insert(scope.field.to_string(), value);
        }
    }

    Ok(Snapshot { id, fields })
}

fn linkage_value(value: &Value) -> Option<FieldValue> {
    match value {
        Value::String(s) if !s.is_empty() => Some(FieldValue::String(s.clone())),
        Value::Object(map) => map
            .get("id")
            .and_then(Value::as_str)
            .map(|id| FieldValue::String(id.to_string())),
        _ => None,
    }
}

fn decode_field(descriptor: &KindDescriptor, spec: &FieldSpec, raw: Value) -> Result<Option<FieldValue>, DecodeError> {
    let mismatch = |found: &'static str| DecodeError::UnexpectedType {
        kind: descriptor.name,
        field: spec.name.to_string(),
        expected: spec.ty.name(),
        found,
    };

    let value = match (spec.ty, raw) {
        (_, Value::Null) => return Ok(None),
        (FieldType::String, Value::String(s)) => FieldValue::String(s),
        (FieldType::Integer, Value::Number(n)) => {
            n.as_i64().map(FieldValue::Integer).ok_or_else(|| mismatch("number"))?
        }
        (FieldType::Boolean, Value::Bool(b)) => FieldValue::Boolean(b),
        // Lua encodes an empty array as `{}`.
        (FieldType::StringList | FieldType::IntegerList | FieldType::CommaList, Value::Object(map))
            if map.is_empty() =>
        {
            return Ok(None);
        }
        (FieldType::StringList | FieldType::CommaList, Value::Array(items)) => FieldValue::List(
            items
                .into_iter()
                .map(|item| match item {
                    Value::String(s) => Ok(FieldValue::String(s)),
                    other => Err(mismatch(json_type_name(&other))),
                })
                .collect::<Result<_, _>>()?,
        ),
        (FieldType::IntegerList, Value::Array(items)) => FieldValue::List(
            items
                .into_iter()
                .map(|item| match item.as_i64() {
                    Some(i) => Ok(FieldValue::Integer(i)),
                    None => Err(mismatch(json_type_name(&item))),
                })
                .collect::<Result<_, _>>()?,
        ),
        (FieldType::CommaList, Value::String(s)) => {
            FieldValue::strings(s.split(',').map(str::trim).filter(|s| !s.is_empty()))
        }
        (FieldType::Map, Value::Object(map)) => match FieldValue::from_json(Value::Object(map)) {
            Some(value) => value,
            None => return Ok(None),
        },
        (FieldType::Reference, Value::Object(map)) => match map.get("id") {
            Some(Value::String(id)) => FieldValue::String(id.clone()),
            _ => return Err(mismatch("object")),
        },
        (FieldType::Reference, Value::String(id)) => FieldValue::String(id),
        (_, other) => return Err(mismatch(json_type_name(&other))),
    };

    Ok(Some(value).filter(|v| !v.is_empty()))
}

/// Flattens a JSON body into dotted form keys: `config.a.b=v`, `config.list[1]=v`.
pub fn flatten_form(body: &Map<String, Value>) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    for (key, value) in body {
        flatten_into(key, value, &mut pairs);
    }
    pairs
}

fn flatten_into(prefix: &str, value: &Value, pairs: &mut Vec<(String, String)>) {
    match value {
        Value::Null => {}
        Value::Object(map) => {
            for (key, value) in map {
                flatten_into(&format!("{prefix}.{key}"), value, pairs);
            }
        }
        Value::Array(items) => {
            for (i, value) in items.iter().enumerate() {
                flatten_into(&format!("{prefix}[{}]", i + 1), value, pairs);
            }
        }
        Value::String(s) => pairs.push((prefix.to_string(), s.clone())),
        other => pairs.push((prefix.to_string(), other.to_string())),
    }
}

enum Segment {
    Key(String),
    Index(usize),
}

fn segments(key: &str) -> Vec<Segment> {
    let mut out = Vec::new();
    for part in key.split('.') {
        let (name, mut rest) = match part.find('[') {
            Some(at) => part.split_at(at),
            None => (part, ""),
        };
        if !name.is_empty() {
            out.push(Segment::Key(name.to_string()));
        }
        while let Some(inner) = rest.strip_prefix('[') {
            let Some(end) = inner.find(']') else { break };
            if let Ok(index) = inner[..end].parse::<usize>() {
                out.push(Segment::Index(index.max(1)));
            }
            rest = &inner[end + 1..];
        }
    }
    out
}

fn insert_at(target: &mut Value, path: &[Segment], leaf: Value) {
    match path.split_first() {
        None => *target = leaf,
        Some((Segment::Key(key), rest)) => {
            if !target.is_object() {
                *target = Value::Object(Map::new());
            }
            if let Value::Object(map) = target {
                insert_at(map.entry(key.clone()).or_insert(Value::Null), rest, leaf);
            }
        }
        Some((Segment::Index(index), rest)) => {
            if !target.is_array() {
                *target = Value::Array(Vec::new());
            }
            if let Value::Array(items) = target {
                if items.len() < *index {
                    items.resize(*index, Value::Null);
                }
                insert_at(&mut items[*index - 1], rest, leaf);
            }
        }
    }
}

/// Rebuilds the JSON shape of form pairs. Integer and boolean literals are coerced.
pub fn unflatten_form(pairs: &[(String, String)]) -> Value {
    let mut root = Value::Object(Map::new());
    for (key, raw) in pairs {
        let leaf = if let Ok(b) = raw.parse::<bool>() {
            Value::Bool(b)
        } else if let Ok(i) = raw.parse::<i64>() {
            Value::Number(i.into())
        } else {
            Value::String(raw.clone())
        };
        insert_at(&mut root, &segments(key), leaf);
    }
    root
}
