use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

use crate::models::{EntityKind, FieldValue, Fields, KindDescriptor};

/// Desired state for one entity instance. Read-only input to every operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeclaredResource {
    pub kind: EntityKind,
    #[serde(default, deserialize_with = "declared_fields")]
    pub fields: Fields,
}

/// An explicit null in declared input reads as an omitted field.
fn declared_fields<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Fields, D::Error> {
    let raw = BTreeMap::<String, Option<FieldValue>>::deserialize(deserializer)?;
    Ok(raw.into_iter().filter_map(|(field, value)| Some((field, value?))).collect())
}

impl DeclaredResource {
    pub fn new(kind: EntityKind) -> Self {
        Self { kind, fields: Fields::new() }
    }

    pub fn with(mut self, field: &str, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(field.to_string(), value.into());
        self
    }

    pub fn descriptor(&self) -> &'static KindDescriptor {
        self.kind.descriptor()
    }

    /// The value of `field` when it is set to something non-empty.
    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field).filter(|v| !v.is_empty())
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(FieldValue::as_str)
    }

    pub fn is_set(&self, field: &str) -> bool {
        self.get(field).is_some()
    }
}

/// Last known server-side representation of one entity instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: String,
    pub fields: Fields,
}

impl Snapshot {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into(), fields: Fields::new() }
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field).filter(|v| !v.is_empty())
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(FieldValue::as_str)
    }
}

/// Which parent, if any, an entity attaches to.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "by", content = "value", rename_all = "snake_case")]
pub enum ScopeRef {
    #[default]
    None,
    Id(String),
    Name(String),
}

impl ScopeRef {
    pub fn value(&self) -> Option<&str> {
        match self {
            ScopeRef::None => None,
            ScopeRef::Id(v) | ScopeRef::Name(v) => Some(v),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_values_read_as_unset() {
        let declared = DeclaredResource::new(EntityKind::Plugin)
            .with("name", "key-auth")
            .with("service", "");
        assert_eq!(declared.get_str("name"), Some("key-auth"));
        assert!(!declared.is_set("service"));
        assert!(!declared.is_set("route"));
    }

    #[test]
    fn parses_declared_yaml() {
        let declared: DeclaredResource = serde_yml::from_str(
            r#"
kind: plugin
fields:
  name: key-auth
  route: 8a6f2a4b-1f7e-4c54-9d0e-7cfd1f4b2a11
  config:
    key_names: [apikey]
"#,
        )
        .unwrap();
        assert_eq!(declared.kind, EntityKind::Plugin);
        let config = declared.get("config").and_then(FieldValue::as_map).unwrap();
        assert_eq!(config["key_names"], FieldValue::strings(["apikey"]));
    }

    #[test]
    fn null_fields_are_omitted() {
        let from_yaml: DeclaredResource =
            serde_yml::from_str("kind: route\nfields:\n  hosts: ~\n  paths: [/billing]\n").unwrap();
        let from_json: DeclaredResource =
            serde_json::from_str(r#"{"kind": "route", "fields": {"hosts": null, "paths": ["/billing"]}}"#).unwrap();

        for declared in [from_yaml, from_json] {
            assert!(!declared.fields.contains_key("hosts"));
            assert_eq!(declared.fields["paths"], FieldValue::strings(["/billing"]));
        }
    }
}
