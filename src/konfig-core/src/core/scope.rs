use konfig_errors::ValidationError;
use serde_json::{Map, Value};
use tracing::trace;
use uuid::Uuid;

use crate::models::{DeclaredResource, KindDescriptor, Linkage, ScopeRef, ScopeSpec};

/// The one parent relationship a declared resource resolved to.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub field: Option<&'static str>,
    pub scope: ScopeRef,
    pub linkage: Option<Linkage>,
    collection: &'static str,
}

impl Resolution {
    pub fn unscoped(descriptor: &KindDescriptor) -> Self {
        Self {
            field: None,
            scope: ScopeRef::None,
            linkage: None,
            collection: descriptor.collection,
        }
    }

    /// Path segments for the create request.
    pub fn path_segments(&self) -> Vec<String> {
        match (self.linkage, self.scope.value()) {
            (Some(Linkage::Nested { parent } | Linkage::CreatePath { parent }), Some(value)) => {
                vec![parent.to_string(), value.to_string(), self.collection.to_string()]
            }
            _ => vec![self.collection.to_string()],
        }
    }

    pub fn create_path(&self) -> String {
        self.path_segments().join("/")
    }

    /// Path addressing an existing entity.
    pub fn item_path(&self, id: &str) -> String {
        match (self.linkage, self.scope.value()) {
            (Some(Linkage::Nested { parent }), Some(value)) => {
                format!("{parent}/{value}/{}/{id}", self.collection)
            }
            _ => format!("{}/{id}", self.collection),
        }
    }

    /// Reference object to embed in the request body, if the linkage is body-borne.
    pub fn body_linkage(&self) -> Option<(&'static str, Value)> {
        let Some(Linkage::BodyRef { key, name_key }) = self.linkage else {
            return None;
        };
        let mut reference = Map::new();
        match (&self.scope, name_key) {
            (ScopeRef::Name(name), Some(name_key)) => {
                reference.insert(name_key.to_string(), Value::String(name.clone()));
            }
            (scope, _) => {
                reference.insert("id".to_string(), Value::String(scope.value()?.to_string()));
            }
        }
        Some((key, Value::Object(reference)))
    }

    /// Created under a parent path of the older API generation.
    pub fn is_legacy_path(&self) -> bool {
        matches!(self.linkage, Some(Linkage::CreatePath { .. })) && self.scope.value().is_some()
    }
}

/// Picks the single active scope reference of `declared`.
///
/// Two or more populated scope fields is an error; precedence order is never
/// used to break the tie.
pub fn resolve(declared: &DeclaredResource) -> Result<Resolution, ValidationError> {
    resolve_with(declared, declared.descriptor().scopes.required)
}

/// Resolution for addressing an existing entity by identifier.
///
/// A missing scope is only an error when it nests the item path; body and
/// create-path linkage never appear in `{collection}/{id}`.
pub fn resolve_item(declared: &DeclaredResource) -> Result<Resolution, ValidationError> {
    let rules = &declared.descriptor().scopes;
    let nested = rules.fields.iter().any(|s| matches!(s.linkage, Linkage::Nested { .. }));
    resolve_with(declared, rules.required && nested)
}

fn resolve_with(declared: &DeclaredResource, required: bool) -> Result<Resolution, ValidationError> {
    let descriptor = declared.descriptor();
    let rules = &descriptor.scopes;
    let populated: Vec<&ScopeSpec> = rules.fields.iter().filter(|s| declared.is_set(s.field)).collect();

    if populated.len() > 1 {
        return Err(ValidationError::AmbiguousScope {
            kind: descriptor.name,
            fields: populated.iter().map(|s| s.field).collect(),
        });
    }

    let Some(spec) = populated.first() else {
        if required {
            return Err(ValidationError::MissingScope {
                kind: descriptor.name,
                expected: rules.field_names(),
            });
        }
        return Ok(Resolution::unscoped(descriptor));
    };

    let value = declared.get_str(spec.field).ok_or_else(|| ValidationError::TypeMismatch {
        kind: descriptor.name,
        field: spec.field.to_string(),
        expected: "an identifier string",
    })?;

    let scope = match spec.linkage {
        Linkage::BodyRef { name_key: Some(_), .. } if Uuid::parse_str(value).is_err() => {
            ScopeRef::Name(value.to_string())
        }
        _ => ScopeRef::Id(value.to_string()),
    };
    trace!("{} scoped by {} = {:?}", descriptor.name, spec.field, scope);

    Ok(Resolution {
        field: Some(spec.field),
        scope,
        linkage: Some(spec.linkage),
        collection: descriptor.collection,
    })
}
