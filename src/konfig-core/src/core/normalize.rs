//! Drift suppression.
//!
//! Everything here is pure: two materialized representations go in, a verdict
//! comes out. Each rule is checked in both directions so the relation stays
//! symmetric, and plain equality keeps it reflexive.

use sha1::{Digest, Sha1};

use crate::models::{DeclaredResource, Equivalence, FieldPolicy, FieldSpec, FieldValue, Fields, Snapshot};

/// Compares one field. `old_fields` and `new_fields` are the complete field sets
/// each value came from, for rules that look at sibling fields.
pub fn equivalent(
    spec: &FieldSpec,
    old: Option<&FieldValue>,
    new: Option<&FieldValue>,
    old_fields: &Fields,
    new_fields: &Fields,
) -> bool {
    equivalent_in(spec.rules, old, new, old_fields, new_fields)
}

/// Compares two values under `rules` with no sibling context.
pub fn equivalent_values(rules: &[Equivalence], old: Option<&FieldValue>, new: Option<&FieldValue>) -> bool {
    let empty = Fields::new();
    equivalent_in(rules, old, new, &empty, &empty)
}

fn equivalent_in(
    rules: &[Equivalence],
    old: Option<&FieldValue>,
    new: Option<&FieldValue>,
    old_fields: &Fields,
    new_fields: &Fields,
) -> bool {
    let old = old.filter(|v| !v.is_empty());
    let new = new.filter(|v| !v.is_empty());
    if old == new {
        return true;
    }
    rules
        .iter()
        .any(|rule| holds(rule, old, new, old_fields, new_fields) || holds(rule, new, old, new_fields, old_fields))
}

fn holds(rule: &Equivalence, a: Option<&FieldValue>, b: Option<&FieldValue>, fa: &Fields, fb: &Fields) -> bool {
    use FieldValue::*;

    match *rule {
        Equivalence::Trimmed => match (a, b) {
            (Some(String(a)), Some(String(b))) => a.trim() == b.trim(),
            _ => false,
        },
        Equivalence::UnorderedPair { default } => match (a, b) {
            (Some(List(a)), Some(List(b))) => a.len() == 2 && b.len() == 2 && a[0] == b[1] && a[1] == b[0],
            (None, Some(List(b))) => is_pair(b, default),
            _ => false,
        },
        Equivalence::Blob => match (a, b) {
            (Some(map @ Map(_)), Some(String(text))) => parse_blob(text).as_ref() == Some(map),
            (Some(String(a)), Some(String(b))) => {
                let a = parse_blob(a);
                a.is_some() && a == parse_blob(b)
            }
            _ => false,
        },
        Equivalence::DefaultString(default) => matches!((a, b), (None, Some(String(b))) if b == default),
        Equivalence::DefaultInteger(default) => matches!((a, b), (None, Some(Integer(b))) if *b == default),
        Equivalence::ExpandedFrom(shorthand) => a.is_none() && (is_set(fa, shorthand) || is_set(fb, shorthand)),
        Equivalence::ShorthandUrl => match (a, b) {
            (None, Some(String(url))) => rebuilds_url(url, fa) || rebuilds_url(url, fb),
            _ => false,
        },
        Equivalence::Suffix(suffix) => match (a, b) {
            (Some(String(a)), Some(String(b))) => {
                a.strip_suffix(suffix).unwrap_or(a) == b.strip_suffix(suffix).unwrap_or(b)
            }
            _ => false,
        },
        Equivalence::SaltedDigest { salt } => match (a, b) {
            (Some(String(plain)), Some(String(digest))) => {
                let salt = text(fa, salt).or_else(|| text(fb, salt)).unwrap_or_default();
                salted_sha1(plain, salt) == *digest
            }
            _ => false,
        },
        Equivalence::SuppressedBy(field) => is_set(fa, field) || is_set(fb, field),
    }
}

fn is_pair(values: &[FieldValue], pair: &[&str]) -> bool {
    let [a, b] = values else { return false };
    let (Some(a), Some(b)) = (a.as_str(), b.as_str()) else {
        return false;
    };
    pair.len() == 2 && ((a == pair[0] && b == pair[1]) || (a == pair[1] && b == pair[0]))
}

fn parse_blob(text: &str) -> Option<FieldValue> {
    serde_json::from_str(text).ok().and_then(FieldValue::from_json)
}

fn text<'a>(fields: &'a Fields, name: &str) -> Option<&'a str> {
    fields.get(name).and_then(FieldValue::as_str).filter(|s| !s.is_empty())
}

fn is_set(fields: &Fields, name: &str) -> bool {
    fields.get(name).is_some_and(|v| !v.is_empty())
}

fn rebuilds_url(url: &str, fields: &Fields) -> bool {
    let (Some(protocol), Some(host)) = (text(fields, "protocol"), text(fields, "host")) else {
        return false;
    };
    let path = text(fields, "path").unwrap_or_default();
    if url == format!("{protocol}://{host}{path}") {
        return true;
    }
    fields
        .get("port")
        .and_then(FieldValue::as_i64)
        .is_some_and(|port| url == format!("{protocol}://{host}:{port}{path}"))
}

/// Hex SHA-1 of `value` salted with `salt`, as the gateway stores basic-auth passwords.
pub fn salted_sha1(value: &str, salt: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(value.as_bytes());
    hasher.update(salt.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Names of the fields whose declared value is not equivalent to the snapshot.
///
/// Unset computed fields are left to the server and never reported.
pub fn drift(declared: &DeclaredResource, snapshot: &Snapshot) -> Vec<&'static str> {
    let descriptor = declared.descriptor();
    let mut changed = Vec::new();

    for spec in descriptor.fields {
        let mut wanted = declared.get(spec.name).cloned();
        if let Some(alt) = descriptor.alternative_for_structured(spec.name) {
            if let Some(text) = declared.get_str(alt.serialized) {
                wanted = Some(FieldValue::String(text.to_string()));
            }
        }
        if wanted.is_none() && spec.policy == FieldPolicy::Computed {
            continue;
        }
        if !equivalent(spec, snapshot.get(spec.name), wanted.as_ref(), &snapshot.fields, &declared.fields) {
            changed.push(spec.name);
        }
    }

    for scope in descriptor.scopes.fields {
        if declared.get(scope.field) != snapshot.get(scope.field) {
            changed.push(scope.field);
        }
    }
    changed
}
