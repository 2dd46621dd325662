use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::FieldValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Api,
    Service,
    Route,
    Consumer,
    Plugin,
    AclGroup,
    BasicAuthCredential,
    KeyAuthCredential,
    JwtCredential,
    Upstream,
    Target,
    Certificate,
    CaCertificate,
    Sni,
}

impl EntityKind {
    pub const ALL: [EntityKind; 14] = [
        EntityKind::Api,
        EntityKind::Service,
        EntityKind::Route,
        EntityKind::Consumer,
        EntityKind::Plugin,
        EntityKind::AclGroup,
        EntityKind::BasicAuthCredential,
        EntityKind::KeyAuthCredential,
        EntityKind::JwtCredential,
        EntityKind::Upstream,
        EntityKind::Target,
        EntityKind::Certificate,
        EntityKind::CaCertificate,
        EntityKind::Sni,
    ];

    pub fn as_str(&self) -> &'static str {
        self.descriptor().name
    }

    pub fn descriptor(&self) -> &'static KindDescriptor {
        match self {
            EntityKind::Api => &API,
            EntityKind::Service => &SERVICE,
            EntityKind::Route => &ROUTE,
            EntityKind::Consumer => &CONSUMER,
            EntityKind::Plugin => &PLUGIN,
            EntityKind::AclGroup => &ACL_GROUP,
            EntityKind::BasicAuthCredential => &BASIC_AUTH_CREDENTIAL,
            EntityKind::KeyAuthCredential => &KEY_AUTH_CREDENTIAL,
            EntityKind::JwtCredential => &JWT_CREDENTIAL,
            EntityKind::Upstream => &UPSTREAM,
            EntityKind::Target => &TARGET,
            EntityKind::Certificate => &CERTIFICATE,
            EntityKind::CaCertificate => &CA_CERTIFICATE,
            EntityKind::Sni => &SNI,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    String,
    Integer,
    Boolean,
    StringList,
    IntegerList,
    /// Declared as a list, sent comma-joined.
    CommaList,
    Map,
    /// Foreign key sent as `{"id": ...}`.
    Reference,
}

impl FieldType {
    pub fn name(&self) -> &'static str {
        match self {
            FieldType::String => "a string",
            FieldType::Integer => "an integer",
            FieldType::Boolean => "a boolean",
            FieldType::StringList => "a list of strings",
            FieldType::IntegerList => "a list of integers",
            FieldType::CommaList => "a list of strings",
            FieldType::Map => "a map",
            FieldType::Reference => "an identifier string",
        }
    }

    /// Whether a declared value has the right shape for this field.
    pub fn accepts(&self, value: &FieldValue) -> bool {
        match (self, value) {
            (FieldType::String | FieldType::Reference | FieldType::CommaList, FieldValue::String(_)) => true,
            (FieldType::Integer, FieldValue::Integer(_)) => true,
            (FieldType::Boolean, FieldValue::Boolean(_)) => true,
            (FieldType::StringList | FieldType::CommaList, FieldValue::List(items)) => {
                items.iter().all(|v| matches!(v, FieldValue::String(_)))
            }
            (FieldType::IntegerList, FieldValue::List(items)) => {
                items.iter().all(|v| matches!(v, FieldValue::Integer(_)))
            }
            (FieldType::Map, FieldValue::Map(_)) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldPolicy {
    /// Must be non-empty at encode time.
    Required,
    /// Omitted from requests when unset.
    Optional,
    /// Optional, and the server fills it in when unset.
    Computed,
    /// Sent on write, never kept in tracked state.
    WriteOnly,
}

/// Extra ways two values of one field may be considered equal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Equivalence {
    /// Surrounding whitespace is insignificant.
    Trimmed,
    /// Two-element list in either order; unset equals `default`.
    UnorderedPair { default: &'static [&'static str] },
    /// Structured map vs serialized JSON text.
    Blob,
    DefaultString(&'static str),
    DefaultInteger(i64),
    /// Unset while the named shorthand field is declared.
    ExpandedFrom(&'static str),
    /// Unset when the value rebuilds from `protocol://host[:port]path`.
    ShorthandUrl,
    /// Values equal after stripping the suffix.
    Suffix(&'static str),
    /// Plain value vs `sha1_hex(value + <salt field>)`.
    SaltedDigest { salt: &'static str },
    /// Not compared while the named field is set.
    SuppressedBy(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub ty: FieldType,
    pub policy: FieldPolicy,
    pub rules: &'static [Equivalence],
}

impl FieldSpec {
    pub const fn required(name: &'static str, ty: FieldType) -> Self {
        Self { name, ty, policy: FieldPolicy::Required, rules: &[] }
    }

    pub const fn optional(name: &'static str, ty: FieldType) -> Self {
        Self { name, ty, policy: FieldPolicy::Optional, rules: &[] }
    }

    pub const fn computed(name: &'static str, ty: FieldType) -> Self {
        Self { name, ty, policy: FieldPolicy::Computed, rules: &[] }
    }

    pub const fn write_only(name: &'static str, ty: FieldType) -> Self {
        Self { name, ty, policy: FieldPolicy::WriteOnly, rules: &[] }
    }

    pub const fn with(self, rules: &'static [Equivalence]) -> Self {
        Self { rules, ..self }
    }
}

/// How a scope reference reaches the remote API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Linkage {
    /// Every request lives under `{parent}/{value}/`.
    Nested { parent: &'static str },
    /// Only creation is nested under `{parent}/{value}/`; item paths stay flat.
    CreatePath { parent: &'static str },
    /// Embedded as `{"id": value}` under `key`, or `{name_key: value}` when the
    /// value is not a UUID and the referenced kind can be looked up by name.
    BodyRef { key: &'static str, name_key: Option<&'static str> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopeSpec {
    pub field: &'static str,
    pub linkage: Linkage,
    /// Key under which the server reports the linkage.
    pub response_key: &'static str,
}

/// Scope fields in precedence order. At most one may be set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopeRules {
    pub fields: &'static [ScopeSpec],
    pub required: bool,
}

impl ScopeRules {
    pub const NONE: ScopeRules = ScopeRules { fields: &[], required: false };

    pub fn field_names(&self) -> Vec<&'static str> {
        self.fields.iter().map(|s| s.field).collect()
    }

    pub fn get(&self, field: &str) -> Option<&ScopeSpec> {
        self.fields.iter().find(|s| s.field == field)
    }
}

/// A structured field that may instead be declared as serialized JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Alternative {
    pub structured: &'static str,
    pub serialized: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub read: bool,
    pub update: bool,
}

impl Capabilities {
    pub const FULL: Capabilities = Capabilities { read: true, update: true };
    pub const ADD_REMOVE: Capabilities = Capabilities { read: false, update: false };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportStyle {
    Unsupported,
    /// The key is the identifier itself.
    Identifier,
    /// `<parent>/<child>`, the parent token filling the named scope field.
    Composite { parent: &'static str },
}

#[derive(Debug)]
pub struct KindDescriptor {
    pub kind: EntityKind,
    pub name: &'static str,
    pub collection: &'static str,
    /// Response key holding the identifier; a few kinds are keyed by name.
    pub id_key: &'static str,
    pub fields: &'static [FieldSpec],
    pub scopes: ScopeRules,
    pub alternatives: &'static [Alternative],
    pub capabilities: Capabilities,
    pub import: ImportStyle,
    /// Structured settings go form-encoded when created under a legacy parent.
    pub legacy_form: bool,
}

impl KindDescriptor {
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn alternative_for_serialized(&self, name: &str) -> Option<&Alternative> {
        self.alternatives.iter().find(|a| a.serialized == name)
    }

    pub fn alternative_for_structured(&self, name: &str) -> Option<&Alternative> {
        self.alternatives.iter().find(|a| a.structured == name)
    }

    /// Every key a declared resource of this kind may carry.
    pub fn knows(&self, name: &str) -> bool {
        self.field(name).is_some()
            || self.scopes.get(name).is_some()
            || self.alternative_for_serialized(name).is_some()
    }
}

use Equivalence::*;
use FieldType as T;

const HTTP_PAIR: &[&str] = &["http", "https"];

pub static API: KindDescriptor = KindDescriptor {
    kind: EntityKind::Api,
    name: "api",
    collection: "apis",
    id_key: "id",
    fields: &[
        FieldSpec::required("name", T::String),
        FieldSpec::optional("hosts", T::CommaList),
        FieldSpec::optional("uris", T::CommaList),
        FieldSpec::optional("methods", T::CommaList),
        FieldSpec::required("upstream_url", T::String),
        FieldSpec::computed("strip_uri", T::Boolean),
        FieldSpec::computed("preserve_host", T::Boolean),
        FieldSpec::computed("retries", T::Integer),
        FieldSpec::computed("upstream_connect_timeout", T::Integer),
        FieldSpec::computed("upstream_send_timeout", T::Integer),
        FieldSpec::computed("upstream_read_timeout", T::Integer),
        FieldSpec::computed("https_only", T::Boolean),
        FieldSpec::computed("http_if_terminated", T::Boolean),
    ],
    scopes: ScopeRules::NONE,
    alternatives: &[],
    capabilities: Capabilities::FULL,
    import: ImportStyle::Identifier,
    legacy_form: false,
};

pub static SERVICE: KindDescriptor = KindDescriptor {
    kind: EntityKind::Service,
    name: "service",
    collection: "services",
    id_key: "id",
    fields: &[
        FieldSpec::optional("name", T::String),
        FieldSpec::computed("protocol", T::String).with(&[DefaultString("http"), ExpandedFrom("url")]),
        FieldSpec::computed("host", T::String).with(&[ExpandedFrom("url")]),
        FieldSpec::computed("port", T::Integer).with(&[DefaultInteger(80), ExpandedFrom("url")]),
        FieldSpec::computed("path", T::String).with(&[ExpandedFrom("url")]),
        FieldSpec::computed("retries", T::Integer).with(&[DefaultInteger(5)]),
        FieldSpec::computed("connect_timeout", T::Integer).with(&[DefaultInteger(60000)]),
        FieldSpec::computed("write_timeout", T::Integer).with(&[DefaultInteger(60000)]),
        FieldSpec::computed("read_timeout", T::Integer).with(&[DefaultInteger(60000)]),
        FieldSpec::optional("tags", T::StringList),
        FieldSpec::write_only("url", T::String).with(&[ShorthandUrl]),
    ],
    scopes: ScopeRules::NONE,
    alternatives: &[],
    capabilities: Capabilities::FULL,
    import: ImportStyle::Identifier,
    legacy_form: false,
};

pub static ROUTE: KindDescriptor = KindDescriptor {
    kind: EntityKind::Route,
    name: "route",
    collection: "routes",
    id_key: "id",
    fields: &[
        FieldSpec::optional("name", T::String),
        FieldSpec::optional("protocols", T::StringList).with(&[UnorderedPair { default: HTTP_PAIR }]),
        FieldSpec::optional("methods", T::StringList),
        FieldSpec::optional("hosts", T::StringList),
        FieldSpec::optional("paths", T::StringList),
        FieldSpec::computed("strip_path", T::Boolean),
        FieldSpec::computed("preserve_host", T::Boolean),
        FieldSpec::computed("regex_priority", T::Integer),
        FieldSpec::optional("tags", T::StringList),
    ],
    scopes: ScopeRules {
        fields: &[ScopeSpec {
            field: "service",
            linkage: Linkage::BodyRef { key: "service", name_key: Some("name") },
            response_key: "service",
        }],
        required: true,
    },
    alternatives: &[],
    capabilities: Capabilities::FULL,
    import: ImportStyle::Identifier,
    legacy_form: false,
};

pub static CONSUMER: KindDescriptor = KindDescriptor {
    kind: EntityKind::Consumer,
    name: "consumer",
    collection: "consumers",
    id_key: "id",
    fields: &[
        FieldSpec::optional("username", T::String),
        FieldSpec::optional("custom_id", T::String),
        FieldSpec::optional("tags", T::StringList),
    ],
    scopes: ScopeRules::NONE,
    alternatives: &[],
    capabilities: Capabilities::FULL,
    import: ImportStyle::Identifier,
    legacy_form: false,
};

pub static PLUGIN: KindDescriptor = KindDescriptor {
    kind: EntityKind::Plugin,
    name: "plugin",
    collection: "plugins",
    id_key: "id",
    fields: &[
        FieldSpec::required("name", T::String),
        FieldSpec::computed("enabled", T::Boolean),
        FieldSpec::computed("config", T::Map).with(&[Blob]),
        FieldSpec::optional("tags", T::StringList),
    ],
    scopes: ScopeRules {
        fields: &[
            ScopeSpec {
                field: "api",
                linkage: Linkage::CreatePath { parent: "apis" },
                response_key: "api_id",
            },
            ScopeSpec {
                field: "service",
                linkage: Linkage::BodyRef { key: "service", name_key: Some("name") },
                response_key: "service",
            },
            ScopeSpec {
                field: "route",
                linkage: Linkage::BodyRef { key: "route", name_key: Some("name") },
                response_key: "route",
            },
            ScopeSpec {
                field: "consumer",
                linkage: Linkage::BodyRef { key: "consumer", name_key: Some("username") },
                response_key: "consumer",
            },
        ],
        required: false,
    },
    alternatives: &[Alternative { structured: "config", serialized: "config_json" }],
    capabilities: Capabilities::FULL,
    import: ImportStyle::Identifier,
    legacy_form: true,
};

const CONSUMER_SCOPE: ScopeRules = ScopeRules {
    fields: &[ScopeSpec {
        field: "consumer",
        linkage: Linkage::Nested { parent: "consumers" },
        response_key: "consumer",
    }],
    required: true,
};

pub static ACL_GROUP: KindDescriptor = KindDescriptor {
    kind: EntityKind::AclGroup,
    name: "acl_group",
    collection: "acls",
    id_key: "id",
    fields: &[
        FieldSpec::required("group", T::String),
        FieldSpec::optional("tags", T::StringList),
    ],
    scopes: CONSUMER_SCOPE,
    alternatives: &[],
    capabilities: Capabilities::FULL,
    import: ImportStyle::Composite { parent: "consumer" },
    legacy_form: false,
};

pub static BASIC_AUTH_CREDENTIAL: KindDescriptor = KindDescriptor {
    kind: EntityKind::BasicAuthCredential,
    name: "basic_auth_credential",
    collection: "basic-auth",
    id_key: "id",
    fields: &[
        FieldSpec::required("username", T::String),
        FieldSpec::required("password", T::String).with(&[SaltedDigest { salt: "consumer" }]),
        FieldSpec::optional("tags", T::StringList),
    ],
    scopes: CONSUMER_SCOPE,
    alternatives: &[],
    capabilities: Capabilities::FULL,
    import: ImportStyle::Composite { parent: "consumer" },
    legacy_form: false,
};

pub static KEY_AUTH_CREDENTIAL: KindDescriptor = KindDescriptor {
    kind: EntityKind::KeyAuthCredential,
    name: "key_auth_credential",
    collection: "key-auth",
    id_key: "id",
    fields: &[
        FieldSpec::computed("key", T::String),
        FieldSpec::optional("tags", T::StringList),
    ],
    scopes: CONSUMER_SCOPE,
    alternatives: &[],
    capabilities: Capabilities::FULL,
    import: ImportStyle::Composite { parent: "consumer" },
    legacy_form: false,
};

pub static JWT_CREDENTIAL: KindDescriptor = KindDescriptor {
    kind: EntityKind::JwtCredential,
    name: "jwt_credential",
    collection: "jwt",
    id_key: "id",
    fields: &[
        FieldSpec::computed("key", T::String),
        FieldSpec::computed("algorithm", T::String).with(&[DefaultString("HS256")]),
        FieldSpec::optional("rsa_public_key", T::String).with(&[Trimmed]),
        FieldSpec::computed("secret", T::String).with(&[SuppressedBy("rsa_public_key")]),
        FieldSpec::optional("tags", T::StringList),
    ],
    scopes: CONSUMER_SCOPE,
    alternatives: &[],
    capabilities: Capabilities::FULL,
    import: ImportStyle::Composite { parent: "consumer" },
    legacy_form: false,
};

pub static UPSTREAM: KindDescriptor = KindDescriptor {
    kind: EntityKind::Upstream,
    name: "upstream",
    collection: "upstreams",
    id_key: "id",
    fields: &[
        FieldSpec::required("name", T::String),
        FieldSpec::computed("slots", T::Integer).with(&[DefaultInteger(10000)]),
        FieldSpec::computed("algorithm", T::String).with(&[DefaultString("round-robin")]),
        FieldSpec::computed("hash_on", T::String).with(&[DefaultString("none")]),
        FieldSpec::computed("hash_fallback", T::String).with(&[DefaultString("none")]),
        FieldSpec::optional("hash_on_header", T::String),
        FieldSpec::optional("hash_fallback_header", T::String),
        FieldSpec::optional("hash_on_cookie", T::String),
        FieldSpec::computed("hash_on_cookie_path", T::String).with(&[DefaultString("/")]),
        FieldSpec::optional("host_header", T::String),
        FieldSpec::computed("healthchecks", T::Map).with(&[Blob]),
        FieldSpec::optional("client_certificate", T::Reference),
        FieldSpec::optional("tags", T::StringList),
    ],
    scopes: ScopeRules::NONE,
    alternatives: &[Alternative { structured: "healthchecks", serialized: "healthchecks_json" }],
    capabilities: Capabilities::FULL,
    import: ImportStyle::Identifier,
    legacy_form: false,
};

pub static TARGET: KindDescriptor = KindDescriptor {
    kind: EntityKind::Target,
    name: "target",
    collection: "targets",
    id_key: "id",
    fields: &[
        FieldSpec::required("target", T::String).with(&[Suffix(":8000")]),
        FieldSpec::computed("weight", T::Integer).with(&[DefaultInteger(100)]),
        FieldSpec::optional("tags", T::StringList),
    ],
    scopes: ScopeRules {
        fields: &[ScopeSpec {
            field: "upstream",
            linkage: Linkage::Nested { parent: "upstreams" },
            response_key: "upstream",
        }],
        required: true,
    },
    alternatives: &[],
    capabilities: Capabilities::ADD_REMOVE,
    import: ImportStyle::Unsupported,
    legacy_form: false,
};

pub static CERTIFICATE: KindDescriptor = KindDescriptor {
    kind: EntityKind::Certificate,
    name: "certificate",
    collection: "certificates",
    id_key: "id",
    fields: &[
        FieldSpec::required("cert", T::String).with(&[Trimmed]),
        FieldSpec::required("key", T::String).with(&[Trimmed]),
        FieldSpec::optional("cert_alt", T::String).with(&[Trimmed]),
        FieldSpec::optional("key_alt", T::String).with(&[Trimmed]),
        FieldSpec::optional("snis", T::StringList),
        FieldSpec::optional("tags", T::StringList),
    ],
    scopes: ScopeRules::NONE,
    alternatives: &[],
    capabilities: Capabilities::FULL,
    import: ImportStyle::Identifier,
    legacy_form: false,
};

pub static CA_CERTIFICATE: KindDescriptor = KindDescriptor {
    kind: EntityKind::CaCertificate,
    name: "ca_certificate",
    collection: "ca_certificates",
    id_key: "id",
    fields: &[
        FieldSpec::required("cert", T::String).with(&[Trimmed]),
        FieldSpec::computed("cert_digest", T::String),
        FieldSpec::optional("tags", T::StringList),
    ],
    scopes: ScopeRules::NONE,
    alternatives: &[],
    capabilities: Capabilities::FULL,
    import: ImportStyle::Identifier,
    legacy_form: false,
};

pub static SNI: KindDescriptor = KindDescriptor {
    kind: EntityKind::Sni,
    name: "sni",
    collection: "snis",
    id_key: "name",
    fields: &[
        FieldSpec::required("name", T::String),
        FieldSpec::required("certificate", T::Reference),
        FieldSpec::optional("tags", T::StringList),
    ],
    scopes: ScopeRules::NONE,
    alternatives: &[],
    capabilities: Capabilities::FULL,
    import: ImportStyle::Identifier,
    legacy_form: false,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_kind_resolves_to_its_own_descriptor() {
        for kind in EntityKind::ALL {
            assert_eq!(kind.descriptor().kind, kind);
        }
    }

    #[test]
    fn kind_names_match_serde_tags() {
        for kind in EntityKind::ALL {
            let tag = serde_json::to_value(kind).unwrap();
            assert_eq!(tag.as_str(), Some(kind.as_str()));
        }
    }

    #[test]
    fn only_targets_are_add_remove() {
        for kind in EntityKind::ALL {
            let caps = kind.descriptor().capabilities;
            assert_eq!(caps == Capabilities::ADD_REMOVE, kind == EntityKind::Target, "{kind}");
        }
    }

    #[test]
    fn declared_keys_cover_scopes_and_alternatives() {
        assert!(PLUGIN.knows("config_json"));
        assert!(PLUGIN.knows("route"));
        assert!(!PLUGIN.knows("upstream"));
        assert!(TARGET.knows("upstream"));
    }
}
