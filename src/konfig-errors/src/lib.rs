use thiserror::Error;

pub type Result<T, E = ReconcileError> = std::result::Result<T, E>;

/// Rejected before any request leaves the process.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("{kind}: required field `{field}` is missing")]
    MissingField { kind: &'static str, field: &'static str },

    #[error("{kind}: at most one of {fields:?} may be set")]
    AmbiguousScope {
        kind: &'static str,
        fields: Vec<&'static str>,
    },

    #[error("{kind}: one of {expected:?} must be set")]
    MissingScope {
        kind: &'static str,
        expected: Vec<&'static str>,
    },

    #[error("{kind}: `{structured}` and `{serialized}` are mutually exclusive")]
    ConflictingFields {
        kind: &'static str,
        structured: &'static str,
        serialized: &'static str,
    },

    #[error("{kind}: `{field}` must be a JSON object: {message}")]
    MalformedJson {
        kind: &'static str,
        field: &'static str,
        message: String,
    },

    #[error("{kind}: field `{field}` expects {expected}")]
    TypeMismatch {
        kind: &'static str,
        field: String,
        expected: &'static str,
    },

    #[error("{kind}: unknown field `{field}`")]
    UnknownField { kind: &'static str, field: String },

    #[error("invalid import key `{key}`: expected `<parent>/<child>`")]
    InvalidImportKey { key: String },

    #[error("{kind} does not support import")]
    ImportUnsupported { kind: &'static str },

    #[error("expected a {expected} resource, got {found}")]
    KindMismatch {
        expected: &'static str,
        found: &'static str,
    },

    #[error("{kind}: cannot {operation} while {state}")]
    InvalidTransition {
        kind: &'static str,
        operation: &'static str,
        state: &'static str,
    },
}

/// The response does not have the shape the codec expects.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("{kind}: response body is not valid JSON")]
    InvalidJson {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("{kind}: expected a JSON object in response, found {found}")]
    NotAnObject { kind: &'static str, found: &'static str },

    #[error("{kind}: response field `{field}` has unexpected type: expected {expected}, found {found}")]
    UnexpectedType {
        kind: &'static str,
        field: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("{kind}: response is missing identifier `{key}`")]
    MissingIdentifier { kind: &'static str, key: &'static str },
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request to {url} failed: {message}")]
    Request {
        url: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error("invalid admin address `{address}`: {message}")]
    InvalidAddress { address: String, message: String },

    #[error("failed to build HTTP client: {message}")]
    Client { message: String },
}

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Non-2xx status outside the documented 404/409 cases. `body` is kept verbatim.
    #[error("unexpected status ({status_line}) received: {body}")]
    Remote {
        status: u16,
        status_line: String,
        body: String,
        payload: Option<serde_json::Value>,
    },

    #[error(transparent)]
    Decode(#[from] DecodeError),
}

impl ReconcileError {
    pub fn remote(status: u16, reason: Option<&str>, body: &[u8]) -> Self {
        let status_line = match reason {
            Some(reason) => format!("{status} {reason}"),
            None => status.to_string(),
        };
        let text = String::from_utf8_lossy(body).into_owned();
        let payload = serde_json::from_slice(body).ok();
        ReconcileError::Remote {
            status,
            status_line,
            body: if text.is_empty() { "(empty body)".into() } else { text },
            payload,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ReconcileError::Remote { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, ReconcileError::Validation(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_error_keeps_body_verbatim() {
        let body = br#"{"message":"schema violation","fields":{"name":"required field missing"}}"#;
        let err = ReconcileError::remote(400, Some("Bad Request"), body);
        let rendered = err.to_string();
        assert!(rendered.starts_with("unexpected status (400 Bad Request) received: "));
        assert!(rendered.ends_with(std::str::from_utf8(body).unwrap()));
        match err {
            ReconcileError::Remote { payload: Some(payload), .. } => {
                assert_eq!(payload["message"], "schema violation");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn remote_error_without_json_has_no_payload() {
        let err = ReconcileError::remote(502, None, b"");
        assert_eq!(err.status(), Some(502));
        assert_eq!(err.to_string(), "unexpected status (502) received: (empty body)");
        assert!(matches!(err, ReconcileError::Remote { payload: None, .. }));
    }

    #[test]
    fn validation_errors_convert() {
        let err: ReconcileError = ValidationError::AmbiguousScope {
            kind: "plugin",
            fields: vec!["service", "route"],
        }
        .into();
        assert!(err.is_validation());
        assert_eq!(err.to_string(), r#"plugin: at most one of ["service", "route"] may be set"#);
    }
}
