use konfig_errors::ValidationError;

use crate::core::EntityState;
use crate::models::{DeclaredResource, ImportStyle, KindDescriptor, Snapshot};

/// A `<parent>/<child>` adoption key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportKey {
    pub parent: String,
    pub child: String,
}

/// Splits on exactly one `/`. Both tokens must be non-empty.
pub fn parse(key: &str) -> Result<ImportKey, ValidationError> {
    let invalid = || ValidationError::InvalidImportKey { key: key.to_string() };
    let mut parts = key.split('/');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(parent), Some(child), None) if !parent.is_empty() && !child.is_empty() => Ok(ImportKey {
            parent: parent.to_string(),
            child: child.to_string(),
        }),
        _ => Err(invalid()),
    }
}

/// Builds the synthetic declared resource and provisional state that a read
/// then hydrates. No I/O happens here.
pub fn adopt(descriptor: &KindDescriptor, key: &str) -> Result<(DeclaredResource, EntityState), ValidationError> {
    let declared = DeclaredResource::new(descriptor.kind);
    match descriptor.import {
        ImportStyle::Unsupported => Err(ValidationError::ImportUnsupported { kind: descriptor.name }),
        ImportStyle::Identifier => {
            if key.is_empty() || key.contains('/') {
                return Err(ValidationError::InvalidImportKey { key: key.to_string() });
            }
            Ok((declared, EntityState::Present(Snapshot::new(key))))
        }
        ImportStyle::Composite { parent } => {
            let ImportKey { parent: parent_token, child } = parse(key)?;
            Ok((
                declared.with(parent, parent_token),
                EntityState::Present(Snapshot::new(child)),
            ))
        }
    }
}
