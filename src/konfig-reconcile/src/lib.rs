mod reconciler;

pub use reconciler::*;

use konfig_client::{ClientConfig, HttpTransport, Transport};
use konfig_core::{DeclaredResource, EntityKind, EntityState, Snapshot};
use konfig_errors::TransportError;
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CreateOutcome {
    Created { snapshot: Snapshot },
    /// The remote already holds a conflicting entity; adopt it through import
    /// instead of retrying creation.
    NeedsImport { status_line: String, body: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReadOutcome {
    Present { snapshot: Snapshot },
    /// 404: tracked state was cleared.
    Gone,
    /// Add/remove-only kind; nothing was sent.
    Unsupported,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum UpdateOutcome {
    Updated { snapshot: Snapshot },
    Unsupported,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DeleteOutcome {
    Deleted,
    AlreadyAbsent,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Imported {
    pub declared: DeclaredResource,
    pub state: EntityState,
    pub outcome: ReadOutcome,
}

/// Hands out reconcilers that share one transport.
#[derive(Clone)]
pub struct Provider {
    transport: Arc<dyn Transport>,
}

impl Provider {
    pub fn new(config: &ClientConfig) -> Result<Self, TransportError> {
        Ok(Self::with_transport(Arc::new(HttpTransport::new(config)?)))
    }

    pub fn with_transport(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    pub fn reconciler(&self, kind: EntityKind) -> EntityReconciler {
        EntityReconciler::new(kind.descriptor(), self.transport.clone())
    }
}
