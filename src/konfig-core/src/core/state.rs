use konfig_errors::ValidationError;
use serde::{Deserialize, Serialize};

use crate::models::{KindDescriptor, Snapshot};

/// Tracked state of one declared instance.
///
/// Creating, Updating and Deleting only exist for the duration of a single
/// round trip, so they are not stored.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum EntityState {
    #[default]
    Absent,
    Present(Snapshot),
}

impl EntityState {
    pub fn label(&self) -> &'static str {
        match self {
            EntityState::Absent => "absent",
            EntityState::Present(_) => "present",
        }
    }

    pub fn snapshot(&self) -> Option<&Snapshot> {
        match self {
            EntityState::Absent => None,
            EntityState::Present(snapshot) => Some(snapshot),
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.snapshot().map(|s| s.id.as_str())
    }

    pub fn is_present(&self) -> bool {
        matches!(self, EntityState::Present(_))
    }

    pub fn require_absent(&self, descriptor: &KindDescriptor, operation: &'static str) -> Result<(), ValidationError> {
        match self {
            EntityState::Absent => Ok(()),
            EntityState::Present(_) => Err(self.invalid(descriptor, operation)),
        }
    }

    pub fn require_present(
        &self,
        descriptor: &KindDescriptor,
        operation: &'static str,
    ) -> Result<&Snapshot, ValidationError> {
        self.snapshot().ok_or_else(|| self.invalid(descriptor, operation))
    }

    fn invalid(&self, descriptor: &KindDescriptor, operation: &'static str) -> ValidationError {
        ValidationError::InvalidTransition {
            kind: descriptor.name,
            operation,
            state: self.label(),
        }
    }
}
