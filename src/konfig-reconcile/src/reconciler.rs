use http::{Method, StatusCode};
use konfig_client::{AdminResponse, Transport};
use konfig_core::{
    adopt, decode, drift, encode, resolve, resolve_item, DeclaredResource, EntityState, KindDescriptor, RequestBody, Snapshot,
};
use konfig_errors::{ReconcileError, Result, ValidationError};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::{CreateOutcome, DeleteOutcome, Imported, ReadOutcome, UpdateOutcome};

/// Create/read/update/delete for one entity kind, driven by its descriptor.
///
/// Every call is a single round trip and never retries. Tracked state is only
/// written after a response has been fully decoded; on any error it is left as
/// it was.
#[derive(Clone)]
pub struct EntityReconciler {
    descriptor: &'static KindDescriptor,
    transport: Arc<dyn Transport>,
}

impl EntityReconciler {
    pub fn new(descriptor: &'static KindDescriptor, transport: Arc<dyn Transport>) -> Self {
        Self { descriptor, transport }
    }

    pub fn descriptor(&self) -> &'static KindDescriptor {
        self.descriptor
    }

    fn check_kind(&self, declared: &DeclaredResource) -> Result<()> {
        if declared.kind != self.descriptor.kind {
            return Err(ValidationError::KindMismatch {
                expected: self.descriptor.name,
                found: declared.kind.as_str(),
            }
            .into());
        }
        Ok(())
    }

    async fn send(&self, method: Method, path: &str, body: RequestBody) -> Result<AdminResponse> {
        debug!("{} {} {}", self.descriptor.name, method, path);
        Ok(self.transport.request(method, path, body).await?)
    }

    fn rejected(&self, response: &AdminResponse) -> ReconcileError {
        let err = ReconcileError::remote(response.status.as_u16(), response.status.canonical_reason(), &response.body);
        warn!("{} rejected: {}", self.descriptor.name, err);
        err
    }

    /// Absent -> Present. A 409 leaves the instance Absent and asks for import.
    #[instrument(skip_all, fields(kind = self.descriptor.name))]
    pub async fn create(&self, declared: &DeclaredResource, state: &mut EntityState) -> Result<CreateOutcome> {
        self.check_kind(declared)?;
        state.require_absent(self.descriptor, "create")?;
        let resolution = resolve(declared)?;
        let body = encode(declared, &resolution)?;

        let response = self.send(Method::POST, &resolution.create_path(), body).await?;
        match response.status {
            StatusCode::OK | StatusCode::CREATED => {
                let snapshot = decode(declared, &response.body)?;
                info!("{} created with id {}", self.descriptor.name, snapshot.id);
                *state = EntityState::Present(snapshot.clone());
                Ok(CreateOutcome::Created { snapshot })
            }
            StatusCode::CONFLICT => {
                info!("{} already exists remotely; needs import", self.descriptor.name);
                Ok(CreateOutcome::NeedsImport {
                    status_line: response.status_line(),
                    body: String::from_utf8_lossy(&response.body).into_owned(),
                })
            }
            _ => Err(self.rejected(&response)),
        }
    }

    /// Refreshes the snapshot. A 404 clears tracked state without error.
    #[instrument(skip_all, fields(kind = self.descriptor.name))]
    pub async fn read(&self, declared: &DeclaredResource, state: &mut EntityState) -> Result<ReadOutcome> {
        self.check_kind(declared)?;
        let id = state.require_present(self.descriptor, "read")?.id.clone();
        if !self.descriptor.capabilities.read {
            debug!("{} has no remote read; keeping tracked state", self.descriptor.name);
            return Ok(ReadOutcome::Unsupported);
        }
        let resolution = resolve_item(declared)?;

        let response = self.send(Method::GET, &resolution.item_path(&id), RequestBody::Empty).await?;
        match response.status {
            StatusCode::OK => {
                let snapshot = decode(declared, &response.body)?;
                *state = EntityState::Present(snapshot.clone());
                Ok(ReadOutcome::Present { snapshot })
            }
            StatusCode::NOT_FOUND => {
                info!("{} {} is gone remotely; clearing tracked state", self.descriptor.name, id);
                *state = EntityState::Absent;
                Ok(ReadOutcome::Gone)
            }
            _ => Err(self.rejected(&response)),
        }
    }

    /// Present -> Present. The prior snapshot survives any failure.
    #[instrument(skip_all, fields(kind = self.descriptor.name))]
    pub async fn update(&self, declared: &DeclaredResource, state: &mut EntityState) -> Result<UpdateOutcome> {
        self.check_kind(declared)?;
        let id = state.require_present(self.descriptor, "update")?.id.clone();
        if !self.descriptor.capabilities.update {
            debug!("{} has no remote update; keeping tracked state", self.descriptor.name);
            return Ok(UpdateOutcome::Unsupported);
        }
        let resolution = resolve(declared)?;
        let body = encode(declared, &resolution)?;

        let response = self.send(Method::PATCH, &resolution.item_path(&id), body).await?;
        match response.status {
            StatusCode::OK | StatusCode::CREATED => {
                let snapshot = decode(declared, &response.body)?;
                info!("{} {} updated", self.descriptor.name, id);
                *state = EntityState::Present(snapshot.clone());
                Ok(UpdateOutcome::Updated { snapshot })
            }
            _ => Err(self.rejected(&response)),
        }
    }

    /// Present -> Absent. A 404 counts as already deleted.
    #[instrument(skip_all, fields(kind = self.descriptor.name))]
    pub async fn delete(&self, declared: &DeclaredResource, state: &mut EntityState) -> Result<DeleteOutcome> {
        self.check_kind(declared)?;
        let id = state.require_present(self.descriptor, "delete")?.id.clone();
        let resolution = resolve_item(declared)?;

        let response = self.send(Method::DELETE, &resolution.item_path(&id), RequestBody::Empty).await?;
        match response.status {
            StatusCode::OK | StatusCode::NO_CONTENT => {
                info!("{} {} deleted", self.descriptor.name, id);
                *state = EntityState::Absent;
                Ok(DeleteOutcome::Deleted)
            }
            StatusCode::NOT_FOUND => {
                *state = EntityState::Absent;
                Ok(DeleteOutcome::AlreadyAbsent)
            }
            _ => Err(self.rejected(&response)),
        }
    }

    /// Adopts an existing remote entity: parse the key, then hydrate through read.
    #[instrument(skip_all, fields(kind = self.descriptor.name, key = key))]
    pub async fn import(&self, key: &str) -> Result<Imported> {
        let (declared, mut state) = adopt(self.descriptor, key)?;
        let outcome = self.read(&declared, &mut state).await?;
        Ok(Imported { declared, state, outcome })
    }

    /// Fields that would change on update. No request is made.
    pub fn drift(&self, declared: &DeclaredResource, snapshot: &Snapshot) -> Vec<&'static str> {
        drift(declared, snapshot)
    }
}
