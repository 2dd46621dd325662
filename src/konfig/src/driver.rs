use anyhow::{bail, Context, Result};
use konfig_core::{DeclaredResource, EntityState, Snapshot};
use konfig_memory::Memory;
use konfig_reconcile::{CreateOutcome, Provider};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};

pub const SNAPSHOTS: &str = "snapshots";

/// One declared instance on disk: `{ name, kind, fields }`. `name` keys its
/// tracked state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceFile {
    pub name: String,
    #[serde(flatten)]
    pub declared: DeclaredResource,
}

pub struct Driver {
    provider: Provider,
    memory: Memory,
}

impl Driver {
    pub fn new(provider: Provider, memory: Memory) -> Self {
        Self { provider, memory }
    }

    fn load_state(&self, name: &str) -> Result<EntityState> {
        let snapshot: Option<Snapshot> = self
            .memory
            .get(SNAPSHOTS, name)
            .with_context(|| format!("load tracked state for {name}"))?;
        Ok(snapshot.map_or(EntityState::Absent, EntityState::Present))
    }

    fn store_state(&self, name: &str, state: &EntityState) -> Result<()> {
        let stored = match state.snapshot() {
            Some(snapshot) => self.memory.put(SNAPSHOTS, name, snapshot),
            None => self.memory.delete(SNAPSHOTS, name),
        };
        stored.with_context(|| format!("store tracked state for {name}"))
    }

    pub async fn create(&self, resource: &ResourceFile) -> Result<Value> {
        let mut state = self.load_state(&resource.name)?;
        let outcome = self
            .provider
            .reconciler(resource.declared.kind)
            .create(&resource.declared, &mut state)
            .await?;
        if let CreateOutcome::NeedsImport { .. } = &outcome {
            warn!("{} already exists remotely; run `konfig import` to adopt it", resource.name);
        }
        self.store_state(&resource.name, &state)?;
        Ok(report(resource, &state, serde_json::to_value(&outcome)?))
    }

    pub async fn read(&self, resource: &ResourceFile) -> Result<Value> {
        let mut state = self.load_state(&resource.name)?;
        let outcome = self
            .provider
            .reconciler(resource.declared.kind)
            .read(&resource.declared, &mut state)
            .await?;
        self.store_state(&resource.name, &state)?;
        Ok(report(resource, &state, serde_json::to_value(&outcome)?))
    }

    pub async fn update(&self, resource: &ResourceFile) -> Result<Value> {
        let mut state = self.load_state(&resource.name)?;
        let outcome = self
            .provider
            .reconciler(resource.declared.kind)
            .update(&resource.declared, &mut state)
            .await?;
        self.store_state(&resource.name, &state)?;
        Ok(report(resource, &state, serde_json::to_value(&outcome)?))
    }

    pub async fn delete(&self, resource: &ResourceFile) -> Result<Value> {
        let mut state = self.load_state(&resource.name)?;
        let outcome = self
            .provider
            .reconciler(resource.declared.kind)
            .delete(&resource.declared, &mut state)
            .await?;
        self.store_state(&resource.name, &state)?;
        Ok(report(resource, &state, serde_json::to_value(outcome)?))
    }

    /// Adopts a remote entity under `resource.name`. The tracked snapshot is
    /// written only when the read found it.
    pub async fn import(&self, resource: &ResourceFile, key: Option<&str>) -> Result<Value> {
        let Some(key) = key else {
            bail!("import needs --key");
        };
        if self.load_state(&resource.name)?.is_present() {
            bail!("{} is already tracked; delete its state before importing", resource.name);
        }
        let imported = self.provider.reconciler(resource.declared.kind).import(key).await?;
        self.store_state(&resource.name, &imported.state)?;
        info!("{} imported from {key}", resource.name);
        let mut out = report(resource, &imported.state, serde_json::to_value(&imported.outcome)?);
        out["declared"] = serde_json::to_value(&imported.declared)?;
        Ok(out)
    }

    /// Lists fields that an update would change. Never contacts the remote.
    pub fn plan(&self, resource: &ResourceFile) -> Result<Value> {
        let state = self.load_state(&resource.name)?;
        let action = match state.snapshot() {
            None => json!({"action": "create"}),
            Some(snapshot) => {
                let changed = self.provider.reconciler(resource.declared.kind).drift(&resource.declared, snapshot);
                if changed.is_empty() {
                    json!({"action": "none"})
                } else {
                    json!({"action": "update", "drift": changed})
                }
            }
        };
        Ok(report(resource, &state, action))
    }

    /// Tracked resource names with their remote identifiers.
    pub fn list(&self) -> Result<Value> {
        let tracked = self.memory.all_map::<Snapshot>(SNAPSHOTS)?;
        Ok(Value::Object(
            tracked
                .into_iter()
                .map(|(name, snapshot)| (name, Value::String(snapshot.id)))
                .collect(),
        ))
    }
}

fn report(resource: &ResourceFile, state: &EntityState, outcome: Value) -> Value {
    json!({
        "resource": resource.name,
        "kind": resource.declared.kind,
        "state": state.label(),
        "id": state.id(),
        "result": outcome,
    })
}
