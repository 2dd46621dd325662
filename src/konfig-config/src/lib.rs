use anyhow::{anyhow, Context, Result};
use konfig_client::{Auth, ClientConfig};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;
use tracing::debug;

pub const ENV_ADDRESS: &str = "KONFIG_ADMIN_ADDRESS";
pub const ENV_USERNAME: &str = "KONFIG_ADMIN_USERNAME";
pub const ENV_PASSWORD: &str = "KONFIG_ADMIN_PASSWORD";
pub const ENV_TOKEN: &str = "KONFIG_ADMIN_TOKEN";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminCfg {
    #[serde(default = "def_address")]
    pub address: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub token: String,
    #[serde(default = "def_timeout")]
    pub timeout_sec: u64,
    #[serde(default)]
    pub tls_skip_verify: bool,
}
fn def_address() -> String { konfig_client::DEFAULT_ADDRESS.into() }
fn def_timeout() -> u64 { 30 }

impl Default for AdminCfg {
    fn default() -> Self {
        Self {
            address: def_address(),
            username: String::new(),
            password: String::new(),
            token: String::new(),
            timeout_sec: def_timeout(),
            tls_skip_verify: false,
        }
    }
}

impl AdminCfg {
    /// The immutable connection settings handed to every reconciler.
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            address: self.address.clone(),
            auth: Auth::from_credentials(&self.username, &self.password, &self.token),
            timeout: Duration::from_secs(self.timeout_sec),
            tls_skip_verify: self.tls_skip_verify,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TracingCfg {
    #[serde(default)]
    pub otlp_endpoint: String,
    #[serde(default = "def_service_name")]
    pub service_name: String,
    #[serde(default = "def_logging")]
    pub logging_mode: String,
}
fn def_service_name() -> String { "konfig".into() }
fn def_logging() -> String { "info".into() }

impl Default for TracingCfg {
    fn default() -> Self {
        Self {
            otlp_endpoint: String::new(),
            service_name: def_service_name(),
            logging_mode: def_logging(),
        }
    }
}

impl TracingCfg {
    pub fn otlp_endpoint(&self) -> Option<&str> {
        Some(self.otlp_endpoint.as_str()).filter(|e| !e.is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryCfg {
    #[serde(default = "def_engine")]
    pub engine: String, // lmdb | memory
    #[serde(default)]
    pub path: String,
}
fn def_engine() -> String { "memory".into() }

impl Default for MemoryCfg {
    fn default() -> Self {
        Self {
            engine: def_engine(),
            path: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FileConfig {
    #[serde(default)]
    pub admin: AdminCfg,
    #[serde(default)]
    pub tracing: TracingCfg,
    #[serde(default)]
    pub memory: MemoryCfg,
}

impl FileConfig {
    /// Overlays `KONFIG_ADMIN_*` values; set variables win over the file.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let targets = [
            (ENV_ADDRESS, &mut self.admin.address),
            (ENV_USERNAME, &mut self.admin.username),
            (ENV_PASSWORD, &mut self.admin.password),
            (ENV_TOKEN, &mut self.admin.token),
        ];
        for (name, slot) in targets {
            if let Some(value) = lookup(name) {
                debug!("admin setting overridden by {name}");
                *slot = value;
            }
        }
    }
}

/// Reads a YAML, JSON or TOML document, chosen by file extension.
pub fn load_file<T: DeserializeOwned>(path: &str) -> Result<T> {
    let content = fs::read_to_string(path).with_context(|| format!("read {}", path))?;
    if path.ends_with(".yaml") || path.ends_with(".yml") {
        serde_yml::from_str(&content).with_context(|| format!("parse yaml {}", path))
    } else if path.ends_with(".json") {
        serde_json::from_str(&content).with_context(|| format!("parse json {}", path))
    } else if path.ends_with(".toml") {
        toml::from_str(&content).with_context(|| format!("parse toml {}", path))
    } else {
        Err(anyhow!("Unknown file extension: {}", path))
    }
}

/// Loads the provider configuration and applies environment overrides.
pub fn load_config(path: &str) -> Result<FileConfig> {
    let mut cfg: FileConfig = load_file(path).with_context(|| format!("load config {}", path))?;
    cfg.apply_env(|name| std::env::var(name).ok());
    Ok(cfg)
}
