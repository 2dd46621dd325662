use anyhow::{Context, Result};
use dashmap::DashMap;
use heed::types::Bytes;
use heed::{Env, EnvOpenOptions};
use serde::{de::DeserializeOwned, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

const MAP_SIZE: usize = 1024 * 1024 * 1024;

/// Key/value store for tracked state, grouped into named databases. Values
/// are MessagePack encoded.
pub struct Memory {
    kind: MemoryKind,
}

enum MemoryKind {
    LMDB {
        env: Env,
        dbs: DashMap<String, heed::Database<Bytes, Bytes>>,
    },
    Memory {
        map: DashMap<String, Vec<u8>>,
    },
}

impl Memory {
    /// Open LMDB storage at given path
    pub fn open_lmdb<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        std::fs::create_dir_all(path).with_context(|| format!("create store dir {}", path.display()))?;
        // SAFETY: the environment is opened once per process and the file is not
        // truncated or mapped elsewhere while it is open.
        let env = unsafe { EnvOpenOptions::new().max_dbs(16).map_size(MAP_SIZE).open(path)? };
        debug!("opened lmdb store at {}", path.display());
        Ok(Self {
            kind: MemoryKind::LMDB {
                env,
                dbs: DashMap::new(),
            },
        })
    }

    /// Open in-memory storage
    pub fn memory() -> Self {
        Self {
            kind: MemoryKind::Memory { map: DashMap::new() },
        }
    }

    /// `engine` is `lmdb` or `memory`; anything else falls back to memory.
    pub fn open(engine: &str, path: &str) -> Result<Self> {
        if engine == "lmdb" {
            if path.is_empty() {
                anyhow::bail!("memory.path is required for the lmdb engine");
            }
            Self::open_lmdb(path)
        } else {
            Ok(Self::memory())
        }
    }

    fn make_key(db: &str, key: &str) -> String {
        format!("{}/{}", db, key)
    }

    fn get_db(
        env: &Env,
        dbs: &DashMap<String, heed::Database<Bytes, Bytes>>,
        db_name: &str,
    ) -> Result<heed::Database<Bytes, Bytes>> {
        if let Some(dbi) = dbs.get(db_name) {
            return Ok(*dbi);
        }
        let mut wtxn = env.write_txn()?;
        let dbi: heed::Database<Bytes, Bytes> = env.create_database(&mut wtxn, Some(db_name))?;
        wtxn.commit()?;
        dbs.insert(db_name.to_string(), dbi);
        Ok(dbi)
    }

    /// Insert or update
    pub fn put<T: Serialize>(&self, db: &str, key: &str, value: &T) -> Result<()> {
        let bytes = rmp_serde::to_vec_named(value)?;
        match &self.kind {
            MemoryKind::LMDB { env, dbs } => {
                let dbi = Self::get_db(env, dbs, db)?;
                let mut wtxn = env.write_txn()?;
                dbi.put(&mut wtxn, key.as_bytes(), &bytes)?;
                wtxn.commit()?;
            }
            MemoryKind::Memory { map } => {
                map.insert(Self::make_key(db, key), bytes);
            }
        }
        Ok(())
    }

    pub fn get<T: DeserializeOwned>(&self, db: &str, key: &str) -> Result<Option<T>> {
        match &self.kind {
            MemoryKind::LMDB { env, dbs } => {
                let dbi = Self::get_db(env, dbs, db)?;
                let rtxn = env.read_txn()?;
                match dbi.get(&rtxn, key.as_bytes())? {
                    Some(bytes) => Ok(Some(rmp_serde::from_slice(bytes)?)),
                    None => Ok(None),
                }
            }
            MemoryKind::Memory { map } => match map.get(&Self::make_key(db, key)) {
                Some(bytes) => Ok(Some(rmp_serde::from_slice(&bytes)?)),
                None => Ok(None),
            },
        }
    }

    pub fn delete(&self, db: &str, key: &str) -> Result<()> {
        match &self.kind {
            MemoryKind::LMDB { env, dbs } => {
                let dbi = Self::get_db(env, dbs, db)?;
                let mut wtxn = env.write_txn()?;
                dbi.delete(&mut wtxn, key.as_bytes())?;
                wtxn.commit()?;
            }
            MemoryKind::Memory { map } => {
                map.remove(&Self::make_key(db, key));
            }
        }
        Ok(())
    }

    pub fn exists(&self, db: &str, key: &str) -> Result<bool> {
        match &self.kind {
            MemoryKind::LMDB { env, dbs } => {
                let dbi = Self::get_db(env, dbs, db)?;
                let rtxn = env.read_txn()?;
                Ok(dbi.get(&rtxn, key.as_bytes())?.is_some())
            }
            MemoryKind::Memory { map } => Ok(map.contains_key(&Self::make_key(db, key))),
        }
    }

    /// Every record of `db`, keyed and sorted by record key.
    pub fn all_map<T: DeserializeOwned>(&self, db: &str) -> Result<BTreeMap<String, T>> {
        let mut map_out = BTreeMap::new();
        match &self.kind {
            MemoryKind::LMDB { env, dbs } => {
                let dbi = Self::get_db(env, dbs, db)?;
                let rtxn = env.read_txn()?;
                for item in dbi.iter(&rtxn)? {
                    let (k, v) = item?;
                    map_out.insert(String::from_utf8_lossy(k).into_owned(), rmp_serde::from_slice(v)?);
                }
            }
            MemoryKind::Memory { map } => {
                let prefix = format!("{}/", db);
                for entry in map.iter() {
                    if let Some(key) = entry.key().strip_prefix(&prefix) {
                        map_out.insert(key.to_string(), rmp_serde::from_slice(entry.value())?);
                    }
                }
            }
        }
        Ok(map_out)
    }
}
