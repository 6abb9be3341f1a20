//! Persistence of API definitions and workflows.
//!
//! [`Store`] is a plain key-value contract over JSON records; [`Catalog`]
//! layers typed access on top of it.

use crate::definition::ApiDefinition;
use crate::error::{StoreError, StoreResult};
use crate::workflow::Workflow;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

const API_PREFIX: &str = "api:";
const WORKFLOW_PREFIX: &str = "workflow:";

/// Key-value storage of JSON records.
pub trait Store: Send + Sync {
    fn get(&self, key: &str) -> StoreResult<Option<Value>>;

    fn set(&self, key: &str, value: Value) -> StoreResult<()>;

    /// Remove a record, returning whether it existed.
    fn delete(&self, key: &str) -> StoreResult<bool>;

    /// All keys starting with `prefix`, in sorted order.
    fn keys(&self, prefix: &str) -> StoreResult<Vec<String>>;
}

/// Volatile store for tests and single-process use.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<BTreeMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MemoryStore {
    fn get(&self, key: &str) -> StoreResult<Option<Value>> {
        let records = self.records.read().map_err(|_| StoreError::Poisoned)?;
        Ok(records.get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> StoreResult<()> {
        let mut records = self.records.write().map_err(|_| StoreError::Poisoned)?;
        records.insert(key.to_string(), value);
        Ok(())
    }

    fn delete(&self, key: &str) -> StoreResult<bool> {
        let mut records = self.records.write().map_err(|_| StoreError::Poisoned)?;
        Ok(records.remove(key).is_some())
    }

    fn keys(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let records = self.records.read().map_err(|_| StoreError::Poisoned)?;
        Ok(records
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}

/// Store backed by a single JSON file, rewritten after every change.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    records: RwLock<BTreeMap<String, Value>>,
}

impl JsonFileStore {
    /// Open the file, starting empty if it does not exist yet.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();

        let records = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            if content.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&content)?
            }
        } else {
            BTreeMap::new()
        };

        tracing::debug!(path = %path.display(), records = records.len(), "Opened JSON store");

        Ok(Self {
            path,
            records: RwLock::new(records),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, records: &BTreeMap<String, Value>) -> StoreResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        // Write then rename so readers never see a half-written file
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(records)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl Store for JsonFileStore {
    fn get(&self, key: &str) -> StoreResult<Option<Value>> {
        let records = self.records.read().map_err(|_| StoreError::Poisoned)?;
        Ok(records.get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> StoreResult<()> {
        let mut records = self.records.write().map_err(|_| StoreError::Poisoned)?;
        let mut updated = records.clone();
        updated.insert(key.to_string(), value);
        self.flush(&updated)?;
        *records = updated;
        Ok(())
    }

    fn delete(&self, key: &str) -> StoreResult<bool> {
        let mut records = self.records.write().map_err(|_| StoreError::Poisoned)?;
        if !records.contains_key(key) {
            return Ok(false);
        }

        let mut updated = records.clone();
        updated.remove(key);
        self.flush(&updated)?;
        *records = updated;
        Ok(true)
    }

    fn keys(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let records = self.records.read().map_err(|_| StoreError::Poisoned)?;
        Ok(records
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}

/// Typed access to API definitions and workflows kept in a [`Store`].
#[derive(Clone)]
pub struct Catalog {
    store: Arc<dyn Store>,
}

impl Catalog {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Catalog over a fresh [`MemoryStore`].
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    /// Create or update an API definition.
    pub fn put_api(&self, api: &ApiDefinition) -> StoreResult<()> {
        api.validate()?;
        self.put(&api_key(&api.id), api)
    }

    pub fn get_api(&self, id: &str) -> StoreResult<Option<ApiDefinition>> {
        self.fetch(&api_key(id))
    }

    /// Delete an API definition. Workflows referencing it are left as they are.
    pub fn delete_api(&self, id: &str) -> StoreResult<bool> {
        let users = self.workflows_using(id)?;
        if !users.is_empty() {
            tracing::warn!(
                api = id,
                workflows = ?users.iter().map(|w| w.id.as_str()).collect::<Vec<_>>(),
                "Deleting API definition still referenced by workflows"
            );
        }
        self.store.delete(&api_key(id))
    }

    pub fn list_apis(&self) -> StoreResult<Vec<ApiDefinition>> {
        self.list(API_PREFIX)
    }

    /// Create or update a workflow, refreshing its `updated_at` stamp.
    pub fn put_workflow(&self, workflow: &Workflow) -> StoreResult<Workflow> {
        workflow.validate()?;

        let mut stored = workflow.clone();
        if let Some(existing) = self.get_workflow(&workflow.id)? {
            stored.created_at = existing.created_at;
        }
        stored.touch();

        self.put(&workflow_key(&stored.id), &stored)?;
        Ok(stored)
    }

    pub fn get_workflow(&self, id: &str) -> StoreResult<Option<Workflow>> {
        self.fetch(&workflow_key(id))
    }

    /// Like [`Catalog::get_workflow`], but a missing record is an error.
    pub fn require_workflow(&self, id: &str) -> StoreResult<Workflow> {
        self.get_workflow(id)?
            .ok_or_else(|| StoreError::NotFound(workflow_key(id)))
    }

    pub fn delete_workflow(&self, id: &str) -> StoreResult<bool> {
        self.store.delete(&workflow_key(id))
    }

    pub fn list_workflows(&self) -> StoreResult<Vec<Workflow>> {
        self.list(WORKFLOW_PREFIX)
    }

    /// Workflows with at least one step calling the given API.
    pub fn workflows_using(&self, api_id: &str) -> StoreResult<Vec<Workflow>> {
        Ok(self
            .list_workflows()?
            .into_iter()
            .filter(|w| w.references(api_id))
            .collect())
    }

    pub fn is_in_use(&self, api_id: &str) -> StoreResult<bool> {
        Ok(!self.workflows_using(api_id)?.is_empty())
    }

    fn put<T: Serialize>(&self, key: &str, record: &T) -> StoreResult<()> {
        self.store.set(key, serde_json::to_value(record)?)
    }

    fn fetch<T: DeserializeOwned>(&self, key: &str) -> StoreResult<Option<T>> {
        match self.store.get(key)? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    fn list<T: DeserializeOwned>(&self, prefix: &str) -> StoreResult<Vec<T>> {
        let mut records = Vec::new();
        for key in self.store.keys(prefix)? {
            if let Some(record) = self.fetch(&key)? {
                records.push(record);
            }
        }
        Ok(records)
    }
}

fn api_key(id: &str) -> String {
    format!("{}{}", API_PREFIX, id)
}

fn workflow_key(id: &str) -> String {
    format!("{}{}", WORKFLOW_PREFIX, id)
}
