use crate::errors::TaskError;
use crate::models::SshKey;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use uuid::Uuid;

#[async_trait::async_trait]
pub trait KeyStore: Send + Sync {
    /// Fetches keys by id, failing with `NOT_FOUND` when any id is unknown.
    async fn get_many(&self, ids: &[Uuid]) -> Result<Vec<SshKey>, TaskError>;
    async fn list_all(&self) -> Result<Vec<SshKey>, TaskError>;
}

#[derive(Clone, Default)]
pub struct MemoryKeyStore {
    keys: Arc<RwLock<HashMap<Uuid, SshKey>>>,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: SshKey) {
        self.keys.write().unwrap().insert(key.id, key);
    }
}

#[async_trait::async_trait]
impl KeyStore for MemoryKeyStore {
    async fn get_many(&self, ids: &[Uuid]) -> Result<Vec<SshKey>, TaskError> {
        let keys = self.keys.read().unwrap();
        let mut found = Vec::with_capacity(ids.len());
        let mut missing = Vec::new();
        for id in ids {
            match keys.get(id) {
                Some(key) => found.push(key.clone()),
                None => missing.push(id.to_string()),
            }
        }
        if !missing.is_empty() {
            return Err(
                TaskError::not_found(format!("SSH key(s) not found: {}", missing.join(", ")))
                    .with_details(serde_json::json!({ "missing_ids": missing })),
            );
        }
        Ok(found)
    }

    async fn list_all(&self) -> Result<Vec<SshKey>, TaskError> {
        let keys = self.keys.read().unwrap();
        let mut all: Vec<SshKey> = keys.values().cloned().collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(all)
    }
}
