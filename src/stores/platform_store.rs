use crate::errors::TaskError;
use crate::models::Platform;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use uuid::Uuid;

#[async_trait::async_trait]
pub trait PlatformStore: Send + Sync {
    async fn get(&self, id: Uuid) -> Result<Platform, TaskError>;
    async fn pin_fingerprint(&self, id: Uuid, fingerprint: &str) -> Result<(), TaskError>;
    async fn set_system_info(&self, id: Uuid, info: Value) -> Result<(), TaskError>;
}

#[derive(Clone, Default)]
pub struct MemoryPlatformStore {
    platforms: Arc<RwLock<HashMap<Uuid, Platform>>>,
}

impl MemoryPlatformStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, platform: Platform) {
        self.platforms
            .write()
            .unwrap()
            .insert(platform.id, platform);
    }
}

#[async_trait::async_trait]
impl PlatformStore for MemoryPlatformStore {
    async fn get(&self, id: Uuid) -> Result<Platform, TaskError> {
        self.platforms
            .read()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or_else(|| TaskError::not_found(format!("Platform {} not found", id)))
    }

    async fn pin_fingerprint(&self, id: Uuid, fingerprint: &str) -> Result<(), TaskError> {
        let mut platforms = self.platforms.write().unwrap();
        let platform = platforms
            .get_mut(&id)
            .ok_or_else(|| TaskError::not_found(format!("Platform {} not found", id)))?;
        platform.pinned_fingerprint = Some(fingerprint.to_string());
        Ok(())
    }

    async fn set_system_info(&self, id: Uuid, info: Value) -> Result<(), TaskError> {
        let mut platforms = self.platforms.write().unwrap();
        let platform = platforms
            .get_mut(&id)
            .ok_or_else(|| TaskError::not_found(format!("Platform {} not found", id)))?;
        platform.system_info = Some(info);
        Ok(())
    }
}
