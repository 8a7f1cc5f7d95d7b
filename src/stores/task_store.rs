use crate::errors::TaskError;
use crate::models::{TaskRun, TaskStatus};
use chrono::Utc;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct TerminalUpdate {
    pub status: TaskStatus,
    pub stdout: Option<String>,
    pub stderr: Option<String>,
    pub error_message: Option<String>,
    pub result_location: Option<String>,
    pub metadata: Option<Value>,
}

impl TerminalUpdate {
    pub fn success() -> Self {
        Self {
            status: TaskStatus::Success,
            stdout: None,
            stderr: None,
            error_message: None,
            result_location: None,
            metadata: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: TaskStatus::Failed,
            stdout: None,
            stderr: None,
            error_message: Some(message.into()),
            result_location: None,
            metadata: None,
        }
    }
}

#[async_trait::async_trait]
pub trait TaskStore: Send + Sync {
    async fn get(&self, id: Uuid) -> Result<TaskRun, TaskError>;
    async fn insert(&self, task: TaskRun) -> Result<(), TaskError>;
    async fn mark_running(&self, id: Uuid) -> Result<(), TaskError>;
    /// Writes the one terminal transition. A task already in a terminal state
    /// is never reopened or rewritten.
    async fn finish(&self, id: Uuid, update: TerminalUpdate) -> Result<(), TaskError>;
}

#[derive(Clone, Default)]
pub struct MemoryTaskStore {
    tasks: Arc<RwLock<HashMap<Uuid, TaskRun>>>,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl TaskStore for MemoryTaskStore {
    async fn get(&self, id: Uuid) -> Result<TaskRun, TaskError> {
        self.tasks
            .read()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or_else(|| TaskError::not_found(format!("TaskRun {} not found", id)))
    }

    async fn insert(&self, task: TaskRun) -> Result<(), TaskError> {
        self.tasks.write().unwrap().insert(task.id, task);
        Ok(())
    }

    async fn mark_running(&self, id: Uuid) -> Result<(), TaskError> {
        let mut tasks = self.tasks.write().unwrap();
        let task = tasks
            .get_mut(&id)
            .ok_or_else(|| TaskError::not_found(format!("TaskRun {} not found", id)))?;
        task.status = TaskStatus::Running;
        task.started_at = Some(Utc::now());
        Ok(())
    }

    async fn finish(&self, id: Uuid, update: TerminalUpdate) -> Result<(), TaskError> {
        if !update.status.is_terminal() {
            return Err(TaskError::internal(
                "finish() requires a terminal task status",
            ));
        }
        let mut tasks = self.tasks.write().unwrap();
        let task = tasks
            .get_mut(&id)
            .ok_or_else(|| TaskError::not_found(format!("TaskRun {} not found", id)))?;
        if task.status.is_terminal() {
            return Err(TaskError::internal(format!(
                "TaskRun {} is already finalized",
                id
            )));
        }
        task.status = update.status;
        task.stdout = update.stdout;
        task.stderr = update.stderr;
        task.error_message = update.error_message;
        task.result_location = update.result_location;
        task.metadata = update.metadata;
        task.finished_at = Some(Utc::now());
        Ok(())
    }
}
