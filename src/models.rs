use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::constants::network;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    Password,
    PrivateKey,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Deploy,
    RunCommand,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Success,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Success | TaskStatus::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamEventKind {
    Progress,
    Stdout,
    Stderr,
    Done,
    Error,
}

impl StreamEventKind {
    pub fn is_terminal(self) -> bool {
        matches!(self, StreamEventKind::Done | StreamEventKind::Error)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StreamEventKind::Progress => "progress",
            StreamEventKind::Stdout => "stdout",
            StreamEventKind::Stderr => "stderr",
            StreamEventKind::Done => "done",
            StreamEventKind::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Platform {
    pub id: Uuid,
    pub name: String,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub auth_method: AuthMethod,
    pub encrypted_password: Option<String>,
    pub ssh_key_id: Option<Uuid>,
    // Legacy inline ciphertext, superseded by ssh_key_id references.
    pub encrypted_private_key: Option<String>,
    pub pinned_fingerprint: Option<String>,
    pub system_info: Option<Value>,
    pub created_at: DateTime<Utc>,
}

impl Platform {
    pub fn new(
        name: impl Into<String>,
        host: impl Into<String>,
        username: impl Into<String>,
        auth_method: AuthMethod,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            host: host.into(),
            port: network::SSH_DEFAULT_PORT,
            username: username.into(),
            auth_method,
            encrypted_password: None,
            ssh_key_id: None,
            encrypted_private_key: None,
            pinned_fingerprint: None,
            system_info: None,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SshKey {
    pub id: Uuid,
    pub name: String,
    pub public_key: String,
    pub encrypted_private_key: Option<String>,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl SshKey {
    pub fn new(name: impl Into<String>, public_key: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            public_key: public_key.into(),
            encrypted_private_key: None,
            created_by: None,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRun {
    pub id: Uuid,
    pub correlation_id: Option<String>,
    pub task_type: TaskType,
    pub platform_id: Option<Uuid>,
    pub status: TaskStatus,
    pub result_location: Option<String>,
    pub stdout: Option<String>,
    pub stderr: Option<String>,
    pub error_message: Option<String>,
    pub metadata: Option<Value>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl TaskRun {
    pub fn new(task_type: TaskType, platform_id: Option<Uuid>) -> Self {
        Self {
            id: Uuid::new_v4(),
            correlation_id: None,
            task_type,
            platform_id,
            status: TaskStatus::Pending,
            result_location: None,
            stdout: None,
            stderr: None,
            error_message: None,
            metadata: None,
            started_at: None,
            finished_at: None,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamEvent {
    pub ts: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: StreamEventKind,
    pub payload: String,
}

impl StreamEvent {
    pub fn new(kind: StreamEventKind, payload: impl Into<String>) -> Self {
        Self {
            ts: Utc::now(),
            kind,
            payload: payload.into(),
        }
    }

    pub fn to_wire(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}
