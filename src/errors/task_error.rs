use serde::Serialize;
use serde_json::Value;
use std::error::Error;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskErrorKind {
    Credential,
    Decryption,
    InvalidKeyFormat,
    ConnectionTimeout,
    Connection,
    AuthenticationFailed,
    HostKeyMismatch,
    NotFound,
    BlobStore,
    Invalid,
    Internal,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskError {
    pub kind: TaskErrorKind,
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    pub retryable: bool,
}

impl TaskError {
    pub fn new(kind: TaskErrorKind, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: code.into(),
            message: message.into(),
            hint: None,
            details: None,
            retryable: matches!(kind, TaskErrorKind::ConnectionTimeout),
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Prefixes the message with the task stage that failed, so persisted
    /// error messages state where the failure happened.
    pub fn with_stage(mut self, stage: &str) -> Self {
        self.message = format!("{}: {}", stage, self.message);
        self
    }

    pub fn credential(message: impl Into<String>) -> Self {
        Self::new(TaskErrorKind::Credential, "CREDENTIAL", message)
    }

    pub fn decryption(message: impl Into<String>) -> Self {
        Self::new(TaskErrorKind::Decryption, "DECRYPTION", message)
    }

    pub fn invalid_key_format(message: impl Into<String>) -> Self {
        Self::new(TaskErrorKind::InvalidKeyFormat, "INVALID_KEY_FORMAT", message)
    }

    pub fn connection_timeout(message: impl Into<String>) -> Self {
        Self::new(TaskErrorKind::ConnectionTimeout, "CONNECTION_TIMEOUT", message)
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(TaskErrorKind::Connection, "CONNECTION", message)
    }

    pub fn authentication_failed(message: impl Into<String>) -> Self {
        Self::new(
            TaskErrorKind::AuthenticationFailed,
            "AUTHENTICATION_FAILED",
            message,
        )
    }

    pub fn host_key_mismatch(expected: &str, observed: &str) -> Self {
        Self::new(
            TaskErrorKind::HostKeyMismatch,
            "HOST_KEY_MISMATCH",
            format!(
                "Host key verification failed: expected {}, got {}",
                expected, observed
            ),
        )
        .with_details(serde_json::json!({
            "expected_fingerprint": expected,
            "observed_fingerprint": observed,
        }))
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(TaskErrorKind::NotFound, "NOT_FOUND", message)
    }

    pub fn blob_store(message: impl Into<String>) -> Self {
        Self::new(TaskErrorKind::BlobStore, "BLOB_STORE", message)
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::new(TaskErrorKind::Invalid, "INVALID", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(TaskErrorKind::Internal, "INTERNAL", message)
    }
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Error for TaskError {}

impl From<std::io::Error> for TaskError {
    fn from(err: std::io::Error) -> Self {
        TaskError::internal(err.to_string())
    }
}
