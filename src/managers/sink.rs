use crate::constants::output::ARCHIVE_THRESHOLD_BYTES;
use crate::errors::TaskError;
use crate::services::logger::Logger;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

#[async_trait::async_trait]
pub trait BlobStore: Send + Sync {
    /// Creates the backing bucket if absent; a bucket that already exists is
    /// not an error.
    async fn ensure_bucket(&self) -> Result<(), TaskError>;
    /// Stores UTF-8 text under the key and returns its location string.
    async fn put(&self, key: &str, content: &str) -> Result<String, TaskError>;
}

/// Filesystem-backed object store: one directory per bucket, one file per key.
pub struct FsBlobStore {
    logger: Logger,
    root: PathBuf,
    bucket: String,
}

impl FsBlobStore {
    pub fn new(logger: Logger, root: impl Into<PathBuf>, bucket: impl Into<String>) -> Self {
        Self {
            logger: logger.child("blobs"),
            root: root.into(),
            bucket: bucket.into(),
        }
    }

    fn bucket_dir(&self) -> PathBuf {
        self.root.join(&self.bucket)
    }
}

#[async_trait::async_trait]
impl BlobStore for FsBlobStore {
    async fn ensure_bucket(&self) -> Result<(), TaskError> {
        fs::create_dir_all(self.bucket_dir())
            .map_err(|err| TaskError::blob_store(format!("Failed to create bucket: {}", err)))
    }

    async fn put(&self, key: &str, content: &str) -> Result<String, TaskError> {
        self.ensure_bucket().await?;
        let path = self.bucket_dir().join(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|err| TaskError::blob_store(format!("Failed to create prefix: {}", err)))?;
        }
        let tmp = path.with_extension(format!("tmp-{}", Uuid::new_v4()));
        let write = (|| -> std::io::Result<()> {
            let mut file = fs::OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&tmp)?;
            file.write_all(content.as_bytes())?;
            file.sync_all()?;
            Ok(())
        })();
        if let Err(err) = write {
            let _ = fs::remove_file(&tmp);
            return Err(TaskError::blob_store(format!("Failed to write blob: {}", err)));
        }
        fs::rename(&tmp, &path)
            .map_err(|err| TaskError::blob_store(format!("Failed to finalize blob: {}", err)))?;
        self.logger.info(&format!("stored blob {}", key), None);
        Ok(format!("{}/{}", self.bucket, key))
    }
}

/// Decides where captured output lives and owns blob key naming.
pub struct OutputSink {
    logger: Logger,
    store: Arc<dyn BlobStore>,
}

impl OutputSink {
    pub fn new(logger: Logger, store: Arc<dyn BlobStore>) -> Self {
        Self {
            logger: logger.child("sink"),
            store,
        }
    }

    pub fn needs_archive(stdout: &str, stderr: &str) -> bool {
        stdout.len() + stderr.len() > ARCHIVE_THRESHOLD_BYTES
    }

    pub fn combined_document(stdout: &str, stderr: &str, exit_code: i32) -> String {
        format!(
            "=== STDOUT ===\n{}\n\n=== STDERR ===\n{}\n\n=== EXIT CODE ===\n{}",
            stdout, stderr, exit_code
        )
    }

    pub fn command_output_key(task_run_id: &str) -> String {
        format!(
            "tasks/{}/output_{}.txt",
            task_run_id,
            chrono::Utc::now().format("%Y%m%d_%H%M%S")
        )
    }

    pub fn authorized_keys_key(platform_id: &str) -> String {
        format!(
            "platforms/{}/authorized_keys_{}.txt",
            platform_id,
            chrono::Utc::now().format("%Y%m%d_%H%M%S")
        )
    }

    pub async fn archive(&self, key: &str, content: &str) -> Result<String, TaskError> {
        let location = self.store.put(key, content).await?;
        self.logger.info(&format!("archived output to {}", location), None);
        Ok(location)
    }
}
