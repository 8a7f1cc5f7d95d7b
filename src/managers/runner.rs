use crate::constants::network;
use crate::constants::output::{INLINE_LIMIT_BYTES, TRUNCATION_MARKER};
use crate::errors::TaskError;
use crate::managers::sink::OutputSink;
use crate::managers::ssh::{ConnectParams, Connector, RemoteSession};
use crate::models::{AuthMethod, Platform, StreamEventKind, TaskStatus};
use crate::services::credentials::resolve_credentials;
use crate::services::logger::Logger;
use crate::services::security::Security;
use crate::services::stream::EventBus;
use crate::services::validation::Validation;
use crate::stores::{KeyStore, PlatformStore, TaskStore, TerminalUpdate};
use crate::utils::public_key::fingerprint_public_key_sha256;
use crate::utils::text::clip_with_marker;
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, Copy)]
pub struct RunnerConfig {
    /// When no key ids are given, deploy the entire key inventory instead of
    /// rejecting the task. Off unless an operator opts in.
    pub deploy_all_when_unspecified: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            deploy_all_when_unspecified: false,
        }
    }
}

/// Drives one task end-to-end: RUNNING transition, credential resolution,
/// SSH work, output persistence, exactly one terminal transition, and stream
/// events throughout. The runner is the sole writer of task status after
/// creation.
pub struct TaskRunner {
    logger: Logger,
    security: Arc<Security>,
    validation: Validation,
    platforms: Arc<dyn PlatformStore>,
    keys: Arc<dyn KeyStore>,
    tasks: Arc<dyn TaskStore>,
    sink: Arc<OutputSink>,
    bus: Arc<EventBus>,
    connector: Arc<dyn Connector>,
    config: RunnerConfig,
}

impl TaskRunner {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        logger: Logger,
        security: Arc<Security>,
        validation: Validation,
        platforms: Arc<dyn PlatformStore>,
        keys: Arc<dyn KeyStore>,
        tasks: Arc<dyn TaskStore>,
        sink: Arc<OutputSink>,
        bus: Arc<EventBus>,
        connector: Arc<dyn Connector>,
        config: RunnerConfig,
    ) -> Self {
        Self {
            logger: logger.child("runner"),
            security,
            validation,
            platforms,
            keys,
            tasks,
            sink,
            bus,
            connector,
            config,
        }
    }

    pub async fn deploy_keys(
        &self,
        task_run_id: Uuid,
        platform_id: Uuid,
        key_ids: &[Uuid],
    ) -> Result<(), TaskError> {
        let topic = task_run_id.to_string();
        match self
            .deploy_keys_inner(task_run_id, platform_id, key_ids, &topic)
            .await
        {
            Ok(()) => Ok(()),
            Err(err) => {
                self.finalize_failure(task_run_id, &topic, &err, "Deployment failed")
                    .await;
                Err(err)
            }
        }
    }

    async fn deploy_keys_inner(
        &self,
        task_run_id: Uuid,
        platform_id: Uuid,
        key_ids: &[Uuid],
        topic: &str,
    ) -> Result<(), TaskError> {
        self.tasks.mark_running(task_run_id).await?;
        self.bus
            .publish(topic, StreamEventKind::Progress, "Starting key deployment...");

        let platform = self.platforms.get(platform_id).await?;
        self.validation.ensure_port(platform.port)?;
        self.bus.publish(
            topic,
            StreamEventKind::Progress,
            format!("Connecting to {} ({})...", platform.name, platform.host),
        );

        let keys = if key_ids.is_empty() {
            if !self.config.deploy_all_when_unspecified {
                return Err(TaskError::invalid(
                    "No key ids given and deploy-all is not enabled",
                )
                .with_hint(
                    "Pass an explicit key id list, or enable deploy_all_when_unspecified.",
                ));
            }
            self.keys.list_all().await?
        } else {
            self.keys.get_many(key_ids).await?
        };
        if keys.is_empty() {
            return Err(TaskError::not_found("No SSH keys found to deploy"));
        }
        self.bus.publish(
            topic,
            StreamEventKind::Progress,
            format!("Found {} key(s) to deploy", keys.len()),
        );
        for key in &keys {
            match fingerprint_public_key_sha256(&key.public_key) {
                Ok(fingerprint) => self.logger.debug(
                    &format!("deploying key {} ({})", key.name, fingerprint),
                    None,
                ),
                Err(err) => self.logger.warn(
                    &format!("key {} has a malformed public key line: {}", key.name, err),
                    None,
                ),
            }
        }

        let session = self.open_session(&platform).await?;
        self.pin_if_needed(&platform, session.as_ref(), topic).await;
        self.bus.publish(
            topic,
            StreamEventKind::Progress,
            "Connected successfully. Deploying keys...",
        );

        let public_keys: Vec<String> = keys.iter().map(|key| key.public_key.clone()).collect();
        let report = session
            .deploy_authorized_keys(&public_keys)
            .await
            .map_err(|err| err.with_stage("execution"))?;
        let message = format!(
            "Deployed {} new key(s), {} total",
            report.added, report.total
        );
        self.bus
            .publish(topic, StreamEventKind::Progress, message.clone());

        // archival is best-effort: a blob store outage must not turn a
        // completed deployment into a failed task
        let snapshot = session
            .read_file(&session.authorized_keys_path())
            .await
            .unwrap_or_default();
        let location = match self
            .sink
            .archive(
                &OutputSink::authorized_keys_key(&platform_id.to_string()),
                &snapshot,
            )
            .await
        {
            Ok(location) => Some(location),
            Err(err) => {
                self.logger
                    .warn(&format!("authorized_keys archival failed: {}", err), None);
                None
            }
        };
        session.close().await;

        let mut update = TerminalUpdate::success();
        update.stdout = Some(message.clone());
        update.result_location = location;
        self.tasks.finish(task_run_id, update).await?;
        self.bus.publish(
            topic,
            StreamEventKind::Done,
            format!("Deployment completed successfully. {}", message),
        );
        self.bus.close(topic);
        self.logger
            .info(&format!("task {} completed successfully", task_run_id), None);
        Ok(())
    }

    pub async fn run_command(
        &self,
        task_run_id: Uuid,
        platform_id: Uuid,
        command: &str,
        timeout_secs: u64,
    ) -> Result<(), TaskError> {
        let topic = task_run_id.to_string();
        match self
            .run_command_inner(task_run_id, platform_id, command, timeout_secs, &topic)
            .await
        {
            Ok(()) => Ok(()),
            Err(err) => {
                self.finalize_failure(task_run_id, &topic, &err, "Command execution failed")
                    .await;
                Err(err)
            }
        }
    }

    async fn run_command_inner(
        &self,
        task_run_id: Uuid,
        platform_id: Uuid,
        command: &str,
        timeout_secs: u64,
        topic: &str,
    ) -> Result<(), TaskError> {
        let command = self.validation.ensure_nonempty(command, "command")?;
        let timeout_secs = self.validation.ensure_timeout_secs(timeout_secs)?;

        self.tasks.mark_running(task_run_id).await?;
        self.bus.publish(
            topic,
            StreamEventKind::Progress,
            format!("Executing command: {}", command),
        );

        let platform = self.platforms.get(platform_id).await?;
        self.validation.ensure_port(platform.port)?;

        let session = self.open_session(&platform).await?;
        self.pin_if_needed(&platform, session.as_ref(), topic).await;
        self.bus.publish(
            topic,
            StreamEventKind::Progress,
            "Connected. Running command...",
        );

        let output = session
            .execute_command(&command, timeout_secs)
            .await
            .map_err(|err| err.with_stage("execution"))?;

        for line in output.stdout.lines() {
            if !line.is_empty() {
                self.bus.publish(topic, StreamEventKind::Stdout, line);
            }
        }
        for line in output.stderr.lines() {
            if !line.is_empty() {
                self.bus.publish(topic, StreamEventKind::Stderr, line);
            }
        }
        session.close().await;

        let mut result_location = None;
        if OutputSink::needs_archive(&output.stdout, &output.stderr) {
            let document =
                OutputSink::combined_document(&output.stdout, &output.stderr, output.exit_code);
            match self
                .sink
                .archive(
                    &OutputSink::command_output_key(&task_run_id.to_string()),
                    &document,
                )
                .await
            {
                Ok(location) => result_location = Some(location),
                Err(err) => {
                    // the terminal status still reflects the remote outcome
                    self.logger
                        .warn(&format!("output archival failed: {}", err), None);
                }
            }
        }

        let succeeded = output.exit_code == 0;
        let update = TerminalUpdate {
            status: if succeeded {
                TaskStatus::Success
            } else {
                TaskStatus::Failed
            },
            stdout: Some(clip_with_marker(
                &output.stdout,
                INLINE_LIMIT_BYTES,
                TRUNCATION_MARKER,
            )),
            stderr: Some(clip_with_marker(
                &output.stderr,
                INLINE_LIMIT_BYTES,
                TRUNCATION_MARKER,
            )),
            error_message: if succeeded {
                None
            } else {
                Some(format!("command exited with code {}", output.exit_code))
            },
            result_location,
            metadata: Some(serde_json::json!({ "exit_code": output.exit_code })),
        };
        self.tasks.finish(task_run_id, update).await?;

        let status_msg = format!("Command completed with exit code {}", output.exit_code);
        self.bus
            .publish(topic, StreamEventKind::Done, status_msg.clone());
        self.bus.close(topic);
        self.logger
            .info(&format!("task {} completed: {}", task_run_id, status_msg), None);
        Ok(())
    }

    /// Best-effort external cancel: flips a non-terminal record to FAILED.
    /// In-flight remote execution is not interrupted.
    pub async fn cancel(&self, task_run_id: Uuid, reason: &str) -> Result<(), TaskError> {
        let task = self.tasks.get(task_run_id).await?;
        if task.status.is_terminal() {
            self.logger.info(
                &format!("cancel ignored, task {} already finalized", task_run_id),
                None,
            );
            return Ok(());
        }
        self.tasks
            .finish(task_run_id, TerminalUpdate::failed(format!("canceled: {}", reason)))
            .await?;
        let topic = task_run_id.to_string();
        self.bus.publish(
            &topic,
            StreamEventKind::Error,
            format!("Task canceled: {}", reason),
        );
        self.bus.close(&topic);
        Ok(())
    }

    /// Connects to a platform, probes its system info, and caches the
    /// snapshot on the platform record.
    pub async fn refresh_system_info(&self, platform_id: Uuid) -> Result<Value, TaskError> {
        let platform = self.platforms.get(platform_id).await?;
        let session = self.open_session(&platform).await?;
        let info = self.probe_system_info(session.as_ref()).await;
        session.close().await;
        self.platforms
            .set_system_info(platform_id, info.clone())
            .await?;
        Ok(info)
    }

    pub async fn probe_system_info(&self, session: &dyn RemoteSession) -> Value {
        const PROBES: &[(&str, &str)] = &[
            ("uname", "uname -a"),
            (
                "os",
                "cat /etc/os-release 2>/dev/null || sw_vers 2>/dev/null || echo \"OS info unavailable\"",
            ),
            ("disk", "df -h"),
            ("memory", "free -h 2>/dev/null || vm_stat"),
            ("uptime", "uptime"),
        ];
        let mut report = serde_json::Map::new();
        for (key, command) in PROBES {
            let entry = match session
                .execute_command(command, network::SYSTEM_INFO_PROBE_TIMEOUT_SECS)
                .await
            {
                Ok(output) if output.exit_code == 0 => {
                    Value::String(output.stdout.trim().to_string())
                }
                Ok(output) => {
                    self.logger.warn(
                        &format!("system info probe {} exited {}", key, output.exit_code),
                        None,
                    );
                    Value::String("unknown".to_string())
                }
                Err(err) => {
                    self.logger
                        .warn(&format!("system info probe {} failed: {}", key, err), None);
                    Value::String("unknown".to_string())
                }
            };
            report.insert(key.to_string(), entry);
        }
        Value::Object(report)
    }

    async fn open_session(
        &self,
        platform: &Platform,
    ) -> Result<Box<dyn RemoteSession>, TaskError> {
        let referenced_key = match (platform.auth_method, platform.ssh_key_id) {
            (AuthMethod::PrivateKey, Some(key_id)) => self
                .keys
                .get_many(&[key_id])
                .await
                .ok()
                .and_then(|mut keys| keys.pop()),
            _ => None,
        };
        let credential = resolve_credentials(&self.security, platform, referenced_key.as_ref())
            .map_err(|err| err.with_stage("credential resolution"))?;
        self.connector
            .connect(ConnectParams {
                host: platform.host.clone(),
                port: platform.port,
                username: platform.username.clone(),
                credential,
                pinned_fingerprint: platform.pinned_fingerprint.clone(),
            })
            .await
            .map_err(|err| err.with_stage("connection"))
    }

    async fn pin_if_needed(&self, platform: &Platform, session: &dyn RemoteSession, topic: &str) {
        if platform.pinned_fingerprint.is_some() {
            return;
        }
        let Some(fingerprint) = session.host_fingerprint() else {
            self.logger.warn(
                &format!("no host key fingerprint observed for {}", platform.host),
                None,
            );
            return;
        };
        // pin-on-first-use is best-effort: the task proceeds either way
        match self
            .platforms
            .pin_fingerprint(platform.id, &fingerprint)
            .await
        {
            Ok(()) => {
                let prefix: String = fingerprint.chars().take(16).collect();
                self.bus.publish(
                    topic,
                    StreamEventKind::Progress,
                    format!("Saved host fingerprint: {}...", prefix),
                );
            }
            Err(err) => {
                self.logger.warn(
                    &format!("failed to pin fingerprint for {}: {}", platform.name, err),
                    None,
                );
            }
        }
    }

    async fn finalize_failure(&self, task_run_id: Uuid, topic: &str, err: &TaskError, prefix: &str) {
        self.logger
            .error(&format!("task {} failed: {}", task_run_id, err), None);
        if let Err(persist_err) = self
            .tasks
            .finish(task_run_id, TerminalUpdate::failed(err.to_string()))
            .await
        {
            self.logger.error(
                &format!(
                    "failed to persist terminal state for task {}: {}",
                    task_run_id, persist_err
                ),
                None,
            );
        }
        self.bus.publish(
            topic,
            StreamEventKind::Error,
            format!("{}: {}", prefix, err),
        );
        self.bus.close(topic);
    }
}
