use crate::constants::{network, output as output_limits, remote};
use crate::errors::TaskError;
use crate::services::credentials::Credential;
use crate::services::logger::Logger;
use crate::utils::authorized_keys::merge_key_lines;
use crate::utils::text::lossy_utf8;
use sha2::{Digest, Sha256};
use ssh2::{OpenFlags, OpenType, RenameFlags, Session};
use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

const SFTP_NO_SUCH_FILE: i32 = 2;
const SFTP_NO_SUCH_PATH: i32 = 10;

#[derive(Clone)]
pub struct ConnectParams {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub credential: Credential,
    pub pinned_fingerprint: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
    pub duration_ms: u128,
}

#[derive(Debug, Clone, Copy)]
pub struct DeployReport {
    pub added: usize,
    pub total: usize,
}

#[async_trait::async_trait]
pub trait RemoteSession: Send + Sync {
    /// Lowercase hex SHA-256 of the remote host key, observed at connect time.
    fn host_fingerprint(&self) -> Option<String>;
    fn authorized_keys_path(&self) -> String;
    async fn execute_command(
        &self,
        command: &str,
        timeout_secs: u64,
    ) -> Result<CommandOutput, TaskError>;
    async fn read_file(&self, path: &str) -> Option<String>;
    async fn deploy_authorized_keys(
        &self,
        public_keys: &[String],
    ) -> Result<DeployReport, TaskError>;
    async fn close(&self);
}

#[async_trait::async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, params: ConnectParams) -> Result<Box<dyn RemoteSession>, TaskError>;
}

#[derive(Clone)]
pub struct SshConnector {
    logger: Logger,
}

impl SshConnector {
    pub fn new(logger: Logger) -> Self {
        Self {
            logger: logger.child("ssh"),
        }
    }
}

#[async_trait::async_trait]
impl Connector for SshConnector {
    async fn connect(&self, params: ConnectParams) -> Result<Box<dyn RemoteSession>, TaskError> {
        let logger = self.logger.clone();
        tokio::task::spawn_blocking(move || connect_blocking(logger, params))
            .await
            .map_err(|_| TaskError::internal("SSH connect task failed"))?
    }
}

struct Inner {
    session: Option<Session>,
    fingerprint: Option<String>,
}

/// One authenticated connection to one host for one logical operation.
/// Any protocol-level failure during an operation closes the session; the
/// caller must not reuse it afterwards.
pub struct SshSession {
    logger: Logger,
    host: String,
    username: String,
    inner: Arc<Mutex<Inner>>,
}

fn connect_blocking(
    logger: Logger,
    params: ConnectParams,
) -> Result<Box<dyn RemoteSession>, TaskError> {
    let timeout = Duration::from_millis(network::TIMEOUT_SSH_READY_MS);
    let addr = (params.host.as_str(), params.port)
        .to_socket_addrs()
        .map_err(|err| {
            TaskError::connection(format!(
                "Failed to resolve {}:{}: {}",
                params.host, params.port, err
            ))
        })?
        .next()
        .ok_or_else(|| {
            TaskError::connection(format!(
                "No address found for {}:{}",
                params.host, params.port
            ))
        })?;

    let tcp = TcpStream::connect_timeout(&addr, timeout).map_err(|err| {
        if err.kind() == std::io::ErrorKind::TimedOut {
            TaskError::connection_timeout(format!(
                "Connection to {}:{} timed out",
                params.host, params.port
            ))
        } else {
            TaskError::connection(format!("Failed to connect SSH: {}", err))
        }
    })?;
    tcp.set_read_timeout(Some(timeout)).ok();
    tcp.set_write_timeout(Some(timeout)).ok();

    let mut session =
        Session::new().map_err(|_| TaskError::internal("Failed to create SSH session"))?;
    session.set_tcp_stream(tcp);
    session.handshake().map_err(map_ssh_error)?;

    let observed = session
        .host_key()
        .map(|(bytes, _)| hex::encode(Sha256::digest(bytes)));
    if let Some(expected) = params.pinned_fingerprint.as_deref() {
        if observed.as_deref() != Some(expected) {
            // dropping the session here tears down the transport before auth
            let observed = observed.as_deref().unwrap_or("unknown");
            logger.error(
                &format!(
                    "host key mismatch for {}: expected {}, got {}",
                    params.host, expected, observed
                ),
                None,
            );
            return Err(TaskError::host_key_mismatch(expected, observed));
        }
    }

    match &params.credential {
        Credential::Password(password) => session
            .userauth_password(&params.username, password)
            .map_err(|err| {
                TaskError::authentication_failed(format!("SSH authentication failed: {}", err))
            })?,
        Credential::PrivateKey(key) => session
            .userauth_pubkey_memory(&params.username, None, &key.material, None)
            .map_err(|err| {
                TaskError::authentication_failed(format!("SSH authentication failed: {}", err))
            })?,
    }
    if !session.authenticated() {
        return Err(TaskError::authentication_failed("SSH authentication failed"));
    }

    let interval = std::cmp::max(1, (network::KEEPALIVE_INTERVAL_MS / 1000) as u32);
    session.set_keepalive(true, interval);
    logger.info(
        &format!(
            "connected to {}@{}:{}",
            params.username, params.host, params.port
        ),
        None,
    );

    Ok(Box::new(SshSession {
        logger,
        host: params.host,
        username: params.username,
        inner: Arc::new(Mutex::new(Inner {
            session: Some(session),
            fingerprint: observed,
        })),
    }))
}

#[async_trait::async_trait]
impl RemoteSession for SshSession {
    fn host_fingerprint(&self) -> Option<String> {
        self.inner.lock().unwrap().fingerprint.clone()
    }

    fn authorized_keys_path(&self) -> String {
        format!("/home/{}/.ssh/authorized_keys", self.username)
    }

    async fn execute_command(
        &self,
        command: &str,
        timeout_secs: u64,
    ) -> Result<CommandOutput, TaskError> {
        let logger = self.logger.clone();
        let host = self.host.clone();
        let inner = self.inner.clone();
        let command = command.to_string();
        tokio::task::spawn_blocking(move || {
            logger.info(&format!("executing command on {}: {}", host, command), None);
            let mut guard = inner.lock().unwrap();
            let Some(session) = guard.session.as_ref() else {
                return Err(TaskError::connection("SSH session is closed"));
            };
            match run_channel(session, &command, Duration::from_secs(timeout_secs)) {
                Ok(output) => Ok(output),
                Err(err) => {
                    guard.session = None;
                    Err(err)
                }
            }
        })
        .await
        .map_err(|_| TaskError::internal("SSH exec task failed"))?
    }

    async fn read_file(&self, path: &str) -> Option<String> {
        let logger = self.logger.clone();
        let inner = self.inner.clone();
        let path = path.to_string();
        tokio::task::spawn_blocking(move || {
            let guard = inner.lock().unwrap();
            let session = match guard.session.as_ref() {
                Some(session) => session,
                None => {
                    logger.warn("read_file on a closed session", None);
                    return None;
                }
            };
            match read_remote_file(session, &path) {
                Ok(content) => content,
                Err(err) => {
                    logger.warn(
                        &format!("failed to read remote file {}: {}", path, err),
                        None,
                    );
                    None
                }
            }
        })
        .await
        .unwrap_or(None)
    }

    async fn deploy_authorized_keys(
        &self,
        public_keys: &[String],
    ) -> Result<DeployReport, TaskError> {
        let inner = self.inner.clone();
        let username = self.username.clone();
        let keys = public_keys.to_vec();
        tokio::task::spawn_blocking(move || {
            let mut guard = inner.lock().unwrap();
            let Some(session) = guard.session.as_ref() else {
                return Err(TaskError::connection("SSH session is closed"));
            };
            match deploy_keys_over_sftp(session, &username, &keys) {
                Ok(report) => Ok(report),
                Err(err) => {
                    guard.session = None;
                    Err(err)
                }
            }
        })
        .await
        .map_err(|_| TaskError::internal("SSH deploy task failed"))?
    }

    async fn close(&self) {
        let inner = self.inner.clone();
        let _ = tokio::task::spawn_blocking(move || {
            // dropping the ssh2 session closes the transport; repeat closes
            // are no-ops
            inner.lock().unwrap().session.take();
        })
        .await;
    }
}

fn run_channel(
    session: &Session,
    command: &str,
    timeout: Duration,
) -> Result<CommandOutput, TaskError> {
    let started = Instant::now();
    let mut channel = session.channel_session().map_err(map_ssh_error)?;
    channel.exec(command).map_err(map_ssh_error)?;
    session.set_blocking(false);

    let mut stdout_buf: Vec<u8> = Vec::new();
    let mut stderr_buf: Vec<u8> = Vec::new();
    let mut timed_out = false;

    loop {
        let mut progressed = false;
        let mut buf = [0u8; 8192];
        match channel.stream(0).read(&mut buf) {
            Ok(n) if n > 0 => {
                stdout_buf.extend_from_slice(&buf[..n]);
                progressed = true;
            }
            Ok(_) => {}
            Err(err) => {
                if err.kind() != std::io::ErrorKind::WouldBlock {
                    session.set_blocking(true);
                    return Err(TaskError::connection(format!(
                        "SSH stdout read failed: {}",
                        err
                    )));
                }
            }
        }
        match channel.stderr().read(&mut buf) {
            Ok(n) if n > 0 => {
                stderr_buf.extend_from_slice(&buf[..n]);
                progressed = true;
            }
            Ok(_) => {}
            Err(err) => {
                if err.kind() != std::io::ErrorKind::WouldBlock {
                    session.set_blocking(true);
                    return Err(TaskError::connection(format!(
                        "SSH stderr read failed: {}",
                        err
                    )));
                }
            }
        }

        if channel.eof() {
            break;
        }
        if started.elapsed() > timeout {
            timed_out = true;
            break;
        }
        if !progressed {
            std::thread::sleep(Duration::from_millis(network::COMMAND_POLL_SLEEP_MS));
        }
    }

    if timed_out {
        let _ = channel.close();
        let deadline =
            Instant::now() + Duration::from_millis(network::TIMEOUT_COMMAND_CLOSE_GRACE_MS);
        while Instant::now() < deadline && !channel.eof() {
            std::thread::sleep(Duration::from_millis(network::COMMAND_POLL_SLEEP_MS));
        }
        session.set_blocking(true);
        return Ok(CommandOutput {
            exit_code: output_limits::TIMEOUT_EXIT_CODE,
            stdout: String::new(),
            stderr: output_limits::TIMEOUT_STDERR.to_string(),
            timed_out: true,
            duration_ms: started.elapsed().as_millis(),
        });
    }

    session.set_blocking(true);
    let _ = channel.wait_close();
    let exit_code = channel.exit_status().unwrap_or(-1);

    Ok(CommandOutput {
        exit_code,
        stdout: lossy_utf8(&stdout_buf),
        stderr: lossy_utf8(&stderr_buf),
        timed_out: false,
        duration_ms: started.elapsed().as_millis(),
    })
}

fn read_remote_file(session: &Session, path: &str) -> Result<Option<String>, TaskError> {
    let sftp = session.sftp().map_err(map_ssh_error)?;
    let mut file = match sftp.open(Path::new(path)) {
        Ok(file) => file,
        Err(err) if is_sftp_absent(&err) => return Ok(None),
        Err(err) => return Err(map_ssh_error(err)),
    };
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)
        .map_err(|err| TaskError::connection(format!("SFTP read failed: {}", err)))?;
    Ok(Some(lossy_utf8(&bytes)))
}

fn deploy_keys_over_sftp(
    session: &Session,
    username: &str,
    public_keys: &[String],
) -> Result<DeployReport, TaskError> {
    let sftp = session.sftp().map_err(map_ssh_error)?;
    let ssh_dir = PathBuf::from(format!("/home/{}/.ssh", username));

    // stat-or-create keeps the mode of a pre-existing directory untouched
    if sftp.stat(&ssh_dir).is_err() {
        sftp.mkdir(&ssh_dir, remote::SSH_DIR_MODE)
            .map_err(map_ssh_error)?;
    }

    let target = ssh_dir.join("authorized_keys");
    let existing = match sftp.open(&target) {
        Ok(mut file) => {
            let mut bytes = Vec::new();
            file.read_to_end(&mut bytes)
                .map_err(|err| TaskError::connection(format!("SFTP read failed: {}", err)))?;
            lossy_utf8(&bytes)
        }
        Err(err) if is_sftp_absent(&err) => String::new(),
        Err(err) => return Err(map_ssh_error(err)),
    };

    let outcome = merge_key_lines(&existing, public_keys);

    // temp file in the same directory so the rename never crosses filesystems
    let tmp = ssh_dir.join(format!(".authorized_keys.{}.tmp", uuid::Uuid::new_v4()));
    let write_result = (|| -> Result<(), TaskError> {
        let mut file = sftp
            .open_mode(
                &tmp,
                OpenFlags::WRITE | OpenFlags::CREATE | OpenFlags::TRUNCATE,
                remote::AUTHORIZED_KEYS_MODE,
                OpenType::File,
            )
            .map_err(map_ssh_error)?;
        file.write_all(outcome.content.as_bytes())
            .map_err(|err| TaskError::connection(format!("SFTP write failed: {}", err)))?;
        drop(file);
        sftp.rename(
            &tmp,
            &target,
            Some(RenameFlags::OVERWRITE | RenameFlags::ATOMIC | RenameFlags::NATIVE),
        )
        .map_err(map_ssh_error)?;
        Ok(())
    })();
    if let Err(err) = write_result {
        let _ = sftp.unlink(&tmp);
        return Err(err);
    }

    Ok(DeployReport {
        added: outcome.added(),
        total: outcome.total,
    })
}

fn is_sftp_absent(err: &ssh2::Error) -> bool {
    matches!(
        err.code(),
        ssh2::ErrorCode::SFTP(SFTP_NO_SUCH_FILE) | ssh2::ErrorCode::SFTP(SFTP_NO_SUCH_PATH)
    )
}

fn map_ssh_error(err: ssh2::Error) -> TaskError {
    let io_err: std::io::Error = err.into();
    match io_err.kind() {
        std::io::ErrorKind::TimedOut => {
            TaskError::connection_timeout("SSH operation timed out")
        }
        _ => TaskError::connection(format!("SSH error: {}", io_err)),
    }
}
