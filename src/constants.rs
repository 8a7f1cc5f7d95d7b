pub mod network {
    pub const SSH_DEFAULT_PORT: u16 = 22;
    pub const TIMEOUT_SSH_READY_MS: u64 = 10_000;
    pub const TIMEOUT_COMMAND_CLOSE_GRACE_MS: u64 = 2_000;
    pub const KEEPALIVE_INTERVAL_MS: u64 = 30_000;
    pub const COMMAND_POLL_SLEEP_MS: u64 = 20;
    pub const SYSTEM_INFO_PROBE_TIMEOUT_SECS: u64 = 30;
}

pub mod limits {
    pub const MIN_PORT: u16 = 1;
    pub const MAX_PORT: u16 = 65_535;
    pub const MIN_COMMAND_TIMEOUT_SECS: u64 = 1;
    pub const MAX_COMMAND_TIMEOUT_SECS: u64 = 3_600;
    pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 60;
}

pub mod output {
    pub const ARCHIVE_THRESHOLD_BYTES: usize = 10_000;
    pub const INLINE_LIMIT_BYTES: usize = 5_000;
    pub const TRUNCATION_MARKER: &str = "... (truncated)";
    pub const TIMEOUT_EXIT_CODE: i32 = 255;
    pub const TIMEOUT_STDERR: &str = "Command timed out";
}

pub mod remote {
    pub const SSH_DIR_MODE: i32 = 0o700;
    pub const AUTHORIZED_KEYS_MODE: i32 = 0o600;
}

pub mod crypto {
    pub const KEY_SIZE: usize = 32;
    pub const IV_SIZE: usize = 12;
    pub const TAG_SIZE: usize = 16;
}

pub mod stream {
    pub const TOPIC_CAPACITY: usize = 256;
}
