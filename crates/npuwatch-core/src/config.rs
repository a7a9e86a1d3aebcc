use serde::{Deserialize, Serialize};

use crate::error::{NpuWatchError, Result};

pub const DEFAULT_COMMAND: &str = "npu-smi info watch -s ptaicmb";
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 30_000;

pub const COMMAND_ENV: &str = "NPU_MONITOR_COMMAND";
pub const TIMEOUT_ENV: &str = "NPU_MONITOR_TIMEOUT_MS";

/// What the monitor does after a data line fails numeric conversion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaBreakPolicy {
    /// Clear liveness and keep reading; the next good line restores it.
    #[default]
    Continue,
    /// Clear liveness and stop the monitor for good.
    Halt,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(default = "default_command")]
    pub command: String,
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    #[serde(default)]
    pub on_schema_break: SchemaBreakPolicy,
}

fn default_command() -> String {
    DEFAULT_COMMAND.to_string()
}

fn default_read_timeout_ms() -> u64 {
    DEFAULT_READ_TIMEOUT_MS
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            command: default_command(),
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
            on_schema_break: SchemaBreakPolicy::default(),
        }
    }
}

impl MonitorConfig {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Self::default()
        }
    }

    pub fn with_read_timeout_ms(mut self, read_timeout_ms: u64) -> Self {
        self.read_timeout_ms = read_timeout_ms;
        self
    }

    pub fn with_schema_break_policy(mut self, policy: SchemaBreakPolicy) -> Self {
        self.on_schema_break = policy;
        self
    }

    /// Defaults overridden by `NPU_MONITOR_COMMAND` and `NPU_MONITOR_TIMEOUT_MS`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(command) = lookup(COMMAND_ENV).filter(|c| !c.trim().is_empty()) {
            config.command = command;
        }

        if let Some(raw) = lookup(TIMEOUT_ENV) {
            config.read_timeout_ms = raw.trim().parse().map_err(|_| {
                NpuWatchError::Config(format!("{} must be milliseconds, got {:?}", TIMEOUT_ENV, raw))
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.read_timeout_ms == 0 {
            return Err(NpuWatchError::Config(
                "read timeout must be at least 1 ms".to_string(),
            ));
        }
        Ok(())
    }

    /// Split the command string into program and arguments. No shell is involved.
    pub fn program_and_args(&self) -> Result<(&str, Vec<&str>)> {
        let mut parts = self.command.split_whitespace();
        let program = parts.next().ok_or(NpuWatchError::EmptyCommand)?;
        Ok((program, parts.collect()))
    }
}
