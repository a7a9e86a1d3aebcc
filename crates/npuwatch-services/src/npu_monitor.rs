use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::mpsc::channel;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use npuwatch_core::{
    is_header, parse_line, MonitorConfig, NpuWatchError, Result, SchemaBreakPolicy,
};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::runtime::Builder;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::pty;
use crate::snapshot_store::{Snapshot, SnapshotStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Starting,
    Running,
    Stopped,
}

impl MonitorState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Starting,
            1 => Self::Running,
            _ => Self::Stopped,
        }
    }
}

/// Flags written by the background thread, read by everyone else.
#[derive(Debug)]
struct Liveness {
    enabled: AtomicBool,
    state: AtomicU8,
    timeouts: AtomicU64,
}

impl Liveness {
    fn new() -> Self {
        Self {
            enabled: AtomicBool::new(false),
            state: AtomicU8::new(MonitorState::Starting as u8),
            timeouts: AtomicU64::new(0),
        }
    }

    fn set_running(&self) {
        self.enabled.store(true, Ordering::SeqCst);
        self.state.store(MonitorState::Running as u8, Ordering::SeqCst);
    }

    fn set_stopped(&self) {
        self.enabled.store(false, Ordering::SeqCst);
        self.state.store(MonitorState::Stopped as u8, Ordering::SeqCst);
    }
}

enum LineOutcome {
    Continue,
    Halt,
}

/// Background NPU monitor.
///
/// Runs the configured watch command on a dedicated thread and keeps the
/// latest parsed reading per device. Errors never reach the caller: they
/// clear `is_enabled()` and are logged.
pub struct Monitor {
    store: SnapshotStore,
    liveness: Arc<Liveness>,
    cancel: CancellationToken,
    thread_handle: Mutex<Option<JoinHandle<()>>>,
}

impl Monitor {
    /// Spawn the watch command and start reading.
    ///
    /// Returns once the command has been spawned or has failed to spawn,
    /// so a spawn failure is already visible through `is_enabled()`.
    pub fn start(config: MonitorConfig) -> Self {
        Self::start_with_store(config, SnapshotStore::new())
    }

    pub fn start_with_store(config: MonitorConfig, store: SnapshotStore) -> Self {
        let liveness = Arc::new(Liveness::new());
        let cancel = CancellationToken::new();
        let (ready_tx, ready_rx) = channel();

        let thread_store = store.clone();
        let thread_liveness = liveness.clone();
        let thread_cancel = cancel.clone();

        let spawned = thread::Builder::new()
            .name("npu-monitor".to_string())
            .spawn(move || {
                run(config, thread_store, &thread_liveness, thread_cancel, || {
                    let _ = ready_tx.send(());
                });
                thread_liveness.set_stopped();
            });

        let thread_handle = match spawned {
            Ok(handle) => {
                // Err means the thread died before reporting; it still marks itself stopped.
                let _ = ready_rx.recv();
                Some(handle)
            }
            Err(e) => {
                error!("Failed to spawn NPU monitor thread: {}", e);
                liveness.set_stopped();
                None
            }
        };

        Self {
            store,
            liveness,
            cancel,
            thread_handle: Mutex::new(thread_handle),
        }
    }

    /// Copy of the latest reading per device index.
    pub fn snapshot(&self) -> Snapshot {
        self.store.snapshot()
    }

    pub fn is_enabled(&self) -> bool {
        self.liveness.enabled.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> MonitorState {
        MonitorState::from_u8(self.liveness.state.load(Ordering::SeqCst))
    }

    /// Number of read timeouts seen so far.
    pub fn timeouts(&self) -> u64 {
        self.liveness.timeouts.load(Ordering::SeqCst)
    }

    pub fn store(&self) -> SnapshotStore {
        self.store.clone()
    }

    /// Kill the watch command and wait for the background thread to exit.
    pub fn stop(&self) {
        if !self.cancel.is_cancelled() {
            info!("Stopping NPU monitor");
            self.cancel.cancel();
        }
        self.join();
    }

    /// Wait for the background thread to exit on its own.
    pub fn join(&self) {
        let handle = self
            .thread_handle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!("NPU monitor thread panicked");
                self.liveness.set_stopped();
            }
        }
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[instrument(skip_all, fields(command = %config.command))]
fn run(
    config: MonitorConfig,
    store: SnapshotStore,
    liveness: &Liveness,
    cancel: CancellationToken,
    ready: impl FnOnce(),
) {
    let rt = match Builder::new_current_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            liveness.set_stopped();
            ready();
            return;
        }
    };

    rt.block_on(async {
        let (mut child, output) = match spawn_command(&config) {
            Ok(spawned) => spawned,
            Err(e) => {
                error!("NPU monitor disabled: {}", e);
                liveness.set_stopped();
                ready();
                return;
            }
        };

        info!(pid = ?child.id(), "NPU monitor started");
        liveness.set_running();
        ready();

        read_loop(output, &config, &store, liveness, &cancel).await;

        liveness.set_stopped();
        if let Err(e) = child.kill().await {
            debug!("Monitor command already exited: {}", e);
        }
        info!("NPU monitor stopped");
    });

    // A blocking read on the pty may outlive the loop if a grandchild holds the terminal.
    rt.shutdown_background();
}

/// Spawn the command with its stdout on a pseudo-terminal; returns the child and the master side.
fn spawn_command(config: &MonitorConfig) -> Result<(Child, File)> {
    config.validate()?;
    let (program, args) = config.program_and_args()?;
    let pty = pty::open().map_err(NpuWatchError::Pty)?;

    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(pty.slave)
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => NpuWatchError::CommandNotFound(program.to_string()),
            _ => NpuWatchError::Spawn(e),
        })?;

    Ok((child, pty.master))
}

async fn read_loop(
    output: File,
    config: &MonitorConfig,
    store: &SnapshotStore,
    liveness: &Liveness,
    cancel: &CancellationToken,
) {
    let mut lines = BufReader::new(output).lines();
    let read_timeout = Duration::from_millis(config.read_timeout_ms);

    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Stop requested");
                return;
            }
            next = tokio::time::timeout(read_timeout, lines.next_line()) => next,
        };

        let line = match next {
            Ok(Ok(Some(line))) => line,
            Ok(Ok(None)) => {
                info!("Monitor command closed its output");
                return;
            }
            Ok(Err(e)) if pty::is_hangup(&e) => {
                info!("Monitor command closed its output");
                return;
            }
            Ok(Err(e)) => {
                warn!("Failed to read monitor output: {}", e);
                return;
            }
            Err(_) => {
                let count = liveness.timeouts.fetch_add(1, Ordering::SeqCst) + 1;
                debug!(
                    timeout_ms = config.read_timeout_ms,
                    count, "Timeout occurred while reading output"
                );
                continue;
            }
        };

        if let LineOutcome::Halt = handle_line(&line, config.on_schema_break, store, liveness) {
            return;
        }
    }
}

fn handle_line(
    line: &str,
    policy: SchemaBreakPolicy,
    store: &SnapshotStore,
    liveness: &Liveness,
) -> LineOutcome {
    let line = line.trim();
    if is_header(line) {
        debug!("Skipping header line");
        return LineOutcome::Continue;
    }

    match parse_line(line) {
        Ok(Some((device_index, info))) => {
            store.update(device_index, info);
            liveness.enabled.store(true, Ordering::SeqCst);
            LineOutcome::Continue
        }
        Ok(None) => LineOutcome::Continue,
        Err(e) => {
            warn!(line, error = %e, ?policy, "Monitor output no longer matches the expected schema");
            liveness.enabled.store(false, Ordering::SeqCst);
            match policy {
                SchemaBreakPolicy::Continue => LineOutcome::Continue,
                SchemaBreakPolicy::Halt => LineOutcome::Halt,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn running() -> Liveness {
        let liveness = Liveness::new();
        liveness.set_running();
        liveness
    }

    #[test]
    fn test_state_from_u8() {
        assert_eq!(MonitorState::from_u8(MonitorState::Starting as u8), MonitorState::Starting);
        assert_eq!(MonitorState::from_u8(MonitorState::Running as u8), MonitorState::Running);
        assert_eq!(MonitorState::from_u8(MonitorState::Stopped as u8), MonitorState::Stopped);
    }

    #[test]
    fn test_data_line_updates_store() {
        let store = SnapshotStore::new();
        let liveness = running();

        let outcome = handle_line("0 1 65.3 42 80 10 5 55 30", SchemaBreakPolicy::Continue, &store, &liveness);

        assert!(matches!(outcome, LineOutcome::Continue));
        assert_eq!(store.snapshot()[&0].chip_id, 1);
        assert!(liveness.enabled.load(Ordering::SeqCst));
    }

    #[test]
    fn test_header_and_short_lines_leave_state_alone() {
        let store = SnapshotStore::new();
        let liveness = running();

        handle_line("NpuID(Idx) ChipId(Idx) Pwr(W) Temp(C)", SchemaBreakPolicy::Halt, &store, &liveness);
        handle_line("garbage line too short", SchemaBreakPolicy::Halt, &store, &liveness);
        handle_line("", SchemaBreakPolicy::Halt, &store, &liveness);

        assert!(store.is_empty());
        assert!(liveness.enabled.load(Ordering::SeqCst));
    }

    #[test]
    fn test_schema_break_continue_recovers() {
        let store = SnapshotStore::new();
        let liveness = running();

        let outcome = handle_line("0 1 NA 42 80 10 5 55 30", SchemaBreakPolicy::Continue, &store, &liveness);
        assert!(matches!(outcome, LineOutcome::Continue));
        assert!(!liveness.enabled.load(Ordering::SeqCst));

        handle_line("1 2 60.0 40 10 10 10 10 10", SchemaBreakPolicy::Continue, &store, &liveness);
        assert!(liveness.enabled.load(Ordering::SeqCst));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_schema_break_halt() {
        let store = SnapshotStore::new();
        let liveness = running();

        let outcome = handle_line("0 1 65.3 hot 80 10 5 55 30", SchemaBreakPolicy::Halt, &store, &liveness);

        assert!(matches!(outcome, LineOutcome::Halt));
        assert!(!liveness.enabled.load(Ordering::SeqCst));
        assert!(store.is_empty());
    }
}
