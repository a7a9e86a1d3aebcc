mod npu_monitor;
mod pty;
mod snapshot_store;

pub use npu_monitor::{Monitor, MonitorState};
pub use snapshot_store::{Snapshot, SnapshotStore};

// Re-export core types so consumers only need this crate
pub use npuwatch_core::{
    MonitorConfig, NpuInfo, NpuWatchError, SchemaBreakPolicy, DEFAULT_COMMAND,
};
