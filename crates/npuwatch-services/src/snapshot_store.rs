use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use npuwatch_core::NpuInfo;

/// Latest reading per device index, ordered by index.
pub type Snapshot = BTreeMap<i32, NpuInfo>;

/// Shared latest-value store. Clones share the same map.
///
/// One writer (the monitor) replaces entries; readers take a copy so
/// iteration never holds the lock.
#[derive(Debug, Clone, Default)]
pub struct SnapshotStore {
    inner: Arc<Mutex<Snapshot>>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&self, device_index: i32, info: NpuInfo) {
        self.lock().insert(device_index, info);
    }

    pub fn snapshot(&self) -> Snapshot {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // Values are plain data, so a panicked writer cannot leave the map half-updated.
    fn lock(&self) -> MutexGuard<'_, Snapshot> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
