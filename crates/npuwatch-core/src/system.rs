//! System-level types for hardware monitoring

use serde::{Deserialize, Serialize};
use std::fmt;

/// One NPU reading. Ratios are in `[0, 1]`, converted from integer percentages.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NpuInfo {
    pub chip_id: i32,
    pub power: f64,
    pub temperature: i32,
    pub ai_core: f64,
    pub ai_cpu: f64,
    pub ctrl_cpu: f64,
    pub memory: f64,
    pub memory_bw: f64,
}

impl fmt::Display for NpuInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "NpuInfo(chip_id={}, power={}, temperature={}, ai_core={}, ai_cpu={}, ctrl_cpu={}, memory={}, memory_bw={})",
            self.chip_id,
            self.power,
            self.temperature,
            self.ai_core,
            self.ai_cpu,
            self.ctrl_cpu,
            self.memory,
            self.memory_bw
        )
    }
}
