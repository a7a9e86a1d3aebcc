pub mod config;
pub mod error;
pub mod parser;
pub mod system;

pub use config::{MonitorConfig, SchemaBreakPolicy, DEFAULT_COMMAND};
pub use error::{NpuWatchError, ParseError, Result};
pub use parser::{is_header, parse_line, HEADER_MARKER};
pub use system::NpuInfo;
