use anyhow::Result;
use clap::{Parser, ValueEnum};
use npuwatch_services::{Monitor, MonitorConfig, MonitorState, SchemaBreakPolicy, Snapshot};
use std::io::{self, Write};
use std::thread;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "npuwatch")]
#[command(about = "NpuWatch - live NPU telemetry from npu-smi", long_about = None)]
struct Cli {
    /// Watch command to run (default: NPU_MONITOR_COMMAND or `npu-smi info watch -s ptaicmb`)
    #[arg(short, long)]
    command: Option<String>,

    /// Read timeout in milliseconds before logging an idle period
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    timeout_ms: Option<u64>,

    /// Stop monitoring on the first line that does not match the schema
    #[arg(long)]
    halt_on_schema_break: bool,

    /// How often to print the snapshot
    #[arg(short, long, default_value = "1000")]
    interval_ms: u64,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    output: OutputFormat,

    /// Stop after this many snapshots
    #[arg(short = 'n', long)]
    count: Option<u64>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

impl Cli {
    fn monitor_config(&self) -> Result<MonitorConfig> {
        let mut config = MonitorConfig::from_env()?;
        if let Some(command) = &self.command {
            config.command = command.clone();
        }
        if let Some(timeout_ms) = self.timeout_ms {
            config.read_timeout_ms = timeout_ms;
        }
        if self.halt_on_schema_break {
            config.on_schema_break = SchemaBreakPolicy::Halt;
        }
        config.validate()?;
        Ok(config)
    }
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = cli.monitor_config()?;

    info!(command = %config.command, "Starting NPU monitor");
    let monitor = Monitor::start(config);
    let interval = Duration::from_millis(cli.interval_ms);
    let mut stdout = io::stdout();
    let mut polls = 0u64;

    loop {
        let snapshot = monitor.snapshot();
        match cli.output {
            OutputFormat::Table => print_table(&mut stdout, &snapshot, monitor.is_enabled())?,
            OutputFormat::Json => print_json(&mut stdout, &snapshot, monitor.is_enabled())?,
        }
        stdout.flush()?;

        polls += 1;
        if cli.count.is_some_and(|count| polls >= count) {
            break;
        }
        if monitor.state() == MonitorState::Stopped {
            eprintln!("NPU monitor stopped");
            break;
        }

        thread::sleep(interval);
    }

    monitor.stop();
    Ok(())
}

fn print_table(out: &mut impl Write, snapshot: &Snapshot, enabled: bool) -> Result<()> {
    if snapshot.is_empty() {
        writeln!(out, "No data available (enabled: {})", enabled)?;
        return Ok(());
    }

    writeln!(
        out,
        "{:>4} {:>5} {:>8} {:>5} {:>8} {:>7} {:>8} {:>7} {:>7}",
        "NPU", "Chip", "Power(W)", "Temp", "AI Core", "AI CPU", "Ctrl CPU", "Memory", "Mem BW"
    )?;
    for (idx, info) in snapshot {
        writeln!(
            out,
            "{:>4} {:>5} {:>8.1} {:>5} {:>8.2} {:>7.2} {:>8.2} {:>7.2} {:>7.2}",
            idx,
            info.chip_id,
            info.power,
            info.temperature,
            info.ai_core,
            info.ai_cpu,
            info.ctrl_cpu,
            info.memory,
            info.memory_bw
        )?;
    }
    if !enabled {
        writeln!(out, "(monitor disabled, data may be stale)")?;
    }
    writeln!(out)?;
    Ok(())
}

fn print_json(out: &mut impl Write, snapshot: &Snapshot, enabled: bool) -> Result<()> {
    let value = serde_json::json!({
        "enabled": enabled,
        "devices": snapshot,
    });
    writeln!(out, "{}", value)?;
    Ok(())
}
