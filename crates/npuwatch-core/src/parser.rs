//! Parser for `npu-smi info watch` output.
//!
//! Each data line is whitespace-delimited:
//! `idx chip_id power temp ai_core% ai_cpu% ctrl_cpu% memory% memory_bw%`.
//! Trailing tokens past the ninth are ignored.

use std::str::FromStr;

use crate::error::ParseError;
use crate::system::NpuInfo;

pub const HEADER_MARKER: &str = "NpuID(Idx)";

const MIN_TOKENS: usize = 9;

pub fn is_header(line: &str) -> bool {
    line.contains(HEADER_MARKER)
}

/// Returns `Ok(None)` for headers, blank and short lines.
/// Returns `Err` when a data line has a non-numeric token.
pub fn parse_line(line: &str) -> Result<Option<(i32, NpuInfo)>, ParseError> {
    if is_header(line) {
        return Ok(None);
    }

    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.len() < MIN_TOKENS {
        return Ok(None);
    }

    let device_index = field("device index", tokens[0])?;
    let info = NpuInfo {
        chip_id: field("chip id", tokens[1])?,
        power: field("power", tokens[2])?,
        temperature: field("temperature", tokens[3])?,
        ai_core: ratio("ai_core", tokens[4])?,
        ai_cpu: ratio("ai_cpu", tokens[5])?,
        ctrl_cpu: ratio("ctrl_cpu", tokens[6])?,
        memory: ratio("memory", tokens[7])?,
        memory_bw: ratio("memory_bw", tokens[8])?,
    };

    Ok(Some((device_index, info)))
}

fn field<T: FromStr>(name: &'static str, token: &str) -> Result<T, ParseError> {
    token.parse().map_err(|_| ParseError {
        field: name,
        token: token.to_string(),
    })
}

fn ratio(name: &'static str, token: &str) -> Result<f64, ParseError> {
    let percent: i64 = field(name, token)?;
    Ok(percent as f64 / 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_reference_line() {
        let (idx, info) = parse_line("0 1 65.3 42 80 10 5 55 30").unwrap().unwrap();
        assert_eq!(idx, 0);
        assert_eq!(info.chip_id, 1);
        assert_eq!(info.power, 65.3);
        assert_eq!(info.temperature, 42);
        assert_eq!(info.ai_core, 0.80);
        assert_eq!(info.ai_cpu, 0.10);
        assert_eq!(info.ctrl_cpu, 0.05);
        assert_eq!(info.memory, 0.55);
        assert_eq!(info.memory_bw, 0.30);
    }

    #[test]
    fn test_ratios_are_percent_over_hundred() {
        for pct in [0, 1, 7, 33, 50, 99, 100] {
            let line = format!("3 7 12.0 50 {pct} {pct} {pct} {pct} {pct}");
            let (_, info) = parse_line(&line).unwrap().unwrap();
            let expected = pct as f64 / 100.0;
            assert_eq!(info.ai_core, expected);
            assert_eq!(info.ai_cpu, expected);
            assert_eq!(info.ctrl_cpu, expected);
            assert_eq!(info.memory, expected);
            assert_eq!(info.memory_bw, expected);
        }
    }

    #[test]
    fn test_short_lines_are_ignored() {
        assert_eq!(parse_line("garbage line too short"), Ok(None));
        assert_eq!(parse_line(""), Ok(None));
        assert_eq!(parse_line("   \t "), Ok(None));
        assert_eq!(parse_line("0 1 65.3 42 80 10 5 55"), Ok(None));
    }

    #[test]
    fn test_trailing_tokens_ignored() {
        let (idx, info) = parse_line("  2 5 70.0 48 10 20 30 40 50 extra stuff  ")
            .unwrap()
            .unwrap();
        assert_eq!(idx, 2);
        assert_eq!(info.chip_id, 5);
        assert_eq!(info.memory_bw, 0.5);
    }

    #[test]
    fn test_negative_ids_are_data() {
        let (idx, info) = parse_line("-1 -1 65.3 -5 80 10 5 55 30").unwrap().unwrap();
        assert_eq!(idx, -1);
        assert_eq!(info.chip_id, -1);
        assert_eq!(info.temperature, -5);
    }

    #[test]
    fn test_header_is_skipped() {
        let header = "NpuID(Idx)  ChipId(Idx) Pwr(W)      Temp(C)     AI Core(%)  AI Cpu(%)   Ctrl Cpu(%) Memory(%)   Memory BW(%)";
        assert!(is_header(header));
        assert_eq!(parse_line(header), Ok(None));
    }

    #[test]
    fn test_non_numeric_token_is_error() {
        let err = parse_line("0 1 NA 42 80 10 5 55 30").unwrap_err();
        assert_eq!(err.field, "power");
        assert_eq!(err.token, "NA");

        let err = parse_line("0 1 65.3 42 80 10 5 55 3x").unwrap_err();
        assert_eq!(err.field, "memory_bw");

        // Percentages are integers; a fractional one breaks the schema.
        let err = parse_line("0 1 65.3 42 80.5 10 5 55 30").unwrap_err();
        assert_eq!(err.field, "ai_core");
    }
}
