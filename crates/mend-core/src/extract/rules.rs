//! Rule-based failure extraction used when the inference service is down.
//!
//! Recognises the common shapes of Jest/Vitest, pytest and Rust test output.
//! The result follows the same contract as model-backed extraction: ordered
//! by first appearance, duplicates kept, unknown lines reported as 0.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

use crate::domain::Failure;

/// How far below an error line to look for a stack frame with a location.
const FRAME_LOOKAHEAD: usize = 6;

struct LogRules {
    jest_fail: Regex,
    error_line: Regex,
    location: Regex,
    pytest_failed: Regex,
    pytest_location: Regex,
    rust_panic: Regex,
    rust_panic_legacy: Regex,
}

fn rules() -> &'static LogRules {
    static RULES: OnceLock<LogRules> = OnceLock::new();
    RULES.get_or_init(|| LogRules {
        jest_fail: Regex::new(r"^\s*FAIL\s+(?P<file>\S+)").expect("valid regex"),
        error_line: Regex::new(
            r"^\s*(?:●\s*)?(?P<msg>(?:[A-Za-z_$][\w$.]*)?(?:Error|Exception)(?:\s*\[[^\]]*\])?:\s.*)$",
        )
        .expect("valid regex"),
        location: Regex::new(r"(?P<file>[A-Za-z0-9_@./\[\]-]+\.[A-Za-z0-9]{1,5}):(?P<line>\d+)")
            .expect("valid regex"),
        pytest_failed: Regex::new(r"^FAILED\s+(?P<file>[^\s:]+)::(?P<test>\S+)(?:\s+-\s+(?P<msg>.*))?")
            .expect("valid regex"),
        pytest_location: Regex::new(r"^(?P<file>\S+\.py):(?P<line>\d+):\s").expect("valid regex"),
        rust_panic: Regex::new(
            r"panicked at (?P<file>[^\s:']+):(?P<line>\d+):\d+:?(?P<rest>.*)$",
        )
        .expect("valid regex"),
        rust_panic_legacy: Regex::new(
            r"panicked at '(?P<msg>.*)', (?P<file>[^\s:]+):(?P<line>\d+)",
        )
        .expect("valid regex"),
    })
}

struct Block {
    file: String,
    saw_error: bool,
}

/// Extract failures from raw test output without inference.
pub fn parse_failures(logs: &str) -> Vec<Failure> {
    let rules = rules();
    let lines: Vec<&str> = logs.lines().collect();
    let mut found: Vec<(String, u32, String)> = Vec::new();
    let mut block: Option<Block> = None;
    let mut pytest_lines: HashMap<String, u32> = HashMap::new();

    for (i, line) in lines.iter().enumerate() {
        if let Some(caps) = rules.jest_fail.captures(line) {
            flush_block(block.take(), &mut found);
            block = Some(Block {
                file: caps["file"].to_string(),
                saw_error: false,
            });
            continue;
        }

        if let Some(caps) = rules.pytest_location.captures(line) {
            if let Ok(n) = caps["line"].parse() {
                pytest_lines.insert(caps["file"].to_string(), n);
            }
            continue;
        }

        if let Some(caps) = rules.pytest_failed.captures(line) {
            let file = caps["file"].to_string();
            let message = caps
                .name("msg")
                .map(|m| m.as_str().trim().to_string())
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| format!("test {} failed", &caps["test"]));
            let line_no = pytest_lines.get(&file).copied().unwrap_or(0);
            found.push((file, line_no, message));
            continue;
        }

        if let Some(caps) = rules.rust_panic_legacy.captures(line) {
            found.push((
                caps["file"].to_string(),
                caps["line"].parse().unwrap_or(0),
                caps["msg"].to_string(),
            ));
            continue;
        }

        if let Some(caps) = rules.rust_panic.captures(line) {
            let rest = caps["rest"].trim();
            let message = if rest.is_empty() {
                lines.get(i + 1).map(|l| l.trim()).unwrap_or_default().to_string()
            } else {
                rest.to_string()
            };
            let message = if message.is_empty() {
                "test panicked".to_string()
            } else {
                message
            };
            found.push((
                caps["file"].to_string(),
                caps["line"].parse().unwrap_or(0),
                message,
            ));
            continue;
        }

        if let Some(caps) = rules.error_line.captures(line) {
            let message = caps["msg"].trim().to_string();
            let (file, line_no) = locate(rules, &message, &lines[i + 1..])
                .or_else(|| block.as_ref().map(|b| (b.file.clone(), 0)))
                .unwrap_or_else(|| ("unknown".to_string(), 0));
            if let Some(b) = block.as_mut() {
                b.saw_error = true;
            }
            found.push((file, line_no, message));
        }
    }
    flush_block(block, &mut found);

    found
        .into_iter()
        .enumerate()
        .map(|(index, (file, line, message))| Failure::new(index, file, line, message))
        .collect()
}

fn flush_block(block: Option<Block>, found: &mut Vec<(String, u32, String)>) {
    if let Some(b) = block {
        if !b.saw_error {
            found.push((b.file, 0, "test suite failed".to_string()));
        }
    }
}

/// Location in the error line itself, else the first non-dependency frame below it.
fn locate(rules: &LogRules, message: &str, following: &[&str]) -> Option<(String, u32)> {
    let from = |text: &str| {
        rules
            .location
            .captures_iter(text)
            .find(|c| !c["file"].contains("node_modules"))
            .and_then(|c| Some((c["file"].to_string(), c["line"].parse().ok()?)))
    };
    from(message).or_else(|| {
        following
            .iter()
            .take(FRAME_LOOKAHEAD)
            .take_while(|l| l.trim_start().starts_with("at ") || l.trim().is_empty())
            .find_map(|l| from(l))
    })
}
