//! Structured JSON logging
//!
//! One log line is one event: a flat JSON object with the event name
//! first, then the severity, then the remaining fields in alphabetical
//! order. Writes are synchronous and unbuffered, so a crash never loses
//! an already-reported event. The `RATEDB_LOG` environment variable
//! sets the minimum severity emitted (default `info`).

use std::collections::BTreeMap;
use std::fmt::{self, Write as _};
use std::io::{self, Write};
use std::sync::OnceLock;

/// Log severity levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Fine-grained diagnostic detail
    Trace = 0,
    /// Normal operations
    Info = 1,
    /// Recoverable issues
    Warn = 2,
    /// Operation failures
    Error = 3,
}

impl Severity {
    /// The string tag written into log lines.
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Trace => "TRACE",
            Severity::Info => "INFO",
            Severity::Warn => "WARN",
            Severity::Error => "ERROR",
        }
    }

    /// Parses a severity name, case-insensitively.
    pub fn parse(name: &str) -> Option<Severity> {
        match name.trim().to_ascii_lowercase().as_str() {
            "trace" => Some(Severity::Trace),
            "info" => Some(Severity::Info),
            "warn" => Some(Severity::Warn),
            "error" => Some(Severity::Error),
            _ => None,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Minimum severity emitted, read once from `RATEDB_LOG`.
fn min_severity() -> Severity {
    static MIN: OnceLock<Severity> = OnceLock::new();
    *MIN.get_or_init(|| {
        std::env::var("RATEDB_LOG")
            .ok()
            .and_then(|name| Severity::parse(&name))
            .unwrap_or(Severity::Info)
    })
}

fn push_escaped(out: &mut String, raw: &str) {
    for ch in raw.chars() {
        match ch {
            '"' | '\\' => {
                out.push('\\');
                out.push(ch);
            }
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            ch if ch.is_control() => {
                let _ = write!(out, "\\u{:04x}", ch as u32);
            }
            ch => out.push(ch),
        }
    }
}

/// Renders one complete log line. Manual JSON keeps the field order
/// deterministic: event, severity, then the remaining keys sorted.
fn render_line(severity: Severity, event: &str, fields: &[(&str, &str)]) -> String {
    let mut line = String::with_capacity(64 + fields.len() * 32);
    line.push_str("{\"event\":\"");
    push_escaped(&mut line, event);
    line.push_str("\",\"severity\":\"");
    line.push_str(severity.as_str());
    line.push('"');

    let ordered: BTreeMap<&str, &str> = fields.iter().copied().collect();
    for (key, value) in ordered {
        line.push_str(",\"");
        push_escaped(&mut line, key);
        line.push_str("\":\"");
        push_escaped(&mut line, value);
        line.push('"');
    }

    line.push_str("}\n");
    line
}

/// Structured JSON logger with deterministic field ordering.
pub struct Logger;

impl Logger {
    /// Logs an event to stdout, subject to the minimum severity.
    pub fn log(severity: Severity, event: &str, fields: &[(&str, &str)]) {
        if severity >= min_severity() {
            Self::emit(&mut io::stdout(), severity, event, fields);
        }
    }

    /// Logs an event to stderr, subject to the minimum severity.
    pub fn log_stderr(severity: Severity, event: &str, fields: &[(&str, &str)]) {
        if severity >= min_severity() {
            Self::emit(&mut io::stderr(), severity, event, fields);
        }
    }

    fn emit<W: Write>(writer: &mut W, severity: Severity, event: &str, fields: &[(&str, &str)]) {
        // One write_all call keeps the line intact under interleaving
        let line = render_line(severity, event, fields);
        let _ = writer.write_all(line.as_bytes());
        let _ = writer.flush();
    }

    /// Logs at TRACE level.
    pub fn trace(event: &str, fields: &[(&str, &str)]) {
        Self::log(Severity::Trace, event, fields);
    }

    /// Logs at INFO level.
    pub fn info(event: &str, fields: &[(&str, &str)]) {
        Self::log(Severity::Info, event, fields);
    }

    /// Logs at WARN level.
    pub fn warn(event: &str, fields: &[(&str, &str)]) {
        Self::log(Severity::Warn, event, fields);
    }

    /// Logs at ERROR level, to stderr.
    pub fn error(event: &str, fields: &[(&str, &str)]) {
        Self::log_stderr(Severity::Error, event, fields);
    }
}

#[cfg(test)]
pub fn capture_log(severity: Severity, event: &str, fields: &[(&str, &str)]) -> String {
    render_line(severity, event, fields)
}
