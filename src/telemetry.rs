// AngleControlPanel
// Author: J Taylor
// Supplied without warranty.
// Use at your own risk.


// src/telemetry.rs
//
// Inbound side of the serial protocol: bytes -> lines -> angle readings.
// The controller prints one angle per line. Some firmware builds append
// more comma separated fields; only the first one is used.

/// Longest line we are willing to hold without seeing a terminator.
pub const MAX_LINE_BYTES: usize = 1024;

#[derive(Debug, Clone, PartialEq)]
pub enum Reading {
    Valid(f64),
    Reject(String),
}

/// Parse one line (terminators already removed).
pub fn parse_line(line: &str) -> Reading {
    let field = line.trim().split(',').next().unwrap_or("").trim();

    if field.is_empty() {
        return Reading::Reject("empty line".to_string());
    }

    match field.parse::<f64>() {
        Ok(v) if v.is_finite() => Reading::Valid(v),
        Ok(v) => Reading::Reject(format!("non-finite angle '{}'", v)),
        Err(e) => Reading::Reject(format!("'{}': {}", field, e)),
    }
}

// ---------------- Line assembly ----------------

/// Reassembles newline terminated lines from arbitrary read chunks.
#[derive(Debug, Default)]
pub struct LineAssembler {
    pending: Vec<u8>,
    overflowed: bool,
}

impl LineAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();

        for &b in bytes {
            if b == b'\n' {
                if self.overflowed {
                    // tail of an oversized line
                    self.overflowed = false;
                    self.pending.clear();
                    continue;
                }
                let raw = std::mem::take(&mut self.pending);
                let line = String::from_utf8_lossy(&raw);
                lines.push(line.trim_end_matches('\r').to_string());
                continue;
            }

            if self.overflowed {
                continue;
            }

            self.pending.push(b);
            if self.pending.len() > MAX_LINE_BYTES {
                log::warn!(
                    "Dropping unterminated telemetry line longer than {} bytes",
                    MAX_LINE_BYTES
                );
                self.pending.clear();
                self.overflowed = true;
            }
        }

        lines
    }

    /// Bytes received since the last terminator.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}
