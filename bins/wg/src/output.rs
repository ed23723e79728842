//! Output formatting utilities for WireGuard.

use std::time::SystemTime;

use base64::prelude::*;
use wg_ipc::Key;

/// Encode a key as base64.
pub fn base64_encode(data: &[u8]) -> String {
    BASE64_STANDARD.encode(data)
}

/// Decode a base64 key, which must be exactly 32 bytes.
pub fn parse_key(s: &str) -> Result<Key, String> {
    let bytes = BASE64_STANDARD
        .decode(s.trim())
        .map_err(|e| format!("invalid base64 key: {}", e))?;
    Key::try_from(bytes.as_slice())
        .map_err(|_| format!("invalid key length: expected 32 bytes, got {}", bytes.len()))
}

/// Format a byte count with binary units.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KiB", "MiB", "GiB", "TiB"];

    if bytes < 1024 {
        return format!("{} B", bytes);
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit + 1 < UNITS.len() {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.2} {}", value, UNITS[unit])
}

/// Format the time elapsed since `time`, e.g. "1 hour, 3 seconds ago".
pub fn format_time_ago(time: SystemTime) -> String {
    let Ok(elapsed) = SystemTime::now().duration_since(time) else {
        return "in the future".to_string();
    };

    let mut secs = elapsed.as_secs();
    if secs == 0 {
        return "now".to_string();
    }

    let mut parts = Vec::new();
    for (unit, len) in [("day", 86400), ("hour", 3600), ("minute", 60), ("second", 1)] {
        let n = secs / len;
        secs %= len;
        if n > 0 {
            parts.push(format!("{} {}{}", n, unit, if n == 1 { "" } else { "s" }));
        }
    }
    format!("{} ago", parts.join(", "))
}
