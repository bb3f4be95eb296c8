//! Utility functions for hacoord

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Parse duration string (e.g., "250ms", "30s", "5m", "1h")
pub fn parse_duration(s: &str) -> crate::Result<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return Err(crate::Error::InvalidConfig("empty duration".into()));
    }

    let split = s
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| crate::Error::InvalidConfig(format!("missing duration unit: {}", s)))?;
    let (num_str, unit) = s.split_at(split);

    let num: u64 = num_str
        .parse()
        .map_err(|_| crate::Error::InvalidConfig(format!("invalid duration: {}", s)))?;

    let scaled = |factor: u64| {
        num.checked_mul(factor)
            .map(Duration::from_secs)
            .ok_or_else(|| crate::Error::InvalidConfig(format!("duration out of range: {}", s)))
    };

    match unit {
        "ms" => Ok(Duration::from_millis(num)),
        "s" => Ok(Duration::from_secs(num)),
        "m" => scaled(60),
        "h" => scaled(3600),
        _ => Err(crate::Error::InvalidConfig(format!(
            "unknown duration unit: {}",
            unit
        ))),
    }
}

/// Parse a comma-separated list of participant ids, dropping blanks and duplicates
pub fn parse_server_list(s: &str) -> Vec<String> {
    let mut servers: Vec<String> = Vec::new();
    for server in s.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        if !servers.iter().any(|known| known == server) {
            servers.push(server.to_string());
        }
    }
    servers
}

/// Compute CRC32 checksum
pub fn crc32(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

/// Lock a mutex, recovering the data if a previous holder panicked.
///
/// Guarded tables here (timers, pending conversations, queues) stay
/// consistent across a panic in unrelated caller code.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
