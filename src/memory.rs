//! Resident-memory watchdog.
//!
//! Checked before every file. Exceeding the threshold is only a warning;
//! processing continues.
use serde_json::json;

use crate::provenance::ProcessingLog;

/// Resident set size of this process in bytes, if the platform exposes it.
///
/// Reads `VmRSS` from `/proc/self/status`; `None` elsewhere.
pub fn resident_bytes() -> Option<u64> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    parse_vm_rss(&status)
}

fn parse_vm_rss(status: &str) -> Option<u64> {
    let line = status.lines().find(|l| l.starts_with("VmRSS:"))?;
    let kb: u64 = line["VmRSS:".len()..].trim().trim_end_matches("kB").trim().parse().ok()?;
    Some(kb * 1024)
}

/// Compare current usage with `threshold_bytes`. Returns `true` when above.
pub fn check(threshold_bytes: u64, log: &mut ProcessingLog) -> bool {
    let Some(used) = resident_bytes() else {
        tracing::debug!("resident memory unavailable on this platform");
        return false;
    };
    if used > threshold_bytes {
        log.warn(
            "Memory usage above threshold",
            json!({
                "resident_gb": used as f64 / 1e9,
                "threshold_gb": threshold_bytes as f64 / 1e9,
            }),
        );
        true
    } else {
        false
    }
}
