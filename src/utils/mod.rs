//! Utility functions and helpers
//!
//! Common utilities used by the sealer and the command-line front end.

pub mod logging;

pub use logging::init_logging;

use std::time::Duration;

/// Compute hash rate over a time period
pub fn compute_hash_rate(hashes: u64, elapsed: Duration) -> f64 {
    if elapsed.as_secs_f64() > 0.0 {
        hashes as f64 / elapsed.as_secs_f64()
    } else {
        0.0
    }
}

/// Format hash rate as a human-readable string
pub fn format_hash_rate(hashes_per_sec: f64) -> String {
    const UNITS: &[&str] = &["H/s", "KH/s", "MH/s", "GH/s", "TH/s", "PH/s"];
    let mut rate = hashes_per_sec;
    let mut unit_index = 0;

    while rate >= 1000.0 && unit_index < UNITS.len() - 1 {
        rate /= 1000.0;
        unit_index += 1;
    }

    format!("{:.2} {}", rate, UNITS[unit_index])
}

/// Format duration as a human-readable string
pub fn format_duration(duration: Duration) -> String {
    let seconds = duration.as_secs();
    if seconds == 0 {
        format!("{}ms", duration.as_millis())
    } else if seconds < 60 {
        format!("{:.2}s", duration.as_secs_f64())
    } else if seconds < 3600 {
        format!("{}m {}s", seconds / 60, seconds % 60)
    } else {
        let hours = seconds / 3600;
        let minutes = (seconds % 3600) / 60;
        format!("{}h {}m {}s", hours, minutes, seconds % 60)
    }
}
