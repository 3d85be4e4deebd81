//! Resource-pressure sampling used to gate fetch admission.

use std::fs;
use std::path::PathBuf;

/// Reports current system pressure as a fraction in `0.0..=1.0`.
///
/// `None` means the gauge cannot tell; callers treat that as no pressure.
/// The dispatcher samples from async code between admissions, so `sample`
/// must return promptly and never wait on I/O that can stall.
pub trait PressureGauge: Send + Sync {
    fn sample(&self) -> Option<f64>;
}

/// A gauge that never reports pressure.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPressure;

impl PressureGauge for NoPressure {
    fn sample(&self) -> Option<f64> {
        Some(0.0)
    }
}

/// Fraction of physical memory in use, from `/proc/meminfo`.
///
/// The read is synchronous. procfs content is generated from kernel memory
/// and never touches a disk, so one read of a few kilobytes per admission
/// check does not stall the runtime. Point `from_path` only at procfs or
/// tmpfs files for the same reason.
#[derive(Debug, Clone)]
pub struct MemoryPressure {
    meminfo: PathBuf,
}

impl MemoryPressure {
    pub fn new() -> Self {
        Self::from_path("/proc/meminfo")
    }

    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self {
            meminfo: path.into(),
        }
    }
}

impl Default for MemoryPressure {
    fn default() -> Self {
        Self::new()
    }
}

impl PressureGauge for MemoryPressure {
    fn sample(&self) -> Option<f64> {
        let content = fs::read_to_string(&self.meminfo).ok()?;
        parse_meminfo(&content)
    }
}

/// `1 - MemAvailable / MemTotal`, or `None` if either field is missing.
pub fn parse_meminfo(content: &str) -> Option<f64> {
    let mut total = None;
    let mut available = None;

    for line in content.lines() {
        let mut parts = line.split_whitespace();
        match parts.next() {
            Some("MemTotal:") => total = parts.next().and_then(|v| v.parse::<u64>().ok()),
            Some("MemAvailable:") => available = parts.next().and_then(|v| v.parse::<u64>().ok()),
            _ => {}
        }
    }

    let (total, available) = (total?, available?);
    if total == 0 {
        return None;
    }
    Some((1.0 - available as f64 / total as f64).clamp(0.0, 1.0))
}
