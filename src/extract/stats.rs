//! Timing and memory checkpoints.

use std::fmt;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::Result;

const KILOBYTE: u64 = 1 << 10;
const MEGABYTE: u64 = 1 << 20;
const GIGABYTE: u64 = 1 << 30;
const TERABYTE: u64 = 1 << 40;
const PETABYTE: u64 = 1 << 50;
const EXABYTE: u64 = 1 << 60;

/// Human-readable size using the largest unit that keeps the value >= 1,
/// e.g. `10M`, `12.5K`, `0B`.
pub fn byte_size(bytes: u64) -> String {
    let (value, unit) = match bytes {
        0 => return "0B".to_string(),
        b if b >= EXABYTE => (b as f64 / EXABYTE as f64, "E"),
        b if b >= PETABYTE => (b as f64 / PETABYTE as f64, "P"),
        b if b >= TERABYTE => (b as f64 / TERABYTE as f64, "T"),
        b if b >= GIGABYTE => (b as f64 / GIGABYTE as f64, "G"),
        b if b >= MEGABYTE => (b as f64 / MEGABYTE as f64, "M"),
        b if b >= KILOBYTE => (b as f64 / KILOBYTE as f64, "K"),
        b => (b as f64, "B"),
    };
    let formatted = format!("{value:.1}");
    let trimmed = formatted.strip_suffix(".0").unwrap_or(&formatted);
    format!("{trimmed}{unit}")
}

/// Source of the live-allocation figure used for checkpoints.
pub trait AllocationGauge: Send + Sync {
    fn live_bytes(&self) -> u64;
}

impl<F> AllocationGauge for F
where
    F: Fn() -> u64 + Send + Sync,
{
    fn live_bytes(&self) -> u64 {
        self()
    }
}

/// Gauge that always reads zero.
pub fn no_gauge() -> Arc<dyn AllocationGauge> {
    Arc::new(|| 0u64)
}

/// One checkpoint.
#[derive(Debug, Clone, Serialize)]
pub struct Checkpoint {
    pub label: String,
    #[serde(skip)]
    pub instant: Instant,
    pub timestamp: DateTime<Utc>,
    pub live_bytes: u64,
}

/// Append-only checkpoint log.
#[derive(Clone)]
pub struct Stats {
    gauge: Arc<dyn AllocationGauge>,
    checkpoints: Vec<Checkpoint>,
}

impl fmt::Debug for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stats")
            .field("checkpoints", &self.checkpoints)
            .finish()
    }
}

impl Stats {
    pub fn new(gauge: Arc<dyn AllocationGauge>) -> Self {
        Self {
            gauge,
            checkpoints: Vec::new(),
        }
    }

    /// Record a checkpoint.
    pub fn observe(&mut self, label: impl Into<String>) {
        self.checkpoints.push(Checkpoint {
            label: label.into(),
            instant: Instant::now(),
            timestamp: Utc::now(),
            live_bytes: self.gauge.live_bytes(),
        });
    }

    /// Live bytes gained since the most recent checkpoint.
    pub fn growth(&self) -> u64 {
        let last = self.checkpoints.last().map_or(0, |c| c.live_bytes);
        self.gauge.live_bytes().saturating_sub(last)
    }

    pub fn checkpoints(&self) -> &[Checkpoint] {
        &self.checkpoints
    }

    /// Checkpoints whose label contains `needle`.
    pub fn labels_matching<'a>(&'a self, needle: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.checkpoints
            .iter()
            .map(|c| c.label.as_str())
            .filter(move |l| l.contains(needle))
    }

    /// Summarize the log. `None` with fewer than two checkpoints.
    pub fn report(&self) -> Option<StatsReport> {
        let (first, rest) = self.checkpoints.split_first()?;
        let last = rest.last()?;
        let total = last.instant.duration_since(first.instant).as_secs_f64();

        let mut rows = Vec::with_capacity(rest.len());
        let mut previous = first;
        for checkpoint in rest {
            rows.push(ReportRow {
                label: checkpoint.label.clone(),
                seconds: checkpoint
                    .instant
                    .duration_since(previous.instant)
                    .as_secs_f64(),
                delta_bytes: checkpoint.live_bytes as i128 - previous.live_bytes as i128,
                live_bytes: checkpoint.live_bytes,
            });
            previous = checkpoint;
        }

        Some(StatsReport {
            rows,
            total_seconds: total,
            total_delta_bytes: last.live_bytes as i128 - first.live_bytes as i128,
        })
    }

    /// Write the checkpoint timeline as JSON.
    pub fn write_profile(&self, path: &Path) -> Result<()> {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, &self.checkpoints)?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ReportRow {
    pub label: String,
    pub seconds: f64,
    pub delta_bytes: i128,
    pub live_bytes: u64,
}

/// Timing and memory summary of one run.
#[derive(Debug, Clone)]
pub struct StatsReport {
    pub rows: Vec<ReportRow>,
    pub total_seconds: f64,
    pub total_delta_bytes: i128,
}

fn signed_size(delta: i128) -> String {
    let size = byte_size(delta.unsigned_abs().min(u64::MAX as u128) as u64);
    if delta < 0 {
        format!("-{size}")
    } else {
        format!("±{size}")
    }
}

impl fmt::Display for StatsReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Timing:")?;
        for row in &self.rows {
            let share = if self.total_seconds > 0.0 {
                row.seconds / self.total_seconds * 100.0
            } else {
                0.0
            };
            writeln!(
                f,
                "{:>20}                 : {:6.3}s  {:4.1}%",
                row.label, row.seconds, share
            )?;
        }
        writeln!(f, "total processing time: {:6.3}s", self.total_seconds)?;
        writeln!(f)?;

        writeln!(f, "Memory statistics:")?;
        for row in &self.rows {
            writeln!(
                f,
                "{:>20}                 : {:>7} (Σ{})",
                row.label,
                signed_size(row.delta_bytes),
                byte_size(row.live_bytes)
            )?;
        }
        writeln!(f, "total memory alloc: {}", signed_size(self.total_delta_bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[test]
    fn test_byte_size() {
        assert_eq!(byte_size(0), "0B");
        assert_eq!(byte_size(512), "512B");
        assert_eq!(byte_size(1024), "1K");
        assert_eq!(byte_size(12_800), "12.5K");
        assert_eq!(byte_size(10 * MEGABYTE), "10M");
        assert_eq!(byte_size(3 * GIGABYTE / 2), "1.5G");
    }

    #[test]
    fn test_growth_is_relative_to_last_checkpoint() {
        let live = Arc::new(AtomicU64::new(100));
        let gauge = {
            let live = Arc::clone(&live);
            move || live.load(Ordering::Relaxed)
        };
        let mut stats = Stats::new(Arc::new(gauge));

        stats.observe("start");
        live.store(400, Ordering::Relaxed);
        assert_eq!(stats.growth(), 300);

        stats.observe("later");
        assert_eq!(stats.growth(), 0);

        // shrinking never underflows
        live.store(10, Ordering::Relaxed);
        assert_eq!(stats.growth(), 0);
    }

    #[test]
    fn test_report() {
        let mut stats = Stats::new(no_gauge());
        assert!(stats.report().is_none());

        stats.observe("start");
        stats.observe("bitmaps");
        stats.observe("fonts");

        let report = stats.report().unwrap();
        assert_eq!(report.rows.len(), 2);
        assert_eq!(report.rows[0].label, "bitmaps");

        let text = report.to_string();
        assert!(text.starts_with("Timing:\n"));
        assert!(text.contains("Memory statistics:"));
        assert!(text.contains("total memory alloc: ±0B"));
    }

    #[test]
    fn test_write_profile() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profile.json");

        let mut stats = Stats::new(no_gauge());
        stats.observe("start");
        stats.write_profile(&path).unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json[0]["label"], "start");
        assert!(json[0]["timestamp"].is_string());
    }
}
