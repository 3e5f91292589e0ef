//! Per-core CPU tick counter sources

use sysinfo::System;
use thiserror::Error;

/// Errors from reading CPU tick counters.
#[derive(Error, Debug)]
pub enum TickError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Malformed counter data: {0}")]
    Parse(String),
    #[error("No per-core counters reported")]
    NoCores,
}

/// One core's cumulative busy/idle tick counters at a point in time.
///
/// Only deltas between successive snapshots are meaningful; the absolute
/// values depend on uptime and the source's unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CpuTicks {
    pub busy: u64,
    pub idle: u64,
}

impl CpuTicks {
    pub fn total(&self) -> u64 {
        self.busy + self.idle
    }
}

/// A source of per-core cumulative tick counters.
pub trait TickSource: Send {
    /// Read the current counters, one entry per logical core.
    fn read(&mut self) -> Result<Vec<CpuTicks>, TickError>;
}

/// Number of logical processors, falling back to 1 if the query fails.
pub fn logical_core_count() -> usize {
    let mut system = System::new();
    system.refresh_cpu_all();
    let count = system.cpus().len();
    if count == 0 {
        1
    } else {
        count
    }
}

/// The preferred tick source for the current platform.
pub fn default_tick_source() -> Box<dyn TickSource> {
    #[cfg(target_os = "linux")]
    {
        Box::new(ProcStatTicks::new())
    }
    #[cfg(not(target_os = "linux"))]
    {
        Box::new(UsageTicks::new())
    }
}

/// Tick source reading `/proc/stat` per-cpu rows.
///
/// Busy aggregates user+nice+system+irq+softirq+steal; idle aggregates
/// idle+iowait. Units are clock ticks (USER_HZ), which cancel out in the
/// delta ratios.
#[cfg(target_os = "linux")]
pub struct ProcStatTicks {
    path: &'static str,
}

#[cfg(target_os = "linux")]
impl ProcStatTicks {
    pub fn new() -> Self {
        Self { path: "/proc/stat" }
    }
}

#[cfg(target_os = "linux")]
impl Default for ProcStatTicks {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(target_os = "linux")]
impl TickSource for ProcStatTicks {
    fn read(&mut self) -> Result<Vec<CpuTicks>, TickError> {
        let contents = std::fs::read_to_string(self.path)?;
        parse_proc_stat(&contents)
    }
}

/// Parse per-cpu rows (`cpu0 ...`, `cpu1 ...`) from `/proc/stat` content.
/// The aggregate `cpu ` row is skipped.
fn parse_proc_stat(contents: &str) -> Result<Vec<CpuTicks>, TickError> {
    let mut cores = Vec::new();

    for line in contents.lines() {
        let Some(rest) = line.strip_prefix("cpu") else {
            continue;
        };
        // Per-core rows are "cpuN"; the aggregate row has no digit.
        if !rest.starts_with(|c: char| c.is_ascii_digit()) {
            continue;
        }

        let fields: Vec<u64> = rest
            .split_whitespace()
            .skip(1)
            .map(|f| {
                f.parse::<u64>()
                    .map_err(|_| TickError::Parse(format!("bad field in row: {line}")))
            })
            .collect::<Result<_, _>>()?;

        // user nice system idle iowait irq softirq steal [guest guest_nice]
        if fields.len() < 8 {
            return Err(TickError::Parse(format!("short row: {line}")));
        }

        let busy = fields[0] + fields[1] + fields[2] + fields[5] + fields[6] + fields[7];
        let idle = fields[3] + fields[4];
        cores.push(CpuTicks { busy, idle });
    }

    if cores.is_empty() {
        return Err(TickError::NoCores);
    }
    Ok(cores)
}

/// Portable tick source backed by sysinfo usage percentages.
///
/// sysinfo reports instantaneous per-core usage rather than cumulative
/// counters, so this source synthesizes counters: each read advances every
/// core by a fixed tick quantum split busy/idle according to the reported
/// usage. Deltas between reads then carry the same meaning as real counters.
pub struct UsageTicks {
    system: System,
    counters: Vec<CpuTicks>,
}

impl UsageTicks {
    /// Tick quantum distributed across busy/idle per read.
    const TICKS_PER_READ: u64 = 1000;

    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu_all();
        Self {
            system,
            counters: Vec::new(),
        }
    }
}

impl Default for UsageTicks {
    fn default() -> Self {
        Self::new()
    }
}

impl TickSource for UsageTicks {
    fn read(&mut self) -> Result<Vec<CpuTicks>, TickError> {
        self.system.refresh_cpu_all();
        let cpus = self.system.cpus();
        if cpus.is_empty() {
            return Err(TickError::NoCores);
        }

        self.counters.resize(cpus.len(), CpuTicks::default());
        for (counter, cpu) in self.counters.iter_mut().zip(cpus) {
            let usage = (f64::from(cpu.cpu_usage()) / 100.0).clamp(0.0, 1.0);
            let busy = (usage * Self::TICKS_PER_READ as f64).round() as u64;
            counter.busy += busy;
            counter.idle += Self::TICKS_PER_READ - busy;
        }
        Ok(self.counters.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
cpu  100 0 50 800 20 5 5 0 0 0
cpu0 60 0 30 400 10 3 2 0 0 0
cpu1 40 0 20 400 10 2 3 0 0 0
intr 12345
ctxt 67890
";

    #[test]
    fn test_parse_skips_aggregate_row() {
        let cores = parse_proc_stat(SAMPLE).unwrap();
        assert_eq!(cores.len(), 2);
    }

    #[test]
    fn test_parse_busy_and_idle_aggregation() {
        let cores = parse_proc_stat(SAMPLE).unwrap();
        // cpu0: busy = 60+0+30+3+2+0, idle = 400+10
        assert_eq!(cores[0], CpuTicks { busy: 95, idle: 410 });
        assert_eq!(cores[1], CpuTicks { busy: 65, idle: 410 });
    }

    #[test]
    fn test_parse_rejects_short_rows() {
        assert!(matches!(
            parse_proc_stat("cpu0 1 2 3\n"),
            Err(TickError::Parse(_))
        ));
    }

    #[test]
    fn test_parse_rejects_empty_input() {
        assert!(matches!(parse_proc_stat(""), Err(TickError::NoCores)));
    }

    #[test]
    fn test_usage_ticks_counters_are_monotonic() {
        let mut source = UsageTicks::new();
        let first = source.read().unwrap();
        let second = source.read().unwrap();
        assert_eq!(first.len(), second.len());
        for (a, b) in first.iter().zip(&second) {
            assert!(b.total() > a.total());
            assert!(b.busy >= a.busy);
            assert!(b.idle >= a.idle);
        }
    }

    #[test]
    fn test_core_count_is_positive() {
        assert!(logical_core_count() >= 1);
    }
}
