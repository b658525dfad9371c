use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};

/// Cumulative jiffies of one `cpu` line in `/proc/stat`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuTimes {
    pub user: u64,
    pub nice: u64,
    pub system: u64,
    pub idle: u64,
    pub iowait: u64,
    pub irq: u64,
    pub softirq: u64,
    pub steal: u64,
}

impl CpuTimes {
    pub fn total(&self) -> u64 {
        self.user
            + self.nice
            + self.system
            + self.idle
            + self.iowait
            + self.irq
            + self.softirq
            + self.steal
    }
}

/// Share of one sampling interval spent in each state, in percent.
#[derive(Debug, Clone, PartialEq)]
pub struct CpuUsage {
    /// `cpu` for the aggregate line, `cpuN` for a single CPU.
    pub cpu: String,
    pub user: f64,
    pub system: f64,
    pub iowait: f64,
    pub idle: f64,
    pub other: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuStats {
    pub context_switches: Option<u64>,
    pub interrupts: Option<u64>,
    pub processes: Option<u64>,
    pub procs_running: Option<u64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryInfo {
    pub total_kb: u64,
    pub available_kb: Option<u64>,
    pub free_kb: Option<u64>,
    pub swap_total_kb: Option<u64>,
    pub swap_free_kb: Option<u64>,
}

impl MemoryInfo {
    pub fn used_percent(&self) -> Option<f64> {
        let available = self.available_kb?;
        if self.total_kb == 0 {
            return None;
        }
        Some(100.0 * (self.total_kb.saturating_sub(available)) as f64 / self.total_kb as f64)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Temperature {
    pub label: String,
    pub celsius: f64,
}

/// Point-in-time health of the host. Sources that could not be read are
/// left empty and omitted from the rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct SystemSnapshot {
    pub taken_at: DateTime<Utc>,
    pub hostname: Option<String>,
    pub logical_cpus: Option<usize>,
    pub physical_cores: Option<usize>,
    pub sample_interval_secs: f64,
    pub usage: Vec<CpuUsage>,
    /// `(cpu index, MHz)`, sorted by index.
    pub frequencies: Vec<(usize, f64)>,
    pub stats: Option<CpuStats>,
    pub temperatures: Vec<Temperature>,
    pub memory: Option<MemoryInfo>,
}

impl SystemSnapshot {
    pub fn empty(taken_at: DateTime<Utc>) -> Self {
        Self {
            taken_at,
            hostname: None,
            logical_cpus: None,
            physical_cores: None,
            sample_interval_secs: 0.0,
            usage: Vec::new(),
            frequencies: Vec::new(),
            stats: None,
            temperatures: Vec::new(),
            memory: None,
        }
    }
}

fn mib(kb: u64) -> f64 {
    kb as f64 / 1024.0
}

impl fmt::Display for SystemSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Taken at: {}",
            self.taken_at.to_rfc3339_opts(SecondsFormat::Secs, true)
        )?;
        if let Some(hostname) = &self.hostname {
            writeln!(f, "Hostname: {}", hostname)?;
        }
        if let Some(n) = self.logical_cpus {
            writeln!(f, "Logical CPUs: {}", n)?;
        }
        if let Some(n) = self.physical_cores {
            writeln!(f, "Physical cores: {}", n)?;
        }

        if !self.usage.is_empty() {
            writeln!(f, "CPU usage over {:.1}s:", self.sample_interval_secs)?;
            for u in &self.usage {
                writeln!(
                    f,
                    "  {:<6} user {:5.1}%  system {:5.1}%  iowait {:5.1}%  other {:5.1}%  idle {:5.1}%",
                    u.cpu, u.user, u.system, u.iowait, u.other, u.idle
                )?;
            }
        }

        if !self.frequencies.is_empty() {
            writeln!(f, "CPU frequency:")?;
            for (cpu, mhz) in &self.frequencies {
                writeln!(f, "  cpu{:<3} {:.0} MHz", cpu, mhz)?;
            }
        }

        if let Some(stats) = &self.stats {
            let show = |v: Option<u64>| v.map(|v| v.to_string()).unwrap_or_else(|| "n/a".into());
            writeln!(
                f,
                "CPU stats: context switches {}, interrupts {}, processes forked {}, running {}",
                show(stats.context_switches),
                show(stats.interrupts),
                show(stats.processes),
                show(stats.procs_running)
            )?;
        }

        if !self.temperatures.is_empty() {
            writeln!(f, "Temperatures:")?;
            for t in &self.temperatures {
                writeln!(f, "  {}: {:.1} C", t.label, t.celsius)?;
            }
        }

        if let Some(mem) = &self.memory {
            write!(f, "Memory: total {:.0} MiB", mib(mem.total_kb))?;
            if let Some(available) = mem.available_kb {
                write!(f, ", available {:.0} MiB", mib(available))?;
            }
            if let Some(used) = mem.used_percent() {
                write!(f, " ({:.1}% used)", used)?;
            }
            if let Some(free) = mem.free_kb {
                write!(f, ", free {:.0} MiB", mib(free))?;
            }
            writeln!(f)?;
            if let (Some(total), Some(free)) = (mem.swap_total_kb, mem.swap_free_kb) {
                writeln!(f, "Swap: total {:.0} MiB, free {:.0} MiB", mib(total), mib(free))?;
            }
        }
        Ok(())
    }
}
