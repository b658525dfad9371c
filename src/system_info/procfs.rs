//! Host metrics read from Linux `/proc` and `/sys`.
//!
//! Every sub-source is optional. A missing thermal zone or an unreadable
//! `cpufreq` entry just leaves that part of the snapshot empty. Only when
//! neither `/proc/stat` nor `/proc/meminfo` can be read is the provider
//! considered unavailable.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use chrono::Utc;
use log::{debug, warn};

use super::types::*;
use super::MetricsProvider;
use crate::error_handling::types::MetricsError;

pub struct ProcfsMetrics {
    proc_root: PathBuf,
    sys_root: PathBuf,
    sample_interval: Duration,
}

impl ProcfsMetrics {
    pub fn new() -> Self {
        Self::with_roots(PathBuf::from("/proc"), PathBuf::from("/sys"), Duration::from_secs(1))
    }

    pub fn with_roots(proc_root: PathBuf, sys_root: PathBuf, sample_interval: Duration) -> Self {
        Self {
            proc_root,
            sys_root,
            sample_interval,
        }
    }

    fn read(&self, relative: &str) -> Option<String> {
        let path = self.proc_root.join(relative);
        match fs::read_to_string(&path) {
            Ok(contents) => Some(contents),
            Err(e) => {
                debug!("Cannot read {}: {}", path.display(), e);
                None
            }
        }
    }
}

impl Default for ProcfsMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsProvider for ProcfsMetrics {
    fn snapshot(&self) -> Result<SystemSnapshot, MetricsError> {
        let first_stat = self.read("stat");
        let meminfo = self.read("meminfo");
        if first_stat.is_none() && meminfo.is_none() {
            return Err(MetricsError::Unavailable(format!(
                "neither stat nor meminfo readable under {}",
                self.proc_root.display()
            )));
        }

        let mut snapshot = SystemSnapshot::empty(Utc::now());
        snapshot.hostname = self
            .read("sys/kernel/hostname")
            .map(|h| h.trim().to_string())
            .filter(|h| !h.is_empty());

        if let Some(cpuinfo) = self.read("cpuinfo") {
            let (logical, physical) = parse_cpuinfo(&cpuinfo);
            snapshot.logical_cpus = logical;
            snapshot.physical_cores = physical;
        }

        if let Some(first) = first_stat {
            let (before, _) = parse_stat(&first);
            thread::sleep(self.sample_interval);
            match self.read("stat") {
                Some(second) => {
                    let (after, stats) = parse_stat(&second);
                    snapshot.usage = usage_between(&before, &after);
                    snapshot.stats = Some(stats);
                    snapshot.sample_interval_secs = self.sample_interval.as_secs_f64();
                }
                None => warn!("CPU statistics vanished during sampling"),
            }
        }

        snapshot.frequencies = read_frequencies(&self.sys_root.join("devices/system/cpu"));
        snapshot.temperatures = read_thermal_zones(&self.sys_root.join("class/thermal"));
        snapshot.memory = meminfo.as_deref().and_then(parse_meminfo);

        Ok(snapshot)
    }
}

/// Logical CPU count and physical core count from `/proc/cpuinfo`.
pub(crate) fn parse_cpuinfo(text: &str) -> (Option<usize>, Option<usize>) {
    let mut logical = 0;
    let mut cores = HashSet::new();
    let mut physical_id = None;

    for line in text.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        match key.trim() {
            "processor" => {
                logical += 1;
                physical_id = None;
            }
            "physical id" => physical_id = Some(value.to_string()),
            "core id" => {
                cores.insert((physical_id.clone(), value.to_string()));
            }
            _ => {}
        }
    }

    let logical = (logical > 0).then_some(logical);
    let physical = if cores.is_empty() { None } else { Some(cores.len()) };
    (logical, physical)
}

/// Per-CPU counters and the aggregate statistics from `/proc/stat`.
pub(crate) fn parse_stat(text: &str) -> (Vec<(String, CpuTimes)>, CpuStats) {
    let mut cpus = Vec::new();
    let mut stats = CpuStats::default();

    for line in text.lines() {
        let mut fields = line.split_whitespace();
        let Some(key) = fields.next() else {
            continue;
        };
        let first = || line.split_whitespace().nth(1).and_then(|v| v.parse::<u64>().ok());

        match key {
            "ctxt" => stats.context_switches = first(),
            "intr" => stats.interrupts = first(),
            "processes" => stats.processes = first(),
            "procs_running" => stats.procs_running = first(),
            cpu if cpu.starts_with("cpu") => {
                let values: Vec<u64> = fields.filter_map(|v| v.parse().ok()).collect();
                if values.len() < 4 {
                    continue;
                }
                let at = |i: usize| values.get(i).copied().unwrap_or(0);
                cpus.push((
                    cpu.to_string(),
                    CpuTimes {
                        user: at(0),
                        nice: at(1),
                        system: at(2),
                        idle: at(3),
                        iowait: at(4),
                        irq: at(5),
                        softirq: at(6),
                        steal: at(7),
                    },
                ));
            }
            _ => {}
        }
    }
    (cpus, stats)
}

/// Utilisation breakdown between two `/proc/stat` samples.
pub(crate) fn usage_between(
    before: &[(String, CpuTimes)],
    after: &[(String, CpuTimes)],
) -> Vec<CpuUsage> {
    let earlier: HashMap<&str, &CpuTimes> =
        before.iter().map(|(name, t)| (name.as_str(), t)).collect();

    after
        .iter()
        .filter_map(|(name, now)| {
            let then = earlier.get(name.as_str())?;
            let delta = now.total().checked_sub(then.total())?;
            if delta == 0 {
                return None;
            }
            let pct = |a: u64, b: u64| 100.0 * a.saturating_sub(b) as f64 / delta as f64;
            let user = pct(now.user + now.nice, then.user + then.nice);
            let system = pct(now.system, then.system);
            let iowait = pct(now.iowait, then.iowait);
            let idle = pct(now.idle, then.idle);
            let other = pct(
                now.irq + now.softirq + now.steal,
                then.irq + then.softirq + then.steal,
            );
            Some(CpuUsage {
                cpu: name.clone(),
                user,
                system,
                iowait,
                idle,
                other,
            })
        })
        .collect()
}

pub(crate) fn parse_meminfo(text: &str) -> Option<MemoryInfo> {
    let mut values = HashMap::new();
    for line in text.lines() {
        let Some((key, rest)) = line.split_once(':') else {
            continue;
        };
        if let Some(kb) = rest.split_whitespace().next().and_then(|v| v.parse::<u64>().ok()) {
            values.insert(key.trim(), kb);
        }
    }

    Some(MemoryInfo {
        total_kb: *values.get("MemTotal")?,
        available_kb: values.get("MemAvailable").copied(),
        free_kb: values.get("MemFree").copied(),
        swap_total_kb: values.get("SwapTotal").copied(),
        swap_free_kb: values.get("SwapFree").copied(),
    })
}

fn read_first_number(path: &Path) -> Option<f64> {
    fs::read_to_string(path)
        .ok()
        .and_then(|s| s.split_whitespace().next().and_then(|v| v.parse().ok()))
}

/// Current frequency of every CPU exposing `cpufreq`, in MHz.
pub(crate) fn read_frequencies(cpu_root: &Path) -> Vec<(usize, f64)> {
    let Ok(entries) = fs::read_dir(cpu_root) else {
        return Vec::new();
    };

    let mut frequencies: Vec<(usize, f64)> = entries
        .flatten()
        .filter_map(|entry| {
            let name = entry.file_name();
            let id = name.to_str()?.strip_prefix("cpu")?.parse::<usize>().ok()?;
            let cpufreq = entry.path().join("cpufreq");
            ["scaling_cur_freq", "cpuinfo_cur_freq"]
                .iter()
                .find_map(|key| read_first_number(&cpufreq.join(key)))
                .map(|khz| (id, khz / 1000.0))
        })
        .collect();
    frequencies.sort_by_key(|(id, _)| *id);
    frequencies
}

/// Temperatures of `thermal_zone*` entries, labelled by zone type.
pub(crate) fn read_thermal_zones(thermal_root: &Path) -> Vec<Temperature> {
    let Ok(entries) = fs::read_dir(thermal_root) else {
        return Vec::new();
    };

    let mut zones: Vec<(String, Temperature)> = entries
        .flatten()
        .filter_map(|entry| {
            let name = entry.file_name().to_str()?.to_string();
            if !name.starts_with("thermal_zone") {
                return None;
            }
            let path = entry.path();
            let millidegrees = read_first_number(&path.join("temp"))?;
            let label = fs::read_to_string(path.join("type"))
                .ok()
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| name.clone());
            Some((
                name,
                Temperature {
                    label,
                    celsius: millidegrees / 1000.0,
                },
            ))
        })
        .collect();
    zones.sort_by(|a, b| a.0.cmp(&b.0));
    zones.into_iter().map(|(_, t)| t).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const CPUINFO: &str = "processor\t: 0\nphysical id\t: 0\ncore id\t\t: 0\n\n\
                           processor\t: 1\nphysical id\t: 0\ncore id\t\t: 1\n\n\
                           processor\t: 2\nphysical id\t: 0\ncore id\t\t: 0\n\n\
                           processor\t: 3\nphysical id\t: 0\ncore id\t\t: 1\n";

    const STAT_1: &str = "cpu  100 0 50 800 50 0 0 0 0 0\n\
                          cpu0 100 0 50 800 50 0 0 0 0 0\n\
                          intr 12345 1 2 3\nctxt 999\nprocesses 42\nprocs_running 2\n";

    const STAT_2: &str = "cpu  150 10 70 900 60 5 5 0 0 0\n\
                          cpu0 150 10 70 900 60 5 5 0 0 0\n\
                          intr 12400 1 2 3\nctxt 1100\nprocesses 44\nprocs_running 3\n";

    const MEMINFO: &str = "MemTotal:       16384000 kB\nMemFree:         1024000 kB\n\
                           MemAvailable:    8192000 kB\nSwapTotal:       2048000 kB\n\
                           SwapFree:        2048000 kB\n";

    #[test]
    fn test_parse_cpuinfo() {
        assert_eq!(parse_cpuinfo(CPUINFO), (Some(4), Some(2)));
        assert_eq!(parse_cpuinfo(""), (None, None));
    }

    #[test]
    fn test_parse_stat_and_usage() {
        let (before, _) = parse_stat(STAT_1);
        let (after, stats) = parse_stat(STAT_2);

        assert_eq!(before.len(), 2);
        assert_eq!(stats.context_switches, Some(1100));
        assert_eq!(stats.interrupts, Some(12400));
        assert_eq!(stats.processes, Some(44));
        assert_eq!(stats.procs_running, Some(3));

        let usage = usage_between(&before, &after);
        assert_eq!(usage.len(), 2);
        let total = &usage[0];
        assert_eq!(total.cpu, "cpu");
        // 200 jiffies elapsed: 60 user+nice, 20 system, 100 idle, 10 iowait, 10 irq.
        assert!((total.user - 30.0).abs() < 1e-9);
        assert!((total.system - 10.0).abs() < 1e-9);
        assert!((total.idle - 50.0).abs() < 1e-9);
        assert!((total.iowait - 5.0).abs() < 1e-9);
        assert!((total.other - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_parse_meminfo() {
        let mem = parse_meminfo(MEMINFO).unwrap();
        assert_eq!(mem.total_kb, 16_384_000);
        assert_eq!(mem.available_kb, Some(8_192_000));
        assert!((mem.used_percent().unwrap() - 50.0).abs() < 1e-9);
        assert!(parse_meminfo("MemFree: 10 kB\n").is_none());
    }

    fn fake_host() -> TempDir {
        let root = TempDir::new().unwrap();
        let proc_root = root.path().join("proc");
        fs::create_dir_all(proc_root.join("sys/kernel")).unwrap();
        fs::write(proc_root.join("stat"), STAT_1).unwrap();
        fs::write(proc_root.join("meminfo"), MEMINFO).unwrap();
        fs::write(proc_root.join("cpuinfo"), CPUINFO).unwrap();
        fs::write(proc_root.join("sys/kernel/hostname"), "obs-control\n").unwrap();

        let sys_root = root.path().join("sys");
        for (cpu, khz) in [("cpu1", "1800000"), ("cpu0", "2400000")] {
            let dir = sys_root.join("devices/system/cpu").join(cpu).join("cpufreq");
            fs::create_dir_all(&dir).unwrap();
            fs::write(dir.join("scaling_cur_freq"), khz).unwrap();
        }
        let zone = sys_root.join("class/thermal/thermal_zone0");
        fs::create_dir_all(&zone).unwrap();
        fs::write(zone.join("type"), "x86_pkg_temp\n").unwrap();
        fs::write(zone.join("temp"), "45500\n").unwrap();
        root
    }

    #[test]
    fn test_snapshot_from_fake_host() {
        let root = fake_host();
        let metrics = ProcfsMetrics::with_roots(
            root.path().join("proc"),
            root.path().join("sys"),
            Duration::from_millis(1),
        );

        let snapshot = metrics.snapshot().unwrap();

        assert_eq!(snapshot.hostname.as_deref(), Some("obs-control"));
        assert_eq!(snapshot.logical_cpus, Some(4));
        assert_eq!(snapshot.physical_cores, Some(2));
        assert_eq!(snapshot.frequencies, vec![(0, 2400.0), (1, 1800.0)]);
        assert_eq!(
            snapshot.temperatures,
            vec![Temperature {
                label: "x86_pkg_temp".to_string(),
                celsius: 45.5
            }]
        );
        assert_eq!(snapshot.stats.unwrap().context_switches, Some(999));
        assert!(snapshot.memory.is_some());

        let text = snapshot.to_string();
        assert!(text.contains("Hostname: obs-control"));
        assert!(text.contains("x86_pkg_temp: 45.5 C"));
        assert!(text.contains("Memory: total 16000 MiB"));
    }

    #[test]
    fn test_partial_host_omits_missing_sources() {
        let root = TempDir::new().unwrap();
        let proc_root = root.path().join("proc");
        fs::create_dir_all(&proc_root).unwrap();
        fs::write(proc_root.join("meminfo"), MEMINFO).unwrap();

        let metrics = ProcfsMetrics::with_roots(
            proc_root,
            root.path().join("sys"),
            Duration::from_millis(1),
        );
        let snapshot = metrics.snapshot().unwrap();

        assert!(snapshot.usage.is_empty());
        assert!(snapshot.frequencies.is_empty());
        assert!(snapshot.temperatures.is_empty());
        assert!(!snapshot.to_string().contains("CPU usage"));
    }

    #[test]
    fn test_unavailable_provider() {
        let root = TempDir::new().unwrap();
        let metrics = ProcfsMetrics::with_roots(
            root.path().join("proc"),
            root.path().join("sys"),
            Duration::from_millis(1),
        );
        assert!(matches!(metrics.snapshot(), Err(MetricsError::Unavailable(_))));
    }
}
