//! Process-level runtime gauges.
//!
//! Registered once at startup, before the server takes traffic. Every gauge is
//! polled: nothing is computed until a reporter reads the registry. Reads share
//! one `sysinfo` sampler that refreshes at most once per [`REFRESH_INTERVAL`],
//! so a full scrape costs a single `/proc` walk.
//!
//! Thread states come from the per-task status sysinfo reports for this
//! process. Platforms without task listing report every thread gauge as 0.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use sysinfo::{Pid, ProcessRefreshKind, ProcessStatus, ProcessesToUpdate, System};

use httpmon_core::error::Result;
use httpmon_core::{Gauge, Metric, MetricsRegistry};

pub const REFRESH_INTERVAL: Duration = Duration::from_secs(1);

/// Names registered by [`RuntimeMetrics::register`], in registration order.
pub const RUNTIME_GAUGES: [&str; 16] = [
    "memory.process.resident",
    "memory.process.virtual",
    "memory.system.total",
    "memory.system.used",
    "memory.system.usage",
    "open-file-descriptors",
    "open-file-descriptors.count",
    "threads.count",
    "threads.running",
    "threads.sleeping",
    "threads.blocked",
    "threads.idle",
    "threads.zombie",
    "threads.other",
    "process.cpu-usage",
    "process.uptime",
];

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Sample {
    resident: f64,
    virtual_mem: f64,
    system_total: f64,
    system_used: f64,
    open_fds: f64,
    fd_limit: f64,
    threads: f64,
    states: ThreadStates,
    cpu_usage: f64,
    uptime: f64,
}

/// Thread count per scheduler state. Sums to `Sample::threads`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct ThreadStates {
    running: f64,
    sleeping: f64,
    blocked: f64,
    idle: f64,
    zombie: f64,
    other: f64,
}

impl ThreadStates {
    fn count(&mut self, status: Option<ProcessStatus>) {
        let slot = match status {
            Some(ProcessStatus::Run) => &mut self.running,
            Some(ProcessStatus::Sleep) => &mut self.sleeping,
            Some(ProcessStatus::UninterruptibleDiskSleep | ProcessStatus::LockBlocked) => {
                &mut self.blocked
            }
            Some(ProcessStatus::Idle) => &mut self.idle,
            Some(ProcessStatus::Zombie) => &mut self.zombie,
            _ => &mut self.other,
        };
        *slot += 1.0;
    }
}

struct Sampler {
    system: System,
    pid: Option<Pid>,
    last: Option<(Instant, Sample)>,
}

impl Sampler {
    fn new() -> Self {
        let pid = match sysinfo::get_current_pid() {
            Ok(pid) => Some(pid),
            Err(e) => {
                tracing::warn!(error = %e, "current pid unavailable; process gauges report 0");
                None
            }
        };
        Self {
            system: System::new(),
            pid,
            last: None,
        }
    }

    fn sample(&mut self) -> Sample {
        if let Some((at, s)) = self.last {
            if at.elapsed() < REFRESH_INTERVAL {
                return s;
            }
        }

        self.system.refresh_memory();
        let mut s = Sample {
            system_total: self.system.total_memory() as f64,
            system_used: self.system.used_memory() as f64,
            ..Sample::default()
        };

        if let Some(pid) = self.pid {
            self.system.refresh_processes_specifics(
                ProcessesToUpdate::Some(&[pid]),
                true,
                ProcessRefreshKind::everything(),
            );
            if let Some(p) = self.system.process(pid) {
                s.resident = p.memory() as f64;
                s.virtual_mem = p.virtual_memory() as f64;
                s.cpu_usage = p.cpu_usage() as f64;
                s.uptime = p.run_time() as f64;
                if let Some(tasks) = p.tasks() {
                    s.threads = tasks.len() as f64;
                    for tid in tasks {
                        s.states.count(self.system.process(*tid).map(|t| t.status()));
                    }
                }
                s.open_fds = p.open_files().map(|n| n as f64).unwrap_or(0.0);
                s.fd_limit = p.open_files_limit().map(|n| n as f64).unwrap_or(0.0);
            }
        }

        self.last = Some((Instant::now(), s));
        s
    }
}

/// Registrar for process-level gauges.
pub struct RuntimeMetrics;

impl RuntimeMetrics {
    /// Register every runtime gauge into `registry`.
    ///
    /// All or nothing: if any name is taken the call fails with
    /// `DuplicateMetricName` and leaves the registry as it found it. A second
    /// call against the same registry is a lifecycle bug and fails this way,
    /// keeping the gauges from the first call in place.
    pub fn register(registry: &MetricsRegistry) -> Result<()> {
        let sampler = Arc::new(Mutex::new(Sampler::new()));
        let gauge = |name: &str, read: fn(&Sample) -> f64| -> (String, Metric) {
            let sampler = Arc::clone(&sampler);
            let g = Gauge::polled(move || match sampler.lock() {
                Ok(mut s) => read(&s.sample()),
                Err(_) => f64::NAN,
            });
            (name.to_string(), Metric::Gauge(Arc::new(g)))
        };

        registry.register_all(vec![
            gauge(RUNTIME_GAUGES[0], |s| s.resident),
            gauge(RUNTIME_GAUGES[1], |s| s.virtual_mem),
            gauge(RUNTIME_GAUGES[2], |s| s.system_total),
            gauge(RUNTIME_GAUGES[3], |s| s.system_used),
            gauge(RUNTIME_GAUGES[4], |s| ratio(s.system_used, s.system_total)),
            gauge(RUNTIME_GAUGES[5], |s| ratio(s.open_fds, s.fd_limit)),
            gauge(RUNTIME_GAUGES[6], |s| s.open_fds),
            gauge(RUNTIME_GAUGES[7], |s| s.threads),
            gauge(RUNTIME_GAUGES[8], |s| s.states.running),
            gauge(RUNTIME_GAUGES[9], |s| s.states.sleeping),
            gauge(RUNTIME_GAUGES[10], |s| s.states.blocked),
            gauge(RUNTIME_GAUGES[11], |s| s.states.idle),
            gauge(RUNTIME_GAUGES[12], |s| s.states.zombie),
            gauge(RUNTIME_GAUGES[13], |s| s.states.other),
            gauge(RUNTIME_GAUGES[14], |s| s.cpu_usage),
            gauge(RUNTIME_GAUGES[15], |s| s.uptime),
        ])?;

        tracing::info!(gauges = RUNTIME_GAUGES.len(), "runtime gauges registered");
        Ok(())
    }
}

fn ratio(part: f64, whole: f64) -> f64 {
    if whole > 0.0 {
        part / whole
    } else {
        f64::NAN
    }
}
