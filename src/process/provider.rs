use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, System as SysInfoSystem};

use crate::error::SnapError;

/// One process as reported by the metrics provider: identity plus
/// point-in-time resource figures. Parent linkage is carried as a plain
/// pid so the tree logic needs nothing from the OS layer.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcSample {
    pub pid: u32,
    /// None when the parent is unknown or already gone.
    pub ppid: Option<u32>,
    pub name: String,
    pub memory_percent: f32,
    pub cpu_percent: f32,
}

pub trait MetricsProvider {
    /// Enumerate the currently live processes with their metrics.
    ///
    /// A per-process field that cannot be read (the process exited between
    /// enumeration and read) must degrade to its zero value rather than
    /// fail the whole sample.
    fn sample(&mut self) -> Result<Vec<ProcSample>, SnapError>;
}

pub struct SystemProvider {
    sys_info: SysInfoSystem,
}

impl SystemProvider {
    pub fn new() -> Self {
        let mut instance = Self {
            sys_info: SysInfoSystem::new(),
        };
        instance.sys_info.refresh_all();
        instance
    }

    fn refresh_process_stats(&mut self) {
        self.sys_info.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::nothing().with_memory().with_cpu(),
        );
    }
}

impl MetricsProvider for SystemProvider {
    /// CPU percentages are deltas since the previous call on this provider,
    /// so the first-ever sample of a process reads 0.
    fn sample(&mut self) -> Result<Vec<ProcSample>, SnapError> {
        self.refresh_process_stats();

        let total_memory = self.sys_info.total_memory() as f32;

        let mut samples: Vec<ProcSample> = self
            .sys_info
            .processes()
            .iter()
            .map(|(pid, proc)| ProcSample {
                pid: pid.as_u32(),
                ppid: proc.parent().map(|ppid| ppid.as_u32()),
                name: proc.name().to_string_lossy().into_owned(),
                memory_percent: if total_memory > 0.0 {
                    100.0 * proc.memory() as f32 / total_memory
                } else {
                    0.0
                },
                cpu_percent: proc.cpu_usage(),
            })
            .collect();

        // sys.processes() iterates a map; fix the enumeration order so a
        // given snapshot always flattens the same way.
        samples.sort_by_key(|sample| sample.pid);
        log::debug!("Sampled {} processes", samples.len());

        Ok(samples)
    }
}

impl Default for SystemProvider {
    fn default() -> Self {
        Self::new()
    }
}
