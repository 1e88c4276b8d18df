use sysinfo::System;

use crate::collectors::CpuSource;
use crate::metrics::{CpuInfo, CpuStatus, HostInfo};

const UNKNOWN: &str = "unknown";

/// Host-wide CPU and memory load
pub struct SysinfoCpuSource {
    system: System,
    static_info: Option<CpuInfo>,
}

impl SysinfoCpuSource {
    pub fn new() -> Self {
        // First refresh to initialize counters
        let mut system = System::new();
        system.refresh_memory();
        system.refresh_cpu_usage();

        Self {
            system,
            static_info: None,
        }
    }
}

impl Default for SysinfoCpuSource {
    fn default() -> Self {
        Self::new()
    }
}

impl CpuSource for SysinfoCpuSource {
    fn read(&mut self) -> CpuStatus {
        self.system.refresh_memory();
        self.system.refresh_cpu_usage();

        CpuStatus {
            cpu_percent: self.system.global_cpu_usage().max(0.0),
            memory_percent: memory_percent(self.system.used_memory(), self.system.total_memory()),
        }
    }

    fn static_info(&mut self) -> CpuInfo {
        if let Some(info) = &self.static_info {
            return info.clone();
        }

        self.system.refresh_cpu_frequency();
        let cpus = self.system.cpus();
        let first = cpus.first();

        let name = first.map(|cpu| cpu.brand().trim().to_string()).unwrap_or_default();
        if name.is_empty() {
            log::debug!("CPU brand unavailable");
        }
        let vendor_id = first.map(|cpu| cpu.vendor_id().to_string()).unwrap_or_default();
        if vendor_id.is_empty() {
            log::debug!("CPU vendor id unavailable");
        }
        let frequency_mhz = first.map(|cpu| cpu.frequency()).unwrap_or(0);
        if frequency_mhz == 0 {
            log::debug!("CPU frequency unavailable");
        }

        let info = CpuInfo {
            name,
            frequency_mhz,
            arch: std::env::consts::ARCH.to_string(),
            bits: usize::BITS,
            count: cpus.len(),
            vendor_id,
        };
        self.static_info = Some(info.clone());
        info
    }

    fn host_info(&self) -> HostInfo {
        HostInfo {
            host_name: System::host_name().unwrap_or_else(|| UNKNOWN.to_string()),
            os: System::long_os_version().unwrap_or_else(|| UNKNOWN.to_string()),
        }
    }
}

/// Used memory as a percentage of total, 0 when the total is unknown
pub fn memory_percent(used_bytes: u64, total_bytes: u64) -> f32 {
    if total_bytes == 0 {
        return 0.0;
    }
    (used_bytes as f64 / total_bytes as f64 * 100.0) as f32
}
