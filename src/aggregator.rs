use std::collections::HashSet;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::collectors::{CpuSource, HardwareSource, ProcessSource};
use crate::metrics::{DeviceStatus, ProcessRecord, SystemInfo, SystemSnapshot};

pub const DEFAULT_FALLBACK_PROCESS: &str = "python";

/// Joins the hardware, process and CPU sources into one snapshot per tick.
///
/// Every call into a source degrades instead of failing: an unavailable
/// interface yields no devices, an unsupported counter yields `None`, and a
/// process that exits between device and OS sampling is dropped.
pub struct StatusAggregator<H, P, C> {
    hardware: H,
    processes: P,
    cpu: C,
    fallback_process: String,
}

impl<H, P, C> StatusAggregator<H, P, C>
where
    H: HardwareSource,
    P: ProcessSource,
    C: CpuSource,
{
    pub fn new(hardware: H, processes: P, cpu: C) -> Self {
        Self {
            hardware,
            processes,
            cpu,
            fallback_process: DEFAULT_FALLBACK_PROCESS.to_string(),
        }
    }

    /// Process name used when no device reports any process
    pub fn with_fallback_process(mut self, name: impl Into<String>) -> Self {
        self.fallback_process = name.into();
        self
    }

    pub fn hardware(&self) -> &H {
        &self.hardware
    }

    pub fn sample_once(&mut self) -> SystemSnapshot {
        let cpu = self.cpu.read();

        let device_count = self.device_count();
        let devices: Vec<DeviceStatus> = (0..device_count)
            .filter_map(|index| self.hardware.device_status(index))
            .collect();

        let mut processes = self.attributed_processes(device_count);
        if processes.is_empty() {
            processes = self.processes.by_name(&self.fallback_process);
            log::trace!(
                "No device processes, {} '{}' processes from fallback",
                processes.len(),
                self.fallback_process
            );
        }

        SystemSnapshot {
            timestamp: unix_timestamp(),
            cpu,
            devices,
            processes,
        }
    }

    /// Host, CPU and static device identity
    pub fn system_info(&mut self) -> SystemInfo {
        let host = self.cpu.host_info();
        let cpu = self.cpu.static_info();

        let device_count = self.device_count();
        let devices = (0..device_count)
            .filter_map(|index| self.hardware.device_static_info(index))
            .collect();

        SystemInfo {
            host_name: host.host_name,
            os: host.os,
            cpu,
            devices,
        }
    }

    pub fn shutdown(&mut self) {
        self.hardware.shutdown();
    }

    fn device_count(&mut self) -> u32 {
        match self.hardware.init() {
            Ok(()) => self.hardware.device_count(),
            Err(_) => 0,
        }
    }

    /// Resolves device-reported pids to OS records, in device-index order.
    /// A pid reported by several devices is attributed to the first one.
    fn attributed_processes(&mut self, device_count: u32) -> Vec<ProcessRecord> {
        let mut seen = HashSet::new();
        let mut processes = Vec::new();

        for index in 0..device_count {
            for handle in self.hardware.device_process_handles(index) {
                if !seen.insert(handle.pid) {
                    continue;
                }
                match self.processes.by_pid(handle.pid) {
                    Ok(mut record) => {
                        record.attribute_to(index, &handle);
                        processes.push(record);
                    }
                    Err(e) if e.is_process_gone() => {
                        log::trace!("gpu{} process {} exited before lookup", index, handle.pid);
                    }
                    Err(e) => {
                        log::debug!("gpu{} process {} lookup failed: {}", index, handle.pid, e);
                    }
                }
            }
        }

        processes
    }
}

fn unix_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs() as i64)
        .unwrap_or(0)
}
