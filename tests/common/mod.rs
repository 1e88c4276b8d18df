#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use hwscope_agent::collectors::{CpuSource, HardwareSource, ProcessSource};
use hwscope_agent::metrics::{
    CpuInfo, CpuStatus, DeviceIndex, DeviceInfo, DeviceProcessHandle, DeviceStatus, HostInfo, Pid,
    ProcessRecord, SystemInfo, SystemSnapshot,
};
use hwscope_agent::sinks::Sink;
use hwscope_agent::{AgentError, Result};

#[derive(Default)]
pub struct MockDevice {
    pub status: DeviceStatus,
    pub processes: Vec<DeviceProcessHandle>,
    /// The device exists but its counters cannot be read
    pub status_unavailable: bool,
}

/// Static hardware; counts how often it was opened and closed
#[derive(Default)]
pub struct MockHardware {
    pub fail_init: bool,
    pub devices: Vec<MockDevice>,
    pub initialized: bool,
    pub init_calls: Arc<Mutex<u32>>,
    pub shutdown_calls: Arc<Mutex<u32>>,
}

impl MockHardware {
    pub fn with_devices(devices: Vec<MockDevice>) -> Self {
        Self {
            devices,
            ..Default::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail_init: true,
            ..Default::default()
        }
    }
}

impl HardwareSource for MockHardware {
    fn init(&mut self) -> Result<()> {
        *self.init_calls.lock() += 1;
        if self.fail_init {
            return Err(AgentError::hardware_unavailable("no driver"));
        }
        self.initialized = true;
        Ok(())
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn device_count(&self) -> u32 {
        if self.initialized { self.devices.len() as u32 } else { 0 }
    }

    fn device_static_info(&mut self, index: DeviceIndex) -> Option<DeviceInfo> {
        let device = self.devices.get(index as usize)?;
        Some(DeviceInfo {
            index,
            name: device.status.name.clone(),
            ..Default::default()
        })
    }

    fn device_status(&self, index: DeviceIndex) -> Option<DeviceStatus> {
        self.devices
            .get(index as usize)
            .filter(|device| !device.status_unavailable)
            .map(|device| device.status.clone())
    }

    fn device_process_handles(&self, index: DeviceIndex) -> Vec<DeviceProcessHandle> {
        self.devices
            .get(index as usize)
            .map(|device| device.processes.clone())
            .unwrap_or_default()
    }

    fn shutdown(&mut self) {
        *self.shutdown_calls.lock() += 1;
        self.initialized = false;
    }
}

/// Process table keyed by pid
#[derive(Default)]
pub struct MockProcesses {
    pub table: HashMap<Pid, ProcessRecord>,
    pub name_scans: Arc<Mutex<Vec<String>>>,
}

impl MockProcesses {
    pub fn with(records: Vec<ProcessRecord>) -> Self {
        Self {
            table: records.into_iter().map(|record| (record.pid, record)).collect(),
            ..Default::default()
        }
    }
}

impl ProcessSource for MockProcesses {
    fn by_pid(&mut self, pid: Pid) -> Result<ProcessRecord> {
        self.table.get(&pid).cloned().ok_or(AgentError::ProcessNotFound(pid))
    }

    fn by_name(&mut self, matcher: &str) -> Vec<ProcessRecord> {
        self.name_scans.lock().push(matcher.to_string());
        let mut records: Vec<ProcessRecord> = self
            .table
            .values()
            .filter(|record| record.command == matcher)
            .cloned()
            .collect();
        records.sort_by_key(|record| record.pid);
        records
    }
}

pub struct MockCpu;

impl CpuSource for MockCpu {
    fn read(&mut self) -> CpuStatus {
        CpuStatus {
            cpu_percent: 25.0,
            memory_percent: 60.0,
        }
    }

    fn static_info(&mut self) -> CpuInfo {
        CpuInfo {
            name: "Mock CPU".to_string(),
            count: 8,
            ..Default::default()
        }
    }

    fn host_info(&self) -> HostInfo {
        HostInfo {
            host_name: "mockhost".to_string(),
            os: "MockOS 1.0".to_string(),
        }
    }
}

pub fn process(pid: Pid, command: &str) -> ProcessRecord {
    ProcessRecord {
        pid,
        command: command.to_string(),
        full_command: vec![command.to_string()],
        cpu_percent: 1.5,
        cpu_memory_usage_mib: Some(64),
        ..Default::default()
    }
}

pub fn handle(pid: Pid, used_memory_bytes: Option<u64>) -> DeviceProcessHandle {
    DeviceProcessHandle {
        pid,
        used_memory_bytes,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Emitted {
    Header(SystemInfo),
    Snapshot(SystemSnapshot, bool),
}

/// Keeps everything it receives; optionally fails or panics on snapshots
#[derive(Clone, Default)]
pub struct RecordingSink {
    pub emitted: Arc<Mutex<Vec<Emitted>>>,
    pub fail_snapshots: bool,
    pub panic_on_first_snapshot: bool,
}

impl RecordingSink {
    pub fn snapshots(&self) -> usize {
        self.emitted
            .lock()
            .iter()
            .filter(|emitted| matches!(emitted, Emitted::Snapshot(..)))
            .count()
    }
}

impl Sink for RecordingSink {
    fn emit_header(&mut self, info: &SystemInfo) -> Result<()> {
        self.emitted.lock().push(Emitted::Header(info.clone()));
        Ok(())
    }

    fn emit(&mut self, snapshot: &SystemSnapshot, first_tick: bool) -> Result<()> {
        if self.panic_on_first_snapshot && first_tick {
            panic!("sink exploded");
        }
        self.emitted.lock().push(Emitted::Snapshot(snapshot.clone(), first_tick));
        if self.fail_snapshots {
            return Err(AgentError::Io(std::io::Error::other("disk full")));
        }
        Ok(())
    }
}
