use serde::Serialize;

pub type Pid = u32;
pub type DeviceIndex = u32;

pub const MIB: u64 = 1024 * 1024;

/// One tick of the status feed
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct SystemSnapshot {
    pub timestamp: i64,
    pub cpu: CpuStatus,
    pub devices: Vec<DeviceStatus>,
    pub processes: Vec<ProcessRecord>,
}

/// Identity record emitted once, before the first snapshot
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct SystemInfo {
    pub host_name: String,
    pub os: String,
    pub cpu: CpuInfo,
    pub devices: Vec<DeviceInfo>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct HostInfo {
    pub host_name: String,
    pub os: String,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Default)]
pub struct CpuStatus {
    pub cpu_percent: f32,
    pub memory_percent: f32,
}

/// Static CPU identity. Unknown attributes are empty strings or zero.
#[derive(Serialize, Debug, Clone, PartialEq, Default)]
pub struct CpuInfo {
    pub name: String,
    pub frequency_mhz: u64,
    pub arch: String,
    pub bits: u32,
    pub count: usize,
    pub vendor_id: String,
}

/// Instantaneous device counters. `None` means the counter is not supported
/// on this device, not zero.
#[derive(Serialize, Debug, Clone, PartialEq, Default)]
pub struct DeviceStatus {
    pub index: DeviceIndex,
    pub name: Option<String>,
    pub uuid: Option<String>,
    pub temperature: Option<u32>,
    pub fan_speed: Option<u32>,
    pub utilization_gpu: Option<u32>,
    pub utilization_memory: Option<u32>,
    pub utilization_enc: Option<u32>,
    pub utilization_dec: Option<u32>,
    pub power_draw_watts: Option<u32>,
    pub power_limit_watts: Option<u32>,
    pub memory_used_mib: Option<u64>,
    pub memory_total_mib: Option<u64>,
}

/// Static device capabilities, read once per device
#[derive(Serialize, Debug, Clone, PartialEq, Default)]
pub struct DeviceInfo {
    pub index: DeviceIndex,
    pub name: Option<String>,
    pub uuid: Option<String>,
    pub compute_capability_major: Option<i32>,
    pub compute_capability_minor: Option<i32>,
    pub cores: Option<u32>,
    pub multiprocessors: Option<u32>,
    pub max_gpu_clock_mhz: Option<u32>,
    pub max_memory_clock_mhz: Option<u32>,
    pub total_memory_mib: Option<u64>,
    /// Free memory when the identity was first read
    pub free_memory_mib: Option<u64>,
}

/// A process as reported by a device: pid plus the device memory it holds,
/// when the driver exposes it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceProcessHandle {
    pub pid: Pid,
    pub used_memory_bytes: Option<u64>,
}

#[derive(Serialize, Debug, Clone, PartialEq, Default)]
pub struct ProcessRecord {
    pub pid: Pid,
    pub command: String,
    pub full_command: Vec<String>,
    pub username: Option<String>,
    pub cpu_percent: f32,
    pub cpu_memory_usage_mib: Option<u64>,

    pub device_id: Option<DeviceIndex>,
    pub device_memory_used_mib: Option<u64>,
}

impl ProcessRecord {
    /// Attaches device attribution to an OS-level record
    pub fn attribute_to(&mut self, index: DeviceIndex, handle: &DeviceProcessHandle) {
        self.device_id = Some(index);
        self.device_memory_used_mib = handle.used_memory_bytes.map(|bytes| bytes / MIB);
    }
}
