pub mod cpu;
pub mod gpu;
pub mod process;

use std::fmt;

use crate::error::Result;
use crate::metrics::{
    CpuInfo, CpuStatus, DeviceIndex, DeviceInfo, DeviceProcessHandle, DeviceStatus, HostInfo,
    Pid, ProcessRecord,
};

/// Accelerator enumeration and per-device counters.
///
/// Implementations own the single handle to the management library for the
/// lifetime of the process. Every method other than `init` must degrade to
/// "no data" instead of failing when the library is unavailable.
pub trait HardwareSource {
    /// Opens the management interface. Repeated calls reuse the open handle.
    fn init(&mut self) -> Result<()>;

    fn is_initialized(&self) -> bool;

    /// Number of devices, 0 when the interface is unavailable
    fn device_count(&self) -> u32;

    fn device_static_info(&mut self, index: DeviceIndex) -> Option<DeviceInfo>;

    /// Reads the mutable counters of one device. Returns `None` only when the
    /// device handle itself cannot be obtained.
    fn device_status(&self, index: DeviceIndex) -> Option<DeviceStatus>;

    /// Compute and graphics processes of one device, one entry per pid.
    /// An unsupported query is indistinguishable from an idle device.
    fn device_process_handles(&self, index: DeviceIndex) -> Vec<DeviceProcessHandle>;

    /// Releases the handle. Later `init` calls fail instead of reopening it.
    fn shutdown(&mut self);
}

/// OS process introspection
pub trait ProcessSource {
    /// Fails with `AgentError::ProcessNotFound` when the process has exited
    fn by_pid(&mut self, pid: Pid) -> Result<ProcessRecord>;

    /// Scans the whole process table for processes whose short name, first
    /// command-line token or executable basename equals `matcher`
    fn by_name(&mut self, matcher: &str) -> Vec<ProcessRecord>;
}

/// Host-wide CPU and memory load plus static identity
pub trait CpuSource {
    fn read(&mut self) -> CpuStatus;

    fn static_info(&mut self) -> CpuInfo;

    fn host_info(&self) -> HostInfo;
}

/// Runs one fallible read, turning a failure into `None`.
///
/// Unsupported capabilities are expected on most hardware, so failures are
/// only visible at debug level.
pub fn try_read<T, E: fmt::Display>(
    what: fmt::Arguments<'_>,
    read: impl FnOnce() -> std::result::Result<T, E>,
) -> Option<T> {
    match read() {
        Ok(value) => Some(value),
        Err(e) => {
            log::debug!("{} unavailable: {}", what, e);
            None
        }
    }
}
