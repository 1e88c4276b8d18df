use std::collections::{HashMap, HashSet};

use nvml_wrapper::Nvml;
use nvml_wrapper::enum_wrappers::device::{Clock, TemperatureSensor};
use nvml_wrapper::enums::device::UsedGpuMemory;
use nvml_wrapper::struct_wrappers::device::ProcessInfo;

use crate::collectors::{HardwareSource, try_read};
use crate::error::{AgentError, Result};
use crate::metrics::{DeviceIndex, DeviceInfo, DeviceProcessHandle, DeviceStatus, MIB};

enum NvmlState {
    Uninitialized,
    Ready(Nvml),
    Unavailable(String),
    Closed,
}

/// NVIDIA devices through NVML.
///
/// NVML is opened lazily by the first `init` call, so the thread that samples
/// is also the one that opens the library.
pub struct NvmlSource {
    state: NvmlState,
    static_info: HashMap<DeviceIndex, DeviceInfo>,
}

impl NvmlSource {
    pub fn new() -> Self {
        Self {
            state: NvmlState::Uninitialized,
            static_info: HashMap::new(),
        }
    }

    fn nvml(&self) -> Option<&Nvml> {
        match &self.state {
            NvmlState::Ready(nvml) => Some(nvml),
            _ => None,
        }
    }
}

impl Default for NvmlSource {
    fn default() -> Self {
        Self::new()
    }
}

impl HardwareSource for NvmlSource {
    fn init(&mut self) -> Result<()> {
        match &self.state {
            NvmlState::Ready(_) => return Ok(()),
            NvmlState::Unavailable(reason) => {
                return Err(AgentError::hardware_unavailable(reason.clone()));
            }
            NvmlState::Closed => {
                return Err(AgentError::hardware_unavailable("NVML already shut down"));
            }
            NvmlState::Uninitialized => {}
        }

        match Nvml::init() {
            Ok(nvml) => {
                match nvml.sys_driver_version() {
                    Ok(version) => log::info!("NVML initialized (driver {})", version),
                    Err(_) => log::info!("NVML initialized"),
                }
                self.state = NvmlState::Ready(nvml);
                Ok(())
            }
            Err(e) => {
                log::warn!("Failed to initialize NVML: {}", e);
                log::warn!("GPU monitoring will not be available");
                let reason = e.to_string();
                self.state = NvmlState::Unavailable(reason.clone());
                Err(AgentError::hardware_unavailable(reason))
            }
        }
    }

    fn is_initialized(&self) -> bool {
        self.nvml().is_some()
    }

    fn device_count(&self) -> u32 {
        self.nvml()
            .and_then(|nvml| try_read(format_args!("device count"), || nvml.device_count()))
            .unwrap_or(0)
    }

    fn device_static_info(&mut self, index: DeviceIndex) -> Option<DeviceInfo> {
        if let Some(info) = self.static_info.get(&index) {
            return Some(info.clone());
        }

        let info = {
            let nvml = self.nvml()?;
            let device = try_read(format_args!("gpu{} handle", index), || {
                nvml.device_by_index(index)
            })?;

            let capability = try_read(format_args!("gpu{} compute capability", index), || {
                device.cuda_compute_capability()
            });
            let cores = try_read(format_args!("gpu{} cores", index), || device.num_cores());
            let memory = try_read(format_args!("gpu{} memory", index), || device.memory_info());
            let multiprocessors = match (&capability, cores) {
                (Some(cc), Some(cores)) => {
                    cores_per_multiprocessor(cc.major, cc.minor).map(|per_sm| cores / per_sm)
                }
                _ => None,
            };

            DeviceInfo {
                index,
                name: try_read(format_args!("gpu{} name", index), || device.name()),
                uuid: try_read(format_args!("gpu{} uuid", index), || device.uuid()),
                compute_capability_major: capability.as_ref().map(|cc| cc.major),
                compute_capability_minor: capability.as_ref().map(|cc| cc.minor),
                cores,
                multiprocessors,
                max_gpu_clock_mhz: try_read(format_args!("gpu{} max graphics clock", index), || {
                    device.max_clock_info(Clock::Graphics)
                }),
                max_memory_clock_mhz: try_read(format_args!("gpu{} max memory clock", index), || {
                    device.max_clock_info(Clock::Memory)
                }),
                total_memory_mib: memory.as_ref().map(|m| m.total / MIB),
                free_memory_mib: memory.as_ref().map(|m| m.free / MIB),
            }
        };

        self.static_info.insert(index, info.clone());
        Some(info)
    }

    fn device_status(&self, index: DeviceIndex) -> Option<DeviceStatus> {
        let nvml = self.nvml()?;
        let device = try_read(format_args!("gpu{} handle", index), || {
            nvml.device_by_index(index)
        })?;

        let utilization = try_read(format_args!("gpu{} utilization", index), || {
            device.utilization_rates()
        });
        let memory = try_read(format_args!("gpu{} memory", index), || device.memory_info());

        Some(DeviceStatus {
            index,
            name: try_read(format_args!("gpu{} name", index), || device.name()),
            uuid: try_read(format_args!("gpu{} uuid", index), || device.uuid()),
            temperature: try_read(format_args!("gpu{} temperature", index), || {
                device.temperature(TemperatureSensor::Gpu)
            }),
            fan_speed: try_read(format_args!("gpu{} fan speed", index), || device.fan_speed(0)),
            utilization_gpu: utilization.as_ref().map(|u| u.gpu),
            utilization_memory: utilization.as_ref().map(|u| u.memory),
            utilization_enc: try_read(format_args!("gpu{} encoder utilization", index), || {
                device.encoder_utilization()
            })
            .map(|u| u.utilization),
            utilization_dec: try_read(format_args!("gpu{} decoder utilization", index), || {
                device.decoder_utilization()
            })
            .map(|u| u.utilization),
            // milliwatts -> watts
            power_draw_watts: try_read(format_args!("gpu{} power usage", index), || {
                device.power_usage()
            })
            .map(|mw| mw / 1000),
            power_limit_watts: try_read(format_args!("gpu{} power limit", index), || {
                device.enforced_power_limit()
            })
            .map(|mw| mw / 1000),
            memory_used_mib: memory.as_ref().map(|m| m.used / MIB),
            memory_total_mib: memory.as_ref().map(|m| m.total / MIB),
        })
    }

    fn device_process_handles(&self, index: DeviceIndex) -> Vec<DeviceProcessHandle> {
        let Some(nvml) = self.nvml() else {
            return Vec::new();
        };
        let Some(device) = try_read(format_args!("gpu{} handle", index), || {
            nvml.device_by_index(index)
        }) else {
            return Vec::new();
        };

        let compute = try_read(format_args!("gpu{} compute processes", index), || {
            device.running_compute_processes()
        })
        .map(into_handles);
        let graphics = try_read(format_args!("gpu{} graphics processes", index), || {
            device.running_graphics_processes()
        })
        .map(into_handles);

        merge_process_lists(compute, graphics)
    }

    fn shutdown(&mut self) {
        let state = std::mem::replace(&mut self.state, NvmlState::Closed);
        if let NvmlState::Ready(nvml) = state {
            match nvml.shutdown() {
                Ok(()) => log::info!("NVML shut down"),
                Err(e) => log::warn!("Failed to shut down NVML: {}", e),
            }
        }
    }
}

fn into_handles(processes: Vec<ProcessInfo>) -> Vec<DeviceProcessHandle> {
    processes
        .into_iter()
        .map(|process| DeviceProcessHandle {
            pid: process.pid,
            used_memory_bytes: match process.used_gpu_memory {
                UsedGpuMemory::Used(bytes) => Some(bytes),
                UsedGpuMemory::Unavailable => None,
            },
        })
        .collect()
}

/// Unions the compute and graphics lists of one device.
///
/// A process running in both modes is reported once, with the entry from the
/// compute list.
pub fn merge_process_lists(
    compute: Option<Vec<DeviceProcessHandle>>,
    graphics: Option<Vec<DeviceProcessHandle>>,
) -> Vec<DeviceProcessHandle> {
    let mut seen = HashSet::new();
    compute
        .into_iter()
        .flatten()
        .chain(graphics.into_iter().flatten())
        .filter(|handle| seen.insert(handle.pid))
        .collect()
}

/// CUDA cores per multiprocessor for a compute capability.
/// NVML exposes the total core count only.
pub fn cores_per_multiprocessor(major: i32, minor: i32) -> Option<u32> {
    let cores = match (major, minor) {
        // Tesla
        (1, _) => 8,
        // Fermi
        (2, 0) => 32,
        (2, 1) => 48,
        // Kepler
        (3, _) => 192,
        // Maxwell
        (5, _) => 128,
        // Pascal
        (6, 0) => 64,
        (6, 1) | (6, 2) => 128,
        // Volta, Turing, Ampere datacenter
        (7, _) | (8, 0) => 64,
        // Ampere consumer, Ada, Hopper
        (8, 6) | (8, 7) | (8, 9) | (9, 0) => 128,
        // Blackwell
        (10, _) | (12, _) => 128,
        _ => return None,
    };
    Some(cores)
}
