use nvml_wrapper::enum_wrappers::device::TemperatureSensor;
use nvml_wrapper::enums::device::UsedGpuMemory;
use nvml_wrapper::error::NvmlError;
use nvml_wrapper::{Device, Nvml};
use thiserror::Error;

/// Outcome of a single driver call. `NotSupported` is a value-like condition
/// the query layer turns into an absent field; `Driver` is everything else.
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("not supported on this device")]
    NotSupported,
    #[error("driver call failed: {0}")]
    Driver(String),
}

impl From<NvmlError> for TelemetryError {
    fn from(err: NvmlError) -> Self {
        match err {
            NvmlError::NotSupported => TelemetryError::NotSupported,
            other => TelemetryError::Driver(other.to_string()),
        }
    }
}

pub type TelemetryResult<T> = Result<T, TelemetryError>;

#[derive(Clone, Copy, Debug)]
pub struct MemorySnapshot {
    pub total: u64,
    pub used: u64,
    pub free: u64,
}

#[derive(Clone, Copy, Debug)]
pub struct UtilizationSnapshot {
    pub gpu: u32,
    pub memory: u32,
}

/// A process the driver reports as holding device memory. Memory is in
/// bytes; `None` when the driver cannot account for it.
#[derive(Clone, Copy, Debug)]
pub struct DeviceProcess {
    pub pid: u32,
    pub used_gpu_memory: Option<u64>,
}

/// Per-device getters. Each one either yields a typed value or reports a
/// `TelemetryError`, so the query layer can tell "unsupported" apart from a
/// real failure without touching NVML types.
pub trait DeviceTelemetry {
    fn name(&self) -> TelemetryResult<String>;
    fn uuid(&self) -> TelemetryResult<String>;
    fn serial(&self) -> TelemetryResult<String>;
    fn bus_id(&self) -> TelemetryResult<String>;
    fn temperature(&self) -> TelemetryResult<u32>;
    fn power_usage(&self) -> TelemetryResult<u32>;
    fn power_limit(&self) -> TelemetryResult<u32>;
    fn memory_info(&self) -> TelemetryResult<MemorySnapshot>;
    fn utilization_rates(&self) -> TelemetryResult<UtilizationSnapshot>;
    fn compute_processes(&self) -> TelemetryResult<Vec<DeviceProcess>>;
    fn graphics_processes(&self) -> TelemetryResult<Vec<DeviceProcess>>;
}

/// Device enumeration. The query engine takes this as a parameter so tests
/// can substitute a deterministic fake.
pub trait GpuTelemetry {
    fn device_count(&self) -> TelemetryResult<u32>;
    fn device(&self, index: u32) -> TelemetryResult<Box<dyn DeviceTelemetry + '_>>;
}

/// Production implementation over NVML. Owns the library handle; dropping it
/// shuts the library down, so the handle never outlives one query invocation.
pub struct NvmlTelemetry {
    nvml: Nvml,
}

impl NvmlTelemetry {
    pub fn init() -> TelemetryResult<Self> {
        let nvml = Nvml::init()?;
        Ok(Self { nvml })
    }
}

impl GpuTelemetry for NvmlTelemetry {
    fn device_count(&self) -> TelemetryResult<u32> {
        Ok(self.nvml.device_count()?)
    }

    fn device(&self, index: u32) -> TelemetryResult<Box<dyn DeviceTelemetry + '_>> {
        let device = self.nvml.device_by_index(index)?;
        Ok(Box::new(NvmlDevice { device }))
    }
}

struct NvmlDevice<'nvml> {
    device: Device<'nvml>,
}

impl DeviceTelemetry for NvmlDevice<'_> {
    fn name(&self) -> TelemetryResult<String> {
        Ok(self.device.name()?)
    }

    fn uuid(&self) -> TelemetryResult<String> {
        Ok(self.device.uuid()?)
    }

    fn serial(&self) -> TelemetryResult<String> {
        Ok(self.device.serial()?)
    }

    fn bus_id(&self) -> TelemetryResult<String> {
        Ok(self.device.pci_info()?.bus_id)
    }

    fn temperature(&self) -> TelemetryResult<u32> {
        Ok(self.device.temperature(TemperatureSensor::Gpu)?)
    }

    fn power_usage(&self) -> TelemetryResult<u32> {
        Ok(self.device.power_usage()?)
    }

    fn power_limit(&self) -> TelemetryResult<u32> {
        Ok(self.device.enforced_power_limit()?)
    }

    fn memory_info(&self) -> TelemetryResult<MemorySnapshot> {
        let mem = self.device.memory_info()?;
        Ok(MemorySnapshot {
            total: mem.total,
            used: mem.used,
            free: mem.free,
        })
    }

    fn utilization_rates(&self) -> TelemetryResult<UtilizationSnapshot> {
        let util = self.device.utilization_rates()?;
        Ok(UtilizationSnapshot {
            gpu: util.gpu,
            memory: util.memory,
        })
    }

    fn compute_processes(&self) -> TelemetryResult<Vec<DeviceProcess>> {
        Ok(convert_processes(self.device.running_compute_processes()?))
    }

    fn graphics_processes(&self) -> TelemetryResult<Vec<DeviceProcess>> {
        Ok(convert_processes(self.device.running_graphics_processes()?))
    }
}

fn convert_processes(
    raw: Vec<nvml_wrapper::struct_wrappers::device::ProcessInfo>,
) -> Vec<DeviceProcess> {
    raw.into_iter()
        .map(|proc| DeviceProcess {
            pid: proc.pid,
            used_gpu_memory: match proc.used_gpu_memory {
                UsedGpuMemory::Used(bytes) => Some(bytes),
                UsedGpuMemory::Unavailable => None,
            },
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_supported_maps_to_its_own_variant() {
        let err = TelemetryError::from(NvmlError::NotSupported);
        assert!(matches!(err, TelemetryError::NotSupported));
    }

    #[test]
    fn other_nvml_errors_map_to_driver() {
        let err = TelemetryError::from(NvmlError::Uninitialized);
        assert!(matches!(err, TelemetryError::Driver(_)));
    }
}
