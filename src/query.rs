use log::{debug, warn};
use thiserror::Error;

use crate::data::{bytes_to_mb, raw_power_to_watts, DeviceRecord, ProcessUsage};
use crate::monitor::{DeviceTelemetry, GpuTelemetry, TelemetryError, TelemetryResult};
use crate::resolve::ProcessResolver;

/// A failure that aborts the whole query. Per-field "not supported" and
/// stale PIDs never reach this type; they become absent values instead.
#[derive(Error, Debug)]
pub enum QueryError {
    #[error("could not count devices: {0}")]
    DeviceCount(String),
    #[error("could not open device {index}: {reason}")]
    Device { index: u32, reason: String },
    #[error("device {index}: {field} query failed: {reason}")]
    Field {
        index: u32,
        field: &'static str,
        reason: String,
    },
}

/// Walks every device, gathers its metrics with per-field failure isolation,
/// and joins the driver's process list against the OS process table.
///
/// Both collaborators come in as parameters so tests can substitute
/// deterministic fakes.
pub struct QueryEngine<T, R> {
    telemetry: T,
    resolver: R,
}

impl<T: GpuTelemetry, R: ProcessResolver> QueryEngine<T, R> {
    pub fn new(telemetry: T, resolver: R) -> Self {
        Self { telemetry, resolver }
    }

    /// One record per device, in enumeration order. No partial result: any
    /// failure other than a per-field "not supported" aborts everything.
    pub fn query(&mut self) -> Result<Vec<DeviceRecord>, QueryError> {
        let count = self
            .telemetry
            .device_count()
            .map_err(|err| QueryError::DeviceCount(err.to_string()))?;
        debug!("querying {count} device(s)");

        let mut records = Vec::with_capacity(count as usize);
        for index in 0..count {
            records.push(self.query_device(index)?);
        }
        Ok(records)
    }

    fn query_device(&mut self, index: u32) -> Result<DeviceRecord, QueryError> {
        let device = self
            .telemetry
            .device(index)
            .map_err(|err| QueryError::Device {
                index,
                reason: err.to_string(),
            })?;

        let memory = field(index, "memory info", device.memory_info())?;
        let utilization = field(index, "utilization rates", device.utilization_rates())?;
        let processes = gather_processes(index, device.as_ref(), &mut self.resolver)?;

        Ok(DeviceRecord {
            index,
            name: field(index, "name", device.name())?,
            uuid: field(index, "uuid", device.uuid())?,
            serial: field(index, "serial", device.serial())?,
            bus_id: field(index, "bus id", device.bus_id())?,
            temperature_gpu: field(index, "temperature", device.temperature())?,
            utilization_gpu: utilization.map(|util| util.gpu),
            memory_utilization: utilization.map(|util| util.memory),
            memory_total: memory.map(|mem| mem.total),
            memory_used: memory.map(|mem| mem.used),
            memory_free: memory.map(|mem| mem.free),
            power_draw: field(index, "power draw", device.power_usage())?.map(raw_power_to_watts),
            power_limit: field(index, "power limit", device.power_limit())?
                .map(raw_power_to_watts),
            processes,
        })
    }
}

/// Unsupported-to-sentinel translation for one getter call. Anything other
/// than "not supported" is fatal for the whole query.
fn field<V>(
    index: u32,
    name: &'static str,
    result: TelemetryResult<V>,
) -> Result<Option<V>, QueryError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(TelemetryError::NotSupported) => {
            debug!("device {index}: {name} not supported");
            Ok(None)
        }
        Err(TelemetryError::Driver(reason)) => Err(QueryError::Field {
            index,
            field: name,
            reason,
        }),
    }
}

/// Union of the compute and graphics process lists, resolved against the OS
/// process table. `None` only when the driver supports neither list; an
/// empty-but-supported list stays `Some(vec![])` so callers can tell "no
/// processes" from "cannot determine processes".
fn gather_processes<R: ProcessResolver>(
    index: u32,
    device: &dyn DeviceTelemetry,
    resolver: &mut R,
) -> Result<Option<Vec<ProcessUsage>>, QueryError> {
    let compute = field(index, "compute processes", device.compute_processes())?;
    let graphics = field(index, "graphics processes", device.graphics_processes())?;
    let (compute, graphics) = match (compute, graphics) {
        (None, None) => return Ok(None),
        (compute, graphics) => (compute.unwrap_or_default(), graphics.unwrap_or_default()),
    };

    // Union by PID; a PID reported by both contexts keeps the compute entry.
    let mut merged = compute;
    for proc in graphics {
        if !merged.iter().any(|existing| existing.pid == proc.pid) {
            merged.push(proc);
        }
    }

    let mut usages = Vec::with_capacity(merged.len());
    for proc in merged {
        let identity = resolver.resolve(proc.pid);
        if identity.is_none() {
            // Accepted race: the PID was live when the driver snapshotted it.
            // The memory figure is still meaningful, so the entry stays.
            warn!(
                "device {index}: pid {} vanished before it could be resolved",
                proc.pid
            );
        }
        let (username, command) = match identity {
            Some(identity) => (identity.username, identity.command),
            None => (None, None),
        };
        usages.push(ProcessUsage {
            pid: proc.pid,
            username,
            command,
            gpu_memory_usage: proc.used_gpu_memory.map(bytes_to_mb),
        });
    }
    Ok(Some(usages))
}
