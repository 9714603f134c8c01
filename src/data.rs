use serde::Serialize;

/// One device's telemetry snapshot, assembled by a single query pass.
///
/// Every field the driver reports as unsupported is `None`, never zero; the
/// serde output carries those as explicit `null`s, which is the wire format
/// downstream consumers rely on.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DeviceRecord {
    pub index: u32,
    pub name: Option<String>,
    pub uuid: Option<String>,
    pub serial: Option<String>,
    pub bus_id: Option<String>,
    pub temperature_gpu: Option<u32>,
    pub utilization_gpu: Option<u32>,
    pub memory_utilization: Option<u32>,
    pub memory_total: Option<u64>,
    pub memory_used: Option<u64>,
    pub memory_free: Option<u64>,
    pub power_draw: Option<u64>,
    pub power_limit: Option<u64>,
    /// `None` means the driver could not report the process list at all,
    /// which is distinct from an empty list.
    pub processes: Option<Vec<ProcessUsage>>,
}

/// A process holding memory on a device.
///
/// `username`/`command` are `None` when the PID had already vanished from the
/// OS process table by the time we looked it up. The memory figure from the
/// driver is kept regardless.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ProcessUsage {
    pub pid: u32,
    pub username: Option<String>,
    pub command: Option<String>,
    /// GPU memory used, in MB.
    pub gpu_memory_usage: Option<u64>,
}

/// Integer-floor conversion from bytes to MB (1024²), as displayed.
pub fn bytes_to_mb(bytes: u64) -> u64 {
    bytes / (1024 * 1024)
}

/// Raw driver power readings divide by 1000 and truncate to whole watts.
pub fn raw_power_to_watts(raw: u32) -> u64 {
    u64::from(raw / 1000)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn mb_conversion_floors() {
        assert_eq!(bytes_to_mb(8_388_608_000), 8000);
        assert_eq!(bytes_to_mb(12_883_853_312), 12287);
        assert_eq!(bytes_to_mb(12_781_551_616), 12189);
        assert_eq!(bytes_to_mb(1024 * 1024 - 1), 0);
    }

    #[test]
    fn power_conversion_truncates() {
        assert_eq!(raw_power_to_watts(125_000), 125);
        assert_eq!(raw_power_to_watts(125_999), 125);
        assert_eq!(raw_power_to_watts(0), 0);
    }

    #[test]
    fn unsupported_fields_serialize_as_null() {
        let record = DeviceRecord {
            index: 2,
            name: Some("GeForce GTX TITAN 2".to_string()),
            uuid: None,
            serial: None,
            bus_id: None,
            temperature_gpu: Some(71),
            utilization_gpu: None,
            memory_utilization: None,
            memory_total: Some(12_781_551_616),
            memory_used: Some(0),
            memory_free: Some(12_781_551_616),
            power_draw: Some(250),
            power_limit: Some(250),
            processes: None,
        };
        let json: serde_json::Value = serde_json::to_value(&record).unwrap();
        assert_eq!(json["utilization_gpu"], serde_json::Value::Null);
        assert_eq!(json["processes"], serde_json::Value::Null);
        assert_eq!(json["memory_used"], serde_json::json!(0));
    }

    #[test]
    fn stale_process_serializes_with_null_identity() {
        let usage = ProcessUsage {
            pid: 99999,
            username: None,
            command: None,
            gpu_memory_usage: Some(9999),
        };
        let json = serde_json::to_value(&usage).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "pid": 99999,
                "username": null,
                "command": null,
                "gpu_memory_usage": 9999,
            })
        );
    }
}
