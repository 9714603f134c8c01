use std::fmt::Write;

use crate::data::{bytes_to_mb, DeviceRecord, ProcessUsage};

/// Marker for any scalar the driver reported as unsupported.
const UNSUPPORTED: &str = "??";

/// Fixed-column table, one line per device:
///
/// ```text
/// [0] GeForce GTX TITAN 0 | 80'C,  76 % |  8000 / 12287 MB | user1(4000M) user2(4000M)
/// ```
pub fn render_table(records: &[DeviceRecord]) -> String {
    let mut out = String::new();
    for record in records {
        // writing to a String cannot fail
        let _ = writeln!(out, "{}", render_line(record));
    }
    out
}

fn render_line(record: &DeviceRecord) -> String {
    let name = record.name.as_deref().unwrap_or(UNSUPPORTED);
    let temp = scalar(record.temperature_gpu.map(u64::from));
    let util = scalar(record.utilization_gpu.map(u64::from));
    let used = scalar(record.memory_used.map(bytes_to_mb));
    let total = scalar(record.memory_total.map(bytes_to_mb));
    format!(
        "[{}] {} | {}'C, {:>3} % | {:>5} / {:>5} MB | {}",
        record.index,
        name,
        temp,
        util,
        used,
        total,
        render_processes(record.processes.as_deref()),
    )
}

fn scalar(value: Option<u64>) -> String {
    value.map_or_else(|| UNSUPPORTED.to_string(), |v| v.to_string())
}

fn render_processes(processes: Option<&[ProcessUsage]>) -> String {
    let Some(processes) = processes else {
        return "(Not Supported)".to_string();
    };
    processes
        .iter()
        .map(render_process)
        .collect::<Vec<_>>()
        .join(" ")
}

fn render_process(process: &ProcessUsage) -> String {
    let username = process.username.as_deref().unwrap_or(UNSUPPORTED);
    let memory = process
        .gpu_memory_usage
        .map_or_else(|| "?".to_string(), |mb| mb.to_string());
    format!("{username}({memory}M)")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn record(index: u32) -> DeviceRecord {
        DeviceRecord {
            index,
            name: Some(format!("GeForce GTX TITAN {index}")),
            uuid: None,
            serial: Some("0322917092147".to_string()),
            bus_id: Some("0000:00:1E.1".to_string()),
            temperature_gpu: None,
            utilization_gpu: None,
            memory_utilization: None,
            memory_total: None,
            memory_used: None,
            memory_free: None,
            power_draw: None,
            power_limit: None,
            processes: None,
        }
    }

    fn usage(pid: u32, username: &str, mb: u64) -> ProcessUsage {
        ProcessUsage {
            pid,
            username: Some(username.to_string()),
            command: Some("python".to_string()),
            gpu_memory_usage: Some(mb),
        }
    }

    #[test]
    fn renders_the_reference_table() {
        let mut gpu0 = record(0);
        gpu0.temperature_gpu = Some(80);
        gpu0.utilization_gpu = Some(76);
        gpu0.memory_total = Some(12_883_853_312);
        gpu0.memory_used = Some(8_388_608_000);
        gpu0.processes = Some(vec![usage(48448, "user1", 4000), usage(153223, "user2", 4000)]);

        let mut gpu1 = record(1);
        gpu1.temperature_gpu = Some(36);
        gpu1.utilization_gpu = Some(0);
        gpu1.memory_total = Some(12_781_551_616);
        gpu1.memory_used = Some(9_437_184_000);
        gpu1.processes = Some(vec![usage(192453, "user1", 3000), usage(194826, "user3", 6000)]);

        let mut gpu2 = record(2);
        gpu2.temperature_gpu = Some(71);
        gpu2.memory_total = Some(12_781_551_616);
        gpu2.memory_used = Some(0);

        let table = render_table(&[gpu0, gpu1, gpu2]);
        assert_eq!(
            table,
            "\
[0] GeForce GTX TITAN 0 | 80'C,  76 % |  8000 / 12287 MB | user1(4000M) user2(4000M)
[1] GeForce GTX TITAN 1 | 36'C,   0 % |  9000 / 12189 MB | user1(3000M) user3(6000M)
[2] GeForce GTX TITAN 2 | 71'C,  ?? % |     0 / 12189 MB | (Not Supported)
"
        );
    }

    #[test]
    fn stale_process_renders_sentinel_username() {
        let mut gpu = record(0);
        gpu.processes = Some(vec![ProcessUsage {
            pid: 99999,
            username: None,
            command: None,
            gpu_memory_usage: Some(9999),
        }]);
        assert!(render_line(&gpu).ends_with("| ??(9999M)"));
    }

    #[test]
    fn empty_process_list_renders_nothing_after_the_bar() {
        let mut gpu = record(0);
        gpu.processes = Some(vec![]);
        assert!(render_line(&gpu).ends_with("MB | "));
    }
}
