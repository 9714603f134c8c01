use sysinfo::{Pid, ProcessRefreshKind, RefreshKind, System};

/// OS-level identity of a process, as far as it could be determined.
#[derive(Clone, Debug)]
pub struct ProcessIdentity {
    pub username: Option<String>,
    pub command: Option<String>,
}

/// Maps a PID reported by the driver to its OS identity. The driver snapshot
/// and the process-table lookup are not atomic, so a PID handed in here may
/// already be gone; that is the caller's accepted race, not an error.
pub trait ProcessResolver {
    /// `None` means the PID no longer exists in the OS process table.
    fn resolve(&mut self, pid: u32) -> Option<ProcessIdentity>;
}

/// Production resolver over the sysinfo process table, snapshotted once at
/// construction. One query pass does not need a fresher view than that.
pub struct SystemResolver {
    system: System,
}

impl SystemResolver {
    pub fn new() -> Self {
        Self {
            system: System::new_with_specifics(
                RefreshKind::new().with_processes(ProcessRefreshKind::everything()),
            ),
        }
    }
}

impl Default for SystemResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessResolver for SystemResolver {
    fn resolve(&mut self, pid: u32) -> Option<ProcessIdentity> {
        let process = self.system.process(Pid::from_u32(pid))?;
        let username = process
            .user_id()
            .and_then(|uid| uzers::get_user_by_uid(**uid))
            .map(|user| user.name().to_string_lossy().into_owned());
        // argv[0] when available, the kernel's short name otherwise
        let command = process
            .cmd()
            .first()
            .cloned()
            .filter(|arg| !arg.is_empty())
            .or_else(|| {
                let name = process.name();
                (!name.is_empty()).then(|| name.to_string())
            });
        Some(ProcessIdentity { username, command })
    }
}
