use std::ffi::OsString;
use std::path::Path;

use sysinfo::{Pid, Process, ProcessRefreshKind, ProcessesToUpdate, System, Users};

use crate::collectors::ProcessSource;
use crate::error::{AgentError, Result};
use crate::metrics::{self, MIB, ProcessRecord};

const UNKNOWN_COMMAND: &str = "?";

/// Process lookups backed by one long-lived `sysinfo::System`, so per-process
/// CPU usage is measured between consecutive refreshes of the same pid.
pub struct SysinfoProcessSource {
    system: System,
    users: Users,
    logical_cores: usize,
}

impl SysinfoProcessSource {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu_usage();
        let logical_cores = system.cpus().len().max(1);

        Self {
            system,
            users: Users::new_with_refreshed_list(),
            logical_cores,
        }
    }

    fn record(&self, pid: Pid, process: &Process) -> ProcessRecord {
        let (command, full_command) = command_fields(process.cmd());
        let username = process
            .user_id()
            .and_then(|uid| self.users.get_user_by_id(uid))
            .map(|user| user.name().to_string());

        ProcessRecord {
            pid: pid.as_u32(),
            command,
            full_command,
            username,
            cpu_percent: normalized_cpu_percent(process.cpu_usage(), self.logical_cores),
            cpu_memory_usage_mib: Some(process.memory() / MIB),
            device_id: None,
            device_memory_used_mib: None,
        }
    }
}

impl Default for SysinfoProcessSource {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessSource for SysinfoProcessSource {
    fn by_pid(&mut self, pid: metrics::Pid) -> Result<ProcessRecord> {
        let sys_pid = Pid::from_u32(pid);
        self.system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[sys_pid]),
            true,
            ProcessRefreshKind::everything(),
        );

        let process = self
            .system
            .process(sys_pid)
            .ok_or(AgentError::ProcessNotFound(pid))?;
        Ok(self.record(sys_pid, process))
    }

    fn by_name(&mut self, matcher: &str) -> Vec<ProcessRecord> {
        self.system.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::everything(),
        );

        let mut records: Vec<ProcessRecord> = self
            .system
            .processes()
            .iter()
            .filter(|(_, process)| {
                let cmd: Vec<String> = process
                    .cmd()
                    .iter()
                    .map(|arg| arg.to_string_lossy().into_owned())
                    .collect();
                let name = process.name().to_string_lossy();
                matches_process_name(&name, &cmd, process.exe(), matcher)
            })
            .map(|(pid, process)| self.record(*pid, process))
            .collect();

        records.sort_by_key(|record| record.pid);
        log::trace!("{} processes matched '{}'", records.len(), matcher);
        records
    }
}

/// True when the short name, the first command-line token or the executable
/// basename equals `matcher`
pub fn matches_process_name(name: &str, cmd: &[String], exe: Option<&Path>, matcher: &str) -> bool {
    if name == matcher {
        return true;
    }
    if cmd.first().is_some_and(|first| first == matcher) {
        return true;
    }
    exe.and_then(Path::file_name)
        .is_some_and(|basename| basename == matcher)
}

/// Short command name and full command line. Both are `"?"` when the command
/// line is unreadable (zombies, kernel threads, other users' processes).
pub fn command_fields(cmd: &[OsString]) -> (String, Vec<String>) {
    if cmd.is_empty() {
        return (UNKNOWN_COMMAND.to_string(), vec![UNKNOWN_COMMAND.to_string()]);
    }

    let full_command: Vec<String> = cmd
        .iter()
        .map(|arg| arg.to_string_lossy().into_owned())
        .collect();
    let command = Path::new(&full_command[0])
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| full_command[0].clone());

    (command, full_command)
}

/// Per-core normalized load; may exceed 100 for multi-threaded processes
pub fn normalized_cpu_percent(raw: f32, logical_cores: usize) -> f32 {
    (raw / logical_cores.max(1) as f32).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_command_line_is_unknown() {
        let (command, full) = command_fields(&[]);
        assert_eq!(command, "?");
        assert_eq!(full, vec!["?".to_string()]);
    }

    #[test]
    fn command_is_basename_of_first_token() {
        let cmd = vec![OsString::from("/usr/bin/python3"), OsString::from("train.py")];
        let (command, full) = command_fields(&cmd);
        assert_eq!(command, "python3");
        assert_eq!(full, vec!["/usr/bin/python3".to_string(), "train.py".to_string()]);
    }

    #[test]
    fn matches_on_short_name() {
        assert!(matches_process_name("python", &[], None, "python"));
    }

    #[test]
    fn matches_on_first_token() {
        let cmd = vec!["python".to_string(), "serve.py".to_string()];
        assert!(matches_process_name("serve", &cmd, None, "python"));
    }

    #[test]
    fn matches_on_executable_basename() {
        let exe = Path::new("/opt/conda/bin/python");
        assert!(matches_process_name("pt_main_thread", &[], Some(exe), "python"));
    }

    #[test]
    fn prefix_alone_does_not_match() {
        let cmd = vec!["/usr/bin/python3".to_string()];
        let exe = Path::new("/usr/bin/python3");
        assert!(!matches_process_name("python3", &cmd, Some(exe), "python"));
    }

    #[test]
    fn cpu_percent_is_normalized_by_core_count() {
        assert_eq!(normalized_cpu_percent(200.0, 4), 50.0);
        assert_eq!(normalized_cpu_percent(900.0, 8), 112.5);
        assert_eq!(normalized_cpu_percent(10.0, 0), 10.0);
        assert_eq!(normalized_cpu_percent(-1.0, 2), 0.0);
    }

    #[test]
    fn lookup_of_missing_pid_is_not_found() {
        let mut source = SysinfoProcessSource::new();
        let err = source.by_pid(u32::MAX - 1).unwrap_err();
        assert!(err.is_process_gone());
    }

    #[test]
    fn own_process_is_found_by_pid() {
        let mut source = SysinfoProcessSource::new();
        let record = source.by_pid(std::process::id()).unwrap();
        assert_eq!(record.pid, std::process::id());
        assert!(record.device_id.is_none());
        assert!(!record.command.is_empty());
    }
}
