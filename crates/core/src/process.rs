//! Process termination helpers for the backend supervisor.
//!
//! The tracked child handle can go stale (the backend may hand its listening
//! socket to a detached grandchild), so shutdown also looks up whoever owns
//! the backend port and kills that process too. Everything here is best
//! effort and reports what happened instead of failing.

use crate::error::SupervisorError;
use std::io;
use std::process::{Command, Output, Stdio};
use sysinfo::{Pid, Signal, System};
use tracing::{debug, warn};

/// Outcome of a kill request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KillReport {
    /// Processes that accepted the kill signal
    pub killed: Vec<u32>,
    /// Processes that could not be killed
    pub failed: Vec<SupervisorError>,
    /// Requested pids that no longer exist
    pub not_found: Vec<u32>,
    /// Pids skipped because they belong to this process
    pub skipped_self: Vec<u32>,
}

impl KillReport {
    pub fn is_empty(&self) -> bool {
        self.killed.is_empty()
            && self.failed.is_empty()
            && self.not_found.is_empty()
            && self.skipped_self.is_empty()
    }

    /// Log the report the way shutdown diagnostics expect
    pub fn log(&self, port: u16) {
        if self.is_empty() {
            debug!("No process found listening on port {}", port);
            return;
        }
        if !self.killed.is_empty() {
            debug!("Killed processes on port {}: {:?}", port, self.killed);
        }
        for failure in &self.failed {
            warn!("{}", failure);
        }
        if !self.not_found.is_empty() {
            debug!("Processes already gone: {:?}", self.not_found);
        }
        if !self.skipped_self.is_empty() {
            debug!("Port {} is owned by this process, not killing it", port);
        }
    }
}

/// Finds and kills whatever process listens on a TCP port
pub trait PortReaper: Send + Sync {
    fn reap(&self, port: u16) -> KillReport;
}

/// Port reaper backed by `netstat` (Windows) or `lsof` (elsewhere) and sysinfo
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemPortReaper;

impl PortReaper for SystemPortReaper {
    fn reap(&self, port: u16) -> KillReport {
        match listening_pids(port) {
            Ok(pids) => kill_pids(&pids),
            Err(e) => {
                debug!("Could not list listeners on port {}: {}", port, e);
                KillReport::default()
            }
        }
    }
}

/// Pids of processes listening on `port`
pub fn listening_pids(port: u16) -> io::Result<Vec<u32>> {
    #[cfg(windows)]
    {
        let output = quiet_command("netstat").args(["-ano", "-p", "TCP"]).output()?;
        Ok(parse_netstat_listeners(&stdout_of(&output), port))
    }

    #[cfg(not(windows))]
    {
        let output = quiet_command("lsof")
            .args(["-nP", &format!("-iTCP:{}", port), "-sTCP:LISTEN", "-t"])
            .output()?;
        // lsof exits with 1 when nothing matches
        Ok(parse_lsof_pids(&stdout_of(&output)))
    }
}

fn quiet_command(program: &str) -> Command {
    let mut command = Command::new(program);
    command.stdin(Stdio::null()).stderr(Stdio::null());

    #[cfg(windows)]
    {
        use std::os::windows::process::CommandExt;
        const CREATE_NO_WINDOW: u32 = 0x08000000;
        command.creation_flags(CREATE_NO_WINDOW);
    }

    command
}

fn stdout_of(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

/// Parse `netstat -ano` output into the pids listening on `port`.
/// Localized state names are tolerated by treating a `:0` foreign address as
/// a listener.
pub fn parse_netstat_listeners(output: &str, port: u16) -> Vec<u32> {
    let mut pids: Vec<u32> = output
        .lines()
        .filter_map(|line| {
            let columns: Vec<&str> = line.split_whitespace().collect();
            let [proto, local, foreign, state, pid] = columns.as_slice() else {
                return None;
            };
            if !proto.eq_ignore_ascii_case("TCP") {
                return None;
            }
            let (_, local_port) = local.rsplit_once(':')?;
            if local_port.parse::<u16>().ok()? != port {
                return None;
            }
            let listening = state.eq_ignore_ascii_case("LISTENING") || foreign.ends_with(":0");
            if !listening {
                return None;
            }
            pid.parse::<u32>().ok().filter(|pid| *pid != 0)
        })
        .collect();
    pids.sort_unstable();
    pids.dedup();
    pids
}

/// Parse `lsof -t` output (one pid per line)
pub fn parse_lsof_pids(output: &str) -> Vec<u32> {
    let mut pids: Vec<u32> = output
        .lines()
        .filter_map(|line| line.trim().parse::<u32>().ok())
        .collect();
    pids.sort_unstable();
    pids.dedup();
    pids
}

/// Kill processes by pid, never the current process
pub fn kill_pids(pids: &[u32]) -> KillReport {
    let mut report = KillReport::default();
    if pids.is_empty() {
        return report;
    }

    let own_pid = std::process::id();
    let mut system = System::new();
    system.refresh_processes();

    for &pid in pids {
        if pid == own_pid {
            report.skipped_self.push(pid);
            continue;
        }
        match system.process(Pid::from_u32(pid)) {
            Some(process) => {
                if process.kill() {
                    report.killed.push(pid);
                } else {
                    report.failed.push(SupervisorError::ProcessTerminationFailed {
                        pid,
                        reason: "kill signal was not delivered".to_string(),
                    });
                }
            }
            None => report.not_found.push(pid),
        }
    }

    report
}

/// Ask a process to exit gracefully (SIGTERM where supported).
/// Returns false when the signal could not be sent.
pub fn request_termination(pid: u32) -> bool {
    let mut system = System::new();
    system.refresh_processes();

    match system.process(Pid::from_u32(pid)) {
        Some(process) => process.kill_with(Signal::Term).unwrap_or(false),
        None => false,
    }
}

/// Kill a process together with its children (Windows only; elsewhere a no-op)
pub fn kill_process_tree(pid: u32) {
    #[cfg(windows)]
    {
        let _ = quiet_command("taskkill")
            .args(["/PID", &pid.to_string(), "/T", "/F"])
            .stdout(Stdio::null())
            .status();
    }

    #[cfg(not(windows))]
    {
        let _ = pid;
    }
}
