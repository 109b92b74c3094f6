//! Supervisor lifecycle against real child processes and sockets

use overlay_shell_core::config::BackendConfig;
use overlay_shell_core::error::SupervisorError;
use overlay_shell_core::process::{KillReport, PortReaper};
use overlay_shell_core::supervisor::{BackendChild, BackendLauncher};
use overlay_shell_core::{BackendState, ProcessSupervisor};
use std::io;
use std::net::TcpListener;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

fn config(port: u16, executable: Option<PathBuf>, timeout_ms: u64) -> BackendConfig {
    BackendConfig {
        executable,
        port,
        poll_interval_ms: 25,
        startup_timeout_ms: timeout_ms,
        shutdown_grace_ms: 200,
    }
}

struct NoopReaper;

impl PortReaper for NoopReaper {
    fn reap(&self, _port: u16) -> KillReport {
        KillReport::default()
    }
}

/// A child that never listens anywhere
struct SilentChild;

impl BackendChild for SilentChild {
    fn pid(&self) -> u32 {
        1
    }

    fn is_running(&mut self) -> bool {
        false
    }

    fn terminate(&mut self) -> bool {
        true
    }

    fn kill(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[derive(Clone, Default)]
struct CountingLauncher {
    launches: Arc<AtomicUsize>,
}

impl BackendLauncher for CountingLauncher {
    fn launch(&self) -> Result<Box<dyn BackendChild>, SupervisorError> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(SilentChild))
    }
}

#[test]
fn test_unreachable_backend_times_out() {
    let port = free_port();
    let launcher = CountingLauncher::default();
    let supervisor = ProcessSupervisor::new(config(port, None, 400), launcher.clone(), NoopReaper);

    let started = Instant::now();
    let result = supervisor.start();

    assert!(matches!(
        result,
        Err(SupervisorError::BackendStartupTimeout { port: p, .. }) if p == port
    ));
    assert!(started.elapsed() >= Duration::from_millis(400));
    assert_eq!(supervisor.state(), BackendState::Starting);

    assert!(supervisor.stop().wait(Duration::from_secs(5)).is_some());
    assert_eq!(supervisor.state(), BackendState::Stopped);
    assert_eq!(launcher.launches.load(Ordering::SeqCst), 1);
}

#[test]
fn test_concurrent_callers_share_one_launch() {
    let port = free_port();
    let listener = TcpListener::bind(("127.0.0.1", port)).unwrap();
    let launcher = CountingLauncher::default();
    let supervisor = Arc::new(ProcessSupervisor::new(
        config(port, None, 5_000),
        launcher.clone(),
        NoopReaper,
    ));

    let pending: Vec<_> = (0..4).map(|_| supervisor.start_in_background()).collect();
    for result in pending {
        assert_eq!(result.recv_timeout(Duration::from_secs(10)).unwrap(), Ok(()));
    }

    assert_eq!(supervisor.state(), BackendState::Ready);
    assert_eq!(launcher.launches.load(Ordering::SeqCst), 1);
    drop(listener);
}

#[test]
fn test_missing_executable_fails_launch() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("backend_run").join("main");
    let supervisor = ProcessSupervisor::system(config(free_port(), Some(missing), 500));

    assert!(matches!(
        supervisor.start(),
        Err(SupervisorError::LaunchFailed { .. })
    ));
    let _ = supervisor.stop();
}

#[cfg(unix)]
mod unix {
    use super::*;
    use overlay_shell_core::process::SystemPortReaper;
    use overlay_shell_core::supervisor::{is_reachable, CommandLauncher};
    use std::net::{Ipv4Addr, SocketAddr};
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;
    use std::process::{Command, Stdio};
    use std::thread;
    use sysinfo::{Pid, System};

    fn have(tool: &str) -> bool {
        Command::new("sh")
            .args(["-c", &format!("command -v {}", tool)])
            .stdout(Stdio::null())
            .status()
            .map_or(false, |status| status.success())
    }

    fn write_script(dir: &Path, body: &str) -> PathBuf {
        let script = dir.join("backend.sh");
        std::fs::write(&script, format!("#!/bin/sh\n{}", body)).unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        script
    }

    /// Pid the backend script wrote about itself
    fn read_pid(path: &Path) -> u32 {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            if let Some(pid) = std::fs::read_to_string(path)
                .ok()
                .and_then(|contents| contents.trim().parse().ok())
            {
                return pid;
            }
            assert!(Instant::now() < deadline, "backend never wrote its pid");
            thread::sleep(Duration::from_millis(20));
        }
    }

    fn is_alive(pid: u32) -> bool {
        let mut system = System::new();
        system.refresh_processes();
        system.process(Pid::from_u32(pid)).is_some()
    }

    fn eventually(condition: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(3);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(25));
        }
        condition()
    }

    fn system_supervisor(config: BackendConfig) -> ProcessSupervisor {
        ProcessSupervisor::new(config.clone(), CommandLauncher::new(config), SystemPortReaper)
    }

    #[test]
    fn test_stop_terminates_spawned_process() {
        // A backend that never listens; stop must still bring it down
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("backend.pid");
        let script = write_script(
            dir.path(),
            &format!("echo $$ > '{}'\nexec sleep 30\n", pid_file.display()),
        );

        let supervisor = system_supervisor(config(free_port(), Some(script), 300));

        assert!(supervisor.start().is_err());
        let pid = read_pid(&pid_file);
        assert!(is_alive(pid));

        let started = Instant::now();
        let _ = supervisor.stop();

        // Graceful request plus bounded fallback
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(supervisor.state(), BackendState::Stopped);
        assert!(eventually(|| !is_alive(pid)));
    }

    #[test]
    fn test_stop_kills_backend_ignoring_sigterm() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("backend.pid");
        let script = write_script(
            dir.path(),
            &format!(
                "trap '' TERM\necho $$ > '{}'\nwhile true; do sleep 1; done\n",
                pid_file.display()
            ),
        );

        let supervisor = system_supervisor(config(free_port(), Some(script), 300));

        assert!(supervisor.start().is_err());
        let pid = read_pid(&pid_file);
        assert!(is_alive(pid));

        let _ = supervisor.stop();
        assert!(eventually(|| !is_alive(pid)), "pid {} survived stop", pid);
    }

    #[test]
    fn test_stop_reaps_detached_port_owner() {
        if !(have("setsid") && have("python3") && have("lsof")) {
            eprintln!("setsid, python3 or lsof missing; skipping");
            return;
        }

        // The launched script hands the port to a process in its own session
        // and exits, so only the port lookup can find the listener
        let port = free_port();
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(
            dir.path(),
            &format!(
                "setsid python3 -c 'import socket, time\n\
                 s = socket.socket()\n\
                 s.bind((\"127.0.0.1\", {}))\n\
                 s.listen()\n\
                 time.sleep(60)' </dev/null >/dev/null 2>&1 &\n\
                 exit 0\n",
                port
            ),
        );

        let supervisor = system_supervisor(config(port, Some(script), 10_000));
        supervisor.start().unwrap();

        let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
        assert!(is_reachable(&addr, Duration::from_millis(200)));

        let report = supervisor
            .stop()
            .wait(Duration::from_secs(5))
            .expect("port cleanup finished");
        assert!(!report.killed.is_empty(), "{:?}", report);
        assert!(eventually(|| !is_reachable(&addr, Duration::from_millis(100))));
    }
}
