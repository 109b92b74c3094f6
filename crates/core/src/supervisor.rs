//! Backend process supervisor
//!
//! Launches the backend service exactly once per application run, blocks
//! `start()` callers until the service accepts TCP connections on its
//! loopback port, and makes sure it is gone after `stop()`.
//!
//! State machine: NotStarted -> Starting -> Ready, and {NotStarted, Starting,
//! Ready} -> Stopped exactly once. A startup timeout leaves the state at
//! Starting; a later `start()` polls again without relaunching.

use crate::config::BackendConfig;
use crate::error::SupervisorError;
use crate::process::{self, KillReport, PortReaper, SystemPortReaper};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::io;
use std::net::{Ipv4Addr, SocketAddr, TcpStream};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Lifecycle of the supervised backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendState {
    NotStarted,
    Starting,
    Ready,
    Stopped,
}

/// A launched backend process
pub trait BackendChild: Send {
    fn pid(&self) -> u32;
    fn is_running(&mut self) -> bool;
    /// Ask the process to exit. Returns false if no request could be sent.
    fn terminate(&mut self) -> bool;
    /// Force the process down and reap it
    fn kill(&mut self) -> io::Result<()>;
}

/// Spawns the backend process
pub trait BackendLauncher: Send + Sync {
    fn launch(&self) -> Result<Box<dyn BackendChild>, SupervisorError>;
}

/// Launches the configured backend executable with no arguments
pub struct CommandLauncher {
    config: BackendConfig,
}

impl CommandLauncher {
    pub fn new(config: BackendConfig) -> Self {
        CommandLauncher { config }
    }
}

impl BackendLauncher for CommandLauncher {
    fn launch(&self) -> Result<Box<dyn BackendChild>, SupervisorError> {
        let launch_failed = |executable: PathBuf, reason: String| SupervisorError::LaunchFailed {
            executable,
            reason,
        };

        let executable = self.config.resolve_executable().map_err(|e| {
            launch_failed(self.config.executable.clone().unwrap_or_default(), e.to_string())
        })?;

        info!("Starting backend: {}", executable.display());

        let mut command = Command::new(&executable);
        command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        if let Some(dir) = executable.parent() {
            command.current_dir(dir);
        }

        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            const CREATE_NO_WINDOW: u32 = 0x08000000;
            command.creation_flags(CREATE_NO_WINDOW);
        }

        let child = command
            .spawn()
            .map_err(|e| launch_failed(executable.clone(), e.to_string()))?;

        Ok(Box::new(SpawnedChild(child)))
    }
}

struct SpawnedChild(Child);

impl BackendChild for SpawnedChild {
    fn pid(&self) -> u32 {
        self.0.id()
    }

    fn is_running(&mut self) -> bool {
        matches!(self.0.try_wait(), Ok(None))
    }

    fn terminate(&mut self) -> bool {
        process::request_termination(self.0.id())
    }

    fn kill(&mut self) -> io::Result<()> {
        process::kill_process_tree(self.0.id());
        match self.0.kill() {
            Ok(()) => {}
            // Already exited
            Err(e) if e.kind() == io::ErrorKind::InvalidInput => {}
            Err(e) => return Err(e),
        }
        self.0.wait().map(|_| ())
    }
}

/// Handle on the asynchronous port cleanup started by `stop()`.
/// Dropping it never blocks.
pub struct ShutdownTicket {
    done: Option<Receiver<KillReport>>,
}

impl ShutdownTicket {
    fn finished() -> Self {
        ShutdownTicket { done: None }
    }

    /// Wait up to `timeout` for the port cleanup to finish
    pub fn wait(self, timeout: Duration) -> Option<KillReport> {
        let Some(done) = self.done else {
            return Some(KillReport::default());
        };
        match done.recv_timeout(timeout) {
            Ok(report) => Some(report),
            Err(RecvTimeoutError::Timeout) => {
                debug!("Port cleanup still running after {:?}", timeout);
                None
            }
            Err(RecvTimeoutError::Disconnected) => None,
        }
    }
}

struct SupervisorInner {
    state: BackendState,
    child: Option<Box<dyn BackendChild>>,
    /// A caller is currently polling for readiness
    probing: bool,
    outcome: Option<Result<(), SupervisorError>>,
    launch_error: Option<SupervisorError>,
    launches: usize,
}

/// Supervises the single backend service instance
pub struct ProcessSupervisor {
    config: BackendConfig,
    launcher: Box<dyn BackendLauncher>,
    reaper: Arc<dyn PortReaper>,
    inner: Mutex<SupervisorInner>,
    changed: Condvar,
}

impl ProcessSupervisor {
    pub fn new(
        config: BackendConfig,
        launcher: impl BackendLauncher + 'static,
        reaper: impl PortReaper + 'static,
    ) -> Self {
        ProcessSupervisor {
            config,
            launcher: Box::new(launcher),
            reaper: Arc::new(reaper),
            inner: Mutex::new(SupervisorInner {
                state: BackendState::NotStarted,
                child: None,
                probing: false,
                outcome: None,
                launch_error: None,
                launches: 0,
            }),
            changed: Condvar::new(),
        }
    }

    /// Supervisor that spawns the configured executable and reaps its port
    /// with the platform tools
    pub fn system(config: BackendConfig) -> Self {
        let launcher = CommandLauncher::new(config.clone());
        Self::new(config, launcher, SystemPortReaper)
    }

    pub fn state(&self) -> BackendState {
        self.inner.lock().state
    }

    pub fn port(&self) -> u16 {
        self.config.port
    }

    /// How many times the backend has been launched (0 or 1)
    pub fn launch_count(&self) -> usize {
        self.inner.lock().launches
    }

    /// Launch the backend if needed and block until it is reachable.
    /// Concurrent callers share one launch and one outcome.
    pub fn start(&self) -> Result<(), SupervisorError> {
        let mut inner = self.inner.lock();

        match inner.state {
            BackendState::Ready => return Ok(()),
            BackendState::Stopped => return Err(SupervisorError::Stopped),
            BackendState::NotStarted => {
                inner.state = BackendState::Starting;
                inner.launches += 1;
                inner.probing = true;

                // Spawned unlocked: stop() and the shutdown hooks never wait
                // on a slow launch
                let launched = MutexGuard::unlocked(&mut inner, || self.launcher.launch());
                match launched {
                    Ok(mut child) if inner.state == BackendState::Stopped => {
                        inner.probing = false;
                        self.changed.notify_all();
                        drop(inner);
                        warn!("Backend (pid {}) launched after stop", child.pid());
                        self.terminate_child(child.as_mut());
                        return Err(SupervisorError::Stopped);
                    }
                    Ok(child) => {
                        info!("Backend launched (pid {})", child.pid());
                        inner.child = Some(child);
                    }
                    Err(e) => {
                        error!("{}", e);
                        inner.probing = false;
                        inner.launch_error = Some(e.clone());
                        inner.outcome = Some(Err(e.clone()));
                        self.changed.notify_all();
                        return Err(e);
                    }
                }
            }
            BackendState::Starting => {
                if let Some(e) = &inner.launch_error {
                    return Err(e.clone());
                }
                if inner.probing {
                    debug!("Backend start already in progress, waiting");
                    self.changed.wait_while(&mut inner, |i| i.probing);
                    return match inner.state {
                        BackendState::Ready => Ok(()),
                        BackendState::Stopped => Err(SupervisorError::Stopped),
                        _ => inner
                            .outcome
                            .clone()
                            .unwrap_or_else(|| Err(self.timeout_error())),
                    };
                }
                debug!("Retrying backend readiness check");
            }
        }

        inner.probing = true;
        drop(inner);

        let polled = self.wait_until_reachable();

        let mut inner = self.inner.lock();
        inner.probing = false;
        let result = match (polled, inner.state) {
            (_, BackendState::Stopped) => Err(SupervisorError::Stopped),
            (Ok(()), _) => {
                inner.state = BackendState::Ready;
                info!("Backend ready on port {}", self.config.port);
                Ok(())
            }
            (Err(e), _) => {
                error!("{}", e);
                Err(e)
            }
        };
        inner.outcome = Some(result.clone());
        self.changed.notify_all();
        result
    }

    /// Run `start()` on a worker thread; the result arrives on the channel
    pub fn start_in_background(self: &Arc<Self>) -> Receiver<Result<(), SupervisorError>> {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let supervisor = Arc::clone(self);

        let spawned = thread::Builder::new()
            .name("backend-start".to_string())
            .spawn(move || {
                let _ = tx.send(supervisor.start());
            });
        if let Err(e) = spawned {
            error!("Failed to spawn backend start thread: {}", e);
        }

        rx
    }

    /// Stop the backend. Safe to call any number of times from any shutdown
    /// path. The tracked child is terminated synchronously; the port owner
    /// is reaped on a detached thread.
    pub fn stop(&self) -> ShutdownTicket {
        let inner = self.inner.lock();
        self.stop_locked(inner)
    }

    /// `stop()` for panic and signal hooks: gives up and returns None when
    /// the state lock is not free within `timeout`, e.g. because the thread
    /// that panicked is holding it.
    pub fn try_stop(&self, timeout: Duration) -> Option<ShutdownTicket> {
        let inner = self.inner.try_lock_for(timeout)?;
        Some(self.stop_locked(inner))
    }

    fn stop_locked(&self, mut inner: MutexGuard<'_, SupervisorInner>) -> ShutdownTicket {
        if inner.state == BackendState::Stopped {
            return ShutdownTicket::finished();
        }
        let previous = inner.state;
        inner.state = BackendState::Stopped;
        self.changed.notify_all();
        let child = inner.child.take();
        drop(inner);

        info!("Stopping backend...");

        if let Some(mut child) = child {
            self.terminate_child(child.as_mut());
        }

        if previous == BackendState::NotStarted {
            return ShutdownTicket::finished();
        }

        let (done_tx, done_rx) = crossbeam_channel::bounded(1);
        let reaper = Arc::clone(&self.reaper);
        let port = self.config.port;

        let spawned = thread::Builder::new()
            .name("port-reaper".to_string())
            .spawn(move || {
                let report = reaper.reap(port);
                report.log(port);
                let _ = done_tx.send(report);
            });
        if let Err(e) = spawned {
            warn!("Failed to spawn port cleanup thread: {}", e);
            return ShutdownTicket::finished();
        }

        ShutdownTicket {
            done: Some(done_rx),
        }
    }

    fn terminate_child(&self, child: &mut dyn BackendChild) {
        let pid = child.pid();
        if !child.is_running() {
            debug!("Backend (pid {}) already exited", pid);
            return;
        }

        if child.terminate() {
            let deadline = Instant::now() + self.config.shutdown_grace();
            while Instant::now() < deadline {
                if !child.is_running() {
                    info!("Backend (pid {}) exited", pid);
                    return;
                }
                thread::sleep(EXIT_POLL_INTERVAL);
            }
            debug!("Backend (pid {}) ignored termination request", pid);
        }

        match child.kill() {
            Ok(()) => info!("Backend (pid {}) killed", pid),
            Err(e) => warn!(
                "{}",
                SupervisorError::ProcessTerminationFailed {
                    pid,
                    reason: e.to_string(),
                }
            ),
        }
    }

    fn wait_until_reachable(&self) -> Result<(), SupervisorError> {
        let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, self.config.port));
        let timeout = self.config.startup_timeout();
        let interval = self.config.poll_interval();
        let started = Instant::now();
        let mut attempts = 0u32;

        loop {
            if self.state() == BackendState::Stopped {
                return Err(SupervisorError::Stopped);
            }

            attempts += 1;
            if is_reachable(&addr, interval) {
                debug!("Backend reachable after {} attempts", attempts);
                return Ok(());
            }

            let elapsed = started.elapsed();
            if elapsed >= timeout {
                return Err(self.timeout_error());
            }
            thread::sleep(interval.min(timeout - elapsed));
        }
    }

    fn timeout_error(&self) -> SupervisorError {
        SupervisorError::BackendStartupTimeout {
            port: self.config.port,
            timeout: self.config.startup_timeout(),
        }
    }
}

impl Drop for ProcessSupervisor {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

/// Plain TCP reachability check
pub fn is_reachable(addr: &SocketAddr, timeout: Duration) -> bool {
    TcpStream::connect_timeout(addr, timeout.max(Duration::from_millis(1))).is_ok()
}
