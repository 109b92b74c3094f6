//! Shutdown hooks. Whatever ends the process (Ctrl+C, SIGTERM, a panic) the
//! backend is stopped first.

use crate::ShellEvent;
use once_cell::sync::OnceCell;
use overlay_shell_core::ProcessSupervisor;
use std::panic;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use winit::event_loop::EventLoopProxy;

/// How long a hook waits for the port cleanup before letting the process go
const REAP_WAIT: Duration = Duration::from_secs(2);
/// How long a hook waits for the supervisor's state lock
const LOCK_WAIT: Duration = Duration::from_millis(500);

static SUPERVISOR: OnceCell<Arc<ProcessSupervisor>> = OnceCell::new();
static PANIC_HOOK_INSTALLED: OnceCell<()> = OnceCell::new();

/// Register the supervisor with the panic hook and the Ctrl+C handler.
/// The handler asks the event loop to exit; if the loop is already gone the
/// process exits directly.
pub fn install(supervisor: &Arc<ProcessSupervisor>, proxy: EventLoopProxy<ShellEvent>) {
    let _ = SUPERVISOR.set(Arc::clone(supervisor));
    install_panic_hook();

    if let Err(e) = ctrlc::set_handler(move || {
        info!("Received Ctrl+C; stopping backend");
        stop_backend();
        if proxy.send_event(ShellEvent::Shutdown).is_err() {
            std::process::exit(130);
        }
    }) {
        warn!("Failed to install Ctrl+C handler: {}", e);
    }
}

fn install_panic_hook() {
    PANIC_HOOK_INSTALLED.get_or_init(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |panic_info| {
            stop_backend();
            previous(panic_info);
        }));
    });
}

/// Stop the registered supervisor, waiting briefly for port cleanup.
/// Never blocks indefinitely: a panic may fire while the supervisor's lock
/// is held on the panicking thread.
pub fn stop_backend() {
    let Some(supervisor) = SUPERVISOR.get() else {
        return;
    };
    match supervisor.try_stop(LOCK_WAIT) {
        Some(ticket) => {
            let _ = ticket.wait(REAP_WAIT);
        }
        None => warn!("Supervisor lock busy; backend not stopped"),
    }
}
