//! Overlay Shell - always-on-top overlay panels backed by a local service
//!
//! This process:
//! - Launches the backend service and waits until it accepts connections
//! - Opens overlay windows on request and restores their saved zoom,
//!   position and card opacity
//! - Reads commands as JSON lines from stdin and answers on stdout
//! - Stops the backend on every exit path

mod channel;
mod shutdown;
mod window;

use anyhow::{anyhow, Context, Result};
use channel::{Inbound, ReplyWriter};
use crossbeam_channel::{Receiver, TryRecvError};
use overlay_shell_core::command::{Command, Reply};
use overlay_shell_core::error::SupervisorError;
use overlay_shell_core::{
    config, dispatcher, logging, OverlayWindow, ProcessSupervisor, Session, SettingsStore,
};
use std::collections::HashMap;
use std::io::{self, Stdout};
use std::sync::Arc;
use std::time::{Duration, Instant};
use window::{Painter, WinitFactory};
use winit::event::{Event, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoopBuilder, EventLoopWindowTarget};
use winit::window::WindowId;

/// Fallback wake-up interval of the event loop
const IDLE_POLL: Duration = Duration::from_millis(100);

/// Events injected into the event loop from other threads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellEvent {
    /// New input on the command channel
    Wake,
    /// Ctrl+C or SIGTERM
    Shutdown,
}

/// Event loop state
struct Shell {
    session: Session,
    supervisor: Arc<ProcessSupervisor>,
    /// How long exit waits for the port cleanup
    shutdown_wait: Duration,
    startup: Option<Receiver<Result<(), SupervisorError>>>,
    ready: bool,
    commands: Receiver<Inbound>,
    /// Commands received before the backend was ready
    pending: Vec<Command>,
    painters: HashMap<WindowId, Painter>,
    replies: ReplyWriter<Stdout>,
}

impl Shell {
    /// Returns false when the shell should exit
    fn poll_startup(&mut self) -> bool {
        let Some(startup) = &self.startup else {
            return true;
        };

        let result = match startup.try_recv() {
            Ok(result) => result,
            Err(TryRecvError::Empty) => return true,
            Err(TryRecvError::Disconnected) => Err(SupervisorError::Stopped),
        };
        self.startup = None;

        match result {
            Ok(()) => {
                tracing::info!("Backend ready, accepting overlay commands");
                self.ready = true;
                true
            }
            Err(e) => {
                tracing::error!("Backend failed to start: {}", e);
                show_startup_error(&e);
                false
            }
        }
    }

    /// Returns false when the command channel has closed
    fn poll_commands(&mut self, target: &EventLoopWindowTarget<ShellEvent>) -> bool {
        let mut open = true;
        let mut received = Vec::new();
        loop {
            match self.commands.try_recv() {
                Ok(Inbound::Command(command)) => received.push(command),
                Ok(Inbound::Malformed(reason)) => {
                    tracing::warn!("{}", reason);
                    self.replies.send(&Reply::Error(reason));
                }
                Ok(Inbound::Closed) | Err(TryRecvError::Disconnected) => {
                    open = false;
                    break;
                }
                Err(TryRecvError::Empty) => break,
            }
        }

        if self.ready {
            let queued: Vec<Command> = self.pending.drain(..).chain(received).collect();
            for command in queued {
                self.dispatch(command, target);
            }
        } else {
            self.pending.extend(received);
        }

        open
    }

    fn dispatch(&mut self, command: Command, target: &EventLoopWindowTarget<ShellEvent>) {
        let factory = WinitFactory::new(target);
        let reply = Reply::from(dispatcher::dispatch(&self.session, command, &factory));
        if let Reply::Error(reason) = &reply {
            tracing::warn!("Command failed: {}", reason);
        }
        self.replies.send(&reply);

        for created in factory.into_created() {
            match Painter::new(Arc::clone(&created)) {
                Ok(mut painter) => {
                    painter.paint_or_log();
                    self.painters.insert(created.id(), painter);
                }
                Err(e) => tracing::warn!("No drawing surface for {}: {}", created.overlay_id(), e),
            }
        }
    }

    fn handle_window_event(&mut self, window_id: WindowId, event: WindowEvent) {
        let Some(painter) = self.painters.get_mut(&window_id) else {
            return;
        };

        match event {
            WindowEvent::CloseRequested => {
                let window = Arc::clone(painter.window());
                self.session
                    .overlay_closed(window.overlay_id(), window.bounds());
                window.destroy();
            }
            WindowEvent::Resized(_) => painter.window().request_redraw(),
            WindowEvent::RedrawRequested => painter.paint_or_log(),
            _ => {}
        }
    }

    /// Drop surfaces and windows that were destroyed (closed, reset)
    fn prune_destroyed(&mut self) {
        self.painters
            .retain(|_, painter| !painter.window().is_destroyed());
    }

    fn shutdown(&mut self) {
        self.session.close_all();
        self.painters.clear();
        if self.supervisor.stop().wait(self.shutdown_wait).is_none() {
            tracing::warn!("Port cleanup still running at exit");
        }
    }
}

fn show_startup_error(error: &SupervisorError) {
    rfd::MessageDialog::new()
        .set_level(rfd::MessageLevel::Error)
        .set_title("Overlay Shell")
        .set_description(format!(
            "The backend service could not be started.\n\n{}",
            error
        ))
        .set_buttons(rfd::MessageButtons::Ok)
        .show();
}

fn main() -> Result<()> {
    let app_config = config::load_config();
    logging::init(app_config.debug_logging);

    tracing::info!("Overlay Shell starting...");

    let store = SettingsStore::open_default().context("Failed to locate settings file")?;
    tracing::info!("Overlay settings: {}", store.path().display());
    let session = Session::from_config(&app_config, store);

    let event_loop = EventLoopBuilder::<ShellEvent>::with_user_event()
        .build()
        .map_err(|e| anyhow!("Failed to create event loop: {}", e))?;

    let supervisor = Arc::new(ProcessSupervisor::system(app_config.backend.clone()));
    shutdown::install(&supervisor, event_loop.create_proxy());

    let (command_tx, command_rx) = crossbeam_channel::unbounded();
    channel::spawn_stdin_reader(command_tx, event_loop.create_proxy())
        .context("Failed to start command reader")?;

    let mut shell = Shell {
        session,
        supervisor: Arc::clone(&supervisor),
        shutdown_wait: app_config.backend.shutdown_grace() + Duration::from_secs(1),
        startup: Some(supervisor.start_in_background()),
        ready: false,
        commands: command_rx,
        pending: Vec::new(),
        painters: HashMap::new(),
        replies: ReplyWriter::new(io::stdout()),
    };

    tracing::info!("Entering event loop");

    let run = event_loop.run(move |event, elwt| {
        elwt.set_control_flow(ControlFlow::WaitUntil(Instant::now() + IDLE_POLL));

        match event {
            Event::WindowEvent { event, window_id } => {
                shell.handle_window_event(window_id, event);
            }

            Event::UserEvent(ShellEvent::Shutdown) => {
                tracing::info!("Shutdown requested");
                elwt.exit();
            }

            Event::UserEvent(ShellEvent::Wake) => {}

            Event::AboutToWait => {
                if !shell.poll_startup() {
                    elwt.exit();
                    return;
                }
                if !shell.poll_commands(elwt) {
                    tracing::info!("Command channel closed, exiting");
                    elwt.exit();
                }
                shell.prune_destroyed();
            }

            Event::LoopExiting => {
                shell.shutdown();
            }

            _ => {}
        }
    });

    if let Err(e) = run {
        tracing::error!("Event loop error: {}", e);
    }

    // Covers exits that skipped LoopExiting
    shutdown::stop_backend();
    tracing::info!("Overlay Shell stopped");

    Ok(())
}
