//! Overlay Shell Core Library
//!
//! Shared functionality behind the overlay shell binary
//!
//! Architecture:
//! - Process supervisor owns the backend service lifecycle (supervisor, process modules)
//! - Session owns the settings store, the settings cache and the overlay registry
//! - Command dispatcher routes command-channel requests into the session

pub mod cache;
pub mod catalog;
pub mod command;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod logging;
pub mod process;
pub mod registry;
pub mod session;
pub mod store;
pub mod supervisor;

#[cfg(test)]
mod test_support;

pub use crate::cache::SettingsCache;
pub use crate::catalog::{OverlayCatalog, OverlayDefinition};
pub use crate::command::{Command, Response};
pub use crate::registry::{Bounds, OverlayRegistry, OverlaySpec, OverlayWindow, SizeHint, WindowFactory, WindowHandle};
pub use crate::session::Session;
pub use crate::store::{OverlaySettings, OverlaySettingsMap, Position, SettingsStore};
pub use crate::supervisor::{BackendState, ProcessSupervisor};
