//! Error types for the overlay shell core
//!
//! Storage and process errors are recovered at the component boundary and
//! logged. Only `SupervisorError::BackendStartupTimeout` is expected to reach
//! the application entry point.

use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Failures of the durable settings store
#[derive(Debug, Error)]
pub enum StoreError {
    /// The settings document exists but is not valid JSON for our layout
    #[error("settings file {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    /// The settings document could not be read from disk
    #[error("failed to read settings file {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// Serializing or writing the settings document failed
    #[error("failed to write settings file {path}: {reason}")]
    WriteFailed { path: PathBuf, reason: String },
    /// Deleting the settings document failed for a reason other than absence
    #[error("failed to remove settings file {path}: {source}")]
    RemoveFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Failures of the backend process supervisor
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SupervisorError {
    /// The backend never accepted a connection before the deadline
    #[error("backend did not become reachable on port {port} within {timeout:?}")]
    BackendStartupTimeout { port: u16, timeout: Duration },
    /// The backend executable could not be spawned
    #[error("failed to launch backend {executable}: {reason}")]
    LaunchFailed { executable: PathBuf, reason: String },
    /// The supervisor was stopped before or while starting
    #[error("backend supervisor has been stopped")]
    Stopped,
    /// A process could not be confirmed as killed
    #[error("failed to terminate process {pid}: {reason}")]
    ProcessTerminationFailed { pid: u32, reason: String },
}

/// Failures of the overlay registry
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RegistryError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// The window layer refused to create a window
    #[error("failed to create overlay window for {overlay_id}: {reason}")]
    WindowCreation { overlay_id: String, reason: String },
}

/// Failures of the settings cache
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CacheError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

/// Failures surfaced to command-channel callers
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DispatchError {
    /// The command names an overlay that has no catalog entry
    #[error("unknown overlay {0:?}")]
    InvalidOverlayState(String),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Cache(#[from] CacheError),
}
