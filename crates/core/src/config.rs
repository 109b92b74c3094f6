/// Configuration module for the overlay shell.
///
/// This module provides functionality for managing application configuration,
/// including:
/// - Locating the backend service executable and its loopback port
/// - Startup polling and shutdown timing for the process supervisor
/// - The overlay catalog (known overlays and their default sizes)
/// - Determining the appropriate data directory for the application
///
/// The configuration is loaded from a `config.json` file located in the
/// platform-specific application data directory (%APPDATA%/OverlayShell/ on
/// Windows). The per-overlay settings document lives next to it.
///
/// # Example
///
/// ```no_run
/// use overlay_shell_core::config::{load_config, save_config};
///
/// // Load existing config or get defaults
/// let mut config = load_config();
///
/// // Modify config
/// config.backend.port = 8080;
///
/// // Save changes
/// save_config(&config).expect("Failed to save config");
/// ```
use crate::catalog::OverlayDefinition;
use anyhow::{anyhow, Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILE_NAME: &str = "config.json";
pub const SETTINGS_FILE_NAME: &str = "overlays_settings.json";

#[cfg(windows)]
const BACKEND_EXE_NAME: &str = "main.exe";
#[cfg(not(windows))]
const BACKEND_EXE_NAME: &str = "main";
const BACKEND_DIR_NAME: &str = "backend_run";

/// Application configuration
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct ShellConfig {
    /// Backend service launch and health-check settings
    pub backend: BackendConfig,
    /// Enables debug-level logging (and `RUST_LOG` overrides)
    pub debug_logging: bool,
    /// Overlays the shell knows how to open
    pub overlays: Vec<OverlayDefinition>,
}

impl Default for ShellConfig {
    fn default() -> Self {
        ShellConfig {
            backend: BackendConfig::default(),
            debug_logging: false,
            overlays: OverlayDefinition::defaults(),
        }
    }
}

/// Backend service settings used by the process supervisor
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct BackendConfig {
    /// Explicit executable path (None = look for backend_run/main next to the app)
    pub executable: Option<PathBuf>,
    /// Fixed loopback port the service listens on
    pub port: u16,
    /// Delay between reachability probes
    pub poll_interval_ms: u64,
    /// Deadline for the service to become reachable
    pub startup_timeout_ms: u64,
    /// How long a terminated child gets to exit before it is force-killed
    pub shutdown_grace_ms: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        BackendConfig {
            executable: None,
            port: 8000,
            poll_interval_ms: 200,
            startup_timeout_ms: 15_000,
            shutdown_grace_ms: 1_500,
        }
    }
}

impl BackendConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn startup_timeout(&self) -> Duration {
        Duration::from_millis(self.startup_timeout_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    /// Base URL overlay windows load their content from
    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    /// Find the backend executable.
    /// An explicit path wins; otherwise search next to the running executable,
    /// then the current directory.
    pub fn resolve_executable(&self) -> Result<PathBuf> {
        if let Some(path) = &self.executable {
            if path.exists() {
                return Ok(path.clone());
            }
            return Err(anyhow!("Backend executable not found: {}", path.display()));
        }

        let mut candidates = Vec::new();
        if let Ok(exe_path) = std::env::current_exe() {
            let exe_dir = exe_path.parent().unwrap_or(Path::new("."));
            candidates.push(exe_dir.join(BACKEND_DIR_NAME).join(BACKEND_EXE_NAME));
            // One level up: target/<profile>/ during development
            if let Some(parent) = exe_dir.parent() {
                candidates.push(parent.join(BACKEND_DIR_NAME).join(BACKEND_EXE_NAME));
            }
        }
        if let Ok(current_dir) = std::env::current_dir() {
            candidates.push(current_dir.join(BACKEND_DIR_NAME).join(BACKEND_EXE_NAME));
        }

        candidates
            .into_iter()
            .find(|candidate| candidate.exists())
            .ok_or_else(|| {
                anyhow!(
                    "{}/{} not found. Make sure it's next to the overlay shell executable.",
                    BACKEND_DIR_NAME,
                    BACKEND_EXE_NAME
                )
            })
    }
}

/// Get the application's data directory
/// Returns %APPDATA%/OverlayShell/ on Windows
/// Creates directory if it doesn't exist
pub fn get_data_directory() -> Result<PathBuf> {
    let project_dirs = ProjectDirs::from("", "", "OverlayShell")
        .ok_or_else(|| anyhow!("Failed to determine user data directory"))?;

    let data_dir = project_dirs.data_dir();

    fs::create_dir_all(data_dir)
        .map_err(|e| anyhow!("Failed to create data directory: {}", e))?;

    Ok(data_dir.to_path_buf())
}

/// Path of the per-overlay settings document
pub fn settings_path() -> Result<PathBuf> {
    Ok(get_data_directory()?.join(SETTINGS_FILE_NAME))
}

/// Load application configuration from config.json
/// Returns default config if file doesn't exist or on error
pub fn load_config() -> ShellConfig {
    let Ok(data_dir) = get_data_directory() else {
        return ShellConfig::default();
    };

    load_config_from(&data_dir.join(CONFIG_FILE_NAME))
}

/// Load configuration from an explicit path, falling back to defaults
pub fn load_config_from(config_path: &Path) -> ShellConfig {
    if !config_path.exists() {
        return ShellConfig::default();
    }

    let Ok(contents) = fs::read_to_string(config_path) else {
        return ShellConfig::default();
    };

    match serde_json::from_str(&contents) {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!("Ignoring invalid {}: {}", config_path.display(), e);
            ShellConfig::default()
        }
    }
}

/// Save application configuration to config.json
pub fn save_config(config: &ShellConfig) -> Result<()> {
    let data_dir = get_data_directory()?;
    save_config_to(config, &data_dir.join(CONFIG_FILE_NAME))
}

pub fn save_config_to(config: &ShellConfig, config_path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(config).context("Failed to serialize config")?;

    fs::write(config_path, json)
        .with_context(|| format!("Failed to write {}", config_path.display()))?;

    Ok(())
}
