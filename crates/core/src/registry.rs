//! Overlay registry
//!
//! Tracks which overlays currently have a live window and guarantees at most
//! one window per overlay identifier. Window creation itself belongs to the
//! window layer, reached through the `WindowFactory` / `OverlayWindow` seams.

use crate::error::RegistryError;
use crate::store::Position;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Requested window size in logical pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeHint {
    pub width: i32,
    pub height: i32,
}

impl SizeHint {
    pub fn validate(&self) -> Result<(), RegistryError> {
        if self.width <= 0 || self.height <= 0 {
            return Err(RegistryError::InvalidArgument(format!(
                "window size must be positive, got {}x{}",
                self.width, self.height
            )));
        }
        Ok(())
    }
}

/// Outer window rectangle reported by the window layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Bounds {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Bounds {
    pub fn position(&self) -> Position {
        Position::new(self.x, self.y)
    }
}

/// Everything needed to create one overlay window
#[derive(Debug, Clone, PartialEq)]
pub struct OverlaySpec {
    pub overlay_id: String,
    pub size: SizeHint,
    /// Backend page rendered inside the overlay
    pub url: String,
}

/// A live overlay window, implemented by the window layer
pub trait OverlayWindow: Send + Sync {
    /// Bring the window to the foreground
    fn focus(&self);
    fn is_destroyed(&self) -> bool;
    fn bounds(&self) -> Bounds;
    /// Apply a rendering scale factor
    fn set_zoom(&self, factor: f64);
    fn set_position(&self, position: Position);
    /// Push a new card background opacity in [0, 1]
    fn set_card_opacity(&self, opacity: f64);
    /// Tear the window down without any settings bookkeeping
    fn destroy(&self);
}

pub type WindowHandle = Arc<dyn OverlayWindow>;

/// Creates overlay windows on behalf of the registry
pub trait WindowFactory {
    fn create(&self, spec: &OverlaySpec) -> Result<WindowHandle, RegistryError>;
}

/// Result of `OverlayRegistry::open`
pub enum Opened {
    /// A new window was created and registered
    Created(WindowHandle),
    /// An existing live window was focused
    Focused(WindowHandle),
}

impl Opened {
    pub fn handle(&self) -> &WindowHandle {
        match self {
            Opened::Created(handle) | Opened::Focused(handle) => handle,
        }
    }

    pub fn into_handle(self) -> WindowHandle {
        match self {
            Opened::Created(handle) | Opened::Focused(handle) => handle,
        }
    }

    pub fn was_created(&self) -> bool {
        matches!(self, Opened::Created(_))
    }
}

/// Overlay identifier -> live window
#[derive(Default)]
pub struct OverlayRegistry {
    windows: Mutex<HashMap<String, WindowHandle>>,
}

impl OverlayRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Focus the live window for `spec.overlay_id`, or create and register one.
    /// The lock is held across creation so concurrent opens cannot both create.
    pub fn open(
        &self,
        spec: &OverlaySpec,
        factory: &dyn WindowFactory,
    ) -> Result<Opened, RegistryError> {
        let mut windows = self.windows.lock();

        if let Some(existing) = windows.get(&spec.overlay_id) {
            if !existing.is_destroyed() {
                debug!("Overlay {} already open, focusing", spec.overlay_id);
                existing.focus();
                return Ok(Opened::Focused(Arc::clone(existing)));
            }
            debug!("Dropping stale handle for {}", spec.overlay_id);
            windows.remove(&spec.overlay_id);
        }

        spec.size.validate()?;

        let handle = factory.create(spec)?;
        windows.insert(spec.overlay_id.clone(), Arc::clone(&handle));
        info!(
            "Opened overlay {} ({}x{})",
            spec.overlay_id, spec.size.width, spec.size.height
        );

        Ok(Opened::Created(handle))
    }

    /// Live window for an overlay, if any
    pub fn get(&self, overlay_id: &str) -> Option<WindowHandle> {
        let mut windows = self.windows.lock();
        match windows.get(overlay_id) {
            Some(handle) if !handle.is_destroyed() => Some(Arc::clone(handle)),
            Some(_) => {
                windows.remove(overlay_id);
                None
            }
            None => None,
        }
    }

    pub fn is_open(&self, overlay_id: &str) -> bool {
        self.get(overlay_id).is_some()
    }

    /// Forget the window of an overlay that has closed
    pub fn window_closed(&self, overlay_id: &str) -> Option<WindowHandle> {
        self.windows.lock().remove(overlay_id)
    }

    /// Destroy every live window. Returns how many were destroyed.
    pub fn close_all(&self) -> usize {
        let drained: Vec<(String, WindowHandle)> = self.windows.lock().drain().collect();

        let mut destroyed = 0;
        for (overlay_id, handle) in drained {
            if !handle.is_destroyed() {
                handle.destroy();
                destroyed += 1;
                debug!("Destroyed overlay {}", overlay_id);
            }
        }
        destroyed
    }

    /// Identifiers with a live window, sorted
    pub fn open_ids(&self) -> Vec<String> {
        let windows = self.windows.lock();
        let mut ids: Vec<String> = windows
            .iter()
            .filter(|(_, handle)| !handle.is_destroyed())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }
}
