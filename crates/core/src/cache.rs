//! Settings cache
//!
//! Single point of truth for "what is the current value of field F for
//! overlay O". Reads resolve memory, then the durable store, then the
//! default. Writes update memory first, then the store, then any live window.
//!
//! Position is read straight from the store: it only changes when a window
//! closes, so a memory tier would add nothing.

use crate::error::CacheError;
use crate::registry::{Bounds, OverlayRegistry, WindowHandle};
use crate::store::{Position, SettingsStore};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

pub const DEFAULT_ZOOM: f64 = 1.0;
pub const DEFAULT_CARD_OPACITY: f64 = 1.0;

pub struct SettingsCache {
    store: Arc<SettingsStore>,
    registry: Arc<OverlayRegistry>,
    zoom: Mutex<HashMap<String, f64>>,
    opacity: Mutex<HashMap<String, f64>>,
}

impl SettingsCache {
    pub fn new(store: Arc<SettingsStore>, registry: Arc<OverlayRegistry>) -> Self {
        SettingsCache {
            store,
            registry,
            zoom: Mutex::new(HashMap::new()),
            opacity: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &SettingsStore {
        &self.store
    }

    /// Zoom factor for an overlay: memory -> file -> 1.0.
    /// The resolved value is cached so later calls skip the file.
    pub fn get_zoom(&self, overlay_id: &str) -> f64 {
        // Held across the file read so a concurrent reset cannot be undone
        // by a value loaded before it
        let mut zoom = self.zoom.lock();
        if let Some(factor) = zoom.get(overlay_id) {
            return *factor;
        }

        let factor = self
            .store
            .load()
            .get(overlay_id)
            .and_then(|settings| settings.zoom)
            .unwrap_or(DEFAULT_ZOOM);
        zoom.insert(overlay_id.to_string(), factor);
        factor
    }

    pub fn set_zoom(&self, overlay_id: &str, factor: f64) -> Result<(), CacheError> {
        if !factor.is_finite() || factor <= 0.0 {
            return Err(CacheError::InvalidArgument(format!(
                "zoom factor must be positive, got {}",
                factor
            )));
        }

        {
            let mut zoom = self.zoom.lock();
            zoom.insert(overlay_id.to_string(), factor);
            // Write failures are logged by the store; memory stays authoritative
            let _ = self
                .store
                .update(overlay_id, |settings| settings.zoom = Some(factor));
        }

        if let Some(window) = self.registry.get(overlay_id) {
            window.set_zoom(factor);
        }

        debug!("Zoom for {} set to {}", overlay_id, factor);
        Ok(())
    }

    /// Saved top-left position, if one was ever persisted
    pub fn get_position(&self, overlay_id: &str) -> Option<Position> {
        self.store
            .load()
            .get(overlay_id)
            .and_then(|settings| settings.position)
    }

    /// Persist a position and move the live window, if any
    pub fn set_position(&self, overlay_id: &str, position: Position) {
        let _ = self
            .store
            .update(overlay_id, |settings| settings.position = Some(position));

        if let Some(window) = self.registry.get(overlay_id) {
            window.set_position(position);
        }
    }

    /// Persist the final bounds of a closing window as its position
    pub fn on_overlay_closed(&self, overlay_id: &str, bounds: Bounds) {
        let position = bounds.position();
        let _ = self
            .store
            .update(overlay_id, |settings| settings.position = Some(position));
        debug!(
            "Saved position ({}, {}) for {}",
            position.x, position.y, overlay_id
        );
    }

    /// Card background opacity: memory -> file -> 1.0
    pub fn get_opacity(&self, overlay_id: &str) -> f64 {
        let mut opacity = self.opacity.lock();
        if let Some(value) = opacity.get(overlay_id) {
            return *value;
        }

        let value = self
            .store
            .load()
            .get(overlay_id)
            .and_then(|settings| settings.card_bg_opacity)
            .unwrap_or(DEFAULT_CARD_OPACITY);
        opacity.insert(overlay_id.to_string(), value);
        value
    }

    pub fn set_opacity(&self, overlay_id: &str, value: f64) -> Result<(), CacheError> {
        if !value.is_finite() || !(0.0..=1.0).contains(&value) {
            return Err(CacheError::InvalidArgument(format!(
                "card opacity must be within [0, 1], got {}",
                value
            )));
        }

        {
            let mut opacity = self.opacity.lock();
            opacity.insert(overlay_id.to_string(), value);
            let _ = self
                .store
                .update(overlay_id, |settings| settings.card_bg_opacity = Some(value));
        }

        if let Some(window) = self.registry.get(overlay_id) {
            window.set_card_opacity(value);
        }

        debug!("Card opacity for {} set to {}", overlay_id, value);
        Ok(())
    }

    /// Apply zoom, saved position and opacity to a freshly created window
    pub fn apply_saved(&self, overlay_id: &str, window: &WindowHandle) {
        window.set_zoom(self.get_zoom(overlay_id));
        if let Some(position) = self.get_position(overlay_id) {
            window.set_position(position);
        }
        window.set_card_opacity(self.get_opacity(overlay_id));
    }

    /// Drop the in-memory tiers without touching the file
    pub fn clear(&self) {
        self.zoom.lock().clear();
        self.opacity.lock().clear();
    }

    /// Destroy all windows, forget cached values and delete the store file.
    /// Both memory tiers stay locked until the file is gone, so no reader
    /// can cache a value from the old file afterwards.
    pub fn reset_all(&self) {
        let destroyed = self.registry.close_all();
        let mut zoom = self.zoom.lock();
        let mut opacity = self.opacity.lock();
        zoom.clear();
        opacity.clear();
        self.store.reset();
        drop(opacity);
        drop(zoom);
        info!("Overlay settings reset ({} windows closed)", destroyed);
    }
}
