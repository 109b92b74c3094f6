//! Session - the per-run owner of the settings store, settings cache,
//! overlay registry and overlay catalog.
//!
//! Built once at startup and handed to whoever needs it; nothing in the core
//! lives in a global.

use crate::cache::SettingsCache;
use crate::catalog::OverlayCatalog;
use crate::config::ShellConfig;
use crate::error::DispatchError;
use crate::registry::{Bounds, OverlayRegistry, WindowFactory, WindowHandle};
use crate::store::SettingsStore;
use std::sync::Arc;
use tracing::{debug, info};

pub struct Session {
    store: Arc<SettingsStore>,
    registry: Arc<OverlayRegistry>,
    cache: SettingsCache,
    catalog: OverlayCatalog,
}

impl Session {
    pub fn new(store: SettingsStore, catalog: OverlayCatalog) -> Self {
        let store = Arc::new(store);
        let registry = Arc::new(OverlayRegistry::new());
        let cache = SettingsCache::new(Arc::clone(&store), Arc::clone(&registry));
        Session {
            store,
            registry,
            cache,
            catalog,
        }
    }

    /// Session over the configured catalog and the given settings file
    pub fn from_config(config: &ShellConfig, store: SettingsStore) -> Self {
        let catalog = OverlayCatalog::new(config.overlays.clone(), config.backend.base_url());
        Self::new(store, catalog)
    }

    pub fn store(&self) -> &SettingsStore {
        &self.store
    }

    pub fn registry(&self) -> &OverlayRegistry {
        &self.registry
    }

    pub fn cache(&self) -> &SettingsCache {
        &self.cache
    }

    pub fn catalog(&self) -> &OverlayCatalog {
        &self.catalog
    }

    /// Fail fast on identifiers the catalog does not define
    pub fn ensure_known(&self, overlay_id: &str) -> Result<(), DispatchError> {
        if self.catalog.contains(overlay_id) {
            Ok(())
        } else {
            Err(DispatchError::InvalidOverlayState(overlay_id.to_string()))
        }
    }

    /// Focus or create the overlay's window. A newly created window gets the
    /// saved zoom, position and opacity applied before it is returned.
    /// Returns the handle and whether it was created by this call.
    pub fn open_overlay(
        &self,
        overlay_id: &str,
        factory: &dyn WindowFactory,
    ) -> Result<(WindowHandle, bool), DispatchError> {
        let spec = self
            .catalog
            .spec(overlay_id)
            .ok_or_else(|| DispatchError::InvalidOverlayState(overlay_id.to_string()))?;

        let opened = self.registry.open(&spec, factory)?;
        let created = opened.was_created();
        if created {
            self.cache.apply_saved(overlay_id, opened.handle());
        }
        Ok((opened.into_handle(), created))
    }

    /// Window event: the overlay's window is closing with these final bounds
    pub fn overlay_closed(&self, overlay_id: &str, bounds: Bounds) {
        self.cache.on_overlay_closed(overlay_id, bounds);
        self.registry.window_closed(overlay_id);
        debug!("Overlay {} closed", overlay_id);
    }

    /// Close the overlay's live window, persisting its bounds first.
    /// Returns false when no window was open.
    pub fn close_overlay(&self, overlay_id: &str) -> bool {
        let Some(window) = self.registry.get(overlay_id) else {
            return false;
        };
        self.overlay_closed(overlay_id, window.bounds());
        window.destroy();
        true
    }

    /// Close every window and restore defaults everywhere
    pub fn reset_all(&self) {
        self.cache.reset_all();
    }

    /// Close every window, persisting each one's bounds. Used on shutdown.
    pub fn close_all(&self) {
        let open = self.registry.open_ids();
        for overlay_id in &open {
            self.close_overlay(overlay_id);
        }
        if !open.is_empty() {
            info!("Closed {} overlays", open.len());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::OverlayDefinition;
    use crate::registry::OverlayWindow;
    use crate::store::Position;
    use crate::test_support::FakeFactory;

    fn session(dir: &tempfile::TempDir) -> Session {
        let store = SettingsStore::new(dir.path().join("overlays_settings.json"));
        let catalog = OverlayCatalog::new(OverlayDefinition::defaults(), "http://127.0.0.1:8000");
        Session::new(store, catalog)
    }

    #[test]
    fn test_open_unknown_overlay_fails() {
        let dir = tempfile::tempdir().unwrap();
        let session = session(&dir);
        let factory = FakeFactory::default();

        let err = session
            .open_overlay("minimap", &factory)
            .err()
            .expect("unknown overlay must fail");
        assert_eq!(err, DispatchError::InvalidOverlayState("minimap".to_string()));
        assert_eq!(factory.created_count(), 0);
    }

    #[test]
    fn test_open_uses_catalog_size_and_saved_settings() {
        let dir = tempfile::tempdir().unwrap();
        let session = session(&dir);
        session.cache().set_zoom("leaderboard", 1.5).unwrap();
        session
            .cache()
            .set_position("leaderboard", Position::new(300, 40));

        let factory = FakeFactory::default();
        let (_, created) = session.open_overlay("leaderboard", &factory).unwrap();
        assert!(created);

        let window = factory.window(0);
        assert_eq!(window.bounds().width, 450);
        assert_eq!(window.bounds().height, 300);
        assert_eq!(window.bounds().position(), Position::new(300, 40));
        assert_eq!(window.zoom(), Some(1.5));
        assert_eq!(window.opacity(), Some(1.0));
    }

    #[test]
    fn test_open_twice_focuses() {
        let dir = tempfile::tempdir().unwrap();
        let session = session(&dir);
        let factory = FakeFactory::default();

        let (_, first) = session.open_overlay("radar", &factory).unwrap();
        let (_, second) = session.open_overlay("radar", &factory).unwrap();

        assert!(first);
        assert!(!second);
        assert_eq!(factory.created_count(), 1);
        assert_eq!(factory.window(0).focus_count(), 1);
    }

    #[test]
    fn test_close_overlay_persists_bounds() {
        let dir = tempfile::tempdir().unwrap();
        let session = session(&dir);
        let factory = FakeFactory::default();

        session.open_overlay("speed", &factory).unwrap();
        factory.window(0).move_to(120, 340);

        assert!(session.close_overlay("speed"));
        assert!(factory.window(0).is_destroyed());
        assert!(!session.registry().is_open("speed"));
        assert_eq!(
            session.cache().get_position("speed"),
            Some(Position::new(120, 340))
        );

        assert!(!session.close_overlay("speed"));
    }

    #[test]
    fn test_close_all_persists_every_window() {
        let dir = tempfile::tempdir().unwrap();
        let session = session(&dir);
        let factory = FakeFactory::default();

        session.open_overlay("radar", &factory).unwrap();
        session.open_overlay("controls", &factory).unwrap();
        factory.window(0).move_to(1, 2);
        factory.window(1).move_to(3, 4);

        session.close_all();

        assert!(session.registry().open_ids().is_empty());
        assert_eq!(session.cache().get_position("radar"), Some(Position::new(1, 2)));
        assert_eq!(session.cache().get_position("controls"), Some(Position::new(3, 4)));
    }
}
