//! Settings survive a restart: every test builds a fresh session over the
//! same settings file to simulate the next application run.

use overlay_shell_core::command::Command;
use overlay_shell_core::dispatcher::dispatch;
use overlay_shell_core::error::RegistryError;
use overlay_shell_core::{
    Bounds, OverlayCatalog, OverlayDefinition, OverlaySpec, OverlayWindow, Position, Response,
    Session, SettingsStore, WindowFactory, WindowHandle,
};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

struct TestWindow {
    bounds: Mutex<Bounds>,
    zoom: Mutex<f64>,
    destroyed: AtomicBool,
}

impl OverlayWindow for TestWindow {
    fn focus(&self) {}

    fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    fn bounds(&self) -> Bounds {
        *self.bounds.lock()
    }

    fn set_zoom(&self, factor: f64) {
        *self.zoom.lock() = factor;
    }

    fn set_position(&self, position: Position) {
        let mut bounds = self.bounds.lock();
        bounds.x = position.x;
        bounds.y = position.y;
    }

    fn set_card_opacity(&self, _opacity: f64) {}

    fn destroy(&self) {
        self.destroyed.store(true, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct TestFactory {
    created: Mutex<Vec<Arc<TestWindow>>>,
}

impl WindowFactory for TestFactory {
    fn create(&self, spec: &OverlaySpec) -> Result<WindowHandle, RegistryError> {
        let window = Arc::new(TestWindow {
            bounds: Mutex::new(Bounds {
                x: 0,
                y: 0,
                width: spec.size.width as u32,
                height: spec.size.height as u32,
            }),
            zoom: Mutex::new(1.0),
            destroyed: AtomicBool::new(false),
        });
        self.created.lock().push(Arc::clone(&window));
        Ok(window as WindowHandle)
    }
}

fn run(settings_file: &Path) -> Session {
    let catalog = OverlayCatalog::new(OverlayDefinition::defaults(), "http://127.0.0.1:8000");
    Session::new(SettingsStore::new(settings_file), catalog)
}

#[test]
fn test_zoom_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("overlays_settings.json");

    run(&file).cache().set_zoom("radar", 1.25).unwrap();

    let next = run(&file);
    assert_eq!(next.cache().get_zoom("radar"), 1.25);
    assert_eq!(next.cache().get_zoom("speed"), 1.0);
}

#[test]
fn test_closed_position_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("overlays_settings.json");
    let factory = TestFactory::default();

    let first = run(&file);
    first.open_overlay("radar", &factory).unwrap();
    first.overlay_closed(
        "radar",
        Bounds {
            x: 120,
            y: 340,
            width: 500,
            height: 500,
        },
    );

    let next = run(&file);
    assert_eq!(next.cache().get_position("radar"), Some(Position::new(120, 340)));

    // Reopening places the window at the saved position
    let (window, created) = next.open_overlay("radar", &factory).unwrap();
    assert!(created);
    assert_eq!(window.bounds().position(), Position::new(120, 340));
}

#[test]
fn test_reset_all_restores_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("overlays_settings.json");
    let factory = TestFactory::default();

    let session = run(&file);
    session.open_overlay("leaderboard", &factory).unwrap();
    session.cache().set_zoom("leaderboard", 2.0).unwrap();
    session.cache().set_opacity("leaderboard", 0.5).unwrap();
    session
        .cache()
        .set_position("leaderboard", Position::new(10, 10));

    dispatch(&session, Command::ResetAllSettings, &factory).unwrap();

    assert!(!file.exists());
    assert!(factory.created.lock()[0].is_destroyed());
    assert_eq!(session.cache().get_zoom("leaderboard"), 1.0);
    assert_eq!(session.cache().get_opacity("leaderboard"), 1.0);
    assert_eq!(session.cache().get_position("leaderboard"), None);

    let next = run(&file);
    assert_eq!(next.cache().get_zoom("leaderboard"), 1.0);
}

#[test]
fn test_open_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let session = run(&dir.path().join("overlays_settings.json"));
    let factory = TestFactory::default();

    let (first, _) = session.open_overlay("controls", &factory).unwrap();
    let (second, created) = session.open_overlay("controls", &factory).unwrap();

    assert!(!created);
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(factory.created.lock().len(), 1);
}

#[test]
fn test_legacy_document_is_migrated() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("overlays_settings.json");
    std::fs::write(
        &file,
        r#"{"radar":{"zoom":1.5,"position":[5,6]},"speed":{"cardBgOpacity":0.25}}"#,
    )
    .unwrap();

    let session = run(&file);
    let factory = TestFactory::default();
    assert_eq!(
        dispatch(
            &session,
            Command::GetOpacity {
                id: "speed".to_string()
            },
            &factory
        )
        .unwrap(),
        Response::Opacity { value: 0.25 }
    );
    assert_eq!(session.cache().get_zoom("radar"), 1.5);

    // The next write upgrades the layout
    session.cache().set_zoom("speed", 0.75).unwrap();
    let document: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&file).unwrap()).unwrap();
    assert_eq!(document["version"], 1);
    assert_eq!(document["overlays"]["radar"]["position"][0], 5);
    assert_eq!(document["overlays"]["speed"]["zoom"], 0.75);
}
