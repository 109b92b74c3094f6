//! Recording window fakes shared by unit tests

use crate::error::RegistryError;
use crate::registry::{Bounds, OverlaySpec, OverlayWindow, SizeHint, WindowFactory, WindowHandle};
use crate::store::Position;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

pub fn spec(overlay_id: &str, width: i32, height: i32) -> OverlaySpec {
    OverlaySpec {
        overlay_id: overlay_id.to_string(),
        size: SizeHint { width, height },
        url: format!("http://127.0.0.1:8000/{}", overlay_id),
    }
}

#[derive(Default)]
pub struct FakeWindow {
    pub bounds: Mutex<Bounds>,
    pub zoom: Mutex<Option<f64>>,
    pub opacity: Mutex<Option<f64>>,
    focused: AtomicUsize,
    destroyed: AtomicBool,
}

impl FakeWindow {
    pub fn focus_count(&self) -> usize {
        self.focused.load(Ordering::SeqCst)
    }

    pub fn zoom(&self) -> Option<f64> {
        *self.zoom.lock()
    }

    pub fn opacity(&self) -> Option<f64> {
        *self.opacity.lock()
    }

    pub fn move_to(&self, x: i32, y: i32) {
        let mut bounds = self.bounds.lock();
        bounds.x = x;
        bounds.y = y;
    }
}

impl OverlayWindow for FakeWindow {
    fn focus(&self) {
        self.focused.fetch_add(1, Ordering::SeqCst);
    }

    fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    fn bounds(&self) -> Bounds {
        *self.bounds.lock()
    }

    fn set_zoom(&self, factor: f64) {
        *self.zoom.lock() = Some(factor);
    }

    fn set_position(&self, position: Position) {
        self.move_to(position.x, position.y);
    }

    fn set_card_opacity(&self, opacity: f64) {
        *self.opacity.lock() = Some(opacity);
    }

    fn destroy(&self) {
        self.destroyed.store(true, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct FakeFactory {
    windows: Mutex<Vec<Arc<FakeWindow>>>,
}

impl FakeFactory {
    pub fn created_count(&self) -> usize {
        self.windows.lock().len()
    }

    pub fn window(&self, index: usize) -> Arc<FakeWindow> {
        Arc::clone(&self.windows.lock()[index])
    }
}

impl WindowFactory for FakeFactory {
    fn create(&self, spec: &OverlaySpec) -> Result<WindowHandle, RegistryError> {
        let window = Arc::new(FakeWindow::default());
        *window.bounds.lock() = Bounds {
            x: 0,
            y: 0,
            width: spec.size.width as u32,
            height: spec.size.height as u32,
        };
        self.windows.lock().push(Arc::clone(&window));
        Ok(window as WindowHandle)
    }
}
