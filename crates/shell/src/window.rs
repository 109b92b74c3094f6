//! Overlay windows: frameless, always-on-top winit windows painted with
//! softbuffer. Web content is not rendered; each window paints a card whose
//! background blends with the desktop backdrop by the card opacity.

use crate::ShellEvent;
use anyhow::{anyhow, Result};
use overlay_shell_core::error::RegistryError;
use overlay_shell_core::{
    Bounds, OverlaySpec, OverlayWindow, Position, SizeHint, WindowFactory, WindowHandle,
};
use parking_lot::Mutex;
use std::cell::RefCell;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};
use winit::dpi::{LogicalSize, PhysicalPosition};
use winit::event_loop::EventLoopWindowTarget;
use winit::window::{Window, WindowBuilder, WindowId, WindowLevel};

/// 0x00RRGGBB
const BACKDROP_COLOR: u32 = 0x0010_1418;
const CARD_COLOR: u32 = 0x0026_2D36;
const HEADER_COLOR: u32 = 0x00E0_4F1F;
const HEADER_HEIGHT: f64 = 6.0;

/// One live overlay window
pub struct ShellWindow {
    overlay_id: String,
    window: Arc<Window>,
    base_size: SizeHint,
    zoom: Mutex<f64>,
    opacity: Mutex<f64>,
    /// Last requested position, for platforms that cannot report one
    last_position: Mutex<Position>,
    destroyed: AtomicBool,
}

impl ShellWindow {
    fn new(spec: &OverlaySpec, window: Window) -> Self {
        ShellWindow {
            overlay_id: spec.overlay_id.clone(),
            window: Arc::new(window),
            base_size: spec.size,
            zoom: Mutex::new(1.0),
            opacity: Mutex::new(1.0),
            last_position: Mutex::new(Position::new(0, 0)),
            destroyed: AtomicBool::new(false),
        }
    }

    pub fn overlay_id(&self) -> &str {
        &self.overlay_id
    }

    pub fn id(&self) -> WindowId {
        self.window.id()
    }

    pub fn request_redraw(&self) {
        self.window.request_redraw();
    }
}

impl OverlayWindow for ShellWindow {
    fn focus(&self) {
        self.window.set_visible(true);
        self.window.focus_window();
    }

    fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    fn bounds(&self) -> Bounds {
        let position = self
            .window
            .outer_position()
            .map(|p| Position::new(p.x, p.y))
            .unwrap_or_else(|_| *self.last_position.lock());
        let size = self.window.outer_size();
        Bounds {
            x: position.x,
            y: position.y,
            width: size.width,
            height: size.height,
        }
    }

    fn set_zoom(&self, factor: f64) {
        *self.zoom.lock() = factor;
        let _ = self.window.request_inner_size(scaled_size(self.base_size, factor));
        self.window.request_redraw();
    }

    fn set_position(&self, position: Position) {
        *self.last_position.lock() = position;
        self.window
            .set_outer_position(PhysicalPosition::new(position.x, position.y));
    }

    fn set_card_opacity(&self, opacity: f64) {
        *self.opacity.lock() = opacity;
        self.window.request_redraw();
    }

    fn destroy(&self) {
        if !self.destroyed.swap(true, Ordering::SeqCst) {
            self.window.set_visible(false);
            debug!("Window for {} destroyed", self.overlay_id);
        }
    }
}

/// Creates overlay windows on the event loop thread.
/// Windows created during one dispatch are collected so the caller can
/// attach painters to them afterwards.
pub struct WinitFactory<'a> {
    target: &'a EventLoopWindowTarget<ShellEvent>,
    created: RefCell<Vec<Arc<ShellWindow>>>,
}

impl<'a> WinitFactory<'a> {
    pub fn new(target: &'a EventLoopWindowTarget<ShellEvent>) -> Self {
        WinitFactory {
            target,
            created: RefCell::new(Vec::new()),
        }
    }

    pub fn into_created(self) -> Vec<Arc<ShellWindow>> {
        self.created.into_inner()
    }
}

impl WindowFactory for WinitFactory<'_> {
    fn create(&self, spec: &OverlaySpec) -> Result<WindowHandle, RegistryError> {
        let window = WindowBuilder::new()
            .with_title(format!("{} - {}", spec.overlay_id, spec.url))
            .with_decorations(false)
            .with_resizable(false)
            .with_inner_size(scaled_size(spec.size, 1.0))
            .with_window_level(WindowLevel::AlwaysOnTop)
            .build(self.target)
            .map_err(|e| RegistryError::WindowCreation {
                overlay_id: spec.overlay_id.clone(),
                reason: e.to_string(),
            })?;

        let shell_window = Arc::new(ShellWindow::new(spec, window));
        self.created.borrow_mut().push(Arc::clone(&shell_window));
        Ok(shell_window as WindowHandle)
    }
}

/// Software surface of one overlay window
pub struct Painter {
    window: Arc<ShellWindow>,
    surface: softbuffer::Surface<Arc<Window>, Arc<Window>>,
}

impl Painter {
    pub fn new(window: Arc<ShellWindow>) -> Result<Self> {
        let context = softbuffer::Context::new(Arc::clone(&window.window))
            .map_err(|e| anyhow!("Failed to create drawing context: {}", e))?;
        let surface = softbuffer::Surface::new(&context, Arc::clone(&window.window))
            .map_err(|e| anyhow!("Failed to create drawing surface: {}", e))?;
        Ok(Painter { window, surface })
    }

    pub fn window(&self) -> &Arc<ShellWindow> {
        &self.window
    }

    pub fn paint(&mut self) -> Result<()> {
        let size = self.window.window.inner_size();
        let (Some(width), Some(height)) =
            (NonZeroU32::new(size.width), NonZeroU32::new(size.height))
        else {
            return Ok(());
        };

        self.surface
            .resize(width, height)
            .map_err(|e| anyhow!("Failed to resize surface: {}", e))?;

        let zoom = *self.window.zoom.lock();
        let card = blend(BACKDROP_COLOR, CARD_COLOR, *self.window.opacity.lock());
        let header_rows = header_rows(zoom, self.window.window.scale_factor(), size.height);

        let mut buffer = self
            .surface
            .buffer_mut()
            .map_err(|e| anyhow!("Failed to map surface: {}", e))?;
        let header_pixels = (header_rows * size.width) as usize;
        for (index, pixel) in buffer.iter_mut().enumerate() {
            *pixel = if index < header_pixels { HEADER_COLOR } else { card };
        }
        buffer
            .present()
            .map_err(|e| anyhow!("Failed to present surface: {}", e))?;

        Ok(())
    }

    pub fn paint_or_log(&mut self) {
        if let Err(e) = self.paint() {
            warn!("Painting {} failed: {}", self.window.overlay_id, e);
        }
    }
}

/// Window size for a zoom factor
pub fn scaled_size(base: SizeHint, factor: f64) -> LogicalSize<f64> {
    LogicalSize::new(base.width as f64 * factor, base.height as f64 * factor)
}

/// Mix two 0x00RRGGBB colours; `alpha` is the weight of `top`
pub fn blend(bottom: u32, top: u32, alpha: f64) -> u32 {
    let alpha = alpha.clamp(0.0, 1.0);
    let channel = |shift: u32| {
        let b = ((bottom >> shift) & 0xFF) as f64;
        let t = ((top >> shift) & 0xFF) as f64;
        ((b + (t - b) * alpha).round() as u32) << shift
    };
    channel(16) | channel(8) | channel(0)
}

/// Header strip height in physical rows
fn header_rows(zoom: f64, scale_factor: f64, height: u32) -> u32 {
    ((HEADER_HEIGHT * zoom * scale_factor).round() as u32).min(height)
}
