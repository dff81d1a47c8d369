pub mod stub;

use std::sync::Arc;

use image::RgbaImage;

use crate::error::Result;
use crate::geometry::{Location, Rect};
use crate::logger;
use crate::types::*;

pub use stub::StubPlatform;

/// Per-OS primitives the engine drives: capture, screens, clipboard,
/// windows and input injection. All coordinates are screen-absolute.
pub trait Platform: Send + Sync {
    /// Physical screens in platform order. Index 0 is the primary screen.
    fn screens(&self) -> Result<Vec<Rect>>;
    fn capture(&self, rect: Rect) -> Result<RgbaImage>;

    fn clipboard(&self) -> Result<String>;
    fn set_clipboard(&self, text: &str) -> Result<()>;

    fn windows(&self) -> Result<Vec<WindowInfo>>;
    fn focus_window(&self, id: WindowId) -> Result<()>;
    fn close_window(&self, id: WindowId) -> Result<()>;

    fn mouse_location(&self) -> Result<Location>;
    fn mouse_move(&self, to: Location) -> Result<()>;
    fn mouse_button(&self, button: MouseButton, pressed: bool) -> Result<()>;
    fn scroll(&self, steps: i32) -> Result<()>;
    /// Press or release a named key (`"ctrl"`, `"shift"`, `"v"`, ...).
    fn key(&self, key: &str, pressed: bool) -> Result<()>;
    fn type_text(&self, text: &str) -> Result<()>;
}

/// Create the platform for the current OS.
///
/// No native capture/input backend ships with this crate, so this is always
/// the virtual desktop; `screens` overrides its default single 1920x1080 screen.
pub fn create_platform(screens: Option<Vec<Rect>>) -> Arc<dyn Platform> {
    logger::info_p("stub", "no native backend; using the virtual desktop");
    match screens {
        Some(screens) => Arc::new(StubPlatform::with_screens(screens)),
        None => Arc::new(StubPlatform::new()),
    }
}
