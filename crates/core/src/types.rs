use crate::geometry::{Location, Rect};

/// Window identifier (CGWindowID on macOS, HWND on Windows)
pub type WindowId = u64;

/// A top-level window as reported by the platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowInfo {
    pub id: WindowId,
    pub title: String,
    pub pid: u32,
    pub bounds: Rect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseButton {
    Left,
    Middle,
    Right,
}

/// One injected input event, as recorded by the virtual desktop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEvent {
    MouseMove(Location),
    MouseButton { button: MouseButton, pressed: bool },
    Scroll(i32),
    Key { key: String, pressed: bool },
    Text(String),
}
