use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use image::{Rgba, RgbaImage};

use crate::error::{Error, Result};
use crate::geometry::{Location, Rect};
use crate::logger;
use crate::types::*;
use super::Platform;

/// Fill colour of an unpainted virtual desktop.
pub const BACKGROUND: Rgba<u8> = Rgba([32, 32, 32, 255]);
const OFF_SCREEN: Rgba<u8> = Rgba([0, 0, 0, 255]);

/// In-memory desktop: a pixel canvas spanning every configured screen plus
/// recorded input, clipboard and a window list. Paint on it to make
/// patterns appear or vanish.
pub struct StubPlatform {
    screens: Vec<Rect>,
    bounds: Rect,
    canvas: Mutex<RgbaImage>,
    clipboard: Mutex<String>,
    mouse: Mutex<Location>,
    windows: Mutex<Vec<WindowInfo>>,
    input: Mutex<Vec<InputEvent>>,
    captures: AtomicUsize,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

impl StubPlatform {
    pub fn new() -> Self {
        Self::with_screens(vec![Rect::new(0, 0, 1920, 1080)])
    }

    pub fn with_screens(screens: Vec<Rect>) -> Self {
        let bounds = screens
            .iter()
            .copied()
            .reduce(|a, b| a.union(&b))
            .unwrap_or_default();
        let canvas = RgbaImage::from_pixel(bounds.w.max(0) as u32, bounds.h.max(0) as u32, BACKGROUND);
        Self {
            screens,
            bounds,
            canvas: Mutex::new(canvas),
            clipboard: Mutex::new(String::new()),
            mouse: Mutex::new(Location::default()),
            windows: Mutex::new(Vec::new()),
            input: Mutex::new(Vec::new()),
            captures: AtomicUsize::new(0),
        }
    }

    /// Copy `img` onto the desktop with its top-left at `at`.
    pub fn paint(&self, at: Location, img: &RgbaImage) {
        let mut canvas = lock(&self.canvas);
        for (x, y, px) in img.enumerate_pixels() {
            let cx = at.x + x as i32 - self.bounds.x;
            let cy = at.y + y as i32 - self.bounds.y;
            if cx >= 0 && cy >= 0 && (cx as u32) < canvas.width() && (cy as u32) < canvas.height() {
                canvas.put_pixel(cx as u32, cy as u32, *px);
            }
        }
    }

    pub fn fill(&self, rect: Rect, color: Rgba<u8>) {
        if !rect.is_valid() {
            return;
        }
        self.paint(rect.top_left(), &RgbaImage::from_pixel(rect.w as u32, rect.h as u32, color));
    }

    pub fn clear(&self) {
        let mut canvas = lock(&self.canvas);
        for px in canvas.pixels_mut() {
            *px = BACKGROUND;
        }
    }

    pub fn add_window(&self, title: &str, pid: u32, bounds: Rect) -> WindowId {
        let mut windows = lock(&self.windows);
        let id = 10001 + windows.len() as WindowId;
        windows.push(WindowInfo { id, title: title.to_string(), pid, bounds });
        id
    }

    pub fn input_log(&self) -> Vec<InputEvent> {
        lock(&self.input).clone()
    }

    pub fn capture_count(&self) -> usize {
        self.captures.load(Ordering::SeqCst)
    }

    fn record(&self, event: InputEvent) {
        logger::info_p("stub", &format!("{:?}", event));
        lock(&self.input).push(event);
    }
}

impl Default for StubPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl Platform for StubPlatform {
    fn screens(&self) -> Result<Vec<Rect>> {
        if self.screens.is_empty() {
            return Err(Error::Platform("virtual desktop has no screens".into()));
        }
        Ok(self.screens.clone())
    }

    fn capture(&self, rect: Rect) -> Result<RgbaImage> {
        if !rect.is_valid() {
            return Err(Error::Platform(format!("cannot capture empty rectangle {}", rect)));
        }
        self.captures.fetch_add(1, Ordering::SeqCst);
        let canvas = lock(&self.canvas);
        let mut out = RgbaImage::from_pixel(rect.w as u32, rect.h as u32, OFF_SCREEN);
        if let Some(visible) = rect.intersection(&self.bounds) {
            for y in visible.y..visible.bottom() {
                for x in visible.x..visible.right() {
                    let px = canvas.get_pixel((x - self.bounds.x) as u32, (y - self.bounds.y) as u32);
                    out.put_pixel((x - rect.x) as u32, (y - rect.y) as u32, *px);
                }
            }
        }
        Ok(out)
    }

    fn clipboard(&self) -> Result<String> {
        Ok(lock(&self.clipboard).clone())
    }

    fn set_clipboard(&self, text: &str) -> Result<()> {
        *lock(&self.clipboard) = text.to_string();
        Ok(())
    }

    fn windows(&self) -> Result<Vec<WindowInfo>> {
        Ok(lock(&self.windows).clone())
    }

    fn focus_window(&self, id: WindowId) -> Result<()> {
        let mut windows = lock(&self.windows);
        let pos = windows
            .iter()
            .position(|w| w.id == id)
            .ok_or_else(|| Error::Platform(format!("no window {}", id)))?;
        let win = windows.remove(pos);
        logger::info_p("stub", &format!("focus window {} \"{}\"", id, win.title));
        windows.insert(0, win);
        Ok(())
    }

    fn close_window(&self, id: WindowId) -> Result<()> {
        let mut windows = lock(&self.windows);
        let before = windows.len();
        windows.retain(|w| w.id != id);
        if windows.len() == before {
            return Err(Error::Platform(format!("no window {}", id)));
        }
        logger::info_p("stub", &format!("close window {}", id));
        Ok(())
    }

    fn mouse_location(&self) -> Result<Location> {
        Ok(*lock(&self.mouse))
    }

    fn mouse_move(&self, to: Location) -> Result<()> {
        *lock(&self.mouse) = to;
        self.record(InputEvent::MouseMove(to));
        Ok(())
    }

    fn mouse_button(&self, button: MouseButton, pressed: bool) -> Result<()> {
        self.record(InputEvent::MouseButton { button, pressed });
        Ok(())
    }

    fn scroll(&self, steps: i32) -> Result<()> {
        self.record(InputEvent::Scroll(steps));
        Ok(())
    }

    fn key(&self, key: &str, pressed: bool) -> Result<()> {
        self.record(InputEvent::Key { key: key.to_string(), pressed });
        Ok(())
    }

    fn type_text(&self, text: &str) -> Result<()> {
        self.record(InputEvent::Text(text.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_reads_painted_pixels() {
        let stub = StubPlatform::with_screens(vec![Rect::new(0, 0, 50, 40)]);
        stub.fill(Rect::new(10, 10, 5, 5), Rgba([255, 0, 0, 255]));
        let img = stub.capture(Rect::new(8, 8, 10, 10)).unwrap();
        assert_eq!(img.dimensions(), (10, 10));
        assert_eq!(*img.get_pixel(2, 2), Rgba([255, 0, 0, 255]));
        assert_eq!(*img.get_pixel(0, 0), BACKGROUND);
        assert_eq!(stub.capture_count(), 1);
    }

    #[test]
    fn test_capture_off_desktop_is_black() {
        let stub = StubPlatform::with_screens(vec![Rect::new(0, 0, 10, 10)]);
        let img = stub.capture(Rect::new(-5, 0, 10, 10)).unwrap();
        assert_eq!(*img.get_pixel(0, 0), OFF_SCREEN);
        assert_eq!(*img.get_pixel(5, 0), BACKGROUND);
        assert!(stub.capture(Rect::new(0, 0, 0, 10)).is_err());
    }

    #[test]
    fn test_screens_with_negative_origin() {
        let stub = StubPlatform::with_screens(vec![Rect::new(0, 0, 20, 20), Rect::new(-20, 0, 20, 20)]);
        stub.fill(Rect::new(-20, 0, 1, 1), Rgba([1, 2, 3, 255]));
        let img = stub.capture(Rect::new(-20, 0, 1, 1)).unwrap();
        assert_eq!(*img.get_pixel(0, 0), Rgba([1, 2, 3, 255]));
    }

    #[test]
    fn test_windows_focus_and_close() {
        let stub = StubPlatform::new();
        let a = stub.add_window("Notepad", 1, Rect::new(0, 0, 100, 100));
        let b = stub.add_window("Terminal", 2, Rect::new(50, 50, 100, 100));
        stub.focus_window(b).unwrap();
        assert_eq!(stub.windows().unwrap()[0].id, b);
        stub.close_window(a).unwrap();
        assert_eq!(stub.windows().unwrap().len(), 1);
        assert!(stub.close_window(a).is_err());
    }

    #[test]
    fn test_input_is_recorded() {
        let stub = StubPlatform::new();
        stub.mouse_move(Location::new(3, 4)).unwrap();
        stub.type_text("hi").unwrap();
        assert_eq!(stub.mouse_location().unwrap(), Location::new(3, 4));
        assert_eq!(
            stub.input_log(),
            vec![InputEvent::MouseMove(Location::new(3, 4)), InputEvent::Text("hi".into())]
        );
    }
}
