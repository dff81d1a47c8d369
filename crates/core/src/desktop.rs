//! The shared automation context: platform, matcher, prompt, settings and the
//! screen list. Every [`Region`] carries a cheap clone of it.

use std::sync::{Arc, OnceLock, RwLock};

use image::{Rgba, RgbaImage};
use regex::RegexBuilder;

use crate::error::{Error, Result};
use crate::geometry::{Location, Rect};
use crate::logger;
use crate::matching::{Matcher, PixelMatcher};
use crate::platform::Platform;
use crate::region::Region;
use crate::screen::Screen;
use crate::search::FindFailedPrompt;
use crate::settings::Settings;
use crate::types::{WindowId, WindowInfo};

struct Inner {
    platform: Arc<dyn Platform>,
    matcher: Arc<dyn Matcher>,
    prompt: RwLock<Option<Arc<dyn FindFailedPrompt>>>,
    settings: RwLock<Settings>,
    screens: OnceLock<Vec<Rect>>,
}

#[derive(Clone)]
pub struct Desktop {
    inner: Arc<Inner>,
}

pub struct DesktopBuilder {
    platform: Arc<dyn Platform>,
    matcher: Arc<dyn Matcher>,
    prompt: Option<Arc<dyn FindFailedPrompt>>,
    settings: Settings,
}

impl DesktopBuilder {
    pub fn matcher(mut self, matcher: Arc<dyn Matcher>) -> Self {
        self.matcher = matcher;
        self
    }

    pub fn prompt(mut self, prompt: Arc<dyn FindFailedPrompt>) -> Self {
        self.prompt = Some(prompt);
        self
    }

    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    pub fn build(self) -> Result<Desktop> {
        self.settings.validate()?;
        logger::set_show_actions(self.settings.show_actions);
        Ok(Desktop {
            inner: Arc::new(Inner {
                platform: self.platform,
                matcher: self.matcher,
                prompt: RwLock::new(self.prompt),
                settings: RwLock::new(self.settings),
                screens: OnceLock::new(),
            }),
        })
    }
}

impl Desktop {
    pub fn builder(platform: Arc<dyn Platform>) -> DesktopBuilder {
        DesktopBuilder {
            platform,
            matcher: Arc::new(PixelMatcher),
            prompt: None,
            settings: Settings::default(),
        }
    }

    /// Desktop with the default matcher and settings and no prompt.
    pub fn new(platform: Arc<dyn Platform>) -> Self {
        Desktop {
            inner: Arc::new(Inner {
                platform,
                matcher: Arc::new(PixelMatcher),
                prompt: RwLock::new(None),
                settings: RwLock::new(Settings::default()),
                screens: OnceLock::new(),
            }),
        }
    }

    pub fn platform(&self) -> &Arc<dyn Platform> {
        &self.inner.platform
    }

    pub fn matcher(&self) -> &dyn Matcher {
        self.inner.matcher.as_ref()
    }

    pub fn prompt(&self) -> Option<Arc<dyn FindFailedPrompt>> {
        match self.inner.prompt.read() {
            Ok(p) => p.clone(),
            Err(e) => e.into_inner().clone(),
        }
    }

    pub fn set_prompt(&self, prompt: Option<Arc<dyn FindFailedPrompt>>) {
        match self.inner.prompt.write() {
            Ok(mut p) => *p = prompt,
            Err(e) => *e.into_inner() = prompt,
        }
    }

    pub fn settings(&self) -> Settings {
        match self.inner.settings.read() {
            Ok(s) => s.clone(),
            Err(e) => e.into_inner().clone(),
        }
    }

    /// Replace the defaults used by regions created from now on.
    pub fn set_settings(&self, settings: Settings) -> Result<()> {
        settings.validate()?;
        logger::set_show_actions(settings.show_actions);
        match self.inner.settings.write() {
            Ok(mut s) => *s = settings,
            Err(e) => *e.into_inner() = settings,
        }
        Ok(())
    }

    /// Screen bounds in platform order, enumerated once per desktop.
    pub fn screen_bounds(&self) -> Result<&[Rect]> {
        if let Some(screens) = self.inner.screens.get() {
            return Ok(screens);
        }
        let found = self.inner.platform.screens()?;
        if found.is_empty() {
            return Err(Error::Platform("platform reported no screens".into()));
        }
        let screens = self.inner.screens.get_or_init(|| {
            logger::info_p("screen", &format!("{} screen(s) enumerated", found.len()));
            found
        });
        Ok(screens)
    }

    pub fn number_screens(&self) -> Result<usize> {
        Ok(self.screen_bounds()?.len())
    }

    pub fn screen(&self, id: usize) -> Result<Screen> {
        Screen::new(self, id)
    }

    pub fn primary_screen(&self) -> Result<Screen> {
        self.screen(0)
    }

    /// Index of the screen containing `loc`.
    pub(crate) fn screen_id_at(&self, loc: Location) -> Result<Option<usize>> {
        Ok(self.screen_bounds()?.iter().position(|s| s.contains(loc)))
    }

    /// The screen containing `loc`, or `None` when it is outside every screen.
    pub fn screen_at(&self, loc: Location) -> Result<Option<Screen>> {
        match self.screen_id_at(loc)? {
            Some(id) => Ok(Some(self.screen(id)?)),
            None => Ok(None),
        }
    }

    /// Like [`screen_at`](Self::screen_at) but falls back to screen 0.
    pub fn monitor_at(&self, loc: Location) -> Result<Screen> {
        let id = self.screen_id_at(loc)?.unwrap_or(0);
        self.screen(id)
    }

    pub fn region(&self, x: i32, y: i32, w: i32, h: i32) -> Region {
        Region::new(self, Rect::new(x, y, w, h))
    }

    pub fn region_from_rect(&self, rect: Rect) -> Region {
        Region::new(self, rect)
    }

    pub fn capture(&self, rect: Rect) -> Result<RgbaImage> {
        self.inner.platform.capture(rect)
    }

    /// Pixel colour at `loc`, `None` outside every screen.
    pub fn color_at(&self, loc: Location) -> Result<Option<Rgba<u8>>> {
        if self.screen_id_at(loc)?.is_none() {
            return Ok(None);
        }
        let img = self.capture(Rect::new(loc.x, loc.y, 1, 1))?;
        Ok(Some(*img.get_pixel(0, 0)))
    }

    pub fn clipboard(&self) -> Result<String> {
        self.inner.platform.clipboard()
    }

    pub fn set_clipboard(&self, text: &str) -> Result<()> {
        self.inner.platform.set_clipboard(text)
    }

    pub fn mouse_location(&self) -> Result<Location> {
        self.inner.platform.mouse_location()
    }

    pub fn windows(&self) -> Result<Vec<WindowInfo>> {
        self.inner.platform.windows()
    }

    /// First window whose title matches `pattern`, case-insensitively.
    pub fn find_window(&self, pattern: &str) -> Result<Option<WindowInfo>> {
        let re = RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .map_err(|e| Error::Type(format!("invalid window pattern '{}': {}", pattern, e)))?;
        Ok(self.windows()?.into_iter().find(|w| re.is_match(&w.title)))
    }

    pub fn window_by_pid(&self, pid: u32) -> Result<Option<WindowInfo>> {
        Ok(self.windows()?.into_iter().find(|w| w.pid == pid))
    }

    /// Region covering the window's current bounds.
    pub fn window_region(&self, id: WindowId) -> Result<Region> {
        let window = self
            .windows()?
            .into_iter()
            .find(|w| w.id == id)
            .ok_or_else(|| Error::Range(format!("no window with id {}", id)))?;
        Ok(self.region_from_rect(window.bounds))
    }

    pub fn focus_window(&self, id: WindowId) -> Result<()> {
        self.inner.platform.focus_window(id)
    }

    pub fn close_window(&self, id: WindowId) -> Result<()> {
        self.inner.platform.close_window(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::StubPlatform;

    fn two_screens() -> (Arc<StubPlatform>, Desktop) {
        let stub = Arc::new(StubPlatform::with_screens(vec![
            Rect::new(0, 0, 800, 600),
            Rect::new(800, 0, 640, 480),
        ]));
        let desktop = Desktop::new(stub.clone());
        (stub, desktop)
    }

    #[test]
    fn test_screen_lookup() {
        let (_, desktop) = two_screens();
        assert_eq!(desktop.number_screens().unwrap(), 2);
        assert_eq!(desktop.screen_at(Location::new(10, 11)).unwrap().unwrap().id(), 0);
        assert_eq!(desktop.screen_at(Location::new(900, 10)).unwrap().unwrap().id(), 1);
        assert!(desktop.screen_at(Location::new(-10, -10)).unwrap().is_none());
        assert_eq!(desktop.monitor_at(Location::new(-10, -10)).unwrap().id(), 0);
        assert!(matches!(desktop.screen(2), Err(Error::Range(_))));
    }

    #[test]
    fn test_screens_are_enumerated_once() {
        let (_, desktop) = two_screens();
        let first = desktop.screen_bounds().unwrap().as_ptr();
        let second = desktop.screen_bounds().unwrap().as_ptr();
        assert_eq!(first, second);
    }

    #[test]
    fn test_color_at() {
        let (stub, desktop) = two_screens();
        stub.fill(Rect::new(5, 5, 1, 1), Rgba([1, 2, 3, 255]));
        assert_eq!(desktop.color_at(Location::new(5, 5)).unwrap(), Some(Rgba([1, 2, 3, 255])));
        assert_eq!(desktop.color_at(Location::new(-10, -10)).unwrap(), None);
    }

    #[test]
    fn test_find_window_is_case_insensitive() {
        let (stub, desktop) = two_screens();
        let id = stub.add_window("Untitled - Notepad", 42, Rect::new(10, 10, 300, 200));
        let found = desktop.find_window("notepad$").unwrap().unwrap();
        assert_eq!(found.id, id);
        assert!(desktop.find_window("textedit").unwrap().is_none());
        assert!(matches!(desktop.find_window("("), Err(Error::Type(_))));
        assert_eq!(desktop.window_region(id).unwrap().rect(), Rect::new(10, 10, 300, 200));
        assert_eq!(desktop.window_by_pid(42).unwrap().unwrap().id, id);
    }

    #[test]
    fn test_builder_validates_settings() {
        let stub = Arc::new(StubPlatform::new());
        let bad = Settings { wait_scan_rate: 0.0, ..Settings::default() };
        assert!(Desktop::builder(stub.clone()).settings(bad).build().is_err());
        let ok = Desktop::builder(stub).settings(Settings::default()).build();
        assert!(ok.is_ok());
    }
}
