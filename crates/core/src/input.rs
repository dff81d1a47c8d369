//! Mouse and keyboard actions relative to a region.
//!
//! Actions that take a [`Target`] return `Ok(false)` when the target was a
//! pattern whose FindFailed was skipped; nothing is injected in that case.

use crate::error::Result;
use crate::geometry::Location;
use crate::logger;
use crate::matching::Match;
use crate::pattern::Pattern;
use crate::region::Region;
use crate::types::MouseButton;

/// Where an action lands.
#[derive(Debug, Clone)]
pub enum Target {
    /// Waited for with the region's timeout and FindFailed policy.
    Pattern(Pattern),
    Match(Match),
    Location(Location),
    /// The region's centre.
    Center,
}

impl From<Pattern> for Target {
    fn from(p: Pattern) -> Self {
        Target::Pattern(p)
    }
}

impl From<&Pattern> for Target {
    fn from(p: &Pattern) -> Self {
        Target::Pattern(p.clone())
    }
}

impl From<Match> for Target {
    fn from(m: Match) -> Self {
        Target::Match(m)
    }
}

impl From<&Match> for Target {
    fn from(m: &Match) -> Self {
        Target::Match(m.clone())
    }
}

impl From<Location> for Target {
    fn from(l: Location) -> Self {
        Target::Location(l)
    }
}

impl Region {
    /// Screen point for `target`, `None` when a pattern was not found and
    /// the region's policy skipped the failure.
    pub fn resolve(&mut self, target: impl Into<Target>) -> Result<Option<Location>> {
        match target.into() {
            Target::Pattern(p) => Ok(self.wait(&p, None)?.map(|m| m.target())),
            Target::Match(m) => Ok(Some(m.target())),
            Target::Location(l) => Ok(Some(l)),
            Target::Center => Ok(Some(self.center())),
        }
    }

    fn press(&self, button: MouseButton, times: u32) -> Result<()> {
        let platform = self.desktop().platform();
        for _ in 0..times {
            platform.mouse_button(button, true)?;
            platform.mouse_button(button, false)?;
        }
        Ok(())
    }

    fn click_with(&mut self, target: Target, button: MouseButton, times: u32, what: &str) -> Result<bool> {
        let Some(at) = self.resolve(target)? else {
            logger::warn_p("input", &format!("{} skipped: target not found", what));
            return Ok(false);
        };
        self.desktop().platform().mouse_move(at)?;
        self.press(button, times)?;
        logger::action(&format!("{} at {}", what, at));
        Ok(true)
    }

    pub fn click(&mut self, target: impl Into<Target>) -> Result<bool> {
        self.click_with(target.into(), MouseButton::Left, 1, "click")
    }

    pub fn double_click(&mut self, target: impl Into<Target>) -> Result<bool> {
        self.click_with(target.into(), MouseButton::Left, 2, "double click")
    }

    pub fn right_click(&mut self, target: impl Into<Target>) -> Result<bool> {
        self.click_with(target.into(), MouseButton::Right, 1, "right click")
    }

    /// Move the mouse onto `target` without clicking.
    pub fn hover(&mut self, target: impl Into<Target>) -> Result<bool> {
        let Some(at) = self.resolve(target)? else { return Ok(false) };
        self.desktop().platform().mouse_move(at)?;
        logger::action(&format!("hover at {}", at));
        Ok(true)
    }

    /// Press the left button on `from`, move to `to` and release.
    pub fn drag_drop(&mut self, from: impl Into<Target>, to: impl Into<Target>) -> Result<bool> {
        let Some(start) = self.resolve(from)? else { return Ok(false) };
        let Some(end) = self.resolve(to)? else { return Ok(false) };
        let platform = self.desktop().platform();
        platform.mouse_move(start)?;
        platform.mouse_button(MouseButton::Left, true)?;
        platform.mouse_move(end)?;
        platform.mouse_button(MouseButton::Left, false)?;
        logger::action(&format!("drag {} -> {}", start, end));
        Ok(true)
    }

    /// Type `text` while holding `modifiers` (e.g. `["ctrl"]`).
    pub fn type_text(&self, text: &str, modifiers: &[&str]) -> Result<()> {
        let platform = self.desktop().platform();
        for m in modifiers {
            platform.key(m, true)?;
        }
        let typed = platform.type_text(text);
        for m in modifiers.iter().rev() {
            platform.key(m, false)?;
        }
        typed?;
        if modifiers.is_empty() {
            logger::action(&format!("type {:?}", text));
        } else {
            logger::action(&format!("type {:?} with {}", text, modifiers.join("+")));
        }
        Ok(())
    }

    /// Click `target`, then type.
    pub fn type_at(&mut self, target: impl Into<Target>, text: &str, modifiers: &[&str]) -> Result<bool> {
        if !self.click(target)? {
            return Ok(false);
        }
        self.type_text(text, modifiers)?;
        Ok(true)
    }

    /// Insert `text` verbatim through the clipboard.
    pub fn paste(&self, text: &str) -> Result<()> {
        let platform = self.desktop().platform();
        platform.set_clipboard(text)?;
        platform.key("ctrl", true)?;
        platform.key("v", true)?;
        platform.key("v", false)?;
        platform.key("ctrl", false)?;
        logger::action(&format!("paste {:?}", text));
        Ok(())
    }

    pub fn mouse_down(&self, button: MouseButton) -> Result<()> {
        self.desktop().platform().mouse_button(button, true)?;
        logger::action(&format!("mouse down {:?}", button));
        Ok(())
    }

    pub fn mouse_up(&self, button: MouseButton) -> Result<()> {
        self.desktop().platform().mouse_button(button, false)?;
        logger::action(&format!("mouse up {:?}", button));
        Ok(())
    }

    /// Scroll by `steps`; positive is down.
    pub fn wheel(&self, steps: i32) -> Result<()> {
        self.desktop().platform().scroll(steps)?;
        logger::action(&format!("wheel {}", steps));
        Ok(())
    }

    pub fn key_down(&self, key: &str) -> Result<()> {
        self.desktop().platform().key(key, true)?;
        logger::action(&format!("key down {}", key));
        Ok(())
    }

    pub fn key_up(&self, key: &str) -> Result<()> {
        self.desktop().platform().key(key, false)?;
        logger::action(&format!("key up {}", key));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use image::{Rgba, RgbaImage};
    use crate::desktop::Desktop;
    use crate::geometry::Rect;
    use crate::platform::StubPlatform;
    use crate::search::FindFailedResponse;
    use crate::types::InputEvent;

    fn setup() -> (Arc<StubPlatform>, Region) {
        let stub = Arc::new(StubPlatform::with_screens(vec![Rect::new(0, 0, 100, 80)]));
        let region = Desktop::new(stub.clone()).region(0, 0, 100, 80);
        (stub, region)
    }

    #[test]
    fn test_click_pattern_uses_target_offset() {
        let (stub, mut region) = setup();
        let icon = RgbaImage::from_pixel(5, 5, Rgba([250, 250, 250, 255]));
        stub.paint(Location::new(20, 30), &icon);
        let pattern = Pattern::from_image(icon).target_offset(2, 2);
        assert!(region.click(&pattern).unwrap());
        assert_eq!(
            stub.input_log(),
            vec![
                InputEvent::MouseMove(Location::new(22, 32)),
                InputEvent::MouseButton { button: MouseButton::Left, pressed: true },
                InputEvent::MouseButton { button: MouseButton::Left, pressed: false },
            ]
        );
        assert!(region.contains_mouse().unwrap());
    }

    #[test]
    fn test_skipped_target_does_nothing() {
        let (stub, mut region) = setup();
        region.set_find_failed_response(FindFailedResponse::Skip);
        region.set_auto_wait_timeout(0.0).unwrap();
        let missing = Pattern::from_image(RgbaImage::from_pixel(5, 5, Rgba([250, 0, 250, 255])));
        assert!(!region.double_click(&missing).unwrap());
        assert!(stub.input_log().is_empty());
    }

    #[test]
    fn test_missing_target_aborts_by_default() {
        let (_, mut region) = setup();
        region.set_auto_wait_timeout(0.0).unwrap();
        let missing = Pattern::from_image(RgbaImage::from_pixel(5, 5, Rgba([250, 0, 250, 255])));
        assert!(region.click(&missing).unwrap_err().is_find_failed());
    }

    #[test]
    fn test_drag_drop_and_center() {
        let (stub, mut region) = setup();
        assert!(region.drag_drop(Location::new(1, 1), Target::Center).unwrap());
        let log = stub.input_log();
        assert_eq!(log[0], InputEvent::MouseMove(Location::new(1, 1)));
        assert_eq!(log[2], InputEvent::MouseMove(Location::new(50, 40)));
        assert_eq!(log.len(), 4);
    }

    #[test]
    fn test_paste_goes_through_clipboard() {
        let (stub, region) = setup();
        region.paste("a {SHIFT}broken record").unwrap();
        assert_eq!(region.desktop().clipboard().unwrap(), "a {SHIFT}broken record");
        let keys: Vec<_> = stub
            .input_log()
            .into_iter()
            .filter_map(|e| match e {
                InputEvent::Key { key, pressed } => Some((key, pressed)),
                _ => None,
            })
            .collect();
        assert_eq!(keys.first(), Some(&("ctrl".to_string(), true)));
        assert_eq!(keys.last(), Some(&("ctrl".to_string(), false)));
    }

    #[test]
    fn test_type_with_modifiers_releases_in_reverse() {
        let (stub, region) = setup();
        region.type_text("c", &["ctrl", "shift"]).unwrap();
        let log = stub.input_log();
        assert_eq!(log[2], InputEvent::Text("c".into()));
        assert_eq!(log[3], InputEvent::Key { key: "shift".into(), pressed: false });
        assert_eq!(log[4], InputEvent::Key { key: "ctrl".into(), pressed: false });
    }
}
