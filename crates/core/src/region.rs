//! Rectangular screen areas carrying search and observe settings.
//!
//! Geometry lives here; searching, observing and input are implemented on
//! [`Region`] in their own modules.

use std::fmt;
use std::time::Duration;

use crate::desktop::Desktop;
use crate::error::{Error, Result};
use crate::geometry::{Location, Rect};
use crate::matching::Match;
use crate::observer::ObserverLink;
use crate::raster::{Raster, RegionPart};
use crate::screen::Screen;
use crate::search::FindFailedResponse;
use crate::settings::{validate_scan_rate, validate_timeout};

/// Horizontal placement for [`Region::create_directed`], relative to the anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HorizontalDir {
    /// Region extends to the left of the anchor.
    Left,
    Middle,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerticalDir {
    Top,
    Middle,
    Bottom,
}

/// A rectangle on the desktop plus its search settings.
///
/// Cloning a region shares its observer (registrations, event log, running
/// loop). Derived regions (`above`, `offset`, `get`, ...) and [`Region::copy`]
/// start with a fresh observer and no last match.
#[derive(Clone)]
pub struct Region {
    rect: Rect,
    pub(crate) auto_wait_timeout: f64,
    pub(crate) wait_scan_rate: f64,
    pub(crate) find_failed: FindFailedResponse,
    raster: Raster,
    desktop: Desktop,
    pub(crate) last_match: Option<Match>,
    pub(crate) last_matches: Vec<Match>,
    pub(crate) last_search_time: Duration,
    pub(crate) observer: ObserverLink,
}

impl Region {
    pub fn new(desktop: &Desktop, rect: Rect) -> Self {
        let settings = desktop.settings();
        Self {
            rect,
            auto_wait_timeout: settings.auto_wait_timeout,
            wait_scan_rate: settings.wait_scan_rate,
            find_failed: FindFailedResponse::default(),
            raster: Raster::default(),
            desktop: desktop.clone(),
            last_match: None,
            last_matches: Vec::new(),
            last_search_time: Duration::ZERO,
            observer: ObserverLink::new(),
        }
    }

    /// Region of size `w` x `h` whose top-left is `loc`.
    pub fn create(desktop: &Desktop, loc: Location, w: i32, h: i32) -> Self {
        Self::new(desktop, Rect::new(loc.x, loc.y, w, h))
    }

    /// Region of size `w` x `h` placed around `loc` in the given directions.
    pub fn create_directed(
        desktop: &Desktop,
        loc: Location,
        x_dir: HorizontalDir,
        y_dir: VerticalDir,
        w: i32,
        h: i32,
    ) -> Self {
        let x = match x_dir {
            HorizontalDir::Left => loc.x - w,
            HorizontalDir::Middle => loc.x - w / 2,
            HorizontalDir::Right => loc.x,
        };
        let y = match y_dir {
            VerticalDir::Top => loc.y - h,
            VerticalDir::Middle => loc.y - h / 2,
            VerticalDir::Bottom => loc.y,
        };
        Self::new(desktop, Rect::new(x, y, w, h))
    }

    /// Same settings and raster over `rect`, with a fresh observer.
    pub(crate) fn derive(&self, rect: Rect) -> Region {
        Region {
            rect,
            auto_wait_timeout: self.auto_wait_timeout,
            wait_scan_rate: self.wait_scan_rate,
            find_failed: self.find_failed.clone(),
            raster: self.raster,
            desktop: self.desktop.clone(),
            last_match: None,
            last_matches: Vec::new(),
            last_search_time: Duration::ZERO,
            observer: ObserverLink::new(),
        }
    }

    /// Independent copy: same geometry and settings, own observer.
    pub fn copy(&self) -> Region {
        self.derive(self.rect)
    }

    pub fn desktop(&self) -> &Desktop {
        &self.desktop
    }

    // --- geometry -------------------------------------------------------

    pub fn rect(&self) -> Rect {
        self.rect
    }

    pub fn x(&self) -> i32 {
        self.rect.x
    }

    pub fn y(&self) -> i32 {
        self.rect.y
    }

    pub fn w(&self) -> i32 {
        self.rect.w
    }

    pub fn h(&self) -> i32 {
        self.rect.h
    }

    pub fn set_x(&mut self, x: i32) -> &mut Self {
        self.rect.x = x;
        self
    }

    pub fn set_y(&mut self, y: i32) -> &mut Self {
        self.rect.y = y;
        self
    }

    pub fn set_w(&mut self, w: i32) -> &mut Self {
        self.rect.w = w;
        self
    }

    pub fn set_h(&mut self, h: i32) -> &mut Self {
        self.rect.h = h;
        self
    }

    /// Move the top-left corner, keeping the size.
    pub fn move_to(&mut self, loc: Location) -> &mut Self {
        self.rect.x = loc.x;
        self.rect.y = loc.y;
        self
    }

    pub fn set_location(&mut self, loc: Location) -> &mut Self {
        self.move_to(loc)
    }

    pub fn set_rect(&mut self, rect: Rect) -> &mut Self {
        self.rect = rect;
        self
    }

    pub fn set_roi(&mut self, rect: Rect) -> &mut Self {
        self.set_rect(rect)
    }

    /// Take `other`'s geometry; settings are kept.
    pub fn morph_to(&mut self, other: &Region) -> &mut Self {
        self.rect = other.rect;
        self
    }

    /// Expand by the given margins on each side.
    pub fn add(&mut self, left: i32, right: i32, top: i32, bottom: i32) -> &mut Self {
        self.rect = Rect::new(
            self.rect.x.saturating_sub(left),
            self.rect.y.saturating_sub(top),
            self.rect.w.saturating_add(left).saturating_add(right),
            self.rect.h.saturating_add(top).saturating_add(bottom),
        );
        self
    }

    pub fn is_valid(&self) -> bool {
        self.rect.is_valid()
    }

    fn require_valid(&self, op: &str) -> Result<()> {
        if !self.is_valid() {
            return Err(Error::Range(format!("{} needs a non-empty region, got {}", op, self.rect)));
        }
        Ok(())
    }

    pub fn top_left(&self) -> Location {
        self.rect.top_left()
    }

    pub fn top_right(&self) -> Location {
        self.rect.top_right()
    }

    pub fn bottom_left(&self) -> Location {
        self.rect.bottom_left()
    }

    pub fn bottom_right(&self) -> Location {
        self.rect.bottom_right()
    }

    pub fn center(&self) -> Location {
        self.rect.center()
    }

    pub fn contains(&self, loc: Location) -> bool {
        self.rect.contains(loc)
    }

    /// All four corners of `other` lie inside this region.
    pub fn contains_region(&self, other: &Region) -> bool {
        self.rect.contains_rect(&other.rect)
    }

    pub fn contains_mouse(&self) -> Result<bool> {
        Ok(self.contains(self.desktop.mouse_location()?))
    }

    // --- screens --------------------------------------------------------

    /// Index of the owning screen: the one containing the top-left corner,
    /// else the one overlapping the most, else screen 0.
    pub(crate) fn screen_id(&self) -> Result<usize> {
        let screens = self.desktop.screen_bounds()?;
        if let Some(id) = screens.iter().position(|s| s.contains(self.top_left())) {
            return Ok(id);
        }
        let best = screens
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.intersection(&self.rect).map(|r| (i, r.area())))
            .max_by_key(|&(_, area)| area);
        Ok(best.map_or(0, |(i, _)| i))
    }

    pub(crate) fn screen_rect(&self) -> Result<Rect> {
        let id = self.screen_id()?;
        Ok(self.desktop.screen_bounds()?[id])
    }

    pub fn screen(&self) -> Result<Screen> {
        self.desktop.screen(self.screen_id()?)
    }

    fn clip(&self, rect: Rect) -> Result<Rect> {
        Ok(rect.intersection(&self.screen_rect()?).unwrap_or(rect))
    }

    /// This region cut down to its owning screen.
    pub fn clip_to_screen(&self) -> Result<Region> {
        let screen = self.screen_rect()?;
        let rect = self
            .rect
            .intersection(&screen)
            .ok_or_else(|| Error::Range(format!("{} lies outside screen {}", self.rect, screen)))?;
        Ok(self.derive(rect))
    }

    /// Same position relative to `screen` as this region has to its own screen.
    pub fn copy_to(&self, screen: &Screen) -> Result<Region> {
        let from = self.screen_rect()?;
        let to = screen.bounds();
        Ok(self.derive(self.rect.offset(to.x.saturating_sub(from.x), to.y.saturating_sub(from.y))))
    }

    // --- derived regions ------------------------------------------------

    /// Translate by `(dx, dy)`. Fails when the result overlaps no screen.
    pub fn offset(&self, dx: i32, dy: i32) -> Result<Region> {
        let rect = self.rect.offset(dx, dy);
        if !self.desktop.screen_bounds()?.iter().any(|s| s.intersects(&rect)) {
            return Err(Error::Range(format!("offset region {} is outside every screen", rect)));
        }
        Ok(self.derive(rect))
    }

    pub fn inside(&self) -> Region {
        self.copy()
    }

    /// Expand symmetrically about the centre; `h` defaults to `w`.
    pub fn grow(&self, w: i32, h: Option<i32>) -> Region {
        self.derive(self.rect.grow(w, h.unwrap_or(w)))
    }

    /// Grow by `range` (default from settings) on every side, clipped to the screen.
    pub fn nearby(&self, range: Option<i32>) -> Result<Region> {
        let range = range.unwrap_or_else(|| self.desktop.settings().nearby_range);
        let rect = self.clip(self.rect.grow(range, range))?;
        Ok(self.derive(rect))
    }

    /// Band of height `n` directly above; `None` reaches the screen edge.
    pub fn above(&self, n: Option<i32>) -> Result<Region> {
        let screen = self.screen_rect()?;
        let h = n.unwrap_or(self.rect.y.saturating_sub(screen.y));
        let rect = Rect::new(self.rect.x, self.rect.y.saturating_sub(h), self.rect.w, h);
        Ok(self.derive(self.clip(rect)?))
    }

    pub fn below(&self, n: Option<i32>) -> Result<Region> {
        let screen = self.screen_rect()?;
        let h = n.unwrap_or(screen.bottom().saturating_sub(self.rect.bottom()));
        let rect = Rect::new(self.rect.x, self.rect.bottom(), self.rect.w, h);
        Ok(self.derive(self.clip(rect)?))
    }

    pub fn left(&self, n: Option<i32>) -> Result<Region> {
        let screen = self.screen_rect()?;
        let w = n.unwrap_or(self.rect.x.saturating_sub(screen.x));
        let rect = Rect::new(self.rect.x.saturating_sub(w), self.rect.y, w, self.rect.h);
        Ok(self.derive(self.clip(rect)?))
    }

    pub fn right(&self, n: Option<i32>) -> Result<Region> {
        let screen = self.screen_rect()?;
        let w = n.unwrap_or(screen.right().saturating_sub(self.rect.right()));
        let rect = Rect::new(self.rect.right(), self.rect.y, w, self.rect.h);
        Ok(self.derive(self.clip(rect)?))
    }

    /// A named or coded part of this region. The region's own raster is untouched.
    pub fn get(&self, part: RegionPart) -> Result<Region> {
        self.require_valid("get")?;
        Ok(self.derive(part.area_of(&self.rect)?))
    }

    // --- raster ---------------------------------------------------------

    pub fn set_raster(&mut self, rows: u32, cols: u32) -> Result<()> {
        self.raster = Raster::new(rows, cols)?;
        Ok(())
    }

    pub fn set_rows(&mut self, rows: u32) -> Result<()> {
        self.raster.set_rows(rows)
    }

    pub fn set_cols(&mut self, cols: u32) -> Result<()> {
        self.raster.set_cols(cols)
    }

    pub fn rows(&self) -> u32 {
        self.raster.rows()
    }

    pub fn cols(&self) -> u32 {
        self.raster.cols()
    }

    pub fn row_h(&self) -> i32 {
        self.raster.row_h(&self.rect)
    }

    pub fn col_w(&self) -> i32 {
        self.raster.col_w(&self.rect)
    }

    pub fn is_raster_valid(&self) -> bool {
        self.raster.is_valid()
    }

    /// Row `row`; `rows` reconfigures the row count first.
    pub fn get_row(&mut self, row: u32, rows: Option<u32>) -> Result<Region> {
        if let Some(rows) = rows {
            self.set_rows(rows)?;
        }
        self.require_valid("get_row")?;
        Ok(self.derive(self.raster.row(&self.rect, row)?))
    }

    pub fn get_col(&mut self, col: u32, cols: Option<u32>) -> Result<Region> {
        if let Some(cols) = cols {
            self.set_cols(cols)?;
        }
        self.require_valid("get_col")?;
        Ok(self.derive(self.raster.col(&self.rect, col)?))
    }

    pub fn get_cell(&self, row: u32, col: u32) -> Result<Region> {
        self.require_valid("get_cell")?;
        Ok(self.derive(self.raster.cell(&self.rect, row, col)?))
    }

    // --- settings -------------------------------------------------------

    pub fn auto_wait_timeout(&self) -> f64 {
        self.auto_wait_timeout
    }

    pub fn set_auto_wait_timeout(&mut self, secs: f64) -> Result<()> {
        validate_timeout(secs)?;
        self.auto_wait_timeout = secs;
        Ok(())
    }

    pub fn wait_scan_rate(&self) -> f64 {
        self.wait_scan_rate
    }

    pub fn set_wait_scan_rate(&mut self, rate: f64) -> Result<()> {
        validate_scan_rate(rate)?;
        self.wait_scan_rate = rate;
        Ok(())
    }

    // --- results --------------------------------------------------------

    pub fn last_match(&self) -> Option<&Match> {
        self.last_match.as_ref()
    }

    pub fn last_matches(&self) -> &[Match] {
        &self.last_matches
    }

    /// Duration of the most recent search call.
    pub fn last_search_time(&self) -> Duration {
        self.last_search_time
    }

    /// Take over the search results of a clone that ran a search.
    pub(crate) fn adopt_results(&mut self, from: &Region) {
        self.last_match = from.last_match.clone();
        self.last_matches = from.last_matches.clone();
        self.last_search_time = from.last_search_time;
    }
}

/// Regions compare by geometry only.
impl PartialEq for Region {
    fn eq(&self, other: &Self) -> bool {
        self.rect == other.rect
    }
}

impl fmt::Debug for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Region")
            .field("rect", &self.rect)
            .field("auto_wait_timeout", &self.auto_wait_timeout)
            .field("wait_scan_rate", &self.wait_scan_rate)
            .field("find_failed", &self.find_failed)
            .field("raster", &self.raster)
            .finish()
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.rect.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use crate::platform::StubPlatform;

    fn desktop() -> Desktop {
        Desktop::new(Arc::new(StubPlatform::with_screens(vec![
            Rect::new(0, 0, 1000, 800),
            Rect::new(1000, 0, 500, 400),
        ])))
    }

    #[test]
    fn test_directional_bands() {
        let d = desktop();
        let r = d.region(100, 100, 50, 40);
        assert_eq!(r.above(Some(10)).unwrap().rect(), Rect::new(100, 90, 50, 10));
        assert_eq!(r.below(Some(16)).unwrap().rect(), Rect::new(100, 140, 50, 16));
        assert_eq!(r.left(Some(7)).unwrap().rect(), Rect::new(93, 100, 7, 40));
        assert_eq!(r.right(Some(5)).unwrap().rect(), Rect::new(150, 100, 5, 40));
    }

    #[test]
    fn test_bands_default_to_screen_edge() {
        let d = desktop();
        let r = d.region(100, 100, 50, 40);
        assert_eq!(r.above(None).unwrap().rect(), Rect::new(100, 0, 50, 100));
        assert_eq!(r.below(None).unwrap().rect(), Rect::new(100, 140, 50, 660));
        assert_eq!(r.left(None).unwrap().rect(), Rect::new(0, 100, 100, 40));
        assert_eq!(r.right(None).unwrap().rect(), Rect::new(150, 100, 850, 40));
        // bands are clipped to the owning screen
        assert_eq!(r.above(Some(500)).unwrap().rect(), Rect::new(100, 0, 50, 100));
    }

    #[test]
    fn test_grow_and_nearby() {
        let d = desktop();
        let r = d.region(10, 10, 20, 20);
        assert_eq!(r.grow(10, None).rect(), Rect::new(0, 0, 40, 40));
        assert_eq!(r.grow(10, Some(5)).rect(), Rect::new(0, 5, 40, 30));
        assert_eq!(r.nearby(Some(50)).unwrap().rect(), Rect::new(0, 0, 80, 80));
        assert_eq!(r.nearby(None).unwrap().rect(), Rect::new(0, 0, 80, 80));
    }

    #[test]
    fn test_offset_outside_every_screen_fails() {
        let d = desktop();
        let r = d.region(10, 10, 20, 20);
        assert_eq!(r.offset(5, 5).unwrap().rect(), Rect::new(15, 15, 20, 20));
        assert!(r.offset(-25, -25).is_ok());
        assert!(matches!(r.offset(-1000, -1000), Err(Error::Range(_))));
        assert!(matches!(r.offset(i32::MAX, 0), Err(Error::Range(_))));
        assert!(matches!(r.offset(0, i32::MIN), Err(Error::Range(_))));
    }

    #[test]
    fn test_derived_regions_inherit_settings() {
        let d = desktop();
        let mut r = d.region(0, 0, 100, 100);
        r.set_auto_wait_timeout(10.0).unwrap();
        r.set_wait_scan_rate(2.0).unwrap();
        r.set_find_failed_response(FindFailedResponse::Skip);
        let child = r.get(RegionPart::NORTH).unwrap();
        assert_eq!(child.auto_wait_timeout(), 10.0);
        assert_eq!(child.wait_scan_rate(), 2.0);
        assert!(matches!(child.find_failed_response(), FindFailedResponse::Skip));
        assert!(r.set_wait_scan_rate(0.0).is_err());
        assert!(r.set_auto_wait_timeout(-1.0).is_err());
    }

    #[test]
    fn test_raster_cells() {
        let d = desktop();
        let mut r = d.region(0, 0, 100, 100);
        assert!(!r.is_raster_valid());
        r.set_raster(2, 2).unwrap();
        assert!(r.is_raster_valid());
        assert_eq!(r.get_cell(0, 0).unwrap(), d.region(0, 0, 50, 50));
        assert_eq!(r.get_cell(1, 1).unwrap(), d.region(50, 50, 50, 50));
        assert!(matches!(r.get_cell(2, 0), Err(Error::Range(_))));
        assert_eq!(r.get_row(1, Some(4)).unwrap().rect(), Rect::new(0, 25, 100, 25));
        assert_eq!((r.rows(), r.cols(), r.row_h(), r.col_w()), (4, 2, 25, 50));
    }

    #[test]
    fn test_get_does_not_touch_raster() {
        let d = desktop();
        let r = d.region(0, 0, 100, 100);
        r.get(RegionPart::from_code(522).unwrap()).unwrap();
        assert!(!r.is_raster_valid());
    }

    #[test]
    fn test_changers() {
        let d = desktop();
        let mut r = d.region(0, 0, 100, 100);
        r.set_location(Location::new(10, 10));
        assert_eq!(r.top_left(), Location::new(10, 10));
        r.set_roi(Rect::new(5, 5, 10, 10));
        let mut other = d.region(0, 0, 1, 1);
        other.morph_to(&r);
        assert_eq!(other.top_right(), Location::new(15, 5));
        assert_eq!(other.bottom_left(), Location::new(5, 15));
        assert_eq!(other.bottom_right(), Location::new(15, 15));
        other.add(5, 5, 5, 5);
        assert_eq!(other.top_left(), Location::new(0, 0));
        assert_eq!(other.rect(), Rect::new(0, 0, 20, 20));
    }

    #[test]
    fn test_extreme_margins_saturate() {
        let d = desktop();
        let mut r = d.region(10, 10, 20, 20);
        r.add(i32::MAX, i32::MAX, 0, 0);
        assert_eq!(r.rect(), Rect::new(i32::MIN + 11, 10, i32::MAX, 20));
        let grown = d.region(10, 10, 20, 20).grow(i32::MAX, Some(0));
        assert_eq!(grown.rect().w, i32::MAX);
        assert!(d.region(10, 10, 20, 20).above(Some(i32::MAX)).is_ok());
    }

    #[test]
    fn test_containment() {
        let d = desktop();
        let screen = d.region(0, 0, 1000, 800);
        assert!(!screen.contains(Location::new(-5, -5)));
        assert!(!screen.contains_region(&d.region(-10, -10, 5, 5)));
        assert!(screen.contains_region(&d.region(10, 10, 5, 5)));
    }

    #[test]
    fn test_owning_screen_and_copy_to() {
        let d = desktop();
        let r = d.region(1100, 50, 10, 10);
        assert_eq!(r.screen().unwrap().id(), 1);
        let moved = r.copy_to(&d.screen(0).unwrap()).unwrap();
        assert_eq!(moved.rect(), Rect::new(100, 50, 10, 10));

        // top-left off every screen: owner is the screen with the overlap
        let straddle = d.region(-5, 10, 10, 10);
        assert_eq!(straddle.screen().unwrap().id(), 0);
        assert_eq!(straddle.clip_to_screen().unwrap().rect(), Rect::new(0, 10, 5, 10));
    }

    #[test]
    fn test_create() {
        let d = desktop();
        let loc = Location::new(10, 10);
        assert_eq!(Region::create(&d, loc, 5, 5).rect(), Rect::new(10, 10, 5, 5));
        let r = Region::create_directed(&d, loc, HorizontalDir::Left, VerticalDir::Top, 10, 10);
        assert_eq!(r.rect(), Rect::new(0, 0, 10, 10));
        let r = Region::create_directed(&d, loc, HorizontalDir::Middle, VerticalDir::Bottom, 10, 10);
        assert_eq!(r.rect(), Rect::new(5, 10, 10, 10));
    }
}
