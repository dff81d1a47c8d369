use std::ops::{Deref, DerefMut};

use image::RgbaImage;

use crate::desktop::Desktop;
use crate::error::{Error, Result};
use crate::geometry::Rect;
use crate::region::Region;

/// A physical monitor: a [`Region`] covering its bounds plus a stable id.
///
/// The region part may be moved or resized like any other region; `bounds()`
/// always reports the monitor itself.
#[derive(Clone, Debug)]
pub struct Screen {
    id: usize,
    bounds: Rect,
    region: Region,
}

impl Screen {
    pub fn new(desktop: &Desktop, id: usize) -> Result<Self> {
        let screens = desktop.screen_bounds()?;
        let bounds = *screens.get(id).ok_or_else(|| {
            Error::Range(format!("screen {} does not exist ({} screen(s))", id, screens.len()))
        })?;
        Ok(Self { id, bounds, region: Region::new(desktop, bounds) })
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn bounds(&self) -> Rect {
        self.bounds
    }

    pub fn number_screens(&self) -> Result<usize> {
        self.region.desktop().number_screens()
    }

    /// Bitmap of the screen's current region.
    pub fn capture(&self) -> Result<RgbaImage> {
        self.region.capture()
    }

    pub fn into_region(self) -> Region {
        self.region
    }
}

impl Deref for Screen {
    type Target = Region;

    fn deref(&self) -> &Region {
        &self.region
    }
}

impl DerefMut for Screen {
    fn deref_mut(&mut self) -> &mut Region {
        &mut self.region
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use crate::platform::StubPlatform;

    #[test]
    fn test_screen_info() {
        let desktop = Desktop::new(Arc::new(StubPlatform::new()));
        let screen = desktop.screen(0).unwrap();
        assert!(screen.number_screens().unwrap() > 0);
        let (x, y, w, h) = screen.bounds().tuple();
        assert_eq!((x, y), (0, 0));
        assert!(w > 0 && h > 0);
        assert_eq!(screen.capture().unwrap().dimensions(), (w as u32, h as u32));
    }

    #[test]
    fn test_region_can_move_but_bounds_stay() {
        let desktop = Desktop::new(Arc::new(StubPlatform::new()));
        let mut screen = desktop.screen(0).unwrap();
        screen.set_roi(Rect::new(5, 5, 10, 10));
        assert_eq!(screen.rect(), Rect::new(5, 5, 10, 10));
        assert_eq!(screen.bounds(), Rect::new(0, 0, 1920, 1080));
    }
}
