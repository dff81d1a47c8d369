use std::fmt;

use serde::{Deserialize, Serialize};

/// A point in screen-absolute pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Location {
    pub x: i32,
    pub y: i32,
}

impl Location {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn tuple(&self) -> (i32, i32) {
        (self.x, self.y)
    }

    pub fn set_location(&mut self, x: i32, y: i32) {
        self.x = x;
        self.y = y;
    }

    pub fn offset(&self, dx: i32, dy: i32) -> Location {
        Location::new(self.x.saturating_add(dx), self.y.saturating_add(dy))
    }

    pub fn above(&self, dy: i32) -> Location {
        self.offset(0, dy.saturating_neg())
    }

    pub fn below(&self, dy: i32) -> Location {
        self.offset(0, dy)
    }

    pub fn left(&self, dx: i32) -> Location {
        self.offset(dx.saturating_neg(), 0)
    }

    pub fn right(&self, dx: i32) -> Location {
        self.offset(dx, 0)
    }
}

impl From<(i32, i32)> for Location {
    fn from((x, y): (i32, i32)) -> Self {
        Location::new(x, y)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})", self.x, self.y)
    }
}

/// Plain rectangle: top-left corner plus size. Carries no settings.
///
/// A point is inside iff `x ∈ [self.x, self.x + w)` and `y ∈ [self.y, self.y + h)`.
/// Arithmetic saturates at the `i32` limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, w: i32, h: i32) -> Self {
        Self { x, y, w, h }
    }

    pub fn tuple(&self) -> (i32, i32, i32, i32) {
        (self.x, self.y, self.w, self.h)
    }

    pub fn is_valid(&self) -> bool {
        self.w > 0 && self.h > 0
    }

    pub fn right(&self) -> i32 {
        self.x.saturating_add(self.w)
    }

    pub fn bottom(&self) -> i32 {
        self.y.saturating_add(self.h)
    }

    pub fn area(&self) -> i64 {
        if self.is_valid() {
            self.w as i64 * self.h as i64
        } else {
            0
        }
    }

    pub fn top_left(&self) -> Location {
        Location::new(self.x, self.y)
    }

    pub fn top_right(&self) -> Location {
        Location::new(self.right(), self.y)
    }

    pub fn bottom_left(&self) -> Location {
        Location::new(self.x, self.bottom())
    }

    pub fn bottom_right(&self) -> Location {
        Location::new(self.right(), self.bottom())
    }

    pub fn center(&self) -> Location {
        Location::new(self.x.saturating_add(self.w / 2), self.y.saturating_add(self.h / 2))
    }

    pub fn contains(&self, loc: Location) -> bool {
        loc.x >= self.x && loc.x < self.right() && loc.y >= self.y && loc.y < self.bottom()
    }

    /// True when every corner pixel of `other` lies inside `self`.
    pub fn contains_rect(&self, other: &Rect) -> bool {
        other.is_valid()
            && self.contains(other.top_left())
            && self.contains(Location::new(other.right() - 1, other.y))
            && self.contains(Location::new(other.x, other.bottom() - 1))
            && self.contains(Location::new(other.right() - 1, other.bottom() - 1))
    }

    pub fn offset(&self, dx: i32, dy: i32) -> Rect {
        Rect::new(self.x.saturating_add(dx), self.y.saturating_add(dy), self.w, self.h)
    }

    /// Expand by `dw` on the left and right and `dh` on the top and bottom.
    pub fn grow(&self, dw: i32, dh: i32) -> Rect {
        Rect::new(
            self.x.saturating_sub(dw),
            self.y.saturating_sub(dh),
            self.w.saturating_add(dw.saturating_mul(2)),
            self.h.saturating_add(dh.saturating_mul(2)),
        )
    }

    pub fn intersection(&self, other: &Rect) -> Option<Rect> {
        let x = self.x.max(other.x);
        let y = self.y.max(other.y);
        let r = self.right().min(other.right());
        let b = self.bottom().min(other.bottom());
        let rect = Rect::new(x, y, r.saturating_sub(x), b.saturating_sub(y));
        rect.is_valid().then_some(rect)
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        self.intersection(other).is_some()
    }

    pub fn union(&self, other: &Rect) -> Rect {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        let r = self.right().max(other.right());
        let b = self.bottom().max(other.bottom());
        Rect::new(x, y, r.saturating_sub(x), b.saturating_sub(y))
    }
}

impl From<(i32, i32, i32, i32)> for Rect {
    fn from((x, y, w, h): (i32, i32, i32, i32)) -> Self {
        Rect::new(x, y, w, h)
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R[{},{} {}x{}]", self.x, self.y, self.w, self.h)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_offsets() {
        let loc = Location::new(10, 11);
        assert_eq!(loc.offset(3, -5), Location::new(13, 6));
        assert_eq!(loc.above(10).tuple(), (10, 1));
        assert_eq!(loc.below(16).tuple(), (10, 27));
        assert_eq!(loc.right(5).tuple(), (15, 11));
        assert_eq!(loc.left(7).tuple(), (3, 11));
        assert_eq!(loc.to_string(), "(10,11)");
    }

    #[test]
    fn test_set_location() {
        let mut loc = Location::new(10, 11);
        loc.set_location(-3, 1009);
        assert_eq!(loc.tuple(), (-3, 1009));
    }

    #[test]
    fn test_contains_is_half_open() {
        let r = Rect::new(0, 0, 10, 10);
        assert!(r.contains(Location::new(0, 0)));
        assert!(r.contains(Location::new(9, 9)));
        assert!(!r.contains(Location::new(10, 5)));
        assert!(!r.contains(Location::new(-1, 5)));
    }

    #[test]
    fn test_contains_rect() {
        let r = Rect::new(0, 0, 100, 100);
        assert!(r.contains_rect(&r));
        assert!(r.contains_rect(&Rect::new(10, 10, 5, 5)));
        assert!(!r.contains_rect(&Rect::new(-10, -10, 5, 5)));
        assert!(!r.contains_rect(&Rect::new(95, 95, 10, 10)));
    }

    #[test]
    fn test_intersection_and_union() {
        let a = Rect::new(0, 0, 10, 10);
        let b = Rect::new(5, 5, 10, 10);
        assert_eq!(a.intersection(&b), Some(Rect::new(5, 5, 5, 5)));
        assert_eq!(a.union(&b), Rect::new(0, 0, 15, 15));
        assert_eq!(a.intersection(&Rect::new(10, 0, 5, 5)), None);
    }

    #[test]
    fn test_grow_is_symmetric() {
        let r = Rect::new(10, 10, 20, 20).grow(5, 2);
        assert_eq!(r, Rect::new(5, 8, 30, 24));
        assert_eq!(r.center(), Location::new(20, 20));
    }

    #[test]
    fn test_arithmetic_saturates_at_i32_limits() {
        let r = Rect::new(10, 10, 50, 50);
        assert_eq!(r.offset(i32::MAX, 0), Rect::new(i32::MAX, 10, 50, 50));
        assert_eq!(r.offset(i32::MAX, 0).right(), i32::MAX);
        assert_eq!(r.offset(0, i32::MIN).y, i32::MIN + 10);
        assert_eq!(r.grow(i32::MAX, 0), Rect::new(i32::MIN + 11, 10, i32::MAX, 50));
        assert_eq!(Location::new(1, 1).above(i32::MIN), Location::new(1, i32::MAX));
        assert_eq!(Location::new(i32::MAX, 0).right(1).x, i32::MAX);
        let huge = Rect::new(i32::MIN, i32::MIN, i32::MAX, i32::MAX);
        assert_eq!(huge.union(&Rect::new(0, 0, i32::MAX, i32::MAX)).w, i32::MAX);
    }
}
