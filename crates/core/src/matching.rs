//! Search results and the image-matching primitive.
//!
//! The engine treats the matcher as a pure scoring function; [`PixelMatcher`]
//! is the built-in default and can be swapped for any [`Matcher`].

use std::fmt;

use image::RgbaImage;

use crate::geometry::{Location, Rect};
use crate::pattern::Pattern;

/// A placement of a template inside a bitmap, in bitmap-local pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit {
    pub x: u32,
    pub y: u32,
    pub score: f64,
}

pub trait Matcher: Send + Sync {
    /// Best placement of `needle` in `haystack` scoring at least `min_score`.
    fn find(&self, haystack: &RgbaImage, needle: &RgbaImage, min_score: f64) -> Option<Hit>;

    /// Every non-overlapping placement scoring at least `min_score`, best first.
    fn find_all(&self, haystack: &RgbaImage, needle: &RgbaImage, min_score: f64) -> Vec<Hit>;
}

/// Scores a placement as `1 - mean absolute RGB difference / 255`.
///
/// Template pixels with alpha below 128 are ignored. A placement is abandoned
/// as soon as its running difference exceeds what `min_score` allows.
#[derive(Debug, Clone, Copy, Default)]
pub struct PixelMatcher;

impl PixelMatcher {
    fn opaque_channels(needle: &RgbaImage) -> u64 {
        needle.pixels().filter(|p| p[3] >= 128).count() as u64 * 3
    }

    /// Summed channel difference at `(x, y)`, or `None` once it exceeds `budget`.
    fn diff_at(haystack: &RgbaImage, needle: &RgbaImage, x: u32, y: u32, budget: u64) -> Option<u64> {
        let mut diff = 0u64;
        for ty in 0..needle.height() {
            for tx in 0..needle.width() {
                let np = needle.get_pixel(tx, ty);
                if np[3] < 128 {
                    continue;
                }
                let hp = haystack.get_pixel(x + tx, y + ty);
                for c in 0..3 {
                    diff += (hp[c] as i32 - np[c] as i32).unsigned_abs() as u64;
                }
            }
            if diff > budget {
                return None;
            }
        }
        Some(diff)
    }

    fn placements(haystack: &RgbaImage, needle: &RgbaImage) -> Option<(u32, u32)> {
        if needle.width() == 0
            || needle.height() == 0
            || needle.width() > haystack.width()
            || needle.height() > haystack.height()
        {
            return None;
        }
        Some((haystack.width() - needle.width(), haystack.height() - needle.height()))
    }

    fn budget(max_total: u64, min_score: f64) -> u64 {
        ((1.0 - min_score.clamp(0.0, 1.0)) * max_total as f64).floor() as u64
    }

    fn score(diff: u64, max_total: u64) -> f64 {
        1.0 - diff as f64 / max_total as f64
    }
}

impl Matcher for PixelMatcher {
    fn find(&self, haystack: &RgbaImage, needle: &RgbaImage, min_score: f64) -> Option<Hit> {
        let (max_x, max_y) = Self::placements(haystack, needle)?;
        let channels = Self::opaque_channels(needle);
        if channels == 0 {
            return None;
        }
        let max_total = channels * 255;
        let mut budget = Self::budget(max_total, min_score);
        let mut best: Option<(u32, u32, u64)> = None;

        for y in 0..=max_y {
            for x in 0..=max_x {
                let Some(diff) = Self::diff_at(haystack, needle, x, y, budget) else { continue };
                best = Some((x, y, diff));
                if diff == 0 {
                    return Some(Hit { x, y, score: 1.0 });
                }
                // only strictly better placements are of interest now
                budget = diff - 1;
            }
        }

        best.map(|(x, y, diff)| Hit { x, y, score: Self::score(diff, max_total) })
    }

    fn find_all(&self, haystack: &RgbaImage, needle: &RgbaImage, min_score: f64) -> Vec<Hit> {
        let Some((max_x, max_y)) = Self::placements(haystack, needle) else { return Vec::new() };
        let channels = Self::opaque_channels(needle);
        if channels == 0 {
            return Vec::new();
        }
        let max_total = channels * 255;
        let budget = Self::budget(max_total, min_score);

        let mut hits = Vec::new();
        for y in 0..=max_y {
            for x in 0..=max_x {
                if let Some(diff) = Self::diff_at(haystack, needle, x, y, budget) {
                    hits.push(Hit { x, y, score: Self::score(diff, max_total) });
                }
            }
        }
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));

        // Non-maximum suppression: keep a hit only if it overlaps no better one
        let (w, h) = (needle.width() as i32, needle.height() as i32);
        let mut kept: Vec<Hit> = Vec::new();
        for hit in hits {
            let rect = Rect::new(hit.x as i32, hit.y as i32, w, h);
            let overlaps = kept
                .iter()
                .any(|k| rect.intersects(&Rect::new(k.x as i32, k.y as i32, w, h)));
            if !overlaps {
                kept.push(hit);
            }
        }
        kept
    }
}

/// A successful search: the matched screen rectangle, the achieved score and
/// the anchor point for input actions (top-left plus the pattern's offset).
#[derive(Debug, Clone, PartialEq)]
pub struct Match {
    rect: Rect,
    score: f64,
    target: Location,
}

impl Match {
    pub fn new(rect: Rect, score: f64, target: Location) -> Self {
        Self { rect, score, target }
    }

    /// Translate a bitmap-local hit captured at `origin` back to screen space.
    pub(crate) fn from_hit(hit: Hit, origin: Location, pattern: &Pattern) -> Self {
        let (w, h) = pattern.size();
        let rect = Rect::new(origin.x + hit.x as i32, origin.y + hit.y as i32, w as i32, h as i32);
        let offset = pattern.offset();
        Self::new(rect, hit.score, rect.top_left().offset(offset.x, offset.y))
    }

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

    pub fn score(&self) -> f64 {
        self.score
    }

    pub fn target(&self) -> Location {
        self.target
    }

    pub fn center(&self) -> Location {
        self.rect.center()
    }

    pub fn top_left(&self) -> Location {
        self.rect.top_left()
    }

    pub fn bottom_right(&self) -> Location {
        self.rect.bottom_right()
    }

    pub fn contains(&self, loc: Location) -> bool {
        self.rect.contains(loc)
    }
}

impl fmt::Display for Match {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Match[{},{} {}x{}] score={:.2} target={}",
            self.rect.x, self.rect.y, self.rect.w, self.rect.h, self.score, self.target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn scene() -> (RgbaImage, RgbaImage) {
        let mut haystack = RgbaImage::from_pixel(40, 30, Rgba([0, 0, 0, 255]));
        let mut needle = RgbaImage::from_pixel(4, 3, Rgba([250, 250, 250, 255]));
        needle.put_pixel(1, 1, Rgba([0, 120, 0, 255]));
        for (x, y, p) in needle.enumerate_pixels() {
            haystack.put_pixel(12 + x, 7 + y, *p);
        }
        (haystack, needle)
    }

    #[test]
    fn test_exact_hit() {
        let (haystack, needle) = scene();
        let hit = PixelMatcher.find(&haystack, &needle, 1.0).unwrap();
        assert_eq!((hit.x, hit.y), (12, 7));
        assert_eq!(hit.score, 1.0);
    }

    #[test]
    fn test_threshold_rejects_poor_placements() {
        let (haystack, _) = scene();
        let other = RgbaImage::from_pixel(4, 3, Rgba([10, 200, 10, 255]));
        assert_eq!(PixelMatcher.find(&haystack, &other, 0.9), None);
    }

    #[test]
    fn test_partial_match_score() {
        let (mut haystack, needle) = scene();
        // damage one pixel: 3 channels * 250 difference out of 12 * 3 * 255
        haystack.put_pixel(12, 7, Rgba([0, 0, 0, 255]));
        let hit = PixelMatcher.find(&haystack, &needle, 0.7).unwrap();
        assert_eq!((hit.x, hit.y), (12, 7));
        assert!(hit.score < 1.0 && hit.score > 0.9);
        assert_eq!(PixelMatcher.find(&haystack, &needle, 1.0), None);
    }

    #[test]
    fn test_needle_larger_than_haystack() {
        let small = RgbaImage::new(2, 2);
        let big = RgbaImage::new(3, 3);
        assert_eq!(PixelMatcher.find(&small, &big, 0.0), None);
        assert!(PixelMatcher.find_all(&small, &big, 0.0).is_empty());
    }

    #[test]
    fn test_find_all_suppresses_overlaps() {
        let mut haystack = RgbaImage::from_pixel(30, 10, Rgba([0, 0, 0, 255]));
        let needle = RgbaImage::from_pixel(3, 3, Rgba([255, 0, 0, 255]));
        for x0 in [2u32, 20] {
            for (x, y, p) in needle.enumerate_pixels() {
                haystack.put_pixel(x0 + x, 4 + y, *p);
            }
        }
        let hits = PixelMatcher.find_all(&haystack, &needle, 0.95);
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|h| h.score == 1.0 && h.y == 4));
    }

    #[test]
    fn test_match_target_uses_pattern_offset() {
        let pattern = Pattern::from_image(RgbaImage::new(10, 8)).target_offset(3, -2);
        let m = Match::from_hit(Hit { x: 5, y: 6, score: 0.9 }, Location::new(100, 200), &pattern);
        assert_eq!(m.rect(), Rect::new(105, 206, 10, 8));
        assert_eq!(m.target(), Location::new(108, 204));
        assert_eq!(m.score(), 0.9);
    }
}
