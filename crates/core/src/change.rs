//! Pixel-level change detection between two captures of the same area.

use std::collections::VecDeque;

use image::RgbaImage;

use crate::geometry::{Location, Rect};

/// Side of the square cells changed pixels are bucketed into.
pub const CELL: u32 = 8;

fn pixel_changed(a: &image::Rgba<u8>, b: &image::Rgba<u8>, tolerance: u8) -> bool {
    (0..3).any(|c| a[c].abs_diff(b[c]) > tolerance)
}

/// Number of pixels whose largest channel difference exceeds `tolerance`.
/// Captures of different sizes count every pixel of `current` as changed.
pub fn changed_pixels(previous: &RgbaImage, current: &RgbaImage, tolerance: u8) -> u32 {
    if previous.dimensions() != current.dimensions() {
        return current.width() * current.height();
    }
    previous
        .pixels()
        .zip(current.pixels())
        .filter(|(a, b)| pixel_changed(a, b, tolerance))
        .count() as u32
}

/// Areas that changed between `previous` and `current`, in screen coordinates
/// (`origin` is the captures' top-left). Empty when fewer than `min_changed`
/// pixels differ.
///
/// Changed pixels mark their 8x8 cell; every 4-connected group of marked cells
/// is reported as one bounding rectangle.
pub fn changed_areas(
    previous: &RgbaImage,
    current: &RgbaImage,
    origin: Location,
    tolerance: u8,
    min_changed: u32,
) -> Vec<Rect> {
    let (w, h) = current.dimensions();
    if previous.dimensions() != current.dimensions() {
        return if w > 0 && h > 0 && w * h >= min_changed {
            vec![Rect::new(origin.x, origin.y, w as i32, h as i32)]
        } else {
            Vec::new()
        };
    }

    let cols = w.div_ceil(CELL) as usize;
    let rows = h.div_ceil(CELL) as usize;
    let mut marked = vec![false; cols * rows];
    let mut count = 0u32;
    for (x, y, px) in current.enumerate_pixels() {
        if pixel_changed(previous.get_pixel(x, y), px, tolerance) {
            count += 1;
            marked[(y / CELL) as usize * cols + (x / CELL) as usize] = true;
        }
    }
    if count == 0 || count < min_changed {
        return Vec::new();
    }

    let mut seen = vec![false; cols * rows];
    let mut areas = Vec::new();
    for start in 0..marked.len() {
        if !marked[start] || seen[start] {
            continue;
        }
        seen[start] = true;
        let mut queue = VecDeque::from([start]);
        let (mut c0, mut r0, mut c1, mut r1) = (cols, rows, 0, 0);
        while let Some(i) = queue.pop_front() {
            let (c, r) = (i % cols, i / cols);
            c0 = c0.min(c);
            r0 = r0.min(r);
            c1 = c1.max(c);
            r1 = r1.max(r);

            let mut neighbours = Vec::with_capacity(4);
            if c > 0 {
                neighbours.push(i - 1);
            }
            if c + 1 < cols {
                neighbours.push(i + 1);
            }
            if r > 0 {
                neighbours.push(i - cols);
            }
            if r + 1 < rows {
                neighbours.push(i + cols);
            }
            for n in neighbours {
                if marked[n] && !seen[n] {
                    seen[n] = true;
                    queue.push_back(n);
                }
            }
        }

        let x = c0 as u32 * CELL;
        let y = r0 as u32 * CELL;
        let right = ((c1 as u32 + 1) * CELL).min(w);
        let bottom = ((r1 as u32 + 1) * CELL).min(h);
        areas.push(Rect::new(
            origin.x + x as i32,
            origin.y + y as i32,
            (right - x) as i32,
            (bottom - y) as i32,
        ));
    }
    areas
}
