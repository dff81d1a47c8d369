//! Search templates.
//!
//! A [`Pattern`] is immutable: `similar`, `exact` and `target_offset` return
//! a new value that shares the loaded bitmap with the receiver.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::RgbaImage;

use crate::error::{Error, Result};
use crate::geometry::Location;

pub const DEFAULT_SIMILARITY: f64 = 0.7;

#[derive(Debug)]
struct PatternImage {
    bitmap: RgbaImage,
    path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct Pattern {
    image: Arc<PatternImage>,
    similarity: f64,
    offset: Location,
}

impl Pattern {
    /// Load the template from an image file.
    ///
    /// Fails with [`Error::ImageMissing`] when `path` does not name a file,
    /// and with [`Error::ImageLoad`] when it cannot be decoded.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(Error::ImageMissing(path.to_path_buf()));
        }
        let bitmap = image::open(path)
            .map_err(|source| Error::ImageLoad { path: path.to_path_buf(), source })?
            .to_rgba8();
        Ok(Self::build(bitmap, Some(path.to_path_buf())))
    }

    /// Use an in-memory bitmap, e.g. a region capture, as the template.
    pub fn from_image(bitmap: RgbaImage) -> Self {
        Self::build(bitmap, None)
    }

    fn build(bitmap: RgbaImage, path: Option<PathBuf>) -> Self {
        Self {
            image: Arc::new(PatternImage { bitmap, path }),
            similarity: DEFAULT_SIMILARITY,
            offset: Location::default(),
        }
    }

    /// Copy with a different minimum score, clamped to `[0, 1]`.
    pub fn similar(&self, similarity: f64) -> Pattern {
        let similarity = if similarity.is_nan() {
            DEFAULT_SIMILARITY
        } else {
            similarity.clamp(0.0, 1.0)
        };
        Pattern { similarity, ..self.clone() }
    }

    pub fn exact(&self) -> Pattern {
        self.similar(1.0)
    }

    /// Copy whose click point is shifted by `(dx, dy)` from the match's top-left.
    pub fn target_offset(&self, dx: i32, dy: i32) -> Pattern {
        Pattern { offset: Location::new(dx, dy), ..self.clone() }
    }

    pub fn similarity(&self) -> f64 {
        self.similarity
    }

    pub fn offset(&self) -> Location {
        self.offset
    }

    pub fn filename(&self) -> Option<&Path> {
        self.image.path.as_deref()
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image.bitmap
    }

    pub fn size(&self) -> (u32, u32) {
        self.image.bitmap.dimensions()
    }

    /// Built from an in-memory bitmap rather than a file.
    pub fn is_image_pattern(&self) -> bool {
        self.image.path.is_none()
    }

    pub fn is_valid(&self) -> bool {
        let (w, h) = self.size();
        w > 0 && h > 0
    }

    /// Both patterns reference the same loaded bitmap.
    pub fn shares_image(&self, other: &Pattern) -> bool {
        Arc::ptr_eq(&self.image, &other.image)
    }
}

impl From<RgbaImage> for Pattern {
    fn from(bitmap: RgbaImage) -> Self {
        Pattern::from_image(bitmap)
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.filename() {
            Some(path) => write!(f, "Pattern(\"{}\"", path.display())?,
            None => {
                let (w, h) = self.size();
                write!(f, "Pattern(<image {}x{}>", w, h)?
            }
        }
        write!(f, ").similar({:.2})", self.similarity)?;
        if self.offset != Location::default() {
            write!(f, ".targetOffset({},{})", self.offset.x, self.offset.y)?;
        }
        Ok(())
    }
}
