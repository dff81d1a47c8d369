//! Error types for glimpse-core

use std::path::PathBuf;
use thiserror::Error;

use crate::geometry::Rect;

/// Main error type for region, pattern, search and observer operations
#[derive(Error, Debug)]
pub enum Error {
    /// Wrong argument type or arity, or an event accessor that does not
    /// apply to the event's kind.
    #[error("type error: {0}")]
    Type(String),

    #[error("image missing: {}", .0.display())]
    ImageMissing(PathBuf),

    #[error("failed to load image {}: {source}", path.display())]
    ImageLoad {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// Geometry result outside every screen, bad raster index, unknown screen.
    #[error("out of range: {0}")]
    Range(String),

    #[error("invalid setting: {0}")]
    InvalidSetting(String),

    #[error("FindFailed: {pattern} not found in {region}")]
    FindFailed { pattern: String, region: Rect },

    #[error("observer already running for region {0}")]
    ObserverActive(Rect),

    #[error("platform error: {0}")]
    Platform(String),

    /// A script callback (FindFailed handler) failed.
    #[error("script error: {0}")]
    Script(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
}

impl Error {
    pub fn is_find_failed(&self) -> bool {
        matches!(self, Error::FindFailed { .. })
    }
}

/// Result type alias for glimpse operations
pub type Result<T> = std::result::Result<T, Error>;
