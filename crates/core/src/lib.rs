//! # glimpse-core
//!
//! Screen automation engine: locate images on the desktop and react to what
//! shows up there.
//!
//! - [`geometry`], [`raster`]: locations, rectangles and region grids
//! - [`region`], [`screen`]: screen areas carrying search settings
//! - [`pattern`], [`matching`]: templates and the pluggable matcher
//! - [`search`]: find / wait / exists with the FindFailed policy
//! - [`observer`], [`event`], [`change`]: APPEAR, VANISH and CHANGE watching
//! - [`input`]: mouse and keyboard actions aimed at regions and matches
//! - [`platform`]: capture/input contract and the virtual desktop
//! - [`lua_rt`]: the Lua scripting surface
//!
//! Everything starts from a [`Desktop`]:
//!
//! ```no_run
//! use std::sync::Arc;
//! use glimpse_core::{Desktop, Pattern, platform::StubPlatform};
//!
//! let desktop = Desktop::new(Arc::new(StubPlatform::new()));
//! let mut screen = desktop.primary_screen()?;
//! let button = Pattern::from_path("ok.png")?.similar(0.9);
//! if screen.exists(&button, Some(2.0))?.is_some() {
//!     screen.click(&button)?;
//! }
//! # Ok::<(), glimpse_core::Error>(())
//! ```

pub mod change;
pub mod desktop;
pub mod error;
pub mod event;
pub mod geometry;
pub mod input;
pub mod logger;
pub mod lua_rt;
pub mod matching;
pub mod observer;
pub mod pattern;
pub mod platform;
pub mod raster;
pub mod region;
pub mod screen;
pub mod search;
pub mod settings;
pub mod sleep;
pub mod types;

pub use desktop::{Desktop, DesktopBuilder};
pub use error::{Error, Result};
pub use event::{EventKind, ObserveEvent};
pub use geometry::{Location, Rect};
pub use input::Target;
pub use lua_rt::LuaScript;
pub use matching::{Hit, Match, Matcher, PixelMatcher};
pub use observer::{EVENT_LOG_CAP, ObserverHandler};
pub use pattern::Pattern;
pub use raster::{Raster, RegionPart};
pub use region::{HorizontalDir, Region, VerticalDir};
pub use screen::Screen;
pub use search::{FindFailedPrompt, FindFailedResponse, PromptChoice};
pub use settings::Settings;
pub use types::MouseButton;
