use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Local};
use image::RgbaImage;

use crate::error::{Error, Result};
use crate::geometry::Rect;
use crate::matching::Match;
use crate::pattern::Pattern;
use crate::region::Region;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Generic,
    Appear,
    Vanish,
    Change,
}

impl EventKind {
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::Generic => "GENERIC",
            EventKind::Appear => "APPEAR",
            EventKind::Vanish => "VANISH",
            EventKind::Change => "CHANGE",
        }
    }
}

impl FromStr for EventKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "GENERIC" => Ok(EventKind::Generic),
            "APPEAR" => Ok(EventKind::Appear),
            "VANISH" => Ok(EventKind::Vanish),
            "CHANGE" => Ok(EventKind::Change),
            other => Err(Error::Type(format!("unknown event type '{}'", other))),
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What an observer saw on one tick.
///
/// Payload accessors fail with [`Error::Type`] when asked for something the
/// event's kind never carries (the match of a CHANGE event, anything of a
/// GENERIC event).
#[derive(Debug, Clone)]
pub struct ObserveEvent {
    kind: EventKind,
    region: Region,
    pattern: Option<Pattern>,
    found: Option<Match>,
    changes: Vec<Rect>,
    time: DateTime<Local>,
}

impl ObserveEvent {
    /// An event without payload, for calling code and handler tests.
    pub fn new(region: &Region, kind: EventKind) -> Self {
        Self {
            kind,
            region: region.event_view(),
            pattern: None,
            found: None,
            changes: Vec::new(),
            time: Local::now(),
        }
    }

    pub(crate) fn pattern_event(kind: EventKind, region: &Region, pattern: Pattern, found: Option<Match>) -> Self {
        Self { pattern: Some(pattern), found, ..Self::new(region, kind) }
    }

    pub(crate) fn change_event(region: &Region, changes: Vec<Rect>) -> Self {
        Self { changes, ..Self::new(region, EventKind::Change) }
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn is_generic(&self) -> bool {
        self.kind == EventKind::Generic
    }

    pub fn is_appear(&self) -> bool {
        self.kind == EventKind::Appear
    }

    pub fn is_vanish(&self) -> bool {
        self.kind == EventKind::Vanish
    }

    pub fn is_change(&self) -> bool {
        self.kind == EventKind::Change
    }

    /// The observed region. Stopping its observer from a handler ends the loop.
    pub fn region(&self) -> &Region {
        &self.region
    }

    /// When the tick that produced this event ran.
    pub fn time(&self) -> DateTime<Local> {
        self.time
    }

    fn require(&self, what: &str, kinds: &[EventKind]) -> Result<()> {
        if !kinds.contains(&self.kind) {
            return Err(Error::Type(format!("{} event has no {}", self.kind, what)));
        }
        Ok(())
    }

    pub fn pattern(&self) -> Result<Option<&Pattern>> {
        self.require("pattern", &[EventKind::Appear, EventKind::Vanish])?;
        Ok(self.pattern.as_ref())
    }

    /// The pattern's image.
    pub fn image(&self) -> Result<Option<&RgbaImage>> {
        self.require("image", &[EventKind::Appear, EventKind::Vanish])?;
        Ok(self.pattern.as_ref().map(|p| p.image()))
    }

    /// The match that appeared, or the last one seen before vanishing.
    pub fn matched(&self) -> Result<Option<&Match>> {
        self.require("match", &[EventKind::Appear, EventKind::Vanish])?;
        Ok(self.found.as_ref())
    }

    /// Changed areas in screen coordinates.
    pub fn changes(&self) -> Result<&[Rect]> {
        self.require("changes", &[EventKind::Change])?;
        Ok(&self.changes)
    }
}
