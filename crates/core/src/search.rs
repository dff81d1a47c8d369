//! Bounded-wait searching and the FindFailed policy.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use image::RgbaImage;

use crate::error::{Error, Result};
use crate::geometry::{Location, Rect};
use crate::logger;
use crate::matching::Match;
use crate::pattern::Pattern;
use crate::region::Region;
use crate::settings::validate_timeout;
use crate::sleep;

/// Custom FindFailed handler: receives the region and the pattern that timed
/// out; its return value becomes the result of the wait.
pub type FindFailedHandler = Arc<dyn Fn(&Region, &Pattern) -> Result<Option<Match>> + Send + Sync>;

/// What `wait` does when a pattern does not show up in time.
#[derive(Clone, Default)]
pub enum FindFailedResponse {
    /// Fail with [`Error::FindFailed`].
    #[default]
    Abort,
    /// Return an empty result.
    Skip,
    /// Ask the desktop's [`FindFailedPrompt`]; behaves like `Abort` without one.
    Prompt,
    Handler(FindFailedHandler),
}

impl FindFailedResponse {
    pub fn name(&self) -> &'static str {
        match self {
            FindFailedResponse::Abort => "ABORT",
            FindFailedResponse::Skip => "SKIP",
            FindFailedResponse::Prompt => "PROMPT",
            FindFailedResponse::Handler(_) => "HANDLE",
        }
    }
}

impl fmt::Debug for FindFailedResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptChoice {
    Retry,
    Skip,
    Abort,
}

/// Interactive retry/skip/abort decision for the PROMPT policy.
pub trait FindFailedPrompt: Send + Sync {
    fn ask(&self, pattern: &Pattern, region: Rect) -> PromptChoice;
}

enum Resolution {
    Done(Result<Option<Match>>),
    Retry,
}

impl Region {
    pub fn find_failed_response(&self) -> &FindFailedResponse {
        &self.find_failed
    }

    pub fn set_find_failed_response(&mut self, response: FindFailedResponse) {
        self.find_failed = response;
    }

    pub fn set_find_failed_handler<F>(&mut self, handler: F)
    where
        F: Fn(&Region, &Pattern) -> Result<Option<Match>> + Send + Sync + 'static,
    {
        self.find_failed = FindFailedResponse::Handler(Arc::new(handler));
    }

    /// `true` selects ABORT, `false` SKIP.
    pub fn set_throw_exception(&mut self, throw: bool) {
        self.find_failed = if throw { FindFailedResponse::Abort } else { FindFailedResponse::Skip };
    }

    pub fn throw_exception(&self) -> bool {
        matches!(self.find_failed, FindFailedResponse::Abort)
    }

    /// Bitmap of the region as it currently is on screen.
    pub fn capture(&self) -> Result<RgbaImage> {
        self.desktop().capture(self.rect())
    }

    /// Capture of the region clipped to its owning screen, with its origin.
    pub(crate) fn capture_area(&self) -> Result<(Location, RgbaImage)> {
        if !self.is_valid() {
            return Err(Error::Range(format!("cannot search the empty region {}", self.rect())));
        }
        let screen = self.screen_rect()?;
        let area = self.rect().intersection(&screen).unwrap_or(self.rect());
        Ok((area.top_left(), self.desktop().capture(area)?))
    }

    /// Best match for `pattern` inside an existing capture taken at `origin`.
    pub(crate) fn match_in(&self, capture: &RgbaImage, origin: Location, pattern: &Pattern) -> Option<Match> {
        self.desktop()
            .matcher()
            .find(capture, pattern.image(), pattern.similarity())
            .map(|hit| Match::from_hit(hit, origin, pattern))
    }

    fn attempt(&self, pattern: &Pattern) -> Result<Option<Match>> {
        let (origin, capture) = self.capture_area()?;
        Ok(self.match_in(&capture, origin, pattern))
    }

    /// One capture-and-compare attempt. A miss is `Ok(None)`, never an error.
    pub fn find(&mut self, pattern: &Pattern) -> Result<Option<Match>> {
        let start = Instant::now();
        let found = self.attempt(pattern);
        self.last_search_time = start.elapsed();
        let found = found?;
        if let Some(m) = &found {
            self.last_match = Some(m.clone());
        }
        Ok(found)
    }

    /// Every non-overlapping match at or above the pattern's similarity, best first.
    pub fn find_all(&mut self, pattern: &Pattern) -> Result<Vec<Match>> {
        let start = Instant::now();
        let (origin, capture) = self.capture_area()?;
        let matches: Vec<Match> = self
            .desktop()
            .matcher()
            .find_all(&capture, pattern.image(), pattern.similarity())
            .into_iter()
            .map(|hit| Match::from_hit(hit, origin, pattern))
            .collect();
        self.last_search_time = start.elapsed();
        if let Some(best) = matches.first() {
            self.last_match = Some(best.clone());
        }
        self.last_matches = matches.clone();
        Ok(matches)
    }

    fn timeout_or_default(&self, timeout: Option<f64>) -> Result<f64> {
        let secs = timeout.unwrap_or(self.auto_wait_timeout);
        validate_timeout(secs)?;
        Ok(secs)
    }

    /// Poll until `done` accepts an attempt's outcome or `secs` elapse.
    /// At least one attempt is always made.
    fn poll<T>(
        &self,
        pattern: &Pattern,
        secs: f64,
        mut done: impl FnMut(Option<Match>) -> Option<T>,
    ) -> Result<Option<T>> {
        let start = Instant::now();
        let until = sleep::deadline(start, Some(secs));
        let interval = sleep::scan_interval(self.wait_scan_rate);
        loop {
            let tick = Instant::now();
            if let Some(out) = done(self.attempt(pattern)?) {
                return Ok(Some(out));
            }
            let next = tick + interval;
            match until {
                Some(until) if Instant::now() >= until => return Ok(None),
                Some(until) => sleep::sleep_until(next.min(until)),
                None => sleep::sleep_until(next),
            }
        }
    }

    fn finish_search(&mut self, start: Instant, found: &Option<Match>) {
        self.last_search_time = start.elapsed();
        if let Some(m) = found {
            self.last_match = Some(m.clone());
        }
    }

    /// Poll for `pattern` for up to `timeout` seconds (default: the region's
    /// auto-wait timeout). Timing out yields `Ok(None)`, never an error.
    pub fn exists(&mut self, pattern: &Pattern, timeout: Option<f64>) -> Result<Option<Match>> {
        let secs = self.timeout_or_default(timeout)?;
        let start = Instant::now();
        let found = self.poll(pattern, secs, |m| m);
        let found = found?;
        self.finish_search(start, &found);
        Ok(found)
    }

    /// Like [`exists`](Self::exists), but a timeout is handled by the
    /// region's [`FindFailedResponse`].
    pub fn wait(&mut self, pattern: &Pattern, timeout: Option<f64>) -> Result<Option<Match>> {
        let secs = self.timeout_or_default(timeout)?;
        let start = Instant::now();
        loop {
            let found = self.poll(pattern, secs, |m| m)?;
            if found.is_some() {
                self.finish_search(start, &found);
                return Ok(found);
            }
            match self.resolve_find_failed(pattern) {
                Resolution::Done(result) => {
                    self.last_search_time = start.elapsed();
                    return result;
                }
                Resolution::Retry => logger::info_p("search", &format!("retrying {}", pattern)),
            }
        }
    }

    /// Poll until `pattern` is no longer found. `true` once it is gone,
    /// `false` if it is still there after `timeout`.
    pub fn wait_vanish(&mut self, pattern: &Pattern, timeout: Option<f64>) -> Result<bool> {
        let secs = self.timeout_or_default(timeout)?;
        let start = Instant::now();
        let gone = self.poll(pattern, secs, |m| m.is_none().then_some(()));
        self.last_search_time = start.elapsed();
        Ok(gone?.is_some())
    }

    fn find_failed_error(&self, pattern: &Pattern) -> Error {
        Error::FindFailed { pattern: pattern.to_string(), region: self.rect() }
    }

    fn resolve_find_failed(&self, pattern: &Pattern) -> Resolution {
        logger::warn_p(
            "search",
            &format!("{} not found in {} ({})", pattern, self.rect(), self.find_failed.name()),
        );
        match &self.find_failed {
            FindFailedResponse::Abort => Resolution::Done(Err(self.find_failed_error(pattern))),
            FindFailedResponse::Skip => Resolution::Done(Ok(None)),
            FindFailedResponse::Handler(handler) => {
                let handler = Arc::clone(handler);
                Resolution::Done(handler(self, pattern))
            }
            FindFailedResponse::Prompt => {
                let Some(prompt) = self.desktop().prompt() else {
                    return Resolution::Done(Err(self.find_failed_error(pattern)));
                };
                match prompt.ask(pattern, self.rect()) {
                    PromptChoice::Retry => Resolution::Retry,
                    PromptChoice::Skip => Resolution::Done(Ok(None)),
                    PromptChoice::Abort => Resolution::Done(Err(self.find_failed_error(pattern))),
                }
            }
        }
    }
}
