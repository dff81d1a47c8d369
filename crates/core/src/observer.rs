//! Polling observers turning successive captures into APPEAR, VANISH and
//! CHANGE events.
//!
//! One loop may run per region at a time. A second `observe` while a loop is
//! active fails with [`Error::ObserverActive`]. Stop requests are honoured at
//! tick boundaries; a running handler always finishes.
//!
//! Fired events are also kept in a per-region log read with
//! [`Region::get_events`]. The log holds at most [`EVENT_LOG_CAP`] events;
//! once full, the oldest is dropped for each new one.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::thread::{self, JoinHandle, Thread};
use std::time::{Duration, Instant};

use image::RgbaImage;

use crate::change;
use crate::error::{Error, Result};
use crate::event::{EventKind, ObserveEvent};
use crate::geometry::Location;
use crate::logger;
use crate::matching::Match;
use crate::pattern::Pattern;
use crate::region::Region;
use crate::sleep;

pub type ObserverHandler = Arc<dyn Fn(&ObserveEvent) + Send + Sync>;

/// Events kept per region until read.
pub const EVENT_LOG_CAP: usize = 1000;

struct Registration {
    id: usize,
    kind: EventKind,
    pattern: Option<Pattern>,
    handler: ObserverHandler,
    min_changed: u32,
    active: bool,
    /// Match seen on the previous tick.
    last: Option<Match>,
}

#[derive(Default)]
pub(crate) struct ObserverState {
    stop: AtomicBool,
    observing: AtomicBool,
    next_id: AtomicUsize,
    registrations: Mutex<Vec<Registration>>,
    events: Mutex<VecDeque<ObserveEvent>>,
    worker: Mutex<Option<Thread>>,
    observe_time: Mutex<Duration>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// How a region reaches its observer. Regions held by events keep a weak
/// link so the event log does not keep its own owner alive.
#[derive(Clone)]
pub(crate) enum ObserverLink {
    Strong(Arc<ObserverState>),
    Weak(Weak<ObserverState>),
}

impl ObserverLink {
    pub(crate) fn new() -> Self {
        ObserverLink::Strong(Arc::new(ObserverState::default()))
    }

    fn state(&self) -> Arc<ObserverState> {
        match self {
            ObserverLink::Strong(s) => Arc::clone(s),
            // owner is gone: act on a detached, idle observer
            ObserverLink::Weak(w) => w.upgrade().unwrap_or_default(),
        }
    }

    fn downgrade(&self) -> ObserverLink {
        match self {
            ObserverLink::Strong(s) => ObserverLink::Weak(Arc::downgrade(s)),
            ObserverLink::Weak(w) => ObserverLink::Weak(w.clone()),
        }
    }
}

/// Clears the observing flag when the loop ends, however it ends.
struct Observing<'a>(&'a ObserverState);

impl Drop for Observing<'_> {
    fn drop(&mut self) {
        *lock(&self.0.worker) = None;
        self.0.observing.store(false, Ordering::SeqCst);
    }
}

impl ObserverState {
    fn begin(&self, region: &Region) -> Result<()> {
        if self
            .observing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(Error::ObserverActive(region.rect()));
        }
        // drop stop requests made while idle
        self.stop.store(false, Ordering::SeqCst);
        // every run starts without APPEAR/VANISH baselines
        for reg in lock(&self.registrations).iter_mut() {
            reg.last = None;
        }
        Ok(())
    }

    fn record(&self, event: ObserveEvent) {
        let mut events = lock(&self.events);
        if events.len() >= EVENT_LOG_CAP {
            events.pop_front();
        }
        events.push_back(event);
    }

    fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(worker) = lock(&self.worker).as_ref() {
            worker.unpark();
        }
    }

    /// Classify every active registration against this tick's capture and
    /// update their baselines. Returns the events to dispatch.
    fn classify(
        &self,
        region: &Region,
        capture: &RgbaImage,
        origin: Location,
        previous: Option<&RgbaImage>,
        tolerance: u8,
    ) -> Vec<(ObserveEvent, ObserverHandler)> {
        let mut fired = Vec::new();
        let mut registrations = lock(&self.registrations);
        for reg in registrations.iter_mut().filter(|r| r.active) {
            match (reg.kind, &reg.pattern) {
                (EventKind::Appear | EventKind::Vanish, Some(pattern)) => {
                    let now = region.match_in(capture, origin, pattern);
                    let event = match (reg.kind, &reg.last, &now) {
                        (EventKind::Appear, None, Some(m)) => {
                            Some(ObserveEvent::pattern_event(EventKind::Appear, region, pattern.clone(), Some(m.clone())))
                        }
                        (EventKind::Vanish, Some(before), None) => {
                            Some(ObserveEvent::pattern_event(EventKind::Vanish, region, pattern.clone(), Some(before.clone())))
                        }
                        _ => None,
                    };
                    reg.last = now;
                    if let Some(event) = event {
                        fired.push((event, Arc::clone(&reg.handler)));
                    }
                }
                (EventKind::Change, _) => {
                    let Some(previous) = previous else { continue };
                    let areas = change::changed_areas(previous, capture, origin, tolerance, reg.min_changed);
                    if !areas.is_empty() {
                        fired.push((ObserveEvent::change_event(region, areas), Arc::clone(&reg.handler)));
                    }
                }
                _ => {}
            }
        }
        fired
    }

    /// The polling loop. At least one tick runs; `timeout` of `None` runs
    /// until stopped. Returns the last APPEAR match.
    fn run(&self, region: &Region, timeout: Option<f64>) -> Result<Option<Match>> {
        let _observing = Observing(self);
        *lock(&self.worker) = Some(thread::current());

        let start = Instant::now();
        let until = sleep::deadline(start, timeout);
        let interval = sleep::scan_interval(region.wait_scan_rate);
        let tolerance = region.desktop().settings().change_pixel_tolerance;
        let mut previous: Option<RgbaImage> = None;
        let mut appeared = None;
        let mut ticks = 0u64;

        logger::info_p("observer", &format!("observing {} (timeout {:?})", region.rect(), timeout));
        let outcome = loop {
            if self.stop.load(Ordering::SeqCst) {
                break Ok(());
            }
            let tick = Instant::now();
            let (origin, capture) = match region.capture_area() {
                Ok(c) => c,
                Err(e) => break Err(e),
            };
            let fired = self.classify(region, &capture, origin, previous.as_ref(), tolerance);
            previous = Some(capture);
            ticks += 1;

            for (event, handler) in fired {
                logger::info_p("observer", &format!("{} in {}", event.kind(), region.rect()));
                if event.is_appear() {
                    appeared = event.matched().ok().flatten().cloned();
                }
                self.record(event.clone());
                handler(&event);
            }

            if self.stop.load(Ordering::SeqCst) {
                break Ok(());
            }
            let next = tick + interval;
            match until {
                Some(until) if Instant::now() >= until => break Ok(()),
                Some(until) => sleep::park_until(next.min(until), &self.stop),
                None => sleep::park_until(next, &self.stop),
            }
        };

        let elapsed = start.elapsed();
        *lock(&self.observe_time) = elapsed;
        logger::info_p("observer", &format!("stopped {} after {} tick(s), {:?}", region.rect(), ticks, elapsed));
        outcome.map(|_| appeared)
    }
}

impl Region {
    /// Copy of this region for an event payload, linked weakly to the observer.
    pub(crate) fn event_view(&self) -> Region {
        let mut view = self.clone();
        view.observer = self.observer.downgrade();
        view
    }

    fn register(&self, kind: EventKind, pattern: Option<Pattern>, handler: ObserverHandler, min_changed: u32) -> usize {
        let state = self.observer.state();
        let id = state.next_id.fetch_add(1, Ordering::SeqCst);
        lock(&state.registrations).push(Registration {
            id,
            kind,
            pattern,
            handler,
            min_changed,
            active: true,
            last: None,
        });
        id
    }

    /// Call `handler` each time `pattern` goes from absent to present.
    /// A pattern already visible on the first tick counts as appearing.
    pub fn on_appear<F>(&self, pattern: &Pattern, handler: F) -> usize
    where
        F: Fn(&ObserveEvent) + Send + Sync + 'static,
    {
        self.register(EventKind::Appear, Some(pattern.clone()), Arc::new(handler), 0)
    }

    /// Call `handler` each time a previously seen `pattern` disappears.
    pub fn on_vanish<F>(&self, pattern: &Pattern, handler: F) -> usize
    where
        F: Fn(&ObserveEvent) + Send + Sync + 'static,
    {
        self.register(EventKind::Vanish, Some(pattern.clone()), Arc::new(handler), 0)
    }

    /// Call `handler` whenever at least `min_changed_pixels` pixels differ
    /// between consecutive ticks (default from settings).
    pub fn on_change<F>(&self, min_changed_pixels: Option<u32>, handler: F) -> usize
    where
        F: Fn(&ObserveEvent) + Send + Sync + 'static,
    {
        let min = min_changed_pixels.unwrap_or_else(|| self.desktop().settings().observe_min_changed_pixels);
        self.register(EventKind::Change, None, Arc::new(handler), min.max(1))
    }

    pub fn has_observer(&self) -> bool {
        !lock(&self.observer.state().registrations).is_empty()
    }

    /// Drop a registration. Returns whether it existed.
    pub fn remove_observer(&self, id: usize) -> bool {
        let state = self.observer.state();
        let mut registrations = lock(&state.registrations);
        let before = registrations.len();
        registrations.retain(|r| r.id != id);
        registrations.len() != before
    }

    fn set_registration_active(&self, id: usize, active: bool) -> Result<()> {
        let state = self.observer.state();
        let mut registrations = lock(&state.registrations);
        let reg = registrations
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| Error::Range(format!("no observer with id {}", id)))?;
        reg.active = active;
        reg.last = None;
        Ok(())
    }

    pub fn set_active(&self, id: usize) -> Result<()> {
        self.set_registration_active(id, true)
    }

    /// Skip a registration on future ticks without removing it.
    pub fn set_inactive(&self, id: usize) -> Result<()> {
        self.set_registration_active(id, false)
    }

    /// Observe on the calling thread for `timeout` seconds (`None`: until
    /// stopped). Handlers run on this thread.
    pub fn observe(&mut self, timeout: Option<f64>) -> Result<()> {
        let state = self.observer.state();
        state.begin(self)?;
        let appeared = state.run(self, timeout)?;
        if appeared.is_some() {
            self.last_match = appeared;
        }
        Ok(())
    }

    /// Observe on a new thread. Returns once the loop is running.
    pub fn observe_in_background(&self, timeout: Option<f64>) -> Result<JoinHandle<()>> {
        let state = self.observer.state();
        state.begin(self)?;
        let region = self.clone();
        let spawned = thread::Builder::new()
            .name(format!("observer {}", self.rect()))
            .spawn(move || {
                if let Err(e) = state.run(&region, timeout) {
                    logger::error_p("observer", &format!("{} stopped: {}", region.rect(), e));
                }
            });
        match spawned {
            Ok(handle) => Ok(handle),
            Err(e) => {
                self.observer.state().observing.store(false, Ordering::SeqCst);
                Err(Error::Io(e))
            }
        }
    }

    /// Ask the running loop to stop at its next tick boundary.
    pub fn stop_observer(&self) {
        self.observer.state().request_stop();
    }

    /// A stop was requested and the loop has not started a new run since.
    pub(crate) fn stop_requested(&self) -> bool {
        self.observer.state().stop.load(Ordering::SeqCst)
    }

    pub fn is_observing(&self) -> bool {
        self.observer.state().observing.load(Ordering::SeqCst)
    }

    pub fn has_events(&self) -> bool {
        !lock(&self.observer.state().events).is_empty()
    }

    /// Recorded events, oldest first. The log is cleared.
    pub fn get_events(&self) -> Vec<ObserveEvent> {
        lock(&self.observer.state().events).drain(..).collect()
    }

    /// Take the recorded event at `index`.
    pub fn get_event(&self, index: usize) -> Result<ObserveEvent> {
        let state = self.observer.state();
        let mut events = lock(&state.events);
        let recorded = events.len();
        events
            .remove(index)
            .ok_or_else(|| Error::Range(format!("no event {} ({} recorded)", index, recorded)))
    }

    /// Duration of the last completed observation.
    pub fn observe_time(&self) -> Duration {
        *lock(&self.observer.state().observe_time)
    }

    /// One-shot CHANGE test against an earlier capture of this region.
    pub fn is_changed(&self, min_changed_pixels: u32, previous: &RgbaImage) -> Result<bool> {
        let current = self.capture()?;
        let tolerance = self.desktop().settings().change_pixel_tolerance;
        Ok(change::changed_pixels(previous, &current, tolerance) >= min_changed_pixels.max(1))
    }
}
