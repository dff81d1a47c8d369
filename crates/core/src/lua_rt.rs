use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use anyhow::{Result, anyhow};
use image::RgbaImage;
use mlua::prelude::*;
use mlua::{HookTriggers, VmState};

use crate::desktop::Desktop;
use crate::error::Error;
use crate::event::{EventKind, ObserveEvent};
use crate::geometry::{Location, Rect};
use crate::input::Target;
use crate::logger;
use crate::matching::Match;
use crate::pattern::Pattern;
use crate::raster::RegionPart;
use crate::region::{HorizontalDir, Region, VerticalDir};
use crate::screen::Screen;
use crate::search::FindFailedResponse;
use crate::sleep;
use crate::types::MouseButton;

/// Helper to convert mlua::Error -> anyhow::Error
fn lua_err(e: mlua::Error) -> anyhow::Error {
    anyhow!("{}", e)
}

/// Raise a glimpse error inside Lua.
fn ext(e: Error) -> LuaError {
    LuaError::external(e)
}

fn type_err(msg: impl Into<String>) -> LuaError {
    ext(Error::Type(msg.into()))
}

fn desktop(lua: &Lua) -> LuaResult<Desktop> {
    lua.app_data_ref::<Desktop>()
        .map(|d| (*d).clone())
        .ok_or_else(|| LuaError::runtime("no desktop attached to this Lua state"))
}

fn int_of(v: &LuaValue) -> Option<i32> {
    match v {
        LuaValue::Integer(i) => i32::try_from(*i).ok(),
        LuaValue::Number(n) if n.fract() == 0.0 && (i32::MIN as f64..=i32::MAX as f64).contains(n) => {
            i32::try_from(*n as i64).ok()
        }
        _ => None,
    }
}

fn describe(v: &LuaValue) -> String {
    match v {
        LuaValue::UserData(ud) if ud.is::<LuaRegion>() => "Region".into(),
        LuaValue::UserData(ud) if ud.is::<LuaLocation>() => "Location".into(),
        LuaValue::UserData(ud) if ud.is::<LuaPattern>() => "Pattern".into(),
        LuaValue::UserData(ud) if ud.is::<LuaMatch>() => "Match".into(),
        other => other.type_name().into(),
    }
}

// --- userdata wrappers --------------------------------------------------

#[derive(Clone)]
struct LuaLocation(Location);

#[derive(Clone)]
struct LuaRegion {
    region: Region,
    /// Set for regions created by `Screen(id)`.
    screen: Option<(usize, Rect)>,
}

#[derive(Clone)]
struct LuaPattern(Pattern);

#[derive(Clone)]
struct LuaMatch(Match);

#[derive(Clone)]
struct LuaImage(Arc<RgbaImage>);

#[derive(Clone)]
struct LuaEvent(ObserveEvent);

impl LuaRegion {
    fn plain(region: Region) -> Self {
        Self { region, screen: None }
    }

    fn of_screen(screen: Screen) -> Self {
        Self { screen: Some((screen.id(), screen.bounds())), region: screen.into_region() }
    }
}

fn location_of(v: &LuaValue) -> LuaResult<Location> {
    match v {
        LuaValue::UserData(ud) if ud.is::<LuaLocation>() => Ok(ud.borrow::<LuaLocation>()?.0),
        LuaValue::UserData(ud) if ud.is::<LuaMatch>() => Ok(ud.borrow::<LuaMatch>()?.0.target()),
        other => Err(type_err(format!("expected a Location, got {}", describe(other)))),
    }
}

fn region_of(v: &LuaValue) -> LuaResult<Region> {
    match v {
        LuaValue::UserData(ud) if ud.is::<LuaRegion>() => Ok(ud.borrow::<LuaRegion>()?.region.clone()),
        other => Err(type_err(format!("expected a Region, got {}", describe(other)))),
    }
}

/// Region geometry from `(x, y, w, h)`, `(x, y)`, `{x, y, w, h}`, a Region
/// or a Match. Trailing extra numbers are ignored.
fn rect_from_args(args: &[LuaValue]) -> LuaResult<Rect> {
    let ints: Vec<Option<i32>> = args.iter().map(int_of).collect();
    match (args, ints.as_slice()) {
        (_, [Some(x), Some(y), Some(w), Some(h), ..]) => Ok(Rect::new(*x, *y, *w, *h)),
        (_, [Some(x), Some(y)]) => Ok(Rect::new(*x, *y, 0, 0)),
        ([LuaValue::Table(t)], _) => {
            let nums: Vec<i32> = t
                .clone()
                .sequence_values::<LuaValue>()
                .map(|v| v.ok().as_ref().and_then(int_of))
                .collect::<Option<Vec<i32>>>()
                .ok_or_else(|| type_err("region table must hold four integers"))?;
            match nums.as_slice() {
                [x, y, w, h] => Ok(Rect::new(*x, *y, *w, *h)),
                _ => Err(type_err(format!("region table needs four numbers, got {}", nums.len()))),
            }
        }
        ([LuaValue::UserData(ud)], _) if ud.is::<LuaRegion>() => Ok(ud.borrow::<LuaRegion>()?.region.rect()),
        ([LuaValue::UserData(ud)], _) if ud.is::<LuaMatch>() => Ok(ud.borrow::<LuaMatch>()?.0.rect()),
        ([], _) => Err(type_err("Region needs arguments")),
        ([first, ..], _) => Err(type_err(format!("cannot build a Region from {}", describe(first)))),
    }
}

fn pattern_of(v: &LuaValue) -> LuaResult<Pattern> {
    match v {
        LuaValue::String(s) => Pattern::from_path(s.to_string_lossy().to_string()).map_err(ext),
        LuaValue::UserData(ud) if ud.is::<LuaPattern>() => Ok(ud.borrow::<LuaPattern>()?.0.clone()),
        LuaValue::UserData(ud) if ud.is::<LuaImage>() => {
            Ok(Pattern::from_image(ud.borrow::<LuaImage>()?.0.as_ref().clone()))
        }
        other => Err(type_err(format!("cannot build a Pattern from {}", describe(other)))),
    }
}

fn target_of(v: &LuaValue) -> LuaResult<Target> {
    match v {
        LuaValue::Nil => Ok(Target::Center),
        LuaValue::UserData(ud) if ud.is::<LuaMatch>() => Ok(Target::Match(ud.borrow::<LuaMatch>()?.0.clone())),
        LuaValue::UserData(ud) if ud.is::<LuaLocation>() => Ok(Target::Location(ud.borrow::<LuaLocation>()?.0)),
        LuaValue::UserData(ud) if ud.is::<LuaRegion>() => {
            Ok(Target::Location(ud.borrow::<LuaRegion>()?.region.center()))
        }
        other => pattern_of(other).map(Target::Pattern),
    }
}

fn part_of(v: &LuaValue) -> LuaResult<RegionPart> {
    if let Some(code) = int_of(v) {
        return u32::try_from(code)
            .map_err(|_| type_err(format!("bad region part {}", code)))
            .and_then(|c| RegionPart::from_code(c).map_err(ext));
    }
    match v {
        LuaValue::String(s) => match s.to_string_lossy().to_string().as_str() {
            "MID_VERTICAL" => Ok(RegionPart::MidVertical),
            "MID_HORIZONTAL" => Ok(RegionPart::MidHorizontal),
            "MID_BIG" => Ok(RegionPart::MidBig),
            other => Err(type_err(format!("unknown region part '{}'", other))),
        },
        other => Err(type_err(format!("expected a region part, got {}", describe(other)))),
    }
}

fn button_of(v: Option<String>) -> LuaResult<MouseButton> {
    match v.as_deref().map(str::to_ascii_uppercase).as_deref() {
        None | Some("LEFT") => Ok(MouseButton::Left),
        Some("RIGHT") => Ok(MouseButton::Right),
        Some("MIDDLE") => Ok(MouseButton::Middle),
        Some(other) => Err(type_err(format!("unknown mouse button '{}'", other))),
    }
}

/// Run a search or input operation on a clone of the region so script
/// callbacks (FindFailed handlers) may use the region themselves, then
/// keep the clone's search results.
fn with_region<R>(ud: &LuaAnyUserData, f: impl FnOnce(&mut Region) -> crate::Result<R>) -> LuaResult<R> {
    let mut region = ud.borrow::<LuaRegion>()?.region.clone();
    let out = f(&mut region);
    ud.borrow_mut::<LuaRegion>()?.region.adopt_results(&region);
    out.map_err(ext)
}

// --- observer event delivery --------------------------------------------

/// VM instructions between checks for queued observer events.
const DELIVERY_INSTRUCTIONS: u32 = 100;

/// How often a blocked observer re-checks for a stop request.
const HANDLER_POLL: Duration = Duration::from_millis(20);

struct Pending {
    func: Arc<LuaFunction>,
    event: ObserveEvent,
    /// Dropped or signalled once the handler has run.
    done: Sender<()>,
}

impl Pending {
    fn run(self) {
        call_handler(&self.func, self.event);
        let _ = self.done.send(());
    }
}

/// Carries events from background observers to the script thread. They are
/// delivered between VM instructions, while the script sleeps and from
/// [`LuaScript::pump`].
struct Pump {
    script_thread: ThreadId,
    tx: Sender<Pending>,
    rx: Mutex<Receiver<Pending>>,
    closed: Arc<AtomicBool>,
}

impl Pump {
    fn try_next(&self) -> Option<Pending> {
        self.rx.lock().unwrap_or_else(|e| e.into_inner()).try_recv().ok()
    }
}

fn call_handler(func: &LuaFunction, event: ObserveEvent) {
    let kind = event.kind();
    if let Err(e) = func.call::<()>(LuaEvent(event)) {
        logger::error_p("lua", &format!("{} handler failed: {}", kind, e));
    }
}

fn observer_handler(lua: &Lua, func: LuaFunction) -> LuaResult<impl Fn(&ObserveEvent) + Send + Sync + 'static> {
    let pump = lua
        .app_data_ref::<Pump>()
        .ok_or_else(|| LuaError::runtime("no event pump attached to this Lua state"))?;
    let (script_thread, tx, closed) = (pump.script_thread, pump.tx.clone(), Arc::clone(&pump.closed));
    let func = Arc::new(func);
    Ok(move |event: &ObserveEvent| {
        if thread::current().id() == script_thread {
            call_handler(&func, event.clone());
            return;
        }
        let (done, finished) = mpsc::channel();
        let pending = Pending { func: Arc::clone(&func), event: event.clone(), done };
        if closed.load(Ordering::SeqCst) || tx.send(pending).is_err() {
            logger::warn_p("lua", "script is gone; dropping observer event");
            return;
        }
        // the observer's next tick waits for the script thread to run this
        loop {
            match finished.recv_timeout(HANDLER_POLL) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
                Err(RecvTimeoutError::Timeout) => {
                    if closed.load(Ordering::SeqCst) || event.region().stop_requested() {
                        logger::warn_p("lua", &format!("{} handler abandoned", event.kind()));
                        return;
                    }
                }
            }
        }
    })
}

/// Run every queued observer handler on the calling (script) thread.
fn deliver_pending(lua: &Lua) {
    loop {
        let next = match lua.app_data_ref::<Pump>() {
            Some(pump) => pump.try_next(),
            None => return,
        };
        match next {
            Some(pending) => pending.run(),
            None => return,
        }
    }
}

/// Sleep for `secs`, delivering queued observer events meanwhile.
fn pump_events(lua: &Lua, secs: f64) -> LuaResult<()> {
    let until = sleep::deadline(Instant::now(), Some(secs.max(0.0)));
    loop {
        let wait = match until {
            Some(until) => until.saturating_duration_since(Instant::now()),
            None => Duration::from_secs(3600),
        };
        let next = {
            let pump = lua
                .app_data_ref::<Pump>()
                .ok_or_else(|| LuaError::runtime("no event pump attached to this Lua state"))?;
            let rx = pump.rx.lock().unwrap_or_else(|e| e.into_inner());
            let next = if wait.is_zero() {
                rx.try_recv().map_err(|_| RecvTimeoutError::Timeout)
            } else {
                rx.recv_timeout(wait)
            };
            next
        };
        match next {
            Ok(pending) => pending.run(),
            Err(_) if until.map_or(true, |u| Instant::now() < u) => continue,
            Err(_) => return Ok(()),
        }
    }
}

// --- userdata methods ---------------------------------------------------

impl LuaUserData for LuaLocation {
    fn add_methods<M: LuaUserDataMethods<Self>>(methods: &mut M) {
        methods.add_method("getX", |_, this, ()| Ok(this.0.x));
        methods.add_method("getY", |_, this, ()| Ok(this.0.y));
        methods.add_method("getTuple", |_, this, ()| Ok(this.0.tuple()));
        methods.add_method_mut("setLocation", |_, this, (x, y): (i32, i32)| {
            this.0.set_location(x, y);
            Ok(())
        });
        methods.add_method("offset", |_, this, (dx, dy): (i32, i32)| Ok(LuaLocation(this.0.offset(dx, dy))));
        methods.add_method("above", |_, this, n: i32| Ok(LuaLocation(this.0.above(n))));
        methods.add_method("below", |_, this, n: i32| Ok(LuaLocation(this.0.below(n))));
        methods.add_method("left", |_, this, n: i32| Ok(LuaLocation(this.0.left(n))));
        methods.add_method("right", |_, this, n: i32| Ok(LuaLocation(this.0.right(n))));

        methods.add_method("getScreen", |lua, this, ()| {
            let screen = desktop(lua)?.screen_at(this.0).map_err(ext)?;
            Ok(screen.map(LuaRegion::of_screen))
        });
        methods.add_method("getMonitor", |lua, this, ()| {
            let screen = desktop(lua)?.monitor_at(this.0).map_err(ext)?;
            Ok(LuaRegion::of_screen(screen))
        });
        methods.add_method("getColor", |lua, this, ()| {
            match desktop(lua)?.color_at(this.0).map_err(ext)? {
                Some(px) => Ok(Some(lua.create_sequence_from(px.0)?)),
                None => Ok(None),
            }
        });

        methods.add_meta_method(LuaMetaMethod::ToString, |_, this, ()| Ok(this.0.to_string()));
        methods.add_meta_method(LuaMetaMethod::Eq, |_, this, other: LuaValue| {
            Ok(location_of(&other).is_ok_and(|l| l == this.0))
        });
    }
}

impl LuaUserData for LuaPattern {
    fn add_methods<M: LuaUserDataMethods<Self>>(methods: &mut M) {
        methods.add_method("similar", |_, this, s: f64| Ok(LuaPattern(this.0.similar(s))));
        methods.add_method("exact", |_, this, ()| Ok(LuaPattern(this.0.exact())));
        methods.add_method("targetOffset", |_, this, (dx, dy): (i32, i32)| {
            Ok(LuaPattern(this.0.target_offset(dx, dy)))
        });
        methods.add_method("getSimilar", |_, this, ()| Ok(this.0.similarity()));
        methods.add_method("getTargetOffset", |_, this, ()| Ok(LuaLocation(this.0.offset())));
        methods.add_method("getFilename", |_, this, ()| {
            Ok(this.0.filename().map(|p| p.to_string_lossy().to_string()))
        });
        methods.add_method("getImage", |_, this, ()| Ok(LuaImage(Arc::new(this.0.image().clone()))));
        methods.add_method("isImagePattern", |_, this, ()| Ok(this.0.is_image_pattern()));
        methods.add_method("isValid", |_, this, ()| Ok(this.0.is_valid()));
        methods.add_meta_method(LuaMetaMethod::ToString, |_, this, ()| Ok(this.0.to_string()));
    }
}

impl LuaUserData for LuaImage {
    fn add_methods<M: LuaUserDataMethods<Self>>(methods: &mut M) {
        methods.add_method("getWidth", |_, this, ()| Ok(this.0.width()));
        methods.add_method("getHeight", |_, this, ()| Ok(this.0.height()));
        methods.add_method("getPixel", |_, this, (x, y): (u32, u32)| {
            if x >= this.0.width() || y >= this.0.height() {
                return Err(ext(Error::Range(format!("pixel ({},{}) outside image", x, y))));
            }
            let [r, g, b, a] = this.0.get_pixel(x, y).0;
            Ok((r, g, b, a))
        });
        methods.add_method("save", |_, this, path: String| {
            this.0.save(&path).map_err(|e| ext(Error::Image(e)))
        });
    }
}

impl LuaUserData for LuaMatch {
    fn add_methods<M: LuaUserDataMethods<Self>>(methods: &mut M) {
        methods.add_method("getScore", |_, this, ()| Ok(this.0.score()));
        methods.add_method("getTarget", |_, this, ()| Ok(LuaLocation(this.0.target())));
        methods.add_method("getX", |_, this, ()| Ok(this.0.x()));
        methods.add_method("getY", |_, this, ()| Ok(this.0.y()));
        methods.add_method("getW", |_, this, ()| Ok(this.0.w()));
        methods.add_method("getH", |_, this, ()| Ok(this.0.h()));
        methods.add_method("getCenter", |_, this, ()| Ok(LuaLocation(this.0.center())));
        methods.add_method("getTopLeft", |_, this, ()| Ok(LuaLocation(this.0.top_left())));
        methods.add_method("getBottomRight", |_, this, ()| Ok(LuaLocation(this.0.bottom_right())));
        methods.add_method("getRegion", |lua, this, ()| {
            Ok(LuaRegion::plain(desktop(lua)?.region_from_rect(this.0.rect())))
        });
        methods.add_meta_method(LuaMetaMethod::ToString, |_, this, ()| Ok(this.0.to_string()));
    }
}

impl LuaUserData for LuaEvent {
    fn add_methods<M: LuaUserDataMethods<Self>>(methods: &mut M) {
        methods.add_method("getType", |_, this, ()| Ok(this.0.kind().name()));
        methods.add_method("isGeneric", |_, this, ()| Ok(this.0.is_generic()));
        methods.add_method("isAppear", |_, this, ()| Ok(this.0.is_appear()));
        methods.add_method("isVanish", |_, this, ()| Ok(this.0.is_vanish()));
        methods.add_method("isChange", |_, this, ()| Ok(this.0.is_change()));
        methods.add_method("getRegion", |_, this, ()| Ok(LuaRegion::plain(this.0.region().clone())));
        methods.add_method("getTime", |_, this, ()| Ok(this.0.time().timestamp_millis() as f64 / 1000.0));
        methods.add_method("getPattern", |_, this, ()| {
            Ok(this.0.pattern().map_err(ext)?.cloned().map(LuaPattern))
        });
        methods.add_method("getImage", |_, this, ()| {
            Ok(this.0.image().map_err(ext)?.map(|img| LuaImage(Arc::new(img.clone()))))
        });
        methods.add_method("getMatch", |_, this, ()| {
            Ok(this.0.matched().map_err(ext)?.cloned().map(LuaMatch))
        });
        methods.add_method("getChanges", |lua, this, ()| {
            let changes = this.0.changes().map_err(ext)?;
            let region = this.0.region();
            lua.create_sequence_from(changes.iter().map(|r| LuaRegion::plain(region.derive(*r))))
        });
        methods.add_meta_method(LuaMetaMethod::ToString, |_, this, ()| {
            Ok(format!("ObserveEvent({}, {})", this.0.kind(), this.0.region()))
        });
    }
}

impl LuaUserData for LuaRegion {
    fn add_methods<M: LuaUserDataMethods<Self>>(methods: &mut M) {
        // geometry
        methods.add_method("getX", |_, this, ()| Ok(this.region.x()));
        methods.add_method("getY", |_, this, ()| Ok(this.region.y()));
        methods.add_method("getW", |_, this, ()| Ok(this.region.w()));
        methods.add_method("getH", |_, this, ()| Ok(this.region.h()));
        methods.add_method_mut("setX", |_, this, v: i32| {
            this.region.set_x(v);
            Ok(())
        });
        methods.add_method_mut("setY", |_, this, v: i32| {
            this.region.set_y(v);
            Ok(())
        });
        methods.add_method_mut("setW", |_, this, v: i32| {
            this.region.set_w(v);
            Ok(())
        });
        methods.add_method_mut("setH", |_, this, v: i32| {
            this.region.set_h(v);
            Ok(())
        });
        methods.add_function("moveTo", |_, (ud, loc): (LuaAnyUserData, LuaValue)| {
            let loc = location_of(&loc)?;
            ud.borrow_mut::<LuaRegion>()?.region.move_to(loc);
            Ok(ud)
        });
        methods.add_function("setLocation", |_, (ud, loc): (LuaAnyUserData, LuaValue)| {
            let loc = location_of(&loc)?;
            ud.borrow_mut::<LuaRegion>()?.region.set_location(loc);
            Ok(ud)
        });
        methods.add_function("setROI", |_, (ud, args): (LuaAnyUserData, LuaMultiValue)| {
            let rect = rect_from_args(&args.into_iter().collect::<Vec<_>>())?;
            ud.borrow_mut::<LuaRegion>()?.region.set_roi(rect);
            Ok(ud)
        });
        methods.add_function("setRect", |_, (ud, args): (LuaAnyUserData, LuaMultiValue)| {
            let rect = rect_from_args(&args.into_iter().collect::<Vec<_>>())?;
            ud.borrow_mut::<LuaRegion>()?.region.set_rect(rect);
            Ok(ud)
        });
        methods.add_function("morphTo", |_, (ud, other): (LuaAnyUserData, LuaValue)| {
            let other = region_of(&other)?;
            ud.borrow_mut::<LuaRegion>()?.region.morph_to(&other);
            Ok(ud)
        });
        methods.add_function("add", |_, (ud, l, r, t, b): (LuaAnyUserData, i32, i32, i32, i32)| {
            ud.borrow_mut::<LuaRegion>()?.region.add(l, r, t, b);
            Ok(ud)
        });
        methods.add_method("getTopLeft", |_, this, ()| Ok(LuaLocation(this.region.top_left())));
        methods.add_method("getTopRight", |_, this, ()| Ok(LuaLocation(this.region.top_right())));
        methods.add_method("getBottomLeft", |_, this, ()| Ok(LuaLocation(this.region.bottom_left())));
        methods.add_method("getBottomRight", |_, this, ()| Ok(LuaLocation(this.region.bottom_right())));
        methods.add_method("getCenter", |_, this, ()| Ok(LuaLocation(this.region.center())));
        methods.add_method("isRegionValid", |_, this, ()| Ok(this.region.is_valid()));
        methods.add_method("contains", |_, this, other: LuaValue| match &other {
            LuaValue::UserData(ud) if ud.is::<LuaRegion>() => {
                Ok(this.region.contains_region(&ud.borrow::<LuaRegion>()?.region))
            }
            _ => Ok(this.region.contains(location_of(&other)?)),
        });
        methods.add_method("containsMouse", |_, this, ()| this.region.contains_mouse().map_err(ext));

        // screens
        methods.add_method("getScreen", |_, this, ()| {
            this.region.screen().map(LuaRegion::of_screen).map_err(ext)
        });
        methods.add_method("getID", |_, this, ()| match this.screen {
            Some((id, _)) => Ok(id),
            None => Err(type_err("getID is only available on screens")),
        });
        methods.add_method("getBounds", |_, this, ()| {
            let bounds = this.screen.map_or(this.region.rect(), |(_, b)| b);
            Ok(bounds.tuple())
        });
        methods.add_method("getNumberScreens", |_, this, ()| {
            this.region.desktop().number_screens().map_err(ext)
        });
        methods.add_method("clipRegionToScreen", |_, this, ()| {
            this.region.clip_to_screen().map(LuaRegion::plain).map_err(ext)
        });
        methods.add_method("copyTo", |lua, this, to: LuaValue| {
            let id = match &to {
                LuaValue::UserData(ud) if ud.is::<LuaRegion>() => ud
                    .borrow::<LuaRegion>()?
                    .screen
                    .map(|(id, _)| id)
                    .ok_or_else(|| type_err("copyTo needs a Screen or a screen id"))?,
                other => int_of(other)
                    .and_then(|i| usize::try_from(i).ok())
                    .ok_or_else(|| type_err(format!("copyTo needs a Screen or a screen id, got {}", describe(other))))?,
            };
            let screen = desktop(lua)?.screen(id).map_err(ext)?;
            this.region.copy_to(&screen).map(LuaRegion::plain).map_err(ext)
        });
        methods.add_method("capture", |_, this, ()| {
            this.region.capture().map(|img| LuaImage(Arc::new(img))).map_err(ext)
        });

        // derived regions
        methods.add_method("offset", |_, this, args: LuaMultiValue| {
            let args: Vec<LuaValue> = args.into_iter().collect();
            let (dx, dy) = match args.as_slice() {
                [loc] => location_of(loc)?.tuple(),
                [dx, dy, ..] => match (int_of(dx), int_of(dy)) {
                    (Some(dx), Some(dy)) => (dx, dy),
                    _ => return Err(type_err("offset needs two integers or a Location")),
                },
                [] => return Err(type_err("offset needs two integers or a Location")),
            };
            this.region.offset(dx, dy).map(LuaRegion::plain).map_err(ext)
        });
        methods.add_method("inside", |_, this, ()| Ok(LuaRegion::plain(this.region.inside())));
        methods.add_method("grow", |_, this, (w, h): (Option<i32>, Option<i32>)| {
            let w = w.unwrap_or_else(|| this.region.desktop().settings().nearby_range);
            Ok(LuaRegion::plain(this.region.grow(w, h)))
        });
        methods.add_method("nearby", |_, this, range: Option<i32>| {
            this.region.nearby(range).map(LuaRegion::plain).map_err(ext)
        });
        methods.add_method("above", |_, this, n: Option<i32>| {
            this.region.above(n).map(LuaRegion::plain).map_err(ext)
        });
        methods.add_method("below", |_, this, n: Option<i32>| {
            this.region.below(n).map(LuaRegion::plain).map_err(ext)
        });
        methods.add_method("left", |_, this, n: Option<i32>| {
            this.region.left(n).map(LuaRegion::plain).map_err(ext)
        });
        methods.add_method("right", |_, this, n: Option<i32>| {
            this.region.right(n).map(LuaRegion::plain).map_err(ext)
        });
        methods.add_method("get", |_, this, part: LuaValue| {
            this.region.get(part_of(&part)?).map(LuaRegion::plain).map_err(ext)
        });

        // raster
        methods.add_method_mut("setRaster", |_, this, (rows, cols): (u32, u32)| {
            this.region.set_raster(rows, cols).map_err(ext)
        });
        methods.add_method_mut("setRows", |_, this, rows: u32| this.region.set_rows(rows).map_err(ext));
        methods.add_method_mut("setCols", |_, this, cols: u32| this.region.set_cols(cols).map_err(ext));
        methods.add_method("getRows", |_, this, ()| Ok(this.region.rows()));
        methods.add_method("getCols", |_, this, ()| Ok(this.region.cols()));
        methods.add_method("getRowH", |_, this, ()| Ok(this.region.row_h()));
        methods.add_method("getColW", |_, this, ()| Ok(this.region.col_w()));
        methods.add_method("isRasterValid", |_, this, ()| Ok(this.region.is_raster_valid()));
        methods.add_method_mut("getRow", |_, this, (row, rows): (u32, Option<u32>)| {
            this.region.get_row(row, rows).map(LuaRegion::plain).map_err(ext)
        });
        methods.add_method_mut("getCol", |_, this, (col, cols): (u32, Option<u32>)| {
            this.region.get_col(col, cols).map(LuaRegion::plain).map_err(ext)
        });
        methods.add_method("getCell", |_, this, (row, col): (u32, u32)| {
            this.region.get_cell(row, col).map(LuaRegion::plain).map_err(ext)
        });

        // settings
        methods.add_method_mut("setAutoWaitTimeout", |_, this, secs: f64| {
            this.region.set_auto_wait_timeout(secs).map_err(ext)
        });
        methods.add_method("getAutoWaitTimeout", |_, this, ()| Ok(this.region.auto_wait_timeout()));
        methods.add_method_mut("setWaitScanRate", |_, this, rate: f64| {
            this.region.set_wait_scan_rate(rate).map_err(ext)
        });
        methods.add_method("getWaitScanRate", |_, this, ()| Ok(this.region.wait_scan_rate()));
        methods.add_method_mut("setFindFailedResponse", |_, this, name: String| {
            let response = match name.to_ascii_uppercase().as_str() {
                "ABORT" => FindFailedResponse::Abort,
                "SKIP" => FindFailedResponse::Skip,
                "PROMPT" => FindFailedResponse::Prompt,
                other => return Err(type_err(format!("unknown FindFailed response '{}'", other))),
            };
            this.region.set_find_failed_response(response);
            Ok(())
        });
        methods.add_method("getFindFailedResponse", |_, this, ()| {
            Ok(this.region.find_failed_response().name())
        });
        methods.add_method_mut("setFindFailedHandler", |_, this, func: LuaFunction| {
            this.region.set_find_failed_handler(move |region, pattern| {
                let value: LuaValue = func
                    .call((LuaRegion::plain(region.clone()), LuaPattern(pattern.clone())))
                    .map_err(|e| Error::Script(e.to_string()))?;
                match value {
                    LuaValue::UserData(ud) if ud.is::<LuaMatch>() => ud
                        .borrow::<LuaMatch>()
                        .map(|m| Some(m.0.clone()))
                        .map_err(|e| Error::Script(e.to_string())),
                    _ => Ok(None),
                }
            });
            Ok(())
        });
        methods.add_method_mut("setThrowException", |_, this, throw: bool| {
            this.region.set_throw_exception(throw);
            Ok(())
        });
        methods.add_method("getThrowException", |_, this, ()| Ok(this.region.throw_exception()));

        // search
        methods.add_function("find", |_, (ud, p): (LuaAnyUserData, LuaValue)| {
            let pattern = pattern_of(&p)?;
            Ok(with_region(&ud, |r| r.find(&pattern))?.map(LuaMatch))
        });
        methods.add_function("findAll", |lua, (ud, p): (LuaAnyUserData, LuaValue)| {
            let pattern = pattern_of(&p)?;
            let all = with_region(&ud, |r| r.find_all(&pattern))?;
            lua.create_sequence_from(all.into_iter().map(LuaMatch))
        });
        methods.add_function("exists", |_, (ud, p, t): (LuaAnyUserData, LuaValue, Option<f64>)| {
            let pattern = pattern_of(&p)?;
            Ok(with_region(&ud, |r| r.exists(&pattern, t))?.map(LuaMatch))
        });
        methods.add_function("wait", |lua, (ud, p, t): (LuaAnyUserData, LuaValue, Option<f64>)| {
            // wait(seconds) is a plain pause
            if let Some(secs) = match &p {
                LuaValue::Integer(i) => Some(*i as f64),
                LuaValue::Number(n) => Some(*n),
                _ => None,
            } {
                pump_events(lua, secs)?;
                return Ok(None);
            }
            let pattern = pattern_of(&p)?;
            Ok(with_region(&ud, |r| r.wait(&pattern, t))?.map(LuaMatch))
        });
        methods.add_function("waitVanish", |_, (ud, p, t): (LuaAnyUserData, LuaValue, Option<f64>)| {
            let pattern = pattern_of(&p)?;
            with_region(&ud, |r| r.wait_vanish(&pattern, t))
        });
        methods.add_method("getLastMatch", |_, this, ()| Ok(this.region.last_match().cloned().map(LuaMatch)));
        methods.add_method("getLastMatches", |lua, this, ()| {
            lua.create_sequence_from(this.region.last_matches().iter().cloned().map(LuaMatch))
        });
        methods.add_method("getTime", |_, this, ()| Ok(this.region.last_search_time().as_secs_f64()));

        // input
        methods.add_function("click", |_, (ud, t): (LuaAnyUserData, LuaValue)| {
            let target = target_of(&t)?;
            with_region(&ud, |r| r.click(target))
        });
        methods.add_function("doubleClick", |_, (ud, t): (LuaAnyUserData, LuaValue)| {
            let target = target_of(&t)?;
            with_region(&ud, |r| r.double_click(target))
        });
        methods.add_function("rightClick", |_, (ud, t): (LuaAnyUserData, LuaValue)| {
            let target = target_of(&t)?;
            with_region(&ud, |r| r.right_click(target))
        });
        methods.add_function("hover", |_, (ud, t): (LuaAnyUserData, LuaValue)| {
            let target = target_of(&t)?;
            with_region(&ud, |r| r.hover(target))
        });
        methods.add_function("dragDrop", |_, (ud, from, to): (LuaAnyUserData, LuaValue, LuaValue)| {
            let (from, to) = (target_of(&from)?, target_of(&to)?);
            with_region(&ud, |r| r.drag_drop(from, to))
        });
        methods.add_function("type", |_, (ud, args): (LuaAnyUserData, LuaMultiValue)| {
            let mut args: Vec<LuaValue> = args.into_iter().collect();
            if args.is_empty() {
                return Err(type_err("type needs text"));
            }
            let target = match &args[0] {
                LuaValue::String(_) => None,
                other => Some(target_of(other)?),
            };
            let rest = if target.is_some() { args.split_off(1) } else { args };
            let mut strings = rest.iter().map(|v| match v {
                LuaValue::String(s) => Ok(s.to_string_lossy().to_string()),
                other => Err(type_err(format!("type expects strings, got {}", describe(other)))),
            });
            let text = strings.next().ok_or_else(|| type_err("type needs text"))??;
            let modifiers = strings.collect::<LuaResult<Vec<String>>>()?;
            let modifiers: Vec<&str> = modifiers.iter().map(String::as_str).collect();
            with_region(&ud, |r| match target {
                Some(target) => r.type_at(target, &text, &modifiers),
                None => r.type_text(&text, &modifiers).map(|_| true),
            })
        });
        methods.add_method("paste", |_, this, text: String| this.region.paste(&text).map_err(ext));
        methods.add_method("mouseDown", |_, this, button: Option<String>| {
            this.region.mouse_down(button_of(button)?).map_err(ext)
        });
        methods.add_method("mouseUp", |_, this, button: Option<String>| {
            this.region.mouse_up(button_of(button)?).map_err(ext)
        });
        methods.add_method("wheel", |_, this, steps: i32| this.region.wheel(steps).map_err(ext));
        methods.add_method("keyDown", |_, this, key: String| this.region.key_down(&key).map_err(ext));
        methods.add_method("keyUp", |_, this, key: String| this.region.key_up(&key).map_err(ext));

        // observer
        methods.add_method("onAppear", |lua, this, (p, func): (LuaValue, LuaFunction)| {
            let pattern = pattern_of(&p)?;
            Ok(this.region.on_appear(&pattern, observer_handler(lua, func)?))
        });
        methods.add_method("onVanish", |lua, this, (p, func): (LuaValue, LuaFunction)| {
            let pattern = pattern_of(&p)?;
            Ok(this.region.on_vanish(&pattern, observer_handler(lua, func)?))
        });
        methods.add_method("onChange", |lua, this, args: LuaMultiValue| {
            let args: Vec<LuaValue> = args.into_iter().collect();
            let (min, func) = match args.as_slice() {
                [LuaValue::Function(f)] => (None, f.clone()),
                [n, LuaValue::Function(f)] => (int_of(n).and_then(|n| u32::try_from(n).ok()), f.clone()),
                _ => return Err(type_err("onChange needs [min_changed_pixels,] handler")),
            };
            Ok(this.region.on_change(min, observer_handler(lua, func)?))
        });
        methods.add_function("observe", |_, (ud, t): (LuaAnyUserData, Option<f64>)| {
            let mut region = ud.borrow::<LuaRegion>()?.region.clone();
            region.observe(t).map_err(ext)?;
            if let Some(m) = region.last_match() {
                ud.borrow_mut::<LuaRegion>()?.region.last_match = Some(m.clone());
            }
            Ok(true)
        });
        methods.add_method("observeInBackground", |_, this, t: Option<f64>| {
            this.region.observe_in_background(t).map_err(ext)?;
            Ok(true)
        });
        methods.add_method("stopObserver", |_, this, ()| {
            this.region.stop_observer();
            Ok(())
        });
        methods.add_method("isObserving", |_, this, ()| Ok(this.region.is_observing()));
        methods.add_method("hasObserver", |_, this, ()| Ok(this.region.has_observer()));
        methods.add_method("hasEvents", |_, this, ()| Ok(this.region.has_events()));
        methods.add_method("getEvents", |lua, this, ()| {
            lua.create_sequence_from(this.region.get_events().into_iter().map(LuaEvent))
        });
        // 1-based like every Lua sequence
        methods.add_method("getEvent", |_, this, index: usize| {
            let index = index
                .checked_sub(1)
                .ok_or_else(|| ext(Error::Range("event indices start at 1".into())))?;
            Ok(LuaEvent(this.region.get_event(index).map_err(ext)?))
        });
        methods.add_method("setActive", |_, this, id: usize| this.region.set_active(id).map_err(ext));
        methods.add_method("setInactive", |_, this, id: usize| this.region.set_inactive(id).map_err(ext));
        methods.add_method("removeObserver", |_, this, id: usize| Ok(this.region.remove_observer(id)));
        methods.add_method("isChanged", |_, this, (min, img): (u32, LuaValue)| match &img {
            LuaValue::UserData(ud) if ud.is::<LuaImage>() => {
                let previous = ud.borrow::<LuaImage>()?.0.clone();
                this.region.is_changed(min, &previous).map_err(ext)
            }
            other => Err(type_err(format!("isChanged needs a captured image, got {}", describe(other)))),
        });

        methods.add_meta_method(LuaMetaMethod::ToString, |_, this, ()| match this.screen {
            Some((id, _)) => Ok(format!("Screen {} {}", id, this.region)),
            None => Ok(this.region.to_string()),
        });
        methods.add_meta_method(LuaMetaMethod::Eq, |_, this, other: LuaValue| {
            Ok(region_of(&other).is_ok_and(|r| r == this.region))
        });
    }
}

// --- globals ------------------------------------------------------------

fn set_constants(t: &LuaTable) -> LuaResult<()> {
    let parts = [
        ("NORTH", RegionPart::NORTH),
        ("SOUTH", RegionPart::SOUTH),
        ("EAST", RegionPart::EAST),
        ("WEST", RegionPart::WEST),
        ("NORTH_EAST", RegionPart::NORTH_EAST),
        ("NORTH_WEST", RegionPart::NORTH_WEST),
        ("SOUTH_EAST", RegionPart::SOUTH_EAST),
        ("SOUTH_WEST", RegionPart::SOUTH_WEST),
        ("NORTH_MID", RegionPart::NORTH_MID),
        ("SOUTH_MID", RegionPart::SOUTH_MID),
        ("EAST_MID", RegionPart::EAST_MID),
        ("WEST_MID", RegionPart::WEST_MID),
        ("MID_THIRD", RegionPart::MID_THIRD),
    ];
    for (name, part) in parts {
        t.set(name, part.code())?;
    }
    for name in ["MID_VERTICAL", "MID_HORIZONTAL", "MID_BIG"] {
        t.set(name, name)?;
    }
    t.set("CREATE_X_DIRECTION_LEFT", 0)?;
    t.set("CREATE_X_DIRECTION_RIGHT", 1)?;
    t.set("CREATE_X_DIRECTION_MIDDLE", 2)?;
    t.set("CREATE_Y_DIRECTION_TOP", 0)?;
    t.set("CREATE_Y_DIRECTION_BOTTOM", 1)?;
    t.set("CREATE_Y_DIRECTION_MIDDLE", 2)?;
    for name in ["ABORT", "SKIP", "PROMPT"] {
        t.set(name, name)?;
    }
    Ok(())
}

fn register_globals(lua: &Lua) -> LuaResult<()> {
    let globals = lua.globals();

    globals.set("Location", lua.create_function(|_, args: LuaMultiValue| {
        let args: Vec<LuaValue> = args.into_iter().collect();
        match args.as_slice() {
            [x, y] => match (int_of(x), int_of(y)) {
                (Some(x), Some(y)) => Ok(LuaLocation(Location::new(x, y))),
                _ => Err(type_err("Location needs two integers")),
            },
            [single] => location_of(single).map(LuaLocation),
            _ => Err(type_err("Location needs two integers")),
        }
    })?)?;

    // Region(...) plus constants and Region.create
    let region = lua.create_table()?;
    set_constants(&region)?;
    region.set("create", lua.create_function(|lua, args: LuaMultiValue| {
        let d = desktop(lua)?;
        let args: Vec<LuaValue> = args.into_iter().collect();
        let ints: Vec<Option<i32>> = args.iter().skip(1).map(int_of).collect();
        let loc = location_of(args.first().unwrap_or(&LuaValue::Nil))?;
        let created = match ints.as_slice() {
            [Some(w), Some(h)] => Region::create(&d, loc, *w, *h),
            [Some(xd), Some(yd), Some(w), Some(h)] => {
                let x_dir = match xd {
                    0 => HorizontalDir::Left,
                    1 => HorizontalDir::Right,
                    _ => HorizontalDir::Middle,
                };
                let y_dir = match yd {
                    0 => VerticalDir::Top,
                    1 => VerticalDir::Bottom,
                    _ => VerticalDir::Middle,
                };
                Region::create_directed(&d, loc, x_dir, y_dir, *w, *h)
            }
            _ => return Err(type_err("Region.create(loc, [xdir, ydir,] w, h)")),
        };
        Ok(LuaRegion::plain(created))
    })?)?;
    let meta = lua.create_table()?;
    meta.set("__call", lua.create_function(|lua, (_, args): (LuaTable, LuaMultiValue)| {
        let rect = rect_from_args(&args.into_iter().collect::<Vec<_>>())?;
        Ok(LuaRegion::plain(desktop(lua)?.region_from_rect(rect)))
    })?)?;
    region.set_metatable(Some(meta));
    globals.set("Region", region)?;

    globals.set("Screen", lua.create_function(|lua, id: Option<usize>| {
        let screen = desktop(lua)?.screen(id.unwrap_or(0)).map_err(ext)?;
        Ok(LuaRegion::of_screen(screen))
    })?)?;

    globals.set("Pattern", lua.create_function(|_, v: LuaValue| pattern_of(&v).map(LuaPattern))?)?;

    globals.set("ObserveEvent", lua.create_function(|_, (r, kind): (LuaValue, Option<String>)| {
        let region = region_of(&r)?;
        let kind: EventKind = kind.as_deref().unwrap_or("GENERIC").parse().map_err(ext)?;
        Ok(LuaEvent(ObserveEvent::new(&region, kind)))
    })?)?;

    globals.set("sleep", lua.create_function(|lua, secs: f64| pump_events(lua, secs))?)?;

    globals.set("getClipboard", lua.create_function(|lua, ()| {
        desktop(lua)?.clipboard().map_err(ext)
    })?)?;

    globals.set("setClipboard", lua.create_function(|lua, text: String| {
        desktop(lua)?.set_clipboard(&text).map_err(ext)
    })?)?;

    globals.set("getNumberScreens", lua.create_function(|lua, ()| {
        desktop(lua)?.number_screens().map_err(ext)
    })?)?;

    globals.set("log", lua.create_function(|_, msg: String| {
        logger::info_p("lua", &msg);
        Ok(())
    })?)?;

    let key = lua.create_table()?;
    for (name, value) in [
        ("CTRL", "ctrl"), ("SHIFT", "shift"), ("ALT", "alt"), ("CMD", "cmd"),
        ("ENTER", "enter"), ("TAB", "tab"), ("ESC", "esc"), ("DELETE", "delete"),
        ("BACKSPACE", "backspace"), ("SPACE", "space"), ("UP", "up"), ("DOWN", "down"),
        ("LEFT", "left"), ("RIGHT", "right"), ("F4", "f4"),
    ] {
        key.set(name, value)?;
    }
    globals.set("Key", key)?;

    let button = lua.create_table()?;
    for name in ["LEFT", "MIDDLE", "RIGHT"] {
        button.set(name, name)?;
    }
    globals.set("Button", button)?;

    for name in ["ABORT", "SKIP", "PROMPT"] {
        globals.set(name, name)?;
    }

    Ok(())
}

/// A Lua automation script bound to a desktop, owning its own Lua VM.
///
/// Observer handlers registered from Lua run on the thread that created the
/// script. A background observer hands each event to that thread and waits
/// until the handler has finished before its next tick. Events are picked up
/// between Lua instructions, while the script sleeps (`sleep(secs)`) and from
/// [`LuaScript::pump`]; a script blocked inside a long Rust call (a `wait`,
/// an inline `observe`) delays them until the call returns.
pub struct LuaScript {
    lua: Lua,
    desktop: Desktop,
}

impl LuaScript {
    pub fn new(desktop: Desktop) -> Result<Self> {
        let lua = Lua::new();
        lua.set_app_data(desktop.clone());
        let (tx, rx) = mpsc::channel();
        lua.set_app_data(Pump {
            script_thread: thread::current().id(),
            tx,
            rx: Mutex::new(rx),
            closed: Arc::new(AtomicBool::new(false)),
        });
        register_globals(&lua).map_err(lua_err)?;
        lua.set_hook(HookTriggers::new().every_nth_instruction(DELIVERY_INSTRUCTIONS), |lua, _| {
            deliver_pending(lua);
            Ok(VmState::Continue)
        });
        Ok(Self { lua, desktop })
    }

    /// The underlying VM, e.g. to register extra globals.
    pub fn lua(&self) -> &Lua {
        &self.lua
    }

    pub fn desktop(&self) -> &Desktop {
        &self.desktop
    }

    /// Run a script file. `require` resolves modules next to it.
    pub fn run_file(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            let dir_str = dir.to_string_lossy();
            let pkg: LuaTable = self.lua.globals().get("package").map_err(lua_err)?;
            pkg.set("path", format!("{}/?.lua;{}/?/init.lua", dir_str, dir_str)).map_err(lua_err)?;
        }
        let code = std::fs::read_to_string(path)?;
        logger::info_p("lua", &format!("running {}", path.display()));
        self.run_str(&path.to_string_lossy(), &code)
    }

    pub fn run_str(&self, name: &str, code: &str) -> Result<()> {
        self.lua.load(code).set_name(name).exec().map_err(lua_err)
    }

    /// Deliver queued background observer events for up to `secs` seconds.
    pub fn pump(&self, secs: f64) -> Result<()> {
        pump_events(&self.lua, secs).map_err(lua_err)
    }
}

impl Drop for LuaScript {
    fn drop(&mut self) {
        if let Some(pump) = self.lua.app_data_ref::<Pump>() {
            pump.closed.store(true, Ordering::SeqCst);
            // dropping queued events releases the observers waiting on them
            while pump.try_next().is_some() {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::StubPlatform;

    fn script() -> (Arc<StubPlatform>, LuaScript) {
        let stub = Arc::new(StubPlatform::with_screens(vec![Rect::new(0, 0, 200, 150)]));
        let script = LuaScript::new(Desktop::new(stub.clone())).unwrap();
        (stub, script)
    }

    #[test]
    fn test_region_constructors() {
        let (_, s) = script();
        s.run_str("ctor", r#"
            local r = Region(1, 2, 3, 4)
            assert(r:getX() == 1 and r:getH() == 4)
            assert(Region({0, 0, 5, 5}):getW() == 5)
            assert(Region(r):getY() == 2)
            assert(Region(0, 0):getW() == 0)
            assert(Region(0, 0, 10, 10, 3):getW() == 10)
            assert(Region(2.0, 3.0, 4.0, 5.0):getX() == 2)
            assert(not pcall(Region, 1e12, 0, 10, 10))
            assert(not pcall(Region, 0, 0, 2.5, 10))
            assert(not pcall(Region, "foobar"))
            assert(not pcall(Region))
            local ok, err = pcall(Region, true)
            assert(not ok and tostring(err):find("type error"))
        "#).unwrap();
    }

    #[test]
    fn test_location_and_screen_lookup() {
        let (_, s) = script();
        s.run_str("loc", r#"
            local l = Location(10, 11)
            local x, y = l:above(10):getTuple()
            assert(x == 10 and y == 1)
            assert(tostring(l) == "(10,11)")
            assert(Location(-10, -10):getScreen() == nil)
            assert(Location(-10, -10):getMonitor():getID() == 0)
            assert(Location(-10, -10):getColor() == nil)
            assert(#l:getColor() == 4)
            assert(getNumberScreens() == 1)
        "#).unwrap();
    }

    #[test]
    fn test_rust_errors_surface_in_lua() {
        let (_, s) = script();
        let err = s.run_str("missing", r#"Pattern("non_existent_file.png")"#).unwrap_err();
        assert!(err.to_string().contains("image missing"));
        let err = s.run_str("offset", "Region(10, 10, 5, 5):offset(-1000, -1000)").unwrap_err();
        assert!(err.to_string().contains("out of range"));
    }

    #[test]
    fn test_find_failed_policies_in_lua() {
        let (_, s) = script();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("icon.png");
        image::RgbaImage::from_pixel(6, 6, image::Rgba([250, 30, 200, 255])).save(&path).unwrap();
        let code = r#"
            local r = Region(0, 0, 200, 150)
            r:setAutoWaitTimeout(0)
            assert(r:getFindFailedResponse() == "ABORT")
            assert(not pcall(r.wait, r, ICON))
            local calls = 0
            r:setFindFailedHandler(function(region, pattern)
                calls = calls + 1
                assert(region:getW() == 200)
                return nil
            end)
            assert(r:wait(ICON) == nil)
            assert(calls == 1)
            r:setFindFailedResponse(SKIP)
            assert(r:wait(ICON) == nil)
            assert(r:find(ICON) == nil)
            assert(r:getLastMatch() == nil)
        "#
        .replace("ICON", &format!("{:?}", path.to_string_lossy()));
        s.run_str("policies", &code).unwrap();
    }

    #[test]
    fn test_background_handler_runs_while_script_is_busy() {
        let (stub, s) = script();
        stub.fill(Rect::new(20, 20, 8, 8), image::Rgba([250, 30, 200, 255]));
        s.run_str("busy", r#"
            local area = Region(0, 0, 200, 150)
            area:setWaitScanRate(50)
            local icon = Region(20, 20, 8, 8):capture()
            local ran = 0
            area:onAppear(icon, function(e)
                ran = ran + 1
                assert(area:isObserving())
                e:getRegion():stopObserver()
            end)
            assert(area:observeInBackground(5))
            local deadline = os.time() + 3
            while ran == 0 and os.time() < deadline do
                area:find(icon)
            end
            assert(ran == 1)
            while area:isObserving() and os.time() < deadline do end
            assert(not area:isObserving())
            assert(ran == 1)
        "#).unwrap();
    }

    #[test]
    fn test_dropped_script_releases_background_observer() {
        let (stub, s) = script();
        stub.fill(Rect::new(20, 20, 8, 8), image::Rgba([250, 30, 200, 255]));
        s.run_str("drop", r#"
            area = Region(0, 0, 200, 150)
            area:setWaitScanRate(50)
            area:onAppear(Region(20, 20, 8, 8):capture(), function() end)
            assert(area:observeInBackground(0.2))
        "#).unwrap();
        let area: LuaAnyUserData = s.lua().globals().get("area").unwrap();
        let region = area.borrow::<LuaRegion>().unwrap().region.clone();
        drop(area);
        drop(s);
        let start = Instant::now();
        while region.is_observing() && start.elapsed() < Duration::from_secs(5) {
            thread::sleep(Duration::from_millis(10));
        }
        assert!(!region.is_observing());
    }

    #[test]
    fn test_event_accessors() {
        let (_, s) = script();
        s.run_str("events", r#"
            local screen = Screen(0)
            local generic = ObserveEvent(screen, "GENERIC")
            assert(generic:isGeneric() and not generic:isAppear())
            assert(generic:getRegion() == screen)
            assert(not pcall(generic.getImage, generic))
            assert(not pcall(generic.getMatch, generic))
            assert(not pcall(generic.getChanges, generic))
            assert(ObserveEvent(screen, "CHANGE"):isChange())
        "#).unwrap();
    }
}
