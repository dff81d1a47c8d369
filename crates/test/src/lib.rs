//! Script test support: runs a Lua file against a virtual desktop and gives
//! the script a `stub` global to paint that desktop.
//!
//! `stub` functions, all coordinates screen-absolute:
//!
//! | call | effect |
//! |------|--------|
//! | `stub.icon(name, w, h, r, g, b)` | write a `w`x`h` PNG of that colour with a black centre pixel; returns its path |
//! | `stub.paint(path, x, y)` | copy an image file onto the desktop |
//! | `stub.paint_after(secs, path, x, y)` | the same, from another thread after `secs` |
//! | `stub.fill(x, y, w, h, r, g, b)` | paint a solid rectangle |
//! | `stub.fill_after(secs, x, y, w, h, r, g, b)` | the same, from another thread after `secs` |
//! | `stub.clear()` | reset the desktop to the background colour |
//! | `stub.input()` | injected input so far, one string per event |
//! | `stub.window(title, pid, x, y, w, h)` | add a window; returns its id |

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result};
use image::{Rgba, RgbaImage};
use mlua::prelude::*;

use glimpse_core::platform::StubPlatform;
use glimpse_core::{Desktop, Location, LuaScript, Rect, sleep};

/// Screen layout every script runs on: two side-by-side screens.
pub fn default_screens() -> Vec<Rect> {
    vec![Rect::new(0, 0, 320, 240), Rect::new(320, 0, 200, 150)]
}

pub fn stub_desktop(screens: Vec<Rect>) -> (Arc<StubPlatform>, Desktop) {
    let stub = Arc::new(StubPlatform::with_screens(screens));
    let desktop = Desktop::new(stub.clone());
    (stub, desktop)
}

fn icon(w: u32, h: u32, color: Rgba<u8>) -> RgbaImage {
    let mut img = RgbaImage::from_pixel(w, h, color);
    if w > 0 && h > 0 {
        img.put_pixel(w / 2, h / 2, Rgba([0, 0, 0, 255]));
    }
    img
}

/// Register the `stub` global. Icons are written below `scratch`.
pub fn install_stub(lua: &Lua, stub: Arc<StubPlatform>, scratch: &Path) -> LuaResult<()> {
    let t = lua.create_table()?;

    let dir = scratch.to_path_buf();
    t.set("icon", lua.create_function(move |_, (name, w, h, r, g, b): (String, u32, u32, u8, u8, u8)| {
        let path = dir.join(format!("{}.png", name));
        icon(w, h, Rgba([r, g, b, 255]))
            .save(&path)
            .map_err(LuaError::external)?;
        Ok(path.to_string_lossy().to_string())
    })?)?;

    let s = stub.clone();
    t.set("paint", lua.create_function(move |_, (path, x, y): (String, i32, i32)| {
        let img = image::open(&path).map_err(LuaError::external)?.to_rgba8();
        s.paint(Location::new(x, y), &img);
        Ok(())
    })?)?;

    let s = stub.clone();
    t.set("paint_after", lua.create_function(move |_, (secs, path, x, y): (f64, String, i32, i32)| {
        let img = image::open(&path).map_err(LuaError::external)?.to_rgba8();
        let s = s.clone();
        thread::spawn(move || {
            sleep::sleep_secs(secs);
            s.paint(Location::new(x, y), &img);
        });
        Ok(())
    })?)?;

    let s = stub.clone();
    t.set("fill", lua.create_function(
        move |_, (x, y, w, h, r, g, b): (i32, i32, i32, i32, u8, u8, u8)| {
            s.fill(Rect::new(x, y, w, h), Rgba([r, g, b, 255]));
            Ok(())
        },
    )?)?;

    let s = stub.clone();
    t.set("fill_after", lua.create_function(
        move |_, (secs, x, y, w, h, r, g, b): (f64, i32, i32, i32, i32, u8, u8, u8)| {
            let s = s.clone();
            thread::spawn(move || {
                sleep::sleep_secs(secs);
                s.fill(Rect::new(x, y, w, h), Rgba([r, g, b, 255]));
            });
            Ok(())
        },
    )?)?;

    let s = stub.clone();
    t.set("clear", lua.create_function(move |_, ()| {
        s.clear();
        Ok(())
    })?)?;

    let s = stub.clone();
    t.set("input", lua.create_function(move |lua, ()| {
        lua.create_sequence_from(s.input_log().iter().map(|e| format!("{:?}", e)))
    })?)?;

    let s = stub;
    t.set("window", lua.create_function(
        move |_, (title, pid, x, y, w, h): (String, u32, i32, i32, i32, i32)| {
            Ok(s.add_window(&title, pid, Rect::new(x, y, w, h)))
        },
    )?)?;

    lua.globals().set("stub", t)
}

/// Run one script file on a fresh virtual desktop.
pub fn run_script(path: &Path) -> Result<()> {
    let scratch = tempfile::tempdir().context("cannot create scratch dir")?;
    let (stub, desktop) = stub_desktop(default_screens());
    let script = LuaScript::new(desktop)?;
    install_stub(script.lua(), stub, scratch.path())
        .map_err(|e| anyhow::anyhow!("{}", e))?;
    script.run_file(path)
}

/// Every `*.lua` file in `dir`, sorted by name.
pub fn collect_scripts(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut scripts = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("cannot read {}", dir.display()))? {
        let path = entry?.path();
        if path.extension().is_some_and(|ext| ext == "lua") {
            scripts.push(path);
        }
    }
    scripts.sort();
    Ok(scripts)
}
