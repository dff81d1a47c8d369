use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, OnceLock};
use chrono::Local;

static LOGGER: OnceLock<Mutex<Logger>> = OnceLock::new();
static SHOW_ACTIONS: AtomicBool = AtomicBool::new(false);

struct Logger {
    file: File,
    echo: bool,
}

/// Initialize the global logger. Clears the log file.
/// Log calls made before `init` are dropped.
pub fn init(log_dir: &Path) -> io::Result<()> {
    fs::create_dir_all(log_dir)?;
    let log_path = log_dir.join("glimpse.log");
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&log_path)?;

    LOGGER.set(Mutex::new(Logger { file, echo: false })).ok();
    Ok(())
}

/// Mirror every log line to stderr.
pub fn set_echo(echo: bool) {
    if let Some(logger) = LOGGER.get() {
        if let Ok(mut l) = logger.lock() {
            l.echo = echo;
        }
    }
}

/// Enable the action log (clicks, typing, drags).
pub fn set_show_actions(show: bool) {
    SHOW_ACTIONS.store(show, Ordering::Relaxed);
}

pub fn show_actions() -> bool {
    SHOW_ACTIONS.load(Ordering::Relaxed)
}

fn write_log(level: &str, prefix: &str, msg: &str) {
    let Some(logger) = LOGGER.get() else { return };
    let ts = Local::now().format("%H:%M:%S");

    let line = if prefix.is_empty() {
        format!("[{}] [{}] {}", ts, level, msg)
    } else {
        format!("[{}] [{}] [{}] {}", ts, level, prefix, msg)
    };

    if let Ok(mut l) = logger.lock() {
        writeln!(l.file, "{}", line).ok();
        if l.echo {
            eprintln!("{}", line);
        }
    }
}

pub fn info(msg: &str) {
    write_log("INFO", "", msg);
}

pub fn error(msg: &str) {
    write_log("ERROR", "", msg);
}

/// Log tagged with a subsystem prefix (`search`, `observer`, `stub`, ...).
pub fn info_p(prefix: &str, msg: &str) {
    write_log("INFO", prefix, msg);
}

pub fn warn_p(prefix: &str, msg: &str) {
    write_log("WARN", prefix, msg);
}

pub fn error_p(prefix: &str, msg: &str) {
    write_log("ERROR", prefix, msg);
}

/// Input action, logged only while the action log is enabled.
pub fn action(msg: &str) {
    if show_actions() {
        write_log("ACTION", "", msg);
    }
}
