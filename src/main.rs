use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};

use glimpse_core::{Desktop, LuaScript, Rect, logger, settings::Settings};
use glimpse_core::platform::create_platform;
use glimpse_tui::TerminalPrompt;

const USAGE: &str = "usage: glimpse <script.lua> [--screens WxH[,WxH...]] [--show-actions] [--verbose]";

struct Args {
    script: PathBuf,
    screens: Option<Vec<Rect>>,
    show_actions: bool,
    verbose: bool,
}

/// `1920x1080,1280x1024`: screens placed left to right, top edges aligned.
fn parse_screens(spec: &str) -> Result<Vec<Rect>> {
    let mut x = 0;
    let mut screens = Vec::new();
    for part in spec.split(',') {
        let (w, h) = part
            .trim()
            .split_once(['x', 'X'])
            .with_context(|| format!("bad screen size '{}'", part))?;
        let w: i32 = w.parse().with_context(|| format!("bad screen width '{}'", w))?;
        let h: i32 = h.parse().with_context(|| format!("bad screen height '{}'", h))?;
        if w <= 0 || h <= 0 {
            bail!("screen size must be positive: '{}'", part);
        }
        screens.push(Rect::new(x, 0, w, h));
        x += w;
    }
    Ok(screens)
}

fn parse_args(args: impl IntoIterator<Item = String>) -> Result<Args> {
    let mut script = None;
    let mut screens = None;
    let mut show_actions = false;
    let mut verbose = false;
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--show-actions" => show_actions = true,
            "--verbose" | "-v" => verbose = true,
            "--screens" => {
                let spec = args.next().context("--screens needs a value")?;
                screens = Some(parse_screens(&spec)?);
            }
            flag if flag.starts_with("--") => bail!("unknown option {}\n{}", flag, USAGE),
            _ if script.is_some() => bail!("only one script may be given\n{}", USAGE),
            _ => script = Some(PathBuf::from(&arg)),
        }
    }
    let script = script.context(USAGE)?;
    Ok(Args { script, screens, show_actions, verbose })
}

fn main() -> Result<()> {
    let args = parse_args(std::env::args().skip(1))?;

    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));

    // Init logger
    logger::init(&cwd.join("logs")).context("cannot create log directory")?;
    logger::set_echo(args.verbose);

    let mut settings = Settings::load(&cwd.join("glimpse.json"));
    if args.show_actions {
        settings.show_actions = true;
    }

    let platform = create_platform(args.screens);
    let desktop = Desktop::builder(platform)
        .prompt(Arc::new(TerminalPrompt::new()))
        .settings(settings)
        .build()?;

    logger::info(&format!("glimpse started, {} screen(s)", desktop.number_screens()?));

    let script = LuaScript::new(desktop)?;
    let result = script.run_file(&args.script);
    match &result {
        Ok(()) => logger::info(&format!("{} finished", args.script.display())),
        Err(e) => logger::error(&format!("{} failed: {}", args.script.display(), e)),
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Result<Args> {
        parse_args(list.iter().map(|s| s.to_string()))
    }

    #[test]
    fn test_parse_screens() {
        let screens = parse_screens("1920x1080,1280X1024").unwrap();
        assert_eq!(screens, vec![Rect::new(0, 0, 1920, 1080), Rect::new(1920, 0, 1280, 1024)]);
        assert!(parse_screens("1920").is_err());
        assert!(parse_screens("0x100").is_err());
    }

    #[test]
    fn test_parse_args() {
        let a = args(&["bot.lua", "--show-actions", "--screens", "800x600"]).unwrap();
        assert_eq!(a.script, PathBuf::from("bot.lua"));
        assert!(a.show_actions);
        assert!(!a.verbose);
        assert_eq!(a.screens, Some(vec![Rect::new(0, 0, 800, 600)]));

        assert!(args(&[]).is_err());
        assert!(args(&["a.lua", "b.lua"]).is_err());
        assert!(args(&["a.lua", "--screens"]).is_err());
        assert!(args(&["a.lua", "--stub"]).is_err());
    }
}
