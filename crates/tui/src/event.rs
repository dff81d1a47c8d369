use std::io;
use std::time::Duration;

use crossterm::{
    event::{self, Event, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{Terminal, backend::CrosstermBackend};

use glimpse_core::PromptChoice;

use crate::prompt::PromptDialog;

/// Take over the terminal, show `dialog` until the user decides, then
/// restore the terminal.
pub fn run_dialog(dialog: &mut PromptDialog) -> anyhow::Result<PromptChoice> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    if let Err(e) = execute!(stdout, EnterAlternateScreen) {
        disable_raw_mode()?;
        return Err(e.into());
    }
    let backend = CrosstermBackend::new(stdout);
    let result = Terminal::new(backend).map_err(anyhow::Error::from).and_then(|mut terminal| {
        let choice = run(&mut terminal, dialog);
        terminal.show_cursor()?;
        choice
    });

    // Restore terminal
    disable_raw_mode()?;
    execute!(io::stdout(), LeaveAlternateScreen)?;

    result
}

pub fn run(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>, dialog: &mut PromptDialog) -> anyhow::Result<PromptChoice> {
    loop {
        terminal.draw(|f| dialog.render(f))?;

        // Poll with a timeout so resizes redraw promptly
        if event::poll(Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                if let Some(choice) = dialog.handle_key(key.code) {
                    return Ok(choice);
                }
            }
        }
    }
}
