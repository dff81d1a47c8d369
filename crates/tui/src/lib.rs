//! Terminal front-end pieces for glimpse: the interactive FindFailed prompt.

pub mod event;
pub mod prompt;

use std::sync::Mutex;

use glimpse_core::{FindFailedPrompt, Pattern, PromptChoice, Rect, logger};

pub use prompt::PromptDialog;

/// Asks on the controlling terminal whether to retry, skip or abort a
/// failed wait. Prompts from several threads are shown one at a time.
#[derive(Default)]
pub struct TerminalPrompt {
    busy: Mutex<()>,
}

impl TerminalPrompt {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FindFailedPrompt for TerminalPrompt {
    fn ask(&self, pattern: &Pattern, region: Rect) -> PromptChoice {
        let _turn = self.busy.lock().unwrap_or_else(|e| e.into_inner());
        let mut dialog = PromptDialog::new(format!("{} not found", pattern), format!("in {}", region));
        match event::run_dialog(&mut dialog) {
            Ok(choice) => {
                logger::info_p("tui", &format!("FindFailed prompt: {:?}", choice));
                choice
            }
            Err(e) => {
                logger::error_p("tui", &format!("prompt failed, aborting: {}", e));
                PromptChoice::Abort
            }
        }
    }
}
