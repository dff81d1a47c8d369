use crossterm::event::KeyCode;
use ratatui::{
    Frame,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph},
};

use glimpse_core::PromptChoice;

const CHOICES: [PromptChoice; 3] = [PromptChoice::Retry, PromptChoice::Skip, PromptChoice::Abort];

/// Retry / Skip / Abort dialog shown when a pattern was not found.
pub struct PromptDialog {
    pub message: String,
    pub detail: String,
    pub selected: usize,
}

impl PromptDialog {
    pub fn new(message: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            detail: detail.into(),
            selected: 0, // Retry
        }
    }

    pub fn choice(&self) -> PromptChoice {
        CHOICES[self.selected]
    }

    pub fn next(&mut self) {
        self.selected = (self.selected + 1) % CHOICES.len();
    }

    pub fn prev(&mut self) {
        self.selected = (self.selected + CHOICES.len() - 1) % CHOICES.len();
    }

    /// Apply a key press. Returns the decision once the user made one.
    pub fn handle_key(&mut self, code: KeyCode) -> Option<PromptChoice> {
        match code {
            KeyCode::Left | KeyCode::BackTab | KeyCode::Char('h') => {
                self.prev();
                None
            }
            KeyCode::Right | KeyCode::Tab | KeyCode::Char('l') => {
                self.next();
                None
            }
            KeyCode::Enter => Some(self.choice()),
            KeyCode::Char('r') | KeyCode::Char('R') => Some(PromptChoice::Retry),
            KeyCode::Char('s') | KeyCode::Char('S') => Some(PromptChoice::Skip),
            KeyCode::Char('a') | KeyCode::Char('A') | KeyCode::Esc => Some(PromptChoice::Abort),
            _ => None,
        }
    }

    pub fn render(&self, f: &mut Frame) {
        let area = centered_rect(60, 8, f.area());

        // Clear the area behind the dialog
        f.render_widget(Clear, area);

        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Yellow))
            .title(" FindFailed ");

        let inner = block.inner(area);
        f.render_widget(block, area);

        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(1), // top padding
                Constraint::Length(1), // message
                Constraint::Length(1), // detail
                Constraint::Length(1), // spacing
                Constraint::Length(1), // buttons
            ])
            .split(inner);

        let msg = Paragraph::new(Line::from(Span::styled(
            &self.message,
            Style::default().fg(Color::White),
        )))
        .alignment(Alignment::Center);
        f.render_widget(msg, chunks[1]);

        let detail = Paragraph::new(Line::from(Span::styled(
            &self.detail,
            Style::default().fg(Color::DarkGray),
        )))
        .alignment(Alignment::Center);
        f.render_widget(detail, chunks[2]);

        let mut buttons = Vec::new();
        for (i, choice) in CHOICES.iter().enumerate() {
            let (label, color) = match choice {
                PromptChoice::Retry => ("  [Retry]  ", Color::Green),
                PromptChoice::Skip => ("  [Skip]  ", Color::Cyan),
                PromptChoice::Abort => ("  [Abort]  ", Color::Red),
            };
            let style = if i == self.selected {
                Style::default().fg(Color::Black).bg(color).add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(Color::DarkGray)
            };
            if i > 0 {
                buttons.push(Span::raw("   "));
            }
            buttons.push(Span::styled(label, style));
        }
        let buttons_para = Paragraph::new(Line::from(buttons)).alignment(Alignment::Center);
        f.render_widget(buttons_para, chunks[4]);
    }
}

/// Return a centered `Rect` of `width` columns and `height` rows inside `area`.
fn centered_rect(width: u16, height: u16, area: Rect) -> Rect {
    let x = area.x + area.width.saturating_sub(width) / 2;
    let y = area.y + area.height.saturating_sub(height) / 2;
    Rect::new(x, y, width.min(area.width), height.min(area.height))
}
