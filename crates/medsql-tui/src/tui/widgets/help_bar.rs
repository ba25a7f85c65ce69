// Help bar: key hints for the current input mode.

use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::Paragraph;
use ratatui::Frame;

use medsql_app::protocol::AgentStatus;

use crate::tui::{Focus, ViewState};

pub fn hints(state: &ViewState) -> Vec<(&'static str, &'static str)> {
    if state.confirm_quit {
        return vec![("y", "quit"), ("n", "stay")];
    }
    if state.input_mode {
        return vec![("Enter", "ask"), ("Esc", "leave input"), ("Ctrl+C", "quit")];
    }

    let mut hints = vec![("i", "ask"), ("1-3", "tabs"), ("Tab", "focus")];
    match state.focus {
        Focus::Main => hints.push(("j/k", "scroll")),
        Focus::Examples | Focus::Recent => {
            hints.push(("j/k", "select"));
            hints.push(("Enter", "run"));
        }
    }
    if state.status == AgentStatus::Running {
        hints.push(("c", "cancel"));
    }
    hints.extend([
        ("r", "reload schema"),
        ("d", "diagnostics"),
        ("e", "export"),
        ("q", "quit"),
    ]);
    hints
}

pub fn render(frame: &mut Frame, area: Rect, state: &ViewState) {
    let key_style = Style::default()
        .fg(Color::Cyan)
        .add_modifier(Modifier::BOLD);
    let mut spans = Vec::new();
    for (key, action) in hints(state) {
        spans.push(Span::styled(format!(" {key}"), key_style));
        spans.push(Span::styled(format!(" {action} "), Style::default().fg(Color::Gray)));
    }
    let paragraph = Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::Black));
    frame.render_widget(paragraph, area);
}
